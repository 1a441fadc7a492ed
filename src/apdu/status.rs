//! Status Word (SW) constants for APDU responses
//!
//! ISO 7816-4 status words, limited to the set the OTP applet can
//! actually emit.

/// Status Word constants
#[allow(dead_code)]
pub struct SW;

#[allow(dead_code)]
impl SW {
    // Success
    pub const SUCCESS: u16 = 0x9000;

    // Checking errors
    pub const WRONG_LENGTH: u16 = 0x6700;

    pub const SECURITY_STATUS_NOT_SATISFIED: u16 = 0x6982;
    pub const DATA_INVALID: u16 = 0x6984;
    pub const CONDITIONS_NOT_SATISFIED: u16 = 0x6985;

    pub const WRONG_DATA: u16 = 0x6A80;
    pub const FUNCTION_NOT_SUPPORTED: u16 = 0x6A81;
    pub const FILE_NOT_FOUND: u16 = 0x6A82;
    pub const INCORRECT_P1_P2: u16 = 0x6A86;

    pub const INS_NOT_SUPPORTED: u16 = 0x6D00;
    pub const CLA_NOT_SUPPORTED: u16 = 0x6E00;
    pub const UNKNOWN_ERROR: u16 = 0x6F00;

    /// Check if a status word indicates success
    #[inline]
    pub fn is_success(sw: u16) -> bool {
        sw == Self::SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_success() {
        assert!(SW::is_success(0x9000));
        assert!(!SW::is_success(SW::WRONG_LENGTH));
        assert!(!SW::is_success(SW::SECURITY_STATUS_NOT_SATISFIED));
    }

    #[test]
    fn test_word_split() {
        // SW constants split into the SW1/SW2 pair the wire format wants
        let sw = SW::INS_NOT_SUPPORTED;
        assert_eq!((sw >> 8) as u8, 0x6D);
        assert_eq!(sw as u8, 0x00);
    }
}
