//! Virtual YubiKey OTP token
//!
//! A software emulation of the YubiKey OTP applet: two credential slots
//! programmed over APDUs, answering device status/serial queries and
//! HMAC-SHA1 challenge-response requests.
//!
//! The card speaks raw APDU bytes in and data + SW1/SW2 out; whatever
//! delivers those bytes (PC/SC, a test harness) is outside this crate.
//!
//! ```ignore
//! use ykotp_card::VirtualCard;
//!
//! let mut card = VirtualCard::new();
//! // SELECT the OTP applet
//! let resp = card.process_apdu(&[
//!     0x00, 0xA4, 0x04, 0x00, 0x07, 0xA0, 0x00, 0x00, 0x05, 0x27, 0x20, 0x01,
//! ]);
//! assert_eq!(&resp[resp.len() - 2..], &[0x90, 0x00]);
//! ```

// Allow uppercase acronyms for protocol type names (APDU, SW, etc.)
#![allow(clippy::upper_case_acronyms)]

pub mod apdu;
pub mod card;
pub mod crypto;
pub mod otp;

use log::error;

use apdu::parse_apdu;
use card::{atr, DeviceStore};
use otp::OTPApplet;

/// Virtual card with the embedded OTP applet
pub struct VirtualCard {
    applet: OTPApplet,
    atr: Vec<u8>,
}

impl VirtualCard {
    /// Create a virtual card backed by the default storage location
    pub fn new() -> Self {
        let mut store = DeviceStore::new(None);
        store.load();
        Self::with_store(store)
    }

    /// Create a virtual card over an explicit device store
    pub fn with_store(store: DeviceStore) -> Self {
        Self {
            applet: OTPApplet::new(store),
            atr: atr::create_otp_atr(),
        }
    }

    /// The card's ATR
    pub fn atr(&self) -> &[u8] {
        &self.atr
    }

    /// Process a raw APDU and return the response bytes (data + SW1 SW2)
    pub fn process_apdu(&mut self, apdu_bytes: &[u8]) -> Vec<u8> {
        let cmd = match parse_apdu(apdu_bytes) {
            Ok(apdu) => apdu,
            Err(e) => {
                error!("Failed to parse APDU: {:?}", e);
                // SW 6700 (Wrong length)
                return vec![0x67, 0x00];
            }
        };

        self.applet.process_apdu(&cmd).to_bytes()
    }
}

impl Default for VirtualCard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_card() -> (TempDir, VirtualCard) {
        let dir = TempDir::new().unwrap();
        let mut store = DeviceStore::new(Some(dir.path().to_path_buf()));
        store.load();
        (dir, VirtualCard::with_store(store))
    }

    #[test]
    fn test_atr_shape() {
        let (_dir, card) = create_test_card();
        assert_eq!(card.atr()[0], 0x3B);
        assert!(card.atr().len() <= 33);
    }

    #[test]
    fn test_select_over_the_wire() {
        let (_dir, mut card) = create_test_card();
        let resp = card.process_apdu(&[
            0x00, 0xA4, 0x04, 0x00, 0x07, 0xA0, 0x00, 0x00, 0x05, 0x27, 0x20, 0x01,
        ]);
        assert_eq!(resp.len(), 12); // 10 data bytes + SW
        assert_eq!(&resp[resp.len() - 2..], &[0x90, 0x00]);
    }

    #[test]
    fn test_malformed_apdu_wrong_length() {
        let (_dir, mut card) = create_test_card();
        assert_eq!(card.process_apdu(&[0x00, 0xA4]), vec![0x67, 0x00]);
    }

    #[test]
    fn test_program_and_challenge_over_the_wire() {
        let (_dir, mut card) = create_test_card();

        // Program slot 1 with an HMAC challenge-response configuration
        let mut record = vec![0u8; otp::config::CONFIG_SIZE];
        record[otp::config::KEY_OFFS..otp::config::KEY_OFFS + 16]
            .copy_from_slice(&[0x0B; 16]);
        record[otp::config::UID_OFFS..otp::config::UID_OFFS + 4].copy_from_slice(&[0x0B; 4]);
        record[otp::config::TKT_FLAGS_OFFS] = otp::config::TKTFLAG_CHAL_RESP;
        record[otp::config::CFG_FLAGS_OFFS] =
            otp::config::CFGFLAG_CHAL_HMAC | otp::config::CFGFLAG_HMAC_LT64;

        let mut program = vec![0x00, 0x01, 0x01, 0x00, record.len() as u8];
        program.extend_from_slice(&record);
        let resp = card.process_apdu(&program);
        assert_eq!(&resp[resp.len() - 2..], &[0x90, 0x00]);

        // Challenge it with the RFC 2202 case-1 message
        let challenge = b"Hi There";
        let mut request = vec![0x00, 0x01, 0x30, 0x00, challenge.len() as u8];
        request.extend_from_slice(challenge);
        let resp = card.process_apdu(&request);
        assert_eq!(&resp[resp.len() - 2..], &[0x90, 0x00]);
        assert_eq!(
            hex::encode(&resp[..resp.len() - 2]),
            "b617318655057264e28bc0b6fb378c8ef146be00"
        );
    }

    #[test]
    fn test_status_over_the_wire() {
        let (_dir, mut card) = create_test_card();
        let resp = card.process_apdu(&[0x00, 0x03, 0x00, 0x00]);
        assert_eq!(resp.len(), 8); // 6 data bytes + SW
        assert_eq!(&resp[..3], &otp::APP_VERSION);
    }
}
