//! Slot configuration records
//!
//! The fixed-layout record a host sends to program a slot, and the rules
//! for validating and applying one. The layout follows the YubiKey
//! "config" structure; of all the operating modes it can describe, only
//! HMAC challenge-response with variable-length challenges is accepted.

use thiserror::Error;

use crate::card::state::{Slot, ACC_CODE_SIZE, KEY_BLOCK_SIZE};

/// Size of the fixed (public identity) field
pub const FIXED_SIZE: usize = 16;
/// Size of the private UID field
pub const UID_SIZE: usize = 6;
/// Size of the key field
pub const KEY_SIZE: usize = 16;
/// Effective key material for OATH-style configurations: key + 4 UID bytes
pub const KEY_SIZE_OATH: usize = 20;

pub const FIXED_OFFS: usize = 0;
pub const UID_OFFS: usize = FIXED_OFFS + FIXED_SIZE;
pub const KEY_OFFS: usize = UID_OFFS + UID_SIZE;
pub const ACC_CODE_OFFS: usize = KEY_OFFS + KEY_SIZE;
pub const FIXED_SIZE_OFFS: usize = ACC_CODE_OFFS + ACC_CODE_SIZE;
pub const EXT_FLAGS_OFFS: usize = FIXED_SIZE_OFFS + 1;
pub const TKT_FLAGS_OFFS: usize = EXT_FLAGS_OFFS + 1;
// Three bytes are reserved for config flags; only the first is meaningful
pub const CFG_FLAGS_OFFS: usize = TKT_FLAGS_OFFS + 1;
pub const CRC_OFFS: usize = CFG_FLAGS_OFFS + 3;
/// Total record size. The CRC field is carried but never verified.
pub const CONFIG_SIZE: usize = CRC_OFFS + 2;

/// Ticket flag: slot answers challenges instead of emitting OTPs
pub const TKTFLAG_CHAL_RESP: u8 = 0x40;
/// Config flag bits marking an HMAC challenge slot (either bit suffices)
pub const CFGFLAG_CHAL_HMAC: u8 = 0x22;
/// Config flag: HMAC challenges may be shorter than 64 bytes
pub const CFGFLAG_HMAC_LT64: u8 = 0x04;

/// Reasons a configuration record is refused
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("configuration record too short: {0} bytes")]
    TooShort(usize),

    #[error("requested token mode is not supported")]
    UnsupportedMode,

    #[error("access code proof missing or mismatched")]
    AccessDenied,
}

/// Compare two byte strings without an early-exit on the first mismatch
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Validate a configuration record and apply it to `slot`
///
/// All checks run before the first field is written, so a refused record
/// leaves the slot byte-identical to its prior state. When the slot
/// already carries an access code, `record` must end in a 6-byte proof of
/// it; the record's own access-code field, if non-zero, becomes the new
/// code. An all-zero field leaves any existing code in place - once set,
/// a code cannot be cleared, only changed.
pub fn program_slot(slot: &mut Slot, record: &[u8]) -> Result<(), ConfigError> {
    if record.len() < CONFIG_SIZE {
        return Err(ConfigError::TooShort(record.len()));
    }

    let ext_flags = record[EXT_FLAGS_OFFS];
    let tkt_flags = record[TKT_FLAGS_OFFS];
    let cfg_flags = record[CFG_FLAGS_OFFS];

    if tkt_flags != TKTFLAG_CHAL_RESP || cfg_flags & CFGFLAG_CHAL_HMAC == 0 {
        return Err(ConfigError::UnsupportedMode);
    }

    // Yubico-OTP challenge mode and fixed-64-byte-challenge mode are the
    // remaining flag combinations; neither is implemented here.
    if cfg_flags & CFGFLAG_HMAC_LT64 == 0 {
        return Err(ConfigError::UnsupportedMode);
    }

    if slot.has_access_code() {
        if record.len() < CONFIG_SIZE + ACC_CODE_SIZE {
            return Err(ConfigError::AccessDenied);
        }
        let proof = &record[CONFIG_SIZE..CONFIG_SIZE + ACC_CODE_SIZE];
        if !constant_time_eq(&slot.acc_code, proof) {
            return Err(ConfigError::AccessDenied);
        }
    }

    slot.ext_flags = ext_flags;
    slot.tkt_flags = tkt_flags;
    slot.cfg_flags = cfg_flags;
    slot.fixed_size = record[FIXED_SIZE_OFFS];

    let new_code = &record[ACC_CODE_OFFS..ACC_CODE_OFFS + ACC_CODE_SIZE];
    if new_code.iter().any(|&b| b != 0) {
        slot.acc_code = new_code.to_vec();
    }

    let mut key = vec![0u8; KEY_BLOCK_SIZE];
    key[..KEY_SIZE].copy_from_slice(&record[KEY_OFFS..KEY_OFFS + KEY_SIZE]);
    key[KEY_SIZE..KEY_SIZE_OATH]
        .copy_from_slice(&record[UID_OFFS..UID_OFFS + (KEY_SIZE_OATH - KEY_SIZE)]);
    slot.key = key;

    slot.programmed = true;
    Ok(())
}
