//! Device state data structures
//!
//! Plain data for the virtual token: the per-slot credential records and
//! the device-wide serial / programming counter. Protocol logic lives in
//! the `otp` module; this file only owns the bytes and their JSON shape.

use serde::{Deserialize, Serialize};

/// Custom serde module for base64 encoding of byte vectors
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if bytes.is_empty() {
            serializer.serialize_str("")
        } else {
            serializer.serialize_str(&STANDARD.encode(bytes))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        if s.is_empty() {
            return Ok(Vec::new());
        }
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Size of the internal key block, one HMAC-SHA1 block
pub const KEY_BLOCK_SIZE: usize = 64;

/// Length of a slot access code
pub const ACC_CODE_SIZE: usize = 6;

/// Length of the device serial
pub const SERIAL_SIZE: usize = 4;

/// First serial byte, identifying the device type
pub const SERIAL_TAG: u8 = 0x10;

/// `pgm_seq` value of a device that has never been programmed
pub const PGM_SEQ_INVALID: u8 = 0x00;

/// Bits of the little-endian config bitmask in STATUS/select responses
pub mod config_bits {
    pub const CONFIG1_VALID: u16 = 0x01;
    pub const CONFIG2_VALID: u16 = 0x02;
    // Touch bits exist in the wire format but a virtual card has no
    // touch sensor, so they are never set.
    pub const CONFIG1_TOUCH: u16 = 0x04;
    pub const CONFIG2_TOUCH: u16 = 0x08;
}

/// One credential slot
///
/// The key block is a full HMAC-SHA1 block: a successful programming
/// writes the 16-byte AES-key field to bytes 0..16 and the first 4 UID
/// bytes to bytes 16..20, leaving the rest zero. HMAC-SHA1 zero-pads
/// short keys, so MACing with the whole block equals MACing with the
/// 20 meaningful bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    #[serde(with = "base64_bytes")]
    pub key: Vec<u8>,
    /// Empty = no access control; 6 bytes once a code has been set
    #[serde(with = "base64_bytes")]
    pub acc_code: Vec<u8>,
    pub fixed_size: u8,
    pub ext_flags: u8,
    pub tkt_flags: u8,
    pub cfg_flags: u8,
    pub programmed: bool,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            key: vec![0u8; KEY_BLOCK_SIZE],
            acc_code: Vec::new(),
            fixed_size: 0,
            ext_flags: 0,
            tkt_flags: 0,
            cfg_flags: 0,
            programmed: false,
        }
    }
}

impl Slot {
    /// Check if reprogramming this slot requires an access-code proof
    pub fn has_access_code(&self) -> bool {
        !self.acc_code.is_empty()
    }

    /// The full 64-byte key block used for HMAC
    pub fn key_block(&self) -> &[u8] {
        &self.key
    }
}

/// Complete device state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    #[serde(with = "base64_bytes")]
    pub serial: Vec<u8>,
    pub pgm_seq: u8,
    pub slot1: Slot,
    pub slot2: Slot,
}

impl DeviceState {
    /// Create a fresh device: both slots unprogrammed, serial drawn from
    /// the OS entropy source with the fixed device-type tag in front
    pub fn new() -> Self {
        use rand::RngCore;
        let mut serial = vec![0u8; SERIAL_SIZE];
        serial[0] = SERIAL_TAG;
        rand::rngs::OsRng.fill_bytes(&mut serial[1..]);

        Self {
            serial,
            pgm_seq: PGM_SEQ_INVALID,
            slot1: Slot::default(),
            slot2: Slot::default(),
        }
    }

    /// Get a slot by index (0 or 1)
    pub fn slot(&self, index: usize) -> &Slot {
        match index {
            0 => &self.slot1,
            _ => &self.slot2,
        }
    }

    /// Get a mutable slot by index (0 or 1)
    pub fn slot_mut(&mut self, index: usize) -> &mut Slot {
        match index {
            0 => &mut self.slot1,
            _ => &mut self.slot2,
        }
    }

    /// The little-endian config bitmask reported by STATUS and select
    pub fn config_bitmask(&self) -> u16 {
        let mut mask = 0;
        if self.slot1.programmed {
            mask |= config_bits::CONFIG1_VALID;
        }
        if self.slot2.programmed {
            mask |= config_bits::CONFIG2_VALID;
        }
        mask
    }

    /// Record a successful slot write
    pub fn bump_pgm_seq(&mut self) {
        self.pgm_seq = self.pgm_seq.wrapping_add(1);
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new()
    }
}
