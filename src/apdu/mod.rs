//! APDU (Application Protocol Data Unit) handling
//!
//! Structs and parsing for the ISO 7816-4 command APDUs the virtual OTP
//! token consumes. Both short and extended encodings are accepted; the
//! YubiKey OTP applet declares extended-length support, and some hosts
//! make use of it for slot programming.
//!
//! # Example
//! ```ignore
//! use ykotp_card::apdu::{parse_apdu, ins};
//!
//! // STATUS query
//! let raw = &[0x00, 0x03, 0x00, 0x00];
//! let apdu = parse_apdu(raw).unwrap();
//! assert_eq!(apdu.ins, ins::STATUS);
//! ```

mod response;
mod status;

pub use response::Response;
pub use status::SW;

use thiserror::Error;

/// Errors that can occur during APDU parsing
#[derive(Debug, Error, PartialEq, Eq)]
pub enum APDUError {
    #[error("APDU too short: expected at least 4 bytes, got {0}")]
    TooShort(usize),

    #[error("Invalid APDU length")]
    InvalidLength,

    #[error("Invalid extended APDU format")]
    InvalidExtendedFormat,
}

/// A parsed APDU command
///
/// # Fields
/// - `cla`: Class byte
/// - `ins`: Instruction byte
/// - `p1`, `p2`: Parameter bytes (P1 carries the API sub-command)
/// - `data`: Command data (may be empty)
/// - `le`: Expected response length, None if not specified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct APDU {
    /// Class byte (CLA)
    pub cla: u8,
    /// Instruction byte (INS)
    pub ins: u8,
    /// Parameter 1 (P1)
    pub p1: u8,
    /// Parameter 2 (P2)
    pub p2: u8,
    /// Command data (may be empty)
    pub data: Vec<u8>,
    /// Expected response length (Le), None if not specified
    pub le: Option<u32>,
}

impl APDU {
    /// Create a new APDU with just the header (CLA, INS, P1, P2)
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Vec::new(),
            le: None,
        }
    }

    /// Create a new APDU with data
    pub fn with_data(cla: u8, ins: u8, p1: u8, p2: u8, data: Vec<u8>) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data,
            le: None,
        }
    }

    /// Check whether the class byte is ISO interindustry (bit 8 clear)
    ///
    /// The OTP applet refuses proprietary-class commands outright, the
    /// same way `APDU.isISOInterindustryCLA()` gates them on a real card.
    pub fn is_interindustry(&self) -> bool {
        (self.cla & 0x80) == 0
    }
}

/// Parse raw bytes into an APDU
///
/// Supports both encodings:
/// - Short: CLA INS P1 P2 [Lc Data] [Le]
/// - Extended: CLA INS P1 P2 00 Lc1 Lc2 Data [Le1 Le2]
pub fn parse_apdu(data: &[u8]) -> Result<APDU, APDUError> {
    if data.len() < 4 {
        return Err(APDUError::TooShort(data.len()));
    }

    let cla = data[0];
    let ins = data[1];
    let p1 = data[2];
    let p2 = data[3];

    // Case 1: header only
    if data.len() == 4 {
        return Ok(APDU::new(cla, ins, p1, p2));
    }

    let remaining = &data[4..];

    // Extended encoding starts with a 0x00 marker byte followed by a
    // two-byte Lc or Le. Only take that route when the lengths add up,
    // otherwise a short APDU whose Lc happens to be 0x00 would misparse.
    if remaining[0] == 0x00 && remaining.len() > 2 {
        let ext = &remaining[1..];
        let word = ((ext[0] as usize) << 8) | (ext[1] as usize);
        let fits = ext.len() == 2 // Le only
            || ext.len() == 2 + word // Lc + data
            || ext.len() == 2 + word + 2; // Lc + data + Le
        if fits {
            return parse_extended_apdu(cla, ins, p1, p2, ext);
        }
    }

    parse_short_apdu(cla, ins, p1, p2, remaining)
}

/// Parse the body of a short APDU (Lc/Le up to 255)
fn parse_short_apdu(
    cla: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    remaining: &[u8],
) -> Result<APDU, APDUError> {
    // Case 2: only Le (Le=0 means 256)
    if remaining.len() == 1 {
        let le = if remaining[0] == 0 { 256 } else { remaining[0] as u32 };
        return Ok(APDU {
            cla,
            ins,
            p1,
            p2,
            data: Vec::new(),
            le: Some(le),
        });
    }

    let lc = remaining[0] as usize;

    // Case 3: Lc + data
    if remaining.len() == 1 + lc {
        return Ok(APDU {
            cla,
            ins,
            p1,
            p2,
            data: remaining[1..1 + lc].to_vec(),
            le: None,
        });
    }

    // Case 4: Lc + data + Le
    if remaining.len() == 1 + lc + 1 {
        let le_byte = remaining[1 + lc];
        let le = if le_byte == 0 { 256 } else { le_byte as u32 };
        return Ok(APDU {
            cla,
            ins,
            p1,
            p2,
            data: remaining[1..1 + lc].to_vec(),
            le: Some(le),
        });
    }

    Err(APDUError::InvalidLength)
}

/// Parse the body of an extended APDU (Lc/Le up to 65535), after the
/// leading 0x00 marker byte
fn parse_extended_apdu(
    cla: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    remaining: &[u8],
) -> Result<APDU, APDUError> {
    if remaining.len() < 2 {
        return Err(APDUError::InvalidExtendedFormat);
    }

    let word = ((remaining[0] as u32) << 8) | (remaining[1] as u32);

    // Case 2E: only extended Le (0 means 65536)
    if remaining.len() == 2 {
        let le = if word == 0 { 65536 } else { word };
        return Ok(APDU {
            cla,
            ins,
            p1,
            p2,
            data: Vec::new(),
            le: Some(le),
        });
    }

    let lc = word as usize;
    if remaining.len() < 2 + lc {
        return Err(APDUError::InvalidLength);
    }
    let cmd_data = remaining[2..2 + lc].to_vec();

    // Case 3E: Lc + data
    if remaining.len() == 2 + lc {
        return Ok(APDU {
            cla,
            ins,
            p1,
            p2,
            data: cmd_data,
            le: None,
        });
    }

    // Case 4E: Lc + data + extended Le
    if remaining.len() == 2 + lc + 2 {
        let le_word = ((remaining[2 + lc] as u32) << 8) | (remaining[2 + lc + 1] as u32);
        let le = if le_word == 0 { 65536 } else { le_word };
        return Ok(APDU {
            cla,
            ins,
            p1,
            p2,
            data: cmd_data,
            le: Some(le),
        });
    }

    Err(APDUError::InvalidExtendedFormat)
}

/// OTP applet instruction bytes
pub mod ins {
    pub const SELECT: u8 = 0xA4;
    pub const API_REQUEST: u8 = 0x01;
    pub const OTP: u8 = 0x02;
    pub const STATUS: u8 = 0x03;
    pub const NDEF: u8 = 0x04;
}

/// API_REQUEST sub-commands, carried in P1
pub mod cmd {
    pub const SET_CONF_1: u8 = 0x01;
    pub const SET_CONF_2: u8 = 0x03;
    pub const UPDATE_CONF_1: u8 = 0x04;
    pub const UPDATE_CONF_2: u8 = 0x05;
    pub const GET_SERIAL: u8 = 0x10;
    pub const HMAC_1: u8 = 0x30;
    pub const HMAC_2: u8 = 0x38;
}
