//! HMAC-SHA1 Operations
//!
//! The challenge-response MAC for programmed slots. Two computation
//! strategies are provided: the direct one on top of the `hmac` crate,
//! and a manual two-pass construction from precomputed inner/outer pads,
//! the fallback a card without a native HMAC engine has to use. Both
//! produce identical output for the same key block and message.

use digest::Digest;
use hmac::{Hmac, Mac};
use sha1::Sha1;

/// HMAC operation errors
#[derive(Debug, PartialEq, Eq)]
pub enum HmacError {
    InvalidKeyLength(usize),
    /// A full-size challenge whose padding strip consumed every byte
    DegenerateChallenge,
}

/// HMAC-SHA1 Operations
pub struct HmacSha1Operations;

impl HmacSha1Operations {
    /// SHA-1 block size; also the size of a slot key block
    pub const BLOCK_SIZE: usize = 64;

    /// SHA-1 output size
    pub const MAC_SIZE: usize = 20;

    /// Challenge size at which trailing-byte padding is assumed
    pub const PADDED_CHALLENGE_SIZE: usize = 64;

    /// Compute HMAC-SHA1 of `message` under a full 64-byte key block
    pub fn compute(key_block: &[u8], message: &[u8]) -> Result<Vec<u8>, HmacError> {
        if key_block.len() != Self::BLOCK_SIZE {
            return Err(HmacError::InvalidKeyLength(key_block.len()));
        }

        let mut mac = Hmac::<Sha1>::new_from_slice(key_block)
            .map_err(|_| HmacError::InvalidKeyLength(key_block.len()))?;
        mac.update(message);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Derive the inner/outer pads for the manual construction
    pub fn pads(key_block: &[u8]) -> Result<(Vec<u8>, Vec<u8>), HmacError> {
        if key_block.len() != Self::BLOCK_SIZE {
            return Err(HmacError::InvalidKeyLength(key_block.len()));
        }

        let ipad: Vec<u8> = key_block.iter().map(|b| b ^ 0x36).collect();
        let opad: Vec<u8> = key_block.iter().map(|b| b ^ 0x5C).collect();
        Ok((ipad, opad))
    }

    /// Compute HMAC-SHA1 from precomputed pads:
    /// `SHA1(opad || SHA1(ipad || message))`
    pub fn compute_with_pads(
        ipad: &[u8],
        opad: &[u8],
        message: &[u8],
    ) -> Result<Vec<u8>, HmacError> {
        if ipad.len() != Self::BLOCK_SIZE {
            return Err(HmacError::InvalidKeyLength(ipad.len()));
        }
        if opad.len() != Self::BLOCK_SIZE {
            return Err(HmacError::InvalidKeyLength(opad.len()));
        }

        let mut inner = Sha1::new();
        inner.update(ipad);
        inner.update(message);
        let inner_digest = inner.finalize();

        let mut outer = Sha1::new();
        outer.update(opad);
        outer.update(&inner_digest);
        Ok(outer.finalize().to_vec())
    }

    /// Reduce an incoming challenge to its effective bytes
    ///
    /// A challenge of exactly 64 bytes is treated as padded: the last
    /// byte is padding, and so is every byte before it (scanning back
    /// from byte 62) that equals it. A challenge that strips to nothing
    /// is refused. Shorter challenges pass through untouched, including
    /// empty ones.
    pub fn effective_challenge(challenge: &[u8]) -> Result<&[u8], HmacError> {
        if challenge.len() != Self::PADDED_CHALLENGE_SIZE {
            return Ok(challenge);
        }

        let pad = challenge[63];
        let mut len = 63;
        for i in (0..=62).rev() {
            if challenge[i] != pad {
                break;
            }
            len -= 1;
        }

        if len == 0 {
            return Err(HmacError::DegenerateChallenge);
        }
        Ok(&challenge[..len])
    }
}
