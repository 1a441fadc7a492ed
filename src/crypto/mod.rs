//! Cryptographic Operations
//!
//! The HMAC-SHA1 primitive behind slot challenge-response.

pub mod hmac;

pub use self::hmac::{HmacError, HmacSha1Operations};
