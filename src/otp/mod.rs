//! OTP applet
//!
//! The YubiKey OTP protocol dispatcher and its slot configuration
//! records. Only HMAC challenge-response slots are supported.

pub mod applet;
pub mod config;

pub use applet::{OTPApplet, APP_VERSION, OTP_AID_PREFIX};
pub use config::ConfigError;
