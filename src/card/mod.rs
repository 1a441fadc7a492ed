//! Device data structures and storage
//!
//! The per-slot records and device-wide counters, their JSON
//! persistence, and the ATR of the virtual card.

pub mod atr;
pub mod state;
pub mod storage;

pub use atr::{build_atr, create_otp_atr};
pub use state::{config_bits, DeviceState, Slot, ACC_CODE_SIZE, KEY_BLOCK_SIZE, SERIAL_TAG};
pub use storage::DeviceStore;
