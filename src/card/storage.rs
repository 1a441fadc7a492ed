//! Device state storage
//!
//! Persistent JSON storage for the virtual token. A slot write on a real
//! card lands in EEPROM; here it lands in a state file, with the same
//! guarantee and nothing more: the bytes survive until the next write.

use std::fs;
use std::path::PathBuf;

use log::{debug, info, warn};

use super::state::DeviceState;

/// Handles persistent storage of device state
pub struct DeviceStore {
    storage_dir: PathBuf,
    state_file: PathBuf,
    pub state: DeviceState,
}

impl DeviceStore {
    const DEFAULT_STATE_FILE: &'static str = "device_state.json";

    /// Get the default storage directory
    fn get_default_storage_dir() -> PathBuf {
        // Check environment variable first
        if let Ok(path) = std::env::var("YKOTP_STORAGE_DIR") {
            return PathBuf::from(path);
        }
        if let Some(home) = dirs::home_dir() {
            return home.join(".ykotp-card");
        }
        PathBuf::from("/var/lib/ykotp-card")
    }

    /// Create a new device store
    ///
    /// The state starts out fresh (new serial, empty slots); call
    /// [`load`](Self::load) to pick up a previously saved device.
    pub fn new(storage_path: Option<PathBuf>) -> Self {
        let storage_dir = storage_path.unwrap_or_else(Self::get_default_storage_dir);
        let state_file = storage_dir.join(Self::DEFAULT_STATE_FILE);

        Self {
            storage_dir,
            state_file,
            state: DeviceState::new(),
        }
    }

    /// Ensure the storage directory exists
    fn ensure_storage_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.storage_dir)
    }

    /// Load device state from storage
    ///
    /// Returns true if state was loaded, false if a new device was kept
    pub fn load(&mut self) -> bool {
        if !self.state_file.exists() {
            info!("No existing device state, keeping new device");
            return false;
        }

        match fs::read_to_string(&self.state_file) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(state) => {
                    self.state = state;
                    info!("Loaded device state from {:?}", self.state_file);
                    true
                }
                Err(e) => {
                    warn!("Failed to parse device state: {}", e);
                    false
                }
            },
            Err(e) => {
                warn!("Failed to read device state file: {}", e);
                false
            }
        }
    }

    /// Save device state to storage
    pub fn save(&self) -> bool {
        if let Err(e) = self.ensure_storage_dir() {
            warn!("Failed to create storage directory: {}", e);
            return false;
        }

        match serde_json::to_string_pretty(&self.state) {
            Ok(json) => match fs::write(&self.state_file, json) {
                Ok(()) => {
                    debug!("Saved device state to {:?}", self.state_file);
                    true
                }
                Err(e) => {
                    warn!("Failed to write device state: {}", e);
                    false
                }
            },
            Err(e) => {
                warn!("Failed to serialize device state: {}", e);
                false
            }
        }
    }

    /// Get a reference to the current device state
    pub fn get_state(&self) -> &DeviceState {
        &self.state
    }

    /// Get a mutable reference to the current device state
    pub fn get_state_mut(&mut self) -> &mut DeviceState {
        &mut self.state
    }
}
