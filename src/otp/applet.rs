//! OTP Applet implementation
//!
//! The dispatcher for the YubiKey OTP protocol: application select,
//! STATUS, and the API_REQUEST family (serial query, slot programming,
//! HMAC challenge-response). Each request is independent; the only state
//! is the device state held in the store.

use log::{debug, warn};

use crate::apdu::{cmd, ins, Response, APDU, SW};
use crate::card::storage::DeviceStore;
use crate::crypto::hmac::HmacSha1Operations;
use super::config::{self, ConfigError};

/// OTP Application Identifier prefix (Yubico RID + OTP PIX)
pub const OTP_AID_PREFIX: &[u8] = &[0xA0, 0x00, 0x00, 0x05, 0x27, 0x20, 0x01];

/// Firmware version reported in select and STATUS responses
pub const APP_VERSION: [u8; 3] = [0x04, 0x00, 0x00];

/// Capability bytes trailing the select response
const SELECT_CAPS: [u8; 4] = [0x02, 0x0F, 0x00, 0x00];

/// Longest challenge a slot will MAC
const MAX_CHALLENGE_SIZE: usize = 64;

/// OTP Card Applet
pub struct OTPApplet {
    store: DeviceStore,
}

impl OTPApplet {
    /// Create a new OTP applet over a device store
    pub fn new(store: DeviceStore) -> Self {
        Self { store }
    }

    /// Process an APDU command and return the response
    pub fn process_apdu(&mut self, apdu: &APDU) -> Response {
        debug!(
            "OTP APDU: CLA={:02X} INS={:02X} P1={:02X} P2={:02X}",
            apdu.cla, apdu.ins, apdu.p1, apdu.p2
        );

        if !apdu.is_interindustry() {
            return Response::error(SW::CLA_NOT_SUPPORTED);
        }

        match apdu.ins {
            ins::SELECT => self.handle_select(apdu),
            ins::STATUS => self.handle_status(apdu),
            ins::API_REQUEST => self.handle_api_request(apdu),
            other => {
                warn!("Unknown OTP instruction: {:02X}", other);
                Response::error(SW::INS_NOT_SUPPORTED)
            }
        }
    }

    /// Handle SELECT (by DF name only)
    fn handle_select(&mut self, apdu: &APDU) -> Response {
        if apdu.p1 != 0x04 {
            // Real YubiKeys answer 6D00 for SELECT MF and friends
            return Response::error(SW::INS_NOT_SUPPORTED);
        }
        if !apdu.data.starts_with(OTP_AID_PREFIX) {
            debug!("Unknown AID: {:02X?}", apdu.data);
            return Response::error(SW::FILE_NOT_FOUND);
        }

        let mut data = self.status_bytes();
        data.extend_from_slice(&SELECT_CAPS);
        Response::success(data).truncated_to(apdu.le)
    }

    /// Version, pgm_seq and the little-endian config bitmask
    fn status_bytes(&self) -> Vec<u8> {
        let state = self.store.get_state();
        let mask = state.config_bitmask();
        vec![
            APP_VERSION[0],
            APP_VERSION[1],
            APP_VERSION[2],
            state.pgm_seq,
            (mask & 0x00FF) as u8,
            (mask >> 8) as u8,
        ]
    }

    /// Handle the STATUS instruction
    fn handle_status(&self, apdu: &APDU) -> Response {
        Response::success(self.status_bytes()).truncated_to(apdu.le)
    }

    /// Route an API_REQUEST by its P1 sub-command
    fn handle_api_request(&mut self, apdu: &APDU) -> Response {
        match apdu.p1 {
            cmd::GET_SERIAL => self.handle_get_serial(apdu),
            cmd::SET_CONF_1 | cmd::UPDATE_CONF_1 => self.handle_program_slot(apdu, 0),
            cmd::SET_CONF_2 | cmd::UPDATE_CONF_2 => self.handle_program_slot(apdu, 1),
            cmd::HMAC_1 => self.handle_challenge(apdu, 0),
            cmd::HMAC_2 => self.handle_challenge(apdu, 1),
            other => {
                warn!("Unknown API sub-command: {:02X}", other);
                Response::error(SW::INCORRECT_P1_P2)
            }
        }
    }

    /// Handle GET_SERIAL
    fn handle_get_serial(&self, apdu: &APDU) -> Response {
        let serial = self.store.get_state().serial.clone();
        Response::success(serial).truncated_to(apdu.le)
    }

    /// Handle SET_CONF / UPDATE_CONF for one slot
    ///
    /// A refused record answers with its error status and the slot keeps
    /// its previous contents; a successful write bumps pgm_seq, persists,
    /// and answers with the regular STATUS payload so the host sees the
    /// new counter immediately.
    fn handle_program_slot(&mut self, apdu: &APDU, index: usize) -> Response {
        let state = self.store.get_state_mut();
        match config::program_slot(state.slot_mut(index), &apdu.data) {
            Ok(()) => {
                state.bump_pgm_seq();
                debug!("Slot {} programmed, pgm_seq={}", index + 1, state.pgm_seq);
                self.store.save();
                self.handle_status(apdu)
            }
            Err(e) => {
                warn!("Slot {} programming refused: {}", index + 1, e);
                Response::error(match e {
                    ConfigError::TooShort(_) => SW::WRONG_DATA,
                    ConfigError::UnsupportedMode => SW::FUNCTION_NOT_SUPPORTED,
                    ConfigError::AccessDenied => SW::SECURITY_STATUS_NOT_SATISFIED,
                })
            }
        }
    }

    /// Handle HMAC_1 / HMAC_2 challenge-response
    fn handle_challenge(&self, apdu: &APDU, index: usize) -> Response {
        if apdu.data.len() > MAX_CHALLENGE_SIZE {
            return Response::error(SW::WRONG_LENGTH);
        }

        let slot = self.store.get_state().slot(index);
        if !slot.programmed {
            // Deliberate empty success: hosts probe slot existence this
            // way and must not see an error status.
            return Response::ok();
        }

        // The only strip failure is the fully-uniform padded challenge
        let challenge = match HmacSha1Operations::effective_challenge(&apdu.data) {
            Ok(challenge) => challenge,
            Err(_) => return Response::error(SW::DATA_INVALID),
        };

        match HmacSha1Operations::compute(slot.key_block(), challenge) {
            Ok(mac) => Response::success(mac).truncated_to(apdu.le),
            Err(e) => {
                // Only reachable if the stored key block was corrupted
                warn!("HMAC computation failed on slot {}: {:?}", index + 1, e);
                Response::error(SW::UNKNOWN_ERROR)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::state::config_bits;
    use tempfile::TempDir;

    fn create_test_applet() -> (TempDir, OTPApplet) {
        let dir = TempDir::new().unwrap();
        let mut store = DeviceStore::new(Some(dir.path().to_path_buf()));
        store.load();
        (dir, OTPApplet::new(store))
    }

    fn select_apdu() -> APDU {
        APDU::with_data(0x00, ins::SELECT, 0x04, 0x00, OTP_AID_PREFIX.to_vec())
    }

    fn api_apdu(p1: u8, data: Vec<u8>) -> APDU {
        APDU::with_data(0x00, ins::API_REQUEST, p1, 0x00, data)
    }

    /// A valid HMAC challenge-response record
    fn make_record(key: &[u8; 16], uid: &[u8; 6]) -> Vec<u8> {
        use crate::otp::config::*;
        let mut record = vec![0u8; CONFIG_SIZE];
        record[UID_OFFS..UID_OFFS + UID_SIZE].copy_from_slice(uid);
        record[KEY_OFFS..KEY_OFFS + KEY_SIZE].copy_from_slice(key);
        record[TKT_FLAGS_OFFS] = TKTFLAG_CHAL_RESP;
        record[CFG_FLAGS_OFFS] = CFGFLAG_CHAL_HMAC | CFGFLAG_HMAC_LT64;
        record
    }

    #[test]
    fn test_select_response_layout() {
        let (_dir, mut applet) = create_test_applet();
        let resp = applet.process_apdu(&select_apdu());
        assert!(resp.is_okay());
        assert_eq!(resp.data.len(), 10);
        assert_eq!(&resp.data[..3], &APP_VERSION);
        assert_eq!(resp.data[3], 0); // pgm_seq starts invalid
        assert_eq!(&resp.data[4..6], &[0, 0]); // nothing programmed
        assert_eq!(&resp.data[6..], &[0x02, 0x0F, 0x00, 0x00]);
    }

    #[test]
    fn test_select_unknown_aid() {
        let (_dir, mut applet) = create_test_applet();
        let apdu = APDU::with_data(0x00, ins::SELECT, 0x04, 0x00, vec![0xD2, 0x76, 0x00]);
        assert_eq!(applet.process_apdu(&apdu).sw(), SW::FILE_NOT_FOUND);
    }

    #[test]
    fn test_select_mf_not_supported() {
        let (_dir, mut applet) = create_test_applet();
        let apdu = APDU::new(0x00, ins::SELECT, 0x00, 0x00);
        assert_eq!(applet.process_apdu(&apdu).sw(), SW::INS_NOT_SUPPORTED);
    }

    #[test]
    fn test_proprietary_class_refused() {
        let (_dir, mut applet) = create_test_applet();
        let apdu = APDU::new(0x80, ins::STATUS, 0x00, 0x00);
        assert_eq!(applet.process_apdu(&apdu).sw(), SW::CLA_NOT_SUPPORTED);
    }

    #[test]
    fn test_unknown_instruction() {
        let (_dir, mut applet) = create_test_applet();
        // OTP-mode generation was dropped along with its instruction
        let apdu = APDU::new(0x00, ins::OTP, 0x00, 0x00);
        assert_eq!(applet.process_apdu(&apdu).sw(), SW::INS_NOT_SUPPORTED);
    }

    #[test]
    fn test_unknown_api_command() {
        let (_dir, mut applet) = create_test_applet();
        let apdu = api_apdu(0x06, Vec::new()); // CMD_SWAP, not implemented
        assert_eq!(applet.process_apdu(&apdu).sw(), SW::INCORRECT_P1_P2);
    }

    #[test]
    fn test_program_slot_updates_status() {
        let (_dir, mut applet) = create_test_applet();
        let record = make_record(&[0x0B; 16], &[0x0B; 6]);

        let resp = applet.process_apdu(&api_apdu(cmd::SET_CONF_1, record));
        assert!(resp.is_okay());
        // Programming answers with the STATUS payload
        assert_eq!(resp.data.len(), 6);
        assert_eq!(resp.data[3], 1); // pgm_seq bumped
        assert_eq!(resp.data[4], config_bits::CONFIG1_VALID as u8);
        assert_eq!(resp.data[5], 0);
    }

    #[test]
    fn test_program_both_slots_bitmask() {
        let (_dir, mut applet) = create_test_applet();
        applet.process_apdu(&api_apdu(cmd::SET_CONF_1, make_record(&[0x01; 16], &[0; 6])));
        let resp =
            applet.process_apdu(&api_apdu(cmd::SET_CONF_2, make_record(&[0x02; 16], &[0; 6])));
        assert!(resp.is_okay());
        assert_eq!(resp.data[3], 2);
        assert_eq!(
            resp.data[4],
            (config_bits::CONFIG1_VALID | config_bits::CONFIG2_VALID) as u8
        );
    }

    #[test]
    fn test_update_conf_codes_accepted() {
        let (_dir, mut applet) = create_test_applet();
        let resp = applet
            .process_apdu(&api_apdu(cmd::UPDATE_CONF_1, make_record(&[0x01; 16], &[0; 6])));
        assert!(resp.is_okay());
        let resp = applet
            .process_apdu(&api_apdu(cmd::UPDATE_CONF_2, make_record(&[0x02; 16], &[0; 6])));
        assert!(resp.is_okay());
        assert_eq!(
            resp.data[4],
            (config_bits::CONFIG1_VALID | config_bits::CONFIG2_VALID) as u8
        );
    }

    #[test]
    fn test_refused_program_keeps_status() {
        let (_dir, mut applet) = create_test_applet();
        let mut record = make_record(&[0x01; 16], &[0; 6]);
        record[crate::otp::config::CFG_FLAGS_OFFS] = 0; // unsupported mode
        let resp = applet.process_apdu(&api_apdu(cmd::SET_CONF_1, record));
        assert_eq!(resp.sw(), SW::FUNCTION_NOT_SUPPORTED);

        let status = applet.process_apdu(&APDU::new(0x00, ins::STATUS, 0x00, 0x00));
        assert_eq!(status.data[3], 0); // pgm_seq untouched
        assert_eq!(status.data[4], 0);
    }

    #[test]
    fn test_protected_slot_requires_proof() {
        let (_dir, mut applet) = create_test_applet();
        let mut record = make_record(&[0x01; 16], &[0; 6]);
        record[crate::otp::config::ACC_CODE_OFFS
            ..crate::otp::config::ACC_CODE_OFFS + 6]
            .copy_from_slice(b"topsec");
        assert!(applet
            .process_apdu(&api_apdu(cmd::SET_CONF_1, record))
            .is_okay());

        // No proof at all
        let resp = applet
            .process_apdu(&api_apdu(cmd::SET_CONF_1, make_record(&[0x02; 16], &[0; 6])));
        assert_eq!(resp.sw(), SW::SECURITY_STATUS_NOT_SATISFIED);

        // Correct trailing proof
        let mut with_proof = make_record(&[0x02; 16], &[0; 6]);
        with_proof.extend_from_slice(b"topsec");
        assert!(applet
            .process_apdu(&api_apdu(cmd::SET_CONF_1, with_proof))
            .is_okay());
    }

    #[test]
    fn test_get_serial() {
        let (_dir, mut applet) = create_test_applet();
        let first = applet.process_apdu(&api_apdu(cmd::GET_SERIAL, Vec::new()));
        assert!(first.is_okay());
        assert_eq!(first.data.len(), 4);
        assert_eq!(first.data[0], crate::card::SERIAL_TAG);

        let second = applet.process_apdu(&api_apdu(cmd::GET_SERIAL, Vec::new()));
        assert_eq!(first.data, second.data);
    }

    #[test]
    fn test_hmac_unprogrammed_slot_empty_success() {
        let (_dir, mut applet) = create_test_applet();
        let resp = applet.process_apdu(&api_apdu(cmd::HMAC_1, b"challenge".to_vec()));
        assert!(resp.is_okay());
        assert!(resp.is_empty());
    }

    #[test]
    fn test_hmac_rfc2202_vector() {
        let (_dir, mut applet) = create_test_applet();
        // Key field + first 4 UID bytes give the RFC 2202 case-1 key,
        // twenty bytes of 0x0b
        let record = make_record(&[0x0B; 16], &[0x0B, 0x0B, 0x0B, 0x0B, 0x00, 0x00]);
        applet.process_apdu(&api_apdu(cmd::SET_CONF_2, record));

        let resp = applet.process_apdu(&api_apdu(cmd::HMAC_2, b"Hi There".to_vec()));
        assert!(resp.is_okay());
        assert_eq!(
            hex::encode(&resp.data),
            "b617318655057264e28bc0b6fb378c8ef146be00"
        );
    }

    #[test]
    fn test_hmac_is_deterministic() {
        let (_dir, mut applet) = create_test_applet();
        applet.process_apdu(&api_apdu(cmd::SET_CONF_1, make_record(&[0x42; 16], &[0; 6])));

        let a = applet.process_apdu(&api_apdu(cmd::HMAC_1, vec![0x01; 17]));
        let b = applet.process_apdu(&api_apdu(cmd::HMAC_1, vec![0x01; 17]));
        assert!(a.is_okay());
        assert_eq!(a.data.len(), 20);
        assert_eq!(a.data, b.data);
    }

    #[test]
    fn test_hmac_uniform_64_byte_challenge_rejected() {
        let (_dir, mut applet) = create_test_applet();
        applet.process_apdu(&api_apdu(cmd::SET_CONF_1, make_record(&[0x42; 16], &[0; 6])));

        let resp = applet.process_apdu(&api_apdu(cmd::HMAC_1, vec![0x41; 64]));
        assert_eq!(resp.sw(), SW::DATA_INVALID);
    }

    #[test]
    fn test_hmac_padded_challenge_stripped() {
        let (_dir, mut applet) = create_test_applet();
        let record = make_record(&[0x42; 16], &[0; 6]);
        applet.process_apdu(&api_apdu(cmd::SET_CONF_1, record));

        // 63 bytes of 0x41, one pad byte of 0x42: the MAC must cover
        // exactly the first 63 bytes
        let mut padded = vec![0x41; 64];
        padded[63] = 0x42;
        let resp = applet.process_apdu(&api_apdu(cmd::HMAC_1, padded.clone()));
        assert!(resp.is_okay());

        let direct = applet.process_apdu(&api_apdu(cmd::HMAC_1, padded[..63].to_vec()));
        assert_eq!(resp.data, direct.data);
    }

    #[test]
    fn test_hmac_challenge_too_long() {
        let (_dir, mut applet) = create_test_applet();
        applet.process_apdu(&api_apdu(cmd::SET_CONF_1, make_record(&[0x42; 16], &[0; 6])));

        let resp = applet.process_apdu(&api_apdu(cmd::HMAC_1, vec![0x41; 65]));
        assert_eq!(resp.sw(), SW::WRONG_LENGTH);
    }

    #[test]
    fn test_hmac_response_truncated_to_le() {
        let (_dir, mut applet) = create_test_applet();
        applet.process_apdu(&api_apdu(cmd::SET_CONF_1, make_record(&[0x42; 16], &[0; 6])));

        let mut apdu = api_apdu(cmd::HMAC_1, b"abc".to_vec());
        apdu.le = Some(8);
        let resp = applet.process_apdu(&apdu);
        assert!(resp.is_okay());
        assert_eq!(resp.data.len(), 8);
    }

    #[test]
    fn test_status_truncated_to_le() {
        let (_dir, mut applet) = create_test_applet();
        let mut apdu = APDU::new(0x00, ins::STATUS, 0x00, 0x00);
        apdu.le = Some(4);
        let resp = applet.process_apdu(&apdu);
        assert!(resp.is_okay());
        assert_eq!(resp.data.len(), 4);
    }

    #[test]
    fn test_state_survives_reload() {
        let dir = TempDir::new().unwrap();
        let serial;
        {
            let mut store = DeviceStore::new(Some(dir.path().to_path_buf()));
            store.load();
            let mut applet = OTPApplet::new(store);
            applet.process_apdu(&api_apdu(cmd::SET_CONF_1, make_record(&[0x42; 16], &[0; 6])));
            serial = applet
                .process_apdu(&api_apdu(cmd::GET_SERIAL, Vec::new()))
                .data;
        }

        let mut store = DeviceStore::new(Some(dir.path().to_path_buf()));
        assert!(store.load());
        let mut applet = OTPApplet::new(store);

        let status = applet.process_apdu(&APDU::new(0x00, ins::STATUS, 0x00, 0x00));
        assert_eq!(status.data[4], config_bits::CONFIG1_VALID as u8);
        let reloaded = applet.process_apdu(&api_apdu(cmd::GET_SERIAL, Vec::new()));
        assert_eq!(reloaded.data, serial);
    }
}
