//! ATR (Answer To Reset) handling
//!
//! Builds the ATR the virtual reader hands out when the card powers up.

/// Build an ATR with specific historical bytes
pub fn build_atr(historical_bytes: &[u8]) -> Vec<u8> {
    let mut atr = Vec::with_capacity(32);

    // TS - Initial character (direct convention)
    atr.push(0x3B);

    // T0 - Format character
    // High nibble: presence of TA1, TB1, TC1, TD1
    // Low nibble: number of historical bytes (max 15)
    let hist_len = historical_bytes.len().min(15) as u8;
    atr.push(0x80 | hist_len);

    // TD1 - Protocol indicator: T=1, no more interface bytes.
    // T=1 carries extended APDUs natively.
    atr.push(0x01);

    // Historical bytes
    atr.extend_from_slice(&historical_bytes[..hist_len as usize]);

    // TCK - XOR of all bytes from T0 to the last historical byte
    let tck: u8 = atr[1..].iter().fold(0u8, |acc, &b| acc ^ b);
    atr.push(tck);

    atr
}

/// Create an ATR for the virtual OTP token
pub fn create_otp_atr() -> Vec<u8> {
    let historical = [
        0x00, // Category indicator (compact TLV)
        0x73, // Card service data
        0x00, // Card capabilities (selection methods)
        0x00, // Card capabilities (data coding)
        0xE0, // Status indicator (life cycle + status bytes follow)
        0x05, // Life cycle: operational state
        0x90, 0x00, // Status word: success
    ];

    build_atr(&historical)
}
