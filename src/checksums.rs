// src/checksums.rs
//
// CRC-16 used to protect emulated-mode frames on the serial bus.
//
// The update step is a byte-wise CCITT variant with one quirk: the data octet
// is XORed in sign-extended, so octets >= 0x80 also flip the accumulator's
// high byte. Every peer on the bus computes it this way and it must stay
// bit-exact for wire compatibility.

// ============================================================================
// Constants
// ============================================================================

/// Accumulator seed at the start of every frame.
pub const CRC16_SEED: u16 = 0xFFFF;

/// Number of CRC octets trailing every emulated-mode frame.
pub const CRC16_LEN: usize = 2;

// ============================================================================
// Update Functions
// ============================================================================

/// Fold one data octet into the running accumulator.
pub fn crc16_update(crc: u16, octet: u8) -> u16 {
    // Sign-extend the octet before the XOR (i8 -> i16 -> u16).
    mix(crc.swap_bytes() ^ (octet as i8 as i16 as u16))
}

/// Fold one trailing CRC octet into the accumulator.
///
/// Trailer octets are absorbed zero-extended: a frame carrying the correct
/// big-endian CRC then always leaves a zero residual, whatever the value of
/// its high byte.
pub fn crc16_absorb_trailer(crc: u16, octet: u8) -> u16 {
    mix(crc.swap_bytes() ^ octet as u16)
}

fn mix(mut crc: u16) -> u16 {
    crc ^= (crc & 0xFF) >> 4;
    crc ^= crc << 12;
    crc ^= (crc & 0xFF) << 5;
    crc
}

/// CRC over a whole payload, starting from the seed.
pub fn crc16_checksum(data: &[u8]) -> u16 {
    data.iter()
        .fold(CRC16_SEED, |crc, &octet| crc16_update(crc, octet))
}

/// The two trailer octets for a payload, in network byte order.
pub fn crc16_trailer(data: &[u8]) -> [u8; CRC16_LEN] {
    crc16_checksum(data).to_be_bytes()
}

// ============================================================================
// Running Accumulator
// ============================================================================

/// Running CRC state for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crc16 {
    value: u16,
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc16 {
    pub fn new() -> Self {
        Crc16 { value: CRC16_SEED }
    }

    pub fn push(&mut self, octet: u8) {
        self.value = crc16_update(self.value, octet);
    }

    pub fn push_trailer(&mut self, octet: u8) {
        self.value = crc16_absorb_trailer(self.value, octet);
    }

    pub fn value(&self) -> u16 {
        self.value
    }

    /// True once a payload and its matching trailer have been absorbed.
    pub fn is_residual_zero(&self) -> bool {
        self.value == 0
    }
}

// ============================================================================
// Tests
// ============================================================================
