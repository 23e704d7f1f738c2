//! UHID event encoding
//!
//! The virtual device speaks the kernel's UHID protocol: fixed-layout
//! events written to `/dev/uhid`. Only the three events the forwarder
//! emits are encoded here — CREATE2 at setup, INPUT2 per report, DESTROY
//! at teardown — each truncated to the bytes the kernel actually reads,
//! the way `struct uhid_event` writers conventionally do.

/// `UHID_DESTROY`
pub const UHID_DESTROY: u32 = 1;
/// `UHID_CREATE2`
pub const UHID_CREATE2: u32 = 11;
/// `UHID_INPUT2`
pub const UHID_INPUT2: u32 = 12;

/// `BUS_USB`
const BUS_USB: u16 = 0x03;

/// Offset of `u.create2.rd_data` inside `struct uhid_event`
const CREATE2_RD_DATA_OFFSET: usize = 4 + 128 + 64 + 64 + 2 + 2 + 4 + 4 + 4 + 4;

/// Device name reported to the kernel
const DEVICE_NAME: &[u8] = b"Virtual input device";

/// Composite keyboard + mouse report descriptor
///
/// Two top-level collections: report 1 is the 8-byte boot keyboard report
/// (modifier bits plus six usage codes), report 2 the 7-byte mouse report
/// (button bits, 16-bit relative X/Y, 8-bit wheel). The keyboard report
/// layout and the evdev table in [`crate::keymap`] are two halves of one
/// contract.
pub const REPORT_DESCRIPTOR: [u8; 108] = [
    0x05, 0x01, 0x09, 0x06, 0xa1, 0x01, 0x85, 0x01, 0x05, 0x07, 0x19,
    0xe0, 0x29, 0xe7, 0x15, 0x00, 0x25, 0x01, 0x75, 0x01, 0x95, 0x08,
    0x81, 0x02, 0x95, 0x06, 0x75, 0x08, 0x15, 0x00, 0x26, 0xdd, 0x00,
    0x05, 0x07, 0x19, 0x00, 0x29, 0xdd, 0x81, 0x00, 0xc0, 0x05, 0x01,
    0x09, 0x02, 0xa1, 0x01, 0x85, 0x02, 0x09, 0x01, 0xa1, 0x00, 0x05,
    0x09, 0x19, 0x01, 0x29, 0x05, 0x15, 0x00, 0x25, 0x01, 0x95, 0x05,
    0x75, 0x01, 0x81, 0x02, 0x95, 0x01, 0x75, 0x03, 0x81, 0x01, 0x05,
    0x01, 0x09, 0x30, 0x09, 0x31, 0x16, 0x01, 0x80, 0x26, 0xff, 0x7f,
    0x75, 0x10, 0x95, 0x02, 0x81, 0x06, 0x09, 0x38, 0x15, 0x81, 0x25,
    0x7f, 0x75, 0x08, 0x95, 0x01, 0x81, 0x06, 0xc0, 0xc0,
];

/// Encode the CREATE2 event describing the composite device
#[must_use]
pub fn encode_create2() -> Vec<u8> {
    let mut event = Vec::with_capacity(CREATE2_RD_DATA_OFFSET + REPORT_DESCRIPTOR.len());
    event.extend_from_slice(&UHID_CREATE2.to_le_bytes());

    let mut name = [0u8; 128];
    name[..DEVICE_NAME.len()].copy_from_slice(DEVICE_NAME);
    event.extend_from_slice(&name);
    event.extend_from_slice(&[0u8; 64]); // phys
    event.extend_from_slice(&[0u8; 64]); // uniq

    event.extend_from_slice(&(REPORT_DESCRIPTOR.len() as u16).to_le_bytes());
    event.extend_from_slice(&BUS_USB.to_le_bytes());
    event.extend_from_slice(&0u32.to_le_bytes()); // vendor
    event.extend_from_slice(&0u32.to_le_bytes()); // product
    event.extend_from_slice(&0u32.to_le_bytes()); // version
    event.extend_from_slice(&0u32.to_le_bytes()); // country

    event.extend_from_slice(&REPORT_DESCRIPTOR);
    event
}

/// Encode an INPUT2 event carrying one HID report
#[must_use]
pub fn encode_input2(report: &[u8]) -> Vec<u8> {
    let mut event = Vec::with_capacity(6 + report.len());
    event.extend_from_slice(&UHID_INPUT2.to_le_bytes());
    event.extend_from_slice(&(report.len() as u16).to_le_bytes());
    event.extend_from_slice(report);
    event
}

/// Encode the bare INPUT2 event used to release stuck keys on focus loss
#[must_use]
pub fn encode_handsoff() -> [u8; 4] {
    UHID_INPUT2.to_le_bytes()
}

/// Encode the DESTROY event
#[must_use]
pub fn encode_destroy() -> [u8; 4] {
    UHID_DESTROY.to_le_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create2_layout() {
        let event = encode_create2();
        assert_eq!(event.len(), 280 + 108);
        assert_eq!(&event[..4], &[11, 0, 0, 0]);
        // name lands right after the type word
        assert_eq!(&event[4..4 + DEVICE_NAME.len()], DEVICE_NAME);
        // rd_size and bus sit after name/phys/uniq
        assert_eq!(&event[260..262], &108u16.to_le_bytes());
        assert_eq!(&event[262..264], &3u16.to_le_bytes());
        // descriptor blob is the tail
        assert_eq!(&event[280..], &REPORT_DESCRIPTOR);
    }

    #[test]
    fn test_input2_layout() {
        let event = encode_input2(&[1, 2, 3]);
        assert_eq!(&event[..4], &[12, 0, 0, 0]);
        assert_eq!(&event[4..6], &3u16.to_le_bytes());
        assert_eq!(&event[6..], &[1, 2, 3]);
    }

    #[test]
    fn test_bare_events() {
        assert_eq!(encode_handsoff(), [12, 0, 0, 0]);
        assert_eq!(encode_destroy(), [1, 0, 0, 0]);
    }
}
