//! Input forwarder
//!
//! Tracks keyboard and mouse-button state as bitsets and turns every state
//! change into a HID report written to the virtual device. Writes drain
//! partial writes and retry on interruption, so a report either reaches
//! the device whole or the forwarder fails — and a forwarding failure is
//! fatal for the session.

use std::io::Write;

use tracing::debug;

use crate::error::Result;
use crate::keymap::{BTN_LEFT, BTN_MIDDLE, BTN_RIGHT, EVDEV_TO_HID};
use crate::uhid;

/// Keyboard report id
const REPORT_ID_KEYBOARD: u8 = 0x01;
/// Mouse report id
const REPORT_ID_MOUSE: u8 = 0x02;
/// First HID modifier usage (Left Ctrl)
const HID_MODIFIER_BASE: u8 = 0xe0;

/// Forwards local input to a virtual HID device
///
/// `W` is the UHID device node (or any sink in tests). Creating the
/// forwarder registers the composite device; dropping it unregisters.
pub struct InputForwarder<W: Write> {
    sink: W,
    /// 256 key bits, indexed by `evdev_code >> 6` / `evdev_code & 63`
    key_state: [u64; 4],
    /// Mouse buttons: bit 0 left, bit 1 right, bit 2 middle
    button_state: u8,
}

impl<W: Write> InputForwarder<W> {
    /// Register the composite keyboard + mouse device on `sink`
    pub fn new(mut sink: W) -> Result<Self> {
        sink.write_all(&uhid::encode_create2())?;
        debug!("Registered virtual input device");
        Ok(Self { sink, key_state: [0; 4], button_state: 0 })
    }

    /// Apply a key state change
    ///
    /// No report is written when the state does not actually change
    /// (key repeat from the compositor, for instance).
    pub fn key(&mut self, evdev_code: u32, pressed: bool) -> Result<()> {
        let row = (evdev_code >> 6 & 0x3) as usize;
        let shift = evdev_code & 0x3f;
        let updated =
            (self.key_state[row] & !(1u64 << shift)) | (u64::from(pressed) << shift);
        if updated == self.key_state[row] {
            return Ok(());
        }
        self.key_state[row] = updated;

        let report = self.keyboard_report();
        self.sink.write_all(&uhid::encode_input2(&report))?;
        Ok(())
    }

    /// Forward relative pointer motion
    pub fn mouse_move(&mut self, dx: i32, dy: i32) -> Result<()> {
        let report = self.mouse_report(dx, dy, 0);
        self.sink.write_all(&uhid::encode_input2(&report))?;
        Ok(())
    }

    /// Apply a mouse button state change
    ///
    /// Unknown buttons are ignored; repeated states write nothing.
    pub fn mouse_button(&mut self, button: u32, pressed: bool) -> Result<()> {
        let shift = match button {
            BTN_LEFT => 0,
            BTN_RIGHT => 1,
            BTN_MIDDLE => 2,
            _ => return Ok(()),
        };

        let updated = (self.button_state & !(1 << shift)) | (u8::from(pressed) << shift);
        if updated == self.button_state {
            return Ok(());
        }
        self.button_state = updated;

        let report = self.mouse_report(0, 0, 0);
        self.sink.write_all(&uhid::encode_input2(&report))?;
        Ok(())
    }

    /// Forward a wheel step
    pub fn mouse_wheel(&mut self, delta: i32) -> Result<()> {
        let report = self.mouse_report(0, 0, delta);
        self.sink.write_all(&uhid::encode_input2(&report))?;
        Ok(())
    }

    /// Release stuck keys on focus loss
    ///
    /// Clears the keyboard state and emits a bare input event; later
    /// reports reflect only the newly observed state.
    pub fn handsoff(&mut self) -> Result<()> {
        self.key_state = [0; 4];
        self.sink.write_all(&uhid::encode_handsoff())?;
        Ok(())
    }

    /// Build the 8-byte boot keyboard report from the current bitset
    fn keyboard_report(&self) -> [u8; 8] {
        let mut report = [0u8; 8];
        report[0] = REPORT_ID_KEYBOARD;
        let mut filled = 2;

        let mut code = 0usize;
        for row in &self.key_state {
            for shift in 0..64 {
                if row & (1u64 << shift) != 0 {
                    let usage = EVDEV_TO_HID[code];
                    if usage >= HID_MODIFIER_BASE {
                        report[1] |= 1 << (usage - HID_MODIFIER_BASE);
                    } else if usage != 0 && filled < report.len() {
                        report[filled] = usage;
                        filled += 1;
                    }
                }
                code += 1;
            }
        }
        report
    }

    /// Build the 7-byte mouse report
    fn mouse_report(&self, dx: i32, dy: i32, wheel: i32) -> [u8; 7] {
        let dx = (dx as i16).to_le_bytes();
        let dy = (dy as i16).to_le_bytes();
        [
            REPORT_ID_MOUSE,
            self.button_state,
            dx[0],
            dx[1],
            dy[0],
            dy[1],
            wheel as i8 as u8,
        ]
    }
}

impl<W: Write> Drop for InputForwarder<W> {
    fn drop(&mut self) {
        // Best effort: the kernel also cleans up when the fd closes.
        let _ = self.sink.write_all(&uhid::encode_destroy());
    }
}
