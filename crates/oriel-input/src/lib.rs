//! # oriel-input
//!
//! Virtual HID input forwarding for the oriel streaming client.
//!
//! Local keyboard and pointer events arrive from the compositor as evdev
//! codes; this crate tracks their state and replays them on the server
//! side as a composite USB HID device through the kernel's UHID interface.
//!
//! - **[`forwarder`]** - state tracking and report emission
//! - **[`keymap`]** - the fixed 256-entry evdev→HID usage table
//! - **[`uhid`]** - UHID event encoding and the composite report
//!   descriptor
//!
//! # Example
//!
//! ```rust,ignore
//! use oriel_input::InputForwarder;
//!
//! let device = std::fs::OpenOptions::new()
//!     .read(true)
//!     .write(true)
//!     .open("/dev/uhid")?;
//! let mut input = InputForwarder::new(device)?;
//!
//! input.key(30, true)?;       // KEY_A down
//! input.mouse_move(-3, 5)?;
//! input.handsoff()?;          // focus lost: release everything
//! # Ok::<(), oriel_input::InputError>(())
//! ```

pub mod error;
pub mod forwarder;
pub mod keymap;
pub mod uhid;

pub use error::{InputError, Result};
pub use forwarder::InputForwarder;
pub use keymap::{BTN_LEFT, BTN_MIDDLE, BTN_RIGHT, EVDEV_TO_HID};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
