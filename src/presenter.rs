//! Presenter contract
//!
//! The compositor client — surface creation, dmabuf import, viewport
//! scaling, event decoding — is an external collaborator. The client core
//! talks to it through this trait: a pollable event channel, window-event
//! dispatch, a one-time binding of the decoder's exported frames, and
//! show-by-index.

use std::io;
use std::os::fd::BorrowedFd;

use oriel_decode::DmabufFrame;
use tracing::debug;

/// Window events delivered back into the client core
///
/// Mirrors the compositor's event set; the client wires these to the
/// input forwarder and the shutdown flag.
pub trait WindowHooks {
    /// The user closed the window
    fn on_close(&mut self);
    /// Keyboard focus changed
    fn on_focus(&mut self, focused: bool);
    /// Key state change, evdev keycode
    fn on_key(&mut self, evdev_code: u32, pressed: bool);
    /// Relative pointer motion
    fn on_motion(&mut self, dx: i32, dy: i32);
    /// Pointer button state change, evdev button code
    fn on_button(&mut self, button: u32, pressed: bool);
    /// Wheel step
    fn on_wheel(&mut self, delta: i32);
}

/// Zero-copy presentation surface
pub trait Presenter {
    /// Fd that becomes readable when compositor events are pending
    fn events_fd(&self) -> BorrowedFd<'_>;

    /// Drain pending compositor events, dispatching them into `hooks`
    fn process_events(&mut self, hooks: &mut dyn WindowHooks) -> io::Result<()>;

    /// One-time handoff of the decoder's exported frames, in pool order
    ///
    /// The presenter wraps each dmabuf frame once; afterwards pictures
    /// are addressed by pool index.
    fn bind_frames(&mut self, frames: &[&DmabufFrame]) -> io::Result<()>;

    /// Present the frame at `index`, cropped to `[left, top, right,
    /// bottom]` edges in luma samples
    fn show_frame(&mut self, index: usize, crop_rect: [u16; 4]) -> io::Result<()>;
}

/// Presenter without a compositor
///
/// Accepts frames and show requests and only counts them. Useful for
/// latency measurement runs and for driving the full client loop in
/// tests; its event channel never becomes readable.
pub struct HeadlessPresenter {
    // Pipe read end polled by the loop; the held write end keeps it quiet
    events_rx: std::os::fd::OwnedFd,
    _events_tx: std::os::fd::OwnedFd,
    bound_frames: usize,
    shown: Vec<(usize, [u16; 4])>,
}

impl HeadlessPresenter {
    /// Create a headless presenter
    pub fn new() -> io::Result<Self> {
        let (events_rx, events_tx) = nix::unistd::pipe()?;
        Ok(Self {
            events_rx,
            _events_tx: events_tx,
            bound_frames: 0,
            shown: Vec::new(),
        })
    }

    /// Number of frames handed over at binding time
    #[must_use]
    pub fn bound_frames(&self) -> usize {
        self.bound_frames
    }

    /// Recorded `(index, crop)` show requests
    #[must_use]
    pub fn shown(&self) -> &[(usize, [u16; 4])] {
        &self.shown
    }
}

impl Presenter for HeadlessPresenter {
    fn events_fd(&self) -> BorrowedFd<'_> {
        use std::os::fd::AsFd;
        self.events_rx.as_fd()
    }

    fn process_events(&mut self, _hooks: &mut dyn WindowHooks) -> io::Result<()> {
        Ok(())
    }

    fn bind_frames(&mut self, frames: &[&DmabufFrame]) -> io::Result<()> {
        self.bound_frames = frames.len();
        debug!(frames = frames.len(), "Bound decoder frames");
        Ok(())
    }

    fn show_frame(&mut self, index: usize, crop_rect: [u16; 4]) -> io::Result<()> {
        self.shown.push((index, crop_rect));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_records_shows() {
        let mut presenter = HeadlessPresenter::new().unwrap();
        presenter.bind_frames(&[]).unwrap();
        presenter.show_frame(1, [0, 0, 640, 480]).unwrap();
        presenter.show_frame(2, [0, 0, 640, 480]).unwrap();
        assert_eq!(presenter.shown(), &[(1, [0, 0, 640, 480]), (2, [0, 0, 640, 480])]);
    }

    #[test]
    fn test_headless_event_channel_stays_quiet() {
        use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

        let presenter = HeadlessPresenter::new().unwrap();
        let mut fds = [PollFd::new(presenter.events_fd(), PollFlags::POLLIN)];
        let ready = poll(&mut fds, PollTimeout::ZERO).unwrap();
        assert_eq!(ready, 0);
    }
}
