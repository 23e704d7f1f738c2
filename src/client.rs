//! Client core: protocol demuxer and event loop
//!
//! One thread multiplexes readiness over the transport socket, the
//! presenter's event channel and a periodic heartbeat timer, servicing
//! them in that order. The demuxer splits the framed stream into video
//! (decoder), audio (ring) and control (heartbeat echoes), keeping
//! per-keyframe statistics windows on the side.
//!
//! Shutdown is cooperative: signal handlers and window callbacks write a
//! reason into the [`ShutdownFlag`], which the loop consults as its
//! predicate. Teardown is by drop, in reverse acquisition order.

use std::io::{Read, Write};
use std::os::fd::AsFd;
use std::sync::atomic::{AtomicU32, Ordering};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::time::TimeSpec;
use nix::sys::timerfd::{ClockId, Expiration, TimerFd, TimerFlags, TimerSetTimeFlags};
use tracing::{debug, error, info};

use oriel_audio::{AudioConfig, AudioFeed, AudioStream};
use oriel_decode::DecoderSession;
use oriel_input::InputForwarder;

use crate::buffer::StreamBuffer;
use crate::clock::monotonic_micros;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::presenter::{Presenter, WindowHooks};
use crate::proto::{self, RecordHeader, RecordType, HEADER_SIZE};
use crate::stats::{StatsSnapshot, StatsWindow};

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ShutdownReason {
    /// Interrupt or terminate: clean exit
    Interrupt = 1,
    /// Input forwarding failed: drain cleanly, exit non-zero
    Fault = 2,
}

/// One-shot shutdown request observed by the loop predicate
///
/// Wraps a process-lifetime atomic so an async signal handler can write
/// it directly; window callbacks use the same path.
#[derive(Debug, Clone, Copy)]
pub struct ShutdownFlag {
    cell: &'static AtomicU32,
}

impl ShutdownFlag {
    /// Wrap a process-lifetime cell
    #[must_use]
    pub const fn new(cell: &'static AtomicU32) -> Self {
        Self { cell }
    }

    /// Request shutdown
    pub fn request(&self, reason: ShutdownReason) {
        self.cell.store(reason as u32, Ordering::Relaxed);
    }

    /// Pending shutdown request, if any
    #[must_use]
    pub fn reason(&self) -> Option<ShutdownReason> {
        match self.cell.load(Ordering::Relaxed) {
            1 => Some(ShutdownReason::Interrupt),
            2 => Some(ShutdownReason::Fault),
            _ => None,
        }
    }
}

/// Keeps the audio engine alive for the lifetime of the client
pub type EngineHandle = Box<dyn std::any::Any>;

/// Called once, when the audio stream is configured, with the realtime
/// feed the engine's callback thread should consume
pub type EngineHook =
    Box<dyn FnOnce(AudioFeed) -> std::result::Result<EngineHandle, oriel_audio::AudioError>>;

/// The streaming client
///
/// `T` is the transport (a connected TCP socket in production), `P` the
/// presenter, `W` the virtual-HID sink.
pub struct Client<T, P, W>
where
    T: Read + Write + AsFd,
    P: Presenter,
    W: Write,
{
    transport: T,
    presenter: P,
    config: ClientConfig,
    shutdown: ShutdownFlag,

    buffer: StreamBuffer,
    decoder: DecoderSession,
    frames_bound: bool,

    input: Option<InputForwarder<W>>,
    audio: Option<AudioStream>,
    engine_hook: Option<EngineHook>,
    engine: Option<EngineHandle>,

    stats: StatsWindow,
    last_stats: Option<StatsSnapshot>,
}

impl<T, P, W> Client<T, P, W>
where
    T: Read + Write + AsFd,
    P: Presenter,
    W: Write,
{
    /// Create a client over a connected transport
    #[must_use]
    pub fn new(transport: T, presenter: P, config: ClientConfig, shutdown: ShutdownFlag) -> Self {
        let decoder = DecoderSession::new(config.render_node.clone(), config.pool_size);
        Self {
            transport,
            presenter,
            config,
            shutdown,
            buffer: StreamBuffer::new(),
            decoder,
            frames_bound: false,
            input: None,
            audio: None,
            engine_hook: None,
            engine: None,
            stats: StatsWindow::new(),
            last_stats: None,
        }
    }

    /// Register the virtual HID device and forward input to it
    pub fn attach_input(&mut self, sink: W) -> Result<()> {
        self.input = Some(InputForwarder::new(sink)?);
        Ok(())
    }

    /// Install the hook that starts the audio engine once the stream
    /// format is known
    pub fn set_engine_hook(&mut self, hook: EngineHook) {
        self.engine_hook = Some(hook);
    }

    /// Most recent statistics snapshot, when collection is enabled
    #[must_use]
    pub fn last_stats(&self) -> Option<&StatsSnapshot> {
        self.last_stats.as_ref()
    }

    /// Run the event loop until shutdown, peer close or failure
    ///
    /// Returns `Ok(())` for the clean exits (signal, peer close); every
    /// error is fatal and already torn down by the time it propagates.
    pub fn run(&mut self) -> Result<()> {
        let timer = TimerFd::new(ClockId::CLOCK_MONOTONIC, TimerFlags::empty())?;
        timer.set(
            Expiration::Interval(TimeSpec::from_duration(self.config.ping_period)),
            TimerSetTimeFlags::empty(),
        )?;
        info!(period_ms = self.config.ping_period.as_millis() as u64, "Client loop running");

        while self.shutdown.reason().is_none() {
            let (transport_ready, events_ready, timer_ready) = {
                let mut fds = [
                    PollFd::new(self.transport.as_fd(), PollFlags::POLLIN),
                    PollFd::new(self.presenter.events_fd(), PollFlags::POLLIN),
                    PollFd::new(timer.as_fd(), PollFlags::POLLIN),
                ];
                match poll(&mut fds, PollTimeout::NONE) {
                    Err(Errno::EINTR) => continue,
                    Err(err) => return Err(ClientError::Os(err)),
                    Ok(0) => continue,
                    Ok(_) => {}
                }
                (ready(&fds[0]), ready(&fds[1]), ready(&fds[2]))
            };

            if transport_ready && !self.service_transport()? {
                info!("Server closed connection");
                return Ok(());
            }
            if events_ready {
                self.service_events()?;
            }
            if timer_ready {
                self.service_timer(&timer)?;
            }
        }

        match self.shutdown.reason() {
            Some(ShutdownReason::Fault) => Err(ClientError::Forwarding),
            _ => Ok(()),
        }
    }

    /// Append from the transport and demux complete records
    ///
    /// Returns false when the peer closed the stream.
    fn service_transport(&mut self) -> Result<bool> {
        if self.buffer.append_from(&mut self.transport)? == 0 {
            return Ok(false);
        }

        loop {
            let Some(header) = proto::parse_header(self.buffer.data()) else {
                break;
            };
            if self.buffer.len() < header.record_len() {
                break;
            }
            self.dispatch(header)?;
            self.buffer.discard(header.record_len());
        }
        Ok(true)
    }

    fn dispatch(&mut self, header: RecordHeader) -> Result<()> {
        let payload = &self.buffer.data()[HEADER_SIZE..header.record_len()];
        let now = monotonic_micros();

        match header.kind {
            RecordType::Misc => {
                if let Some(origin) = proto::heartbeat_echo(payload) {
                    self.stats.record_ping(now.saturating_sub(origin));
                }
            }

            RecordType::Video => {
                if let Some(output) = self.decoder.decode(payload)? {
                    if !self.frames_bound {
                        if let Some(frames) = self.decoder.frames() {
                            self.presenter.bind_frames(&frames)?;
                            self.frames_bound = true;
                        }
                    }
                    self.presenter
                        .show_frame(output.surface_index, output.crop_rect)?;
                }

                self.stats.record_video(now, header.payload_len, header.latency_us);
                if header.is_keyframe() {
                    let engine_latency = self.audio.as_ref().map(AudioStream::latency_micros);
                    if let Some(snapshot) = self.stats.finish(now, engine_latency) {
                        if self.config.collect_stats {
                            info!(
                                ping_us = snapshot.ping_us,
                                video_kbps = snapshot.video_kbps,
                                audio_kbps = snapshot.audio_kbps,
                                video_latency_us = snapshot.video_latency_us,
                                audio_latency_us = snapshot.audio_latency_us,
                                "Stream statistics"
                            );
                            self.last_stats = Some(snapshot);
                        }
                    }
                }
            }

            RecordType::Audio => {
                if header.is_keyframe() {
                    // The first audio record declares the format; later
                    // reconfiguration is unsupported and ignored.
                    if self.audio.is_some() || self.config.audio_ring_samples == 0 {
                        return Ok(());
                    }
                    let format = AudioConfig::parse(payload)?;
                    info!(rate = format.rate, channels = format.channels.len(), "Audio configured");
                    let (stream, feed) =
                        oriel_audio::stream(format, self.config.audio_ring_samples);
                    if let Some(hook) = self.engine_hook.take() {
                        self.engine = Some(hook(feed)?);
                    }
                    self.audio = Some(stream);
                    return Ok(());
                }

                let Some(audio) = self.audio.as_mut() else {
                    return Ok(());
                };
                audio.push(payload);
                self.stats.record_audio(now, header.payload_len, header.latency_us);
            }

            RecordType::Unknown(kind) => {
                debug!(kind, size = header.payload_len, "Skipping unknown record");
            }
        }
        Ok(())
    }

    fn service_events(&mut self) -> Result<()> {
        let mut hooks = Hooks {
            input: self.input.as_mut(),
            shutdown: self.shutdown,
        };
        self.presenter.process_events(&mut hooks)?;
        Ok(())
    }

    fn service_timer(&mut self, timer: &TimerFd) -> Result<()> {
        timer.wait()?;
        let record = proto::encode_heartbeat(monotonic_micros());
        self.transport.write_all(&record)?;
        Ok(())
    }
}

fn ready(fd: &PollFd<'_>) -> bool {
    fd.revents().is_some_and(|revents| !revents.is_empty())
}

/// Window-event dispatch into the input forwarder and the shutdown flag
struct Hooks<'a, W: Write> {
    input: Option<&'a mut InputForwarder<W>>,
    shutdown: ShutdownFlag,
}

impl<W: Write> Hooks<'_, W> {
    fn forward(&mut self, action: impl FnOnce(&mut InputForwarder<W>) -> oriel_input::Result<()>) {
        let Some(input) = self.input.as_mut() else {
            return;
        };
        if let Err(err) = action(input) {
            error!(%err, "Failed to forward input");
            self.shutdown.request(ShutdownReason::Fault);
        }
    }
}

impl<W: Write> WindowHooks for Hooks<'_, W> {
    fn on_close(&mut self) {
        info!("Window closed");
        self.shutdown.request(ShutdownReason::Interrupt);
    }

    fn on_focus(&mut self, focused: bool) {
        if focused {
            return;
        }
        // Focus loss releases held keys on the server side
        self.forward(InputForwarder::handsoff);
    }

    fn on_key(&mut self, evdev_code: u32, pressed: bool) {
        self.forward(|input| input.key(evdev_code, pressed));
    }

    fn on_motion(&mut self, dx: i32, dy: i32) {
        self.forward(|input| input.mouse_move(dx, dy));
    }

    fn on_button(&mut self, button: u32, pressed: bool) {
        self.forward(|input| input.mouse_button(button, pressed));
    }

    fn on_wheel(&mut self, delta: i32) {
        self.forward(|input| input.mouse_wheel(delta));
    }
}
