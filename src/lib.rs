//! # oriel
//!
//! The client half of a low-latency desktop-streaming pair.
//!
//! oriel connects to a remote capture server over a single ordered TCP
//! stream, demultiplexes it into video, audio and control records, decodes
//! HEVC on the GPU straight into dmabuf-exportable surfaces, plays PCM
//! through a realtime engine, and forwards local input back to the server
//! as a virtual HID device.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                             oriel                                │
//! │                                                                  │
//! │  transport ─> StreamBuffer ─> demuxer ──┬─> oriel-decode ──┐     │
//! │       ▲                                 ├─> oriel-audio    │     │
//! │  heartbeat <── timer                    └─> ping echoes    │     │
//! │                                                            ▼     │
//! │  compositor events ─> oriel-input ─> /dev/uhid      presenter    │
//! │                                                   (dmabuf show)  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`buffer`]** - growable receive buffer with prefix discard
//! - **[`proto`]** - framed-record header and heartbeat encoding
//! - **[`client`]** - demuxer and the single-threaded poll loop
//! - **[`stats`]** - per-keyframe statistics windows
//! - **[`presenter`]** - compositor contract and a headless stand-in
//! - **[`config`]** - client configuration with builder
//!
//! The heavy lifting lives in the sub-crates:
//! [`oriel_decode`], [`oriel_audio`], [`oriel_input`].
//!
//! # Quick start
//!
//! ```rust,ignore
//! use oriel::{Client, ClientConfig, HeadlessPresenter, ShutdownFlag};
//! use std::net::TcpStream;
//! use std::sync::atomic::AtomicU32;
//!
//! static SHUTDOWN: AtomicU32 = AtomicU32::new(0);
//!
//! let transport = TcpStream::connect("192.168.1.10:9000")?;
//! transport.set_nodelay(true)?;
//!
//! let config = ClientConfig::builder()
//!     .collect_stats(true)
//!     .audio_ring_samples(4800)
//!     .build();
//!
//! let presenter = HeadlessPresenter::new()?;
//! let mut client = Client::new(
//!     transport,
//!     presenter,
//!     config,
//!     ShutdownFlag::new(&SHUTDOWN),
//! );
//! client.run()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod buffer;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod presenter;
pub mod proto;
pub mod stats;

pub use buffer::StreamBuffer;
pub use client::{Client, EngineHandle, EngineHook, ShutdownFlag, ShutdownReason};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{ClientError, Result};
pub use presenter::{HeadlessPresenter, Presenter, WindowHooks};
pub use proto::{RecordFlag, RecordHeader, RecordType};
pub use stats::{StatsSnapshot, StatsWindow};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
