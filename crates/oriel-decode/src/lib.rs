//! # oriel-decode
//!
//! HEVC Annex-B parsing and VA-API hardware decode for the oriel streaming
//! client.
//!
//! The crate covers the video half of the receive path:
//!
//! - **[`bitstream`]** - Annex-B bit reader with exponential-Golomb codes,
//!   NAL-unit segmentation and emulation-prevention-byte elision
//! - **[`parser`]** - SPS/PPS/slice-header parser for the restricted HEVC
//!   Main-profile subset the paired capture server emits
//! - **[`session`]** - decode session driving the accelerator: deferred
//!   initialisation, per-picture buffer upload and submission, reference
//!   bookkeeping
//! - **[`surface`]** - fixed surface pool with one-time DMA-BUF export and
//!   the busy/free discipline the reference window drives
//! - **[`va`]** - runtime-loaded VA-API binding (no link-time dependency
//!   on GPU userspace)
//!
//! # Pipeline
//!
//! ```text
//! Annex-B packet ─> bitstream ─> parser ─> session ─> VA-API
//!                                              │
//!                                              ▼
//!                                    surface pool ─> dmabuf frames
//!                                                    (to the presenter)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use oriel_decode::{DecoderSession, DEFAULT_POOL_SIZE};
//! use std::path::PathBuf;
//!
//! let mut session = DecoderSession::new(
//!     PathBuf::from("/dev/dri/renderD128"),
//!     DEFAULT_POOL_SIZE,
//! );
//!
//! // Feed framed video payloads as they arrive from the demuxer;
//! // the accelerator comes up when the stream headers do.
//! if let Some(output) = session.decode(&packet)? {
//!     presenter.show_frame(output.surface_index, output.crop_rect)?;
//! }
//! # Ok::<(), oriel_decode::DecodeError>(())
//! ```

pub mod bitstream;
pub mod error;
pub mod parser;
pub mod session;
pub mod surface;
pub mod va;

pub use bitstream::BitReader;
pub use error::{DecodeError, Result};
pub use parser::{NaluType, Parser, PictureState, SliceState};
pub use session::{DecodeOutput, DecoderSession, DEFAULT_POOL_SIZE};
pub use surface::{DmabufFrame, FramePlane, SurfacePool};
pub use va::VaDisplay;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
