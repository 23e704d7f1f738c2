//! Hardware decode session
//!
//! Owns the accelerator config and context, consumes Annex-B packets, and
//! turns each supported slice into one picture submission: upload picture
//! parameters, slice parameters and slice data, then begin / render / end
//! picture and wait on the surface. Initialisation is deferred until the
//! first PPS has been parsed, because the surface pool needs the stream
//! dimensions.
//!
//! Decode is strictly sequential: one submission outstanding, synced before
//! the next. Reference handling is the restricted single-reference window —
//! the previous picture is the only legal reference of the next one.

use std::path::PathBuf;
use std::rc::Rc;

use tracing::info;

use crate::bitstream::BitReader;
use crate::error::{DecodeError, Result};
use crate::parser::{NaluType, Parser, PictureState, SliceState};
use crate::surface::{DmabufFrame, SurfacePool};
use crate::va::{self, VaConfig, VaContext, VaDisplay, VaSurfaceId};

/// Default number of surfaces in the decode pool
pub const DEFAULT_POOL_SIZE: usize = 3;

const MICROS_PER_SEC: u64 = 1_000_000;
const TIMING_LOG_PERIOD: u64 = 10 * MICROS_PER_SEC;

/// Result of a successful picture decode, addressed to the presenter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOutput {
    /// Pool index of the decoded surface
    pub surface_index: usize,
    /// Visible region as left, top, right, bottom edges in luma samples
    pub crop_rect: [u16; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    /// No stream headers seen yet
    Uninitialised,
    /// SPS and PPS parsed, accelerator objects not yet created
    HeaderSeen,
    /// Accelerator initialised, decoding
    Running,
    /// Terminal: a parse or accelerator failure closed the session
    Failed,
}

/// Frame counters and the pool rotation they drive
///
/// `global` indexes the pool (`global mod pool_size` is the current
/// surface); `local` is the picture order count within the running
/// IDR-started sequence.
#[derive(Debug, Clone, Copy)]
struct FrameCursor {
    global: u64,
    local: u64,
    pool_size: usize,
}

impl FrameCursor {
    fn new(pool_size: usize) -> Self {
        Self { global: 0, local: 0, pool_size }
    }

    fn current_index(&self) -> usize {
        (self.global % self.pool_size as u64) as usize
    }

    fn previous_index(&self) -> usize {
        ((self.global + self.pool_size as u64 - 1) % self.pool_size as u64) as usize
    }

    fn reset_sequence(&mut self) {
        self.local = 0;
    }

    fn advance(&mut self) {
        self.global += 1;
        self.local += 1;
    }
}

#[derive(Debug, Clone, Copy)]
struct TimingStats {
    min: u64,
    max: u64,
    sum: u64,
}

impl TimingStats {
    fn new() -> Self {
        Self { min: u64::MAX, max: 0, sum: 0 }
    }

    fn record(&mut self, value: u64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
    }
}

fn monotonic_micros() -> u64 {
    use nix::time::{clock_gettime, ClockId};
    match clock_gettime(ClockId::CLOCK_MONOTONIC) {
        Ok(ts) => ts.tv_sec() as u64 * MICROS_PER_SEC + ts.tv_nsec() as u64 / 1000,
        Err(_) => 0,
    }
}

/// Decoder session over one video stream
pub struct DecoderSession {
    render_node: PathBuf,
    parser: Parser,
    state: SessionState,
    pool_size: usize,

    // Created together once the first PPS is in; the display opens then
    // too, so a session costs nothing until video actually arrives
    display: Option<Rc<VaDisplay>>,
    config: Option<VaConfig>,
    context: Option<VaContext>,
    pool: Option<SurfacePool>,

    cursor: FrameCursor,

    recording_started: u64,
    frame_counter: u64,
    bitstream_bytes: u64,
    decode_timing: TimingStats,
}

impl DecoderSession {
    /// Create a session backed by the given DRM render node
    ///
    /// Nothing is opened yet; the display, config, context and surface
    /// pool all come up together once the stream headers arrive.
    #[must_use]
    pub fn new(render_node: PathBuf, pool_size: usize) -> Self {
        Self {
            render_node,
            parser: Parser::new(),
            state: SessionState::Uninitialised,
            pool_size,
            display: None,
            config: None,
            context: None,
            pool: None,
            cursor: FrameCursor::new(pool_size),
            recording_started: monotonic_micros(),
            frame_counter: 0,
            bitstream_bytes: 0,
            decode_timing: TimingStats::new(),
        }
    }

    /// Whether the accelerator has been initialised
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    /// Ordered exported frames for the one-time presenter handoff, once
    /// the pool exists
    #[must_use]
    pub fn frames(&self) -> Option<Vec<&DmabufFrame>> {
        self.pool.as_ref().map(SurfacePool::frames)
    }

    /// Decode one framed video payload (a whole access unit)
    ///
    /// Returns the presentation output of the last decoded slice, or
    /// `None` when the packet carried only parameter sets. Any error is
    /// terminal for the session.
    pub fn decode(&mut self, packet: &[u8]) -> Result<Option<DecodeOutput>> {
        if self.state == SessionState::Failed {
            return Err(DecodeError::SessionFailed);
        }
        let received = monotonic_micros();
        match self.decode_inner(packet) {
            Ok(output) => {
                if output.is_some() {
                    self.record_timing(received, packet.len());
                }
                Ok(output)
            }
            Err(err) => {
                self.state = SessionState::Failed;
                Err(err)
            }
        }
    }

    fn decode_inner(&mut self, packet: &[u8]) -> Result<Option<DecodeOutput>> {
        let mut bitstream = BitReader::new(packet);
        let mut output = None;

        while let Some(mut nalu) = bitstream.next_nalu()? {
            let nal_unit_type = Parser::parse_nalu_header(&mut nalu)?;
            match nal_unit_type {
                NaluType::SpsNut => self.parser.parse_sps(&mut nalu)?,
                NaluType::PpsNut => {
                    self.parser.parse_pps(&mut nalu)?;
                    if self.state == SessionState::Uninitialised {
                        self.state = SessionState::HeaderSeen;
                        self.initialise()?;
                    }
                }
                ty if ty.is_supported_slice() => {
                    if self.state != SessionState::Running {
                        return Err(DecodeError::MissingHeaders);
                    }
                    let slice = self.parser.parse_slice_header(&mut nalu, ty)?;
                    output = Some(self.decode_slice(&nalu, ty, &slice)?);
                }
                // VPS, AUD, other non-VCL units carry no state we need
                _ => {}
            }
        }
        Ok(output)
    }

    /// Open the display and create config, context and surface pool at
    /// the SPS dimensions
    fn initialise(&mut self) -> Result<()> {
        let pic = self.parser.picture();
        let width = pic.pic_width_in_luma_samples;
        let height = pic.pic_height_in_luma_samples;

        let display = VaDisplay::open(&self.render_node)?;
        let config = display.create_config()?;
        let context = display.create_context(&config, width, height)?;
        let pool = SurfacePool::new(Rc::clone(&display), width, height, self.pool_size)?;

        info!(width, height, pool = self.pool_size, "Decoder initialised");
        self.display = Some(display);
        self.config = Some(config);
        self.context = Some(context);
        self.pool = Some(pool);
        self.state = SessionState::Running;
        Ok(())
    }

    fn decode_slice(
        &mut self,
        nalu: &BitReader<'_>,
        nal_unit_type: NaluType,
        slice: &SliceState,
    ) -> Result<DecodeOutput> {
        if nal_unit_type.is_idr() {
            self.cursor.reset_sequence();
        }

        let current_index = self.cursor.current_index();
        let pool = self.pool.as_mut().ok_or(DecodeError::MissingHeaders)?;
        let current_id = pool.surface_id(current_index);
        pool.lock(current_index);

        let mut ppb = build_picture_params(
            self.parser.picture(),
            nal_unit_type,
            current_id,
            self.cursor.local,
        );
        let mut spb = build_slice_params(slice, nalu.len() as u32);

        // The previous picture is the one legal reference of a P slice.
        if self.cursor.local > 0 {
            let previous_id = pool.surface_id(self.cursor.previous_index());
            ppb.reference_frames[0] = va::VaPictureHevc {
                picture_id: previous_id,
                pic_order_cnt: (self.cursor.local - 1) as i32,
                flags: va::VA_PICTURE_HEVC_RPS_ST_CURR_BEFORE,
                va_reserved: [0; 4],
            };
            spb.ref_pic_list[0][0] = 0;
        }

        let display = self.display.as_ref().ok_or(DecodeError::MissingHeaders)?;
        let context = self.context.as_ref().ok_or(DecodeError::MissingHeaders)?;

        // Buffer guards destroy in reverse creation order on every path.
        let ppb_buffer = display.create_buffer(
            context,
            va::VA_PICTURE_PARAMETER_BUFFER_TYPE,
            "vaCreateBuffer(picture)",
            // SAFETY: PictureParameterBufferHevc is repr(C) POD.
            unsafe { va::as_bytes(&ppb) },
        )?;
        let spb_buffer = display.create_buffer(
            context,
            va::VA_SLICE_PARAMETER_BUFFER_TYPE,
            "vaCreateBuffer(slice)",
            // SAFETY: SliceParameterBufferHevc is repr(C) POD.
            unsafe { va::as_bytes(&spb) },
        )?;
        let sdb_buffer = display.create_buffer(
            context,
            va::VA_SLICE_DATA_BUFFER_TYPE,
            "vaCreateBuffer(data)",
            nalu.data(),
        )?;

        display.begin_picture(context, current_id)?;
        let mut buffers = [ppb_buffer.id(), spb_buffer.id(), sdb_buffer.id()];
        display.render_picture(context, &mut buffers)?;
        display.end_picture(context)?;
        display.sync_surface(current_id)?;

        pool.unlock_all_except(current_index);
        debug_assert_eq!(pool.locked_index(), Some(current_index));

        self.cursor.advance();
        Ok(DecodeOutput {
            surface_index: current_index,
            crop_rect: self.parser.picture().crop_rect,
        })
    }

    fn record_timing(&mut self, received: u64, packet_len: usize) {
        let decoded = monotonic_micros();
        self.decode_timing.record(decoded.saturating_sub(received));
        self.frame_counter += 1;
        self.bitstream_bytes += packet_len as u64;

        let period = decoded.saturating_sub(self.recording_started);
        if period < TIMING_LOG_PERIOD || self.frame_counter == 0 {
            return;
        }
        info!(
            decode_min_us = self.decode_timing.min,
            decode_avg_us = self.decode_timing.sum / self.frame_counter,
            decode_max_us = self.decode_timing.max,
            fps = self.frame_counter * MICROS_PER_SEC / period,
            bitstream_kbps = self.bitstream_bytes * MICROS_PER_SEC * 8 / period / 1024,
            "Decode timing window"
        );
        self.recording_started = decoded;
        self.decode_timing = TimingStats::new();
        self.frame_counter = 0;
        self.bitstream_bytes = 0;
    }
}

/// Populate the accelerator's picture parameter block
fn build_picture_params(
    pic: &PictureState,
    nal_unit_type: NaluType,
    current_id: VaSurfaceId,
    local_counter: u64,
) -> va::PictureParameterBufferHevc {
    let mut ppb = va::PictureParameterBufferHevc {
        curr_pic: va::VaPictureHevc {
            picture_id: current_id,
            pic_order_cnt: local_counter as i32,
            flags: 0,
            va_reserved: [0; 4],
        },
        pic_width_in_luma_samples: pic.pic_width_in_luma_samples,
        pic_height_in_luma_samples: pic.pic_height_in_luma_samples,
        sps_max_dec_pic_buffering_minus1: pic.sps_max_dec_pic_buffering_minus1,
        bit_depth_luma_minus8: pic.bit_depth_luma_minus8,
        bit_depth_chroma_minus8: pic.bit_depth_chroma_minus8,
        pcm_sample_bit_depth_luma_minus1: pic.pcm_sample_bit_depth_luma_minus1,
        pcm_sample_bit_depth_chroma_minus1: pic.pcm_sample_bit_depth_chroma_minus1,
        log2_min_luma_coding_block_size_minus3: pic.log2_min_luma_coding_block_size_minus3,
        log2_diff_max_min_luma_coding_block_size: pic.log2_diff_max_min_luma_coding_block_size,
        log2_min_transform_block_size_minus2: pic.log2_min_transform_block_size_minus2,
        log2_diff_max_min_transform_block_size: pic.log2_diff_max_min_transform_block_size,
        log2_min_pcm_luma_coding_block_size_minus3: pic.log2_min_pcm_luma_coding_block_size_minus3,
        max_transform_hierarchy_depth_intra: pic.max_transform_hierarchy_depth_intra,
        max_transform_hierarchy_depth_inter: pic.max_transform_hierarchy_depth_inter,
        init_qp_minus26: pic.init_qp_minus26,
        pps_cb_qp_offset: pic.pps_cb_qp_offset,
        pps_cr_qp_offset: pic.pps_cr_qp_offset,
        log2_parallel_merge_level_minus2: pic.log2_parallel_merge_level_minus2,
        log2_max_pic_order_cnt_lsb_minus4: pic.log2_max_pic_order_cnt_lsb_minus4,
        num_short_term_ref_pic_sets: pic.num_short_term_ref_pic_sets,
        num_ref_idx_l0_default_active_minus1: pic.num_ref_idx_l0_default_active_minus1,
        num_ref_idx_l1_default_active_minus1: pic.num_ref_idx_l1_default_active_minus1,
        pps_beta_offset_div2: pic.pps_beta_offset_div2,
        pps_tc_offset_div2: pic.pps_tc_offset_div2,
        st_rps_bits: pic.st_rps_bits,
        ..Default::default()
    };

    for reference in &mut ppb.reference_frames {
        reference.picture_id = va::VA_INVALID_SURFACE;
    }

    let mut pic_fields = 1 << va::PIC_CHROMA_FORMAT_IDC_SHIFT; // 4:2:0
    if pic.amp_enabled_flag {
        pic_fields |= va::PIC_AMP_ENABLED;
    }
    if pic.strong_intra_smoothing_enabled_flag {
        pic_fields |= va::PIC_STRONG_INTRA_SMOOTHING;
    }
    if pic.sign_data_hiding_enabled_flag {
        pic_fields |= va::PIC_SIGN_DATA_HIDING;
    }
    if pic.constrained_intra_pred_flag {
        pic_fields |= va::PIC_CONSTRAINED_INTRA_PRED;
    }
    if pic.transform_skip_enabled_flag {
        pic_fields |= va::PIC_TRANSFORM_SKIP_ENABLED;
    }
    if pic.transquant_bypass_enabled_flag {
        pic_fields |= va::PIC_TRANSQUANT_BYPASS;
    }
    if pic.pps_loop_filter_across_slices_enabled_flag {
        pic_fields |= va::PIC_LOOP_FILTER_ACROSS_SLICES;
    }
    // Accelerator contract: always on, although tiles are not
    pic_fields |= va::PIC_LOOP_FILTER_ACROSS_TILES;
    // No reordering and no bi-prediction in this subset
    pic_fields |= va::PIC_NO_PIC_REORDERING | va::PIC_NO_BI_PRED;
    ppb.pic_fields = pic_fields;

    let mut slice_parsing = 0u32;
    if pic.sample_adaptive_offset_enabled_flag {
        slice_parsing |= va::SP_SAMPLE_ADAPTIVE_OFFSET;
    }
    if pic.sps_temporal_mvp_enabled_flag {
        slice_parsing |= va::SP_SPS_TEMPORAL_MVP;
    }
    if pic.cabac_init_present_flag {
        slice_parsing |= va::SP_CABAC_INIT_PRESENT;
    }
    if pic.dependent_slice_segments_enabled_flag {
        slice_parsing |= va::SP_DEPENDENT_SLICE_SEGMENTS;
    }
    if nal_unit_type.is_rap() {
        slice_parsing |= va::SP_RAP_PIC;
    }
    if nal_unit_type.is_idr() {
        slice_parsing |= va::SP_IDR_PIC;
    }
    if nal_unit_type.is_irap() {
        slice_parsing |= va::SP_INTRA_PIC;
    }
    ppb.slice_parsing_fields = slice_parsing;

    ppb
}

/// Populate the accelerator's slice parameter block
fn build_slice_params(slice: &SliceState, nalu_size: u32) -> va::SliceParameterBufferHevc {
    let mut spb = va::SliceParameterBufferHevc {
        slice_data_size: nalu_size,
        slice_data_offset: 0,
        slice_data_flag: va::VA_SLICE_DATA_FLAG_ALL,
        slice_data_byte_offset: slice.slice_data_byte_offset,
        collocated_ref_idx: slice.collocated_ref_idx,
        num_ref_idx_l0_active_minus1: slice.num_ref_idx_l0_active_minus1,
        num_ref_idx_l1_active_minus1: slice.num_ref_idx_l1_active_minus1,
        slice_qp_delta: slice.slice_qp_delta,
        five_minus_max_num_merge_cand: slice.five_minus_max_num_merge_cand,
        slice_data_num_emu_prevn_bytes: slice.slice_data_emulation_bytes,
        ..Default::default()
    };

    // Reference lists start fully invalid; slot 0 is patched in for P
    // pictures by the caller.
    spb.ref_pic_list = [[0xff; 15]; 2];

    let mut flags = va::LSF_LAST_SLICE_OF_PIC;
    flags |= u32::from(slice.slice_type) << va::LSF_SLICE_TYPE_SHIFT;
    if slice.slice_sao_luma_flag {
        flags |= va::LSF_SLICE_SAO_LUMA;
    }
    if slice.slice_sao_chroma_flag {
        flags |= va::LSF_SLICE_SAO_CHROMA;
    }
    if slice.cabac_init_flag {
        flags |= va::LSF_CABAC_INIT;
    }
    if slice.slice_temporal_mvp_enabled_flag {
        flags |= va::LSF_SLICE_TEMPORAL_MVP;
    }
    if slice.collocated_from_l0_flag {
        flags |= va::LSF_COLLOCATED_FROM_L0;
    }
    if slice.slice_loop_filter_across_slices_enabled_flag {
        flags |= va::LSF_SLICE_LOOP_FILTER_ACROSS_SLICES;
    }
    spb.long_slice_flags = flags;

    spb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::SLICE_TYPE_I;

    fn picture_state() -> PictureState {
        PictureState {
            pic_width_in_luma_samples: 640,
            pic_height_in_luma_samples: 480,
            crop_rect: [0, 0, 640, 480],
            log2_max_pic_order_cnt_lsb_minus4: 4,
            sps_max_dec_pic_buffering_minus1: 1,
            sample_adaptive_offset_enabled_flag: true,
            sps_temporal_mvp_enabled_flag: true,
            pps_loop_filter_across_slices_enabled_flag: true,
            pcm_sample_bit_depth_luma_minus1: 0xff,
            pcm_sample_bit_depth_chroma_minus1: 0xff,
            log2_min_pcm_luma_coding_block_size_minus3: 253,
            ..Default::default()
        }
    }

    fn slice_state() -> SliceState {
        SliceState {
            slice_type: SLICE_TYPE_I,
            slice_sao_luma_flag: true,
            slice_sao_chroma_flag: true,
            collocated_from_l0_flag: true,
            collocated_ref_idx: 0xff,
            slice_data_byte_offset: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_cursor_rotation_identity() {
        let mut cursor = FrameCursor::new(3);
        for i in 0..10u64 {
            assert_eq!(cursor.current_index(), (i % 3) as usize);
            cursor.advance();
            // decoded_index == (global − 1) mod N after a decode
            assert_eq!(
                ((cursor.global - 1) % 3) as usize,
                (i % 3) as usize
            );
        }
    }

    #[test]
    fn test_cursor_idr_resets_local_only() {
        let mut cursor = FrameCursor::new(3);
        cursor.advance();
        cursor.advance();
        assert_eq!(cursor.local, 2);
        cursor.reset_sequence();
        assert_eq!(cursor.local, 0);
        assert_eq!(cursor.global, 2);
        assert_eq!(cursor.current_index(), 2);
    }

    #[test]
    fn test_cursor_previous_index_wraps() {
        let mut cursor = FrameCursor::new(3);
        cursor.advance(); // global = 1
        assert_eq!(cursor.previous_index(), 0);
        cursor.advance();
        cursor.advance(); // global = 3, current 0
        assert_eq!(cursor.previous_index(), 2);
    }

    #[test]
    fn test_idr_picture_params() {
        let ppb = build_picture_params(&picture_state(), NaluType::IdrWRadl, 42, 0);

        assert_eq!(ppb.curr_pic.picture_id, 42);
        assert_eq!(ppb.curr_pic.pic_order_cnt, 0);
        for reference in &ppb.reference_frames {
            assert_eq!(reference.picture_id, va::VA_INVALID_SURFACE);
        }
        assert_ne!(ppb.pic_fields & va::PIC_NO_PIC_REORDERING, 0);
        assert_ne!(ppb.pic_fields & va::PIC_NO_BI_PRED, 0);
        assert_ne!(ppb.pic_fields & va::PIC_LOOP_FILTER_ACROSS_TILES, 0);
        assert_eq!(ppb.pic_fields & 0b11, 1); // chroma_format_idc

        // IDR is RAP, IDR and intra all at once
        assert_ne!(ppb.slice_parsing_fields & va::SP_RAP_PIC, 0);
        assert_ne!(ppb.slice_parsing_fields & va::SP_IDR_PIC, 0);
        assert_ne!(ppb.slice_parsing_fields & va::SP_INTRA_PIC, 0);

        assert_eq!(ppb.pcm_sample_bit_depth_luma_minus1, 0xff);
        assert_eq!(ppb.log2_min_pcm_luma_coding_block_size_minus3, 253);
    }

    #[test]
    fn test_trailing_picture_params() {
        let ppb = build_picture_params(&picture_state(), NaluType::TrailR, 7, 3);

        assert_eq!(ppb.curr_pic.pic_order_cnt, 3);
        assert_eq!(ppb.slice_parsing_fields & va::SP_RAP_PIC, 0);
        assert_eq!(ppb.slice_parsing_fields & va::SP_IDR_PIC, 0);
        assert_eq!(ppb.slice_parsing_fields & va::SP_INTRA_PIC, 0);
        assert_ne!(ppb.slice_parsing_fields & va::SP_SPS_TEMPORAL_MVP, 0);
    }

    #[test]
    fn test_slice_params_defaults() {
        let spb = build_slice_params(&slice_state(), 128);

        assert_eq!(spb.slice_data_size, 128);
        assert_eq!(spb.slice_data_offset, 0);
        assert_eq!(spb.slice_data_byte_offset, 4);
        assert_eq!(spb.collocated_ref_idx, 0xff);
        assert!(spb.ref_pic_list.iter().flatten().all(|&e| e == 0xff));
        assert_ne!(spb.long_slice_flags & va::LSF_LAST_SLICE_OF_PIC, 0);
        assert_ne!(spb.long_slice_flags & va::LSF_COLLOCATED_FROM_L0, 0);
        assert_eq!(
            (spb.long_slice_flags >> va::LSF_SLICE_TYPE_SHIFT) & 0b11,
            u32::from(SLICE_TYPE_I)
        );
    }

    #[test]
    fn test_slice_params_emulation_bytes() {
        let mut slice = slice_state();
        slice.slice_data_emulation_bytes = 2;
        slice.slice_data_byte_offset = 9;
        let spb = build_slice_params(&slice, 64);
        assert_eq!(spb.slice_data_num_emu_prevn_bytes, 2);
        assert_eq!(spb.slice_data_byte_offset, 9);
    }
}
