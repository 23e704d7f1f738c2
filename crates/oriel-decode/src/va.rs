//! VA-API runtime binding
//!
//! Loads `libva.so.2` / `libva-drm.so.2` at runtime, so the crate builds and
//! its tests run on hosts without GPU userspace installed. The ABI subset
//! declared here is exactly what an HEVC Main-profile decode session needs:
//! config/context/surface lifecycle, parameter and slice-data buffers, the
//! begin/render/end picture sequence, surface sync, and DRM PRIME 2 export.
//!
//! Struct layouts follow `va/va.h`, `va/va_dec_hevc.h` and
//! `va/va_drmcommon.h`; the driver reads these blobs directly, so the field
//! order and padding are load-bearing.

use std::ffi::c_void;
use std::fs::File;
use std::os::fd::AsRawFd;
use std::os::raw::{c_char, c_int, c_uint};
use std::path::Path;
use std::ptr;
use std::rc::Rc;

use libloading::Library;
use tracing::{debug, info};

use crate::error::{DecodeError, Result};

// ============================================================================
// ABI types and constants
// ============================================================================

pub type VaStatus = c_int;
pub type VaDisplayHandle = *mut c_void;
pub type VaConfigId = u32;
pub type VaContextId = u32;
pub type VaSurfaceId = u32;
pub type VaBufferId = u32;

pub const VA_STATUS_SUCCESS: VaStatus = 0;

/// `VAProfileHEVCMain`
pub const VA_PROFILE_HEVC_MAIN: c_int = 17;
/// `VAEntrypointVLD`
pub const VA_ENTRYPOINT_VLD: c_int = 1;

pub const VA_RT_FORMAT_YUV420: c_uint = 0x0000_0001;
pub const VA_PROGRESSIVE: c_int = 0x1;
pub const VA_FOURCC_NV12: u32 = u32::from_le_bytes(*b"NV12");
pub const VA_INVALID_SURFACE: u32 = 0xffff_ffff;

/// `VABufferType` members used by the decode path
pub const VA_PICTURE_PARAMETER_BUFFER_TYPE: c_int = 0;
pub const VA_SLICE_PARAMETER_BUFFER_TYPE: c_int = 4;
pub const VA_SLICE_DATA_BUFFER_TYPE: c_int = 5;

/// `VASurfaceAttribType`
pub const VA_SURFACE_ATTRIB_PIXEL_FORMAT: c_int = 1;
pub const VA_SURFACE_ATTRIB_USAGE_HINT: c_int = 8;
/// `VAGenericValueTypeInteger`
pub const VA_GENERIC_VALUE_TYPE_INTEGER: c_int = 1;

pub const VA_SURFACE_ATTRIB_USAGE_HINT_DECODER: i32 = 0x0000_0001;
pub const VA_SURFACE_ATTRIB_USAGE_HINT_EXPORT: i32 = 0x0000_0020;

pub const VA_SURFACE_ATTRIB_MEM_TYPE_DRM_PRIME_2: u32 = 0x4000_0000;
pub const VA_EXPORT_SURFACE_READ_ONLY: u32 = 0x0001;
pub const VA_EXPORT_SURFACE_COMPOSED_LAYERS: u32 = 0x0008;

pub const VA_SLICE_DATA_FLAG_ALL: u32 = 0x00;

/// `VAPictureHEVC.flags`: short-term reference, before current picture
pub const VA_PICTURE_HEVC_RPS_ST_CURR_BEFORE: u32 = 0x0000_0010;

// pic_fields bit positions (va_dec_hevc.h)
pub const PIC_CHROMA_FORMAT_IDC_SHIFT: u32 = 0; // 2 bits
pub const PIC_SEPARATE_COLOUR_PLANE: u32 = 1 << 2;
pub const PIC_PCM_ENABLED: u32 = 1 << 3;
pub const PIC_SCALING_LIST_ENABLED: u32 = 1 << 4;
pub const PIC_TRANSFORM_SKIP_ENABLED: u32 = 1 << 5;
pub const PIC_AMP_ENABLED: u32 = 1 << 6;
pub const PIC_STRONG_INTRA_SMOOTHING: u32 = 1 << 7;
pub const PIC_SIGN_DATA_HIDING: u32 = 1 << 8;
pub const PIC_CONSTRAINED_INTRA_PRED: u32 = 1 << 9;
pub const PIC_CU_QP_DELTA_ENABLED: u32 = 1 << 10;
pub const PIC_WEIGHTED_PRED: u32 = 1 << 11;
pub const PIC_WEIGHTED_BIPRED: u32 = 1 << 12;
pub const PIC_TRANSQUANT_BYPASS: u32 = 1 << 13;
pub const PIC_TILES_ENABLED: u32 = 1 << 14;
pub const PIC_ENTROPY_CODING_SYNC: u32 = 1 << 15;
pub const PIC_LOOP_FILTER_ACROSS_SLICES: u32 = 1 << 16;
pub const PIC_LOOP_FILTER_ACROSS_TILES: u32 = 1 << 17;
pub const PIC_PCM_LOOP_FILTER_DISABLED: u32 = 1 << 18;
pub const PIC_NO_PIC_REORDERING: u32 = 1 << 19;
pub const PIC_NO_BI_PRED: u32 = 1 << 20;

// slice_parsing_fields bit positions (va_dec_hevc.h)
pub const SP_LISTS_MODIFICATION: u32 = 1 << 0;
pub const SP_LONG_TERM_REF_PICS: u32 = 1 << 1;
pub const SP_SPS_TEMPORAL_MVP: u32 = 1 << 2;
pub const SP_CABAC_INIT_PRESENT: u32 = 1 << 3;
pub const SP_OUTPUT_FLAG_PRESENT: u32 = 1 << 4;
pub const SP_DEPENDENT_SLICE_SEGMENTS: u32 = 1 << 5;
pub const SP_SLICE_CHROMA_QP_OFFSETS: u32 = 1 << 6;
pub const SP_SAMPLE_ADAPTIVE_OFFSET: u32 = 1 << 7;
pub const SP_NUM_EXTRA_SLICE_HEADER_BITS_SHIFT: u32 = 8; // 3 bits
pub const SP_DEBLOCKING_FILTER_OVERRIDE: u32 = 1 << 11;
pub const SP_PPS_DISABLE_DEBLOCKING: u32 = 1 << 12;
pub const SP_SLICE_SEGMENT_HEADER_EXT: u32 = 1 << 13;
pub const SP_RAP_PIC: u32 = 1 << 14;
pub const SP_IDR_PIC: u32 = 1 << 15;
pub const SP_INTRA_PIC: u32 = 1 << 16;

// LongSliceFlags bit positions (va_dec_hevc.h)
pub const LSF_LAST_SLICE_OF_PIC: u32 = 1 << 0;
pub const LSF_DEPENDENT_SLICE_SEGMENT: u32 = 1 << 1;
pub const LSF_SLICE_TYPE_SHIFT: u32 = 2; // 2 bits
pub const LSF_COLOR_PLANE_ID_SHIFT: u32 = 4; // 2 bits
pub const LSF_SLICE_SAO_LUMA: u32 = 1 << 6;
pub const LSF_SLICE_SAO_CHROMA: u32 = 1 << 7;
pub const LSF_MVD_L1_ZERO: u32 = 1 << 8;
pub const LSF_CABAC_INIT: u32 = 1 << 9;
pub const LSF_SLICE_TEMPORAL_MVP: u32 = 1 << 10;
pub const LSF_SLICE_DEBLOCKING_DISABLED: u32 = 1 << 11;
pub const LSF_COLLOCATED_FROM_L0: u32 = 1 << 12;
pub const LSF_SLICE_LOOP_FILTER_ACROSS_SLICES: u32 = 1 << 13;

/// `VAGenericValue` payload union
#[repr(C)]
#[derive(Clone, Copy)]
pub union VaGenericValueUnion {
    pub i: i32,
    pub f: f32,
    pub p: *mut c_void,
}

/// `VAGenericValue`
#[repr(C)]
#[derive(Clone, Copy)]
pub struct VaGenericValue {
    pub value_type: c_int,
    pub value: VaGenericValueUnion,
}

/// `VASurfaceAttrib`
#[repr(C)]
#[derive(Clone, Copy)]
pub struct VaSurfaceAttrib {
    pub attrib_type: c_int,
    pub flags: u32,
    pub value: VaGenericValue,
}

impl VaSurfaceAttrib {
    /// Integer-typed attribute, flags left clear
    #[must_use]
    pub fn integer(attrib_type: c_int, value: i32) -> Self {
        Self {
            attrib_type,
            flags: 0,
            value: VaGenericValue {
                value_type: VA_GENERIC_VALUE_TYPE_INTEGER,
                value: VaGenericValueUnion { i: value },
            },
        }
    }
}

/// `VAPictureHEVC`
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct VaPictureHevc {
    pub picture_id: VaSurfaceId,
    pub pic_order_cnt: i32,
    pub flags: u32,
    pub va_reserved: [u32; 4],
}

/// `VAPictureParameterBufferHEVC`
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct PictureParameterBufferHevc {
    pub curr_pic: VaPictureHevc,
    pub reference_frames: [VaPictureHevc; 15],
    pub pic_width_in_luma_samples: u16,
    pub pic_height_in_luma_samples: u16,
    pub pic_fields: u32,
    pub sps_max_dec_pic_buffering_minus1: u8,
    pub bit_depth_luma_minus8: u8,
    pub bit_depth_chroma_minus8: u8,
    pub pcm_sample_bit_depth_luma_minus1: u8,
    pub pcm_sample_bit_depth_chroma_minus1: u8,
    pub log2_min_luma_coding_block_size_minus3: u8,
    pub log2_diff_max_min_luma_coding_block_size: u8,
    pub log2_min_transform_block_size_minus2: u8,
    pub log2_diff_max_min_transform_block_size: u8,
    pub log2_min_pcm_luma_coding_block_size_minus3: u8,
    pub log2_diff_max_min_pcm_luma_coding_block_size: u8,
    pub max_transform_hierarchy_depth_intra: u8,
    pub max_transform_hierarchy_depth_inter: u8,
    pub init_qp_minus26: i8,
    pub diff_cu_qp_delta_depth: u8,
    pub pps_cb_qp_offset: i8,
    pub pps_cr_qp_offset: i8,
    pub log2_parallel_merge_level_minus2: u8,
    pub num_tile_columns_minus1: u8,
    pub num_tile_rows_minus1: u8,
    pub column_width_minus1: [u16; 19],
    pub row_height_minus1: [u16; 21],
    pub slice_parsing_fields: u32,
    pub log2_max_pic_order_cnt_lsb_minus4: u8,
    pub num_short_term_ref_pic_sets: u8,
    pub num_long_term_ref_pic_sps: u8,
    pub num_ref_idx_l0_default_active_minus1: u8,
    pub num_ref_idx_l1_default_active_minus1: u8,
    pub pps_beta_offset_div2: i8,
    pub pps_tc_offset_div2: i8,
    pub num_extra_slice_header_bits: u8,
    pub st_rps_bits: u32,
    pub va_reserved: [u32; 8],
}

/// `VASliceParameterBufferHEVC`
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct SliceParameterBufferHevc {
    pub slice_data_size: u32,
    pub slice_data_offset: u32,
    pub slice_data_flag: u32,
    pub slice_data_byte_offset: u32,
    pub slice_segment_address: u32,
    pub ref_pic_list: [[u8; 15]; 2],
    pub long_slice_flags: u32,
    pub collocated_ref_idx: u8,
    pub num_ref_idx_l0_active_minus1: u8,
    pub num_ref_idx_l1_active_minus1: u8,
    pub slice_qp_delta: i8,
    pub slice_cb_qp_offset: i8,
    pub slice_cr_qp_offset: i8,
    pub slice_beta_offset_div2: i8,
    pub slice_tc_offset_div2: i8,
    pub luma_log2_weight_denom: u8,
    pub delta_chroma_log2_weight_denom: u8,
    pub delta_luma_weight_l0: [i8; 15],
    pub luma_offset_l0: [i8; 15],
    pub delta_chroma_weight_l0: [[i8; 2]; 15],
    pub chroma_offset_l0: [[i8; 2]; 15],
    pub delta_luma_weight_l1: [i8; 15],
    pub luma_offset_l1: [i8; 15],
    pub delta_chroma_weight_l1: [[i8; 2]; 15],
    pub chroma_offset_l1: [[i8; 2]; 15],
    pub five_minus_max_num_merge_cand: u8,
    pub num_entry_point_offsets: u16,
    pub entry_offset_to_subset_array: u16,
    pub slice_data_num_emu_prevn_bytes: u32,
    pub va_reserved: [u32; 2],
}

/// `VADRMPRIMESurfaceDescriptor.objects[n]`
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct DrmPrimeObject {
    pub fd: c_int,
    pub size: u32,
    pub drm_format_modifier: u64,
}

/// `VADRMPRIMESurfaceDescriptor.layers[n]`
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct DrmPrimeLayer {
    pub drm_format: u32,
    pub num_planes: u32,
    pub object_index: [u32; 4],
    pub offset: [u32; 4],
    pub pitch: [u32; 4],
}

/// `VADRMPRIMESurfaceDescriptor`
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct DrmPrimeSurfaceDescriptor {
    pub fourcc: u32,
    pub width: u32,
    pub height: u32,
    pub num_objects: u32,
    pub objects: [DrmPrimeObject; 4],
    pub num_layers: u32,
    pub layers: [DrmPrimeLayer; 4],
}

// ============================================================================
// Function table
// ============================================================================

type VaGetDisplayDrmFn = unsafe extern "C" fn(c_int) -> VaDisplayHandle;
type VaInitializeFn = unsafe extern "C" fn(VaDisplayHandle, *mut c_int, *mut c_int) -> VaStatus;
type VaTerminateFn = unsafe extern "C" fn(VaDisplayHandle) -> VaStatus;
type VaErrorStrFn = unsafe extern "C" fn(VaStatus) -> *const c_char;
type VaCreateConfigFn = unsafe extern "C" fn(
    VaDisplayHandle,
    c_int,
    c_int,
    *mut c_void,
    c_int,
    *mut VaConfigId,
) -> VaStatus;
type VaDestroyConfigFn = unsafe extern "C" fn(VaDisplayHandle, VaConfigId) -> VaStatus;
type VaCreateContextFn = unsafe extern "C" fn(
    VaDisplayHandle,
    VaConfigId,
    c_int,
    c_int,
    c_int,
    *mut VaSurfaceId,
    c_int,
    *mut VaContextId,
) -> VaStatus;
type VaDestroyContextFn = unsafe extern "C" fn(VaDisplayHandle, VaContextId) -> VaStatus;
type VaCreateSurfacesFn = unsafe extern "C" fn(
    VaDisplayHandle,
    c_uint,
    c_uint,
    c_uint,
    *mut VaSurfaceId,
    c_uint,
    *mut VaSurfaceAttrib,
    c_uint,
) -> VaStatus;
type VaDestroySurfacesFn =
    unsafe extern "C" fn(VaDisplayHandle, *mut VaSurfaceId, c_int) -> VaStatus;
type VaCreateBufferFn = unsafe extern "C" fn(
    VaDisplayHandle,
    VaContextId,
    c_int,
    c_uint,
    c_uint,
    *mut c_void,
    *mut VaBufferId,
) -> VaStatus;
type VaDestroyBufferFn = unsafe extern "C" fn(VaDisplayHandle, VaBufferId) -> VaStatus;
type VaBeginPictureFn =
    unsafe extern "C" fn(VaDisplayHandle, VaContextId, VaSurfaceId) -> VaStatus;
type VaRenderPictureFn =
    unsafe extern "C" fn(VaDisplayHandle, VaContextId, *mut VaBufferId, c_int) -> VaStatus;
type VaEndPictureFn = unsafe extern "C" fn(VaDisplayHandle, VaContextId) -> VaStatus;
type VaSyncSurfaceFn = unsafe extern "C" fn(VaDisplayHandle, VaSurfaceId) -> VaStatus;
type VaExportSurfaceHandleFn =
    unsafe extern "C" fn(VaDisplayHandle, VaSurfaceId, u32, u32, *mut c_void) -> VaStatus;

struct VaApi {
    get_display_drm: VaGetDisplayDrmFn,
    initialize: VaInitializeFn,
    terminate: VaTerminateFn,
    error_str: VaErrorStrFn,
    create_config: VaCreateConfigFn,
    destroy_config: VaDestroyConfigFn,
    create_context: VaCreateContextFn,
    destroy_context: VaDestroyContextFn,
    create_surfaces: VaCreateSurfacesFn,
    destroy_surfaces: VaDestroySurfacesFn,
    create_buffer: VaCreateBufferFn,
    destroy_buffer: VaDestroyBufferFn,
    begin_picture: VaBeginPictureFn,
    render_picture: VaRenderPictureFn,
    end_picture: VaEndPictureFn,
    sync_surface: VaSyncSurfaceFn,
    export_surface_handle: VaExportSurfaceHandleFn,
    // Keep the shared objects mapped for the lifetime of the table
    _libva: Library,
    _libva_drm: Library,
}

macro_rules! load_symbol {
    ($lib:expr, $name:literal) => {
        // SAFETY: the signature matches the libva prototype for $name.
        unsafe {
            *$lib.get(concat!($name, "\0").as_bytes()).map_err(|e| {
                DecodeError::RuntimeUnavailable(format!("missing symbol {}: {e}", $name))
            })?
        }
    };
}

impl VaApi {
    fn load() -> Result<Self> {
        // SAFETY: loading libva executes only its constructors.
        let libva = unsafe { Library::new("libva.so.2") }
            .map_err(|e| DecodeError::RuntimeUnavailable(format!("libva.so.2: {e}")))?;
        // SAFETY: as above.
        let libva_drm = unsafe { Library::new("libva-drm.so.2") }
            .map_err(|e| DecodeError::RuntimeUnavailable(format!("libva-drm.so.2: {e}")))?;

        Ok(Self {
            get_display_drm: load_symbol!(libva_drm, "vaGetDisplayDRM"),
            initialize: load_symbol!(libva, "vaInitialize"),
            terminate: load_symbol!(libva, "vaTerminate"),
            error_str: load_symbol!(libva, "vaErrorStr"),
            create_config: load_symbol!(libva, "vaCreateConfig"),
            destroy_config: load_symbol!(libva, "vaDestroyConfig"),
            create_context: load_symbol!(libva, "vaCreateContext"),
            destroy_context: load_symbol!(libva, "vaDestroyContext"),
            create_surfaces: load_symbol!(libva, "vaCreateSurfaces"),
            destroy_surfaces: load_symbol!(libva, "vaDestroySurfaces"),
            create_buffer: load_symbol!(libva, "vaCreateBuffer"),
            destroy_buffer: load_symbol!(libva, "vaDestroyBuffer"),
            begin_picture: load_symbol!(libva, "vaBeginPicture"),
            render_picture: load_symbol!(libva, "vaRenderPicture"),
            end_picture: load_symbol!(libva, "vaEndPicture"),
            sync_surface: load_symbol!(libva, "vaSyncSurface"),
            export_surface_handle: load_symbol!(libva, "vaExportSurfaceHandle"),
            _libva: libva,
            _libva_drm: libva_drm,
        })
    }
}

// ============================================================================
// Display wrapper
// ============================================================================

/// An initialised VA display over a DRM render node
///
/// All accelerator calls go through this handle; it is reference-counted
/// between the decoder session and the surface pool and terminated when the
/// last owner drops.
pub struct VaDisplay {
    api: VaApi,
    handle: VaDisplayHandle,
    _drm: File,
}

impl VaDisplay {
    /// Open a render node, get a DRM display and initialise VA-API
    pub fn open(render_node: &Path) -> Result<Rc<Self>> {
        let api = VaApi::load()?;
        let drm = File::options().read(true).write(true).open(render_node)?;

        // SAFETY: the fd stays valid for the lifetime of `drm`.
        let handle = unsafe { (api.get_display_drm)(drm.as_raw_fd()) };
        if handle.is_null() {
            return Err(DecodeError::RuntimeUnavailable(
                "vaGetDisplayDRM returned no display".into(),
            ));
        }

        let mut major = 0;
        let mut minor = 0;
        // SAFETY: handle was just obtained from vaGetDisplayDRM.
        let status = unsafe { (api.initialize)(handle, &mut major, &mut minor) };
        if status != VA_STATUS_SUCCESS {
            return Err(DecodeError::va("vaInitialize", status));
        }

        info!(%major, %minor, node = %render_node.display(), "Initialized VA-API display");
        Ok(Rc::new(Self { api, handle, _drm: drm }))
    }

    fn check(&self, call: &'static str, status: VaStatus) -> Result<()> {
        if status == VA_STATUS_SUCCESS {
            return Ok(());
        }
        // SAFETY: vaErrorStr returns a static string for any status.
        let detail = unsafe { std::ffi::CStr::from_ptr((self.api.error_str)(status)) };
        debug!(call, status, detail = ?detail, "VA-API call failed");
        Err(DecodeError::va(call, status))
    }

    /// Create a decode config for HEVC Main
    pub fn create_config(self: &Rc<Self>) -> Result<VaConfig> {
        let mut id = 0;
        // SAFETY: no attribute array is passed (null, 0).
        let status = unsafe {
            (self.api.create_config)(
                self.handle,
                VA_PROFILE_HEVC_MAIN,
                VA_ENTRYPOINT_VLD,
                ptr::null_mut(),
                0,
                &mut id,
            )
        };
        self.check("vaCreateConfig", status)?;
        Ok(VaConfig { display: Rc::clone(self), id })
    }

    /// Create a decode context at the given picture dimensions
    pub fn create_context(self: &Rc<Self>, config: &VaConfig, width: u16, height: u16) -> Result<VaContext> {
        let mut id = 0;
        // SAFETY: render target binding is deferred to per-picture calls.
        let status = unsafe {
            (self.api.create_context)(
                self.handle,
                config.id,
                c_int::from(width),
                c_int::from(height),
                VA_PROGRESSIVE,
                ptr::null_mut(),
                0,
                &mut id,
            )
        };
        self.check("vaCreateContext", status)?;
        Ok(VaContext { display: Rc::clone(self), id })
    }

    /// Create `count` NV12 surfaces hinted for decode and export
    pub fn create_surfaces(&self, width: u16, height: u16, count: usize) -> Result<Vec<VaSurfaceId>> {
        let mut attribs = [
            VaSurfaceAttrib::integer(VA_SURFACE_ATTRIB_PIXEL_FORMAT, VA_FOURCC_NV12 as i32),
            VaSurfaceAttrib::integer(
                VA_SURFACE_ATTRIB_USAGE_HINT,
                VA_SURFACE_ATTRIB_USAGE_HINT_DECODER | VA_SURFACE_ATTRIB_USAGE_HINT_EXPORT,
            ),
        ];
        let mut ids = vec![0; count];
        // SAFETY: ids has room for `count` surface ids.
        let status = unsafe {
            (self.api.create_surfaces)(
                self.handle,
                VA_RT_FORMAT_YUV420,
                c_uint::from(width),
                c_uint::from(height),
                ids.as_mut_ptr(),
                count as c_uint,
                attribs.as_mut_ptr(),
                attribs.len() as c_uint,
            )
        };
        self.check("vaCreateSurfaces", status)?;
        Ok(ids)
    }

    pub fn destroy_surfaces(&self, ids: &mut [VaSurfaceId]) -> Result<()> {
        // SAFETY: ids were returned by create_surfaces on this display.
        let status = unsafe {
            (self.api.destroy_surfaces)(self.handle, ids.as_mut_ptr(), ids.len() as c_int)
        };
        self.check("vaDestroySurfaces", status)
    }

    /// Upload a typed blob into a new buffer
    pub fn create_buffer(
        self: &Rc<Self>,
        context: &VaContext,
        buffer_type: c_int,
        call: &'static str,
        data: &[u8],
    ) -> Result<VaBuffer> {
        let mut id = 0;
        // SAFETY: libva copies `data` before returning.
        let status = unsafe {
            (self.api.create_buffer)(
                self.handle,
                context.id,
                buffer_type,
                data.len() as c_uint,
                1,
                data.as_ptr() as *mut c_void,
                &mut id,
            )
        };
        self.check(call, status)?;
        Ok(VaBuffer { display: Rc::clone(self), id })
    }

    pub fn begin_picture(&self, context: &VaContext, render_target: VaSurfaceId) -> Result<()> {
        // SAFETY: context and surface belong to this display.
        let status = unsafe { (self.api.begin_picture)(self.handle, context.id, render_target) };
        self.check("vaBeginPicture", status)
    }

    pub fn render_picture(&self, context: &VaContext, buffers: &mut [VaBufferId]) -> Result<()> {
        // SAFETY: buffer ids belong to this context.
        let status = unsafe {
            (self.api.render_picture)(
                self.handle,
                context.id,
                buffers.as_mut_ptr(),
                buffers.len() as c_int,
            )
        };
        self.check("vaRenderPicture", status)
    }

    pub fn end_picture(&self, context: &VaContext) -> Result<()> {
        // SAFETY: a picture was begun on this context.
        let status = unsafe { (self.api.end_picture)(self.handle, context.id) };
        self.check("vaEndPicture", status)
    }

    /// Wait for a submitted picture to finish (accelerator-infinite wait)
    pub fn sync_surface(&self, surface: VaSurfaceId) -> Result<()> {
        // SAFETY: surface belongs to this display.
        let status = unsafe { (self.api.sync_surface)(self.handle, surface) };
        self.check("vaSyncSurface", status)
    }

    /// Export a surface as a DRM PRIME 2 descriptor (read-only, composed)
    pub fn export_surface(&self, surface: VaSurfaceId) -> Result<DrmPrimeSurfaceDescriptor> {
        let mut descriptor = DrmPrimeSurfaceDescriptor::default();
        // SAFETY: descriptor matches the PRIME_2 layout the flag requests.
        let status = unsafe {
            (self.api.export_surface_handle)(
                self.handle,
                surface,
                VA_SURFACE_ATTRIB_MEM_TYPE_DRM_PRIME_2,
                VA_EXPORT_SURFACE_READ_ONLY | VA_EXPORT_SURFACE_COMPOSED_LAYERS,
                &mut descriptor as *mut _ as *mut c_void,
            )
        };
        self.check("vaExportSurfaceHandle", status)?;
        Ok(descriptor)
    }
}

impl Drop for VaDisplay {
    fn drop(&mut self) {
        // SAFETY: all dependent objects hold an Rc, so this runs last.
        unsafe {
            (self.api.terminate)(self.handle);
        }
    }
}

/// RAII decode config
pub struct VaConfig {
    display: Rc<VaDisplay>,
    id: VaConfigId,
}

impl Drop for VaConfig {
    fn drop(&mut self) {
        // SAFETY: id came from vaCreateConfig on this display.
        unsafe {
            (self.display.api.destroy_config)(self.display.handle, self.id);
        }
    }
}

/// RAII decode context
pub struct VaContext {
    display: Rc<VaDisplay>,
    id: VaContextId,
}

impl Drop for VaContext {
    fn drop(&mut self) {
        // SAFETY: id came from vaCreateContext on this display.
        unsafe {
            (self.display.api.destroy_context)(self.display.handle, self.id);
        }
    }
}

/// RAII parameter/slice-data buffer
///
/// Dropping destroys the buffer, which makes failure paths inside a picture
/// submission release exactly the buffers created so far, in reverse order.
pub struct VaBuffer {
    display: Rc<VaDisplay>,
    id: VaBufferId,
}

impl VaBuffer {
    #[must_use]
    pub fn id(&self) -> VaBufferId {
        self.id
    }
}

impl Drop for VaBuffer {
    fn drop(&mut self) {
        // SAFETY: id came from vaCreateBuffer on this display.
        unsafe {
            (self.display.api.destroy_buffer)(self.display.handle, self.id);
        }
    }
}

/// View a plain-old-data parameter block as its byte representation
///
/// # Safety
///
/// `T` must be `#[repr(C)]` with no padding-dependent semantics beyond what
/// the accelerator ABI defines; the returned slice borrows `value`.
pub unsafe fn as_bytes<T: Copy>(value: &T) -> &[u8] {
    std::slice::from_raw_parts(value as *const T as *const u8, std::mem::size_of::<T>())
}
