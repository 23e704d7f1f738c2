//! Decoder surface pool with DMA-BUF export
//!
//! Creates the fixed set of NV12 surfaces a session decodes into, exports
//! each one as a DRM PRIME descriptor exactly once, and tracks the
//! busy/free flag the reference window drives. The presenter receives the
//! ordered frame list at pool creation and is addressed by index from then
//! on.

use std::os::fd::{AsFd, FromRawFd, OwnedFd};
use std::rc::Rc;

use tracing::debug;

use crate::error::{DecodeError, Result};
use crate::va::{DrmPrimeSurfaceDescriptor, VaDisplay, VaSurfaceId};

/// One plane of an exported frame
#[derive(Debug)]
pub struct FramePlane {
    /// Owned duplicate of the plane's dmabuf descriptor
    pub dmabuf: OwnedFd,
    pub pitch: u32,
    pub offset: u32,
    pub modifier: u64,
}

/// A decoded picture as the compositor sees it: dmabuf planes plus the
/// metadata needed to wrap them in a buffer object
#[derive(Debug)]
pub struct DmabufFrame {
    pub width: u32,
    pub height: u32,
    pub fourcc: u32,
    pub planes: Vec<FramePlane>,
}

struct Surface {
    id: VaSurfaceId,
    frame: DmabufFrame,
    locked: bool,
}

/// Fixed pool of decoder-usable surfaces
///
/// Surfaces are destroyed together with the pool; the exported dmabuf fds
/// close when their frames drop.
pub struct SurfacePool {
    display: Rc<VaDisplay>,
    surfaces: Vec<Surface>,
}

impl SurfacePool {
    /// Create `count` NV12 surfaces at the given luma dimensions and export
    /// each one
    pub fn new(display: Rc<VaDisplay>, width: u16, height: u16, count: usize) -> Result<Self> {
        let ids = display.create_surfaces(width, height, count)?;
        debug!(count, width, height, "Created decoder surface pool");

        let mut surfaces = Vec::with_capacity(count);
        for id in &ids {
            match export_frame(&display, *id) {
                Ok(frame) => surfaces.push(Surface { id: *id, frame, locked: false }),
                Err(err) => {
                    // Already-exported frames close their fds on drop; the
                    // VA surfaces go down in one call.
                    drop(surfaces);
                    let mut ids = ids.clone();
                    let _ = display.destroy_surfaces(&mut ids);
                    return Err(err);
                }
            }
        }
        Ok(Self { display, surfaces })
    }

    /// Number of surfaces in the pool
    #[must_use]
    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    /// Ordered exported frames, for the one-time presenter handoff
    #[must_use]
    pub fn frames(&self) -> Vec<&DmabufFrame> {
        self.surfaces.iter().map(|s| &s.frame).collect()
    }

    /// Accelerator surface id at `index`
    #[must_use]
    pub fn surface_id(&self, index: usize) -> VaSurfaceId {
        self.surfaces[index].id
    }

    /// Mark the surface handed to a decode call as busy
    pub fn lock(&mut self, index: usize) {
        mark_busy(&mut self.surfaces, index);
    }

    /// Release every surface the reference window has moved past
    pub fn unlock_all_except(&mut self, keep: usize) {
        release_all_except(&mut self.surfaces, keep);
    }

    /// Index of the first surface still marked busy, i.e. the one the next
    /// picture may legally reference
    #[must_use]
    pub fn locked_index(&self) -> Option<usize> {
        first_busy(&self.surfaces)
    }
}

impl Drop for SurfacePool {
    fn drop(&mut self) {
        let mut ids: Vec<VaSurfaceId> = self.surfaces.iter().map(|s| s.id).collect();
        if !ids.is_empty() {
            let _ = self.display.destroy_surfaces(&mut ids);
        }
    }
}

fn mark_busy(surfaces: &mut [Surface], index: usize) {
    surfaces[index].locked = true;
}

fn release_all_except(surfaces: &mut [Surface], keep: usize) {
    for (index, surface) in surfaces.iter_mut().enumerate() {
        if index != keep {
            surface.locked = false;
        }
    }
}

fn first_busy(surfaces: &[Surface]) -> Option<usize> {
    surfaces.iter().position(|s| s.locked)
}

/// Export a surface once and repack the descriptor into per-plane fds
fn export_frame(display: &VaDisplay, id: VaSurfaceId) -> Result<DmabufFrame> {
    let prime = display.export_surface(id)?;
    let objects = claim_objects(&prime);
    repack_frame(&prime, &objects)
}

/// Take ownership of every exported object fd so each closes exactly once
fn claim_objects(prime: &DrmPrimeSurfaceDescriptor) -> Vec<OwnedFd> {
    prime.objects[..prime.num_objects as usize]
        .iter()
        // SAFETY: the descriptor transfers ownership of these fds to us.
        .map(|object| unsafe { OwnedFd::from_raw_fd(object.fd) })
        .collect()
}

/// Duplicate the object fds per plane, the way the compositor consumes
/// them, carrying each plane's pitch, offset and format modifier
fn repack_frame(
    prime: &DrmPrimeSurfaceDescriptor,
    objects: &[OwnedFd],
) -> Result<DmabufFrame> {
    let layer = &prime.layers[0];
    let mut planes = Vec::with_capacity(layer.num_planes as usize);
    for plane in 0..layer.num_planes as usize {
        let object_index = layer.object_index[plane] as usize;
        if object_index >= objects.len() {
            return Err(DecodeError::unsupported(
                "PRIME descriptor references a missing object",
            ));
        }
        planes.push(FramePlane {
            dmabuf: objects[object_index].as_fd().try_clone_to_owned()?,
            pitch: layer.pitch[plane],
            offset: layer.offset[plane],
            modifier: prime.objects[object_index].drm_format_modifier,
        });
    }

    Ok(DmabufFrame {
        width: prime.width,
        height: prime.height,
        fourcc: prime.fourcc,
        planes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::va::{DrmPrimeLayer, DrmPrimeObject, VA_FOURCC_NV12};
    use std::os::fd::AsRawFd;

    fn test_surfaces(count: usize) -> Vec<Surface> {
        (0..count)
            .map(|i| Surface {
                id: i as VaSurfaceId,
                frame: DmabufFrame {
                    width: 640,
                    height: 480,
                    fourcc: VA_FOURCC_NV12,
                    planes: Vec::new(),
                },
                locked: false,
            })
            .collect()
    }

    fn busy_count(surfaces: &[Surface]) -> usize {
        surfaces.iter().filter(|s| s.locked).count()
    }

    #[test]
    fn test_decode_rotation_keeps_one_busy() {
        let mut surfaces = test_surfaces(3);

        // Submission then completion, the way a decode advances: at every
        // step exactly the current surface survives as the reference.
        for global in 0..7usize {
            let current = global % 3;
            mark_busy(&mut surfaces, current);
            release_all_except(&mut surfaces, current);

            assert_eq!(first_busy(&surfaces), Some(current));
            assert_eq!(busy_count(&surfaces), 1);
        }
    }

    #[test]
    fn test_release_clears_previous_reference() {
        let mut surfaces = test_surfaces(3);

        mark_busy(&mut surfaces, 0);
        // Next picture: surface 1 becomes current while 0 is still the
        // reference, then the decoder reports 1 as decoded.
        mark_busy(&mut surfaces, 1);
        assert_eq!(busy_count(&surfaces), 2);
        release_all_except(&mut surfaces, 1);

        assert!(!surfaces[0].locked);
        assert_eq!(first_busy(&surfaces), Some(1));
    }

    #[test]
    fn test_idle_pool_has_no_reference() {
        let mut surfaces = test_surfaces(3);
        assert_eq!(first_busy(&surfaces), None);

        mark_busy(&mut surfaces, 2);
        release_all_except(&mut surfaces, 0);
        assert_eq!(first_busy(&surfaces), None);
    }

    fn nv12_descriptor(object_index: u32) -> DrmPrimeSurfaceDescriptor {
        let mut prime = DrmPrimeSurfaceDescriptor {
            fourcc: VA_FOURCC_NV12,
            width: 640,
            height: 480,
            num_objects: 1,
            num_layers: 1,
            ..Default::default()
        };
        prime.objects[0] = DrmPrimeObject {
            fd: -1, // repacking reads fds from the claimed objects instead
            size: 640 * 480 * 3 / 2,
            drm_format_modifier: 0x0100_0000_0000_0002,
        };
        prime.layers[0] = DrmPrimeLayer {
            drm_format: VA_FOURCC_NV12,
            num_planes: 2,
            object_index: [object_index, object_index, 0, 0],
            offset: [0, 640 * 480, 0, 0],
            pitch: [640, 640, 0, 0],
        };
        prime
    }

    #[test]
    fn test_repack_duplicates_object_per_plane() {
        // Composed-layers NV12: one backing object, two planes into it.
        let (object, _keep) = nix::unistd::pipe().unwrap();
        let prime = nv12_descriptor(0);

        let frame = repack_frame(&prime, std::slice::from_ref(&object)).unwrap();
        assert_eq!(frame.width, 640);
        assert_eq!(frame.height, 480);
        assert_eq!(frame.fourcc, VA_FOURCC_NV12);
        assert_eq!(frame.planes.len(), 2);

        assert_eq!(frame.planes[0].offset, 0);
        assert_eq!(frame.planes[1].offset, 640 * 480);
        assert_eq!(frame.planes[0].pitch, 640);
        for plane in &frame.planes {
            assert_eq!(plane.modifier, 0x0100_0000_0000_0002);
            // Each plane owns its own duplicate of the object fd
            assert_ne!(plane.dmabuf.as_raw_fd(), object.as_raw_fd());
        }
        assert_ne!(
            frame.planes[0].dmabuf.as_raw_fd(),
            frame.planes[1].dmabuf.as_raw_fd()
        );
    }

    #[test]
    fn test_repack_rejects_missing_object() {
        let (object, _keep) = nix::unistd::pipe().unwrap();
        let prime = nv12_descriptor(1);

        assert!(matches!(
            repack_frame(&prime, std::slice::from_ref(&object)),
            Err(DecodeError::UnsupportedStream(_))
        ));
    }
}
