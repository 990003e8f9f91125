// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::Weak;

use crate::backend::vaapi::VASurfaceID;
use crate::video_frame::DecodedFrame;
use crate::video_frame::VideoFrame;
use crate::Resolution;

/// A VA Surface obtained from a [`SurfacePool`].
///
/// The surface will automatically be returned to its pool upon dropping, provided the pool still
/// exists and is still managing the surface.
#[derive(Debug)]
pub struct PooledSurface {
    id: VASurfaceID,
    pool: Weak<SurfacePool>,
}

impl PooledSurface {
    fn new(id: VASurfaceID, pool: &Arc<SurfacePool>) -> Self {
        Self {
            id,
            pool: Arc::downgrade(pool),
        }
    }

    pub fn id(&self) -> VASurfaceID {
        self.id
    }
}

impl Drop for PooledSurface {
    fn drop(&mut self) {
        // If the pool still exists...
        if let Some(pool) = self.pool.upgrade() {
            let mut inner = pool.lock();
            // ... and is still managing this surface, return it.
            if inner.managed_surfaces.contains(&self.id) {
                inner.surfaces.push_back(self.id);
                return;
            }
        }

        // The surface cannot be returned to the pool and can be gracefully dropped.
        log::debug!("Dropping stale surface: {}", self.id)
    }
}

#[derive(Debug, Default)]
struct SurfacePoolInner {
    /// Surfaces currently available for decoding.
    surfaces: VecDeque<VASurfaceID>,
    /// All the surfaces managed by this pool, including those currently lent out.
    managed_surfaces: BTreeSet<VASurfaceID>,
}

/// A fixed-size pool of hardware surfaces, shared between the decoder that created it and the
/// consumers of its frames.
///
/// Frames obtained with [`SurfacePool::get`] hold their surface until the last reference to them
/// is dropped, at which point the surface becomes available again.
#[derive(Debug)]
pub struct SurfacePool {
    coded_resolution: Resolution,
    inner: Mutex<SurfacePoolInner>,
}

impl SurfacePool {
    /// Create a new pool managing `surfaces`, all of them being of size `coded_resolution`.
    pub fn new(coded_resolution: Resolution, surfaces: &[VASurfaceID]) -> Arc<Self> {
        Arc::new(Self {
            coded_resolution,
            inner: Mutex::new(SurfacePoolInner {
                surfaces: surfaces.iter().copied().collect(),
                managed_surfaces: surfaces.iter().copied().collect(),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, SurfacePoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Gets a free surface from the pool, or `None` if all the surfaces are currently in use.
    pub fn get_surface(self: &Arc<Self>) -> Option<PooledSurface> {
        let id = self.lock().surfaces.pop_front()?;

        Some(PooledSurface::new(id, self))
    }

    /// Gets a new frame backed by a free surface of the pool.
    pub fn get(self: &Arc<Self>) -> Option<DecodedFrame> {
        self.get_surface().map(VideoFrame::new)
    }

    /// Retrieve the coded resolution of the pool's surfaces.
    pub fn coded_resolution(&self) -> Resolution {
        self.coded_resolution
    }

    /// Returns the number of surfaces currently available.
    pub fn num_surfaces_left(&self) -> usize {
        self.lock().surfaces.len()
    }

    /// Returns the total number of managed surfaces in this pool.
    pub fn num_managed_surfaces(&self) -> usize {
        self.lock().managed_surfaces.len()
    }

    /// Stop managing all surfaces. Surfaces still lent out will not be returned.
    ///
    /// Called once the underlying hardware surfaces have been destroyed.
    pub(crate) fn clear(&self) {
        let mut inner = self.lock();

        inner.surfaces.clear();
        inner.managed_surfaces.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surfaces_return_on_drop() {
        let pool = SurfacePool::new(Resolution::from((64, 64)), &[1, 2]);

        let a = pool.get().unwrap();
        let b = pool.get().unwrap();
        assert_eq!(a.surface_id(), 1);
        assert_eq!(b.surface_id(), 2);
        assert!(pool.get().is_none());

        let a2 = Arc::clone(&a);
        drop(a);
        assert_eq!(pool.num_surfaces_left(), 0);
        drop(a2);
        assert_eq!(pool.num_surfaces_left(), 1);

        let c = pool.get().unwrap();
        assert_eq!(c.surface_id(), 1);
        drop(b);
        drop(c);
        assert_eq!(pool.num_surfaces_left(), 2);
    }

    #[test]
    fn cleared_pool_does_not_recycle() {
        let pool = SurfacePool::new(Resolution::from((64, 64)), &[7]);

        let frame = pool.get().unwrap();
        pool.clear();
        drop(frame);

        assert_eq!(pool.num_managed_surfaces(), 0);
        assert_eq!(pool.num_surfaces_left(), 0);
        assert!(pool.get().is_none());
    }

    #[test]
    fn frames_outlive_pool() {
        let pool = SurfacePool::new(Resolution::from((64, 64)), &[3]);
        let frame = pool.get().unwrap();

        drop(pool);
        assert_eq!(frame.surface_id(), 3);
    }

    #[test]
    fn debug_lists_available_surfaces() {
        let pool = SurfacePool::new(Resolution::from((64, 64)), &[4, 5]);
        let _frame = pool.get().unwrap();

        let debug = format!("{:?}", pool);
        assert!(debug.contains("coded_resolution"), "{}", debug);
        assert!(debug.contains("surfaces: [5]"), "{}", debug);
    }
}
