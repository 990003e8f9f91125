// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Decoded frames.
//!
//! A [`DecodedFrame`] is a shared handle to a hardware surface holding (or about to hold) a decoded
//! picture, together with the metadata the frame manager needs to order it for display. The
//! surface goes back to its pool once every holder of the frame has dropped it.

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use crate::backend::vaapi::surface_pool::PooledSurface;
use crate::backend::vaapi::VASurfaceID;

/// Coding type of a decoded frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FrameType {
    #[default]
    I,
    P,
    B,
}

/// Picture structure of a decoded frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FrameStructure {
    /// Progressive frame, or both fields coded as a frame.
    #[default]
    Frame,
    /// Only, or first, the top field.
    TopField,
    /// Only, or first, the bottom field.
    BottomField,
    /// Both fields decoded as separate field pictures into the same surface.
    FieldPair,
}

/// Metadata attached to a decoded frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameInfo {
    pub timestamp: u64,
    pub frame_type: FrameType,
    pub discontinuity: bool,
    pub structure: FrameStructure,
}

enum Backing {
    /// A surface lent by the surface pool.
    Surface(PooledSurface),
    /// A skipped picture, displayed using the surface of an already decoded frame.
    Skip(DecodedFrame),
}

pub struct VideoFrame {
    backing: Backing,
    info: Mutex<FrameInfo>,
}

/// Shared handle to a decoded frame.
pub type DecodedFrame = Arc<VideoFrame>;

impl VideoFrame {
    pub(crate) fn new(surface: PooledSurface) -> DecodedFrame {
        Arc::new(Self {
            backing: Backing::Surface(surface),
            info: Default::default(),
        })
    }

    /// Creates a skip frame displaying the same picture as `frame`.
    ///
    /// The skip frame is a P frame with no discontinuity, and keeps `frame` (or the frame `frame`
    /// itself duplicates) alive for as long as it exists.
    pub(crate) fn new_skip(frame: &DecodedFrame, timestamp: u64) -> DecodedFrame {
        let real_frame = match &frame.backing {
            Backing::Skip(real) => Arc::clone(real),
            Backing::Surface(_) => Arc::clone(frame),
        };

        Arc::new(Self {
            backing: Backing::Skip(real_frame),
            info: Mutex::new(FrameInfo {
                timestamp,
                frame_type: FrameType::P,
                discontinuity: false,
                structure: FrameStructure::Frame,
            }),
        })
    }

    fn lock_info(&self) -> MutexGuard<'_, FrameInfo> {
        self.info.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the id of the hardware surface holding the picture.
    pub fn surface_id(&self) -> VASurfaceID {
        match &self.backing {
            Backing::Surface(surface) => surface.id(),
            Backing::Skip(real) => real.surface_id(),
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.backing, Backing::Skip(_))
    }

    /// For skip frames, the decoded frame whose surface is being reused.
    pub fn real_frame(&self) -> Option<&DecodedFrame> {
        match &self.backing {
            Backing::Skip(real) => Some(real),
            Backing::Surface(_) => None,
        }
    }

    pub fn info(&self) -> FrameInfo {
        *self.lock_info()
    }

    pub fn timestamp(&self) -> u64 {
        self.lock_info().timestamp
    }

    pub fn frame_type(&self) -> FrameType {
        self.lock_info().frame_type
    }

    pub fn discontinuity(&self) -> bool {
        self.lock_info().discontinuity
    }

    pub fn structure(&self) -> FrameStructure {
        self.lock_info().structure
    }

    pub(crate) fn set_frame_type(&self, frame_type: FrameType) {
        self.lock_info().frame_type = frame_type;
    }

    pub(crate) fn set_structure(&self, structure: FrameStructure) {
        self.lock_info().structure = structure;
    }

    /// Stamps the timing information of the first picture decoded into this frame.
    pub(crate) fn set_timing(&self, timestamp: u64, discontinuity: bool) {
        let mut info = self.lock_info();
        info.timestamp = timestamp;
        info.discontinuity = discontinuity;
    }
}

impl Debug for VideoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFrame")
            .field("surface_id", &self.surface_id())
            .field("skipped", &self.is_skipped())
            .field("info", &self.info())
            .finish()
    }
}
