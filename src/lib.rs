// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Hardware-accelerated decoding of H.264, VC-1 and MPEG-4 Part 2 elementary streams.
//!
//! The decoders in this crate do not parse bitstreams nor decode pixels themselves. They drive an
//! external [bitstream parser](crate::parser) and a VA-style [hardware
//! accelerator](crate::backend::vaapi), keep track of reference pictures, and hand completed
//! frames to a [`FrameManager`](crate::frame_manager::FrameManager) for display reordering.
//!
//! [`decoder::format::FormatDecoder`] is the entry point: instantiate it for one of the codecs in
//! [`decoder::format`], then drive it through the [`decoder::VideoDecoder`] interface.

pub mod backend;
pub mod buffer;
pub mod codec;
pub mod decoder;
pub mod frame_manager;
pub mod parser;
pub mod video_frame;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Whether either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<(u32, u32)> for Resolution {
    fn from(value: (u32, u32)) -> Self {
        Self {
            width: value.0,
            height: value.1,
        }
    }
}

impl From<Resolution> for (u32, u32) {
    fn from(value: Resolution) -> Self {
        (value.width, value.height)
    }
}
