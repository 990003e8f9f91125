// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

pub mod format;
pub mod input_queue;

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

use crate::backend::vaapi::surface_pool::SurfacePool;
use crate::backend::vaapi::Display;
use crate::backend::vaapi::VAProfile;
use crate::backend::vaapi::VaError;
use crate::backend::vaapi::VA_RT_FORMAT_YUV420;
use crate::buffer::InputBuffer;
use crate::frame_manager::FrameManager;
use crate::parser::ParserError;
use crate::Resolution;

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Error returned by the decoders.
///
/// [`DecodeError::DropFrame`] is recoverable: the decoder is still usable, but no frame will be
/// produced for the input that triggered it. [`DecodeError::OutOfSurfaces`] means the client
/// should release frames before submitting more input.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),
    #[error("invalid parameter: {0}")]
    InvalidParam(String),
    #[error("decoder is not initialized")]
    NotInitialized,
    #[error("decoder is already initialized")]
    AlreadyInitialized,
    #[error("end of stream has been signaled, flush the decoder first")]
    EndOfStream,
    #[error("no free surface available to decode into")]
    OutOfSurfaces,
    #[error("frame dropped: {0}")]
    DropFrame(String),
    #[error(transparent)]
    Parser(#[from] ParserError),
    #[error(transparent)]
    Va(#[from] VaError),
    #[error(transparent)]
    Fail(#[from] anyhow::Error),
}

impl DecodeError {
    /// Whether this error only means that the current frame has been dropped.
    pub fn is_drop_frame(&self) -> bool {
        matches!(self, DecodeError::DropFrame(_))
    }
}

/// Stream parameters the hardware session is created from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    /// VA profile matching the stream.
    pub profile: VAProfile,
    /// VA RT format of the surfaces.
    pub rt_format: u32,
    /// Number of surfaces to allocate.
    pub num_surfaces: usize,
    /// Size of the surfaces.
    pub coded_resolution: Resolution,
    /// Size the decode context is created with.
    pub picture_resolution: Resolution,
}

impl StreamInfo {
    pub(crate) fn new(
        profile: VAProfile,
        num_surfaces: usize,
        coded_resolution: Resolution,
        picture_resolution: Resolution,
    ) -> Self {
        Self {
            profile,
            rt_format: VA_RT_FORMAT_YUV420,
            num_surfaces,
            coded_resolution,
            picture_resolution,
        }
    }
}

/// Configuration of a decoder, provided at initialization time.
#[derive(Debug, Clone, Default)]
pub struct DecoderConfig {
    /// Codec header: SPS/PPS for H.264, sequence header (or RCV struct C) for VC-1, VOL header for
    /// MPEG-4.
    pub header: Option<Bytes>,
    /// Size of the pictures as signaled by the container.
    pub picture_resolution: Resolution,
    /// Surfaces to allocate on top of what the codec needs, for frames held by the client.
    pub extra_surfaces: usize,
}

/// Per-call decode parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeParams {
    /// Presentation timestamp shared by all the buffers of the call.
    pub timestamp: u64,
    /// Whether the buffers follow a discontinuity (e.g. a seek).
    pub discontinuity: bool,
}

/// Common interface of the format decoders.
///
/// All methods are synchronous. Calls on one instance are serialized.
pub trait VideoDecoder: Send + Sync {
    /// Opens the bitstream parser, reads the codec header and creates the hardware session.
    /// Returns the pool frames will be decoded into.
    fn initialize(
        &self,
        config: &DecoderConfig,
        frame_manager: Arc<dyn FrameManager>,
        display: Arc<dyn Display>,
    ) -> Result<Arc<SurfacePool>>;

    /// Decodes `buffers`, which all belong to the same timestamp. Completed frames are handed to
    /// the frame manager.
    fn decode(&self, buffers: &[Arc<InputBuffer>], params: &DecodeParams) -> Result<()>;

    /// Drops all pending input and reference pictures. Frames already handed to the frame manager
    /// stay there until the client flushes it.
    fn flush(&self) -> Result<()>;

    /// Completes the pending frame, if any, and signals the end of the stream.
    fn eos(&self) -> Result<()>;

    /// Releases all hardware resources and closes the parser.
    fn deinitialize(&self) -> Result<()>;
}
