// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Format decoders.
//!
//! [`FormatDecoder`] implements everything the H.264, VC-1 and MPEG-4 decoders have in common:
//! the lifecycle, the feeding of input buffers to the parser, the retention of these buffers until
//! their frame has been decoded, and the hardware session. The codec-specific part, turning the
//! parsed data of a complete frame into hardware submissions and decoded frames, is provided by a
//! type implementing [`FormatCodec`].
//!
//! So for instance, the H.264 decoder has the following type:
//!
//! ```text
//! let decoder: FormatDecoder<H264>;
//! ```

pub mod h264;
pub mod mpeg4;
pub mod vc1;

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use anyhow::Context;
use log::debug;
use log::error;
use log::warn;

use crate::backend::vaapi::decoder::VaapiBackend;
use crate::backend::vaapi::surface_pool::SurfacePool;
use crate::backend::vaapi::BufferType;
use crate::backend::vaapi::Display;
use crate::buffer::InputBuffer;
use crate::decoder::input_queue::InputQueue;
use crate::decoder::DecodeError;
use crate::decoder::DecodeParams;
use crate::decoder::DecoderConfig;
use crate::decoder::Result;
use crate::decoder::StreamInfo;
use crate::decoder::VideoDecoder;
use crate::frame_manager::FrameManager;
use crate::parser::BitstreamParser;
use crate::parser::ParseStatus;
use crate::parser::ParserKind;
use crate::parser::ParserLibrary;
use crate::video_frame::DecodedFrame;

/// Lifecycle state of a format decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FormatState {
    #[default]
    Uninitialized,
    /// The hardware session is up, no input has been received yet.
    Initialized,
    Decoding,
    /// Pending input and references have been dropped. Decoding can resume with any input.
    Flushed,
    /// End of stream has been signaled. Input is refused until the next flush.
    EndOfStream,
    Deinitialized,
}

/// Codec-specific part of a format decoder.
pub trait FormatCodec: Default + Send + 'static {
    /// Data returned by the parser for a complete frame or header.
    type Data: Send + 'static;

    /// Parser to open for this codec.
    const KIND: ParserKind;

    /// Hands the codec header of `config` to `parser` and derives the parameters of the hardware
    /// session from what it reports.
    fn configure(
        &mut self,
        parser: &mut dyn BitstreamParser<Self::Data>,
        config: &DecoderConfig,
    ) -> Result<StreamInfo>;

    /// Decodes the frame described by `data`, parsed from the input buffers of
    /// `ctx.timestamp()`.
    fn process(&mut self, ctx: &FrameContext, data: Self::Data) -> Result<()>;

    /// Drops all the references and pending pictures.
    fn reset(&mut self);
}

/// What a [`FormatCodec`] can use while processing a frame.
pub struct FrameContext<'a> {
    backend: &'a VaapiBackend,
    frame_manager: &'a dyn FrameManager,
    input_queue: &'a InputQueue,
    timestamp: u64,
    discontinuity: bool,
}

impl<'a> FrameContext<'a> {
    /// Timestamp of the frame being processed.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn discontinuity(&self) -> bool {
        self.discontinuity
    }

    pub fn stream_info(&self) -> &StreamInfo {
        self.backend.stream_info()
    }

    /// The oldest input buffer not released yet.
    pub fn pending_input(&self) -> Option<&Arc<InputBuffer>> {
        self.input_queue.front()
    }

    /// Gets a frame to decode into.
    pub fn new_frame(&self) -> Result<DecodedFrame> {
        self.backend.new_frame().ok_or(DecodeError::OutOfSurfaces)
    }

    /// Decodes one picture into `frame` and waits for the hardware to be done with it.
    pub fn submit(&self, frame: &DecodedFrame, buffers: Vec<BufferType>) -> Result<()> {
        self.backend.submit_picture(frame.surface_id(), buffers)?;
        Ok(())
    }

    /// Hands a complete frame to the frame manager.
    pub fn output(&self, frame: DecodedFrame) -> Result<()> {
        debug!("Outputting frame {:?}", frame);
        self.frame_manager
            .enqueue(frame)
            .context("while enqueuing frame")?;
        Ok(())
    }
}

/// Resources that only exist while the decoder is initialized.
struct Session<D> {
    parser: Box<dyn BitstreamParser<D>>,
    backend: VaapiBackend,
    frame_manager: Arc<dyn FrameManager>,
}

struct FormatInner<C: FormatCodec> {
    state: FormatState,
    session: Option<Session<C::Data>>,
    input_queue: InputQueue,
    /// Whether the parser holds part of a frame.
    parse_in_progress: bool,
    current_timestamp: u64,
    discontinuity: bool,
    codec: C,
}

impl<C: FormatCodec> Default for FormatInner<C> {
    fn default() -> Self {
        Self {
            state: Default::default(),
            session: None,
            input_queue: Default::default(),
            parse_in_progress: false,
            current_timestamp: 0,
            discontinuity: false,
            codec: Default::default(),
        }
    }
}

impl<C: FormatCodec> FormatInner<C> {
    fn reset_input(&mut self) {
        self.input_queue.clear();
        self.parse_in_progress = false;
        self.current_timestamp = 0;
        self.discontinuity = false;
    }

    /// Retrieves the frame the parser just completed and decodes it, then releases the input
    /// buffers of the current timestamp whatever the outcome.
    fn complete_frame(&mut self) -> Result<()> {
        let session = self.session.as_mut().ok_or(DecodeError::NotInitialized)?;

        let result = match session.parser.query() {
            Ok(data) => {
                let ctx = FrameContext {
                    backend: &session.backend,
                    frame_manager: session.frame_manager.as_ref(),
                    input_queue: &self.input_queue,
                    timestamp: self.current_timestamp,
                    discontinuity: self.discontinuity,
                };
                self.codec.process(&ctx, data)
            }
            Err(e) => Err(e.into()),
        };

        self.parse_in_progress = false;
        self.input_queue.release(self.current_timestamp);

        result
    }

    /// Feeds one buffer to the parser, decoding the frame it completes if any.
    fn decode_buffer(&mut self, buffer: &Arc<InputBuffer>) -> Result<()> {
        let session = self.session.as_mut().ok_or(DecodeError::NotInitialized)?;

        let status = session.parser.parse(buffer.data(), false)?;
        self.input_queue
            .push(Arc::clone(buffer), self.current_timestamp);

        match status {
            ParseStatus::NeedMoreData => {
                self.parse_in_progress = true;
                Ok(())
            }
            ParseStatus::FrameComplete => self.complete_frame(),
        }
    }

    fn decode(&mut self, buffers: &[Arc<InputBuffer>], params: &DecodeParams) -> Result<()> {
        match self.state {
            FormatState::Uninitialized | FormatState::Deinitialized => {
                return Err(DecodeError::NotInitialized)
            }
            FormatState::EndOfStream => return Err(DecodeError::EndOfStream),
            _ => (),
        }

        if buffers.is_empty() {
            return Err(DecodeError::InvalidParam("no input buffer".into()));
        }

        // The previous call left an incomplete frame: a new timestamp means it is over.
        if self.parse_in_progress && params.timestamp != self.current_timestamp {
            debug!(
                "Timestamp changed from {} to {}, completing pending frame",
                self.current_timestamp, params.timestamp
            );
            if let Err(e) = self.complete_frame() {
                warn!(
                    "Failed to decode pending frame of timestamp {}: {}",
                    self.current_timestamp, e
                );
            }
        }

        self.current_timestamp = params.timestamp;
        self.discontinuity = params.discontinuity;
        self.state = FormatState::Decoding;

        // Keep consuming the buffers after a failure so they all get released.
        let mut result = Ok(());
        for buffer in buffers {
            if let Err(e) = self.decode_buffer(buffer) {
                warn!(
                    "Error while decoding buffer of timestamp {}: {}",
                    self.current_timestamp, e
                );
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        result
    }

    /// Drops the pending input and the references, then flushes the parser. The decoder is
    /// flushed even if the parser fails to.
    fn flush(&mut self) -> Result<()> {
        let session = self.session.as_mut().ok_or(DecodeError::NotInitialized)?;
        let result = session.parser.flush();

        self.codec.reset();
        self.reset_input();
        self.state = FormatState::Flushed;

        if let Err(e) = &result {
            warn!("Failed to flush parser: {}", e);
        }
        result?;
        Ok(())
    }

    fn eos(&mut self) -> Result<()> {
        if self.session.is_none() {
            return Err(DecodeError::NotInitialized);
        }

        let result = if self.parse_in_progress {
            self.complete_frame()
        } else {
            Ok(())
        };
        if let Err(e) = &result {
            error!("Failed to decode last frame: {}", e);
        }

        if let Some(session) = &self.session {
            session
                .frame_manager
                .eos()
                .context("while signaling end of stream")?;
        }
        self.state = FormatState::EndOfStream;

        result
    }

    /// Releases everything the decoder holds. Does nothing if the decoder is not initialized.
    fn deinitialize(&mut self) -> Result<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };

        // References go before the surfaces they live in.
        self.codec.reset();
        self.reset_input();

        let result = session.backend.destroy();
        if let Err(e) = session.parser.close() {
            warn!("Failed to close parser: {}", e);
        }
        self.state = FormatState::Deinitialized;

        result?;
        Ok(())
    }
}

/// A decoder for one stream of codec `C`.
///
/// All the operations serialize on an internal lock and can be called from any thread.
pub struct FormatDecoder<C: FormatCodec> {
    parser_library: Arc<dyn ParserLibrary<C::Data>>,
    inner: Mutex<FormatInner<C>>,
}

impl<C: FormatCodec> FormatDecoder<C> {
    /// Creates a decoder that will get its parser from `parser_library`.
    pub fn new(parser_library: Arc<dyn ParserLibrary<C::Data>>) -> Self {
        Self {
            parser_library,
            inner: Default::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FormatInner<C>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> FormatState {
        self.lock().state
    }

    #[cfg(test)]
    pub(crate) fn with_codec<R>(&self, f: impl FnOnce(&C) -> R) -> R {
        f(&self.lock().codec)
    }

    #[cfg(test)]
    pub(crate) fn num_pending_inputs(&self) -> usize {
        self.lock().input_queue.len()
    }
}

impl<C: FormatCodec> VideoDecoder for FormatDecoder<C> {
    fn initialize(
        &self,
        config: &DecoderConfig,
        frame_manager: Arc<dyn FrameManager>,
        display: Arc<dyn Display>,
    ) -> Result<Arc<SurfacePool>> {
        let mut inner = self.lock();
        if !matches!(
            inner.state,
            FormatState::Uninitialized | FormatState::Deinitialized
        ) {
            return Err(DecodeError::AlreadyInitialized);
        }

        let mut parser = self.parser_library.open(C::KIND)?;
        let mut codec = C::default();

        let backend = codec
            .configure(parser.as_mut(), config)
            .and_then(|stream_info| {
                debug!("Creating hardware session for {:?}", stream_info);
                Ok(VaapiBackend::new(display, &stream_info)?)
            });
        let backend = match backend {
            Ok(backend) => backend,
            Err(e) => {
                error!("Failed to initialize {:?} decoder: {}", C::KIND, e);
                if let Err(e) = parser.close() {
                    warn!("Failed to close parser: {}", e);
                }
                return Err(e);
            }
        };

        let surface_pool = Arc::clone(backend.surface_pool());

        let inner = &mut *inner;
        inner.reset_input();
        inner.codec = codec;
        inner.session = Some(Session {
            parser,
            backend,
            frame_manager,
        });
        inner.state = FormatState::Initialized;

        Ok(surface_pool)
    }

    fn decode(&self, buffers: &[Arc<InputBuffer>], params: &DecodeParams) -> Result<()> {
        self.lock().decode(buffers, params)
    }

    fn flush(&self) -> Result<()> {
        self.lock().flush()
    }

    fn eos(&self) -> Result<()> {
        self.lock().eos()
    }

    fn deinitialize(&self) -> Result<()> {
        self.lock().deinitialize()
    }
}

impl<C: FormatCodec> Drop for FormatDecoder<C> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = inner.deinitialize() {
            error!("Error while tearing down decoder: {}", e);
        }
    }
}
