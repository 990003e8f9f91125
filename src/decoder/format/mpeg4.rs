// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::cmp::min;
use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::anyhow;
use log::debug;
use log::warn;

use crate::backend::vaapi::BufferType;
use crate::backend::vaapi::IQMatrix;
use crate::backend::vaapi::PictureParameter;
use crate::backend::vaapi::SliceParameter;
use crate::backend::vaapi::VAProfile;
use crate::backend::vaapi::VA_INVALID_SURFACE;
use crate::buffer::InputBuffer;
use crate::codec::mpeg4::Mpeg4Data;
use crate::codec::mpeg4::PictureDataMpeg4;
use crate::codec::mpeg4::VopType;
use crate::codec::ref_slots::RefSlots;
use crate::decoder::format::FormatCodec;
use crate::decoder::format::FormatDecoder;
use crate::decoder::format::FrameContext;
use crate::decoder::DecodeError;
use crate::decoder::DecoderConfig;
use crate::decoder::Result;
use crate::decoder::StreamInfo;
use crate::parser::BitstreamParser;
use crate::parser::ParserKind;
use crate::video_frame::DecodedFrame;
use crate::video_frame::FrameStructure;
use crate::video_frame::FrameType;
use crate::video_frame::VideoFrame;

/// Two references, the VOP being decoded, and one in the reordering stage.
const NUM_BASE_SURFACES: usize = 4;
const MAX_SURFACES: usize = 8;

/// A B-VOP of a packed frame, waiting for the N-VOP that will carry its timestamp.
struct PackedVop {
    picture: PictureDataMpeg4,
    /// The input buffer the packed frame was parsed from.
    _buffer: Option<Arc<InputBuffer>>,
}

/// MPEG-4 Part 2 codec state.
#[derive(Default)]
pub struct Mpeg4 {
    refs: RefSlots,
    /// Last decoded I or P frame, repeated by skipped VOPs.
    last_frame: Option<DecodedFrame>,
    /// Coding type of the last decoded I or P VOP.
    last_vop_coding_type: u8,
    /// B-VOPs of the last packed frame not decoded yet.
    packed: VecDeque<PackedVop>,
}

pub type Mpeg4Decoder = FormatDecoder<Mpeg4>;

impl Mpeg4 {
    fn flush_packed(&mut self) {
        if !self.packed.is_empty() {
            debug!("Dropping {} packed B-VOPs", self.packed.len());
            self.packed.clear();
        }
    }

    /// Repeats the last decoded frame for a VOP without data.
    fn output_skip_frame(&self, ctx: &FrameContext) -> Result<()> {
        let last_frame = self.last_frame.as_ref().ok_or_else(|| {
            DecodeError::DropFrame("skipped VOP before any decoded frame".into())
        })?;

        let skip_frame = VideoFrame::new_skip(last_frame, ctx.timestamp());
        debug!(
            "Skipped VOP at timestamp {}, repeating surface {}",
            ctx.timestamp(),
            skip_frame.surface_id()
        );

        ctx.output(skip_frame)
    }

    /// Checks the shape of a packed frame and queues its B-VOPs. Returns the leading VOP.
    fn queue_packed(
        &mut self,
        ctx: &FrameContext,
        mut pictures: Vec<PictureDataMpeg4>,
    ) -> Result<PictureDataMpeg4> {
        if !self.packed.is_empty() {
            return Err(anyhow!(
                "packed frame received while {} B-VOPs of the previous one are pending",
                self.packed.len()
            )
            .into());
        }

        let b_vops = pictures.split_off(1);
        let Some(first) = pictures.pop() else {
            return Err(anyhow!("empty packed frame").into());
        };

        if !matches!(first.vop_type(), Some(VopType::I) | Some(VopType::P)) {
            return Err(anyhow!("packed frame does not start with an I or P VOP").into());
        }
        if b_vops.iter().any(|p| p.vop_type() != Some(VopType::B)) {
            return Err(anyhow!("packed frame contains a VOP other than B after the first").into());
        }
        if !first.vop_coded || b_vops.iter().any(|p| !p.vop_coded) {
            return Err(anyhow!("packed frame contains a skipped VOP").into());
        }

        debug!("Packed frame with {} B-VOPs", b_vops.len());
        let buffer = ctx.pending_input().cloned();
        self.packed
            .extend(b_vops.into_iter().map(|picture| PackedVop {
                picture,
                _buffer: buffer.clone(),
            }));

        Ok(first)
    }

    /// Picks the VOP to decode for the parsed `data`, if any.
    fn next_vop(
        &mut self,
        ctx: &FrameContext,
        data: Mpeg4Data,
    ) -> Result<Option<PictureDataMpeg4>> {
        let mut pictures = data.pictures;

        if pictures.len() > 1 {
            return self.queue_packed(ctx, pictures).map(Some);
        }

        let Some(picture) = pictures.pop() else {
            debug!("No VOP at timestamp {}", ctx.timestamp());
            return Ok(None);
        };

        if self.packed.is_empty() {
            return Ok(Some(picture));
        }

        if !picture.vop_coded {
            // N-VOP: its timestamp goes to the next B-VOP of the packed frame.
            return Ok(self.packed.pop_front().map(|packed| packed.picture));
        }

        warn!(
            "Coded VOP while {} packed B-VOPs are pending",
            self.packed.len()
        );
        self.flush_packed();
        if picture.vop_type() == Some(VopType::B) {
            return Err(anyhow!("B-VOP right after a packed frame").into());
        }

        Ok(Some(picture))
    }

    fn decode_vop(&mut self, ctx: &FrameContext, picture: PictureDataMpeg4) -> Result<()> {
        let vop_type = match picture.vop_type() {
            Some(VopType::S) => return Err(anyhow!("sprite VOPs are not supported").into()),
            Some(vop_type) => vop_type,
            None => {
                return Err(anyhow!(
                    "unknown VOP coding type {}",
                    picture.pic_params.vop_coding_type
                )
                .into())
            }
        };

        if !picture.vop_coded {
            return self.output_skip_frame(ctx);
        }

        let PictureDataMpeg4 {
            mut pic_params,
            iq_matrix,
            slices,
            ..
        } = picture;

        let frame_type = match vop_type {
            VopType::I => {
                pic_params.forward_reference_picture = VA_INVALID_SURFACE;
                pic_params.backward_reference_picture = VA_INVALID_SURFACE;
                FrameType::I
            }
            VopType::P => {
                pic_params.forward_reference_picture = self
                    .refs
                    .last()
                    .ok_or_else(|| DecodeError::DropFrame("no reference for P-VOP".into()))?
                    .surface_id();
                pic_params.backward_reference_picture = VA_INVALID_SURFACE;
                FrameType::P
            }
            VopType::B => {
                let (Some(forward), Some(backward)) = (self.refs.first(), self.refs.second())
                else {
                    return Err(DecodeError::DropFrame(
                        "B-VOP without two references".into(),
                    ));
                };
                pic_params.forward_reference_picture = forward.surface_id();
                pic_params.backward_reference_picture = backward.surface_id();
                pic_params.backward_reference_vop_coding_type = self.last_vop_coding_type;
                FrameType::B
            }
            VopType::S => return Err(anyhow!("sprite VOPs are not supported").into()),
        };

        let frame = ctx.new_frame()?;
        frame.set_frame_type(frame_type);
        frame.set_timing(ctx.timestamp(), ctx.discontinuity());
        frame.set_structure(FrameStructure::Frame);

        let quant_type = pic_params.quant_type;
        let mut buffers = Vec::with_capacity(2 + 2 * slices.len());
        buffers.push(BufferType::PictureParameter(PictureParameter::MPEG4(
            pic_params,
        )));
        if quant_type {
            buffers.push(BufferType::IQMatrix(IQMatrix::MPEG4(iq_matrix)));
        }
        for slice in slices {
            let data = slice.data()?;
            buffers.push(BufferType::SliceParameter(SliceParameter::MPEG4(
                slice.params,
            )));
            buffers.push(BufferType::SliceData(data));
        }

        ctx.submit(&frame, buffers)?;

        if matches!(vop_type, VopType::I | VopType::P) {
            self.last_vop_coding_type = vop_type as u8;
            self.refs.push(&frame);
            self.last_frame = Some(DecodedFrame::clone(&frame));
        }

        ctx.output(frame)
    }
}

impl FormatCodec for Mpeg4 {
    type Data = Mpeg4Data;

    const KIND: ParserKind = ParserKind::Mpeg4;

    fn configure(
        &mut self,
        parser: &mut dyn BitstreamParser<Mpeg4Data>,
        config: &DecoderConfig,
    ) -> Result<StreamInfo> {
        let resolution = config.picture_resolution;
        if resolution.is_empty() {
            return Err(DecodeError::InvalidParam(format!(
                "invalid picture size {}x{}",
                resolution.width, resolution.height
            )));
        }

        let profile = match &config.header {
            Some(header) => {
                parser.parse(header, true)?;
                let codec_data = parser.query()?.codec_data;
                debug!(
                    "MPEG-4 stream: profile and level {:#x}, VOL size {}x{}",
                    codec_data.profile_and_level_indication,
                    codec_data.video_object_layer_width,
                    codec_data.video_object_layer_height
                );
                codec_data.va_profile()
            }
            None => {
                debug!("No VOL header, assuming advanced simple profile");
                VAProfile::MPEG4AdvancedSimple
            }
        };

        let num_surfaces = min(NUM_BASE_SURFACES + config.extra_surfaces, MAX_SURFACES);

        Ok(StreamInfo::new(
            profile,
            num_surfaces,
            resolution,
            resolution,
        ))
    }

    fn process(&mut self, ctx: &FrameContext, data: Mpeg4Data) -> Result<()> {
        let result = match self.next_vop(ctx, data) {
            Ok(Some(picture)) => self.decode_vop(ctx, picture),
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };

        if result.is_err() {
            self.flush_packed();
        }

        result
    }

    fn reset(&mut self) {
        self.refs.clear();
        self.last_frame = None;
        self.last_vop_coding_type = 0;
        self.packed.clear();
    }
}
