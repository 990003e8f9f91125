// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::cmp::min;

use anyhow::anyhow;
use log::debug;
use log::warn;

use crate::backend::vaapi::BufferType;
use crate::backend::vaapi::IQMatrix;
use crate::backend::vaapi::PictureParameter;
use crate::backend::vaapi::SliceParameter;
use crate::backend::vaapi::VAProfile;
use crate::codec::h264::dpb::Dpb;
use crate::codec::h264::parser::H264Data;
use crate::codec::h264::parser::PictureDataH264;
use crate::codec::h264::parser::Profile;
use crate::codec::h264::parser::SliceType;
use crate::codec::h264::picture::IQMatrixBufferH264;
use crate::codec::h264::picture::PictureH264;
use crate::codec::h264::picture::PictureParameterBufferH264;
use crate::codec::h264::picture::SliceParameterBufferH264;
use crate::codec::h264::picture::NUM_REFERENCE_FRAMES;
use crate::codec::h264::picture::VA_PICTURE_H264_BOTTOM_FIELD;
use crate::codec::h264::picture::VA_PICTURE_H264_TOP_FIELD;
use crate::decoder::format::FormatCodec;
use crate::decoder::format::FormatDecoder;
use crate::decoder::format::FrameContext;
use crate::decoder::DecodeError;
use crate::decoder::DecoderConfig;
use crate::decoder::Result;
use crate::decoder::StreamInfo;
use crate::parser::BitstreamParser;
use crate::parser::ParserKind;
use crate::parser::Slice;
use crate::video_frame::DecodedFrame;
use crate::video_frame::FrameStructure;
use crate::video_frame::FrameType;
use crate::Resolution;

/// Maximum number of surfaces held for reference or reordering.
const MAX_REFERENCE_SURFACES: usize = 20;
/// Surfaces needed on top of the reference frames: one being decoded, and two in the reordering
/// stage.
const NUM_EXTRA_REFERENCE_SURFACES: usize = 3;

/// H.264 codec state.
#[derive(Default)]
pub struct H264 {
    dpb: Dpb,
}

pub type H264Decoder = FormatDecoder<H264>;

fn picture_structure(pic: &PictureH264) -> FrameStructure {
    if pic.is_top_field() {
        FrameStructure::TopField
    } else if pic.is_bottom_field() {
        FrameStructure::BottomField
    } else {
        FrameStructure::Frame
    }
}

fn missing_reference(e: impl std::fmt::Display) -> DecodeError {
    DecodeError::DropFrame(e.to_string())
}

impl H264 {
    /// Writes the surface ids of the first `num_active` pictures of `list`.
    fn resolve_list(&self, list: &mut [PictureH264], num_active: usize) -> Result<()> {
        for pic in list.iter_mut().take(num_active).filter(|p| p.is_valid()) {
            self.dpb.resolve(pic).map_err(missing_reference)?;
        }

        Ok(())
    }

    /// Builds the reference frame list actually sent to the hardware: the pictures used by the
    /// reference lists of `slices`, with complementary fields merged into a single frame entry.
    fn active_reference_frames(
        &self,
        slices: &[Slice<SliceParameterBufferH264>],
    ) -> Result<[PictureH264; NUM_REFERENCE_FRAMES]> {
        let mut refs = [PictureH264::invalid(); NUM_REFERENCE_FRAMES];
        let mut num_refs = 0;

        for slice in slices {
            let lists = [&slice.params.ref_pic_list0, &slice.params.ref_pic_list1];
            for pic in lists
                .into_iter()
                .flat_map(|list| list.iter().take_while(|p| p.is_valid()))
            {
                if let Some(entry) = refs[..num_refs]
                    .iter_mut()
                    .find(|r| r.top_field_order_cnt == pic.top_field_order_cnt)
                {
                    let flags = entry.flags | pic.flags;
                    if flags & VA_PICTURE_H264_TOP_FIELD != 0
                        && flags & VA_PICTURE_H264_BOTTOM_FIELD != 0
                    {
                        entry.flags =
                            flags & !(VA_PICTURE_H264_TOP_FIELD | VA_PICTURE_H264_BOTTOM_FIELD);
                        entry.bottom_field_order_cnt = pic.bottom_field_order_cnt;
                    }
                    continue;
                }

                if num_refs == NUM_REFERENCE_FRAMES {
                    return Err(
                        anyhow!("more than {} reference frames", NUM_REFERENCE_FRAMES).into(),
                    );
                }

                let mut entry = *pic;
                self.dpb.resolve(&mut entry).map_err(missing_reference)?;
                refs[num_refs] = entry;
                num_refs += 1;
            }
        }

        Ok(refs)
    }

    /// Drops the DPB entries `picture` no longer references, and fills the surface ids of its
    /// references. Fails with `DropFrame` if one of them is not in the DPB.
    fn prepare_references(&mut self, picture: &mut PictureDataH264) -> Result<()> {
        let PictureDataH264 { pic_params, slices } = picture;

        let evicted = self.dpb.prune(&pic_params.reference_frames);
        if evicted > 0 {
            debug!("{} entries evicted from the DPB", evicted);
        }

        pic_params.reference_frames = self.active_reference_frames(slices)?;

        for slice in slices.iter_mut() {
            let params = &mut slice.params;

            let num_l0 = usize::from(params.num_ref_idx_l0_active_minus1) + 1;
            self.resolve_list(&mut params.ref_pic_list0, num_l0)?;

            if SliceType::from_raw(params.slice_type) == Some(SliceType::B) {
                let num_l1 = usize::from(params.num_ref_idx_l1_active_minus1) + 1;
                self.resolve_list(&mut params.ref_pic_list1, num_l1)?;
            }
        }

        Ok(())
    }

    /// Decodes one picture (a frame or a field) into `frame`.
    fn decode_picture(
        &mut self,
        ctx: &FrameContext,
        frame: &DecodedFrame,
        picture: PictureDataH264,
        iq_matrix: &IQMatrixBufferH264,
        first_picture: bool,
    ) -> Result<()> {
        let PictureDataH264 {
            mut pic_params,
            slices,
        } = picture;

        let slice_type = slices
            .first()
            .ok_or_else(|| anyhow!("picture has no slice"))?
            .params
            .slice_type;
        let frame_type = match SliceType::from_raw(slice_type) {
            Some(slice_type) => slice_type.frame_type(),
            None => {
                warn!("Unknown slice type {}, assuming I", slice_type);
                FrameType::I
            }
        };

        frame.set_frame_type(frame_type);
        if first_picture {
            frame.set_timing(ctx.timestamp(), ctx.discontinuity());
            frame.set_structure(picture_structure(&pic_params.curr_pic));
        } else {
            frame.set_structure(FrameStructure::FieldPair);
        }

        pic_params.curr_pic.picture_id = frame.surface_id();
        if pic_params.curr_pic.is_reference() {
            self.dpb.store(&pic_params.curr_pic, frame);
        }

        let mut buffers = Vec::with_capacity(2 + 2 * slices.len());
        buffers.push(BufferType::PictureParameter(PictureParameter::H264(
            pic_params,
        )));
        buffers.push(BufferType::IQMatrix(IQMatrix::H264(iq_matrix.clone())));
        for slice in slices {
            let data = slice.data()?;
            buffers.push(BufferType::SliceParameter(SliceParameter::H264(
                slice.params,
            )));
            buffers.push(BufferType::SliceData(data));
        }

        ctx.submit(frame, buffers)
    }
}

impl FormatCodec for H264 {
    type Data = H264Data;

    const KIND: ParserKind = ParserKind::H264;

    fn configure(
        &mut self,
        parser: &mut dyn BitstreamParser<H264Data>,
        config: &DecoderConfig,
    ) -> Result<StreamInfo> {
        let header = config
            .header
            .as_ref()
            .ok_or(DecodeError::MissingParameter("header"))?;

        parser.parse(header, true)?;
        let codec_data = parser.query()?.codec_data;

        let profile = if codec_data.profile_idc == Profile::Baseline as u8
            && !codec_data.constraint_set1_flag
        {
            VAProfile::H264Baseline
        } else {
            VAProfile::H264High
        };

        let num_surfaces = 1
            + config.extra_surfaces
            + min(
                usize::from(codec_data.num_ref_frames) + NUM_EXTRA_REFERENCE_SURFACES,
                MAX_REFERENCE_SURFACES,
            );

        let coded_resolution = Resolution::from(codec_data.coded_size());
        let picture_resolution = if config.picture_resolution.is_empty() {
            coded_resolution
        } else {
            config.picture_resolution
        };

        debug!(
            "H.264 stream: profile_idc {}, level_idc {}, {} reference frames, coded size {:?}",
            codec_data.profile_idc,
            codec_data.level_idc,
            codec_data.num_ref_frames,
            coded_resolution
        );

        Ok(StreamInfo::new(
            profile,
            num_surfaces,
            coded_resolution,
            picture_resolution,
        ))
    }

    fn process(&mut self, ctx: &FrameContext, data: H264Data) -> Result<()> {
        let H264Data {
            pictures,
            iq_matrix,
            ..
        } = data;

        let mut pictures = pictures.into_iter();
        let Some(mut first) = pictures.next() else {
            return Err(anyhow!("access unit contains no picture").into());
        };

        // A picture with missing references is dropped even when no surface is free.
        self.prepare_references(&mut first)?;
        let frame = ctx.new_frame()?;
        self.decode_picture(ctx, &frame, first, &iq_matrix, true)?;

        // The second field may reference the first one, so it is prepared once that is stored.
        for mut picture in pictures {
            self.prepare_references(&mut picture)?;
            self.decode_picture(ctx, &frame, picture, &iq_matrix, false)?;
        }

        ctx.output(frame)
    }

    fn reset(&mut self) {
        self.dpb.clear();
    }
}
