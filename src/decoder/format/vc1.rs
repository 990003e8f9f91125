// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::cmp::min;

use anyhow::anyhow;
use log::debug;

use crate::backend::vaapi::BufferType;
use crate::backend::vaapi::PictureParameter;
use crate::backend::vaapi::SliceParameter;
use crate::backend::vaapi::VASurfaceID;
use crate::backend::vaapi::VA_INVALID_SURFACE;
use crate::codec::ref_slots::RefSlots;
use crate::codec::vc1::rcv_sequence_header;
use crate::codec::vc1::PictureDataVc1;
use crate::codec::vc1::PictureParameterBufferVc1;
use crate::codec::vc1::PictureType;
use crate::codec::vc1::Vc1Data;
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

/// Surfaces needed without B pictures: the reference, the picture being decoded, and one in the
/// reordering stage.
const NUM_BASE_SURFACES: usize = 3;
const MAX_REFERENCE_SURFACES: usize = 8;
/// A frame is at most a pair of field pictures.
const MAX_PICTURES_PER_FRAME: usize = 2;

/// VC-1 codec state.
#[derive(Default)]
pub struct Vc1 {
    refs: RefSlots,
    /// Last decoded I or P frame, repeated by skipped pictures.
    last_frame: Option<DecodedFrame>,
    has_b_frames: bool,
    loopfilter: bool,
}

pub type Vc1Decoder = FormatDecoder<Vc1>;

/// Reference picture of a VC-1 picture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Reference {
    Invalid,
    /// The surface the picture is decoded into.
    Own,
    Surface(VASurfaceID),
}

impl Reference {
    fn surface_id(self, own: VASurfaceID) -> VASurfaceID {
        match self {
            Reference::Invalid => VA_INVALID_SURFACE,
            Reference::Own => own,
            Reference::Surface(id) => id,
        }
    }
}

fn frame_type(picture_type: PictureType) -> FrameType {
    match picture_type {
        PictureType::I | PictureType::BI => FrameType::I,
        PictureType::P | PictureType::Skipped => FrameType::P,
        PictureType::B => FrameType::B,
    }
}

impl Vc1 {
    fn update_references(&mut self, frame: &DecodedFrame) {
        if self.has_b_frames {
            self.refs.push(frame);
        } else {
            self.refs.replace_single(frame);
        }
    }

    /// Repeats the last decoded frame for a skipped picture.
    fn output_skip_frame(&mut self, ctx: &FrameContext) -> Result<()> {
        let last_frame = self.last_frame.as_ref().ok_or_else(|| {
            DecodeError::DropFrame("skipped picture before any decoded frame".into())
        })?;

        let skip_frame = VideoFrame::new_skip(last_frame, ctx.timestamp());
        debug!(
            "Skipped picture at timestamp {}, repeating surface {}",
            ctx.timestamp(),
            skip_frame.surface_id()
        );

        self.update_references(&skip_frame);
        ctx.output(skip_frame)
    }

    /// Checks the type of the picture at `index` of a frame and finds its references. Fails with
    /// `DropFrame` if a reference has not been decoded.
    fn picture_references(
        &self,
        pic_params: &PictureParameterBufferVc1,
        index: usize,
    ) -> Result<(PictureType, Reference, Reference)> {
        let picture_type = PictureType::n(pic_params.picture_type)
            .ok_or_else(|| anyhow!("unknown picture type {}", pic_params.picture_type))?;

        match picture_type {
            PictureType::I => Ok((picture_type, Reference::Own, Reference::Own)),
            PictureType::P => {
                if pic_params.reference_distance_flag && pic_params.reference_distance != 0 {
                    return Err(anyhow!(
                        "reference distance {} is not supported",
                        pic_params.reference_distance
                    )
                    .into());
                }

                let mut forward = pic_params.forward_reference_picture;
                if index == 1 {
                    // Unless the second field predicts from the first one, its reference is in
                    // another frame.
                    if pic_params.num_reference_pictures != 1
                        && pic_params.reference_field_pic_indicator != 1
                    {
                        return Ok((picture_type, Reference::Own, Reference::Invalid));
                    }
                    forward = VA_INVALID_SURFACE;
                }

                if forward == VA_INVALID_SURFACE {
                    forward = self
                        .refs
                        .last()
                        .ok_or_else(|| {
                            DecodeError::DropFrame("no reference for P picture".into())
                        })?
                        .surface_id();
                }
                Ok((picture_type, Reference::Surface(forward), Reference::Invalid))
            }
            PictureType::B => {
                if !self.has_b_frames {
                    return Err(anyhow!("B picture in a stream without B frames").into());
                }

                let (Some(forward), Some(backward)) = (self.refs.first(), self.refs.second())
                else {
                    return Err(DecodeError::DropFrame(
                        "B picture without two references".into(),
                    ));
                };
                Ok((
                    picture_type,
                    Reference::Surface(forward.surface_id()),
                    Reference::Surface(backward.surface_id()),
                ))
            }
            PictureType::BI => Ok((picture_type, Reference::Invalid, Reference::Invalid)),
            PictureType::Skipped => Err(anyhow!("skipped picture type in a coded frame").into()),
        }
    }

    /// Decodes a picture of a frame into `frame`, predicting from `forward` and `backward`.
    fn decode_picture(
        &self,
        ctx: &FrameContext,
        frame: &DecodedFrame,
        picture: PictureDataVc1,
        (picture_type, forward, backward): (PictureType, Reference, Reference),
    ) -> Result<()> {
        let PictureDataVc1 {
            mut pic_params,
            packed_bitplanes,
            slices,
            ..
        } = picture;

        let surface = frame.surface_id();

        frame.set_frame_type(frame_type(picture_type));
        pic_params.forward_reference_picture = forward.surface_id(surface);
        pic_params.backward_reference_picture = backward.surface_id(surface);

        pic_params.inloop_decoded_picture = if self.loopfilter {
            surface
        } else {
            VA_INVALID_SURFACE
        };

        debug!(
            "{:?} picture into surface {}, references {} and {}",
            picture_type,
            surface,
            pic_params.forward_reference_picture,
            pic_params.backward_reference_picture
        );

        let bitplane_present = pic_params.bitplane_present != 0;
        let mut buffers = Vec::with_capacity(2 + 2 * slices.len());
        buffers.push(BufferType::PictureParameter(PictureParameter::VC1(
            pic_params,
        )));
        if bitplane_present {
            buffers.push(BufferType::BitPlane(packed_bitplanes));
        }
        for slice in slices {
            let data = slice.data()?;
            buffers.push(BufferType::SliceParameter(SliceParameter::VC1(
                slice.params,
            )));
            buffers.push(BufferType::SliceData(data));
        }

        ctx.submit(frame, buffers)
    }
}

impl FormatCodec for Vc1 {
    type Data = Vc1Data;

    const KIND: ParserKind = ParserKind::Vc1;

    fn configure(
        &mut self,
        parser: &mut dyn BitstreamParser<Vc1Data>,
        config: &DecoderConfig,
    ) -> Result<StreamInfo> {
        let header = config
            .header
            .as_ref()
            .ok_or(DecodeError::MissingParameter("header"))?;

        let resolution = config.picture_resolution;
        if resolution.is_empty() {
            return Err(DecodeError::InvalidParam(format!(
                "invalid picture size {}x{}",
                resolution.width, resolution.height
            )));
        }

        let header = rcv_sequence_header(header, resolution.width, resolution.height)?;
        parser.parse(&header, true)?;
        let se_data = parser.query()?.se_data;

        self.has_b_frames = se_data.has_b_frames();
        self.loopfilter = se_data.loopfilter;

        let num_surfaces = 1
            + config.extra_surfaces
            + min(
                NUM_BASE_SURFACES + usize::from(self.has_b_frames),
                MAX_REFERENCE_SURFACES,
            );

        debug!(
            "VC-1 stream: profile {}, level {}, B frames: {}, loop filter: {}",
            se_data.profile, se_data.level, self.has_b_frames, self.loopfilter
        );

        Ok(StreamInfo::new(
            se_data.va_profile(),
            num_surfaces,
            resolution,
            resolution,
        ))
    }

    fn process(&mut self, ctx: &FrameContext, data: Vc1Data) -> Result<()> {
        let first = data
            .pictures
            .first()
            .ok_or_else(|| anyhow!("frame contains no picture"))?;

        if first.picture_is_skipped {
            return self.output_skip_frame(ctx);
        }

        let first_type = first.picture_type();
        let structure = if data.pictures.len() > 1 {
            if first.pic_params.is_first_field {
                FrameStructure::TopField
            } else {
                FrameStructure::BottomField
            }
        } else {
            FrameStructure::Frame
        };

        // References are only updated once the whole frame is decoded, so both pictures can be
        // checked before taking a surface.
        let pictures = data
            .pictures
            .into_iter()
            .take(MAX_PICTURES_PER_FRAME)
            .enumerate()
            .map(|(index, picture)| {
                let references = self.picture_references(&picture.pic_params, index)?;
                Ok((picture, references))
            })
            .collect::<Result<Vec<_>>>()?;

        let frame = ctx.new_frame()?;
        for (picture, references) in pictures {
            self.decode_picture(ctx, &frame, picture, references)?;
        }

        frame.set_timing(ctx.timestamp(), ctx.discontinuity());
        frame.set_structure(structure);

        if matches!(first_type, Some(PictureType::I) | Some(PictureType::P)) {
            self.last_frame = Some(DecodedFrame::clone(&frame));
            self.update_references(&frame);
        }

        ctx.output(frame)
    }

    fn reset(&mut self) {
        self.refs.clear();
        self.last_frame = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;

    use super::*;
    use crate::backend::vaapi::VAProfile;
    use crate::buffer::InputBuffer;
    use crate::codec::vc1::PictureParameterBufferVc1;
    use crate::codec::vc1::SequenceLayerVc1;
    use crate::codec::vc1::SliceParameterBufferVc1;
    use crate::decoder::format::tests::Harness;
    use crate::decoder::VideoDecoder;
    use crate::parser::dummy::Library;
    use crate::parser::dummy::ParserCall;
    use crate::parser::dummy::Step;
    use crate::parser::Slice;
    use crate::Resolution;

    fn header(profile: u8) -> Vc1Data {
        Vc1Data {
            se_data: SequenceLayerVc1 {
                profile,
                level: 2,
                max_b_frames: 0,
                interlace: false,
                loopfilter: true,
                coded_width: 320,
                coded_height: 240,
            },
            pictures: vec![],
        }
    }

    fn config() -> DecoderConfig {
        DecoderConfig {
            header: Some(Bytes::from_static(&[0x00, 0x00, 0x01, 0x0f, 0xca, 0x86])),
            picture_resolution: Resolution::from((320, 240)),
            extra_surfaces: 0,
        }
    }

    fn picture(buffer: &Arc<InputBuffer>, picture_type: PictureType) -> PictureDataVc1 {
        PictureDataVc1 {
            picture_is_skipped: false,
            pic_params: PictureParameterBufferVc1 {
                picture_type: picture_type as u8,
                coded_width: 320,
                coded_height: 240,
                ..Default::default()
            },
            packed_bitplanes: vec![],
            slices: vec![Slice {
                params: SliceParameterBufferVc1 {
                    slice_data_size: buffer.len() as u32,
                    ..Default::default()
                },
                buffer: buffer.data().clone(),
                range: 0..buffer.len(),
            }],
        }
    }

    fn skipped() -> PictureDataVc1 {
        PictureDataVc1 {
            picture_is_skipped: true,
            ..Default::default()
        }
    }

    fn frame(profile: u8, pictures: Vec<PictureDataVc1>) -> Vc1Data {
        Vc1Data {
            pictures,
            ..header(profile)
        }
    }

    fn submitted_pic_params(h: &Harness<Vc1>, index: usize) -> PictureParameterBufferVc1 {
        let state = h.display.state();
        state.submitted[index]
            .buffers
            .iter()
            .find_map(|b| match b {
                BufferType::PictureParameter(PictureParameter::VC1(p)) => Some(p.clone()),
                _ => None,
            })
            .unwrap()
    }

    fn buffer(byte: u8) -> Arc<InputBuffer> {
        InputBuffer::new(vec![0, 0, 1, 0x0d, byte])
    }

    #[test]
    fn advanced_profile_session() {
        let library = Library::new(Some(header(3)));
        let h = Harness::<Vc1>::new(library.clone(), &config());

        // 1 + min(3 + 1, 8)
        assert_eq!(h.pool.num_managed_surfaces(), 5);
        // The header already has a start code and is passed as is.
        assert_eq!(
            library.calls()[1],
            ParserCall::Parse {
                data: config().header.unwrap(),
                is_header: true
            }
        );
    }

    #[test]
    fn rcv_header_rewritten() {
        let library = Library::new(Some(header(0)));
        let mut config = config();
        config.header = Some(Bytes::from_static(&[0x4e, 0x29, 0x1a, 0x11]));
        let h = Harness::<Vc1>::new(library.clone(), &config);

        match &library.calls()[1] {
            ParserCall::Parse { data, is_header } => {
                assert!(*is_header);
                assert_eq!(&data[..4], &[0x00, 0x00, 0x01, 0x0f]);
            }
            call => panic!("unexpected parser call {:?}", call),
        }
        // Simple profile without B frames: 1 + min(3, 8)
        assert_eq!(h.pool.num_managed_surfaces(), 4);
        assert_eq!(h.display.state().live_configs.len(), 1);
    }

    #[test]
    fn zero_picture_size() {
        let library = Library::new(Some(header(3)));
        let decoder = Vc1Decoder::new(Arc::new(library.clone()));
        let mut config = config();
        config.picture_resolution = Resolution::default();

        let err = decoder
            .initialize(
                &config,
                Arc::new(crate::frame_manager::dummy::FrameManager::default()),
                Arc::new(crate::backend::dummy::Display::new()),
            )
            .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidParam(_)));
        assert_eq!(library.calls().last(), Some(&ParserCall::Close));
    }

    #[test]
    fn i_p_b_references() {
        let library = Library::new(Some(header(3)));
        let h = Harness::<Vc1>::new(library.clone(), &config());

        for (ts, picture_type) in [PictureType::I, PictureType::P, PictureType::B]
            .into_iter()
            .enumerate()
        {
            let input = buffer(ts as u8);
            library.push(Step::Complete(frame(3, vec![picture(&input, picture_type)])));
            h.decode(ts as u64, &[input]).unwrap();
        }

        let frames = h.frame_manager.frames();
        let types: Vec<_> = frames.iter().map(|f| f.frame_type()).collect();
        assert_eq!(types, vec![FrameType::I, FrameType::P, FrameType::B]);

        let i = submitted_pic_params(&h, 0);
        assert_eq!(i.forward_reference_picture, frames[0].surface_id());
        assert_eq!(i.backward_reference_picture, frames[0].surface_id());
        assert_eq!(i.inloop_decoded_picture, frames[0].surface_id());

        let p = submitted_pic_params(&h, 1);
        assert_eq!(p.forward_reference_picture, frames[0].surface_id());
        assert_eq!(p.backward_reference_picture, VA_INVALID_SURFACE);

        let b = submitted_pic_params(&h, 2);
        assert_eq!(b.forward_reference_picture, frames[0].surface_id());
        assert_eq!(b.backward_reference_picture, frames[1].surface_id());

        // B frames are not references.
        h.decoder.with_codec(|c| {
            assert_eq!(c.refs.len(), 2);
            assert!(Arc::ptr_eq(c.refs.second().unwrap(), &frames[1]));
        });
    }

    #[test]
    fn b_picture_needs_two_references() {
        let library = Library::new(Some(header(3)));
        let h = Harness::<Vc1>::new(library.clone(), &config());

        let b = buffer(0);
        library.push(Step::Complete(frame(3, vec![picture(&b, PictureType::B)])));
        assert!(h.decode(0, &[Arc::clone(&b)]).unwrap_err().is_drop_frame());

        let i = buffer(1);
        library.push(Step::Complete(frame(3, vec![picture(&i, PictureType::I)])));
        h.decode(1, &[i]).unwrap();

        let b2 = buffer(2);
        library.push(Step::Complete(frame(3, vec![picture(&b2, PictureType::B)])));
        assert!(h.decode(2, &[Arc::clone(&b2)]).unwrap_err().is_drop_frame());

        // Only the I frame reached the hardware.
        assert_eq!(h.num_submitted(), 1);
        assert_eq!(h.display.state().begun, 1);
        assert_eq!(h.frame_manager.frames().len(), 1);
        assert_eq!(Arc::strong_count(&b), 1);
        assert_eq!(Arc::strong_count(&b2), 1);
    }

    #[test]
    fn missing_references_dropped_with_exhausted_pool() {
        let library = Library::new(Some(header(3)));
        let h = Harness::<Vc1>::new(library.clone(), &config());

        let total = h.pool.num_managed_surfaces();
        for ts in 0..total {
            let input = buffer(ts as u8);
            library.push(Step::Complete(frame(3, vec![picture(&input, PictureType::I)])));
            h.decode(ts as u64, &[input]).unwrap();
        }
        assert_eq!(h.pool.num_surfaces_left(), 0);

        h.decoder.flush().unwrap();
        h.decoder.with_codec(|c| assert!(c.refs.is_empty()));

        for (ts, picture_type) in [PictureType::B, PictureType::P].into_iter().enumerate() {
            let input = buffer(0x80 + ts as u8);
            library.push(Step::Complete(frame(3, vec![picture(&input, picture_type)])));
            let err = h
                .decode((total + ts) as u64, &[Arc::clone(&input)])
                .unwrap_err();
            assert!(err.is_drop_frame(), "{}", err);
            assert_eq!(Arc::strong_count(&input), 1);
        }

        // Without references nothing was started on the hardware.
        assert_eq!(h.display.state().begun, total);
        assert_eq!(h.frame_manager.frames().len(), total);
    }

    #[test]
    fn b_picture_without_b_frames_fails() {
        let library = Library::new(Some(header(0)));
        let mut config = config();
        config.header = Some(Bytes::from_static(&[0x4e, 0x29, 0x1a, 0x11]));
        let h = Harness::<Vc1>::new(library.clone(), &config);

        for (ts, picture_type) in [PictureType::I, PictureType::P].into_iter().enumerate() {
            let input = buffer(ts as u8);
            library.push(Step::Complete(frame(0, vec![picture(&input, picture_type)])));
            h.decode(ts as u64, &[input]).unwrap();
        }

        // A single reference is kept.
        let frames = h.frame_manager.frames();
        h.decoder.with_codec(|c| {
            assert_eq!(c.refs.len(), 1);
            assert!(Arc::ptr_eq(c.refs.first().unwrap(), &frames[1]));
        });

        let b = buffer(2);
        library.push(Step::Complete(frame(0, vec![picture(&b, PictureType::B)])));
        let err = h.decode(2, &[b]).unwrap_err();
        assert!(matches!(err, DecodeError::Fail(_)));
    }

    #[test]
    fn skipped_picture_repeats_last_frame() {
        let library = Library::new(Some(header(3)));
        let h = Harness::<Vc1>::new(library.clone(), &config());

        library.push(Step::Complete(frame(3, vec![skipped()])));
        assert!(h.decode(0, &[buffer(0)]).unwrap_err().is_drop_frame());

        let i = buffer(1);
        library.push(Step::Complete(frame(3, vec![picture(&i, PictureType::I)])));
        h.decode(1, &[i]).unwrap();

        library.push(Step::Complete(frame(3, vec![skipped()])));
        h.decode(2, &[buffer(2)]).unwrap();

        let frames = h.frame_manager.frames();
        assert_eq!(frames.len(), 2);
        let skip = &frames[1];
        assert!(skip.is_skipped());
        assert_eq!(skip.surface_id(), frames[0].surface_id());
        assert!(Arc::ptr_eq(skip.real_frame().unwrap(), &frames[0]));
        assert_eq!(skip.frame_type(), FrameType::P);
        assert_eq!(skip.timestamp(), 2);
        // No hardware work for the skipped picture.
        assert_eq!(h.display.state().begun, 1);

        // The skip frame is a reference for what follows.
        h.decoder.with_codec(|c| {
            assert_eq!(c.refs.len(), 2);
            assert!(Arc::ptr_eq(c.refs.second().unwrap(), skip));
        });
    }

    #[test]
    fn field_pair() {
        let library = Library::new(Some(header(3)));
        let h = Harness::<Vc1>::new(library.clone(), &config());

        let i = buffer(0);
        library.push(Step::Complete(frame(3, vec![picture(&i, PictureType::I)])));
        h.decode(0, &[i]).unwrap();

        let fields = buffer(1);
        let mut top = picture(&fields, PictureType::P);
        top.pic_params.is_first_field = true;
        let mut bottom = picture(&fields, PictureType::P);
        bottom.pic_params.is_first_field = false;
        bottom.pic_params.num_reference_pictures = 0;
        bottom.pic_params.reference_field_pic_indicator = 0;
        library.push(Step::Complete(frame(3, vec![top, bottom])));
        h.decode(1, &[fields]).unwrap();

        let frames = h.frame_manager.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].structure(), FrameStructure::TopField);

        // First field from the I frame, second field from the first one.
        let first = submitted_pic_params(&h, 1);
        assert_eq!(first.forward_reference_picture, frames[0].surface_id());
        let second = submitted_pic_params(&h, 2);
        assert_eq!(second.forward_reference_picture, frames[1].surface_id());
    }

    #[test]
    fn reference_distance_unsupported() {
        let library = Library::new(Some(header(3)));
        let h = Harness::<Vc1>::new(library.clone(), &config());

        let i = buffer(0);
        library.push(Step::Complete(frame(3, vec![picture(&i, PictureType::I)])));
        h.decode(0, &[i]).unwrap();

        let p = buffer(1);
        let mut pic = picture(&p, PictureType::P);
        pic.pic_params.reference_distance_flag = true;
        pic.pic_params.reference_distance = 2;
        library.push(Step::Complete(frame(3, vec![pic])));
        assert!(matches!(
            h.decode(1, &[p]).unwrap_err(),
            DecodeError::Fail(_)
        ));
        assert_eq!(h.num_submitted(), 1);
    }

    #[test]
    fn bitplanes_and_bi() {
        let library = Library::new(Some(header(3)));
        let h = Harness::<Vc1>::new(library.clone(), &config());

        let bi = buffer(0);
        let mut pic = picture(&bi, PictureType::BI);
        pic.pic_params.bitplane_present = 0x3;
        pic.packed_bitplanes = vec![0x5a; 8];
        library.push(Step::Complete(frame(3, vec![pic])));
        h.decode(0, &[bi]).unwrap();

        assert_eq!(h.frame_manager.frames()[0].frame_type(), FrameType::I);
        let state = h.display.state();
        assert!(state.submitted[0]
            .buffers
            .contains(&BufferType::BitPlane(vec![0x5a; 8])));
        drop(state);

        let params = submitted_pic_params(&h, 0);
        assert_eq!(params.forward_reference_picture, VA_INVALID_SURFACE);
        assert_eq!(params.backward_reference_picture, VA_INVALID_SURFACE);
        // BI pictures are not references.
        h.decoder.with_codec(|c| assert!(c.refs.is_empty()));
    }

    #[test]
    fn profile_selection() {
        let library = Library::new(Some(header(1)));
        let mut parser = crate::parser::ParserLibrary::open(&library, ParserKind::Vc1).unwrap();

        let mut codec = Vc1::default();
        let stream_info = codec.configure(parser.as_mut(), &config()).unwrap();
        assert_eq!(stream_info.profile, VAProfile::VC1Main);
        assert!(codec.has_b_frames);
    }
}
