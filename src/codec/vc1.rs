// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! VC-1 (and WMV9) parsed data and picture parameters.

use byteorder::BigEndian;
use byteorder::WriteBytesExt;
use bytes::Bytes;
use enumn::N;

use crate::backend::vaapi::VAProfile;
use crate::backend::vaapi::VASurfaceID;
use crate::backend::vaapi::VA_INVALID_SURFACE;
use crate::parser::Slice;

/// Start code of an RCV sequence header.
const RCV_SEQUENCE_HEADER_START_CODE: [u8; 4] = [0x00, 0x00, 0x01, 0x0f];
/// Marker terminating a synthesized sequence header.
const RCV_SEQUENCE_HEADER_END_MARKER: u8 = 0x80;

#[derive(N, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Profile {
    Simple = 0,
    Main = 1,
    Reserved = 2,
    Advanced = 3,
}

impl Profile {
    pub fn va_profile(&self) -> VAProfile {
        match self {
            Profile::Simple => VAProfile::VC1Simple,
            Profile::Main => VAProfile::VC1Main,
            Profile::Reserved | Profile::Advanced => VAProfile::VC1Advanced,
        }
    }
}

#[derive(N, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PictureType {
    I = 0,
    P = 1,
    B = 2,
    BI = 3,
    Skipped = 4,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureParameterBufferVc1 {
    pub forward_reference_picture: VASurfaceID,
    pub backward_reference_picture: VASurfaceID,
    /// Surface receiving the picture before the loop filter is applied.
    pub inloop_decoded_picture: VASurfaceID,
    pub coded_width: u16,
    pub coded_height: u16,
    pub profile: u8,
    pub interlace: bool,
    pub syncmarker: bool,
    pub overlap: bool,
    pub max_b_frames: u8,
    pub loopfilter: bool,
    pub range_reduction_frame: bool,
    pub picture_type: u8,
    pub frame_coding_mode: u8,
    pub top_field_first: bool,
    pub is_first_field: bool,
    pub intensity_compensation: bool,
    pub b_picture_fraction: u8,
    pub cbp_table: u8,
    pub mb_mode_table: u8,
    pub rounding_control: bool,
    pub post_processing: u8,
    pub luma_scale: u8,
    pub luma_shift: u8,
    pub reference_distance_flag: bool,
    pub reference_distance: u8,
    pub num_reference_pictures: u8,
    pub reference_field_pic_indicator: u8,
    pub mv_mode: u8,
    pub mv_mode2: u8,
    pub mv_table: u8,
    pub extended_mv_range: u8,
    pub extended_dmv_range: u8,
    pub dquant: u8,
    pub pic_quantizer_scale: u8,
    pub pic_quantizer_type: u8,
    pub half_qp: bool,
    pub transform_ac_codingset_idx1: u8,
    pub transform_ac_codingset_idx2: u8,
    pub intra_transform_dc_table: u8,
    /// Bitplanes present in the picture, one bit per plane. Zero if none.
    pub bitplane_present: u8,
}

impl Default for PictureParameterBufferVc1 {
    fn default() -> Self {
        Self {
            forward_reference_picture: VA_INVALID_SURFACE,
            backward_reference_picture: VA_INVALID_SURFACE,
            inloop_decoded_picture: VA_INVALID_SURFACE,
            coded_width: 0,
            coded_height: 0,
            profile: 0,
            interlace: false,
            syncmarker: false,
            overlap: false,
            max_b_frames: 0,
            loopfilter: false,
            range_reduction_frame: false,
            picture_type: PictureType::I as u8,
            frame_coding_mode: 0,
            top_field_first: true,
            is_first_field: true,
            intensity_compensation: false,
            b_picture_fraction: 0,
            cbp_table: 0,
            mb_mode_table: 0,
            rounding_control: false,
            post_processing: 0,
            luma_scale: 0,
            luma_shift: 0,
            reference_distance_flag: false,
            reference_distance: 0,
            num_reference_pictures: 0,
            reference_field_pic_indicator: 0,
            mv_mode: 0,
            mv_mode2: 0,
            mv_table: 0,
            extended_mv_range: 0,
            extended_dmv_range: 0,
            dquant: 0,
            pic_quantizer_scale: 0,
            pic_quantizer_type: 0,
            half_qp: false,
            transform_ac_codingset_idx1: 0,
            transform_ac_codingset_idx2: 0,
            intra_transform_dc_table: 0,
            bitplane_present: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SliceParameterBufferVc1 {
    pub slice_data_size: u32,
    pub slice_data_offset: u32,
    pub slice_data_flag: u32,
    pub macroblock_offset: u32,
    pub slice_vertical_position: u32,
}

/// Sequence layer information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceLayerVc1 {
    /// Raw `PROFILE` field.
    pub profile: u8,
    pub level: u8,
    /// Raw `MAXBFRAMES` field.
    pub max_b_frames: u8,
    pub interlace: bool,
    pub loopfilter: bool,
    pub coded_width: u16,
    pub coded_height: u16,
}

impl SequenceLayerVc1 {
    pub fn va_profile(&self) -> VAProfile {
        Profile::n(self.profile)
            .unwrap_or(Profile::Advanced)
            .va_profile()
    }

    /// Whether the stream may contain B pictures. `MAXBFRAMES` is not reliable for the main and
    /// advanced profiles, so B pictures are assumed possible there.
    pub fn has_b_frames(&self) -> bool {
        self.max_b_frames > 0
            || matches!(
                Profile::n(self.profile),
                Some(Profile::Main) | Some(Profile::Advanced)
            )
    }
}

/// One picture (frame or field) of a parsed frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PictureDataVc1 {
    /// Set for skipped pictures, which carry no data and repeat the previous frame.
    pub picture_is_skipped: bool,
    pub pic_params: PictureParameterBufferVc1,
    pub packed_bitplanes: Vec<u8>,
    pub slices: Vec<Slice<SliceParameterBufferVc1>>,
}

impl PictureDataVc1 {
    pub fn picture_type(&self) -> Option<PictureType> {
        PictureType::n(self.pic_params.picture_type)
    }
}

/// Result of a query after a complete frame (or header).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vc1Data {
    pub se_data: SequenceLayerVc1,
    /// The pictures of the frame: one frame, or two fields.
    pub pictures: Vec<PictureDataVc1>,
}

/// Turns codec data without start codes (simple and main profile "struct C", as found in RCV
/// and ASF containers) into a sequence header the parser can consume. Data already containing
/// a start code is returned as is.
pub fn rcv_sequence_header(header: &Bytes, width: u32, height: u32) -> anyhow::Result<Bytes> {
    if header.windows(3).any(|w| w == [0, 0, 1]) {
        return Ok(header.clone());
    }

    let width = u16::try_from(width)?;
    let height = u16::try_from(height)?;

    let mut data = Vec::with_capacity(header.len() + 9);
    data.extend_from_slice(&RCV_SEQUENCE_HEADER_START_CODE);
    data.write_u16::<BigEndian>(width)?;
    data.write_u16::<BigEndian>(height)?;
    data.extend_from_slice(header);
    data.push(RCV_SEQUENCE_HEADER_END_MARKER);

    Ok(Bytes::from(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rcv_header_synthesized() {
        let header = Bytes::from_static(&[0x4e, 0x29, 0x1a, 0x11]);

        let rcv = rcv_sequence_header(&header, 352, 288).unwrap();
        assert_eq!(
            &rcv[..],
            &[0x00, 0x00, 0x01, 0x0f, 0x01, 0x60, 0x01, 0x20, 0x4e, 0x29, 0x1a, 0x11, 0x80]
        );
    }

    #[test]
    fn advanced_header_untouched() {
        let header = Bytes::from_static(&[0x00, 0x00, 0x01, 0x0f, 0xca, 0x86]);

        let rcv = rcv_sequence_header(&header, 1920, 1080).unwrap();
        assert_eq!(rcv, header);
    }

    #[test]
    fn start_code_after_prefix_untouched() {
        // ASF codec data with a few bytes before the sequence header.
        let header = Bytes::from_static(&[0x25, 0x00, 0x00, 0x00, 0x01, 0x0f, 0xca, 0x86]);

        let rcv = rcv_sequence_header(&header, 1920, 1080).unwrap();
        assert_eq!(rcv, header);
    }

    #[test]
    fn profiles() {
        let mut seq = SequenceLayerVc1::default();
        assert_eq!(seq.va_profile(), VAProfile::VC1Simple);
        assert!(!seq.has_b_frames());

        seq.max_b_frames = 2;
        assert!(seq.has_b_frames());

        seq = SequenceLayerVc1 {
            profile: 1,
            ..Default::default()
        };
        assert_eq!(seq.va_profile(), VAProfile::VC1Main);
        assert!(seq.has_b_frames());

        seq.profile = 3;
        assert_eq!(seq.va_profile(), VAProfile::VC1Advanced);
        seq.profile = 2;
        assert_eq!(seq.va_profile(), VAProfile::VC1Advanced);
    }
}
