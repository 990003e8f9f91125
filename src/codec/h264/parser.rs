// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Data returned by an H.264 bitstream parser.

use enumn::N;

use crate::codec::h264::picture::IQMatrixBufferH264;
use crate::codec::h264::picture::PictureParameterBufferH264;
use crate::codec::h264::picture::SliceParameterBufferH264;
use crate::parser::Slice;
use crate::video_frame::FrameType;

#[derive(N, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Profile {
    Baseline = 66,
    Main = 77,
    Extended = 88,
    High = 100,
    High10 = 110,
    High422P = 122,
}

#[derive(N, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SliceType {
    P = 0,
    B = 1,
    I = 2,
    Sp = 3,
    Si = 4,
}

impl SliceType {
    /// Maps a raw `slice_type` (0..=9, values above 4 meaning all slices of the picture share the
    /// type) to a slice type.
    pub fn from_raw(slice_type: u8) -> Option<Self> {
        if slice_type > 9 {
            return None;
        }

        Self::n(slice_type % 5)
    }

    pub fn frame_type(&self) -> FrameType {
        match self {
            SliceType::P | SliceType::Sp => FrameType::P,
            SliceType::B => FrameType::B,
            SliceType::I | SliceType::Si => FrameType::I,
        }
    }
}

/// Sequence-level information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodecDataH264 {
    pub profile_idc: u8,
    pub level_idc: u8,
    pub constraint_set0_flag: bool,
    pub constraint_set1_flag: bool,
    pub constraint_set2_flag: bool,
    pub constraint_set3_flag: bool,
    pub num_ref_frames: u8,
    pub frame_mbs_only_flag: bool,
    pub mb_adaptive_frame_field_flag: bool,
    pub pic_width_in_mbs_minus1: u16,
    pub pic_height_in_mbs_minus1: u16,
}

impl CodecDataH264 {
    /// Coded size of the pictures, in pixels.
    pub fn coded_size(&self) -> (u32, u32) {
        (
            (u32::from(self.pic_width_in_mbs_minus1) + 1) * 16,
            (u32::from(self.pic_height_in_mbs_minus1) + 1) * 16,
        )
    }
}

/// One picture (frame or field) of a parsed access unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PictureDataH264 {
    pub pic_params: PictureParameterBufferH264,
    pub slices: Vec<Slice<SliceParameterBufferH264>>,
}

/// Result of a query after a complete access unit (or header).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct H264Data {
    pub codec_data: CodecDataH264,
    pub iq_matrix: IQMatrixBufferH264,
    /// The pictures of the access unit: one frame, or up to two fields.
    pub pictures: Vec<PictureDataH264>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_type_mapping() {
        for raw in [0, 3, 5, 8] {
            assert_eq!(SliceType::from_raw(raw).unwrap().frame_type(), FrameType::P);
        }
        for raw in [1, 6] {
            assert_eq!(SliceType::from_raw(raw).unwrap().frame_type(), FrameType::B);
        }
        for raw in [2, 4, 7, 9] {
            assert_eq!(SliceType::from_raw(raw).unwrap().frame_type(), FrameType::I);
        }
        assert_eq!(SliceType::from_raw(10), None);
    }
}
