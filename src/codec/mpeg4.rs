// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! MPEG-4 Part 2 (including DivX) parsed data and picture parameters.

use enumn::N;

use crate::backend::vaapi::VAProfile;
use crate::backend::vaapi::VASurfaceID;
use crate::backend::vaapi::VA_INVALID_SURFACE;
use crate::parser::Slice;

#[derive(N, Clone, Copy, Debug, PartialEq, Eq)]
pub enum VopType {
    I = 0,
    P = 1,
    B = 2,
    /// Sprite VOP.
    S = 3,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureParameterBufferMpeg4 {
    pub vop_width: u16,
    pub vop_height: u16,
    pub forward_reference_picture: VASurfaceID,
    pub backward_reference_picture: VASurfaceID,
    pub short_video_header: bool,
    pub chroma_format: u8,
    pub interlaced: bool,
    pub obmc_disable: bool,
    pub sprite_enable: u8,
    pub sprite_warping_accuracy: u8,
    /// Whether the VOL uses MPEG-2 style quantization matrices.
    pub quant_type: bool,
    pub quarter_sample: bool,
    pub data_partitioned: bool,
    pub reversible_vlc: bool,
    pub resync_marker_disable: bool,
    pub no_of_sprite_warping_points: u8,
    pub sprite_trajectory_du: [i16; 3],
    pub sprite_trajectory_dv: [i16; 3],
    pub quant_precision: u8,
    pub vop_coding_type: u8,
    /// Coding type of the backward reference of a B-VOP.
    pub backward_reference_vop_coding_type: u8,
    pub vop_rounding_type: bool,
    pub intra_dc_vlc_thr: u8,
    pub top_field_first: bool,
    pub alternate_vertical_scan_flag: bool,
    pub vop_fcode_forward: u8,
    pub vop_fcode_backward: u8,
    pub vop_time_increment_resolution: u16,
    pub num_gobs_in_vop: u8,
    pub num_macroblocks_in_gob: u8,
    pub trb: i16,
    pub trd: i16,
}

impl Default for PictureParameterBufferMpeg4 {
    fn default() -> Self {
        Self {
            vop_width: 0,
            vop_height: 0,
            forward_reference_picture: VA_INVALID_SURFACE,
            backward_reference_picture: VA_INVALID_SURFACE,
            short_video_header: false,
            chroma_format: 1,
            interlaced: false,
            obmc_disable: true,
            sprite_enable: 0,
            sprite_warping_accuracy: 0,
            quant_type: false,
            quarter_sample: false,
            data_partitioned: false,
            reversible_vlc: false,
            resync_marker_disable: false,
            no_of_sprite_warping_points: 0,
            sprite_trajectory_du: [0; 3],
            sprite_trajectory_dv: [0; 3],
            quant_precision: 5,
            vop_coding_type: VopType::I as u8,
            backward_reference_vop_coding_type: 0,
            vop_rounding_type: false,
            intra_dc_vlc_thr: 0,
            top_field_first: false,
            alternate_vertical_scan_flag: false,
            vop_fcode_forward: 1,
            vop_fcode_backward: 1,
            vop_time_increment_resolution: 0,
            num_gobs_in_vop: 0,
            num_macroblocks_in_gob: 0,
            trb: 0,
            trd: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IQMatrixBufferMpeg4 {
    pub load_intra_quant_mat: bool,
    pub load_non_intra_quant_mat: bool,
    pub intra_quant_mat: [u8; 64],
    pub non_intra_quant_mat: [u8; 64],
}

impl Default for IQMatrixBufferMpeg4 {
    fn default() -> Self {
        Self {
            load_intra_quant_mat: false,
            load_non_intra_quant_mat: false,
            intra_quant_mat: [16; 64],
            non_intra_quant_mat: [16; 64],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SliceParameterBufferMpeg4 {
    pub slice_data_size: u32,
    pub slice_data_offset: u32,
    pub slice_data_flag: u32,
    pub macroblock_offset: u32,
    pub macroblock_number: u32,
    pub quant_scale: i32,
}

/// Visual object and video object layer information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodecDataMpeg4 {
    pub profile_and_level_indication: u8,
    pub video_object_layer_width: u16,
    pub video_object_layer_height: u16,
}

impl CodecDataMpeg4 {
    pub fn va_profile(&self) -> VAProfile {
        if self.profile_and_level_indication & 0xf8 == 0xf0 {
            VAProfile::MPEG4AdvancedSimple
        } else {
            VAProfile::MPEG4Simple
        }
    }
}

/// One VOP of a parsed frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PictureDataMpeg4 {
    /// Cleared for VOPs carrying no data: skipped VOPs, and the N-VOP placeholders following a
    /// packed frame.
    pub vop_coded: bool,
    pub pic_params: PictureParameterBufferMpeg4,
    pub iq_matrix: IQMatrixBufferMpeg4,
    pub slices: Vec<Slice<SliceParameterBufferMpeg4>>,
}

impl PictureDataMpeg4 {
    pub fn vop_type(&self) -> Option<VopType> {
        VopType::n(self.pic_params.vop_coding_type)
    }
}

/// Result of a query after a complete frame (or header).
///
/// More than one picture means a packed frame: an I or P VOP followed by the B VOPs that were
/// stored with it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mpeg4Data {
    pub codec_data: CodecDataMpeg4,
    pub pictures: Vec<PictureDataMpeg4>,
}
