// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! H.264 picture and slice parameters, in the layout the hardware consumes them.
//!
//! The parser fills these structures with everything but the surface ids, which the decoder
//! resolves from its reference picture store before submission.

use crate::backend::vaapi::VASurfaceID;
use crate::backend::vaapi::VA_INVALID_SURFACE;

pub const VA_PICTURE_H264_INVALID: u32 = 0x0000_0001;
pub const VA_PICTURE_H264_TOP_FIELD: u32 = 0x0000_0002;
pub const VA_PICTURE_H264_BOTTOM_FIELD: u32 = 0x0000_0004;
pub const VA_PICTURE_H264_SHORT_TERM_REFERENCE: u32 = 0x0000_0008;
pub const VA_PICTURE_H264_LONG_TERM_REFERENCE: u32 = 0x0000_0010;

/// Number of entries of `ReferenceFrames`.
pub const NUM_REFERENCE_FRAMES: usize = 16;
/// Number of entries of each reference picture list.
pub const NUM_REF_PIC_LIST_ENTRIES: usize = 32;

/// A picture as referenced by picture and slice parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureH264 {
    pub picture_id: VASurfaceID,
    pub frame_idx: u32,
    pub flags: u32,
    pub top_field_order_cnt: i32,
    pub bottom_field_order_cnt: i32,
}

impl Default for PictureH264 {
    fn default() -> Self {
        Self::invalid()
    }
}

impl PictureH264 {
    /// Builds an invalid picture. These pictures are used to fill empty array slots there is no
    /// data to fill them with.
    pub const fn invalid() -> Self {
        Self {
            picture_id: VA_INVALID_SURFACE,
            frame_idx: 0,
            flags: VA_PICTURE_H264_INVALID,
            top_field_order_cnt: 0,
            bottom_field_order_cnt: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.flags & VA_PICTURE_H264_INVALID == 0
    }

    pub fn is_top_field(&self) -> bool {
        self.flags & VA_PICTURE_H264_TOP_FIELD != 0
    }

    pub fn is_bottom_field(&self) -> bool {
        self.flags & VA_PICTURE_H264_BOTTOM_FIELD != 0
    }

    /// Whether the picture is used for short- or long-term reference.
    pub fn is_reference(&self) -> bool {
        self.flags & (VA_PICTURE_H264_SHORT_TERM_REFERENCE | VA_PICTURE_H264_LONG_TERM_REFERENCE)
            != 0
    }

    /// The picture order count identifying this picture: the bottom field order count for a
    /// bottom field, the top one otherwise.
    pub fn poc(&self) -> i32 {
        if self.is_bottom_field() {
            self.bottom_field_order_cnt
        } else {
            self.top_field_order_cnt
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PictureParameterBufferH264 {
    pub curr_pic: PictureH264,
    pub reference_frames: [PictureH264; NUM_REFERENCE_FRAMES],
    pub picture_width_in_mbs_minus1: u16,
    pub picture_height_in_mbs_minus1: u16,
    pub bit_depth_luma_minus8: u8,
    pub bit_depth_chroma_minus8: u8,
    pub num_ref_frames: u8,
    /// Packed sequence flags, in the hardware bit layout.
    pub seq_fields: u32,
    pub num_slice_groups_minus1: u8,
    pub slice_group_map_type: u8,
    pub slice_group_change_rate_minus1: u16,
    pub pic_init_qp_minus26: i8,
    pub pic_init_qs_minus26: i8,
    pub chroma_qp_index_offset: i8,
    pub second_chroma_qp_index_offset: i8,
    /// Packed picture flags, in the hardware bit layout.
    pub pic_fields: u32,
    pub frame_num: u16,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SliceParameterBufferH264 {
    pub slice_data_size: u32,
    pub slice_data_offset: u32,
    pub slice_data_flag: u32,
    pub slice_data_bit_offset: u16,
    pub first_mb_in_slice: u16,
    pub slice_type: u8,
    pub direct_spatial_mv_pred_flag: u8,
    pub num_ref_idx_l0_active_minus1: u8,
    pub num_ref_idx_l1_active_minus1: u8,
    pub cabac_init_idc: u8,
    pub slice_qp_delta: i8,
    pub disable_deblocking_filter_idc: u8,
    pub slice_alpha_c0_offset_div2: i8,
    pub slice_beta_offset_div2: i8,
    pub ref_pic_list0: [PictureH264; NUM_REF_PIC_LIST_ENTRIES],
    pub ref_pic_list1: [PictureH264; NUM_REF_PIC_LIST_ENTRIES],
    pub luma_log2_weight_denom: u8,
    pub chroma_log2_weight_denom: u8,
    pub luma_weight_l0_flag: u8,
    pub luma_weight_l0: [i16; 32],
    pub luma_offset_l0: [i16; 32],
    pub chroma_weight_l0_flag: u8,
    pub chroma_weight_l0: [[i16; 2]; 32],
    pub chroma_offset_l0: [[i16; 2]; 32],
    pub luma_weight_l1_flag: u8,
    pub luma_weight_l1: [i16; 32],
    pub luma_offset_l1: [i16; 32],
    pub chroma_weight_l1_flag: u8,
    pub chroma_weight_l1: [[i16; 2]; 32],
    pub chroma_offset_l1: [[i16; 2]; 32],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IQMatrixBufferH264 {
    pub scaling_list4x4: [[u8; 16]; 6],
    pub scaling_list8x8: [[u8; 64]; 2],
}

impl Default for IQMatrixBufferH264 {
    /// Flat scaling lists.
    fn default() -> Self {
        Self {
            scaling_list4x4: [[16; 16]; 6],
            scaling_list8x8: [[16; 64]; 2],
        }
    }
}
