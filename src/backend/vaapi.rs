// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! VA-style hardware acceleration contract used by the decoders.
//!
//! [`Display`] mirrors the subset of the VA API the decoders need: capability queries, creation
//! of a config, surfaces and a context, parameter/data buffers, and the begin/render/end/sync
//! picture protocol. Identifiers are plain integers, exactly as in VA.

use anyhow::anyhow;
use bytes::Bytes;
use thiserror::Error;

use crate::codec::h264::picture::IQMatrixBufferH264;
use crate::codec::h264::picture::PictureParameterBufferH264;
use crate::codec::h264::picture::SliceParameterBufferH264;
use crate::codec::mpeg4::IQMatrixBufferMpeg4;
use crate::codec::mpeg4::PictureParameterBufferMpeg4;
use crate::codec::mpeg4::SliceParameterBufferMpeg4;
use crate::codec::vc1::PictureParameterBufferVc1;
use crate::codec::vc1::SliceParameterBufferVc1;

pub mod decoder;
pub mod surface_pool;

#[allow(clippy::upper_case_acronyms)]
pub type VASurfaceID = u32;
#[allow(clippy::upper_case_acronyms)]
pub type VAConfigID = u32;
#[allow(clippy::upper_case_acronyms)]
pub type VAContextID = u32;
#[allow(clippy::upper_case_acronyms)]
pub type VABufferID = u32;

pub const VA_INVALID_ID: u32 = 0xffff_ffff;
pub const VA_INVALID_SURFACE: VASurfaceID = VA_INVALID_ID;

pub const VA_RT_FORMAT_YUV420: u32 = 0x0000_0001;
pub const VA_RT_FORMAT_YUV422: u32 = 0x0000_0002;
pub const VA_RT_FORMAT_YUV444: u32 = 0x0000_0004;
pub const VA_ATTRIB_NOT_SUPPORTED: u32 = 0x8000_0000;

/// Context creation flag asking the driver for progressive-only decoding.
pub const VA_PROGRESSIVE: u32 = 0x1;

pub const VA_STATUS_ERROR_OPERATION_FAILED: i32 = 0x0000_0001;
pub const VA_STATUS_ERROR_ALLOCATION_FAILED: i32 = 0x0000_0002;
pub const VA_STATUS_ERROR_INVALID_CONFIG: i32 = 0x0000_0004;
pub const VA_STATUS_ERROR_INVALID_CONTEXT: i32 = 0x0000_0005;
pub const VA_STATUS_ERROR_INVALID_SURFACE: i32 = 0x0000_0006;
pub const VA_STATUS_ERROR_INVALID_BUFFER: i32 = 0x0000_0007;
pub const VA_STATUS_ERROR_UNSUPPORTED_PROFILE: i32 = 0x0000_000c;
pub const VA_STATUS_ERROR_DECODING_ERROR: i32 = 0x0000_0017;

/// A failed hardware call, carrying the driver status code.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("VA call failed with status {status:#x}")]
pub struct VaError {
    pub status: i32,
}

impl VaError {
    pub fn new(status: i32) -> Self {
        Self { status }
    }
}

pub type VaResult<T> = Result<T, VaError>;

/// Decoding profiles the decoders may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VAProfile {
    H264Baseline,
    H264Main,
    H264High,
    VC1Simple,
    VC1Main,
    VC1Advanced,
    MPEG4Simple,
    MPEG4AdvancedSimple,
    MPEG4Main,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VAEntrypoint {
    VLD,
    IDCT,
    MoComp,
    Deblocking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VAConfigAttribType {
    RTFormat,
    DecSliceMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VAConfigAttrib {
    pub type_: VAConfigAttribType,
    pub value: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PictureParameter {
    H264(PictureParameterBufferH264),
    VC1(PictureParameterBufferVc1),
    MPEG4(PictureParameterBufferMpeg4),
}

#[derive(Debug, Clone, PartialEq)]
pub enum IQMatrix {
    H264(IQMatrixBufferH264),
    MPEG4(IQMatrixBufferMpeg4),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SliceParameter {
    H264(SliceParameterBufferH264),
    VC1(SliceParameterBufferVc1),
    MPEG4(SliceParameterBufferMpeg4),
}

/// Payload of a buffer created with [`Display::create_buffer`].
#[derive(Debug, Clone, PartialEq)]
pub enum BufferType {
    PictureParameter(PictureParameter),
    IQMatrix(IQMatrix),
    /// Packed VC-1 bitplanes.
    BitPlane(Vec<u8>),
    SliceParameter(SliceParameter),
    /// Compressed slice bytes, referencing the client's input buffer.
    SliceData(Bytes),
}

impl BufferType {
    /// Short name of the buffer kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            BufferType::PictureParameter(_) => "picture parameter",
            BufferType::IQMatrix(_) => "IQ matrix",
            BufferType::BitPlane(_) => "bitplane",
            BufferType::SliceParameter(_) => "slice parameter",
            BufferType::SliceData(_) => "slice data",
        }
    }
}

/// A VA display: the connection to the hardware accelerator.
///
/// Implementations must be internally synchronized, as the display is shared between decoder
/// instances.
pub trait Display: Send + Sync {
    fn query_config_profiles(&self) -> VaResult<Vec<VAProfile>>;

    fn query_config_entrypoints(&self, profile: VAProfile) -> VaResult<Vec<VAEntrypoint>>;

    /// Fills the `value` of each entry of `attributes` with what the driver supports for
    /// `profile` and `entrypoint`.
    fn get_config_attributes(
        &self,
        profile: VAProfile,
        entrypoint: VAEntrypoint,
        attributes: &mut [VAConfigAttrib],
    ) -> VaResult<()>;

    fn create_config(
        &self,
        profile: VAProfile,
        entrypoint: VAEntrypoint,
        attributes: &[VAConfigAttrib],
    ) -> VaResult<VAConfigID>;

    fn destroy_config(&self, config: VAConfigID) -> VaResult<()>;

    fn create_surfaces(
        &self,
        rt_format: u32,
        width: u32,
        height: u32,
        num_surfaces: usize,
    ) -> VaResult<Vec<VASurfaceID>>;

    fn destroy_surfaces(&self, surfaces: &[VASurfaceID]) -> VaResult<()>;

    fn create_context(
        &self,
        config: VAConfigID,
        width: u32,
        height: u32,
        flags: u32,
        render_targets: &[VASurfaceID],
    ) -> VaResult<VAContextID>;

    fn destroy_context(&self, context: VAContextID) -> VaResult<()>;

    fn create_buffer(&self, context: VAContextID, buffer: BufferType) -> VaResult<VABufferID>;

    fn destroy_buffer(&self, buffer: VABufferID) -> VaResult<()>;

    fn begin_picture(&self, context: VAContextID, render_target: VASurfaceID) -> VaResult<()>;

    /// Sends `buffers` to the driver. Once this call succeeds the driver owns the buffers.
    fn render_picture(&self, context: VAContextID, buffers: &[VABufferID]) -> VaResult<()>;

    fn end_picture(&self, context: VAContextID) -> VaResult<()>;

    /// Blocks until all pending operations on `surface` have completed.
    fn sync_surface(&self, surface: VASurfaceID) -> VaResult<()>;
}

pub(crate) fn va_rt_format_to_string(va_rt_format: u32) -> String {
    String::from(match va_rt_format {
        VA_RT_FORMAT_YUV420 => "YUV420",
        VA_RT_FORMAT_YUV422 => "YUV422",
        VA_RT_FORMAT_YUV444 => "YUV444",
        other => return format!("unknown VA rt_format {}", other),
    })
}

/// Checks that `display` can decode `profile` through the VLD entrypoint with surfaces of
/// `rt_format`, and returns the attributes to create the config with.
pub(crate) fn negotiate_config(
    display: &dyn Display,
    profile: VAProfile,
    rt_format: u32,
) -> anyhow::Result<(VAEntrypoint, Vec<VAConfigAttrib>)> {
    let profiles = display.query_config_profiles()?;
    if !profiles.contains(&profile) {
        return Err(anyhow!("profile {:?} not supported by the driver", profile));
    }

    let entrypoint = VAEntrypoint::VLD;
    let entrypoints = display.query_config_entrypoints(profile)?;
    if !entrypoints.contains(&entrypoint) {
        return Err(anyhow!(
            "entrypoint {:?} not supported for profile {:?}",
            entrypoint,
            profile
        ));
    }

    let mut attrs = vec![VAConfigAttrib {
        type_: VAConfigAttribType::RTFormat,
        value: 0,
    }];
    display.get_config_attributes(profile, entrypoint, &mut attrs)?;

    // See whether this RT_FORMAT is supported by the given profile and entrypoint pair.
    if attrs[0].value == VA_ATTRIB_NOT_SUPPORTED || attrs[0].value & rt_format == 0 {
        return Err(anyhow!(
            "rt_format {} not supported for profile {:?} and entrypoint {:?}",
            va_rt_format_to_string(rt_format),
            profile,
            entrypoint
        ));
    }

    attrs[0].value = rt_format;

    Ok((entrypoint, attrs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy;

    #[test]
    fn negotiate_supported_profile() {
        let display = dummy::Display::new();
        let (entrypoint, attrs) =
            negotiate_config(&display, VAProfile::H264High, VA_RT_FORMAT_YUV420).unwrap();

        assert_eq!(entrypoint, VAEntrypoint::VLD);
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].type_, VAConfigAttribType::RTFormat);
        assert_eq!(attrs[0].value, VA_RT_FORMAT_YUV420);
    }

    #[test]
    fn negotiate_unsupported_profile() {
        let display = dummy::Display::with_profiles(vec![VAProfile::VC1Advanced]);

        assert!(negotiate_config(&display, VAProfile::H264High, VA_RT_FORMAT_YUV420).is_err());
    }

    #[test]
    fn negotiate_unsupported_rt_format() {
        let display = dummy::Display::new();

        let err = negotiate_config(&display, VAProfile::VC1Main, VA_RT_FORMAT_YUV444).unwrap_err();
        assert!(err.to_string().contains("YUV444"));
    }
}
