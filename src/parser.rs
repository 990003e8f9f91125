// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Interface to the bitstream parsers.
//!
//! Parsing is done by an external library, one parser instance per decoder. The parser consumes
//! input buffers incrementally and, once it has seen a complete frame, describes it with the
//! codec-specific structures of [`crate::codec`]: picture parameters ready to be sent to the
//! hardware (minus the surface ids, which only the decoder knows) and slices pointing into the
//! input buffers.

#[cfg(test)]
pub(crate) mod dummy;

use std::ops::Range;

use anyhow::anyhow;
use bytes::Bytes;
use thiserror::Error;

/// Codec a parser is opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserKind {
    H264,
    Vc1,
    Mpeg4,
}

/// Result of feeding data to a parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// The data has been consumed but does not complete a frame yet.
    NeedMoreData,
    /// A frame (or a header) is complete and can be retrieved with
    /// [`BitstreamParser::query`].
    FrameComplete,
}

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("parser could not be opened: {0}")]
    Open(String),
    #[error("parser rejected the bitstream with status {0}")]
    Rejected(u32),
    #[error("no parsed data available")]
    NoData,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type ParserResult<T> = Result<T, ParserError>;

/// A bitstream parser producing data of type `D`.
pub trait BitstreamParser<D>: Send {
    /// Feeds `data` to the parser. `is_header` is set for out-of-band codec configuration data.
    ///
    /// Slices in the data later returned by [`BitstreamParser::query`] may keep references to
    /// `data`.
    fn parse(&mut self, data: &Bytes, is_header: bool) -> ParserResult<ParseStatus>;

    /// Returns the data of the last completed frame or header.
    fn query(&mut self) -> ParserResult<D>;

    /// Discards any partially parsed data.
    fn flush(&mut self) -> ParserResult<()>;

    /// Releases the parser's resources. The parser is not used after this call.
    fn close(&mut self) -> ParserResult<()> {
        Ok(())
    }
}

/// Entry point of a parser library, able to create parsers producing `D`.
pub trait ParserLibrary<D>: Send + Sync {
    fn open(&self, kind: ParserKind) -> ParserResult<Box<dyn BitstreamParser<D>>>;
}

/// One slice of a picture: its parameters and where its data lies in the input.
#[derive(Debug, Clone, PartialEq)]
pub struct Slice<P> {
    pub params: P,
    /// The input buffer the slice was parsed from.
    pub buffer: Bytes,
    /// Range of the slice data within `buffer`.
    pub range: Range<usize>,
}

impl<P> Slice<P> {
    /// Returns the slice data, without copying it.
    pub fn data(&self) -> anyhow::Result<Bytes> {
        if self.range.start > self.range.end || self.range.end > self.buffer.len() {
            return Err(anyhow!(
                "slice data {:?} out of input buffer bounds ({} bytes)",
                self.range,
                self.buffer.len()
            ));
        }

        Ok(self.buffer.slice(self.range.clone()))
    }
}
