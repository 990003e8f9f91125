// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Compressed input buffers.

use std::sync::Arc;

use bytes::Bytes;

/// A buffer of compressed bitstream submitted by the client.
///
/// Buffers are shared through `Arc`: the decoder keeps a reference to every buffer whose frame has
/// not been decoded yet, and drops it once the frame is complete. Slices handed to the hardware
/// point directly into `data`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputBuffer {
    data: Bytes,
}

impl InputBuffer {
    pub fn new(data: impl Into<Bytes>) -> Arc<Self> {
        Arc::new(Self { data: data.into() })
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
