// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::collections::VecDeque;
use std::sync::Arc;

use log::trace;

use crate::buffer::InputBuffer;

/// Input buffers retained by a decoder until the frame they belong to has been decoded.
///
/// Buffers are queued in submission order along with the timestamp of the call that submitted
/// them. Since the parser only completes frames in order, releasing a timestamp only ever needs to
/// look at the head of the queue.
#[derive(Default)]
pub struct InputQueue {
    entries: VecDeque<(Arc<InputBuffer>, u64)>,
}

impl InputQueue {
    /// Retains `buffer` until `timestamp` is released.
    pub fn push(&mut self, buffer: Arc<InputBuffer>, timestamp: u64) {
        self.entries.push_back((buffer, timestamp));
    }

    /// Drops the buffers at the head of the queue submitted with `timestamp`. Returns the number of
    /// released buffers.
    pub fn release(&mut self, timestamp: u64) -> usize {
        let mut released = 0;
        while self
            .entries
            .front()
            .map_or(false, |(_, ts)| *ts == timestamp)
        {
            self.entries.pop_front();
            released += 1;
        }

        if released > 0 {
            trace!("Released {} input buffers of timestamp {}", released, timestamp);
        }

        released
    }

    /// The oldest retained buffer.
    pub fn front(&self) -> Option<&Arc<InputBuffer>> {
        self.entries.front().map(|(buffer, _)| buffer)
    }

    /// Drops all the retained buffers.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
