// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::sync::Arc;

use log::debug;

use crate::video_frame::DecodedFrame;

/// The two most recent reference frames of a VC-1 or MPEG-4 stream.
///
/// Slot 0 holds the older reference, slot 1 the most recent one. B pictures predict from both,
/// P pictures from the most recent one.
#[derive(Default)]
pub struct RefSlots {
    slots: [Option<DecodedFrame>; 2],
}

impl RefSlots {
    /// Returns the frame in slot `index`.
    pub fn get(&self, index: usize) -> Option<&DecodedFrame> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// The older reference, or the only one.
    pub fn first(&self) -> Option<&DecodedFrame> {
        self.get(0)
    }

    /// The more recent reference, if two are available.
    pub fn second(&self) -> Option<&DecodedFrame> {
        self.get(1)
    }

    /// The most recent reference frame.
    pub fn last(&self) -> Option<&DecodedFrame> {
        self.second().or_else(|| self.first())
    }

    /// Number of populated slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds a new reference frame: fills the first free slot, or drops the older reference and
    /// shifts the more recent one to slot 0.
    pub fn push(&mut self, frame: &DecodedFrame) {
        let frame = Some(Arc::clone(frame));

        if self.slots[0].is_none() {
            self.slots[0] = frame;
        } else if self.slots[1].is_none() {
            self.slots[1] = frame;
        } else {
            if let Some(old) = &self.slots[0] {
                debug!("Releasing reference surface {}", old.surface_id());
            }
            self.slots[0] = self.slots[1].take();
            self.slots[1] = frame;
        }
    }

    /// Replaces the only reference of a stream without B pictures.
    pub fn replace_single(&mut self, frame: &DecodedFrame) {
        self.slots[0] = Some(Arc::clone(frame));
        self.slots[1] = None;
    }

    /// Drops all the references.
    pub fn clear(&mut self) {
        self.slots = Default::default();
    }
}
