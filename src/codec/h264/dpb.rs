// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;
use thiserror::Error;

use crate::codec::h264::picture::PictureH264;
use crate::video_frame::DecodedFrame;

/// A frame kept for reference, with the order counts of its fields that have been stored.
///
/// A frame picture has a single order count. Both fields of a complementary field pair end up
/// in the same entry, as they are decoded into the same frame.
#[derive(Clone, Debug)]
pub struct DpbEntry {
    pub frame: DecodedFrame,
    pocs: Vec<i32>,
}

impl DpbEntry {
    /// Whether this entry holds the picture with order count `poc`.
    pub fn has_poc(&self, poc: i32) -> bool {
        self.pocs.contains(&poc)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DpbError {
    #[error("no reference picture with POC {0} in the DPB")]
    MissingReference(i32),
}

/// The reference pictures of an H.264 stream, indexed by picture order count.
///
/// The parser maintains the actual reference marking process and reports, with every picture,
/// which pictures are still used for reference. The DPB mirrors that list, keeping the frames
/// these pictures were decoded into alive until the parser stops reporting them.
#[derive(Default)]
pub struct Dpb {
    /// Entries keyed by the order count of the first picture stored in them.
    entries: BTreeMap<i32, DpbEntry>,
}

impl Dpb {
    /// Returns the number of frames in the DPB.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the keys of the DPB entries, in ascending order.
    pub fn pocs(&self) -> impl Iterator<Item = i32> + '_ {
        self.entries.keys().copied()
    }

    /// Returns the frame holding the picture with order count `poc`.
    pub fn get(&self, poc: i32) -> Option<&DecodedFrame> {
        if let Some(entry) = self.entries.get(&poc) {
            return Some(&entry.frame);
        }

        self.entries
            .values()
            .find(|e| e.has_poc(poc))
            .map(|e| &e.frame)
    }

    /// Drops all the frames.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Removes the entries none of whose pictures appear in `reference_frames`, as either the
    /// top or the bottom field order count of a valid picture. Returns the number of evicted
    /// entries.
    pub fn prune(&mut self, reference_frames: &[PictureH264]) -> usize {
        let referenced = |poc: i32| {
            reference_frames.iter().any(|r| {
                r.is_valid() && (r.top_field_order_cnt == poc || r.bottom_field_order_cnt == poc)
            })
        };

        let before = self.entries.len();
        self.entries.retain(|key, entry| {
            let keep = entry.pocs.iter().any(|poc| referenced(*poc));
            if !keep {
                debug!(
                    "Evicting POC {} (surface {}) from the DPB",
                    key,
                    entry.frame.surface_id()
                );
            }
            keep
        });

        before - self.entries.len()
    }

    /// Writes the surface id of the frame holding `pic` into it.
    pub fn resolve(&self, pic: &mut PictureH264) -> Result<(), DpbError> {
        let poc = pic.poc();
        let frame = self.get(poc).ok_or(DpbError::MissingReference(poc))?;
        pic.picture_id = frame.surface_id();

        Ok(())
    }

    /// Stores `frame` as holding the reference picture `pic`.
    ///
    /// If `frame` is already in the DPB (second field of a pair), the picture is added to its
    /// entry. An entry of another frame with the same order count is replaced.
    pub fn store(&mut self, pic: &PictureH264, frame: &DecodedFrame) {
        let poc = pic.poc();

        if let Some(entry) = self
            .entries
            .values_mut()
            .find(|e| Arc::ptr_eq(&e.frame, frame))
        {
            if !entry.has_poc(poc) {
                entry.pocs.push(poc);
            }
            return;
        }

        debug!(
            "Storing POC {} (surface {}) in the DPB",
            poc,
            frame.surface_id()
        );
        self.entries.insert(
            poc,
            DpbEntry {
                frame: Arc::clone(frame),
                pocs: vec![poc],
            },
        );
    }
}
