// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Interface to the stage reordering decoded frames for display.

use crate::video_frame::DecodedFrame;

/// Receives decoded frames in decode order and releases them in display order.
pub trait FrameManager: Send + Sync {
    /// Queues a decoded (or skipped) frame. Called exactly once per frame.
    fn enqueue(&self, frame: DecodedFrame) -> anyhow::Result<()>;

    /// Drops all queued frames. The decoder never calls this: the client calls it when it flushes
    /// the session, alongside `VideoDecoder::flush`, to release the surfaces held for display.
    fn flush(&self) -> anyhow::Result<()>;

    /// Signals that no more frames will be queued until the next flush.
    fn eos(&self) -> anyhow::Result<()>;
}

#[cfg(test)]
pub(crate) mod dummy {
    use std::sync::Mutex;

    use super::*;

    /// Frame manager keeping every frame it receives, in order.
    #[derive(Default)]
    pub(crate) struct FrameManager {
        pub frames: Mutex<Vec<DecodedFrame>>,
        pub eos_count: Mutex<usize>,
    }

    impl FrameManager {
        pub(crate) fn frames(&self) -> Vec<DecodedFrame> {
            self.frames.lock().unwrap().clone()
        }

        pub(crate) fn clear(&self) {
            self.frames.lock().unwrap().clear();
        }
    }

    impl super::FrameManager for FrameManager {
        fn enqueue(&self, frame: DecodedFrame) -> anyhow::Result<()> {
            self.frames.lock().unwrap().push(frame);
            Ok(())
        }

        fn flush(&self) -> anyhow::Result<()> {
            self.clear();
            Ok(())
        }

        fn eos(&self) -> anyhow::Result<()> {
            *self.eos_count.lock().unwrap() += 1;
            Ok(())
        }
    }
}
