// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Shared code for the hardware backend.
//!
//! The backend is the hardware accelerator the decoders submit pictures to. This crate does not
//! link against any particular driver library: [`vaapi::Display`] describes the VA-style call
//! contract the decoders rely on, and any implementation of it (a libva binding, a remote
//! accelerator, a test double) can be plugged in.

#[cfg(test)]
pub(crate) mod dummy;
pub mod vaapi;
