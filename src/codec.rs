// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Codec-specific picture descriptions and reference picture stores.

pub mod h264;
pub mod mpeg4;
pub mod ref_slots;
pub mod vc1;
