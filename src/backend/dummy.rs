// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! This file contains a dummy display whose only purpose is to let the decoders run so we can
//! test them in isolation. It hands out sequential ids, keeps track of live objects and records
//! every submitted picture.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::backend::vaapi::BufferType;
use crate::backend::vaapi::VABufferID;
use crate::backend::vaapi::VAConfigAttrib;
use crate::backend::vaapi::VAConfigID;
use crate::backend::vaapi::VAContextID;
use crate::backend::vaapi::VAEntrypoint;
use crate::backend::vaapi::VAProfile;
use crate::backend::vaapi::VASurfaceID;
use crate::backend::vaapi::VaError;
use crate::backend::vaapi::VaResult;
use crate::backend::vaapi::VA_RT_FORMAT_YUV420;
use crate::backend::vaapi::VA_STATUS_ERROR_OPERATION_FAILED;

/// Calls that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailPoint {
    CreateContext,
    CreateBuffer,
    RenderPicture,
    SyncSurface,
}

/// A picture that went through begin/render/end.
#[derive(Debug, Clone)]
pub(crate) struct SubmittedPicture {
    pub target: VASurfaceID,
    pub buffers: Vec<BufferType>,
}

#[derive(Default)]
pub(crate) struct DisplayState {
    next_id: u32,
    pub live_configs: BTreeSet<VAConfigID>,
    pub live_contexts: BTreeSet<VAContextID>,
    pub live_surfaces: BTreeSet<VASurfaceID>,
    pub live_buffers: BTreeMap<VABufferID, BufferType>,
    /// Number of destroy_context/destroy_config/destroy_surfaces calls.
    pub destroy_calls: usize,
    pub destroyed_buffers: usize,
    /// Number of begin_picture calls.
    pub begun: usize,
    pub submitted: Vec<SubmittedPicture>,
    pub synced: Vec<VASurfaceID>,
    current: Option<SubmittedPicture>,
    fail_at: Option<FailPoint>,
}

impl DisplayState {
    fn new_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn check(&mut self, point: FailPoint) -> VaResult<()> {
        if self.fail_at == Some(point) {
            self.fail_at = None;
            Err(VaError::new(VA_STATUS_ERROR_OPERATION_FAILED))
        } else {
            Ok(())
        }
    }
}

pub(crate) struct Display {
    profiles: Vec<VAProfile>,
    state: Mutex<DisplayState>,
}

impl Display {
    /// A display supporting every profile.
    pub(crate) fn new() -> Self {
        Self::with_profiles(vec![
            VAProfile::H264Baseline,
            VAProfile::H264Main,
            VAProfile::H264High,
            VAProfile::VC1Simple,
            VAProfile::VC1Main,
            VAProfile::VC1Advanced,
            VAProfile::MPEG4Simple,
            VAProfile::MPEG4AdvancedSimple,
        ])
    }

    pub(crate) fn with_profiles(profiles: Vec<VAProfile>) -> Self {
        Self {
            profiles,
            state: Default::default(),
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, DisplayState> {
        self.state.lock().unwrap()
    }

    /// Makes the next call matching `point` fail.
    pub(crate) fn fail_at(&self, point: FailPoint) {
        self.state().fail_at = Some(point);
    }
}

impl crate::backend::vaapi::Display for Display {
    fn query_config_profiles(&self) -> VaResult<Vec<VAProfile>> {
        Ok(self.profiles.clone())
    }

    fn query_config_entrypoints(&self, _: VAProfile) -> VaResult<Vec<VAEntrypoint>> {
        Ok(vec![VAEntrypoint::VLD])
    }

    fn get_config_attributes(
        &self,
        _: VAProfile,
        _: VAEntrypoint,
        attributes: &mut [VAConfigAttrib],
    ) -> VaResult<()> {
        for attr in attributes {
            attr.value = VA_RT_FORMAT_YUV420;
        }
        Ok(())
    }

    fn create_config(
        &self,
        _: VAProfile,
        _: VAEntrypoint,
        _: &[VAConfigAttrib],
    ) -> VaResult<VAConfigID> {
        let mut state = self.state();
        let id = state.new_id();
        state.live_configs.insert(id);
        Ok(id)
    }

    fn destroy_config(&self, config: VAConfigID) -> VaResult<()> {
        let mut state = self.state();
        state.destroy_calls += 1;
        assert!(state.live_configs.remove(&config), "double destroy");
        Ok(())
    }

    fn create_surfaces(
        &self,
        _: u32,
        _: u32,
        _: u32,
        num_surfaces: usize,
    ) -> VaResult<Vec<VASurfaceID>> {
        let mut state = self.state();
        let surfaces: Vec<_> = (0..num_surfaces).map(|_| state.new_id()).collect();
        state.live_surfaces.extend(surfaces.iter().copied());
        Ok(surfaces)
    }

    fn destroy_surfaces(&self, surfaces: &[VASurfaceID]) -> VaResult<()> {
        let mut state = self.state();
        state.destroy_calls += 1;
        for surface in surfaces {
            assert!(state.live_surfaces.remove(surface), "double destroy");
        }
        Ok(())
    }

    fn create_context(
        &self,
        config: VAConfigID,
        _: u32,
        _: u32,
        _: u32,
        render_targets: &[VASurfaceID],
    ) -> VaResult<VAContextID> {
        let mut state = self.state();
        state.check(FailPoint::CreateContext)?;
        assert!(state.live_configs.contains(&config));
        assert!(render_targets
            .iter()
            .all(|s| state.live_surfaces.contains(s)));
        let id = state.new_id();
        state.live_contexts.insert(id);
        Ok(id)
    }

    fn destroy_context(&self, context: VAContextID) -> VaResult<()> {
        let mut state = self.state();
        state.destroy_calls += 1;
        assert!(state.live_contexts.remove(&context), "double destroy");
        Ok(())
    }

    fn create_buffer(&self, context: VAContextID, buffer: BufferType) -> VaResult<VABufferID> {
        let mut state = self.state();
        state.check(FailPoint::CreateBuffer)?;
        assert!(state.live_contexts.contains(&context));
        let id = state.new_id();
        state.live_buffers.insert(id, buffer);
        Ok(id)
    }

    fn destroy_buffer(&self, buffer: VABufferID) -> VaResult<()> {
        let mut state = self.state();
        state.destroyed_buffers += 1;
        assert!(state.live_buffers.remove(&buffer).is_some());
        Ok(())
    }

    fn begin_picture(&self, context: VAContextID, render_target: VASurfaceID) -> VaResult<()> {
        let mut state = self.state();
        assert!(state.live_contexts.contains(&context));
        assert!(state.live_surfaces.contains(&render_target));
        assert!(state.current.is_none(), "picture already in flight");
        state.begun += 1;
        state.current = Some(SubmittedPicture {
            target: render_target,
            buffers: vec![],
        });
        Ok(())
    }

    fn render_picture(&self, _: VAContextID, buffers: &[VABufferID]) -> VaResult<()> {
        let mut state = self.state();
        if let Err(e) = state.check(FailPoint::RenderPicture) {
            state.current = None;
            return Err(e);
        }
        let mut rendered = vec![];
        for id in buffers {
            // The driver owns rendered buffers.
            rendered.push(state.live_buffers.remove(id).unwrap());
        }
        state.current.as_mut().unwrap().buffers.extend(rendered);
        Ok(())
    }

    fn end_picture(&self, _: VAContextID) -> VaResult<()> {
        let mut state = self.state();
        let picture = state.current.take().unwrap();
        state.submitted.push(picture);
        Ok(())
    }

    fn sync_surface(&self, surface: VASurfaceID) -> VaResult<()> {
        let mut state = self.state();
        state.check(FailPoint::SyncSurface)?;
        state.synced.push(surface);
        Ok(())
    }
}
