// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::sync::Arc;

use anyhow::anyhow;
use anyhow::Context as AnyhowContext;
use log::debug;
use log::error;

use crate::backend::vaapi::negotiate_config;
use crate::backend::vaapi::surface_pool::SurfacePool;
use crate::backend::vaapi::BufferType;
use crate::backend::vaapi::Display;
use crate::backend::vaapi::VABufferID;
use crate::backend::vaapi::VAConfigID;
use crate::backend::vaapi::VAContextID;
use crate::backend::vaapi::VASurfaceID;
use crate::backend::vaapi::VA_PROGRESSIVE;
use crate::decoder::StreamInfo;
use crate::video_frame::DecodedFrame;

/// The hardware side of a decoder: one config, one context, and the surfaces the context decodes
/// into.
pub struct VaapiBackend {
    display: Arc<dyn Display>,
    config: Option<VAConfigID>,
    context: Option<VAContextID>,
    surfaces: Vec<VASurfaceID>,
    surface_pool: Arc<SurfacePool>,
    stream_info: StreamInfo,
}

impl VaapiBackend {
    /// Creates the config, surfaces and context for a stream described by `stream_info`.
    ///
    /// Anything created before a failure is destroyed before returning.
    pub(crate) fn new(display: Arc<dyn Display>, stream_info: &StreamInfo) -> anyhow::Result<Self> {
        let (entrypoint, attrs) =
            negotiate_config(display.as_ref(), stream_info.profile, stream_info.rt_format)
                .context("while negotiating config")?;

        let config = display
            .create_config(stream_info.profile, entrypoint, &attrs)
            .context("while creating config")?;

        let surfaces = match display.create_surfaces(
            stream_info.rt_format,
            stream_info.coded_resolution.width,
            stream_info.coded_resolution.height,
            stream_info.num_surfaces,
        ) {
            Ok(surfaces) => surfaces,
            Err(e) => {
                destroy_logged("config", display.destroy_config(config));
                return Err(e).context("while creating surfaces");
            }
        };

        let context = match display.create_context(
            config,
            stream_info.picture_resolution.width,
            stream_info.picture_resolution.height,
            VA_PROGRESSIVE,
            &surfaces,
        ) {
            Ok(context) => context,
            Err(e) => {
                destroy_logged("surfaces", display.destroy_surfaces(&surfaces));
                destroy_logged("config", display.destroy_config(config));
                return Err(e).context("while creating context");
            }
        };

        debug!(
            "Created VA session for {:?}: {} surfaces of {:?}",
            stream_info.profile,
            surfaces.len(),
            stream_info.coded_resolution
        );

        let surface_pool = SurfacePool::new(stream_info.coded_resolution, &surfaces);

        Ok(Self {
            display,
            config: Some(config),
            context: Some(context),
            surfaces,
            surface_pool,
            stream_info: stream_info.clone(),
        })
    }

    pub(crate) fn stream_info(&self) -> &StreamInfo {
        &self.stream_info
    }

    pub(crate) fn surface_pool(&self) -> &Arc<SurfacePool> {
        &self.surface_pool
    }

    /// Gets a frame to decode into, or `None` if the pool is exhausted.
    pub(crate) fn new_frame(&self) -> Option<DecodedFrame> {
        self.surface_pool.get()
    }

    /// Decodes one picture into `target`.
    ///
    /// Creates one buffer per entry of `buffers`, submits them all in a single render call and
    /// waits for the decode to complete. Buffers are destroyed if the driver did not accept them.
    pub(crate) fn submit_picture(
        &self,
        target: VASurfaceID,
        buffers: Vec<BufferType>,
    ) -> anyhow::Result<()> {
        let context = self
            .context
            .ok_or_else(|| anyhow!("hardware context has been destroyed"))?;

        let mut buffer_ids = Vec::with_capacity(buffers.len());
        let submitted = self
            .create_buffers(context, buffers, &mut buffer_ids)
            .and_then(|()| {
                self.display
                    .begin_picture(context, target)
                    .context("while beginning picture")
            })
            .and_then(|()| {
                self.display
                    .render_picture(context, &buffer_ids)
                    .context("while rendering picture")
            });

        if let Err(e) = submitted {
            for id in buffer_ids {
                destroy_logged("buffer", self.display.destroy_buffer(id));
            }
            return Err(e);
        }

        self.display
            .end_picture(context)
            .context("while ending picture")?;
        self.display
            .sync_surface(target)
            .context("while syncing picture")?;

        Ok(())
    }

    fn create_buffers(
        &self,
        context: VAContextID,
        buffers: Vec<BufferType>,
        buffer_ids: &mut Vec<VABufferID>,
    ) -> anyhow::Result<()> {
        for buffer in buffers {
            let kind = buffer.kind();
            let id = self
                .display
                .create_buffer(context, buffer)
                .with_context(|| format!("while creating {} buffer", kind))?;
            buffer_ids.push(id);
        }

        Ok(())
    }

    /// Destroys the context, then the config, then the surfaces. Frames still referencing the
    /// surfaces will not be recycled by the pool.
    ///
    /// Every object is destroyed at most once; the first failure is returned.
    pub(crate) fn destroy(&mut self) -> anyhow::Result<()> {
        let mut result = Ok(());

        if let Some(context) = self.context.take() {
            if let Err(e) = self.display.destroy_context(context) {
                error!("Failed to destroy context {}: {}", context, e);
                result = result.and(Err(e).context("while destroying context"));
            }
        }

        if let Some(config) = self.config.take() {
            if let Err(e) = self.display.destroy_config(config) {
                error!("Failed to destroy config {}: {}", config, e);
                result = result.and(Err(e).context("while destroying config"));
            }
        }

        if !self.surfaces.is_empty() {
            self.surface_pool.clear();
            let surfaces = std::mem::take(&mut self.surfaces);
            if let Err(e) = self.display.destroy_surfaces(&surfaces) {
                error!("Failed to destroy {} surfaces: {}", surfaces.len(), e);
                result = result.and(Err(e).context("while destroying surfaces"));
            }
        }

        result
    }
}

impl Drop for VaapiBackend {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            error!("Error while tearing down VA session: {:#}", e);
        }
    }
}

fn destroy_logged(what: &str, result: Result<(), crate::backend::vaapi::VaError>) {
    if let Err(e) = result {
        error!("Failed to destroy {} while unwinding: {}", what, e);
    }
}
