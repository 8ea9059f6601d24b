// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Vertex batching and the flush protocol
//!
//! Triangles arriving from primitive assembly accumulate in a window of the
//! vertex buffer while their draw state stays unchanged. Every state setter
//! compares against the current value and, on a real change, flushes the
//! pending window first: one flush is one pipeline, one bind group, one
//! render pass, one draw.
//!
//! The window/compare bookkeeping lives in [`BatchState`], a plain struct
//! with no device types, so the flush-triggering rules are testable
//! directly. [`DrawBatcher`] wraps it with the actual GPU recording.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use log::{debug, trace};

use crate::core::error::{GsError, Result};
use crate::core::formats::PixelFormat;
use crate::core::gs::registers::Scissor;
use crate::core::gs::PrimVertex;

use super::context::{canonical_table_format, GsContext};
use super::pipeline::PipelineCache;
use super::shadergen::{
    generate_draw_shader, DrawCaps, DRAW_AREA_SIZE, PUSH_CONSTANT_SIZE,
};

/// Vertex buffer capacity; triangles always fit because flushes keep the
/// window short of the end
pub const MAX_VERTICES: u32 = 4096;

/// Push constant block for draw pipelines; layout mirrors the `DrawParams`
/// struct in the generated WGSL
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct DrawParams {
    pub fb_base: u32,
    pub fb_stride: u32,
    pub depth_base: u32,
    pub depth_stride: u32,
    pub tex_base: u32,
    pub tex_stride: u32,
    pub tex_csa: u32,
    pub _pad: u32,
    pub tex_width: f32,
    pub tex_height: f32,
}

/// What a state setter must do with an offered value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateUpdate {
    /// Value already current: touch nothing
    Keep,
    /// Value differs but no vertices are pending: apply directly
    Apply,
    /// Value differs and vertices are batched under the old one: flush the
    /// window, then apply
    FlushThenApply,
}

/// What an append must do to make room for `count` vertices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendDecision {
    /// The window can grow in place
    Fits,
    /// Buffer exhausted: flush the pending window, rewind to the buffer
    /// start, then append
    FlushThenRewind,
}

/// Device-free batching state: current draw state plus the pending vertex
/// window `[start, end)`
///
/// The flush-triggering rules live here, not in [`DrawBatcher`]: every
/// setter and append asks this struct for a [`StateUpdate`] or
/// [`AppendDecision`] and executes it verbatim, so the decisions are
/// testable without a device.
#[derive(Debug, Default)]
pub struct BatchState {
    caps: Option<DrawCaps>,
    params: DrawParams,
    scissor: Scissor,
    start: u32,
    end: u32,
}

impl BatchState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn caps(&self) -> Option<&DrawCaps> {
        self.caps.as_ref()
    }

    pub fn params(&self) -> &DrawParams {
        &self.params
    }

    pub fn scissor(&self) -> &Scissor {
        &self.scissor
    }

    /// Vertices waiting to be drawn
    pub fn pending(&self) -> u32 {
        self.end - self.start
    }

    pub fn has_pending(&self) -> bool {
        self.end > self.start
    }

    pub fn window(&self) -> (u32, u32) {
        (self.start, self.end)
    }

    pub fn caps_differ(&self, caps: &DrawCaps) -> bool {
        self.caps.as_ref() != Some(caps)
    }

    pub fn set_caps(&mut self, caps: DrawCaps) {
        self.caps = Some(caps);
    }

    pub fn params_differ(&self, params: &DrawParams) -> bool {
        self.params != *params
    }

    pub fn set_params(&mut self, params: DrawParams) {
        self.params = params;
    }

    pub fn scissor_differs(&self, scissor: &Scissor) -> bool {
        self.scissor != *scissor
    }

    pub fn set_scissor(&mut self, scissor: Scissor) {
        self.scissor = scissor;
    }

    fn update_for(&self, differs: bool) -> StateUpdate {
        if !differs {
            StateUpdate::Keep
        } else if self.has_pending() {
            StateUpdate::FlushThenApply
        } else {
            StateUpdate::Apply
        }
    }

    /// Decide how to take a capability change
    pub fn caps_update(&self, caps: &DrawCaps) -> StateUpdate {
        self.update_for(self.caps_differ(caps))
    }

    /// Decide how to take a push-constant parameter change
    pub fn params_update(&self, params: &DrawParams) -> StateUpdate {
        self.update_for(self.params_differ(params))
    }

    /// Decide how to take a scissor change
    pub fn scissor_update(&self, scissor: &Scissor) -> StateUpdate {
        self.update_for(self.scissor_differs(scissor))
    }

    /// Decide how to make room for `count` more vertices
    pub fn append_decision(&self, count: u32) -> AppendDecision {
        if self.fits(count) {
            AppendDecision::Fits
        } else {
            AppendDecision::FlushThenRewind
        }
    }

    /// Whether `count` more vertices fit without wrapping the buffer
    pub fn fits(&self, count: u32) -> bool {
        self.end + count <= MAX_VERTICES
    }

    /// Extend the pending window
    pub fn advance(&mut self, count: u32) {
        self.end += count;
    }

    /// Close the window after a flush: drawn vertices stay in the buffer
    pub fn retire(&mut self) {
        self.start = self.end;
    }

    /// Reset the window to the start of the buffer (overflow or new frame)
    pub fn rewind(&mut self) {
        self.start = 0;
        self.end = 0;
    }
}

/// Bind-group identity: the resource set a draw needs, which is coarser
/// than full pipeline identity (blend/gouraud do not change bindings)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BindGroupKey {
    fb_table: PixelFormat,
    tex_table: Option<PixelFormat>,
    clut: bool,
}

impl BindGroupKey {
    fn from_caps(caps: &DrawCaps) -> Self {
        Self {
            fb_table: canonical_table_format(caps.framebuffer_format),
            tex_table: caps
                .texture
                .as_ref()
                .map(|texture| canonical_table_format(texture.format)),
            clut: caps
                .texture
                .as_ref()
                .is_some_and(|texture| texture.format.is_indexed()),
        }
    }
}

struct DrawPipeline {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

/// Records GS draws: batches vertices, owns the draw pipelines and the
/// frame-scoped bind group cache
pub struct DrawBatcher {
    state: BatchState,
    staging: Vec<PrimVertex>,
    vertex_buffer: wgpu::Buffer,
    pipelines: PipelineCache<DrawCaps, DrawPipeline>,
    bind_groups: HashMap<BindGroupKey, wgpu::BindGroup>,
}

impl DrawBatcher {
    pub fn new(context: &GsContext) -> Self {
        let vertex_buffer = context.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("gs_draw_vertices"),
            size: MAX_VERTICES as u64 * std::mem::size_of::<PrimVertex>() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            state: BatchState::new(),
            staging: Vec::new(),
            vertex_buffer,
            pipelines: PipelineCache::new(),
            bind_groups: HashMap::new(),
        }
    }

    pub fn state(&self) -> &BatchState {
        &self.state
    }

    /// Apply a capability change, flushing pending work recorded under the
    /// old capabilities first
    pub fn set_caps(&mut self, context: &GsContext, caps: DrawCaps) -> Result<()> {
        match self.state.caps_update(&caps) {
            StateUpdate::Keep => return Ok(()),
            StateUpdate::Apply => {}
            StateUpdate::FlushThenApply => self.flush(context)?,
        }
        self.state.set_caps(caps);
        Ok(())
    }

    pub fn set_params(&mut self, context: &GsContext, params: DrawParams) -> Result<()> {
        match self.state.params_update(&params) {
            StateUpdate::Keep => return Ok(()),
            StateUpdate::Apply => {}
            StateUpdate::FlushThenApply => self.flush(context)?,
        }
        self.state.set_params(params);
        Ok(())
    }

    pub fn set_scissor(&mut self, context: &GsContext, scissor: Scissor) -> Result<()> {
        match self.state.scissor_update(&scissor) {
            StateUpdate::Keep => return Ok(()),
            StateUpdate::Apply => {}
            StateUpdate::FlushThenApply => self.flush(context)?,
        }
        self.state.set_scissor(scissor);
        Ok(())
    }

    /// Queue one triangle under the current state
    pub fn add_vertices(&mut self, context: &GsContext, vertices: &[PrimVertex; 3]) -> Result<()> {
        if self.state.append_decision(3) == AppendDecision::FlushThenRewind {
            debug!("vertex buffer full, forcing flush");
            self.flush(context)?;
            self.state.rewind();
            assert_eq!(self.state.append_decision(3), AppendDecision::Fits);
        }
        self.staging.extend_from_slice(vertices);
        self.state.advance(3);
        Ok(())
    }

    /// Draw the pending window: one pipeline, one bind group, one pass
    pub fn flush(&mut self, context: &GsContext) -> Result<()> {
        if !self.state.has_pending() {
            return Ok(());
        }
        let caps = *self.state.caps().ok_or_else(|| GsError::Backend {
            op: "flush",
            detail: "pending vertices without draw capabilities".to_string(),
        })?;
        let (start, end) = self.state.window();
        assert_eq!((end - start) % 3, 0, "pending window is not whole triangles");

        let device = context.device();
        let entry = self.pipelines.get_or_build(&caps, |caps| {
            debug!("building draw pipeline for {:?}", caps);
            build_draw_pipeline(device, caps)
        })?;

        let key = BindGroupKey::from_caps(&caps);
        if !self.bind_groups.contains_key(&key) {
            trace!("building bind group for {:?}", key);
            let bind_group = create_bind_group(context, &entry.bind_group_layout, &caps)?;
            self.bind_groups.insert(key, bind_group);
        }
        let bind_group = &self.bind_groups[&key];

        // Upload the staged vertices into their window.
        let offset = start as u64 * std::mem::size_of::<PrimVertex>() as u64;
        context
            .queue()
            .write_buffer(&self.vertex_buffer, offset, bytemuck::cast_slice(&self.staging));

        let scissor = self.state.scissor();
        let (sx, sy, sw, sh) = clamp_scissor(scissor);
        trace!(
            "flush: {} vertices, scissor {}x{}+{}+{}",
            end - start,
            sw,
            sh,
            sx,
            sy
        );

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("gs_draw"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("gs_draw"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: context.draw_target_view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&entry.pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.set_push_constants(
                wgpu::ShaderStages::FRAGMENT,
                0,
                bytemuck::bytes_of(self.state.params()),
            );
            pass.set_viewport(
                0.0,
                0.0,
                DRAW_AREA_SIZE as f32,
                DRAW_AREA_SIZE as f32,
                0.0,
                1.0,
            );
            pass.set_scissor_rect(sx, sy, sw, sh);
            pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
            pass.draw(start..end, 0..1);
        }
        context.queue().submit(Some(encoder.finish()));

        self.staging.clear();
        self.state.retire();
        Ok(())
    }

    /// Flush, rewind the vertex window and drop frame-scoped bind groups.
    /// Pipelines survive: they are device-lifetime objects.
    pub fn end_frame(&mut self, context: &GsContext) -> Result<()> {
        self.flush(context)?;
        self.state.rewind();
        self.bind_groups.clear();
        Ok(())
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }
}

/// Inclusive GS scissor bounds to an (x, y, w, h) rectangle clamped to the
/// draw area; degenerate bounds collapse to a zero-size rect at the origin
fn clamp_scissor(scissor: &Scissor) -> (u32, u32, u32, u32) {
    let x0 = scissor.x0.min(DRAW_AREA_SIZE);
    let y0 = scissor.y0.min(DRAW_AREA_SIZE);
    let x1 = (scissor.x1 + 1).min(DRAW_AREA_SIZE);
    let y1 = (scissor.y1 + 1).min(DRAW_AREA_SIZE);
    (x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
}

fn vertex_layout() -> [wgpu::VertexAttribute; 5] {
    [
        wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x2,
            offset: 0,
            shader_location: 0,
        },
        wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Uint32,
            offset: 8,
            shader_location: 1,
        },
        wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Uint32,
            offset: 12,
            shader_location: 2,
        },
        wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x3,
            offset: 16,
            shader_location: 3,
        },
        wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32,
            offset: 28,
            shader_location: 4,
        },
    ]
}

fn build_draw_pipeline(device: &wgpu::Device, caps: &DrawCaps) -> Result<DrawPipeline> {
    let source = generate_draw_shader(caps)?;
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("gs_draw"),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    let mut entries = vec![
        wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: false },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        },
        uint_texture_entry(1),
    ];
    if let Some(texture) = &caps.texture {
        entries.push(uint_texture_entry(2));
        if texture.format.is_indexed() {
            entries.push(uint_texture_entry(3));
        }
    }
    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("gs_draw_layout"),
        entries: &entries,
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("gs_draw_layout"),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[wgpu::PushConstantRange {
            stages: wgpu::ShaderStages::FRAGMENT,
            range: 0..PUSH_CONSTANT_SIZE,
        }],
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("gs_draw"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &module,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<PrimVertex>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &vertex_layout(),
            }],
        },
        fragment: Some(wgpu::FragmentState {
            module: &module,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: wgpu::TextureFormat::Rgba8Unorm,
                blend: None,
                // The attachment is a dummy; all output goes through the
                // storage buffer.
                write_mask: wgpu::ColorWrites::empty(),
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });

    Ok(DrawPipeline {
        pipeline,
        bind_group_layout,
    })
}

fn uint_texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Uint,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn create_bind_group(
    context: &GsContext,
    layout: &wgpu::BindGroupLayout,
    caps: &DrawCaps,
) -> Result<wgpu::BindGroup> {
    let mut entries = vec![
        wgpu::BindGroupEntry {
            binding: 0,
            resource: context.memory_buffer().as_entire_binding(),
        },
        wgpu::BindGroupEntry {
            binding: 1,
            resource: wgpu::BindingResource::TextureView(
                context.swizzle_view(caps.framebuffer_format)?,
            ),
        },
    ];
    if let Some(texture) = &caps.texture {
        entries.push(wgpu::BindGroupEntry {
            binding: 2,
            resource: wgpu::BindingResource::TextureView(context.swizzle_view(texture.format)?),
        });
        if texture.format.is_indexed() {
            entries.push(wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::TextureView(context.clut_view()),
            });
        }
    }
    Ok(context
        .device()
        .create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("gs_draw_bind_group"),
            layout,
            entries: &entries,
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::shadergen::TextureCaps;

    fn caps() -> DrawCaps {
        DrawCaps {
            gouraud: true,
            framebuffer_format: PixelFormat::Psmct32,
            depth_format: PixelFormat::Psmz32,
            texture: None,
            blend: None,
        }
    }

    /// Executes [`BatchState`] decisions the way [`DrawBatcher`] does,
    /// counting flushes instead of recording them
    #[derive(Default)]
    struct CountingBatcher {
        state: BatchState,
        flushes: u32,
    }

    impl CountingBatcher {
        fn flush(&mut self) {
            self.flushes += 1;
            self.state.retire();
        }

        fn set_caps(&mut self, caps: DrawCaps) {
            match self.state.caps_update(&caps) {
                StateUpdate::Keep => return,
                StateUpdate::Apply => {}
                StateUpdate::FlushThenApply => self.flush(),
            }
            self.state.set_caps(caps);
        }

        fn set_params(&mut self, params: DrawParams) {
            match self.state.params_update(&params) {
                StateUpdate::Keep => return,
                StateUpdate::Apply => {}
                StateUpdate::FlushThenApply => self.flush(),
            }
            self.state.set_params(params);
        }

        fn set_scissor(&mut self, scissor: Scissor) {
            match self.state.scissor_update(&scissor) {
                StateUpdate::Keep => return,
                StateUpdate::Apply => {}
                StateUpdate::FlushThenApply => self.flush(),
            }
            self.state.set_scissor(scissor);
        }

        fn add_triangle(&mut self) {
            if self.state.append_decision(3) == AppendDecision::FlushThenRewind {
                self.flush();
                self.state.rewind();
                assert_eq!(self.state.append_decision(3), AppendDecision::Fits);
            }
            self.state.advance(3);
        }
    }

    #[test]
    fn test_setter_noop_when_value_unchanged() {
        let mut state = BatchState::new();
        state.set_caps(caps());
        state.advance(3);
        // Re-applying the same caps must not require a flush.
        assert!(!state.caps_differ(&caps()));
        let mut changed = caps();
        changed.gouraud = false;
        assert!(state.caps_differ(&changed));
    }

    #[test]
    fn test_changed_setter_flushes_pending_window() {
        let mut batcher = CountingBatcher::default();
        batcher.set_caps(caps());
        batcher.add_triangle();
        batcher.add_triangle();

        // A real change with vertices in flight flushes exactly once.
        let mut changed = caps();
        changed.gouraud = false;
        batcher.set_caps(changed);
        assert_eq!(batcher.flushes, 1);
        assert!(!batcher.state.has_pending());

        // Params and scissor follow the same rule.
        batcher.add_triangle();
        batcher.set_params(DrawParams {
            fb_base: 0x1000,
            ..Default::default()
        });
        assert_eq!(batcher.flushes, 2);

        batcher.add_triangle();
        batcher.set_scissor(Scissor {
            x0: 0,
            x1: 319,
            y0: 0,
            y1: 223,
        });
        assert_eq!(batcher.flushes, 3);
    }

    #[test]
    fn test_unchanged_setter_never_flushes() {
        let mut batcher = CountingBatcher::default();
        batcher.set_caps(caps());
        batcher.add_triangle();
        batcher.set_caps(caps());
        batcher.set_params(DrawParams::default());
        batcher.set_scissor(Scissor::default());
        assert_eq!(batcher.flushes, 0);
        assert_eq!(batcher.state.pending(), 3);
    }

    #[test]
    fn test_changed_setter_with_empty_window_applies_directly() {
        let mut batcher = CountingBatcher::default();
        batcher.set_caps(caps());
        let mut changed = caps();
        changed.gouraud = false;
        batcher.set_caps(changed);
        batcher.set_params(DrawParams {
            fb_base: 0x2000,
            ..Default::default()
        });
        assert_eq!(batcher.flushes, 0);
        assert_eq!(batcher.state.caps(), Some(&changed));
    }

    #[test]
    fn test_overflow_append_flushes_exactly_once() {
        let mut batcher = CountingBatcher::default();
        batcher.set_caps(caps());
        for _ in 0..MAX_VERTICES / 3 {
            batcher.add_triangle();
        }
        assert_eq!(batcher.flushes, 0);

        // The triangle that no longer fits forces one flush, then lands at
        // the start of the rewound buffer.
        batcher.add_triangle();
        assert_eq!(batcher.flushes, 1);
        assert_eq!(batcher.state.window(), (0, 3));
    }

    #[test]
    fn test_params_compare_by_value() {
        let mut state = BatchState::new();
        let params = DrawParams {
            fb_base: 0x1000,
            fb_stride: 640,
            ..Default::default()
        };
        state.set_params(params);
        assert!(!state.params_differ(&params));
        let mut moved = params;
        moved.fb_base = 0x2000;
        assert!(state.params_differ(&moved));
    }

    #[test]
    fn test_window_advance_and_retire() {
        let mut state = BatchState::new();
        assert!(!state.has_pending());
        state.advance(6);
        assert_eq!(state.pending(), 6);
        assert_eq!(state.window(), (0, 6));
        state.retire();
        assert!(!state.has_pending());
        state.advance(3);
        assert_eq!(state.window(), (6, 9));
    }

    #[test]
    fn test_capacity_overflow_detection() {
        let mut state = BatchState::new();
        state.advance(MAX_VERTICES - 3);
        assert!(state.fits(3));
        state.advance(3);
        assert!(!state.fits(3));
        // The overflow path flushes then rewinds to the buffer start.
        state.retire();
        state.rewind();
        assert!(state.fits(3));
        assert_eq!(state.window(), (0, 0));
    }

    #[test]
    fn test_bind_group_key_ignores_shading_state() {
        let mut a = caps();
        let mut b = caps();
        a.gouraud = true;
        b.gouraud = false;
        b.blend = Some(crate::core::blend::BlendConfig::from_register(0b01_00_01_00).unwrap());
        assert_eq!(BindGroupKey::from_caps(&a), BindGroupKey::from_caps(&b));
    }

    #[test]
    fn test_bind_group_key_tracks_resources() {
        let plain = caps();
        let mut textured = caps();
        textured.texture = Some(TextureCaps {
            format: PixelFormat::Psmt8,
            clut_format: PixelFormat::Psmct32,
        });
        assert_ne!(
            BindGroupKey::from_caps(&plain),
            BindGroupKey::from_caps(&textured)
        );
        // 24-bit framebuffers share the 32-bit table.
        let mut fb24 = caps();
        fb24.framebuffer_format = PixelFormat::Psmct24;
        assert_eq!(BindGroupKey::from_caps(&plain), BindGroupKey::from_caps(&fb24));
    }

    #[test]
    fn test_scissor_clamps_to_draw_area() {
        let scissor = Scissor {
            x0: 0,
            x1: 639,
            y0: 0,
            y1: 447,
        };
        assert_eq!(clamp_scissor(&scissor), (0, 0, 640, 448));
        let oversized = Scissor {
            x0: 0,
            x1: 4095,
            y0: 100,
            y1: 4095,
        };
        assert_eq!(
            clamp_scissor(&oversized),
            (0, 100, DRAW_AREA_SIZE, DRAW_AREA_SIZE - 100)
        );
    }
}
