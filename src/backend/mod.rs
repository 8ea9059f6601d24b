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

//! wgpu rendering backend
//!
//! [`GsBackend`] is the [`RenderSink`] the register front-end drives: it
//! owns the GPU context, the draw batcher and the palette loader, and
//! translates each incoming [`RenderState`] into the capability key and
//! push-constant parameters the batcher's flush protocol works with.

pub mod clut;
pub mod context;
pub mod draw;
pub mod pipeline;
pub mod shadergen;

use log::info;

use crate::core::blend::BlendConfig;
use crate::core::error::Result;
use crate::core::formats::PixelFormat;
use crate::core::gs::registers::Tex0;
use crate::core::gs::{PrimVertex, RenderSink, RenderState};

use self::clut::PaletteLoader;
use self::context::GsContext;
use self::draw::{DrawBatcher, DrawParams};
use self::shadergen::{DrawCaps, TextureCaps};

pub use self::context::MEMORY_SIZE;
pub use self::shadergen::DRAW_AREA_SIZE;

/// Resolve a [`RenderState`] into pipeline identity and draw parameters
///
/// This is where raw register format bits meet the codec: unknown or
/// unimplemented combinations surface here as
/// [`GsError::UnsupportedConfiguration`](crate::core::error::GsError),
/// before any GPU work is recorded.
pub fn resolve_draw_state(state: &RenderState) -> Result<(DrawCaps, DrawParams)> {
    let framebuffer_format = PixelFormat::from_bits(state.frame.format_bits)?;
    let depth_format = PixelFormat::from_bits(state.zbuf.format_bits)?;
    let texture = if state.mode.textured {
        let format = PixelFormat::from_bits(state.tex0.format_bits)?;
        let clut_format = if format.is_indexed() {
            PixelFormat::from_bits(state.tex0.clut_format_bits)?
        } else {
            // Keep the key stable for direct-color textures.
            PixelFormat::Psmct32
        };
        Some(TextureCaps {
            format,
            clut_format,
        })
    } else {
        None
    };
    let blend = if state.mode.alpha_blending {
        Some(BlendConfig::from_register(state.alpha)?)
    } else {
        None
    };
    let caps = DrawCaps {
        gouraud: state.mode.gouraud,
        framebuffer_format,
        depth_format,
        texture,
        blend,
    };
    caps.validate()?;

    let params = DrawParams {
        fb_base: state.frame.base,
        fb_stride: state.frame.stride.max(64),
        depth_base: state.zbuf.base,
        depth_stride: state.frame.stride.max(64),
        tex_base: state.tex0.base,
        tex_stride: state.tex0.buf_width.max(64),
        tex_csa: state.tex0.csa,
        _pad: 0,
        tex_width: state.tex0.width as f32,
        tex_height: state.tex0.height as f32,
    };
    Ok((caps, params))
}

/// The complete GPU-backed render sink
pub struct GsBackend {
    context: GsContext,
    batcher: DrawBatcher,
    palettes: PaletteLoader,
}

impl GsBackend {
    /// Build the backend on a ready device and queue
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Result<Self> {
        let context = GsContext::new(device, queue)?;
        let batcher = DrawBatcher::new(&context);
        info!("GS backend initialized");
        Ok(Self {
            context,
            batcher,
            palettes: PaletteLoader::new(),
        })
    }

    pub fn context(&self) -> &GsContext {
        &self.context
    }

    /// Bulk-initialize emulated local memory
    pub fn write_memory(&self, offset: u64, data: &[u8]) {
        self.context.write_memory(offset, data);
    }

    pub fn clear_memory(&self) {
        self.context.clear_memory();
    }

    /// Frame boundary: flush pending draws, rewind the vertex window, drop
    /// frame-scoped bind groups and the palette identity
    pub fn end_frame(&mut self) -> Result<()> {
        self.batcher.end_frame(&self.context)?;
        self.palettes.invalidate();
        Ok(())
    }

    pub fn pipeline_count(&self) -> usize {
        self.batcher.pipeline_count()
    }
}

impl RenderSink for GsBackend {
    fn set_render_state(&mut self, state: &RenderState) -> Result<()> {
        let (caps, params) = resolve_draw_state(state)?;
        self.batcher.set_caps(&self.context, caps)?;
        self.batcher.set_params(&self.context, params)?;
        self.batcher.set_scissor(&self.context, state.scissor)
    }

    fn add_triangle(&mut self, vertices: &[PrimVertex; 3]) -> Result<()> {
        self.batcher.add_vertices(&self.context, vertices)
    }

    fn load_palette(&mut self, tex0: &Tex0) -> Result<()> {
        self.palettes.load(&self.context, tex0)
    }

    fn flush(&mut self) -> Result<()> {
        self.batcher.flush(&self.context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gs::registers::{Frame, PrimitiveMode, Scissor, Zbuf};

    fn state(prim_raw: u64) -> RenderState {
        RenderState {
            mode: PrimitiveMode::from(prim_raw),
            frame: Frame::from(2u64 | 10u64 << 16), // PSMCT32, 640 wide
            zbuf: Zbuf::from(0x01u64 << 24),        // PSMZ24
            tex0: Tex0::from(
                0x100u64 | 4u64 << 14 | 0x13u64 << 20 | 8u64 << 26 | 7u64 << 30,
            ),
            scissor: Scissor::default(),
            alpha: 0b01_00_01_00,
        }
    }

    #[test]
    fn test_untextured_state_resolves_without_texture_caps() {
        let (caps, params) = resolve_draw_state(&state(0x3 | 1 << 3)).unwrap();
        assert!(caps.texture.is_none());
        assert!(caps.blend.is_none());
        assert!(caps.gouraud);
        assert_eq!(caps.framebuffer_format, PixelFormat::Psmct32);
        assert_eq!(caps.depth_format, PixelFormat::Psmz24);
        assert_eq!(params.fb_base, 16384);
        assert_eq!(params.fb_stride, 640);
    }

    #[test]
    fn test_textured_blended_state_resolves_caps() {
        let (caps, params) = resolve_draw_state(&state(0x3 | 1 << 3 | 1 << 4 | 1 << 6)).unwrap();
        let texture = caps.texture.unwrap();
        assert_eq!(texture.format, PixelFormat::Psmt8);
        assert_eq!(texture.clut_format, PixelFormat::Psmct32);
        assert!(caps.blend.is_some());
        assert_eq!(params.tex_base, 0x100 * 256);
        assert_eq!(params.tex_width, 256.0);
        assert_eq!(params.tex_height, 128.0);
    }

    #[test]
    fn test_unsupported_framebuffer_format_rejected() {
        let mut bad = state(0x3);
        bad.frame.format_bits = 0x02; // PSMCT16
        assert!(resolve_draw_state(&bad).is_err());
    }

    #[test]
    fn test_reserved_blend_operand_rejected() {
        let mut bad = state(0x3 | 1 << 6);
        bad.alpha = 0b11; // reserved A operand
        assert!(resolve_draw_state(&bad).is_err());
    }
}
