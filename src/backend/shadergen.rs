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

//! WGSL generation for draw pipelines
//!
//! Draw shaders are specialized per [`DrawCaps`]: one capability key, one
//! generated program, one cached pipeline. The generated fragment stage
//! bypasses the fixed-function color path entirely: it addresses the
//! emulated GS memory buffer directly through the per-format swizzle
//! tables, decodes and re-packs pixels itself, and evaluates the GS blend
//! equation inline. The render target attachment is a dummy; all real
//! output goes through the storage buffer.
//!
//! Format- and blend-specific numeric behavior is defined by
//! [`crate::core::formats`] and [`crate::core::blend`]; this module emits
//! the WGSL equivalents, so the CPU reference implementations and the
//! shaders can be checked against each other.
//!
//! All memory traffic is atomic. WGSL has no fragment interlock, so
//! read-modify-write sequences within a single draw are not mutually
//! excluded; sub-word writes use and-then-or so neighboring pixels in the
//! same word never tear each other, and ordering across draws comes from
//! the flush protocol.

use crate::core::blend::{BlendAlphaInput, BlendColorInput, BlendConfig};
use crate::core::error::{GsError, Result};
use crate::core::formats::PixelFormat;

/// Side of the drawing coordinate space, in pixels
///
/// The vertex stage maps `[0, DRAW_AREA_SIZE)` window pixels to clip space;
/// the dummy color attachment and viewport share this extent.
pub const DRAW_AREA_SIZE: u32 = 2048;

/// Texture-sampling capabilities of a draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureCaps {
    pub format: PixelFormat,
    /// Palette storage format; meaningful only for indexed texture formats
    pub clut_format: PixelFormat,
}

/// Complete pipeline identity for a draw
///
/// Two draws with equal caps can share a pipeline; any field difference
/// requires a distinct one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawCaps {
    pub gouraud: bool,
    pub framebuffer_format: PixelFormat,
    pub depth_format: PixelFormat,
    pub texture: Option<TextureCaps>,
    pub blend: Option<BlendConfig>,
}

impl DrawCaps {
    /// Check that every format in the key has an implemented codec path
    pub fn validate(&self) -> Result<()> {
        match self.framebuffer_format {
            PixelFormat::Psmct32 | PixelFormat::Psmct24 | PixelFormat::Psmct16s => {}
            other => {
                return Err(GsError::unsupported(format!(
                    "framebuffer format {:?}",
                    other
                )))
            }
        }
        if let Some(texture) = &self.texture {
            match texture.format {
                PixelFormat::Psmct32 | PixelFormat::Psmct16s | PixelFormat::Psmt8
                | PixelFormat::Psmt4 => {}
                other => {
                    return Err(GsError::unsupported(format!("texture format {:?}", other)))
                }
            }
            if texture.format.is_indexed() && texture.clut_format != PixelFormat::Psmct32 {
                return Err(GsError::unsupported(format!(
                    "palette storage format {:?}",
                    texture.clut_format
                )));
            }
        }
        Ok(())
    }
}

/// Push constant block shared by every draw pipeline; layout must match the
/// `params` struct emitted into the WGSL prelude
pub const PUSH_CONSTANT_SIZE: u32 = 40;

/// Generate the complete WGSL module (vertex + fragment) for `caps`
pub fn generate_draw_shader(caps: &DrawCaps) -> Result<String> {
    caps.validate()?;

    let mut source = String::with_capacity(8 * 1024);
    source.push_str(&prelude(caps));
    source.push_str(&vertex_stage());
    source.push_str(&address_helpers(caps));
    source.push_str(&format_helpers());
    source.push_str(&fragment_stage(caps));
    Ok(source)
}

fn prelude(caps: &DrawCaps) -> String {
    let mut out = String::new();
    out.push_str(
        "struct DrawParams {\n\
         \x20   fb_base: u32,\n\
         \x20   fb_stride: u32,\n\
         \x20   depth_base: u32,\n\
         \x20   depth_stride: u32,\n\
         \x20   tex_base: u32,\n\
         \x20   tex_stride: u32,\n\
         \x20   tex_csa: u32,\n\
         \x20   _pad: u32,\n\
         \x20   tex_width: f32,\n\
         \x20   tex_height: f32,\n\
         }\n\
         var<push_constant> params: DrawParams;\n\
         \n\
         @group(0) @binding(0) var<storage, read_write> memory: array<atomic<u32>>;\n\
         @group(0) @binding(1) var fb_swizzle: texture_2d<u32>;\n",
    );
    if let Some(texture) = &caps.texture {
        out.push_str("@group(0) @binding(2) var tex_swizzle: texture_2d<u32>;\n");
        if texture.format.is_indexed() {
            out.push_str("@group(0) @binding(3) var clut: texture_2d<u32>;\n");
        }
    }
    out.push('\n');
    out
}

fn vertex_stage() -> String {
    format!(
        "struct VertexInput {{\n\
         \x20   @location(0) position: vec2<f32>,\n\
         \x20   @location(1) depth: u32,\n\
         \x20   @location(2) color: u32,\n\
         \x20   @location(3) texcoord: vec3<f32>,\n\
         \x20   @location(4) fog: f32,\n\
         }}\n\
         \n\
         struct VertexOutput {{\n\
         \x20   @builtin(position) position: vec4<f32>,\n\
         \x20   @location(0) color: vec4<f32>,\n\
         \x20   @location(1) texcoord: vec3<f32>,\n\
         }}\n\
         \n\
         @vertex\n\
         fn vs_main(in: VertexInput) -> VertexOutput {{\n\
         \x20   var out: VertexOutput;\n\
         \x20   let ndc_x = in.position.x / {size}.0 * 2.0 - 1.0;\n\
         \x20   let ndc_y = 1.0 - in.position.y / {size}.0 * 2.0;\n\
         \x20   out.position = vec4<f32>(ndc_x, ndc_y, f32(in.depth) / 4294967296.0, 1.0);\n\
         \x20   out.color = unpack4x8unorm(in.color);\n\
         \x20   out.texcoord = in.texcoord;\n\
         \x20   return out;\n\
         }}\n\n",
        size = DRAW_AREA_SIZE
    )
}

/// Per-buffer address functions: page arithmetic plus the swizzle-table
/// lookup, mirroring `core::formats::pixel_address`
fn address_helpers(caps: &DrawCaps) -> String {
    let mut out = String::new();
    out.push_str(&address_fn(
        "fb_address",
        "fb_swizzle",
        "params.fb_base",
        "params.fb_stride",
        caps.framebuffer_format,
    ));
    if let Some(texture) = &caps.texture {
        out.push_str(&address_fn(
            "tex_address",
            "tex_swizzle",
            "params.tex_base",
            "params.tex_stride",
            texture.format,
        ));
    }
    out
}

fn address_fn(name: &str, table: &str, base: &str, stride: &str, format: PixelFormat) -> String {
    let (page_w, page_h) = format.page_size();
    // 4-bit buffers address nibbles; bases arrive in bytes.
    let (page_units, base_scale) = if format.bits_per_pixel() == 4 {
        (16384u32, " * 2u")
    } else {
        (8192u32, "")
    };
    format!(
        "fn {name}(x: u32, y: u32) -> u32 {{\n\
         \x20   let page = x / {page_w}u + (y / {page_h}u) * max({stride} / {page_w}u, 1u);\n\
         \x20   let offset = textureLoad({table}, vec2<u32>(x % {page_w}u, y % {page_h}u), 0).x;\n\
         \x20   return {base}{base_scale} + page * {page_units}u + offset;\n\
         }}\n\n"
    )
}

/// Packed-pixel codecs shared by texture fetch and framebuffer access
fn format_helpers() -> String {
    "fn decode_rgba16(half: u32) -> vec4<f32> {\n\
     \x20   let r = f32((half & 0x1fu) << 3u);\n\
     \x20   let g = f32(((half >> 5u) & 0x1fu) << 3u);\n\
     \x20   let b = f32(((half >> 10u) & 0x1fu) << 3u);\n\
     \x20   let a = f32(((half >> 15u) & 1u) * 128u);\n\
     \x20   return vec4<f32>(r, g, b, a) / 255.0;\n\
     }\n\
     \n\
     fn encode_rgba16(color: vec4<f32>) -> u32 {\n\
     \x20   let quant = vec3<u32>(color.rgb * 255.0 + vec3<f32>(0.5)) >> vec3<u32>(3u);\n\
     \x20   let alpha = select(0u, 0x8000u, color.a >= 0.25098);\n\
     \x20   return quant.x | (quant.y << 5u) | (quant.z << 10u) | alpha;\n\
     }\n\
     \n\
     fn load_halfword(address: u32) -> u32 {\n\
     \x20   let word = atomicLoad(&memory[address >> 2u]);\n\
     \x20   return (word >> (((address >> 1u) & 1u) * 16u)) & 0xffffu;\n\
     }\n\
     \n\
     fn store_halfword(address: u32, value: u32) {\n\
     \x20   let shift = ((address >> 1u) & 1u) * 16u;\n\
     \x20   atomicAnd(&memory[address >> 2u], ~(0xffffu << shift));\n\
     \x20   atomicOr(&memory[address >> 2u], (value & 0xffffu) << shift);\n\
     }\n\n"
        .to_string()
}

/// Texture fetch: address, raw texel, palette resolution, decode
fn texture_fetch(texture: &TextureCaps) -> String {
    let mut out = String::new();
    if texture.format.is_indexed() {
        // Palette slots hold 16-bit halves of the 32-bit entry: low halves
        // at the index, high halves 256 slots up.
        out.push_str(
            "fn fetch_clut(index: u32) -> vec4<f32> {\n\
             \x20   let low = textureLoad(clut, vec2<u32>(index, 0u), 0).x & 0xffffu;\n\
             \x20   let high = textureLoad(clut, vec2<u32>(index + 256u, 0u), 0).x & 0xffffu;\n\
             \x20   return unpack4x8unorm(low | (high << 16u));\n\
             }\n\n",
        );
    }
    out.push_str("fn fetch_texel(x: u32, y: u32) -> vec4<f32> {\n");
    out.push_str("    let address = tex_address(x, y);\n");
    match texture.format {
        PixelFormat::Psmct32 => {
            out.push_str("    return unpack4x8unorm(atomicLoad(&memory[address >> 2u]));\n");
        }
        PixelFormat::Psmct16s => {
            out.push_str("    return decode_rgba16(load_halfword(address));\n");
        }
        PixelFormat::Psmt8 => {
            out.push_str(
                "    let word = atomicLoad(&memory[address >> 2u]);\n\
                 \x20   let index = (word >> ((address & 3u) * 8u)) & 0xffu;\n\
                 \x20   return fetch_clut(index);\n",
            );
        }
        PixelFormat::Psmt4 => {
            out.push_str(
                "    let word = atomicLoad(&memory[address >> 3u]);\n\
                 \x20   let index = (word >> ((address & 7u) * 4u)) & 0xfu;\n\
                 \x20   return fetch_clut(index + params.tex_csa * 16u);\n",
            );
        }
        // validate() rejects everything else before generation.
        _ => unreachable!(),
    }
    out.push_str("}\n\n");
    out
}

/// Framebuffer access specialized to the render target format
fn framebuffer_access(format: PixelFormat) -> String {
    match format {
        PixelFormat::Psmct32 => "fn read_dest(address: u32) -> vec4<f32> {\n\
             \x20   return unpack4x8unorm(atomicLoad(&memory[address >> 2u]));\n\
             }\n\
             \n\
             fn write_dest(address: u32, color: vec4<f32>) {\n\
             \x20   atomicStore(&memory[address >> 2u], pack4x8unorm(color));\n\
             }\n\n"
            .to_string(),
        // 24-bit leaves the destination's high byte alone and reads back
        // with the fixed-point opaque alpha.
        PixelFormat::Psmct24 => "fn read_dest(address: u32) -> vec4<f32> {\n\
             \x20   let word = atomicLoad(&memory[address >> 2u]) & 0xffffffu;\n\
             \x20   return unpack4x8unorm(word | 0x80000000u);\n\
             }\n\
             \n\
             fn write_dest(address: u32, color: vec4<f32>) {\n\
             \x20   let packed = pack4x8unorm(color) & 0xffffffu;\n\
             \x20   atomicAnd(&memory[address >> 2u], 0xff000000u);\n\
             \x20   atomicOr(&memory[address >> 2u], packed);\n\
             }\n\n"
            .to_string(),
        PixelFormat::Psmct16s => "fn read_dest(address: u32) -> vec4<f32> {\n\
             \x20   return decode_rgba16(load_halfword(address));\n\
             }\n\
             \n\
             fn write_dest(address: u32, color: vec4<f32>) {\n\
             \x20   store_halfword(address, encode_rgba16(color));\n\
             }\n\n"
            .to_string(),
        _ => unreachable!(),
    }
}

fn blend_operand(input: BlendColorInput) -> &'static str {
    match input {
        BlendColorInput::Source => "color.rgb",
        BlendColorInput::Dest => "dest.rgb",
        BlendColorInput::Zero => "vec3<f32>(0.0)",
    }
}

fn blend_alpha_operand(input: BlendAlphaInput) -> &'static str {
    match input {
        BlendAlphaInput::SourceAlpha => "color.a",
        BlendAlphaInput::DestAlpha => "dest.a",
    }
}

fn fragment_stage(caps: &DrawCaps) -> String {
    let mut out = String::new();
    if let Some(texture) = &caps.texture {
        out.push_str(&texture_fetch(texture));
    }
    out.push_str(&framebuffer_access(caps.framebuffer_format));

    out.push_str(
        "@fragment\n\
         fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {\n\
         \x20   var color = in.color;\n",
    );
    if caps.texture.is_some() {
        // ST carries the perspective divisor in q; modulate doubles against
        // the 0x80-is-one vertex color.
        out.push_str(
            "    let st = in.texcoord.xy / in.texcoord.z;\n\
             \x20   let tx = u32(clamp(st.x * params.tex_width, 0.0, params.tex_width - 1.0));\n\
             \x20   let ty = u32(clamp(st.y * params.tex_height, 0.0, params.tex_height - 1.0));\n\
             \x20   let texel = fetch_texel(tx, ty);\n\
             \x20   color = clamp(texel * color * 2.0, vec4<f32>(0.0), vec4<f32>(1.0));\n",
        );
    }
    out.push_str(
        "    let fx = u32(in.position.x);\n\
         \x20   let fy = u32(in.position.y);\n\
         \x20   let address = fb_address(fx, fy);\n",
    );
    if let Some(blend) = &caps.blend {
        out.push_str(&format!(
            "    let dest = read_dest(address);\n\
             \x20   let blended = clamp(({a} - {b}) * {c} * 2.0 + {d}, vec3<f32>(0.0), vec3<f32>(1.0));\n\
             \x20   color = vec4<f32>(blended, color.a);\n",
            a = blend_operand(blend.a),
            b = blend_operand(blend.b),
            c = blend_alpha_operand(blend.c),
            d = blend_operand(blend.d),
        ));
    }
    out.push_str(
        "    write_dest(address, color);\n\
         \x20   return vec4<f32>(0.0);\n\
         }\n",
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_caps() -> DrawCaps {
        DrawCaps {
            gouraud: true,
            framebuffer_format: PixelFormat::Psmct32,
            depth_format: PixelFormat::Psmz32,
            texture: None,
            blend: None,
        }
    }

    #[test]
    fn test_untextured_shader_has_no_texture_bindings() {
        let source = generate_draw_shader(&base_caps()).unwrap();
        assert!(source.contains("fn vs_main"));
        assert!(source.contains("fn fs_main"));
        assert!(!source.contains("tex_swizzle"));
        assert!(!source.contains("fetch_texel"));
    }

    #[test]
    fn test_indexed_texture_shader_resolves_palette_halves() {
        let mut caps = base_caps();
        caps.texture = Some(TextureCaps {
            format: PixelFormat::Psmt8,
            clut_format: PixelFormat::Psmct32,
        });
        let source = generate_draw_shader(&caps).unwrap();
        assert!(source.contains("var clut: texture_2d<u32>"));
        assert!(source.contains("index + 256u"));
        assert!(source.contains("& 0xffu"));
    }

    #[test]
    fn test_psmt4_shader_uses_nibble_addressing_and_csa() {
        let mut caps = base_caps();
        caps.texture = Some(TextureCaps {
            format: PixelFormat::Psmt4,
            clut_format: PixelFormat::Psmct32,
        });
        let source = generate_draw_shader(&caps).unwrap();
        assert!(source.contains("address >> 3u"));
        assert!(source.contains("params.tex_csa * 16u"));
        // Nibble page units with the byte base doubled.
        assert!(source.contains("16384u"));
        assert!(source.contains("params.tex_base * 2u"));
    }

    #[test]
    fn test_psmct24_write_preserves_high_byte() {
        let mut caps = base_caps();
        caps.framebuffer_format = PixelFormat::Psmct24;
        let source = generate_draw_shader(&caps).unwrap();
        assert!(source.contains("atomicAnd(&memory[address >> 2u], 0xff000000u)"));
        assert!(source.contains("atomicOr"));
    }

    #[test]
    fn test_blend_equation_emitted_from_operands() {
        let mut caps = base_caps();
        caps.blend = Some(BlendConfig::from_register(0b01_00_01_00).unwrap());
        let source = generate_draw_shader(&caps).unwrap();
        assert!(source.contains("(color.rgb - dest.rgb) * color.a * 2.0 + dest.rgb"));
        assert!(source.contains("let dest = read_dest(address);"));
    }

    #[test]
    fn test_unblended_shader_skips_destination_read() {
        let source = generate_draw_shader(&base_caps()).unwrap();
        assert!(!source.contains("read_dest(address)"));
    }

    #[test]
    fn test_unsupported_combinations_rejected() {
        let mut caps = base_caps();
        caps.framebuffer_format = PixelFormat::Psmct16;
        assert!(generate_draw_shader(&caps).is_err());

        let mut caps = base_caps();
        caps.texture = Some(TextureCaps {
            format: PixelFormat::Psmt8,
            clut_format: PixelFormat::Psmct16,
        });
        assert!(generate_draw_shader(&caps).is_err());
    }
}
