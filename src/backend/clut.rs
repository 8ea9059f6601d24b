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

//! Palette (CLUT) loading
//!
//! Indexed textures resolve through a palette living in GS local memory.
//! [`PaletteLoader`] unpacks the referenced palette into the context's CLUT
//! texture with a small compute dispatch: one thread per entry reads the
//! packed color out of the memory buffer (through the PSMCT32 swizzle
//! table) and stores its 16-bit halves into two slots, low halves at the
//! entry index and high halves 256 slots up.
//!
//! 8-bit palettes occupy a 16x16 grid whose entry index is bit-permuted by
//! the hardware; 4-bit palettes are a flat 8x2 grid of 16 entries placed at
//! the CSA bank offset. Only PSMCT32 palette storage is implemented.

use log::{debug, trace};

use crate::core::error::{GsError, Result};
use crate::core::formats::PixelFormat;
use crate::core::gs::registers::Tex0;

use super::context::GsContext;
use super::pipeline::PipelineCache;

/// Pipeline identity for a palette load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClutCaps {
    /// 8-bit (256 entry) load, else 4-bit (16 entry)
    pub idx8: bool,
    /// Palette storage format in local memory
    pub clut_format: PixelFormat,
}

/// The 8-bit CLUT entry permutation: the hardware stores the middle bank
/// bits swapped, so entry `i` of the image lands at this slot.
pub fn clut_index_permutation(index: u32) -> u32 {
    (index & !0x18) | ((index & 0x08) << 1) | ((index & 0x10) >> 1)
}

/// Generate the WGSL compute program for one palette-load capability
pub fn generate_clut_shader(caps: &ClutCaps) -> Result<String> {
    if caps.clut_format != PixelFormat::Psmct32 {
        return Err(GsError::unsupported(format!(
            "palette storage format {:?}",
            caps.clut_format
        )));
    }
    let mut source = String::from(
        "struct ClutParams {\n\
         \x20   base: u32,\n\
         \x20   csa: u32,\n\
         }\n\
         var<push_constant> params: ClutParams;\n\
         \n\
         @group(0) @binding(0) var<storage, read_write> memory: array<atomic<u32>>;\n\
         @group(0) @binding(1) var swizzle: texture_2d<u32>;\n\
         @group(0) @binding(2) var clut: texture_storage_2d<r32uint, write>;\n\n",
    );
    if caps.idx8 {
        source.push_str(
            "@compute @workgroup_size(16, 16)\n\
             fn cs_main(@builtin(local_invocation_id) id: vec3<u32>) {\n\
             \x20   let raw = id.x + id.y * 16u;\n\
             \x20   let index = (raw & 0xffffffe7u) | ((raw & 0x08u) << 1u) | ((raw & 0x10u) >> 1u);\n",
        );
    } else {
        source.push_str(
            "@compute @workgroup_size(8, 2)\n\
             fn cs_main(@builtin(local_invocation_id) id: vec3<u32>) {\n\
             \x20   let index = id.x + id.y * 8u + params.csa * 16u;\n",
        );
    }
    source.push_str(
        "    let offset = textureLoad(swizzle, vec2<u32>(id.x, id.y), 0).x;\n\
         \x20   let color = atomicLoad(&memory[(params.base + offset) >> 2u]);\n\
         \x20   textureStore(clut, vec2<u32>(index, 0u), vec4<u32>(color & 0xffffu, 0u, 0u, 0u));\n\
         \x20   textureStore(clut, vec2<u32>(index + 256u, 0u), vec4<u32>(color >> 16u, 0u, 0u, 0u));\n\
         }\n",
    );
    Ok(source)
}

/// Identity of the last completed load, for redundant-load elision
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct LoadedPalette {
    base: u32,
    format_bits: u8,
    csa: u32,
    idx8: bool,
}

impl LoadedPalette {
    fn from_tex0(tex0: &Tex0, idx8: bool) -> Self {
        Self {
            base: tex0.clut_base,
            format_bits: tex0.clut_format_bits,
            csa: tex0.csa,
            idx8,
        }
    }
}

struct ClutPipeline {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

/// Dispatches palette unpack compute passes on demand
pub struct PaletteLoader {
    pipelines: PipelineCache<ClutCaps, ClutPipeline>,
    loaded: Option<LoadedPalette>,
}

impl PaletteLoader {
    pub fn new() -> Self {
        Self {
            pipelines: PipelineCache::new(),
            loaded: None,
        }
    }

    /// Forget the loaded palette so the next reference reloads it
    pub fn invalidate(&mut self) {
        self.loaded = None;
    }

    /// Load the palette referenced by `tex0` if it differs from the one
    /// already in the CLUT texture
    pub fn load(&mut self, context: &GsContext, tex0: &Tex0) -> Result<()> {
        let format = PixelFormat::from_bits(tex0.format_bits)?;
        if !format.is_indexed() {
            return Ok(());
        }
        let idx8 = format == PixelFormat::Psmt8;
        let wanted = LoadedPalette::from_tex0(tex0, idx8);
        if self.loaded == Some(wanted) {
            trace!("palette at {:#x} already loaded", tex0.clut_base);
            return Ok(());
        }

        let caps = ClutCaps {
            idx8,
            clut_format: PixelFormat::from_bits(tex0.clut_format_bits)?,
        };
        let device = context.device();
        let entry = self.pipelines.get_or_build(&caps, |caps| {
            debug!("building palette-load pipeline for {:?}", caps);
            build_clut_pipeline(device, caps)
        })?;

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("gs_clut_load_bind_group"),
            layout: &entry.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: context.memory_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(
                        context.swizzle_view(caps.clut_format)?,
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(context.clut_view()),
                },
            ],
        });

        debug!(
            "palette load: base {:#x}, csa {}, {}",
            tex0.clut_base,
            tex0.csa,
            if idx8 { "8-bit" } else { "4-bit" }
        );
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("gs_clut_load"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("gs_clut_load"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&entry.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_push_constants(0, bytemuck::cast_slice(&[tex0.clut_base, tex0.csa]));
            pass.dispatch_workgroups(1, 1, 1);
        }
        context.queue().submit(Some(encoder.finish()));
        self.loaded = Some(wanted);
        Ok(())
    }
}

impl Default for PaletteLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn build_clut_pipeline(device: &wgpu::Device, caps: &ClutCaps) -> Result<ClutPipeline> {
    let source = generate_clut_shader(caps)?;
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("gs_clut_load"),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("gs_clut_load_layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Uint,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: wgpu::TextureFormat::R32Uint,
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            },
        ],
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("gs_clut_load_layout"),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[wgpu::PushConstantRange {
            stages: wgpu::ShaderStages::COMPUTE,
            range: 0..8,
        }],
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some("gs_clut_load"),
        layout: Some(&layout),
        module: &module,
        entry_point: Some("cs_main"),
        compilation_options: Default::default(),
        cache: None,
    });
    Ok(ClutPipeline {
        pipeline,
        bind_group_layout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_permutation_known_vectors() {
        // Entries in the swapped middle banks trade places.
        assert_eq!(clut_index_permutation(8), 16);
        assert_eq!(clut_index_permutation(16), 8);
        // Entries with both (or neither) bank bits set stay put.
        assert_eq!(clut_index_permutation(24), 24);
        assert_eq!(clut_index_permutation(0), 0);
        assert_eq!(clut_index_permutation(7), 7);
    }

    #[test]
    fn test_permutation_is_a_bijection_over_256_entries() {
        let mapped: HashSet<u32> = (0..256).map(clut_index_permutation).collect();
        assert_eq!(mapped.len(), 256);
        assert!(mapped.iter().all(|&i| i < 256));
    }

    #[test]
    fn test_permutation_is_an_involution() {
        for i in 0..256 {
            assert_eq!(clut_index_permutation(clut_index_permutation(i)), i);
        }
    }

    #[test]
    fn test_shader_generation_per_width() {
        let idx8 = generate_clut_shader(&ClutCaps {
            idx8: true,
            clut_format: PixelFormat::Psmct32,
        })
        .unwrap();
        assert!(idx8.contains("@workgroup_size(16, 16)"));
        assert!(idx8.contains("(raw & 0x08u) << 1u"));

        let idx4 = generate_clut_shader(&ClutCaps {
            idx8: false,
            clut_format: PixelFormat::Psmct32,
        })
        .unwrap();
        assert!(idx4.contains("@workgroup_size(8, 2)"));
        assert!(idx4.contains("params.csa * 16u"));
        assert!(!idx4.contains("<< 1u"));
    }

    #[test]
    fn test_non_psmct32_palette_storage_rejected() {
        let result = generate_clut_shader(&ClutCaps {
            idx8: true,
            clut_format: PixelFormat::Psmct16,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_redundant_load_identity() {
        let tex0 = Tex0 {
            clut_base: 0x1000,
            clut_format_bits: 0,
            csa: 2,
            ..Default::default()
        };
        let first = LoadedPalette::from_tex0(&tex0, true);
        assert_eq!(first, LoadedPalette::from_tex0(&tex0, true));
        // Any field change re-triggers the load.
        let moved = Tex0 {
            clut_base: 0x2000,
            ..tex0
        };
        assert_ne!(first, LoadedPalette::from_tex0(&moved, true));
        assert_ne!(first, LoadedPalette::from_tex0(&tex0, false));
    }
}
