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

//! GPU context: device handles and the emulated GS memory resources
//!
//! [`GsContext`] owns everything with device lifetime: the 4 MiB storage
//! buffer standing in for unified GS local memory, the palette texture, the
//! per-format swizzle-table textures, and the dummy render attachment draws
//! bind while writing their real output into the storage buffer.
//!
//! Device and queue bootstrap is the caller's job; `GsContext::new` takes
//! them ready-made and only builds GS-side resources on top.

use std::collections::HashMap;

use log::{debug, info};

use crate::core::error::{GsError, Result};
use crate::core::formats::{build_swizzle_table, PixelFormat};

use super::shadergen::{DRAW_AREA_SIZE, PUSH_CONSTANT_SIZE};

/// Size of GS local memory
pub const MEMORY_SIZE: u64 = 4 * 1024 * 1024;

/// Palette texture width: 512 16-bit entry slots for the active palette
/// (low halves at `i`, high halves at `i + 256`) plus CSA bank headroom
pub const CLUT_SLOTS: u32 = 1024;

/// Formats that get an uploaded swizzle table
const TABLE_FORMATS: [PixelFormat; 7] = [
    PixelFormat::Psmct32,
    PixelFormat::Psmct16,
    PixelFormat::Psmct16s,
    PixelFormat::Psmt8,
    PixelFormat::Psmt4,
    PixelFormat::Psmz32,
    PixelFormat::Psmz16s,
];

/// The table format a pixel format addresses through: 24-bit formats alias
/// their 32-bit sibling's layout
pub fn canonical_table_format(format: PixelFormat) -> PixelFormat {
    match format {
        PixelFormat::Psmct24 => PixelFormat::Psmct32,
        PixelFormat::Psmz24 => PixelFormat::Psmz32,
        other => other,
    }
}

struct SwizzleTable {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// Device-lifetime state of the GS backend
pub struct GsContext {
    device: wgpu::Device,
    queue: wgpu::Queue,

    memory: wgpu::Buffer,
    clut: wgpu::Texture,
    clut_view: wgpu::TextureView,
    swizzle_tables: HashMap<PixelFormat, SwizzleTable>,

    _draw_target: wgpu::Texture,
    draw_target_view: wgpu::TextureView,
}

impl GsContext {
    /// Build the GS resources on an existing device
    ///
    /// # Errors
    ///
    /// Returns [`GsError::ResourceCreation`] when the device's limits cannot
    /// carry the backend (push constant range, storage buffer size).
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Result<Self> {
        let limits = device.limits();
        if limits.max_push_constant_size < PUSH_CONSTANT_SIZE {
            return Err(GsError::ResourceCreation {
                what: format!(
                    "push constant range of {} bytes (device allows {})",
                    PUSH_CONSTANT_SIZE, limits.max_push_constant_size
                ),
            });
        }
        if (limits.max_storage_buffer_binding_size as u64) < MEMORY_SIZE {
            return Err(GsError::ResourceCreation {
                what: format!("{} byte local memory buffer", MEMORY_SIZE),
            });
        }

        let memory = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("gs_local_memory"),
            size: MEMORY_SIZE,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let clut = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("gs_clut"),
            size: wgpu::Extent3d {
                width: CLUT_SLOTS,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R32Uint,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let clut_view = clut.create_view(&wgpu::TextureViewDescriptor::default());

        let mut swizzle_tables = HashMap::new();
        for format in TABLE_FORMATS {
            swizzle_tables.insert(format, Self::upload_swizzle_table(&device, &queue, format));
        }

        let draw_target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("gs_draw_target"),
            size: wgpu::Extent3d {
                width: DRAW_AREA_SIZE,
                height: DRAW_AREA_SIZE,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let draw_target_view = draw_target.create_view(&wgpu::TextureViewDescriptor::default());

        info!(
            "GS context ready: {} KiB local memory, {} swizzle tables",
            MEMORY_SIZE / 1024,
            TABLE_FORMATS.len()
        );
        Ok(Self {
            device,
            queue,
            memory,
            clut,
            clut_view,
            swizzle_tables,
            _draw_target: draw_target,
            draw_target_view,
        })
    }

    fn upload_swizzle_table(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        format: PixelFormat,
    ) -> SwizzleTable {
        let (width, height) = format.page_size();
        let table = build_swizzle_table(format);
        debug!("uploading {:?} swizzle table ({}x{})", format, width, height);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("gs_swizzle_table"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R32Uint,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&table),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        SwizzleTable {
            _texture: texture,
            view,
        }
    }

    /// Bulk-initialize local memory from the CPU
    ///
    /// This is the only direct CPU write into emulated memory; everything
    /// after initialization goes through draws and palette loads.
    pub fn write_memory(&self, offset: u64, data: &[u8]) {
        self.queue.write_buffer(&self.memory, offset, data);
    }

    /// Zero the whole of local memory
    pub fn clear_memory(&self) {
        self.write_memory(0, &vec![0u8; MEMORY_SIZE as usize]);
    }

    /// Whether the device serializes overlapping read-modify-write fragments
    /// within one draw. Always false here: WGSL has no fragment interlock,
    /// so only cross-draw ordering (the flush protocol) is guaranteed.
    pub fn supports_fragment_interlock(&self) -> bool {
        false
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn memory_buffer(&self) -> &wgpu::Buffer {
        &self.memory
    }

    pub fn clut_texture(&self) -> &wgpu::Texture {
        &self.clut
    }

    pub fn clut_view(&self) -> &wgpu::TextureView {
        &self.clut_view
    }

    pub fn draw_target_view(&self) -> &wgpu::TextureView {
        &self.draw_target_view
    }

    /// Swizzle-table view for a format, canonicalized so the 24-bit formats
    /// share their 32-bit sibling's table
    pub fn swizzle_view(&self, format: PixelFormat) -> Result<&wgpu::TextureView> {
        let canonical = canonical_table_format(format);
        self.swizzle_tables
            .get(&canonical)
            .map(|table| &table.view)
            .ok_or_else(|| GsError::unsupported(format!("swizzle table for {:?}", format)))
    }
}
