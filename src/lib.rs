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

//! gsrx: A PlayStation 2 Graphics Synthesizer (GS) rendering backend
//!
//! The GS is driven by a stream of 64-bit register writes: attribute
//! registers latch colors and texel coordinates, position writes kick
//! vertices, and completed primitives draw into a unified 4 MiB local
//! memory with a tiled per-format layout. This crate consumes that stream
//! and renders it on a modern GPU through wgpu, keeping the emulated memory
//! authoritative: generated shaders read and write it directly, swizzled
//! addressing included, instead of rendering to native textures.
//!
//! # Architecture
//!
//! - [`core`]: device-independent emulation (register decoding, primitive
//!   assembly in [`Gs`], pixel-format addressing, the blend equation)
//! - [`backend`]: the wgpu side, where [`GsBackend`] implements [`RenderSink`],
//!   batching triangles and flushing them through cached, capability-keyed
//!   pipelines
//!
//! # Example
//!
//! ```no_run
//! # fn run(device: wgpu::Device, queue: wgpu::Queue) -> gsrx::Result<()> {
//! let backend = gsrx::GsBackend::new(device, queue)?;
//! let mut gs = gsrx::Gs::new(backend);
//!
//! // Feed decoded register writes:
//! gs.write_register(0x00, 0x3 | 1 << 3)?; // PRIM: gouraud triangle list
//! // ... RGBAQ / XYZ2 writes per vertex ...
//!
//! gs.flush()?;
//! gs.sink_mut().end_frame()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! All fallible operations return [`core::error::Result<T>`], an alias for
//! `Result<T, GsError>`.

pub mod backend;
pub mod core;

// Re-export commonly used types
pub use backend::{GsBackend, DRAW_AREA_SIZE, MEMORY_SIZE};
pub use core::error::{GsError, Result};
pub use core::gs::{Gs, PrimVertex, RenderSink, RenderState};
