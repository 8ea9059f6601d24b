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

//! GS register front-end and primitive assembly
//!
//! [`Gs`] consumes the 64-bit register write stream and turns position
//! writes ("vertex kicks") into assembled triangles. Attribute registers
//! (RGBAQ, ST, UV, FOG) latch values that each kick snapshots together with
//! its position; topology and per-primitive flags come from PRIM/PRMODE.
//!
//! Assembled triangles and the draw state they need are handed to a
//! [`RenderSink`]. The GPU backend implements the sink; tests substitute a
//! recording one, so everything in this module runs without a device.

pub mod registers;

use bytemuck::{Pod, Zeroable};
use log::{debug, trace, warn};

use self::registers::{
    Frame, Position, PrimitiveKind, PrimitiveMode, Register, Rgbaq, Scissor, St, Tex0, Uv,
    XyOffset, Zbuf,
};
use super::error::Result;

/// One assembled triangle vertex, laid out for direct GPU upload
///
/// Positions are in drawing-area pixels (offset already subtracted), color
/// is packed ABGR, and texel coordinates are always in ST form with the
/// perspective divisor in `q` (UV kicks are converted on assembly).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct PrimVertex {
    pub x: f32,
    pub y: f32,
    pub z: u32,
    pub color: u32,
    pub s: f32,
    pub t: f32,
    pub q: f32,
    pub fog: f32,
}

/// Draw state snapshot accompanying assembled triangles
///
/// One context's worth of state, selected by the active primitive's CTXT
/// bit, plus the attribute flags of the primitive itself. The ALPHA value
/// stays raw; the sink decodes it only when `mode.alpha_blending` is set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderState {
    pub mode: PrimitiveMode,
    pub frame: Frame,
    pub zbuf: Zbuf,
    pub tex0: Tex0,
    pub scissor: Scissor,
    pub alpha: u64,
}

/// Consumer of assembled primitives and their draw state
///
/// Calls arrive in stream order: `set_render_state` precedes every triangle
/// it applies to (the sink is expected to deduplicate), `load_palette`
/// follows TEX0 writes that request a palette buffer load, and `flush`
/// marks points where buffered work must reach memory (TEXFLUSH, end of
/// frame).
pub trait RenderSink {
    fn set_render_state(&mut self, state: &RenderState) -> Result<()>;
    fn add_triangle(&mut self, vertices: &[PrimVertex; 3]) -> Result<()>;
    fn load_palette(&mut self, tex0: &Tex0) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

/// Attribute snapshot taken at each vertex kick
#[derive(Debug, Clone, Copy, Default)]
struct KickVertex {
    position: Position,
    color: u32,
    s: f32,
    t: f32,
    q: f32,
    u: f32,
    v: f32,
}

/// Per-context drawing environment
#[derive(Debug, Clone, Copy, Default)]
struct DrawContext {
    frame: Frame,
    zbuf: Zbuf,
    tex0: Tex0,
    scissor: Scissor,
    xy_offset: XyOffset,
    alpha: u64,
}

/// The GS register machine
pub struct Gs<S: RenderSink> {
    sink: S,

    /// Latched PRIM state (topology + attributes)
    prim: PrimitiveMode,
    /// Raw PRMODE value, applied over PRIM when PRMODECONT selects it
    prmode_raw: u64,
    /// PRMODECONT: true uses PRIM's attributes, false uses PRMODE's
    use_prim_attributes: bool,

    /// Latched vertex attribute registers
    rgbaq: Rgbaq,
    st: St,
    uv: Uv,
    fog: u8,

    contexts: [DrawContext; 2],

    /// Assembly slots; index 2 holds the oldest kicked vertex, 0 the newest
    slots: [KickVertex; 3],
    /// Kicks remaining until the current primitive completes
    pending: u32,

    /// When false, drawing kicks still assemble but emit nothing
    draw_enabled: bool,
}

impl<S: RenderSink> Gs<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            prim: PrimitiveMode::from(0),
            prmode_raw: 0,
            use_prim_attributes: true,
            rgbaq: Rgbaq::from(0),
            st: St::from(0),
            uv: Uv::from(0),
            fog: 0,
            contexts: [DrawContext::default(); 2],
            slots: [KickVertex::default(); 3],
            pending: 0,
            draw_enabled: true,
        }
    }

    /// Gate geometry emission without disturbing assembly state
    pub fn set_draw_enabled(&mut self, enabled: bool) {
        self.draw_enabled = enabled;
    }

    /// Host-to-local transfer stub; image upload paths are the caller's job
    pub fn process_host_to_local(&mut self, data: &[u8]) {
        warn!("host-to-local transfer ignored ({} bytes)", data.len());
    }

    /// Local-to-host transfer stub
    pub fn process_local_to_host(&mut self) {
        warn!("local-to-host transfer ignored");
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// The attribute set in effect for the current primitive
    fn mode(&self) -> PrimitiveMode {
        if self.use_prim_attributes {
            self.prim
        } else {
            self.prim.with_attributes_from(self.prmode_raw)
        }
    }

    /// Process one 64-bit register write
    pub fn write_register(&mut self, address: u8, value: u64) -> Result<()> {
        let Some(register) = Register::from_address(address) else {
            trace!("unhandled GS register write: {:#04x} <- {:#018x}", address, value);
            return Ok(());
        };
        trace!("{:?} <- {:#018x}", register, value);
        match register {
            Register::Prim => {
                let prim = PrimitiveMode::from(value);
                // A topology change invalidates work batched under the old
                // type; vertices in flight must reach memory first.
                if prim.kind != self.prim.kind {
                    self.sink.flush()?;
                }
                self.prim = prim;
                self.pending = prim
                    .kind
                    .map(PrimitiveKind::vertices_per_kick)
                    .unwrap_or(0);
            }
            Register::Rgbaq => self.rgbaq = Rgbaq::from(value),
            Register::St => self.st = St::from(value),
            Register::Uv => self.uv = Uv::from(value),
            Register::Fog => self.fog = (value >> 56) as u8,
            Register::Xyzf2 => self.vertex_kick(Position::from_xyzf(value), true)?,
            Register::Xyzf3 => self.vertex_kick(Position::from_xyzf(value), false)?,
            // The fog-less kicks take the latched FOG register value.
            Register::Xyz2 | Register::Xyz3 => {
                let position = Position {
                    fog: self.fog,
                    ..Position::from_xyz(value)
                };
                self.vertex_kick(position, register == Register::Xyz2)?;
            }
            Register::Tex0_1 | Register::Tex0_2 => {
                let context = if register == Register::Tex0_1 { 0 } else { 1 };
                let tex0 = Tex0::from(value);
                if tex0.requests_clut_load() {
                    self.sink.load_palette(&tex0)?;
                }
                self.contexts[context].tex0 = tex0;
            }
            Register::PrModeCont => self.use_prim_attributes = value & 1 != 0,
            Register::PrMode => self.prmode_raw = value,
            Register::TexFlush => self.sink.flush()?,
            Register::XyOffset1 => self.contexts[0].xy_offset = XyOffset::from(value),
            Register::XyOffset2 => self.contexts[1].xy_offset = XyOffset::from(value),
            Register::Scissor1 => self.contexts[0].scissor = Scissor::from(value),
            Register::Scissor2 => self.contexts[1].scissor = Scissor::from(value),
            Register::Alpha1 => self.contexts[0].alpha = value,
            Register::Alpha2 => self.contexts[1].alpha = value,
            Register::Frame1 => self.contexts[0].frame = Frame::from(value),
            Register::Frame2 => self.contexts[1].frame = Frame::from(value),
            Register::Zbuf1 => self.contexts[0].zbuf = Zbuf::from(value),
            Register::Zbuf2 => self.contexts[1].zbuf = Zbuf::from(value),
        }
        Ok(())
    }

    /// Snapshot the latched attributes with `position` and advance primitive
    /// assembly; a completed primitive is emitted unless `drawing_kick` is
    /// false (the XYZ3/XYZF3 "no draw" variants).
    fn vertex_kick(&mut self, position: Position, drawing_kick: bool) -> Result<()> {
        if self.pending == 0 {
            return Ok(());
        }
        let vertex = KickVertex {
            position,
            color: self.rgbaq.packed_color(),
            s: self.st.s,
            t: self.st.t,
            q: self.rgbaq.q,
            u: self.uv.u,
            v: self.uv.v,
        };
        self.pending -= 1;
        self.slots[self.pending as usize] = vertex;
        if self.pending > 0 {
            return Ok(());
        }

        let mode = self.mode();
        let Some(kind) = mode.kind else {
            return Ok(());
        };
        match kind {
            PrimitiveKind::Triangle | PrimitiveKind::TriangleStrip | PrimitiveKind::TriangleFan => {
                if drawing_kick && self.draw_enabled {
                    self.emit_triangle(mode)?;
                }
            }
            _ => {
                // Points, lines and sprites are outside this backend's
                // drawing support.
                warn!("ignoring kick of unsupported primitive {:?}", kind);
            }
        }

        // Refill the assembly slots for the next kick.
        match kind {
            PrimitiveKind::TriangleStrip => {
                self.slots[2] = self.slots[1];
                self.slots[1] = self.slots[0];
                self.pending = 1;
            }
            PrimitiveKind::TriangleFan => {
                // Slot 2 keeps the fan's center vertex.
                self.slots[1] = self.slots[0];
                self.pending = 1;
            }
            _ => self.pending = kind.vertices_per_kick(),
        }
        Ok(())
    }

    /// Emit the triangle currently held in the assembly slots
    fn emit_triangle(&mut self, mode: PrimitiveMode) -> Result<()> {
        let context = &self.contexts[mode.context];
        let state = RenderState {
            mode,
            frame: context.frame,
            zbuf: context.zbuf,
            tex0: context.tex0,
            scissor: context.scissor,
            alpha: context.alpha,
        };
        self.sink.set_render_state(&state)?;

        // Oldest kick first.
        let mut vertices = [PrimVertex::default(); 3];
        for (out, slot) in vertices.iter_mut().zip([2usize, 1, 0]) {
            let kick = &self.slots[slot];
            let (s, t, q) = if !mode.textured {
                (0.0, 0.0, 1.0)
            } else if mode.use_uv {
                // UV texels normalize against the texture extent so the
                // shaders have a single ST sampling path.
                (
                    kick.u / context.tex0.width as f32,
                    kick.v / context.tex0.height as f32,
                    1.0,
                )
            } else {
                (kick.s, kick.t, kick.q)
            };
            *out = PrimVertex {
                x: kick.position.x - context.xy_offset.x,
                y: kick.position.y - context.xy_offset.y,
                z: kick.position.z,
                color: kick.color,
                s,
                t,
                q,
                fog: kick.position.fog as f32 / 255.0,
            };
        }

        if !mode.gouraud {
            // Flat shading takes the color of the last kicked vertex.
            let flat = vertices[2].color;
            vertices[0].color = flat;
            vertices[1].color = flat;
        }

        debug!(
            "triangle: ({:.1},{:.1}) ({:.1},{:.1}) ({:.1},{:.1})",
            vertices[0].x, vertices[0].y, vertices[1].x, vertices[1].y, vertices[2].x, vertices[2].y
        );
        self.sink.add_triangle(&vertices)
    }

    /// Flush any work buffered in the sink
    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Default)]
    struct RecordingSink {
        states: Vec<RenderState>,
        triangles: Vec<[PrimVertex; 3]>,
        palettes: Vec<Tex0>,
        flushes: usize,
    }

    impl RenderSink for RecordingSink {
        fn set_render_state(&mut self, state: &RenderState) -> Result<()> {
            self.states.push(*state);
            Ok(())
        }
        fn add_triangle(&mut self, vertices: &[PrimVertex; 3]) -> Result<()> {
            self.triangles.push(*vertices);
            Ok(())
        }
        fn load_palette(&mut self, tex0: &Tex0) -> Result<()> {
            self.palettes.push(*tex0);
            Ok(())
        }
        fn flush(&mut self) -> Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    fn xyz(x: f32, y: f32, z: u32) -> u64 {
        let xf = (x * 16.0) as u64 & 0xFFFF;
        let yf = (y * 16.0) as u64 & 0xFFFF;
        xf | yf << 16 | (z as u64) << 32
    }

    fn rgba(r: u8, g: u8, b: u8, a: u8, q: f32) -> u64 {
        r as u64 | (g as u64) << 8 | (b as u64) << 16 | (a as u64) << 24 | (q.to_bits() as u64) << 32
    }

    fn gs() -> Gs<RecordingSink> {
        let _ = env_logger::builder().is_test(true).try_init();
        Gs::new(RecordingSink::default())
    }

    fn kick_list(gs: &mut Gs<RecordingSink>, prim: u64, count: usize) {
        gs.write_register(0x00, prim).unwrap();
        for i in 0..count {
            gs.write_register(0x05, xyz(i as f32, i as f32, 1)).unwrap();
        }
    }

    #[test]
    fn test_triangle_list_emits_every_three_kicks() {
        let mut gs = gs();
        kick_list(&mut gs, 0x3 | 1 << 3, 7);
        assert_eq!(gs.sink().triangles.len(), 2);
    }

    #[test]
    fn test_triangle_strip_retains_two_vertices() {
        let mut gs = gs();
        kick_list(&mut gs, 0x4 | 1 << 3, 5);
        let triangles = &gs.sink().triangles;
        assert_eq!(triangles.len(), 3);
        // Triangle i covers kicks i, i+1, i+2, oldest first.
        for (i, tri) in triangles.iter().enumerate() {
            let xs: Vec<f32> = tri.iter().map(|v| v.x).collect();
            assert_eq!(xs, vec![i as f32, i as f32 + 1.0, i as f32 + 2.0]);
        }
    }

    #[test]
    fn test_triangle_fan_keeps_center_vertex() {
        let mut gs = gs();
        kick_list(&mut gs, 0x5 | 1 << 3, 5);
        let triangles = &gs.sink().triangles;
        assert_eq!(triangles.len(), 3);
        for (i, tri) in triangles.iter().enumerate() {
            let xs: Vec<f32> = tri.iter().map(|v| v.x).collect();
            assert_eq!(xs, vec![0.0, i as f32 + 1.0, i as f32 + 2.0]);
        }
    }

    #[test]
    fn test_flat_shading_uses_last_kicked_color() {
        let mut gs = gs();
        gs.write_register(0x00, 0x3).unwrap(); // flat triangle list
        for (i, color) in [(0u8, 0x10u8), (1, 0x20), (2, 0x30)] {
            gs.write_register(0x01, rgba(color, 0, 0, 0x80, 1.0)).unwrap();
            gs.write_register(0x05, xyz(i as f32, 0.0, 1)).unwrap();
        }
        let tri = gs.sink().triangles[0];
        for vertex in &tri {
            assert_eq!(vertex.color & 0xFF, 0x30);
        }
    }

    #[test]
    fn test_gouraud_keeps_per_vertex_colors() {
        let mut gs = gs();
        gs.write_register(0x00, 0x3 | 1 << 3).unwrap();
        for (i, color) in [(0u8, 0x10u8), (1, 0x20), (2, 0x30)] {
            gs.write_register(0x01, rgba(color, 0, 0, 0x80, 1.0)).unwrap();
            gs.write_register(0x05, xyz(i as f32, 0.0, 1)).unwrap();
        }
        let tri = gs.sink().triangles[0];
        let reds: Vec<u32> = tri.iter().map(|v| v.color & 0xFF).collect();
        assert_eq!(reds, vec![0x10, 0x20, 0x30]);
    }

    #[test]
    fn test_no_draw_kick_completes_without_emitting() {
        let mut gs = gs();
        gs.write_register(0x00, 0x3 | 1 << 3).unwrap();
        gs.write_register(0x05, xyz(0.0, 0.0, 1)).unwrap();
        gs.write_register(0x05, xyz(1.0, 0.0, 1)).unwrap();
        // XYZ3: the vertex participates but the primitive is not drawn.
        gs.write_register(0x0D, xyz(2.0, 0.0, 1)).unwrap();
        assert!(gs.sink().triangles.is_empty());
        // Assembly continues normally afterwards.
        for i in 0..3 {
            gs.write_register(0x05, xyz(i as f32, 1.0, 1)).unwrap();
        }
        assert_eq!(gs.sink().triangles.len(), 1);
    }

    #[test]
    fn test_drawing_offset_is_subtracted() {
        let mut gs = gs();
        // XYOFFSET_1 = (512, 256).
        gs.write_register(0x18, (512 * 16) as u64 | ((256 * 16) as u64) << 32)
            .unwrap();
        gs.write_register(0x00, 0x3 | 1 << 3).unwrap();
        for i in 0..3 {
            gs.write_register(0x05, xyz(512.0 + i as f32, 256.0, 1)).unwrap();
        }
        let tri = gs.sink().triangles[0];
        assert_eq!(tri[0].x, 0.0);
        assert_eq!(tri[0].y, 0.0);
        assert_eq!(tri[2].x, 2.0);
    }

    #[test]
    fn test_context_two_state_selected_by_prim() {
        let mut gs = gs();
        gs.write_register(0x4C, 0).unwrap(); // FRAME_1: base 0
        gs.write_register(0x4D, 2).unwrap(); // FRAME_2: base 16 KiB
        gs.write_register(0x00, 0x3 | 1 << 3 | 1 << 9).unwrap();
        for i in 0..3 {
            gs.write_register(0x05, xyz(i as f32, 0.0, 1)).unwrap();
        }
        assert_eq!(gs.sink().states[0].frame.base, 16384);
    }

    #[test]
    fn test_prmode_attributes_when_prmodecont_clear() {
        let mut gs = gs();
        gs.write_register(0x1A, 0).unwrap(); // attributes come from PRMODE
        gs.write_register(0x1B, 1 << 3).unwrap(); // gouraud
        gs.write_register(0x00, 0x3).unwrap(); // flat triangle list
        for (i, color) in [(0u8, 0x10u8), (1, 0x20), (2, 0x30)] {
            gs.write_register(0x01, rgba(color, 0, 0, 0x80, 1.0)).unwrap();
            gs.write_register(0x05, xyz(i as f32, 0.0, 1)).unwrap();
        }
        // PRMODE's gouraud bit wins over PRIM's flat setting.
        let reds: Vec<u32> = gs.sink().triangles[0].iter().map(|v| v.color & 0xFF).collect();
        assert_eq!(reds, vec![0x10, 0x20, 0x30]);
    }

    #[test]
    fn test_uv_kicks_normalize_to_st() {
        let mut gs = gs();
        // TEX0_1: 256x128 PSMT8 texture.
        let tex0 = 4u64 << 14 | 0x13u64 << 20 | 8u64 << 26 | 7u64 << 30;
        gs.write_register(0x06, tex0).unwrap();
        // Textured triangle with FST set (UV coordinates).
        gs.write_register(0x00, 0x3 | 1 << 3 | 1 << 4 | 1 << 8).unwrap();
        for _ in 0..3 {
            // UV = (128.0, 64.0) in 12.4.
            gs.write_register(0x03, (128 * 16) as u64 | ((64 * 16) as u64) << 16)
                .unwrap();
            gs.write_register(0x05, xyz(0.0, 0.0, 1)).unwrap();
        }
        let vertex = gs.sink().triangles[0][0];
        assert_eq!(vertex.s, 0.5);
        assert_eq!(vertex.t, 0.5);
        assert_eq!(vertex.q, 1.0);
    }

    #[test]
    fn test_tex0_cld_drives_palette_load() {
        let mut gs = gs();
        gs.write_register(0x06, 0x13u64 << 20).unwrap(); // CLD = 0
        assert!(gs.sink().palettes.is_empty());
        gs.write_register(0x06, 0x13u64 << 20 | 1u64 << 61).unwrap();
        assert_eq!(gs.sink().palettes.len(), 1);
    }

    #[test]
    fn test_disabled_drawing_suppresses_emission() {
        let mut gs = gs();
        gs.set_draw_enabled(false);
        kick_list(&mut gs, 0x3 | 1 << 3, 6);
        assert!(gs.sink().triangles.is_empty());
        gs.set_draw_enabled(true);
        kick_list(&mut gs, 0x3 | 1 << 3, 3);
        assert_eq!(gs.sink().triangles.len(), 1);
    }

    #[test]
    fn test_prim_type_change_flushes_pending_batch() {
        let mut gs = gs();
        kick_list(&mut gs, 0x3 | 1 << 3, 3);
        let baseline = gs.sink().flushes;
        // Re-latching the same topology is not a flush point.
        gs.write_register(0x00, 0x3).unwrap();
        assert_eq!(gs.sink().flushes, baseline);
        // Switching to sprites pushes the batched triangles out first.
        gs.write_register(0x00, 0x6).unwrap();
        assert_eq!(gs.sink().flushes, baseline + 1);
    }

    #[test]
    fn test_texflush_reaches_sink() {
        let mut gs = gs();
        gs.write_register(0x3F, 0).unwrap();
        assert_eq!(gs.sink().flushes, 1);
    }

    proptest! {
        #[test]
        fn prop_triangle_list_emits_floor_n_over_three(n in 0usize..64) {
            let mut gs = gs();
            kick_list(&mut gs, 0x3 | 1 << 3, n);
            prop_assert_eq!(gs.sink().triangles.len(), n / 3);
        }

        #[test]
        fn prop_strip_and_fan_emit_n_minus_two(n in 3usize..64) {
            for kind in [0x4u64, 0x5] {
                let mut gs = gs();
                kick_list(&mut gs, kind | 1 << 3, n);
                prop_assert_eq!(gs.sink().triangles.len(), n - 2);
            }
        }
    }
}
