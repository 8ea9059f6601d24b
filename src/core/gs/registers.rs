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

//! GS register addresses and bitfield decoding
//!
//! The GS is programmed through 64-bit privileged register writes addressed
//! by an 8-bit register number. Most drawing state is double-buffered into
//! two contexts selected per primitive; this crate models both and picks one
//! at kick time.
//!
//! Raw register values are stored as `u64` in the register file and decoded
//! into the typed structs here on demand. Decoding is infallible: fields
//! that may name an unsupported configuration (pixel formats, blend
//! operands) keep their raw bits and are resolved fallibly when draw state
//! is built.

/// GS register numbers handled by this backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Register {
    Prim = 0x00,
    Rgbaq = 0x01,
    St = 0x02,
    Uv = 0x03,
    Xyzf2 = 0x04,
    Xyz2 = 0x05,
    Tex0_1 = 0x06,
    Tex0_2 = 0x07,
    Fog = 0x0A,
    Xyzf3 = 0x0C,
    Xyz3 = 0x0D,
    XyOffset1 = 0x18,
    XyOffset2 = 0x19,
    PrModeCont = 0x1A,
    PrMode = 0x1B,
    TexFlush = 0x3F,
    Scissor1 = 0x40,
    Scissor2 = 0x41,
    Alpha1 = 0x42,
    Alpha2 = 0x43,
    Frame1 = 0x4C,
    Frame2 = 0x4D,
    Zbuf1 = 0x4E,
    Zbuf2 = 0x4F,
}

impl Register {
    /// Map a register address to a handled register, if any
    pub fn from_address(address: u8) -> Option<Self> {
        match address {
            0x00 => Some(Self::Prim),
            0x01 => Some(Self::Rgbaq),
            0x02 => Some(Self::St),
            0x03 => Some(Self::Uv),
            0x04 => Some(Self::Xyzf2),
            0x05 => Some(Self::Xyz2),
            0x06 => Some(Self::Tex0_1),
            0x07 => Some(Self::Tex0_2),
            0x0A => Some(Self::Fog),
            0x0C => Some(Self::Xyzf3),
            0x0D => Some(Self::Xyz3),
            0x18 => Some(Self::XyOffset1),
            0x19 => Some(Self::XyOffset2),
            0x1A => Some(Self::PrModeCont),
            0x1B => Some(Self::PrMode),
            0x3F => Some(Self::TexFlush),
            0x40 => Some(Self::Scissor1),
            0x41 => Some(Self::Scissor2),
            0x42 => Some(Self::Alpha1),
            0x43 => Some(Self::Alpha2),
            0x4C => Some(Self::Frame1),
            0x4D => Some(Self::Frame2),
            0x4E => Some(Self::Zbuf1),
            0x4F => Some(Self::Zbuf2),
            _ => None,
        }
    }
}

/// Convert an unsigned 12.4 fixed-point coordinate field to pixels
fn from_fixed_12_4(bits: u64) -> f32 {
    (bits & 0xFFFF) as f32 / 16.0
}

/// Primitive topology selected by the low bits of PRIM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Point,
    Line,
    LineStrip,
    Triangle,
    TriangleStrip,
    TriangleFan,
    Sprite,
}

impl PrimitiveKind {
    fn from_bits(bits: u64) -> Option<Self> {
        match bits & 0x7 {
            0 => Some(Self::Point),
            1 => Some(Self::Line),
            2 => Some(Self::LineStrip),
            3 => Some(Self::Triangle),
            4 => Some(Self::TriangleStrip),
            5 => Some(Self::TriangleFan),
            6 => Some(Self::Sprite),
            _ => None,
        }
    }

    /// Vertices consumed before the primitive kicks
    pub fn vertices_per_kick(self) -> u32 {
        match self {
            Self::Point => 1,
            Self::Line | Self::LineStrip | Self::Sprite => 2,
            Self::Triangle | Self::TriangleStrip | Self::TriangleFan => 3,
        }
    }
}

/// Decoded PRIM / PRMODE state
///
/// PRIM carries both the topology and the attribute flags; PRMODE carries
/// only the attribute flags and reuses the topology of the latched PRIM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimitiveMode {
    pub kind: Option<PrimitiveKind>,
    /// IIP: gouraud (true) or flat (false) shading
    pub gouraud: bool,
    /// TME: texture mapping enable
    pub textured: bool,
    /// FGE: fog enable
    pub fogging: bool,
    /// ABE: alpha blending enable
    pub alpha_blending: bool,
    /// FST: texel coordinates are UV (true) or ST/Q (false)
    pub use_uv: bool,
    /// CTXT: drawing context selector
    pub context: usize,
}

impl From<u64> for PrimitiveMode {
    fn from(raw: u64) -> Self {
        Self {
            kind: PrimitiveKind::from_bits(raw),
            gouraud: raw & (1 << 3) != 0,
            textured: raw & (1 << 4) != 0,
            fogging: raw & (1 << 5) != 0,
            alpha_blending: raw & (1 << 6) != 0,
            use_uv: raw & (1 << 8) != 0,
            context: ((raw >> 9) & 1) as usize,
        }
    }
}

impl PrimitiveMode {
    /// Apply a PRMODE value over this mode, keeping the PRIM topology
    pub fn with_attributes_from(self, prmode_raw: u64) -> Self {
        Self {
            kind: self.kind,
            ..PrimitiveMode::from(prmode_raw)
        }
    }
}

/// Decoded RGBAQ: the latched vertex color and texture perspective divisor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgbaq {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
    pub q: f32,
}

impl From<u64> for Rgbaq {
    fn from(raw: u64) -> Self {
        Self {
            r: raw as u8,
            g: (raw >> 8) as u8,
            b: (raw >> 16) as u8,
            a: (raw >> 24) as u8,
            q: f32::from_bits((raw >> 32) as u32),
        }
    }
}

impl Rgbaq {
    /// Pack the color bytes as ABGR (R in the low byte)
    pub fn packed_color(&self) -> u32 {
        self.r as u32 | (self.g as u32) << 8 | (self.b as u32) << 16 | (self.a as u32) << 24
    }
}

/// Decoded ST: perspective-ready texel coordinates (divided by Q at sample)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct St {
    pub s: f32,
    pub t: f32,
}

impl From<u64> for St {
    fn from(raw: u64) -> Self {
        Self {
            s: f32::from_bits(raw as u32),
            t: f32::from_bits((raw >> 32) as u32),
        }
    }
}

/// Decoded UV: texel coordinates in 12.4 fixed point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Uv {
    pub u: f32,
    pub v: f32,
}

impl From<u64> for Uv {
    fn from(raw: u64) -> Self {
        Self {
            u: from_fixed_12_4(raw),
            v: from_fixed_12_4(raw >> 16),
        }
    }
}

/// A decoded XYZ/XYZF position write
///
/// X and Y are window coordinates in 12.4 fixed point (the drawing offset
/// has not yet been subtracted); Z is 24 bits wide with fog or 32 without.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: u32,
    pub fog: u8,
}

impl Position {
    /// Decode an XYZF2/XYZF3 write (24-bit Z, fog in the top byte)
    pub fn from_xyzf(raw: u64) -> Self {
        Self {
            x: from_fixed_12_4(raw),
            y: from_fixed_12_4(raw >> 16),
            z: ((raw >> 32) & 0xFF_FFFF) as u32,
            fog: (raw >> 56) as u8,
        }
    }

    /// Decode an XYZ2/XYZ3 write (32-bit Z, no fog)
    pub fn from_xyz(raw: u64) -> Self {
        Self {
            x: from_fixed_12_4(raw),
            y: from_fixed_12_4(raw >> 16),
            z: (raw >> 32) as u32,
            fog: 0,
        }
    }
}

/// Decoded XYOFFSET: the subtractive window-to-drawing-area offset
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct XyOffset {
    pub x: f32,
    pub y: f32,
}

impl From<u64> for XyOffset {
    fn from(raw: u64) -> Self {
        Self {
            x: from_fixed_12_4(raw),
            y: from_fixed_12_4(raw >> 32),
        }
    }
}

/// Decoded SCISSOR: inclusive drawing-area bounds in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Scissor {
    pub x0: u32,
    pub x1: u32,
    pub y0: u32,
    pub y1: u32,
}

impl From<u64> for Scissor {
    fn from(raw: u64) -> Self {
        Self {
            x0: (raw & 0x7FF) as u32,
            x1: ((raw >> 16) & 0x7FF) as u32,
            y0: ((raw >> 32) & 0x7FF) as u32,
            y1: ((raw >> 48) & 0x7FF) as u32,
        }
    }
}

/// Decoded FRAME: color buffer base, stride, format and write mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Frame {
    /// Buffer base address in bytes (FBP is in 2 KiB word units)
    pub base: u32,
    /// Buffer width in pixels
    pub stride: u32,
    /// Raw PSM field, resolved to a format when draw state is built
    pub format_bits: u8,
    /// Per-bit framebuffer write mask (set bits are preserved)
    pub write_mask: u32,
}

impl From<u64> for Frame {
    fn from(raw: u64) -> Self {
        Self {
            base: ((raw & 0x1FF) as u32) * 8192,
            stride: (((raw >> 16) & 0x3F) as u32) * 64,
            format_bits: ((raw >> 24) & 0x3F) as u8,
            write_mask: (raw >> 32) as u32,
        }
    }
}

/// Decoded ZBUF: depth buffer base, format and update mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Zbuf {
    /// Buffer base address in bytes
    pub base: u32,
    /// Raw PSM field; ZBUF formats implicitly set the Z family bit
    pub format_bits: u8,
    /// ZMSK: true disables depth buffer updates
    pub masked: bool,
}

impl From<u64> for Zbuf {
    fn from(raw: u64) -> Self {
        Self {
            base: ((raw & 0x1FF) as u32) * 8192,
            format_bits: (((raw >> 24) & 0x0F) as u8) | 0x30,
            masked: raw & (1 << 32) != 0,
        }
    }
}

/// Decoded TEX0: texture buffer, extent and palette description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tex0 {
    /// Texture base address in bytes (TBP0 is in 64-word units)
    pub base: u32,
    /// Texture buffer width in pixels
    pub buf_width: u32,
    /// Raw texture PSM field
    pub format_bits: u8,
    /// Texture width in pixels (power of two)
    pub width: u32,
    /// Texture height in pixels (power of two)
    pub height: u32,
    /// Palette base address in bytes (CBP is in 64-word units)
    pub clut_base: u32,
    /// Raw palette storage PSM field
    pub clut_format_bits: u8,
    /// CSA: palette entry offset in units of 16 entries
    pub csa: u32,
    /// CLD: palette buffer load control
    pub cld: u8,
}

impl From<u64> for Tex0 {
    fn from(raw: u64) -> Self {
        Self {
            base: ((raw & 0x3FFF) as u32) * 256,
            buf_width: (((raw >> 14) & 0x3F) as u32) * 64,
            format_bits: ((raw >> 20) & 0x3F) as u8,
            width: 1 << ((raw >> 26) & 0xF),
            height: 1 << ((raw >> 30) & 0xF),
            clut_base: (((raw >> 37) & 0x3FFF) as u32) * 256,
            clut_format_bits: ((raw >> 51) & 0xF) as u8,
            csa: ((raw >> 56) & 0x1F) as u32,
            cld: ((raw >> 61) & 0x7) as u8,
        }
    }
}

impl Tex0 {
    /// True when this TEX0 write requests a palette buffer load
    ///
    /// CLD 0 leaves the palette buffer untouched; every other mode loads.
    /// The recorded-base comparison modes (4, 5) are treated as plain loads
    /// and deduplicated downstream by palette state comparison.
    pub fn requests_clut_load(&self) -> bool {
        self.cld != 0
    }
}
