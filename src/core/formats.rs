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

//! GS pixel storage formats and tiled ("swizzled") addressing
//!
//! The GS stores its unified local memory in a tiled layout: memory is split
//! into 8 KiB pages, pages into thirty-two 256-byte blocks, and blocks into
//! 64-byte columns, with a per-format interleave pattern inside each column.
//! Frame buffers, depth buffers, textures and palettes all alias into this
//! one layout, each under its own pixel storage format (PSM).
//!
//! This module is the single owner of that addressing logic. It provides:
//!
//! - [`PixelFormat`]: the storage format tags used by FRAME/ZBUF/TEX0
//! - [`FormatLayout`]: a per-format strategy record (page extent, pixel
//!   width, tiling functions), looked up through one table instead of
//!   scattered `match` dispatch
//! - [`build_swizzle_table`]: one page worth of per-(x, y) physical offsets,
//!   uploaded as an `R32Uint` texture and indexed by the generated shaders
//! - [`pixel_address`]: the CPU-side form of the same formula, used to build
//!   the tables and by tests
//! - packed-pixel conversions between the on-hardware representation and
//!   normalized RGBA
//!
//! Offsets are in bytes for every format except [`PixelFormat::Psmt4`],
//! whose offsets are in nibbles (the hardware addresses 4-bit texels at
//! half-byte granularity).

use super::error::{GsError, Result};

/// GS pixel storage format (the PSM field of FRAME/ZBUF/TEX0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PixelFormat {
    /// 32-bit RGBA color
    Psmct32 = 0x00,
    /// 24-bit RGB color stored in a 32-bit cell (high byte untouched)
    Psmct24 = 0x01,
    /// 16-bit RGBA (5551) color
    Psmct16 = 0x02,
    /// 16-bit RGBA (5551) color, alternate block arrangement
    Psmct16s = 0x0A,
    /// 8-bit palette index
    Psmt8 = 0x13,
    /// 4-bit palette index
    Psmt4 = 0x14,
    /// 32-bit depth
    Psmz32 = 0x30,
    /// 24-bit depth stored in a 32-bit cell
    Psmz24 = 0x31,
    /// 16-bit depth, alternate block arrangement
    Psmz16s = 0x3A,
}

impl PixelFormat {
    /// Decode a PSM bitfield value from a register
    ///
    /// # Errors
    ///
    /// Returns [`GsError::UnsupportedConfiguration`] for encodings this
    /// backend has no codec for (e.g. the PSMT8H/PSMT4HL/PSMT4HH high-byte
    /// formats).
    pub fn from_bits(bits: u8) -> Result<Self> {
        match bits {
            0x00 => Ok(Self::Psmct32),
            0x01 => Ok(Self::Psmct24),
            0x02 => Ok(Self::Psmct16),
            0x0A => Ok(Self::Psmct16s),
            0x13 => Ok(Self::Psmt8),
            0x14 => Ok(Self::Psmt4),
            0x30 => Ok(Self::Psmz32),
            0x31 => Ok(Self::Psmz24),
            0x3A => Ok(Self::Psmz16s),
            _ => Err(GsError::unsupported(format!(
                "pixel storage format 0x{:02X}",
                bits
            ))),
        }
    }

    /// True for the indexed-color (palette) texture formats
    pub fn is_indexed(self) -> bool {
        matches!(self, Self::Psmt8 | Self::Psmt4)
    }

    /// Bits occupied by one pixel in local memory
    pub fn bits_per_pixel(self) -> u32 {
        self.layout().bits_per_pixel
    }

    /// Page extent in pixels for this format
    pub fn page_size(self) -> (u32, u32) {
        let layout = self.layout();
        (layout.page_width, layout.page_height)
    }

    /// The strategy record describing this format's tiling
    pub fn layout(self) -> &'static FormatLayout {
        match self {
            Self::Psmct32 | Self::Psmct24 => &LAYOUT_CT32,
            Self::Psmct16 => &LAYOUT_CT16,
            Self::Psmct16s => &LAYOUT_CT16S,
            Self::Psmt8 => &LAYOUT_T8,
            Self::Psmt4 => &LAYOUT_T4,
            Self::Psmz32 | Self::Psmz24 => &LAYOUT_Z32,
            Self::Psmz16s => &LAYOUT_Z16S,
        }
    }
}

/// Bytes in one GS page, every format
pub const PAGE_BYTES: u32 = 8192;

/// Bytes in one GS block
pub const BLOCK_BYTES: u32 = 256;

/// Per-format tiling strategy record
///
/// Populated once in static tables; all addressing goes through these
/// records rather than per-call-site format switches.
pub struct FormatLayout {
    /// Page width in pixels
    pub page_width: u32,
    /// Page height in pixels
    pub page_height: u32,
    /// Pixel width in bits
    pub bits_per_pixel: u32,
    /// Block number for a pixel within a page (indexed `[y / bh][x / bw]`)
    block_table: &'static [&'static [u32]],
    /// Block extent in pixels
    block_width: u32,
    block_height: u32,
    /// Offset of a pixel within its block, in this format's address units
    column_offset: fn(u32, u32) -> u32,
}

// Block arrangement within a page. The Z-buffer formats use the same
// arrangement with bits 3 and 4 of the block number inverted.
const BLOCK_32: [&[u32]; 4] = [
    &[0, 1, 4, 5, 16, 17, 20, 21],
    &[2, 3, 6, 7, 18, 19, 22, 23],
    &[8, 9, 12, 13, 24, 25, 28, 29],
    &[10, 11, 14, 15, 26, 27, 30, 31],
];

const BLOCK_32Z: [&[u32]; 4] = [
    &[24, 25, 28, 29, 8, 9, 12, 13],
    &[26, 27, 30, 31, 10, 11, 14, 15],
    &[16, 17, 20, 21, 0, 1, 4, 5],
    &[18, 19, 22, 23, 2, 3, 6, 7],
];

const BLOCK_16: [&[u32]; 8] = [
    &[0, 2, 8, 10],
    &[1, 3, 9, 11],
    &[4, 6, 12, 14],
    &[5, 7, 13, 15],
    &[16, 18, 24, 26],
    &[17, 19, 25, 27],
    &[20, 22, 28, 30],
    &[21, 23, 29, 31],
];

const BLOCK_16S: [&[u32]; 8] = [
    &[0, 2, 16, 18],
    &[1, 3, 17, 19],
    &[8, 10, 24, 26],
    &[9, 11, 25, 27],
    &[4, 6, 20, 22],
    &[5, 7, 21, 23],
    &[12, 14, 28, 30],
    &[13, 15, 29, 31],
];

const BLOCK_16SZ: [&[u32]; 8] = [
    &[24, 26, 8, 10],
    &[25, 27, 9, 11],
    &[16, 18, 0, 2],
    &[17, 19, 1, 3],
    &[28, 30, 12, 14],
    &[29, 31, 13, 15],
    &[20, 22, 4, 6],
    &[21, 23, 5, 7],
];

/// Byte offset within an 8x8 32-bit block: 8x2 columns, words interleaved
/// in 2x2 cells.
fn column_offset_32(x: u32, y: u32) -> u32 {
    const COLUMN_WORD: [[u32; 8]; 2] = [[0, 1, 4, 5, 8, 9, 12, 13], [2, 3, 6, 7, 10, 11, 14, 15]];
    let column = y >> 1;
    column * 64 + COLUMN_WORD[(y & 1) as usize][(x & 7) as usize] * 4
}

/// Byte offset within a 16x8 16-bit block: 16x2 columns, the left half of
/// each column fills the low halfwords and the right half the high ones.
fn column_offset_16(x: u32, y: u32) -> u32 {
    let halfword = (y >> 1) * 32 + (y & 1) * 4 + ((x & 7) >> 1) * 8 + (x & 1) * 2 + (x >> 3);
    halfword * 2
}

/// Byte offset within a 16x16 8-bit block: 16x4 columns of 2x2 byte cells,
/// with two-word groups swapped horizontally in odd columns.
fn column_offset_8(x: u32, y: u32) -> u32 {
    let column = y >> 2;
    let v = y & 3;
    let word = ((x >> 1) ^ ((column & 1) * 2)) + (v >> 1) * 8;
    column * 64 + word * 4 + (x & 1) + (v & 1) * 2
}

/// Nibble offset within a 32x16 4-bit block: 32x4 columns; texel pairs share
/// a byte with their neighbors sixteen texels to the right, and odd columns
/// carry the same two-word group swap as PSMT8.
fn column_offset_4(x: u32, y: u32) -> u32 {
    let column = y >> 2;
    let v = y & 3;
    let word = (((x & 15) >> 1) ^ ((column & 1) * 2)) + (v >> 1) * 8;
    let nibble = (x & 1) * 2 + (x >> 4) + (v & 1) * 4;
    column * 128 + word * 8 + nibble
}

static LAYOUT_CT32: FormatLayout = FormatLayout {
    page_width: 64,
    page_height: 32,
    bits_per_pixel: 32,
    block_table: &BLOCK_32,
    block_width: 8,
    block_height: 8,
    column_offset: column_offset_32,
};

static LAYOUT_CT16: FormatLayout = FormatLayout {
    page_width: 64,
    page_height: 64,
    bits_per_pixel: 16,
    block_table: &BLOCK_16,
    block_width: 16,
    block_height: 8,
    column_offset: column_offset_16,
};

static LAYOUT_CT16S: FormatLayout = FormatLayout {
    page_width: 64,
    page_height: 64,
    bits_per_pixel: 16,
    block_table: &BLOCK_16S,
    block_width: 16,
    block_height: 8,
    column_offset: column_offset_16,
};

static LAYOUT_T8: FormatLayout = FormatLayout {
    page_width: 128,
    page_height: 64,
    bits_per_pixel: 8,
    block_table: &BLOCK_32,
    block_width: 16,
    block_height: 16,
    column_offset: column_offset_8,
};

static LAYOUT_T4: FormatLayout = FormatLayout {
    page_width: 128,
    page_height: 128,
    bits_per_pixel: 4,
    block_table: &BLOCK_16,
    block_width: 32,
    block_height: 16,
    column_offset: column_offset_4,
};

static LAYOUT_Z32: FormatLayout = FormatLayout {
    page_width: 64,
    page_height: 32,
    bits_per_pixel: 32,
    block_table: &BLOCK_32Z,
    block_width: 8,
    block_height: 8,
    column_offset: column_offset_32,
};

static LAYOUT_Z16S: FormatLayout = FormatLayout {
    page_width: 64,
    page_height: 64,
    bits_per_pixel: 16,
    block_table: &BLOCK_16SZ,
    block_width: 16,
    block_height: 8,
    column_offset: column_offset_16,
};

impl FormatLayout {
    /// Offset of pixel (x, y) within its page, in this format's address
    /// units (bytes, nibbles for 4-bit)
    pub fn offset_in_page(&self, x: u32, y: u32) -> u32 {
        let px = x % self.page_width;
        let py = y % self.page_height;
        let block =
            self.block_table[(py / self.block_height) as usize][(px / self.block_width) as usize];
        let unit_scale = if self.bits_per_pixel == 4 { 2 } else { 1 };
        block * BLOCK_BYTES * unit_scale
            + (self.column_offset)(px % self.block_width, py % self.block_height)
    }
}

/// Build the swizzle lookup table for one format: one page worth of
/// per-(x, y) physical offsets, row-major, `page_width * page_height`
/// entries.
///
/// Uploaded once per format as an `R32Uint` texture; the generated shaders
/// index it with `(x % page_width, y % page_height)` and add the page
/// offset.
pub fn build_swizzle_table(format: PixelFormat) -> Vec<u32> {
    let layout = format.layout();
    let mut table = Vec::with_capacity((layout.page_width * layout.page_height) as usize);
    for y in 0..layout.page_height {
        for x in 0..layout.page_width {
            table.push(layout.offset_in_page(x, y));
        }
    }
    table
}

/// Physical offset of pixel (x, y) in local memory
///
/// `base` is the buffer base address in bytes (FRAME/ZBUF/TEX0 pointers are
/// word addresses scaled on decode); `stride` is the buffer width in pixels.
/// The result is in the format's address units: bytes for 8/16/32-bit
/// formats, nibbles for PSMT4.
///
/// # Examples
///
/// ```
/// use gsrx::core::formats::{pixel_address, PixelFormat};
///
/// // First pixel of the buffer is the buffer base.
/// assert_eq!(pixel_address(PixelFormat::Psmct32, 0, 640, 0, 0), 0);
/// // One page to the right starts 8 KiB in.
/// assert_eq!(pixel_address(PixelFormat::Psmct32, 0, 640, 64, 0), 8192);
/// ```
pub fn pixel_address(format: PixelFormat, base: u32, stride: u32, x: u32, y: u32) -> u32 {
    let layout = format.layout();
    let pages_per_row = (stride / layout.page_width).max(1);
    let page = (x / layout.page_width) + (y / layout.page_height) * pages_per_row;
    let page_bytes = if layout.bits_per_pixel == 4 {
        PAGE_BYTES * 2
    } else {
        PAGE_BYTES
    };
    let base = if layout.bits_per_pixel == 4 {
        base * 2
    } else {
        base
    };
    base + page * page_bytes + layout.offset_in_page(x, y)
}

/// Unpack a 32-bit RGBA pixel (R in the low byte) to normalized channels
pub fn unpack_rgba32(pixel: u32) -> [f32; 4] {
    [
        (pixel & 0xFF) as f32 / 255.0,
        ((pixel >> 8) & 0xFF) as f32 / 255.0,
        ((pixel >> 16) & 0xFF) as f32 / 255.0,
        ((pixel >> 24) & 0xFF) as f32 / 255.0,
    ]
}

/// Pack normalized channels into a 32-bit RGBA pixel
pub fn pack_rgba32(color: [f32; 4]) -> u32 {
    let quant = |c: f32| (c.clamp(0.0, 1.0) * 255.0 + 0.5) as u32;
    quant(color[0]) | (quant(color[1]) << 8) | (quant(color[2]) << 16) | (quant(color[3]) << 24)
}

/// Unpack a 16-bit 5551 pixel to normalized channels
///
/// Each 5-bit channel expands to 8 bits by left shift, matching the
/// hardware's conversion. The alpha bit maps to 0x80, the fixed-point
/// value the GS treats as 1.0, so an unmodulated 16-bit texel survives the
/// x2 color pipeline unchanged.
pub fn unpack_rgba16(pixel: u16) -> [f32; 4] {
    let expand = |c: u16| ((c & 0x1F) << 3) as f32 / 255.0;
    [
        expand(pixel),
        expand(pixel >> 5),
        expand(pixel >> 10),
        if pixel & 0x8000 != 0 { 128.0 / 255.0 } else { 0.0 },
    ]
}

/// Pack normalized channels into a 16-bit 5551 pixel
pub fn pack_rgba16(color: [f32; 4]) -> u16 {
    let quant = |c: f32| ((c.clamp(0.0, 1.0) * 255.0 + 0.5) as u16) >> 3;
    let alpha = if color[3] >= 64.0 / 255.0 { 0x8000 } else { 0 };
    quant(color[0]) | (quant(color[1]) << 5) | (quant(color[2]) << 10) | alpha
}
