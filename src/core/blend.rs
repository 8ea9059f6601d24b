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

//! GS alpha blending equation
//!
//! The GS blends with a single parameterized formula rather than a list of
//! fixed modes:
//!
//! ```text
//! out.rgb = clamp((A - B) * C * 2 + D)
//! out.a   = source alpha
//! ```
//!
//! A, B and D select a color operand (source, destination, or zero) and C
//! selects an alpha operand. The x2 scale reflects the GS's fixed-point
//! alpha convention where 0x80 represents 1.0.
//!
//! This module decodes the ALPHA register's operand selectors into typed
//! enums and provides a reference evaluation of the formula. The same
//! selectors drive WGSL generation in the backend; the reference evaluation
//! exists so blending semantics are testable without a GPU.

use super::error::{GsError, Result};

/// Color operand selector for the A, B and D slots of the blend formula
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendColorInput {
    /// Cs: the incoming fragment color
    Source,
    /// Cd: the framebuffer color at the fragment's address
    Dest,
    /// Constant zero
    Zero,
}

impl BlendColorInput {
    fn from_bits(bits: u8) -> Result<Self> {
        match bits {
            0 => Ok(Self::Source),
            1 => Ok(Self::Dest),
            2 => Ok(Self::Zero),
            _ => Err(GsError::unsupported(format!(
                "reserved blend color operand {}",
                bits
            ))),
        }
    }
}

/// Alpha operand selector for the C slot of the blend formula
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendAlphaInput {
    /// As: the incoming fragment alpha
    SourceAlpha,
    /// Ad: the framebuffer alpha at the fragment's address
    DestAlpha,
}

impl BlendAlphaInput {
    fn from_bits(bits: u8) -> Result<Self> {
        match bits {
            0 => Ok(Self::SourceAlpha),
            1 => Ok(Self::DestAlpha),
            _ => Err(GsError::unsupported(format!(
                "blend alpha operand {} (FIX is not implemented)",
                bits
            ))),
        }
    }
}

/// Decoded operand selection of the ALPHA register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendConfig {
    pub a: BlendColorInput,
    pub b: BlendColorInput,
    pub c: BlendAlphaInput,
    pub d: BlendColorInput,
}

impl BlendConfig {
    /// Decode the operand selectors from a raw ALPHA register value
    ///
    /// # Errors
    ///
    /// Returns [`GsError::UnsupportedConfiguration`] for the reserved
    /// color-operand encoding (3) and for the fixed-alpha C selector (2),
    /// neither of which this backend implements.
    pub fn from_register(raw: u64) -> Result<Self> {
        Ok(Self {
            a: BlendColorInput::from_bits((raw & 0x3) as u8)?,
            b: BlendColorInput::from_bits(((raw >> 2) & 0x3) as u8)?,
            c: BlendAlphaInput::from_bits(((raw >> 4) & 0x3) as u8)?,
            d: BlendColorInput::from_bits(((raw >> 6) & 0x3) as u8)?,
        })
    }

    /// Reference evaluation of the blend formula on normalized colors
    ///
    /// `source` and `dest` are RGBA with alpha in the GS convention
    /// (0.5 ~ 0x80 is opaque). The result carries the source alpha through
    /// unchanged.
    pub fn evaluate(&self, source: [f32; 4], dest: [f32; 4]) -> [f32; 4] {
        let pick = |input: BlendColorInput| match input {
            BlendColorInput::Source => source,
            BlendColorInput::Dest => dest,
            BlendColorInput::Zero => [0.0; 4],
        };
        let a = pick(self.a);
        let b = pick(self.b);
        let d = pick(self.d);
        let c = match self.c {
            BlendAlphaInput::SourceAlpha => source[3],
            BlendAlphaInput::DestAlpha => dest[3],
        };
        let mut out = [0.0f32; 4];
        for i in 0..3 {
            out[i] = ((a[i] - b[i]) * c * 2.0 + d[i]).clamp(0.0, 1.0);
        }
        out[3] = source[3];
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_alpha_blend() {
        // (Cs - Cd) * As * 2 + Cd: half-transparent red over opaque blue.
        let config = BlendConfig::from_register(0b01_00_01_00).unwrap();
        assert_eq!(config.a, BlendColorInput::Source);
        assert_eq!(config.b, BlendColorInput::Dest);
        assert_eq!(config.c, BlendAlphaInput::SourceAlpha);
        assert_eq!(config.d, BlendColorInput::Dest);

        let out = config.evaluate([1.0, 0.0, 0.0, 0.5], [0.0, 0.0, 1.0, 1.0]);
        // As = 0.5 doubles to a full lerp weight, replacing Cd entirely.
        assert_eq!(&out[..3], &[1.0, 0.0, 0.0]);
        assert_eq!(out[3], 0.5);
    }

    #[test]
    fn test_additive_blend_clamps() {
        // (Cs - 0) * As * 2 + Cd with everything saturated.
        let config = BlendConfig::from_register(0b01_00_10_00).unwrap();
        let out = config.evaluate([1.0, 1.0, 0.0, 0.5], [0.5, 0.5, 0.5, 0.5]);
        assert_eq!(&out[..3], &[1.0, 1.0, 0.5]);
    }

    #[test]
    fn test_result_alpha_is_source_alpha() {
        let config = BlendConfig::from_register(0b01_01_01_00).unwrap();
        let out = config.evaluate([0.2, 0.2, 0.2, 0.25], [0.8, 0.8, 0.8, 1.0]);
        assert_eq!(out[3], 0.25);
    }

    #[test]
    fn test_dest_alpha_operand() {
        let config = BlendConfig::from_register(0b00_01_01_10).unwrap();
        assert_eq!(config.c, BlendAlphaInput::DestAlpha);
        // (0 - Cd) * Ad * 2 + Cs, Ad = 0.5: subtractive against dest.
        let out = config.evaluate([1.0, 1.0, 1.0, 0.5], [0.5, 0.25, 0.0, 0.5]);
        assert_eq!(&out[..3], &[0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_reserved_operands_rejected() {
        // Color operand 3 is reserved.
        assert!(BlendConfig::from_register(0b00_00_00_11).is_err());
        // C = 2 selects the FIX constant, which has no implementation here.
        assert!(BlendConfig::from_register(0b00_10_00_00).is_err());
    }
}
