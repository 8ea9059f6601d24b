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

//! Error types for the GS rendering backend
//!
//! All fallible operations in this crate return [`Result<T>`], an alias for
//! `Result<T, GsError>`.
//!
//! The error taxonomy is small on purpose: everything except capacity
//! handling (which is absorbed internally by the draw batcher) is fatal to
//! the current frame or to backend initialization. There is no partial retry
//! and no degraded continuation.

use thiserror::Error;

/// Errors produced by the GS rendering backend
#[derive(Debug, Error)]
pub enum GsError {
    /// A GPU object (buffer, image, pipeline, bind group) failed to create.
    ///
    /// Fatal; aborts backend initialization or the in-progress frame.
    #[error("failed to create GPU resource: {what}")]
    ResourceCreation {
        /// Description of the resource that failed to create
        what: String,
    },

    /// A format/capability combination has no implemented codec or blend path.
    ///
    /// Surfaced explicitly rather than silently producing wrong pixels.
    /// These are programmer-visible invariant violations, not user-recoverable
    /// errors.
    #[error("unsupported GS configuration: {what}")]
    UnsupportedConfiguration {
        /// Description of the unsupported combination
        what: String,
    },

    /// A GPU API call reported failure.
    ///
    /// Always fatal to the current frame. Carries the identity of the failing
    /// operation and the reported detail.
    #[error("backend operation '{op}' failed: {detail}")]
    Backend {
        /// Identity of the failing operation
        op: &'static str,
        /// Status / message reported by the GPU API
        detail: String,
    },

    /// The shader compiler rejected a generated program.
    #[error("shader compilation failed: {message}")]
    ShaderCompilation {
        /// Compiler diagnostic
        message: String,
    },
}

impl GsError {
    /// Shorthand for an [`GsError::UnsupportedConfiguration`] error
    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::UnsupportedConfiguration { what: what.into() }
    }
}

/// Result type alias for GS backend operations
pub type Result<T> = std::result::Result<T, GsError>;
