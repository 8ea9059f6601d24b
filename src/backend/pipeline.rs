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

//! Capability-keyed pipeline cache
//!
//! GS draw state that changes shader code or fixed-function setup is folded
//! into a capability key; each distinct key builds its GPU pipeline exactly
//! once for the lifetime of the device. Key equality is necessary and
//! sufficient for reuse: two draws with equal keys are interchangeable at
//! the pipeline level.
//!
//! The cache is deliberately generic: draw pipelines are keyed by
//! `DrawCaps` and palette-load compute pipelines by `ClutCaps`, both through
//! this one type. Entries are never evicted; the key space is small (tens of
//! combinations in practice) and pipelines are device-lifetime objects.

use std::collections::HashMap;
use std::hash::Hash;

use log::debug;

/// Build-once cache of pipelines (or any device-lifetime object) keyed by
/// a capability description
pub struct PipelineCache<K, P> {
    entries: HashMap<K, P>,
}

impl<K: Eq + Hash + Clone + std::fmt::Debug, P> PipelineCache<K, P> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Look up the pipeline for `key`, if one has been registered
    pub fn try_get(&self, key: &K) -> Option<&P> {
        self.entries.get(key)
    }

    /// Register the pipeline built for `key` and return it
    ///
    /// Replacing an existing entry is not meaningful for device-lifetime
    /// pipelines; callers only register after a failed `try_get`.
    pub fn register(&mut self, key: K, pipeline: P) -> &P {
        debug!("caching pipeline for {:?} ({} cached)", key, self.entries.len() + 1);
        self.entries.entry(key).or_insert(pipeline)
    }

    /// Fetch the pipeline for `key`, building it on first use
    pub fn get_or_build<E>(&mut self, key: &K, build: impl FnOnce(&K) -> Result<P, E>) -> Result<&P, E> {
        if !self.entries.contains_key(key) {
            let pipeline = build(key)?;
            self.register(key.clone(), pipeline);
        }
        Ok(&self.entries[key])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Eq + Hash + Clone + std::fmt::Debug, P> Default for PipelineCache<K, P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    struct Key {
        textured: bool,
        gouraud: bool,
    }

    #[test]
    fn test_miss_then_hit() {
        let mut cache: PipelineCache<Key, u32> = PipelineCache::new();
        let key = Key {
            textured: true,
            gouraud: false,
        };
        assert!(cache.try_get(&key).is_none());
        cache.register(key, 7);
        assert_eq!(cache.try_get(&key), Some(&7));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_single_bit_key_difference_misses() {
        let mut cache: PipelineCache<Key, u32> = PipelineCache::new();
        let key = Key {
            textured: true,
            gouraud: true,
        };
        cache.register(key, 1);
        let flipped = Key {
            textured: true,
            gouraud: false,
        };
        assert!(cache.try_get(&flipped).is_none());
        cache.register(flipped, 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.try_get(&key), Some(&1));
    }

    #[test]
    fn test_get_or_build_builds_once() {
        let mut cache: PipelineCache<Key, u32> = PipelineCache::new();
        let key = Key {
            textured: false,
            gouraud: false,
        };
        let mut builds = 0;
        for _ in 0..3 {
            let value = cache
                .get_or_build::<()>(&key, |_| {
                    builds += 1;
                    Ok(42)
                })
                .unwrap();
            assert_eq!(*value, 42);
        }
        assert_eq!(builds, 1);
    }
}
