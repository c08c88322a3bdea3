// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Memo tables shared by all threads using one dispatcher.
//!
//! Every table is an immutable snapshot behind an [`ArcSwap`]:
//!
//! - Readers load the current snapshot and never wait.
//! - A miss computes the value outside any critical section, then publishes a
//!   copy of the snapshot with the value inserted. When two threads miss on the
//!   same key, both compute and the later publication overwrites the earlier one.
//!   Memoized values are pure functions of their key, so both are identical.
//!
//! Entries are never removed.

use core::hash::Hash;

use arc_swap::ArcSwap;
use hashbrown::HashMap;

use crate::types::{Resolution, Shape, TypeKey};

pub(crate) struct Memo<K, V> {
    table: ArcSwap<HashMap<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> Memo<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            table: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    #[inline]
    pub(crate) fn get(&self, key: &K) -> Option<V> {
        self.table.load().get(key).cloned()
    }

    pub(crate) fn get_or_insert_with(&self, key: K, compute: impl FnOnce() -> V) -> V {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = compute();
        self.table.rcu(|table| {
            let mut next = HashMap::clone(table);
            next.insert(key.clone(), value.clone());
            next
        });
        value
    }

    pub(crate) fn len(&self) -> usize {
        self.table.load().len()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ResolutionKey {
    pub(crate) visitor: TypeKey,
    pub(crate) target: TypeKey,
    pub(crate) shape: Shape,
}

/// Resolutions per (visitor type, target type, shape).
pub(crate) struct ResolutionCache {
    memo: Memo<ResolutionKey, Resolution>,
}

impl ResolutionCache {
    pub(crate) fn new() -> Self {
        Self { memo: Memo::new() }
    }

    pub(crate) fn get_or_resolve(
        &self,
        key: ResolutionKey,
        resolve: impl FnOnce() -> Resolution,
    ) -> Resolution {
        self.memo.get_or_insert_with(key, || {
            let resolution = resolve();
            tracing::trace!(
                visitor = %key.visitor,
                target = %key.target,
                shape = %key.shape,
                ?resolution,
                "resolved dispatch"
            );
            resolution
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.memo.len()
    }
}
