// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Resolution of a runtime type against declared signatures.
//!
//! ## Order
//!
//! 1. The target's own type.
//! 2. Each superclass, nearest first. The first declared ancestor wins, so with
//!    `Grandchild → Child → Parent` and handlers for `Child` and `Parent`, a
//!    `Grandchild` resolves to `Child`.
//! 3. Only when no class in the chain matches: the interfaces the target implements.
//!    When several have handlers, [`InterfacePrecedence`] decides.
//! 4. Otherwise [`Resolution::NoMatch`].
//!
//! Resolution is a pure function of the ancestry, the signature table, and the
//! policy. It never fails; no match is an ordinary outcome.

use crate::ancestry::Ancestry;
use crate::types::{InterfacePrecedence, Resolution, Route, TypeKey};

/// Exact-type index into a visitor's signatures for one shape.
pub trait SignatureLookup {
    /// Declaration position of the signature whose parameter is exactly `parameter`.
    fn position(&self, parameter: TypeKey) -> Option<usize>;
}

/// Parameters in declaration order.
impl SignatureLookup for [TypeKey] {
    fn position(&self, parameter: TypeKey) -> Option<usize> {
        self.iter().position(|key| *key == parameter)
    }
}

/// Select the most specific signature for the type described by `ancestry`.
pub fn resolve<L: SignatureLookup + ?Sized>(
    ancestry: &Ancestry,
    lookup: &L,
    precedence: InterfacePrecedence,
) -> Resolution {
    for (depth, class) in ancestry.chain().enumerate() {
        if let Some(signature) = lookup.position(class) {
            return Resolution::Matched {
                signature,
                route: Route::Class { depth },
            };
        }
    }

    let mut candidates = ancestry
        .interfaces()
        .enumerate()
        .filter_map(|(slot, key)| lookup.position(key).map(|signature| (slot, signature)));
    let best = match precedence {
        InterfacePrecedence::Registration => candidates.min_by_key(|&(_, signature)| signature),
        InterfacePrecedence::Implementation => candidates.next(),
    };

    match best {
        Some((slot, signature)) => Resolution::Matched {
            signature,
            route: Route::Interface { slot },
        },
        None => Resolution::NoMatch,
    }
}
