// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Precomputed ancestor chain and interface set of one runtime type.

use core::any::Any;
use core::fmt;
use std::collections::VecDeque;

use hashbrown::HashSet;
use smallvec::SmallVec;

use crate::class::{Declaration, Extends, Implements, Projection, Upcast};
use crate::error::DispatchError;
use crate::types::TypeKey;

/// The class hierarchy above one runtime type.
///
/// - [`chain`](Self::chain) runs from the type itself outward through each declared
///   superclass. There is no universal base type, so the chain ends at the last
///   declared superclass.
/// - [`interfaces`](Self::interfaces) holds every interface the type implements,
///   directly, through a superclass, or as a super-interface, each exactly once.
///   Interfaces declared nearer to the type come first; within one class they keep
///   declaration order, each followed breadth-first by its super-interfaces.
///
/// An `Ancestry` is immutable once built and is shared between threads.
pub struct Ancestry {
    chain: SmallVec<[Link; 4]>,
    interfaces: Vec<Implemented>,
}

struct Link {
    key: TypeKey,
    // From the previous link to this one; `None` for the type itself.
    project: Option<Projection>,
}

struct Implemented {
    key: TypeKey,
    // Chain depth of the class whose value `upcast` accepts.
    depth: usize,
    upcast: Upcast,
}

impl Ancestry {
    /// Build the ancestry described by `declaration`.
    ///
    /// Fails when a class occurs twice in the chain or declares several superclasses.
    pub fn build(declaration: Declaration) -> Result<Self, DispatchError> {
        let mut chain: SmallVec<[Link; 4]> = SmallVec::new();
        let mut interfaces = Vec::new();
        let mut seen = HashSet::new();

        let mut current = declaration;
        let mut project = None;
        loop {
            if chain.iter().any(|link| link.key == current.key) {
                return Err(DispatchError::CyclicHierarchy { class: current.key });
            }
            if current.parents.len() > 1 {
                return Err(DispatchError::MultipleSuperclasses { class: current.key });
            }

            let depth = chain.len();
            collect_interfaces(depth, current.interfaces, &mut seen, &mut interfaces);
            chain.push(Link {
                key: current.key,
                project: project.take(),
            });

            let Some(parent) = current.parents.pop() else {
                break;
            };
            project = Some(parent.project);
            current = (parent.declaration)();
        }

        Ok(Self { chain, interfaces })
    }

    /// The type this ancestry describes.
    #[inline]
    pub fn key(&self) -> TypeKey {
        self.chain[0].key
    }

    /// The type itself, then each superclass outward.
    pub fn chain(&self) -> impl ExactSizeIterator<Item = TypeKey> + '_ {
        self.chain.iter().map(|link| link.key)
    }

    /// Every implemented interface, without duplicates.
    pub fn interfaces(&self) -> impl ExactSizeIterator<Item = TypeKey> + '_ {
        self.interfaces.iter().map(|i| i.key)
    }

    /// Whether `class` is this type or one of its superclasses.
    pub fn is_subclass_of(&self, class: TypeKey) -> bool {
        self.chain().any(|key| key == class)
    }

    /// Whether this type implements `interface`, directly or by inheritance.
    pub fn implements(&self, interface: TypeKey) -> bool {
        self.interfaces().any(|key| key == interface)
    }

    /// View `target` as the class at `depth` in the chain.
    ///
    /// `target` must be a value of this ancestry's own type.
    pub(crate) fn project<'a>(&self, target: &'a dyn Any, depth: usize) -> Option<&'a dyn Any> {
        let mut value = target;
        for link in self.chain.get(1..=depth)? {
            value = (link.project.as_ref()?)(value)?;
        }
        Some(value)
    }

    /// View `target` as the interface at `slot`.
    pub(crate) fn upcast<'a, I: ?Sized + 'static>(
        &self,
        target: &'a dyn Any,
        slot: usize,
    ) -> Option<&'a I> {
        let implemented = self.interfaces.get(slot)?;
        let value = self.project(target, implemented.depth)?;
        implemented.upcast.get::<I>()?.apply(value)
    }
}

impl fmt::Debug for Ancestry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ancestry")
            .field("chain", &self.chain().collect::<Vec<_>>())
            .field("interfaces", &self.interfaces().collect::<Vec<_>>())
            .finish()
    }
}

fn collect_interfaces(
    depth: usize,
    direct: Vec<Implements>,
    seen: &mut HashSet<TypeKey>,
    out: &mut Vec<Implemented>,
) {
    let mut queue: VecDeque<(TypeKey, Upcast, fn() -> Vec<Extends>)> = direct
        .into_iter()
        .map(|i| (i.key, i.upcast, i.supers))
        .collect();
    while let Some((key, upcast, supers)) = queue.pop_front() {
        if !seen.insert(key) {
            continue;
        }
        for extends in supers() {
            if let Some(lifted) = (extends.lift)(&upcast) {
                queue.push_back((extends.key, lifted, extends.supers));
            }
        }
        out.push(Implemented { key, depth, upcast });
    }
}
