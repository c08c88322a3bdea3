// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Type identity, dispatch shapes, and resolution results.

use core::any::{TypeId, type_name};
use core::fmt;
use core::hash::{Hash, Hasher};

/// Identity of a runtime type.
///
/// Equality and hashing use the [`TypeId`] only; the name is carried for
/// diagnostics and is not guaranteed to be unique or stable across compilers.
#[derive(Copy, Clone)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// The key of `T`, which may be a sized type or a trait object type such as `dyn Named`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// The underlying [`TypeId`].
    #[inline]
    pub const fn id(self) -> TypeId {
        self.id
    }

    /// Diagnostic name of the type.
    #[inline]
    pub const fn name(self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Calling convention of a handler.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Shape {
    /// Side-effecting handler with no result.
    Dispatch,
    /// Value-producing handler.
    Handle,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dispatch => "dispatch",
            Self::Handle => "handle",
        })
    }
}

/// How a target is viewed as the parameter type of the resolved handler.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Route {
    /// The parameter is the class at `depth` in the target's ancestor chain.
    ///
    /// Depth `0` is the target's own type.
    Class {
        /// Index into [`Ancestry::chain`](crate::Ancestry::chain).
        depth: usize,
    },
    /// The parameter is the interface at `slot` in the target's interface set.
    Interface {
        /// Index into [`Ancestry::interfaces`](crate::Ancestry::interfaces).
        slot: usize,
    },
}

/// Outcome of resolving a target type against a visitor's signatures.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// A declared signature matched.
    Matched {
        /// Position of the signature in the visitor's declaration order for the shape.
        signature: usize,
        /// How to view the target as the signature's parameter.
        route: Route,
    },
    /// Nothing matched; the visitor's fallback runs.
    NoMatch,
}

impl Resolution {
    /// Whether a declared signature matched.
    #[inline]
    pub const fn is_match(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }
}

/// Choice between several matching interfaces when no class in the ancestor chain matches.
///
/// Class matches always outrank interface matches; this policy only orders interfaces
/// among themselves.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum InterfacePrecedence {
    /// The interface whose handler the visitor registered first wins.
    #[default]
    Registration,
    /// The interface the target's type declares first wins.
    ///
    /// Interfaces declared by the type itself precede those inherited from a superclass,
    /// and a directly implemented interface precedes its super-interfaces.
    Implementation,
}
