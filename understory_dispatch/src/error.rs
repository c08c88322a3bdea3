// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors surfaced by the dispatcher.
//!
//! Configuration errors ([`DispatchError::DuplicateSignature`],
//! [`DispatchError::CyclicHierarchy`], [`DispatchError::MultipleSuperclasses`]) are
//! detected the first time a visitor registry or a type's ancestry is built. The
//! failed build is cached, so every later call for the same type reports the same
//! error without rebuilding. A target that matches no handler is not an error.

use thiserror::Error;

use crate::types::{Shape, TypeKey};

/// Failure of a dispatch or handle call.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// A visitor declared two handlers for the same parameter type within one shape.
    #[error("visitor `{visitor}` declares more than one {shape} handler for `{parameter}`")]
    DuplicateSignature {
        /// The offending visitor type.
        visitor: TypeKey,
        /// The parameter type declared twice.
        parameter: TypeKey,
        /// The shape both declarations belong to.
        shape: Shape,
    },
    /// The handler ran, but its value is not of the type the caller asked for.
    #[error("handler for `{parameter}` produced `{found}`, but `{expected}` was requested")]
    TypeMismatch {
        /// Parameter type of the handler that ran.
        parameter: TypeKey,
        /// The result type requested by the caller.
        expected: TypeKey,
        /// The handler's declared result type.
        found: TypeKey,
    },
    /// A class occurs more than once in its own ancestor chain.
    #[error("class `{class}` is its own ancestor")]
    CyclicHierarchy {
        /// The class that closes the cycle.
        class: TypeKey,
    },
    /// A class declared more than one superclass.
    #[error("class `{class}` declares more than one superclass")]
    MultipleSuperclasses {
        /// The offending class.
        class: TypeKey,
    },
}

impl DispatchError {
    /// Whether this error comes from type or visitor declarations rather than a single call.
    pub const fn is_configuration(&self) -> bool {
        !matches!(self, Self::TypeMismatch { .. })
    }
}
