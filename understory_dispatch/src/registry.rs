// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Visitors and their signature registries.
//!
//! A [`Visitor`] lists its handlers once, per type, in [`Visitor::signatures`].
//! The dispatcher turns that list into a [`Registry`] the first time it meets the
//! visitor type: one table per [`Shape`], indexed by exact parameter type and kept
//! in declaration order. Declaring the same parameter type twice within one shape
//! rejects the whole registry.

use core::any::Any;
use core::fmt;

use hashbrown::HashMap;
use hashbrown::hash_map::Entry;

use crate::ancestry::Ancestry;
use crate::class::{Class, Interface, Object};
use crate::error::DispatchError;
use crate::resolver::SignatureLookup;
use crate::types::{Route, Shape, TypeKey};

/// A type that declares handlers for the dispatcher.
///
/// ```
/// use understory_dispatch::{Dispatcher, Object, Shape, Signatures, Visitor};
///
/// #[derive(Default)]
/// struct Printer {
///     out: Vec<String>,
///     unhandled: usize,
/// }
///
/// impl Visitor for Printer {
///     fn signatures(signatures: &mut Signatures<Self>) {
///         signatures
///             .dispatch::<String>(|p, s| p.out.push(format!("text {s}")))
///             .dispatch::<i32>(|p, n| p.out.push(format!("number {n}")))
///             .handle::<i32, i64>(|_, n| i64::from(*n) * 2);
///     }
///
///     fn fallback(&mut self, _target: &dyn Object, _shape: Shape) {
///         self.unhandled += 1;
///     }
/// }
///
/// let dispatcher = Dispatcher::new();
/// let mut printer = Printer::default();
/// dispatcher.dispatch(&mut printer, &String::from("hi")).unwrap();
/// dispatcher.dispatch(&mut printer, &7_i32).unwrap();
/// dispatcher.dispatch(&mut printer, &true).unwrap();
/// assert_eq!(printer.out, ["text hi", "number 7"]);
/// assert_eq!(printer.unhandled, 1);
///
/// let doubled: Option<i64> = dispatcher.handle(&mut printer, &21_i32).unwrap();
/// assert_eq!(doubled, Some(42));
/// ```
pub trait Visitor: Sized + 'static {
    /// Declare every handler of this visitor type.
    ///
    /// Called once per dispatcher and visitor type, never per instance.
    fn signatures(signatures: &mut Signatures<Self>);

    /// Runs when no declared handler matches `target`.
    ///
    /// The default does nothing. For [`Shape::Handle`] the caller receives `None`
    /// after this returns.
    fn fallback(&mut self, _target: &dyn Object, _shape: Shape) {}
}

/// Builder passed to [`Visitor::signatures`].
pub struct Signatures<V> {
    dispatch: Vec<Signature<V, ()>>,
    handle: Vec<Signature<V, Box<dyn Any>>>,
}

impl<V: Visitor> Signatures<V> {
    fn new() -> Self {
        Self {
            dispatch: Vec::new(),
            handle: Vec::new(),
        }
    }

    /// Declare a side-effecting handler for the class `T`.
    pub fn dispatch<T: Class>(
        &mut self,
        handler: impl Fn(&mut V, &T) + Send + Sync + 'static,
    ) -> &mut Self {
        self.dispatch.push(Signature {
            parameter: TypeKey::of::<T>(),
            result: TypeKey::of::<()>(),
            invoke: Box::new(move |visitor: &mut V, argument: Argument<'_>| {
                handler(visitor, argument.class::<T>()?);
                Some(())
            }),
        });
        self
    }

    /// Declare a side-effecting handler for the interface `I`.
    pub fn dispatch_interface<I: ?Sized + Interface>(
        &mut self,
        handler: impl Fn(&mut V, &I) + Send + Sync + 'static,
    ) -> &mut Self {
        self.dispatch.push(Signature {
            parameter: TypeKey::of::<I>(),
            result: TypeKey::of::<()>(),
            invoke: Box::new(move |visitor: &mut V, argument: Argument<'_>| {
                handler(visitor, argument.interface::<I>()?);
                Some(())
            }),
        });
        self
    }

    /// Declare a value-producing handler for the class `T`.
    pub fn handle<T: Class, R: 'static>(
        &mut self,
        handler: impl Fn(&mut V, &T) -> R + Send + Sync + 'static,
    ) -> &mut Self {
        self.handle.push(Signature {
            parameter: TypeKey::of::<T>(),
            result: TypeKey::of::<R>(),
            invoke: Box::new(move |visitor: &mut V, argument: Argument<'_>| {
                let value: Box<dyn Any> = Box::new(handler(visitor, argument.class::<T>()?));
                Some(value)
            }),
        });
        self
    }

    /// Declare a value-producing handler for the interface `I`.
    pub fn handle_interface<I: ?Sized + Interface, R: 'static>(
        &mut self,
        handler: impl Fn(&mut V, &I) -> R + Send + Sync + 'static,
    ) -> &mut Self {
        self.handle.push(Signature {
            parameter: TypeKey::of::<I>(),
            result: TypeKey::of::<R>(),
            invoke: Box::new(move |visitor: &mut V, argument: Argument<'_>| {
                let value: Box<dyn Any> = Box::new(handler(visitor, argument.interface::<I>()?));
                Some(value)
            }),
        });
        self
    }
}

impl<V> fmt::Debug for Signatures<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signatures")
            .field(
                "dispatch",
                &self.dispatch.iter().map(|s| s.parameter).collect::<Vec<_>>(),
            )
            .field(
                "handle",
                &self.handle.iter().map(|s| s.parameter).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Validated handler tables of one visitor type.
pub struct Registry<V> {
    visitor: TypeKey,
    dispatch: Table<V, ()>,
    handle: Table<V, Box<dyn Any>>,
}

impl<V: Visitor> Registry<V> {
    /// Collect and validate the signatures of `V`.
    pub fn build() -> Result<Self, DispatchError> {
        let visitor = TypeKey::of::<V>();
        let mut signatures = Signatures::new();
        V::signatures(&mut signatures);
        let registry = Self {
            visitor,
            dispatch: Table::new(visitor, Shape::Dispatch, signatures.dispatch)?,
            handle: Table::new(visitor, Shape::Handle, signatures.handle)?,
        };
        tracing::debug!(
            visitor = %visitor,
            dispatch = registry.dispatch.len(),
            handle = registry.handle.len(),
            "built visitor registry"
        );
        Ok(registry)
    }
}

impl<V> Registry<V> {
    /// The visitor type these tables belong to.
    #[inline]
    pub fn visitor(&self) -> TypeKey {
        self.visitor
    }

    /// Number of handlers declared for `shape`.
    pub fn len(&self, shape: Shape) -> usize {
        match shape {
            Shape::Dispatch => self.dispatch.len(),
            Shape::Handle => self.handle.len(),
        }
    }

    /// Whether no handler is declared for `shape`.
    pub fn is_empty(&self, shape: Shape) -> bool {
        self.len(shape) == 0
    }

    /// Parameter types declared for `shape`, in declaration order.
    pub fn parameters(&self, shape: Shape) -> Box<dyn Iterator<Item = TypeKey> + '_> {
        match shape {
            Shape::Dispatch => Box::new(self.dispatch.parameters()),
            Shape::Handle => Box::new(self.handle.parameters()),
        }
    }

    /// Declared result type of the value-producing handler for `parameter`.
    pub fn result_type(&self, parameter: TypeKey) -> Option<TypeKey> {
        let index = self.handle.position(parameter)?;
        Some(self.handle.signatures[index].result)
    }

    pub(crate) fn dispatch_table(&self) -> &Table<V, ()> {
        &self.dispatch
    }

    pub(crate) fn handle_table(&self) -> &Table<V, Box<dyn Any>> {
        &self.handle
    }
}

impl<V> fmt::Debug for Registry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("visitor", &self.visitor)
            .field("dispatch", &self.dispatch.parameters().collect::<Vec<_>>())
            .field("handle", &self.handle.parameters().collect::<Vec<_>>())
            .finish()
    }
}

/// The target as seen by one invocation: its value, its ancestry, and the resolved route.
#[derive(Copy, Clone)]
pub(crate) struct Argument<'a> {
    target: &'a dyn Any,
    ancestry: &'a Ancestry,
    route: Route,
}

impl<'a> Argument<'a> {
    pub(crate) fn new(target: &'a dyn Any, ancestry: &'a Ancestry, route: Route) -> Self {
        Self {
            target,
            ancestry,
            route,
        }
    }

    fn class<T: 'static>(self) -> Option<&'a T> {
        match self.route {
            Route::Class { depth } => self.ancestry.project(self.target, depth)?.downcast_ref(),
            Route::Interface { .. } => None,
        }
    }

    fn interface<I: ?Sized + 'static>(self) -> Option<&'a I> {
        match self.route {
            Route::Interface { slot } => self.ancestry.upcast(self.target, slot),
            Route::Class { .. } => None,
        }
    }
}

type Invoke<V, Out> = Box<dyn Fn(&mut V, Argument<'_>) -> Option<Out> + Send + Sync>;

struct Signature<V, Out> {
    parameter: TypeKey,
    result: TypeKey,
    invoke: Invoke<V, Out>,
}

/// Handlers of one shape, in declaration order.
pub(crate) struct Table<V, Out> {
    signatures: Vec<Signature<V, Out>>,
    by_parameter: HashMap<TypeKey, usize>,
}

impl<V, Out> Table<V, Out> {
    fn new(
        visitor: TypeKey,
        shape: Shape,
        signatures: Vec<Signature<V, Out>>,
    ) -> Result<Self, DispatchError> {
        let mut by_parameter = HashMap::with_capacity(signatures.len());
        for (index, signature) in signatures.iter().enumerate() {
            match by_parameter.entry(signature.parameter) {
                Entry::Occupied(_) => {
                    return Err(DispatchError::DuplicateSignature {
                        visitor,
                        parameter: signature.parameter,
                        shape,
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(index);
                }
            }
        }
        Ok(Self {
            signatures,
            by_parameter,
        })
    }

    fn len(&self) -> usize {
        self.signatures.len()
    }

    fn parameters(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.signatures.iter().map(|s| s.parameter)
    }

    /// Parameter and declared result type of the signature at `index`.
    pub(crate) fn describe(&self, index: usize) -> Option<(TypeKey, TypeKey)> {
        let signature = self.signatures.get(index)?;
        Some((signature.parameter, signature.result))
    }

    /// Run the signature at `index`.
    ///
    /// Returns `None` when the argument cannot be viewed as the signature's parameter.
    pub(crate) fn invoke(&self, index: usize, visitor: &mut V, argument: Argument<'_>) -> Option<Out> {
        (self.signatures.get(index)?.invoke)(visitor, argument)
    }
}

impl<V, Out> SignatureLookup for Table<V, Out> {
    #[inline]
    fn position(&self, parameter: TypeKey) -> Option<usize> {
        self.by_parameter.get(&parameter).copied()
    }
}
