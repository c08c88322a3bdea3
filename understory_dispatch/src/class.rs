// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Class and interface declarations.
//!
//! Rust has neither inheritance nor runtime reflection, so the hierarchy a
//! dispatcher walks is declared explicitly:
//!
//! - A [`Class`] names at most one superclass with a projection `fn(&Self) -> &Parent`
//!   (typically a field access into an embedded base value) and any number of
//!   interfaces with upcasts `fn(&Self) -> &dyn Trait`.
//! - An [`Interface`] is implemented for a trait object type such as `dyn Named` and
//!   may name super-interfaces with upcasts `fn(&dyn Sub) -> &dyn Super`.
//!
//! Declarations are collected into a type-erased [`Declaration`] the first time a
//! dispatcher meets the type; see [`Ancestry`](crate::Ancestry) for the derived views.

use core::any::Any;
use core::fmt;
use core::marker::PhantomData;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::types::TypeKey;

/// A concrete type that can be dispatched on.
///
/// The default declaration has no superclass and no interfaces, which is what the
/// built-in implementations for primitives and strings use.
///
/// ```
/// use understory_dispatch::{Class, ClassDecl, Interface};
///
/// trait Named {
///     fn name(&self) -> &str;
/// }
/// impl Interface for dyn Named {}
///
/// struct Shape {
///     name: String,
/// }
/// impl Named for Shape {
///     fn name(&self) -> &str {
///         &self.name
///     }
/// }
/// impl Class for Shape {
///     fn declare(class: &mut ClassDecl<Self>) {
///         class.implements::<dyn Named>(|s| s);
///     }
/// }
///
/// struct Circle {
///     shape: Shape,
///     radius: f64,
/// }
/// impl Class for Circle {
///     fn declare(class: &mut ClassDecl<Self>) {
///         class.extends::<Shape>(|c| &c.shape);
///     }
/// }
/// ```
pub trait Class: Any + Sized {
    /// Declare this type's superclass and interfaces.
    fn declare(_class: &mut ClassDecl<Self>) {}
}

/// A trait object type that handlers can be declared for.
///
/// Implement it for `dyn YourTrait`. Super-interfaces are declared with
/// [`InterfaceDecl::extends`].
pub trait Interface: 'static {
    /// Declare this interface's super-interfaces.
    fn declare(_interface: &mut InterfaceDecl<Self>) {}
}

/// A dispatch target viewed through a trait object.
///
/// Implemented for every [`Class`]; a `&T` coerces to `&dyn Object` at the call site.
pub trait Object: Any {
    /// Runtime type of the target.
    fn type_key(&self) -> TypeKey;

    /// The target as `dyn Any`, for downcasting to its own type.
    fn as_any(&self) -> &dyn Any;

    /// The type-erased declaration of the target's type.
    ///
    /// Dispatchers call this only on the first encounter of a type.
    fn declaration(&self) -> Declaration;
}

impl<T: Class> Object for T {
    #[inline]
    fn type_key(&self) -> TypeKey {
        TypeKey::of::<T>()
    }

    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn declaration(&self) -> Declaration {
        Declaration::of::<T>()
    }
}

impl fmt::Debug for dyn Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Object").field(&self.type_key()).finish()
    }
}

/// Builder passed to [`Class::declare`].
pub struct ClassDecl<T> {
    parents: SmallVec<[Parent; 1]>,
    interfaces: Vec<Implements>,
    _class: PhantomData<fn(&T)>,
}

impl<T: Class> ClassDecl<T> {
    fn new() -> Self {
        Self {
            parents: SmallVec::new(),
            interfaces: Vec::new(),
            _class: PhantomData,
        }
    }

    /// Declare `P` as the superclass, reached from `T` through `project`.
    ///
    /// A class has at most one superclass; declaring a second one makes every
    /// dispatch on `T` fail with [`MultipleSuperclasses`](crate::DispatchError::MultipleSuperclasses).
    pub fn extends<P: Class>(&mut self, project: fn(&T) -> &P) -> &mut Self {
        self.parents.push(Parent {
            key: TypeKey::of::<P>(),
            project: projection(move |any| {
                let parent: &dyn Any = project(any.downcast_ref::<T>()?);
                Some(parent)
            }),
            declaration: Declaration::of::<P>,
        });
        self
    }

    /// Declare that `T` implements the interface `I`.
    ///
    /// Super-interfaces of `I` are implied and need not be repeated.
    pub fn implements<I: ?Sized + Interface>(&mut self, upcast: fn(&T) -> &I) -> &mut Self {
        self.interfaces.push(Implements {
            key: TypeKey::of::<I>(),
            upcast: Upcast::new(UpcastFn::<I>::new(move |any| {
                any.downcast_ref::<T>().map(upcast)
            })),
            supers: supers_of::<I>,
        });
        self
    }
}

impl<T> fmt::Debug for ClassDecl<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDecl")
            .field("class", &TypeKeyOf::<T>(PhantomData))
            .field("parents", &self.parents.iter().map(|p| p.key).collect::<Vec<_>>())
            .field(
                "interfaces",
                &self.interfaces.iter().map(|i| i.key).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Builder passed to [`Interface::declare`].
pub struct InterfaceDecl<I: ?Sized> {
    supers: Vec<Extends>,
    _interface: PhantomData<fn(&I)>,
}

impl<I: ?Sized + Interface> InterfaceDecl<I> {
    fn new() -> Self {
        Self {
            supers: Vec::new(),
            _interface: PhantomData,
        }
    }

    /// Declare `J` as a super-interface of `I`.
    ///
    /// Every class implementing `I` then implements `J` as well.
    pub fn extends<J: ?Sized + Interface>(&mut self, upcast: fn(&I) -> &J) -> &mut Self {
        let lift: Lift = Arc::new(move |from: &Upcast| {
            let inner = from.get::<I>()?.clone();
            Some(Upcast::new(UpcastFn::<J>::new(move |any| {
                inner.apply(any).map(upcast)
            })))
        });
        self.supers.push(Extends {
            key: TypeKey::of::<J>(),
            lift,
            supers: supers_of::<J>,
        });
        self
    }
}

impl<I: ?Sized> fmt::Debug for InterfaceDecl<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceDecl")
            .field("supers", &self.supers.iter().map(|s| s.key).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Type-erased declaration of one class.
pub struct Declaration {
    pub(crate) key: TypeKey,
    pub(crate) parents: SmallVec<[Parent; 1]>,
    pub(crate) interfaces: Vec<Implements>,
}

impl Declaration {
    /// Collect the declaration of `T`.
    pub fn of<T: Class>() -> Self {
        let mut class = ClassDecl::<T>::new();
        T::declare(&mut class);
        Self {
            key: TypeKey::of::<T>(),
            parents: class.parents,
            interfaces: class.interfaces,
        }
    }

    /// The declared class.
    pub fn key(&self) -> TypeKey {
        self.key
    }
}

impl fmt::Debug for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Declaration")
            .field("key", &self.key)
            .field("parents", &self.parents.iter().map(|p| p.key).collect::<Vec<_>>())
            .field(
                "interfaces",
                &self.interfaces.iter().map(|i| i.key).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Projection from a class value to its superclass value, both behind `dyn Any`.
pub(crate) type Projection =
    Arc<dyn for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Any> + Send + Sync>;

fn projection<F>(f: F) -> Projection
where
    F: for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Any> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Upcast from a class value behind `dyn Any` to the interface `I`.
pub(crate) struct UpcastFn<I: ?Sized + 'static>(
    Arc<dyn for<'a> Fn(&'a dyn Any) -> Option<&'a I> + Send + Sync>,
);

impl<I: ?Sized + 'static> UpcastFn<I> {
    fn new<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a dyn Any) -> Option<&'a I> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    #[inline]
    pub(crate) fn apply<'a>(&self, value: &'a dyn Any) -> Option<&'a I> {
        (self.0)(value)
    }
}

impl<I: ?Sized + 'static> Clone for UpcastFn<I> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

/// An [`UpcastFn`] with the interface type erased.
#[derive(Clone)]
pub(crate) struct Upcast(Arc<dyn Any + Send + Sync>);

impl Upcast {
    fn new<I: ?Sized + 'static>(f: UpcastFn<I>) -> Self {
        Self(Arc::new(f))
    }

    #[inline]
    pub(crate) fn get<I: ?Sized + 'static>(&self) -> Option<&UpcastFn<I>> {
        self.0.downcast_ref::<UpcastFn<I>>()
    }
}

/// Turns an upcast to a sub-interface into an upcast to one of its super-interfaces.
pub(crate) type Lift = Arc<dyn Fn(&Upcast) -> Option<Upcast> + Send + Sync>;

pub(crate) struct Parent {
    pub(crate) key: TypeKey,
    pub(crate) project: Projection,
    pub(crate) declaration: fn() -> Declaration,
}

pub(crate) struct Implements {
    pub(crate) key: TypeKey,
    pub(crate) upcast: Upcast,
    pub(crate) supers: fn() -> Vec<Extends>,
}

pub(crate) struct Extends {
    pub(crate) key: TypeKey,
    pub(crate) lift: Lift,
    pub(crate) supers: fn() -> Vec<Extends>,
}

fn supers_of<I: ?Sized + Interface>() -> Vec<Extends> {
    let mut interface = InterfaceDecl::<I>::new();
    I::declare(&mut interface);
    interface.supers
}

struct TypeKeyOf<T>(PhantomData<fn(&T)>);

impl<T> fmt::Debug for TypeKeyOf<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(core::any::type_name::<T>())
    }
}

macro_rules! leaf_classes {
    ($($ty:ty),* $(,)?) => {
        $(impl Class for $ty {})*
    };
}

leaf_classes!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    f32,
    f64,
    String,
    &'static str,
);
