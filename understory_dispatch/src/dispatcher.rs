// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The dispatch facade.
//!
//! A [`Dispatcher`] owns the memo tables for visitor registries, type ancestry, and
//! resolutions. Everything it computes is retained for its lifetime, so a
//! long-lived dispatcher pays for resolution once per (visitor type, target type,
//! shape). [`Dispatcher::global`] is a process-wide instance used by the free
//! functions [`dispatch`] and [`handle`].

use core::any::Any;
use core::fmt;
use std::sync::{Arc, OnceLock};

use crate::ancestry::Ancestry;
use crate::cache::{Memo, ResolutionCache, ResolutionKey};
use crate::class::Object;
use crate::error::DispatchError;
use crate::registry::{Argument, Registry, Visitor};
use crate::resolver::resolve;
use crate::types::{InterfacePrecedence, Resolution, Shape, TypeKey};

type Built<V> = Result<Arc<Registry<V>>, DispatchError>;

/// Routes targets to the most specific handler a visitor declares.
///
/// `Dispatcher` is `Send + Sync`. Threads share one dispatcher and bring their own
/// visitor instances, since handlers receive `&mut V`.
pub struct Dispatcher {
    precedence: InterfacePrecedence,
    ancestries: Memo<TypeKey, Result<Arc<Ancestry>, DispatchError>>,
    // Values are `Built<V>` for the visitor type `V` the key names.
    registries: Memo<TypeKey, Arc<dyn Any + Send + Sync>>,
    resolutions: ResolutionCache,
}

impl Dispatcher {
    /// Create a dispatcher with the default [`InterfacePrecedence`].
    pub fn new() -> Self {
        Self::with_precedence(InterfacePrecedence::default())
    }

    /// Create a dispatcher that orders competing interface handlers by `precedence`.
    pub fn with_precedence(precedence: InterfacePrecedence) -> Self {
        Self {
            precedence,
            ancestries: Memo::new(),
            registries: Memo::new(),
            resolutions: ResolutionCache::new(),
        }
    }

    /// The process-wide dispatcher, created on first use with the default precedence.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<Dispatcher> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }

    /// The interface precedence this dispatcher resolves with.
    #[inline]
    pub fn precedence(&self) -> InterfacePrecedence {
        self.precedence
    }

    /// Build and validate the registry of `V`, or return the cached outcome.
    ///
    /// Calling this at startup surfaces [`DispatchError::DuplicateSignature`] before
    /// the first dispatch.
    pub fn prepare<V: Visitor>(&self) -> Result<Arc<Registry<V>>, DispatchError> {
        let erased = self.registries.get_or_insert_with(TypeKey::of::<V>(), || {
            let built: Built<V> = Registry::build().map(Arc::new);
            if let Err(err) = &built {
                tracing::warn!(%err, "rejected visitor registry");
            }
            let erased: Arc<dyn Any + Send + Sync> = Arc::new(built);
            erased
        });
        match erased.downcast_ref::<Built<V>>() {
            Some(built) => built.clone(),
            // Unreachable while keys are the visitor's own type.
            None => Registry::build().map(Arc::new),
        }
    }

    /// The ancestry of the target's runtime type, built on first encounter.
    pub fn ancestry(&self, target: &dyn Object) -> Result<Arc<Ancestry>, DispatchError> {
        self.ancestries
            .get_or_insert_with(target.type_key(), || {
                match Ancestry::build(target.declaration()) {
                    Ok(ancestry) => {
                        tracing::debug!(
                            class = %ancestry.key(),
                            depth = ancestry.chain().len(),
                            interfaces = ancestry.interfaces().len(),
                            "built type ancestry"
                        );
                        Ok(Arc::new(ancestry))
                    }
                    Err(err) => {
                        tracing::warn!(%err, "rejected class hierarchy");
                        Err(err)
                    }
                }
            })
    }

    /// The resolution a call of `shape` on `target` would use, without invoking anything.
    pub fn resolve<V: Visitor>(
        &self,
        target: &dyn Object,
        shape: Shape,
    ) -> Result<Resolution, DispatchError> {
        self.route::<V>(target, shape).map(|(_, _, resolution)| resolution)
    }

    /// Invoke the most specific side-effecting handler `visitor` declares for `target`.
    ///
    /// When none matches, [`Visitor::fallback`] runs once with [`Shape::Dispatch`].
    pub fn dispatch<V: Visitor>(
        &self,
        visitor: &mut V,
        target: &dyn Object,
    ) -> Result<(), DispatchError> {
        let (registry, ancestry, resolution) = self.route::<V>(target, Shape::Dispatch)?;
        if let Resolution::Matched { signature, route } = resolution {
            let argument = Argument::new(target.as_any(), &ancestry, route);
            if registry
                .dispatch_table()
                .invoke(signature, visitor, argument)
                .is_some()
            {
                return Ok(());
            }
            tracing::error!(
                visitor = %registry.visitor(),
                target = %target.type_key(),
                ?route,
                "resolved handler could not view its target"
            );
        }
        visitor.fallback(target, Shape::Dispatch);
        Ok(())
    }

    /// Invoke the most specific value-producing handler and return its value as `R`.
    ///
    /// Returns `Ok(None)` after [`Visitor::fallback`] when nothing matches. When the
    /// handler's value is not an `R` the handler has still run, its value is dropped,
    /// and the call fails with [`DispatchError::TypeMismatch`].
    pub fn handle<V: Visitor, R: 'static>(
        &self,
        visitor: &mut V,
        target: &dyn Object,
    ) -> Result<Option<R>, DispatchError> {
        let Some(produced) = self.produce(visitor, target)? else {
            return Ok(None);
        };
        match produced.value.downcast::<R>() {
            Ok(value) => Ok(Some(*value)),
            Err(_) => Err(DispatchError::TypeMismatch {
                parameter: produced.parameter,
                expected: TypeKey::of::<R>(),
                found: produced.result,
            }),
        }
    }

    /// Like [`handle`](Self::handle), returning the handler's value unchecked.
    pub fn handle_any<V: Visitor>(
        &self,
        visitor: &mut V,
        target: &dyn Object,
    ) -> Result<Option<Box<dyn Any>>, DispatchError> {
        Ok(self.produce(visitor, target)?.map(|produced| produced.value))
    }

    /// Number of resolutions cached so far.
    pub fn cached_resolutions(&self) -> usize {
        self.resolutions.len()
    }

    fn produce<V: Visitor>(
        &self,
        visitor: &mut V,
        target: &dyn Object,
    ) -> Result<Option<Produced>, DispatchError> {
        let (registry, ancestry, resolution) = self.route::<V>(target, Shape::Handle)?;
        if let Resolution::Matched { signature, route } = resolution {
            let table = registry.handle_table();
            let argument = Argument::new(target.as_any(), &ancestry, route);
            if let (Some((parameter, result)), Some(value)) = (
                table.describe(signature),
                table.invoke(signature, visitor, argument),
            ) {
                return Ok(Some(Produced {
                    parameter,
                    result,
                    value,
                }));
            }
            tracing::error!(
                visitor = %registry.visitor(),
                target = %target.type_key(),
                ?route,
                "resolved handler could not view its target"
            );
        }
        visitor.fallback(target, Shape::Handle);
        Ok(None)
    }

    fn route<V: Visitor>(
        &self,
        target: &dyn Object,
        shape: Shape,
    ) -> Result<(Arc<Registry<V>>, Arc<Ancestry>, Resolution), DispatchError> {
        let registry = self.prepare::<V>()?;
        let ancestry = self.ancestry(target)?;
        let key = ResolutionKey {
            visitor: registry.visitor(),
            target: ancestry.key(),
            shape,
        };
        let resolution = self.resolutions.get_or_resolve(key, || match shape {
            Shape::Dispatch => resolve(&ancestry, registry.dispatch_table(), self.precedence),
            Shape::Handle => resolve(&ancestry, registry.handle_table(), self.precedence),
        });
        Ok((registry, ancestry, resolution))
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("precedence", &self.precedence)
            .field("ancestries", &self.ancestries.len())
            .field("registries", &self.registries.len())
            .field("resolutions", &self.resolutions.len())
            .finish()
    }
}

struct Produced {
    parameter: TypeKey,
    result: TypeKey,
    value: Box<dyn Any>,
}

/// [`Dispatcher::dispatch`] on the [global](Dispatcher::global) dispatcher.
pub fn dispatch<V: Visitor>(visitor: &mut V, target: &dyn Object) -> Result<(), DispatchError> {
    Dispatcher::global().dispatch(visitor, target)
}

/// [`Dispatcher::handle`] on the [global](Dispatcher::global) dispatcher.
pub fn handle<V: Visitor, R: 'static>(
    visitor: &mut V,
    target: &dyn Object,
) -> Result<Option<R>, DispatchError> {
    Dispatcher::global().handle(visitor, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{Class, ClassDecl, Interface, InterfaceDecl};
    use crate::registry::Signatures;
    use crate::types::Route;

    trait MethodIdentifier {
        fn method(&self) -> &'static str;
    }
    impl Interface for dyn MethodIdentifier {}

    trait UnsupportedInterface {}
    impl Interface for dyn UnsupportedInterface {}

    struct SuperClass {
        label: &'static str,
    }
    impl Class for SuperClass {}

    struct SubClass {
        base: SuperClass,
    }
    impl Class for SubClass {
        fn declare(class: &mut ClassDecl<Self>) {
            class.extends::<SuperClass>(|s| &s.base);
        }
    }

    struct FinalClass {
        base: SubClass,
    }
    impl MethodIdentifier for FinalClass {
        fn method(&self) -> &'static str {
            "final"
        }
    }
    impl Class for FinalClass {
        fn declare(class: &mut ClassDecl<Self>) {
            class
                .extends::<SubClass>(|f| &f.base)
                .implements::<dyn MethodIdentifier>(|f| f);
        }
    }

    struct Identified;
    impl MethodIdentifier for Identified {
        fn method(&self) -> &'static str {
            "identified"
        }
    }
    impl Class for Identified {
        fn declare(class: &mut ClassDecl<Self>) {
            class.implements::<dyn MethodIdentifier>(|i| i);
        }
    }

    struct Unsupported;
    impl UnsupportedInterface for Unsupported {}
    impl Class for Unsupported {
        fn declare(class: &mut ClassDecl<Self>) {
            class.implements::<dyn UnsupportedInterface>(|u| u);
        }
    }

    fn final_class() -> FinalClass {
        FinalClass {
            base: SubClass {
                base: SuperClass { label: "root" },
            },
        }
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
        fallbacks: Vec<(TypeKey, Shape)>,
    }

    impl Visitor for Recorder {
        fn signatures(signatures: &mut Signatures<Self>) {
            signatures
                .dispatch::<String>(|r, s| r.calls.push(format!("text:{s}")))
                .dispatch::<i32>(|r, n| r.calls.push(format!("int:{n}")))
                .dispatch_interface::<dyn MethodIdentifier>(|r, m| {
                    r.calls.push(format!("method:{}", m.method()));
                })
                .dispatch::<SubClass>(|r, s| r.calls.push(format!("sub:{}", s.base.label)))
                .dispatch::<SuperClass>(|r, s| r.calls.push(format!("super:{}", s.label)))
                .handle::<String, i64>(|_, _| 11)
                .handle::<i32, i64>(|_, _| 21)
                .handle_interface::<dyn MethodIdentifier, i64>(|_, _| 31)
                .handle::<SubClass, i64>(|_, _| 41)
                .handle::<SuperClass, i64>(|_, _| 51);
        }

        fn fallback(&mut self, target: &dyn Object, shape: Shape) {
            self.fallbacks.push((target.type_key(), shape));
        }
    }

    #[test]
    fn unhandled_type_runs_fallback_once() {
        let dispatcher = Dispatcher::new();
        let mut recorder = Recorder::default();
        dispatcher.dispatch(&mut recorder, &true).unwrap();
        assert!(recorder.calls.is_empty(), "no handler runs for bool");
        assert_eq!(recorder.fallbacks, vec![(TypeKey::of::<bool>(), Shape::Dispatch)]);
    }

    #[test]
    fn exact_types_run_only_their_handler() {
        let dispatcher = Dispatcher::new();
        let mut recorder = Recorder::default();
        dispatcher
            .dispatch(&mut recorder, &String::from("hello"))
            .unwrap();
        dispatcher.dispatch(&mut recorder, &42_i32).unwrap();
        assert_eq!(recorder.calls, ["text:hello", "int:42"]);
        assert!(recorder.fallbacks.is_empty(), "fallback stays silent on a match");
    }

    #[test]
    fn interface_matches_when_no_class_does() {
        let dispatcher = Dispatcher::new();
        let mut recorder = Recorder::default();
        dispatcher.dispatch(&mut recorder, &Identified).unwrap();
        assert_eq!(recorder.calls, ["method:identified"]);
        assert_eq!(
            dispatcher.resolve::<Recorder>(&Identified, Shape::Dispatch),
            Ok(Resolution::Matched {
                signature: 2,
                route: Route::Interface { slot: 0 },
            })
        );
    }

    #[test]
    fn unsupported_interface_falls_back() {
        let dispatcher = Dispatcher::new();
        let mut recorder = Recorder::default();
        dispatcher.dispatch(&mut recorder, &Unsupported).unwrap();
        assert!(recorder.calls.is_empty(), "no handler for UnsupportedInterface");
        assert_eq!(recorder.fallbacks.len(), 1);
    }

    #[test]
    fn nearest_declared_ancestor_outranks_interface() {
        let dispatcher = Dispatcher::new();
        let mut recorder = Recorder::default();
        dispatcher.dispatch(&mut recorder, &final_class()).unwrap();
        // `FinalClass` implements `MethodIdentifier`, but `SubClass` is a class match.
        assert_eq!(recorder.calls, ["sub:root"]);
    }

    #[test]
    fn typed_returns_follow_resolution() {
        let dispatcher = Dispatcher::new();
        let mut recorder = Recorder::default();
        let mut value_of = |target: &dyn Object| -> Option<i64> {
            dispatcher.handle(&mut recorder, target).unwrap()
        };
        assert_eq!(value_of(&String::from("text")), Some(11));
        assert_eq!(value_of(&7_i32), Some(21));
        assert_eq!(value_of(&Identified), Some(31));
        assert_eq!(value_of(&final_class()), Some(41));
        assert_eq!(value_of(&SuperClass { label: "bare" }), Some(51));
        assert_eq!(value_of(&true), None);
        assert_eq!(value_of(&Unsupported), None);
        assert_eq!(
            recorder.fallbacks,
            vec![
                (TypeKey::of::<bool>(), Shape::Handle),
                (TypeKey::of::<Unsupported>(), Shape::Handle),
            ]
        );
    }

    #[test]
    fn wrong_result_type_is_a_mismatch() {
        let dispatcher = Dispatcher::new();
        let mut recorder = Recorder::default();
        let err = dispatcher
            .handle::<_, String>(&mut recorder, &7_i32)
            .unwrap_err();
        assert_eq!(
            err,
            DispatchError::TypeMismatch {
                parameter: TypeKey::of::<i32>(),
                expected: TypeKey::of::<String>(),
                found: TypeKey::of::<i64>(),
            }
        );
        assert!(!err.is_configuration());
    }

    #[test]
    fn handle_any_returns_the_raw_value() {
        let dispatcher = Dispatcher::new();
        let mut recorder = Recorder::default();
        let value = dispatcher
            .handle_any(&mut recorder, &final_class())
            .unwrap()
            .expect("SubClass handler matches");
        assert_eq!(value.downcast_ref::<i64>(), Some(&41));
        assert!(dispatcher.handle_any(&mut recorder, &'c').unwrap().is_none());
    }

    #[test]
    fn repeated_dispatch_reuses_one_resolution() {
        let dispatcher = Dispatcher::new();
        let mut recorder = Recorder::default();
        for _ in 0..3 {
            dispatcher.dispatch(&mut recorder, &final_class()).unwrap();
        }
        assert_eq!(recorder.calls, ["sub:root", "sub:root", "sub:root"]);
        assert_eq!(dispatcher.cached_resolutions(), 1);

        dispatcher.handle::<_, i64>(&mut recorder, &final_class()).unwrap();
        assert_eq!(dispatcher.cached_resolutions(), 2, "shapes are cached apart");
    }

    struct Duplicated;
    impl Visitor for Duplicated {
        fn signatures(signatures: &mut Signatures<Self>) {
            signatures
                .dispatch::<String>(|_, _| {})
                .dispatch::<String>(|_, _| {});
        }

        fn fallback(&mut self, _target: &dyn Object, _shape: Shape) {
            panic!("fallback must not run for a rejected visitor");
        }
    }

    #[test]
    fn duplicate_signatures_abort_every_call() {
        let dispatcher = Dispatcher::new();
        let expected = DispatchError::DuplicateSignature {
            visitor: TypeKey::of::<Duplicated>(),
            parameter: TypeKey::of::<String>(),
            shape: Shape::Dispatch,
        };
        assert_eq!(dispatcher.prepare::<Duplicated>().unwrap_err(), expected);
        assert_eq!(
            dispatcher.dispatch(&mut Duplicated, &1_u8),
            Err(expected.clone())
        );
        assert_eq!(
            dispatcher.handle::<_, ()>(&mut Duplicated, &1_u8),
            Err(expected)
        );
        assert_eq!(dispatcher.cached_resolutions(), 0);
    }

    trait Named {
        fn name(&self) -> String;
    }
    impl Interface for dyn Named {}

    trait Titled: Named {}
    impl Interface for dyn Titled {
        fn declare(interface: &mut InterfaceDecl<Self>) {
            interface.extends::<dyn Named>(|t| t);
        }
    }

    trait Priced {}
    impl Interface for dyn Priced {}

    struct Item {
        name: &'static str,
    }
    impl Named for Item {
        fn name(&self) -> String {
            self.name.to_owned()
        }
    }
    impl Class for Item {
        fn declare(class: &mut ClassDecl<Self>) {
            class.implements::<dyn Named>(|i| i);
        }
    }

    struct Book {
        item: Item,
    }
    impl Named for Book {
        fn name(&self) -> String {
            format!("book {}", self.item.name)
        }
    }
    impl Titled for Book {}
    impl Priced for Book {}
    impl Class for Book {
        fn declare(class: &mut ClassDecl<Self>) {
            class
                .extends::<Item>(|b| &b.item)
                .implements::<dyn Priced>(|b| b)
                .implements::<dyn Titled>(|b| b);
        }
    }

    struct Gift {
        item: Item,
    }
    impl Class for Gift {
        fn declare(class: &mut ClassDecl<Self>) {
            class.extends::<Item>(|g| &g.item);
        }
    }

    #[derive(Default)]
    struct Catalog {
        seen: Vec<String>,
    }
    impl Visitor for Catalog {
        fn signatures(signatures: &mut Signatures<Self>) {
            signatures
                .dispatch_interface::<dyn Named>(|c, n| c.seen.push(format!("named {}", n.name())))
                .dispatch_interface::<dyn Priced>(|c, _| c.seen.push("priced".to_owned()));
        }
    }

    #[test]
    fn inherited_interfaces_view_the_superclass() {
        let dispatcher = Dispatcher::new();
        let mut catalog = Catalog::default();
        let gift = Gift {
            item: Item { name: "pen" },
        };
        dispatcher.dispatch(&mut catalog, &gift).unwrap();
        assert_eq!(catalog.seen, ["named pen"]);
        assert_eq!(
            dispatcher.resolve::<Catalog>(&gift, Shape::Dispatch),
            Ok(Resolution::Matched {
                signature: 0,
                route: Route::Interface { slot: 0 },
            })
        );
    }

    #[test]
    fn registration_order_breaks_interface_ties() {
        let dispatcher = Dispatcher::new();
        let mut catalog = Catalog::default();
        let book = Book {
            item: Item { name: "dune" },
        };
        dispatcher.dispatch(&mut catalog, &book).unwrap();
        // `Named` is registered first and reached through `Titled`, so `Book` itself answers.
        assert_eq!(catalog.seen, ["named book dune"]);
    }

    #[test]
    fn implementation_order_breaks_interface_ties() {
        let dispatcher = Dispatcher::with_precedence(InterfacePrecedence::Implementation);
        assert_eq!(dispatcher.precedence(), InterfacePrecedence::Implementation);
        let mut catalog = Catalog::default();
        let book = Book {
            item: Item { name: "dune" },
        };
        dispatcher.dispatch(&mut catalog, &book).unwrap();
        assert_eq!(catalog.seen, ["priced"]);
    }

    #[allow(dead_code, reason = "only the declaration is exercised")]
    struct Ouroboros {
        tail: Option<Box<Ouroboros>>,
    }
    impl Class for Ouroboros {
        fn declare(class: &mut ClassDecl<Self>) {
            class.extends::<Self>(|o| o.tail.as_deref().unwrap_or(o));
        }
    }

    #[test]
    fn cyclic_hierarchy_is_reported_and_cached() {
        let dispatcher = Dispatcher::new();
        let mut recorder = Recorder::default();
        let target = Ouroboros { tail: None };
        let expected = DispatchError::CyclicHierarchy {
            class: TypeKey::of::<Ouroboros>(),
        };
        assert_eq!(dispatcher.dispatch(&mut recorder, &target), Err(expected.clone()));
        assert_eq!(dispatcher.ancestry(&target).unwrap_err(), expected);
        assert!(recorder.fallbacks.is_empty(), "configuration errors skip the fallback");
    }

    #[test]
    fn threads_share_one_dispatcher() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Dispatcher>();

        let dispatcher = Dispatcher::new();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    let mut recorder = Recorder::default();
                    for _ in 0..16 {
                        dispatcher.dispatch(&mut recorder, &final_class()).unwrap();
                        dispatcher.dispatch(&mut recorder, &Identified).unwrap();
                        let value: Option<i64> =
                            dispatcher.handle(&mut recorder, &final_class()).unwrap();
                        assert_eq!(value, Some(41));
                    }
                    assert_eq!(recorder.calls.len(), 32);
                });
            }
        });
        assert_eq!(dispatcher.cached_resolutions(), 3);
    }

    #[test]
    fn free_functions_use_the_global_dispatcher() {
        let mut recorder = Recorder::default();
        dispatch(&mut recorder, &String::from("global")).unwrap();
        assert_eq!(recorder.calls, ["text:global"]);
        assert_eq!(handle::<_, i64>(&mut recorder, &SuperClass { label: "g" }), Ok(Some(51)));
        assert!(core::ptr::eq(Dispatcher::global(), Dispatcher::global()));
    }
}
