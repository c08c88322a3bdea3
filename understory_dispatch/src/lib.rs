// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_dispatch --heading-base-level=0

//! Understory Dispatch: route a value to the most specific handler a visitor declares.
//!
//! ## Overview
//!
//! A [`Visitor`] declares handlers per type. Given a target, a [`Dispatcher`] picks the
//! single most specific handler for the target's runtime type and invokes it, or runs
//! the visitor's [`fallback`](Visitor::fallback) when nothing matches.
//!
//! Two call shapes exist:
//!
//! - [`Dispatcher::dispatch`] runs a side-effecting handler.
//! - [`Dispatcher::handle`] runs a value-producing handler and returns its value as
//!   the requested type, or `None` when nothing matched.
//!
//! ## Hierarchies
//!
//! Targets implement [`Class`]. A class may name one superclass, reached through a
//! projection to an embedded base value, and any number of [`Interface`]s, which are
//! trait object types such as `dyn Named`. Interfaces may extend other interfaces.
//! The derived [`Ancestry`] of a type is computed once per dispatcher.
//!
//! ## Resolution
//!
//! 1. A handler for the target's exact type wins.
//! 2. Otherwise the nearest superclass with a handler wins.
//! 3. Otherwise an interface handler wins. When the target implements several
//!    interfaces with handlers, [`InterfacePrecedence`] decides.
//! 4. Otherwise the fallback runs.
//!
//! Resolutions are cached per visitor type, target type, and shape. The caches are
//! lock-free snapshots; any number of threads may share one dispatcher.
//!
//! ## Example
//!
//! ```
//! use understory_dispatch::{Class, ClassDecl, Dispatcher, Interface, Signatures, Visitor};
//!
//! trait Area {
//!     fn area(&self) -> f64;
//! }
//! impl Interface for dyn Area {}
//!
//! struct Square {
//!     side: f64,
//! }
//! impl Area for Square {
//!     fn area(&self) -> f64 {
//!         self.side * self.side
//!     }
//! }
//! impl Class for Square {
//!     fn declare(class: &mut ClassDecl<Self>) {
//!         class.implements::<dyn Area>(|s| s);
//!     }
//! }
//!
//! struct Tile {
//!     square: Square,
//!     glazed: bool,
//! }
//! impl Class for Tile {
//!     fn declare(class: &mut ClassDecl<Self>) {
//!         class.extends::<Square>(|t| &t.square);
//!     }
//! }
//!
//! struct Survey;
//! impl Visitor for Survey {
//!     fn signatures(signatures: &mut Signatures<Self>) {
//!         signatures
//!             .handle::<Tile, String>(|_, t| format!("tile, glazed: {}", t.glazed))
//!             .handle_interface::<dyn Area, String>(|_, a| format!("area {}", a.area()));
//!     }
//! }
//!
//! let dispatcher = Dispatcher::new();
//! let tile = Tile { square: Square { side: 2.0 }, glazed: true };
//! let found: Option<String> = dispatcher.handle(&mut Survey, &tile).unwrap();
//! assert_eq!(found.as_deref(), Some("tile, glazed: true"));
//!
//! let found: Option<String> = dispatcher.handle(&mut Survey, &Square { side: 3.0 }).unwrap();
//! assert_eq!(found.as_deref(), Some("area 9"));
//!
//! let found: Option<String> = dispatcher.handle(&mut Survey, &5_u32).unwrap();
//! assert_eq!(found, None);
//! ```
//!
//! ## Errors
//!
//! Declaring two handlers for one type within one shape, or a class hierarchy with a
//! cycle or several superclasses, is a configuration error. It is detected on first
//! use, cached, and returned as a [`DispatchError`] by every call that needs the
//! offending declaration. Call [`Dispatcher::prepare`] at startup to surface visitor
//! errors early.
//!
//! ## Logging
//!
//! Builds are reported through [`tracing`](https://docs.rs/tracing) at `debug`, cache
//! misses at `trace`, and configuration errors at `warn`. No subscriber is installed.

mod ancestry;
mod cache;
mod class;
mod dispatcher;
mod error;
mod registry;
mod resolver;
mod types;

pub use ancestry::Ancestry;
pub use class::{Class, ClassDecl, Declaration, Interface, InterfaceDecl, Object};
pub use dispatcher::{Dispatcher, dispatch, handle};
pub use error::DispatchError;
pub use registry::{Registry, Signatures, Visitor};
pub use resolver::{SignatureLookup, resolve};
pub use types::{InterfacePrecedence, Resolution, Route, Shape, TypeKey};
