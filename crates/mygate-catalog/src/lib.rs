//! mygate Catalog - database schema introspection
//!
//! Introspects tables, columns, keys, and stored routines from
//! `INFORMATION_SCHEMA` once at startup and exposes a read-only in-memory
//! view. Every request consults the catalog through a cheap `Arc` snapshot;
//! a rebuild replaces the whole value atomically.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod introspect;
pub mod model;

pub use cache::CatalogCache;
pub use introspect::load_catalog;
pub use model::{
    Catalog, Column, ColumnKey, ForeignKey, ParamMode, Routine, RoutineKind, RoutineParam, Table,
    TypeClass,
};
