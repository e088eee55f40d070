//! mygate Query - request-to-SQL translation
//!
//! Three stages, all pure data transformations:
//! - `params` decodes PostgREST filters, ordering, and pagination (plus the
//!   legacy `_sort`/`_p`/`_size`/`_where` forms) into a neutral AST
//! - `select` parses the `select` expression into a tree of columns and
//!   embedded relations and resolves relations against the catalog
//! - `compile` emits parameterized SQL fragments from the two above
//!
//! Nothing in this crate touches a connection; user data always rides
//! positional parameters, never the SQL text.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod compile;
pub mod params;
pub mod select;

pub use compile::{BindValue, SqlFragment};
pub use params::{FilterOp, FilterValue, OrderTerm, Page, ParsedQuery, Predicate};
pub use select::{Embed, RelationNode, SelectItem, MAX_EMBED_DEPTH};
