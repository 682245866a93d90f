//! In-memory representation of model graphs.
//!
//! A model graph is an arena of [`Node`]s keyed by id plus a list of
//! [`Relationship`]s between those ids, grouped into a [`GraphBatch`] per mapped
//! description.

mod types;

pub use types::{labels, rel_types, ChildRef, GraphBatch, Node, Relationship};
