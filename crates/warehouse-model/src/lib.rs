//! Data model for the warehouse view-materialization scheduler: the
//! immutable [`View`] descriptor, its content-addressed [`ViewId`], and
//! the small vocabulary of [`Transformation`] and [`StorageFormat`]
//! values a view can carry.
//!
//! Parsing the view DSL into these types, and everything downstream of a
//! materialized view (readers, query engines), is out of scope.

mod id;
mod transformation;
mod view;

pub use id::{VersionDigest, ViewId};
pub use transformation::{StorageFormat, Transformation};
pub use view::View;
