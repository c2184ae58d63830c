//! # partlab-core
//!
//! Core data structures for the partlab parametric modeling library.
//!
//! This crate provides the fundamental types used throughout partlab:
//! - [`Quantity`] and [`Unit`] - Unit-aware numbers with dimensional analysis
//! - [`Value`] - Boxed runtime values (quantities, strings, lists, geometry)
//! - [`DocumentGraph`], [`Document`], [`DocObject`] - The host object model
//! - [`Vector3`], [`Matrix4`], [`Rotation`], [`Placement`] - 3D math types
//!
//! ## Example
//!
//! ```rust
//! use partlab_core::{DocumentGraph, Quantity, Value};
//!
//! let mut graph = DocumentGraph::new();
//! let doc = graph.new_document("Model").unwrap();
//! let d = graph.document_mut(doc).unwrap();
//!
//! let obj = d.add_object("Box").unwrap();
//! d.object_mut(obj)
//!     .unwrap()
//!     .set_property("Length", Value::from(Quantity::new(10.0, "mm").unwrap()));
//! ```

pub mod document;
pub mod error;
pub mod math3d;
pub mod quantity;
pub mod value;

// Re-exports for convenience
pub use document::{
    DocId, DocObject, Document, DocumentGraph, LabelMatch, ObjId, Property,
    LINK_TOUCHED_PROPERTY,
};
pub use error::{Error, Result};
pub use math3d::{Matrix4, Placement, Rotation, Vector3};
pub use quantity::{essentially_equal, essentially_integer, essentially_zero, Quantity, Unit};
pub use value::Value;
