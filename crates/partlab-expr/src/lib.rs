//! # partlab-expr
//!
//! Expression language for partlab documents.
//!
//! This crate provides:
//! - Expression parsing (text → AST), including quantities with units,
//!   object paths and cell ranges
//! - Expression evaluation (AST → value) against a document graph
//! - Built-in math, geometry and aggregate functions
//! - Path resolution with rename-resistant canonical rendering
//! - Tree rewriting for renames, relabels and cell moves
//!
//! ## Example
//!
//! ```rust,ignore
//! use partlab_expr::{parse, evaluate};
//!
//! let expr = parse(owner, "2 * (<<Crate>>.Length + 5 mm)")?;
//! let value = evaluate(&graph, &expr)?;
//! ```

pub mod address;
pub mod ast;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod parser;
pub mod path;
pub mod visitor;

pub use address::{CellAddress, CellRange};
pub use ast::{ExprKind, Expression, Op, UnaryOp};
pub use error::{ExprError, ExprResult};
pub use evaluator::{evaluate, EvaluationContext};
pub use parser::{parse, parse_unit, tokenize, Token, TokenKind};
pub use path::{Component, ObjectIdentifier, PathString, PseudoProperty, ResolveResult};
pub use visitor::{DepScope, ExpressionVisitor};
