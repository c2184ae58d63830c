//! Boxed runtime values
//!
//! [`Value`] is the closed set of value categories that flow between the
//! document graph, property storage, and the expression engine. It stands in
//! for the host scripting runtime's boxed values: every property payload and
//! every expression result is one of these.

use crate::error::{Error, Result};
use crate::math3d::{Matrix4, Placement, Rotation, Vector3};
use crate::quantity::Quantity;
use std::collections::BTreeMap;
use std::fmt;

/// A boxed runtime value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absence of a value
    #[default]
    None,
    Boolean(bool),
    /// A unit-aware number; dimensionless numbers use an empty unit
    Quantity(Quantity),
    String(String),
    List(Vec<Value>),
    /// Like a list, but rendered with tuple syntax
    Tuple(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Vector(Vector3),
    Matrix(Matrix4),
    Rotation(Rotation),
    Placement(Placement),
}

impl Value {
    /// Short category name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Boolean(_) => "boolean",
            Value::Quantity(_) => "quantity",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Map(_) => "map",
            Value::Vector(_) => "vector",
            Value::Matrix(_) => "matrix",
            Value::Rotation(_) => "rotation",
            Value::Placement(_) => "placement",
        }
    }

    /// Numeric coercion: quantities pass through, booleans become 0/1
    pub fn as_quantity(&self) -> Result<Quantity> {
        match self {
            Value::Quantity(q) => Ok(*q),
            Value::Boolean(b) => Ok(Quantity::dimensionless(if *b { 1.0 } else { 0.0 })),
            other => Err(Error::InvalidValueType {
                expected: "quantity",
                actual: other.type_name(),
            }),
        }
    }

    /// Dimensionless numeric coercion
    pub fn as_number(&self) -> Result<f64> {
        let q = self.as_quantity()?;
        if !q.is_dimensionless() {
            return Err(Error::InvalidValueType {
                expected: "dimensionless number",
                actual: "quantity",
            });
        }
        Ok(q.value())
    }

    /// Truth test: None and false are false, numbers by non-zero,
    /// strings/collections by non-empty, everything else is true
    pub fn is_true(&self) -> bool {
        match self {
            Value::None => false,
            Value::Boolean(b) => *b,
            Value::Quantity(q) => q.value() != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(v) | Value::Tuple(v) => !v.is_empty(),
            Value::Map(m) => !m.is_empty(),
            _ => true,
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Quantity(Quantity::dimensionless(v))
    }
}

impl From<Quantity> for Value {
    fn from(q: Quantity) -> Self {
        Value::Quantity(q)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Boolean(true) => write!(f, "True"),
            Value::Boolean(false) => write!(f, "False"),
            Value::Quantity(q) => write!(f, "{}", q),
            Value::String(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Vector(v) => write!(f, "{}", v),
            Value::Matrix(m) => write!(f, "{}", m),
            Value::Rotation(r) => write!(f, "{}", r),
            Value::Placement(p) => write!(f, "{}", p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_quantity() {
        assert_eq!(
            Value::from(2.5).as_quantity().unwrap(),
            Quantity::dimensionless(2.5)
        );
        assert_eq!(
            Value::Boolean(true).as_quantity().unwrap(),
            Quantity::dimensionless(1.0)
        );
        assert!(Value::from("x").as_quantity().is_err());
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::None.is_true());
        assert!(!Value::from(0.0).is_true());
        assert!(Value::from(2.0).is_true());
        assert!(!Value::from("").is_true());
        assert!(Value::from("x").is_true());
        assert!(!Value::List(vec![]).is_true());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::None.to_string(), "None");
        assert_eq!(
            Value::List(vec![Value::from(1.0), Value::from(2.0)]).to_string(),
            "[1, 2]"
        );
        assert_eq!(Value::Tuple(vec![Value::from(1.0)]).to_string(), "(1,)");
    }
}
