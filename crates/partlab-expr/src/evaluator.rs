//! Expression evaluation
//!
//! Evaluation is a pure recursive tree-walk against a borrowed document
//! graph. Operator arguments are restricted to a closed set of value
//! categories before dispatch, so expressions cannot reach arbitrary host
//! object protocols through operator overloads.

use crate::ast::{ExprKind, Expression, Op, UnaryOp};
use crate::error::{ExprError, ExprResult};
use crate::functions;
use partlab_core::{DocumentGraph, Quantity, Value};
use std::cmp::Ordering;

/// Evaluation environment: the live graph the expression resolves against
pub struct EvaluationContext<'a> {
    graph: &'a DocumentGraph,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(graph: &'a DocumentGraph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &'a DocumentGraph {
        self.graph
    }

    /// Evaluate a subtree, then apply its trailing components.
    ///
    /// A failure is annotated with the rendering of the subtree that raised
    /// it; outer frames pass an already-annotated error through unchanged,
    /// so the message names the innermost failing sub-expression.
    pub fn eval(&self, expr: &Expression) -> ExprResult<Value> {
        self.eval_with_components(expr)
            .map_err(|e| e.in_expression(&expr.to_display_string()))
    }

    fn eval_with_components(&self, expr: &Expression) -> ExprResult<Value> {
        let mut value = self.eval_kind(expr)?;
        for comp in &expr.components {
            value = comp.apply(&value)?;
        }
        Ok(value)
    }

    fn eval_kind(&self, expr: &Expression) -> ExprResult<Value> {
        match &expr.kind {
            ExprKind::Number(q) | ExprKind::Unit { quantity: q, .. } => Ok(Value::Quantity(*q)),
            ExprKind::Constant { name, quantity } => Ok(match name.as_str() {
                "None" => Value::None,
                "True" => Value::Boolean(true),
                "False" => Value::Boolean(false),
                _ => Value::Quantity(*quantity),
            }),
            ExprKind::String(text) => Ok(Value::String(text.clone())),
            ExprKind::Variable(path) => path.get_value(self.graph),
            ExprKind::Binary { op, left, right } => {
                let lhs = self.eval(left)?;
                let rhs = self.eval(right)?;
                apply_binary(*op, lhs, rhs)
            }
            ExprKind::Unary { op, operand } => {
                let value = self.eval(operand)?;
                let q = value.as_quantity().map_err(type_error)?;
                Ok(Value::Quantity(match op {
                    UnaryOp::Neg => q.scaled(-1.0),
                    UnaryOp::Pos => q,
                }))
            }
            ExprKind::Function { f, fname, args } => functions::evaluate(self, *f, fname, args),
            ExprKind::Conditional {
                condition,
                true_expr,
                false_expr,
            } => {
                if self.eval(condition)?.is_true() {
                    self.eval(true_expr)
                } else {
                    self.eval(false_expr)
                }
            }
            ExprKind::Range { owner, begin, end } => {
                let range = crate::address::CellRange::new(*begin, *end);
                let mut items = Vec::new();
                for addr in range.cells() {
                    if let Some(value) = self
                        .graph
                        .property_value(*owner, &addr.to_a1_string())
                    {
                        items.push(value.clone());
                    }
                }
                Ok(Value::List(items))
            }
            ExprKind::Opaque(value) => Ok(value.clone()),
        }
    }
}

/// Evaluate `expr` against `graph`. Failures carry an "in expression"
/// annotation naming the innermost failing subtree.
pub fn evaluate(graph: &DocumentGraph, expr: &Expression) -> ExprResult<Value> {
    EvaluationContext::new(graph).eval(expr)
}

fn type_error(e: partlab_core::Error) -> ExprError {
    ExprError::Type(e.to_string())
}

fn unit_error(e: partlab_core::Error) -> ExprError {
    ExprError::Unit(e.to_string())
}

// The operand whitelist: None never reaches an operator.
fn check_operand(value: &Value) -> ExprResult<()> {
    match value {
        Value::None => Err(ExprError::Type("unsupported operand: None".into())),
        _ => Ok(()),
    }
}

fn apply_binary(op: Op, lhs: Value, rhs: Value) -> ExprResult<Value> {
    check_operand(&lhs)?;
    check_operand(&rhs)?;

    match op {
        Op::Add => match (&lhs, &rhs) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
            (Value::List(a), Value::List(b)) => {
                let mut out = a.clone();
                out.extend(b.iter().cloned());
                Ok(Value::List(out))
            }
            _ => {
                let a = lhs.as_quantity().map_err(type_error)?;
                let b = rhs.as_quantity().map_err(type_error)?;
                Ok(Value::Quantity(a.add(&b).map_err(unit_error)?))
            }
        },
        Op::Sub => {
            let a = lhs.as_quantity().map_err(type_error)?;
            let b = rhs.as_quantity().map_err(type_error)?;
            Ok(Value::Quantity(a.sub(&b).map_err(unit_error)?))
        }
        Op::Mul | Op::Unit => match (&lhs, &rhs) {
            (Value::Matrix(a), Value::Matrix(b)) => Ok(Value::Matrix(*a * *b)),
            (Value::Matrix(a), Value::Vector(b)) => Ok(Value::Vector(a.apply(*b))),
            (Value::Rotation(a), Value::Rotation(b)) => Ok(Value::Rotation(a.multiply(b))),
            (Value::Placement(a), Value::Placement(b)) => Ok(Value::Placement(a.multiply(b))),
            _ => {
                let a = lhs.as_quantity().map_err(type_error)?;
                let b = rhs.as_quantity().map_err(type_error)?;
                Ok(Value::Quantity(a.mul(&b)))
            }
        },
        Op::Div => {
            let a = lhs.as_quantity().map_err(type_error)?;
            let b = rhs.as_quantity().map_err(type_error)?;
            Ok(Value::Quantity(a.div(&b)))
        }
        Op::Mod => {
            let a = lhs.as_quantity().map_err(type_error)?;
            let b = rhs.as_quantity().map_err(type_error)?;
            Ok(Value::Quantity(a.rem(&b)))
        }
        Op::Pow => {
            let a = lhs.as_quantity().map_err(type_error)?;
            let b = rhs.as_quantity().map_err(type_error)?;
            Ok(Value::Quantity(a.pow(&b).map_err(unit_error)?))
        }
        Op::Eq | Op::Neq | Op::Lt | Op::Gt | Op::Lte | Op::Gte => compare(op, &lhs, &rhs),
    }
}

// Comparisons yield a dimensionless boolean and require comparable types.
fn compare(op: Op, lhs: &Value, rhs: &Value) -> ExprResult<Value> {
    let ordering = match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => {
            let a = lhs.as_quantity().map_err(type_error)?;
            let b = rhs.as_quantity().map_err(type_error)?;
            a.compare(&b).map_err(unit_error)?
        }
    };
    let result = match op {
        Op::Eq => ordering == Ordering::Equal,
        Op::Neq => ordering != Ordering::Equal,
        Op::Lt => ordering == Ordering::Less,
        Op::Gt => ordering == Ordering::Greater,
        Op::Lte => ordering != Ordering::Greater,
        Op::Gte => ordering != Ordering::Less,
        _ => unreachable!(),
    };
    Ok(Value::Boolean(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::ObjectIdentifier;
    use pretty_assertions::assert_eq;

    fn num(v: f64) -> Expression {
        Expression::number(Quantity::dimensionless(v))
    }

    fn qty(v: f64, unit: &str) -> Expression {
        Expression::number(Quantity::new(v, unit).unwrap())
    }

    fn empty_graph() -> DocumentGraph {
        DocumentGraph::new()
    }

    #[test]
    fn test_arithmetic() {
        let graph = empty_graph();
        let expr = Expression::binary(
            Op::Add,
            num(1.0),
            Expression::binary(Op::Mul, num(2.0), num(3.0)),
        );
        assert_eq!(evaluate(&graph, &expr).unwrap(), Value::from(7.0));
    }

    #[test]
    fn test_unit_addition() {
        let graph = empty_graph();
        let expr = Expression::binary(Op::Add, qty(5.0, "mm"), qty(1.0, "cm"));
        let result = evaluate(&graph, &expr).unwrap();
        assert_eq!(result, Value::from(Quantity::new(15.0, "mm").unwrap()));
    }

    #[test]
    fn test_unit_mismatch_reports_expression() {
        let graph = empty_graph();
        let expr = Expression::binary(Op::Add, qty(5.0, "mm"), qty(1.0, "s"));
        let err = evaluate(&graph, &expr).unwrap_err();
        assert!(err.to_string().contains("in expression: 5 mm + 1 s"));
    }

    #[test]
    fn test_error_context_names_failing_subtree() {
        let graph = empty_graph();
        let bad = Expression::binary(Op::Add, qty(5.0, "mm"), qty(1.0, "s"));
        let expr = Expression::binary(Op::Add, qty(1.0, "mm"), bad);
        let err = evaluate(&graph, &expr).unwrap_err();
        let msg = err.to_string();
        // the annotation cites the subtree that failed, not the whole formula
        assert!(msg.contains("in expression: 5 mm + 1 s"));
        assert!(!msg.contains("1 mm"));
    }

    #[test]
    fn test_string_concat() {
        let graph = empty_graph();
        let expr = Expression::binary(
            Op::Add,
            Expression::string("foo"),
            Expression::string("bar"),
        );
        assert_eq!(evaluate(&graph, &expr).unwrap(), Value::from("foobar"));
    }

    #[test]
    fn test_comparison_across_units() {
        let graph = empty_graph();
        let expr = Expression::binary(Op::Lt, qty(5.0, "mm"), qty(1.0, "cm"));
        assert_eq!(evaluate(&graph, &expr).unwrap(), Value::Boolean(true));

        let expr = Expression::binary(Op::Eq, qty(10.0, "mm"), qty(1.0, "cm"));
        assert_eq!(evaluate(&graph, &expr).unwrap(), Value::Boolean(true));

        let expr = Expression::binary(Op::Lt, qty(5.0, "mm"), qty(1.0, "s"));
        assert!(evaluate(&graph, &expr).is_err());
    }

    #[test]
    fn test_conditional() {
        let graph = empty_graph();
        let expr = Expression::conditional(
            Expression::binary(Op::Gt, num(2.0), num(1.0)),
            num(10.0),
            num(20.0),
        );
        assert_eq!(evaluate(&graph, &expr).unwrap(), Value::from(10.0));
    }

    #[test]
    fn test_variable_resolution() {
        let mut graph = DocumentGraph::new();
        let doc = graph.new_document("Model").unwrap();
        let d = graph.document_mut(doc).unwrap();
        let obj = d.add_object("Box").unwrap();
        d.object_mut(obj)
            .unwrap()
            .set_property("Length", Value::from(Quantity::new(10.0, "mm").unwrap()));

        let expr = Expression::binary(
            Op::Mul,
            Expression::variable(ObjectIdentifier::from_property(obj, "Length")),
            num(2.0),
        );
        assert_eq!(
            evaluate(&graph, &expr).unwrap(),
            Value::from(Quantity::new(20.0, "mm").unwrap())
        );
    }

    #[test]
    fn test_range_expansion() {
        let mut graph = DocumentGraph::new();
        let doc = graph.new_document("Sheet").unwrap();
        let d = graph.document_mut(doc).unwrap();
        let obj = d.add_object("Spreadsheet").unwrap();
        let o = d.object_mut(obj).unwrap();
        o.set_property("A1", Value::from(1.0));
        o.set_property("A2", Value::from(2.0));
        o.set_property("B1", Value::from(3.0));

        let range = crate::address::CellRange::parse("A1:B2").unwrap();
        let expr = Expression::range(obj, range);
        // B2 has no property and is skipped
        assert_eq!(
            evaluate(&graph, &expr).unwrap(),
            Value::List(vec![Value::from(1.0), Value::from(3.0), Value::from(2.0)])
        );
    }

    #[test]
    fn test_none_operand_rejected() {
        let graph = empty_graph();
        let none = Expression::constant("None").unwrap();
        let expr = Expression::binary(Op::Add, none, num(1.0));
        assert!(matches!(
            evaluate(&graph, &expr).unwrap_err(),
            ExprError::InExpression { .. }
        ));
    }

    #[test]
    fn test_modulo_unit() {
        let graph = empty_graph();
        let expr = Expression::binary(Op::Mod, qty(7.0, "mm"), qty(3.0, "mm"));
        let result = evaluate(&graph, &expr).unwrap();
        // mm/mm cancels to dimensionless
        assert_eq!(result, Value::from(1.0));
    }
}
