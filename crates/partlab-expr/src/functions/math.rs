//! Scalar math functions with unit legality rules
//!
//! Angle-taking functions accept dimensionless or angle-tagged input and
//! convert degrees to radians at the boundary; inverse trig returns
//! angle-tagged degrees. Root functions require every signature exponent to
//! divide evenly.

use crate::ast::Expression;
use crate::error::{ExprError, ExprResult};
use crate::evaluator::EvaluationContext;
use crate::functions::Function;
use partlab_core::{Quantity, Unit, Value};

fn quantity_arg(
    ctx: &EvaluationContext<'_>,
    args: &[Expression],
    index: usize,
    what: &str,
) -> ExprResult<Quantity> {
    let value = ctx.eval(&args[index])?;
    value
        .as_quantity()
        .map_err(|_| ExprError::Type(format!("Invalid {} argument: {}", what, value.type_name())))
}

fn angle_input(q: &Quantity) -> ExprResult<f64> {
    if !q.is_dimensionless_or(Unit::ANGLE) {
        return Err(ExprError::Unit(
            "Unit must be either empty or an angle".into(),
        ));
    }
    // base angle unit is degrees
    Ok(q.value().to_radians())
}

fn dimensionless_input(q: &Quantity) -> ExprResult<f64> {
    if !q.is_dimensionless() {
        return Err(ExprError::Unit("Unit must be empty".into()));
    }
    Ok(q.value())
}

fn angle_result(radians: f64) -> Quantity {
    Quantity::with_unit(radians.to_degrees(), Unit::ANGLE)
}

pub fn evaluate(
    ctx: &EvaluationContext<'_>,
    f: Function,
    fname: &str,
    args: &[Expression],
) -> ExprResult<Value> {
    let v1 = quantity_arg(ctx, args, 0, "first")?;
    let v2 = if args.len() > 1 {
        Some(quantity_arg(ctx, args, 1, "second")?)
    } else {
        None
    };
    let v3 = if args.len() > 2 {
        Some(quantity_arg(ctx, args, 2, "third")?)
    } else {
        None
    };

    let result = match f {
        Function::Sin => Quantity::dimensionless(angle_input(&v1)?.sin()),
        Function::Cos => Quantity::dimensionless(angle_input(&v1)?.cos()),
        Function::Tan => Quantity::dimensionless(angle_input(&v1)?.tan()),
        Function::Asin => angle_result(dimensionless_input(&v1)?.asin()),
        Function::Acos => angle_result(dimensionless_input(&v1)?.acos()),
        Function::Atan => angle_result(dimensionless_input(&v1)?.atan()),
        Function::Exp => Quantity::dimensionless(dimensionless_input(&v1)?.exp()),
        Function::Log => Quantity::dimensionless(dimensionless_input(&v1)?.ln()),
        Function::Log10 => Quantity::dimensionless(dimensionless_input(&v1)?.log10()),
        Function::Sinh => Quantity::dimensionless(dimensionless_input(&v1)?.sinh()),
        Function::Cosh => Quantity::dimensionless(dimensionless_input(&v1)?.cosh()),
        Function::Tanh => Quantity::dimensionless(dimensionless_input(&v1)?.tanh()),
        Function::Abs => Quantity::with_unit(v1.value().abs(), v1.unit()),
        Function::Round => Quantity::with_unit(v1.value().round(), v1.unit()),
        Function::Trunc => Quantity::with_unit(v1.value().trunc(), v1.unit()),
        Function::Ceil => Quantity::with_unit(v1.value().ceil(), v1.unit()),
        Function::Floor => Quantity::with_unit(v1.value().floor(), v1.unit()),
        Function::Sqrt => {
            let unit = v1.unit().root(2).map_err(|e| ExprError::Unit(e.to_string()))?;
            Quantity::with_unit(v1.value().sqrt(), unit)
        }
        Function::Cbrt => {
            let unit = v1.unit().root(3).map_err(|e| ExprError::Unit(e.to_string()))?;
            Quantity::with_unit(v1.value().cbrt(), unit)
        }
        Function::Atan2 => {
            let v2 = v2.ok_or_else(|| ExprError::Type("Invalid second argument".into()))?;
            if v1.unit() != v2.unit() {
                return Err(ExprError::Unit("Units must be equal".into()));
            }
            angle_result(v1.value().atan2(v2.value()))
        }
        Function::Mod => {
            let v2 = v2.ok_or_else(|| ExprError::Type("Invalid second argument".into()))?;
            v1.rem(&v2)
        }
        Function::Pow => {
            let v2 = v2.ok_or_else(|| ExprError::Type("Invalid second argument".into()))?;
            v1.pow(&v2).map_err(|e| ExprError::Unit(e.to_string()))?
        }
        Function::Hypot | Function::Cath => {
            let v2 = v2.ok_or_else(|| ExprError::Type("Invalid second argument".into()))?;
            if v1.unit() != v2.unit() {
                return Err(ExprError::Unit("Units must be equal".into()));
            }
            if let Some(v3) = &v3 {
                if v2.unit() != v3.unit() {
                    return Err(ExprError::Unit("Units must be equal".into()));
                }
            }
            let third = v3.map(|q| q.value().powi(2)).unwrap_or(0.0);
            let sum = if f == Function::Hypot {
                v1.value().powi(2) + v2.value().powi(2) + third
            } else {
                v1.value().powi(2) - v2.value().powi(2) - third
            };
            Quantity::with_unit(sum.sqrt(), v1.unit())
        }
        _ => return Err(ExprError::UnknownFunction(fname.to_string())),
    };
    Ok(Value::Quantity(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::evaluate as eval_expr;
    use partlab_core::DocumentGraph;
    use pretty_assertions::assert_eq;

    fn call(fname: &str, args: Vec<Expression>) -> ExprResult<Value> {
        let f = crate::functions::lookup(fname).unwrap();
        let expr = Expression::function(f, fname, args)?;
        eval_expr(&DocumentGraph::new(), &expr)
    }

    fn num(v: f64) -> Expression {
        Expression::number(Quantity::dimensionless(v))
    }

    fn qty(v: f64, unit: &str) -> Expression {
        Expression::number(Quantity::new(v, unit).unwrap())
    }

    #[test]
    fn test_trig_degrees() {
        let result = call("sin", vec![qty(90.0, "deg")]).unwrap();
        let q = result.as_quantity().unwrap();
        assert!((q.value() - 1.0).abs() < 1e-12);
        assert!(q.is_dimensionless());
    }

    #[test]
    fn test_trig_rejects_length() {
        assert!(matches!(
            call("cos", vec![qty(1.0, "mm")]),
            Err(ExprError::InExpression { .. })
        ));
    }

    #[test]
    fn test_inverse_trig_returns_angle() {
        let result = call("asin", vec![num(1.0)]).unwrap();
        let q = result.as_quantity().unwrap();
        assert_eq!(q.unit(), Unit::ANGLE);
        assert!((q.value() - 90.0).abs() < 1e-12);
    }

    #[test]
    fn test_sqrt_unit_rule() {
        let result = call("sqrt", vec![qty(4.0, "mm^2")]).unwrap();
        assert_eq!(
            result.as_quantity().unwrap(),
            Quantity::new(2.0, "mm").unwrap()
        );
        // odd exponent fails
        assert!(call("sqrt", vec![qty(4.0, "mm")]).is_err());
    }

    #[test]
    fn test_pow_integer_rule() {
        let result = call("pow", vec![qty(2.0, "mm"), num(3.0)]).unwrap();
        assert_eq!(
            result.as_quantity().unwrap(),
            Quantity::new(8.0, "mm^3").unwrap()
        );
        assert!(call("pow", vec![qty(2.0, "mm"), num(0.5)]).is_err());
        assert!(call("pow", vec![num(2.0), qty(2.0, "mm")]).is_err());
    }

    #[test]
    fn test_hypot_and_cath() {
        let result = call("hypot", vec![qty(3.0, "mm"), qty(4.0, "mm")]).unwrap();
        assert_eq!(
            result.as_quantity().unwrap(),
            Quantity::new(5.0, "mm").unwrap()
        );
        let result = call("cath", vec![qty(5.0, "mm"), qty(4.0, "mm")]).unwrap();
        assert_eq!(
            result.as_quantity().unwrap(),
            Quantity::new(3.0, "mm").unwrap()
        );
        assert!(call("hypot", vec![qty(3.0, "mm"), qty(4.0, "s")]).is_err());
    }

    #[test]
    fn test_atan2_equal_units() {
        let result = call("atan2", vec![qty(1.0, "mm"), qty(1.0, "mm")]).unwrap();
        let q = result.as_quantity().unwrap();
        assert!((q.value() - 45.0).abs() < 1e-12);
        assert!(call("atan2", vec![qty(1.0, "mm"), num(1.0)]).is_err());
    }

    #[test]
    fn test_mod_derives_unit() {
        let result = call("mod", vec![qty(7.0, "mm"), num(3.0)]).unwrap();
        assert_eq!(
            result.as_quantity().unwrap(),
            Quantity::new(1.0, "mm").unwrap()
        );
    }

    #[test]
    fn test_rounding_keeps_unit() {
        let result = call("ceil", vec![qty(1.2, "mm")]).unwrap();
        assert_eq!(
            result.as_quantity().unwrap(),
            Quantity::new(2.0, "mm").unwrap()
        );
    }
}
