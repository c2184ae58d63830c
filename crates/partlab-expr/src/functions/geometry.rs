//! Geometric constructors and matrix transforms
//!
//! `matrix`/`vector`/`rotation`/`placement` build geometric values from
//! scalars; the `m*` family applies a transform matrix built from trailing
//! arguments to a leading matrix, placement or rotation.

use crate::ast::{ExprKind, Expression};
use crate::error::{ExprError, ExprResult};
use crate::evaluator::EvaluationContext;
use crate::functions::Function;
use partlab_core::{Matrix4, Placement, Quantity, Rotation, Unit, Value, Vector3};

fn number_arg(ctx: &EvaluationContext<'_>, arg: &Expression) -> ExprResult<f64> {
    let value = ctx.eval(arg)?;
    let q = value
        .as_quantity()
        .map_err(|_| ExprError::Type(format!("expected a number, got {}", value.type_name())))?;
    Ok(q.value())
}

fn angle_arg(ctx: &EvaluationContext<'_>, arg: &Expression) -> ExprResult<f64> {
    let value = ctx.eval(arg)?;
    let q = value
        .as_quantity()
        .map_err(|_| ExprError::Type(format!("expected an angle, got {}", value.type_name())))?;
    if !q.is_dimensionless_or(Unit::ANGLE) {
        return Err(ExprError::Unit(
            "Unit must be either empty or an angle".into(),
        ));
    }
    Ok(q.value().to_radians())
}

fn length_arg(ctx: &EvaluationContext<'_>, arg: &Expression) -> ExprResult<f64> {
    let value = ctx.eval(arg)?;
    let q = value
        .as_quantity()
        .map_err(|_| ExprError::Type(format!("expected a length, got {}", value.type_name())))?;
    if !q.is_dimensionless_or(Unit::LENGTH) {
        return Err(ExprError::Unit(
            "Unit must be either empty or a length".into(),
        ));
    }
    Ok(q.value())
}

fn value_to_f64(value: &Value) -> ExprResult<f64> {
    let q = value
        .as_quantity()
        .map_err(|_| ExprError::Type(format!("expected a number, got {}", value.type_name())))?;
    Ok(q.value())
}

// A vector argument is either one 3-element sequence or three scalars.
fn vector_args(
    ctx: &EvaluationContext<'_>,
    args: &[Expression],
    scalar: fn(&EvaluationContext<'_>, &Expression) -> ExprResult<f64>,
) -> ExprResult<Vector3> {
    if args.len() == 1 {
        let value = ctx.eval(&args[0])?;
        match &value {
            Value::Vector(v) => Ok(*v),
            Value::List(items) | Value::Tuple(items) if items.len() == 3 => Ok(Vector3::new(
                value_to_f64(&items[0])?,
                value_to_f64(&items[1])?,
                value_to_f64(&items[2])?,
            )),
            _ => Err(ExprError::Type(format!(
                "expected a vector or 3-element sequence, got {}",
                value.type_name()
            ))),
        }
    } else if args.len() == 3 {
        Ok(Vector3::new(
            scalar(ctx, &args[0])?,
            scalar(ctx, &args[1])?,
            scalar(ctx, &args[2])?,
        ))
    } else {
        Err(ExprError::Type(
            "expected a vector or three scalar components".into(),
        ))
    }
}

// Left-multiply the target by a transform matrix, preserving the target's
// shape where possible.
fn transform_target(target: &Value, m: Matrix4) -> ExprResult<Value> {
    match target {
        Value::Matrix(t) => Ok(Value::Matrix(m * *t)),
        Value::Placement(p) => Ok(Value::Placement(Placement::from_matrix(&(m * p.to_matrix())))),
        Value::Rotation(r) => Ok(Value::Rotation(Rotation::from_matrix(&(m * r.to_matrix())))),
        _ => Err(ExprError::Type(format!(
            "expected a matrix, placement or rotation, got {}",
            target.type_name()
        ))),
    }
}

fn build_rotation(ctx: &EvaluationContext<'_>, args: &[Expression]) -> ExprResult<Rotation> {
    match args.len() {
        1 => {
            let value = ctx.eval(&args[0])?;
            match value {
                Value::Rotation(r) => Ok(r),
                _ => Err(ExprError::Type(format!(
                    "expected a rotation, got {}",
                    value.type_name()
                ))),
            }
        }
        2 => {
            let axis = vector_args(ctx, &args[..1], number_arg)?;
            let angle = angle_arg(ctx, &args[1])?;
            Ok(Rotation::from_axis_angle(axis, angle))
        }
        3 => {
            // yaw, pitch, roll applied about Z, Y, X
            let yaw = angle_arg(ctx, &args[0])?;
            let pitch = angle_arg(ctx, &args[1])?;
            let roll = angle_arg(ctx, &args[2])?;
            let rz = Rotation::from_axis_angle(Vector3::new(0.0, 0.0, 1.0), yaw);
            let ry = Rotation::from_axis_angle(Vector3::new(0.0, 1.0, 0.0), pitch);
            let rx = Rotation::from_axis_angle(Vector3::new(1.0, 0.0, 0.0), roll);
            Ok(rz.multiply(&ry).multiply(&rx))
        }
        _ => Err(ExprError::Type(
            "expected a rotation, axis and angle, or yaw, pitch and roll".into(),
        )),
    }
}

fn build_placement(ctx: &EvaluationContext<'_>, args: &[Expression]) -> ExprResult<Placement> {
    match args.len() {
        1 => {
            let value = ctx.eval(&args[0])?;
            match value {
                Value::Placement(p) => Ok(p),
                Value::Matrix(m) => Ok(Placement::from_matrix(&m)),
                _ => Err(ExprError::Type(format!(
                    "expected a placement or matrix, got {}",
                    value.type_name()
                ))),
            }
        }
        2 => {
            let position = vector_args(ctx, &args[..1], length_arg)?;
            let rotation = build_rotation(ctx, &args[1..])?;
            Ok(Placement::new(position, rotation))
        }
        3 => {
            let position = vector_args(ctx, &args[..1], length_arg)?;
            let axis = vector_args(ctx, &args[1..2], number_arg)?;
            let angle = angle_arg(ctx, &args[2])?;
            Ok(Placement::new(position, Rotation::from_axis_angle(axis, angle)))
        }
        _ => Err(ExprError::Type(
            "expected a matrix, a position and rotation, or a position, axis and angle".into(),
        )),
    }
}

fn build_matrix(ctx: &EvaluationContext<'_>, args: &[Expression]) -> ExprResult<Matrix4> {
    let mut entries = Vec::with_capacity(16);
    for arg in args {
        entries.push(number_arg(ctx, arg)?);
    }
    Ok(Matrix4::from_entries(&entries))
}

fn build_translation(ctx: &EvaluationContext<'_>, args: &[Expression]) -> ExprResult<Matrix4> {
    let v = vector_args(ctx, args, length_arg)?;
    Ok(Matrix4::translation(v.x, v.y, v.z))
}

fn axis_for(f: Function) -> Vector3 {
    match f {
        Function::RotationX | Function::MRotateX => Vector3::new(1.0, 0.0, 0.0),
        Function::RotationY | Function::MRotateY => Vector3::new(0.0, 1.0, 0.0),
        _ => Vector3::new(0.0, 0.0, 1.0),
    }
}

/// Evaluate `list` and `tuple`. A single range argument expands to its cell
/// values instead of becoming a one-element collection.
pub fn eval_collection(
    ctx: &EvaluationContext<'_>,
    f: Function,
    args: &[Expression],
) -> ExprResult<Value> {
    let items = if args.len() == 1 && matches!(args[0].kind, ExprKind::Range { .. }) {
        match ctx.eval(&args[0])? {
            Value::List(items) => items,
            other => vec![other],
        }
    } else {
        let mut items = Vec::with_capacity(args.len());
        for arg in args {
            items.push(ctx.eval(arg)?);
        }
        items
    };
    Ok(match f {
        Function::Tuple => Value::Tuple(items),
        _ => Value::List(items),
    })
}

pub fn evaluate(
    ctx: &EvaluationContext<'_>,
    f: Function,
    args: &[Expression],
) -> ExprResult<Value> {
    match f {
        Function::Matrix => Ok(Value::Matrix(build_matrix(ctx, args)?)),
        Function::Vector => Ok(Value::Vector(vector_args(ctx, args, number_arg)?)),
        Function::Rotation => Ok(Value::Rotation(build_rotation(ctx, args)?)),
        Function::RotationX | Function::RotationY | Function::RotationZ => {
            let angle = angle_arg(ctx, &args[0])?;
            Ok(Value::Rotation(Rotation::from_axis_angle(axis_for(f), angle)))
        }
        Function::Placement => Ok(Value::Placement(build_placement(ctx, args)?)),
        Function::TranslationM => Ok(Value::Matrix(build_translation(ctx, args)?)),
        Function::MInvert => {
            let value = ctx.eval(&args[0])?;
            match value {
                Value::Matrix(m) => Ok(Value::Matrix(
                    m.inverse().map_err(|e| ExprError::Evaluation(e.to_string()))?,
                )),
                Value::Placement(p) => Ok(Value::Placement(p.inverse())),
                Value::Rotation(r) => Ok(Value::Rotation(r.inverse())),
                _ => Err(ExprError::Type(format!(
                    "expected a matrix, placement or rotation, got {}",
                    value.type_name()
                ))),
            }
        }
        Function::MRotate => {
            let target = ctx.eval(&args[0])?;
            let rotation = build_rotation(ctx, &args[1..])?;
            transform_target(&target, rotation.to_matrix())
        }
        Function::MRotateX | Function::MRotateY | Function::MRotateZ => {
            let target = ctx.eval(&args[0])?;
            let angle = angle_arg(ctx, &args[1])?;
            let rotation = Rotation::from_axis_angle(axis_for(f), angle);
            transform_target(&target, rotation.to_matrix())
        }
        Function::MScale => {
            let target = ctx.eval(&args[0])?;
            let scale = vector_args(ctx, &args[1..], number_arg)?;
            transform_target(&target, Matrix4::scale(scale))
        }
        Function::MTranslate => {
            let target = ctx.eval(&args[0])?;
            let m = build_translation(ctx, &args[1..])?;
            // translating a rotation promotes it to a placement
            if let Value::Rotation(r) = &target {
                return Ok(Value::Placement(Placement::from_matrix(
                    &(m * r.to_matrix()),
                )));
            }
            transform_target(&target, m)
        }
        Function::Create => {
            let type_name = match ctx.eval(&args[0])? {
                Value::String(s) => s,
                other => {
                    return Err(ExprError::Type(format!(
                        "expected a type name, got {}",
                        other.type_name()
                    )))
                }
            };
            let rest = &args[1..];
            match type_name.to_ascii_lowercase().as_str() {
                "matrix" => Ok(Value::Matrix(build_matrix(ctx, rest)?)),
                "vector" => Ok(Value::Vector(vector_args(ctx, rest, number_arg)?)),
                "rotation" => Ok(Value::Rotation(build_rotation(ctx, rest)?)),
                "placement" => Ok(Value::Placement(build_placement(ctx, rest)?)),
                other => Err(ExprError::Type(format!("unknown type '{}'", other))),
            }
        }
        _ => Err(ExprError::Evaluation("not a geometric function".into())),
    }
}
