//! Built-in expression functions
//!
//! Function names map to opcodes through a fixed registry; unknown names
//! parse as user-space calls and fail at evaluation time. Arity is checked
//! eagerly when the call node is built, not during evaluation.

pub mod aggregate;
pub mod geometry;
pub mod math;

use crate::ast::Expression;
use crate::error::{ExprError, ExprResult};
use crate::evaluator::EvaluationContext;
use partlab_core::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Function opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    // scalar math
    Acos,
    Asin,
    Atan,
    Abs,
    Exp,
    Log,
    Log10,
    Sin,
    Sinh,
    Tan,
    Tanh,
    Sqrt,
    Cbrt,
    Cos,
    Cosh,
    Atan2,
    Mod,
    Pow,
    Round,
    Trunc,
    Ceil,
    Floor,
    Hypot,
    Cath,
    // geometry
    Matrix,
    Placement,
    Rotation,
    RotationX,
    RotationY,
    RotationZ,
    Vector,
    TranslationM,
    MInvert,
    MRotate,
    MRotateX,
    MRotateY,
    MRotateZ,
    MScale,
    MTranslate,
    Create,
    // collections and misc
    List,
    Tuple,
    Str,
    HiddenRef,
    Href,
    // aggregates
    Sum,
    Count,
    Average,
    StdDev,
    Min,
    Max,
    // a call whose name is not in the registry; the source name is kept on
    // the call node and resolution is deferred to evaluation
    User,
}

impl Function {
    /// True for functions that reduce a sequence of samples
    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            Function::Sum
                | Function::Count
                | Function::Average
                | Function::StdDev
                | Function::Min
                | Function::Max
        )
    }

    /// True for the hidden-reference wrappers
    pub fn is_hidden_ref(&self) -> bool {
        matches!(self, Function::HiddenRef | Function::Href)
    }

    /// Canonical source-text name
    pub fn name(&self) -> &'static str {
        registry()
            .iter()
            .find(|(_, f)| **f == *self)
            .map(|(name, _)| *name)
            .unwrap_or("?")
    }

    /// Validate the argument count for this function
    pub fn check_arity(&self, fname: &str, actual: usize) -> ExprResult<()> {
        let expected: &str = match self {
            Function::Abs
            | Function::Acos
            | Function::Asin
            | Function::Atan
            | Function::Cbrt
            | Function::Ceil
            | Function::Cos
            | Function::Cosh
            | Function::Exp
            | Function::Floor
            | Function::HiddenRef
            | Function::Href
            | Function::Log
            | Function::Log10
            | Function::MInvert
            | Function::RotationX
            | Function::RotationY
            | Function::RotationZ
            | Function::Round
            | Function::Sin
            | Function::Sinh
            | Function::Sqrt
            | Function::Str
            | Function::Tan
            | Function::Tanh
            | Function::Trunc => {
                if actual == 1 {
                    return Ok(());
                }
                "1"
            }
            Function::Placement => {
                if actual >= 1 && actual <= 3 {
                    return Ok(());
                }
                "1-3"
            }
            Function::TranslationM => {
                if actual == 1 || actual == 3 {
                    return Ok(());
                }
                "1 or 3"
            }
            Function::Atan2
            | Function::Mod
            | Function::MRotateX
            | Function::MRotateY
            | Function::MRotateZ
            | Function::Pow => {
                if actual == 2 {
                    return Ok(());
                }
                "2"
            }
            Function::Cath | Function::Hypot | Function::Rotation => {
                if actual == 2 || actual == 3 {
                    return Ok(());
                }
                "2 or 3"
            }
            Function::MTranslate | Function::MScale => {
                if actual == 2 || actual == 4 {
                    return Ok(());
                }
                "2 or 4"
            }
            Function::MRotate => {
                if (2..=4).contains(&actual) {
                    return Ok(());
                }
                "2-4"
            }
            Function::Vector => {
                if actual == 3 {
                    return Ok(());
                }
                "3"
            }
            Function::Matrix => {
                if actual <= 16 {
                    return Ok(());
                }
                "at most 16"
            }
            Function::Average
            | Function::Count
            | Function::Create
            | Function::Max
            | Function::Min
            | Function::StdDev
            | Function::Sum => {
                if actual >= 1 {
                    return Ok(());
                }
                "at least 1"
            }
            // user-space arity is unknown until the host resolves the call
            Function::List | Function::Tuple | Function::User => return Ok(()),
        };
        Err(ExprError::ArgumentCount {
            function: fname.to_string(),
            expected: expected.to_string(),
            actual,
        })
    }
}

/// Map a source-text name to its opcode
pub fn lookup(name: &str) -> Option<Function> {
    registry().get(name).copied()
}

fn registry() -> &'static HashMap<&'static str, Function, ahash::RandomState> {
    static REGISTRY: OnceLock<HashMap<&'static str, Function, ahash::RandomState>> =
        OnceLock::new();
    REGISTRY.get_or_init(|| {
        let entries: &[(&'static str, Function)] = &[
            ("acos", Function::Acos),
            ("asin", Function::Asin),
            ("atan", Function::Atan),
            ("abs", Function::Abs),
            ("exp", Function::Exp),
            ("log", Function::Log),
            ("log10", Function::Log10),
            ("sin", Function::Sin),
            ("sinh", Function::Sinh),
            ("tan", Function::Tan),
            ("tanh", Function::Tanh),
            ("sqrt", Function::Sqrt),
            ("cbrt", Function::Cbrt),
            ("cos", Function::Cos),
            ("cosh", Function::Cosh),
            ("atan2", Function::Atan2),
            ("mod", Function::Mod),
            ("pow", Function::Pow),
            ("round", Function::Round),
            ("trunc", Function::Trunc),
            ("ceil", Function::Ceil),
            ("floor", Function::Floor),
            ("hypot", Function::Hypot),
            ("cath", Function::Cath),
            ("matrix", Function::Matrix),
            ("placement", Function::Placement),
            ("rotation", Function::Rotation),
            ("rotationx", Function::RotationX),
            ("rotationy", Function::RotationY),
            ("rotationz", Function::RotationZ),
            ("vector", Function::Vector),
            ("translationm", Function::TranslationM),
            ("minvert", Function::MInvert),
            ("mrotate", Function::MRotate),
            ("mrotatex", Function::MRotateX),
            ("mrotatey", Function::MRotateY),
            ("mrotatez", Function::MRotateZ),
            ("mscale", Function::MScale),
            ("mtranslate", Function::MTranslate),
            ("create", Function::Create),
            ("list", Function::List),
            ("tuple", Function::Tuple),
            ("str", Function::Str),
            ("hiddenref", Function::HiddenRef),
            ("href", Function::Href),
            ("sum", Function::Sum),
            ("count", Function::Count),
            ("average", Function::Average),
            ("stddev", Function::StdDev),
            ("min", Function::Min),
            ("max", Function::Max),
        ];
        entries.iter().copied().collect()
    })
}

/// Evaluate a function call over its unevaluated arguments.
///
/// Arguments stay unevaluated at this boundary because aggregates and
/// `list`/`tuple` expand range arguments to addressed property values
/// instead of evaluating them as expressions.
pub fn evaluate(
    ctx: &EvaluationContext<'_>,
    f: Function,
    fname: &str,
    args: &[Expression],
) -> ExprResult<Value> {
    if f.is_aggregate() {
        return aggregate::evaluate(ctx, f, args);
    }
    match f {
        Function::List | Function::Tuple => geometry::eval_collection(ctx, f, args),
        Function::Matrix
        | Function::Placement
        | Function::Rotation
        | Function::RotationX
        | Function::RotationY
        | Function::RotationZ
        | Function::Vector
        | Function::TranslationM
        | Function::MInvert
        | Function::MRotate
        | Function::MRotateX
        | Function::MRotateY
        | Function::MRotateZ
        | Function::MScale
        | Function::MTranslate
        | Function::Create => geometry::evaluate(ctx, f, args),
        Function::Str => {
            let value = ctx.eval(&args[0])?;
            Ok(Value::String(value.to_string()))
        }
        Function::HiddenRef | Function::Href => ctx.eval(&args[0]),
        Function::User => Err(ExprError::UnknownFunction(fname.to_string())),
        _ => math::evaluate(ctx, f, fname, args),
    }
}
