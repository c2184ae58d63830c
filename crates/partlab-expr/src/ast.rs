//! Expression AST
//!
//! A parsed expression is a tree of [`Expression`] nodes. Every node carries
//! an optional trailing list of path [`Component`]s applied to its evaluated
//! value and an optional free-text comment. Trees uniquely own their
//! children; cloning deep-copies the whole subtree.

use crate::address::{CellAddress, CellRange};
use crate::error::ExprResult;
use crate::evaluator::EvaluationContext;
use crate::functions::Function;
use crate::path::{Component, ObjectIdentifier};
use partlab_core::{DocumentGraph, ObjId, Quantity, Value};
use std::fmt;
use std::sync::OnceLock;

/// Quote a string literal in `<<...>>` form
pub fn quote(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 4);
    out.push_str("<<");
    for c in input.chars() {
        match c {
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '>' => out.push_str("\\>"),
            _ => out.push(c),
        }
    }
    out.push_str(">>");
    out
}

/// Undo the escapes inside a quoted literal body
pub fn unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut escaped = false;
    for c in input.chars() {
        if escaped {
            match c {
                't' => out.push('\t'),
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                '\\' => out.push('\\'),
                '\'' => out.push('\''),
                '"' => out.push('"'),
                '>' => out.push('>'),
                other => out.push(other),
            }
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else {
            out.push(c);
        }
    }
    out
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    /// Implicit unit juxtaposition (`2 mm`)
    Unit,
}

impl Op {
    /// Priority used for minimal parenthesization when rendering
    pub fn priority(&self) -> i32 {
        match self {
            Op::Eq | Op::Neq | Op::Lt | Op::Gt | Op::Lte | Op::Gte => 1,
            Op::Add | Op::Sub => 3,
            Op::Mul | Op::Div | Op::Mod => 4,
            Op::Pow => 5,
            Op::Unit => 6,
        }
    }

    pub fn is_commutative(&self) -> bool {
        matches!(self, Op::Eq | Op::Neq | Op::Add | Op::Mul)
    }

    pub fn is_left_associative(&self) -> bool {
        true
    }

    pub fn is_right_associative(&self) -> bool {
        matches!(self, Op::Add | Op::Mul)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Mod => "%",
            Op::Pow => "^",
            Op::Eq => "==",
            Op::Neq => "!=",
            Op::Lt => "<",
            Op::Gt => ">",
            Op::Lte => "<=",
            Op::Gte => ">=",
            Op::Unit => " ",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Pos,
}

/// The expression node variants
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Unit-tagged scalar constant
    Number(Quantity),
    /// Pure unit literal keeping its typed text (`mm/s`)
    Unit { quantity: Quantity, unit_str: String },
    /// Named constant backed by a number (pi, e, True, False, None)
    Constant { name: String, quantity: Quantity },
    String(String),
    /// Path reference resolved at evaluation time
    Variable(ObjectIdentifier),
    Binary {
        op: Op,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    /// Function call keeping the typed name for user-space functions
    Function {
        f: Function,
        fname: String,
        args: Vec<Expression>,
    },
    Conditional {
        condition: Box<Expression>,
        true_expr: Box<Expression>,
        false_expr: Box<Expression>,
    },
    /// Cell range (`A1:B3`), expanded against the owner's properties
    Range {
        owner: ObjId,
        begin: CellAddress,
        end: CellAddress,
    },
    /// Verbatim boxed value passthrough
    Opaque(Value),
}

/// A parsed expression node
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExprKind,
    /// Trailing path accessors applied to the evaluated value
    pub components: Vec<Component>,
    pub comment: Option<String>,
}

/// Rendering flavor: the literal text as typed, or the canonical
/// rename-resistant form
#[derive(Clone, Copy)]
pub enum RenderMode<'a> {
    Display,
    Persistent(&'a DocumentGraph),
}

impl Expression {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            kind,
            components: Vec::new(),
            comment: None,
        }
    }

    pub fn number(quantity: Quantity) -> Self {
        Self::new(ExprKind::Number(quantity))
    }

    pub fn unit(quantity: Quantity, unit_str: &str) -> Self {
        Self::new(ExprKind::Unit {
            quantity,
            unit_str: unit_str.to_string(),
        })
    }

    pub fn string(text: &str) -> Self {
        Self::new(ExprKind::String(text.to_string()))
    }

    pub fn variable(path: ObjectIdentifier) -> Self {
        Self::new(ExprKind::Variable(path))
    }

    pub fn binary(op: Op, left: Expression, right: Expression) -> Self {
        Self::new(ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn unary(op: UnaryOp, operand: Expression) -> Self {
        Self::new(ExprKind::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    /// Build a function call, checking arity eagerly
    pub fn function(f: Function, fname: &str, args: Vec<Expression>) -> ExprResult<Self> {
        f.check_arity(fname, args.len())?;
        Ok(Self::new(ExprKind::Function {
            f,
            fname: fname.to_string(),
            args,
        }))
    }

    pub fn conditional(condition: Expression, true_expr: Expression, false_expr: Expression) -> Self {
        Self::new(ExprKind::Conditional {
            condition: Box::new(condition),
            true_expr: Box::new(true_expr),
            false_expr: Box::new(false_expr),
        })
    }

    pub fn range(owner: ObjId, range: CellRange) -> Self {
        Self::new(ExprKind::Range {
            owner,
            begin: range.start,
            end: range.end,
        })
    }

    /// Look up a named constant
    pub fn constant(name: &str) -> Option<Self> {
        let quantity = match name {
            "pi" => Quantity::dimensionless(std::f64::consts::PI),
            "e" => Quantity::dimensionless(std::f64::consts::E),
            "True" => Quantity::dimensionless(1.0),
            "False" => Quantity::dimensionless(0.0),
            "None" => Quantity::dimensionless(0.0),
            _ => return None,
        };
        Some(Self::new(ExprKind::Constant {
            name: name.to_string(),
            quantity,
        }))
    }

    /// Literal node for an evaluated value
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Quantity(q) => Self::number(q),
            Value::Boolean(true) => Self::new(ExprKind::Constant {
                name: "True".to_string(),
                quantity: Quantity::dimensionless(1.0),
            }),
            Value::Boolean(false) => Self::new(ExprKind::Constant {
                name: "False".to_string(),
                quantity: Quantity::dimensionless(0.0),
            }),
            Value::String(s) => Self::string(&s),
            other => Self::new(ExprKind::Opaque(other)),
        }
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    pub fn add_component(&mut self, component: Component) {
        self.components.push(component);
    }

    /// Priority of this node for parenthesization; leaves are 20
    pub fn priority(&self) -> i32 {
        match &self.kind {
            ExprKind::Binary { op, .. } => op.priority(),
            ExprKind::Unary { .. } => 6,
            ExprKind::Conditional { .. } => 2,
            _ => 20,
        }
    }

    // Nodes whose rendering can take a `[...]`/`.name` suffix without
    // wrapping parens
    fn is_indexable(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Variable(_) | ExprKind::Function { .. } | ExprKind::Opaque(_)
        )
    }

    /// The literal text as typed
    pub fn to_display_string(&self) -> String {
        let mut out = String::new();
        self.render(&mut out, RenderMode::Display, false);
        out
    }

    /// Canonical form with paths pinned to internal names, designed to
    /// survive renames and relabels
    pub fn to_persistent_string(&self, graph: &DocumentGraph) -> String {
        let mut out = String::new();
        self.render(&mut out, RenderMode::Persistent(graph), false);
        out
    }

    fn render(&self, out: &mut String, mode: RenderMode<'_>, check_priority: bool) {
        if self.components.is_empty() {
            let needs_parens = check_priority && self.priority() < 20;
            if needs_parens {
                out.push('(');
            }
            self.render_kind(out, mode);
            if needs_parens {
                out.push(')');
            }
            return;
        }
        if !self.is_indexable() {
            out.push('(');
            self.render_kind(out, mode);
            out.push(')');
        } else {
            self.render_kind(out, mode);
        }
        for comp in &self.components {
            if let Component::Simple(name) = comp {
                out.push('.');
                out.push_str(name);
            } else {
                out.push_str(&comp.to_string());
            }
        }
    }

    fn render_kind(&self, out: &mut String, mode: RenderMode<'_>) {
        match &self.kind {
            ExprKind::Number(q) => {
                out.push_str(&format_number(q.value()));
                if !q.unit().is_dimensionless() {
                    out.push(' ');
                    out.push_str(&q.unit().to_string());
                }
            }
            ExprKind::Unit { unit_str, .. } => out.push_str(unit_str),
            ExprKind::Constant { name, .. } => out.push_str(name),
            ExprKind::String(text) => out.push_str(&quote(text)),
            ExprKind::Variable(path) => match mode {
                RenderMode::Display => out.push_str(&path.to_string()),
                RenderMode::Persistent(graph) => out.push_str(&path.to_persistent_string(graph)),
            },
            ExprKind::Binary { op, left, right } => self.render_binary(out, mode, *op, left, right),
            ExprKind::Unary { op, operand } => {
                out.push(match op {
                    UnaryOp::Neg => '-',
                    UnaryOp::Pos => '+',
                });
                let needs_parens = operand.priority() < 6;
                if needs_parens {
                    out.push('(');
                }
                operand.render(out, mode, false);
                if needs_parens {
                    out.push(')');
                }
            }
            ExprKind::Function { fname, args, .. } => {
                out.push_str(fname);
                out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str("; ");
                    }
                    arg.render(out, mode, false);
                }
                out.push(')');
            }
            ExprKind::Conditional {
                condition,
                true_expr,
                false_expr,
            } => {
                condition.render(out, mode, false);
                out.push_str(" ? ");
                for (expr, sep) in [(true_expr, " : "), (false_expr, "")] {
                    if expr.priority() <= self.priority() {
                        out.push('(');
                        expr.render(out, mode, false);
                        out.push(')');
                    } else {
                        expr.render(out, mode, false);
                    }
                    out.push_str(sep);
                }
            }
            ExprKind::Range { begin, end, .. } => {
                out.push_str(&begin.to_a1_string());
                out.push(':');
                out.push_str(&end.to_a1_string());
            }
            ExprKind::Opaque(value) => out.push_str(&value.to_string()),
        }
    }

    fn render_binary(
        &self,
        out: &mut String,
        mode: RenderMode<'_>,
        op: Op,
        left: &Expression,
        right: &Expression,
    ) {
        let left_op = match &left.kind {
            ExprKind::Binary { op, .. } => Some(*op),
            _ => None,
        };
        let mut needs_parens = left.priority() < op.priority();
        if !needs_parens && left_op == Some(op) && !op.is_left_associative() {
            needs_parens = true;
        }
        if needs_parens {
            out.push('(');
            left.render(out, mode, false);
            out.push(')');
        } else {
            left.render(out, mode, false);
        }

        if op == Op::Unit {
            out.push(' ');
        } else {
            out.push(' ');
            out.push_str(op.as_str());
            out.push(' ');
        }

        let right_op = match &right.kind {
            ExprKind::Binary { op, .. } => Some(*op),
            _ => None,
        };
        let mut needs_parens = right.priority() < op.priority();
        if !needs_parens {
            if right_op == Some(op) {
                if !op.is_right_associative() || !op.is_commutative() {
                    needs_parens = true;
                }
            } else if right.priority() == op.priority()
                && (!op.is_right_associative() || right_op == Some(Op::Mod))
            {
                needs_parens = true;
            }
        }
        if needs_parens {
            out.push('(');
            right.render(out, mode, false);
            out.push(')');
        } else {
            right.render(out, mode, false);
        }
    }

    // Constant folding treats any literal that evaluates to a number as
    // foldable; None stays symbolic.
    fn is_number_literal(&self) -> bool {
        match &self.kind {
            ExprKind::Number(_) | ExprKind::Unit { .. } => self.components.is_empty(),
            ExprKind::Constant { name, .. } => name != "None" && self.components.is_empty(),
            _ => false,
        }
    }

    fn fold(&self) -> Option<Expression> {
        let ctx = literal_context();
        ctx.eval(self).ok().map(Expression::from_value)
    }

    /// Constant-fold the tree, returning a brand-new tree. Variables and
    /// ranges are left as references so their value is re-read at
    /// evaluation time.
    pub fn simplify(&self) -> Expression {
        match &self.kind {
            ExprKind::Unit { quantity, .. } if self.components.is_empty() => {
                Expression::number(*quantity)
            }
            ExprKind::Binary { op, left, right } => {
                let left = left.simplify();
                let right = right.simplify();
                if left.is_number_literal() && right.is_number_literal() {
                    let folded = Expression::binary(*op, left.clone(), right.clone());
                    if let Some(result) = folded.fold() {
                        return result;
                    }
                }
                Expression::binary(*op, left, right)
            }
            ExprKind::Unary { op, operand } => {
                let operand = operand.simplify();
                if operand.is_number_literal() {
                    let folded = Expression::unary(*op, operand.clone());
                    if let Some(result) = folded.fold() {
                        return result;
                    }
                }
                Expression::unary(*op, operand)
            }
            ExprKind::Function { f, fname, args } => {
                let args: Vec<Expression> = args.iter().map(Expression::simplify).collect();
                if !args.is_empty() && args.iter().all(Expression::is_number_literal) {
                    let folded = Expression::new(ExprKind::Function {
                        f: *f,
                        fname: fname.clone(),
                        args: args.clone(),
                    });
                    if let Some(result) = folded.fold() {
                        return result;
                    }
                }
                Expression::new(ExprKind::Function {
                    f: *f,
                    fname: fname.clone(),
                    args,
                })
            }
            ExprKind::Conditional {
                condition,
                true_expr,
                false_expr,
            } => {
                let condition = condition.simplify();
                if let ExprKind::Number(q) = &condition.kind {
                    if q.value().abs() > 0.5 {
                        return true_expr.simplify();
                    }
                    return false_expr.simplify();
                }
                Expression::conditional(condition, true_expr.simplify(), false_expr.simplify())
            }
            _ => self.clone(),
        }
    }

    /// Evaluate and wrap the result back into a literal node
    pub fn eval_to_literal(&self, ctx: &EvaluationContext<'_>) -> ExprResult<Expression> {
        Ok(Expression::from_value(ctx.eval(self)?))
    }

    /// True if any referenced property carries a touched flag
    pub fn is_touched(&self, graph: &DocumentGraph) -> bool {
        match &self.kind {
            ExprKind::Variable(path) => path.is_touched(graph),
            ExprKind::Binary { left, right, .. } => {
                left.is_touched(graph) || right.is_touched(graph)
            }
            ExprKind::Unary { operand, .. } => operand.is_touched(graph),
            ExprKind::Function { args, .. } => args.iter().any(|a| a.is_touched(graph)),
            ExprKind::Conditional {
                condition,
                true_expr,
                false_expr,
            } => {
                condition.is_touched(graph)
                    || true_expr.is_touched(graph)
                    || false_expr.is_touched(graph)
            }
            ExprKind::Range { owner, begin, end } => {
                CellRange::new(*begin, *end).cells().any(|addr| {
                    graph
                        .object(*owner)
                        .and_then(|o| o.property(&addr.to_a1_string()))
                        .is_some_and(|p| p.is_touched())
                })
            }
            _ => false,
        }
    }

    /// Structural equality through the rendered form, optionally comparing
    /// comments
    pub fn is_same(&self, other: &Expression, check_comment: bool) -> bool {
        if check_comment && self.comment != other.comment {
            return false;
        }
        std::mem::discriminant(&self.kind) == std::mem::discriminant(&other.kind)
            && self.to_display_string() == other.to_display_string()
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

// Folding evaluates against an empty graph; literal subtrees never touch it.
fn literal_context() -> EvaluationContext<'static> {
    static EMPTY: OnceLock<DocumentGraph> = OnceLock::new();
    EvaluationContext::new(EMPTY.get_or_init(DocumentGraph::new))
}

fn format_number(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e15 {
        format!("{}", value)
    } else {
        let mut s = format!("{}", value);
        if !s.contains('.') && !s.contains('e') && !s.contains("inf") && !s.contains("NaN") {
            s.push_str(".0");
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn num(v: f64) -> Expression {
        Expression::number(Quantity::dimensionless(v))
    }

    #[test]
    fn test_quote_round_trip() {
        let text = "a\tb\\c>d";
        let quoted = quote(text);
        assert_eq!(quoted, "<<a\\tb\\\\c\\>d>>");
        assert_eq!(unescape(&quoted[2..quoted.len() - 2]), text);
    }

    #[test]
    fn test_render_priorities() {
        // 1 - (2 - 3) keeps explicit parens, 1 - 2 - 3 gains none
        let explicit = Expression::binary(
            Op::Sub,
            num(1.0),
            Expression::binary(Op::Sub, num(2.0), num(3.0)),
        );
        assert_eq!(explicit.to_display_string(), "1 - (2 - 3)");

        let chain = Expression::binary(
            Op::Sub,
            Expression::binary(Op::Sub, num(1.0), num(2.0)),
            num(3.0),
        );
        assert_eq!(chain.to_display_string(), "1 - 2 - 3");
    }

    #[test]
    fn test_render_mod_on_the_right() {
        let expr = Expression::binary(
            Op::Mul,
            num(2.0),
            Expression::binary(Op::Mod, num(5.0), num(3.0)),
        );
        assert_eq!(expr.to_display_string(), "2 * (5 % 3)");
    }

    #[test]
    fn test_render_mixed_priority() {
        let expr = Expression::binary(
            Op::Mul,
            Expression::binary(Op::Add, num(1.0), num(2.0)),
            num(3.0),
        );
        assert_eq!(expr.to_display_string(), "(1 + 2) * 3");
    }

    #[test]
    fn test_render_unary() {
        let expr = Expression::unary(
            UnaryOp::Neg,
            Expression::binary(Op::Add, num(1.0), num(2.0)),
        );
        assert_eq!(expr.to_display_string(), "-(1 + 2)");
        assert_eq!(Expression::unary(UnaryOp::Neg, num(3.0)).to_display_string(), "-3");
    }

    #[test]
    fn test_render_number_with_unit() {
        let expr = Expression::number(Quantity::new(5.0, "mm").unwrap());
        assert_eq!(expr.to_display_string(), "5 mm");
    }

    #[test]
    fn test_render_conditional() {
        let expr = Expression::conditional(
            Expression::binary(Op::Lt, num(1.0), num(2.0)),
            num(10.0),
            num(20.0),
        );
        assert_eq!(expr.to_display_string(), "1 < 2 ? 10 : 20");
    }

    #[test]
    fn test_simplify_folds_constants() {
        let expr = Expression::binary(
            Op::Add,
            num(1.0),
            Expression::binary(Op::Mul, num(2.0), num(3.0)),
        );
        let simplified = expr.simplify();
        assert_eq!(simplified.to_display_string(), "7");
    }

    #[test]
    fn test_simplify_idempotent() {
        let expr = Expression::binary(
            Op::Add,
            num(1.0),
            Expression::binary(Op::Mul, num(2.0), num(3.0)),
        );
        let once = expr.simplify();
        let twice = once.simplify();
        assert!(once.is_same(&twice, true));
    }

    #[test]
    fn test_simplify_conditional_folds_on_condition() {
        let expr = Expression::conditional(num(1.0), num(10.0), num(20.0));
        assert_eq!(expr.simplify().to_display_string(), "10");
        let expr = Expression::conditional(num(0.0), num(10.0), num(20.0));
        assert_eq!(expr.simplify().to_display_string(), "20");
    }

    #[test]
    fn test_simplify_function() {
        let expr = Expression::function(
            crate::functions::Function::Sqrt,
            "sqrt",
            vec![num(4.0)],
        )
        .unwrap();
        assert_eq!(expr.simplify().to_display_string(), "2");
    }

    #[test]
    fn test_function_arity_checked_eagerly() {
        assert!(Expression::function(
            crate::functions::Function::Sqrt,
            "sqrt",
            vec![num(4.0), num(2.0)]
        )
        .is_err());
    }

    #[test]
    fn test_components_render_with_parens() {
        let mut expr = num(1.0);
        expr.add_component(Component::Array(0));
        assert_eq!(expr.to_display_string(), "(1)[0]");
    }
}
