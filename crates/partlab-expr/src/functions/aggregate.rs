//! Aggregate functions over scalar arguments and cell ranges
//!
//! Each aggregate folds its samples through a collector. Range arguments
//! expand to the owner's addressed properties; addresses without a property
//! contribute nothing.

use crate::address::CellRange;
use crate::ast::{ExprKind, Expression};
use crate::error::{ExprError, ExprResult};
use crate::evaluator::EvaluationContext;
use crate::functions::Function;
use partlab_core::{Quantity, Value};
use std::cmp::Ordering;

trait Collector {
    fn collect(&mut self, sample: Quantity) -> ExprResult<()>;
    fn result(&self) -> ExprResult<Quantity>;
}

#[derive(Default)]
struct SumCollector {
    total: Option<Quantity>,
}

impl Collector for SumCollector {
    fn collect(&mut self, sample: Quantity) -> ExprResult<()> {
        self.total = Some(match &self.total {
            Some(total) => total
                .add(&sample)
                .map_err(|e| ExprError::Unit(e.to_string()))?,
            None => sample,
        });
        Ok(())
    }

    fn result(&self) -> ExprResult<Quantity> {
        Ok(self.total.unwrap_or_else(|| Quantity::dimensionless(0.0)))
    }
}

#[derive(Default)]
struct CountCollector {
    n: usize,
}

impl Collector for CountCollector {
    fn collect(&mut self, _sample: Quantity) -> ExprResult<()> {
        self.n += 1;
        Ok(())
    }

    fn result(&self) -> ExprResult<Quantity> {
        Ok(Quantity::dimensionless(self.n as f64))
    }
}

#[derive(Default)]
struct AverageCollector {
    sum: SumCollector,
    n: usize,
}

impl Collector for AverageCollector {
    fn collect(&mut self, sample: Quantity) -> ExprResult<()> {
        self.sum.collect(sample)?;
        self.n += 1;
        Ok(())
    }

    fn result(&self) -> ExprResult<Quantity> {
        if self.n == 0 {
            return Err(ExprError::Evaluation("average of no samples".into()));
        }
        Ok(self.sum.result()?.scaled(1.0 / self.n as f64))
    }
}

// Welford's online algorithm; sample standard deviation.
#[derive(Default)]
struct StdDevCollector {
    n: usize,
    mean: f64,
    m2: f64,
    unit: Option<partlab_core::Unit>,
}

impl Collector for StdDevCollector {
    fn collect(&mut self, sample: Quantity) -> ExprResult<()> {
        match self.unit {
            Some(unit) if unit != sample.unit() => {
                return Err(ExprError::Unit("Units must be equal".into()))
            }
            Some(_) => {}
            None => self.unit = Some(sample.unit()),
        }
        self.n += 1;
        let delta = sample.value() - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (sample.value() - self.mean);
        Ok(())
    }

    fn result(&self) -> ExprResult<Quantity> {
        if self.n < 2 {
            return Err(ExprError::Evaluation(
                "stddev requires at least two samples".into(),
            ));
        }
        let variance = self.m2 / (self.n - 1) as f64;
        let unit = self.unit.unwrap_or(partlab_core::Unit::NONE);
        Ok(Quantity::with_unit(variance.sqrt(), unit))
    }
}

struct ExtremumCollector {
    keep: Ordering,
    best: Option<Quantity>,
}

impl ExtremumCollector {
    fn new(keep: Ordering) -> Self {
        Self { keep, best: None }
    }
}

impl Collector for ExtremumCollector {
    fn collect(&mut self, sample: Quantity) -> ExprResult<()> {
        match &self.best {
            Some(best) => {
                let ordering = sample
                    .compare(best)
                    .map_err(|e| ExprError::Unit(e.to_string()))?;
                if ordering == self.keep {
                    self.best = Some(sample);
                }
            }
            None => self.best = Some(sample),
        }
        Ok(())
    }

    fn result(&self) -> ExprResult<Quantity> {
        self.best
            .ok_or_else(|| ExprError::Evaluation("extremum of no samples".into()))
    }
}

fn collect_range(
    ctx: &EvaluationContext<'_>,
    owner: partlab_core::ObjId,
    range: CellRange,
    collector: &mut dyn Collector,
) -> ExprResult<()> {
    for addr in range.cells() {
        let Some(value) = ctx.graph().property_value(owner, &addr.to_a1_string()) else {
            continue;
        };
        match value.as_quantity() {
            Ok(q) => collector.collect(q)?,
            Err(_) => {
                return Err(ExprError::Type(format!(
                    "invalid property type in cell {}",
                    addr.to_a1_string()
                )))
            }
        }
    }
    Ok(())
}

pub fn evaluate(
    ctx: &EvaluationContext<'_>,
    f: Function,
    args: &[Expression],
) -> ExprResult<Value> {
    let mut collector: Box<dyn Collector> = match f {
        Function::Sum => Box::new(SumCollector::default()),
        Function::Count => Box::new(CountCollector::default()),
        Function::Average => Box::new(AverageCollector::default()),
        Function::StdDev => Box::new(StdDevCollector::default()),
        Function::Min => Box::new(ExtremumCollector::new(Ordering::Less)),
        Function::Max => Box::new(ExtremumCollector::new(Ordering::Greater)),
        _ => return Err(ExprError::Evaluation("not an aggregate".into())),
    };

    for arg in args {
        if let ExprKind::Range { owner, begin, end } = &arg.kind {
            collect_range(ctx, *owner, CellRange::new(*begin, *end), collector.as_mut())?;
        } else {
            // non-numeric scalar arguments are skipped, matching range cells
            // that hold text
            let value = ctx.eval(arg)?;
            if let Ok(q) = value.as_quantity() {
                collector.collect(q)?;
            }
        }
    }
    Ok(Value::Quantity(collector.result()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::evaluate as eval_expr;
    use partlab_core::{DocumentGraph, ObjId};
    use pretty_assertions::assert_eq;

    fn num(v: f64) -> Expression {
        Expression::number(Quantity::dimensionless(v))
    }

    fn call(fname: &str, args: Vec<Expression>) -> Expression {
        let f = crate::functions::lookup(fname).unwrap();
        Expression::function(f, fname, args).unwrap()
    }

    fn sheet() -> (DocumentGraph, ObjId) {
        let mut graph = DocumentGraph::new();
        let doc = graph.new_document("Sheet").unwrap();
        let d = graph.document_mut(doc).unwrap();
        let obj = d.add_object("Cells").unwrap();
        let o = d.object_mut(obj).unwrap();
        o.set_property("A1", Value::from(1.0));
        o.set_property("A2", Value::from(2.0));
        o.set_property("A3", Value::from(3.0));
        (graph, obj)
    }

    #[test]
    fn test_sum_and_average() {
        let graph = DocumentGraph::new();
        let expr = call("sum", vec![num(1.0), num(2.0), num(3.0)]);
        assert_eq!(eval_expr(&graph, &expr).unwrap(), Value::from(6.0));

        let expr = call("average", vec![num(1.0), num(2.0), num(3.0)]);
        assert_eq!(eval_expr(&graph, &expr).unwrap(), Value::from(2.0));
    }

    #[test]
    fn test_sum_over_range_skips_missing() {
        let (graph, obj) = sheet();
        let range = CellRange::parse("A1:A5").unwrap();
        let expr = call("sum", vec![Expression::range(obj, range)]);
        assert_eq!(eval_expr(&graph, &expr).unwrap(), Value::from(6.0));
    }

    #[test]
    fn test_min_max_with_units() {
        let graph = DocumentGraph::new();
        let mm = |v| Expression::number(Quantity::new(v, "mm").unwrap());
        let cm = |v| Expression::number(Quantity::new(v, "cm").unwrap());
        let expr = call("min", vec![mm(5.0), cm(1.0)]);
        assert_eq!(
            eval_expr(&graph, &expr).unwrap(),
            Value::from(Quantity::new(5.0, "mm").unwrap())
        );
        let expr = call("max", vec![mm(5.0), cm(1.0)]);
        assert_eq!(
            eval_expr(&graph, &expr).unwrap(),
            Value::from(Quantity::new(1.0, "cm").unwrap())
        );
    }

    #[test]
    fn test_stddev() {
        let graph = DocumentGraph::new();
        let expr = call("stddev", vec![num(1.0), num(2.0), num(3.0), num(4.0)]);
        let result = eval_expr(&graph, &expr).unwrap();
        let q = result.as_quantity().unwrap();
        assert!((q.value() - 1.2909944487358056).abs() < 1e-12);
    }

    #[test]
    fn test_stddev_underflow() {
        let graph = DocumentGraph::new();
        let expr = call("stddev", vec![num(1.0)]);
        let err = eval_expr(&graph, &expr).unwrap_err();
        assert!(err.to_string().contains("at least two samples"));
    }

    #[test]
    fn test_text_cell_in_range_errors() {
        let (mut graph, obj) = sheet();
        graph
            .object_mut(obj)
            .unwrap()
            .set_property("A4", Value::from("label"));
        let range = CellRange::parse("A1:A4").unwrap();
        let expr = call("count", vec![Expression::range(obj, range)]);
        // text cells in a range are a type error for aggregates
        assert!(eval_expr(&graph, &expr).is_err());
    }
}
