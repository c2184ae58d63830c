//! End-to-end tests: parse, evaluate, render and rewrite expressions
//! against a live document graph.

use partlab_core::{DocId, DocumentGraph, ObjId, Quantity, Unit, Value};
use partlab_expr::visitor::{self, DepScope};
use partlab_expr::{evaluate, parse, CellAddress, ExprError};
use pretty_assertions::assert_eq;

fn model() -> (DocumentGraph, ObjId) {
    let mut graph = DocumentGraph::new();
    let doc = graph.new_document("Model").unwrap();
    let d = graph.document_mut(doc).unwrap();
    let owner = d.add_object("Sketch").unwrap();
    let krate = d.add_object_labeled("Box001", "Crate").unwrap();
    d.object_mut(owner)
        .unwrap()
        .set_property("Width", Value::from(Quantity::new(4.0, "mm").unwrap()));
    d.object_mut(krate)
        .unwrap()
        .set_property("Length", Value::from(Quantity::new(10.0, "mm").unwrap()));
    (graph, owner)
}

#[test]
fn evaluates_unit_arithmetic_end_to_end() {
    let (graph, owner) = model();
    let expr = parse(owner, "2 * (<<Crate>>.Length + 5 mm)").unwrap();
    assert_eq!(
        evaluate(&graph, &expr).unwrap(),
        Value::from(Quantity::new(30.0, "mm").unwrap())
    );
}

#[test]
fn persistent_form_survives_relabel() {
    let (mut graph, owner) = model();
    let expr = parse(owner, "<<Crate>>.Length * 2").unwrap();

    // the canonical form pins the internal name
    let persistent = expr.to_persistent_string(&graph);
    assert_eq!(persistent, "Box001.Length * 2");

    // relabel the object; the persistent form still parses and evaluates
    let krate = graph.document(DocId(0)).unwrap().get_object("Box001").unwrap();
    graph.object_mut(krate).unwrap().set_label("Pallet");
    let reparsed = parse(owner, &persistent).unwrap();
    assert_eq!(
        evaluate(&graph, &reparsed).unwrap(),
        Value::from(Quantity::new(20.0, "mm").unwrap())
    );
}

#[test]
fn display_form_round_trips() {
    let (_, owner) = model();
    for text in [
        "1 - (2 - 3)",
        "(1 + 2) * 3",
        "2 * (5 % 3)",
        "-(1 + 2)",
        "1 < 2 ? 10 : 20",
        "Box001.Length + 5 mm",
        "Model#Box001.Length",
        "<<Crate>>.Length",
        "sum(A1:B2; 5)",
        "sqrt(4 mm^2) == 2 mm ? 1 : 0",
    ] {
        let expr = parse(owner, text).unwrap();
        assert_eq!(expr.to_display_string(), text);
        // rendering is stable under reparse
        let reparsed = parse(owner, &expr.to_display_string()).unwrap();
        assert_eq!(reparsed.to_display_string(), text);
    }
}

#[test]
fn simplify_is_idempotent_and_keeps_references() {
    let (graph, owner) = model();
    let expr = parse(owner, "Width + 2 mm * 3 + sqrt(4 mm^2)").unwrap();
    let once = expr.simplify();
    let twice = once.simplify();
    assert!(once.is_same(&twice, true));

    // the reference survives folding and still reads the live value
    assert_eq!(
        evaluate(&graph, &once).unwrap(),
        Value::from(Quantity::new(12.0, "mm").unwrap())
    );
}

#[test]
fn unit_rules_are_enforced() {
    let (graph, owner) = model();
    let ok = parse(owner, "sqrt(4 mm^2)").unwrap();
    assert_eq!(
        evaluate(&graph, &ok).unwrap(),
        Value::from(Quantity::new(2.0, "mm").unwrap())
    );

    let bad = parse(owner, "sqrt(4 mm)").unwrap();
    let err = evaluate(&graph, &bad).unwrap_err();
    assert!(err.to_string().contains("in expression: sqrt(4 mm)"));

    let angle = parse(owner, "sin(90 deg)").unwrap();
    let q = evaluate(&graph, &angle).unwrap().as_quantity().unwrap();
    assert!((q.value() - 1.0).abs() < 1e-12);

    let inverse = parse(owner, "asin(1)").unwrap();
    let q = evaluate(&graph, &inverse).unwrap().as_quantity().unwrap();
    assert_eq!(q.unit(), Unit::ANGLE);
    assert!((q.value() - 90.0).abs() < 1e-12);
}

#[test]
fn aggregates_over_cell_ranges() {
    let mut graph = DocumentGraph::new();
    let doc = graph.new_document("Sheet").unwrap();
    let owner = graph
        .document_mut(doc)
        .unwrap()
        .add_object("Cells")
        .unwrap();
    let o = graph.object_mut(owner).unwrap();
    for (cell, v) in [("A1", 1.0), ("A2", 2.0), ("A3", 3.0), ("A4", 4.0)] {
        o.set_property(cell, Value::from(v));
    }

    let sum = parse(owner, "sum(A1:A10)").unwrap();
    assert_eq!(evaluate(&graph, &sum).unwrap(), Value::from(10.0));

    let stddev = parse(owner, "stddev(A1:A4)").unwrap();
    let q = evaluate(&graph, &stddev).unwrap().as_quantity().unwrap();
    assert!((q.value() - 1.2909944487358056).abs() < 1e-12);

    let underflow = parse(owner, "stddev(A1:A1)").unwrap();
    assert!(evaluate(&graph, &underflow).is_err());
}

#[test]
fn ambiguous_references_fail_resolution() {
    let mut graph = DocumentGraph::new();
    let doc = graph.new_document("Model").unwrap();
    let d = graph.document_mut(doc).unwrap();
    let owner = d.add_object("Sketch").unwrap();
    d.add_object_labeled("Box", "Spare").unwrap();
    let shadow = d.add_object_labeled("Box002", "Box").unwrap();
    graph
        .object_mut(shadow)
        .unwrap()
        .set_property("Length", Value::from(1.0));

    // "Box" matches one object by name and a different one by label
    let expr = parse(owner, "Box.Length").unwrap();
    let err = evaluate(&graph, &expr).unwrap_err();
    assert!(matches!(
        err,
        ExprError::InExpression { .. }
    ));
    assert!(err.to_string().contains("Ambiguous"));
}

#[test]
fn replace_object_rewrites_a_copy() {
    let (mut graph, owner) = model();
    let d = graph.document_mut(DocId(0)).unwrap();
    let old = d.get_object("Box001").unwrap();
    let new = d.add_object("Box002").unwrap();
    graph
        .object_mut(new)
        .unwrap()
        .set_property("Length", Value::from(Quantity::new(7.0, "mm").unwrap()));

    let expr = parse(owner, "Box001.Length + 1 mm").unwrap();
    let rewritten = visitor::replace_object(&graph, &expr, old, new, None).unwrap();
    assert_eq!(rewritten.to_display_string(), "Box002.Length + 1 mm");
    assert_eq!(expr.to_display_string(), "Box001.Length + 1 mm");

    // the dependency set of the rewritten tree no longer mentions the old
    // object
    let deps = visitor::get_dep_objects(&graph, &rewritten, None);
    assert!(deps.contains_key(&new));
    assert!(!deps.contains_key(&old));
}

#[test]
fn hidden_references_are_scoped() {
    let (graph, owner) = model();
    let expr = parse(owner, "Width + hiddenref(Box001.Length)").unwrap();

    let krate = graph.document(DocId(0)).unwrap().get_object("Box001").unwrap();
    let normal = visitor::get_deps(&graph, &expr, DepScope::Normal);
    assert!(normal.contains_key(&owner));
    assert!(!normal.contains_key(&krate));

    let hidden = visitor::get_deps(&graph, &expr, DepScope::Hidden);
    assert!(hidden.contains_key(&krate));
    assert!(!hidden.contains_key(&owner));

    // hiddenref is evaluation-transparent
    assert_eq!(
        evaluate(&graph, &expr).unwrap(),
        Value::from(Quantity::new(14.0, "mm").unwrap())
    );
}

#[test]
fn cell_rewrites_track_sheet_edits() {
    let mut graph = DocumentGraph::new();
    let doc = graph.new_document("Sheet").unwrap();
    let owner = graph
        .document_mut(doc)
        .unwrap()
        .add_object("Cells")
        .unwrap();
    let o = graph.object_mut(owner).unwrap();
    o.set_property("A1", Value::from(1.0));
    o.set_property("A3", Value::from(2.0));

    // inserting a row above A3 shifts the reference
    let mut expr = parse(owner, "A1 + A3").unwrap();
    let at = CellAddress::parse("A2").unwrap();
    assert!(visitor::move_cells(&mut expr, at, 1, 0, None));
    assert_eq!(expr.to_display_string(), "A1 + A4");

    // copying one cell down offsets relative references only
    let mut expr = parse(owner, "A1 + $A$1").unwrap();
    assert!(visitor::offset_cells(&mut expr, 1, 0, None));
    assert_eq!(expr.to_display_string(), "A2 + $A$1");
}

#[test]
fn geometry_pipeline() {
    let (graph, owner) = model();
    let expr = parse(
        owner,
        "mtranslate(rotationz(90 deg); 10; 0; 0).Base.x",
    )
    .unwrap();
    let q = evaluate(&graph, &expr).unwrap().as_quantity().unwrap();
    assert!((q.value() - 10.0).abs() < 1e-9);

    let expr = parse(owner, "minvert(matrix()) * vector(1; 2; 3)").unwrap();
    let Value::Vector(v) = evaluate(&graph, &expr).unwrap() else {
        panic!()
    };
    assert!((v.x - 1.0).abs() < 1e-9 && (v.y - 2.0).abs() < 1e-9);
}

#[test]
fn string_quoting_round_trip() {
    let (graph, owner) = model();
    let expr = parse(owner, "<<a\\>b>> + <<c>>").unwrap();
    assert_eq!(evaluate(&graph, &expr).unwrap(), Value::from("a>bc"));
    // rendering re-escapes
    assert_eq!(expr.to_display_string(), "<<a\\>b>> + <<c>>");
}
