//! Expression tree traversal and rewriting
//!
//! A visitor sees every node of an expression bottom-up: children first,
//! then the node itself. Rewrites that depend on the live graph run in two
//! passes, collecting replacements read-only on the original tree and
//! applying them to a fresh copy, so a half-applied rewrite can never be
//! observed.

use crate::address::CellAddress;
use crate::ast::{ExprKind, Expression};
use crate::error::ExprResult;
use crate::path::ObjectIdentifier;
use partlab_core::{DocumentGraph, ObjId};
use std::collections::HashMap;

/// Mutating tree visitor, called once per node after its children
pub trait ExpressionVisitor {
    fn visit(&mut self, expr: &mut Expression);

    /// Undo-snapshot hook. The rewrite passes call this on the host
    /// exactly once per node, just before that node's first mutation; the
    /// default does nothing.
    fn about_to_change(&mut self) {}
}

struct FnVisitor<F: FnMut(&mut Expression)>(F);

impl<F: FnMut(&mut Expression)> ExpressionVisitor for FnVisitor<F> {
    fn visit(&mut self, expr: &mut Expression) {
        (self.0)(expr)
    }
}

fn notify(host: &mut Option<&mut dyn ExpressionVisitor>) {
    if let Some(h) = host {
        h.about_to_change();
    }
}

impl Expression {
    /// Walk the tree bottom-up with a mutating visitor
    pub fn visit(&mut self, v: &mut dyn ExpressionVisitor) {
        match &mut self.kind {
            ExprKind::Binary { left, right, .. } => {
                left.visit(v);
                right.visit(v);
            }
            ExprKind::Unary { operand, .. } => operand.visit(v),
            ExprKind::Function { args, .. } => {
                for arg in args {
                    arg.visit(v);
                }
            }
            ExprKind::Conditional {
                condition,
                true_expr,
                false_expr,
            } => {
                condition.visit(v);
                true_expr.visit(v);
                false_expr.visit(v);
            }
            _ => {}
        }
        v.visit(self);
    }

    /// Walk the tree read-only, tracking whether each node sits inside a
    /// `hiddenref`/`href` argument
    pub fn walk(&self, f: &mut dyn FnMut(&Expression, bool)) {
        self.walk_hidden(f, false)
    }

    fn walk_hidden(&self, f: &mut dyn FnMut(&Expression, bool), hidden: bool) {
        f(self, hidden);
        match &self.kind {
            ExprKind::Binary { left, right, .. } => {
                left.walk_hidden(f, hidden);
                right.walk_hidden(f, hidden);
            }
            ExprKind::Unary { operand, .. } => operand.walk_hidden(f, hidden),
            ExprKind::Function { f: func, args, .. } => {
                let hidden = hidden || func.is_hidden_ref();
                for arg in args {
                    arg.walk_hidden(f, hidden);
                }
            }
            ExprKind::Conditional {
                condition,
                true_expr,
                false_expr,
            } => {
                condition.walk_hidden(f, hidden);
                true_expr.walk_hidden(f, hidden);
                false_expr.walk_hidden(f, hidden);
            }
            _ => {}
        }
    }
}

/// Which references to report when collecting dependencies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepScope {
    /// Only references outside `hiddenref` wrappers
    Normal,
    /// Only references inside `hiddenref` wrappers
    Hidden,
    All,
}

impl DepScope {
    fn accepts(&self, hidden: bool) -> bool {
        match self {
            DepScope::Normal => !hidden,
            DepScope::Hidden => hidden,
            DepScope::All => true,
        }
    }
}

/// All object paths in the expression with their hidden-reference flag
pub fn get_identifiers(expr: &Expression) -> Vec<(ObjectIdentifier, bool)> {
    let mut out = Vec::new();
    expr.walk(&mut |node, hidden| {
        if let ExprKind::Variable(path) = &node.kind {
            out.push((path.clone(), hidden));
        }
    });
    out
}

/// Property-level dependencies as (object, properties) pairs
pub fn get_deps(
    graph: &DocumentGraph,
    expr: &Expression,
    scope: DepScope,
) -> HashMap<ObjId, Vec<String>, ahash::RandomState> {
    let mut deps: HashMap<ObjId, Vec<String>, ahash::RandomState> = HashMap::default();
    expr.walk(&mut |node, hidden| {
        if !scope.accepts(hidden) {
            return;
        }
        match &node.kind {
            ExprKind::Variable(path) => {
                if let Some((obj, property)) = path.get_dep(graph) {
                    let entry = deps.entry(obj).or_default();
                    if let Some(p) = property {
                        if !entry.contains(&p) {
                            entry.push(p);
                        }
                    }
                }
            }
            ExprKind::Range { owner, begin, end } => {
                let entry = deps.entry(*owner).or_default();
                for addr in crate::address::CellRange::new(*begin, *end).cells() {
                    let name = addr.to_a1_string();
                    if !entry.contains(&name) {
                        entry.push(name);
                    }
                }
            }
            _ => {}
        }
    });
    deps
}

/// Objects the expression depends on, with their hidden flag.
///
/// Objects pending removal are skipped. An object referenced both normally
/// and through `hiddenref` counts as a normal dependency.
pub fn get_dep_objects(
    graph: &DocumentGraph,
    expr: &Expression,
    labels: Option<&mut Vec<String>>,
) -> HashMap<ObjId, bool, ahash::RandomState> {
    let mut deps: HashMap<ObjId, bool, ahash::RandomState> = HashMap::default();
    let mut collected_labels = Vec::new();
    expr.walk(&mut |node, hidden| {
        let obj = match &node.kind {
            ExprKind::Variable(path) => {
                path.get_dep_labels(&mut collected_labels);
                path.get_dep(graph).map(|(obj, _)| obj)
            }
            ExprKind::Range { owner, .. } => Some(*owner),
            _ => None,
        };
        let Some(obj) = obj else {
            return;
        };
        if graph.object(obj).map_or(true, |o| o.is_pending_remove()) {
            return;
        }
        match deps.entry(obj) {
            std::collections::hash_map::Entry::Occupied(mut e) => {
                if !hidden {
                    e.insert(false);
                }
            }
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(hidden);
            }
        }
    });
    if let Some(labels) = labels {
        labels.extend(collected_labels);
    }
    deps
}

/// Fail when any path in the expression runs through an object in `in_list`
pub fn adjust_links(
    graph: &DocumentGraph,
    expr: &Expression,
    in_list: &[ObjId],
) -> ExprResult<bool> {
    let mut result = Ok(false);
    expr.walk(&mut |node, _| {
        if result.is_err() {
            return;
        }
        if let ExprKind::Variable(path) = &node.kind {
            if let Err(e) = path.adjust_links(graph, in_list) {
                result = Err(e);
            }
        }
    });
    result
}

/// Remap sub-object path segments through `mapper` in place
pub fn import_sub_names(
    expr: &mut Expression,
    mapper: &dyn Fn(&str) -> Option<String>,
    mut host: Option<&mut dyn ExpressionVisitor>,
) -> bool {
    let mut changed = false;
    expr.visit(&mut FnVisitor(|node: &mut Expression| {
        if let ExprKind::Variable(path) = &mut node.kind {
            let mut remapped = path.clone();
            if remapped.import_sub_names(mapper) {
                notify(&mut host);
                *path = remapped;
                changed = true;
            }
        }
    }));
    changed
}

/// Rewrite references to a relabeled object. Returns the rewritten copy, or
/// `None` when the expression does not reference the label.
pub fn update_label_reference(
    expr: &Expression,
    old_label: &str,
    new_label: &str,
    mut host: Option<&mut dyn ExpressionVisitor>,
) -> Option<Expression> {
    let mut labels = Vec::new();
    for (path, _) in get_identifiers(expr) {
        path.get_dep_labels(&mut labels);
    }
    if !labels.iter().any(|l| l == old_label) {
        return None;
    }
    let mut copy = expr.clone();
    copy.visit(&mut FnVisitor(|node: &mut Expression| {
        if let ExprKind::Variable(path) = &mut node.kind {
            let mut updated = path.clone();
            if updated.update_label_reference(old_label, new_label) {
                notify(&mut host);
                *path = updated;
            }
        }
    }));
    Some(copy)
}

/// Rewrite quoted document labels after a document relabel. Returns the
/// rewritten copy, or `None` when nothing referenced the old label.
pub fn relabel_document(
    expr: &Expression,
    old_label: &str,
    new_label: &str,
    mut host: Option<&mut dyn ExpressionVisitor>,
) -> Option<Expression> {
    let mut copy = expr.clone();
    let mut changed = false;
    copy.visit(&mut FnVisitor(|node: &mut Expression| {
        if let ExprKind::Variable(path) = &mut node.kind {
            let mut relabeled = path.clone();
            if relabeled.relabeled_document(old_label, new_label) {
                notify(&mut host);
                *path = relabeled;
                changed = true;
            }
        }
    }));
    changed.then_some(copy)
}

/// Redirect references from `old` to `new`.
///
/// Replacements are collected read-only against the original tree, then
/// applied to a copy, so resolution always sees the pre-replacement state.
pub fn replace_object(
    graph: &DocumentGraph,
    expr: &Expression,
    old: ObjId,
    new: ObjId,
    mut host: Option<&mut dyn ExpressionVisitor>,
) -> Option<Expression> {
    let mut rewrites: Vec<(ObjectIdentifier, ObjectIdentifier)> = Vec::new();
    expr.walk(&mut |node, _| {
        if let ExprKind::Variable(path) = &node.kind {
            if let Some(rewritten) = path.replace_object(graph, old, new) {
                rewrites.push((path.clone(), rewritten));
            }
        }
    });
    if rewrites.is_empty() {
        return None;
    }

    let mut copy = expr.clone();
    copy.visit(&mut FnVisitor(|node: &mut Expression| {
        if let ExprKind::Variable(path) = &mut node.kind {
            if let Some((_, rewritten)) = rewrites.iter().find(|(orig, _)| orig == path) {
                notify(&mut host);
                *path = rewritten.clone();
            }
        }
    }));
    Some(copy)
}

/// Shift cell references at or beyond an insertion point.
///
/// Used when rows or columns are inserted into (or deleted from) the
/// owner's cell grid. References with an explicit object name point into
/// another grid and are left alone.
pub fn move_cells(
    expr: &mut Expression,
    insert_at: CellAddress,
    row_count: i32,
    col_count: i32,
    mut host: Option<&mut dyn ExpressionVisitor>,
) -> bool {
    let mut changed = false;
    expr.visit(&mut FnVisitor(|node: &mut Expression| {
        match &mut node.kind {
            ExprKind::Variable(path) => {
                if path.has_explicit_object() {
                    return;
                }
                let Some(name) = path.components().first().and_then(|c| c.name()) else {
                    return;
                };
                let Ok(addr) = CellAddress::parse(name) else {
                    return;
                };
                if addr.row >= insert_at.row || addr.col >= insert_at.col {
                    if let Some(moved) = shift(addr, &insert_at, row_count, col_count) {
                        notify(&mut host);
                        path.set_component(
                            0,
                            crate::path::Component::Simple(moved.to_a1_string()),
                        );
                        changed = true;
                    }
                }
            }
            ExprKind::Range { begin, end, .. } => {
                let mut notified = false;
                for addr in [begin, end] {
                    if addr.row >= insert_at.row || addr.col >= insert_at.col {
                        if let Some(moved) = shift(*addr, &insert_at, row_count, col_count) {
                            if !notified {
                                notify(&mut host);
                                notified = true;
                            }
                            *addr = moved;
                            changed = true;
                        }
                    }
                }
            }
            _ => {}
        }
    }));
    changed
}

fn shift(
    addr: CellAddress,
    insert_at: &CellAddress,
    row_count: i32,
    col_count: i32,
) -> Option<CellAddress> {
    let row_offset = if addr.row >= insert_at.row { row_count } else { 0 };
    let col_offset = if addr.col >= insert_at.col { col_count } else { 0 };
    if row_offset == 0 && col_offset == 0 {
        return None;
    }
    // shifting ignores pin flags, so clear and restore them
    let mut unpinned = addr;
    unpinned.row_absolute = false;
    unpinned.col_absolute = false;
    let mut moved = unpinned.offset(row_offset, col_offset)?;
    moved.row_absolute = addr.row_absolute;
    moved.col_absolute = addr.col_absolute;
    Some(moved)
}

/// Offset relative cell references, as when a cell's content is copied to
/// another cell. Pinned (`$`) coordinates stay put; a reference that would
/// leave the grid is logged and left unchanged.
pub fn offset_cells(
    expr: &mut Expression,
    row_offset: i32,
    col_offset: i32,
    mut host: Option<&mut dyn ExpressionVisitor>,
) -> bool {
    let mut changed = false;
    expr.visit(&mut FnVisitor(|node: &mut Expression| {
        match &mut node.kind {
            ExprKind::Variable(path) => {
                if path.has_explicit_object() {
                    return;
                }
                let Some(name) = path.components().first().and_then(|c| c.name()) else {
                    return;
                };
                let Ok(addr) = CellAddress::parse(name) else {
                    return;
                };
                if addr.row_absolute && addr.col_absolute {
                    return;
                }
                match addr.offset(row_offset, col_offset) {
                    Some(moved) => {
                        notify(&mut host);
                        path.set_component(
                            0,
                            crate::path::Component::Simple(moved.to_a1_string()),
                        );
                        changed = true;
                    }
                    None => {
                        log::warn!(
                            "Not changing relative cell reference '{}' due to invalid offset ({}, {})",
                            name,
                            col_offset,
                            row_offset
                        );
                    }
                }
            }
            ExprKind::Range { begin, end, .. } => {
                let mut notified = false;
                for addr in [begin, end] {
                    if addr.row_absolute && addr.col_absolute {
                        continue;
                    }
                    match addr.offset(row_offset, col_offset) {
                        Some(moved) => {
                            if !notified {
                                notify(&mut host);
                                notified = true;
                            }
                            *addr = moved;
                            changed = true;
                        }
                        None => {
                            log::warn!(
                                "Not changing relative cell reference '{}' due to invalid offset ({}, {})",
                                addr.to_a1_string(),
                                col_offset,
                                row_offset
                            );
                        }
                    }
                }
            }
            _ => {}
        }
    }));
    changed
}
