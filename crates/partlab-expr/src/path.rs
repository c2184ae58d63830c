//! Object paths and identifier resolution
//!
//! An [`ObjectIdentifier`] is a structured reference into the document graph:
//! optional document name, optional object name, optional sub-object path and
//! a chain of [`Component`] accessors, the first of which names a property.
//! Identifiers resolve lazily against the live graph; nothing here holds an
//! owning reference to a document object.
//!
//! Document and object names come in two spellings. A plain identifier
//! (`Box`) matches the internal name first and falls back to the label; a
//! quoted form (`<<Crate>>`) matches labels only. When an identifier match
//! and a distinct label match exist at the same time the reference is
//! ambiguous and resolution reports it instead of picking one.

use crate::error::{ExprError, ExprResult};
use partlab_core::{DocumentGraph, LabelMatch, ObjId, Value, LINK_TOUCHED_PROPERTY};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A single path accessor applied to a value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Component {
    /// Named field or property (`.Width`)
    Simple(String),
    /// Sequence index (`[2]`), negative counts from the end
    Array(i64),
    /// Mapping key (`[<<key>>]`)
    Map(String),
    /// Slice (`[a:b]` or `[a:b:c]`)
    Range {
        begin: Option<i64>,
        end: Option<i64>,
        step: Option<i64>,
    },
}

impl Component {
    /// Field name of a simple component
    pub fn name(&self) -> Option<&str> {
        match self {
            Component::Simple(name) => Some(name),
            _ => None,
        }
    }

    /// Step into `value` with this accessor
    pub fn apply(&self, value: &Value) -> ExprResult<Value> {
        match self {
            Component::Simple(name) => Self::get_field(value, name),
            Component::Map(key) => match value {
                Value::Map(map) => map.get(key).cloned().ok_or_else(|| {
                    ExprError::Evaluation(format!("key '{}' not found", key))
                }),
                other => Err(ExprError::Type(format!(
                    "cannot index {} with a key",
                    other.type_name()
                ))),
            },
            Component::Array(index) => {
                let items = Self::as_sequence(value)?;
                let idx = Self::normalize_index(*index, items.len()).ok_or_else(|| {
                    ExprError::Evaluation(format!("index {} out of range", index))
                })?;
                Ok(items[idx].clone())
            }
            Component::Range { begin, end, step } => {
                let items = Self::as_sequence(value)?;
                let sliced = Self::slice(items, *begin, *end, *step)?;
                Ok(match value {
                    Value::Tuple(_) => Value::Tuple(sliced),
                    _ => Value::List(sliced),
                })
            }
        }
    }

    fn get_field(value: &Value, name: &str) -> ExprResult<Value> {
        match value {
            Value::Map(map) => map.get(name).cloned().ok_or_else(|| {
                ExprError::Evaluation(format!("field '{}' not found", name))
            }),
            Value::Vector(v) => match name {
                "x" => Ok(Value::from(v.x)),
                "y" => Ok(Value::from(v.y)),
                "z" => Ok(Value::from(v.z)),
                _ => Err(ExprError::Evaluation(format!(
                    "vector has no field '{}'",
                    name
                ))),
            },
            Value::Placement(p) => match name {
                "Base" => Ok(Value::Vector(p.position)),
                "Rotation" => Ok(Value::Rotation(p.rotation)),
                _ => Err(ExprError::Evaluation(format!(
                    "placement has no field '{}'",
                    name
                ))),
            },
            other => Err(ExprError::Type(format!(
                "cannot access field '{}' on {}",
                name,
                other.type_name()
            ))),
        }
    }

    fn as_sequence(value: &Value) -> ExprResult<&[Value]> {
        match value {
            Value::List(items) | Value::Tuple(items) => Ok(items),
            other => Err(ExprError::Type(format!(
                "cannot index {}",
                other.type_name()
            ))),
        }
    }

    fn normalize_index(index: i64, len: usize) -> Option<usize> {
        let idx = if index < 0 {
            index + len as i64
        } else {
            index
        };
        (0..len as i64).contains(&idx).then_some(idx as usize)
    }

    fn slice(
        items: &[Value],
        begin: Option<i64>,
        end: Option<i64>,
        step: Option<i64>,
    ) -> ExprResult<Vec<Value>> {
        let step = step.unwrap_or(1);
        if step == 0 {
            return Err(ExprError::Evaluation("slice step cannot be zero".into()));
        }
        let len = items.len() as i64;
        let clamp = |v: i64| -> i64 {
            let v = if v < 0 { v + len } else { v };
            v.clamp(if step > 0 { 0 } else { -1 }, len)
        };
        let mut out = Vec::new();
        if step > 0 {
            let mut i = clamp(begin.unwrap_or(0));
            let stop = clamp(end.unwrap_or(len));
            while i < stop {
                out.push(items[i as usize].clone());
                i += step;
            }
        } else {
            let mut i = clamp(begin.unwrap_or(len - 1)).min(len - 1);
            let stop = end.map(clamp).unwrap_or(-1);
            while i > stop && i >= 0 {
                out.push(items[i as usize].clone());
                i += step;
            }
        }
        Ok(out)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Simple(name) => write!(f, "{}", name),
            Component::Array(index) => write!(f, "[{}]", index),
            Component::Map(key) => write!(f, "[<<{}>>]", key),
            Component::Range { begin, end, step } => {
                write!(f, "[")?;
                if let Some(b) = begin {
                    write!(f, "{}", b)?;
                }
                write!(f, ":")?;
                if let Some(e) = end {
                    write!(f, "{}", e)?;
                }
                if let Some(s) = step {
                    write!(f, ":{}", s)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// A document or object name with its spelling flags
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathString {
    pub name: String,
    /// Quoted form (`<<...>>`), matches labels only
    pub is_label: bool,
    /// Never fall back to label matching
    pub force_identifier: bool,
}

impl PathString {
    pub fn identifier(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_label: false,
            force_identifier: false,
        }
    }

    pub fn label(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_label: true,
            force_identifier: false,
        }
    }

    pub fn forced(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_label: false,
            force_identifier: true,
        }
    }
}

fn is_plain_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl fmt::Display for PathString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_label || !is_plain_identifier(&self.name) {
            write!(f, "<<{}>>", self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// How a name was matched during resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolveMethod {
    #[default]
    NotFound,
    ByIdentifier,
    ByLabel,
    /// Distinct identifier and label matches, or duplicate labels
    Ambiguous,
}

/// Synthesized properties addressable through path syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoProperty {
    Shape,
    Placement,
    Matrix,
    LinkedPlacement,
    LinkedMatrix,
    SelfRef,
}

impl PseudoProperty {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "_shape" => Some(PseudoProperty::Shape),
            "_pla" => Some(PseudoProperty::Placement),
            "_matrix" => Some(PseudoProperty::Matrix),
            "__pla" => Some(PseudoProperty::LinkedPlacement),
            "__matrix" => Some(PseudoProperty::LinkedMatrix),
            "_self" => Some(PseudoProperty::SelfRef),
            _ => None,
        }
    }
}

/// Snapshot of resolving an identifier against the graph at a point in time
#[derive(Debug, Clone, Default)]
pub struct ResolveResult {
    pub document_method: ResolveMethod,
    pub object_method: ResolveMethod,
    pub resolved_object: Option<ObjId>,
    pub resolved_sub_object: Option<ObjId>,
    /// Index into the component list of the property-naming component
    pub property_index: usize,
    pub property_name: Option<String>,
    pub pseudo: Option<PseudoProperty>,
}

impl ResolveResult {
    /// The object the final property lives on
    pub fn target_object(&self) -> Option<ObjId> {
        self.resolved_sub_object.or(self.resolved_object)
    }
}

/// A structured, lazily-resolved reference into the document graph
#[derive(Debug, Clone)]
pub struct ObjectIdentifier {
    owner: Option<ObjId>,
    document_name: Option<PathString>,
    object_name: Option<PathString>,
    /// Dot-separated link chain below the object (`Part.Body.`)
    sub_object_name: Option<String>,
    components: Vec<Component>,
    // rendered-string cache, cleared by every mutator
    cache: RefCell<Option<String>>,
}

impl ObjectIdentifier {
    pub fn new(owner: ObjId) -> Self {
        Self {
            owner: Some(owner),
            document_name: None,
            object_name: None,
            sub_object_name: None,
            components: Vec::new(),
            cache: RefCell::new(None),
        }
    }

    /// Reference to a property of the owner itself
    pub fn from_property(owner: ObjId, property: &str) -> Self {
        let mut ident = Self::new(owner);
        ident.components.push(Component::Simple(property.to_string()));
        ident
    }

    pub fn owner(&self) -> Option<ObjId> {
        self.owner
    }

    pub fn document_name(&self) -> Option<&PathString> {
        self.document_name.as_ref()
    }

    pub fn object_name(&self) -> Option<&PathString> {
        self.object_name.as_ref()
    }

    pub fn sub_object_name(&self) -> Option<&str> {
        self.sub_object_name.as_deref()
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// True if the path names its object explicitly rather than being
    /// owner-relative
    pub fn has_explicit_object(&self) -> bool {
        self.document_name.is_some() || self.object_name.is_some()
    }

    fn invalidate(&mut self) {
        self.cache.replace(None);
    }

    pub fn set_document_name(&mut self, name: PathString) {
        self.document_name = Some(name);
        self.invalidate();
    }

    pub fn set_object_name(&mut self, name: PathString) {
        self.object_name = Some(name);
        self.invalidate();
    }

    pub fn set_sub_object_name(&mut self, sub: &str) {
        self.sub_object_name = if sub.is_empty() {
            None
        } else {
            Some(sub.to_string())
        };
        self.invalidate();
    }

    pub fn add_component(&mut self, component: Component) {
        self.components.push(component);
        self.invalidate();
    }

    pub fn set_component(&mut self, index: usize, component: Component) {
        if index < self.components.len() {
            self.components[index] = component;
            self.invalidate();
        }
    }

    /// Resolve against the live graph. Never mutates the identifier;
    /// missing and ambiguous stages are reported as flags, not errors.
    pub fn resolve(&self, graph: &DocumentGraph) -> ResolveResult {
        let mut result = ResolveResult::default();
        let Some(owner) = self.owner else {
            return result;
        };

        let doc_id = match &self.document_name {
            Some(name) => {
                result.document_method = Self::lookup_document(graph, name);
                match result.document_method {
                    ResolveMethod::ByIdentifier => graph.get_document(&name.name),
                    ResolveMethod::ByLabel => match graph.get_document_by_label(&name.name) {
                        LabelMatch::Unique(id) => Some(id),
                        _ => None,
                    },
                    _ => None,
                }
            }
            None => {
                result.document_method = ResolveMethod::ByIdentifier;
                Some(owner.doc)
            }
        };
        let Some(doc_id) = doc_id else {
            return result;
        };
        let Some(doc) = graph.document(doc_id) else {
            return result;
        };

        match &self.object_name {
            Some(name) => {
                result.object_method = Self::lookup_object(doc, name);
                result.resolved_object = match result.object_method {
                    ResolveMethod::ByIdentifier => doc.get_object(&name.name),
                    ResolveMethod::ByLabel => match doc.get_object_by_label(&name.name) {
                        LabelMatch::Unique(id) => Some(id),
                        _ => None,
                    },
                    _ => None,
                };
                result.property_index = 0;
            }
            None => match self.components.first() {
                None => return result,
                // A single component, or a leading non-simple accessor,
                // addresses a property of the owner itself
                Some(first) if self.components.len() == 1 || first.name().is_none() => {
                    if doc_id == owner.doc {
                        result.resolved_object = Some(owner);
                        result.object_method = ResolveMethod::ByIdentifier;
                    }
                    result.property_index = 0;
                }
                Some(first) => {
                    // Try the first component as an object name; fall back
                    // to owner-relative when no document was given
                    let name = first.name().unwrap_or_default();
                    match doc.get_object(name) {
                        Some(obj) => {
                            result.resolved_object = Some(obj);
                            result.object_method = ResolveMethod::ByIdentifier;
                            result.property_index = 1;
                        }
                        None if self.document_name.is_none() && doc_id == owner.doc => {
                            result.resolved_object = Some(owner);
                            result.object_method = ResolveMethod::ByIdentifier;
                            result.property_index = 0;
                        }
                        None => {
                            result.object_method = ResolveMethod::NotFound;
                            return result;
                        }
                    }
                }
            },
        }

        let Some(obj) = result.resolved_object else {
            return result;
        };

        if let Some(sub) = &self.sub_object_name {
            result.resolved_sub_object = graph
                .get_sub_object(obj, &Self::strip_label_markers(sub))
                .map(|(id, _)| id);
        }

        if let Some(Component::Simple(name)) = self.components.get(result.property_index) {
            result.property_name = Some(name.clone());
            result.pseudo = PseudoProperty::from_name(name);
        }

        result
    }

    /// Resolve, converting missing/ambiguous stages into errors that name
    /// the failing stage
    pub fn resolve_checked(&self, graph: &DocumentGraph) -> ExprResult<ResolveResult> {
        let result = self.resolve(graph);
        let stage_name = |ps: Option<&PathString>, fallback: &str| {
            ps.map(|p| p.name.clone()).unwrap_or_else(|| fallback.to_string())
        };
        match result.document_method {
            ResolveMethod::Ambiguous => {
                return Err(ExprError::Ambiguous {
                    kind: "document",
                    name: stage_name(self.document_name.as_ref(), "?"),
                })
            }
            ResolveMethod::NotFound => {
                return Err(ExprError::NotResolved {
                    kind: "document",
                    name: stage_name(self.document_name.as_ref(), "?"),
                })
            }
            _ => {}
        }
        let object_desc = || {
            self.object_name
                .as_ref()
                .map(|p| p.name.clone())
                .or_else(|| {
                    self.components
                        .first()
                        .and_then(Component::name)
                        .map(str::to_string)
                })
                .unwrap_or_else(|| "?".to_string())
        };
        match result.object_method {
            ResolveMethod::Ambiguous => {
                return Err(ExprError::Ambiguous {
                    kind: "object",
                    name: object_desc(),
                })
            }
            ResolveMethod::NotFound => {
                return Err(ExprError::NotResolved {
                    kind: "object",
                    name: object_desc(),
                })
            }
            _ => {}
        }
        if result.resolved_object.is_none() {
            return Err(ExprError::NotResolved {
                kind: "object",
                name: object_desc(),
            });
        }
        if let Some(sub) = &self.sub_object_name {
            if result.resolved_sub_object.is_none() {
                return Err(ExprError::NotResolved {
                    kind: "sub-object",
                    name: sub.clone(),
                });
            }
        }
        if result.property_name.is_none() {
            return Err(ExprError::NotResolved {
                kind: "property",
                name: self
                    .components
                    .get(result.property_index)
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "?".to_string()),
            });
        }
        Ok(result)
    }

    fn lookup_document(graph: &DocumentGraph, name: &PathString) -> ResolveMethod {
        let id_match = if name.is_label {
            None
        } else {
            graph.get_document(&name.name)
        };
        let label_match = if name.force_identifier {
            LabelMatch::None
        } else {
            graph.get_document_by_label(&name.name)
        };
        Self::combine_matches(id_match, label_match)
    }

    fn lookup_object(doc: &partlab_core::Document, name: &PathString) -> ResolveMethod {
        let id_match = if name.is_label {
            None
        } else {
            doc.get_object(&name.name)
        };
        let label_match = if name.force_identifier {
            LabelMatch::None
        } else {
            doc.get_object_by_label(&name.name)
        };
        Self::combine_matches(id_match, label_match)
    }

    // Identifier match wins only when no label matches or the label names
    // the same entity; distinct simultaneous matches are always ambiguous.
    fn combine_matches<T: PartialEq>(id: Option<T>, label: LabelMatch<T>) -> ResolveMethod {
        match (id, label) {
            (Some(_), LabelMatch::Ambiguous) => ResolveMethod::Ambiguous,
            (Some(i), LabelMatch::Unique(l)) if i == l => ResolveMethod::ByIdentifier,
            (Some(_), LabelMatch::Unique(_)) => ResolveMethod::Ambiguous,
            (Some(_), LabelMatch::None) => ResolveMethod::ByIdentifier,
            (None, LabelMatch::Unique(_)) => ResolveMethod::ByLabel,
            (None, LabelMatch::Ambiguous) => ResolveMethod::Ambiguous,
            (None, LabelMatch::None) => ResolveMethod::NotFound,
        }
    }

    /// Pin the identifier to the entity it currently resolves to, freezing
    /// the identifier-vs-label choice for canonicalization
    pub fn resolve_ambiguity(&mut self, graph: &DocumentGraph) -> ExprResult<()> {
        let result = self.resolve_checked(graph)?;
        let Some(owner) = self.owner else {
            return Ok(());
        };
        let Some(obj) = result.resolved_object else {
            return Ok(());
        };

        if obj == owner && self.sub_object_name.is_none() && self.document_name.is_none() {
            // owner-relative form stays relative
            if self.object_name.take().is_some() {
                self.invalidate();
            }
            return Ok(());
        }

        if self.document_name.is_some() || obj.doc != owner.doc {
            if let Some(doc) = graph.document(obj.doc) {
                self.document_name = Some(PathString::forced(doc.name()));
            }
        }
        if let Some(o) = graph.object(obj) {
            self.object_name = Some(PathString::forced(o.name()));
        }
        if result.property_index == 1 {
            self.components.remove(0);
        }
        self.invalidate();
        Ok(())
    }

    fn render(&self) -> String {
        let mut out = String::new();
        if let Some(doc) = &self.document_name {
            out.push_str(&format!("{}#", doc));
        }
        if let Some(obj) = &self.object_name {
            out.push_str(&format!("{}.", obj));
        }
        if let Some(sub) = &self.sub_object_name {
            if is_plain_identifier(sub.trim_end_matches('.')) {
                out.push_str(sub.trim_end_matches('.'));
            } else {
                out.push_str(&format!("<<{}>>", sub));
            }
            out.push('.');
        }
        for (i, comp) in self.components.iter().enumerate() {
            if let Component::Simple(name) = comp {
                if i > 0 || !out.is_empty() && !out.ends_with(['.', '#']) {
                    out.push('.');
                }
                out.push_str(name);
            } else {
                out.push_str(&comp.to_string());
            }
        }
        out
    }

    fn rendered(&self) -> String {
        let mut cache = self.cache.borrow_mut();
        cache.get_or_insert_with(|| self.render()).clone()
    }

    /// Canonical rename-resistant form: explicit internal document and
    /// object names. Falls back to the display form when the identifier
    /// does not currently resolve.
    pub fn to_persistent_string(&self, graph: &DocumentGraph) -> String {
        let mut pinned = self.clone();
        if pinned.resolve_ambiguity(graph).is_ok() {
            pinned.render()
        } else {
            self.rendered()
        }
    }

    /// Single dependency this path creates, as (object, property).
    ///
    /// Pseudo-properties depend on the whole object. A property reached
    /// through a link is redirected to the link container's
    /// `_LinkTouched` sentinel when present, else to the linked object
    /// with no specific property.
    pub fn get_dep(&self, graph: &DocumentGraph) -> Option<(ObjId, Option<String>)> {
        let result = self.resolve(graph);
        let obj = result.resolved_object?;
        if result.pseudo.is_some() {
            return Some((obj, None));
        }
        let property = result.property_name.clone()?;
        let target = result.target_object()?;
        if target != obj {
            if graph
                .object(obj)
                .is_some_and(|o| o.property(LINK_TOUCHED_PROPERTY).is_some())
            {
                return Some((obj, Some(LINK_TOUCHED_PROPERTY.to_string())));
            }
            return Some((target, None));
        }
        Some((obj, Some(property)))
    }

    /// Labels this path references, for reverse-lookup indexing on relabel
    pub fn get_dep_labels(&self, labels: &mut Vec<String>) {
        if let Some(doc) = &self.document_name {
            if doc.is_label {
                labels.push(doc.name.clone());
            }
        }
        if let Some(obj) = &self.object_name {
            if obj.is_label {
                labels.push(obj.name.clone());
            }
        }
        if let Some(sub) = &self.sub_object_name {
            for segment in sub.split('.') {
                if let Some(label) = segment.strip_prefix('$') {
                    if !label.is_empty() {
                        labels.push(label.to_string());
                    }
                }
            }
        }
    }

    // `$Label` segments address sub-objects by label; the graph walks by
    // link name, so strip the marker before walking
    fn strip_label_markers(sub: &str) -> String {
        sub.split('.')
            .map(|s| s.strip_prefix('$').unwrap_or(s))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Read the value this path addresses
    pub fn get_value(&self, graph: &DocumentGraph) -> ExprResult<Value> {
        let result = self.resolve_checked(graph)?;
        let obj = result.resolved_object.ok_or(ExprError::NotResolved {
            kind: "object",
            name: self.rendered(),
        })?;

        let base = if let Some(pseudo) = result.pseudo {
            self.pseudo_value(graph, obj, pseudo)?
        } else {
            let target = result.target_object().unwrap_or(obj);
            let name = result.property_name.as_deref().unwrap_or_default();
            graph
                .property_value(target, name)
                .cloned()
                .ok_or_else(|| ExprError::NotResolved {
                    kind: "property",
                    name: name.to_string(),
                })?
        };

        let mut value = base;
        for comp in &self.components[result.property_index + 1..] {
            value = comp.apply(&value)?;
        }
        Ok(value)
    }

    fn pseudo_value(
        &self,
        graph: &DocumentGraph,
        obj: ObjId,
        pseudo: PseudoProperty,
    ) -> ExprResult<Value> {
        let object = graph.object(obj).ok_or(ExprError::NotResolved {
            kind: "object",
            name: self.rendered(),
        })?;
        match pseudo {
            PseudoProperty::Placement => Ok(Value::Placement(object.placement())),
            PseudoProperty::Matrix => Ok(Value::Matrix(object.placement().to_matrix())),
            PseudoProperty::LinkedPlacement | PseudoProperty::LinkedMatrix => {
                let sub = self.sub_object_name.as_deref().unwrap_or_default();
                let (_, transform) = graph
                    .get_sub_object(obj, &Self::strip_label_markers(sub))
                    .ok_or(ExprError::NotResolved {
                        kind: "sub-object",
                        name: sub.to_string(),
                    })?;
                if pseudo == PseudoProperty::LinkedMatrix {
                    Ok(Value::Matrix(transform))
                } else {
                    Ok(Value::Placement(partlab_core::Placement::from_matrix(
                        &transform,
                    )))
                }
            }
            PseudoProperty::Shape => object
                .property("Shape")
                .map(|p| p.value().clone())
                .ok_or_else(|| ExprError::NotResolved {
                    kind: "property",
                    name: "Shape".to_string(),
                }),
            PseudoProperty::SelfRef => Ok(Value::String(object.name().to_string())),
        }
    }

    /// True if the addressed property currently carries a touched flag
    pub fn is_touched(&self, graph: &DocumentGraph) -> bool {
        let result = self.resolve(graph);
        let Some(target) = result.target_object() else {
            return false;
        };
        let Some(name) = &result.property_name else {
            return false;
        };
        graph
            .object(target)
            .and_then(|o| o.property(name))
            .is_some_and(|p| p.is_touched())
    }

    /// Rewrite an embedded quoted document label. Returns true if changed.
    pub fn relabeled_document(&mut self, old_label: &str, new_label: &str) -> bool {
        if let Some(doc) = &mut self.document_name {
            if doc.is_label && doc.name == old_label {
                doc.name = new_label.to_string();
                self.invalidate();
                return true;
            }
        }
        false
    }

    /// Rewrite references to a relabeled object. Returns true if changed.
    pub fn update_label_reference(&mut self, old_label: &str, new_label: &str) -> bool {
        let mut changed = false;
        if let Some(obj) = &mut self.object_name {
            if obj.is_label && obj.name == old_label {
                obj.name = new_label.to_string();
                changed = true;
            }
        }
        if let Some(sub) = &self.sub_object_name {
            let old_marker = format!("${}", old_label);
            if sub.split('.').any(|s| s == old_marker) {
                let rewritten = sub
                    .split('.')
                    .map(|s| {
                        if s == old_marker {
                            format!("${}", new_label)
                        } else {
                            s.to_string()
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(".");
                self.sub_object_name = Some(rewritten);
                changed = true;
            }
        }
        if changed {
            self.invalidate();
        }
        changed
    }

    /// Fail when the path runs through an object that is about to go away
    pub fn adjust_links(&self, graph: &DocumentGraph, in_list: &[ObjId]) -> ExprResult<bool> {
        let result = self.resolve(graph);
        for id in [result.resolved_object, result.resolved_sub_object]
            .into_iter()
            .flatten()
        {
            if in_list.contains(&id) {
                let name = graph
                    .object(id)
                    .map(|o| o.name().to_string())
                    .unwrap_or_else(|| self.rendered());
                return Err(ExprError::Evaluation(format!(
                    "cyclic reference through '{}'",
                    name
                )));
            }
        }
        Ok(false)
    }

    /// Remap sub-object path segments through `mapper`. Returns true if
    /// changed.
    pub fn import_sub_names(&mut self, mapper: &dyn Fn(&str) -> Option<String>) -> bool {
        let Some(sub) = &self.sub_object_name else {
            return false;
        };
        let mut changed = false;
        let rewritten = sub
            .split('.')
            .map(|s| match mapper(s) {
                Some(new) => {
                    changed = true;
                    new
                }
                None => s.to_string(),
            })
            .collect::<Vec<_>>()
            .join(".");
        if changed {
            self.sub_object_name = Some(rewritten);
            self.invalidate();
        }
        changed
    }

    /// If this path references `old`, produce a copy rewritten to `new`.
    /// Read-only; the caller applies the rewrite in a second pass.
    pub fn replace_object(
        &self,
        graph: &DocumentGraph,
        old: ObjId,
        new: ObjId,
    ) -> Option<ObjectIdentifier> {
        let result = self.resolve(graph);
        let mut rewritten = self.clone();
        let mut changed = false;

        if result.resolved_object == Some(old) {
            let new_obj = graph.object(new)?;
            if self.object_name.is_some() || result.property_index == 1 {
                rewritten.object_name = Some(PathString::identifier(new_obj.name()));
                if result.property_index == 1 && self.object_name.is_none() {
                    rewritten.components.remove(0);
                }
                changed = true;
            }
        }
        if let (Some(sub), Some(old_obj), Some(new_obj)) =
            (&self.sub_object_name, graph.object(old), graph.object(new))
        {
            let rewritten_sub = sub
                .split('.')
                .map(|s| {
                    let bare = s.strip_prefix('$').unwrap_or(s);
                    if bare == old_obj.name() || bare == old_obj.label() {
                        changed = true;
                        new_obj.name().to_string()
                    } else {
                        s.to_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(".");
            if rewritten_sub != *sub {
                rewritten.sub_object_name = Some(rewritten_sub);
            }
        }

        if changed {
            rewritten.invalidate();
            Some(rewritten)
        } else {
            None
        }
    }
}

impl fmt::Display for ObjectIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rendered())
    }
}

// Equality, ordering and hashing go by owner plus rendered string form, so
// an explicit and an equivalent relative spelling stay distinct while two
// copies of the same path compare equal regardless of cache state.
impl PartialEq for ObjectIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.rendered() == other.rendered()
    }
}

impl Eq for ObjectIdentifier {}

impl PartialOrd for ObjectIdentifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectIdentifier {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.owner, self.rendered()).cmp(&(other.owner, other.rendered()))
    }
}

impl Hash for ObjectIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.owner.hash(state);
        self.rendered().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use partlab_core::{DocId, DocumentGraph, Quantity};
    use pretty_assertions::assert_eq;

    fn sample_graph() -> (DocumentGraph, ObjId, ObjId) {
        let mut graph = DocumentGraph::new();
        let doc = graph.new_document("Model").unwrap();
        let d = graph.document_mut(doc).unwrap();
        let owner = d.add_object("Sketch").unwrap();
        let other = d.add_object_labeled("Box001", "Crate").unwrap();
        d.object_mut(owner)
            .unwrap()
            .set_property("Width", Value::from(Quantity::new(4.0, "mm").unwrap()));
        d.object_mut(other)
            .unwrap()
            .set_property("Length", Value::from(Quantity::new(10.0, "mm").unwrap()));
        (graph, owner, other)
    }

    #[test]
    fn test_owner_relative_resolution() {
        let (graph, owner, _) = sample_graph();
        let ident = ObjectIdentifier::from_property(owner, "Width");
        let result = ident.resolve(&graph);
        assert_eq!(result.resolved_object, Some(owner));
        assert_eq!(result.property_name.as_deref(), Some("Width"));
        assert_eq!(result.property_index, 0);
    }

    #[test]
    fn test_two_component_object_then_property() {
        let (graph, owner, other) = sample_graph();
        let mut ident = ObjectIdentifier::new(owner);
        ident.add_component(Component::Simple("Box001".into()));
        ident.add_component(Component::Simple("Length".into()));
        let result = ident.resolve(&graph);
        assert_eq!(result.resolved_object, Some(other));
        assert_eq!(result.property_index, 1);
        assert_eq!(result.property_name.as_deref(), Some("Length"));
    }

    #[test]
    fn test_two_component_fallback_to_owner() {
        let (graph, owner, _) = sample_graph();
        let mut ident = ObjectIdentifier::new(owner);
        ident.add_component(Component::Simple("Width".into()));
        ident.add_component(Component::Simple("x".into()));
        let result = ident.resolve(&graph);
        assert_eq!(result.resolved_object, Some(owner));
        assert_eq!(result.property_index, 0);
    }

    #[test]
    fn test_label_resolution() {
        let (graph, owner, other) = sample_graph();
        let mut ident = ObjectIdentifier::new(owner);
        ident.set_object_name(PathString::label("Crate"));
        ident.add_component(Component::Simple("Length".into()));
        let result = ident.resolve(&graph);
        assert_eq!(result.object_method, ResolveMethod::ByLabel);
        assert_eq!(result.resolved_object, Some(other));
    }

    #[test]
    fn test_simultaneous_distinct_matches_are_ambiguous() {
        let mut graph = DocumentGraph::new();
        let doc = graph.new_document("Model").unwrap();
        let d = graph.document_mut(doc).unwrap();
        let owner = d.add_object("Sketch").unwrap();
        // one object is named "Box", a different one is labeled "Box"
        d.add_object_labeled("Box", "BoxIdent").unwrap();
        d.add_object_labeled("Box002", "Box").unwrap();

        let mut ident = ObjectIdentifier::new(owner);
        ident.set_object_name(PathString::identifier("Box"));
        ident.add_component(Component::Simple("Length".into()));
        assert_eq!(ident.resolve(&graph).object_method, ResolveMethod::Ambiguous);
        assert!(matches!(
            ident.resolve_checked(&graph),
            Err(ExprError::Ambiguous { kind: "object", .. })
        ));
    }

    #[test]
    fn test_ambiguous_document_label() {
        let mut graph = DocumentGraph::new();
        let d1 = graph.new_document_labeled("Doc1", "Foo").unwrap();
        graph.new_document_labeled("Doc2", "Foo").unwrap();
        let owner = graph
            .document_mut(d1)
            .unwrap()
            .add_object("Sketch")
            .unwrap();

        let mut ident = ObjectIdentifier::new(owner);
        ident.set_document_name(PathString::label("Foo"));
        ident.set_object_name(PathString::identifier("Bar"));
        ident.add_component(Component::Simple("X".into()));
        assert_eq!(
            ident.resolve(&graph).document_method,
            ResolveMethod::Ambiguous
        );
    }

    #[test]
    fn test_get_value_with_components() {
        let (mut graph, owner, _) = sample_graph();
        graph.object_mut(owner).unwrap().set_property(
            "Points",
            Value::List(vec![Value::from(1.0), Value::from(2.0), Value::from(3.0)]),
        );
        let mut ident = ObjectIdentifier::from_property(owner, "Points");
        ident.add_component(Component::Array(-1));
        assert_eq!(ident.get_value(&graph).unwrap(), Value::from(3.0));
    }

    #[test]
    fn test_slice_component() {
        let items = Value::List(vec![
            Value::from(1.0),
            Value::from(2.0),
            Value::from(3.0),
            Value::from(4.0),
        ]);
        let comp = Component::Range {
            begin: Some(1),
            end: Some(3),
            step: None,
        };
        assert_eq!(
            comp.apply(&items).unwrap(),
            Value::List(vec![Value::from(2.0), Value::from(3.0)])
        );
        let rev = Component::Range {
            begin: None,
            end: None,
            step: Some(-1),
        };
        assert_eq!(
            rev.apply(&Value::List(vec![Value::from(1.0), Value::from(2.0)]))
                .unwrap(),
            Value::List(vec![Value::from(2.0), Value::from(1.0)])
        );
    }

    #[test]
    fn test_display_rendering() {
        let (_, owner, _) = sample_graph();
        let mut ident = ObjectIdentifier::new(owner);
        ident.set_document_name(PathString::identifier("Model"));
        ident.set_object_name(PathString::label("Crate"));
        ident.add_component(Component::Simple("Length".into()));
        ident.add_component(Component::Array(0));
        assert_eq!(ident.to_string(), "Model#<<Crate>>.Length[0]");
    }

    #[test]
    fn test_persistent_string_pins_internal_names() {
        let (graph, owner, _) = sample_graph();
        let mut ident = ObjectIdentifier::new(owner);
        ident.set_object_name(PathString::label("Crate"));
        ident.add_component(Component::Simple("Length".into()));
        assert_eq!(ident.to_persistent_string(&graph), "Box001.Length");
        // display form is unchanged
        assert_eq!(ident.to_string(), "<<Crate>>.Length");
    }

    #[test]
    fn test_get_dep() {
        let (graph, owner, other) = sample_graph();
        let mut ident = ObjectIdentifier::new(owner);
        ident.set_object_name(PathString::identifier("Box001"));
        ident.add_component(Component::Simple("Length".into()));
        assert_eq!(
            ident.get_dep(&graph),
            Some((other, Some("Length".to_string())))
        );
    }

    #[test]
    fn test_get_dep_link_redirection() {
        let mut graph = DocumentGraph::new();
        let doc = graph.new_document("Asm").unwrap();
        let d = graph.document_mut(doc).unwrap();
        let owner = d.add_object("Sketch").unwrap();
        let link = d.add_object("Link").unwrap();
        let target = d.add_object("Part1").unwrap();
        d.object_mut(link).unwrap().set_link("Part1", target);
        d.object_mut(target)
            .unwrap()
            .set_property("Width", Value::from(3.0));

        let mut ident = ObjectIdentifier::new(owner);
        ident.set_object_name(PathString::identifier("Link"));
        ident.set_sub_object_name("Part1.");
        ident.add_component(Component::Simple("Width".into()));

        // without the sentinel the dep falls to the linked object
        assert_eq!(ident.get_dep(&graph), Some((target, None)));

        graph
            .object_mut(link)
            .unwrap()
            .set_property(LINK_TOUCHED_PROPERTY, Value::None);
        assert_eq!(
            ident.get_dep(&graph),
            Some((link, Some(LINK_TOUCHED_PROPERTY.to_string())))
        );
    }

    #[test]
    fn test_dep_labels() {
        let (_, owner, _) = sample_graph();
        let mut ident = ObjectIdentifier::new(owner);
        ident.set_document_name(PathString::label("Foo"));
        ident.set_object_name(PathString::label("Crate"));
        ident.set_sub_object_name("$Lid.Part1.");
        ident.add_component(Component::Simple("Width".into()));
        let mut labels = Vec::new();
        ident.get_dep_labels(&mut labels);
        assert_eq!(labels, vec!["Foo", "Crate", "Lid"]);
    }

    #[test]
    fn test_update_label_reference() {
        let (_, owner, _) = sample_graph();
        let mut ident = ObjectIdentifier::new(owner);
        ident.set_object_name(PathString::label("Crate"));
        ident.add_component(Component::Simple("Length".into()));
        assert!(ident.update_label_reference("Crate", "Bin"));
        assert_eq!(ident.to_string(), "<<Bin>>.Length");
        assert!(!ident.update_label_reference("Crate", "Bin"));
    }

    #[test]
    fn test_replace_object() {
        let (mut graph, owner, old) = sample_graph();
        let new = graph
            .document_mut(DocId(0))
            .unwrap()
            .add_object("Box005")
            .unwrap();
        graph
            .object_mut(new)
            .unwrap()
            .set_property("Length", Value::from(1.0));

        let mut ident = ObjectIdentifier::new(owner);
        ident.set_object_name(PathString::identifier("Box001"));
        ident.add_component(Component::Simple("Length".into()));

        let rewritten = ident.replace_object(&graph, old, new).unwrap();
        assert_eq!(rewritten.to_string(), "Box005.Length");
        // original untouched
        assert_eq!(ident.to_string(), "Box001.Length");
    }

    #[test]
    fn test_pseudo_properties() {
        let (graph, owner, _) = sample_graph();
        let ident = ObjectIdentifier::from_property(owner, "_pla");
        assert!(matches!(
            ident.get_value(&graph).unwrap(),
            Value::Placement(_)
        ));
        let ident = ObjectIdentifier::from_property(owner, "_self");
        assert_eq!(ident.get_value(&graph).unwrap(), Value::from("Sketch"));
    }
}
