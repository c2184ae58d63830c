//! Document graph
//!
//! The host-side object model the expression engine resolves against:
//! documents hold named objects, objects hold named properties and links to
//! sub-objects. The engine never owns any of these; it keeps [`DocId`] /
//! [`ObjId`] handles and re-resolves on demand.
//!
//! Objects have two names: an immutable internal `name` (the identifier,
//! unique within the document) and a mutable user-facing `label`. Labels may
//! collide; lookups by label report the collision instead of picking one.
//!
//! Link structures must be acyclic. That is a precondition the host
//! maintains; sub-object walks here do not re-check it.

use crate::error::{Error, Result};
use crate::math3d::{Matrix4, Placement};
use crate::value::Value;
use std::collections::BTreeMap;

/// Sentinel property name: when present on a link container, dependencies
/// that reach a property through the link are redirected here
pub const LINK_TOUCHED_PROPERTY: &str = "_LinkTouched";

/// Handle to a document in a [`DocumentGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocId(pub usize);

/// Handle to an object in a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjId {
    pub doc: DocId,
    pub idx: usize,
}

/// Outcome of a label lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelMatch<T> {
    None,
    Unique(T),
    Ambiguous,
}

/// A stored property: a value plus a touched flag
#[derive(Debug, Clone, Default)]
pub struct Property {
    value: Value,
    touched: bool,
}

impl Property {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            touched: false,
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn set_value(&mut self, value: Value) {
        self.value = value;
        self.touched = true;
    }

    pub fn is_touched(&self) -> bool {
        self.touched
    }

    pub fn purge_touched(&mut self) {
        self.touched = false;
    }

    pub fn touch(&mut self) {
        self.touched = true;
    }
}

/// A document object: named properties plus links to sub-objects
#[derive(Debug, Clone)]
pub struct DocObject {
    name: String,
    label: String,
    properties: BTreeMap<String, Property>,
    links: BTreeMap<String, ObjId>,
    placement: Placement,
    pending_remove: bool,
}

impl DocObject {
    fn new(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            properties: BTreeMap::new(),
            links: BTreeMap::new(),
            placement: Placement::default(),
            pending_remove: false,
        }
    }

    /// Internal identifier, unique within the document
    pub fn name(&self) -> &str {
        &self.name
    }

    /// User-facing label, not necessarily unique
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: &str) {
        self.label = label.to_string();
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub fn property_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.properties.get_mut(name)
    }

    pub fn set_property(&mut self, name: &str, value: Value) {
        self.properties
            .entry(name.to_string())
            .or_default()
            .set_value(value);
    }

    pub fn remove_property(&mut self, name: &str) -> Option<Property> {
        self.properties.remove(name)
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Direct sub-object link by name
    pub fn link(&self, sub: &str) -> Option<ObjId> {
        self.links.get(sub).copied()
    }

    pub fn set_link(&mut self, sub: &str, target: ObjId) {
        self.links.insert(sub.to_string(), target);
    }

    pub fn remove_link(&mut self, sub: &str) -> Option<ObjId> {
        self.links.remove(sub)
    }

    pub fn links(&self) -> impl Iterator<Item = (&str, ObjId)> {
        self.links.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    pub fn set_placement(&mut self, placement: Placement) {
        self.placement = placement;
    }

    /// True if the object is touched: any property touched
    pub fn is_touched(&self) -> bool {
        self.properties.values().any(Property::is_touched)
    }

    /// True while the host is tearing this object down
    pub fn is_pending_remove(&self) -> bool {
        self.pending_remove
    }

    pub fn set_pending_remove(&mut self, pending: bool) {
        self.pending_remove = pending;
    }
}

/// A named document holding objects
#[derive(Debug, Clone)]
pub struct Document {
    id: DocId,
    name: String,
    label: String,
    objects: Vec<DocObject>,
}

impl Document {
    /// Internal identifier, unique within the graph
    pub fn name(&self) -> &str {
        &self.name
    }

    /// User-facing label
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: &str) {
        self.label = label.to_string();
    }

    pub fn id(&self) -> DocId {
        self.id
    }

    /// Add an object; the label defaults to the name
    pub fn add_object(&mut self, name: &str) -> Result<ObjId> {
        self.add_object_labeled(name, name)
    }

    pub fn add_object_labeled(&mut self, name: &str, label: &str) -> Result<ObjId> {
        if self.objects.iter().any(|o| o.name == name) {
            return Err(Error::DuplicateObjectName(name.to_string()));
        }
        self.objects.push(DocObject::new(name, label));
        Ok(ObjId {
            doc: self.id,
            idx: self.objects.len() - 1,
        })
    }

    /// Look up an object by internal name
    pub fn get_object(&self, name: &str) -> Option<ObjId> {
        self.objects
            .iter()
            .position(|o| o.name == name)
            .map(|idx| ObjId { doc: self.id, idx })
    }

    /// Look up an object by label, reporting duplicates
    pub fn get_object_by_label(&self, label: &str) -> LabelMatch<ObjId> {
        let mut found = LabelMatch::None;
        for (idx, obj) in self.objects.iter().enumerate() {
            if obj.label == label {
                match found {
                    LabelMatch::None => {
                        found = LabelMatch::Unique(ObjId { doc: self.id, idx });
                    }
                    _ => return LabelMatch::Ambiguous,
                }
            }
        }
        found
    }

    pub fn object(&self, id: ObjId) -> Option<&DocObject> {
        if id.doc != self.id {
            return None;
        }
        self.objects.get(id.idx)
    }

    pub fn object_mut(&mut self, id: ObjId) -> Option<&mut DocObject> {
        if id.doc != self.id {
            return None;
        }
        self.objects.get_mut(id.idx)
    }

    pub fn objects(&self) -> impl Iterator<Item = (ObjId, &DocObject)> {
        let doc = self.id;
        self.objects
            .iter()
            .enumerate()
            .map(move |(idx, o)| (ObjId { doc, idx }, o))
    }
}

/// The registry of open documents
#[derive(Debug, Clone, Default)]
pub struct DocumentGraph {
    documents: Vec<Document>,
}

impl DocumentGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a document; the label defaults to the name
    pub fn new_document(&mut self, name: &str) -> Result<DocId> {
        self.new_document_labeled(name, name)
    }

    pub fn new_document_labeled(&mut self, name: &str, label: &str) -> Result<DocId> {
        if self.documents.iter().any(|d| d.name == name) {
            return Err(Error::DuplicateDocumentName(name.to_string()));
        }
        let id = DocId(self.documents.len());
        self.documents.push(Document {
            id,
            name: name.to_string(),
            label: label.to_string(),
            objects: Vec::new(),
        });
        Ok(id)
    }

    /// Look up a document by internal name
    pub fn get_document(&self, name: &str) -> Option<DocId> {
        self.documents
            .iter()
            .position(|d| d.name == name)
            .map(DocId)
    }

    /// Look up a document by label, reporting duplicates
    pub fn get_document_by_label(&self, label: &str) -> LabelMatch<DocId> {
        let mut found = LabelMatch::None;
        for doc in &self.documents {
            if doc.label == label {
                match found {
                    LabelMatch::None => found = LabelMatch::Unique(doc.id),
                    _ => return LabelMatch::Ambiguous,
                }
            }
        }
        found
    }

    pub fn document(&self, id: DocId) -> Option<&Document> {
        self.documents.get(id.0)
    }

    pub fn document_mut(&mut self, id: DocId) -> Option<&mut Document> {
        self.documents.get_mut(id.0)
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter()
    }

    pub fn object(&self, id: ObjId) -> Option<&DocObject> {
        self.document(id.doc)?.object(id)
    }

    pub fn object_mut(&mut self, id: ObjId) -> Option<&mut DocObject> {
        self.document_mut(id.doc)?.object_mut(id)
    }

    /// Read a property value
    pub fn property_value(&self, id: ObjId, name: &str) -> Option<&Value> {
        self.object(id)?.property(name).map(Property::value)
    }

    /// Resolve a dot-separated sub-object path from `start`, accumulating
    /// the placement transform along the link chain
    ///
    /// Trailing dots are tolerated (`Part.Body.` addresses the Body link).
    pub fn get_sub_object(&self, start: ObjId, subname: &str) -> Option<(ObjId, Matrix4)> {
        let mut current = start;
        let mut transform = self.object(start)?.placement().to_matrix();
        for part in subname.split('.').filter(|p| !p.is_empty()) {
            let next = self.object(current)?.link(part)?;
            transform = transform * self.object(next)?.placement().to_matrix();
            current = next;
        }
        if current == start {
            None
        } else {
            Some((current, transform))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_graph() -> (DocumentGraph, DocId) {
        let mut graph = DocumentGraph::new();
        let doc = graph.new_document("Model").unwrap();
        let d = graph.document_mut(doc).unwrap();
        let obj = d.add_object("Box").unwrap();
        d.object_mut(obj)
            .unwrap()
            .set_property("Length", Value::from(10.0));
        (graph, doc)
    }

    #[test]
    fn test_lookup_by_name() {
        let (graph, doc) = sample_graph();
        assert_eq!(graph.get_document("Model"), Some(doc));
        assert_eq!(graph.get_document("Nope"), None);

        let d = graph.document(doc).unwrap();
        let obj = d.get_object("Box").unwrap();
        assert_eq!(graph.object(obj).unwrap().name(), "Box");
    }

    #[test]
    fn test_label_ambiguity() {
        let mut graph = DocumentGraph::new();
        graph.new_document_labeled("Doc1", "Foo").unwrap();
        graph.new_document_labeled("Doc2", "Foo").unwrap();
        assert_eq!(graph.get_document_by_label("Foo"), LabelMatch::Ambiguous);
        assert_eq!(graph.get_document_by_label("Bar"), LabelMatch::None);
    }

    #[test]
    fn test_object_label_ambiguity() {
        let mut graph = DocumentGraph::new();
        let doc = graph.new_document("Model").unwrap();
        let d = graph.document_mut(doc).unwrap();
        d.add_object_labeled("Box001", "Crate").unwrap();
        d.add_object_labeled("Box002", "Crate").unwrap();
        assert_eq!(
            graph
                .document(doc)
                .unwrap()
                .get_object_by_label("Crate"),
            LabelMatch::Ambiguous
        );
    }

    #[test]
    fn test_touched_propagation() {
        let (mut graph, doc) = sample_graph();
        let obj = graph.document(doc).unwrap().get_object("Box").unwrap();
        let o = graph.object_mut(obj).unwrap();
        assert!(!o.is_touched());
        o.property_mut("Length").unwrap().touch();
        assert!(graph.object(obj).unwrap().is_touched());
    }

    #[test]
    fn test_sub_object_walk() {
        let mut graph = DocumentGraph::new();
        let doc = graph.new_document("Asm").unwrap();
        let d = graph.document_mut(doc).unwrap();
        let parent = d.add_object("Assembly").unwrap();
        let child = d.add_object("Part1").unwrap();
        d.object_mut(parent).unwrap().set_link("Part1", child);

        let (resolved, _xform) = graph.get_sub_object(parent, "Part1.").unwrap();
        assert_eq!(resolved, child);
        assert!(graph.get_sub_object(parent, "Missing.").is_none());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut graph = DocumentGraph::new();
        graph.new_document("Model").unwrap();
        assert!(graph.new_document("Model").is_err());
    }
}
