use std::collections::BTreeMap;

use serde_json::{Map, Value};

use stixgen_core::{GenerationError, Result};

/// A graph of generated objects: an id→object map plus a type→ids index for
/// fast typed lookup, maintained together.  The graph is the sole owner of
/// its objects.  Objects inserted after construction are tracked as "new"
/// content, distinguishing them from a pre-existing base so that callers
/// bridging into a richer object model only convert fresh nodes.
#[derive(Debug, Clone, Default)]
pub struct ObjectGraph {
    by_id: BTreeMap<String, Map<String, Value>>,
    by_type: BTreeMap<String, Vec<String>>,
    new_ids: Vec<String>,
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from pre-existing objects.  None of them are counted as
    /// new content.
    pub fn from_objects(objects: impl IntoIterator<Item = Value>) -> Result<Self> {
        let mut graph = Self::new();
        for object in objects {
            match object {
                Value::Object(map) => {
                    graph.index_object(map)?;
                }
                _ => {
                    return Err(GenerationError::invalid_spec(
                        "pre-existing graph entries must be JSON objects",
                    ));
                }
            }
        }
        Ok(graph)
    }

    fn index_object(&mut self, object: Map<String, Value>) -> Result<String> {
        let id = object
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| GenerationError::invalid_spec("graph object has no \"id\" property"))?
            .to_string();
        let object_type = object
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| GenerationError::invalid_spec("graph object has no \"type\" property"))?
            .to_string();

        if self.by_id.insert(id.clone(), object).is_none() {
            self.by_type.entry(object_type).or_default().push(id.clone());
        }
        Ok(id)
    }

    /// Insert a generated object, indexing it by id and type.  Returns the
    /// object's id.
    pub fn insert(&mut self, object: Map<String, Value>) -> Result<String> {
        let id = self.index_object(object)?;
        self.new_ids.push(id.clone());
        Ok(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Map<String, Value>> {
        self.by_id.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Map<String, Value>> {
        self.by_id.get_mut(id)
    }

    /// Ids of all objects of the given type, in insertion order.
    pub fn ids_of_type(&self, object_type: &str) -> &[String] {
        self.by_type
            .get(object_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn has_type(&self, object_type: &str) -> bool {
        !self.ids_of_type(object_type).is_empty()
    }

    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.by_type.keys().map(String::as_str)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.by_id.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Map<String, Value>)> {
        self.by_id.iter().map(|(id, obj)| (id.as_str(), obj))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Ids of objects inserted since construction, in insertion order.
    pub fn new_ids(&self) -> &[String] {
        &self.new_ids
    }

    /// Consume the graph into a plain id→object JSON mapping.
    pub fn into_objects_map(self) -> Map<String, Value> {
        self.by_id
            .into_iter()
            .map(|(id, obj)| (id, Value::Object(obj)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(id: &str, object_type: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("id".to_string(), json!(id));
        map.insert("type".to_string(), json!(object_type));
        map
    }

    #[test]
    fn insert_indexes_by_type() {
        let mut graph = ObjectGraph::new();
        graph.insert(object("malware--1", "malware")).unwrap();
        graph.insert(object("malware--2", "malware")).unwrap();
        graph.insert(object("tool--1", "tool")).unwrap();

        assert_eq!(graph.ids_of_type("malware").len(), 2);
        assert_eq!(graph.ids_of_type("tool"), ["tool--1".to_string()]);
        assert!(graph.ids_of_type("identity").is_empty());
        assert_eq!(graph.new_ids().len(), 3);
    }

    #[test]
    fn preexisting_objects_are_not_new_content() {
        let mut graph = ObjectGraph::from_objects(vec![
            json!({"id": "tool--1", "type": "tool"}),
        ])
        .unwrap();
        assert!(graph.new_ids().is_empty());

        graph.insert(object("malware--1", "malware")).unwrap();
        assert_eq!(graph.new_ids(), ["malware--1".to_string()]);
    }

    #[test]
    fn reinsert_does_not_duplicate_type_index() {
        let mut graph = ObjectGraph::new();
        graph.insert(object("tool--1", "tool")).unwrap();
        graph.insert(object("tool--1", "tool")).unwrap();
        assert_eq!(graph.ids_of_type("tool").len(), 1);
    }

    #[test]
    fn entries_must_be_identified_objects() {
        assert!(ObjectGraph::from_objects(vec![json!("nope")]).is_err());
        assert!(ObjectGraph::from_objects(vec![json!({"type": "tool"})]).is_err());
    }
}
