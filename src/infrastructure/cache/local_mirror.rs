use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::application::ports::remote_store::Document;

/// In-memory entity mirror serving reads and best-effort writes while the
/// remote store is unreachable. Not durable; durability of the intent lives
/// in the pending queue.
#[derive(Default)]
pub struct LocalMirror {
    collections: RwLock<HashMap<String, HashMap<String, Value>>>,
}

impl LocalMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, collection: &str, id: &str, fields: Value) {
        let mut collections = self.collections.write().unwrap();
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<Document> {
        let collections = self.collections.read().unwrap();
        collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::new(id, fields.clone()))
    }

    pub fn remove(&self, collection: &str, id: &str) -> Option<Value> {
        let mut collections = self.collections.write().unwrap();
        collections.get_mut(collection).and_then(|docs| docs.remove(id))
    }

    pub fn snapshot(&self, collection: &str) -> Vec<Document> {
        let collections = self.collections.read().unwrap();
        collections
            .get(collection)
            .map(|docs| {
                let mut out: Vec<Document> = docs
                    .iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect();
                out.sort_by(|a, b| a.id.cmp(&b.id));
                out
            })
            .unwrap_or_default()
    }

    /// First document whose fields satisfy the predicate, in id order.
    pub fn find<P>(&self, collection: &str, predicate: P) -> Option<Document>
    where
        P: Fn(&Value) -> bool,
    {
        self.snapshot(collection)
            .into_iter()
            .find(|doc| predicate(&doc.fields))
    }

    pub fn len(&self, collection: &str) -> usize {
        let collections = self.collections.read().unwrap();
        collections.get(collection).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_get_remove_roundtrip() {
        let mirror = LocalMirror::new();
        mirror.insert("suppliers", "local-1", json!({"name": "Acme"}));

        let doc = mirror.get("suppliers", "local-1").unwrap();
        assert_eq!(doc.str_field("name"), Some("Acme"));

        mirror.remove("suppliers", "local-1");
        assert!(mirror.get("suppliers", "local-1").is_none());
    }

    #[test]
    fn test_find_matches_in_id_order() {
        let mirror = LocalMirror::new();
        mirror.insert("suppliers", "b", json!({"name": "Acme Sud"}));
        mirror.insert("suppliers", "a", json!({"name": "Acme Nord"}));

        let doc = mirror
            .find("suppliers", |fields| {
                fields["name"].as_str().is_some_and(|n| n.contains("Acme"))
            })
            .unwrap();
        assert_eq!(doc.id, "a");
    }
}
