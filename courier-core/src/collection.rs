//! The in-memory collection model.
//!
//! A collection is an ordered tree of folders and items. The orchestrator
//! receives it already parsed (format normalization and fetching happen
//! upstream), so everything here is plain serde-deserializable data.
//! Items are immutable once a run starts; variable substitution happens in
//! the execution runtime and is reported back on the execution record, it
//! never mutates the tree.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// An ordered tree of items and folders.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Collection {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub children: Vec<Node>,
    /// Collection-level variables, loaded into the collection scope at run
    /// start.
    #[serde(default)]
    pub variables: IndexMap<String, serde_json::Value>,
}

/// A node of the collection tree. Closed sum: either a folder grouping
/// further nodes, or a single schedulable item. Untagged variants are
/// tried in order, so `Item` comes first: it requires a `request` field
/// that folders never carry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Node {
    Item(Item),
    Folder(Folder),
}

/// A named grouping of items and folders. Folder-level scripts run
/// immediately before (pre-request) and after (test) all descendants.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Folder {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub children: Vec<Node>,
    #[serde(default)]
    pub prerequest: Option<Script>,
    #[serde(default)]
    pub test: Option<Script>,
}

/// One schedulable unit: a request descriptor plus optional scripts.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Item {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    pub request: Request,
    #[serde(default)]
    pub prerequest: Option<Script>,
    #[serde(default)]
    pub test: Option<Script>,
}

/// A request descriptor. The url may contain unresolved `{{variable}}`
/// references; the execution runtime substitutes them and reports the
/// request it actually sent.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Request {
    #[serde(default = "Request::default_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

impl Request {
    fn default_method() -> String {
        "GET".into()
    }
}

/// A script attached to an item or folder, executed by the external
/// scripting runtime.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Script {
    pub source: String,
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::Folder(f) => &f.name,
            Node::Item(i) => &i.name,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Node::Folder(f) => f.id.as_deref(),
            Node::Item(i) => i.id.as_deref(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn deserialize_tree() -> eyre::Result<()> {
        let raw = serde_json::json!({
            "name": "sample",
            "children": [
                {
                    "name": "auth",
                    "prerequest": { "source": "token()" },
                    "children": [
                        { "name": "login", "request": { "method": "POST", "url": "{{base}}/login" } }
                    ]
                },
                { "name": "health", "request": { "url": "{{base}}/health" } }
            ]
        });

        let collection: Collection = serde_json::from_value(raw)?;
        assert_eq!(collection.name, "sample");
        assert_eq!(collection.children.len(), 2);

        let Node::Folder(folder) = &collection.children[0] else {
            panic!("expected a folder");
        };
        assert_eq!(folder.name, "auth");
        assert!(folder.prerequest.is_some());
        assert_eq!(folder.children.len(), 1);

        let Node::Item(item) = &collection.children[1] else {
            panic!("expected an item");
        };
        assert_eq!(item.request.method, "GET");
        assert_eq!(item.request.url, "{{base}}/health");
        Ok(())
    }
}
