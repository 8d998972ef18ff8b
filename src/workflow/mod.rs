//! Workflow graph definitions loaded from disk.
//!
//! A workflow is a JSON object keyed by node id, each node carrying an
//! `inputs` object. Files exported with a top-level `"nodes"` wrapper are
//! accepted as well; the document is submitted in whichever shape it was
//! loaded.
use std::path::Path;

use serde_json::{Map, Value};
use tokio::fs;

use crate::config::ImageSlots;
use crate::error::{AppError, AppResult};

const NODES_KEY: &str = "nodes";

#[derive(Debug, Clone, PartialEq)]
pub struct Workflow {
    document: Value,
}

impl Workflow {
    /// Read and parse a workflow file. Every call returns an independent copy.
    pub async fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        let content = fs::read_to_string(path)
            .await
            .map_err(|source| AppError::WorkflowIo { path: shown.clone(), source })?;
        let document: Value = serde_json::from_str(&content)
            .map_err(|source| AppError::WorkflowParse { path: shown.clone(), source })?;
        tracing::debug!(path = %shown, "Loaded workflow");
        Self::from_value(document).map_err(|_| AppError::WorkflowShape(shown))
    }

    pub fn from_value(document: Value) -> AppResult<Self> {
        let is_graph = match document.get(NODES_KEY) {
            Some(nodes) => nodes.is_object(),
            None => document.is_object(),
        };
        if !is_graph {
            return Err(AppError::WorkflowShape("<inline>".to_string()));
        }
        Ok(Workflow { document })
    }

    fn nodes(&self) -> Option<&Map<String, Value>> {
        self.document
            .get(NODES_KEY)
            .unwrap_or(&self.document)
            .as_object()
    }

    fn nodes_mut(&mut self) -> Option<&mut Map<String, Value>> {
        if self.document.get(NODES_KEY).is_some() {
            self.document.get_mut(NODES_KEY).and_then(Value::as_object_mut)
        } else {
            self.document.as_object_mut()
        }
    }

    pub fn has_node(&self, node_id: &str) -> bool {
        self.nodes().map_or(false, |nodes| nodes.contains_key(node_id))
    }

    pub fn node_input(&self, node_id: &str, input: &str) -> Option<&Value> {
        self.nodes()?.get(node_id)?.get("inputs")?.get(input)
    }

    /// Overwrite `inputs.<input>` on a node, creating the `inputs` object if
    /// the node has none.
    pub fn set_node_input(&mut self, node_id: &str, input: &str, value: Value) -> AppResult<()> {
        let node = self
            .nodes_mut()
            .and_then(|nodes| nodes.get_mut(node_id))
            .and_then(Value::as_object_mut)
            .ok_or_else(|| AppError::MissingNode(node_id.to_string()))?;
        let inputs = node
            .entry("inputs")
            .or_insert_with(|| Value::Object(Map::new()));
        if !inputs.is_object() {
            *inputs = Value::Object(Map::new());
        }
        if let Value::Object(map) = inputs {
            map.insert(input.to_string(), value);
        }
        Ok(())
    }

    /// Point both image slots at the backend-assigned asset names.
    pub fn set_image_slots(&mut self, slots: &ImageSlots, original: &str, replacement: &str) -> AppResult<()> {
        self.set_node_input(&slots.original.to_string(), "image", Value::String(original.to_string()))?;
        self.set_node_input(&slots.replacement.to_string(), "image", Value::String(replacement.to_string()))
    }

    pub fn document(&self) -> &Value {
        &self.document
    }
}
