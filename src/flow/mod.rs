//! Conversation flow graph: immutable after construction, shared read-only
//! across all requests. Closure (every option target resolves to a real
//! node) is validated once at build time so a dangling reference can never
//! surface as a request-time error.

pub mod catalog;

use std::collections::HashMap;

use thiserror::Error;

use crate::shared::error::SupportError;
use crate::shared::models::OptionView;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowOption {
    pub id: String,
    pub label: String,
    pub next: String,
}

impl FlowOption {
    pub fn new(id: impl Into<String>, label: impl Into<String>, next: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            next: next.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlowNode {
    pub key: String,
    pub message: String,
    pub options: Vec<FlowOption>,
}

impl FlowNode {
    /// A node with no outgoing options ends the guided conversation; the
    /// client is expected to offer the write-to-support affordance.
    pub fn is_terminal(&self) -> bool {
        self.options.is_empty()
    }

    pub fn option_views(&self) -> Vec<OptionView> {
        self.options
            .iter()
            .map(|o| OptionView {
                id: o.id.clone(),
                label: o.label.clone(),
            })
            .collect()
    }
}

/// Raised while building a flow; these are configuration defects, never
/// user-facing errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlowBuildError {
    #[error("duplicate node key '{0}'")]
    DuplicateNode(String),

    #[error("duplicate option id '{option_id}' on node '{node}'")]
    DuplicateOption { node: String, option_id: String },

    #[error("option '{option_id}' on node '{node}' points to missing node '{target}'")]
    DanglingOption {
        node: String,
        option_id: String,
        target: String,
    },

    #[error("entry node '{0}' does not exist")]
    MissingEntry(String),
}

pub struct FlowBuilder {
    entry: String,
    nodes: Vec<FlowNode>,
}

impl FlowBuilder {
    pub fn node(
        mut self,
        key: impl Into<String>,
        message: impl Into<String>,
        options: Vec<FlowOption>,
    ) -> Self {
        self.nodes.push(FlowNode {
            key: key.into(),
            message: message.into(),
            options,
        });
        self
    }

    /// Validates closure and uniqueness, then freezes the graph.
    pub fn build(self) -> Result<Flow, FlowBuildError> {
        let mut nodes: HashMap<String, FlowNode> = HashMap::with_capacity(self.nodes.len());
        for node in self.nodes {
            if nodes.contains_key(&node.key) {
                return Err(FlowBuildError::DuplicateNode(node.key));
            }
            nodes.insert(node.key.clone(), node);
        }

        if !nodes.contains_key(&self.entry) {
            return Err(FlowBuildError::MissingEntry(self.entry));
        }

        for node in nodes.values() {
            let mut seen = Vec::with_capacity(node.options.len());
            for opt in &node.options {
                if seen.contains(&&opt.id) {
                    return Err(FlowBuildError::DuplicateOption {
                        node: node.key.clone(),
                        option_id: opt.id.clone(),
                    });
                }
                seen.push(&opt.id);
                if !nodes.contains_key(&opt.next) {
                    return Err(FlowBuildError::DanglingOption {
                        node: node.key.clone(),
                        option_id: opt.id.clone(),
                        target: opt.next.clone(),
                    });
                }
            }
        }

        Ok(Flow {
            entry: self.entry,
            nodes,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Flow {
    entry: String,
    nodes: HashMap<String, FlowNode>,
}

impl Flow {
    pub fn builder(entry: impl Into<String>) -> FlowBuilder {
        FlowBuilder {
            entry: entry.into(),
            nodes: Vec::new(),
        }
    }

    pub fn entry_node(&self) -> &FlowNode {
        // Guaranteed present by build() validation.
        &self.nodes[&self.entry]
    }

    pub fn node(&self, key: &str) -> Result<&FlowNode, SupportError> {
        self.nodes
            .get(key)
            .ok_or_else(|| SupportError::UnknownState(key.to_string()))
    }

    /// Resolves one option hop; missing option ids are caller mistakes,
    /// while a dangling target would be a configuration defect and cannot
    /// occur on a built flow.
    pub fn resolve_option(&self, key: &str, option_id: &str) -> Result<&FlowNode, SupportError> {
        let node = self.node(key)?;
        let opt = node
            .options
            .iter()
            .find(|o| o.id == option_id)
            .ok_or_else(|| SupportError::InvalidOption {
                state_key: key.to_string(),
                option_id: option_id.to_string(),
            })?;
        self.nodes
            .get(&opt.next)
            .ok_or_else(|| SupportError::Internal(format!("flow option target '{}' missing", opt.next)))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_flow() -> Flow {
        Flow::builder("start")
            .node(
                "start",
                "Hello",
                vec![
                    FlowOption::new("a", "Go to a", "leaf_a"),
                    FlowOption::new("loop", "Stay", "start"),
                ],
            )
            .node("leaf_a", "Done", vec![])
            .build()
            .unwrap()
    }

    #[test]
    fn build_rejects_dangling_option() {
        let err = Flow::builder("start")
            .node("start", "Hello", vec![FlowOption::new("x", "X", "nowhere")])
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            FlowBuildError::DanglingOption {
                node: "start".into(),
                option_id: "x".into(),
                target: "nowhere".into(),
            }
        );
    }

    #[test]
    fn build_rejects_missing_entry() {
        let err = Flow::builder("start").node("other", "Hi", vec![]).build().unwrap_err();
        assert_eq!(err, FlowBuildError::MissingEntry("start".into()));
    }

    #[test]
    fn build_rejects_duplicates() {
        let err = Flow::builder("start")
            .node("start", "Hi", vec![])
            .node("start", "Hi again", vec![])
            .build()
            .unwrap_err();
        assert_eq!(err, FlowBuildError::DuplicateNode("start".into()));

        let err = Flow::builder("start")
            .node(
                "start",
                "Hi",
                vec![
                    FlowOption::new("a", "A", "start"),
                    FlowOption::new("a", "A again", "start"),
                ],
            )
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            FlowBuildError::DuplicateOption { node: "start".into(), option_id: "a".into() }
        );
    }

    #[test]
    fn cycles_are_permitted() {
        let flow = tiny_flow();
        let back = flow.resolve_option("start", "loop").unwrap();
        assert_eq!(back.key, "start");
    }

    #[test]
    fn resolve_option_is_idempotent() {
        let flow = tiny_flow();
        let first = flow.resolve_option("start", "a").unwrap().key.clone();
        let second = flow.resolve_option("start", "a").unwrap().key.clone();
        assert_eq!(first, second);
        assert_eq!(first, "leaf_a");
    }

    #[test]
    fn unknown_state_and_option_are_distinct_errors() {
        let flow = tiny_flow();
        assert!(matches!(
            flow.resolve_option("missing", "a"),
            Err(SupportError::UnknownState(_))
        ));
        assert!(matches!(
            flow.resolve_option("start", "zzz"),
            Err(SupportError::InvalidOption { .. })
        ));
    }

    #[test]
    fn terminal_flag_tracks_empty_options() {
        let flow = tiny_flow();
        assert!(!flow.node("start").unwrap().is_terminal());
        assert!(flow.node("leaf_a").unwrap().is_terminal());
    }
}
