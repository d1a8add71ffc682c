#![forbid(unsafe_code)]

//! The renderable element tree handed to a view backend.
//!
//! A [`Node`] is the engine's entire output contract: a leaf value, an
//! opaque element descriptor with tag, props, stable key and children, or a
//! fragment of siblings. No concrete view library is assumed beyond that
//! shape.
//!
//! # Invariants
//!
//! 1. **Keyed siblings**: every element that is a direct child of a fragment
//!    carries a [`Key`], and sibling keys are unique. [`validate`] enforces
//!    this before a tree ever reaches the backend.
//!
//! 2. **Empty is handled**: [`Node::Empty`] means "render nothing, on
//!    purpose". It is a valid terminal, distinct from a resolution that found
//!    no handler at all.

use std::fmt;
use std::rc::Rc;

use crate::focus::Focus;
use crate::key::Key;

/// One node of the output tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Node {
    /// Render nothing; a deliberate, handled result.
    #[default]
    Empty,
    /// Plain text content.
    Text(Rc<str>),
    /// An element descriptor: tag, props, optional key, children.
    Element(Rc<ElementNode>),
    /// A sequence of siblings.
    Fragment(Rc<[Node]>),
}

impl Node {
    #[must_use]
    pub fn text(s: impl Into<Rc<str>>) -> Self {
        Self::Text(s.into())
    }

    #[must_use]
    pub fn fragment(children: impl Into<Rc<[Node]>>) -> Self {
        Self::Fragment(children.into())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// The element payload, if this node is one.
    #[must_use]
    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            Self::Element(el) => Some(el),
            _ => None,
        }
    }
}

/// Opaque element descriptor.
///
/// Props preserve recording order; [`ElementNode::prop`] is a linear scan,
/// which is fine at the handful-of-props scale elements actually have.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementNode {
    pub tag: Rc<str>,
    pub key: Option<Key>,
    pub props: Vec<(Rc<str>, Focus)>,
    pub children: Vec<Node>,
}

impl ElementNode {
    #[must_use]
    pub fn new(tag: impl Into<Rc<str>>) -> Self {
        Self {
            tag: tag.into(),
            key: None,
            props: Vec::new(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: Key) -> Self {
        self.key = Some(key);
        self
    }

    /// Set a prop, replacing an earlier recording under the same name.
    #[must_use]
    pub fn with_prop(mut self, name: impl Into<Rc<str>>, value: Focus) -> Self {
        self.set_prop(name, value);
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn set_prop(&mut self, name: impl Into<Rc<str>>, value: Focus) {
        let name = name.into();
        if let Some(slot) = self.props.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.props.push((name, value));
        }
    }

    #[must_use]
    pub fn prop(&self, name: &str) -> Option<&Focus> {
        self.props
            .iter()
            .find(|(n, _)| n.as_ref() == name)
            .map(|(_, v)| v)
    }

    #[must_use]
    pub fn into_node(self) -> Node {
        Node::Element(Rc::new(self))
    }
}

/// Structural fault found while validating an output tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeFault {
    #[error("element <{tag}> at fragment position {position} has no key")]
    MissingKey { tag: String, position: usize },
    #[error("duplicate sibling key '{key}'")]
    DuplicateKey { key: Key },
}

/// Walk `node` and collect every structural fault.
///
/// Errors rather than silently forwarding a malformed tree; the render
/// pipeline redirects a faulted tree to its invalid-element role instead of
/// letting the backend fail opaquely.
pub fn validate(node: &Node) -> Result<(), Vec<NodeFault>> {
    let mut faults = Vec::new();
    walk(node, &mut faults);
    if faults.is_empty() { Ok(()) } else { Err(faults) }
}

fn walk(node: &Node, faults: &mut Vec<NodeFault>) {
    match node {
        Node::Empty | Node::Text(_) => {}
        Node::Element(el) => {
            check_siblings(&el.children, faults);
        }
        Node::Fragment(children) => {
            check_siblings(children, faults);
        }
    }
}

fn check_siblings(children: &[Node], faults: &mut Vec<NodeFault>) {
    let mut seen: Vec<&Key> = Vec::new();
    for (position, child) in children.iter().enumerate() {
        if let Node::Element(el) = child {
            match &el.key {
                None => faults.push(NodeFault::MissingKey {
                    tag: el.tag.to_string(),
                    position,
                }),
                Some(key) => {
                    if seen.contains(&key) {
                        faults.push(NodeFault::DuplicateKey { key: key.clone() });
                    } else {
                        seen.push(key);
                    }
                }
            }
        }
        walk(child, faults);
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Text(t) => f.write_str(t),
            Self::Element(el) => {
                write!(f, "<{}", el.tag)?;
                if let Some(key) = &el.key {
                    write!(f, " key={key}")?;
                }
                f.write_str(">")
            }
            Self::Fragment(children) => write!(f, "fragment({})", children.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed(tag: &str, key: &str) -> Node {
        ElementNode::new(tag).with_key(Key::new(key)).into_node()
    }

    #[test]
    fn leaf_nodes_are_valid() {
        assert!(validate(&Node::Empty).is_ok());
        assert!(validate(&Node::text("hi")).is_ok());
    }

    #[test]
    fn unkeyed_element_outside_fragment_is_valid() {
        let node = ElementNode::new("div")
            .with_child(Node::text("x"))
            .into_node();
        assert!(validate(&node).is_ok());
    }

    #[test]
    fn unkeyed_element_in_fragment_faults() {
        let node = Node::fragment(vec![ElementNode::new("li").into_node()]);
        let faults = validate(&node).unwrap_err();
        assert_eq!(
            faults,
            vec![NodeFault::MissingKey {
                tag: "li".into(),
                position: 0,
            }]
        );
    }

    #[test]
    fn duplicate_sibling_keys_fault() {
        let node = Node::fragment(vec![keyed("li", "a"), keyed("li", "a")]);
        let faults = validate(&node).unwrap_err();
        assert_eq!(
            faults,
            vec![NodeFault::DuplicateKey { key: Key::new("a") }]
        );
    }

    #[test]
    fn nested_fragments_check_their_own_siblings() {
        let inner = Node::fragment(vec![keyed("li", "a"), keyed("li", "b")]);
        let outer = Node::fragment(vec![keyed("ul", "a"), inner]);
        assert!(validate(&outer).is_ok());
    }

    #[test]
    fn faults_are_collected_not_short_circuited() {
        let node = Node::fragment(vec![
            ElementNode::new("li").into_node(),
            keyed("li", "a"),
            keyed("li", "a"),
        ]);
        let faults = validate(&node).unwrap_err();
        assert_eq!(faults.len(), 2);
    }

    #[test]
    fn set_prop_replaces_by_name() {
        let mut el = ElementNode::new("div");
        el.set_prop("class", Focus::text("one"));
        el.set_prop("class", Focus::text("two"));
        assert_eq!(el.props.len(), 1);
        assert_eq!(el.prop("class"), Some(&Focus::text("two")));
    }
}
