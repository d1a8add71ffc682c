#![forbid(unsafe_code)]

//! Test harness for Inspire: a deterministic tree printer, shared
//! fixtures, and probes for the engine's integration suites.
//!
//! The printer renders a [`Node`] tree as indented text so tests can
//! compare whole trees as strings with [`assert_tree!`]. Probes count
//! observable side effects: scope resource releases and lens function
//! invocations.

use std::cell::Cell;
use std::fmt::Write as _;
use std::rc::Rc;

use inspire_core::{Focus, Node};
use inspire_store::MemoryStore;
use inspire_ui::{Engine, Lens, LensFn, RenderPolicy, ScopeResource};

// ---------------------------------------------------------------------------
// Tree printing
// ---------------------------------------------------------------------------

/// Render a node tree as indented text, one node per line.
///
/// Deterministic: props print in their stored order and keys print next
/// to tags, so trees compare as plain strings.
#[must_use]
pub fn render_text(node: &Node) -> String {
    let mut out = String::new();
    write_node(&mut out, node, 0);
    out
}

fn write_node(out: &mut String, node: &Node, depth: usize) {
    let pad = "  ".repeat(depth);
    match node {
        Node::Empty => {
            let _ = writeln!(out, "{pad}(empty)");
        }
        Node::Text(text) => {
            let _ = writeln!(out, "{pad}\"{text}\"");
        }
        Node::Element(element) => {
            let mut line = format!("{pad}<{}", element.tag);
            if let Some(key) = &element.key {
                let _ = write!(line, " key={key}");
            }
            for (name, value) in &element.props {
                let _ = write!(line, " {name}={}", prop_text(value));
            }
            if element.children.is_empty() {
                let _ = writeln!(out, "{line}/>");
            } else {
                let _ = writeln!(out, "{line}>");
                for child in &element.children {
                    write_node(out, child, depth + 1);
                }
                let _ = writeln!(out, "{pad}</{}>", element.tag);
            }
        }
        Node::Fragment(children) => {
            let _ = writeln!(out, "{pad}[");
            for child in children.iter() {
                write_node(out, child, depth + 1);
            }
            let _ = writeln!(out, "{pad}]");
        }
    }
}

fn prop_text(value: &Focus) -> String {
    match value {
        Focus::Text(text) => format!("\"{text}\""),
        other => other.to_string(),
    }
}

/// Strip the common leading indentation of every non-empty line, so
/// expected trees can be written as indented raw strings in tests.
#[must_use]
pub fn dedent(text: &str) -> String {
    let indent = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);
    let mut out = String::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let _ = writeln!(out, "{}", &line[indent.min(line.len())..]);
    }
    out
}

/// Assert a rendered tree matches an expected layout, comparing the
/// printed forms after dedenting the expectation.
#[macro_export]
macro_rules! assert_tree {
    ($node:expr, $expected:expr $(,)?) => {{
        let rendered = $crate::render_text(&$node);
        let expected = $crate::dedent($expected);
        assert_eq!(
            rendered.trim_end(),
            expected.trim_end(),
            "\n-- rendered --\n{rendered}\n-- expected --\n{expected}",
        );
    }};
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Engine over a fresh in-memory store with default guard limits.
#[must_use]
pub fn engine_fixture() -> (MemoryStore, Engine) {
    let store = MemoryStore::new();
    let engine = engine_over(&store, RenderPolicy::default());
    (store, engine)
}

/// Engine sharing `store`, with explicit guard limits.
///
/// # Panics
///
/// Panics if the standard vocabulary fails to build, which would be a
/// programming error in `inspire-ui`.
#[must_use]
pub fn engine_over(store: &MemoryStore, policy: RenderPolicy) -> Engine {
    match Engine::new(Rc::new(store.clone()), policy) {
        Ok(engine) => engine,
        Err(err) => panic!("engine construction failed: {err}"),
    }
}

// ---------------------------------------------------------------------------
// Probes
// ---------------------------------------------------------------------------

/// Scope resource that counts how many times it is released.
pub struct ReleaseProbe {
    releases: Rc<Cell<u32>>,
}

impl ReleaseProbe {
    /// The probe plus the shared release counter.
    #[must_use]
    pub fn new() -> (Rc<Self>, Rc<Cell<u32>>) {
        let releases = Rc::new(Cell::new(0));
        let probe = Rc::new(Self {
            releases: Rc::clone(&releases),
        });
        (probe, releases)
    }
}

impl ScopeResource for ReleaseProbe {
    fn release(&self) {
        self.releases.set(self.releases.get() + 1);
    }

    fn label(&self) -> &str {
        "release probe"
    }
}

/// A lens function that counts invocations before delegating to a
/// fixed result. Returns the lens and the shared call counter.
#[must_use]
pub fn counting_lens(name: &'static str, result: Lens) -> (Lens, Rc<Cell<u32>>) {
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let lens = Lens::Call(LensFn::new(name, move |_, _| {
        counter.set(counter.get() + 1);
        Ok(result.clone())
    }));
    (lens, calls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use inspire_core::ElementNode;

    #[test]
    fn render_text_prints_elements_with_keys_and_props() {
        let node = ElementNode::new("panel")
            .with_key("item".into())
            .with_prop("class", Focus::text("wide"))
            .with_child(Node::text("body"))
            .into_node();
        assert_eq!(
            render_text(&node),
            "<panel key=item class=\"wide\">\n  \"body\"\n</panel>\n"
        );
    }

    #[test]
    fn dedent_strips_common_indentation() {
        let text = "\n            [\n              \"a\"\n            ]\n";
        assert_eq!(dedent(text), "[\n  \"a\"\n]\n");
    }

    #[test]
    fn counting_lens_reports_calls() {
        let (lens, calls) = counting_lens("probe", Lens::text("x"));
        let (_, engine) = engine_fixture();
        let view = engine.mount(lens, Focus::None);
        assert_eq!(view.tree(), Node::text("x"));
        assert_eq!(calls.get(), 1);
    }
}
