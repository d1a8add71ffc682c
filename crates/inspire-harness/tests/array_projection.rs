#![forbid(unsafe_code)]

//! Integration tests: array projection windows, entry keys, and frame
//! key disambiguation through full engine renders.

use inspire_core::{ElementNode, Focus, Key, Node};
use inspire_harness::{assert_tree, engine_fixture};
use inspire_ui::{
    AttrSource, FrameKeySpec, KeyFn, Lens, LensFn, SpreadFilter, SpreadSort, SpreadSpec, Valoscope,
};

fn ints(values: impl IntoIterator<Item = i64>) -> Focus {
    Focus::list(values.into_iter().map(Focus::from).collect::<Vec<_>>())
}

fn int_of(focus: &Focus) -> i64 {
    match focus {
        Focus::Int(n) => *n,
        _ => 0,
    }
}

/// Template whose entries render a bare `<row/>` element, so the entry
/// keys become visible in the printed tree.
fn row_template(spread: SpreadSpec) -> Lens {
    Valoscope::new()
        .spread(spread)
        .slot("lens", Lens::Node(ElementNode::new("row").into_node()))
        .into_lens()
}

// ============================================================================
// Window pipeline
// ============================================================================

#[test]
fn window_applies_offset_filter_and_limit_in_order() {
    let (_, engine) = engine_fixture();
    let spread = SpreadSpec::new(AttrSource::value(ints([5, 3, 8, 1])))
        .offset(AttrSource::value(Focus::from(1_i64)))
        .limit(AttrSource::value(Focus::from(2_i64)))
        .filter(SpreadFilter::new("gt_one", |focus| int_of(focus) > 1));
    let spec = Valoscope::new().spread(spread);
    let view = engine.mount(spec.into_lens(), Focus::None);
    assert_tree!(
        view.tree(),
        r#"
        [
          "3"
          "8"
        ]
        "#
    );
}

#[test]
fn entries_observe_the_continuation_offset() {
    let (_, engine) = engine_fixture();
    let probe = LensFn::new("end_offset_probe", |_, cx| {
        Ok(Lens::Focus(
            cx.context().value("end_offset").unwrap_or_default(),
        ))
    });
    let spread = SpreadSpec::new(AttrSource::value(ints([5, 3, 8, 1])))
        .offset(AttrSource::value(Focus::from(1_i64)))
        .limit(AttrSource::value(Focus::from(2_i64)))
        .filter(SpreadFilter::new("gt_one", |focus| int_of(focus) > 1));
    let spec = Valoscope::new()
        .spread(spread)
        .slot("lens", Lens::Call(probe));
    let view = engine.mount(spec.into_lens(), Focus::None);

    // The window consumed source positions 1 and 2; position 3 is where
    // a continuation would resume.
    match view.tree() {
        Node::Fragment(children) => {
            assert_eq!(children.len(), 2);
            assert!(children.iter().all(|child| *child == Node::text("3")));
        }
        other => panic!("expected fragment, got {other:?}"),
    }
}

#[test]
fn single_value_source_projects_as_singleton() {
    let (_, engine) = engine_fixture();
    let spread = SpreadSpec::new(AttrSource::value(Focus::from(7_i64)));
    let view = engine.mount(Valoscope::new().spread(spread).into_lens(), Focus::None);
    assert_tree!(
        view.tree(),
        r#"
        [
          "7"
        ]
        "#
    );
}

// ============================================================================
// Keys and ordering
// ============================================================================

#[test]
fn sort_orders_display_while_keys_follow_source_positions() {
    let (_, engine) = engine_fixture();
    let spread = SpreadSpec::new(AttrSource::value(ints([5, 3, 8])))
        .sort(SpreadSort::new("descending", |left, right| {
            int_of(right).cmp(&int_of(left))
        }));
    let view = engine.mount(row_template(spread), Focus::None);
    assert_tree!(
        view.tree(),
        r#"
        [
          <row key=#2/>
          <row key=#0/>
          <row key=#1/>
        ]
        "#
    );
}

#[test]
fn equal_entries_keep_source_order_under_sort() {
    let (_, engine) = engine_fixture();
    let spread = SpreadSpec::new(AttrSource::value(ints([3, 9, 3])))
        .sort(SpreadSort::new("ascending", |left, right| {
            int_of(left).cmp(&int_of(right))
        }));
    let view = engine.mount(row_template(spread), Focus::None);
    assert_tree!(
        view.tree(),
        r#"
        [
          <row key=#0/>
          <row key=#2/>
          <row key=#1/>
        ]
        "#
    );
}

#[test]
fn reverse_flips_display_order_only() {
    let (_, engine) = engine_fixture();
    let spread = SpreadSpec::new(AttrSource::value(ints([5, 3, 8])))
        .sort(SpreadSort::new("descending", |left, right| {
            int_of(right).cmp(&int_of(left))
        }))
        .reverse(AttrSource::value(Focus::Bool(true)));
    let view = engine.mount(row_template(spread), Focus::None);
    assert_tree!(
        view.tree(),
        r#"
        [
          <row key=#1/>
          <row key=#0/>
          <row key=#2/>
        ]
        "#
    );
}

#[test]
fn resource_entries_key_by_identity() {
    let (store, engine) = engine_fixture();
    let a = store.create_resource("a");
    let b = store.create_resource("b");
    let items = Focus::list([Focus::Resource(a), Focus::Resource(b)]);
    let spread = SpreadSpec::new(AttrSource::value(items));
    let view = engine.mount(row_template(spread), Focus::None);
    assert_tree!(
        view.tree(),
        r#"
        [
          <row key=@a/>
          <row key=@b/>
        ]
        "#
    );
}

// ============================================================================
// Frame key disambiguation
// ============================================================================

#[test]
fn automatic_keys_collide_for_multiple_unfocused_entries() {
    let (_, engine) = engine_fixture();
    let items = Focus::list([Focus::None, Focus::None]);
    let spread = SpreadSpec::new(AttrSource::value(items));
    let view = engine.mount(row_template(spread), Focus::None);

    // Both entries derive the unfocused placeholder key; the duplicate
    // is caught by output validation rather than silently collapsing.
    let tree = view.tree();
    let element = tree.as_element().expect("validation panel");
    assert_eq!(element.prop("kind"), Some(&Focus::text("invalid_element")));
}

#[test]
fn shared_frame_key_disambiguates_unfocused_entries() {
    let (_, engine) = engine_fixture();
    let items = Focus::list([Focus::None, Focus::None]);
    let spread = SpreadSpec::new(AttrSource::value(items))
        .frame_key(FrameKeySpec::Shared("row".into()));
    let view = engine.mount(row_template(spread), Focus::None);
    assert_tree!(
        view.tree(),
        r#"
        [
          <row key=row#0/>
          <row key=row#1/>
        ]
        "#
    );
}

#[test]
fn per_entry_callback_controls_keys() {
    let (_, engine) = engine_fixture();
    let spread = SpreadSpec::new(AttrSource::value(ints([5, 3]))).frame_key(
        FrameKeySpec::PerEntry(KeyFn::new("value_keys", |focus, index| {
            Key::new(format!("v{}-{index}", int_of(focus)))
        })),
    );
    let view = engine.mount(row_template(spread), Focus::None);
    assert_tree!(
        view.tree(),
        r#"
        [
          <row key=v5-0/>
          <row key=v3-1/>
        ]
        "#
    );
}
