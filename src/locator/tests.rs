// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Triton-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Triton and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::BTreeSet;

use rstest::{fixture, rstest};

use super::*;
use crate::model::TreeBuilder;

/// Program
///   Stmt           [0]
///     Add          [0,0]
///       Num "1"    [0,0,0]
///       Num "2"    [0,0,1]
///   Stmt           [1]
///     Var "x"      [1,0]
#[fixture]
fn tree() -> Tree {
    let mut b = TreeBuilder::new("Program");
    let root = b.root();
    let s0 = b.add_child(root, "Stmt");
    b.set_span(s0, Span::new(0, 5));
    let add = b.add_child(s0, "Add");
    b.set_span(add, Span::new(0, 5));
    let one = b.add_child(add, "Num");
    b.set_span(one, Span::new(0, 1));
    let two = b.add_child(add, "Num");
    b.set_span(two, Span::new(4, 5));
    let s1 = b.add_child(root, "Stmt");
    b.set_span(s1, Span::new(7, 8));
    let x = b.add_child(s1, "Var");
    b.set_span(x, Span::new(7, 8));
    b.finish()
}

/// Same program after `1 + 2` became `(1 + 2) * 3`: the old `Add` path now hits a `Mul`.
#[fixture]
fn edited_tree() -> Tree {
    let mut b = TreeBuilder::new("Program");
    let root = b.root();
    let s0 = b.add_child(root, "Stmt");
    let mul = b.add_child(s0, "Mul");
    let add = b.add_child(mul, "Add");
    b.set_span(add, Span::new(1, 6));
    b.add_child(add, "Num");
    b.add_child(add, "Num");
    b.add_child(mul, "Num");
    let s1 = b.add_child(root, "Stmt");
    b.add_child(s1, "Var");
    b.finish()
}

#[rstest]
fn every_node_round_trips_under_every_strategy(
    tree: Tree,
    #[values(
        RecoveryStrategy::Fail,
        RecoveryStrategy::Parent,
        RecoveryStrategy::Child,
        RecoveryStrategy::ParentThenChild,
        RecoveryStrategy::ChildThenParent
    )]
    strategy: RecoveryStrategy,
) {
    for node in tree.node_ids() {
        let locator = Locator::create(&tree, node).expect("node belongs to tree");
        assert_eq!(locator.resolve(&tree, strategy), Ok(node), "locator {locator}");
    }
}

#[rstest]
fn create_is_deterministic_and_injective(tree: Tree) {
    let mut seen = BTreeSet::new();
    for node in tree.node_ids() {
        let first = Locator::create(&tree, node).expect("locator");
        let second = Locator::create(&tree, node).expect("locator");
        assert_eq!(first, second);
        assert!(seen.insert(first.to_string()), "duplicate locator for {node}");
    }
}

#[rstest]
fn empty_locator_is_root(tree: Tree) {
    let locator = Locator::create(&tree, tree.root()).expect("locator");
    assert!(locator.is_root());
    assert_eq!(locator.to_string(), "/");
    assert_eq!(Locator::root().resolve(&tree, RecoveryStrategy::Fail), Ok(tree.root()));
}

#[rstest]
fn out_of_range_index_fails_without_recovery(tree: Tree) {
    let locator = Locator::new(vec![Step::new("Stmt", 7)]);
    assert_eq!(
        locator.resolve(&tree, RecoveryStrategy::Fail),
        Err(ResolveError::IndexOutOfRange { depth: 0, index: 7, len: 2 })
    );
}

#[rstest]
fn out_of_range_index_recovers_through_siblings(tree: Tree) {
    let locator = Locator::new(vec![Step::new("Stmt", 7)]);
    let resolved = locator.resolve(&tree, RecoveryStrategy::Parent).expect("recovered");
    // Nearest by index distance is the last statement.
    assert_eq!(resolved, tree.child(tree.root(), 1).expect("stmt 1"));
}

#[rstest]
fn child_recovery_cannot_descend_into_missing_child(tree: Tree) {
    let locator = Locator::new(vec![Step::new("Stmt", 7)]);
    assert!(matches!(
        locator.resolve(&tree, RecoveryStrategy::Child),
        Err(ResolveError::NotRecovered { depth: 0, strategy: RecoveryStrategy::Child, .. })
    ));
}

#[rstest]
fn leaf_without_children_fails_cleanly(tree: Tree) {
    let var = tree.child(tree.child(tree.root(), 1).expect("stmt"), 0).expect("var");
    let mut locator = Locator::create(&tree, var).expect("locator");
    locator.steps.push(Step::new("Num", 0));
    for strategy in RecoveryStrategy::ALL {
        assert!(locator.resolve(&tree, strategy).is_err(), "{strategy}");
    }
}

#[rstest]
fn mismatch_under_fail_reports_found_type(tree: Tree, edited_tree: Tree) {
    let add = tree.child(tree.child(tree.root(), 0).expect("stmt"), 0).expect("add");
    let locator = Locator::create(&tree, add).expect("locator");
    assert_eq!(
        locator.resolve(&edited_tree, RecoveryStrategy::Fail),
        Err(ResolveError::TypeMismatch {
            depth: 1,
            expected: "Add".to_owned(),
            found: "Mul".to_owned(),
        })
    );
}

#[rstest]
fn child_recovery_finds_wrapped_node(tree: Tree, edited_tree: Tree) {
    let add = tree.child(tree.child(tree.root(), 0).expect("stmt"), 0).expect("add");
    let locator = Locator::create(&tree, add).expect("locator");

    let resolved = locator.resolve(&edited_tree, RecoveryStrategy::Child).expect("recovered");
    assert_eq!(edited_tree.type_name(resolved), Some("Add"));

    // Parent-first has no `Add` sibling to offer and falls through to the subtree.
    let fallback =
        locator.resolve(&edited_tree, RecoveryStrategy::ParentThenChild).expect("recovered");
    assert_eq!(fallback, resolved);

    assert!(matches!(
        locator.resolve(&edited_tree, RecoveryStrategy::Parent),
        Err(ResolveError::NotRecovered { depth: 1, .. })
    ));
}

#[rstest]
fn recovery_continues_below_recovered_node(tree: Tree, edited_tree: Tree) {
    let add = tree.child(tree.child(tree.root(), 0).expect("stmt"), 0).expect("add");
    let second_num = tree.child(add, 1).expect("num");
    let locator = Locator::create(&tree, second_num).expect("locator");

    let resolved = locator.resolve(&edited_tree, RecoveryStrategy::Child).expect("recovered");
    assert_eq!(edited_tree.type_name(resolved), Some("Num"));
    let parent = edited_tree.parent(resolved).expect("parent");
    assert_eq!(edited_tree.type_name(parent), Some("Add"));
    assert_eq!(edited_tree.node(resolved).expect("node").index_in_parent(), 1);
}

#[rstest]
fn recovery_is_idempotent(tree: Tree, edited_tree: Tree) {
    for node in tree.node_ids() {
        let locator = Locator::create(&tree, node).expect("locator");
        for strategy in RecoveryStrategy::ALL {
            let first = locator.resolve(&edited_tree, strategy);
            for _ in 0..3 {
                assert_eq!(locator.resolve(&edited_tree, strategy), first);
            }
        }
    }
}

#[test]
fn sibling_search_prefers_span_then_distance() {
    let mut b = TreeBuilder::new("List");
    let root = b.root();
    let a = b.add_child(root, "Item");
    b.set_span(a, Span::new(0, 1));
    b.add_child(root, "Sep");
    let c = b.add_child(root, "Item");
    b.set_span(c, Span::new(4, 5));
    b.add_child(root, "Sep");
    let e = b.add_child(root, "Item");
    b.set_span(e, Span::new(8, 9));
    let tree = b.finish();

    // Index 1 is a `Sep`; items at 0 and 2 are equally far, lower index wins.
    let by_distance = Locator::new(vec![Step::new("Item", 1)]);
    assert_eq!(by_distance.resolve(&tree, RecoveryStrategy::Parent), Ok(a));

    // A recorded span overrides distance.
    let by_span = Locator::new(vec![Step::new("Item", 1).with_span(Span::new(8, 9))]);
    assert_eq!(by_span.resolve(&tree, RecoveryStrategy::Parent), Ok(e));

    // Unknown span falls back to distance again.
    let stale_span = Locator::new(vec![Step::new("Item", 3).with_span(Span::new(40, 41))]);
    assert_eq!(stale_span.resolve(&tree, RecoveryStrategy::Parent), Ok(c));
}

#[test]
fn wire_form_uses_camel_case_steps() {
    let locator = Locator::new(vec![
        Step::new("Stmt", 0),
        Step::new("Add", 1).with_span(Span::new(2, 9)),
    ]);
    let json = serde_json::to_value(&locator).expect("serialize");
    assert_eq!(
        json,
        serde_json::json!({
            "steps": [
                { "typeName": "Stmt", "childIndex": 0 },
                { "typeName": "Add", "childIndex": 1, "span": { "start": 2, "end": 9 } },
            ]
        })
    );
    let back: Locator = serde_json::from_value(json).expect("deserialize");
    assert_eq!(back, locator);

    let root: Locator = serde_json::from_str("{}").expect("deserialize root");
    assert!(root.is_root());
}

#[test]
fn strategy_names_parse_and_print() {
    for strategy in RecoveryStrategy::ALL {
        assert_eq!(strategy.to_string().parse::<RecoveryStrategy>(), Ok(strategy));
        let json = serde_json::to_string(&strategy).expect("serialize");
        assert_eq!(json, format!("\"{strategy}\""));
    }
    assert!("sideways".parse::<RecoveryStrategy>().is_err());
}
