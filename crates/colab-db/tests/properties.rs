//! Property-based tests for shared lists and their undo history.
//!
//! These tests verify:
//!  - Replaying emitted list changes reconstructs the list content
//!  - apply; undo restores the previous content, redo restores the result
//!  - A compound operation is undone and redone as one unit

use colab_backend::MemoryList;
use colab_db::{ListChange, ListChangeKind, SharedList, UndoableSharedList};
use parking_lot::Mutex;
use proptest::prelude::*;
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone, Debug)]
enum Op {
    Push(i64),
    Insert(usize, i64),
    Set(usize, i64),
    Move(usize, usize),
    Remove(usize),
    RemoveValue(i64),
    RemoveRange(usize, usize),
    PushAll(Vec<i64>),
    Clear,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0i64..10).prop_map(Op::Push),
        3 => (0usize..12, 0i64..10).prop_map(|(i, v)| Op::Insert(i, v)),
        2 => (0usize..12, 0i64..10).prop_map(|(i, v)| Op::Set(i, v)),
        3 => (0usize..12, 0usize..12).prop_map(|(a, b)| Op::Move(a, b)),
        2 => (0usize..12).prop_map(Op::Remove),
        2 => (0i64..10).prop_map(Op::RemoveValue),
        1 => (0usize..12, 0usize..12).prop_map(|(a, b)| Op::RemoveRange(a, b)),
        1 => prop::collection::vec(0i64..10, 0..4).prop_map(Op::PushAll),
        1 => Just(Op::Clear),
    ]
}

/// Indices are taken modulo the current length so most ops hit.
fn apply_op(list: &UndoableSharedList<i64>, op: &Op) {
    let len = list.len();
    let wrap = |i: usize, bound: usize| if bound == 0 { 0 } else { i % bound };
    // Out-of-range results are part of the contract and simply ignored here.
    let _ = match op {
        Op::Push(v) => list.push(v).map(|_| ()),
        Op::Insert(i, v) => list.insert(wrap(*i, len + 1), v).map(|_| ()),
        Op::Set(i, v) => list.set(wrap(*i, len), v).map(|_| ()),
        Op::Move(a, b) => list.move_item(wrap(*a, len), wrap(*b, len)),
        Op::Remove(i) => list.remove(wrap(*i, len)).map(|_| ()),
        Op::RemoveValue(v) => list.remove_value(v).map(|_| ()),
        Op::RemoveRange(a, b) => {
            let (a, b) = (wrap(*a, len + 1), wrap(*b, len + 1));
            list.remove_range(a.min(b), a.max(b)).map(|_| ())
        }
        Op::PushAll(values) => list.push_all(values).map(|_| ()),
        Op::Clear => list.clear(),
    };
}

fn replay(model: &mut Vec<Value>, change: &ListChange<Value>) {
    match change.kind {
        ListChangeKind::Add => {
            let index = change.new_index.expect("add has new_index");
            model.splice(index..index, change.new_values.iter().cloned());
        }
        ListChangeKind::Remove => {
            let index = change.old_index.expect("remove has old_index");
            let removed: Vec<Value> = model
                .drain(index..index + change.old_values.len())
                .collect();
            assert_eq!(removed, change.old_values);
        }
        ListChangeKind::Set => {
            let index = change.new_index.expect("set has new_index");
            assert_eq!(change.old_index, change.new_index);
            for (offset, value) in change.new_values.iter().enumerate() {
                assert_eq!(model[index + offset], change.old_values[offset]);
                model[index + offset] = value.clone();
            }
        }
        ListChangeKind::Move => {
            let from = change.old_index.expect("move has old_index");
            let to = change.new_index.expect("move has new_index");
            assert_eq!(change.old_values, change.new_values);
            let value = model.remove(from);
            assert_eq!(vec![value.clone()], change.old_values);
            model.insert(to, value);
        }
    }
}

fn new_list(initial: &[i64]) -> UndoableSharedList<i64> {
    UndoableSharedList::new(Arc::new(MemoryList::new(
        initial.iter().copied().map(Value::from).collect(),
    )))
}

proptest! {
    #[test]
    fn prop_replaying_changes_reconstructs_content(
        initial in prop::collection::vec(0i64..10, 0..8),
        ops in prop::collection::vec(op_strategy(), 0..30),
    ) {
        let list = new_list(&initial);
        let untyped: SharedList<Value> = list.untracked().cast();
        let mut model = untyped.to_vec();

        let changes = Arc::new(Mutex::new(Vec::new()));
        let c = changes.clone();
        let _sub = untyped.connect(move |change| c.lock().push(change.clone()));

        for op in &ops {
            apply_op(&list, op);
        }
        for change in changes.lock().iter() {
            replay(&mut model, change);
        }
        prop_assert_eq!(model, untyped.to_vec());
    }

    #[test]
    fn prop_undo_redo_round_trip(
        initial in prop::collection::vec(0i64..10, 0..8),
        op in op_strategy(),
    ) {
        let list = new_list(&initial);
        let before = list.to_vec();
        apply_op(&list, &op);
        let after = list.to_vec();

        if list.can_undo() {
            list.undo().unwrap();
            prop_assert_eq!(list.to_vec(), before);
            list.redo().unwrap();
            prop_assert_eq!(list.to_vec(), after);
        } else {
            prop_assert_eq!(after, before);
        }
    }

    #[test]
    fn prop_compound_undo_is_atomic(
        initial in prop::collection::vec(0i64..10, 0..8),
        ops in prop::collection::vec(op_strategy(), 1..10),
    ) {
        let list = new_list(&initial);
        let before = list.to_vec();

        list.begin_compound_operation(true);
        for op in &ops {
            apply_op(&list, op);
        }
        list.end_compound_operation();
        let after = list.to_vec();
        prop_assert!(list.undo_stack_size() <= 1);

        list.undo().unwrap();
        prop_assert_eq!(list.to_vec(), before);
        prop_assert!(!list.can_undo());

        list.redo().unwrap();
        prop_assert_eq!(list.to_vec(), after);
    }

    #[test]
    fn prop_non_undoable_compound_never_reaches_history(
        ops in prop::collection::vec(op_strategy(), 1..10),
    ) {
        let list = new_list(&[1, 2, 3]);
        list.begin_compound_operation(false);
        for op in &ops {
            apply_op(&list, op);
        }
        list.end_compound_operation();
        prop_assert!(!list.can_undo());
        prop_assert!(!list.can_redo());
    }
}

#[test]
fn move_scenario() {
    let list = new_list(&[1, 2, 3]);
    list.move_item(0, 1).unwrap();
    assert_eq!(list.to_vec(), vec![2, 1, 3]);
    list.undo().unwrap();
    assert_eq!(list.to_vec(), vec![1, 2, 3]);
    list.redo().unwrap();
    assert_eq!(list.to_vec(), vec![2, 1, 3]);
}

#[test]
fn compound_changes_can_undo_once() {
    let list = new_list(&[]);
    assert!(!list.can_undo());

    list.begin_compound_operation(true);
    list.push(&1).unwrap();
    list.push(&2).unwrap();
    list.end_compound_operation();
    assert!(list.can_undo());

    list.undo().unwrap();
    assert!(!list.can_undo());
    assert!(list.is_empty());
}
