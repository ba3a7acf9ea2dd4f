//! The variable store behaves like a map of append-only histories.

#![allow(missing_docs)]

use std::collections::HashMap;

use proptest::prelude::*;
use sombra_exec::{Value, VariableStore};

#[derive(Debug, Clone)]
enum StoreOp {
    Set(u8, i64),
    Truncate(u8, usize),
    Delete(u8),
}

fn op_strategy() -> impl Strategy<Value = StoreOp> {
    let name = 0u8..4;
    prop_oneof![
        4 => (name.clone(), any::<i64>()).prop_map(|(n, v)| StoreOp::Set(n, v)),
        1 => (name.clone(), 0usize..4).prop_map(|(n, keep)| StoreOp::Truncate(n, keep)),
        1 => name.prop_map(StoreOp::Delete),
    ]
}

fn var(n: u8) -> String {
    format!("v{n}")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]
    #[test]
    fn store_matches_history_model(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let store = VariableStore::new();
        let mut model: HashMap<String, Vec<Value>> = HashMap::new();

        for op in ops {
            match op {
                StoreOp::Set(n, v) => {
                    store.set(var(n), Value::Int(v));
                    model.entry(var(n)).or_default().push(Value::Int(v));
                    prop_assert_eq!(store.get(&var(n)), Value::Int(v));
                }
                StoreOp::Truncate(n, keep) => {
                    store.truncate(&var(n), keep);
                    if let Some(history) = model.get_mut(&var(n)) {
                        let drop = history.len().saturating_sub(keep);
                        history.drain(..drop);
                    }
                }
                StoreOp::Delete(n) => {
                    prop_assert_eq!(store.delete(&var(n)), model.remove(&var(n)).is_some());
                }
            }
        }

        for n in 0..4u8 {
            let name = var(n);
            let expected = model.get(&name).cloned().unwrap_or_default();
            prop_assert_eq!(store.history(&name), expected.clone());
            prop_assert_eq!(store.num_versions(&name), expected.len());
            prop_assert_eq!(store.get(&name), expected.last().cloned().unwrap_or_default());
            prop_assert_eq!(store.get_version(&name, 0), store.get(&name));
            for version in [i64::MIN, -1, 1, i64::MAX] {
                let index = if version <= 0 {
                    (expected.len() as i128) - 1 + i128::from(version)
                } else {
                    i128::from(version) - 1
                };
                let want = usize::try_from(index)
                    .ok()
                    .and_then(|i| expected.get(i).cloned())
                    .unwrap_or_default();
                prop_assert_eq!(store.get_version(&name, version), want);
            }
            prop_assert_eq!(store.contains(&name), model.contains_key(&name));
        }
    }

    #[test]
    fn truncate_to_one_keeps_latest(values in prop::collection::vec(any::<i64>(), 1..20)) {
        let store = VariableStore::new();
        for v in &values {
            store.set("x", Value::Int(*v));
        }
        store.truncate("x", 1);
        let latest = Value::Int(*values.last().unwrap());
        prop_assert_eq!(store.history("x"), vec![latest.clone()]);
        prop_assert_eq!(store.get("x"), latest);
    }
}
