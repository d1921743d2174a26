//! Property-based tests for ConnectionRegistry
//!
//! Random add/remove/join sequences are checked against a plain map model.

use std::collections::HashMap;

use proptest::prelude::*;
use relay_core::{ConnectionId, ConnectionRegistry, RegistryError};

#[derive(Debug, Clone)]
enum Op {
    Add(u64),
    Remove(u64),
    Join(u64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u64..12).prop_map(Op::Add),
        (0u64..12).prop_map(Op::Remove),
        (0u64..12).prop_map(Op::Join),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: Registry agrees with the model after every operation
    #[test]
    fn prop_registry_matches_model(
        capacity in 0usize..6,
        ops in prop::collection::vec(op(), 0..64),
    ) {
        let mut registry = ConnectionRegistry::new(capacity, 1023);
        // id -> joined
        let mut model: HashMap<u64, bool> = HashMap::new();

        for op in ops {
            match op {
                Op::Add(id) => {
                    let result = registry.add(ConnectionId(id), None);
                    if model.contains_key(&id) {
                        prop_assert_eq!(result, Err(RegistryError::Duplicate(ConnectionId(id))));
                    } else if model.len() == capacity {
                        prop_assert_eq!(result, Err(RegistryError::Full { capacity }));
                    } else {
                        let slot = result?;
                        prop_assert!(slot < capacity);
                        model.insert(id, false);
                    }
                },
                Op::Remove(id) => {
                    let removed = registry.remove(ConnectionId(id));
                    prop_assert_eq!(removed.is_some(), model.remove(&id).is_some());
                },
                Op::Join(id) => {
                    let result = registry.mark_member(ConnectionId(id), format!("user{id}"));
                    match model.get_mut(&id) {
                        None => {
                            prop_assert_eq!(result, Err(RegistryError::UnknownConnection(ConnectionId(id))));
                        },
                        Some(true) => {
                            prop_assert_eq!(result, Err(RegistryError::AlreadyMember(ConnectionId(id))));
                        },
                        Some(joined) => {
                            prop_assert_eq!(result, Ok(()));
                            *joined = true;
                        },
                    }
                },
            }

            prop_assert_eq!(registry.len(), model.len());
            prop_assert!(registry.len() <= registry.capacity());
            prop_assert_eq!(registry.is_full(), model.len() == capacity);
            prop_assert_eq!(registry.member_count(), model.values().filter(|j| **j).count());
            for (id, joined) in &model {
                let conn = registry.get(ConnectionId(*id));
                prop_assert!(conn.is_some());
                prop_assert_eq!(conn.map(|c| c.is_member()), Some(*joined));
            }
        }
    }

    /// Property: Live connections never share a slot
    #[test]
    fn prop_slots_are_unique(
        ops in prop::collection::vec(op(), 0..64),
    ) {
        let mut registry = ConnectionRegistry::new(4, 1023);

        for op in ops {
            match op {
                Op::Add(id) => { let _ = registry.add(ConnectionId(id), None); },
                Op::Remove(id) => { registry.remove(ConnectionId(id)); },
                Op::Join(id) => { let _ = registry.mark_member(ConnectionId(id), "x".to_string()); },
            }

            let mut slots: Vec<usize> = registry
                .connections()
                .filter_map(|c| registry.slot_of(c.id()))
                .collect();
            let total = slots.len();
            slots.sort_unstable();
            slots.dedup();
            prop_assert_eq!(slots.len(), total);
            prop_assert_eq!(total, registry.len());
        }
    }
}
