//! Property tests for the symbol registry.
//!
//! Applies random sequences of add/remove operations across a pool of
//! sessions against a naive model and checks that the registry's active
//! set always equals the union of what the sessions hold.

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;

use stream_relay::{SessionId, SymbolRegistry};

#[derive(Debug, Clone)]
enum Op {
    Add { session: usize, symbol: String },
    Remove { session: usize, symbol: String },
    Release { session: usize },
}

const SESSIONS: usize = 4;

fn symbol_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "AAPL".to_string(),
        "MSFT".to_string(),
        "GOOG".to_string(),
        "TSLA".to_string(),
        "NVDA".to_string(),
    ])
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..SESSIONS, symbol_strategy()).prop_map(|(session, symbol)| Op::Add { session, symbol }),
        (0..SESSIONS, symbol_strategy())
            .prop_map(|(session, symbol)| Op::Remove { session, symbol }),
        (0..SESSIONS).prop_map(|session| Op::Release { session }),
    ]
}

proptest! {
    #[test]
    fn active_set_is_union_of_session_holdings(ops in prop::collection::vec(op_strategy(), 0..64)) {
        let sessions: Vec<SessionId> = (0..SESSIONS).map(|_| SessionId::generate()).collect();
        let mut registry = SymbolRegistry::new();
        let mut model: HashMap<usize, HashSet<String>> = HashMap::new();

        for op in ops {
            match op {
                Op::Add { session, symbol } => {
                    registry.add_dependent(sessions[session], &symbol);
                    model.entry(session).or_default().insert(symbol);
                }
                Op::Remove { session, symbol } => {
                    registry.remove_dependent(sessions[session], &symbol);
                    model.entry(session).or_default().remove(&symbol);
                }
                Op::Release { session } => {
                    for symbol in model.entry(session).or_default().drain() {
                        registry.remove_dependent(sessions[session], &symbol);
                    }
                }
            }

            let mut expected: Vec<String> = model
                .values()
                .flatten()
                .cloned()
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            expected.sort();

            prop_assert_eq!(registry.active_symbols(), expected);
            prop_assert_eq!(registry.is_empty(), model.values().all(HashSet::is_empty));
        }
    }

    #[test]
    fn refcount_matches_holder_count(ops in prop::collection::vec(op_strategy(), 0..64)) {
        let sessions: Vec<SessionId> = (0..SESSIONS).map(|_| SessionId::generate()).collect();
        let mut registry = SymbolRegistry::new();
        let mut model: HashMap<usize, HashSet<String>> = HashMap::new();

        for op in ops {
            match op {
                Op::Add { session, symbol } => {
                    registry.add_dependent(sessions[session], &symbol);
                    model.entry(session).or_default().insert(symbol);
                }
                Op::Remove { session, symbol } => {
                    registry.remove_dependent(sessions[session], &symbol);
                    model.entry(session).or_default().remove(&symbol);
                }
                Op::Release { session } => {
                    for symbol in model.entry(session).or_default().drain() {
                        registry.remove_dependent(sessions[session], &symbol);
                    }
                }
            }
        }

        for symbol in ["AAPL", "MSFT", "GOOG", "TSLA", "NVDA"] {
            let holders = model.values().filter(|set| set.contains(symbol)).count();
            prop_assert_eq!(registry.refcount(symbol), holders);
            prop_assert_eq!(registry.is_active(symbol), holders > 0);
        }
    }
}
