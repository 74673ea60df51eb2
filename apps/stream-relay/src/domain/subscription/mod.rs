//! Subscription Registry Types
//!
//! Domain types for reference-counting symbol subscriptions across viewer
//! sessions. A symbol is subscribed upstream exactly while at least one
//! session depends on it.
//!
//! # Design
//!
//! The registry tracks, per symbol, the set of sessions that currently
//! depend on it. The reference count is the size of that set, which makes
//! re-adding an already-held (session, symbol) pair a natural no-op. The
//! registry itself is plain state; serialization of mutations and the
//! resulting upstream calls live in the application layer.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

// =============================================================================
// Types
// =============================================================================

/// A symbol string (stock ticker, e.g. "AAPL").
pub type Symbol = String;

/// Unique identifier for a downstream viewer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh session identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result of recording a session as a dependent of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddDependent {
    /// The (session, symbol) pair was already present; nothing changed.
    AlreadyHeld,
    /// The session joined an entry that other sessions already hold.
    Joined,
    /// The reference count went 0 -> 1; a new entry was created.
    First,
}

/// Result of dropping a session from a symbol's dependent set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveDependent {
    /// The session did not hold the symbol; nothing changed.
    NotHeld,
    /// The session was removed but other dependents remain.
    Removed,
    /// The reference count went 1 -> 0; the entry was deleted.
    LastRemoved,
}

// =============================================================================
// Registry State
// =============================================================================

/// Per-symbol dependent tracking.
#[derive(Debug, Default)]
struct SymbolEntry {
    dependents: HashSet<SessionId>,
}

/// Reference-counted symbol registry.
///
/// Entries exist only while their reference count is positive, so
/// [`SymbolRegistry::active_symbols`] is exactly the set that must be
/// subscribed upstream.
#[derive(Debug, Default)]
pub struct SymbolRegistry {
    entries: HashMap<Symbol, SymbolEntry>,
}

impl SymbolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the symbol currently has a positive reference count.
    #[must_use]
    pub fn is_active(&self, symbol: &str) -> bool {
        self.entries.contains_key(symbol)
    }

    /// Record `session` as depending on `symbol`, creating the entry on the
    /// 0 -> 1 transition. Idempotent per (session, symbol) pair.
    pub fn add_dependent(&mut self, session: SessionId, symbol: &str) -> AddDependent {
        if let Some(entry) = self.entries.get_mut(symbol) {
            if entry.dependents.insert(session) {
                AddDependent::Joined
            } else {
                AddDependent::AlreadyHeld
            }
        } else {
            let mut entry = SymbolEntry::default();
            entry.dependents.insert(session);
            self.entries.insert(symbol.to_string(), entry);
            AddDependent::First
        }
    }

    /// Drop `session` from `symbol`'s dependents, deleting the entry on the
    /// 1 -> 0 transition.
    pub fn remove_dependent(&mut self, session: SessionId, symbol: &str) -> RemoveDependent {
        let Some(entry) = self.entries.get_mut(symbol) else {
            return RemoveDependent::NotHeld;
        };

        if !entry.dependents.remove(&session) {
            return RemoveDependent::NotHeld;
        }

        if entry.dependents.is_empty() {
            self.entries.remove(symbol);
            RemoveDependent::LastRemoved
        } else {
            RemoveDependent::Removed
        }
    }

    /// Reference count for a symbol (0 when no entry exists).
    #[must_use]
    pub fn refcount(&self, symbol: &str) -> usize {
        self.entries
            .get(symbol)
            .map_or(0, |e| e.dependents.len())
    }

    /// Sessions currently depending on `symbol`.
    #[must_use]
    pub fn dependents(&self, symbol: &str) -> Option<&HashSet<SessionId>> {
        self.entries.get(symbol).map(|e| &e.dependents)
    }

    /// All symbols with a positive reference count, sorted for stable output.
    #[must_use]
    pub fn active_symbols(&self) -> Vec<Symbol> {
        let mut symbols: Vec<_> = self.entries.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Number of symbols with a positive reference count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no symbol is currently referenced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_add_creates_entry() {
        let mut registry = SymbolRegistry::new();
        let s1 = SessionId::generate();

        assert_eq!(registry.add_dependent(s1, "AAPL"), AddDependent::First);
        assert!(registry.is_active("AAPL"));
        assert_eq!(registry.refcount("AAPL"), 1);
    }

    #[test]
    fn second_session_joins_existing_entry() {
        let mut registry = SymbolRegistry::new();
        let s1 = SessionId::generate();
        let s2 = SessionId::generate();

        registry.add_dependent(s1, "AAPL");
        assert_eq!(registry.add_dependent(s2, "AAPL"), AddDependent::Joined);
        assert_eq!(registry.refcount("AAPL"), 2);
    }

    #[test]
    fn re_add_same_pair_is_noop() {
        let mut registry = SymbolRegistry::new();
        let s1 = SessionId::generate();

        registry.add_dependent(s1, "AAPL");
        assert_eq!(registry.add_dependent(s1, "AAPL"), AddDependent::AlreadyHeld);
        assert_eq!(registry.refcount("AAPL"), 1);
    }

    #[test]
    fn remove_with_remaining_dependents() {
        let mut registry = SymbolRegistry::new();
        let s1 = SessionId::generate();
        let s2 = SessionId::generate();

        registry.add_dependent(s1, "AAPL");
        registry.add_dependent(s2, "AAPL");

        assert_eq!(
            registry.remove_dependent(s1, "AAPL"),
            RemoveDependent::Removed
        );
        assert!(registry.is_active("AAPL"));
        assert_eq!(registry.refcount("AAPL"), 1);
    }

    #[test]
    fn last_remove_deletes_entry() {
        let mut registry = SymbolRegistry::new();
        let s1 = SessionId::generate();

        registry.add_dependent(s1, "AAPL");
        assert_eq!(
            registry.remove_dependent(s1, "AAPL"),
            RemoveDependent::LastRemoved
        );
        assert!(!registry.is_active("AAPL"));
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_unheld_symbol_is_noop() {
        let mut registry = SymbolRegistry::new();
        let s1 = SessionId::generate();
        let s2 = SessionId::generate();

        registry.add_dependent(s1, "AAPL");

        assert_eq!(
            registry.remove_dependent(s2, "AAPL"),
            RemoveDependent::NotHeld
        );
        assert_eq!(
            registry.remove_dependent(s1, "MSFT"),
            RemoveDependent::NotHeld
        );
        assert_eq!(registry.refcount("AAPL"), 1);
    }

    #[test]
    fn active_symbols_sorted() {
        let mut registry = SymbolRegistry::new();
        let s1 = SessionId::generate();

        registry.add_dependent(s1, "MSFT");
        registry.add_dependent(s1, "AAPL");
        registry.add_dependent(s1, "GOOG");

        assert_eq!(registry.active_symbols(), vec!["AAPL", "GOOG", "MSFT"]);
    }

    #[test]
    fn dependents_reflect_holders() {
        let mut registry = SymbolRegistry::new();
        let s1 = SessionId::generate();
        let s2 = SessionId::generate();

        registry.add_dependent(s1, "AAPL");
        registry.add_dependent(s2, "AAPL");

        let deps = registry.dependents("AAPL").unwrap();
        assert!(deps.contains(&s1));
        assert!(deps.contains(&s2));
        assert!(registry.dependents("MSFT").is_none());
    }
}
