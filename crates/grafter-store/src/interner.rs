//! Label and property-key interning.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;

/// Interned string id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Sym(u32);

impl Sym {
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Maps strings to compact ids and back. Safe to share between sessions.
#[derive(Debug, Default)]
pub struct StringInterner {
    str_to_id: DashMap<String, Sym>,
    id_to_str: DashMap<Sym, String>,
    next_id: AtomicU32,
}

impl StringInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, s: &str) -> Sym {
        if let Some(id) = self.str_to_id.get(s) {
            return *id;
        }
        // The entry lock makes concurrent first interns of one string agree.
        *self.str_to_id.entry(s.to_string()).or_insert_with(|| {
            let id = Sym(self.next_id.fetch_add(1, Ordering::SeqCst));
            self.id_to_str.insert(id, s.to_string());
            id
        })
    }

    pub fn id_of(&self, s: &str) -> Option<Sym> {
        self.str_to_id.get(s).map(|id| *id)
    }

    pub fn lookup(&self, id: Sym) -> Option<String> {
        self.id_to_str.get(&id).map(|s| s.clone())
    }

    pub fn len(&self) -> usize {
        self.id_to_str.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_str.is_empty()
    }

    /// Every interned string with its id.
    pub(crate) fn entries(&self) -> Vec<(Sym, String)> {
        let mut entries: Vec<(Sym, String)> = self
            .id_to_str
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        entries.sort_unstable_by_key(|(id, _)| *id);
        entries
    }

    /// Rebuild an interner with exactly the given ids.
    pub(crate) fn from_entries(entries: Vec<(Sym, String)>) -> Self {
        let next = entries.iter().map(|(id, _)| id.0 + 1).max().unwrap_or(0);
        let interner = Self::new();
        for (id, s) in entries {
            interner.str_to_id.insert(s.clone(), id);
            interner.id_to_str.insert(id, s);
        }
        interner.next_id.store(next, Ordering::SeqCst);
        interner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn interning_is_idempotent() {
        let interner = StringInterner::new();
        let a = interner.intern("person");
        assert_eq!(interner.intern("person"), a);
        assert_ne!(interner.intern("city"), a);
        assert_eq!(interner.lookup(a).as_deref(), Some("person"));
        assert_eq!(interner.id_of("nope"), None);
    }

    #[test]
    fn concurrent_interns_agree() {
        let interner = StringInterner::new();
        let ids: Vec<Sym> = (0..256).into_par_iter().map(|_| interner.intern("knows")).collect();
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn rebuilt_interner_keeps_ids() {
        let interner = StringInterner::new();
        let ids: Vec<Sym> = ["a", "b", "c"].iter().map(|s| interner.intern(s)).collect();
        let rebuilt = StringInterner::from_entries(interner.entries());
        for (s, id) in ["a", "b", "c"].iter().zip(&ids) {
            assert_eq!(rebuilt.id_of(s), Some(*id));
        }
        assert_ne!(rebuilt.intern("d"), ids[2]);
    }
}
