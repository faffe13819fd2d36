//! Identifier minting and profile-counter registries.
//!
//! RAM names are free-form text; emitted identifiers must be legal C++. The
//! mint strips what it cannot keep, prefixes an insertion ordinal so
//! distinct names can never collide after normalisation, and memoises the
//! result so the mapping is stable for the lifetime of a compilation.

use crate::relation::Relation;
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};

/// Memoised RAM-name to identifier mapping.
#[derive(Debug, Default)]
pub struct IdentifierMint {
    map: FxHashMap<String, String>,
    minted: FxHashSet<String>,
}

impl IdentifierMint {
    pub fn new() -> Self {
        IdentifierMint::default()
    }

    /// Convert a RAM name into a legal identifier.
    ///
    /// Leading non-alphanumerics are stripped, an ordinal prefix guarantees
    /// uniqueness, every other illegal character becomes a single underscore
    /// (double underscores are reserved), and the result is capped at 1024
    /// characters. Feeding a previously minted identifier back in returns it
    /// unchanged, so the conversion is idempotent once seeded.
    pub fn convert(&mut self, name: &str) -> String {
        if let Some(id) = self.map.get(name) {
            return id.clone();
        }
        if self.minted.contains(name) {
            return name.to_string();
        }

        let start = name
            .find(|c: char| c.is_ascii_alphanumeric() || c == '_')
            .unwrap_or(name.len());
        let raw = format!("{}_{}", self.map.len() + 1, &name[start..]);

        let mut id = String::with_capacity(raw.len());
        for ch in raw.chars() {
            if ch.is_ascii_alphanumeric() {
                id.push(ch);
            } else if id.is_empty() || !id.ends_with('_') {
                id.push('_');
            }
        }
        id.truncate(1024);

        self.map.insert(name.to_string(), id.clone());
        self.minted.insert(id.clone());
        id
    }

    /// Emitted member name for a relation.
    pub fn relation_name(&mut self, relation: &Relation) -> String {
        format!("rel_{}", self.convert(relation.name()))
    }

    /// Emitted operation-context name for a relation.
    pub fn op_context_name(&mut self, relation: &Relation) -> String {
        format!("{}_op_ctxt", self.relation_name(relation))
    }
}

/// Dense-ID registry for profile keys. IDs are handed out in first-seen
/// order and iteration follows the same order, so counter arrays and their
/// dump loops always agree.
#[derive(Debug, Default)]
pub struct ProfileRegistry {
    entries: IndexMap<String, usize>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        ProfileRegistry::default()
    }

    /// ID for a key, allocating the next dense ID on first sight.
    pub fn lookup(&mut self, text: &str) -> usize {
        if let Some(&idx) = self.entries.get(text) {
            return idx;
        }
        let idx = self.entries.len();
        self.entries.insert(text.to_string(), idx);
        idx
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.entries.iter().map(|(k, &v)| (k.as_str(), v))
    }
}

/// Read-counter keys use `.` where relation names use `-`.
pub(crate) fn normalise_read_key(text: &str) -> String {
    text.replace('-', ".")
}
