//! Relation descriptors consumed by the synthesiser.
//!
//! A [`Relation`] is the RAM-level view of a Datalog relation: name, arity,
//! attribute metadata, provenance bookkeeping columns and the storage
//! representation requested upstream. [`IoDirectives`] is the string-keyed
//! metadata attached to load and store statements.

use std::collections::BTreeMap;

/// Requested storage representation for a relation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Representation {
    /// No explicit request; the resolver picks a b-tree.
    Default,
    /// Explicit b-tree request.
    Btree,
    /// Trie-backed storage.
    Brie,
    /// Equivalence relation (union-find), binary only.
    Eqrel,
    /// Provenance metadata relation, stored without indexing.
    Info,
}

/// A RAM relation.
#[derive(Clone, Debug, PartialEq)]
pub struct Relation {
    name: String,
    arity: usize,
    auxiliary_arity: usize,
    attribute_names: Vec<String>,
    attribute_types: Vec<String>,
    representation: Representation,
}

impl Relation {
    pub fn new(
        name: impl Into<String>,
        arity: usize,
        auxiliary_arity: usize,
        attribute_names: Vec<String>,
        attribute_types: Vec<String>,
        representation: Representation,
    ) -> Self {
        Relation {
            name: name.into(),
            arity,
            auxiliary_arity,
            attribute_names,
            attribute_types,
            representation,
        }
    }

    /// Shorthand for a relation without provenance columns, stored with the
    /// default representation.
    pub fn plain(name: impl Into<String>, attribute_names: &[&str], attribute_types: &[&str]) -> Self {
        Relation::new(
            name,
            attribute_names.len(),
            0,
            attribute_names.iter().map(|s| s.to_string()).collect(),
            attribute_types.iter().map(|s| s.to_string()).collect(),
            Representation::Default,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Number of trailing columns reserved for provenance bookkeeping.
    pub fn auxiliary_arity(&self) -> usize {
        self.auxiliary_arity
    }

    pub fn attribute_names(&self) -> &[String] {
        &self.attribute_names
    }

    pub fn attribute_types(&self) -> &[String] {
        &self.attribute_types
    }

    pub fn representation(&self) -> Representation {
        self.representation
    }

    /// Temporary relations are named with a leading `@` by the translator.
    pub fn is_temp(&self) -> bool {
        self.name.starts_with('@')
    }

    /// First character of each attribute type: the primitive kind
    /// (`i`/`u`/`f`/`s`/`r`).
    pub fn type_kinds(&self) -> impl Iterator<Item = char> + '_ {
        self.attribute_types
            .iter()
            .map(|t| t.chars().next().unwrap_or('i'))
    }
}

/// String-keyed IO metadata attached to a load or store.
///
/// Entries are kept sorted by key so the rendered directive map is stable
/// across runs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IoDirectives {
    entries: BTreeMap<String, String>,
}

impl IoDirectives {
    pub fn new() -> Self {
        IoDirectives::default()
    }

    /// Directives for a file-backed relation.
    pub fn file(relation: &str, filename: &str) -> Self {
        IoDirectives::new()
            .with("IO", "file")
            .with("name", relation)
            .with("filename", filename)
    }

    /// Directives writing to standard output.
    pub fn stdout(relation: &str) -> Self {
        IoDirectives::new().with("IO", "stdout").with("name", relation)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
