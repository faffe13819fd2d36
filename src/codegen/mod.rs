//! Code synthesis for RAM programs.
//!
//! This module lowers a typed, index-analysed RAM program into a single
//! self-contained C++ compilation unit. The pipeline, leaf-first:
//!
//! 1. **Identifier minting** ([`idents`]): RAM names become legal, unique C++
//!    identifiers, memoised per compilation.
//! 2. **Index analysis** ([`analysis`]): every access site gets a search
//!    signature; every relation gets the set of signatures used against it.
//! 3. **Relation realisation** ([`relation_type`]): a relation plus its
//!    signature set picks a concrete container family and emits its type
//!    definition once.
//! 4. **Emission** ([`emitter`]): the visitor over statements, queries,
//!    operations, conditions and expressions.
//! 5. **Assembly** ([`generator`]): the full compilation unit, from includes
//!    to the entry point.

pub mod analysis;
pub mod emitter;
pub mod generator;
pub mod idents;
pub mod relation_type;

#[cfg(test)]
mod synthesis_test;

pub use analysis::{IndexAnalysis, SearchSignature};
pub use generator::{Synthesis, Synthesiser};
pub use idents::{IdentifierMint, ProfileRegistry};
pub use relation_type::Realisation;

use thiserror::Error;

/// Fatal synthesis failures. None of these are recovered; the driver reports
/// them and aborts the compilation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("undefined value used outside an index range pattern")]
    UndefinedValue,
    #[error("parallel {0} is not the outermost operation of its query")]
    ParallelNotOutermost(&'static str),
    #[error("more than one parallel operation in a single query")]
    MultipleParallel,
    #[error("relation `{0}` is nullary and cannot be iterated")]
    NullaryRelation(String),
}

/// Render a payload as a C++ raw string literal, picking a delimiter that
/// cannot terminate early no matter what the payload contains.
pub(crate) fn raw_string(payload: &str) -> String {
    let mut delim = String::from("_");
    while payload.contains(&format!("){}\"", delim)) {
        delim.push('_');
    }
    format!("R\"{delim}({payload}){delim}\"")
}

/// Escape a payload for embedding in an ordinary C++ string literal.
pub(crate) fn escape_literal(payload: &str) -> String {
    let mut out = String::with_capacity(payload.len());
    for ch in payload.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_string_plain() {
        assert_eq!(raw_string("hello"), "R\"_(hello)_\"");
    }

    #[test]
    fn test_raw_string_avoids_colliding_delimiter() {
        let payload = "tricky )_\" payload";
        let rendered = raw_string(payload);
        assert_eq!(rendered, format!("R\"__({payload})__\""));
        // the literal closes exactly once, at the end
        assert!(rendered.ends_with(")__\""));
    }

    #[test]
    fn test_escape_literal() {
        assert_eq!(escape_literal("a\"b\\c\td"), "a\\\"b\\\\c\\td");
    }
}
