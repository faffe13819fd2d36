//! Stratum: the code-synthesis backend of a Datalog compiler.
//!
//! This crate lowers a typed, index-analysed RAM program (the Relational
//! Algebra Machine produced by the upstream translator) into one
//! self-contained C++ compilation unit, ready for a host compiler.
//!
//! It provides:
//! - RAM tree representation (statements, operations, conditions, expressions)
//! - Relation descriptors and IO directives
//! - A symbol table shared between synthesis time and run time
//! - Index analysis over every access site
//! - The synthesiser: identifier minting, relation realisations, the
//!   lowering visitor, and whole-program assembly

pub mod codegen;
pub mod config;
pub mod ram;
pub mod relation;
pub mod symbols;

// Re-exports for convenience
pub use codegen::{IndexAnalysis, SearchSignature, Synthesis, SynthesisError, Synthesiser};
pub use config::{ProvenanceMode, SynthesiserConfig};
pub use ram::{
    AggregateFunction, Condition, ConstraintOp, Expression, FunctorOp, Operation, Program,
    Statement,
};
pub use relation::{IoDirectives, Relation, Representation};
pub use symbols::{SymbolId, SymbolTable};

/// What the synthesiser consumes: the RAM program, its symbol table, and the
/// index analysis derived from the program.
#[derive(Debug)]
pub struct TranslationUnit {
    program: ram::Program,
    symbols: symbols::SymbolTable,
    analysis: codegen::IndexAnalysis,
}

impl TranslationUnit {
    pub fn new(program: ram::Program, symbols: symbols::SymbolTable) -> Self {
        let analysis = codegen::IndexAnalysis::analyze(&program);
        TranslationUnit {
            program,
            symbols,
            analysis,
        }
    }

    pub fn program(&self) -> &ram::Program {
        &self.program
    }

    pub fn symbols(&self) -> &symbols::SymbolTable {
        &self.symbols
    }

    pub fn index_analysis(&self) -> &codegen::IndexAnalysis {
        &self.analysis
    }
}
