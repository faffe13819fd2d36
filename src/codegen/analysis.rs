//! Index analysis for code synthesis.
//!
//! Every indexed access site — index scans and choices, indexed aggregates,
//! existence checks — constrains some subset of a relation's columns. The
//! subset is summarised as a [`SearchSignature`]: a bitmask over the
//! relation's arity with bit `i` set when column `i` is bound. The analysis
//! walks a whole program once and records, per relation, the set of
//! signatures used against it; the realisation resolver turns that set into
//! concrete container indexes.

use crate::ram::{Condition, Expression, Operation, Program, Statement};
use crate::relation::Relation;
use rustc_hash::FxHashMap;

/// Bitmask over a relation's columns; bit `i` set means column `i` is bound.
pub type SearchSignature = u64;

/// Signature of an index range pattern: bits for the non-undef positions.
pub fn signature_from_pattern(pattern: &[Expression]) -> SearchSignature {
    let mut signature = 0;
    for (i, value) in pattern.iter().enumerate() {
        if !value.is_undef() {
            signature |= 1 << i;
        }
    }
    signature
}

/// Signature of a provenance existence query. The query binds the data
/// columns and the first auxiliary column; the remaining height columns are
/// compared outside the range query.
pub fn provenance_signature(values: &[Expression], auxiliary_arity: usize) -> SearchSignature {
    let bound = values.len() - auxiliary_arity + 1;
    signature_from_pattern(&values[..bound])
}

/// Per-relation signature sets collected from one program.
#[derive(Debug, Default)]
pub struct IndexAnalysis {
    relation_signatures: FxHashMap<String, Vec<SearchSignature>>,
}

impl IndexAnalysis {
    /// Walk the program (main and subroutines) and collect every signature
    /// used against every relation, in first-use order.
    pub fn analyze(program: &Program) -> Self {
        let mut analysis = IndexAnalysis::default();
        analysis.scan_statement(program.main());
        for (_, body) in program.subroutines() {
            analysis.scan_statement(body);
        }
        analysis
    }

    fn scan_statement(&mut self, stmt: &Statement) {
        stmt.for_each_operation(&mut |op| {
            if let Some(signature) = Self::operation_signature(op) {
                let relation = match op {
                    Operation::IndexScan { relation, .. }
                    | Operation::ParallelIndexScan { relation, .. }
                    | Operation::IndexChoice { relation, .. }
                    | Operation::ParallelIndexChoice { relation, .. }
                    | Operation::IndexAggregate { relation, .. } => relation,
                    _ => unreachable!("signature implies an indexed operation"),
                };
                self.record(relation, signature);
            }
        });
        stmt.for_each_condition(&mut |cond| match cond {
            Condition::ExistenceCheck { relation, values } => {
                self.record(relation, signature_from_pattern(values));
            }
            Condition::ProvenanceExistenceCheck { relation, values } => {
                self.record(
                    relation,
                    provenance_signature(values, relation.auxiliary_arity()),
                );
            }
            _ => {}
        });
    }

    fn record(&mut self, relation: &Relation, signature: SearchSignature) {
        let entry = self
            .relation_signatures
            .entry(relation.name().to_string())
            .or_default();
        if !entry.contains(&signature) {
            entry.push(signature);
        }
    }

    /// Search signature of an indexed operation, `None` for non-indexed ones.
    pub fn operation_signature(op: &Operation) -> Option<SearchSignature> {
        match op {
            Operation::IndexScan { range_pattern, .. }
            | Operation::ParallelIndexScan { range_pattern, .. }
            | Operation::IndexChoice { range_pattern, .. }
            | Operation::ParallelIndexChoice { range_pattern, .. }
            | Operation::IndexAggregate { range_pattern, .. } => {
                Some(signature_from_pattern(range_pattern))
            }
            _ => None,
        }
    }

    /// Whether an existence check binds every column of its relation: point
    /// queries use `contains`, anything narrower uses a range query.
    pub fn is_total(relation: &Relation, signature: SearchSignature) -> bool {
        relation.arity() > 0 && signature == (1 << relation.arity()) - 1
    }

    /// Signatures recorded against a relation, in first-use order.
    pub fn indexes(&self, relation: &Relation) -> &[SearchSignature] {
        self.relation_signatures
            .get(relation.name())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ram::{Condition, Expression, Operation, Program, Statement};
    use crate::relation::Relation;
    use std::rc::Rc;

    fn ternary(name: &str) -> Rc<Relation> {
        Rc::new(Relation::plain(
            name,
            &["a", "b", "c"],
            &["i:number", "i:number", "i:number"],
        ))
    }

    #[test]
    fn test_signature_from_pattern() {
        let pattern = vec![
            Expression::signed(1),
            Expression::Undef,
            Expression::signed(3),
        ];
        assert_eq!(signature_from_pattern(&pattern), 0b101);
    }

    #[test]
    fn test_total_signature() {
        let rel = ternary("t");
        assert!(IndexAnalysis::is_total(&rel, 0b111));
        assert!(!IndexAnalysis::is_total(&rel, 0b011));
    }

    #[test]
    fn test_analysis_collects_per_relation_signatures() {
        let rel = ternary("t");
        let main = Statement::query(Operation::index_scan(
            rel.clone(),
            0,
            vec![
                Expression::signed(1),
                Expression::Undef,
                Expression::Undef,
            ],
            Operation::filter(
                Condition::ExistenceCheck {
                    relation: rel.clone(),
                    values: vec![
                        Expression::signed(1),
                        Expression::signed(2),
                        Expression::signed(3),
                    ],
                },
                Operation::project(rel.clone(), vec![]),
            ),
        ));
        let program = Program::new(vec![rel.clone()], main);
        let analysis = IndexAnalysis::analyze(&program);
        assert_eq!(analysis.indexes(&rel), &[0b001, 0b111]);
    }

    #[test]
    fn test_provenance_signature_ignores_trailing_heights() {
        // arity 4, auxiliary arity 2: columns 0,1 are data, 2 is the level
        // bound, 3 is compared lexicographically outside the query
        let values = vec![
            Expression::signed(1),
            Expression::signed(2),
            Expression::signed(0),
            Expression::signed(9),
        ];
        assert_eq!(provenance_signature(&values, 2), 0b111);
    }
}
