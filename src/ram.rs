//! RAM tree representation.
//!
//! The Relational Algebra Machine is the typed intermediate representation
//! handed to the synthesiser. Nodes fall into four closed families:
//! statements (control flow), operations (the loop nests inside a query),
//! conditions and expressions. Each family is a tagged enum so lowering can
//! match exhaustively; an unknown node kind is a compile-time hole, not a
//! runtime surprise.

use crate::relation::{IoDirectives, Relation};
use ordered_float::OrderedFloat;
use rustc_hash::FxHashSet;
use std::rc::Rc;

/// Intrinsic functor operators, partitioned by signature. The `U`/`F`
/// prefixes mark the unsigned and float variants of the numeric operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctorOp {
    // unary
    Ord,
    Strlen,
    Neg,
    FNeg,
    BNot,
    UBNot,
    LNot,
    ULNot,
    ToString,
    ToNumber,
    FToU,
    IToU,
    FToI,
    UToI,
    IToF,
    UToF,
    // binary arithmetic
    Add,
    UAdd,
    FAdd,
    Sub,
    USub,
    FSub,
    Mul,
    UMul,
    FMul,
    Div,
    UDiv,
    FDiv,
    Exp,
    UExp,
    FExp,
    Mod,
    UMod,
    // binary bitwise
    BAnd,
    UBAnd,
    BOr,
    UBOr,
    BXor,
    UBXor,
    // binary logical
    LAnd,
    ULAnd,
    LOr,
    ULOr,
    // variadic
    Max,
    UMax,
    FMax,
    Min,
    UMin,
    FMin,
    Cat,
    // ternary
    Substr,
}

/// Binary constraint operators. Signed, unsigned and float orderings all
/// lower to the same relational operator on the concrete numeric kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstraintOp {
    Eq,
    Ne,
    Lt,
    ULt,
    FLt,
    Le,
    ULe,
    FLe,
    Gt,
    UGt,
    FGt,
    Ge,
    UGe,
    FGe,
    Match,
    NotMatch,
    Contains,
    NotContains,
}

/// Aggregate functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateFunction {
    Min,
    Max,
    Count,
    Sum,
}

/// RAM expressions. Pure fragments producing a value of the RAM domain.
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    SignedConstant(i64),
    UnsignedConstant(u64),
    FloatConstant(OrderedFloat<f64>),
    /// `env<tuple_id>[column]`
    TupleElement { tuple_id: usize, column: usize },
    AutoIncrement,
    Intrinsic { op: FunctorOp, args: Vec<Expression> },
    UserDefined {
        name: String,
        /// One tag per argument plus one for the return: `N` or `S`.
        type_signature: String,
        args: Vec<Expression>,
    },
    PackRecord(Vec<Expression>),
    SubroutineArgument(usize),
    /// Distinguished "absent" marker, legal only in index range patterns.
    Undef,
}

impl Expression {
    pub fn signed(value: i64) -> Self {
        Expression::SignedConstant(value)
    }

    pub fn unsigned(value: u64) -> Self {
        Expression::UnsignedConstant(value)
    }

    pub fn float(value: f64) -> Self {
        Expression::FloatConstant(OrderedFloat(value))
    }

    pub fn tuple_element(tuple_id: usize, column: usize) -> Self {
        Expression::TupleElement { tuple_id, column }
    }

    pub fn intrinsic(op: FunctorOp, args: Vec<Expression>) -> Self {
        Expression::Intrinsic { op, args }
    }

    pub fn is_undef(&self) -> bool {
        matches!(self, Expression::Undef)
    }

    /// Depth-first pre-order walk over this expression and its arguments.
    pub fn for_each(&self, f: &mut impl FnMut(&Expression)) {
        f(self);
        match self {
            Expression::Intrinsic { args, .. }
            | Expression::UserDefined { args, .. }
            | Expression::PackRecord(args) => {
                for arg in args {
                    arg.for_each(f);
                }
            }
            _ => {}
        }
    }
}

/// RAM conditions. Boolean fragments guarding operations and exits.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    True,
    False,
    Conjunction(Box<Condition>, Box<Condition>),
    Negation(Box<Condition>),
    Constraint {
        op: ConstraintOp,
        lhs: Expression,
        rhs: Expression,
    },
    EmptinessCheck { relation: Rc<Relation> },
    ExistenceCheck {
        relation: Rc<Relation>,
        /// One entry per column; unconstrained columns carry `Undef`.
        values: Vec<Expression>,
    },
    ProvenanceExistenceCheck {
        relation: Rc<Relation>,
        values: Vec<Expression>,
    },
}

impl Condition {
    pub fn conjunction(lhs: Condition, rhs: Condition) -> Self {
        Condition::Conjunction(Box::new(lhs), Box::new(rhs))
    }

    pub fn negation(operand: Condition) -> Self {
        Condition::Negation(Box::new(operand))
    }

    pub fn constraint(op: ConstraintOp, lhs: Expression, rhs: Expression) -> Self {
        Condition::Constraint { op, lhs, rhs }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Condition::True)
    }

    /// Flatten a conjunction tree into its list of conjuncts.
    pub fn conjuncts(&self) -> Vec<&Condition> {
        match self {
            Condition::Conjunction(lhs, rhs) => {
                let mut list = lhs.conjuncts();
                list.extend(rhs.conjuncts());
                list
            }
            other => vec![other],
        }
    }

    /// Depth-first pre-order walk over this condition and its sub-conditions.
    pub fn for_each(&self, f: &mut impl FnMut(&Condition)) {
        f(self);
        match self {
            Condition::Conjunction(lhs, rhs) => {
                lhs.for_each(f);
                rhs.for_each(f);
            }
            Condition::Negation(operand) => operand.for_each(f),
            _ => {}
        }
    }

    /// Walk every expression nested in this condition.
    pub fn for_each_expression(&self, f: &mut impl FnMut(&Expression)) {
        self.for_each(&mut |cond| match cond {
            Condition::Constraint { lhs, rhs, .. } => {
                lhs.for_each(f);
                rhs.for_each(f);
            }
            Condition::ExistenceCheck { values, .. }
            | Condition::ProvenanceExistenceCheck { values, .. } => {
                for value in values {
                    value.for_each(f);
                }
            }
            _ => {}
        });
    }

    /// A conjunct requires an operation context when it contains any
    /// existence query; such conjuncts must stay inside the scope that owns
    /// the contexts.
    pub fn requires_context(&self) -> bool {
        let mut found = false;
        self.for_each(&mut |cond| {
            if matches!(
                cond,
                Condition::ExistenceCheck { .. } | Condition::ProvenanceExistenceCheck { .. }
            ) {
                found = true;
            }
        });
        found
    }
}

/// RAM operations: the pipeline tree nested inside a query.
///
/// Every loop-introducing operation binds a tuple identifier; the bound row
/// is visible as `env<id>` to every descendant.
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    Scan {
        relation: Rc<Relation>,
        tuple_id: usize,
        profile_text: Option<String>,
        body: Box<Operation>,
    },
    ParallelScan {
        relation: Rc<Relation>,
        tuple_id: usize,
        profile_text: Option<String>,
        body: Box<Operation>,
    },
    IndexScan {
        relation: Rc<Relation>,
        tuple_id: usize,
        range_pattern: Vec<Expression>,
        profile_text: Option<String>,
        body: Box<Operation>,
    },
    ParallelIndexScan {
        relation: Rc<Relation>,
        tuple_id: usize,
        range_pattern: Vec<Expression>,
        profile_text: Option<String>,
        body: Box<Operation>,
    },
    Choice {
        relation: Rc<Relation>,
        tuple_id: usize,
        condition: Condition,
        profile_text: Option<String>,
        body: Box<Operation>,
    },
    ParallelChoice {
        relation: Rc<Relation>,
        tuple_id: usize,
        condition: Condition,
        profile_text: Option<String>,
        body: Box<Operation>,
    },
    IndexChoice {
        relation: Rc<Relation>,
        tuple_id: usize,
        range_pattern: Vec<Expression>,
        condition: Condition,
        profile_text: Option<String>,
        body: Box<Operation>,
    },
    ParallelIndexChoice {
        relation: Rc<Relation>,
        tuple_id: usize,
        range_pattern: Vec<Expression>,
        condition: Condition,
        profile_text: Option<String>,
        body: Box<Operation>,
    },
    Aggregate {
        relation: Rc<Relation>,
        tuple_id: usize,
        function: AggregateFunction,
        expression: Expression,
        condition: Condition,
        profile_text: Option<String>,
        body: Box<Operation>,
    },
    IndexAggregate {
        relation: Rc<Relation>,
        tuple_id: usize,
        function: AggregateFunction,
        expression: Expression,
        condition: Condition,
        range_pattern: Vec<Expression>,
        profile_text: Option<String>,
        body: Box<Operation>,
    },
    UnpackRecord {
        expression: Expression,
        arity: usize,
        tuple_id: usize,
        profile_text: Option<String>,
        body: Box<Operation>,
    },
    Filter {
        condition: Condition,
        profile_text: Option<String>,
        body: Box<Operation>,
    },
    Break {
        condition: Condition,
        profile_text: Option<String>,
        body: Box<Operation>,
    },
    Project {
        relation: Rc<Relation>,
        values: Vec<Expression>,
    },
    /// Append values to the subroutine return vector.
    ReturnValue { values: Vec<Expression> },
}

impl Operation {
    pub fn scan(relation: Rc<Relation>, tuple_id: usize, body: Operation) -> Self {
        Operation::Scan {
            relation,
            tuple_id,
            profile_text: None,
            body: Box::new(body),
        }
    }

    pub fn parallel_scan(relation: Rc<Relation>, tuple_id: usize, body: Operation) -> Self {
        Operation::ParallelScan {
            relation,
            tuple_id,
            profile_text: None,
            body: Box::new(body),
        }
    }

    pub fn index_scan(
        relation: Rc<Relation>,
        tuple_id: usize,
        range_pattern: Vec<Expression>,
        body: Operation,
    ) -> Self {
        Operation::IndexScan {
            relation,
            tuple_id,
            range_pattern,
            profile_text: None,
            body: Box::new(body),
        }
    }

    pub fn filter(condition: Condition, body: Operation) -> Self {
        Operation::Filter {
            condition,
            profile_text: None,
            body: Box::new(body),
        }
    }

    pub fn project(relation: Rc<Relation>, values: Vec<Expression>) -> Self {
        Operation::Project { relation, values }
    }

    /// Attach profile text to this node.
    pub fn with_profile_text(mut self, text: impl Into<String>) -> Self {
        if let Some(slot) = self.profile_text_mut() {
            *slot = Some(text.into());
        }
        self
    }

    fn profile_text_mut(&mut self) -> Option<&mut Option<String>> {
        match self {
            Operation::Scan { profile_text, .. }
            | Operation::ParallelScan { profile_text, .. }
            | Operation::IndexScan { profile_text, .. }
            | Operation::ParallelIndexScan { profile_text, .. }
            | Operation::Choice { profile_text, .. }
            | Operation::ParallelChoice { profile_text, .. }
            | Operation::IndexChoice { profile_text, .. }
            | Operation::ParallelIndexChoice { profile_text, .. }
            | Operation::Aggregate { profile_text, .. }
            | Operation::IndexAggregate { profile_text, .. }
            | Operation::UnpackRecord { profile_text, .. }
            | Operation::Filter { profile_text, .. }
            | Operation::Break { profile_text, .. } => Some(profile_text),
            Operation::Project { .. } | Operation::ReturnValue { .. } => None,
        }
    }

    pub fn profile_text(&self) -> Option<&str> {
        match self {
            Operation::Scan { profile_text, .. }
            | Operation::ParallelScan { profile_text, .. }
            | Operation::IndexScan { profile_text, .. }
            | Operation::ParallelIndexScan { profile_text, .. }
            | Operation::Choice { profile_text, .. }
            | Operation::ParallelChoice { profile_text, .. }
            | Operation::IndexChoice { profile_text, .. }
            | Operation::ParallelIndexChoice { profile_text, .. }
            | Operation::Aggregate { profile_text, .. }
            | Operation::IndexAggregate { profile_text, .. }
            | Operation::UnpackRecord { profile_text, .. }
            | Operation::Filter { profile_text, .. }
            | Operation::Break { profile_text, .. } => profile_text.as_deref(),
            Operation::Project { .. } | Operation::ReturnValue { .. } => None,
        }
    }

    /// The nested operation, if this node has one.
    pub fn body(&self) -> Option<&Operation> {
        match self {
            Operation::Scan { body, .. }
            | Operation::ParallelScan { body, .. }
            | Operation::IndexScan { body, .. }
            | Operation::ParallelIndexScan { body, .. }
            | Operation::Choice { body, .. }
            | Operation::ParallelChoice { body, .. }
            | Operation::IndexChoice { body, .. }
            | Operation::ParallelIndexChoice { body, .. }
            | Operation::Aggregate { body, .. }
            | Operation::IndexAggregate { body, .. }
            | Operation::UnpackRecord { body, .. }
            | Operation::Filter { body, .. }
            | Operation::Break { body, .. } => Some(body),
            Operation::Project { .. } | Operation::ReturnValue { .. } => None,
        }
    }

    /// The guard condition, if this node carries one.
    pub fn condition(&self) -> Option<&Condition> {
        match self {
            Operation::Choice { condition, .. }
            | Operation::ParallelChoice { condition, .. }
            | Operation::IndexChoice { condition, .. }
            | Operation::ParallelIndexChoice { condition, .. }
            | Operation::Aggregate { condition, .. }
            | Operation::IndexAggregate { condition, .. }
            | Operation::Filter { condition, .. }
            | Operation::Break { condition, .. } => Some(condition),
            _ => None,
        }
    }

    pub fn is_parallel(&self) -> bool {
        matches!(
            self,
            Operation::ParallelScan { .. }
                | Operation::ParallelIndexScan { .. }
                | Operation::ParallelChoice { .. }
                | Operation::ParallelIndexChoice { .. }
        )
    }

    /// Depth-first pre-order walk over this operation and its nest.
    pub fn for_each(&self, f: &mut impl FnMut(&Operation)) {
        f(self);
        if let Some(body) = self.body() {
            body.for_each(f);
        }
    }

    /// Walk every expression in the nest: range patterns, guard conditions,
    /// aggregate and projection values.
    pub fn for_each_expression(&self, f: &mut impl FnMut(&Expression)) {
        self.for_each(&mut |op| {
            if let Some(cond) = op.condition() {
                cond.for_each_expression(f);
            }
            match op {
                Operation::IndexScan { range_pattern, .. }
                | Operation::ParallelIndexScan { range_pattern, .. }
                | Operation::IndexChoice { range_pattern, .. }
                | Operation::ParallelIndexChoice { range_pattern, .. } => {
                    for value in range_pattern {
                        value.for_each(f);
                    }
                }
                Operation::Aggregate { expression, .. } => expression.for_each(f),
                Operation::IndexAggregate {
                    expression,
                    range_pattern,
                    ..
                } => {
                    expression.for_each(f);
                    for value in range_pattern {
                        value.for_each(f);
                    }
                }
                Operation::UnpackRecord { expression, .. } => expression.for_each(f),
                Operation::Project { values, .. } | Operation::ReturnValue { values } => {
                    for value in values {
                        value.for_each(f);
                    }
                }
                _ => {}
            }
        });
    }

    /// Relations touched anywhere in the nest: scans, aggregates, existence
    /// queries and projections. First-visit order, each relation once.
    pub fn referenced_relations(&self) -> Vec<Rc<Relation>> {
        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut result = Vec::new();
        self.for_each(&mut |op| {
            let direct = match op {
                Operation::Scan { relation, .. }
                | Operation::ParallelScan { relation, .. }
                | Operation::IndexScan { relation, .. }
                | Operation::ParallelIndexScan { relation, .. }
                | Operation::Choice { relation, .. }
                | Operation::ParallelChoice { relation, .. }
                | Operation::IndexChoice { relation, .. }
                | Operation::ParallelIndexChoice { relation, .. }
                | Operation::Aggregate { relation, .. }
                | Operation::IndexAggregate { relation, .. }
                | Operation::Project { relation, .. } => Some(relation),
                _ => None,
            };
            if let Some(relation) = direct {
                if seen.insert(relation.name().to_string()) {
                    result.push(relation.clone());
                }
            }
            if let Some(cond) = op.condition() {
                cond.for_each(&mut |c| match c {
                    Condition::ExistenceCheck { relation, .. }
                    | Condition::ProvenanceExistenceCheck { relation, .. } => {
                        if seen.insert(relation.name().to_string()) {
                            result.push(relation.clone());
                        }
                    }
                    _ => {}
                });
            }
        });
        result
    }
}

/// RAM statements: the control-flow layer of a program.
#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Sequence(Vec<Statement>),
    Parallel(Vec<Statement>),
    Loop(Box<Statement>),
    Exit(Condition),
    Swap {
        first: Rc<Relation>,
        second: Rc<Relation>,
    },
    Extend {
        source: Rc<Relation>,
        target: Rc<Relation>,
    },
    Clear { relation: Rc<Relation> },
    Load {
        relation: Rc<Relation>,
        directives: Vec<IoDirectives>,
    },
    Store {
        relation: Rc<Relation>,
        directives: Vec<IoDirectives>,
    },
    LogSize {
        relation: Rc<Relation>,
        message: String,
    },
    LogRelationTimer {
        relation: Rc<Relation>,
        message: String,
        statement: Box<Statement>,
    },
    LogTimer {
        message: String,
        statement: Box<Statement>,
    },
    DebugInfo {
        message: String,
        statement: Box<Statement>,
    },
    Query(Operation),
}

impl Statement {
    pub fn sequence(statements: Vec<Statement>) -> Self {
        Statement::Sequence(statements)
    }

    pub fn query(operation: Operation) -> Self {
        Statement::Query(operation)
    }

    pub fn looped(body: Statement) -> Self {
        Statement::Loop(Box::new(body))
    }

    /// Depth-first pre-order walk over this statement and its children.
    pub fn for_each(&self, f: &mut impl FnMut(&Statement)) {
        f(self);
        match self {
            Statement::Sequence(children) | Statement::Parallel(children) => {
                for child in children {
                    child.for_each(f);
                }
            }
            Statement::Loop(body) => body.for_each(f),
            Statement::LogRelationTimer { statement, .. }
            | Statement::LogTimer { statement, .. }
            | Statement::DebugInfo { statement, .. } => statement.for_each(f),
            _ => {}
        }
    }

    /// Walk every operation nested in queries under this statement.
    pub fn for_each_operation(&self, f: &mut impl FnMut(&Operation)) {
        self.for_each(&mut |stmt| {
            if let Statement::Query(op) = stmt {
                op.for_each(f);
            }
        });
    }

    /// Walk every condition under this statement, including exit guards and
    /// the guards inside query nests.
    pub fn for_each_condition(&self, f: &mut impl FnMut(&Condition)) {
        self.for_each(&mut |stmt| match stmt {
            Statement::Exit(cond) => cond.for_each(f),
            Statement::Query(op) => op.for_each(&mut |inner| {
                if let Some(cond) = inner.condition() {
                    cond.for_each(f);
                }
            }),
            _ => {}
        });
    }

    /// Walk every expression under this statement.
    pub fn for_each_expression(&self, f: &mut impl FnMut(&Expression)) {
        self.for_each(&mut |stmt| match stmt {
            Statement::Exit(cond) => cond.for_each_expression(f),
            Statement::Query(op) => op.for_each_expression(f),
            _ => {}
        });
    }
}

/// A complete RAM program: relations, the main statement, and any named
/// provenance subroutines.
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    relations: Vec<Rc<Relation>>,
    main: Statement,
    subroutines: Vec<(String, Statement)>,
}

impl Program {
    pub fn new(relations: Vec<Rc<Relation>>, main: Statement) -> Self {
        Program {
            relations,
            main,
            subroutines: Vec::new(),
        }
    }

    pub fn with_subroutines(mut self, subroutines: Vec<(String, Statement)>) -> Self {
        self.subroutines = subroutines;
        self
    }

    pub fn relations(&self) -> &[Rc<Relation>] {
        &self.relations
    }

    pub fn main(&self) -> &Statement {
        &self.main
    }

    pub fn subroutines(&self) -> &[(String, Statement)] {
        &self.subroutines
    }
}
