//! The lowering visitor: RAM statements, queries, operations, conditions and
//! expressions down to C++ fragments.
//!
//! The emitter owns no output of its own; every method appends to a caller
//! supplied buffer. Query lowering computes its context-creation preamble
//! eagerly and hands it to the operation walk, which injects it inside each
//! worker when the nest is parallel. One emitter instance serves one
//! statement tree; the mint and the profile registries it borrows outlive it
//! on the synthesiser.

use crate::codegen::analysis::{provenance_signature, signature_from_pattern, IndexAnalysis};
use crate::codegen::idents::{normalise_read_key, IdentifierMint, ProfileRegistry};
use crate::codegen::{escape_literal, raw_string, SynthesisError};
use crate::config::SynthesiserConfig;
use crate::ram::{
    AggregateFunction, Condition, ConstraintOp, Expression, FunctorOp, Operation, Statement,
};
use crate::relation::{IoDirectives, Relation};
use std::fmt::Write;

pub(crate) struct CodeEmitter<'a> {
    config: &'a SynthesiserConfig,
    mint: &'a mut IdentifierMint,
    freqs: &'a mut ProfileRegistry,
    reads: &'a mut ProfileRegistry,
    /// Context-creation preamble of the current query, present exactly while
    /// a parallel nest may still claim it.
    preamble: Option<String>,
}

impl<'a> CodeEmitter<'a> {
    pub(crate) fn new(
        config: &'a SynthesiserConfig,
        mint: &'a mut IdentifierMint,
        freqs: &'a mut ProfileRegistry,
        reads: &'a mut ProfileRegistry,
    ) -> Self {
        CodeEmitter {
            config,
            mint,
            freqs,
            reads,
            preamble: None,
        }
    }

    fn begin(&self, out: &mut String, what: &str) {
        if self.config.comments() {
            writeln!(out, "/* BEGIN {} */", what).unwrap();
        }
    }

    fn end(&self, out: &mut String, what: &str) {
        if self.config.comments() {
            writeln!(out, "/* END {} */", what).unwrap();
        }
    }

    fn read_context(&mut self, relation: &Relation) -> String {
        format!("READ_OP_CONTEXT({})", self.mint.op_context_name(relation))
    }

    // -- statements --

    pub(crate) fn emit_statement(
        &mut self,
        out: &mut String,
        stmt: &Statement,
    ) -> Result<(), SynthesisError> {
        match stmt {
            Statement::Sequence(children) => {
                self.begin(out, "Sequence");
                for child in children {
                    self.emit_statement(out, child)?;
                }
                self.end(out, "Sequence");
            }
            Statement::Parallel(children) => {
                self.begin(out, "Parallel");
                match children.len() {
                    0 => {}
                    // a single statement: save the overhead
                    1 => self.emit_statement(out, &children[0])?,
                    _ => {
                        writeln!(out, "SECTIONS_START;").unwrap();
                        for child in children {
                            writeln!(out, "SECTION_START;").unwrap();
                            self.emit_statement(out, child)?;
                            writeln!(out, "SECTION_END").unwrap();
                        }
                        writeln!(out, "SECTIONS_END;").unwrap();
                    }
                }
                self.end(out, "Parallel");
            }
            Statement::Loop(body) => {
                self.begin(out, "Loop");
                writeln!(out, "iter = 0;").unwrap();
                writeln!(out, "for(;;) {{").unwrap();
                self.emit_statement(out, body)?;
                writeln!(out, "iter++;").unwrap();
                writeln!(out, "}}").unwrap();
                writeln!(out, "iter = 0;").unwrap();
                self.end(out, "Loop");
            }
            Statement::Exit(condition) => {
                self.begin(out, "Exit");
                write!(out, "if(").unwrap();
                self.emit_condition(out, condition)?;
                writeln!(out, ") break;").unwrap();
                self.end(out, "Exit");
            }
            Statement::Swap { first, second } => {
                self.begin(out, "Swap");
                let first_name = self.mint.relation_name(first);
                let second_name = self.mint.relation_name(second);
                writeln!(out, "std::swap({}, {});", first_name, second_name).unwrap();
                self.end(out, "Swap");
            }
            Statement::Extend { source, target } => {
                self.begin(out, "Extend");
                let source_name = self.mint.relation_name(source);
                let target_name = self.mint.relation_name(target);
                writeln!(out, "{}->extend(*{});", source_name, target_name).unwrap();
                self.end(out, "Extend");
            }
            Statement::Clear { relation } => {
                self.begin(out, "Clear");
                let rel_name = self.mint.relation_name(relation);
                writeln!(
                    out,
                    "if (!isHintsProfilingEnabled(){}{}->purge();",
                    if relation.is_temp() { ") " } else { "&& performIO) " },
                    rel_name
                )
                .unwrap();
                self.end(out, "Clear");
            }
            Statement::Load { relation, directives } => {
                self.begin(out, "Load");
                writeln!(out, "if (performIO) {{").unwrap();
                let rel_name = self.mint.relation_name(relation);
                for dir in directives {
                    emit_load_directive(out, relation, &rel_name, dir);
                }
                writeln!(out, "}}").unwrap();
                self.end(out, "Load");
            }
            Statement::Store { relation, directives } => {
                self.begin(out, "Store");
                writeln!(out, "if (performIO) {{").unwrap();
                let rel_name = self.mint.relation_name(relation);
                for dir in directives {
                    emit_store_directive(out, relation, &rel_name, dir);
                }
                writeln!(out, "}}").unwrap();
                self.end(out, "Store");
            }
            Statement::LogSize { relation, message } => {
                self.begin(out, "LogSize");
                let rel_name = self.mint.relation_name(relation);
                writeln!(
                    out,
                    "ProfileEventSingleton::instance().makeQuantityEvent({}, {}->size(),iter);",
                    raw_string(message),
                    rel_name
                )
                .unwrap();
                self.end(out, "LogSize");
            }
            Statement::LogRelationTimer {
                relation,
                message,
                statement,
            } => {
                self.begin(out, "LogRelationTimer");
                // local scope for name resolution
                writeln!(out, "{{").unwrap();
                let rel_name = self.mint.relation_name(relation);
                writeln!(
                    out,
                    "\tLogger logger({},iter, [&](){{return {}->size();}});",
                    raw_string(message),
                    rel_name
                )
                .unwrap();
                self.emit_statement(out, statement)?;
                writeln!(out, "}}").unwrap();
                self.end(out, "LogRelationTimer");
            }
            Statement::LogTimer { message, statement } => {
                self.begin(out, "LogTimer");
                writeln!(out, "{{").unwrap();
                writeln!(out, "\tLogger logger({},iter);", raw_string(message)).unwrap();
                self.emit_statement(out, statement)?;
                writeln!(out, "}}").unwrap();
                self.end(out, "LogTimer");
            }
            Statement::DebugInfo { message, statement } => {
                self.begin(out, "DebugInfo");
                writeln!(
                    out,
                    "SignalHandler::instance()->setMsg({});",
                    raw_string(message)
                )
                .unwrap();
                self.emit_statement(out, statement)?;
                self.end(out, "DebugInfo");
            }
            Statement::Query(op) => self.emit_query(out, op)?,
        }
        Ok(())
    }

    // -- query lowering --

    fn emit_query(&mut self, out: &mut String, op: &Operation) -> Result<(), SynthesisError> {
        self.begin(out, "Query");
        self.preamble = None;

        // split the terms of an outer filter into those that need an
        // operation context and those that can run before any is created
        let (free, require, next): (Vec<&Condition>, Vec<&Condition>, &Operation) = match op {
            Operation::Filter { condition, body, .. } => {
                let mut free = Vec::new();
                let mut require = Vec::new();
                for conjunct in condition.conjuncts() {
                    if conjunct.requires_context() {
                        require.push(conjunct);
                    } else {
                        free.push(conjunct);
                    }
                }
                (free, require, body.as_ref())
            }
            _ => (Vec::new(), Vec::new(), op),
        };

        if !free.is_empty() {
            write!(out, "if(").unwrap();
            self.emit_conjunction(out, &free)?;
            writeln!(out, ") {{").unwrap();
        }

        // outline the nest in its own lambda to keep host compile times sane
        write!(out, "[&]()").unwrap();
        writeln!(out, "{{").unwrap();

        let mut is_parallel = false;
        next.for_each(&mut |inner| {
            if inner.is_parallel() {
                is_parallel = true;
            }
        });

        // one context per referenced relation, created exactly once per
        // scope (per worker in parallel nests)
        let mut preamble = String::new();
        for relation in op.referenced_relations() {
            let ctxt = self.mint.op_context_name(&relation);
            let name = self.mint.relation_name(&relation);
            writeln!(preamble, "CREATE_OP_CONTEXT({},{}->createContext());", ctxt, name).unwrap();
        }

        if is_parallel {
            if !require.is_empty() {
                write!(preamble, "if(").unwrap();
                self.emit_conjunction(&mut preamble, &require)?;
                writeln!(preamble, ") {{").unwrap();
                self.preamble = Some(preamble);
                self.emit_operation(out, next)?;
                writeln!(out, "}}").unwrap();
            } else {
                self.preamble = Some(preamble);
                self.emit_operation(out, next)?;
            }
            writeln!(out, "PARALLEL_END;").unwrap();
            self.preamble = None;
        } else {
            out.push_str(&preamble);
            if !require.is_empty() {
                write!(out, "if(").unwrap();
                self.emit_conjunction(out, &require)?;
                writeln!(out, ") {{").unwrap();
                self.emit_operation(out, next)?;
                writeln!(out, "}}").unwrap();
            } else {
                self.emit_operation(out, next)?;
            }
        }

        writeln!(out, "}}").unwrap();
        writeln!(out, "();").unwrap();
        if !free.is_empty() {
            writeln!(out, "}}").unwrap();
        }
        self.end(out, "Query");
        Ok(())
    }

    // -- operations --

    /// Emit the nested operation and, under profiling, the frequency bump
    /// attached to the parent node.
    fn emit_nested(&mut self, out: &mut String, op: &Operation) -> Result<(), SynthesisError> {
        if let Some(body) = op.body() {
            self.emit_operation(out, body)?;
        }
        if self.config.profiling() {
            if let Some(text) = op.profile_text() {
                let idx = self.freqs.lookup(text);
                writeln!(out, "freqs[{}]++;", idx).unwrap();
            }
        }
        Ok(())
    }

    fn emit_tuple_operation(
        &mut self,
        out: &mut String,
        op: &Operation,
    ) -> Result<(), SynthesisError> {
        self.begin(out, "TupleOperation");
        self.emit_nested(out, op)?;
        self.end(out, "TupleOperation");
        Ok(())
    }

    fn take_preamble(&mut self, what: &'static str, tuple_id: usize) -> Result<String, SynthesisError> {
        if tuple_id != 0 {
            return Err(SynthesisError::ParallelNotOutermost(what));
        }
        self.preamble.take().ok_or(SynthesisError::MultipleParallel)
    }

    fn check_arity(&self, relation: &Relation) -> Result<(), SynthesisError> {
        if relation.arity() == 0 {
            return Err(SynthesisError::NullaryRelation(relation.name().to_string()));
        }
        Ok(())
    }

    fn emit_key_tuple(
        &mut self,
        out: &mut String,
        arity: usize,
        pattern: &[Expression],
    ) -> Result<(), SynthesisError> {
        write!(out, "const Tuple<RamDomain,{}> key{{{{", arity).unwrap();
        for i in 0..arity {
            if !pattern[i].is_undef() {
                self.emit_expression(out, &pattern[i])?;
            } else {
                write!(out, "0").unwrap();
            }
            if i + 1 < arity {
                write!(out, ",").unwrap();
            }
        }
        writeln!(out, "}}}};").unwrap();
        Ok(())
    }

    fn emit_operation(&mut self, out: &mut String, op: &Operation) -> Result<(), SynthesisError> {
        match op {
            Operation::Scan { relation, tuple_id, .. } => {
                self.check_arity(relation)?;
                let rel_name = self.mint.relation_name(relation);
                self.begin(out, "Scan");
                writeln!(out, "for(const auto& env{} : *{}) {{", tuple_id, rel_name).unwrap();
                self.emit_tuple_operation(out, op)?;
                writeln!(out, "}}").unwrap();
                self.end(out, "Scan");
            }
            Operation::ParallelScan { relation, tuple_id, .. } => {
                self.check_arity(relation)?;
                let preamble = self.take_preamble("scan", *tuple_id)?;
                let rel_name = self.mint.relation_name(relation);
                self.begin(out, "ParallelScan");
                writeln!(out, "auto part = {}->partition();", rel_name).unwrap();
                writeln!(out, "PARALLEL_START;").unwrap();
                out.push_str(&preamble);
                writeln!(out, "pfor(auto it = part.begin(); it<part.end();++it){{").unwrap();
                writeln!(out, "try{{").unwrap();
                writeln!(out, "for(const auto& env0 : *it) {{").unwrap();
                self.emit_tuple_operation(out, op)?;
                writeln!(out, "}}").unwrap();
                writeln!(out, "}} catch(std::exception &e) {{ SignalHandler::instance()->error(e.what());}}").unwrap();
                writeln!(out, "}}").unwrap();
                self.end(out, "ParallelScan");
            }
            Operation::IndexScan {
                relation,
                tuple_id,
                range_pattern,
                ..
            } => {
                self.check_arity(relation)?;
                let keys = signature_from_pattern(range_pattern);
                let rel_name = self.mint.relation_name(relation);
                let ctx = self.read_context(relation);
                self.begin(out, "IndexScan");
                self.emit_key_tuple(out, relation.arity(), range_pattern)?;
                writeln!(out, "auto range = {}->equalRange_{}(key,{});", rel_name, keys, ctx).unwrap();
                writeln!(out, "for(const auto& env{} : range) {{", tuple_id).unwrap();
                self.emit_tuple_operation(out, op)?;
                writeln!(out, "}}").unwrap();
                self.end(out, "IndexScan");
            }
            Operation::ParallelIndexScan {
                relation,
                tuple_id,
                range_pattern,
                ..
            } => {
                self.check_arity(relation)?;
                let preamble = self.take_preamble("index scan", *tuple_id)?;
                let keys = signature_from_pattern(range_pattern);
                let rel_name = self.mint.relation_name(relation);
                self.begin(out, "ParallelIndexScan");
                self.emit_key_tuple(out, relation.arity(), range_pattern)?;
                // the range query runs without a context here
                writeln!(out, "auto range = {}->equalRange_{}(key);", rel_name, keys).unwrap();
                writeln!(out, "auto part = range.partition();").unwrap();
                writeln!(out, "PARALLEL_START;").unwrap();
                out.push_str(&preamble);
                writeln!(out, "pfor(auto it = part.begin(); it<part.end(); ++it) {{").unwrap();
                writeln!(out, "try{{").unwrap();
                writeln!(out, "for(const auto& env0 : *it) {{").unwrap();
                self.emit_tuple_operation(out, op)?;
                writeln!(out, "}}").unwrap();
                writeln!(out, "}} catch(std::exception &e) {{ SignalHandler::instance()->error(e.what());}}").unwrap();
                writeln!(out, "}}").unwrap();
                self.end(out, "ParallelIndexScan");
            }
            Operation::Choice {
                relation,
                tuple_id,
                condition,
                ..
            } => {
                self.check_arity(relation)?;
                let rel_name = self.mint.relation_name(relation);
                self.begin(out, "Choice");
                writeln!(out, "for(const auto& env{} : *{}) {{", tuple_id, rel_name).unwrap();
                write!(out, "if( ").unwrap();
                self.emit_condition(out, condition)?;
                writeln!(out, ") {{").unwrap();
                self.emit_tuple_operation(out, op)?;
                writeln!(out, "break;").unwrap();
                writeln!(out, "}}").unwrap();
                writeln!(out, "}}").unwrap();
                self.end(out, "Choice");
            }
            Operation::ParallelChoice {
                relation,
                tuple_id,
                condition,
                ..
            } => {
                self.check_arity(relation)?;
                let preamble = self.take_preamble("choice", *tuple_id)?;
                let rel_name = self.mint.relation_name(relation);
                self.begin(out, "ParallelChoice");
                writeln!(out, "auto part = {}->partition();", rel_name).unwrap();
                writeln!(out, "PARALLEL_START;").unwrap();
                out.push_str(&preamble);
                writeln!(out, "pfor(auto it = part.begin(); it<part.end();++it){{").unwrap();
                writeln!(out, "try{{").unwrap();
                writeln!(out, "for(const auto& env0 : *it) {{").unwrap();
                write!(out, "if( ").unwrap();
                self.emit_condition(out, condition)?;
                writeln!(out, ") {{").unwrap();
                self.emit_tuple_operation(out, op)?;
                writeln!(out, "break;").unwrap();
                writeln!(out, "}}").unwrap();
                writeln!(out, "}}").unwrap();
                writeln!(out, "}} catch(std::exception &e) {{ SignalHandler::instance()->error(e.what());}}").unwrap();
                writeln!(out, "}}").unwrap();
                self.end(out, "ParallelChoice");
            }
            Operation::IndexChoice {
                relation,
                tuple_id,
                range_pattern,
                condition,
                ..
            } => {
                self.check_arity(relation)?;
                let keys = signature_from_pattern(range_pattern);
                let rel_name = self.mint.relation_name(relation);
                let ctx = self.read_context(relation);
                self.begin(out, "IndexChoice");
                self.emit_key_tuple(out, relation.arity(), range_pattern)?;
                writeln!(out, "auto range = {}->equalRange_{}(key,{});", rel_name, keys, ctx).unwrap();
                writeln!(out, "for(const auto& env{} : range) {{", tuple_id).unwrap();
                write!(out, "if( ").unwrap();
                self.emit_condition(out, condition)?;
                writeln!(out, ") {{").unwrap();
                self.emit_tuple_operation(out, op)?;
                writeln!(out, "break;").unwrap();
                writeln!(out, "}}").unwrap();
                writeln!(out, "}}").unwrap();
                self.end(out, "IndexChoice");
            }
            Operation::ParallelIndexChoice {
                relation,
                tuple_id,
                range_pattern,
                condition,
                ..
            } => {
                self.check_arity(relation)?;
                let preamble = self.take_preamble("index choice", *tuple_id)?;
                let keys = signature_from_pattern(range_pattern);
                let rel_name = self.mint.relation_name(relation);
                self.begin(out, "ParallelIndexChoice");
                self.emit_key_tuple(out, relation.arity(), range_pattern)?;
                // the range query runs without a context here
                writeln!(out, "auto range = {}->equalRange_{}(key);", rel_name, keys).unwrap();
                writeln!(out, "auto part = range.partition();").unwrap();
                writeln!(out, "PARALLEL_START;").unwrap();
                out.push_str(&preamble);
                writeln!(out, "pfor(auto it = part.begin(); it<part.end(); ++it) {{").unwrap();
                writeln!(out, "try{{").unwrap();
                writeln!(out, "for(const auto& env0 : *it) {{").unwrap();
                write!(out, "if( ").unwrap();
                self.emit_condition(out, condition)?;
                writeln!(out, ") {{").unwrap();
                self.emit_tuple_operation(out, op)?;
                writeln!(out, "break;").unwrap();
                writeln!(out, "}}").unwrap();
                writeln!(out, "}}").unwrap();
                writeln!(out, "}} catch(std::exception &e) {{ SignalHandler::instance()->error(e.what());}}").unwrap();
                writeln!(out, "}}").unwrap();
                self.end(out, "ParallelIndexChoice");
            }
            Operation::UnpackRecord {
                expression,
                arity,
                tuple_id,
                ..
            } => {
                self.begin(out, "UnpackRecord");
                let tuple_type = format!("ram::Tuple<RamDomain,{}>", arity);
                write!(out, "auto ref = ").unwrap();
                self.emit_expression(out, expression)?;
                writeln!(out, ";").unwrap();
                writeln!(out, "if (isNull<{}>(ref)) continue;", tuple_type).unwrap();
                writeln!(out, "{} env{} = unpack<{}>(ref);", tuple_type, tuple_id, tuple_type).unwrap();
                writeln!(out, "{{").unwrap();
                self.emit_tuple_operation(out, op)?;
                writeln!(out, "}}").unwrap();
                self.end(out, "UnpackRecord");
            }
            Operation::Aggregate {
                relation,
                tuple_id,
                function,
                expression,
                condition,
                ..
            } => {
                self.begin(out, "Aggregate");
                let rel_name = self.mint.relation_name(relation);
                writeln!(out, "ram::Tuple<RamDomain,1> env{};", tuple_id).unwrap();

                // counting every tuple needs no loop at all
                if *function == AggregateFunction::Count && condition.is_true() {
                    writeln!(out, "env{}[0] = {}->size();", tuple_id, rel_name).unwrap();
                    self.emit_tuple_operation(out, op)?;
                    self.end(out, "Aggregate");
                    return Ok(());
                }

                let init = aggregate_init(*function);
                writeln!(out, "RamDomain res{} = {};", tuple_id, init).unwrap();
                writeln!(out, "for(const auto& env{} : *{}) {{", tuple_id, rel_name).unwrap();
                write!(out, "if( ").unwrap();
                self.emit_condition(out, condition)?;
                writeln!(out, ") {{").unwrap();
                self.emit_aggregate_step(out, *function, *tuple_id, expression)?;
                writeln!(out, "}}").unwrap();
                writeln!(out, "}}").unwrap();
                writeln!(out, "env{0}[0] = res{0};", tuple_id).unwrap();
                if matches!(function, AggregateFunction::Min | AggregateFunction::Max) {
                    // proceed only when at least one tuple matched
                    writeln!(out, "if(res{} != {}){{", tuple_id, init).unwrap();
                    self.emit_tuple_operation(out, op)?;
                    writeln!(out, "}}").unwrap();
                } else {
                    self.emit_tuple_operation(out, op)?;
                }
                self.end(out, "Aggregate");
            }
            Operation::IndexAggregate {
                relation,
                tuple_id,
                function,
                expression,
                condition,
                range_pattern,
                ..
            } => {
                self.begin(out, "IndexAggregate");
                let arity = relation.arity();
                let rel_name = self.mint.relation_name(relation);
                let ctx = self.read_context(relation);
                let keys = signature_from_pattern(range_pattern);
                writeln!(out, "ram::Tuple<RamDomain,1> env{};", tuple_id).unwrap();

                if *function == AggregateFunction::Count && keys == 0 && condition.is_true() {
                    writeln!(out, "env{}[0] = {}->size();", tuple_id, rel_name).unwrap();
                    self.emit_tuple_operation(out, op)?;
                    self.end(out, "IndexAggregate");
                    return Ok(());
                }

                let init = aggregate_init(*function);
                writeln!(out, "RamDomain res{} = {};", tuple_id, init).unwrap();
                if keys == 0 {
                    writeln!(out, "for(const auto& env{} : *{}) {{", tuple_id, rel_name).unwrap();
                } else {
                    write!(out, "const ram::Tuple<RamDomain,{}> key{{{{", arity).unwrap();
                    for i in 0..arity {
                        if !range_pattern[i].is_undef() {
                            self.emit_expression(out, &range_pattern[i])?;
                        } else {
                            write!(out, "0").unwrap();
                        }
                        if i + 1 < arity {
                            write!(out, ",").unwrap();
                        }
                    }
                    writeln!(out, "}}}};").unwrap();
                    writeln!(out, "auto range = {}->equalRange_{}(key,{});", rel_name, keys, ctx).unwrap();
                    writeln!(out, "for(const auto& env{} : range) {{", tuple_id).unwrap();
                }
                write!(out, "if( ").unwrap();
                self.emit_condition(out, condition)?;
                writeln!(out, ") {{").unwrap();
                self.emit_aggregate_step(out, *function, *tuple_id, expression)?;
                writeln!(out, "}}").unwrap();
                writeln!(out, "}}").unwrap();
                writeln!(out, "env{0}[0] = res{0};", tuple_id).unwrap();
                if matches!(function, AggregateFunction::Min | AggregateFunction::Max) {
                    writeln!(out, "if(res{} != {}){{", tuple_id, init).unwrap();
                    self.emit_tuple_operation(out, op)?;
                    writeln!(out, "}}").unwrap();
                } else {
                    self.emit_tuple_operation(out, op)?;
                }
                self.end(out, "IndexAggregate");
            }
            Operation::Filter { condition, .. } => {
                self.begin(out, "Filter");
                write!(out, "if( ").unwrap();
                self.emit_condition(out, condition)?;
                writeln!(out, ") {{").unwrap();
                self.emit_nested(out, op)?;
                writeln!(out, "}}").unwrap();
                self.end(out, "Filter");
            }
            Operation::Break { condition, .. } => {
                self.begin(out, "Break");
                write!(out, "if( ").unwrap();
                self.emit_condition(out, condition)?;
                writeln!(out, ") break;").unwrap();
                self.emit_nested(out, op)?;
                self.end(out, "Break");
            }
            Operation::Project { relation, values } => {
                self.begin(out, "Project");
                let arity = relation.arity();
                let rel_name = self.mint.relation_name(relation);
                let ctx = self.read_context(relation);
                if values.is_empty() {
                    writeln!(out, "Tuple<RamDomain,{}> tuple{{{{}}}};", arity).unwrap();
                } else {
                    write!(out, "Tuple<RamDomain,{}> tuple{{{{static_cast<RamDomain>(", arity).unwrap();
                    for (i, value) in values.iter().enumerate() {
                        if i > 0 {
                            write!(out, "),static_cast<RamDomain>(").unwrap();
                        }
                        self.emit_expression(out, value)?;
                    }
                    writeln!(out, ")}}}};").unwrap();
                }
                writeln!(out, "{}->insert(tuple,{});", rel_name, ctx).unwrap();
                self.end(out, "Project");
            }
            Operation::ReturnValue { values } => {
                // the return vector is shared across workers
                writeln!(out, "std::lock_guard<std::mutex> guard(lock);").unwrap();
                for value in values {
                    if value.is_undef() {
                        writeln!(out, "ret.push_back(0);").unwrap();
                    } else {
                        write!(out, "ret.push_back(").unwrap();
                        self.emit_expression(out, value)?;
                        writeln!(out, ");").unwrap();
                    }
                }
            }
        }
        Ok(())
    }

    fn emit_aggregate_step(
        &mut self,
        out: &mut String,
        function: AggregateFunction,
        tuple_id: usize,
        expression: &Expression,
    ) -> Result<(), SynthesisError> {
        match function {
            AggregateFunction::Min => {
                write!(out, "res{0} = std::min(res{0},", tuple_id).unwrap();
                self.emit_expression(out, expression)?;
                writeln!(out, ");").unwrap();
            }
            AggregateFunction::Max => {
                write!(out, "res{0} = std::max(res{0},", tuple_id).unwrap();
                self.emit_expression(out, expression)?;
                writeln!(out, ");").unwrap();
            }
            AggregateFunction::Count => {
                writeln!(out, "++res{};", tuple_id).unwrap();
            }
            AggregateFunction::Sum => {
                write!(out, "res{} += ", tuple_id).unwrap();
                self.emit_expression(out, expression)?;
                writeln!(out, ";").unwrap();
            }
        }
        Ok(())
    }

    // -- conditions --

    fn emit_conjunction(
        &mut self,
        out: &mut String,
        conjuncts: &[&Condition],
    ) -> Result<(), SynthesisError> {
        for (i, cond) in conjuncts.iter().enumerate() {
            if i > 0 {
                write!(out, " && ").unwrap();
            }
            self.emit_condition(out, cond)?;
        }
        Ok(())
    }

    pub(crate) fn emit_condition(
        &mut self,
        out: &mut String,
        condition: &Condition,
    ) -> Result<(), SynthesisError> {
        match condition {
            Condition::True => {
                write!(out, "true").unwrap();
            }
            Condition::False => {
                write!(out, "false").unwrap();
            }
            Condition::Conjunction(lhs, rhs) => {
                self.emit_condition(out, lhs)?;
                write!(out, " && ").unwrap();
                self.emit_condition(out, rhs)?;
            }
            Condition::Negation(operand) => {
                write!(out, "!(").unwrap();
                self.emit_condition(out, operand)?;
                write!(out, ")").unwrap();
            }
            Condition::Constraint { op, lhs, rhs } => {
                self.emit_constraint(out, *op, lhs, rhs)?;
            }
            Condition::EmptinessCheck { relation } => {
                let rel_name = self.mint.relation_name(relation);
                write!(out, "{}->empty()", rel_name).unwrap();
            }
            Condition::ExistenceCheck { relation, values } => {
                self.check_arity(relation)?;
                let arity = relation.arity();
                let rel_name = self.mint.relation_name(relation);
                let ctx = self.read_context(relation);
                let mut after = "";
                if self.config.profiling() && !relation.is_temp() {
                    let idx = self.reads.lookup(&normalise_read_key(relation.name()));
                    write!(out, "(reads[{}]++,", idx).unwrap();
                    after = ")";
                }
                let keys = signature_from_pattern(values);
                if IndexAnalysis::is_total(relation, keys) {
                    write!(out, "{}->contains(Tuple<RamDomain,{}>{{{{", rel_name, arity).unwrap();
                    for (i, value) in values.iter().enumerate() {
                        if i > 0 {
                            write!(out, ",").unwrap();
                        }
                        self.emit_expression(out, value)?;
                    }
                    write!(out, "}}}},{}){}", ctx, after).unwrap();
                } else {
                    write!(out, "!{}->equalRange_{}(Tuple<RamDomain,{}>{{{{", rel_name, keys, arity).unwrap();
                    for (i, value) in values.iter().enumerate() {
                        if i > 0 {
                            write!(out, ",").unwrap();
                        }
                        if value.is_undef() {
                            write!(out, "0").unwrap();
                        } else {
                            self.emit_expression(out, value)?;
                        }
                    }
                    write!(out, "}}}},{}).empty(){}", ctx, after).unwrap();
                }
            }
            Condition::ProvenanceExistenceCheck { relation, values } => {
                let arity = relation.arity();
                let aux = relation.auxiliary_arity();
                let rel_name = self.mint.relation_name(relation);
                let ctx = self.read_context(relation);
                let keys = provenance_signature(values, aux);
                // range over data columns plus the level bound, then a
                // lexicographic comparison on the remaining height columns
                writeln!(out, "[&]() -> bool {{").unwrap();
                write!(
                    out,
                    "auto existenceCheck = {}->equalRange_{}(Tuple<RamDomain,{}>{{{{",
                    rel_name, keys, arity
                )
                .unwrap();
                for value in values.iter().take(values.len() - aux + 1) {
                    if value.is_undef() {
                        write!(out, "0").unwrap();
                    } else {
                        self.emit_expression(out, value)?;
                    }
                    write!(out, ",").unwrap();
                }
                for _ in 0..aux.saturating_sub(2) {
                    write!(out, "0,").unwrap();
                }
                write!(out, "0").unwrap();
                writeln!(out, "}}}},{});", ctx).unwrap();
                let height = arity - aux + 1;
                write!(
                    out,
                    "if (existenceCheck.empty()) return false; else return ((*existenceCheck.begin())[{}] <= ",
                    height
                )
                .unwrap();
                self.emit_expression(out, &values[height])?;
                write!(out, ")").unwrap();
                if aux > 2 {
                    write!(out, " && !((*existenceCheck.begin())[{}] == ", height).unwrap();
                    self.emit_expression(out, &values[height])?;
                    write!(out, " && (").unwrap();
                    write!(out, "(*existenceCheck.begin())[{}] > ", height + 1).unwrap();
                    self.emit_expression(out, &values[height + 1])?;
                    for i in (height + 2)..arity {
                        write!(out, " || (").unwrap();
                        for j in (height + 1)..i {
                            write!(out, "(*existenceCheck.begin())[{}] == ", j).unwrap();
                            self.emit_expression(out, &values[j])?;
                            write!(out, " && ").unwrap();
                        }
                        write!(out, "(*existenceCheck.begin())[{}] > ", i).unwrap();
                        self.emit_expression(out, &values[i])?;
                        write!(out, ")").unwrap();
                    }
                    write!(out, "))").unwrap();
                }
                writeln!(out, ";}}()").unwrap();
            }
        }
        Ok(())
    }

    fn emit_constraint(
        &mut self,
        out: &mut String,
        op: ConstraintOp,
        lhs: &Expression,
        rhs: &Expression,
    ) -> Result<(), SynthesisError> {
        use ConstraintOp::*;
        let relational = match op {
            Eq => Some("=="),
            Ne => Some("!="),
            Lt | ULt | FLt => Some("<"),
            Le | ULe | FLe => Some("<="),
            Gt | UGt | FGt => Some(">"),
            Ge | UGe | FGe => Some(">="),
            _ => None,
        };
        if let Some(sym) = relational {
            write!(out, "((").unwrap();
            self.emit_expression(out, lhs)?;
            write!(out, ") {} (", sym).unwrap();
            self.emit_expression(out, rhs)?;
            write!(out, "))").unwrap();
            return Ok(());
        }
        match op {
            Match | NotMatch => {
                if op == NotMatch {
                    write!(out, "!").unwrap();
                }
                write!(out, "regex_wrapper(symTable.resolve(").unwrap();
                self.emit_expression(out, lhs)?;
                write!(out, "),symTable.resolve(").unwrap();
                self.emit_expression(out, rhs)?;
                write!(out, "))").unwrap();
            }
            Contains | NotContains => {
                write!(out, "(symTable.resolve(").unwrap();
                self.emit_expression(out, rhs)?;
                write!(out, ").find(symTable.resolve(").unwrap();
                self.emit_expression(out, lhs)?;
                write!(
                    out,
                    ")) {} std::string::npos)",
                    if op == Contains { "!=" } else { "==" }
                )
                .unwrap();
            }
            _ => unreachable!("relational operators handled above"),
        }
        Ok(())
    }

    // -- expressions --

    pub(crate) fn emit_expression(
        &mut self,
        out: &mut String,
        expression: &Expression,
    ) -> Result<(), SynthesisError> {
        match expression {
            Expression::SignedConstant(value) => {
                write!(out, "RamSigned({})", value).unwrap();
            }
            Expression::UnsignedConstant(value) => {
                write!(out, "RamUnsigned({})", value).unwrap();
            }
            Expression::FloatConstant(value) => {
                write!(out, "RamFloat({})", value.into_inner()).unwrap();
            }
            Expression::TupleElement { tuple_id, column } => {
                write!(out, "env{}[{}]", tuple_id, column).unwrap();
            }
            Expression::AutoIncrement => {
                write!(out, "(ctr++)").unwrap();
            }
            Expression::Intrinsic { op, args } => {
                self.emit_intrinsic(out, *op, args)?;
            }
            Expression::UserDefined {
                name,
                type_signature,
                args,
            } => {
                let arity = type_signature.len() - 1;
                let bytes = type_signature.as_bytes();
                if bytes[arity] == b'S' {
                    write!(out, "symTable.lookup(").unwrap();
                }
                write!(out, "{}(", name).unwrap();
                for i in 0..arity {
                    if i > 0 {
                        write!(out, ",").unwrap();
                    }
                    if bytes[i] == b'N' {
                        write!(out, "((RamDomain)").unwrap();
                        self.emit_expression(out, &args[i])?;
                        write!(out, ")").unwrap();
                    } else {
                        write!(out, "symTable.resolve((RamDomain)").unwrap();
                        self.emit_expression(out, &args[i])?;
                        write!(out, ").c_str()").unwrap();
                    }
                }
                write!(out, ")").unwrap();
                if bytes[arity] == b'S' {
                    write!(out, ")").unwrap();
                }
            }
            Expression::PackRecord(args) => {
                write!(out, "pack(ram::Tuple<RamDomain,{}>({{", args.len()).unwrap();
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(out, ",").unwrap();
                    }
                    self.emit_expression(out, arg)?;
                }
                write!(out, "}}))").unwrap();
            }
            Expression::SubroutineArgument(index) => {
                write!(out, "(args)[{}]", index).unwrap();
            }
            Expression::Undef => return Err(SynthesisError::UndefinedValue),
        }
        Ok(())
    }

    fn emit_intrinsic(
        &mut self,
        out: &mut String,
        op: FunctorOp,
        args: &[Expression],
    ) -> Result<(), SynthesisError> {
        use FunctorOp::*;
        match op {
            Ord => self.emit_expression(out, &args[0])?,
            Strlen => {
                write!(out, "static_cast<RamDomain>(symTable.resolve(").unwrap();
                self.emit_expression(out, &args[0])?;
                write!(out, ").size())").unwrap();
            }
            Neg | FNeg => {
                write!(out, "(-(").unwrap();
                self.emit_expression(out, &args[0])?;
                write!(out, "))").unwrap();
            }
            BNot | UBNot => {
                write!(out, "(~(").unwrap();
                self.emit_expression(out, &args[0])?;
                write!(out, "))").unwrap();
            }
            LNot | ULNot => {
                write!(out, "(!(").unwrap();
                self.emit_expression(out, &args[0])?;
                write!(out, "))").unwrap();
            }
            ToString => {
                write!(out, "symTable.lookup(std::to_string(").unwrap();
                self.emit_expression(out, &args[0])?;
                write!(out, "))").unwrap();
            }
            ToNumber => {
                write!(out, "(wrapper_tonumber(symTable.resolve((size_t)").unwrap();
                self.emit_expression(out, &args[0])?;
                write!(out, ")))").unwrap();
            }
            FToU | IToU => {
                write!(out, "(static_cast<RamUnsigned>(").unwrap();
                self.emit_expression(out, &args[0])?;
                write!(out, "))").unwrap();
            }
            FToI | UToI => {
                write!(out, "(static_cast<RamSigned>(").unwrap();
                self.emit_expression(out, &args[0])?;
                write!(out, "))").unwrap();
            }
            IToF | UToF => {
                write!(out, "(static_cast<RamFloat>(").unwrap();
                self.emit_expression(out, &args[0])?;
                write!(out, "))").unwrap();
            }
            Add | UAdd | FAdd => self.emit_infix(out, args, "+")?,
            Sub | USub | FSub => self.emit_infix(out, args, "-")?,
            Mul | UMul | FMul => self.emit_infix(out, args, "*")?,
            Div | UDiv | FDiv => self.emit_infix(out, args, "/")?,
            Exp | UExp | FExp => {
                // widened so a 32-bit domain cannot wrap to negative
                write!(out, "static_cast<int64_t>(std::pow(").unwrap();
                self.emit_expression(out, &args[0])?;
                write!(out, ",").unwrap();
                self.emit_expression(out, &args[1])?;
                write!(out, "))").unwrap();
            }
            Mod | UMod => self.emit_infix(out, args, "%")?,
            BAnd | UBAnd => self.emit_infix(out, args, "&")?,
            BOr | UBOr => self.emit_infix(out, args, "|")?,
            BXor | UBXor => self.emit_infix(out, args, "^")?,
            LAnd | ULAnd => self.emit_infix(out, args, "&&")?,
            LOr | ULOr => self.emit_infix(out, args, "||")?,
            Max | UMax | FMax => {
                write!(out, "std::max({{").unwrap();
                for arg in args {
                    self.emit_expression(out, arg)?;
                    write!(out, ", ").unwrap();
                }
                write!(out, "}})").unwrap();
            }
            Min | UMin | FMin => {
                write!(out, "std::min({{").unwrap();
                for arg in args {
                    self.emit_expression(out, arg)?;
                    write!(out, ", ").unwrap();
                }
                write!(out, "}})").unwrap();
            }
            Cat => {
                write!(out, "symTable.lookup(").unwrap();
                for (i, arg) in args.iter().enumerate() {
                    write!(out, "symTable.resolve(").unwrap();
                    self.emit_expression(out, arg)?;
                    if i + 1 < args.len() {
                        write!(out, ") + ").unwrap();
                    }
                }
                write!(out, "))").unwrap();
            }
            Substr => {
                write!(out, "symTable.lookup(substr_wrapper(symTable.resolve(").unwrap();
                self.emit_expression(out, &args[0])?;
                write!(out, "),(").unwrap();
                self.emit_expression(out, &args[1])?;
                write!(out, "),(").unwrap();
                self.emit_expression(out, &args[2])?;
                write!(out, ")))").unwrap();
            }
        }
        Ok(())
    }

    fn emit_infix(
        &mut self,
        out: &mut String,
        args: &[Expression],
        sym: &str,
    ) -> Result<(), SynthesisError> {
        write!(out, "(").unwrap();
        self.emit_expression(out, &args[0])?;
        write!(out, ") {} (", sym).unwrap();
        self.emit_expression(out, &args[1])?;
        write!(out, ")").unwrap();
        Ok(())
    }
}

fn aggregate_init(function: AggregateFunction) -> &'static str {
    match function {
        AggregateFunction::Min => "MAX_RAM_DOMAIN",
        AggregateFunction::Max => "MIN_RAM_DOMAIN",
        AggregateFunction::Count | AggregateFunction::Sum => "0",
    }
}

// -- shared IO emission, also used by the program assembler --

pub(crate) fn type_attribute(kind: char) -> &'static str {
    match kind {
        'u' => "RamTypeAttribute::Unsigned",
        'f' => "RamTypeAttribute::Float",
        's' => "RamTypeAttribute::Symbol",
        'r' => "RamTypeAttribute::Record",
        _ => "RamTypeAttribute::Signed",
    }
}

pub(crate) fn symbol_mask(relation: &Relation) -> String {
    relation
        .type_kinds()
        .map(type_attribute)
        .collect::<Vec<_>>()
        .join(",")
}

pub(crate) fn directive_map_literal(directives: &IoDirectives) -> String {
    let entries: Vec<String> = directives
        .iter()
        .map(|(k, v)| format!("{{\"{}\",\"{}\"}}", escape_literal(k), escape_literal(v)))
        .collect();
    format!("{{{}}}", entries.join(","))
}

pub(crate) fn emit_load_directive(
    out: &mut String,
    relation: &Relation,
    rel_name: &str,
    directives: &IoDirectives,
) {
    write!(out, "try {{").unwrap();
    writeln!(
        out,
        "std::map<std::string, std::string> directiveMap({});",
        directive_map_literal(directives)
    )
    .unwrap();
    writeln!(out, "if (!inputDirectory.empty() && directiveMap[\"IO\"] == \"file\" && directiveMap[\"filename\"].front() != '/') {{directiveMap[\"filename\"] = inputDirectory + \"/\" + directiveMap[\"filename\"];}}").unwrap();
    writeln!(out, "IODirectives ioDirectives(directiveMap);").unwrap();
    writeln!(
        out,
        "IOSystem::getInstance().getReader(std::vector<RamTypeAttribute>({{{}}}), symTable, ioDirectives, {})->readAll(*{});",
        symbol_mask(relation),
        relation.auxiliary_arity(),
        rel_name
    )
    .unwrap();
    writeln!(
        out,
        "}} catch (std::exception& e) {{std::cerr << \"Error loading data: \" << e.what() << '\\n';}}"
    )
    .unwrap();
}

pub(crate) fn emit_store_directive(
    out: &mut String,
    relation: &Relation,
    rel_name: &str,
    directives: &IoDirectives,
) {
    write!(out, "try {{").unwrap();
    writeln!(
        out,
        "std::map<std::string, std::string> directiveMap({});",
        directive_map_literal(directives)
    )
    .unwrap();
    writeln!(out, "if (!outputDirectory.empty() && directiveMap[\"IO\"] == \"file\" && directiveMap[\"filename\"].front() != '/') {{directiveMap[\"filename\"] = outputDirectory + \"/\" + directiveMap[\"filename\"];}}").unwrap();
    writeln!(out, "IODirectives ioDirectives(directiveMap);").unwrap();
    writeln!(
        out,
        "IOSystem::getInstance().getWriter(std::vector<RamTypeAttribute>({{{}}}), symTable, ioDirectives, {})->writeAll(*{});",
        symbol_mask(relation),
        relation.auxiliary_arity(),
        rel_name
    )
    .unwrap();
    writeln!(out, "}} catch (std::exception& e) {{std::cerr << e.what();exit(1);}}").unwrap();
}

pub(crate) fn emit_stdout_dump(out: &mut String, relation: &Relation, rel_name: &str) {
    write!(out, "try {{").unwrap();
    writeln!(out, "IODirectives ioDirectives;").unwrap();
    writeln!(out, "ioDirectives.setIOType(\"stdout\");").unwrap();
    writeln!(
        out,
        "ioDirectives.setRelationName(\"{}\");",
        escape_literal(relation.name())
    )
    .unwrap();
    writeln!(
        out,
        "IOSystem::getInstance().getWriter(std::vector<RamTypeAttribute>({{{}}}), symTable, ioDirectives, {})->writeAll(*{});",
        symbol_mask(relation),
        relation.auxiliary_arity(),
        rel_name
    )
    .unwrap();
    writeln!(out, "}} catch (std::exception& e) {{std::cerr << e.what();exit(1);}}").unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ram::{Condition, ConstraintOp, Expression, FunctorOp, Operation, Statement};
    use crate::relation::Relation;
    use std::rc::Rc;

    fn edge() -> Rc<Relation> {
        Rc::new(Relation::plain("edge", &["x", "y"], &["i:number", "i:number"]))
    }

    fn emit_with(config: &SynthesiserConfig, stmt: &Statement) -> String {
        let mut mint = IdentifierMint::new();
        let mut freqs = ProfileRegistry::new();
        let mut reads = ProfileRegistry::new();
        let mut emitter = CodeEmitter::new(config, &mut mint, &mut freqs, &mut reads);
        let mut out = String::new();
        emitter.emit_statement(&mut out, stmt).unwrap();
        out
    }

    fn emit(stmt: &Statement) -> String {
        emit_with(&SynthesiserConfig::default(), stmt)
    }

    fn emit_expr(expr: &Expression) -> String {
        let config = SynthesiserConfig::default();
        let mut mint = IdentifierMint::new();
        let mut freqs = ProfileRegistry::new();
        let mut reads = ProfileRegistry::new();
        let mut emitter = CodeEmitter::new(&config, &mut mint, &mut freqs, &mut reads);
        let mut out = String::new();
        emitter.emit_expression(&mut out, expr).unwrap();
        out
    }

    #[test]
    fn test_loop_and_exit() {
        let stmt = Statement::looped(Statement::Exit(Condition::EmptinessCheck {
            relation: edge(),
        }));
        let code = emit(&stmt);
        assert!(code.contains("iter = 0;\nfor(;;) {"));
        assert!(code.contains("if(rel_1_edge->empty()) break;"));
        assert!(code.contains("iter++;"));
    }

    #[test]
    fn test_swap_emission() {
        let stmt = Statement::Swap {
            first: edge(),
            second: Rc::new(Relation::plain("path", &["x", "y"], &["i:number", "i:number"])),
        };
        let code = emit(&stmt);
        assert_eq!(code, "std::swap(rel_1_edge, rel_2_path);\n");
    }

    #[test]
    fn test_scan_binds_env_by_tuple_id() {
        let stmt = Statement::query(Operation::scan(
            edge(),
            0,
            Operation::project(edge(), vec![Expression::tuple_element(0, 1), Expression::tuple_element(0, 0)]),
        ));
        let code = emit(&stmt);
        assert!(code.contains("for(const auto& env0 : *rel_1_edge) {"));
        assert!(code.contains("Tuple<RamDomain,2> tuple{{static_cast<RamDomain>(env0[1]),static_cast<RamDomain>(env0[0])}};"));
        assert!(code.contains("rel_1_edge->insert(tuple,READ_OP_CONTEXT(rel_1_edge_op_ctxt));"));
        assert!(code.contains("CREATE_OP_CONTEXT(rel_1_edge_op_ctxt,rel_1_edge->createContext());"));
    }

    #[test]
    fn test_index_scan_fills_undef_slots_with_zero() {
        let stmt = Statement::query(Operation::index_scan(
            edge(),
            0,
            vec![Expression::signed(7), Expression::Undef],
            Operation::project(edge(), vec![]),
        ));
        let code = emit(&stmt);
        assert!(code.contains("const Tuple<RamDomain,2> key{{RamSigned(7),0}};"));
        assert!(code.contains("auto range = rel_1_edge->equalRange_1(key,READ_OP_CONTEXT(rel_1_edge_op_ctxt));"));
    }

    #[test]
    fn test_parallel_scan_requires_outermost_tuple_id() {
        let stmt = Statement::query(Operation::scan(
            edge(),
            0,
            Operation::parallel_scan(edge(), 1, Operation::project(edge(), vec![])),
        ));
        let config = SynthesiserConfig::default();
        let mut mint = IdentifierMint::new();
        let mut freqs = ProfileRegistry::new();
        let mut reads = ProfileRegistry::new();
        let mut emitter = CodeEmitter::new(&config, &mut mint, &mut freqs, &mut reads);
        let mut out = String::new();
        let err = emitter.emit_statement(&mut out, &stmt).unwrap_err();
        assert_eq!(err, SynthesisError::ParallelNotOutermost("scan"));
    }

    #[test]
    fn test_nullary_scan_is_rejected() {
        let nullary = Rc::new(Relation::new(
            "n",
            0,
            0,
            vec![],
            vec![],
            crate::relation::Representation::Default,
        ));
        let stmt = Statement::query(Operation::scan(nullary, 0, Operation::project(edge(), vec![])));
        let config = SynthesiserConfig::default();
        let mut mint = IdentifierMint::new();
        let mut freqs = ProfileRegistry::new();
        let mut reads = ProfileRegistry::new();
        let mut emitter = CodeEmitter::new(&config, &mut mint, &mut freqs, &mut reads);
        let mut out = String::new();
        let err = emitter.emit_statement(&mut out, &stmt).unwrap_err();
        assert_eq!(err, SynthesisError::NullaryRelation("n".to_string()));
    }

    #[test]
    fn test_undef_outside_pattern_is_fatal() {
        let stmt = Statement::query(Operation::scan(
            edge(),
            0,
            Operation::project(edge(), vec![Expression::Undef, Expression::signed(0)]),
        ));
        let config = SynthesiserConfig::default();
        let mut mint = IdentifierMint::new();
        let mut freqs = ProfileRegistry::new();
        let mut reads = ProfileRegistry::new();
        let mut emitter = CodeEmitter::new(&config, &mut mint, &mut freqs, &mut reads);
        let mut out = String::new();
        let err = emitter.emit_statement(&mut out, &stmt).unwrap_err();
        assert_eq!(err, SynthesisError::UndefinedValue);
    }

    #[test]
    fn test_aggregate_min_guards_on_sentinel() {
        let stmt = Statement::query(Operation::Aggregate {
            relation: edge(),
            tuple_id: 1,
            function: AggregateFunction::Min,
            expression: Expression::tuple_element(1, 0),
            condition: Condition::True,
            profile_text: None,
            body: Box::new(Operation::project(edge(), vec![])),
        });
        let code = emit(&stmt);
        assert!(code.contains("RamDomain res1 = MAX_RAM_DOMAIN;"));
        assert!(code.contains("res1 = std::min(res1,env1[0]);"));
        assert!(code.contains("env1[0] = res1;"));
        assert!(code.contains("if(res1 != MAX_RAM_DOMAIN){"));
    }

    #[test]
    fn test_count_over_true_short_circuits_to_size() {
        let stmt = Statement::query(Operation::Aggregate {
            relation: edge(),
            tuple_id: 1,
            function: AggregateFunction::Count,
            expression: Expression::signed(0),
            condition: Condition::True,
            profile_text: None,
            body: Box::new(Operation::project(edge(), vec![])),
        });
        let code = emit(&stmt);
        assert!(code.contains("env1[0] = rel_1_edge->size();"));
        assert!(!code.contains("for(const auto& env1"));
    }

    #[test]
    fn test_existence_check_total_uses_contains() {
        let cond = Condition::ExistenceCheck {
            relation: edge(),
            values: vec![Expression::signed(1), Expression::signed(2)],
        };
        let stmt = Statement::query(Operation::scan(
            edge(),
            0,
            Operation::filter(cond, Operation::project(edge(), vec![])),
        ));
        let code = emit(&stmt);
        assert!(code.contains("rel_1_edge->contains(Tuple<RamDomain,2>{{RamSigned(1),RamSigned(2)}},READ_OP_CONTEXT(rel_1_edge_op_ctxt))"));
    }

    #[test]
    fn test_existence_check_partial_uses_equal_range() {
        let cond = Condition::ExistenceCheck {
            relation: edge(),
            values: vec![Expression::signed(1), Expression::Undef],
        };
        let stmt = Statement::query(Operation::scan(
            edge(),
            0,
            Operation::filter(cond, Operation::project(edge(), vec![])),
        ));
        let code = emit(&stmt);
        assert!(code.contains("!rel_1_edge->equalRange_1(Tuple<RamDomain,2>{{RamSigned(1),0}},READ_OP_CONTEXT(rel_1_edge_op_ctxt)).empty()"));
    }

    #[test]
    fn test_unpack_record_skips_null_references() {
        let stmt = Statement::query(Operation::scan(
            edge(),
            0,
            Operation::UnpackRecord {
                expression: Expression::tuple_element(0, 0),
                arity: 2,
                tuple_id: 1,
                profile_text: None,
                body: Box::new(Operation::project(edge(), vec![])),
            },
        ));
        let code = emit(&stmt);
        assert!(code.contains("auto ref = env0[0];"));
        assert!(code.contains("if (isNull<ram::Tuple<RamDomain,2>>(ref)) continue;"));
        assert!(code.contains("ram::Tuple<RamDomain,2> env1 = unpack<ram::Tuple<RamDomain,2>>(ref);"));
    }

    #[test]
    fn test_intrinsic_fragments() {
        assert_eq!(
            emit_expr(&Expression::intrinsic(
                FunctorOp::Add,
                vec![Expression::signed(1), Expression::signed(2)]
            )),
            "(RamSigned(1)) + (RamSigned(2))"
        );
        assert_eq!(
            emit_expr(&Expression::intrinsic(
                FunctorOp::Exp,
                vec![Expression::signed(2), Expression::signed(31)]
            )),
            "static_cast<int64_t>(std::pow(RamSigned(2),RamSigned(31)))"
        );
        assert_eq!(
            emit_expr(&Expression::intrinsic(
                FunctorOp::Cat,
                vec![Expression::unsigned(3), Expression::unsigned(4)]
            )),
            "symTable.lookup(symTable.resolve(RamUnsigned(3)) + symTable.resolve(RamUnsigned(4)))"
        );
        assert_eq!(emit_expr(&Expression::AutoIncrement), "(ctr++)");
    }

    #[test]
    fn test_user_defined_operator_symbol_plumbing() {
        let expr = Expression::UserDefined {
            name: "f".to_string(),
            type_signature: "NSS".to_string(),
            args: vec![Expression::signed(1), Expression::unsigned(2)],
        };
        assert_eq!(
            emit_expr(&expr),
            "symTable.lookup(f(((RamDomain)RamSigned(1)),symTable.resolve((RamDomain)RamUnsigned(2)).c_str()))"
        );
    }

    #[test]
    fn test_constraint_variants_share_relational_operators() {
        let make = |op| {
            Condition::constraint(op, Expression::tuple_element(0, 0), Expression::signed(5))
        };
        for op in [ConstraintOp::Lt, ConstraintOp::ULt, ConstraintOp::FLt] {
            let stmt = Statement::Exit(make(op));
            let code = emit(&stmt);
            assert!(code.contains("if(((env0[0]) < (RamSigned(5)))) break;"), "{code}");
        }
    }

    #[test]
    fn test_comments_strip_back_to_plain_output() {
        let stmt = Statement::query(Operation::scan(
            edge(),
            0,
            Operation::project(edge(), vec![Expression::signed(1), Expression::signed(2)]),
        ));
        let plain = emit(&stmt);
        let commented = emit_with(
            &SynthesiserConfig {
                debug_report: true,
                ..SynthesiserConfig::default()
            },
            &stmt,
        );
        assert_ne!(plain, commented);
        let stripped: String = commented
            .lines()
            .filter(|line| !(line.starts_with("/* BEGIN ") || line.starts_with("/* END ")))
            .map(|line| format!("{line}\n"))
            .collect();
        assert_eq!(stripped, plain);
    }

    #[test]
    fn test_provenance_existence_check_height_comparison() {
        let names = vec!["x".into(), "rule".into(), "level".into()];
        let types = vec!["i:number".into(), "i:number".into(), "i:number".into()];
        let rel = Rc::new(Relation::new(
            "prov",
            3,
            2,
            names,
            types,
            crate::relation::Representation::Default,
        ));
        let cond = Condition::ProvenanceExistenceCheck {
            relation: rel.clone(),
            values: vec![
                Expression::tuple_element(0, 0),
                Expression::signed(0),
                Expression::tuple_element(0, 2),
            ],
        };
        let stmt = Statement::query(Operation::scan(
            edge(),
            0,
            Operation::filter(cond, Operation::project(edge(), vec![])),
        ));
        let code = emit(&stmt);
        assert!(code.contains("[&]() -> bool {"));
        assert!(code.contains("if (existenceCheck.empty()) return false; else return ((*existenceCheck.begin())[2] <= env0[2])"));
    }
}
