//! End-to-end synthesis scenarios.
//!
//! Each test builds a small RAM program, runs the full synthesiser, and
//! checks the shape of the emitted compilation unit rather than individual
//! fragments.

use crate::codegen::Synthesiser;
use crate::config::SynthesiserConfig;
use crate::ram::{Condition, ConstraintOp, Expression, Operation, Program, Statement};
use crate::relation::{IoDirectives, Relation, Representation};
use crate::symbols::SymbolTable;
use crate::TranslationUnit;
use std::rc::Rc;

fn binary(name: &str) -> Rc<Relation> {
    Rc::new(Relation::plain(name, &["x", "y"], &["i:number", "i:number"]))
}

fn generate(unit: TranslationUnit, config: SynthesiserConfig, id: &str) -> String {
    Synthesiser::new(unit, config).generate(id).unwrap().code
}

/// `N("0"). A("0",x) :- N(x).`
fn nullary_fact_unit() -> TranslationUnit {
    let mut symbols = SymbolTable::new();
    let zero = symbols.intern("0");
    let n = Rc::new(Relation::plain("N", &["x"], &["s:symbol"]));
    let a = Rc::new(Relation::plain("A", &["a", "b"], &["s:symbol", "s:symbol"]));
    let main = Statement::sequence(vec![
        Statement::query(Operation::project(
            n.clone(),
            vec![Expression::signed(zero.as_u32() as i64)],
        )),
        Statement::query(Operation::scan(
            n.clone(),
            0,
            Operation::project(
                a.clone(),
                vec![
                    Expression::signed(zero.as_u32() as i64),
                    Expression::tuple_element(0, 0),
                ],
            ),
        )),
        Statement::Store {
            relation: a.clone(),
            directives: vec![IoDirectives::file("A", "A.csv")],
        },
    ]);
    TranslationUnit::new(Program::new(vec![n, a], main), symbols)
}

#[test]
fn test_fact_and_rule_program_shape() {
    let code = generate(nullary_fact_unit(), SynthesiserConfig::default(), "facts");
    // one member per relation
    assert!(code.contains("std::unique_ptr<t_btree_1__0> rel_1_N = std::make_unique<t_btree_1__0>();"));
    assert!(code.contains("std::unique_ptr<t_btree_2__0_1> rel_2_A = std::make_unique<t_btree_2__0_1>();"));
    // the fact insert, then the scan projecting into A
    assert!(code.contains("Tuple<RamDomain,1> tuple{{static_cast<RamDomain>(RamSigned(0))}};"));
    assert!(code.contains("rel_1_N->insert(tuple,READ_OP_CONTEXT(rel_1_N_op_ctxt));"));
    assert!(code.contains("for(const auto& env0 : *rel_1_N) {"));
    assert!(code.contains(
        "Tuple<RamDomain,2> tuple{{static_cast<RamDomain>(RamSigned(0)),static_cast<RamDomain>(env0[0])}};"
    ));
    assert!(code.contains("rel_2_A->insert(tuple,READ_OP_CONTEXT(rel_2_A_op_ctxt));"));
    // the interned literal rides along in the symbol table
    assert!(code.contains("\tR\"_(0)_\","));
    // store is registered as an output
    assert!(code.contains("addRelation(\"A\",&wrapper_rel_2_A,false,true);"));
}

#[test]
fn test_parallel_scan_creates_contexts_inside_workers() {
    let edge = binary("edge");
    let path = binary("path");
    let main = Statement::query(Operation::parallel_scan(
        edge.clone(),
        0,
        Operation::project(
            path.clone(),
            vec![
                Expression::tuple_element(0, 0),
                Expression::tuple_element(0, 1),
            ],
        ),
    ));
    let unit = TranslationUnit::new(Program::new(vec![edge, path], main), SymbolTable::new());
    let code = generate(unit, SynthesiserConfig::default(), "par");

    assert!(code.contains("auto part = rel_1_edge->partition();"));
    assert!(code.contains("pfor(auto it = part.begin(); it<part.end();++it){"));
    // contexts are created inside the parallel region, one set per worker
    let start = code.find("PARALLEL_START;").unwrap();
    let ctxt = code.find("CREATE_OP_CONTEXT(").unwrap();
    let pfor = code.find("pfor(").unwrap();
    assert!(start < ctxt && ctxt < pfor);
    // each worker catches its own failures
    assert!(code.contains("} catch(std::exception &e) { SignalHandler::instance()->error(e.what());}"));
    assert!(code.contains("PARALLEL_END;"));
}

#[test]
fn test_filter_split_hoists_context_free_conjuncts() {
    let edge = binary("edge");
    let path = binary("path");
    let guard = Condition::conjunction(
        Condition::ExistenceCheck {
            relation: path.clone(),
            values: vec![Expression::signed(1), Expression::signed(2)],
        },
        Condition::constraint(
            ConstraintOp::Lt,
            Expression::signed(1),
            Expression::signed(2),
        ),
    );
    let main = Statement::query(Operation::filter(
        guard,
        Operation::scan(
            edge.clone(),
            0,
            Operation::project(
                path.clone(),
                vec![
                    Expression::tuple_element(0, 0),
                    Expression::tuple_element(0, 1),
                ],
            ),
        ),
    ));
    let unit = TranslationUnit::new(Program::new(vec![edge, path], main), SymbolTable::new());
    let code = generate(unit, SynthesiserConfig::default(), "split");

    let comparison = code
        .find("if(((RamSigned(1)) < (RamSigned(2))))")
        .expect("hoisted comparison");
    let lambda = code.find("[&]()").unwrap();
    let ctxt = code.find("CREATE_OP_CONTEXT(").unwrap();
    let existence = code.find("->contains(").unwrap();
    // the pure comparison runs before the outlined scope; the existence
    // check stays behind the context creation
    assert!(comparison < lambda);
    assert!(lambda < ctxt);
    assert!(ctxt < existence);
}

#[test]
fn test_transitive_closure_program() {
    let edge = binary("edge");
    let path = binary("path");
    let delta = binary("@delta_path");
    let new = binary("@new_path");

    let step = Operation::scan(
        delta.clone(),
        0,
        Operation::index_scan(
            edge.clone(),
            1,
            vec![Expression::tuple_element(0, 1), Expression::Undef],
            Operation::filter(
                Condition::negation(Condition::ExistenceCheck {
                    relation: path.clone(),
                    values: vec![
                        Expression::tuple_element(0, 0),
                        Expression::tuple_element(1, 1),
                    ],
                }),
                Operation::project(
                    new.clone(),
                    vec![
                        Expression::tuple_element(0, 0),
                        Expression::tuple_element(1, 1),
                    ],
                ),
            ),
        ),
    );

    let copy = |from: &Rc<Relation>, to: &Rc<Relation>| {
        Statement::query(Operation::scan(
            from.clone(),
            0,
            Operation::project(
                to.clone(),
                vec![
                    Expression::tuple_element(0, 0),
                    Expression::tuple_element(0, 1),
                ],
            ),
        ))
    };

    let main = Statement::sequence(vec![
        Statement::Load {
            relation: edge.clone(),
            directives: vec![IoDirectives::file("edge", "edge.facts")],
        },
        copy(&edge, &path),
        copy(&path, &delta),
        Statement::looped(Statement::sequence(vec![
            Statement::query(step),
            Statement::Exit(Condition::EmptinessCheck { relation: new.clone() }),
            copy(&new, &path),
            Statement::Swap {
                first: delta.clone(),
                second: new.clone(),
            },
            Statement::Clear { relation: new.clone() },
        ])),
        Statement::Store {
            relation: path.clone(),
            directives: vec![IoDirectives::file("path", "path.csv")],
        },
    ]);

    let unit = TranslationUnit::new(
        Program::new(vec![edge, path, delta, new], main),
        SymbolTable::new(),
    );
    let code = generate(unit, SynthesiserConfig::default(), "tc");

    // fixpoint scaffolding
    assert!(code.contains("iter = 0;\nfor(;;) {"));
    assert!(code.contains("if(rel_4_new_path->empty()) break;"));
    assert!(code.contains("std::swap(rel_3_delta_path, rel_4_new_path);"));
    // temporary relations purge unconditionally, others only on IO runs
    assert!(code.contains("if (!isHintsProfilingEnabled()) rel_4_new_path->purge();"));
    // the join uses the indexed range over edge
    assert!(code.contains("const Tuple<RamDomain,2> key{{env0[1],0}};"));
    assert!(code.contains("auto range = rel_1_edge->equalRange_1(key,READ_OP_CONTEXT(rel_1_edge_op_ctxt));"));
    // the duplicate check is a total existence check
    assert!(code.contains("!(rel_2_path->contains(Tuple<RamDomain,2>{{env0[0],env1[1]}},READ_OP_CONTEXT(rel_2_path_op_ctxt)))"));
    // IO plumbing with directory prefixing
    assert!(code.contains("std::map<std::string, std::string> directiveMap({{\"IO\",\"file\"},{\"filename\",\"edge.facts\"},{\"name\",\"edge\"}});"));
    assert!(code.contains("directiveMap[\"filename\"] = inputDirectory + \"/\" + directiveMap[\"filename\"];"));
    assert!(code.contains("addRelation(\"edge\",&wrapper_rel_1_edge,true,false);"));
    assert!(code.contains("addRelation(\"path\",&wrapper_rel_2_path,false,true);"));
    // temporaries get no wrapper
    assert!(!code.contains("wrapper_rel_3_delta_path"));
    // delta and new share one container type definition
    assert_eq!(code.matches("struct t_btree_2__0_1 {").count(), 1);
}

#[test]
fn test_debug_report_adds_only_comment_lines() {
    let plain = generate(nullary_fact_unit(), SynthesiserConfig::default(), "facts");
    let commented = generate(
        nullary_fact_unit(),
        SynthesiserConfig {
            debug_report: true,
            ..SynthesiserConfig::default()
        },
        "facts",
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
fn test_parallel_sections_statement() {
    let edge = binary("edge");
    let path = binary("path");
    let copy = |from: &Rc<Relation>, to: &Rc<Relation>| {
        Statement::query(Operation::scan(
            from.clone(),
            0,
            Operation::project(
                to.clone(),
                vec![
                    Expression::tuple_element(0, 0),
                    Expression::tuple_element(0, 1),
                ],
            ),
        ))
    };
    let main = Statement::Parallel(vec![copy(&edge, &path), copy(&path, &edge)]);
    let unit = TranslationUnit::new(
        Program::new(vec![edge, path], main),
        SymbolTable::new(),
    );
    let code = generate(unit, SynthesiserConfig::default(), "sections");
    assert!(code.contains("SECTIONS_START;"));
    assert_eq!(code.matches("SECTION_START;").count(), 2);
    assert_eq!(code.matches("SECTION_END").count(), 2);
    assert!(code.contains("SECTIONS_END;"));
}

#[test]
fn test_provenance_program_emits_subroutines_and_dispatcher() {
    let names = vec!["x".into(), "y".into(), "rule".into(), "level".into()];
    let types: Vec<String> = vec![
        "i:number".into(),
        "i:number".into(),
        "i:number".into(),
        "i:number".into(),
    ];
    let prov = Rc::new(Relation::new("path", 4, 2, names, types, Representation::Default));
    let info = Rc::new(Relation::new(
        "@info_path",
        2,
        0,
        vec!["rule".into(), "text".into()],
        vec!["i:number".into(), "s:symbol".into()],
        Representation::Info,
    ));

    let subroutine = Statement::query(Operation::filter(
        Condition::ProvenanceExistenceCheck {
            relation: prov.clone(),
            values: vec![
                Expression::SubroutineArgument(0),
                Expression::SubroutineArgument(1),
                Expression::signed(0),
                Expression::SubroutineArgument(2),
            ],
        },
        Operation::ReturnValue {
            values: vec![Expression::SubroutineArgument(0)],
        },
    ));

    let main = Statement::query(Operation::scan(
        prov.clone(),
        0,
        Operation::project(
            prov.clone(),
            vec![
                Expression::tuple_element(0, 0),
                Expression::tuple_element(0, 1),
                Expression::tuple_element(0, 2),
                Expression::tuple_element(0, 3),
            ],
        ),
    ));

    let program = Program::new(vec![prov, info], main)
        .with_subroutines(vec![("path_subproof".to_string(), subroutine)]);
    let unit = TranslationUnit::new(program, SymbolTable::new());
    let config = SynthesiserConfig {
        provenance: Some(crate::config::ProvenanceMode::Explain),
        ..SynthesiserConfig::default()
    };
    let code = generate(unit, config, "prov");

    assert!(code.contains("#include <mutex>"));
    assert!(code.contains("#include \"stratum/Explain.h\""));
    assert!(code.contains("void executeSubroutine(std::string name, const std::vector<RamDomain>& args, std::vector<RamDomain>& ret) override {"));
    assert!(code.contains("if (name == \"path_subproof\") {"));
    assert!(code.contains("subproof_0(args, ret);"));
    assert!(code.contains("void subproof_0(const std::vector<RamDomain>& args, std::vector<RamDomain>& ret) {"));
    assert!(code.contains("std::mutex lock;"));
    assert!(code.contains("std::lock_guard<std::mutex> guard(lock);"));
    assert!(code.contains("ret.push_back((args)[0]);"));
    // the height comparison from the provenance existence check
    assert!(code.contains("(*existenceCheck.begin())[3] <= (args)[2]"));
    // info relations are stored without indexes
    assert!(code.contains("struct t_info_2 {"));
    assert!(code.contains("std::vector<t_tuple> data;"));
}

#[test]
fn test_profile_scaffolding_and_read_counters() {
    let edge = binary("edge");
    let path = binary("path");
    let main = Statement::query(Operation::scan(
        edge.clone(),
        0,
        Operation::filter(
            Condition::ExistenceCheck {
                relation: path.clone(),
                values: vec![
                    Expression::tuple_element(0, 0),
                    Expression::tuple_element(0, 1),
                ],
            },
            Operation::project(
                path.clone(),
                vec![
                    Expression::tuple_element(0, 0),
                    Expression::tuple_element(0, 1),
                ],
            ),
        )
        .with_profile_text("path-rule"),
    ));
    let unit = TranslationUnit::new(Program::new(vec![edge, path], main), SymbolTable::new());
    let code = generate(unit, SynthesiserConfig::profiled("p.log"), "prof");

    assert!(code.contains("std::string profiling_fname;"));
    assert!(code.contains("ProfileEventSingleton::instance().setOutputFile(profiling_fname);"));
    assert!(code.contains("size_t reads[1]{};"));
    assert!(code.contains("(reads[0]++,"));
    assert!(code.contains("Logger logger(\"@runtime;\", 0);"));
    assert!(code.contains("makeConfigRecord(\"relationCount\", std::to_string(2));"));
    assert!(code.contains("\tProfileEventSingleton::instance().makeQuantityEvent(R\"_(@relation-reads;path)_\", reads[0],0);"));
}
