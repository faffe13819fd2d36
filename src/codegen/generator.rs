//! The synthesiser driver: state, the profile pre-pass, and assembly of the
//! complete compilation unit.
//!
//! [`Synthesiser::generate`] produces one C++ translation unit: includes,
//! extern declarations for user-defined functors, one container type per
//! unique realisation, the program class (symbol table, relation members and
//! wrappers, constructor, run/load/print/dump methods, optional provenance
//! subroutines) and the factory plus entry-point scaffolding.

use crate::codegen::emitter::{
    emit_load_directive, emit_store_directive, emit_stdout_dump, CodeEmitter,
};
use crate::codegen::idents::{normalise_read_key, IdentifierMint, ProfileRegistry};
use crate::codegen::relation_type::Realisation;
use crate::codegen::{escape_literal, raw_string, SynthesisError};
use crate::config::{ProvenanceMode, SynthesiserConfig};
use crate::ram::{Condition, Expression, Operation, Statement};
use crate::relation::{Relation, Representation};
use crate::TranslationUnit;
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::rc::Rc;
use tracing::{debug, info};

/// Result of one synthesis run.
#[derive(Debug)]
pub struct Synthesis {
    /// The complete C++ compilation unit.
    pub code: String,
    /// Whether the program calls user-defined functors that must be linked
    /// from a shared library.
    pub uses_shared_library: bool,
}

/// One synthesiser instance per compilation. All state is instance-local, so
/// compiling twice from fresh instances yields byte-identical output.
pub struct Synthesiser {
    config: SynthesiserConfig,
    unit: TranslationUnit,
    mint: IdentifierMint,
    type_cache: FxHashSet<String>,
    freqs: ProfileRegistry,
    reads: ProfileRegistry,
}

impl Synthesiser {
    pub fn new(unit: TranslationUnit, config: SynthesiserConfig) -> Self {
        Synthesiser {
            config,
            unit,
            mint: IdentifierMint::new(),
            type_cache: FxHashSet::default(),
            freqs: ProfileRegistry::new(),
            reads: ProfileRegistry::new(),
        }
    }

    pub fn config(&self) -> &SynthesiserConfig {
        &self.config
    }

    pub fn unit(&self) -> &TranslationUnit {
        &self.unit
    }

    /// Synthesise the complete compilation unit for program id `id`.
    pub fn generate(&mut self, id: &str) -> Result<Synthesis, SynthesisError> {
        let Synthesiser {
            config,
            unit,
            mint,
            type_cache,
            freqs,
            reads,
        } = self;
        let classname = format!("St_{}", id);
        let mut os = String::new();

        // counter arrays are declared before the main statement is lowered,
        // so register every key the emission will touch up front
        if config.profiling() {
            let mut freq_texts: Vec<String> = Vec::new();
            let mut read_names: Vec<String> = Vec::new();
            let mut collect = |stmt: &Statement| {
                stmt.for_each(&mut |s| {
                    if let Statement::Query(op) = s {
                        // an outermost filter is dissolved by the query
                        // lowering; its own profile text never surfaces
                        let skip_root = matches!(op, Operation::Filter { .. });
                        let mut is_root = true;
                        op.for_each(&mut |inner| {
                            if !(is_root && skip_root) {
                                if let Some(text) = inner.profile_text() {
                                    freq_texts.push(text.to_string());
                                }
                            }
                            is_root = false;
                        });
                    }
                });
                stmt.for_each_condition(&mut |cond| {
                    if let Condition::ExistenceCheck { relation, .. } = cond {
                        if !relation.is_temp() {
                            read_names.push(relation.name().to_string());
                        }
                    }
                });
            };
            collect(unit.program().main());
            for (_, body) in unit.program().subroutines() {
                collect(body);
            }
            for text in freq_texts {
                freqs.lookup(&text);
            }
            for name in read_names {
                reads.lookup(&normalise_read_key(&name));
            }
        }

        // -- includes --
        writeln!(os).unwrap();
        writeln!(os, "#include \"stratum/CompiledStratum.h\"").unwrap();
        if config.provenance.is_some() {
            writeln!(os, "#include <mutex>").unwrap();
            writeln!(os, "#include \"stratum/Explain.h\"").unwrap();
        }
        if config.live_profile {
            writeln!(os, "#include <thread>").unwrap();
            writeln!(os, "#include \"stratum/profile/Tui.h\"").unwrap();
        }
        writeln!(os).unwrap();

        // -- extern declarations for user-defined functors --
        let mut functors: BTreeMap<String, String> = BTreeMap::new();
        let mut collect_functors = |stmt: &Statement| {
            stmt.for_each_expression(&mut |expr| {
                if let Expression::UserDefined {
                    name,
                    type_signature,
                    ..
                } = expr
                {
                    functors
                        .entry(name.clone())
                        .or_insert_with(|| type_signature.clone());
                }
            });
        };
        collect_functors(unit.program().main());
        for (_, body) in unit.program().subroutines() {
            collect_functors(body);
        }
        let uses_shared_library = !functors.is_empty();

        writeln!(os, "extern \"C\" {{").unwrap();
        for (name, signature) in &functors {
            let arity = signature.len() - 1;
            let bytes = signature.as_bytes();
            let ret = if bytes[arity] == b'S' {
                "const char * "
            } else {
                "stratum::RamDomain "
            };
            let params: Vec<&str> = bytes[..arity]
                .iter()
                .map(|&b| {
                    if b == b'N' {
                        "stratum::RamDomain"
                    } else {
                        "const char *"
                    }
                })
                .collect();
            writeln!(os, "{}{}({});", ret, name, params.join(",")).unwrap();
        }
        writeln!(os, "}}").unwrap();
        writeln!(os).unwrap();
        writeln!(os, "namespace stratum {{").unwrap();
        writeln!(os, "using namespace ram;").unwrap();

        // -- relation container types, one per unique realisation --
        for relation in unit.program().relations() {
            let realisation = realisation_for(config, unit, relation);
            let type_name = realisation.type_name();
            if type_cache.insert(type_name.clone()) {
                debug!(relation = relation.name(), %type_name, "emitting relation container type");
                realisation.generate_type_struct(&mut os);
            }
        }
        writeln!(os).unwrap();

        writeln!(os, "class {} : public StratumProgram {{", classname).unwrap();

        // inline helpers for regex, substring and numeric conversion
        writeln!(os, "private:").unwrap();
        writeln!(os, "static inline bool regex_wrapper(const std::string& pattern, const std::string& text) {{").unwrap();
        writeln!(os, "   bool result = false; ").unwrap();
        writeln!(os, "   try {{ result = std::regex_match(text, std::regex(pattern)); }} catch(...) {{ ").unwrap();
        writeln!(os, "     std::cerr << \"warning: wrong pattern provided for match(\\\"\" << pattern << \"\\\",\\\"\" << text << \"\\\").\\n\";").unwrap();
        writeln!(os, "}}").unwrap();
        writeln!(os, "   return result;").unwrap();
        writeln!(os, "}}").unwrap();
        writeln!(os, "private:").unwrap();
        writeln!(os, "static inline std::string substr_wrapper(const std::string& str, size_t idx, size_t len) {{").unwrap();
        writeln!(os, "   std::string result; ").unwrap();
        writeln!(os, "   try {{ result = str.substr(idx,len); }} catch(...) {{ ").unwrap();
        writeln!(os, "     std::cerr << \"warning: wrong index position provided by substr(\\\"\";").unwrap();
        writeln!(os, "     std::cerr << str << \"\\\",\" << (int32_t)idx << \",\" << (int32_t)len << \") functor.\\n\";").unwrap();
        writeln!(os, "   }} return result;").unwrap();
        writeln!(os, "}}").unwrap();
        writeln!(os, "private:").unwrap();
        writeln!(os, "static inline RamDomain wrapper_tonumber(const std::string& str) {{").unwrap();
        writeln!(os, "   RamDomain result=0; ").unwrap();
        writeln!(os, "   try {{ result = stord(str); }} catch(...) {{ ").unwrap();
        writeln!(os, "     std::cerr << \"error: wrong string provided by to_number(\\\"\";").unwrap();
        writeln!(os, "     std::cerr << str << \"\\\") functor.\\n\";").unwrap();
        writeln!(os, "     raise(SIGFPE);").unwrap();
        writeln!(os, "   }} return result;").unwrap();
        writeln!(os, "}}").unwrap();
        if config.profiling() {
            writeln!(os, "std::string profiling_fname;").unwrap();
        }
        writeln!(os, "public:").unwrap();

        // -- symbol table --
        writeln!(os, "// -- initialize symbol table --").unwrap();
        write!(os, "SymbolTable symTable").unwrap();
        if !unit.symbols().is_empty() {
            writeln!(os).unwrap();
            writeln!(os, "{{").unwrap();
            for symbol in unit.symbols().iter() {
                writeln!(os, "\t{},", raw_string(symbol)).unwrap();
            }
            write!(os, "}}").unwrap();
        }
        writeln!(os, ";").unwrap();

        // -- profile counter arrays --
        if config.profiling() {
            writeln!(os, "private:").unwrap();
            if !freqs.is_empty() {
                writeln!(os, "  size_t freqs[{}]{{}};", freqs.len()).unwrap();
            }
            if !reads.is_empty() {
                writeln!(os, "  size_t reads[{}]{{}};", reads.len()).unwrap();
            }
        }

        // -- relation members and wrappers --
        let mut store_relations: FxHashSet<String> = FxHashSet::default();
        let mut load_relations: FxHashSet<String> = FxHashSet::default();
        unit.program().main().for_each(&mut |s| match s {
            Statement::Store { relation, .. } => {
                store_relations.insert(relation.name().to_string());
            }
            Statement::Load { relation, .. } => {
                load_relations.insert(relation.name().to_string());
            }
            _ => {}
        });

        let mut init_cons = String::new();
        let mut register_rel = String::new();
        let mut rel_ctr = 0usize;
        for relation in unit.program().relations() {
            let arity = relation.arity();
            let aux = relation.auxiliary_arity();
            let datalog_name = relation.name();
            let cpp_name = mint.relation_name(relation);
            let realisation = realisation_for(config, unit, relation);
            let type_name = realisation.type_name();

            writeln!(os, "// -- Table: {}", datalog_name).unwrap();
            writeln!(
                os,
                "std::unique_ptr<{0}> {1} = std::make_unique<{0}>();",
                type_name, cpp_name
            )
            .unwrap();
            if !relation.is_temp() {
                writeln!(
                    os,
                    "stratum::RelationWrapper<{},{},Tuple<RamDomain,{}>,{},{}> wrapper_{};",
                    rel_ctr, type_name, arity, arity, aux, cpp_name
                )
                .unwrap();
                rel_ctr += 1;

                let quote_all = |items: &[String]| -> String {
                    items
                        .iter()
                        .map(|s| format!("\"{}\"", escape_literal(s)))
                        .collect::<Vec<_>>()
                        .join(",")
                };
                let tuple_type = format!(
                    "std::array<const char *,{}>{{{{{}}}}}",
                    arity,
                    quote_all(relation.attribute_types())
                );
                let tuple_name = format!(
                    "std::array<const char *,{}>{{{{{}}}}}",
                    arity,
                    quote_all(relation.attribute_names())
                );
                if !init_cons.is_empty() {
                    init_cons.push_str(",\n");
                }
                write!(
                    init_cons,
                    "\nwrapper_{0}(*{0},symTable,\"{1}\",{2},{3})",
                    cpp_name,
                    escape_literal(datalog_name),
                    tuple_type,
                    tuple_name
                )
                .unwrap();
                writeln!(
                    register_rel,
                    "addRelation(\"{}\",&wrapper_{},{},{});",
                    escape_literal(datalog_name),
                    cpp_name,
                    load_relations.contains(datalog_name),
                    store_relations.contains(datalog_name)
                )
                .unwrap();
            }
        }
        writeln!(os, "public:").unwrap();

        // -- constructor and destructor --
        write!(os, "{}", classname).unwrap();
        if config.profiling() {
            write!(os, "(std::string pf=\"profile.log\") : profiling_fname(pf)").unwrap();
            if !init_cons.is_empty() {
                write!(os, ",\n{}", init_cons).unwrap();
            }
        } else {
            write!(os, "()").unwrap();
            if !init_cons.is_empty() {
                write!(os, " : {}", init_cons).unwrap();
            }
        }
        writeln!(os, "{{").unwrap();
        if config.profiling() {
            writeln!(os, "ProfileEventSingleton::instance().setOutputFile(profiling_fname);").unwrap();
        }
        os.push_str(&register_rel);
        writeln!(os, "}}").unwrap();
        writeln!(os, "~{}() {{", classname).unwrap();
        writeln!(os, "}}").unwrap();

        // -- run function --
        writeln!(os, "private:").unwrap();
        writeln!(os, "void runFunction(std::string inputDirectory = \".\", std::string outputDirectory = \".\", bool performIO = false) {{").unwrap();
        writeln!(os, "SignalHandler::instance()->set();").unwrap();
        if config.verbose {
            writeln!(os, "SignalHandler::instance()->enableLogging();").unwrap();
        }
        let mut has_increment = false;
        unit.program().main().for_each_expression(&mut |expr| {
            if matches!(expr, Expression::AutoIncrement) {
                has_increment = true;
            }
        });
        if has_increment {
            writeln!(os, "// -- initialize counter --").unwrap();
            writeln!(os, "std::atomic<RamDomain> ctr(0);").unwrap();
            writeln!(os).unwrap();
        }
        writeln!(os, "std::atomic<size_t> iter(0);").unwrap();
        writeln!(os).unwrap();
        writeln!(os, "#if defined(_OPENMP)").unwrap();
        writeln!(os, "if (getNumThreads() > 0) {{omp_set_num_threads(getNumThreads());}}").unwrap();
        writeln!(os, "#endif").unwrap();
        writeln!(os).unwrap();
        writeln!(os, "// -- query evaluation --").unwrap();
        if config.profiling() {
            writeln!(os, "ProfileEventSingleton::instance().startTimer();").unwrap();
            writeln!(os, "ProfileEventSingleton::instance().makeTimeEvent(\"@time;starttime\");").unwrap();
            writeln!(os, "{{").unwrap();
            writeln!(os, "Logger logger(\"@runtime;\", 0);").unwrap();
            let relation_count = unit
                .program()
                .relations()
                .iter()
                .filter(|r| !r.name().starts_with('@'))
                .count();
            writeln!(
                os,
                "ProfileEventSingleton::instance().makeConfigRecord(\"relationCount\", std::to_string({}));",
                relation_count
            )
            .unwrap();
        }

        {
            let mut emitter = CodeEmitter::new(config, mint, freqs, reads);
            emitter.emit_statement(&mut os, unit.program().main())?;
        }

        if config.profiling() {
            writeln!(os, "}}").unwrap();
            writeln!(os, "ProfileEventSingleton::instance().stopTimer();").unwrap();
            writeln!(os, "dumpFreqs();").unwrap();
        }
        writeln!(os).unwrap();
        writeln!(os, "// -- relation hint statistics --").unwrap();
        writeln!(os, "if(isHintsProfilingEnabled()) {{").unwrap();
        writeln!(os, "std::cout << \" -- Operation Hint Statistics --\\n\";").unwrap();
        for relation in unit.program().relations() {
            let name = mint.relation_name(relation);
            writeln!(os, "std::cout << \"Relation {}:\\n\";", name).unwrap();
            writeln!(os, "{}->printHintStatistics(std::cout,\"  \");", name).unwrap();
            writeln!(os, "std::cout << \"\\n\";").unwrap();
        }
        writeln!(os, "}}").unwrap();
        writeln!(os, "SignalHandler::instance()->reset();").unwrap();
        writeln!(os, "}}").unwrap();

        // -- public run entry points --
        writeln!(os, "public:").unwrap();
        writeln!(os, "void run() override {{ runFunction(\".\", \".\", false); }}").unwrap();
        writeln!(os, "public:").unwrap();
        writeln!(os, "void runAll(std::string inputDirectory = \".\", std::string outputDirectory = \".\") override {{").unwrap();
        if config.live_profile {
            writeln!(os, "std::thread profiler([]() {{ profile::Tui().runProf(); }});").unwrap();
        }
        writeln!(os, "runFunction(inputDirectory, outputDirectory, true);").unwrap();
        if config.live_profile {
            writeln!(os, "if (profiler.joinable()) {{ profiler.join(); }}").unwrap();
        }
        writeln!(os, "}}").unwrap();

        // -- printAll --
        writeln!(os, "public:").unwrap();
        writeln!(os, "void printAll(std::string outputDirectory = \".\") override {{").unwrap();
        unit.program().main().for_each(&mut |s| {
            if let Statement::Store { relation, directives } = s {
                let rel_name = mint.relation_name(relation);
                for dir in directives {
                    emit_store_directive(&mut os, relation, &rel_name, dir);
                }
            }
        });
        writeln!(os, "}}").unwrap();

        // -- dumpFreqs --
        if config.profiling() {
            writeln!(os, "private:").unwrap();
            writeln!(os, "void dumpFreqs() {{").unwrap();
            for (text, idx) in freqs.iter() {
                writeln!(
                    os,
                    "\tProfileEventSingleton::instance().makeQuantityEvent({}, freqs[{}],0);",
                    raw_string(text),
                    idx
                )
                .unwrap();
            }
            for (text, idx) in reads.iter() {
                writeln!(
                    os,
                    "\tProfileEventSingleton::instance().makeQuantityEvent({}, reads[{}],0);",
                    raw_string(&format!("@relation-reads;{}", text)),
                    idx
                )
                .unwrap();
            }
            writeln!(os, "}}").unwrap();
        }

        // -- loadAll --
        writeln!(os, "public:").unwrap();
        writeln!(os, "void loadAll(std::string inputDirectory = \".\") override {{").unwrap();
        unit.program().main().for_each(&mut |s| {
            if let Statement::Load { relation, directives } = s {
                let rel_name = mint.relation_name(relation);
                for dir in directives {
                    emit_load_directive(&mut os, relation, &rel_name, dir);
                }
            }
        });
        writeln!(os, "}}").unwrap();

        // -- dumpInputs / dumpOutputs --
        writeln!(os, "public:").unwrap();
        writeln!(os, "void dumpInputs(std::ostream& out = std::cout) override {{").unwrap();
        unit.program().main().for_each(&mut |s| {
            if let Statement::Load { relation, .. } = s {
                let rel_name = mint.relation_name(relation);
                emit_stdout_dump(&mut os, relation, &rel_name);
            }
        });
        writeln!(os, "}}").unwrap();
        writeln!(os, "public:").unwrap();
        writeln!(os, "void dumpOutputs(std::ostream& out = std::cout) override {{").unwrap();
        unit.program().main().for_each(&mut |s| {
            if let Statement::Store { relation, .. } = s {
                let rel_name = mint.relation_name(relation);
                emit_stdout_dump(&mut os, relation, &rel_name);
            }
        });
        writeln!(os, "}}").unwrap();

        writeln!(os, "public:").unwrap();
        writeln!(os, "SymbolTable& getSymbolTable() override {{").unwrap();
        writeln!(os, "return symTable;").unwrap();
        writeln!(os, "}}").unwrap();

        // -- provenance subroutines --
        if let Some(mode) = config.provenance {
            if mode == ProvenanceMode::SubtreeHeights {
                writeln!(os, "void copyIndex() {{").unwrap();
                for relation in unit.program().relations() {
                    let realisation = realisation_for(config, unit, relation);
                    if !realisation.provenance_index_numbers().is_empty() {
                        writeln!(os, "{}->copyIndex();", mint.relation_name(relation)).unwrap();
                    }
                }
                writeln!(os, "}}").unwrap();
            }

            writeln!(os, "void executeSubroutine(std::string name, const std::vector<RamDomain>& args, std::vector<RamDomain>& ret) override {{").unwrap();
            for (i, (name, _)) in unit.program().subroutines().iter().enumerate() {
                writeln!(os, "if (name == \"{}\") {{", escape_literal(name)).unwrap();
                writeln!(os, "subproof_{}(args, ret);", i).unwrap();
                writeln!(os, "}}").unwrap();
            }
            writeln!(os, "}}").unwrap();

            for (i, (_, body)) in unit.program().subroutines().iter().enumerate() {
                writeln!(os, "void subproof_{}(const std::vector<RamDomain>& args, std::vector<RamDomain>& ret) {{", i).unwrap();
                // the return vector is filled under this lock
                writeln!(os, "std::mutex lock;").unwrap();
                let mut emitter = CodeEmitter::new(config, mint, freqs, reads);
                emitter.emit_statement(&mut os, body)?;
                writeln!(os, "return;").unwrap();
                writeln!(os, "}}").unwrap();
            }
        }
        writeln!(os, "}};").unwrap();

        // -- hidden hooks --
        writeln!(os, "StratumProgram *newInstance_{}(){{return new {};}}", id, classname).unwrap();
        writeln!(
            os,
            "SymbolTable *getST_{}(StratumProgram *p){{return &reinterpret_cast<{}*>(p)->symTable;}}",
            id, classname
        )
        .unwrap();
        writeln!(os).unwrap();
        writeln!(os, "#ifdef __EMBEDDED_STRATUM__").unwrap();
        writeln!(os, "class factory_{}: public stratum::ProgramFactory {{", classname).unwrap();
        writeln!(os, "StratumProgram *newInstance() {{").unwrap();
        writeln!(os, "return new {}();", classname).unwrap();
        writeln!(os, "}};").unwrap();
        writeln!(os, "public:").unwrap();
        writeln!(os, "factory_{}() : ProgramFactory(\"{}\"){{}}", classname, id).unwrap();
        writeln!(os, "}};").unwrap();
        writeln!(os, "static factory_{0} __factory_{0}_instance;", classname).unwrap();
        writeln!(os, "}}").unwrap();
        writeln!(os, "#else").unwrap();
        writeln!(os, "}}").unwrap();
        writeln!(os, "int main(int argc, char** argv)").unwrap();
        writeln!(os, "{{").unwrap();
        writeln!(os, "try{{").unwrap();
        writeln!(os, "stratum::CmdOptions opt({},", raw_string(&config.source)).unwrap();
        writeln!(os, "{},", raw_string(".")).unwrap();
        writeln!(os, "{},", raw_string(".")).unwrap();
        if let Some(profile) = &config.profile {
            writeln!(os, "true,").unwrap();
            writeln!(os, "{},", raw_string(profile)).unwrap();
        } else {
            writeln!(os, "false,").unwrap();
            writeln!(os, "{},", raw_string("")).unwrap();
        }
        writeln!(os, "{},", config.jobs).unwrap();
        writeln!(os, "-1);").unwrap();
        writeln!(os, "if (!opt.parse(argc,argv)) return 1;").unwrap();
        if config.profiling() {
            writeln!(os, "stratum::{} obj(opt.getProfileName());", classname).unwrap();
        } else {
            writeln!(os, "stratum::{} obj;", classname).unwrap();
        }
        writeln!(os, "#if defined(_OPENMP) ").unwrap();
        writeln!(os, "obj.setNumThreads(opt.getNumJobs());").unwrap();
        writeln!(os, "#endif").unwrap();
        if config.profiling() {
            writeln!(os, "stratum::ProfileEventSingleton::instance().makeConfigRecord(\"\", opt.getSourceFileName());").unwrap();
            writeln!(os, "stratum::ProfileEventSingleton::instance().makeConfigRecord(\"fact-dir\", opt.getInputFileDir());").unwrap();
            writeln!(os, "stratum::ProfileEventSingleton::instance().makeConfigRecord(\"jobs\", std::to_string(opt.getNumJobs()));").unwrap();
            writeln!(os, "stratum::ProfileEventSingleton::instance().makeConfigRecord(\"output-dir\", opt.getOutputFileDir());").unwrap();
            writeln!(
                os,
                "stratum::ProfileEventSingleton::instance().makeConfigRecord(\"version\", \"{}\");",
                escape_literal(&config.version)
            )
            .unwrap();
        }
        writeln!(os, "obj.runAll(opt.getInputFileDir(), opt.getOutputFileDir());").unwrap();
        match config.provenance {
            Some(ProvenanceMode::Explain) => {
                writeln!(os, "explain(obj, false, false);").unwrap();
            }
            Some(ProvenanceMode::SubtreeHeights) => {
                writeln!(os, "obj.copyIndex();").unwrap();
                writeln!(os, "explain(obj, false, true);").unwrap();
            }
            Some(ProvenanceMode::Explore) => {
                writeln!(os, "explain(obj, true, false);").unwrap();
            }
            None => {}
        }
        writeln!(os, "return 0;").unwrap();
        writeln!(os, "}} catch(std::exception &e) {{ stratum::SignalHandler::instance()->error(e.what());}}").unwrap();
        writeln!(os, "}}").unwrap();
        writeln!(os).unwrap();
        writeln!(os, "#endif").unwrap();

        info!(
            program = %classname,
            bytes = os.len(),
            shared_library = uses_shared_library,
            "synthesised compilation unit"
        );
        Ok(Synthesis {
            code: os,
            uses_shared_library,
        })
    }
}

/// Build the realisation for a relation under the current configuration.
/// Provenance-info relations bypass indexing entirely.
fn realisation_for(
    config: &SynthesiserConfig,
    unit: &TranslationUnit,
    relation: &Rc<Relation>,
) -> Realisation {
    let is_info = relation.representation() == Representation::Info;
    let provenance = config.provenance.is_some() && !is_info;
    Realisation::new(
        relation.clone(),
        unit.index_analysis().indexes(relation),
        provenance,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ram::{Expression, Operation, Program, Statement};
    use crate::relation::Relation;
    use crate::symbols::SymbolTable;

    fn binary(name: &str) -> Rc<Relation> {
        Rc::new(Relation::plain(name, &["x", "y"], &["i:number", "i:number"]))
    }

    fn simple_unit() -> TranslationUnit {
        let edge = binary("edge");
        let path = binary("path");
        let main = Statement::sequence(vec![
            Statement::query(Operation::scan(
                edge.clone(),
                0,
                Operation::project(
                    path.clone(),
                    vec![
                        Expression::tuple_element(0, 0),
                        Expression::tuple_element(0, 1),
                    ],
                ),
            )),
            Statement::query(Operation::scan(
                path.clone(),
                0,
                Operation::project(
                    edge.clone(),
                    vec![
                        Expression::tuple_element(0, 0),
                        Expression::tuple_element(0, 1),
                    ],
                ),
            )),
        ]);
        TranslationUnit::new(Program::new(vec![edge, path], main), SymbolTable::new())
    }

    #[test]
    fn test_structurally_equal_relations_share_one_type_definition() {
        let mut synthesiser = Synthesiser::new(simple_unit(), SynthesiserConfig::default());
        let result = synthesiser.generate("tc").unwrap();
        // both relations are arity-2 b-trees with no recorded signatures,
        // so exactly one struct definition appears
        let occurrences = result.code.matches("struct t_btree_2__0_1 {").count();
        assert_eq!(occurrences, 1);
        assert_eq!(result.code.matches("std::unique_ptr<t_btree_2__0_1>").count(), 2);
    }

    #[test]
    fn test_generate_is_deterministic_across_fresh_instances() {
        let a = Synthesiser::new(simple_unit(), SynthesiserConfig::default())
            .generate("tc")
            .unwrap();
        let b = Synthesiser::new(simple_unit(), SynthesiserConfig::default())
            .generate("tc")
            .unwrap();
        assert_eq!(a.code, b.code);
    }

    #[test]
    fn test_counter_arrays_sized_by_distinct_keys() {
        let edge = binary("edge");
        let out = binary("out");
        let scan = Operation::scan(
            edge.clone(),
            0,
            Operation::project(
                out.clone(),
                vec![
                    Expression::tuple_element(0, 0),
                    Expression::tuple_element(0, 1),
                ],
            ),
        )
        .with_profile_text("rule one");
        // the same profile text twice still counts once
        let again = Operation::scan(
            edge.clone(),
            0,
            Operation::project(
                out.clone(),
                vec![
                    Expression::tuple_element(0, 0),
                    Expression::tuple_element(0, 1),
                ],
            ),
        )
        .with_profile_text("rule one");
        let main = Statement::sequence(vec![Statement::query(scan), Statement::query(again)]);
        let unit = TranslationUnit::new(Program::new(vec![edge, out], main), SymbolTable::new());
        let mut synthesiser = Synthesiser::new(unit, SynthesiserConfig::profiled("p.log"));
        let result = synthesiser.generate("prof").unwrap();
        assert!(result.code.contains("size_t freqs[1]{};"));
        assert!(result.code.contains("freqs[0]++;"));
        assert!(result.code.contains("dumpFreqs();"));
    }

    #[test]
    fn test_shared_library_flag_follows_user_defined_functors() {
        let edge = binary("edge");
        let main = Statement::query(Operation::scan(
            edge.clone(),
            0,
            Operation::project(
                edge.clone(),
                vec![
                    Expression::UserDefined {
                        name: "myfun".to_string(),
                        type_signature: "NN".to_string(),
                        args: vec![Expression::tuple_element(0, 0)],
                    },
                    Expression::tuple_element(0, 1),
                ],
            ),
        ));
        let unit = TranslationUnit::new(Program::new(vec![edge], main), SymbolTable::new());
        let result = Synthesiser::new(unit, SynthesiserConfig::default())
            .generate("f")
            .unwrap();
        assert!(result.uses_shared_library);
        assert!(result.code.contains("extern \"C\" {"));
        assert!(result.code.contains("stratum::RamDomain myfun(stratum::RamDomain);"));

        let plain = Synthesiser::new(simple_unit(), SynthesiserConfig::default())
            .generate("tc")
            .unwrap();
        assert!(!plain.uses_shared_library);
    }
}
