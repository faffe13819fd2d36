//! Relation realisations: the concrete container type behind each relation.
//!
//! A realisation is built from a relation descriptor, the search signatures
//! the index analysis collected against it, and the provenance flag. It
//! picks one of five container families, derives one full lexicographic
//! column order per distinct signature, and renders the C++ type definition
//! with the lookup entry points the emitted operations call into. Type names
//! are a pure function of the structure, so the assembler's type cache can
//! dedup structurally identical descriptors by name alone.

use crate::codegen::analysis::SearchSignature;
use crate::relation::{Relation, Representation};
use std::fmt::Write;
use std::rc::Rc;

/// Container family of a realisation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerFamily {
    /// Arity-0 relation: a single atomic flag.
    Nullary,
    /// One b-tree per lexicographic order. The default.
    Btree,
    /// Trie-backed storage.
    Brie,
    /// Union-find container for binary equivalence relations.
    Eqrel,
    /// Unindexed vector for provenance metadata.
    Info,
}

/// A relation bound to its concrete storage layout.
#[derive(Debug)]
pub struct Realisation {
    relation: Rc<Relation>,
    family: ContainerFamily,
    /// Full lexicographic column orders, one per container index. Index 0 is
    /// the master and owns iteration, size and partitioning.
    orders: Vec<Vec<usize>>,
    /// Signature to index ordinal, in first-use order.
    signature_index: Vec<(SearchSignature, usize)>,
    /// Ordinals of indexes that serve provenance height queries.
    provenance_indices: Vec<usize>,
}

impl Realisation {
    pub fn new(relation: Rc<Relation>, signatures: &[SearchSignature], provenance: bool) -> Self {
        let family = match (relation.arity(), relation.representation()) {
            (0, _) => ContainerFamily::Nullary,
            (_, Representation::Info) => ContainerFamily::Info,
            (_, Representation::Eqrel) => ContainerFamily::Eqrel,
            (_, Representation::Brie) => ContainerFamily::Brie,
            (_, Representation::Btree) | (_, Representation::Default) => ContainerFamily::Btree,
        };

        let mut orders: Vec<Vec<usize>> = Vec::new();
        let mut signature_index = Vec::new();
        let mut provenance_indices = Vec::new();

        if matches!(family, ContainerFamily::Btree | ContainerFamily::Brie) {
            let arity = relation.arity();
            let aux_from = arity - relation.auxiliary_arity();
            let aux_mask: SearchSignature = if relation.auxiliary_arity() == 0 {
                0
            } else {
                ((1 << arity) - 1) ^ ((1 << aux_from) - 1)
            };
            for &sig in signatures {
                let order = order_for(&relation, sig);
                let ordinal = match orders.iter().position(|o| *o == order) {
                    Some(i) => i,
                    None => {
                        orders.push(order);
                        orders.len() - 1
                    }
                };
                signature_index.push((sig, ordinal));
                if provenance
                    && sig & aux_mask != 0
                    && ordinal != 0
                    && !provenance_indices.contains(&ordinal)
                {
                    provenance_indices.push(ordinal);
                }
            }
            if orders.is_empty() {
                orders.push((0..arity).collect());
            }
        }

        Realisation {
            relation,
            family,
            orders,
            signature_index,
            provenance_indices,
        }
    }

    pub fn relation(&self) -> &Rc<Relation> {
        &self.relation
    }

    pub fn family(&self) -> ContainerFamily {
        self.family
    }

    pub fn provenance_index_numbers(&self) -> &[usize] {
        &self.provenance_indices
    }

    /// Structural type name: same descriptor, same name.
    pub fn type_name(&self) -> String {
        let arity = self.relation.arity();
        match self.family {
            ContainerFamily::Nullary => "t_nullaries".to_string(),
            ContainerFamily::Info => format!("t_info_{}", arity),
            ContainerFamily::Eqrel => "t_eqrel".to_string(),
            ContainerFamily::Brie => {
                let mut name = format!("t_brie_{}", arity);
                for (sig, _) in &self.signature_index {
                    write!(name, "__{}", sig).unwrap();
                }
                name
            }
            ContainerFamily::Btree => {
                let mut name = format!("t_btree_{}", arity);
                for order in &self.orders {
                    name.push_str("__");
                    for (i, col) in order.iter().enumerate() {
                        if i > 0 {
                            name.push('_');
                        }
                        write!(name, "{}", col).unwrap();
                    }
                }
                for (sig, _) in &self.signature_index {
                    write!(name, "__{}", sig).unwrap();
                }
                name
            }
        }
    }

    /// Emit the C++ struct for this realisation.
    pub fn generate_type_struct(&self, out: &mut String) {
        match self.family {
            ContainerFamily::Nullary => self.generate_nullary(out),
            ContainerFamily::Info => self.generate_info(out),
            ContainerFamily::Eqrel => self.generate_eqrel(out),
            ContainerFamily::Brie => self.generate_brie(out),
            ContainerFamily::Btree => self.generate_btree(out),
        }
    }

    fn generate_nullary(&self, out: &mut String) {
        writeln!(out, "struct t_nullaries {{").unwrap();
        writeln!(out, "std::atomic<bool> data{{false}};").unwrap();
        writeln!(out, "using t_tuple = Tuple<RamDomain, 0>;").unwrap();
        writeln!(out, "struct context {{}};").unwrap();
        writeln!(out, "context createContext() {{ return context(); }}").unwrap();
        writeln!(out, "struct iterator {{").unwrap();
        writeln!(out, "bool value;").unwrap();
        writeln!(out, "const t_tuple tuple{{}};").unwrap();
        writeln!(out, "iterator(bool v = false) : value(v) {{}}").unwrap();
        writeln!(out, "const t_tuple& operator*() const {{ return tuple; }}").unwrap();
        writeln!(out, "bool operator==(const iterator& other) const {{ return value == other.value; }}").unwrap();
        writeln!(out, "bool operator!=(const iterator& other) const {{ return value != other.value; }}").unwrap();
        writeln!(out, "iterator& operator++() {{ value = false; return *this; }}").unwrap();
        writeln!(out, "}};").unwrap();
        writeln!(out, "iterator begin() const {{ return iterator(data); }}").unwrap();
        writeln!(out, "iterator end() const {{ return iterator(false); }}").unwrap();
        writeln!(out, "bool insert(const t_tuple& /* t */) {{ return !data.exchange(true); }}").unwrap();
        writeln!(out, "bool insert(const t_tuple& t, context& /* h */) {{ return insert(t); }}").unwrap();
        writeln!(out, "bool insert(const RamDomain* /* ramDomain */) {{ return !data.exchange(true); }}").unwrap();
        writeln!(out, "bool contains(const t_tuple& /* t */) const {{ return data; }}").unwrap();
        writeln!(out, "bool contains(const t_tuple& t, context& /* h */) const {{ return contains(t); }}").unwrap();
        writeln!(out, "std::size_t size() const {{ return data ? 1 : 0; }}").unwrap();
        writeln!(out, "bool empty() const {{ return !data; }}").unwrap();
        writeln!(out, "void purge() {{ data = false; }}").unwrap();
        writeln!(out, "void printHintStatistics(std::ostream& o, const std::string& prefix) const {{").unwrap();
        writeln!(out, "o << prefix << \"nullary relation: no hints\\n\";").unwrap();
        writeln!(out, "}}").unwrap();
        writeln!(out, "}};").unwrap();
    }

    fn generate_info(&self, out: &mut String) {
        let arity = self.relation.arity();
        writeln!(out, "struct {} {{", self.type_name()).unwrap();
        writeln!(out, "using t_tuple = Tuple<RamDomain, {}>;", arity).unwrap();
        writeln!(out, "struct context {{}};").unwrap();
        writeln!(out, "context createContext() {{ return context(); }}").unwrap();
        writeln!(out, "std::vector<t_tuple> data;").unwrap();
        writeln!(out, "std::mutex insert_lock;").unwrap();
        writeln!(out, "bool insert(const t_tuple& t) {{").unwrap();
        writeln!(out, "std::lock_guard<std::mutex> guard(insert_lock);").unwrap();
        writeln!(out, "if (contains(t)) return false;").unwrap();
        writeln!(out, "data.push_back(t);").unwrap();
        writeln!(out, "return true;").unwrap();
        writeln!(out, "}}").unwrap();
        writeln!(out, "bool insert(const t_tuple& t, context& /* h */) {{ return insert(t); }}").unwrap();
        writeln!(out, "bool insert(const RamDomain* ramDomain) {{").unwrap();
        writeln!(out, "t_tuple t;").unwrap();
        writeln!(out, "std::copy(ramDomain, ramDomain + {}, t.begin());", arity).unwrap();
        writeln!(out, "return insert(t);").unwrap();
        writeln!(out, "}}").unwrap();
        writeln!(out, "bool contains(const t_tuple& t) const {{").unwrap();
        writeln!(out, "return std::find(data.begin(), data.end(), t) != data.end();").unwrap();
        writeln!(out, "}}").unwrap();
        writeln!(out, "bool contains(const t_tuple& t, context& /* h */) const {{ return contains(t); }}").unwrap();
        writeln!(out, "std::size_t size() const {{ return data.size(); }}").unwrap();
        writeln!(out, "bool empty() const {{ return data.empty(); }}").unwrap();
        writeln!(out, "void purge() {{ data.clear(); }}").unwrap();
        writeln!(out, "using iterator = std::vector<t_tuple>::const_iterator;").unwrap();
        writeln!(out, "iterator begin() const {{ return data.begin(); }}").unwrap();
        writeln!(out, "iterator end() const {{ return data.end(); }}").unwrap();
        writeln!(out, "void printHintStatistics(std::ostream& o, const std::string& prefix) const {{").unwrap();
        writeln!(out, "o << prefix << \"info relation: no hints\\n\";").unwrap();
        writeln!(out, "}}").unwrap();
        writeln!(out, "}};").unwrap();
    }

    fn generate_eqrel(&self, out: &mut String) {
        writeln!(out, "struct t_eqrel {{").unwrap();
        writeln!(out, "using t_tuple = Tuple<RamDomain, 2>;").unwrap();
        writeln!(out, "using t_ind = EquivalenceRelation<t_tuple>;").unwrap();
        writeln!(out, "t_ind ind;").unwrap();
        writeln!(out, "using iterator = t_ind::iterator;").unwrap();
        writeln!(out, "struct context {{").unwrap();
        writeln!(out, "t_ind::operation_hints hints;").unwrap();
        writeln!(out, "}};").unwrap();
        writeln!(out, "context createContext() {{ return context(); }}").unwrap();
        writeln!(out, "bool insert(const t_tuple& t) {{ return ind.insert(t[0], t[1]); }}").unwrap();
        writeln!(out, "bool insert(const t_tuple& t, context& h) {{ return ind.insert(t[0], t[1], h.hints); }}").unwrap();
        writeln!(out, "bool insert(const RamDomain* ramDomain) {{").unwrap();
        writeln!(out, "return ind.insert(ramDomain[0], ramDomain[1]);").unwrap();
        writeln!(out, "}}").unwrap();
        writeln!(out, "bool contains(const t_tuple& t) const {{ return ind.contains(t[0], t[1]); }}").unwrap();
        writeln!(out, "bool contains(const t_tuple& t, context& /* h */) const {{ return contains(t); }}").unwrap();
        writeln!(out, "void extend(const t_eqrel& other) {{").unwrap();
        writeln!(out, "ind.extend(other.ind);").unwrap();
        writeln!(out, "}}").unwrap();
        writeln!(out, "std::size_t size() const {{ return ind.size(); }}").unwrap();
        writeln!(out, "bool empty() const {{ return ind.size() == 0; }}").unwrap();
        writeln!(out, "void purge() {{ ind.clear(); }}").unwrap();
        // anterior and full point queries; the container expands a pair to
        // its whole equivalence class
        for (sig, count) in [(1usize, 1usize), (3, 2)] {
            writeln!(out, "range<iterator> equalRange_{}(const t_tuple& t, context& h) const {{", sig).unwrap();
            writeln!(out, "return ind.template getBoundaries<{}>(t, h.hints);", count).unwrap();
            writeln!(out, "}}").unwrap();
            writeln!(out, "range<iterator> equalRange_{}(const t_tuple& t) const {{", sig).unwrap();
            writeln!(out, "context h;").unwrap();
            writeln!(out, "return equalRange_{}(t, h);", sig).unwrap();
            writeln!(out, "}}").unwrap();
        }
        writeln!(out, "iterator begin() const {{ return ind.begin(); }}").unwrap();
        writeln!(out, "iterator end() const {{ return ind.end(); }}").unwrap();
        writeln!(out, "auto partition() {{ return ind.partition(400); }}").unwrap();
        writeln!(out, "void printHintStatistics(std::ostream& o, const std::string& prefix) const {{").unwrap();
        writeln!(out, "o << prefix << \"eqrel index: no hint statistics supported\\n\";").unwrap();
        writeln!(out, "}}").unwrap();
        writeln!(out, "}};").unwrap();
    }

    fn generate_brie(&self, out: &mut String) {
        let arity = self.relation.arity();
        writeln!(out, "struct {} {{", self.type_name()).unwrap();
        writeln!(out, "using t_tuple = Tuple<RamDomain, {}>;", arity).unwrap();
        writeln!(out, "using t_ind_0 = Trie<{}>;", arity).unwrap();
        writeln!(out, "t_ind_0 ind_0;").unwrap();
        writeln!(out, "using iterator = t_ind_0::iterator;").unwrap();
        writeln!(out, "struct context {{").unwrap();
        writeln!(out, "t_ind_0::op_context hints_0;").unwrap();
        writeln!(out, "}};").unwrap();
        writeln!(out, "context createContext() {{ return context(); }}").unwrap();
        writeln!(out, "bool insert(const t_tuple& t) {{").unwrap();
        writeln!(out, "context h;").unwrap();
        writeln!(out, "return insert(t, h);").unwrap();
        writeln!(out, "}}").unwrap();
        writeln!(out, "bool insert(const t_tuple& t, context& h) {{").unwrap();
        writeln!(out, "return ind_0.insert(t, h.hints_0);").unwrap();
        writeln!(out, "}}").unwrap();
        writeln!(out, "bool insert(const RamDomain* ramDomain) {{").unwrap();
        writeln!(out, "RamDomain data[{}];", arity).unwrap();
        writeln!(out, "std::copy(ramDomain, ramDomain + {}, data);", arity).unwrap();
        writeln!(out, "const t_tuple& tuple = reinterpret_cast<const t_tuple&>(data);").unwrap();
        writeln!(out, "context h;").unwrap();
        writeln!(out, "return insert(tuple, h);").unwrap();
        writeln!(out, "}}").unwrap();
        writeln!(out, "bool contains(const t_tuple& t, context& h) const {{").unwrap();
        writeln!(out, "return ind_0.contains(t, h.hints_0);").unwrap();
        writeln!(out, "}}").unwrap();
        writeln!(out, "bool contains(const t_tuple& t) const {{").unwrap();
        writeln!(out, "context h;").unwrap();
        writeln!(out, "return contains(t, h);").unwrap();
        writeln!(out, "}}").unwrap();
        writeln!(out, "std::size_t size() const {{ return ind_0.size(); }}").unwrap();
        writeln!(out, "bool empty() const {{ return ind_0.empty(); }}").unwrap();
        writeln!(out, "void purge() {{ ind_0.clear(); }}").unwrap();
        writeln!(out, "iterator begin() const {{ return ind_0.begin(); }}").unwrap();
        writeln!(out, "iterator end() const {{ return ind_0.end(); }}").unwrap();
        writeln!(out, "auto partition() {{ return ind_0.partition(400); }}").unwrap();
        for (sig, _) in &self.signature_index {
            let bound = (0..arity).filter(|i| sig >> i & 1 == 1).count();
            writeln!(out, "auto equalRange_{}(const t_tuple& t, context& h) const {{", sig).unwrap();
            writeln!(out, "return ind_0.template getBoundaries<{}>(t, h.hints_0);", bound).unwrap();
            writeln!(out, "}}").unwrap();
            writeln!(out, "auto equalRange_{}(const t_tuple& t) const {{", sig).unwrap();
            writeln!(out, "context h;").unwrap();
            writeln!(out, "return equalRange_{}(t, h);", sig).unwrap();
            writeln!(out, "}}").unwrap();
        }
        writeln!(out, "void printHintStatistics(std::ostream& o, const std::string& prefix) const {{").unwrap();
        writeln!(out, "o << prefix << \"arity {} brie index\\n\";", arity).unwrap();
        writeln!(out, "}}").unwrap();
        writeln!(out, "}};").unwrap();
    }

    fn generate_btree(&self, out: &mut String) {
        let arity = self.relation.arity();
        writeln!(out, "struct {} {{", self.type_name()).unwrap();
        writeln!(out, "using t_tuple = Tuple<RamDomain, {}>;", arity).unwrap();
        for (i, order) in self.orders.iter().enumerate() {
            let cols = join_usize(order, ",");
            writeln!(out, "using t_ind_{} = btree_set<t_tuple, index_utils::comparator<{}>>;", i, cols).unwrap();
            writeln!(out, "t_ind_{0} ind_{0};", i).unwrap();
        }
        writeln!(out, "using iterator = t_ind_0::iterator;").unwrap();
        writeln!(out, "struct context {{").unwrap();
        for i in 0..self.orders.len() {
            writeln!(out, "t_ind_{0}::operation_hints hints_{0};", i).unwrap();
        }
        writeln!(out, "}};").unwrap();
        writeln!(out, "context createContext() {{ return context(); }}").unwrap();
        writeln!(out, "bool insert(const t_tuple& t) {{").unwrap();
        writeln!(out, "context h;").unwrap();
        writeln!(out, "return insert(t, h);").unwrap();
        writeln!(out, "}}").unwrap();
        writeln!(out, "bool insert(const t_tuple& t, context& h) {{").unwrap();
        writeln!(out, "if (ind_0.insert(t, h.hints_0)) {{").unwrap();
        for i in 1..self.orders.len() {
            writeln!(out, "ind_{0}.insert(t, h.hints_{0});", i).unwrap();
        }
        writeln!(out, "return true;").unwrap();
        writeln!(out, "}} else return false;").unwrap();
        writeln!(out, "}}").unwrap();
        writeln!(out, "bool insert(const RamDomain* ramDomain) {{").unwrap();
        writeln!(out, "RamDomain data[{}];", arity).unwrap();
        writeln!(out, "std::copy(ramDomain, ramDomain + {}, data);", arity).unwrap();
        writeln!(out, "const t_tuple& tuple = reinterpret_cast<const t_tuple&>(data);").unwrap();
        writeln!(out, "context h;").unwrap();
        writeln!(out, "return insert(tuple, h);").unwrap();
        writeln!(out, "}}").unwrap();
        writeln!(out, "bool contains(const t_tuple& t, context& h) const {{").unwrap();
        writeln!(out, "return ind_0.contains(t, h.hints_0);").unwrap();
        writeln!(out, "}}").unwrap();
        writeln!(out, "bool contains(const t_tuple& t) const {{").unwrap();
        writeln!(out, "context h;").unwrap();
        writeln!(out, "return contains(t, h);").unwrap();
        writeln!(out, "}}").unwrap();
        writeln!(out, "std::size_t size() const {{ return ind_0.size(); }}").unwrap();
        writeln!(out, "bool empty() const {{ return ind_0.empty(); }}").unwrap();
        writeln!(out, "iterator begin() const {{ return ind_0.begin(); }}").unwrap();
        writeln!(out, "iterator end() const {{ return ind_0.end(); }}").unwrap();
        writeln!(out, "auto partition() {{ return ind_0.getChunks(400); }}").unwrap();
        writeln!(out, "void purge() {{").unwrap();
        for i in 0..self.orders.len() {
            writeln!(out, "ind_{}.clear();", i).unwrap();
        }
        writeln!(out, "}}").unwrap();
        for &(sig, idx) in &self.signature_index {
            self.generate_btree_equal_range(out, sig, idx);
        }
        if !self.provenance_indices.is_empty() {
            writeln!(out, "void copyIndex() {{").unwrap();
            writeln!(out, "context h;").unwrap();
            writeln!(out, "for (const auto& t : ind_0) {{").unwrap();
            for &i in &self.provenance_indices {
                writeln!(out, "ind_{0}.insert(t, h.hints_{0});", i).unwrap();
            }
            writeln!(out, "}}").unwrap();
            writeln!(out, "}}").unwrap();
        }
        writeln!(out, "void printHintStatistics(std::ostream& o, const std::string& prefix) const {{").unwrap();
        for (i, order) in self.orders.iter().enumerate() {
            writeln!(
                out,
                "o << prefix << \"arity {} direct b-tree index {} lex-order [{}]\\n\";",
                arity,
                i,
                join_usize(order, ",")
            )
            .unwrap();
            writeln!(out, "ind_{}.printStats(o);", i).unwrap();
        }
        writeln!(out, "}}").unwrap();
        writeln!(out, "}};").unwrap();
    }

    fn generate_btree_equal_range(&self, out: &mut String, sig: SearchSignature, idx: usize) {
        let arity = self.relation.arity();
        let total = sig == (1 << arity) - 1;
        if sig == 0 {
            writeln!(
                out,
                "range<t_ind_{0}::iterator> equalRange_0(const t_tuple& /* t */, context& /* h */) const {{",
                idx
            )
            .unwrap();
            writeln!(out, "return range<t_ind_{0}::iterator>(ind_{0}.begin(), ind_{0}.end());", idx).unwrap();
            writeln!(out, "}}").unwrap();
            writeln!(out, "range<t_ind_{0}::iterator> equalRange_0(const t_tuple& t) const {{", idx).unwrap();
            writeln!(out, "context h;").unwrap();
            writeln!(out, "return equalRange_0(t, h);").unwrap();
            writeln!(out, "}}").unwrap();
            return;
        }
        writeln!(
            out,
            "range<t_ind_{}::iterator> equalRange_{}(const t_tuple& t, context& h) const {{",
            idx, sig
        )
        .unwrap();
        if total {
            writeln!(out, "auto pos = ind_{}.find(t, h.hints_{});", idx, idx).unwrap();
            writeln!(out, "auto fin = ind_{}.end();", idx).unwrap();
            writeln!(out, "if (pos != fin) {{fin = pos; ++fin;}}").unwrap();
            writeln!(out, "return make_range(pos, fin);").unwrap();
        } else {
            writeln!(out, "t_tuple low(t); t_tuple high(t);").unwrap();
            for i in 0..arity {
                if sig >> i & 1 == 0 {
                    writeln!(out, "low[{0}] = MIN_RAM_DOMAIN; high[{0}] = MAX_RAM_DOMAIN;", i).unwrap();
                }
            }
            writeln!(
                out,
                "return make_range(ind_{0}.lower_bound(low, h.hints_{0}), ind_{0}.upper_bound(high, h.hints_{0}));",
                idx
            )
            .unwrap();
        }
        writeln!(out, "}}").unwrap();
        writeln!(
            out,
            "range<t_ind_{}::iterator> equalRange_{}(const t_tuple& t) const {{",
            idx, sig
        )
        .unwrap();
        writeln!(out, "context h;").unwrap();
        writeln!(out, "return equalRange_{}(t, h);", sig).unwrap();
        writeln!(out, "}}").unwrap();
    }
}

fn order_for(relation: &Relation, sig: SearchSignature) -> Vec<usize> {
    let arity = relation.arity();
    let aux_from = arity - relation.auxiliary_arity();
    let mut order = Vec::with_capacity(arity);
    order.extend((0..aux_from).filter(|i| sig >> i & 1 == 1));
    order.extend((0..aux_from).filter(|i| sig >> i & 1 == 0));
    order.extend((aux_from..arity).filter(|i| sig >> i & 1 == 1));
    order.extend((aux_from..arity).filter(|i| sig >> i & 1 == 0));
    order
}

fn join_usize(values: &[usize], sep: &str) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}
