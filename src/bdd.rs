use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::fmt::Debug;

use log::debug;

use crate::cache::Cache;
use crate::error::{BddError, Result};
use crate::node::Node;
use crate::reference::Ref;
use crate::table::Table;
use crate::utils::{pairing2, pairing3, MyHash};

/// Pseudo-level of the terminal node: below every variable.
pub(crate) const TERMINAL_LEVEL: usize = usize::MAX;

/// Construction parameters for a [`Bdd`] manager.
///
/// All thresholds are policy, not hard-coded constants: tune them to the
/// workload. The table and cache sizes are powers of two given in bits.
#[derive(Debug, Clone)]
pub struct BddConfig {
    /// Number of declared variables (1-indexed; more can be added later).
    pub num_vars: u32,
    /// Initial unique table size, `2^storage_bits` slots.
    pub storage_bits: usize,
    /// The unique table never grows past `2^max_storage_bits` slots.
    pub max_storage_bits: usize,
    /// Computation cache size, `2^cache_bits` slots.
    pub cache_bits: usize,
    /// Bits added to the table per growth step (1 = doubling).
    pub growth_bits: usize,
    /// Occupancy fraction that triggers a GC pass (and growth, if the pass
    /// does not free enough).
    pub gc_fraction: f64,
    /// Run sifting automatically when the table gets crowded.
    pub auto_reorder: bool,
    /// Node count that arms the first automatic reordering.
    pub reorder_trigger: usize,
}

impl Default for BddConfig {
    fn default() -> Self {
        Self {
            num_vars: 32,
            storage_bits: 20,
            max_storage_bits: 26,
            cache_bits: 16,
            growth_bits: 1,
            gc_fraction: 0.75,
            auto_reorder: false,
            reorder_trigger: 1 << 12,
        }
    }
}

#[derive(Debug, Eq, PartialEq, Clone)]
pub enum OpKey {
    Ite(Ref, Ref, Ref),
    Exists(Ref, Ref),
}

impl MyHash for Ref {
    fn hash(&self) -> u64 {
        self.unsigned() as u64
    }
}

impl MyHash for OpKey {
    fn hash(&self) -> u64 {
        match self {
            OpKey::Ite(f, g, h) => pairing3(
                f.unsigned() as u64,
                g.unsigned() as u64,
                h.unsigned() as u64,
            ),
            OpKey::Exists(f, g) => pairing2(f.unsigned() as u64, g.unsigned() as u64),
        }
    }
}

pub struct Bdd {
    pub(crate) storage: RefCell<Table<Node>>,
    pub(crate) cache: RefCell<Cache<OpKey, Ref>>,
    pub(crate) size_cache: RefCell<Cache<Ref, u64>>,
    /// External reference counts, indexed by node id.
    pub(crate) ref_counts: RefCell<Vec<u32>>,
    /// Temporary roots protecting in-flight intermediates from GC.
    pub(crate) work_stack: RefCell<Vec<Ref>>,
    /// Variable id (1-indexed) to level; slot 0 is unused.
    pub(crate) var2level: RefCell<Vec<usize>>,
    /// Level to variable id.
    pub(crate) level2var: RefCell<Vec<u32>>,
    /// Set while a level swap has the table in a transitional state.
    pub(crate) gc_suspended: Cell<bool>,
    /// Nesting depth of in-flight operations; automatic reordering only
    /// fires at depth zero.
    pub(crate) op_depth: Cell<usize>,
    /// Node count that arms the next automatic reordering.
    pub(crate) next_reorder: Cell<usize>,
    pub(crate) config: BddConfig,
    pub zero: Ref,
    pub one: Ref,
}

impl Bdd {
    pub fn new(config: BddConfig) -> Self {
        assert!(
            config.storage_bits <= config.max_storage_bits,
            "Initial table size exceeds the maximum"
        );
        assert!(
            config.max_storage_bits <= 31,
            "Table bits should be in the range 0..=31"
        );
        assert!(config.growth_bits >= 1, "Growth step must add at least one bit");
        assert!(
            config.gc_fraction > 0.0 && config.gc_fraction <= 1.0,
            "GC fraction must be in (0, 1]"
        );

        let mut storage = Table::new(config.storage_bits);

        // Allocate the terminal node:
        let one = storage.alloc();
        assert_eq!(one, 1); // Make sure the terminal node is (1).
        let one = Ref::positive(one as u32);
        let zero = -one;

        let capacity = storage.capacity();
        let num_vars = config.num_vars;
        // Identity order: variable v starts at level v - 1 (slot 0 unused).
        let mut var2level = vec![usize::MAX; num_vars as usize + 1];
        for v in 1..=num_vars as usize {
            var2level[v] = v - 1;
        }
        let level2var = (1..=num_vars).collect();

        Self {
            storage: RefCell::new(storage),
            cache: RefCell::new(Cache::new(config.cache_bits)),
            size_cache: RefCell::new(Cache::new(config.cache_bits)),
            ref_counts: RefCell::new(vec![0; capacity]),
            work_stack: RefCell::new(Vec::new()),
            var2level: RefCell::new(var2level),
            level2var: RefCell::new(level2var),
            gc_suspended: Cell::new(false),
            op_depth: Cell::new(0),
            next_reorder: Cell::new(config.reorder_trigger),
            config,
            zero,
            one,
        }
    }

    pub fn config(&self) -> &BddConfig {
        &self.config
    }
}

impl Default for Bdd {
    fn default() -> Self {
        Bdd::new(BddConfig::default())
    }
}

impl Debug for Bdd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let storage = self.storage.borrow();
        f.debug_struct("Bdd")
            .field("capacity", &storage.capacity())
            .field("size", &storage.size())
            .field("real_size", &storage.real_size())
            .field("num_vars", &self.num_vars())
            .finish()
    }
}

impl Bdd {
    /// Number of declared variables.
    pub fn num_vars(&self) -> u32 {
        self.level2var.borrow().len() as u32
    }

    /// Number of levels in the ordering (same as [`num_vars`][Self::num_vars]).
    pub fn num_levels(&self) -> usize {
        self.level2var.borrow().len()
    }

    /// Current level of the given variable.
    pub fn level_of(&self, v: u32) -> usize {
        assert_ne!(v, 0, "Variable index should not be zero");
        self.var2level.borrow()[v as usize]
    }

    /// Variable currently sitting at the given level.
    pub fn var_at_level(&self, level: usize) -> u32 {
        self.level2var.borrow()[level]
    }

    fn check_var(&self, v: u32) -> Result<()> {
        if v == 0 || v > self.num_vars() {
            return Err(BddError::InvalidVariable(v));
        }
        Ok(())
    }

    /// Declare one more variable, placed at the bottom of the ordering,
    /// and return its handle.
    pub fn new_var(&self) -> Result<Ref> {
        let v = self.num_vars() + 1;
        let level = self.num_levels();
        self.level2var.borrow_mut().push(v);
        self.var2level.borrow_mut().push(level);
        self.mk_var(v)
    }

    pub fn variable(&self, index: usize) -> u32 {
        self.storage.borrow().value(index).variable
    }
    pub fn low(&self, index: usize) -> Ref {
        self.storage.borrow().value(index).low
    }
    pub fn high(&self, index: usize) -> Ref {
        self.storage.borrow().value(index).high
    }
    pub(crate) fn node(&self, index: usize) -> Node {
        *self.storage.borrow().value(index)
    }

    /// Low child with the node's complement folded in.
    pub fn low_node(&self, node: Ref) -> Ref {
        let low = self.low(node.index());
        if node.is_negated() {
            -low
        } else {
            low
        }
    }
    /// High child with the node's complement folded in.
    pub fn high_node(&self, node: Ref) -> Ref {
        let high = self.high(node.index());
        if node.is_negated() {
            -high
        } else {
            high
        }
    }

    pub fn is_zero(&self, node: Ref) -> bool {
        node == self.zero
    }
    pub fn is_one(&self, node: Ref) -> bool {
        node == self.one
    }
    pub fn is_terminal(&self, node: Ref) -> bool {
        self.is_zero(node) || self.is_one(node)
    }

    /// Level of the referenced node's branching variable
    /// ([`TERMINAL_LEVEL`] for terminals).
    pub(crate) fn node_level(&self, node: Ref) -> usize {
        if self.is_terminal(node) {
            TERMINAL_LEVEL
        } else {
            self.level_of(self.variable(node.index()))
        }
    }

    /// Look up or create the node `(v, low, high)`, applying the reduction
    /// rules first.
    ///
    /// Callers must supply children strictly below `v` in the ordering;
    /// a violation means the manager is corrupt and aborts.
    pub fn mk_node(&self, v: u32, low: Ref, high: Ref) -> Result<Ref> {
        debug!("mk(v = {}, low = {}, high = {})", v, low, high);

        assert_ne!(v, 0, "Variable index should not be zero");

        // Handle canonicity: the high edge must stay regular.
        if high.is_negated() {
            debug!("mk: restoring canonicity");
            let n = self.mk_node(v, -low, -high)?;
            return Ok(-n);
        }

        // Handle duplicates
        if low == high {
            debug!("mk: duplicates {} == {}", low, high);
            return Ok(low);
        }

        assert!(
            self.level_of(v) < self.node_level(low) && self.level_of(v) < self.node_level(high),
            "Ordering invariant violated at mk({}, {}, {})",
            v,
            low,
            high
        );

        self.ensure_capacity()?;
        let i = self.storage.borrow_mut().put(Node {
            variable: v,
            low,
            high,
        });
        Ok(Ref::positive(i as u32))
    }

    /// Handle for a declared variable.
    ///
    /// Variable nodes are held by the manager itself (their external count
    /// never drops to zero on its own), so a bare `mk_var` handle survives
    /// garbage collection without an explicit `reference`.
    pub fn mk_var(&self, v: u32) -> Result<Ref> {
        self.check_var(v)?;
        let f = self.mk_node(v, self.zero, self.one)?;
        if self.ref_count(f) == 0 {
            self.reference(f);
        }
        Ok(f)
    }

    /// Conjunction of literals (DIMACS-style: negative means negated).
    pub fn cube(&self, literals: impl IntoIterator<Item = i32>) -> Result<Ref> {
        let mut literals = literals.into_iter().collect::<Vec<_>>();
        for &lit in &literals {
            self.check_var(lit.unsigned_abs())?;
        }
        literals.sort_by_key(|&lit| self.level_of(lit.unsigned_abs()));
        debug!("cube(literals = {:?})", literals);

        // Build bottom-up along the ordering, keeping the partial cube
        // protected from sweeps triggered by the allocations.
        let mark = self.protect_mark();
        let mut current = self.one;
        for &lit in literals.iter().rev() {
            self.protect(current);
            let next = if lit < 0 {
                self.mk_node(lit.unsigned_abs(), current, self.zero)
            } else {
                self.mk_node(lit.unsigned_abs(), self.zero, current)
            };
            match next {
                Ok(r) => current = r,
                Err(e) => {
                    self.unprotect_to(mark);
                    return Err(e);
                }
            }
        }
        self.unprotect_to(mark);
        Ok(current)
    }

    /// Disjunction of literals.
    pub fn clause(&self, literals: impl IntoIterator<Item = i32>) -> Result<Ref> {
        let mut literals = literals.into_iter().collect::<Vec<_>>();
        for &lit in &literals {
            self.check_var(lit.unsigned_abs())?;
        }
        literals.sort_by_key(|&lit| self.level_of(lit.unsigned_abs()));
        debug!("clause(literals = {:?})", literals);

        let mark = self.protect_mark();
        let mut current = self.zero;
        for &lit in literals.iter().rev() {
            self.protect(current);
            let next = if lit < 0 {
                self.mk_node(lit.unsigned_abs(), self.one, current)
            } else {
                self.mk_node(lit.unsigned_abs(), current, self.one)
            };
            match next {
                Ok(r) => current = r,
                Err(e) => {
                    self.unprotect_to(mark);
                    return Err(e);
                }
            }
        }
        self.unprotect_to(mark);
        Ok(current)
    }

    /// Both cofactors of `node` with respect to variable `v`, which must not
    /// lie below the node's own branching variable.
    pub fn top_cofactors(&self, node: Ref, v: u32) -> (Ref, Ref) {
        assert_ne!(v, 0, "Variable index should not be zero");

        let i = node.index();
        if self.is_terminal(node) || self.level_of(v) < self.node_level(node) {
            return (node, node);
        }
        assert_eq!(v, self.variable(i));
        if node.is_negated() {
            (-self.low(i), -self.high(i))
        } else {
            (self.low(i), self.high(i))
        }
    }

    /// Apply the ITE operation to the arguments.
    ///
    /// ```text
    /// ITE(x, y, z) = (x ∧ y) ∨ (¬x ∧ z)
    /// ```
    ///
    /// The returned handle is *not* yet externally counted: pass it to
    /// [`reference`][Self::reference] before the next operation if it must
    /// survive a garbage collection.
    pub fn apply_ite(&self, f: Ref, g: Ref, h: Ref) -> Result<Ref> {
        debug!("apply_ite(f = {}, g = {}, h = {})", f, g, h);

        // Operands are rooted for the whole call, including a possible
        // automatic reordering pass before the recursion starts.
        let mark = self.protect_mark();
        self.protect(f);
        self.protect(g);
        self.protect(h);
        let res = self.maybe_auto_reorder().and_then(|_| {
            self.op_depth.set(self.op_depth.get() + 1);
            let res = self.ite_rec(f, g, h);
            self.op_depth.set(self.op_depth.get() - 1);
            res
        });
        self.unprotect_to(mark);
        res
    }

    fn ite_rec(&self, f: Ref, g: Ref, h: Ref) -> Result<Ref> {
        // Base cases:
        //   ite(1,G,H) => G
        //   ite(0,G,H) => H
        if self.is_one(f) {
            return Ok(g);
        }
        if self.is_zero(f) {
            return Ok(h);
        }

        // From now on, F is known not to be a constant
        debug_assert!(!self.is_terminal(f));

        // More base cases:
        //   ite(F,G,G) => G
        //   ite(F,1,0) => F
        //   ite(F,0,1) => ~F
        //   ite(F,1,~F) => 1
        //   ite(F,F,1) => 1
        //   ite(F,~F,0) => 0
        //   ite(F,0,F) => F
        if g == h {
            return Ok(g);
        }
        if self.is_one(g) && self.is_zero(h) {
            return Ok(f);
        }
        if self.is_zero(g) && self.is_one(h) {
            return Ok(-f);
        }
        if self.is_one(g) && h == -f {
            return Ok(self.one);
        }
        if g == f && self.is_one(h) {
            return Ok(self.one);
        }
        if g == -f && self.is_zero(h) {
            return Ok(self.zero);
        }
        if self.is_zero(g) && h == f {
            return Ok(f);
        }

        // Standard triples:
        //   ite(F,F,H) => ite(F,1,H)
        //   ite(F,G,F) => ite(F,G,0)
        //   ite(F,~F,H) => ite(F,0,H)
        //   ite(F,G,~F) => ite(F,G,1)
        if g == f {
            return self.ite_rec(f, self.one, h);
        }
        if h == f {
            return self.ite_rec(f, g, self.zero);
        }
        if g == -f {
            return self.ite_rec(f, self.zero, h);
        }
        if h == -f {
            return self.ite_rec(f, g, self.one);
        }

        let li = self.node_level(f);
        let lj = self.node_level(g);
        let lk = self.node_level(h);
        debug_assert_ne!(li, TERMINAL_LEVEL);

        // Equivalent pairs:
        //   ite(F,1,H) == ite(H,1,F) == F ∨ H
        //   ite(F,G,0) == ite(G,F,0) == F ∧ G
        //   ite(F,G,1) == ite(~G,~F,1) == F -> G
        //   ite(F,0,H) == ite(~H,0,~F) == ~F ∧ H
        //   ite(F,G,~G) == ite(G,F,~F)
        // (choose the one with the topmost variable)
        if self.is_one(g) && lk < li {
            return self.ite_rec(h, self.one, f);
        }
        if self.is_zero(h) && lj < li {
            return self.ite_rec(g, f, self.zero);
        }
        if self.is_one(h) && lj < li {
            return self.ite_rec(-g, -f, self.one);
        }
        if self.is_zero(g) && lk < li {
            return self.ite_rec(-h, self.zero, -f);
        }
        if g == -h && lj < li {
            return self.ite_rec(g, f, -f);
        }

        // Make sure the first two pointers (f and g) are regular (not negated)
        let (mut f, mut g, mut h) = (f, g, h);

        // ite(~F,G,H) => ite(F,H,G)
        if f.is_negated() {
            f = -f;
            std::mem::swap(&mut g, &mut h);
        }
        debug_assert!(!f.is_negated());

        // ite(F,~G,H) => ~ite(F,G,~H)
        let mut n = false;
        if g.is_negated() {
            n = true;
            g = -g;
            h = -h;
        }
        debug_assert!(!g.is_negated());

        let (f, g, h) = (f, g, h); // make immutable

        let key = OpKey::Ite(f, g, h);
        if let Some(&res) = self.cache.borrow().get(&key) {
            debug!("cache: ite({}, {}, {}) -> {}", f, g, h, res);
            return Ok(if n { -res } else { res });
        }

        // Determine the top variable:
        let m = self.var_at_level(li.min(lj).min(lk));
        debug!("top variable = {}", m);

        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);
        let (h0, h1) = self.top_cofactors(h, m);

        // Keep each fresh intermediate rooted until its parent exists,
        // so a sweep triggered by the sibling recursion cannot free it.
        let mark = self.protect_mark();
        let e = self.ite_rec(f0, g0, h0)?;
        self.protect(e);
        let t = match self.ite_rec(f1, g1, h1) {
            Ok(t) => t,
            Err(err) => {
                self.unprotect_to(mark);
                return Err(err);
            }
        };
        self.protect(t);
        let res = self.mk_node(m, e, t);
        self.unprotect_to(mark);
        let res = res?;

        debug!("computed: ite({}, {}, {}) -> {}", f, g, h, res);
        self.cache.borrow_mut().insert(key, res);

        Ok(if n { -res } else { res })
    }

    fn maybe_constant(&self, node: Ref) -> Option<bool> {
        if self.is_zero(node) {
            Some(false)
        } else if self.is_one(node) {
            Some(true)
        } else {
            None
        }
    }

    /// Evaluate `ite(f, g, h)` only as far as needed to decide whether the
    /// result is a constant. Never allocates nodes.
    pub fn ite_constant(&self, f: Ref, g: Ref, h: Ref) -> Option<bool> {
        if self.is_one(f) {
            return self.maybe_constant(g);
        }
        if self.is_zero(f) {
            return self.maybe_constant(h);
        }

        debug_assert!(!self.is_terminal(f));

        if g == h {
            return self.maybe_constant(g);
        }
        if (self.is_one(g) && self.is_zero(h)) || (self.is_zero(g) && self.is_one(h)) {
            return None;
        }
        if self.is_one(g) && h == -f {
            return Some(true);
        }
        if g == f && self.is_one(h) {
            return Some(true);
        }
        if g == -f && self.is_zero(h) {
            return Some(false);
        }
        if self.is_zero(g) && h == f {
            return None;
        }

        let key = OpKey::Ite(f, g, h);
        if let Some(&res) = self.cache.borrow().get(&key) {
            return self.maybe_constant(res);
        }

        let li = self.node_level(f);
        let lj = self.node_level(g);
        let lk = self.node_level(h);
        let m = self.var_at_level(li.min(lj).min(lk));

        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);
        let (h0, h1) = self.top_cofactors(h, m);

        let t = self.ite_constant(f1, g1, h1)?;
        let e = self.ite_constant(f0, g0, h0)?;
        if t == e {
            Some(t)
        } else {
            None
        }
    }

    /// Check the tautology `f -> g` without building its diagram.
    pub fn is_implies(&self, f: Ref, g: Ref) -> bool {
        debug!("is_implies(f = {}, g = {})", f, g);
        self.ite_constant(f, g, self.one) == Some(true)
    }

    pub fn apply_not(&self, f: Ref) -> Ref {
        -f
    }

    pub fn apply_and(&self, u: Ref, v: Ref) -> Result<Ref> {
        debug!("apply_and(u = {}, v = {})", u, v);
        self.apply_ite(u, v, self.zero)
    }

    pub fn apply_or(&self, u: Ref, v: Ref) -> Result<Ref> {
        debug!("apply_or(u = {}, v = {})", u, v);
        self.apply_ite(u, self.one, v)
    }

    pub fn apply_xor(&self, u: Ref, v: Ref) -> Result<Ref> {
        debug!("apply_xor(u = {}, v = {})", u, v);
        self.apply_ite(u, -v, v)
    }

    pub fn apply_eq(&self, u: Ref, v: Ref) -> Result<Ref> {
        debug!("apply_eq(u = {}, v = {})", u, v);
        self.apply_ite(u, v, -v)
    }

    pub fn apply_imply(&self, u: Ref, v: Ref) -> Result<Ref> {
        debug!("apply_imply(u = {}, v = {})", u, v);
        self.apply_ite(u, v, self.one)
    }

    pub fn apply_and_many(&self, nodes: impl IntoIterator<Item = Ref>) -> Result<Ref> {
        let mut res = self.one;
        for node in nodes.into_iter() {
            res = self.apply_and(res, node)?;
        }
        Ok(res)
    }

    pub fn apply_or_many(&self, nodes: impl IntoIterator<Item = Ref>) -> Result<Ref> {
        let mut res = self.zero;
        for node in nodes.into_iter() {
            res = self.apply_or(res, node)?;
        }
        Ok(res)
    }

    /// Existentially quantify `f` over the given variables.
    pub fn exists(&self, f: Ref, vars: &[u32]) -> Result<Ref> {
        debug!("exists(f = {}, vars = {:?})", f, vars);

        let mark = self.protect_mark();
        self.protect(f);
        let res = (|| {
            let cube = self.cube(vars.iter().map(|&v| v as i32))?;
            self.protect(cube);
            self.op_depth.set(self.op_depth.get() + 1);
            let res = self.exists_rec(f, cube);
            self.op_depth.set(self.op_depth.get() - 1);
            res
        })();
        self.unprotect_to(mark);
        res
    }

    /// Universally quantify `f` over the given variables.
    pub fn forall(&self, f: Ref, vars: &[u32]) -> Result<Ref> {
        debug!("forall(f = {}, vars = {:?})", f, vars);
        Ok(-self.exists(-f, vars)?)
    }

    fn exists_rec(&self, f: Ref, cube: Ref) -> Result<Ref> {
        if self.is_terminal(f) || self.is_one(cube) {
            return Ok(f);
        }

        // Quantified variables above the top of f do not occur in f.
        let mut cube = cube;
        while !self.is_one(cube) && self.node_level(cube) < self.node_level(f) {
            cube = self.high_node(cube);
        }
        if self.is_one(cube) {
            return Ok(f);
        }

        let key = OpKey::Exists(f, cube);
        if let Some(&res) = self.cache.borrow().get(&key) {
            return Ok(res);
        }

        let v = self.variable(f.index());
        let (f0, f1) = (self.low_node(f), self.high_node(f));

        let mark = self.protect_mark();
        let res = if self.variable(cube.index()) == v {
            // Quantify v out: ∃v. f = f0 ∨ f1
            let rest = self.high_node(cube);
            let r0 = self.exists_rec(f0, rest)?;
            self.protect(r0);
            match self.exists_rec(f1, rest) {
                Ok(r1) => {
                    self.protect(r1);
                    self.apply_or(r0, r1)
                }
                Err(err) => Err(err),
            }
        } else {
            // v is kept; recurse below it.
            let r0 = self.exists_rec(f0, cube)?;
            self.protect(r0);
            match self.exists_rec(f1, cube) {
                Ok(r1) => {
                    self.protect(r1);
                    self.mk_node(v, r0, r1)
                }
                Err(err) => Err(err),
            }
        };
        self.unprotect_to(mark);
        let res = res?;

        self.cache.borrow_mut().insert(key, res);
        Ok(res)
    }

    /// Evaluate `f` under a total assignment (`assignment[i]` is the value
    /// of variable `i + 1`).
    pub fn evaluate(&self, f: Ref, assignment: &[bool]) -> Result<bool> {
        let mut current = f;
        while !self.is_terminal(current) {
            let v = self.variable(current.index());
            let value = *assignment
                .get((v - 1) as usize)
                .ok_or(BddError::InvalidVariable(v))?;
            current = if value {
                self.high_node(current)
            } else {
                self.low_node(current)
            };
        }
        Ok(self.is_one(current))
    }

    /// Indices of all nodes reachable from `nodes` (terminal included).
    pub(crate) fn descendants(&self, nodes: impl IntoIterator<Item = Ref>) -> HashSet<usize> {
        let mut visited = HashSet::new();
        visited.insert(self.one.index());
        let mut queue = VecDeque::from_iter(nodes);

        while let Some(node) = queue.pop_front() {
            let i = node.index();
            if visited.insert(i) {
                queue.push_back(self.low(i));
                queue.push_back(self.high(i));
            }
        }

        visited
    }

    /// Number of nodes in the diagram rooted at `f` (terminal included).
    pub fn size(&self, f: Ref) -> u64 {
        if let Some(&size) = self.size_cache.borrow().get(&f) {
            return size;
        }
        let size = self.descendants([f]).len() as u64;
        self.size_cache.borrow_mut().insert(f, size);
        size
    }

    /// Number of live nodes in the unique table (terminal included).
    pub fn num_nodes(&self) -> usize {
        self.storage.borrow().real_size()
    }

    /// Current unique table capacity.
    pub fn capacity(&self) -> usize {
        self.storage.borrow().capacity()
    }

    /// Audit the full data model: reduction and ordering invariants,
    /// hash-consing uniqueness, reference counts on live slots only.
    ///
    /// This walks the whole table; it is meant for tests and debugging,
    /// not for hot paths.
    pub fn check_invariants(&self) -> Result<()> {
        let storage = self.storage.borrow();
        let counts = self.ref_counts.borrow();
        let num_vars = self.num_vars();
        let violation = |msg: String| Err(BddError::InvariantViolation(msg));

        if !storage.is_occupied(1) {
            return violation("terminal node is missing".to_string());
        }

        let mut seen: HashSet<(u32, Ref, Ref)> = HashSet::new();
        for index in 2..=storage.size() {
            if !storage.is_occupied(index) {
                if counts[index] != 0 {
                    return violation(format!("freed node {} has external references", index));
                }
                continue;
            }
            let node = *storage.value(index);

            if node.variable == 0 || node.variable > num_vars {
                return violation(format!("node {} branches on undeclared variable", index));
            }
            if node.high.is_negated() {
                return violation(format!("node {} has a complemented high edge", index));
            }
            if node.low == node.high {
                return violation(format!("node {} is redundant (equal children)", index));
            }
            for child in [node.low, node.high] {
                let ci = child.index();
                if ci != 1 {
                    if !storage.is_occupied(ci) {
                        return violation(format!("node {} points to freed node {}", index, ci));
                    }
                    let child_var = storage.value(ci).variable;
                    if self.level_of(node.variable) >= self.level_of(child_var) {
                        return violation(format!(
                            "node {} breaks the ordering invariant over {}",
                            index, ci
                        ));
                    }
                }
            }
            if !seen.insert((node.variable, node.low, node.high)) {
                return violation(format!("duplicate triple at node {}", index));
            }
        }
        Ok(())
    }

    /// Nested parenthesized rendering of a diagram, for debugging.
    pub fn to_bracket_string(&self, node: Ref) -> String {
        if self.is_zero(node) {
            return "(0)".to_string();
        } else if self.is_one(node) {
            return "(1)".to_string();
        }

        let v = self.variable(node.index());
        let low = self.low_node(node);
        let high = self.high_node(node);

        format!(
            "{}:(x{}, {}, {})",
            node,
            v,
            self.to_bracket_string(high),
            self.to_bracket_string(low)
        )
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_var() {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1).unwrap();

        assert_eq!(bdd.variable(x.index()), 1);
        assert_eq!(bdd.high_node(x), bdd.one);
        assert_eq!(bdd.low_node(x), bdd.zero);
    }

    #[test]
    fn test_not_var() {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1).unwrap();
        let not_x = -x;

        assert_eq!(bdd.variable(not_x.index()), 1);
        assert_eq!(bdd.high_node(not_x), bdd.zero);
        assert_eq!(bdd.low_node(not_x), bdd.one);
    }

    #[test]
    fn test_terminal() {
        let bdd = Bdd::default();

        assert!(bdd.is_terminal(bdd.zero));
        assert!(bdd.is_zero(bdd.zero));
        assert!(!bdd.is_one(bdd.zero));

        assert!(bdd.is_terminal(bdd.one));
        assert!(!bdd.is_zero(bdd.one));
        assert!(bdd.is_one(bdd.one));
    }

    #[test]
    fn test_undeclared_variable() {
        let bdd = Bdd::new(BddConfig {
            num_vars: 4,
            ..BddConfig::default()
        });

        assert!(bdd.mk_var(4).is_ok());
        assert_eq!(bdd.mk_var(5), Err(BddError::InvalidVariable(5)));
        assert_eq!(bdd.mk_var(0), Err(BddError::InvalidVariable(0)));
        assert_eq!(bdd.cube([1, -7]), Err(BddError::InvalidVariable(7)));

        // Declaring a new variable extends the range.
        let x5 = bdd.new_var().unwrap();
        assert_eq!(bdd.variable(x5.index()), 5);
        assert_eq!(bdd.level_of(5), 4);
    }

    #[test]
    fn test_cube() {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1).unwrap();
        let x2 = bdd.mk_var(2).unwrap();
        let x3 = bdd.mk_var(3).unwrap();

        let f = bdd.apply_and(bdd.apply_and(x1, x2).unwrap(), x3).unwrap();
        let cube = bdd.cube([1, 2, 3]).unwrap();
        assert_eq!(f, cube);

        let f = bdd.apply_and(bdd.apply_and(x1, -x2).unwrap(), -x3).unwrap();
        let cube = bdd.cube([1, -2, -3]).unwrap();
        assert_eq!(f, cube);
    }

    #[test]
    fn test_clause() {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1).unwrap();
        let x2 = bdd.mk_var(2).unwrap();
        let x3 = bdd.mk_var(3).unwrap();

        let f = bdd.apply_or(bdd.apply_or(x1, x2).unwrap(), x3).unwrap();
        let clause = bdd.clause([1, 2, 3]).unwrap();
        assert_eq!(f, clause);

        let f = bdd.apply_or(bdd.apply_or(x1, -x2).unwrap(), -x3).unwrap();
        let clause = bdd.clause([1, -2, -3]).unwrap();
        assert_eq!(f, clause);
    }

    #[test]
    fn test_de_morgan_and() {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1).unwrap();
        let y = bdd.mk_var(2).unwrap();

        let f = -bdd.apply_and(x, y).unwrap();
        let g = bdd.apply_or(-x, -y).unwrap();
        assert_eq!(f, g);
    }

    #[test]
    fn test_de_morgan_or() {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1).unwrap();
        let y = bdd.mk_var(2).unwrap();

        let f = -bdd.apply_or(x, y).unwrap();
        let g = bdd.apply_and(-x, -y).unwrap();
        assert_eq!(f, g);
    }

    #[test]
    fn test_xor_itself() {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1).unwrap();
        let y = bdd.mk_var(2).unwrap();
        let f = bdd.apply_and(x, y).unwrap();

        assert_eq!(bdd.apply_xor(f, f).unwrap(), bdd.zero);
        assert_eq!(bdd.apply_xor(f, -f).unwrap(), bdd.one);
    }

    #[test]
    fn test_apply_ite() {
        let bdd = Bdd::default();

        // Terminal cases
        let g = bdd.mk_var(2).unwrap();
        let h = bdd.mk_var(3).unwrap();
        assert_eq!(bdd.apply_ite(bdd.one, g, h).unwrap(), g);
        assert_eq!(bdd.apply_ite(bdd.zero, g, h).unwrap(), h);

        // Functions
        let f = bdd
            .apply_or(bdd.mk_var(4).unwrap(), bdd.mk_var(5).unwrap())
            .unwrap();
        assert_eq!(bdd.apply_ite(f, f, h).unwrap(), bdd.apply_or(f, h).unwrap());
        assert_eq!(bdd.apply_ite(f, g, f).unwrap(), bdd.apply_and(f, g).unwrap());
        assert_eq!(
            bdd.apply_ite(f, -g, bdd.one).unwrap(),
            -bdd.apply_and(f, g).unwrap()
        );
        assert_eq!(
            bdd.apply_ite(f, bdd.zero, -h).unwrap(),
            -bdd.apply_or(f, h).unwrap()
        );

        // Constants
        let f = bdd.mk_var(5).unwrap();
        assert_eq!(bdd.apply_ite(f, g, g).unwrap(), g);
        assert_eq!(bdd.apply_ite(f, bdd.one, bdd.zero).unwrap(), f);
        assert_eq!(bdd.apply_ite(f, bdd.zero, bdd.one).unwrap(), -f);

        // General case
        let f = bdd.mk_var(6).unwrap();
        let g = bdd.mk_var(7).unwrap();
        let h = bdd.mk_var(8).unwrap();
        let result = bdd.mk_node(bdd.variable(f.index()), -g, -h).unwrap();
        assert_eq!(bdd.apply_ite(-f, -g, -h).unwrap(), result);
    }

    #[test]
    fn test_canonicity_across_op_orders() {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1).unwrap();
        let x2 = bdd.mk_var(2).unwrap();
        let x3 = bdd.mk_var(3).unwrap();

        // (x1 ∧ x2) ∨ x3, built three different ways.
        let a = bdd.apply_or(bdd.apply_and(x1, x2).unwrap(), x3).unwrap();
        let b = bdd.apply_or(x3, bdd.apply_and(x2, x1).unwrap()).unwrap();
        let c = bdd
            .apply_ite(x1, bdd.apply_or(x2, x3).unwrap(), x3)
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_evaluate_and() {
        let bdd = Bdd::default();

        let v0 = bdd.mk_var(1).unwrap();
        let v1 = bdd.mk_var(2).unwrap();
        let f = bdd.apply_and(v0, v1).unwrap();

        assert!(bdd.evaluate(f, &[true, true]).unwrap());
        assert!(!bdd.evaluate(f, &[false, true]).unwrap());
        assert!(!bdd.evaluate(f, &[true, false]).unwrap());
        assert!(!bdd.evaluate(f, &[false, false]).unwrap());
    }

    #[test]
    fn test_evaluate_ite_not() {
        let bdd = Bdd::default();

        let v0 = bdd.mk_var(1).unwrap();
        let v1 = bdd.mk_var(2).unwrap();
        let g = bdd.apply_ite(v0, v1, bdd.apply_not(v1)).unwrap();

        assert!(!bdd.evaluate(g, &[true, false]).unwrap());
        assert!(bdd.evaluate(g, &[false, false]).unwrap());
        assert!(bdd.evaluate(g, &[true, true]).unwrap());
        assert!(!bdd.evaluate(g, &[false, true]).unwrap());
    }

    #[test]
    fn test_evaluate_short_assignment() {
        let bdd = Bdd::default();

        let f = bdd.mk_var(3).unwrap();
        assert_eq!(bdd.evaluate(f, &[true, true]), Err(BddError::InvalidVariable(3)));
    }

    #[test]
    fn test_ite_constant() {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1).unwrap();
        let x2 = bdd.mk_var(2).unwrap();

        let f = bdd.apply_and(x1, x2).unwrap();

        assert!(bdd.is_implies(f, x1));
        assert!(bdd.is_implies(f, x2));
        assert!(!bdd.is_implies(f, -x1));
        assert!(!bdd.is_implies(f, -x2));
        assert!(bdd.is_implies(f, bdd.apply_and(x1, x2).unwrap()));
        assert!(bdd.is_implies(f, bdd.apply_or(x1, x2).unwrap()));
        assert!(bdd.is_implies(x1, bdd.one));
        assert!(bdd.is_implies(bdd.zero, x1));
        assert!(bdd.is_implies(x1, bdd.apply_or(x1, x2).unwrap()));
    }

    #[test]
    fn test_ite_constant_after_cached_constant_result() {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1).unwrap();
        let z = bdd.mk_var(2).unwrap();

        // ite(x, x∨z, ¬x∨z) reduces to the constant one and lands in the
        // cache; the constant-probe must report it as such.
        let g = bdd.apply_or(x, z).unwrap();
        let h = bdd.apply_or(-x, z).unwrap();
        let r = bdd.apply_ite(x, g, h).unwrap();
        assert_eq!(r, bdd.one);
        assert_eq!(bdd.ite_constant(x, g, h), Some(true));
    }

    #[test]
    fn test_exists() {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1).unwrap();
        let x2 = bdd.mk_var(2).unwrap();
        let x3 = bdd.mk_var(3).unwrap();

        // ∃x2. (x1 ∧ x2) = x1
        let f = bdd.apply_and(x1, x2).unwrap();
        assert_eq!(bdd.exists(f, &[2]).unwrap(), x1);

        // ∃x1. (x1 ∧ x2) ∨ (¬x1 ∧ x3) = x2 ∨ x3
        let g = bdd
            .apply_or(
                bdd.apply_and(x1, x2).unwrap(),
                bdd.apply_and(-x1, x3).unwrap(),
            )
            .unwrap();
        assert_eq!(bdd.exists(g, &[1]).unwrap(), bdd.apply_or(x2, x3).unwrap());

        // Quantifying a variable not in the support is a no-op.
        assert_eq!(bdd.exists(f, &[3]).unwrap(), f);

        // Quantifying everything yields a constant.
        assert_eq!(bdd.exists(f, &[1, 2]).unwrap(), bdd.one);
        assert_eq!(bdd.exists(bdd.zero, &[1]).unwrap(), bdd.zero);
    }

    #[test]
    fn test_forall() {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1).unwrap();
        let x2 = bdd.mk_var(2).unwrap();

        // ∀x2. (x1 ∨ x2) = x1
        let f = bdd.apply_or(x1, x2).unwrap();
        assert_eq!(bdd.forall(f, &[2]).unwrap(), x1);

        // ∀x1. (x1 ∧ x2) = 0
        let g = bdd.apply_and(x1, x2).unwrap();
        assert_eq!(bdd.forall(g, &[1]).unwrap(), bdd.zero);
    }

    #[test]
    fn test_size() {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1).unwrap();
        let y = bdd.mk_var(2).unwrap();
        let f = bdd.apply_and(x, y).unwrap();

        assert_eq!(bdd.size(bdd.one), 1);
        assert_eq!(bdd.size(x), 2);
        assert_eq!(bdd.size(f), 3);
    }

    #[test]
    fn test_check_invariants_after_operations() {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1).unwrap();
        let x2 = bdd.mk_var(2).unwrap();
        let x3 = bdd.mk_var(3).unwrap();
        let x4 = bdd.mk_var(4).unwrap();

        let f = bdd
            .apply_or(
                bdd.apply_and(x1, x3).unwrap(),
                bdd.apply_and(x2, x4).unwrap(),
            )
            .unwrap();
        let g = bdd.apply_xor(f, x3).unwrap();
        let _ = bdd.apply_imply(g, f).unwrap();

        bdd.check_invariants().unwrap();
    }

    mod random_formulas {
        use super::*;

        use rand::prelude::*;
        use test_log::test;

        const NUM_VARS: u32 = 5;

        #[derive(Debug, Clone)]
        enum Formula {
            Var(u32),
            Not(Box<Formula>),
            And(Box<Formula>, Box<Formula>),
            Or(Box<Formula>, Box<Formula>),
            Ite(Box<Formula>, Box<Formula>, Box<Formula>),
        }

        fn random_formula(rng: &mut StdRng, depth: usize) -> Formula {
            if depth == 0 {
                return Formula::Var(rng.gen_range(1..=NUM_VARS));
            }
            match rng.gen_range(0..5) {
                0 => Formula::Var(rng.gen_range(1..=NUM_VARS)),
                1 => Formula::Not(Box::new(random_formula(rng, depth - 1))),
                2 => Formula::And(
                    Box::new(random_formula(rng, depth - 1)),
                    Box::new(random_formula(rng, depth - 1)),
                ),
                3 => Formula::Or(
                    Box::new(random_formula(rng, depth - 1)),
                    Box::new(random_formula(rng, depth - 1)),
                ),
                _ => Formula::Ite(
                    Box::new(random_formula(rng, depth - 1)),
                    Box::new(random_formula(rng, depth - 1)),
                    Box::new(random_formula(rng, depth - 1)),
                ),
            }
        }

        fn eval_formula(formula: &Formula, assignment: &[bool]) -> bool {
            match formula {
                Formula::Var(v) => assignment[(v - 1) as usize],
                Formula::Not(f) => !eval_formula(f, assignment),
                Formula::And(f, g) => {
                    eval_formula(f, assignment) && eval_formula(g, assignment)
                }
                Formula::Or(f, g) => eval_formula(f, assignment) || eval_formula(g, assignment),
                Formula::Ite(f, g, h) => {
                    if eval_formula(f, assignment) {
                        eval_formula(g, assignment)
                    } else {
                        eval_formula(h, assignment)
                    }
                }
            }
        }

        fn build(bdd: &Bdd, formula: &Formula) -> Ref {
            match formula {
                Formula::Var(v) => bdd.mk_var(*v).unwrap(),
                Formula::Not(f) => -build(bdd, f),
                Formula::And(f, g) => bdd.apply_and(build(bdd, f), build(bdd, g)).unwrap(),
                Formula::Or(f, g) => bdd.apply_or(build(bdd, f), build(bdd, g)).unwrap(),
                Formula::Ite(f, g, h) => {
                    let f = build(bdd, f);
                    let g = build(bdd, g);
                    let h = build(bdd, h);
                    bdd.apply_ite(f, g, h).unwrap()
                }
            }
        }

        #[test]
        fn test_exhaustive_equivalence() {
            let mut rng = StdRng::seed_from_u64(42);
            let bdd = Bdd::default();

            for _ in 0..100 {
                let formula = random_formula(&mut rng, 4);
                let f = build(&bdd, &formula);

                for bits in 0..(1u32 << NUM_VARS) {
                    let assignment: Vec<bool> =
                        (0..NUM_VARS).map(|i| bits & (1 << i) != 0).collect();
                    assert_eq!(
                        bdd.evaluate(f, &assignment).unwrap(),
                        eval_formula(&formula, &assignment),
                        "mismatch for {:?} under {:?}",
                        formula,
                        assignment
                    );
                }
            }

            bdd.check_invariants().unwrap();
        }
    }
}
