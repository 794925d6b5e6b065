//! Variable ordering and reordering.
//!
//! The size of a BDD is highly sensitive to the variable order: for some
//! functions a good order is linear in the number of variables and a bad one
//! exponential. Finding the optimal order is NP-complete, so the manager
//! improves the order heuristically with **Rudell's sifting**: each variable
//! in turn is moved through every position by adjacent-level swaps, then
//! settled where the diagram was smallest.
//!
//! The swap primitive rewrites affected nodes *in place*: a node keeps its
//! id (so external handles keep denoting the same function) while its
//! contents are rebuilt from its grandchildren. Only nodes at the upper
//! level that actually depend on the lower variable are touched; swap cost
//! follows the population of the two levels plus the bucket rebuild.
//!
//! # References
//!
//! - R. Rudell. "Dynamic variable ordering for ordered binary decision
//!   diagrams." ICCAD 1993.
//! - R. Bryant. "Graph-Based Algorithms for Boolean Function Manipulation."
//!   IEEE Trans. Computers, 1986.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::bdd::Bdd;
use crate::error::Result;
use crate::node::Node;
use crate::reference::Ref;
use crate::types::{Level, Var};

/// Statistics collected during reordering.
#[derive(Debug, Clone, Default)]
pub struct ReorderStats {
    /// Number of adjacent-level swaps performed
    pub swaps: usize,
    /// Initial diagram size (number of live nodes reachable from roots)
    pub initial_size: usize,
    /// Final diagram size after reordering
    pub final_size: usize,
    /// Best size seen during reordering
    pub best_size: usize,
    /// Number of variables sifted
    pub variables_processed: usize,
}

impl ReorderStats {
    /// Calculate the size reduction ratio.
    pub fn reduction_ratio(&self) -> f64 {
        if self.initial_size == 0 {
            return 0.0;
        }
        1.0 - (self.final_size as f64 / self.initial_size as f64)
    }

    /// Calculate the percentage reduction.
    pub fn reduction_percent(&self) -> f64 {
        self.reduction_ratio() * 100.0
    }
}

impl Bdd {
    /// Cofactors of `f` with respect to `v`, which is either `f`'s own
    /// branching variable or lies above it.
    fn cofactors_by_var(&self, f: Ref, v: u32) -> (Ref, Ref) {
        if !self.is_terminal(f) && self.variable(f.index()) == v {
            (self.low_node(f), self.high_node(f))
        } else {
            (f, f)
        }
    }

    /// Live nodes branching on `x` with a child branching on `y`.
    fn nodes_to_rebuild(&self, x: u32, y: u32) -> Vec<usize> {
        let storage = self.storage.borrow();
        let branches_on_y =
            |r: Ref| !self.is_terminal(r) && storage.value(r.index()).variable == y;
        (2..=storage.size())
            .filter(|&idx| storage.is_occupied(idx))
            .filter(|&idx| {
                let node = storage.value(idx);
                node.variable == x && (branches_on_y(node.low) || branches_on_y(node.high))
            })
            .collect()
    }

    /// Exchange the levels `level` and `level + 1` in the variable ordering.
    ///
    /// Every function denoted by an existing handle is preserved: nodes at
    /// the upper level that depend on the lower variable are rebuilt in
    /// place around their grandchildren,
    ///
    /// ```text
    /// (x, (y, a, b), (y, c, d))  ->  (y, (x, a, c), (x, b, d))
    /// ```
    ///
    /// and every other node is untouched. Both computation caches are
    /// invalidated, since memoized keys mix levels and results.
    ///
    /// # Panics
    ///
    /// Panics if `level + 1` is not a valid level.
    pub fn swap_adjacent_levels(&self, level: Level) -> Result<()> {
        let i = level.index();
        assert!(
            i + 1 < self.num_levels(),
            "Level {} has no successor to swap with",
            level
        );
        let x = self.var_at_level(i);
        let y = self.var_at_level(i + 1);
        debug!("Swapping levels {} (x{}) and {} (x{})", i, x, i + 1, y);

        // Reserve room for the rebuilt children up front, so no sweep or
        // growth-failure can interrupt the rewrite below. The reservation
        // itself may collect, so the rebuild set is gathered afterwards.
        let estimate = self.nodes_to_rebuild(x, y).len();
        self.ensure_capacity_for(2 * estimate + 1)?;

        // Upper-level nodes that branch on y below: these must be rebuilt.
        let affected = self.nodes_to_rebuild(x, y);

        // Node contents and hash chains disagree until the rebuild commits;
        // a sweep must not walk the table in that state.
        self.gc_suspended.set(true);
        let rewritten = (|| -> Result<()> {
            for idx in affected {
                let node = self.node(idx);
                let (f00, f01) = self.cofactors_by_var(node.low, y);
                let (f10, f11) = self.cofactors_by_var(node.high, y);

                let mark = self.protect_mark();
                let low = self.mk_node(x, f00, f10)?;
                self.protect(low);
                let high = self.mk_node(x, f01, f11);
                self.unprotect_to(mark);
                let high = high?;

                // In-place rewrite: the id (and thus every handle) survives.
                *self.storage.borrow_mut().value_mut(idx) = Node {
                    variable: y,
                    low,
                    high,
                };
            }
            Ok(())
        })();
        self.gc_suspended.set(false);
        rewritten?;

        // Commit the new order and re-key the table.
        self.level2var.borrow_mut().swap(i, i + 1);
        {
            let mut var2level = self.var2level.borrow_mut();
            var2level[x as usize] = i + 1;
            var2level[y as usize] = i;
        }
        self.storage.borrow_mut().rebuild_buckets();
        self.cache.borrow_mut().clear();
        self.size_cache.borrow_mut().clear();

        Ok(())
    }

    /// Sift a single variable to its locally optimal position.
    ///
    /// The variable is moved to the top, then down through every level,
    /// recording the live diagram size at each position; finally it is
    /// moved back to the position that minimized the size.
    ///
    /// Returns the number of swaps performed and the size reduction.
    pub fn sift_variable(&self, var: Var) -> Result<(usize, i64)> {
        if var.id() > self.num_vars() {
            return Err(crate::error::BddError::InvalidVariable(var.id()));
        }
        let mut current_level = Level::new(self.level_of(var.id()));

        let num_levels = self.num_levels();
        if num_levels <= 1 {
            return Ok((0, 0));
        }

        let roots = self.external_roots();
        let initial_size = self.count_nodes(&roots) as i64;
        let mut swaps = 0;

        let mut sizes: Vec<(usize, usize)> = Vec::new();
        sizes.push((current_level.index(), initial_size as usize));

        debug!("Sifting {} (initially at level {})", var, current_level);

        // Move the variable up to level 0...
        while let Some(prev) = current_level.prev() {
            self.swap_adjacent_levels(prev)?;
            current_level = prev;
            swaps += 1;
            sizes.push((current_level.index(), self.count_nodes(&roots)));
        }

        // ...then down through all positions.
        while current_level.index() < num_levels - 1 {
            self.swap_adjacent_levels(current_level)?;
            current_level = current_level.next();
            swaps += 1;
            sizes.push((current_level.index(), self.count_nodes(&roots)));
        }

        let (best_level, best_size) = sizes.iter().min_by_key(|(_, size)| size).copied().unwrap();
        debug!("Best position for {}: level {} with size {}", var, best_level, best_size);

        // Move the variable back up to the best position.
        while current_level.index() > best_level {
            let prev = current_level.prev().expect("Should have previous level");
            self.swap_adjacent_levels(prev)?;
            current_level = prev;
            swaps += 1;
        }

        let final_size = self.count_nodes(&roots) as i64;
        debug!(
            "Sifted {}: {} swaps, size {} -> {}",
            var, swaps, initial_size, final_size
        );

        Ok((swaps, initial_size - final_size))
    }

    /// Run Rudell's sifting over every variable in the support of the
    /// externally referenced functions, most-used variables first.
    ///
    /// Correctness-preserving: every externally live function is unchanged,
    /// only the internal node count may shrink.
    pub fn sift_all(&self) -> Result<ReorderStats> {
        let roots = self.external_roots();
        let initial_size = self.count_nodes(&roots);
        debug!("Sifting all variables, initial size {}", initial_size);

        let mut all_vars = HashSet::new();
        for &root in roots.iter() {
            all_vars.extend(self.support(root));
        }

        if all_vars.is_empty() {
            return Ok(ReorderStats {
                initial_size,
                final_size: initial_size,
                best_size: initial_size,
                ..Default::default()
            });
        }

        let usage_counts = self.variable_usage_counts(&roots);

        let mut vars_to_sift: Vec<Var> = all_vars.into_iter().collect();
        vars_to_sift.sort_by(|a, b| {
            let count_a = usage_counts.get(a).copied().unwrap_or(0);
            let count_b = usage_counts.get(b).copied().unwrap_or(0);
            count_b.cmp(&count_a) // Descending order
        });

        let mut total_swaps = 0;
        let mut best_size = initial_size;

        for &var in &vars_to_sift {
            let (swaps, _reduction) = self.sift_variable(var)?;
            total_swaps += swaps;

            let current_size = self.count_nodes(&roots);
            if current_size < best_size {
                best_size = current_size;
            }
        }

        let final_size = self.count_nodes(&roots);
        debug!(
            "Sifting complete: size {} -> {}, {} swaps, {} variables",
            initial_size,
            final_size,
            total_swaps,
            vars_to_sift.len()
        );

        Ok(ReorderStats {
            swaps: total_swaps,
            initial_size,
            final_size,
            best_size,
            variables_processed: vars_to_sift.len(),
        })
    }

    /// Sift automatically once the table passes the armed trigger.
    ///
    /// Runs only between top-level operations (never with in-flight
    /// intermediates on the work stack).
    pub(crate) fn maybe_auto_reorder(&self) -> Result<()> {
        if !self.config.auto_reorder {
            return Ok(());
        }
        if self.op_depth.get() > 0 {
            return Ok(());
        }
        let real_size = self.storage.borrow().real_size();
        if real_size < self.next_reorder.get() {
            return Ok(());
        }

        debug!("Automatic reordering at {} nodes", real_size);
        self.sift_all()?;

        let real_size = self.storage.borrow().real_size();
        self.next_reorder
            .set((real_size * 2).max(self.config.reorder_trigger));
        Ok(())
    }

    /// Count the unique nodes reachable from the given roots
    /// (terminal included).
    pub fn count_nodes(&self, roots: &[Ref]) -> usize {
        let mut visited = HashSet::new();
        visited.insert(self.one.index());

        for &root in roots {
            let mut stack = vec![root.index()];

            while let Some(idx) = stack.pop() {
                if visited.insert(idx) {
                    let node = self.node(idx);
                    let low = node.low.index();
                    if low != 1 {
                        stack.push(low);
                    }
                    let high = node.high.index();
                    if high != 1 {
                        stack.push(high);
                    }
                }
            }
        }

        visited.len()
    }

    /// The set of variables the function depends on, sorted by level.
    pub fn support(&self, root: Ref) -> Vec<Var> {
        let mut vars = HashSet::new();
        let mut stack = vec![root];
        let mut visited = HashSet::new();

        while let Some(node_ref) = stack.pop() {
            if self.is_terminal(node_ref) || !visited.insert(node_ref.index()) {
                continue;
            }

            let node = self.node(node_ref.index());
            vars.insert(Var::new(node.variable));

            stack.push(node.low);
            stack.push(node.high);
        }

        let mut result: Vec<Var> = vars.into_iter().collect();
        result.sort_unstable_by_key(|v| self.level_of(v.id()));
        result
    }

    /// Count how many nodes branch on each variable.
    ///
    /// Used to decide the sifting order (most-used variables first).
    pub fn variable_usage_counts(&self, roots: &[Ref]) -> HashMap<Var, usize> {
        let mut counts: HashMap<Var, usize> = HashMap::new();
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for &root in roots {
            if visited.insert(root.index()) {
                stack.push(root);
            }
        }

        while let Some(node_ref) = stack.pop() {
            if self.is_terminal(node_ref) {
                continue;
            }

            let node = self.node(node_ref.index());
            *counts.entry(Var::new(node.variable)).or_insert(0) += 1;

            if visited.insert(node.low.index()) {
                stack.push(node.low);
            }
            if visited.insert(node.high.index()) {
                stack.push(node.high);
            }
        }

        counts
    }
}
