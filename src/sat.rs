//! Satisfiability queries: model enumeration and exact model counting.

use std::collections::HashMap;

use num_bigint::{BigUint, ToBigUint};

use crate::bdd::Bdd;
use crate::reference::Ref;

impl Bdd {
    /// Returns one satisfying assignment for the function, if any exists.
    ///
    /// The assignment is returned as DIMACS-style literals (negative means
    /// the variable is false) for the variables along the chosen path;
    /// variables not mentioned are unconstrained.
    ///
    /// Returns `None` if the function is the constant false.
    pub fn one_sat(&self, node: Ref) -> Option<Vec<i32>> {
        if self.is_zero(node) {
            return None;
        }

        let mut path = Vec::new();
        let mut current = node;

        // Walk down the diagram, always picking a satisfiable branch.
        while !self.is_one(current) {
            let var = self.variable(current.index());
            let high = self.high_node(current);
            let low = self.low_node(current);

            // Prefer the high branch if satisfiable, otherwise take low.
            if !self.is_zero(high) {
                path.push(var as i32);
                current = high;
            } else {
                path.push(-(var as i32));
                current = low;
            }
        }

        Some(path)
    }

    /// Count the assignments of `num_vars` variables satisfying the function.
    ///
    /// `num_vars` must cover every variable in the function's support;
    /// unconstrained variables multiply the count by two each.
    pub fn sat_count(&self, node: Ref, num_vars: usize) -> BigUint {
        let mut cache = HashMap::new();
        let two = 2.to_biguint().unwrap();
        let max = two.pow(num_vars as u32);
        self.sat_count_rec(node, &max, &mut cache)
    }

    fn sat_count_rec(
        &self,
        node: Ref,
        max: &BigUint,
        cache: &mut HashMap<Ref, BigUint>,
    ) -> BigUint {
        if self.is_zero(node) {
            return BigUint::ZERO;
        } else if self.is_one(node) {
            return max.clone();
        }

        if let Some(count) = cache.get(&node) {
            return count.clone();
        }

        let low = self.low(node.index());
        let high = self.high(node.index());

        let count_low = self.sat_count_rec(low, max, cache);
        let count_high = self.sat_count_rec(high, max, cache);

        // Each branch constrains one variable, halving its share of the
        // assignment space; a complemented root counts the complement.
        let count: BigUint = (count_low + count_high) >> 1;
        let count = if node.is_negated() { max - count } else { count };

        cache.insert(node, count.clone());
        count
    }
}
