//! External reference counting and garbage collection.
//!
//! Handles returned by the manager are non-owning: a node stays alive only
//! while its external count is positive, it is reachable from such a node,
//! or it sits on the operation-local work stack that roots in-flight
//! intermediates. Everything else is reclaimed by [`Bdd::collect_garbage`],
//! which runs on demand and automatically when the unique table approaches
//! its capacity.
//!
//! A sweep invalidates the computation caches wholesale: a freed id may be
//! reused by a later allocation, and a stale memo hit on a reused id would
//! silently corrupt results.

use log::debug;

use crate::bdd::Bdd;
use crate::error::{BddError, Result};
use crate::reference::Ref;

impl Bdd {
    pub(crate) fn protect_mark(&self) -> usize {
        self.work_stack.borrow().len()
    }

    /// Root `node` against sweeps until the matching
    /// [`unprotect_to`][Self::unprotect_to].
    pub(crate) fn protect(&self, node: Ref) {
        self.work_stack.borrow_mut().push(node);
    }

    pub(crate) fn unprotect_to(&self, mark: usize) {
        self.work_stack.borrow_mut().truncate(mark);
    }

    /// Acquire an external reference to `node`. Returns `node` for chaining.
    pub fn reference(&self, node: Ref) -> Ref {
        self.ref_counts.borrow_mut()[node.index()] += 1;
        node
    }

    /// Release an external reference previously acquired with
    /// [`reference`][Self::reference].
    pub fn release(&self, node: Ref) -> Result<()> {
        let mut counts = self.ref_counts.borrow_mut();
        let count = &mut counts[node.index()];
        if *count == 0 {
            return Err(BddError::ReferenceUnderflow(node));
        }
        *count -= 1;
        Ok(())
    }

    /// Current external reference count of `node`.
    pub fn ref_count(&self, node: Ref) -> u32 {
        self.ref_counts.borrow()[node.index()]
    }

    /// All nodes holding a positive external count.
    pub(crate) fn external_roots(&self) -> Vec<Ref> {
        let storage = self.storage.borrow();
        let counts = self.ref_counts.borrow();
        (2..=storage.size())
            .filter(|&i| storage.is_occupied(i) && counts[i] > 0)
            .map(|i| Ref::positive(i as u32))
            .collect()
    }

    /// Reclaim every node unreachable from the external references and the
    /// work stack. Returns the number of freed slots.
    pub fn collect_garbage(&self) -> usize {
        debug!("Collecting garbage...");
        debug_assert!(!self.gc_suspended.get(), "sweep during a level swap");

        let mut roots = self.external_roots();
        roots.extend(self.work_stack.borrow().iter().copied());
        let alive = self.descendants(roots);

        let freed = self.storage.borrow_mut().sweep(&alive);

        if freed > 0 {
            self.cache.borrow_mut().clear();
            self.size_cache.borrow_mut().clear();
        }

        debug!("Garbage collection freed {} nodes", freed);
        freed
    }

    /// Make room for one more node.
    pub(crate) fn ensure_capacity(&self) -> Result<()> {
        self.ensure_capacity_for(1)
    }

    /// Make room for `n` more nodes: collect first, then grow, then fail.
    ///
    /// Slot 0 of the table is a sentry, so the usable limit is one below
    /// the capacity.
    pub(crate) fn ensure_capacity_for(&self, n: usize) -> Result<()> {
        let (real_size, capacity) = {
            let storage = self.storage.borrow();
            (storage.real_size(), storage.capacity())
        };
        let threshold = (capacity as f64 * self.config.gc_fraction) as usize;
        if real_size + n <= threshold.min(capacity - 1) {
            return Ok(());
        }

        if !self.gc_suspended.get() {
            self.collect_garbage();
        }

        loop {
            let (real_size, capacity, bits) = {
                let storage = self.storage.borrow();
                (storage.real_size(), storage.capacity(), storage.bits())
            };
            let threshold = (capacity as f64 * self.config.gc_fraction) as usize;
            if real_size + n <= threshold.min(capacity - 1) {
                return Ok(());
            }
            if bits >= self.config.max_storage_bits {
                // Above the GC threshold but within the hard limit: allow
                // the table to fill up before reporting exhaustion.
                if real_size + n <= capacity - 1 {
                    return Ok(());
                }
                return Err(BddError::ResourceExhaustion {
                    needed: real_size + n,
                    limit: capacity - 1,
                });
            }
            let add = self
                .config
                .growth_bits
                .min(self.config.max_storage_bits - bits);
            debug!("Growing unique table from 2^{} to 2^{} slots", bits, bits + add);
            self.storage.borrow_mut().grow(add);
            let new_capacity = self.storage.borrow().capacity();
            self.ref_counts.borrow_mut().resize(new_capacity, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use crate::bdd::{Bdd, BddConfig};
    use crate::error::BddError;

    #[test]
    fn test_reference_release() {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1).unwrap();
        let y = bdd.mk_var(2).unwrap();
        // Variable nodes carry the manager's own hold.
        assert_eq!(bdd.ref_count(x), 1);

        let f = bdd.apply_and(x, y).unwrap();
        assert_eq!(bdd.ref_count(f), 0);

        bdd.reference(f);
        bdd.reference(f);
        assert_eq!(bdd.ref_count(f), 2);

        bdd.release(f).unwrap();
        assert_eq!(bdd.ref_count(f), 1);
        bdd.release(f).unwrap();
        assert_eq!(bdd.ref_count(f), 0);
    }

    #[test]
    fn test_release_underflow() {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1).unwrap();
        let y = bdd.mk_var(2).unwrap();
        let f = bdd.apply_and(x, y).unwrap();
        assert_eq!(bdd.release(f), Err(BddError::ReferenceUnderflow(f)));

        // A failed release does not disturb the manager.
        bdd.reference(f);
        assert_eq!(bdd.ref_count(f), 1);
        bdd.check_invariants().unwrap();
    }

    #[test]
    fn test_collect_keeps_referenced() {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1).unwrap();
        let x2 = bdd.mk_var(2).unwrap();
        let f = bdd.reference(bdd.apply_and(x1, x2).unwrap());

        let before = bdd.num_nodes();
        let freed = bdd.collect_garbage();
        // x1 is f's own top node; x2's node is shared as a child of f.
        // Nothing reachable from f may be freed.
        assert_eq!(bdd.num_nodes(), before - freed);
        assert!(bdd.evaluate(f, &[true, true]).unwrap());
        assert!(!bdd.evaluate(f, &[true, false]).unwrap());
        bdd.check_invariants().unwrap();
    }

    #[test]
    fn test_slot_reuse_after_release() {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1).unwrap();
        let x2 = bdd.mk_var(2).unwrap();
        let x3 = bdd.mk_var(3).unwrap();
        let x4 = bdd.mk_var(4).unwrap();

        let keep = bdd.reference(bdd.apply_and(x1, x2).unwrap());
        let dead = bdd.reference(bdd.apply_and(x3, x4).unwrap());

        bdd.release(dead).unwrap();
        let before = bdd.num_nodes();
        let freed = bdd.collect_garbage();
        assert!(freed > 0);
        assert_eq!(bdd.num_nodes(), before - freed);

        // A distinct construction may land in the freed slots without
        // aliasing the survivors.
        let other = bdd.reference(bdd.apply_or(x1, -x2).unwrap());
        assert_ne!(other, keep);
        assert!(bdd.evaluate(keep, &[true, true, false, false]).unwrap());
        assert!(!bdd.evaluate(keep, &[true, false, false, false]).unwrap());
        assert!(bdd.evaluate(other, &[true, true, false, false]).unwrap());
        bdd.check_invariants().unwrap();
    }

    #[test]
    fn test_gc_transparency() {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1).unwrap();
        let x2 = bdd.mk_var(2).unwrap();
        let x3 = bdd.mk_var(3).unwrap();

        let f = bdd.reference(
            bdd.apply_or(bdd.apply_and(x1, x2).unwrap(), bdd.apply_xor(x2, x3).unwrap())
                .unwrap(),
        );

        let truth: Vec<bool> = (0..8u32)
            .map(|bits| {
                let assignment: Vec<bool> = (0..3).map(|i| bits & (1 << i) != 0).collect();
                bdd.evaluate(f, &assignment).unwrap()
            })
            .collect();

        bdd.collect_garbage();

        for bits in 0..8u32 {
            let assignment: Vec<bool> = (0..3).map(|i| bits & (1 << i) != 0).collect();
            assert_eq!(bdd.evaluate(f, &assignment).unwrap(), truth[bits as usize]);
        }
        bdd.check_invariants().unwrap();
    }

    #[test]
    fn test_growth_past_initial_capacity() {
        // 16 initial slots; referencing everything forces the table to grow
        // instead of collecting.
        let bdd = Bdd::new(BddConfig {
            num_vars: 8,
            storage_bits: 4,
            max_storage_bits: 10,
            cache_bits: 8,
            ..BddConfig::default()
        });

        let mut handles = Vec::new();
        for v in 1..=8 {
            let mut f = bdd.reference(bdd.mk_var(v).unwrap());
            for w in 1..v {
                let x = bdd.mk_var(w).unwrap();
                let next = bdd.reference(bdd.apply_xor(f, x).unwrap());
                bdd.release(f).unwrap();
                f = next;
            }
            handles.push(f);
        }

        assert!(bdd.capacity() > 16);

        // Handles survive the resize and still evaluate identically, and
        // no duplicate triples exist afterwards.
        for (i, &f) in handles.iter().enumerate() {
            let v = i + 1;
            // f_v = x_v ^ x_1 ^ ... ^ x_{v-1}: parity of the first v bits.
            for bits in 0..(1u32 << 8) {
                let assignment: Vec<bool> = (0..8).map(|i| bits & (1 << i) != 0).collect();
                let expected = assignment[..v].iter().filter(|&&b| b).count() % 2 == 1;
                assert_eq!(bdd.evaluate(f, &assignment).unwrap(), expected);
            }
        }
        bdd.check_invariants().unwrap();
    }

    #[test]
    fn test_resource_exhaustion() {
        // 8 slots total (one sentry, one terminal) and no room to grow.
        let bdd = Bdd::new(BddConfig {
            num_vars: 16,
            storage_bits: 3,
            max_storage_bits: 3,
            cache_bits: 4,
            gc_fraction: 1.0,
            ..BddConfig::default()
        });

        let mut last = bdd.mk_var(1).map(|f| bdd.reference(f));
        for v in 2..=16 {
            if last.is_err() {
                break;
            }
            last = bdd.mk_var(v).map(|f| bdd.reference(f));
        }

        match last {
            Err(BddError::ResourceExhaustion { limit, .. }) => assert_eq!(limit, 7),
            other => panic!("Expected resource exhaustion, got {:?}", other),
        }
    }

    #[test]
    fn test_automatic_gc_under_pressure() {
        // Unreferenced intermediates get collected automatically once the
        // small table fills up; the referenced result keeps its meaning.
        let bdd = Bdd::new(BddConfig {
            num_vars: 6,
            storage_bits: 4,
            max_storage_bits: 6,
            cache_bits: 6,
            ..BddConfig::default()
        });

        let mut f = bdd.reference(bdd.mk_var(1).unwrap());
        for v in 2..=6 {
            let x = bdd.mk_var(v).unwrap();
            let next = bdd.reference(bdd.apply_and(f, x).unwrap());
            bdd.release(f).unwrap();
            f = next;
        }

        // f = x1 ∧ ... ∧ x6
        assert!(bdd.evaluate(f, &[true; 6]).unwrap());
        let mut assignment = [true; 6];
        assignment[3] = false;
        assert!(!bdd.evaluate(f, &assignment).unwrap());
        bdd.check_invariants().unwrap();
    }
}
