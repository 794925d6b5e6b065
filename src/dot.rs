//! BDD to DOT (Graphviz) conversion.
//!
//! Conventions:
//! - the terminal is a square at the bottom;
//! - decision nodes are circles, ranked by their level in the ordering;
//! - high (then) edges are solid, low (else) edges dashed;
//! - complemented edges carry an `odot` arrowhead;
//! - roots are rectangles at the top.
//!
//! Render with `dot -Tpng out.dot -o out.png`.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::bdd::Bdd;
use crate::reference::Ref;

impl Bdd {
    /// Render the diagrams rooted at `roots` as a DOT graph.
    pub fn to_dot(&self, roots: &[Ref]) -> Result<String, std::fmt::Error> {
        let mut out = String::new();
        writeln!(out, "digraph bdd {{")?;
        writeln!(out, "  rankdir=TB;")?;

        // Group reachable nodes by level so shared levels align.
        let mut by_level: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        let mut indices: Vec<usize> = self
            .descendants(roots.iter().copied())
            .into_iter()
            .filter(|&idx| idx != 1)
            .collect();
        indices.sort_unstable();
        for idx in &indices {
            let level = self.level_of(self.variable(*idx));
            by_level.entry(level).or_default().push(*idx);
        }

        for nodes in by_level.values() {
            writeln!(out, "  {{ rank=same;")?;
            for &idx in nodes {
                writeln!(
                    out,
                    "    n{} [shape=circle, label=\"x{}\"];",
                    idx,
                    self.variable(idx)
                )?;
            }
            writeln!(out, "  }}")?;
        }
        writeln!(out, "  {{ rank=sink; n1 [shape=square, label=\"1\"]; }}")?;

        for &idx in &indices {
            let low = self.low(idx);
            let high = self.high(idx);
            writeln!(
                out,
                "  n{} -> n{} [style=dashed{}];",
                idx,
                low.index(),
                if low.is_negated() { ", arrowhead=odot" } else { "" }
            )?;
            writeln!(out, "  n{} -> n{} [style=solid];", idx, high.index())?;
        }

        writeln!(out, "  {{ rank=source;")?;
        for (i, _) in roots.iter().enumerate() {
            writeln!(out, "    f{} [shape=rect, label=\"f{}\"];", i, i)?;
        }
        writeln!(out, "  }}")?;
        for (i, &root) in roots.iter().enumerate() {
            writeln!(
                out,
                "  f{} -> n{}{};",
                i,
                root.index(),
                if root.is_negated() { " [arrowhead=odot]" } else { "" }
            )?;
        }

        writeln!(out, "}}")?;
        Ok(out)
    }
}
