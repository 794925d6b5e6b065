//! # robdd: Reduced Ordered Binary Decision Diagrams in Rust
//!
//! **`robdd`** is a manager-centric library for working with **Binary
//! Decision Diagrams (BDDs)**, aimed at model checkers, symbolic solvers and
//! other formal-verification tooling.
//!
//! A BDD represents a Boolean function as a directed acyclic graph. Under a
//! fixed variable ordering the representation is **canonical**: every
//! function has exactly one reduced diagram, so equivalence, satisfiability
//! and validity checks are constant-time handle comparisons.
//!
//! ## Key Features
//!
//! - **Manager-Centric Architecture**: all operations go through the
//!   [`Bdd`][crate::bdd::Bdd] manager, which guarantees structural sharing
//!   (hash consing) and the canonical-form invariants.
//! - **Complemented edges**: negation ([`-f`][crate::reference::Ref]) is
//!   free and never allocates.
//! - **Reference-counted garbage collection**: handles are counted,
//!   non-owning references; dead nodes are reclaimed automatically when the
//!   table fills up, or on demand.
//! - **Dynamic variable reordering**: Rudell's sifting keeps diagrams small
//!   without changing any externally held function.
//! - **1-Based Indexing**: variables are 1-indexed (0 is reserved),
//!   matching DIMACS conventions.
//!
//! ## Basic Usage
//!
//! ```rust
//! use robdd::bdd::Bdd;
//!
//! let bdd = Bdd::default();
//!
//! let x1 = bdd.mk_var(1)?;
//! let x2 = bdd.mk_var(2)?;
//!
//! // f = x1 AND (NOT x2)
//! let f = bdd.reference(bdd.apply_and(x1, -x2)?);
//!
//! assert!(!bdd.is_zero(f)); // satisfiable
//! assert!(!bdd.is_one(f));  // not a tautology
//! assert!(bdd.evaluate(f, &[true, false])?);
//!
//! bdd.release(f)?;
//! # Ok::<(), robdd::error::BddError>(())
//! ```
//!
//! ## Core Components
//!
//! - **[`bdd`]**: the manager, the ITE engine and derived connectives.
//! - **[`gc`]**: reference counting and mark/sweep collection.
//! - **[`reorder`]**: level swaps and the sifting heuristic.
//! - **[`sat`]**: satisfying assignments and model counting.
//! - **[`dot`]**: Graphviz export for debugging diagrams.

pub mod bdd;
pub mod cache;
pub mod dot;
pub mod error;
pub mod gc;
pub mod node;
pub mod reference;
pub mod reorder;
pub mod sat;
pub mod table;
pub mod types;
pub mod utils;
