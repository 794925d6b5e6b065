//! Variable reordering demo.
//!
//! Builds `(a1 ∧ b1) ∨ (a2 ∧ b2) ∨ (a3 ∧ b3)` under a good ordering
//! (pairs adjacent) and a bad one (pairs separated), then lets sifting
//! recover from the bad ordering.
//!
//! Run with:
//! ```bash
//! cargo run --example reordering
//! ```

use robdd::bdd::{Bdd, BddConfig};
use robdd::error::BddError;

fn build_pairs(bdd: &Bdd, pairs: &[(u32, u32)]) -> Result<robdd::reference::Ref, BddError> {
    let mut terms = Vec::new();
    for &(a, b) in pairs {
        terms.push(bdd.apply_and(bdd.mk_var(a)?, bdd.mk_var(b)?)?);
    }
    Ok(bdd.reference(bdd.apply_or_many(terms)?))
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let config = BddConfig {
        num_vars: 6,
        ..BddConfig::default()
    };

    // Good ordering: a1 b1 a2 b2 a3 b3 (pairs adjacent).
    let bdd = Bdd::new(config.clone());
    let f_good = build_pairs(&bdd, &[(1, 2), (3, 4), (5, 6)])?;
    println!("good ordering: {} nodes", bdd.count_nodes(&[f_good]));

    // Bad ordering: a1 a2 a3 b1 b2 b3 (pairs separated).
    let bdd = Bdd::new(config);
    let f_bad = build_pairs(&bdd, &[(1, 4), (2, 5), (3, 6)])?;
    println!("bad ordering:  {} nodes", bdd.count_nodes(&[f_bad]));

    // Sifting pulls the pairs back together.
    let stats = bdd.sift_all()?;
    println!(
        "after sifting: {} nodes ({:.1}% reduction, {} swaps)",
        stats.final_size,
        stats.reduction_percent(),
        stats.swaps
    );
    println!(
        "final order: {:?}",
        (0..bdd.num_levels()).map(|l| bdd.var_at_level(l)).collect::<Vec<_>>()
    );

    Ok(())
}
