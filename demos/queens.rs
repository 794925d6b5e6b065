//! N-queens via BDDs: build the constraint diagram and count placements.

use clap::Parser;

use robdd::bdd::{Bdd, BddConfig};
use robdd::reference::Ref;

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Number of queens.
    #[arg(value_name = "INT", default_value = "8")]
    n: usize,

    /// Initial unique table size (in bits, so `2^size` slots).
    #[clap(long, value_name = "INT", default_value = "20")]
    size: usize,

    /// Run an explicit garbage collection after the build.
    #[clap(long)]
    gc: bool,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    let args = Cli::parse();
    println!("args = {:?}", args);

    let n = args.n;
    let bdd = Bdd::new(BddConfig {
        num_vars: (n * n) as u32,
        storage_bits: args.size,
        max_storage_bits: (args.size + 6).min(31),
        ..BddConfig::default()
    });
    println!("bdd = {:?}", bdd);

    // Variable for "queen on row r, column c" (1-indexed).
    let var = |r: usize, c: usize| (r * n + c + 1) as i32;

    let mut f = bdd.reference(bdd.one);

    // At least one queen per row.
    for r in 0..n {
        let row = bdd.clause((0..n).map(|c| var(r, c)))?;
        let next = bdd.reference(bdd.apply_and(f, row)?);
        bdd.release(f)?;
        f = next;
    }

    // No two queens attack each other.
    for r in 0..n {
        for c in 0..n {
            // Clauses are referenced while the batch accumulates: building
            // one clause may collect unreferenced earlier ones.
            let mut conflicts: Vec<Ref> = Vec::new();
            for r2 in 0..n {
                for c2 in 0..n {
                    if (r2, c2) == (r, c) {
                        continue;
                    }
                    let same_col = c2 == c;
                    let same_row = r2 == r;
                    let same_diag = r2.abs_diff(r) == c2.abs_diff(c);
                    if same_col || same_row || same_diag {
                        conflicts.push(bdd.reference(bdd.clause([-var(r, c), -var(r2, c2)])?));
                    }
                }
            }
            let all = bdd.apply_and_many(conflicts.iter().copied())?;
            let next = bdd.reference(bdd.apply_and(f, all)?);
            bdd.release(f)?;
            for clause in conflicts {
                bdd.release(clause)?;
            }
            f = next;
        }
    }

    println!("constraints built: {} nodes, {:?}", bdd.size(f), bdd);

    if args.gc {
        let freed = bdd.collect_garbage();
        println!("gc freed {} nodes", freed);
    }

    let solutions = bdd.sat_count(f, n * n);
    println!("{}-queens has {} solutions", n, solutions);
    println!("total time: {:.3}s", time_total.elapsed().as_secs_f64());

    Ok(())
}
