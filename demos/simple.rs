use robdd::bdd::Bdd;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Debug,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let bdd = Bdd::default();
    println!("bdd = {:?}", bdd);

    println!("zero = {}", bdd.zero);
    println!("one = {}", bdd.one);

    let x1 = bdd.mk_var(1)?;
    println!("x1 = {}", x1);
    let x2 = bdd.mk_var(2)?;
    println!("x2 = {}", x2);
    let x3 = bdd.mk_var(3)?;
    println!("x3 = {}", x3);

    // f = (x1 ∧ x2) ∨ ¬x3
    let f = bdd.reference(bdd.apply_or(bdd.apply_and(x1, x2)?, -x3)?);
    println!("f = {}", bdd.to_bracket_string(f));
    println!("size(f) = {}", bdd.size(f));
    println!("support(f) = {:?}", bdd.support(f));
    println!("sat_count(f, 3) = {}", bdd.sat_count(f, 3));
    println!("one_sat(f) = {:?}", bdd.one_sat(f));

    // ∃x2. f
    let g = bdd.reference(bdd.exists(f, &[2])?);
    println!("exists(f, x2) = {}", bdd.to_bracket_string(g));

    bdd.release(f)?;
    bdd.release(g)?;
    let freed = bdd.collect_garbage();
    println!("garbage collection freed {} nodes", freed);
    println!("bdd = {:?}", bdd);

    Ok(())
}
