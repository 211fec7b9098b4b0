use std::path::PathBuf;
use std::time::Instant;

use num_rational::BigRational;
use num_traits::Zero;

use truncated_trails::{
    cache, log2_frac, AnalysisError, Gf2Matrix, HullSearch, TrailFinding, TrailSearch,
    TransitionTable,
};

/// Run configuration, parsed from the command line.
struct CliConfig {
    /// Path to the matrix file (whitespace-delimited rows of 0/1 bits).
    matrix_path: String,
    /// Invert the matrix over GF(2) before analysis.
    inverse: bool,
    /// Branch width M in bits.
    branch_size: usize,
    /// Kronecker replication factor applied to the base matrix.
    expand: usize,
    /// Cap on trail-search rounds; None runs to the fixed point.
    max_rounds: Option<usize>,
    /// Number of hull rounds to report.
    hull_rounds: usize,
    /// Significance threshold in the exponent, matching the reporting cut
    /// `log2(prob) >= -M * (inactive branches of the final mask) + epsilon`.
    epsilon: f64,
    /// Reuse / write the `.transitions.json` sidecar file.
    use_cache: bool,
}

fn usage() -> ! {
    eprintln!("usage: truncated-trails [INV:]MATRIX_FILE [options]");
    eprintln!();
    eprintln!("  MATRIX_FILE          whitespace-delimited rows of 0/1 bits");
    eprintln!("  INV: prefix          analyze the inverse of the matrix");
    eprintln!("  --inverse            same as the INV: prefix");
    eprintln!("  --branch-size=M      bits per branch (default 64)");
    eprintln!("  --expand=K           Kronecker-expand to K parallel copies (default 1)");
    eprintln!("  --max-rounds=N       stop the trail search after N rounds");
    eprintln!("  --hull-rounds=N      hull rounds to report (default 5)");
    eprintln!("  --epsilon=E          significance threshold exponent (default 0.01)");
    eprintln!("  --no-cache           do not read or write the transitions cache");
    std::process::exit(2);
}

fn parse_args() -> CliConfig {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut matrix_path = match args.iter().find(|a| !a.starts_with("--")) {
        Some(path) => path.clone(),
        None => usage(),
    };
    let mut inverse = args.iter().any(|a| a == "--inverse");
    if let Some(stripped) = matrix_path.strip_prefix("INV:") {
        inverse = true;
        matrix_path = stripped.to_string();
    }

    let branch_size = args
        .iter()
        .find(|a| a.starts_with("--branch-size="))
        .and_then(|a| a.strip_prefix("--branch-size=")?.parse::<usize>().ok())
        .unwrap_or(64);

    let expand = args
        .iter()
        .find(|a| a.starts_with("--expand="))
        .and_then(|a| a.strip_prefix("--expand=")?.parse::<usize>().ok())
        .unwrap_or(1);

    let max_rounds = args
        .iter()
        .find(|a| a.starts_with("--max-rounds="))
        .and_then(|a| a.strip_prefix("--max-rounds=")?.parse::<usize>().ok());

    let hull_rounds = args
        .iter()
        .find(|a| a.starts_with("--hull-rounds="))
        .and_then(|a| a.strip_prefix("--hull-rounds=")?.parse::<usize>().ok())
        .unwrap_or(5);

    let epsilon = args
        .iter()
        .find(|a| a.starts_with("--epsilon="))
        .and_then(|a| a.strip_prefix("--epsilon=")?.parse::<f64>().ok())
        .unwrap_or(0.01);

    let use_cache = !args.iter().any(|a| a == "--no-cache");

    CliConfig {
        matrix_path,
        inverse,
        branch_size,
        expand,
        max_rounds,
        hull_rounds,
        epsilon,
        use_cache,
    }
}

/// Format a probability as a power of two, the way results are compared.
fn fmt_pow2(p: &BigRational) -> String {
    if p.is_zero() {
        "0".to_string()
    } else {
        format!("2^{:.3}", log2_frac(p))
    }
}

/// Reporting cut: a finding whose probability is essentially the trivial
/// `2^(-M * inactive)` bound carries no information.
fn significant(prob: &BigRational, final_inactive: usize, branch_size: usize, epsilon: f64) -> bool {
    log2_frac(prob) >= -((final_inactive * branch_size) as f64) + epsilon
}

fn print_finding(prob: &BigRational, generic: &BigRational, what: &str) {
    let diff = prob - generic;
    println!(
        "    {} : {} vs {} diff {}",
        what,
        fmt_pow2(prob),
        fmt_pow2(generic),
        fmt_pow2(&diff)
    );
}

fn run(cfg: &CliConfig) -> Result<(), AnalysisError> {
    let text = std::fs::read_to_string(&cfg.matrix_path)?;
    let mut matrix = Gf2Matrix::parse(&text)?;
    if cfg.expand > 1 {
        matrix = matrix.expand(cfg.expand)?;
    }
    if cfg.inverse {
        log::info!("inverting {} x {} matrix over GF(2)", matrix.nrows(), matrix.ncols());
        matrix = matrix.inverse()?;
    }

    println!(
        "=== Truncated analysis: {} x {} matrix{} ===",
        matrix.nrows(),
        matrix.ncols(),
        if cfg.inverse { " (inverse)" } else { "" }
    );

    let cache_path: Option<PathBuf> = if cfg.use_cache {
        Some(PathBuf::from(format!(
            "{}{}.transitions.json",
            cfg.matrix_path,
            if cfg.inverse { ".inverse" } else { "" }
        )))
    } else {
        None
    };

    let start = Instant::now();
    let table = cache::load_or_compute(&matrix, cfg.branch_size, cache_path.as_deref())?;
    println!(
        "transition table: T = {}, M = {}, {} nonzero entries ({:.3}s)",
        table.branches(),
        table.branch_size(),
        table.entries().count(),
        start.elapsed().as_secs_f64()
    );

    report_trails(&table, cfg);
    report_hulls(&table, cfg);

    println!("\n=== Done ===");
    Ok(())
}

fn report_trails(table: &TransitionTable, cfg: &CliConfig) {
    println!("\n=== 1. Best truncated trails (epsilon = {}) ===", cfg.epsilon);

    let search = TrailSearch::new(table);
    let rounds: Box<dyn Iterator<Item = Vec<TrailFinding>>> = match cfg.max_rounds {
        Some(n) => Box::new(search.take(n)),
        None => Box::new(search),
    };

    for batch in rounds {
        let round = match batch.first() {
            Some(f) => f.rounds,
            None => continue,
        };
        println!("{} rounds:", round);
        for finding in &batch {
            let last = finding.trail.last().expect("trail is never empty");
            let inactive = last.branches() - last.weight();
            if !significant(&finding.prob, inactive, table.branch_size(), cfg.epsilon) {
                continue;
            }
            let path: Vec<String> = finding.trail.iter().map(|m| m.to_string()).collect();
            print_finding(&finding.prob, &finding.generic, &path.join(" -> "));
        }
    }
    println!("============================");
}

fn report_hulls(table: &TransitionTable, cfg: &CliConfig) {
    println!("\n=== 2. Best truncated hulls (epsilon = {}) ===", cfg.epsilon);

    for (i, batch) in HullSearch::all_inputs(table).take(cfg.hull_rounds).enumerate() {
        println!("{} rounds:", i + 1);
        for finding in &batch {
            let inactive = finding.output.branches() - finding.output.weight();
            if !significant(&finding.prob, inactive, table.branch_size(), cfg.epsilon) {
                continue;
            }
            let pair = format!("({}, {})", finding.input, finding.output);
            print_finding(&finding.prob, &finding.generic, &pair);
        }
    }
    println!("============================");
}

fn main() {
    env_logger::init();
    let cfg = parse_args();
    if let Err(e) = run(&cfg) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
