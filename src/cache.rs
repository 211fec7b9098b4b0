//! JSON persistence of computed transition tables.
//!
//! Rank computation dominates the cost of an analysis run, so the table is
//! written next to the matrix file and reloaded on reruns. A cache that
//! fails to load or validate is never fatal: the caller logs a warning and
//! recomputes.

use std::fs;
use std::path::Path;

use num_bigint::BigInt;
use num_rational::BigRational;
use serde::{Deserialize, Serialize};

use crate::gf2::Gf2Matrix;
use crate::transitions::TransitionTable;
use crate::AnalysisError;

/// One nonzero transition, probability stored as decimal strings so the
/// exact big-integer values survive the round-trip.
#[derive(Serialize, Deserialize)]
struct CachedEntry {
    input: usize,
    output: usize,
    numer: String,
    denom: String,
}

#[derive(Serialize, Deserialize)]
struct CachedTable {
    branches: usize,
    branch_size: usize,
    entries: Vec<CachedEntry>,
}

/// Write `table` to `path` as JSON.
pub fn save(table: &TransitionTable, path: &Path) -> Result<(), AnalysisError> {
    let entries = table
        .entries()
        .map(|(input, output, prob)| CachedEntry {
            input,
            output,
            numer: prob.numer().to_string(),
            denom: prob.denom().to_string(),
        })
        .collect();
    let doc = CachedTable {
        branches: table.branches(),
        branch_size: table.branch_size(),
        entries,
    };
    let json = serde_json::to_string(&doc)
        .map_err(|e| AnalysisError::InvalidTable(e.to_string()))?;
    fs::write(path, json)?;
    Ok(())
}

/// Load a table from `path`, expecting the given shape. Any failure (missing
/// file, parse error, shape mismatch, rows failing validation) returns
/// `None` after logging, so the caller can recompute.
pub fn load(path: &Path, branches: usize, branch_size: usize) -> Option<TransitionTable> {
    let text = fs::read_to_string(path).ok()?;
    let doc: CachedTable = match serde_json::from_str(&text) {
        Ok(doc) => doc,
        Err(e) => {
            log::warn!("failed to parse cached table {}: {}", path.display(), e);
            return None;
        }
    };
    if doc.branches != branches || doc.branch_size != branch_size {
        log::warn!(
            "cached table {} has shape {} x {} bits, expected {} x {} bits",
            path.display(),
            doc.branches,
            doc.branch_size,
            branches,
            branch_size
        );
        return None;
    }

    let size = 1usize << branches;
    let mut rows: Vec<Vec<(usize, BigRational)>> = vec![Vec::new(); size];
    for entry in doc.entries {
        if entry.input >= size {
            log::warn!(
                "cached table {} has input index {} out of range",
                path.display(),
                entry.input
            );
            return None;
        }
        let numer: BigInt = match entry.numer.parse() {
            Ok(n) => n,
            Err(e) => {
                log::warn!("bad numerator in {}: {}", path.display(), e);
                return None;
            }
        };
        let denom: BigInt = match entry.denom.parse::<BigInt>() {
            Ok(d) if !num_traits::Zero::is_zero(&d) => d,
            _ => {
                log::warn!("bad denominator in {}", path.display());
                return None;
            }
        };
        rows[entry.input].push((entry.output, BigRational::new(numer, denom)));
    }

    match TransitionTable::from_rows(branches, branch_size, rows) {
        Ok(table) => Some(table),
        Err(e) => {
            log::warn!("cached table {} failed validation: {}", path.display(), e);
            None
        }
    }
}

/// Load the table from `path` if possible, otherwise compute it from `mat`
/// and write it back. Passing `None` disables the cache entirely.
pub fn load_or_compute(
    mat: &Gf2Matrix,
    branch_size: usize,
    path: Option<&Path>,
) -> Result<TransitionTable, AnalysisError> {
    if let Some(path) = path {
        if branch_size > 0 && mat.nrows() % branch_size == 0 {
            if let Some(table) = load(path, mat.nrows() / branch_size, branch_size) {
                log::info!("loaded transition table from {}", path.display());
                return Ok(table);
            }
        }
    }
    let table = TransitionTable::compute(mat, branch_size)?;
    if let Some(path) = path {
        match save(&table, path) {
            Ok(()) => log::info!("wrote transition table to {}", path.display()),
            Err(e) => log::warn!("failed to write transition cache {}: {}", path.display(), e),
        }
    }
    Ok(table)
}
