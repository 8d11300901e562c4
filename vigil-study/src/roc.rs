//! ROC curve over a ranking with `.apt` ground truth.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::info;

use vigil_engine::Ranking;

/// ROC points over `ranking` (descending index order). Starts at
/// `(0, 0)` and advances one point per index bucket: every domain
/// sharing an index updates the counters, then one point is emitted.
///
/// `x` is the fraction of non-APT domains seen so far out of
/// `n_dom_tot - n_apt_tot`; `y` is the fraction of APT domains seen out
/// of `n_apt_tot`.
pub fn compute_roc(ranking: &Ranking, n_dom_tot: usize, n_apt_tot: usize) -> Vec<[f64; 2]> {
    let negatives = (n_dom_tot - n_apt_tot) as f64;
    let positives = n_apt_tot as f64;

    let mut n_dom = 0.0;
    let mut n_apt = 0.0;
    let mut curve = vec![[0.0, 0.0]];
    for bucket in ranking {
        for name in &bucket.domains {
            if name.ends_with(".apt") {
                n_apt += 1.0;
            } else {
                n_dom += 1.0;
            }
        }
        curve.push([n_dom / negatives, n_apt / positives]);
    }
    curve
}

/// Serialize as CSV lines `x,y` in UTF-8, no header.
pub fn export_roc<W: Write>(curve: &[[f64; 2]], out: &mut W) -> io::Result<()> {
    for point in curve {
        writeln!(out, "{},{}", point[0], point[1])?;
    }
    Ok(())
}

/// Compute and export in one step.
pub fn make_roc(
    ranking: &Ranking,
    n_dom_tot: usize,
    n_apt_tot: usize,
    output_file: &Path,
) -> io::Result<()> {
    let curve = compute_roc(ranking, n_dom_tot, n_apt_tot);
    info!(points = curve.len(), "ROC curve created");
    let mut out = BufWriter::new(File::create(output_file)?);
    export_roc(&curve, &mut out)?;
    out.flush()?;
    info!(path = %output_file.display(), "ROC curve exported");
    Ok(())
}
