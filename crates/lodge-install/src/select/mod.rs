//! Picking the main executable out of an extracted application tree.

mod candidates;
mod score;
mod variants;

use std::path::{Path, PathBuf};

use tracing::debug;

pub use candidates::find_candidates;
pub use score::{ExecutableCandidate, score_executable};
pub use variants::name_variants;

/// Highest-scoring candidate. Ties keep the earlier one; a single candidate
/// is returned without being scored.
pub fn choose_best(candidates: &[PathBuf], base_name: &str, install_root: &Path) -> Option<PathBuf> {
    let variants = name_variants(base_name);
    pick_max(candidates, |path| {
        let candidate = ExecutableCandidate::new(path, install_root);
        let score = score::score_candidate(&candidate, &variants);
        debug!(path = %candidate.relative().display(), score, "scored candidate");
        score
    })
}

fn pick_max<F>(candidates: &[PathBuf], mut score: F) -> Option<PathBuf>
where
    F: FnMut(&Path) -> i32,
{
    match candidates {
        [] => None,
        [only] => Some(only.clone()),
        [first, rest @ ..] => {
            let mut best = (first, score(first.as_path()));
            for path in rest {
                let s = score(path.as_path());
                if s > best.1 {
                    best = (path, s);
                }
            }
            Some(best.0.clone())
        }
    }
}
