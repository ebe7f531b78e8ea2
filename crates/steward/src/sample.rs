use oplog::Frame;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;

/// Draw `n` rows of `frame` uniformly without replacement.
///
/// Sampled rows keep their ids and their original order. A seed makes the
/// draw reproducible; without one the generator is seeded from entropy. When
/// `n` covers the whole frame the frame is returned as is.
#[must_use]
pub fn sample_rows(frame: &Frame, n: usize, seed: Option<u64>) -> Frame {
    let total = frame.row_count();
    if n >= total {
        return frame.clone();
    }
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut picked = index::sample(&mut rng, total, n).into_vec();
    picked.sort_unstable();
    frame.take(&picked)
}
