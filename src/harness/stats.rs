use crate::error::{configuration_error, Result};

/// Mean of the middle 40% of a set of sample times.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimmedMean {
    /// Average of `kept`.
    pub mean: f64,
    /// The samples that were averaged, ascending.
    pub kept: Vec<f64>,
}

/// Sorts `samples` ascending and averages the `samples / 5 * 2` values
/// centred on the median position.
///
/// With 25 samples that is the 10 values at sorted positions `7..17`.
///
/// # Errors
///
/// `ConfigurationError` when fewer than 5 samples leave nothing to average.
pub fn trimmed_mean(samples: &[f64]) -> Result<TrimmedMean> {
    let count = samples.len();
    let take = count / 5 * 2;
    if take == 0 {
        return Err(configuration_error(format!(
            "cannot trim {count} samples: at least 5 are needed"
        )));
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);

    let start = count / 2 - take / 2;
    let end = count / 2 + take / 2;
    let kept = sorted[start..end].to_vec();
    let mean = kept.iter().sum::<f64>() / take as f64;

    Ok(TrimmedMean { mean, kept })
}
