//! Magnitude-frequency distributions, giving the annual occurrence rate of earthquakes by
//! magnitude.
use anyhow::{Result, ensure};
use serde::Deserialize;

/// Tolerance used when rounding magnitudes to bin boundaries
const DELTA: f64 = 1e-7;

/// A magnitude-frequency distribution
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mfd {
    /// A Gutenberg-Richter distribution truncated at both ends, discretised in bins
    TruncatedGr {
        /// The `a` value (log10 of the annual number of events above magnitude zero)
        a_val: f64,
        /// The `b` value (slope of the distribution)
        b_val: f64,
        /// Lower magnitude bound
        min_mag: f64,
        /// Upper magnitude bound
        max_mag: f64,
        /// Width of the magnitude bins
        bin_width: f64,
    },
    /// An explicit list of magnitudes with their annual occurrence rates
    Arbitrary {
        /// Magnitudes
        magnitudes: Vec<f64>,
        /// Annual occurrence rates, one per magnitude
        occurrence_rates: Vec<f64>,
    },
}

impl Mfd {
    /// Check that the distribution is well formed
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::TruncatedGr {
                b_val,
                min_mag,
                max_mag,
                bin_width,
                ..
            } => {
                ensure!(*bin_width > 0.0, "bin_width must be positive");
                ensure!(*b_val > 0.0, "b_val must be positive");
                ensure!(min_mag < max_mag, "min_mag must be smaller than max_mag");
            }
            Self::Arbitrary {
                magnitudes,
                occurrence_rates,
            } => {
                ensure!(!magnitudes.is_empty(), "No magnitudes given");
                ensure!(
                    magnitudes.len() == occurrence_rates.len(),
                    "magnitudes and occurrence_rates must have the same length"
                );
                ensure!(
                    occurrence_rates.iter().all(|rate| *rate >= 0.0),
                    "Occurrence rates cannot be negative"
                );
            }
        }

        Ok(())
    }

    /// The centre of the first bin and the number of bins of a truncated GR distribution
    fn min_mag_and_num_bins(min_mag: f64, max_mag: f64, bin_width: f64) -> (f64, usize) {
        let mut lo = (min_mag / bin_width).round() * bin_width;
        let mut hi = ((max_mag - DELTA) / bin_width).round() * bin_width;
        if (lo - hi).abs() > DELTA {
            lo += bin_width / 2.0;
            hi -= bin_width / 2.0;
        }
        let num_bins = ((hi - lo) / bin_width).round() as usize + 1;

        (lo, num_bins)
    }

    /// The (magnitude, annual rate) pairs of the distribution
    pub fn annual_occurrence_rates(&self) -> Vec<(f64, f64)> {
        match self {
            Self::TruncatedGr {
                a_val,
                b_val,
                min_mag,
                max_mag,
                bin_width,
            } => {
                let (lo, num_bins) = Self::min_mag_and_num_bins(*min_mag, *max_mag, *bin_width);
                (0..num_bins)
                    .map(|i| {
                        let mag = lo + i as f64 * bin_width;
                        let rate_lo = 10f64.powf(a_val - b_val * (mag - bin_width / 2.0));
                        let rate_hi = 10f64.powf(a_val - b_val * (mag + bin_width / 2.0));
                        (mag, rate_lo - rate_hi)
                    })
                    .collect()
            }
            Self::Arbitrary {
                magnitudes,
                occurrence_rates,
            } => magnitudes
                .iter()
                .copied()
                .zip(occurrence_rates.iter().copied())
                .collect(),
        }
    }

    /// The smallest and largest magnitudes of the distribution
    pub fn min_max_mag(&self) -> (f64, f64) {
        match self {
            Self::TruncatedGr {
                min_mag,
                max_mag,
                bin_width,
                ..
            } => {
                let (lo, num_bins) = Self::min_mag_and_num_bins(*min_mag, *max_mag, *bin_width);
                (lo, lo + bin_width * (num_bins - 1) as f64)
            }
            Self::Arbitrary { magnitudes, .. } => (
                magnitudes.iter().copied().fold(f64::INFINITY, f64::min),
                magnitudes.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            ),
        }
    }

    /// A copy of this distribution with all rates multiplied by `factor`
    pub fn scaled(&self, factor: f64) -> Mfd {
        match self {
            Self::TruncatedGr {
                a_val,
                b_val,
                min_mag,
                max_mag,
                bin_width,
            } => Self::TruncatedGr {
                a_val: a_val + factor.log10(),
                b_val: *b_val,
                min_mag: *min_mag,
                max_mag: *max_mag,
                bin_width: *bin_width,
            },
            Self::Arbitrary {
                magnitudes,
                occurrence_rates,
            } => Self::Arbitrary {
                magnitudes: magnitudes.clone(),
                occurrence_rates: occurrence_rates.iter().map(|rate| rate * factor).collect(),
            },
        }
    }

    /// A distribution with a single magnitude bin
    pub fn single(mag: f64, rate: f64) -> Mfd {
        Self::Arbitrary {
            magnitudes: vec![mag],
            occurrence_rates: vec![rate],
        }
    }
}
