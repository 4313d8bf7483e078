//! Deterministic random sampling of damage states.
use super::DamageArray;
use anyhow::{Result, ensure};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Binomial, Distribution};

/// Random number generators keyed by event.
///
/// Every (event, stream) pair has its own generator, so the samples do not depend on how events
/// are distributed among tasks. With asset correlation all assets of a taxonomy share a stream,
/// otherwise each asset has its own.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultiEventRng {
    master_seed: u64,
    asset_correlation: bool,
}

impl MultiEventRng {
    /// Create a new [`MultiEventRng`]. `asset_correlation` must be 0 or 1.
    pub fn new(master_seed: u64, asset_correlation: u8) -> Result<Self> {
        ensure!(
            asset_correlation <= 1,
            "asset_correlation must be 0 or 1, got {asset_correlation}"
        );

        Ok(Self {
            master_seed,
            asset_correlation: asset_correlation == 1,
        })
    }

    /// Whether assets of the same taxonomy share their random numbers
    pub fn is_correlated(&self) -> bool {
        self.asset_correlation
    }

    /// The stream used for an asset
    pub fn stream(&self, asset_ordinal: u32, taxonomy_index: usize) -> u64 {
        if self.asset_correlation {
            taxonomy_index as u64
        } else {
            u64::from(asset_ordinal)
        }
    }

    fn rng(&self, eid: u32, stream: u64) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::seed_from_u64(self.master_seed.wrapping_add(u64::from(eid)));
        rng.set_stream(stream);
        rng
    }

    /// Sample damage-state counts for each loss type, asset and event.
    ///
    /// `fractions` holds one array per loss type. For asset `a` and event `e`, `numbers[a]` units
    /// are distributed among the damage states of each loss type in turn, advancing the generator
    /// of `(eids[e], streams[a])`. A distribution with no positive weight puts every unit in the
    /// first state.
    pub fn discrete_dmg_dist(
        &self,
        eids: &[u32],
        fractions: &[DamageArray],
        numbers: &[u64],
        streams: &[u64],
    ) -> Result<Vec<DamageArray>> {
        let Some(first) = fractions.first() else {
            return Ok(Vec::new());
        };
        let (num_assets, num_events, num_states) = first.shape();
        ensure!(
            fractions.iter().all(|array| array.shape() == first.shape()),
            "The arrays of all loss types must have the same shape"
        );
        ensure!(
            numbers.len() == num_assets && streams.len() == num_assets,
            "Expected {num_assets} numbers and streams"
        );
        ensure!(eids.len() == num_events, "Expected {num_events} event IDs");

        let zeros = DamageArray::zeros(num_assets, num_events, num_states);
        let mut counts = vec![zeros; fractions.len()];
        for (a, (number, stream)) in numbers.iter().zip(streams).enumerate() {
            for (e, eid) in eids.iter().enumerate() {
                let mut rng = self.rng(*eid, *stream);
                for (array, out) in fractions.iter().zip(counts.iter_mut()) {
                    sample_multinomial(&mut rng, *number, array.get(a, e), out.get_mut(a, e))?;
                }
            }
        }

        Ok(counts)
    }
}

/// Distribute `number` units among the states according to `weights`, as a chain of binomial
/// draws conditional on the units left
fn sample_multinomial<R: Rng>(
    rng: &mut R,
    number: u64,
    weights: &[f64],
    out: &mut [f64],
) -> Result<()> {
    let mut remaining_weight: f64 = weights.iter().sum();
    if remaining_weight <= 0.0 || out.is_empty() {
        if let Some(first) = out.first_mut() {
            *first = number as f64;
        }
        return Ok(());
    }

    let last = out.len() - 1;
    let mut remaining = number;
    for (state, weight) in weights.iter().enumerate().take(last) {
        if remaining == 0 {
            break;
        }
        let p = if remaining_weight > 0.0 {
            (weight / remaining_weight).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let count = Binomial::new(remaining, p)?.sample(rng);
        out[state] = count as f64;
        remaining -= count;
        remaining_weight -= weight;
    }
    out[last] = remaining as f64;

    Ok(())
}
