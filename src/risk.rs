//! Risk models: from ground motion to damage-state distributions.
use crate::exposure::{Asset, TaxonomyID};
use crate::gmf::GmfData;
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use itertools::Itertools;
use serde::Deserialize;
use std::sync::Arc;

pub mod rng;
pub use rng::MultiEventRng;

/// The name of the implicit first damage state
pub const NO_DAMAGE: &str = "no_damage";

/// Values by asset, event and damage state
#[derive(Debug, Clone, PartialEq)]
pub struct DamageArray {
    num_assets: usize,
    num_events: usize,
    num_states: usize,
    values: Vec<f64>,
}

impl DamageArray {
    /// An array of zeros
    pub fn zeros(num_assets: usize, num_events: usize, num_states: usize) -> Self {
        Self {
            num_assets,
            num_events,
            num_states,
            values: vec![0.0; num_assets * num_events * num_states],
        }
    }

    /// The shape of the array as (assets, events, damage states)
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.num_assets, self.num_events, self.num_states)
    }

    fn offset(&self, asset: usize, event: usize) -> usize {
        (asset * self.num_events + event) * self.num_states
    }

    /// The distribution for one asset and event
    pub fn get(&self, asset: usize, event: usize) -> &[f64] {
        let start = self.offset(asset, event);
        &self.values[start..start + self.num_states]
    }

    /// The distribution for one asset and event, mutably
    pub fn get_mut(&mut self, asset: usize, event: usize) -> &mut [f64] {
        let start = self.offset(asset, event);
        &mut self.values[start..start + self.num_states]
    }

    /// Multiply the distributions of each asset by its number of units
    pub fn scale_by(&mut self, numbers: &[f64]) {
        for (asset, number) in numbers.iter().enumerate() {
            for event in 0..self.num_events {
                for value in self.get_mut(asset, event) {
                    *value *= number;
                }
            }
        }
    }
}

/// The output of a risk model for a group of assets
#[derive(Debug, Clone, PartialEq)]
pub struct RiskOutput {
    /// The events of the ground-motion subset, sorted
    pub eids: Vec<u32>,
    /// One array per loss type, in the order of [`RiskModel::loss_types`]
    pub arrays: Vec<DamageArray>,
}

/// Computes damage-state distributions from ground motion
pub trait RiskModel: Send + Sync {
    /// The loss types of the model
    fn loss_types(&self) -> &[String];

    /// The damage states of the model, starting with [`NO_DAMAGE`]
    fn damage_states(&self) -> &[String];

    /// Damage-state fractions for assets of one taxonomy, for every event of `gmf`.
    ///
    /// The fractions of each asset and event sum to one.
    fn get_output(&self, taxonomy: &TaxonomyID, assets: &[&Asset], gmf: &GmfData)
    -> Result<RiskOutput>;
}

/// A risk model shared between tasks
pub type SharedRiskModel = Arc<dyn RiskModel>;

/// A discrete fragility function: exceedance probabilities of each limit state at given intensity
/// levels
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FragilityFunction {
    /// The taxonomy the function applies to
    pub taxonomy: TaxonomyID,
    /// The loss type the function applies to
    pub loss_type: String,
    /// The intensity measure type
    pub imt: String,
    /// Intensity measure levels, strictly increasing
    pub imls: Vec<f64>,
    /// Probabilities of exceedance for each limit state, one value per level
    pub poes: Vec<Vec<f64>>,
}

/// Linear interpolation of `ys` at `x`, zero below `xs[0]` (or for NaN) and clamped above the
/// last level
fn interpolate_poe(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    let i = xs.partition_point(|level| *level <= x);
    if i == 0 {
        return 0.0;
    }
    if i == xs.len() {
        return ys[ys.len() - 1];
    }

    let (x0, x1) = (xs[i - 1], xs[i]);
    let (y0, y1) = (ys[i - 1], ys[i]);
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}

impl FragilityFunction {
    fn validate(&self, num_limit_states: usize) -> Result<()> {
        ensure!(!self.imls.is_empty(), "No intensity levels");
        ensure!(
            self.imls.iter().all(|x| x.is_finite() && *x >= 0.0),
            "Intensity levels must be finite and non-negative"
        );
        ensure!(
            self.imls.iter().tuple_windows().all(|(a, b)| a < b),
            "Intensity levels must be strictly increasing"
        );
        ensure!(
            self.poes.len() == num_limit_states,
            "Expected {num_limit_states} limit states, found {}",
            self.poes.len()
        );
        for poes in &self.poes {
            ensure!(
                poes.len() == self.imls.len(),
                "Expected {} probabilities per limit state, found {}",
                self.imls.len(),
                poes.len()
            );
            ensure!(
                poes.iter().all(|p| (0.0..=1.0).contains(p)),
                "Probabilities must be between 0 and 1"
            );
        }
        for (level, iml) in self.imls.iter().enumerate() {
            ensure!(
                self.poes
                    .iter()
                    .tuple_windows()
                    .all(|(a, b)| a[level] >= b[level]),
                "Limit state curves cross at intensity level {iml}"
            );
        }

        Ok(())
    }

    /// The damage-state fractions at the given intensity, including no damage
    pub fn fractions(&self, iml: f64) -> Vec<f64> {
        let poes = self
            .poes
            .iter()
            .map(|poes| interpolate_poe(&self.imls, poes, iml))
            .collect_vec();

        let mut fractions = Vec::with_capacity(poes.len() + 1);
        fractions.push(1.0 - poes.first().copied().unwrap_or(0.0));
        for (a, b) in poes.iter().tuple_windows() {
            fractions.push(a - b);
        }
        if let Some(last) = poes.last() {
            fractions.push(*last);
        }
        // Rounding
        for fraction in &mut fractions {
            *fraction = fraction.max(0.0);
        }

        fractions
    }
}

#[derive(Deserialize)]
struct RawFragilityModel {
    loss_types: Vec<String>,
    limit_states: Vec<String>,
    functions: Vec<FragilityFunction>,
}

/// A risk model made of fragility functions, one per taxonomy and loss type
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawFragilityModel")]
pub struct FragilityModel {
    loss_types: Vec<String>,
    damage_states: Vec<String>,
    functions: IndexMap<(TaxonomyID, String), FragilityFunction>,
}

impl TryFrom<RawFragilityModel> for FragilityModel {
    type Error = anyhow::Error;

    fn try_from(raw: RawFragilityModel) -> Result<Self> {
        Self::new(raw.loss_types, raw.limit_states, raw.functions)
    }
}

impl FragilityModel {
    /// Create a new [`FragilityModel`] from its limit states and functions
    pub fn new(
        loss_types: Vec<String>,
        limit_states: Vec<String>,
        functions: Vec<FragilityFunction>,
    ) -> Result<Self> {
        ensure!(!loss_types.is_empty(), "No loss types given");
        ensure!(
            loss_types.len() <= usize::from(u8::MAX),
            "Too many loss types"
        );
        ensure!(loss_types.iter().all_unique(), "Duplicate loss types");
        ensure!(!limit_states.is_empty(), "No limit states given");
        ensure!(
            limit_states.iter().all_unique() && !limit_states.iter().any(|ls| ls == NO_DAMAGE),
            "Limit states must be unique and different from {NO_DAMAGE}"
        );

        let mut map = IndexMap::new();
        for function in functions {
            let key = (function.taxonomy.clone(), function.loss_type.clone());
            function.validate(limit_states.len()).with_context(|| {
                format!(
                    "Invalid fragility function for taxonomy {} and loss type {}",
                    key.0, key.1
                )
            })?;
            ensure!(
                loss_types.contains(&key.1),
                "Unknown loss type {} for taxonomy {}",
                key.1,
                key.0
            );
            ensure!(
                map.insert(key.clone(), function).is_none(),
                "Duplicate fragility function for taxonomy {} and loss type {}",
                key.0,
                key.1
            );
        }

        let damage_states = std::iter::once(NO_DAMAGE.to_string())
            .chain(limit_states)
            .collect();

        Ok(Self {
            loss_types,
            damage_states,
            functions: map,
        })
    }

    fn function(&self, taxonomy: &TaxonomyID, loss_type: &str) -> Result<&FragilityFunction> {
        self.functions
            .get(&(taxonomy.clone(), loss_type.to_string()))
            .with_context(|| {
                format!("No fragility function for taxonomy {taxonomy} and loss type {loss_type}")
            })
    }

    /// Check that there is a function for every loss type of each of the given taxonomies
    pub fn check_taxonomies(&self, taxonomies: &[TaxonomyID]) -> Result<()> {
        for taxonomy in taxonomies {
            for loss_type in &self.loss_types {
                self.function(taxonomy, loss_type)?;
            }
        }

        Ok(())
    }
}

impl RiskModel for FragilityModel {
    fn loss_types(&self) -> &[String] {
        &self.loss_types
    }

    fn damage_states(&self) -> &[String] {
        &self.damage_states
    }

    fn get_output(
        &self,
        taxonomy: &TaxonomyID,
        assets: &[&Asset],
        gmf: &GmfData,
    ) -> Result<RiskOutput> {
        let eids = gmf.eids();
        let index = gmf.index();
        let num_states = self.damage_states.len();

        let mut arrays = Vec::with_capacity(self.loss_types.len());
        for loss_type in &self.loss_types {
            let function = self.function(taxonomy, loss_type)?;
            let gmvs = gmf
                .gmv
                .get(&function.imt)
                .with_context(|| format!("No ground motion values for {}", function.imt))?;

            let mut array = DamageArray::zeros(assets.len(), eids.len(), num_states);
            for (a, asset) in assets.iter().enumerate() {
                for (e, eid) in eids.iter().enumerate() {
                    let out = array.get_mut(a, e);
                    match index.get(&(asset.site_id, *eid)) {
                        Some(row) => out.copy_from_slice(&function.fractions(f64::from(gmvs[*row]))),
                        None => out[0] = 1.0,
                    }
                }
            }
            arrays.push(array);
        }

        Ok(RiskOutput { eids, arrays })
    }
}
