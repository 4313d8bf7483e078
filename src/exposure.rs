//! Assets exposed to ground shaking, and their grouping into aggregation buckets.
use crate::id::{check_unique_ids, define_id_getter, define_id_type};
use anyhow::{Result, ensure};
use indexmap::IndexMap;
use itertools::Itertools;
use log::{error, warn};

define_id_type! {AssetID}
define_id_type! {TaxonomyID}

/// An asset exposed to ground shaking
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    /// Position of the asset in the exposure
    pub ordinal: u32,
    /// Unique identifier
    pub id: AssetID,
    /// Building class, used to select fragility functions
    pub taxonomy: TaxonomyID,
    /// The site where the asset is located
    pub site_id: u32,
    /// Number of exposed units (e.g. buildings)
    pub number: f64,
    /// Aggregation key, if the asset belongs to a named group
    pub agg_key: Option<String>,
}
define_id_getter! {Asset, AssetID}

/// The assets of a calculation
#[derive(Debug, Clone, PartialEq)]
pub struct Exposure {
    assets: Vec<Asset>,
    /// Aggregation bucket of each asset, by ordinal
    kids: Vec<u16>,
    agg_keys: Vec<String>,
}

impl Exposure {
    /// Create a new [`Exposure`].
    ///
    /// Asset ordinals are assigned in order. If `aggregate_by` is true, assets are grouped in one
    /// bucket per distinct aggregation key (in order of first appearance), and assets without a
    /// key go into an extra bucket called `"?"`.
    pub fn new(mut assets: Vec<Asset>, aggregate_by: bool) -> Result<Self> {
        ensure!(!assets.is_empty(), "The exposure has no assets");
        check_unique_ids::<AssetID, _, _>(&assets)?;
        for (ordinal, asset) in assets.iter_mut().enumerate() {
            asset.ordinal = ordinal as u32;
            ensure!(
                asset.number.is_finite() && asset.number >= 0.0,
                "Invalid number {} for asset {}",
                asset.number,
                asset.id
            );
        }

        let (kids, agg_keys) = if aggregate_by {
            let mut keys: IndexMap<&str, u16> = IndexMap::new();
            let mut kids = Vec::with_capacity(assets.len());
            for asset in &assets {
                let key = asset.agg_key.as_deref().unwrap_or("?");
                let next = keys.len();
                ensure!(
                    next < usize::from(u16::MAX),
                    "Too many aggregation keys"
                );
                kids.push(*keys.entry(key).or_insert(next as u16));
            }
            let agg_keys = keys.keys().map(|key| (*key).to_string()).collect();
            (kids, agg_keys)
        } else {
            (vec![0; assets.len()], Vec::new())
        };

        Ok(Self {
            assets,
            kids,
            agg_keys,
        })
    }

    /// The assets, in ordinal order
    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    /// The number of aggregation buckets `K`, which is also the ID of the total bucket
    pub fn num_buckets(&self) -> u16 {
        self.agg_keys.len() as u16
    }

    /// The names of the aggregation buckets, followed by `"total"`
    pub fn bucket_names(&self) -> Vec<String> {
        self.agg_keys
            .iter()
            .cloned()
            .chain(std::iter::once("total".to_string()))
            .collect()
    }

    /// The aggregation bucket of an asset
    pub fn kid(&self, asset: &Asset) -> u16 {
        self.kids[asset.ordinal as usize]
    }

    /// The distinct taxonomies, sorted
    pub fn taxonomies(&self) -> Vec<TaxonomyID> {
        self.assets
            .iter()
            .map(|asset| asset.taxonomy.clone())
            .sorted()
            .dedup()
            .collect()
    }

    /// The assets grouped by taxonomy, with taxonomies sorted
    pub fn by_taxonomy(&self) -> IndexMap<TaxonomyID, Vec<&Asset>> {
        let mut groups: IndexMap<TaxonomyID, Vec<&Asset>> = IndexMap::new();
        for asset in &self.assets {
            groups.entry(asset.taxonomy.clone()).or_default().push(asset);
        }
        groups.sort_keys();

        groups
    }

    /// The number of units of each asset
    pub fn numbers(&self) -> Vec<f64> {
        self.assets.iter().map(|asset| asset.number).collect()
    }

    /// Log an error for every asset with more units than `u32::MAX`, without failing
    pub fn check_numbers(&self) {
        for asset in &self.assets {
            if asset.number > f64::from(u32::MAX) {
                error!(
                    "The asset {} has number={} > {}",
                    asset.id,
                    asset.number,
                    u32::MAX
                );
            }
        }
    }
}

/// Whether any of the numbers is not an integer.
///
/// A warning is logged if so, since damage distributions can then only be computed as floats.
pub fn floats_in(numbers: &[f64]) -> bool {
    let num_floats = numbers.iter().filter(|x| x.fract() != 0.0).count();
    if num_floats > 0 {
        warn!("The exposure contains {num_floats} non-integer asset numbers");
    }

    num_floats > 0
}
