//! Code for reading the exposure from a CSV file.
use super::{input_err_msg, read_csv};
use crate::exposure::{Asset, AssetID, Exposure, TaxonomyID};
use crate::site::SiteCollection;
use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use std::path::Path;

const EXPOSURE_FILE_NAME: &str = "exposure.csv";

/// An asset record retrieved from a CSV file
#[derive(PartialEq, Debug, Deserialize)]
struct AssetRaw {
    id: AssetID,
    taxonomy: TaxonomyID,
    site_id: u32,
    number: f64,
    agg_key: Option<String>,
}

/// Build the exposure from an iterator of raw asset records
fn read_exposure_from_iter<I>(iter: I, sites: &SiteCollection, aggregate_by: bool) -> Result<Exposure>
where
    I: IntoIterator<Item = AssetRaw>,
{
    let mut assets = Vec::new();
    for raw in iter {
        ensure!(
            sites.get(raw.site_id).is_some(),
            "Asset {} is located at unknown site {}",
            raw.id,
            raw.site_id
        );
        assets.push(Asset {
            ordinal: 0,
            id: raw.id,
            taxonomy: raw.taxonomy,
            site_id: raw.site_id,
            number: raw.number,
            agg_key: raw.agg_key.filter(|key| !key.is_empty()),
        });
    }

    Exposure::new(assets, aggregate_by)
}

/// Read the assets from `exposure.csv`.
///
/// # Arguments
///
/// * `job_dir` - Folder containing the job files
/// * `sites` - The sites of the job, which the assets must refer to
/// * `aggregate_by` - Whether to group the assets by their aggregation key
pub fn read_exposure(job_dir: &Path, sites: &SiteCollection, aggregate_by: bool) -> Result<Exposure> {
    let file_path = job_dir.join(EXPOSURE_FILE_NAME);
    let assets_raw = read_csv(&file_path)?;
    read_exposure_from_iter(assets_raw, sites, aggregate_by)
        .with_context(|| input_err_msg(&file_path))
}
