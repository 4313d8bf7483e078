//! Code for reading the site collection from a CSV file.
use super::read_csv;
use crate::geo::Point;
use crate::site::SiteCollection;
use anyhow::{Result, ensure};
use serde::Deserialize;
use std::path::Path;

const SITES_FILE_NAME: &str = "sites.csv";

/// A site record retrieved from a CSV file
#[derive(PartialEq, Debug, Deserialize)]
struct SiteRaw {
    lon: f64,
    lat: f64,
    #[serde(default)]
    depth: f64,
}

/// Build a site collection from an iterator of raw site records
fn read_sites_from_iter<I>(iter: I) -> Result<SiteCollection>
where
    I: IntoIterator<Item = SiteRaw>,
{
    let mut locations = Vec::new();
    for (i, site) in iter.into_iter().enumerate() {
        ensure!(
            (-180.0..=180.0).contains(&site.lon) && (-90.0..=90.0).contains(&site.lat),
            "Invalid coordinates ({}, {}) for site {i}",
            site.lon,
            site.lat
        );
        locations.push(Point::new(site.lon, site.lat, site.depth));
    }
    ensure!(
        u32::try_from(locations.len()).is_ok(),
        "Too many sites: {}",
        locations.len()
    );

    Ok(SiteCollection::new(locations))
}

/// Read the sites from `sites.csv`, numbering them in file order.
///
/// # Arguments
///
/// * `job_dir` - Folder containing the job files
pub fn read_sites(job_dir: &Path) -> Result<SiteCollection> {
    let file_path = job_dir.join(SITES_FILE_NAME);
    read_sites_from_iter(read_csv(&file_path)?)
}
