//! The module responsible for writing output data to disk.
use crate::datastore::{Column, Table, get_column};
use crate::job::FilteredSource;
use crate::source::SourceID;
use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// The root folder in which job-specific output folders will be created
const OUTPUT_DIRECTORY_ROOT: &str = "seisrisk_results";

/// The output file name for source weights
pub const SOURCE_WEIGHTS_FILE_NAME: &str = "source_weights.csv";

/// The output file name for damages by event
pub const AGG_DAMAGE_TABLE_FILE_NAME: &str = "agg_damage_table.csv";

/// The output file name for damages summed over events
pub const DAMAGES_FILE_NAME: &str = "damages.csv";

/// Get the default output folder for the job in the specified directory
pub fn get_output_dir(job_dir: &Path) -> Result<PathBuf> {
    // Get the job name from the dir path, after resolving "." and the like
    let job_dir = job_dir
        .canonicalize()
        .context("Could not resolve path to job")?;

    let job_name = job_dir
        .file_name()
        .context("Job cannot be in root folder")?
        .to_str()
        .context("Invalid chars in job dir name")?;

    // Construct path
    Ok([OUTPUT_DIRECTORY_ROOT, job_name].iter().collect())
}

/// Create a new output directory, deleting a non-empty existing one if `overwrite` is true.
///
/// # Returns
///
/// Whether an existing folder was overwritten
pub fn create_output_directory(output_dir: &Path, overwrite: bool) -> Result<bool> {
    let mut overwritten = false;
    if output_dir.is_dir() {
        // An empty folder can be used as is
        if output_dir.read_dir()?.next().is_none() {
            return Ok(false);
        }

        ensure!(
            overwrite,
            "Output folder already exists and is not empty. Please use --overwrite to replace it \
            or choose a different folder with --output-dir."
        );
        fs::remove_dir_all(output_dir)?;
        overwritten = true;
    }

    // Try to create the directory, with parents
    fs::create_dir_all(output_dir)?;

    Ok(overwritten)
}

/// Represents a row in the source weights CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct SourceWeightRow {
    source_id: SourceID,
    ordinal: u32,
    grp_id: u16,
    num_ruptures: u32,
    nsites: u64,
    weight: f64,
    min_lon: Option<f64>,
    min_lat: Option<f64>,
    width: Option<f64>,
    height: Option<f64>,
}

impl SourceWeightRow {
    fn new(filtered: &FilteredSource) -> Self {
        let src = &filtered.source;
        let (min_lon, min_lat, width, height) = match filtered.rectangle {
            Some((lon, lat, width, height)) => (Some(lon), Some(lat), Some(width), Some(height)),
            None => (None, None, None, None),
        };

        Self {
            source_id: src.id.clone(),
            ordinal: src.ordinal,
            grp_id: src.grp_id,
            num_ruptures: src.num_ruptures,
            nsites: src.nsites,
            weight: src.weight,
            min_lon,
            min_lat,
            width,
            height,
        }
    }
}

/// Write the weights of the filtered sources to `source_weights.csv`
pub fn write_source_weights(output_dir: &Path, sources: &[FilteredSource]) -> Result<()> {
    let file_path = output_dir.join(SOURCE_WEIGHTS_FILE_NAME);
    let mut writer = csv::Writer::from_path(&file_path)?;
    for filtered in sources {
        writer.serialize(SourceWeightRow::new(filtered))?;
    }
    writer.flush()?;

    Ok(())
}

/// Names used to make damage tables readable
pub struct DamageLabels<'a> {
    /// The name of each aggregation bucket, by ID
    pub buckets: &'a [String],
    /// The name of each loss type, by ID
    pub loss_types: &'a [String],
    /// The name of each damage state, including the first one
    pub damage_states: &'a [String],
}

fn label(names: &[String], id: Option<f64>) -> String {
    id.and_then(|id| names.get(id as usize))
        .cloned()
        .unwrap_or_default()
}

/// Write a damage table as CSV, with bucket and loss type names next to their IDs and damage
/// columns named after the damage states
fn write_damage_table(file_path: &Path, table: &Table, labels: &DamageLabels) -> Result<()> {
    let mut writer = csv::Writer::from_path(file_path)?;
    let has_events = table.contains_key("event_id");
    let dmg: Vec<&Column> = (1..labels.damage_states.len())
        .map(|dsi| get_column(table, &format!("dmg_{dsi}")))
        .collect::<Result<_>>()?;

    let mut header = Vec::new();
    if has_events {
        header.push("event_id".to_string());
    }
    header.extend(["agg_id", "agg_key", "loss_type"].map(String::from));
    header.extend(labels.damage_states.iter().skip(1).cloned());
    writer.write_record(&header)?;

    let agg_id = get_column(table, "agg_id")?;
    let loss_id = get_column(table, "loss_id")?;
    for row in 0..agg_id.len() {
        let mut record = Vec::with_capacity(header.len());
        if has_events {
            let event_id = get_column(table, "event_id")?;
            record.push(event_id.get_f64(row).unwrap_or_default().to_string());
        }
        record.push(agg_id.get_f64(row).unwrap_or_default().to_string());
        record.push(label(labels.buckets, agg_id.get_f64(row)));
        record.push(label(labels.loss_types, loss_id.get_f64(row)));
        for column in &dmg {
            record.push(column.get_f64(row).unwrap_or_default().to_string());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;

    Ok(())
}

/// Write the damages by event to `agg_damage_table.csv`
pub fn write_agg_damage_table(output_dir: &Path, table: &Table, labels: &DamageLabels) -> Result<()> {
    if table.is_empty() {
        return Ok(());
    }

    let file_path = output_dir.join(AGG_DAMAGE_TABLE_FILE_NAME);
    write_damage_table(&file_path, table, labels)
        .with_context(|| format!("Could not write {}", file_path.display()))
}

/// Write the damages summed over events to `damages.csv`
pub fn write_damages(output_dir: &Path, table: &Table, labels: &DamageLabels) -> Result<()> {
    let file_path = output_dir.join(DAMAGES_FILE_NAME);
    write_damage_table(&file_path, table, labels)
        .with_context(|| format!("Could not write {}", file_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FilteredSites;
    use crate::fixture::point_source;
    use crate::source::Source;
    use indexmap::indexmap;
    use rstest::rstest;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_create_output_directory_new() {
        let dir = tempdir().unwrap();
        let output_dir = dir.path().join("a/b");
        assert!(!create_output_directory(&output_dir, false).unwrap());
        assert!(output_dir.is_dir());
    }

    #[test]
    fn test_create_output_directory_existing() {
        let dir = tempdir().unwrap();
        // Empty folders are reused
        assert!(!create_output_directory(dir.path(), false).unwrap());

        File::create(dir.path().join("file.txt")).unwrap();
        assert!(create_output_directory(dir.path(), false).is_err());
        assert!(create_output_directory(dir.path(), true).unwrap());
        assert!(!dir.path().join("file.txt").exists());
    }

    #[rstest]
    fn test_write_source_weights(mut point_source: Source) {
        point_source.weight = 1500.0;
        point_source.nsites = 2;
        let sources = [FilteredSource {
            source: point_source,
            sites: FilteredSites::Unfiltered,
            rectangle: None,
        }];

        let dir = tempdir().unwrap();
        write_source_weights(dir.path(), &sources).unwrap();

        let rows: Vec<SourceWeightRow> =
            csv::Reader::from_path(dir.path().join(SOURCE_WEIGHTS_FILE_NAME))
                .unwrap()
                .into_deserialize()
                .collect::<Result<_, _>>()
                .unwrap();
        assert_eq!(rows, [SourceWeightRow::new(&sources[0])]);
        assert_eq!(rows[0].min_lon, None);
    }

    #[test]
    fn test_write_damages() {
        let table = indexmap! {
            "agg_id".to_string() => Column::U16(vec![0, 1]),
            "loss_id".to_string() => Column::U8(vec![0, 0]),
            "dmg_1".to_string() => Column::F32(vec![1.5, 2.0]),
            "dmg_2".to_string() => Column::F32(vec![0.0, 3.0]),
        };
        let buckets = ["north".to_string(), "total".to_string()];
        let loss_types = ["structural".to_string()];
        let damage_states = ["no_damage", "moderate", "complete"].map(String::from);
        let labels = DamageLabels {
            buckets: &buckets,
            loss_types: &loss_types,
            damage_states: &damage_states,
        };

        let dir = tempdir().unwrap();
        write_damages(dir.path(), &table, &labels).unwrap();
        let contents = fs::read_to_string(dir.path().join(DAMAGES_FILE_NAME)).unwrap();
        assert_eq!(
            contents,
            "agg_id,agg_key,loss_type,moderate,complete\n\
            0,north,structural,1.5,0\n\
            1,total,structural,2,3\n"
        );
    }
}
