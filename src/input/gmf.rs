//! Code for reading ground-motion fields from a CSV file.
use super::input_err_msg;
use crate::gmf::GmfData;
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use std::path::Path;

const GMF_FILE_NAME: &str = "gmf_data.csv";

/// Parse one field of a record, reporting the row and column on failure
fn parse_field<T: std::str::FromStr>(record: &csv::StringRecord, col: usize, name: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let line = record.position().map_or(0, csv::Position::line);
    let value = record
        .get(col)
        .with_context(|| format!("Missing {name} on line {line}"))?;
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid {name} {value:?} on line {line}"))
}

fn read_gmf_from_reader<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<GmfData> {
    let headers = reader.headers()?.clone();
    ensure!(
        headers.get(0) == Some("sid") && headers.get(1) == Some("eid"),
        "The first columns must be sid and eid"
    );
    let imts: Vec<String> = headers
        .iter()
        .skip(2)
        .map(|name| {
            name.strip_prefix("gmv_")
                .map(str::to_string)
                .with_context(|| format!("Unexpected column {name}"))
        })
        .collect::<Result<_>>()?;
    ensure!(!imts.is_empty(), "No ground motion columns");

    let mut sid = Vec::new();
    let mut eid = Vec::new();
    let mut gmv: IndexMap<String, Vec<f32>> =
        imts.iter().map(|imt| (imt.clone(), Vec::new())).collect();
    for record in reader.records() {
        let record = record?;
        sid.push(parse_field(&record, 0, "sid")?);
        eid.push(parse_field(&record, 1, "eid")?);
        for (col, values) in gmv.values_mut().enumerate() {
            values.push(parse_field(&record, col + 2, &headers[col + 2])?);
        }
    }
    ensure!(!sid.is_empty(), "CSV file cannot be empty");

    GmfData::new(sid, eid, gmv)
}

/// Read ground-motion fields from `gmf_data.csv`.
///
/// The file has columns `sid` and `eid` followed by one `gmv_<IMT>` column per intensity measure
/// type.
///
/// # Arguments
///
/// * `job_dir` - Folder containing the job files
pub fn read_gmf(job_dir: &Path) -> Result<GmfData> {
    let file_path = job_dir.join(GMF_FILE_NAME);
    let reader = csv::Reader::from_path(&file_path).with_context(|| input_err_msg(&file_path))?;
    read_gmf_from_reader(reader).with_context(|| input_err_msg(&file_path))
}
