//! Ground-motion fields: the simulated intensity of each measure type, by site and event.
use crate::datastore::{Column, Table, get_column};
use anyhow::{Context, Result, bail, ensure};
use indexmap::IndexMap;
use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use std::ops::Range;

/// Prefix of the columns holding ground-motion values
const GMV_PREFIX: &str = "gmv_";

/// A ground-motion field table, stored by column
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GmfData {
    /// Site ID of each row
    pub sid: Vec<u32>,
    /// Event ID of each row
    pub eid: Vec<u32>,
    /// Ground-motion values for each intensity measure type
    pub gmv: IndexMap<String, Vec<f32>>,
}

impl GmfData {
    /// Create a new [`GmfData`], checking that columns have the same length, that values are
    /// finite and non-negative and that each (site, event) pair appears once
    pub fn new(sid: Vec<u32>, eid: Vec<u32>, gmv: IndexMap<String, Vec<f32>>) -> Result<Self> {
        ensure!(sid.len() == eid.len(), "sid and eid have different lengths");
        for (imt, values) in &gmv {
            ensure!(
                values.len() == sid.len(),
                "The values for {imt} have a different length"
            );
            if let Some(row) = values.iter().position(|v| !(v.is_finite() && *v >= 0.0)) {
                bail!(
                    "Invalid ground motion value {} for {imt} at site {} and event {}",
                    values[row],
                    sid[row],
                    eid[row]
                );
            }
        }
        let mut seen = HashSet::new();
        for (s, e) in sid.iter().zip(&eid) {
            ensure!(
                seen.insert((*s, *e)),
                "Duplicate ground motion for site {s} and event {e}"
            );
        }

        Ok(Self { sid, eid, gmv })
    }

    /// The number of rows
    pub fn len(&self) -> usize {
        self.sid.len()
    }

    /// Whether there are no rows
    pub fn is_empty(&self) -> bool {
        self.sid.is_empty()
    }

    /// The intensity measure types
    pub fn imts(&self) -> impl Iterator<Item = &str> {
        self.gmv.keys().map(String::as_str)
    }

    /// The distinct event IDs, sorted
    pub fn eids(&self) -> Vec<u32> {
        self.eid.iter().copied().sorted_unstable().dedup().collect()
    }

    /// The row of each (site, event) pair
    pub fn index(&self) -> HashMap<(u32, u32), usize> {
        self.sid
            .iter()
            .zip(&self.eid)
            .enumerate()
            .map(|(row, (s, e))| ((*s, *e), row))
            .collect()
    }

    fn take(&self, rows: &[usize]) -> Self {
        Self {
            sid: rows.iter().map(|row| self.sid[*row]).collect(),
            eid: rows.iter().map(|row| self.eid[*row]).collect(),
            gmv: self
                .gmv
                .iter()
                .map(|(imt, values)| (imt.clone(), rows.iter().map(|row| values[*row]).collect()))
                .collect(),
        }
    }

    /// The same table with rows sorted by event and then by site
    pub fn sorted_by_event(&self) -> Self {
        let rows = (0..self.len())
            .sorted_by_key(|row| (self.eid[*row], self.sid[*row]))
            .collect_vec();
        self.take(&rows)
    }

    /// The rows for the given sites
    pub fn select_sites(&self, sids: &HashSet<u32>) -> Self {
        let rows = (0..self.len())
            .filter(|row| sids.contains(&self.sid[*row]))
            .collect_vec();
        self.take(&rows)
    }

    /// Split a table sorted by event into about `num_slices` slices, never splitting an event
    pub fn event_slices(&self, num_slices: usize) -> Vec<Range<usize>> {
        event_slices(&self.eid, num_slices)
    }

    /// Convert into columns named `sid`, `eid` and `gmv_<IMT>`
    pub fn to_table(&self) -> Table {
        let mut table = Table::new();
        table.insert("sid".to_string(), Column::U32(self.sid.clone()));
        table.insert("eid".to_string(), Column::U32(self.eid.clone()));
        for (imt, values) in &self.gmv {
            table.insert(format!("{GMV_PREFIX}{imt}"), Column::F32(values.clone()));
        }

        table
    }

    /// Build from columns named as by [`GmfData::to_table`]
    pub fn from_table(table: &Table) -> Result<Self> {
        let sid = get_column(table, "sid")?.to_u32()?;
        let eid = get_column(table, "eid")?.to_u32()?;
        let mut gmv = IndexMap::new();
        for (name, column) in table {
            let Some(imt) = name.strip_prefix(GMV_PREFIX) else {
                continue;
            };
            let Column::F32(values) = column else {
                bail!("Column {name} should contain f32 values");
            };
            gmv.insert(imt.to_string(), values.clone());
        }

        Self::new(sid, eid, gmv).context("Invalid ground motion table")
    }
}

/// Split sorted event IDs into about `num_slices` contiguous slices of rows, so that all the rows
/// of an event fall in the same slice.
pub fn event_slices(eids: &[u32], num_slices: usize) -> Vec<Range<usize>> {
    let n = eids.len();
    if n == 0 {
        return Vec::new();
    }

    let blocksize = n.div_ceil(num_slices.max(1));
    let mut slices = Vec::new();
    let mut start = 0;
    while start < n {
        let mut end = (start + blocksize).min(n);
        while end < n && eids[end] == eids[end - 1] {
            end += 1;
        }
        slices.push(start..end);
        start = end;
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::indexmap;
    use rstest::rstest;

    fn gmf() -> GmfData {
        GmfData::new(
            vec![1, 0, 1, 0, 0],
            vec![2, 2, 0, 0, 1],
            indexmap! {"PGA".to_string() => vec![0.1, 0.2, 0.3, 0.4, 0.5]},
        )
        .unwrap()
    }

    #[test]
    fn test_sorted_by_event() {
        let sorted = gmf().sorted_by_event();
        assert_eq!(sorted.eid, [0, 0, 1, 2, 2]);
        assert_eq!(sorted.sid, [0, 1, 0, 0, 1]);
        assert_eq!(sorted.gmv["PGA"], [0.4, 0.3, 0.5, 0.2, 0.1]);
        assert_eq!(sorted.eids(), [0, 1, 2]);
    }

    #[test]
    fn test_event_slices() {
        let sorted = gmf().sorted_by_event();
        assert_eq!(sorted.event_slices(5), [0..2, 2..3, 3..5]);
        assert_eq!(sorted.event_slices(1), [0..5]);
        assert_eq!(sorted.event_slices(2), [0..3, 3..5]);
        assert!(event_slices(&[], 3).is_empty());
        assert_eq!(event_slices(&[4, 4, 4, 4], 4), [0..4]);
    }

    #[test]
    fn test_select_sites() {
        let selected = gmf().select_sites(&HashSet::from([1]));
        assert_eq!(selected.sid, [1, 1]);
        assert_eq!(selected.eid, [2, 0]);
    }

    #[test]
    fn test_table_round_trip() {
        let gmf = gmf();
        assert_eq!(GmfData::from_table(&gmf.to_table()).unwrap(), gmf);
    }

    #[rstest]
    #[case(f32::NAN)]
    #[case(f32::INFINITY)]
    #[case(-0.1)]
    fn test_invalid_values(#[case] value: f32) {
        let result = GmfData::new(vec![0], vec![1], indexmap! {"PGA".to_string() => vec![value]});
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicates() {
        let result = GmfData::new(
            vec![0, 0],
            vec![1, 1],
            indexmap! {"PGA".to_string() => vec![0.1, 0.2]},
        );
        assert!(result.is_err());
    }
}
