//! Storage for the columnar tables produced by a calculation.
//!
//! Tables are sets of equally long typed columns. Column keys have the form `table/column`, so
//! that columns of the same table can be appended to independently.
use anyhow::{Context, Result, anyhow, bail, ensure};
use indexmap::IndexMap;
use std::ops::Range;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// A typed column of data
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Unsigned 8-bit integers
    U8(Vec<u8>),
    /// Unsigned 16-bit integers
    U16(Vec<u16>),
    /// Unsigned 32-bit integers
    U32(Vec<u32>),
    /// 32-bit floats
    F32(Vec<f32>),
}

/// A table, as a map from column name to column
pub type Table = IndexMap<String, Column>;

impl Column {
    /// The number of values in the column
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::F32(v) => v.len(),
        }
    }

    /// Whether the column is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The name of the type of the values
    pub fn dtype(&self) -> &'static str {
        match self {
            Self::U8(_) => "u8",
            Self::U16(_) => "u16",
            Self::U32(_) => "u32",
            Self::F32(_) => "f32",
        }
    }

    /// A copy of the given rows
    pub fn slice(&self, rows: Range<usize>) -> Result<Column> {
        ensure!(
            rows.start <= rows.end && rows.end <= self.len(),
            "Rows {rows:?} out of range for a column of length {}",
            self.len()
        );

        Ok(match self {
            Self::U8(v) => Self::U8(v[rows].to_vec()),
            Self::U16(v) => Self::U16(v[rows].to_vec()),
            Self::U32(v) => Self::U32(v[rows].to_vec()),
            Self::F32(v) => Self::F32(v[rows].to_vec()),
        })
    }

    /// Append the values of another column of the same type
    pub fn extend(&mut self, other: &Column) -> Result<()> {
        match (self, other) {
            (Self::U8(v), Self::U8(o)) => v.extend_from_slice(o),
            (Self::U16(v), Self::U16(o)) => v.extend_from_slice(o),
            (Self::U32(v), Self::U32(o)) => v.extend_from_slice(o),
            (Self::F32(v), Self::F32(o)) => v.extend_from_slice(o),
            (this, other) => bail!(
                "Cannot append {} values to a {} column",
                other.dtype(),
                this.dtype()
            ),
        }

        Ok(())
    }

    /// The value at the given row as a float
    pub fn get_f64(&self, row: usize) -> Option<f64> {
        match self {
            Self::U8(v) => v.get(row).map(|x| f64::from(*x)),
            Self::U16(v) => v.get(row).map(|x| f64::from(*x)),
            Self::U32(v) => v.get(row).map(|x| f64::from(*x)),
            Self::F32(v) => v.get(row).map(|x| f64::from(*x)),
        }
    }

    /// The values of an integer column as `u32`, failing for float columns
    pub fn to_u32(&self) -> Result<Vec<u32>> {
        match self {
            Self::U8(v) => Ok(v.iter().map(|x| u32::from(*x)).collect()),
            Self::U16(v) => Ok(v.iter().map(|x| u32::from(*x)).collect()),
            Self::U32(v) => Ok(v.clone()),
            Self::F32(_) => bail!("Expected an integer column, found f32"),
        }
    }
}

/// The column named `name` of a table, failing if it is missing
pub fn get_column<'a>(table: &'a Table, name: &str) -> Result<&'a Column> {
    table
        .get(name)
        .with_context(|| format!("Missing column {name}"))
}

/// A store of growing columns, readable while being written to
pub trait DataStore: Send + Sync {
    /// Read a column, optionally restricted to a range of rows
    fn read_column(&self, key: &str, rows: Option<Range<usize>>) -> Result<Column>;

    /// The names of the columns of a table, in creation order
    fn column_names(&self, table: &str) -> Vec<String>;

    /// Append values to a column, creating it if needed
    fn extend(&self, key: &str, data: &Column) -> Result<()>;

    /// Whether a column exists
    fn contains(&self, key: &str) -> bool;

    /// Enable concurrent reading while writing (single writer, multiple readers)
    fn swmr_on(&self);

    /// Whether concurrent reading has been enabled
    fn is_swmr(&self) -> bool;

    /// The number of rows of a column
    fn len(&self, key: &str) -> Result<usize> {
        Ok(self.read_column(key, None)?.len())
    }

    /// Read all the columns of a table, optionally restricted to a range of rows.
    ///
    /// The columns of the result are named without the table prefix.
    fn read_table(&self, table: &str, rows: Option<Range<usize>>) -> Result<Table> {
        let names = self.column_names(table);
        ensure!(!names.is_empty(), "No table called {table}");

        names
            .into_iter()
            .map(|name| {
                let column = self.read_column(&format!("{table}/{name}"), rows.clone())?;
                Ok((name, column))
            })
            .collect()
    }

    /// Create a new table from its columns, which must all have the same length
    fn create_table(&self, table: &str, columns: Table) -> Result<()> {
        let mut lengths = columns.values().map(Column::len);
        if let Some(first) = lengths.next() {
            ensure!(
                lengths.all(|len| len == first),
                "The columns of table {table} have different lengths"
            );
        }
        ensure!(
            self.column_names(table).is_empty(),
            "Table {table} already exists"
        );

        for (name, column) in &columns {
            self.extend(&format!("{table}/{name}"), column)?;
        }

        Ok(())
    }
}

/// A [`DataStore`] kept in memory
#[derive(Default)]
pub struct MemoryStore {
    columns: RwLock<IndexMap<String, Column>>,
    swmr: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataStore for MemoryStore {
    fn read_column(&self, key: &str, rows: Option<Range<usize>>) -> Result<Column> {
        let columns = self
            .columns
            .read()
            .map_err(|_| anyhow!("Datastore lock is poisoned"))?;
        let column = columns
            .get(key)
            .with_context(|| format!("No column called {key} in the datastore"))?;

        match rows {
            Some(rows) => column.slice(rows),
            None => Ok(column.clone()),
        }
    }

    fn len(&self, key: &str) -> Result<usize> {
        let columns = self
            .columns
            .read()
            .map_err(|_| anyhow!("Datastore lock is poisoned"))?;
        columns
            .get(key)
            .map(Column::len)
            .with_context(|| format!("No column called {key} in the datastore"))
    }

    fn column_names(&self, table: &str) -> Vec<String> {
        let prefix = format!("{table}/");
        self.columns
            .read()
            .map(|columns| {
                columns
                    .keys()
                    .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn extend(&self, key: &str, data: &Column) -> Result<()> {
        let mut columns = self
            .columns
            .write()
            .map_err(|_| anyhow!("Datastore lock is poisoned"))?;
        match columns.get_mut(key) {
            Some(column) => column
                .extend(data)
                .with_context(|| format!("Could not extend column {key}"))?,
            None => {
                columns.insert(key.to_string(), data.clone());
            }
        }

        Ok(())
    }

    fn contains(&self, key: &str) -> bool {
        self.columns
            .read()
            .is_ok_and(|columns| columns.contains_key(key))
    }

    fn swmr_on(&self) {
        self.swmr.store(true, Ordering::Release);
    }

    fn is_swmr(&self) -> bool {
        self.swmr.load(Ordering::Acquire)
    }
}
