//! # Fact Store
//!
//! The read-only columnar table of burden-of-disease observations, and the SQL
//! surface the query layer talks to.
//!
//! - Strict Schema: Column names follow the IHME export layout and are not
//!   configurable. A file missing any of them is rejected at load time.
//! - Push-down: Every query is answered by the polars SQL engine over the
//!   registered `facts` table, so only grouped results leave the store.
//! - Read-only: The frame is loaded once and shared; nothing writes to it.

use itertools::Itertools;
use polars::prelude::*;
use polars::sql::SQLContext;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

use crate::types::{AgeGroup, Measure, Metric, Sex};

/// Name under which the fact frame is registered for SQL.
pub const FACT_TABLE: &str = "facts";

pub const FACT_COLUMNS: [&str; 14] = [
    "location_id",
    "location_name",
    "year",
    "age_id",
    "age_name",
    "sex_name",
    "cause_name",
    "measure_name",
    "metric_name",
    "val",
    "income_group",
    "continent",
    "region",
    "subregion",
];

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    Polars(#[from] PolarsError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(
        "The required column '{0}' was not found in the fact table. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error("The fact store is unavailable: {0}")]
    Unavailable(String),
}

/// Anything that can answer an aggregation query over the fact table.
///
/// Implementations are shared by every session, so they must be safe to call
/// from several threads at once.
pub trait FactStore: Send + Sync {
    fn execute(&self, query: &str) -> Result<DataFrame, StoreError>;
}

/// One fact row, as in the IHME export.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub location_id: i64,
    pub location_name: String,
    pub year: i32,
    pub age_group: AgeGroup,
    pub sex: Sex,
    pub cause_name: String,
    pub measure: Measure,
    pub metric: Metric,
    pub value: f64,
    pub income_group: String,
    pub continent: String,
    pub region: String,
    pub subregion: String,
}

/// A fact store backed by an in-memory polars frame.
#[derive(Debug, Clone)]
pub struct PolarsFactStore {
    facts: DataFrame,
}

impl PolarsFactStore {
    /// Loads a fact table from disk. Files ending in `.tsv` are read tab-separated,
    /// everything else as comma-separated.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        log::info!("Loading fact table from '{}'", path.display());
        let separator = match path.extension().and_then(|ext| ext.to_str()) {
            Some("tsv") => b'\t',
            _ => b',',
        };

        let df = CsvReader::new(File::open(path)?)
            .with_options(
                CsvReadOptions::default()
                    .with_has_header(true)
                    .with_parse_options(CsvParseOptions::default().with_separator(separator)),
            )
            .finish()?;

        let store = Self::from_frame(df)?;
        log::info!("Fact table ready with {} observations", store.height());
        Ok(store)
    }

    /// Validates and normalizes an already loaded frame.
    pub fn from_frame(df: DataFrame) -> Result<Self, StoreError> {
        for name in FACT_COLUMNS {
            if !has_column(&df, name) {
                return Err(StoreError::ColumnNotFound(name.to_string()));
            }
        }

        let projection: Vec<Expr> = FACT_COLUMNS.iter().map(|name| col(*name)).collect();
        let facts = df
            .lazy()
            .select(projection)
            .with_columns([
                col("location_id").cast(DataType::Int64),
                col("year").cast(DataType::Int64),
                col("age_id").cast(DataType::Int64),
                col("val").cast(DataType::Float64),
            ])
            .collect()?;

        Ok(Self { facts })
    }

    pub fn from_observations(rows: &[Observation]) -> Result<Self, StoreError> {
        fn text<F: Fn(&Observation) -> &str>(rows: &[Observation], name: &str, f: F) -> Column {
            Column::new(name.into(), rows.iter().map(f).collect::<Vec<&str>>())
        }

        let df = DataFrame::new(vec![
            Column::new(
                "location_id".into(),
                rows.iter().map(|row| row.location_id).collect::<Vec<i64>>(),
            ),
            text(rows, "location_name", |row| row.location_name.as_str()),
            Column::new(
                "year".into(),
                rows.iter().map(|row| i64::from(row.year)).collect::<Vec<i64>>(),
            ),
            Column::new(
                "age_id".into(),
                rows.iter().map(|row| row.age_group.id).collect::<Vec<i64>>(),
            ),
            text(rows, "age_name", |row| row.age_group.name),
            text(rows, "sex_name", |row| row.sex.as_str()),
            text(rows, "cause_name", |row| row.cause_name.as_str()),
            text(rows, "measure_name", |row| row.measure.as_str()),
            text(rows, "metric_name", |row| row.metric.as_str()),
            Column::new(
                "val".into(),
                rows.iter().map(|row| row.value).collect::<Vec<f64>>(),
            ),
            text(rows, "income_group", |row| row.income_group.as_str()),
            text(rows, "continent", |row| row.continent.as_str()),
            text(rows, "region", |row| row.region.as_str()),
            text(rows, "subregion", |row| row.subregion.as_str()),
        ])?;

        Self::from_frame(df)
    }

    pub fn height(&self) -> usize {
        self.facts.height()
    }
}

impl FactStore for PolarsFactStore {
    fn execute(&self, query: &str) -> Result<DataFrame, StoreError> {
        log::debug!("Executing against '{FACT_TABLE}': {query}");
        let mut ctx = SQLContext::new();
        ctx.register(FACT_TABLE, self.facts.clone().lazy());
        let result = ctx.execute(query)?.collect()?;
        log::debug!("Query returned {} rows", result.height());
        Ok(result)
    }
}

/// Renders a string as a SQL literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Renders a comma-separated list of quoted literals for an `IN (...)` clause.
pub fn quote_list<S: AsRef<str>>(values: &[S]) -> String {
    values
        .iter()
        .map(|value| quote_literal(value.as_ref()))
        .join(", ")
}

pub(crate) fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == name)
}

fn require_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column, StoreError> {
    if !has_column(df, name) {
        return Err(StoreError::ColumnNotFound(name.to_string()));
    }
    Ok(df.column(name)?)
}

/// Reads a text column. Nulls become empty strings.
pub(crate) fn string_values(df: &DataFrame, name: &str) -> Result<Vec<String>, StoreError> {
    let casted = require_column(df, name)?.cast(&DataType::String)?;
    let values = casted
        .str()?
        .into_iter()
        .map(|value| value.unwrap_or_default().to_string())
        .collect();
    Ok(values)
}

/// Reads a numeric column as `f64`. Nulls (an empty sum) become zero.
pub(crate) fn float_values(df: &DataFrame, name: &str) -> Result<Vec<f64>, StoreError> {
    let casted = require_column(df, name)?.cast(&DataType::Float64)?;
    let values = casted
        .f64()?
        .into_iter()
        .map(|value| value.unwrap_or(0.0))
        .collect();
    Ok(values)
}

pub(crate) fn int_values(df: &DataFrame, name: &str) -> Result<Vec<i64>, StoreError> {
    let casted = require_column(df, name)?.cast(&DataType::Int64)?;
    let values = casted
        .i64()?
        .into_iter()
        .map(|value| value.unwrap_or(0))
        .collect();
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "location_id,location_name,year,age_id,age_name,sex_name,cause_name,measure_name,metric_name,val,income_group,continent,region,subregion";

    fn create_test_csv(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        writeln!(file, "{content}").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn quote_literal_doubles_single_quotes() {
        assert_eq!(quote_literal("Cote d'Ivoire"), "'Cote d''Ivoire'");
        assert_eq!(quote_literal("x' OR '1'='1"), "'x'' OR ''1''=''1'");
        assert_eq!(quote_list(&["a", "b'c"]), "'a', 'b''c'");
    }

    #[test]
    fn open_normalizes_integer_values_to_floats() {
        let content = format!(
            "{HEADER}\n1,Numberland,2019,22,All ages,Both,HIV/AIDS,Prevalence,Number,300,Low income,Africa,Sub-Saharan Africa,Eastern Africa"
        );
        let file = create_test_csv(".csv", &content);
        let store = PolarsFactStore::open(file.path()).unwrap();
        assert_eq!(store.height(), 1);

        let df = store
            .execute("SELECT location_name, val FROM facts")
            .unwrap();
        assert_eq!(float_values(&df, "val").unwrap(), vec![300.0]);
        assert_eq!(
            string_values(&df, "location_name").unwrap(),
            vec!["Numberland".to_string()]
        );
    }

    #[test]
    fn tsv_extension_switches_separator() {
        let content = format!(
            "{}\n2\tTabland\t2020\t27\tAge-standardized\tFemale\tEbola\tDeaths\tRate\t1.5\tHigh income\tEurope\tEurope\tNorthern Europe",
            HEADER.replace(',', "\t")
        );
        let file = create_test_csv(".tsv", &content);
        let store = PolarsFactStore::open(file.path()).unwrap();
        let df = store.execute("SELECT year, age_id FROM facts").unwrap();
        assert_eq!(int_values(&df, "year").unwrap(), vec![2020]);
        assert_eq!(int_values(&df, "age_id").unwrap(), vec![27]);
    }

    #[test]
    fn missing_column_is_rejected() {
        let content = "location_name,year\nNumberland,2019";
        let file = create_test_csv(".csv", content);
        match PolarsFactStore::open(file.path()) {
            Err(StoreError::ColumnNotFound(name)) => assert_eq!(name, "location_id"),
            other => panic!("Expected ColumnNotFound, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = PolarsFactStore::open(Path::new("/nonexistent/facts.csv")).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
