//! # Query Layer
//!
//! The six request-shaped aggregations behind the dashboard visuals. Every
//! operation follows the same path:
//!
//! 1. Expand the health condition into elementary causes and resolve the
//!    effective age band.
//! 2. Push a grouped aggregation into the fact store. In plain mode it sums
//!    `val` for the selected measure; in SHS mode it produces per-measure sums
//!    per (location, cause, age, income group) plus the operation's own keys.
//! 3. In SHS mode, weight each group through the coefficient table and
//!    re-group by the operation's keys.
//! 4. Order and trim in process. Results are a few hundred rows at most.
//!
//! A filter combination that matches nothing yields an empty vector. Only store
//! failures are errors.

use std::sync::Arc;

use polars::prelude::DataFrame;
use thiserror::Error;

use crate::formula;
use crate::sql::{AggregationQuery, FactFilter, VALUE};
use crate::store::{FACT_TABLE, FactStore, StoreError, float_values, int_values, string_values};
use crate::types::{BreakdownDimension, FilterError, Filters, RankingOrder};

/// Ranking views always show at most this many locations.
pub const RANKING_LIMIT: usize = 20;

/// Decimal places kept in the table view.
pub const TABLE_DECIMALS: i32 = 3;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Fact store failure: {0}")]
    Store(#[from] StoreError),
    #[error("Invalid filter: {0}")]
    Filter(#[from] FilterError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationValue {
    pub location_name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalPoint {
    pub year: i32,
    pub location_name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HierarchyNode {
    pub continent: String,
    pub subregion: String,
    pub location_name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreakdownPoint {
    pub location_name: String,
    pub breakdown_value: String,
    pub value: f64,
}

/// Restrictions that vary per operation on top of the shared filters.
struct Scope<'a> {
    year: Option<i32>,
    locations: Option<&'a [String]>,
}

impl Scope<'_> {
    fn single_year(filters: &Filters) -> Self {
        Scope {
            year: Some(filters.year),
            locations: None,
        }
    }
}

/// Entry point to the query layer. Cheap to clone; every clone shares the
/// same read-only store.
#[derive(Clone)]
pub struct Dashboard {
    store: Arc<dyn FactStore>,
}

impl Dashboard {
    pub fn new(store: Arc<dyn FactStore>) -> Self {
        Self { store }
    }

    /// The most recent year present in the fact table, if any.
    pub fn latest_year(&self) -> Result<Option<i32>, QueryError> {
        let df = self
            .store
            .execute(&format!("SELECT MAX(year) AS year FROM {FACT_TABLE}"))?;
        if df.height() == 0 || df.column("year").map_err(StoreError::from)?.null_count() > 0 {
            return Ok(None);
        }
        let years = int_values(&df, "year")?;
        Ok(years.first().and_then(|year| i32::try_from(*year).ok()))
    }

    pub fn map_data(&self, filters: &Filters) -> Result<Vec<LocationValue>, QueryError> {
        let mut rows = self.location_values(filters)?;
        rows.sort_by(|a, b| a.location_name.cmp(&b.location_name));
        Ok(rows)
    }

    /// Every available year for the given locations. The filter's own year is
    /// ignored.
    pub fn historical_data(
        &self,
        filters: &Filters,
        locations: &[String],
    ) -> Result<Vec<HistoricalPoint>, QueryError> {
        let scope = Scope {
            year: None,
            locations: Some(locations),
        };
        let Some(df) = self.grouped(filters, &["year", "location_name"], &scope)? else {
            return Ok(Vec::new());
        };

        let years = int_values(&df, "year")?;
        let names = string_values(&df, "location_name")?;
        let values = float_values(&df, VALUE)?;
        let mut rows: Vec<HistoricalPoint> = years
            .into_iter()
            .zip(names)
            .zip(values)
            .filter_map(|((year, location_name), value)| {
                i32::try_from(year).ok().map(|year| HistoricalPoint {
                    year,
                    location_name,
                    value,
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            a.location_name
                .cmp(&b.location_name)
                .then(a.year.cmp(&b.year))
        });
        Ok(rows)
    }

    pub fn ranking_data(
        &self,
        filters: &Filters,
        order: RankingOrder,
    ) -> Result<Vec<LocationValue>, QueryError> {
        let mut rows = self.location_values(filters)?;
        rows.sort_by(|a, b| {
            let by_value = match order {
                RankingOrder::Top20 => b.value.total_cmp(&a.value),
                RankingOrder::Bottom20 => a.value.total_cmp(&b.value),
            };
            by_value.then_with(|| a.location_name.cmp(&b.location_name))
        });
        rows.truncate(RANKING_LIMIT);
        Ok(rows)
    }

    /// Continent / subregion / location tree for sunburst and treemap views.
    pub fn hierarchical_data(&self, filters: &Filters) -> Result<Vec<HierarchyNode>, QueryError> {
        let scope = Scope::single_year(filters);
        let Some(df) =
            self.grouped(filters, &["continent", "subregion", "location_name"], &scope)?
        else {
            return Ok(Vec::new());
        };

        let continents = string_values(&df, "continent")?;
        let subregions = string_values(&df, "subregion")?;
        let names = string_values(&df, "location_name")?;
        let values = float_values(&df, VALUE)?;
        let mut rows: Vec<HierarchyNode> = continents
            .into_iter()
            .zip(subregions)
            .zip(names)
            .zip(values)
            .map(|(((continent, subregion), location_name), value)| HierarchyNode {
                continent,
                subregion,
                location_name,
                value,
            })
            .collect();
        rows.sort_by(|a, b| {
            a.continent
                .cmp(&b.continent)
                .then_with(|| a.subregion.cmp(&b.subregion))
                .then_with(|| a.location_name.cmp(&b.location_name))
        });
        Ok(rows)
    }

    pub fn breakdown_data(
        &self,
        filters: &Filters,
        dimension: BreakdownDimension,
    ) -> Result<Vec<BreakdownPoint>, QueryError> {
        let scope = Scope::single_year(filters);
        let Some(df) = self.grouped(filters, &["location_name", dimension.column()], &scope)?
        else {
            return Ok(Vec::new());
        };

        let names = string_values(&df, "location_name")?;
        let breakdown = string_values(&df, dimension.column())?;
        let values = float_values(&df, VALUE)?;
        let mut rows: Vec<BreakdownPoint> = names
            .into_iter()
            .zip(breakdown)
            .zip(values)
            .map(|((location_name, breakdown_value), value)| BreakdownPoint {
                location_name,
                breakdown_value,
                value,
            })
            .collect();
        rows.sort_by(|a, b| {
            a.location_name
                .cmp(&b.location_name)
                .then_with(|| a.breakdown_value.cmp(&b.breakdown_value))
        });
        Ok(rows)
    }

    pub fn table_data(&self, filters: &Filters) -> Result<Vec<LocationValue>, QueryError> {
        let mut rows = self.map_data(filters)?;
        for row in &mut rows {
            row.value = round_to(row.value, TABLE_DECIMALS);
        }
        Ok(rows)
    }

    fn location_values(&self, filters: &Filters) -> Result<Vec<LocationValue>, QueryError> {
        let scope = Scope::single_year(filters);
        let Some(df) = self.grouped(filters, &["location_name"], &scope)? else {
            return Ok(Vec::new());
        };
        let names = string_values(&df, "location_name")?;
        let values = float_values(&df, VALUE)?;
        Ok(names
            .into_iter()
            .zip(values)
            .map(|(location_name, value)| LocationValue {
                location_name,
                value,
            })
            .collect())
    }

    /// Runs the shared filter / aggregate / weight pipeline and returns `keys`
    /// plus a `value` column, or `None` when the filters cannot match anything.
    fn grouped(
        &self,
        filters: &Filters,
        keys: &[&'static str],
        scope: &Scope<'_>,
    ) -> Result<Option<DataFrame>, QueryError> {
        let causes = filters.causes();
        if causes.is_empty() {
            log::debug!(
                "No eligible causes for '{}' (shs={}); skipping query",
                filters.health_condition,
                filters.shs
            );
            return Ok(None);
        }
        if scope.locations.is_some_and(|locations| locations.is_empty()) {
            return Ok(None);
        }

        let fact_filter = FactFilter {
            causes: &causes,
            sex: filters.sex,
            age_group: filters.effective_age_group(),
            metric: filters.metric,
            year: scope.year,
            locations: scope.locations,
        };
        let df = if filters.shs {
            match formula::weighted_sums(self.store.as_ref(), &fact_filter, keys)? {
                Some(df) => df,
                None => return Ok(None),
            }
        } else {
            let query = AggregationQuery::sum_of_values(keys)
                .filter_text("measure_name", filters.measure.as_str())
                .restrict(&fact_filter);
            self.store.execute(&query.to_sql())?
        };
        log::debug!("Aggregated {} rows grouped by {:?}", df.height(), keys);
        Ok(Some(df))
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}
