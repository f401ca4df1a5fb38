//! # SHS Formula Engine
//!
//! Turns raw death / prevalence / incidence sums into the composite
//! "Serious Health-related Suffering" value.
//!
//! Every SHS-eligible cause has exactly one [`Coefficient`] in [`COEFFICIENTS`]:
//! a base rule choosing the source measure and divisor, and two multiplicative
//! factors which are either constant or tiered on the row's IHME `age_id`.
//! A single lookup+apply step ([`contribution`]) serves every query shape.
//! Causes without an entry contribute exactly zero.

use ahash::AHashMap;
use polars::prelude::*;

use crate::sql::{
    AggregationQuery, DEATHS_SUM, FactFilter, INCIDENCE_SUM, PREVALENCE_SUM, VALUE,
};
use crate::store::{FactStore, StoreError, float_values, int_values, string_values};
use crate::types::{AgeGroup, Metric, Sex};

/// How a cause's base value is derived from the per-measure sums.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BaseRule {
    DeathsThird,
    PrevalenceThird,
    /// `incidence - deaths / 6`
    IncidenceLessDeathsSixth,
    DeathsSixth,
    DeathsNinth,
}

impl BaseRule {
    pub fn apply(self, sums: &MeasureSums) -> f64 {
        match self {
            BaseRule::DeathsThird => sums.deaths / 3.0,
            BaseRule::PrevalenceThird => sums.prevalence / 3.0,
            BaseRule::IncidenceLessDeathsSixth => sums.incidence - sums.deaths / 6.0,
            BaseRule::DeathsSixth => sums.deaths / 6.0,
            BaseRule::DeathsNinth => sums.deaths / 9.0,
        }
    }
}

/// Sets of IHME age ids that select the young tier of a [`Factor::Tiered`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeBucket {
    /// `<1 year` and `1-4 years`.
    UnderFive,
    /// Every band below twenty years.
    UnderTwenty,
}

impl AgeBucket {
    pub fn age_ids(self) -> &'static [i64] {
        match self {
            AgeBucket::UnderFive => &[28, 5],
            AgeBucket::UnderTwenty => &[28, 5, 6, 7, 8],
        }
    }

    pub fn contains(self, age_id: i64) -> bool {
        self.age_ids().contains(&age_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Factor {
    Constant(f64),
    Tiered {
        bucket: AgeBucket,
        young: f64,
        other: f64,
    },
}

impl Factor {
    pub fn at(self, age_id: i64) -> f64 {
        match self {
            Factor::Constant(value) => value,
            Factor::Tiered {
                bucket,
                young,
                other,
            } => {
                if bucket.contains(age_id) {
                    young
                } else {
                    other
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficient {
    pub cause: &'static str,
    pub base: BaseRule,
    pub level_1: Factor,
    pub level_2: Factor,
}

/// Per-group sums of `val` split by measure. Absent measures are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeasureSums {
    pub deaths: f64,
    pub prevalence: f64,
    pub incidence: f64,
}

const fn entry(cause: &'static str, base: BaseRule, level_1: Factor, level_2: Factor) -> Coefficient {
    Coefficient {
        cause,
        base,
        level_1,
        level_2,
    }
}

const fn constant(value: f64) -> Factor {
    Factor::Constant(value)
}

const fn tiered(bucket: AgeBucket, young: f64, other: f64) -> Factor {
    Factor::Tiered {
        bucket,
        young,
        other,
    }
}

const ONE: Factor = Factor::Constant(1.0);
const KIDNEY_LEVEL_2: Factor = tiered(AgeBucket::UnderTwenty, 3.0, 0.9);
const LIVER_LEVEL_2: Factor = tiered(AgeBucket::UnderTwenty, 0.95, 1.55);

pub static COEFFICIENTS: [Coefficient; 27] = [
    entry("HIV/AIDS", BaseRule::PrevalenceThird, constant(0.5), constant(0.5)),
    entry(
        "Drug-susceptible tuberculosis",
        BaseRule::IncidenceLessDeathsSixth,
        constant(0.45),
        constant(0.8),
    ),
    entry(
        "Multidrug-resistant tuberculosis without extensive drug resistance",
        BaseRule::IncidenceLessDeathsSixth,
        constant(0.6),
        constant(0.8),
    ),
    entry(
        "Extensively drug-resistant tuberculosis",
        BaseRule::IncidenceLessDeathsSixth,
        constant(0.75),
        constant(0.8),
    ),
    entry("Ischemic stroke", BaseRule::DeathsSixth, constant(0.65), constant(1.5)),
    entry("Intracerebral hemorrhage", BaseRule::DeathsSixth, constant(0.65), constant(1.5)),
    entry("Subarachnoid hemorrhage", BaseRule::DeathsSixth, constant(0.7), constant(1.5)),
    entry(
        "Cirrhosis and other chronic liver diseases",
        BaseRule::DeathsSixth,
        constant(0.6),
        LIVER_LEVEL_2,
    ),
    entry("Liver cancer", BaseRule::DeathsSixth, constant(0.8), LIVER_LEVEL_2),
    entry("Chronic kidney disease", BaseRule::DeathsNinth, constant(0.5), KIDNEY_LEVEL_2),
    entry("Acute glomerulonephritis", BaseRule::DeathsNinth, constant(0.4), KIDNEY_LEVEL_2),
    entry(
        "Alzheimer's disease and other dementias",
        BaseRule::PrevalenceThird,
        constant(0.45),
        ONE,
    ),
    entry(
        "Chronic obstructive pulmonary disease",
        BaseRule::DeathsThird,
        constant(0.9),
        ONE,
    ),
    entry("Congenital birth defects", BaseRule::DeathsThird, constant(0.36), ONE),
    entry("Neonatal preterm birth", BaseRule::DeathsThird, constant(0.35), ONE),
    entry(
        "Neonatal encephalopathy due to birth asphyxia and trauma",
        BaseRule::DeathsThird,
        tiered(AgeBucket::UnderFive, 0.7, 0.25),
        ONE,
    ),
    entry(
        "Sickle cell disorders",
        BaseRule::DeathsThird,
        tiered(AgeBucket::UnderFive, 0.9, 0.5),
        ONE,
    ),
    entry(
        "Thalassemias",
        BaseRule::DeathsThird,
        tiered(AgeBucket::UnderFive, 0.85, 0.45),
        ONE,
    ),
    entry("Protein-energy malnutrition", BaseRule::DeathsThird, constant(0.5), ONE),
    entry("Rheumatoid arthritis", BaseRule::PrevalenceThird, constant(0.25), ONE),
    entry("Parkinson's disease", BaseRule::PrevalenceThird, constant(0.35), ONE),
    entry("Multiple sclerosis", BaseRule::PrevalenceThird, constant(0.3), ONE),
    entry("Meningitis", BaseRule::DeathsThird, constant(0.6), ONE),
    entry("Ebola", BaseRule::DeathsThird, constant(0.85), ONE),
    entry(
        "Non-rheumatic valvular heart disease",
        BaseRule::DeathsThird,
        constant(0.55),
        ONE,
    ),
    entry("Leukemia", BaseRule::DeathsThird, constant(0.8), ONE),
    entry(
        "Tracheal, bronchus, and lung cancer",
        BaseRule::DeathsThird,
        constant(0.8),
        ONE,
    ),
];

/// Exact-match lookup by `cause_name`.
pub fn coefficient(cause: &str) -> Option<&'static Coefficient> {
    COEFFICIENTS.iter().find(|entry| entry.cause == cause)
}

/// The weighted SHS contribution of one (cause, age) group.
pub fn contribution(cause: &str, age_id: i64, sums: &MeasureSums) -> f64 {
    match coefficient(cause) {
        Some(entry) => entry.base.apply(sums) * entry.level_1.at(age_id) * entry.level_2.at(age_id),
        None => 0.0,
    }
}

/// Keys every SHS input query groups on, on top of the caller's own keys.
const SHS_INPUT_KEYS: [&str; 4] = ["location_name", "cause_name", "age_id", "income_group"];

/// Applies the coefficient table to a frame of per-measure sums and re-groups
/// the contributions by `keys`, producing `keys` plus a `value` column.
pub fn contributions_by(sums: DataFrame, keys: &[&'static str]) -> Result<DataFrame, StoreError> {
    let causes = string_values(&sums, "cause_name")?;
    let age_ids = int_values(&sums, "age_id")?;
    let deaths = float_values(&sums, DEATHS_SUM)?;
    let prevalence = float_values(&sums, PREVALENCE_SUM)?;
    let incidence = float_values(&sums, INCIDENCE_SUM)?;

    let values: Vec<f64> = causes
        .iter()
        .enumerate()
        .map(|(i, cause)| {
            let group_sums = MeasureSums {
                deaths: deaths[i],
                prevalence: prevalence[i],
                incidence: incidence[i],
            };
            contribution(cause, age_ids[i], &group_sums)
        })
        .collect();

    let mut weighted = sums;
    weighted.with_column(Column::new(VALUE.into(), values))?;

    let group_keys: Vec<Expr> = keys.iter().map(|key| col(*key)).collect();
    let grouped = weighted
        .lazy()
        .group_by(group_keys)
        .agg([col(VALUE).sum()])
        .collect()?;
    Ok(grouped)
}

/// Runs the SHS input aggregation restricted by `filter` and returns `keys`
/// plus a `value` column of weighted contributions. Causes without a
/// coefficient are dropped first; `None` when nothing remains to query.
pub fn weighted_sums(
    store: &dyn FactStore,
    filter: &FactFilter<'_>,
    keys: &[&'static str],
) -> Result<Option<DataFrame>, StoreError> {
    let eligible: Vec<String> = filter
        .causes
        .iter()
        .filter(|cause| coefficient(cause).is_some())
        .cloned()
        .collect();
    if eligible.is_empty() {
        return Ok(None);
    }
    let filter = FactFilter {
        causes: &eligible,
        ..*filter
    };

    let mut input_keys: Vec<&'static str> = SHS_INPUT_KEYS.to_vec();
    input_keys.extend_from_slice(keys);
    let query = AggregationQuery::measure_sums(&input_keys).restrict(&filter);
    let sums = store.execute(&query.to_sql())?;
    contributions_by(sums, keys).map(Some)
}

/// Computes the SHS value per location for the given causes and filters.
pub fn compute_shs(
    store: &dyn FactStore,
    causes: &[String],
    sex: Sex,
    year: i32,
    age_group: AgeGroup,
    metric: Metric,
) -> Result<AHashMap<String, f64>, StoreError> {
    let filter = FactFilter {
        causes,
        sex,
        age_group,
        metric,
        year: Some(year),
        locations: None,
    };
    let Some(per_location) = weighted_sums(store, &filter, &["location_name"])? else {
        return Ok(AHashMap::new());
    };
    let names = string_values(&per_location, "location_name")?;
    let values = float_values(&per_location, VALUE)?;
    Ok(names.into_iter().zip(values).collect())
}
