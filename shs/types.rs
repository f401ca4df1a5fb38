// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// Filter vocabulary shared by the query layer, the session and the binary.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::taxonomy;

/// Rejections raised while turning raw user input into typed filters. Nothing that
/// fails here ever reaches a generated query.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Unknown measure '{0}'. Expected one of: Deaths, Prevalence, Incidence.")]
    UnknownMeasure(String),
    #[error("Unknown metric '{0}'. Expected one of: Number, Rate.")]
    UnknownMetric(String),
    #[error("Unknown sex '{0}'. Expected one of: Both, Male, Female.")]
    UnknownSex(String),
    #[error("Unknown age group '{0}'. Use one of the published age bands.")]
    UnknownAgeGroup(String),
    #[error("Unknown breakdown dimension '{0}'. Expected continent, region, subregion or income_group.")]
    UnknownDimension(String),
    #[error("Unknown ranking order '{0}'. Expected top_20 or bottom_20.")]
    UnknownOrder(String),
    #[error("Unknown color scale '{0}'. Expected linear or log.")]
    UnknownScale(String),
    #[error("Year '{0}' is not a whole number.")]
    NonNumericYear(String),
    #[error("Year {year} is outside the supported range {min}..={max}.")]
    YearOutOfRange { year: i32, min: i32, max: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Measure {
    Deaths,
    Prevalence,
    Incidence,
}

impl Measure {
    pub fn as_str(self) -> &'static str {
        match self {
            Measure::Deaths => "Deaths",
            Measure::Prevalence => "Prevalence",
            Measure::Incidence => "Incidence",
        }
    }
}

impl FromStr for Measure {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Deaths" => Ok(Measure::Deaths),
            "Prevalence" => Ok(Measure::Prevalence),
            "Incidence" => Ok(Measure::Incidence),
            other => Err(FilterError::UnknownMeasure(other.to_string())),
        }
    }
}

/// `Number` is an absolute count, `Rate` is per 100,000 population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Number,
    Rate,
}

impl Metric {
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Number => "Number",
            Metric::Rate => "Rate",
        }
    }
}

impl FromStr for Metric {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Number" => Ok(Metric::Number),
            "Rate" => Ok(Metric::Rate),
            other => Err(FilterError::UnknownMetric(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sex {
    Both,
    Male,
    Female,
}

impl Sex {
    pub fn as_str(self) -> &'static str {
        match self {
            Sex::Both => "Both",
            Sex::Male => "Male",
            Sex::Female => "Female",
        }
    }
}

impl FromStr for Sex {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Both" => Ok(Sex::Both),
            "Male" => Ok(Sex::Male),
            "Female" => Ok(Sex::Female),
            other => Err(FilterError::UnknownSex(other.to_string())),
        }
    }
}

/// One of the 23 published IHME age bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AgeGroup {
    pub id: i64,
    pub name: &'static str,
}

impl AgeGroup {
    pub const ALL_AGES: AgeGroup = AgeGroup {
        id: 22,
        name: "All ages",
    };
    pub const AGE_STANDARDIZED: AgeGroup = AgeGroup {
        id: 27,
        name: "Age-standardized",
    };

    pub fn published() -> &'static [AgeGroup] {
        &AGE_BANDS
    }
}

impl FromStr for AgeGroup {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        AGE_BANDS
            .iter()
            .copied()
            .find(|band| band.name == wanted)
            .ok_or_else(|| FilterError::UnknownAgeGroup(wanted.to_string()))
    }
}

impl fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

const fn band(id: i64, name: &'static str) -> AgeGroup {
    AgeGroup { id, name }
}

static AGE_BANDS: [AgeGroup; 23] = [
    AgeGroup::ALL_AGES,
    AgeGroup::AGE_STANDARDIZED,
    band(28, "<1 year"),
    band(5, "1-4 years"),
    band(6, "5-9 years"),
    band(7, "10-14 years"),
    band(8, "15-19 years"),
    band(9, "20-24 years"),
    band(10, "25-29 years"),
    band(11, "30-34 years"),
    band(12, "35-39 years"),
    band(13, "40-44 years"),
    band(14, "45-49 years"),
    band(15, "50-54 years"),
    band(16, "55-59 years"),
    band(17, "60-64 years"),
    band(18, "65-69 years"),
    band(19, "70-74 years"),
    band(20, "75-79 years"),
    band(30, "80-84 years"),
    band(31, "85-89 years"),
    band(32, "90-94 years"),
    band(235, "95+ years"),
];

/// The categorical axis used to group locations in the bubble view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakdownDimension {
    Continent,
    Region,
    Subregion,
    IncomeGroup,
}

impl BreakdownDimension {
    /// The fact-table column holding this dimension.
    pub fn column(self) -> &'static str {
        match self {
            BreakdownDimension::Continent => "continent",
            BreakdownDimension::Region => "region",
            BreakdownDimension::Subregion => "subregion",
            BreakdownDimension::IncomeGroup => "income_group",
        }
    }
}

impl FromStr for BreakdownDimension {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continent" => Ok(BreakdownDimension::Continent),
            "region" => Ok(BreakdownDimension::Region),
            "subregion" => Ok(BreakdownDimension::Subregion),
            "income_group" | "income" => Ok(BreakdownDimension::IncomeGroup),
            other => Err(FilterError::UnknownDimension(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RankingOrder {
    Top20,
    Bottom20,
}

impl FromStr for RankingOrder {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "top_20" | "top" => Ok(RankingOrder::Top20),
            "bottom_20" | "bottom" => Ok(RankingOrder::Bottom20),
            other => Err(FilterError::UnknownOrder(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorScale {
    Linear,
    Log,
}

impl ColorScale {
    /// Maps a value onto the scale. Non-positive values have no position on a log
    /// scale and come back as `None`.
    pub fn apply(self, value: f64) -> Option<f64> {
        match self {
            ColorScale::Linear => Some(value),
            ColorScale::Log if value > 0.0 => Some(value.log10()),
            ColorScale::Log => None,
        }
    }
}

impl FromStr for ColorScale {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(ColorScale::Linear),
            "log" => Ok(ColorScale::Log),
            other => Err(FilterError::UnknownScale(other.to_string())),
        }
    }
}

pub const MIN_YEAR: i32 = 1950;
pub const MAX_YEAR: i32 = 2100;

pub fn parse_year(raw: &str) -> Result<i32, FilterError> {
    let trimmed = raw.trim();
    let year = trimmed
        .parse::<i32>()
        .map_err(|_| FilterError::NonNumericYear(trimmed.to_string()))?;
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(FilterError::YearOutOfRange {
            year,
            min: MIN_YEAR,
            max: MAX_YEAR,
        });
    }
    Ok(year)
}

/// The filter tuple every query operation reads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Filters {
    pub measure: Measure,
    pub metric: Metric,
    pub health_condition: String,
    pub age_group: AgeGroup,
    pub sex: Sex,
    pub year: i32,
    pub shs: bool,
}

impl Filters {
    /// Age standardization only exists for rates, so counts fall back to all ages.
    pub fn effective_age_group(&self) -> AgeGroup {
        if self.metric == Metric::Number && self.age_group == AgeGroup::AGE_STANDARDIZED {
            AgeGroup::ALL_AGES
        } else {
            self.age_group
        }
    }

    /// Elementary causes this filter selects. In SHS mode anything without a
    /// coefficient is dropped.
    pub fn causes(&self) -> Vec<String> {
        let mut expanded = taxonomy::expand(&self.health_condition, self.shs);
        if self.shs {
            expanded.retain(|cause| taxonomy::is_shs_eligible(cause));
        }
        expanded
    }

    /// The inputs a single-year query actually reads.
    pub fn query_key(&self) -> QueryKey {
        QueryKey {
            year: Some(self.year),
            ..self.series_key()
        }
    }

    /// The inputs a query over every year reads.
    pub fn series_key(&self) -> QueryKey {
        QueryKey {
            measure: (!self.shs).then_some(self.measure),
            metric: self.metric,
            health_condition: self.health_condition.clone(),
            age_group: self.effective_age_group(),
            sex: self.sex,
            year: None,
            shs: self.shs,
        }
    }
}

/// [`Filters`] reduced to what reaches the store: the measure is absent in SHS
/// mode, the age band is the effective one, and the year is absent for
/// multi-year queries. Equal keys always yield equal results.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub measure: Option<Measure>,
    pub metric: Metric,
    pub health_condition: String,
    pub age_group: AgeGroup,
    pub sex: Sex,
    pub year: Option<i32>,
    pub shs: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters(metric: Metric, age_group: AgeGroup) -> Filters {
        Filters {
            measure: Measure::Prevalence,
            metric,
            health_condition: taxonomy::ALL_HEALTH_CONDITIONS.to_string(),
            age_group,
            sex: Sex::Both,
            year: 2019,
            shs: false,
        }
    }

    #[test]
    fn published_age_bands_are_unique() {
        let bands = AgeGroup::published();
        assert_eq!(bands.len(), 23);
        for (i, a) in bands.iter().enumerate() {
            for b in &bands[i + 1..] {
                assert_ne!(a.id, b.id);
                assert_ne!(a.name, b.name);
            }
        }
    }

    #[test]
    fn age_standardized_counts_fall_back_to_all_ages() {
        let counts = filters(Metric::Number, AgeGroup::AGE_STANDARDIZED);
        assert_eq!(counts.effective_age_group(), AgeGroup::ALL_AGES);

        let rates = filters(Metric::Rate, AgeGroup::AGE_STANDARDIZED);
        assert_eq!(rates.effective_age_group(), AgeGroup::AGE_STANDARDIZED);

        let infants: AgeGroup = "<1 year".parse().unwrap();
        assert_eq!(filters(Metric::Number, infants).effective_age_group(), infants);
    }

    #[test]
    fn query_keys_ignore_inputs_the_store_never_sees() {
        let mut shs = filters(Metric::Rate, AgeGroup::AGE_STANDARDIZED);
        shs.shs = true;
        let mut deaths = shs.clone();
        deaths.measure = Measure::Deaths;
        assert_eq!(shs.query_key(), deaths.query_key());
        assert_eq!(shs.query_key().measure, None);

        let plain = filters(Metric::Rate, AgeGroup::AGE_STANDARDIZED);
        let mut plain_deaths = plain.clone();
        plain_deaths.measure = Measure::Deaths;
        assert_ne!(plain.query_key(), plain_deaths.query_key());

        let standardized = filters(Metric::Number, AgeGroup::AGE_STANDARDIZED);
        let all_ages = filters(Metric::Number, AgeGroup::ALL_AGES);
        assert_eq!(standardized.query_key(), all_ages.query_key());

        let mut later = plain.clone();
        later.year = 2020;
        assert_ne!(plain.query_key(), later.query_key());
        assert_eq!(plain.series_key(), later.series_key());
    }

    #[test]
    fn malformed_years_are_rejected() {
        assert_eq!(parse_year(" 2019 ").unwrap(), 2019);
        assert_eq!(
            parse_year("2019'; DROP TABLE facts; --"),
            Err(FilterError::NonNumericYear(
                "2019'; DROP TABLE facts; --".to_string()
            ))
        );
        assert!(matches!(
            parse_year("1200"),
            Err(FilterError::YearOutOfRange { year: 1200, .. })
        ));
    }

    #[test]
    fn enumerated_inputs_parse_strictly() {
        assert_eq!("Deaths".parse::<Measure>().unwrap(), Measure::Deaths);
        assert!("deaths".parse::<Measure>().is_err());
        assert_eq!("Rate".parse::<Metric>().unwrap(), Metric::Rate);
        assert_eq!("Female".parse::<Sex>().unwrap(), Sex::Female);
        assert!("Unknown".parse::<AgeGroup>().is_err());
        assert_eq!(
            "income_group".parse::<BreakdownDimension>().unwrap(),
            BreakdownDimension::IncomeGroup
        );
        assert_eq!("bottom_20".parse::<RankingOrder>().unwrap(), RankingOrder::Bottom20);
    }

    #[test]
    fn log_scale_skips_non_positive_values() {
        assert_eq!(ColorScale::Linear.apply(-3.0), Some(-3.0));
        assert_eq!(ColorScale::Log.apply(1000.0), Some(3.0));
        assert_eq!(ColorScale::Log.apply(0.0), None);
    }

    #[test]
    fn shs_mode_drops_ineligible_causes() {
        let mut shs = filters(Metric::Rate, AgeGroup::AGE_STANDARDIZED);
        shs.shs = true;
        shs.health_condition = "Road injuries".to_string();
        assert!(shs.causes().is_empty());

        shs.shs = false;
        assert_eq!(shs.causes(), vec!["Road injuries".to_string()]);
    }
}
