//! Builder for the grouped aggregation statements sent to the fact store.
//!
//! Only the shapes the query layer needs are expressible: a list of group keys,
//! equality / membership filters, and either a plain `SUM(val)` or the three
//! per-measure conditional sums the SHS formula consumes. Column names always
//! come from code; values are typed or quoted with [`quote_literal`].

use itertools::Itertools;

use crate::store::{FACT_TABLE, quote_list, quote_literal};
use crate::types::{AgeGroup, Measure, Metric, Sex};

/// Output column of a plain sum.
pub const VALUE: &str = "value";
pub const DEATHS_SUM: &str = "deaths_val";
pub const PREVALENCE_SUM: &str = "prev_val";
pub const INCIDENCE_SUM: &str = "inc_val";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Aggregate {
    Value,
    MeasureSums,
}

/// Row restrictions every aggregation applies before grouping.
#[derive(Debug, Clone, Copy)]
pub struct FactFilter<'a> {
    pub causes: &'a [String],
    pub sex: Sex,
    pub age_group: AgeGroup,
    pub metric: Metric,
    /// `None` spans every year.
    pub year: Option<i32>,
    pub locations: Option<&'a [String]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationQuery {
    keys: Vec<&'static str>,
    conditions: Vec<String>,
    aggregate: Aggregate,
}

impl AggregationQuery {
    /// `SUM(val) AS value`, grouped by `keys`.
    pub fn sum_of_values(keys: &[&'static str]) -> Self {
        Self::new(keys, Aggregate::Value)
    }

    /// `deaths_val`, `prev_val` and `inc_val` conditional sums, grouped by `keys`.
    pub fn measure_sums(keys: &[&'static str]) -> Self {
        Self::new(keys, Aggregate::MeasureSums)
    }

    fn new(keys: &[&'static str], aggregate: Aggregate) -> Self {
        Self {
            keys: keys.iter().copied().unique().collect(),
            conditions: Vec::new(),
            aggregate,
        }
    }

    pub fn filter_text(mut self, column: &'static str, value: &str) -> Self {
        self.conditions
            .push(format!("{column} = {}", quote_literal(value)));
        self
    }

    pub fn filter_int(mut self, column: &'static str, value: i64) -> Self {
        self.conditions.push(format!("{column} = {value}"));
        self
    }

    /// Restricts `column` to `values`. An empty list can never match, and the
    /// query layer short-circuits before building such a query.
    pub fn filter_in<S: AsRef<str>>(mut self, column: &'static str, values: &[S]) -> Self {
        self.conditions
            .push(format!("{column} IN ({})", quote_list(values)));
        self
    }

    /// Applies every restriction of `filter`.
    pub fn restrict(self, filter: &FactFilter<'_>) -> Self {
        let mut query = self
            .filter_in("cause_name", filter.causes)
            .filter_text("sex_name", filter.sex.as_str())
            .filter_int("age_id", filter.age_group.id)
            .filter_text("metric_name", filter.metric.as_str());
        if let Some(year) = filter.year {
            query = query.filter_int("year", i64::from(year));
        }
        if let Some(locations) = filter.locations {
            query = query.filter_in("location_name", locations);
        }
        query
    }

    pub fn keys(&self) -> &[&'static str] {
        &self.keys
    }

    pub fn to_sql(&self) -> String {
        let mut select: Vec<String> = self.keys.iter().map(|key| key.to_string()).collect();
        match self.aggregate {
            Aggregate::Value => select.push(format!("SUM(val) AS {VALUE}")),
            Aggregate::MeasureSums => {
                for (measure, alias) in [
                    (Measure::Deaths, DEATHS_SUM),
                    (Measure::Prevalence, PREVALENCE_SUM),
                    (Measure::Incidence, INCIDENCE_SUM),
                ] {
                    select.push(format!(
                        "SUM(CASE WHEN measure_name = {} THEN val ELSE 0.0 END) AS {alias}",
                        quote_literal(measure.as_str())
                    ));
                }
            }
        }

        let mut sql = format!("SELECT {} FROM {FACT_TABLE}", select.join(", "));
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }
        if !self.keys.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.keys.join(", "));
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_sum_statement_shape() {
        let sql = AggregationQuery::sum_of_values(&["location_name"])
            .filter_text("sex_name", "Both")
            .filter_int("year", 2019)
            .filter_in("cause_name", &["HIV/AIDS", "Ebola"])
            .to_sql();
        assert_eq!(
            sql,
            "SELECT location_name, SUM(val) AS value FROM facts \
             WHERE sex_name = 'Both' AND year = 2019 AND cause_name IN ('HIV/AIDS', 'Ebola') \
             GROUP BY location_name"
        );
    }

    #[test]
    fn measure_sums_use_conditional_aggregation() {
        let sql = AggregationQuery::measure_sums(&["location_name", "cause_name"]).to_sql();
        assert!(sql.contains(
            "SUM(CASE WHEN measure_name = 'Deaths' THEN val ELSE 0.0 END) AS deaths_val"
        ));
        assert!(sql.contains("AS prev_val"));
        assert!(sql.contains("AS inc_val"));
        assert!(sql.ends_with("GROUP BY location_name, cause_name"));
    }

    #[test]
    fn restrictions_cover_year_and_locations_only_when_set() {
        let causes = vec!["Ebola".to_string()];
        let locations = vec!["Chad".to_string(), "Peru".to_string()];
        let mut filter = FactFilter {
            causes: &causes,
            sex: Sex::Female,
            age_group: AgeGroup::ALL_AGES,
            metric: Metric::Number,
            year: None,
            locations: None,
        };

        let every_year = AggregationQuery::sum_of_values(&["year"])
            .restrict(&filter)
            .to_sql();
        assert!(every_year.contains(
            "WHERE cause_name IN ('Ebola') AND sex_name = 'Female' AND age_id = 22 \
             AND metric_name = 'Number' GROUP BY"
        ));

        filter.year = Some(2019);
        filter.locations = Some(&locations);
        let scoped = AggregationQuery::sum_of_values(&["year"])
            .restrict(&filter)
            .to_sql();
        assert!(scoped.contains("AND year = 2019 AND location_name IN ('Chad', 'Peru') GROUP BY"));
    }

    #[test]
    fn duplicate_keys_are_grouped_once() {
        let query = AggregationQuery::measure_sums(&[
            "location_name",
            "income_group",
            "cause_name",
            "income_group",
        ]);
        assert_eq!(query.keys(), &["location_name", "income_group", "cause_name"]);
    }

    #[test]
    fn quoted_values_cannot_escape_the_literal() {
        let sql = AggregationQuery::sum_of_values(&["location_name"])
            .filter_in("location_name", &["Cote d'Ivoire", "x') OR ('1'='1"])
            .to_sql();
        assert!(sql.contains("IN ('Cote d''Ivoire', 'x'') OR (''1''=''1')"));
    }
}
