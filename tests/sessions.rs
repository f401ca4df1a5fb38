use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use polars::prelude::DataFrame;
use shs_atlas::query::{Dashboard, QueryError};
use shs_atlas::session::{ClickEvent, Control, Selection, Session};
use shs_atlas::store::{FactStore, Observation, PolarsFactStore, StoreError};
use shs_atlas::types::{AgeGroup, FilterError, Measure, Metric, Sex};

/// Counts every query that reaches the store and can be switched into a
/// failing mode.
struct CountingStore {
    inner: PolarsFactStore,
    queries: AtomicUsize,
    failing: AtomicBool,
}

impl CountingStore {
    fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl FactStore for CountingStore {
    fn execute(&self, query: &str) -> Result<DataFrame, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".to_string()));
        }
        self.inner.execute(query)
    }
}

fn row(location: &str, year: i32, value: f64) -> Observation {
    Observation {
        location_id: 1,
        location_name: location.to_string(),
        year,
        age_group: AgeGroup::AGE_STANDARDIZED,
        sex: Sex::Both,
        cause_name: "HIV/AIDS".to_string(),
        measure: Measure::Prevalence,
        metric: Metric::Rate,
        value,
        income_group: "Low income".to_string(),
        continent: "Africa".to_string(),
        region: "Sub-Saharan Africa".to_string(),
        subregion: "Eastern Africa".to_string(),
    }
}

fn fixture() -> Vec<Observation> {
    vec![
        row("Kenya", 2018, 10.0),
        row("Kenya", 2019, 11.0),
        row("Chad", 2018, 20.0),
        row("Chad", 2019, 21.0),
        row("Peru", 2019, 30.0),
    ]
}

fn counting_session() -> (Session, Arc<CountingStore>) {
    let store = Arc::new(CountingStore {
        inner: PolarsFactStore::from_observations(&fixture()).unwrap(),
        queries: AtomicUsize::new(0),
        failing: AtomicBool::new(false),
    });
    let dashboard = Dashboard::new(store.clone());
    let session = Session::start(dashboard, "Peru").unwrap();
    (session, store)
}

#[test]
fn session_starts_on_the_latest_year() {
    let (session, _) = counting_session();
    assert_eq!(session.state().year, 2019);
    assert_eq!(session.state().measure, Measure::Prevalence);
    assert_eq!(session.state().age_group, AgeGroup::AGE_STANDARDIZED);
    assert_eq!(session.state().selection(), &Selection::None);
}

#[test]
fn unchanged_inputs_are_served_from_cache() {
    let (mut session, store) = counting_session();
    let before = store.queries();

    let first = session.map_data().unwrap();
    let second = session.map_data().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(store.queries(), before + 1);
    assert_eq!(first.len(), 3);

    session.apply(Control::Sex(Sex::Both));
    session.map_data().unwrap();
    assert_eq!(session.recomputations().map, 1);

    session.apply(Control::Year(2018));
    let earlier = session.map_data().unwrap();
    assert_eq!(session.recomputations().map, 2);
    assert_eq!(earlier.len(), 2);
}

#[test]
fn repeated_clicks_do_not_recompute_dependent_views() {
    let (mut session, store) = counting_session();

    assert!(session.click(ClickEvent::plain("Kenya")));
    let kenya = session.historical_data().unwrap();
    assert_eq!(kenya.len(), 2);
    let after_first = store.queries();

    assert!(!session.click(ClickEvent::plain("Kenya")));
    session.historical_data().unwrap();
    assert_eq!(store.queries(), after_first);
    assert_eq!(session.recomputations().historical, 1);

    assert!(session.click(ClickEvent::shift("Chad")));
    let both = session.historical_data().unwrap();
    assert_eq!(session.recomputations().historical, 2);
    let locations: Vec<&str> = both.iter().map(|p| p.location_name.as_str()).collect();
    assert_eq!(locations, vec!["Chad", "Chad", "Kenya", "Kenya"]);
}

#[test]
fn history_ignores_the_year_and_uses_the_default_location() {
    let (mut session, _) = counting_session();

    let default_view = session.historical_data().unwrap();
    assert_eq!(default_view.len(), 1);
    assert_eq!(default_view[0].location_name, "Peru");

    session.apply(Control::Year(2018));
    session.historical_data().unwrap();
    assert_eq!(session.recomputations().historical, 1);
}

#[test]
fn inputs_the_store_never_sees_do_not_recompute() {
    let (mut session, store) = counting_session();
    session.apply(Control::Shs(true));

    let weighted = session.map_data().unwrap();
    session.historical_data().unwrap();
    assert_eq!(weighted.len(), 3);
    let after_first = store.queries();

    // The SHS formula picks its own measures.
    session.apply(Control::Measure(Measure::Deaths));
    let same = session.map_data().unwrap();
    session.historical_data().unwrap();
    assert!(Arc::ptr_eq(&weighted, &same));
    assert_eq!(store.queries(), after_first);
    assert_eq!(session.recomputations().map, 1);
    assert_eq!(session.recomputations().historical, 1);

    // Counts are never age-standardized, so both bands run the same query.
    session.apply(Control::Metric(Metric::Number));
    session.table_data().unwrap();
    session.apply(Control::AgeGroup(AgeGroup::ALL_AGES));
    session.table_data().unwrap();
    assert_eq!(session.recomputations().table, 1);

    // Outside SHS mode the measure is read again.
    session.apply(Control::Shs(false));
    session.table_data().unwrap();
    session.apply(Control::Measure(Measure::Prevalence));
    session.table_data().unwrap();
    assert_eq!(session.recomputations().table, 3);
}

#[test]
fn every_view_is_memoized_independently() {
    let (mut session, _) = counting_session();
    for _ in 0..2 {
        session.ranking_data().unwrap();
        session.hierarchical_data().unwrap();
        session.breakdown_data().unwrap();
        session.table_data().unwrap();
    }
    let counts = session.recomputations();
    assert_eq!(
        (counts.ranking, counts.hierarchy, counts.breakdown, counts.table),
        (1, 1, 1, 1)
    );
    assert_eq!(counts.map, 0);

    session.invalidate();
    session.table_data().unwrap();
    assert_eq!(session.recomputations().table, 2);
}

#[test]
fn failed_queries_are_not_cached() {
    let (mut session, store) = counting_session();

    store.failing.store(true, Ordering::SeqCst);
    assert!(matches!(
        session.table_data(),
        Err(QueryError::Store(StoreError::Unavailable(_)))
    ));

    store.failing.store(false, Ordering::SeqCst);
    assert_eq!(session.table_data().unwrap().len(), 3);
    assert_eq!(session.recomputations().table, 2);
}

#[test]
fn invalid_years_are_rejected_before_querying() {
    let (mut session, store) = counting_session();
    let before = store.queries();

    assert!(matches!(
        session.set_year("20x9"),
        Err(QueryError::Filter(FilterError::NonNumericYear(_)))
    ));
    assert!(matches!(
        session.set_year("1066"),
        Err(QueryError::Filter(FilterError::YearOutOfRange { .. }))
    ));
    assert_eq!(session.state().year, 2019);
    assert_eq!(store.queries(), before);

    assert!(session.set_year(" 2018 ").unwrap());
    assert_eq!(session.state().year, 2018);
}

#[test]
fn reset_restores_defaults_but_keeps_the_cache_keyed_correctly() {
    let (mut session, _) = counting_session();
    session.map_data().unwrap();

    session.apply(Control::Measure(Measure::Deaths));
    session.click(ClickEvent::plain("Chad"));
    session.reset();

    assert_eq!(session.state().measure, Measure::Prevalence);
    assert_eq!(session.state().selection(), &Selection::None);
    session.map_data().unwrap();
    assert_eq!(session.recomputations().map, 1);
}

#[test]
fn sessions_run_concurrently_over_one_store() {
    let store: Arc<dyn FactStore> =
        Arc::new(PolarsFactStore::from_observations(&fixture()).unwrap());
    let dashboard = Dashboard::new(store);

    let totals: Vec<f64> = thread::scope(|scope| {
        let handles: Vec<_> = [2018, 2019]
            .into_iter()
            .map(|year| {
                let dashboard = dashboard.clone();
                scope.spawn(move || {
                    let mut session = Session::start(dashboard, "Kenya").unwrap();
                    session.apply(Control::Year(year));
                    session.map_data().unwrap().iter().map(|r| r.value).sum::<f64>()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(totals, vec![30.0, 62.0]);
}
