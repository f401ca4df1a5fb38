//! # User Sessions
//!
//! A [`Session`] is one user's view of the dashboard: the filter and selection
//! state plus one memo slot per query operation. Every operation recomputes
//! only when the inputs it reads have changed since its last call; everything
//! else is served from the slot. Sessions never share mutable state, so any
//! number of them can run over the same [`Dashboard`] concurrently.

pub mod memo;
pub mod selection;

pub use memo::Memo;
pub use selection::{ClickEvent, Control, Selection, SelectionState};

use std::sync::Arc;

use crate::query::{
    BreakdownPoint, Dashboard, HierarchyNode, HistoricalPoint, LocationValue, QueryError,
};
use crate::types::{BreakdownDimension, QueryKey, RankingOrder, parse_year};

/// Year used when the fact table is empty and has no latest year.
pub const FALLBACK_YEAR: i32 = 2021;

/// Inputs of the historical view: the year-free query key plus the effective
/// location set.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesKey {
    pub query: QueryKey,
    pub locations: Vec<String>,
}

#[derive(Default)]
struct Slots {
    map: Memo<QueryKey, Vec<LocationValue>>,
    historical: Memo<SeriesKey, Vec<HistoricalPoint>>,
    ranking: Memo<(QueryKey, RankingOrder), Vec<LocationValue>>,
    hierarchy: Memo<QueryKey, Vec<HierarchyNode>>,
    breakdown: Memo<(QueryKey, BreakdownDimension), Vec<BreakdownPoint>>,
    table: Memo<QueryKey, Vec<LocationValue>>,
}

/// How often each operation has gone to the store in this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Recomputations {
    pub map: usize,
    pub historical: usize,
    pub ranking: usize,
    pub hierarchy: usize,
    pub breakdown: usize,
    pub table: usize,
}

pub struct Session {
    dashboard: Dashboard,
    state: SelectionState,
    default_location: String,
    slots: Slots,
}

impl Session {
    /// Opens a session with the documented defaults. The default year is the
    /// latest one present in the data.
    pub fn start(dashboard: Dashboard, default_location: &str) -> Result<Self, QueryError> {
        let latest_year = match dashboard.latest_year()? {
            Some(year) => year,
            None => {
                log::warn!("Fact table has no years; defaulting to {FALLBACK_YEAR}");
                FALLBACK_YEAR
            }
        };
        log::info!("Session started (year {latest_year}, default location '{default_location}')");
        Ok(Self {
            dashboard,
            state: SelectionState::new(latest_year),
            default_location: default_location.to_string(),
            slots: Slots::default(),
        })
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn default_location(&self) -> &str {
        &self.default_location
    }

    pub fn apply(&mut self, control: Control) -> bool {
        self.state.apply(control)
    }

    /// Sets the year from raw user input, rejecting anything that is not a
    /// plausible year before it can reach a query.
    pub fn set_year(&mut self, raw: &str) -> Result<bool, QueryError> {
        let year = parse_year(raw)?;
        Ok(self.state.apply(Control::Year(year)))
    }

    pub fn click(&mut self, event: ClickEvent) -> bool {
        self.state.click(event)
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }

    /// Drops every cached result.
    pub fn invalidate(&mut self) {
        self.slots.map.invalidate();
        self.slots.historical.invalidate();
        self.slots.ranking.invalidate();
        self.slots.hierarchy.invalidate();
        self.slots.breakdown.invalidate();
        self.slots.table.invalidate();
    }

    pub fn recomputations(&self) -> Recomputations {
        Recomputations {
            map: self.slots.map.computations(),
            historical: self.slots.historical.computations(),
            ranking: self.slots.ranking.computations(),
            hierarchy: self.slots.hierarchy.computations(),
            breakdown: self.slots.breakdown.computations(),
            table: self.slots.table.computations(),
        }
    }

    pub fn map_data(&mut self) -> Result<Arc<Vec<LocationValue>>, QueryError> {
        let filters = self.state.filters();
        let dashboard = &self.dashboard;
        self.slots
            .map
            .get_or_try_compute(filters.query_key(), |_| dashboard.map_data(&filters))
    }

    pub fn historical_data(&mut self) -> Result<Arc<Vec<HistoricalPoint>>, QueryError> {
        let filters = self.state.filters();
        let key = SeriesKey {
            query: filters.series_key(),
            locations: self.state.effective_locations(&self.default_location),
        };
        let dashboard = &self.dashboard;
        self.slots.historical.get_or_try_compute(key, |key| {
            dashboard.historical_data(&filters, &key.locations)
        })
    }

    pub fn ranking_data(&mut self) -> Result<Arc<Vec<LocationValue>>, QueryError> {
        let filters = self.state.filters();
        let key = (filters.query_key(), self.state.ranking_order);
        let dashboard = &self.dashboard;
        self.slots
            .ranking
            .get_or_try_compute(key, |(_, order)| dashboard.ranking_data(&filters, *order))
    }

    pub fn hierarchical_data(&mut self) -> Result<Arc<Vec<HierarchyNode>>, QueryError> {
        let filters = self.state.filters();
        let dashboard = &self.dashboard;
        self.slots
            .hierarchy
            .get_or_try_compute(filters.query_key(), |_| {
                dashboard.hierarchical_data(&filters)
            })
    }

    pub fn breakdown_data(&mut self) -> Result<Arc<Vec<BreakdownPoint>>, QueryError> {
        let filters = self.state.filters();
        let key = (filters.query_key(), self.state.breakdown);
        let dashboard = &self.dashboard;
        self.slots
            .breakdown
            .get_or_try_compute(key, |(_, dimension)| {
                dashboard.breakdown_data(&filters, *dimension)
            })
    }

    pub fn table_data(&mut self) -> Result<Arc<Vec<LocationValue>>, QueryError> {
        let filters = self.state.filters();
        let dashboard = &self.dashboard;
        self.slots
            .table
            .get_or_try_compute(filters.query_key(), |_| dashboard.table_data(&filters))
    }
}
