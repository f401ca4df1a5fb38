//! Per-session filter state and the location selection state machine.
//!
//! Transitions are pure functions on [`Selection`]; [`SelectionState`] owns the
//! current value and applies user actions one at a time.

use crate::taxonomy::ALL_HEALTH_CONDITIONS;
use crate::types::{
    AgeGroup, BreakdownDimension, ColorScale, Filters, Measure, Metric, RankingOrder, Sex,
};

/// A click on a map location. `shift` accumulates instead of replacing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickEvent {
    pub location: String,
    pub shift: bool,
}

impl ClickEvent {
    pub fn plain(location: &str) -> Self {
        Self {
            location: location.to_string(),
            shift: false,
        }
    }

    pub fn shift(location: &str) -> Self {
        Self {
            location: location.to_string(),
            shift: true,
        }
    }
}

/// Locations picked by clicking. `Multi` keeps insertion order and never holds
/// duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    None,
    Single(String),
    Multi(Vec<String>),
}

impl Selection {
    pub fn on_click(&self, event: &ClickEvent) -> Selection {
        if !event.shift {
            return Selection::Single(event.location.clone());
        }
        match self {
            Selection::None => Selection::Single(event.location.clone()),
            Selection::Single(current) if *current == event.location => self.clone(),
            Selection::Single(current) => {
                Selection::Multi(vec![current.clone(), event.location.clone()])
            }
            Selection::Multi(locations) if locations.contains(&event.location) => self.clone(),
            Selection::Multi(locations) => {
                let mut accumulated = locations.clone();
                accumulated.push(event.location.clone());
                Selection::Multi(accumulated)
            }
        }
    }

    pub fn locations(&self) -> Vec<String> {
        match self {
            Selection::None => Vec::new(),
            Selection::Single(location) => vec![location.clone()],
            Selection::Multi(locations) => locations.clone(),
        }
    }
}

/// A dropdown or toggle change.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Measure(Measure),
    Metric(Metric),
    HealthCondition(String),
    AgeGroup(AgeGroup),
    Sex(Sex),
    Year(i32),
    ColorScale(ColorScale),
    Shs(bool),
    Breakdown(BreakdownDimension),
    RankingOrder(RankingOrder),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionState {
    pub measure: Measure,
    pub metric: Metric,
    pub health_condition: String,
    pub age_group: AgeGroup,
    pub sex: Sex,
    pub year: i32,
    pub color_scale: ColorScale,
    pub shs: bool,
    pub breakdown: BreakdownDimension,
    pub ranking_order: RankingOrder,
    selection: Selection,
    last_click: Option<ClickEvent>,
    latest_year: i32,
}

impl SelectionState {
    /// Session-start defaults. `latest_year` is the most recent year in the data.
    pub fn new(latest_year: i32) -> Self {
        Self {
            measure: Measure::Prevalence,
            metric: Metric::Rate,
            health_condition: ALL_HEALTH_CONDITIONS.to_string(),
            age_group: AgeGroup::AGE_STANDARDIZED,
            sex: Sex::Both,
            year: latest_year,
            color_scale: ColorScale::Linear,
            shs: false,
            breakdown: BreakdownDimension::Continent,
            ranking_order: RankingOrder::Top20,
            selection: Selection::None,
            last_click: None,
            latest_year,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.latest_year);
    }

    /// Applies a control change. Returns whether anything changed.
    pub fn apply(&mut self, control: Control) -> bool {
        let before = self.clone();
        match control {
            Control::Measure(measure) => self.measure = measure,
            Control::Metric(metric) => self.metric = metric,
            Control::HealthCondition(label) => self.health_condition = label,
            Control::AgeGroup(age_group) => self.age_group = age_group,
            Control::Sex(sex) => self.sex = sex,
            Control::Year(year) => self.year = year,
            Control::ColorScale(scale) => self.color_scale = scale,
            Control::Shs(shs) => self.shs = shs,
            Control::Breakdown(dimension) => self.breakdown = dimension,
            Control::RankingOrder(order) => self.ranking_order = order,
        }
        *self != before
    }

    /// Feeds a click through the state machine. A click identical to the last
    /// processed one is dropped. Returns whether the selection changed.
    pub fn click(&mut self, event: ClickEvent) -> bool {
        if self.last_click.as_ref() == Some(&event) {
            log::debug!("Ignoring repeated click on '{}'", event.location);
            return false;
        }
        let next = self.selection.on_click(&event);
        self.last_click = Some(event);
        if next == self.selection {
            return false;
        }
        self.selection = next;
        true
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Locations dependent views should use. With nothing selected this is the
    /// externally supplied default location.
    pub fn effective_locations(&self, default_location: &str) -> Vec<String> {
        match self.selection {
            Selection::None => vec![default_location.to_string()],
            _ => self.selection.locations(),
        }
    }

    pub fn filters(&self) -> Filters {
        Filters {
            measure: self.measure,
            metric: self.metric,
            health_condition: self.health_condition.clone(),
            age_group: self.age_group,
            sex: self.sex,
            year: self.year,
            shs: self.shs,
        }
    }
}
