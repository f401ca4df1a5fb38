//! What a visual renders for a query outcome.
//!
//! Empty results and store failures look alike at the row level, so they are
//! split here: `NoData` draws the placeholder, `Failed` draws an explicit error
//! indicator.

use std::sync::Arc;

use crate::query::QueryError;

pub const NO_DATA_MESSAGE: &str = "No data available";

#[derive(Debug, Clone, PartialEq)]
pub enum Panel<T> {
    Rows(Arc<Vec<T>>),
    NoData,
    Failed(String),
}

impl<T> Panel<T> {
    pub fn from_result(result: Result<Vec<T>, QueryError>) -> Self {
        Self::from_shared(result.map(Arc::new))
    }

    pub fn from_shared(result: Result<Arc<Vec<T>>, QueryError>) -> Self {
        match result {
            Ok(rows) if rows.is_empty() => Panel::NoData,
            Ok(rows) => Panel::Rows(rows),
            Err(err) => {
                log::warn!("Query failed: {err}");
                Panel::Failed(err.to_string())
            }
        }
    }

    /// The text shown instead of a visual, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            Panel::Rows(_) => None,
            Panel::NoData => Some(NO_DATA_MESSAGE),
            Panel::Failed(message) => Some(message.as_str()),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Panel::Failed(_))
    }
}
