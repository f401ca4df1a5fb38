//! # Geographic Reference
//!
//! Location names in the fact table are display names. Drawing a choropleth
//! needs stable ISO3 codes and centroids, which live in a separate
//! tab-separated reference that is cached on disk.

pub mod download;
pub mod reference;

pub use download::load_or_fetch;
pub use reference::{GeoEntry, GeoError, GeoReference};
