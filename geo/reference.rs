//! Display location names mapped to ISO3 codes and centroid coordinates.
//!
//! The reference is read once from a tab-separated cache with the columns
//! `location_name`, `iso3`, `latitude`, `longitude` and is immutable afterwards.

use ahash::AHashMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::query::LocationValue;

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Error, Debug)]
pub enum GeoError {
    #[error("I/O error for '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Malformed geographic reference '{}': {source}", path.display())]
    Parse { path: PathBuf, source: csv::Error },
    #[error("Geographic reference download failed: {0}")]
    Download(String),
    #[error("Failed to create async runtime: {0}")]
    RuntimeCreation(std::io::Error),
    #[error("Geographic reference '{}' contains no locations", .0.display())]
    Empty(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeoEntry {
    pub location_name: String,
    pub iso3: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Default)]
pub struct GeoReference {
    by_name: AHashMap<String, GeoEntry>,
}

impl GeoReference {
    pub fn load(path: &Path) -> Result<Self, GeoError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_path(path)
            .map_err(|source| GeoError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut by_name = AHashMap::new();
        for record in reader.deserialize::<GeoEntry>() {
            let entry = record.map_err(|source| GeoError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
            by_name.insert(entry.location_name.clone(), entry);
        }

        if by_name.is_empty() {
            return Err(GeoError::Empty(path.to_path_buf()));
        }
        log::info!(
            "Loaded {} locations from geographic reference '{}'",
            by_name.len(),
            path.display()
        );
        Ok(Self { by_name })
    }

    pub fn from_entries(entries: Vec<GeoEntry>) -> Self {
        Self {
            by_name: entries
                .into_iter()
                .map(|entry| (entry.location_name.clone(), entry))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn lookup(&self, location_name: &str) -> Option<&GeoEntry> {
        self.by_name.get(location_name)
    }

    /// The location whose centroid is closest to the given point, by
    /// great-circle distance. Ties resolve to the alphabetically first name.
    pub fn nearest(&self, latitude: f64, longitude: f64) -> Option<&GeoEntry> {
        self.by_name.values().min_by(|a, b| {
            let da = haversine_km(latitude, longitude, a.latitude, a.longitude);
            let db = haversine_km(latitude, longitude, b.latitude, b.longitude);
            da.total_cmp(&db)
                .then_with(|| a.location_name.cmp(&b.location_name))
        })
    }

    /// Pairs each map row with its ISO3 code when the location is known.
    pub fn annotate<'a>(&self, rows: &'a [LocationValue]) -> Vec<(&'a LocationValue, Option<&str>)> {
        rows.iter()
            .map(|row| {
                let iso3 = self
                    .lookup(&row.location_name)
                    .map(|entry| entry.iso3.as_str());
                (row, iso3)
            })
            .collect()
    }
}

fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn entry(name: &str, iso3: &str, latitude: f64, longitude: f64) -> GeoEntry {
        GeoEntry {
            location_name: name.to_string(),
            iso3: iso3.to_string(),
            latitude,
            longitude,
        }
    }

    #[test]
    fn load_reads_tab_separated_cache() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "location_name\tiso3\tlatitude\tlongitude").unwrap();
        writeln!(file, "Kenya\tKEN\t0.17\t37.9").unwrap();
        writeln!(file, "Cote d'Ivoire\tCIV\t7.54\t-5.55").unwrap();
        file.flush().unwrap();

        let reference = GeoReference::load(file.path()).unwrap();
        assert_eq!(reference.len(), 2);
        assert_eq!(reference.lookup("Cote d'Ivoire").unwrap().iso3, "CIV");
        assert!(reference.lookup("Atlantis").is_none());
    }

    #[test]
    fn header_only_cache_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "location_name\tiso3\tlatitude\tlongitude").unwrap();
        file.flush().unwrap();
        assert!(matches!(
            GeoReference::load(file.path()),
            Err(GeoError::Empty(_))
        ));
    }

    #[test]
    fn nearest_picks_the_closest_centroid() {
        let reference = GeoReference::from_entries(vec![
            entry("Kenya", "KEN", 0.17, 37.9),
            entry("Peru", "PER", -9.19, -75.0),
            entry("Norway", "NOR", 60.47, 8.47),
        ]);
        assert_eq!(reference.nearest(-1.29, 36.82).unwrap().iso3, "KEN");
        assert_eq!(reference.nearest(59.9, 10.75).unwrap().iso3, "NOR");
        assert!(GeoReference::default().nearest(0.0, 0.0).is_none());
    }

    #[test]
    fn haversine_matches_a_known_distance() {
        // London to Paris is roughly 344 km.
        assert_abs_diff_eq!(haversine_km(51.5074, -0.1278, 48.8566, 2.3522), 343.5, epsilon = 1.0);
    }

    #[test]
    fn annotate_attaches_iso_codes() {
        let reference = GeoReference::from_entries(vec![entry("Kenya", "KEN", 0.17, 37.9)]);
        let rows = vec![
            LocationValue {
                location_name: "Kenya".to_string(),
                value: 1.0,
            },
            LocationValue {
                location_name: "Atlantis".to_string(),
                value: 2.0,
            },
        ];
        let annotated = reference.annotate(&rows);
        assert_eq!(annotated[0].1, Some("KEN"));
        assert_eq!(annotated[1].1, None);
    }
}
