// ========================================================================================
//
//                          Geographic Reference Downloader
//
// ========================================================================================

use super::reference::{GeoError, GeoReference};
use dwldutil::{DLFile, Downloader};
use indicatif::ProgressStyle;
use std::fs;
use std::path::Path;

/// Loads the geographic reference from `cache_path`, fetching it from
/// `source_url` first when the cache does not exist yet. Without a cache or a
/// URL there is nothing to load.
///
/// The fetched file is kept in place, so later sessions start from the cache.
pub fn load_or_fetch(
    cache_path: &Path,
    source_url: Option<&str>,
) -> Result<GeoReference, GeoError> {
    if cache_path.exists() {
        log::debug!(
            "Using cached geographic reference at '{}'",
            cache_path.display()
        );
        return GeoReference::load(cache_path);
    }

    let Some(source_url) = source_url else {
        return Err(GeoError::Download(format!(
            "no cache at '{}' and no source URL configured",
            cache_path.display()
        )));
    };

    if let Some(parent) = cache_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| GeoError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    log::info!("Fetching geographic reference from {source_url}");
    fetch(cache_path, source_url)?;

    if !cache_path.exists() {
        return Err(GeoError::Download(format!(
            "'{source_url}' produced no file at '{}'",
            cache_path.display()
        )));
    }
    GeoReference::load(cache_path)
}

fn fetch(target: &Path, url: &str) -> Result<(), GeoError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(GeoError::RuntimeCreation)?;

    runtime.block_on(async {
        let file = DLFile::new()
            .with_url(url)
            .with_path(&target.to_string_lossy());

        // Spinner only; the reference server does not always send a length.
        let style = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
            .map_err(|e| GeoError::Download(e.to_string()))?
            .progress_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

        Downloader::new()
            .add_file(file)
            .with_style(style)
            .with_max_redirections(5)
            .start();

        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn existing_cache_is_used_without_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("geo.tsv");
        let mut file = fs::File::create(&cache).unwrap();
        writeln!(file, "location_name\tiso3\tlatitude\tlongitude").unwrap();
        writeln!(file, "Peru\tPER\t-9.19\t-75.0").unwrap();
        drop(file);

        // The URL is unreachable on purpose; a fetch attempt would fail the test.
        let reference = load_or_fetch(&cache, Some("http://invalid.localhost/geo.tsv")).unwrap();
        assert_eq!(reference.lookup("Peru").unwrap().iso3, "PER");
    }

    #[test]
    fn missing_cache_without_url_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("absent.tsv");
        assert!(matches!(
            load_or_fetch(&cache, None),
            Err(GeoError::Download(_))
        ));
    }
}
