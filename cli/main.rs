#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::error::Error;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use shs_atlas::config::DashboardConfig;
use shs_atlas::geo::{self, GeoReference};
use shs_atlas::panel::Panel;
use shs_atlas::query::{Dashboard, LocationValue};
use shs_atlas::session::{ClickEvent, Control, Session};
use shs_atlas::store::PolarsFactStore;
use shs_atlas::taxonomy;
use shs_atlas::types::{
    AgeGroup, BreakdownDimension, ColorScale, Measure, Metric, RankingOrder, Sex, parse_year,
};

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Args)]
struct SourceArgs {
    /// TOML configuration file. Flags given on the command line take precedence.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Fact table (CSV, or TSV by extension)
    #[arg(long, value_name = "PATH")]
    data: Option<PathBuf>,

    /// Location shown by the historical view while nothing is selected
    #[arg(long, value_name = "NAME")]
    default_location: Option<String>,

    /// Derive the default location from a coordinate, as "LAT,LON"
    #[arg(long, value_name = "LAT,LON", value_parser = parse_coordinate, allow_hyphen_values = true)]
    near: Option<(f64, f64)>,
}

#[derive(Args)]
struct FilterArgs {
    /// Deaths, Prevalence or Incidence
    #[arg(long)]
    measure: Option<Measure>,

    /// Number or Rate
    #[arg(long)]
    metric: Option<Metric>,

    /// Group label or elementary cause
    #[arg(long, value_name = "LABEL")]
    condition: Option<String>,

    /// Published age band, e.g. "All ages" or "<1 year"
    #[arg(long)]
    age: Option<AgeGroup>,

    /// Both, Male or Female
    #[arg(long)]
    sex: Option<Sex>,

    #[arg(long, value_parser = parse_year)]
    year: Option<i32>,

    /// Report Serious Health-related Suffering instead of the raw measure
    #[arg(long)]
    shs: bool,

    /// Selected location. The first replaces the selection, later ones accumulate.
    #[arg(long = "location", value_name = "NAME")]
    locations: Vec<String>,
}

#[derive(Parser)]
#[command(
    name = "shs-atlas",
    about = "Query the global burden of serious health-related suffering",
    long_about = "Answers the dashboard's map, history, ranking, hierarchy, breakdown and table \
                 queries over an IHME-style fact table, optionally converted to SHS."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// One value per location for the selected year
    Map {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        filters: FilterArgs,
        /// Linear or Log
        #[arg(long)]
        scale: Option<ColorScale>,
        /// Attach ISO3 codes from the geographic reference
        #[arg(long)]
        iso: bool,
    },
    /// Every year for the selected (or default) locations
    Historical {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Twenty highest or lowest locations
    Ranking {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        filters: FilterArgs,
        /// top_20 or bottom_20
        #[arg(long)]
        order: Option<RankingOrder>,
    },
    /// Continent, subregion, location tree
    Hierarchy {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Locations grouped by a categorical dimension
    Breakdown {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        filters: FilterArgs,
        /// continent, region, subregion or income_group
        #[arg(long)]
        dimension: Option<BreakdownDimension>,
    },
    /// Per-location values rounded for display
    Table {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// List the elementary causes a health-condition label expands to
    Causes {
        label: String,
        #[arg(long)]
        shs: bool,
    },
    /// List every selectable health-condition label and age band
    Labels,
    /// Write a configuration file with default settings
    InitConfig {
        #[arg(value_name = "PATH")]
        path: PathBuf,
        #[arg(long, value_name = "PATH")]
        data: PathBuf,
    },
}

fn main() {
    env_logger::init();
    let Cli { command } = Cli::parse();

    let result = match command {
        Some(Commands::Map {
            source,
            filters,
            scale,
            iso,
        }) => run_map(source, filters, scale, iso),
        Some(Commands::Historical { source, filters }) => run_historical(source, filters),
        Some(Commands::Ranking {
            source,
            filters,
            order,
        }) => run_ranking(source, filters, order),
        Some(Commands::Hierarchy { source, filters }) => run_hierarchy(source, filters),
        Some(Commands::Breakdown {
            source,
            filters,
            dimension,
        }) => run_breakdown(source, filters, dimension),
        Some(Commands::Table { source, filters }) => run_table(source, filters),
        Some(Commands::Causes { label, shs }) => {
            taxonomy::expand(&label, shs)
                .iter()
                .for_each(|cause| println!("{cause}"));
            Ok(())
        }
        Some(Commands::Labels) => {
            print_labels();
            Ok(())
        }
        Some(Commands::InitConfig { path, data }) => init_config(&path, &data),
        None => Cli::command().print_help().map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn parse_coordinate(raw: &str) -> Result<(f64, f64), String> {
    let (lat, lon) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LON, got '{raw}'"))?;
    let lat: f64 = lat.trim().parse().map_err(|e| format!("bad latitude: {e}"))?;
    let lon: f64 = lon.trim().parse().map_err(|e| format!("bad longitude: {e}"))?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(format!("coordinate {lat},{lon} is off the globe"));
    }
    Ok((lat, lon))
}

fn load_config(source: &SourceArgs) -> Result<DashboardConfig, Box<dyn Error>> {
    let mut config = match (&source.config, &source.data) {
        (Some(path), _) => DashboardConfig::load(path)?,
        (None, Some(data)) => DashboardConfig::with_store(data),
        (None, None) => return Err("either --config or --data is required".into()),
    };
    if let Some(data) = &source.data {
        config.store.path = data.clone();
    }
    if let Some(location) = &source.default_location {
        config.session.default_location = location.clone();
    }
    Ok(config)
}

fn geo_reference(config: &DashboardConfig) -> Result<GeoReference, Box<dyn Error>> {
    Ok(geo::load_or_fetch(
        &config.geo.cache_path,
        config.geo.source_url.as_deref(),
    )?)
}

/// Opens the store, starts a session and replays the requested filters and
/// clicks on it.
fn open_session(source: &SourceArgs, filters: FilterArgs) -> Result<Session, Box<dyn Error>> {
    let config = load_config(source)?;
    let mut default_location = config.session.default_location.clone();
    if let Some((lat, lon)) = source.near {
        let reference = geo_reference(&config)?;
        match reference.nearest(lat, lon) {
            Some(entry) => default_location = entry.location_name.clone(),
            None => log::warn!("Geographic reference is empty; keeping '{default_location}'"),
        }
    }

    let store = PolarsFactStore::open(&config.store.path)?;
    let mut session = Session::start(Dashboard::new(Arc::new(store)), &default_location)?;

    let FilterArgs {
        measure,
        metric,
        condition,
        age,
        sex,
        year,
        shs,
        locations,
    } = filters;
    let controls = [
        measure.map(Control::Measure),
        metric.map(Control::Metric),
        condition.map(Control::HealthCondition),
        age.map(Control::AgeGroup),
        sex.map(Control::Sex),
        year.map(Control::Year),
        Some(Control::Shs(shs)),
    ];
    for control in controls.into_iter().flatten() {
        session.apply(control);
    }
    for (index, location) in locations.iter().enumerate() {
        let event = if index == 0 {
            ClickEvent::plain(location)
        } else {
            ClickEvent::shift(location)
        };
        session.click(event);
    }
    Ok(session)
}

/// Prints a panel as TSV. Empty results print the placeholder to stderr;
/// store failures are returned as errors.
fn emit<T>(panel: Panel<T>, header: &[&str], row: impl Fn(&T) -> Vec<String>) -> CliResult {
    match panel {
        Panel::Rows(rows) => {
            println!("{}", header.join("\t"));
            for item in rows.iter() {
                println!("{}", row(item).join("\t"));
            }
            Ok(())
        }
        Panel::NoData => {
            eprintln!("{}", shs_atlas::panel::NO_DATA_MESSAGE);
            Ok(())
        }
        Panel::Failed(message) => Err(message.into()),
    }
}

fn cell(value: impl Display) -> String {
    value.to_string()
}

fn run_map(
    source: SourceArgs,
    filters: FilterArgs,
    scale: Option<ColorScale>,
    iso: bool,
) -> CliResult {
    let reference = if iso {
        geo_reference(&load_config(&source)?)?
    } else {
        GeoReference::from_entries(Vec::new())
    };
    let mut session = open_session(&source, filters)?;
    if let Some(scale) = scale {
        session.apply(Control::ColorScale(scale));
    }
    let color_scale = session.state().color_scale;
    let annotated = session.map_data().map(|rows| {
        Arc::new(
            reference
                .annotate(&rows)
                .into_iter()
                .map(|(row, iso3)| (row.clone(), iso3.unwrap_or_default().to_string()))
                .collect::<Vec<(LocationValue, String)>>(),
        )
    });

    emit(
        Panel::from_shared(annotated),
        &["location_name", "iso3", "value", "scaled"],
        |(row, iso3)| {
            vec![
                row.location_name.clone(),
                iso3.clone(),
                cell(row.value),
                color_scale.apply(row.value).map(cell).unwrap_or_default(),
            ]
        },
    )
}

fn run_historical(source: SourceArgs, filters: FilterArgs) -> CliResult {
    let mut session = open_session(&source, filters)?;
    emit(
        Panel::from_shared(session.historical_data()),
        &["year", "location_name", "value"],
        |point| {
            vec![
                cell(point.year),
                point.location_name.clone(),
                cell(point.value),
            ]
        },
    )
}

fn run_ranking(
    source: SourceArgs,
    filters: FilterArgs,
    order: Option<RankingOrder>,
) -> CliResult {
    let mut session = open_session(&source, filters)?;
    if let Some(order) = order {
        session.apply(Control::RankingOrder(order));
    }
    emit(
        Panel::from_shared(session.ranking_data()),
        &["location_name", "value"],
        |row| vec![row.location_name.clone(), cell(row.value)],
    )
}

fn run_hierarchy(source: SourceArgs, filters: FilterArgs) -> CliResult {
    let mut session = open_session(&source, filters)?;
    emit(
        Panel::from_shared(session.hierarchical_data()),
        &["continent", "subregion", "location_name", "value"],
        |node| {
            vec![
                node.continent.clone(),
                node.subregion.clone(),
                node.location_name.clone(),
                cell(node.value),
            ]
        },
    )
}

fn run_breakdown(
    source: SourceArgs,
    filters: FilterArgs,
    dimension: Option<BreakdownDimension>,
) -> CliResult {
    let mut session = open_session(&source, filters)?;
    if let Some(dimension) = dimension {
        session.apply(Control::Breakdown(dimension));
    }
    let column = session.state().breakdown.column();
    emit(
        Panel::from_shared(session.breakdown_data()),
        &["location_name", column, "value"],
        |point| {
            vec![
                point.location_name.clone(),
                point.breakdown_value.clone(),
                cell(point.value),
            ]
        },
    )
}

fn run_table(source: SourceArgs, filters: FilterArgs) -> CliResult {
    let mut session = open_session(&source, filters)?;
    emit(
        Panel::from_shared(session.table_data()),
        &["location_name", "value"],
        |row| vec![row.location_name.clone(), cell(row.value)],
    )
}

fn print_labels() {
    println!("# health conditions");
    for label in taxonomy::health_condition_labels() {
        println!("{label}");
    }
    println!("# age groups");
    for band in AgeGroup::published() {
        println!("{band}");
    }
}

fn init_config(path: &Path, data: &Path) -> CliResult {
    DashboardConfig::with_store(data).save(path)?;
    println!("Wrote configuration to {}", path.display());
    Ok(())
}
