pub mod cache;

use std::env;
use std::path::Path;

use chrono::{Local, Timelike};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::utils::error::{Result, TransitError};
use crate::utils::validation::{validate_path, validate_url, Validate};

pub const BUS_API_BASE: &str = "https://www.ctabustracker.com/bustime/api/v2";
pub const TRAIN_API_BASE: &str = "http://lapi.transitchicago.com/api/1.0";
pub const ALERTS_API_BASE: &str = "http://lapi.transitchicago.com/api/1.0";
pub const GTFS_STATIC_URL: &str =
    "https://www.transitchicago.com/downloads/sch_data/google_transit.zip";
pub const STATIONS_URL: &str = "https://data.cityofchicago.org/resource/8pix-ypme.json";

/// API keys for the two keyed services. More than one key per service splits
/// the daily quota: the first key serves requests before 16:00 local time,
/// the last one after.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKeys {
    #[serde(default)]
    pub bus: Vec<String>,
    #[serde(default)]
    pub train: Vec<String>,
}

impl ApiKeys {
    pub fn bus_key(&self) -> Result<&str> {
        Self::pick(&self.bus).ok_or_else(|| {
            TransitError::config("no bus API key configured (CTA_BUS_API_KEY or [keys] bus)")
        })
    }

    pub fn train_key(&self) -> Result<&str> {
        Self::pick(&self.train).ok_or_else(|| {
            TransitError::config("no train API key configured (CTA_TRAIN_API_KEY or [keys] train)")
        })
    }

    fn pick(keys: &[String]) -> Option<&str> {
        Self::pick_at(keys, Local::now().hour())
    }

    fn pick_at(keys: &[String], hour: u32) -> Option<&str> {
        if keys.is_empty() {
            return None;
        }
        let idx = if hour < 16 { 0 } else { keys.len() - 1 };
        Some(keys[idx].as_str())
    }
}

/// On-disk configuration (`cta.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub keys: ApiKeys,
    pub cache_dir: Option<String>,
    pub bus_api_base: Option<String>,
    pub train_api_base: Option<String>,
    pub alerts_api_base: Option<String>,
    pub gtfs_static_url: Option<String>,
    pub stations_url: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<FileConfig> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| TransitError::config(format!("{}: {}", path.display(), e)))
    }

    /// Environment variables beat the file; a missing file is an empty config.
    pub fn resolve(path: Option<&Path>) -> Result<FileConfig> {
        let mut config = match path {
            Some(p) => FileConfig::load(p)?,
            None => {
                let default = Path::new("cta.toml");
                if default.exists() {
                    FileConfig::load(default)?
                } else {
                    FileConfig::default()
                }
            }
        };

        if let Ok(keys) = env::var("CTA_BUS_API_KEY") {
            config.keys.bus = split_keys(&keys);
        }
        if let Ok(keys) = env::var("CTA_TRAIN_API_KEY") {
            config.keys.train = split_keys(&keys);
        }
        if let Ok(dir) = env::var("CTA_CACHE_DIR") {
            config.cache_dir = Some(dir);
        }

        Ok(config)
    }

    pub fn cache_dir(&self) -> String {
        self.cache_dir.clone().unwrap_or_else(|| ".cta-cache".to_string())
    }

    pub fn bus_api_base(&self) -> &str {
        self.bus_api_base.as_deref().unwrap_or(BUS_API_BASE)
    }

    pub fn train_api_base(&self) -> &str {
        self.train_api_base.as_deref().unwrap_or(TRAIN_API_BASE)
    }

    pub fn alerts_api_base(&self) -> &str {
        self.alerts_api_base.as_deref().unwrap_or(ALERTS_API_BASE)
    }

    pub fn gtfs_static_url(&self) -> &str {
        self.gtfs_static_url.as_deref().unwrap_or(GTFS_STATIC_URL)
    }

    pub fn stations_url(&self) -> &str {
        self.stations_url.as_deref().unwrap_or(STATIONS_URL)
    }
}

impl Validate for FileConfig {
    fn validate(&self) -> Result<()> {
        validate_url("bus_api_base", self.bus_api_base())?;
        validate_url("train_api_base", self.train_api_base())?;
        validate_url("alerts_api_base", self.alerts_api_base())?;
        validate_url("gtfs_static_url", self.gtfs_static_url())?;
        validate_url("stations_url", self.stations_url())?;
        validate_path("cache_dir", &self.cache_dir())?;
        Ok(())
    }
}

fn split_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[derive(Debug, Parser)]
#[command(name = "cta")]
#[command(about = "Query CTA bus/train trackers, rider alerts and reference data")]
pub struct Cli {
    /// Path to a cta.toml config file
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Emit JSON instead of CSV
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List all bus routes serviced by the system
    BusRoutes {
        /// Read the cached route list instead of the live API
        #[arg(long)]
        cached: bool,
    },
    /// List the directions a bus route operates in
    BusDirections { route: String },
    /// List the stops of a bus route in one direction
    BusStops { route: String, direction: String },
    /// Current bus positions, by route or vehicle ids
    BusVehicles {
        #[arg(long, conflicts_with = "vid")]
        route: Option<String>,
        #[arg(long)]
        vid: Option<String>,
    },
    /// Predicted bus arrivals for stops or vehicles
    BusPredictions {
        #[arg(long)]
        stpid: Option<String>,
        #[arg(long)]
        vid: Option<String>,
        #[arg(long)]
        route: Option<String>,
        #[arg(long)]
        top: Option<u32>,
    },
    /// Route variations (patterns) for a bus route
    BusPatterns { route: String },
    /// Estimated train arrivals for a station (mapid) or platform (stpid)
    TrainArrivals {
        station_id: u32,
        #[arg(long)]
        line: Option<String>,
        #[arg(long)]
        max: Option<u32>,
    },
    /// Live train positions for one or more lines
    TrainPositions {
        #[arg(required = true)]
        lines: Vec<String>,
    },
    /// Arrival board of a single train run
    TrainFollow { run_number: String },
    /// List train stations, optionally filtered by line
    Stations {
        #[arg(long)]
        line: Option<String>,
    },
    /// Search stops by name ("state & lake")
    StopSearch {
        query: String,
        #[arg(long)]
        direction: Option<String>,
        /// Restrict to "bus" or "train" stops
        #[arg(long)]
        kind: Option<String>,
    },
    /// Closest stops to a coordinate
    Nearby {
        lat: f64,
        lon: f64,
        #[arg(long, default_value = "3")]
        count: usize,
    },
    /// Overall service status from the alerts feed
    AlertsStatus {
        #[arg(long)]
        service: Option<String>,
        #[arg(long)]
        route: Option<String>,
        #[arg(long)]
        station: Option<u32>,
    },
    /// Full alert details
    AlertsDetails {
        #[arg(long)]
        active_only: bool,
        /// Include accessibility alerts (elevator outages)
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        accessibility: bool,
        /// Include planned alerts
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        planned: bool,
        #[arg(long)]
        route: Option<String>,
        #[arg(long)]
        station: Option<u32>,
        /// Only alerts starting on or after this date (yyyy-MM-dd)
        #[arg(long)]
        by_start_date: Option<String>,
        #[arg(long)]
        recent_days: Option<u32>,
    },
    /// Dump one cached GTFS table (stops, routes, trips, ...)
    Gtfs { table: String },
    /// Refresh the cached reference data (GTFS feed, stations, bus routes)
    Update,
    /// Run the nearby-stops web front-end
    Serve {
        #[arg(long, default_value = "127.0.0.1:5000")]
        bind: String,
    },
}
