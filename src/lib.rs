pub mod config;
pub mod core;
pub mod domain;
pub mod server;
pub mod utils;

pub use config::{Cli, FileConfig};
pub use core::{BusTracker, CustomerAlerts, StaticFeed, StationCatalog, TrainTracker, TransitClient};
pub use utils::error::{Result, TransitError};
