pub mod alerts;
pub mod bus;
pub mod client;
pub mod static_feed;
pub mod train;

pub use alerts::CustomerAlerts;
pub use bus::BusTracker;
pub use client::TransitClient;
pub use static_feed::{StaticFeed, StationCatalog};
pub use train::TrainTracker;
