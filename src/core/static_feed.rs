use std::collections::HashMap;
use std::io::{Cursor, Read};

use serde::Deserialize;

use crate::core::client::{de_f64, TransitClient};
use crate::domain::model::{to_csv, Direction, GtfsStopRow, NearbyStop, StationRow, StopKind};
use crate::domain::ports::Cache;
use crate::utils::error::{Result, TransitError};
use crate::utils::geo::haversine_km;

const STATIONS_FILE: &str = "train_stations.csv";
const BUS_ROUTES_FILE: &str = "bus_routes.csv";

/// GTFS text files kept from the static feed download.
pub const GTFS_TABLES: [&str; 6] = [
    "stops",
    "routes",
    "trips",
    "calendar",
    "transfers",
    "stop_times",
];

// ---------------------------------------------------------------------------
// GTFS static feed
// ---------------------------------------------------------------------------

/// Reference data from the GTFS static feed, cached as text files. Not
/// real-time data; intended for lookups and the nearby-stops view.
pub struct StaticFeed<C: Cache> {
    cache: C,
}

impl<C: Cache> StaticFeed<C> {
    pub fn new(cache: C) -> Self {
        Self { cache }
    }

    /// Downloads the GTFS zip and stores the tables we serve.
    pub async fn update(&self, client: &TransitClient) -> Result<()> {
        let bytes = client.fetch_bytes(client.gtfs_url()).await?;
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;

        for table in GTFS_TABLES {
            let name = format!("{}.txt", table);
            let mut file = archive.by_name(&name)?;
            let mut contents = Vec::new();
            file.read_to_end(&mut contents)?;
            drop(file);
            self.cache.write_file(&name, &contents).await?;
            tracing::info!("cached {} ({} bytes)", name, contents.len());
        }
        Ok(())
    }

    /// Raw CSV text of one GTFS table.
    pub async fn table(&self, name: &str) -> Result<String> {
        if !GTFS_TABLES.contains(&name) {
            return Err(TransitError::unknown_id(name, "not a cached GTFS table"));
        }
        let bytes = self.cache.read_file(&format!("{}.txt", name)).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// `stops.txt` with the derived direction column.
    pub async fn stops(&self) -> Result<Vec<GtfsStopRow>> {
        let raw = self.cache.read_file("stops.txt").await?;
        parse_gtfs_stops(&raw)
    }

    /// Joins `trips` (trip -> route) and `stop_times` (trip -> stop) into a
    /// stop -> serving-routes index for the nearby-stops view.
    pub async fn stop_routes(&self) -> Result<StopRouteIndex> {
        let raw = self.cache.read_file("trips.txt").await?;
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(raw.as_slice());
        let mut route_by_trip: HashMap<String, String> = HashMap::new();
        for record in reader.deserialize() {
            let trip: RawTrip = record?;
            route_by_trip.insert(trip.trip_id, trip.route_id);
        }

        let raw = self.cache.read_file("stop_times.txt").await?;
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(raw.as_slice());
        let mut routes_by_stop: HashMap<u32, Vec<String>> = HashMap::new();
        for record in reader.deserialize() {
            let stop_time: RawStopTime = record?;
            let Some(route) = route_by_trip.get(&stop_time.trip_id) else {
                continue;
            };
            let routes = routes_by_stop.entry(stop_time.stop_id).or_default();
            if !routes.contains(route) {
                routes.push(route.clone());
            }
        }
        for routes in routes_by_stop.values_mut() {
            routes.sort();
        }
        Ok(StopRouteIndex { routes_by_stop })
    }
}

#[derive(Debug, Deserialize)]
struct RawTrip {
    route_id: String,
    trip_id: String,
}

#[derive(Debug, Deserialize)]
struct RawStopTime {
    trip_id: String,
    stop_id: u32,
}

/// Bus routes serving each GTFS stop.
#[derive(Debug, Clone, Default)]
pub struct StopRouteIndex {
    routes_by_stop: HashMap<u32, Vec<String>>,
}

impl StopRouteIndex {
    pub fn from_map(routes_by_stop: HashMap<u32, Vec<String>>) -> Self {
        Self { routes_by_stop }
    }

    pub fn routes(&self, stop_id: u32) -> Vec<String> {
        self.routes_by_stop
            .get(&stop_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct RawGtfsStop {
    stop_id: u32,
    #[serde(default)]
    stop_code: String,
    #[serde(default)]
    parent_station: String,
    stop_name: String,
    #[serde(default)]
    stop_desc: String,
    stop_lat: f64,
    stop_lon: f64,
    #[serde(default)]
    location_type: String,
    #[serde(default)]
    wheelchair_boarding: String,
}

fn parse_gtfs_stops(raw: &[u8]) -> Result<Vec<GtfsStopRow>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(raw);
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let stop: RawGtfsStop = record?;
        let direction = Direction::from_stop_desc(&stop.stop_desc)
            .map(|d| d.symbol().to_string())
            .unwrap_or_else(|| "-".to_string());
        rows.push(GtfsStopRow {
            stop_id: stop.stop_id,
            stop_code: stop.stop_code,
            map_id: stop.parent_station,
            stop_name: stop.stop_name,
            stop_desc: stop.stop_desc,
            direction,
            lat: stop.stop_lat,
            lon: stop.stop_lon,
            location_type: stop.location_type,
            wheelchair_boarding: stop.wheelchair_boarding,
        });
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Train station catalog
// ---------------------------------------------------------------------------

/// Raw station record from the City of Chicago reference dataset.
#[derive(Debug, Deserialize)]
struct RawStation {
    stop_id: String,
    stop_name: String,
    station_name: String,
    station_descriptive_name: String,
    direction_id: String,
    map_id: String,
    ada: bool,
    red: bool,
    blue: bool,
    g: bool,
    brn: bool,
    p: bool,
    pexp: bool,
    y: bool,
    pnk: bool,
    o: bool,
    location: RawLocation,
}

#[derive(Debug, Deserialize)]
struct RawLocation {
    #[serde(deserialize_with = "de_f64")]
    latitude: f64,
    #[serde(deserialize_with = "de_f64")]
    longitude: f64,
}

/// The train station reference table: one row per directional platform,
/// grouped under parent stations by `map_id`.
#[derive(Debug, Clone)]
pub struct StationCatalog {
    rows: Vec<StationRow>,
}

impl StationCatalog {
    pub fn from_rows(rows: Vec<StationRow>) -> Self {
        Self { rows }
    }

    /// Loads the cached catalog, fetching it first if absent.
    pub async fn load<C: Cache>(cache: &C, client: &TransitClient) -> Result<StationCatalog> {
        if !cache.exists(STATIONS_FILE).await {
            Self::update(cache, client).await?;
        }
        let bytes = cache.read_file(STATIONS_FILE).await?;
        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let mut rows = Vec::new();
        for record in reader.deserialize() {
            rows.push(record?);
        }
        Ok(StationCatalog { rows })
    }

    /// Refreshes the cached catalog from the city reference dataset.
    pub async fn update<C: Cache>(cache: &C, client: &TransitClient) -> Result<()> {
        let bytes = client.fetch_bytes(client.stations_url()).await?;
        let raw: Vec<RawStation> = serde_json::from_slice(&bytes)?;
        let rows: Vec<StationRow> = raw
            .into_iter()
            .filter_map(|s| {
                Some(StationRow {
                    stop_id: s.stop_id.parse().ok()?,
                    stop_name: s.stop_name,
                    station_name: s.station_name,
                    station_desc: s.station_descriptive_name,
                    direction: s.direction_id,
                    map_id: s.map_id.parse().ok()?,
                    ada: s.ada,
                    red: s.red,
                    blue: s.blue,
                    green: s.g,
                    brown: s.brn,
                    purple: s.p,
                    purple_exp: s.pexp,
                    yellow: s.y,
                    pink: s.pnk,
                    orange: s.o,
                    lat: s.location.latitude,
                    lon: s.location.longitude,
                })
            })
            .collect();
        let csv = to_csv(&rows)?;
        cache.write_file(STATIONS_FILE, csv.as_bytes()).await?;
        tracing::info!("cached {} ({} platforms)", STATIONS_FILE, rows.len());
        Ok(())
    }

    pub fn rows(&self) -> &[StationRow] {
        &self.rows
    }

    pub fn platform(&self, stop_id: u32) -> Option<&StationRow> {
        self.rows.iter().find(|r| r.stop_id == stop_id)
    }

    /// All platform rows of a parent station.
    pub fn station(&self, map_id: u32) -> Vec<&StationRow> {
        self.rows.iter().filter(|r| r.map_id == map_id).collect()
    }

    /// Resolves a platform id (3xxxx) or parent id (4xxxx) to the parent's
    /// `map_id`.
    pub fn resolve_map_id(&self, id: u32) -> Result<u32> {
        match StopKind::classify(id)? {
            StopKind::ParentStation => {
                if self.rows.iter().any(|r| r.map_id == id) {
                    Ok(id)
                } else {
                    Err(TransitError::unknown_id(id, "not a known parent station"))
                }
            }
            StopKind::TrainPlatform => self
                .platform(id)
                .map(|r| r.map_id)
                .ok_or_else(|| TransitError::unknown_id(id, "not a known train platform")),
            StopKind::Bus => Err(TransitError::unknown_id(
                id,
                "bus stop ids have no parent station",
            )),
        }
    }

    pub fn stops_for_line(&self, line: crate::domain::model::Line) -> Vec<&StationRow> {
        self.rows.iter().filter(|r| r.serves(line)).collect()
    }

    pub fn stop_name(&self, stop_id: u32) -> Option<&str> {
        self.platform(stop_id).map(|r| r.stop_name.as_str())
    }

    pub fn stop_coords(&self, stop_id: u32) -> Option<(f64, f64)> {
        self.platform(stop_id).map(|r| (r.lat, r.lon))
    }
}

// ---------------------------------------------------------------------------
// Bus route list cache
// ---------------------------------------------------------------------------

pub async fn update_bus_routes<C: Cache>(
    cache: &C,
    tracker: &crate::core::bus::BusTracker,
) -> Result<()> {
    let routes = tracker.routes().await?;
    let csv = to_csv(&routes)?;
    cache.write_file(BUS_ROUTES_FILE, csv.as_bytes()).await?;
    tracing::info!("cached {} ({} routes)", BUS_ROUTES_FILE, routes.len());
    Ok(())
}

pub async fn bus_routes<C: Cache>(cache: &C) -> Result<Vec<crate::domain::model::RouteRow>> {
    let bytes = cache.read_file(BUS_ROUTES_FILE).await?;
    let mut reader = csv::Reader::from_reader(bytes.as_slice());
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Stop search and nearby stops
// ---------------------------------------------------------------------------

/// Name search over the stops table. Street-corner queries like
/// "state & lake" (or "state and lake") match stops containing both street
/// names.
pub fn stop_search<'a>(
    stops: &'a [GtfsStopRow],
    query: &str,
    direction: Option<Direction>,
    kind: Option<StopKind>,
) -> Vec<&'a GtfsStopRow> {
    static SPLITTER: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let splitter =
        SPLITTER.get_or_init(|| regex::Regex::new(r"\s*(?:&|\band\b)\s*").expect("valid regex"));
    let q = query.to_lowercase();
    let terms: Vec<&str> = splitter.split(&q).filter(|t| !t.is_empty()).collect();

    stops
        .iter()
        .filter(|s| {
            let name = s.stop_name.to_lowercase();
            terms.iter().all(|t| name.contains(t))
        })
        .filter(|s| match kind {
            Some(StopKind::Bus) => {
                matches!(StopKind::classify(s.stop_id), Ok(StopKind::Bus))
            }
            Some(_) => StopKind::classify(s.stop_id).is_ok_and(|k| k.is_train()),
            None => true,
        })
        .filter(|s| match direction {
            Some(d) => s.direction == d.symbol(),
            None => true,
        })
        .collect()
}

/// The `count` stops closest to a coordinate, ordered by haversine distance.
/// Train results are grouped by parent station: child platforms are skipped
/// in favor of their 4xxxx parent rows.
pub fn closest_stops(
    stops: &[GtfsStopRow],
    catalog: Option<&StationCatalog>,
    bus_routes: Option<&StopRouteIndex>,
    lat: f64,
    lon: f64,
    count: usize,
    kind: StopKind,
) -> Vec<NearbyStop> {
    let wanted = match kind {
        StopKind::Bus => StopKind::Bus,
        _ => StopKind::ParentStation,
    };
    let mut candidates: Vec<NearbyStop> = stops
        .iter()
        .filter_map(|s| {
            let stop_kind = StopKind::classify(s.stop_id).ok()?;
            if stop_kind != wanted {
                return None;
            }
            let routes = match stop_kind {
                StopKind::ParentStation => catalog
                    .map(|catalog| {
                        let mut lines: Vec<String> = catalog
                            .station(s.stop_id)
                            .iter()
                            .flat_map(|r| r.lines())
                            .map(|l| l.color().to_string())
                            .collect();
                        lines.sort();
                        lines.dedup();
                        lines
                    })
                    .unwrap_or_default(),
                _ => bus_routes
                    .map(|index| index.routes(s.stop_id))
                    .unwrap_or_default(),
            };
            Some(NearbyStop {
                stop_id: s.stop_id,
                stop_name: s.stop_name.clone(),
                stop_type: stop_kind,
                is_parent: stop_kind == StopKind::ParentStation,
                direction: s.direction.clone(),
                routes,
                lat: s.lat,
                lon: s.lon,
                distance_km: haversine_km(lat, lon, s.lat, s.lon),
            })
        })
        .collect();

    candidates.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    candidates.truncate(count);
    candidates
}
