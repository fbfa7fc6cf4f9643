use serde::Deserialize;

use crate::core::client::{de_f64, de_flag, de_string, de_u32, de_u64, TransitClient};
use crate::domain::model::{
    Direction, Pattern, PatternPoint, PredictionRow, RouteRow, StopRow, VehicleRow,
};
use crate::utils::error::{Result, TransitError};
use crate::utils::time::parse_bus_timestamp;
use crate::utils::validation::validate_id_list;

// ---------------------------------------------------------------------------
// Raw Bus Tracker payloads (inside the bustime-response envelope)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RoutesPayload {
    #[serde(default)]
    routes: Vec<RawRoute>,
}

#[derive(Debug, Deserialize)]
struct RawRoute {
    rt: String,
    rtnm: String,
    rtclr: String,
    rtdd: String,
}

#[derive(Debug, Deserialize)]
struct DirectionsPayload {
    #[serde(default)]
    directions: Vec<RawDirection>,
}

#[derive(Debug, Deserialize)]
struct RawDirection {
    dir: String,
}

#[derive(Debug, Deserialize)]
struct StopsPayload {
    #[serde(default)]
    stops: Vec<RawStop>,
}

#[derive(Debug, Deserialize)]
struct RawStop {
    #[serde(deserialize_with = "de_string")]
    stpid: String,
    stpnm: String,
    #[serde(deserialize_with = "de_f64")]
    lat: f64,
    #[serde(deserialize_with = "de_f64")]
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct VehiclesPayload {
    #[serde(default)]
    vehicle: Vec<RawVehicle>,
}

#[derive(Debug, Deserialize)]
struct RawVehicle {
    #[serde(deserialize_with = "de_string")]
    vid: String,
    tmstmp: String,
    #[serde(deserialize_with = "de_string")]
    lat: String,
    #[serde(deserialize_with = "de_string")]
    lon: String,
    #[serde(deserialize_with = "de_string")]
    hdg: String,
    #[serde(deserialize_with = "de_u64")]
    pid: u64,
    rt: String,
    des: String,
    #[serde(deserialize_with = "de_u64")]
    pdist: u64,
    #[serde(default, deserialize_with = "de_flag")]
    dly: bool,
    #[serde(default, deserialize_with = "de_string")]
    tatripid: String,
    #[serde(default, deserialize_with = "de_string")]
    tablockid: String,
    #[serde(default)]
    zone: String,
}

#[derive(Debug, Deserialize)]
struct PredictionsPayload {
    #[serde(default)]
    prd: Vec<RawPrediction>,
}

#[derive(Debug, Deserialize)]
struct RawPrediction {
    tmstmp: String,
    typ: String,
    stpnm: String,
    #[serde(deserialize_with = "de_string")]
    stpid: String,
    #[serde(deserialize_with = "de_string")]
    vid: String,
    #[serde(deserialize_with = "de_u64")]
    dstp: u64,
    rt: String,
    rtdir: String,
    des: String,
    prdtm: String,
    prdctdn: String,
    #[serde(default, deserialize_with = "de_string")]
    tablockid: String,
    #[serde(default, deserialize_with = "de_string")]
    tatripid: String,
    #[serde(default, deserialize_with = "de_flag")]
    dly: bool,
}

#[derive(Debug, Deserialize)]
struct PatternsPayload {
    #[serde(default)]
    ptr: Vec<RawPattern>,
}

#[derive(Debug, Deserialize)]
struct RawPattern {
    #[serde(deserialize_with = "de_u64")]
    pid: u64,
    #[serde(deserialize_with = "de_f64")]
    ln: f64,
    rtdir: String,
    #[serde(default)]
    pt: Vec<RawPatternPoint>,
}

#[derive(Debug, Deserialize)]
struct RawPatternPoint {
    #[serde(deserialize_with = "de_u32")]
    seq: u32,
    typ: String,
    #[serde(default)]
    stpid: Option<String>,
    #[serde(default)]
    stpnm: Option<String>,
    #[serde(deserialize_with = "de_f64")]
    lat: f64,
    #[serde(deserialize_with = "de_f64")]
    lon: f64,
    #[serde(default)]
    pdist: Option<f64>,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Vehicle selection for `/getvehicles`: by route or by comma-delimited
/// vehicle ids, never both.
#[derive(Debug, Clone)]
pub enum VehicleQuery {
    Route(String),
    Vehicles(String),
}

/// Prediction selection for `/getpredictions`. Stop ids and vehicle ids are
/// mutually exclusive; when both are set the stop ids win, matching the
/// upstream API contract.
#[derive(Debug, Clone, Default)]
pub struct PredictionQuery {
    pub stop_ids: Option<String>,
    pub vehicle_ids: Option<String>,
    pub route: Option<String>,
    pub top: Option<u32>,
}

impl PredictionQuery {
    pub fn for_stops(stop_ids: impl Into<String>) -> Self {
        Self {
            stop_ids: Some(stop_ids.into()),
            ..Default::default()
        }
    }

    pub fn for_vehicles(vehicle_ids: impl Into<String>) -> Self {
        Self {
            vehicle_ids: Some(vehicle_ids.into()),
            ..Default::default()
        }
    }

    fn params(&self) -> Result<Vec<(&'static str, String)>> {
        let mut params = Vec::new();
        if let Some(stpid) = &self.stop_ids {
            validate_id_list("stpid", stpid)?;
            params.push(("stpid", stpid.clone()));
            if let Some(rt) = &self.route {
                params.push(("rt", rt.clone()));
            }
        } else if let Some(vid) = &self.vehicle_ids {
            validate_id_list("vid", vid)?;
            params.push(("vid", vid.clone()));
        } else {
            return Err(TransitError::Validation {
                field: "predictions".to_string(),
                reason: "either stop ids or vehicle ids are required".to_string(),
            });
        }
        if let Some(top) = self.top {
            params.push(("top", top.to_string()));
        }
        Ok(params)
    }
}

// ---------------------------------------------------------------------------
// Bus Tracker API
// ---------------------------------------------------------------------------

/// Client for the CTA Bus Tracker API.
#[derive(Debug, Clone)]
pub struct BusTracker {
    client: TransitClient,
}

impl BusTracker {
    pub fn new(client: TransitClient) -> Self {
        Self { client }
    }

    /// The set of routes serviced by the system.
    pub async fn routes(&self) -> Result<Vec<RouteRow>> {
        let payload: RoutesPayload = self.client.bus_api("getroutes", &[]).await?;
        Ok(payload
            .routes
            .into_iter()
            .map(|r| RouteRow {
                route_id: r.rt,
                route_name: r.rtnm,
                route_color: r.rtclr,
                route_dd: r.rtdd,
            })
            .collect())
    }

    /// Directions a route operates in.
    pub async fn directions(&self, route: &str) -> Result<Vec<Direction>> {
        let payload: DirectionsPayload = self
            .client
            .bus_api("getdirections", &[("rt", route.to_string())])
            .await?;
        payload
            .directions
            .into_iter()
            .map(|d| d.dir.parse())
            .collect()
    }

    /// Stops serviced by a route in one direction.
    pub async fn stops(&self, route: &str, direction: Direction) -> Result<Vec<StopRow>> {
        let payload: StopsPayload = self
            .client
            .bus_api(
                "getstops",
                &[
                    ("rt", route.to_string()),
                    ("dir", direction.bound().to_string()),
                ],
            )
            .await?;
        Ok(payload
            .stops
            .into_iter()
            .map(|s| StopRow {
                stop_id: s.stpid,
                stop_name: s.stpnm,
                lat: s.lat,
                lon: s.lon,
            })
            .collect())
    }

    /// Current geolocations, either all buses of a route or specific
    /// vehicles.
    pub async fn vehicles(&self, query: VehicleQuery) -> Result<Vec<VehicleRow>> {
        let params = match &query {
            VehicleQuery::Route(rt) => vec![("rt", rt.clone())],
            VehicleQuery::Vehicles(vid) => {
                let vid = vid.replace(' ', "");
                validate_id_list("vid", &vid)?;
                vec![("vid", vid)]
            }
        };
        let payload: VehiclesPayload = self.client.bus_api("getvehicles", &params).await?;
        Ok(payload.vehicle.into_iter().map(reshape_vehicle).collect())
    }

    /// Predicted arrivals/departures, sorted by vehicle then predicted time.
    pub async fn predictions(&self, query: PredictionQuery) -> Result<Vec<PredictionRow>> {
        let params = query.params()?;
        let payload: PredictionsPayload = self.client.bus_api("getpredictions", &params).await?;
        let mut rows: Vec<PredictionRow> =
            payload.prd.into_iter().map(reshape_prediction).collect();
        rows.sort_by(|a, b| {
            (a.vehicle_id.as_str(), a.predicted_time.as_str())
                .cmp(&(b.vehicle_id.as_str(), b.predicted_time.as_str()))
        });
        Ok(rows)
    }

    /// Route variations with their geo-positional points.
    pub async fn patterns(&self, route: &str) -> Result<Vec<Pattern>> {
        self.patterns_with(&[("rt", route.to_string())]).await
    }

    pub async fn pattern_by_id(&self, pattern_id: u64) -> Result<Vec<Pattern>> {
        self.patterns_with(&[("pid", pattern_id.to_string())]).await
    }

    async fn patterns_with(&self, params: &[(&'static str, String)]) -> Result<Vec<Pattern>> {
        let payload: PatternsPayload = self.client.bus_api("getpatterns", params).await?;
        Ok(payload
            .ptr
            .into_iter()
            .map(|p| Pattern {
                pattern_id: p.pid,
                length: p.ln,
                direction: p.rtdir,
                points: p
                    .pt
                    .into_iter()
                    .map(|pt| PatternPoint {
                        sequence: pt.seq,
                        kind: pt.typ,
                        stop_id: pt.stpid,
                        stop_name: pt.stpnm,
                        lat: pt.lat,
                        lon: pt.lon,
                        distance: pt.pdist,
                    })
                    .collect(),
            })
            .collect())
    }
}

fn reshape_vehicle(v: RawVehicle) -> VehicleRow {
    VehicleRow {
        vehicle_id: v.vid,
        timestamp: isoify(&v.tmstmp),
        lat: v.lat,
        lon: v.lon,
        heading: v.hdg,
        pattern_id: v.pid,
        route: v.rt,
        destination: v.des,
        distance: v.pdist,
        delayed: v.dly,
        trip_id: v.tatripid,
        block_id: v.tablockid,
        zone: v.zone,
    }
}

fn reshape_prediction(p: RawPrediction) -> PredictionRow {
    PredictionRow {
        timestamp: isoify(&p.tmstmp),
        kind: match p.typ.as_str() {
            "A" => "arrival".to_string(),
            "D" => "departure".to_string(),
            other => other.to_string(),
        },
        stop_name: p.stpnm,
        stop_id: p.stpid,
        vehicle_id: p.vid,
        distance_remaining: p.dstp,
        route: p.rt,
        direction: p.rtdir,
        destination: p.des,
        predicted_time: isoify(&p.prdtm),
        due_in: countdown_label(&p.prdctdn),
        block_id: p.tablockid,
        trip_id: p.tatripid,
        delayed: p.dly,
    }
}

/// Bus timestamps (`20240815 16:05`) become ISO 8601 where parseable;
/// anything else passes through untouched.
fn isoify(raw: &str) -> String {
    parse_bus_timestamp(raw)
        .map(|t| t.format("%Y-%m-%dT%H:%M:%S").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

/// The countdown field carries either minutes or the literal `DUE`/`DLY`.
fn countdown_label(raw: &str) -> String {
    match raw {
        "DUE" => "Due".to_string(),
        "DLY" => "Delayed".to_string(),
        mins => format!("{} mins", mins),
    }
}

// ---------------------------------------------------------------------------
// Entity wrappers
// ---------------------------------------------------------------------------

/// A bus service going in a single direction. Construction resolves the
/// route's stop list and the pattern ids matching the direction, so later
/// vehicle lookups can be filtered to this side of the route.
#[derive(Debug, Clone)]
pub struct BusRoute {
    tracker: BusTracker,
    route: String,
    direction: Direction,
    stops: Vec<StopRow>,
    pattern_ids: Vec<u64>,
}

impl BusRoute {
    pub async fn new(tracker: BusTracker, route: &str, direction: &str) -> Result<BusRoute> {
        let direction: Direction = direction.parse()?;
        let stops = tracker.stops(route, direction).await?;
        let pattern_ids = tracker
            .patterns(route)
            .await?
            .into_iter()
            .filter(|p| p.direction == direction.bound())
            .map(|p| p.pattern_id)
            .collect();
        Ok(BusRoute {
            tracker,
            route: route.to_string(),
            direction,
            stops,
            pattern_ids,
        })
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn stops(&self) -> &[StopRow] {
        &self.stops
    }

    pub fn pattern_ids(&self) -> &[u64] {
        &self.pattern_ids
    }

    /// Current positions of this route's buses, restricted to the patterns
    /// running in this route's direction.
    pub async fn vehicles(&self) -> Result<Vec<VehicleRow>> {
        let rows = self
            .tracker
            .vehicles(VehicleQuery::Route(self.route.clone()))
            .await?;
        Ok(rows
            .into_iter()
            .filter(|v| self.pattern_ids.contains(&v.pattern_id))
            .collect())
    }

    /// Predictions for a stop on this route. Fails before the network call
    /// when the stop is not on this side of the route.
    pub async fn predictions(&self, stop_id: &str) -> Result<Vec<PredictionRow>> {
        if !self.stops.iter().any(|s| s.stop_id == stop_id) {
            return Err(TransitError::unknown_id(
                stop_id,
                format!("stop is not on route {} {}", self.route, self.direction),
            ));
        }
        let query = PredictionQuery {
            stop_ids: Some(stop_id.to_string()),
            route: Some(self.route.clone()),
            ..Default::default()
        };
        self.tracker.predictions(query).await
    }
}

/// A single bus stop.
#[derive(Debug, Clone)]
pub struct BusStop {
    tracker: BusTracker,
    stop_id: String,
}

impl BusStop {
    pub fn new(tracker: BusTracker, stop_id: impl Into<String>) -> Self {
        Self {
            tracker,
            stop_id: stop_id.into(),
        }
    }

    pub fn stop_id(&self) -> &str {
        &self.stop_id
    }

    pub async fn predictions(&self) -> Result<Vec<PredictionRow>> {
        self.tracker
            .predictions(PredictionQuery::for_stops(self.stop_id.clone()))
            .await
    }
}

/// A single vehicle.
#[derive(Debug, Clone)]
pub struct Bus {
    tracker: BusTracker,
    vehicle_id: String,
}

impl Bus {
    pub fn new(tracker: BusTracker, vehicle_id: impl Into<String>) -> Self {
        Self {
            tracker,
            vehicle_id: vehicle_id.into(),
        }
    }

    pub fn vehicle_id(&self) -> &str {
        &self.vehicle_id
    }

    pub async fn vehicle(&self) -> Result<Option<VehicleRow>> {
        let rows = self
            .tracker
            .vehicles(VehicleQuery::Vehicles(self.vehicle_id.clone()))
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn predictions(&self) -> Result<Vec<PredictionRow>> {
        self.tracker
            .predictions(PredictionQuery::for_vehicles(self.vehicle_id.clone()))
            .await
    }

    /// The route variation this bus is currently running.
    pub async fn pattern(&self) -> Result<Option<Pattern>> {
        match self.vehicle().await? {
            Some(v) => {
                let patterns = self.tracker.pattern_by_id(v.pattern_id).await?;
                Ok(patterns.into_iter().next())
            }
            None => Ok(None),
        }
    }
}
