use serde::Deserialize;

use crate::core::client::{de_flag, de_one_or_many, de_opt_string, de_string, de_u32, TransitClient};
use crate::core::static_feed::StationCatalog;
use crate::domain::model::{
    DueIn, FollowRow, Line, StationRow, StopKind, TrainArrivalRow, TrainPositionRow,
};
use crate::utils::error::{Result, TransitError};
use crate::utils::time::{minutes_until, parse_train_timestamp, seconds_since_update};

// ---------------------------------------------------------------------------
// Raw Train Tracker payloads (inside the ctatt envelope)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ArrivalsPayload {
    tmst: String,
    #[serde(default)]
    eta: Vec<RawEta>,
}

#[derive(Debug, Deserialize)]
struct RawEta {
    #[serde(rename = "staId", deserialize_with = "de_u32")]
    sta_id: u32,
    #[serde(rename = "stpId", deserialize_with = "de_u32")]
    stp_id: u32,
    #[serde(rename = "staNm")]
    sta_nm: String,
    #[serde(rename = "stpDe", default)]
    stp_de: String,
    #[serde(deserialize_with = "de_string")]
    rn: String,
    rt: String,
    #[serde(rename = "destSt", deserialize_with = "de_string")]
    dest_st: String,
    #[serde(rename = "destNm")]
    dest_nm: String,
    #[serde(rename = "trDr", deserialize_with = "de_string")]
    tr_dr: String,
    prdt: String,
    #[serde(rename = "arrT")]
    arr_t: String,
    #[serde(rename = "isApp", deserialize_with = "de_flag")]
    is_app: bool,
    #[serde(rename = "isSch", deserialize_with = "de_flag")]
    is_sch: bool,
    #[serde(rename = "isDly", deserialize_with = "de_flag")]
    is_dly: bool,
    #[serde(rename = "isFlt", deserialize_with = "de_flag")]
    is_flt: bool,
    #[serde(default, deserialize_with = "de_opt_string")]
    flags: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    lat: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    lon: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    heading: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PositionsPayload {
    tmst: String,
    #[serde(default, deserialize_with = "de_one_or_many")]
    route: Vec<RawRouteTrains>,
}

#[derive(Debug, Deserialize)]
struct RawRouteTrains {
    #[serde(rename = "@name")]
    name: String,
    #[serde(default, deserialize_with = "de_one_or_many")]
    train: Vec<RawTrain>,
}

#[derive(Debug, Deserialize)]
struct RawTrain {
    #[serde(deserialize_with = "de_string")]
    rn: String,
    #[serde(rename = "destSt", deserialize_with = "de_string")]
    dest_st: String,
    #[serde(rename = "destNm")]
    dest_nm: String,
    #[serde(rename = "trDr", deserialize_with = "de_string")]
    tr_dr: String,
    #[serde(rename = "nextStaId", deserialize_with = "de_string")]
    next_sta_id: String,
    #[serde(rename = "nextStpId", deserialize_with = "de_string")]
    next_stp_id: String,
    #[serde(rename = "nextStaNm")]
    next_sta_nm: String,
    prdt: String,
    #[serde(rename = "arrT")]
    arr_t: String,
    #[serde(rename = "isApp", deserialize_with = "de_flag")]
    is_app: bool,
    #[serde(rename = "isDly", deserialize_with = "de_flag")]
    is_dly: bool,
    #[serde(default, deserialize_with = "de_opt_string")]
    flags: Option<String>,
    #[serde(deserialize_with = "de_string")]
    lat: String,
    #[serde(deserialize_with = "de_string")]
    lon: String,
    #[serde(deserialize_with = "de_string")]
    heading: String,
}

#[derive(Debug, Deserialize)]
struct FollowPayload {
    tmst: String,
    position: RawPosition,
    #[serde(default)]
    eta: Vec<RawEta>,
}

#[derive(Debug, Deserialize)]
struct RawPosition {
    #[serde(deserialize_with = "de_string")]
    lat: String,
    #[serde(deserialize_with = "de_string")]
    lon: String,
    #[serde(deserialize_with = "de_string")]
    heading: String,
}

// ---------------------------------------------------------------------------
// Train Tracker API
// ---------------------------------------------------------------------------

/// Arrival selection for `/ttarrivals.aspx`. The id is auto-detected: a
/// 3xxxx value selects one platform (`stpid`), a 4xxxx value the whole
/// parent station (`mapid`).
#[derive(Debug, Clone)]
pub struct ArrivalsQuery {
    pub station_id: u32,
    pub line: Option<Line>,
    pub max: Option<u32>,
}

impl ArrivalsQuery {
    pub fn new(station_id: u32) -> Self {
        Self {
            station_id,
            line: None,
            max: None,
        }
    }

    fn params(&self) -> Result<Vec<(&'static str, String)>> {
        let mut params = match StopKind::classify(self.station_id)? {
            StopKind::TrainPlatform => vec![("stpid", self.station_id.to_string())],
            StopKind::ParentStation => vec![("mapid", self.station_id.to_string())],
            StopKind::Bus => {
                return Err(TransitError::unknown_id(
                    self.station_id,
                    "not a train stop or station id",
                ))
            }
        };
        if let Some(line) = self.line {
            params.push(("rt", line.route_code().to_string()));
        }
        if let Some(max) = self.max {
            params.push(("max", max.to_string()));
        }
        Ok(params)
    }
}

/// Client for the CTA Train Tracker API. Carries the station catalog so
/// reshaped rows can be joined with stop names and coordinates.
#[derive(Debug, Clone)]
pub struct TrainTracker {
    client: TransitClient,
    catalog: StationCatalog,
}

impl TrainTracker {
    pub fn new(client: TransitClient, catalog: StationCatalog) -> Self {
        Self { client, catalog }
    }

    pub fn catalog(&self) -> &StationCatalog {
        &self.catalog
    }

    /// Estimated arrivals for a platform or parent station.
    pub async fn arrivals(&self, query: ArrivalsQuery) -> Result<Vec<TrainArrivalRow>> {
        let params = query.params()?;
        let payload: ArrivalsPayload = self.client.train_api("ttarrivals.aspx", &params).await?;
        let feed_ts = parse_train_timestamp(&payload.tmst)?;

        payload
            .eta
            .into_iter()
            .map(|eta| {
                let prdt = parse_train_timestamp(&eta.prdt)?;
                let arr = parse_train_timestamp(&eta.arr_t)?;
                Ok(TrainArrivalRow {
                    stop_id: eta.stp_id,
                    stop_name: self
                        .catalog
                        .stop_name(eta.stp_id)
                        .unwrap_or("-")
                        .to_string(),
                    map_id: eta.sta_id,
                    station_name: eta.sta_nm,
                    station_desc: eta.stp_de,
                    run_number: eta.rn,
                    route: line_label(&eta.rt),
                    dest_stop: eta.dest_st,
                    dest_name: eta.dest_nm,
                    direction_code: eta.tr_dr,
                    predicted_at: eta.prdt,
                    eta: eta.arr_t,
                    due_in: DueIn(minutes_until(prdt, arr)),
                    updated_secs_ago: seconds_since_update(feed_ts, prdt),
                    approaching: eta.is_app,
                    scheduled: eta.is_sch,
                    delayed: eta.is_dly,
                    fault: eta.is_flt,
                    flags: eta.flags,
                    lat: eta.lat,
                    lon: eta.lon,
                    heading: eta.heading,
                })
            })
            .collect()
    }

    /// Live positions of every train on the given lines.
    pub async fn positions(&self, lines: &[Line]) -> Result<Vec<TrainPositionRow>> {
        if lines.is_empty() {
            return Err(TransitError::Validation {
                field: "lines".to_string(),
                reason: "at least one line is required".to_string(),
            });
        }
        let rt = lines
            .iter()
            .map(|l| l.route_code())
            .collect::<Vec<_>>()
            .join(",");
        let payload: PositionsPayload = self
            .client
            .train_api("ttpositions.aspx", &[("rt", rt)])
            .await?;
        let feed_ts = parse_train_timestamp(&payload.tmst)?;

        let mut rows = Vec::new();
        for route in payload.route {
            let line = line_label(&route.name);
            for train in route.train {
                let prdt = parse_train_timestamp(&train.prdt)?;
                let arr = parse_train_timestamp(&train.arr_t)?;
                rows.push(TrainPositionRow {
                    line: line.clone(),
                    run_number: train.rn,
                    dest_stop_id: train.dest_st,
                    service_name: train.dest_nm,
                    next_map_id: train.next_sta_id,
                    next_station_name: train.next_sta_nm,
                    next_stop_id: train.next_stp_id,
                    direction_code: train.tr_dr,
                    predicted_at: train.prdt,
                    eta: train.arr_t,
                    due_in: DueIn(minutes_until(prdt, arr)),
                    updated_secs_ago: seconds_since_update(feed_ts, prdt),
                    approaching: train.is_app,
                    delayed: train.is_dly,
                    flags: train.flags,
                    lat: train.lat,
                    lon: train.lon,
                    heading: train.heading,
                });
            }
        }
        Ok(rows)
    }

    /// Arrival board of one run: every upcoming stop with the train's
    /// current position attached.
    pub async fn follow(&self, run_number: &str) -> Result<Vec<FollowRow>> {
        let payload: FollowPayload = self
            .client
            .train_api("ttfollow.aspx", &[("runnumber", run_number.to_string())])
            .await?;
        let feed_ts = parse_train_timestamp(&payload.tmst)?;
        let position = payload.position;

        payload
            .eta
            .into_iter()
            .map(|eta| {
                let prdt = parse_train_timestamp(&eta.prdt)?;
                let arr = parse_train_timestamp(&eta.arr_t)?;
                let coords = self.catalog.stop_coords(eta.stp_id);
                Ok(FollowRow {
                    stop_id: eta.stp_id,
                    stop_lat: coords.map(|c| c.0),
                    stop_lon: coords.map(|c| c.1),
                    map_id: eta.sta_id,
                    station_name: eta.sta_nm,
                    service_desc: eta.stp_de,
                    service_name: eta.dest_nm.clone(),
                    run_number: eta.rn,
                    route: line_label(&eta.rt),
                    dest_map_id: eta.dest_st,
                    direction_code: eta.tr_dr,
                    predicted_at: eta.prdt,
                    eta: eta.arr_t,
                    due_in: DueIn(minutes_until(prdt, arr)),
                    updated_secs_ago: seconds_since_update(feed_ts, prdt),
                    approaching: eta.is_app,
                    scheduled: eta.is_sch,
                    delayed: eta.is_dly,
                    fault: eta.is_flt,
                    flags: eta.flags,
                    lat: position.lat.clone(),
                    lon: position.lon.clone(),
                    heading: position.heading.clone(),
                })
            })
            .collect()
    }
}

/// Feed route codes become the line's plain color name; unknown codes pass
/// through.
fn line_label(code: &str) -> String {
    Line::from_route_code(code)
        .map(|l| l.color().to_string())
        .unwrap_or_else(|_| code.to_string())
}

// ---------------------------------------------------------------------------
// Entity wrappers
// ---------------------------------------------------------------------------

/// One "L" line.
#[derive(Debug, Clone)]
pub struct TrainLine {
    tracker: TrainTracker,
    line: Line,
}

impl TrainLine {
    pub fn new(tracker: TrainTracker, line: &str) -> Result<TrainLine> {
        Ok(TrainLine {
            tracker,
            line: line.parse()?,
        })
    }

    pub fn line(&self) -> Line {
        self.line
    }

    /// The stations this line services.
    pub fn stations(&self) -> Vec<&StationRow> {
        self.tracker.catalog().stops_for_line(self.line)
    }

    /// Arrivals at a station, restricted to this line.
    pub async fn arrivals(&self, station_id: u32) -> Result<Vec<TrainArrivalRow>> {
        let mut query = ArrivalsQuery::new(station_id);
        query.line = Some(self.line);
        self.tracker.arrivals(query).await
    }

    /// Positions of every train on this line.
    pub async fn positions(&self) -> Result<Vec<TrainPositionRow>> {
        self.tracker.positions(&[self.line]).await
    }

    pub async fn follow(&self, run_number: &str) -> Result<Vec<FollowRow>> {
        self.tracker.follow(run_number).await
    }
}

/// An "L" parent station, resolved from either a platform id or a parent
/// station id.
#[derive(Debug, Clone)]
pub struct TrainStation {
    tracker: TrainTracker,
    map_id: u32,
    platforms: Vec<StationRow>,
}

impl TrainStation {
    pub fn new(tracker: TrainTracker, station_id: u32) -> Result<TrainStation> {
        let map_id = tracker.catalog().resolve_map_id(station_id)?;
        let platforms: Vec<StationRow> = tracker
            .catalog()
            .station(map_id)
            .into_iter()
            .cloned()
            .collect();
        Ok(TrainStation {
            tracker,
            map_id,
            platforms,
        })
    }

    pub fn map_id(&self) -> u32 {
        self.map_id
    }

    pub fn station_name(&self) -> &str {
        &self.platforms[0].station_name
    }

    pub fn description(&self) -> &str {
        &self.platforms[0].station_desc
    }

    pub fn coords(&self) -> (f64, f64) {
        (self.platforms[0].lat, self.platforms[0].lon)
    }

    /// The station's directional platforms.
    pub fn stops(&self) -> &[StationRow] {
        &self.platforms
    }

    /// Lines serviced by this station.
    pub fn routes(&self) -> Vec<Line> {
        let mut lines = Vec::new();
        for line in self.platforms.iter().flat_map(|p| p.lines()) {
            if !lines.contains(&line) {
                lines.push(line);
            }
        }
        lines
    }

    pub async fn arrivals(
        &self,
        line: Option<Line>,
        max: Option<u32>,
    ) -> Result<Vec<TrainArrivalRow>> {
        let query = ArrivalsQuery {
            station_id: self.map_id,
            line,
            max,
        };
        self.tracker.arrivals(query).await
    }
}

/// A single train run.
#[derive(Debug, Clone)]
pub struct Train {
    tracker: TrainTracker,
    run_number: String,
}

impl Train {
    pub fn new(tracker: TrainTracker, run_number: impl Into<String>) -> Self {
        Self {
            tracker,
            run_number: run_number.into(),
        }
    }

    pub fn run_number(&self) -> &str {
        &self.run_number
    }

    pub async fn follow(&self) -> Result<Vec<FollowRow>> {
        self.tracker.follow(&self.run_number).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrival_query_detects_id_kind() {
        let params = ArrivalsQuery::new(30_161).params().unwrap();
        assert_eq!(params[0], ("stpid", "30161".to_string()));

        let params = ArrivalsQuery::new(40_380).params().unwrap();
        assert_eq!(params[0], ("mapid", "40380".to_string()));

        assert!(ArrivalsQuery::new(1071).params().is_err());
    }

    #[test]
    fn arrival_query_attaches_line_and_max() {
        let query = ArrivalsQuery {
            station_id: 40_380,
            line: Some(Line::Brown),
            max: Some(5),
        };
        let params = query.params().unwrap();
        assert!(params.contains(&("rt", "Brn".to_string())));
        assert!(params.contains(&("max", "5".to_string())));
    }

    #[test]
    fn line_labels_map_route_codes() {
        assert_eq!(line_label("Brn"), "Brown");
        assert_eq!(line_label("G"), "Green");
        assert_eq!(line_label("Mystery"), "Mystery");
    }
}
