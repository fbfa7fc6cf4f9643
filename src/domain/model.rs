use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::utils::error::{Result, TransitError};

/// Cardinal service direction of a bus route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    /// The form the Bus Tracker API expects in the `dir` parameter.
    pub fn bound(&self) -> &'static str {
        match self {
            Direction::North => "Northbound",
            Direction::South => "Southbound",
            Direction::East => "Eastbound",
            Direction::West => "Westbound",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Direction::North => "N",
            Direction::South => "S",
            Direction::East => "E",
            Direction::West => "W",
        }
    }

    /// Derives a direction from a GTFS stop description like
    /// "State & Lake, Northbound, East Side of Street".
    pub fn from_stop_desc(desc: &str) -> Option<Direction> {
        let lower = desc.to_lowercase();
        if lower.contains("northbound") {
            Some(Direction::North)
        } else if lower.contains("southbound") {
            Some(Direction::South)
        } else if lower.contains("eastbound") {
            Some(Direction::East)
        } else if lower.contains("westbound") {
            Some(Direction::West)
        } else {
            None
        }
    }
}

impl FromStr for Direction {
    type Err = TransitError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        if lower == "n" || lower.contains("north") {
            Ok(Direction::North)
        } else if lower == "s" || lower.contains("south") {
            Ok(Direction::South)
        } else if lower == "e" || lower.contains("east") {
            Ok(Direction::East)
        } else if lower == "w" || lower.contains("west") {
            Ok(Direction::West)
        } else {
            Err(TransitError::unknown_id(s, "not a direction"))
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.bound())
    }
}

/// One of the "L" lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Line {
    Red,
    Blue,
    Brown,
    Green,
    Orange,
    Purple,
    PurpleExpress,
    Pink,
    Yellow,
}

impl Line {
    pub const ALL: [Line; 9] = [
        Line::Red,
        Line::Blue,
        Line::Brown,
        Line::Green,
        Line::Orange,
        Line::Purple,
        Line::PurpleExpress,
        Line::Pink,
        Line::Yellow,
    ];

    /// Route code used by the Train Tracker API (`rt` parameter).
    pub fn route_code(&self) -> &'static str {
        match self {
            Line::Red => "Red",
            Line::Blue => "Blue",
            Line::Brown => "Brn",
            Line::Green => "G",
            Line::Orange => "Org",
            Line::Purple => "P",
            Line::PurpleExpress => "Pexp",
            Line::Pink => "Pink",
            Line::Yellow => "Y",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Line::Red => "Red Line",
            Line::Blue => "Blue Line",
            Line::Brown => "Brown Line",
            Line::Green => "Green Line",
            Line::Orange => "Orange Line",
            Line::Purple => "Purple Line",
            Line::PurpleExpress => "Purple Line Express",
            Line::Pink => "Pink Line",
            Line::Yellow => "Yellow Line",
        }
    }

    /// Terminal-to-terminal service label.
    pub fn label(&self) -> &'static str {
        match self {
            Line::Red => "Howard-95th/Dan Ryan",
            Line::Blue => "O'Hare-Forest Park",
            Line::Brown => "Kimball-Loop",
            Line::Green => "Harlem/Lake-Ashland/63rd-Cottage Grove",
            Line::Orange => "Midway-Loop",
            Line::Purple => "Linden-Howard shuttle",
            Line::PurpleExpress => "Linden-Loop",
            Line::Pink => "54th/Cermak-Loop",
            Line::Yellow => "Skokie-Howard [Skokie Swift] shuttle",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Line::Red => "Red",
            Line::Blue => "Blue",
            Line::Brown => "Brown",
            Line::Green => "Green",
            Line::Orange => "Orange",
            Line::Purple | Line::PurpleExpress => "Purple",
            Line::Pink => "Pink",
            Line::Yellow => "Yellow",
        }
    }

    /// Boolean column in the station reference table that marks stations
    /// serviced by this line.
    pub fn station_column(&self) -> &'static str {
        match self {
            Line::Red => "red",
            Line::Blue => "blue",
            Line::Brown => "brown",
            Line::Green => "green",
            Line::Orange => "orange",
            Line::Purple => "purple",
            Line::PurpleExpress => "purple_exp",
            Line::Pink => "pink",
            Line::Yellow => "yellow",
        }
    }

    /// The positions feed reports route names in lowercase, so codes match
    /// case-insensitively.
    pub fn from_route_code(code: &str) -> Result<Line> {
        match code.to_lowercase().as_str() {
            "red" => Ok(Line::Red),
            "blue" => Ok(Line::Blue),
            "brn" => Ok(Line::Brown),
            "g" => Ok(Line::Green),
            "org" => Ok(Line::Orange),
            "p" => Ok(Line::Purple),
            "pexp" => Ok(Line::PurpleExpress),
            "pink" => Ok(Line::Pink),
            "y" => Ok(Line::Yellow),
            other => Err(TransitError::unknown_id(other, "not an L route code")),
        }
    }
}

impl FromStr for Line {
    type Err = TransitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "red" | "r" => Ok(Line::Red),
            "blue" | "bl" => Ok(Line::Blue),
            "brown" | "br" | "brn" => Ok(Line::Brown),
            "green" | "g" => Ok(Line::Green),
            "orange" | "o" | "org" => Ok(Line::Orange),
            "purple" | "p" => Ok(Line::Purple),
            "purpleexp" | "purple_exp" | "purple_express" | "pexp" | "p_exp" | "exp"
            | "express" => Ok(Line::PurpleExpress),
            "pink" | "pnk" => Ok(Line::Pink),
            "yellow" | "y" => Ok(Line::Yellow),
            _ => Line::from_route_code(s.trim()),
        }
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// Stop-id ranges across the whole system:
//   0-29999       bus stops
//   30000-39999   train stops (directional platforms)
//   40000-49999   train stations (parent stops)
// Anything above 49999 belongs to no entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopKind {
    Bus,
    TrainPlatform,
    ParentStation,
}

impl StopKind {
    pub fn classify(stop_id: u32) -> Result<StopKind> {
        match stop_id {
            0..=29_999 => Ok(StopKind::Bus),
            30_000..=39_999 => Ok(StopKind::TrainPlatform),
            40_000..=49_999 => Ok(StopKind::ParentStation),
            other => Err(TransitError::unknown_id(
                other,
                "outside every stop-id range",
            )),
        }
    }

    pub fn is_train(&self) -> bool {
        !matches!(self, StopKind::Bus)
    }
}

/// Minutes until a vehicle's arrival, rendered the way the official trackers
/// show it: `Due` at one minute or less, otherwise `N mins`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DueIn(pub i64);

impl fmt::Display for DueIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 <= 1 {
            f.write_str("Due")
        } else {
            write!(f, "{} mins", self.0)
        }
    }
}

impl Serialize for DueIn {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ---------------------------------------------------------------------------
// Tabular result rows
// ---------------------------------------------------------------------------

/// A bus route from `/getroutes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRow {
    pub route_id: String,
    pub route_name: String,
    pub route_color: String,
    pub route_dd: String,
}

/// A stop along a bus route from `/getstops`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopRow {
    pub stop_id: String,
    pub stop_name: String,
    pub lat: f64,
    pub lon: f64,
}

/// A bus geolocation from `/getvehicles`.
#[derive(Debug, Clone, Serialize)]
pub struct VehicleRow {
    pub vehicle_id: String,
    pub timestamp: String,
    pub lat: String,
    pub lon: String,
    pub heading: String,
    pub pattern_id: u64,
    pub route: String,
    pub destination: String,
    pub distance: u64,
    pub delayed: bool,
    pub trip_id: String,
    pub block_id: String,
    pub zone: String,
}

/// A predicted bus arrival or departure from `/getpredictions`.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionRow {
    pub timestamp: String,
    pub kind: String,
    pub stop_name: String,
    pub stop_id: String,
    pub vehicle_id: String,
    pub distance_remaining: u64,
    pub route: String,
    pub direction: String,
    pub destination: String,
    pub predicted_time: String,
    pub due_in: String,
    pub block_id: String,
    pub trip_id: String,
    pub delayed: bool,
}

/// One point of a route variation from `/getpatterns`.
#[derive(Debug, Clone, Serialize)]
pub struct PatternPoint {
    pub sequence: u32,
    pub kind: String,
    pub stop_id: Option<String>,
    pub stop_name: Option<String>,
    pub lat: f64,
    pub lon: f64,
    pub distance: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pattern {
    pub pattern_id: u64,
    pub length: f64,
    pub direction: String,
    pub points: Vec<PatternPoint>,
}

/// An estimated train arrival from `/ttarrivals.aspx`.
#[derive(Debug, Clone, Serialize)]
pub struct TrainArrivalRow {
    pub stop_id: u32,
    pub stop_name: String,
    pub map_id: u32,
    pub station_name: String,
    pub station_desc: String,
    pub run_number: String,
    pub route: String,
    pub dest_stop: String,
    pub dest_name: String,
    pub direction_code: String,
    pub predicted_at: String,
    pub eta: String,
    pub due_in: DueIn,
    pub updated_secs_ago: i64,
    pub approaching: bool,
    pub scheduled: bool,
    pub delayed: bool,
    pub fault: bool,
    pub flags: Option<String>,
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub heading: Option<String>,
}

/// A live train position from `/ttpositions.aspx`.
#[derive(Debug, Clone, Serialize)]
pub struct TrainPositionRow {
    pub line: String,
    pub run_number: String,
    pub dest_stop_id: String,
    pub service_name: String,
    pub next_map_id: String,
    pub next_station_name: String,
    pub next_stop_id: String,
    pub direction_code: String,
    pub predicted_at: String,
    pub eta: String,
    pub due_in: DueIn,
    pub updated_secs_ago: i64,
    pub approaching: bool,
    pub delayed: bool,
    pub flags: Option<String>,
    pub lat: String,
    pub lon: String,
    pub heading: String,
}

/// One upcoming stop for a followed run from `/ttfollow.aspx`.
#[derive(Debug, Clone, Serialize)]
pub struct FollowRow {
    pub stop_id: u32,
    pub stop_lat: Option<f64>,
    pub stop_lon: Option<f64>,
    pub map_id: u32,
    pub station_name: String,
    pub service_desc: String,
    pub service_name: String,
    pub run_number: String,
    pub route: String,
    pub dest_map_id: String,
    pub direction_code: String,
    pub predicted_at: String,
    pub eta: String,
    pub due_in: DueIn,
    pub updated_secs_ago: i64,
    pub approaching: bool,
    pub scheduled: bool,
    pub delayed: bool,
    pub fault: bool,
    pub flags: Option<String>,
    pub lat: String,
    pub lon: String,
    pub heading: String,
}

/// Overall route status from the alerts `/routes.aspx` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RouteStatusRow {
    pub service: String,
    pub service_id: String,
    pub status: String,
    pub status_color: String,
    pub route_color: String,
    pub route_text_color: String,
    pub url: Option<String>,
}

/// One rider alert from the alerts `/alerts.aspx` endpoint, flattened to one
/// row per impacted service.
#[derive(Debug, Clone, Serialize)]
pub struct AlertRow {
    pub service_type: String,
    pub service_type_desc: String,
    pub service_name: String,
    pub service_id: String,
    pub service_back_color: String,
    pub service_text_color: String,
    pub alert_id: String,
    pub headline: String,
    pub description: String,
    pub impact: String,
    pub severity_score: String,
    pub severity_color: String,
    pub severity_css: String,
    pub event_start: Option<String>,
    pub event_end: Option<String>,
    pub tbd: String,
    pub major: String,
}

/// One platform row of the train station reference table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationRow {
    pub stop_id: u32,
    pub stop_name: String,
    pub station_name: String,
    pub station_desc: String,
    pub direction: String,
    pub map_id: u32,
    pub ada: bool,
    pub red: bool,
    pub blue: bool,
    pub green: bool,
    pub brown: bool,
    pub purple: bool,
    pub purple_exp: bool,
    pub yellow: bool,
    pub pink: bool,
    pub orange: bool,
    pub lat: f64,
    pub lon: f64,
}

impl StationRow {
    pub fn serves(&self, line: Line) -> bool {
        match line {
            Line::Red => self.red,
            Line::Blue => self.blue,
            Line::Brown => self.brown,
            Line::Green => self.green,
            Line::Orange => self.orange,
            Line::Purple => self.purple || self.purple_exp,
            Line::PurpleExpress => self.purple_exp,
            Line::Pink => self.pink,
            Line::Yellow => self.yellow,
        }
    }

    pub fn lines(&self) -> Vec<Line> {
        Line::ALL
            .iter()
            .copied()
            .filter(|line| self.serves(*line))
            .collect()
    }
}

/// A row of GTFS `stops.txt` with the derived direction column.
#[derive(Debug, Clone, Serialize)]
pub struct GtfsStopRow {
    pub stop_id: u32,
    pub stop_code: String,
    pub map_id: String,
    pub stop_name: String,
    pub stop_desc: String,
    pub direction: String,
    pub lat: f64,
    pub lon: f64,
    pub location_type: String,
    pub wheelchair_boarding: String,
}

/// A stop near the caller, as returned by `/api/stoplist`.
#[derive(Debug, Clone, Serialize)]
pub struct NearbyStop {
    pub stop_id: u32,
    pub stop_name: String,
    pub stop_type: StopKind,
    pub is_parent: bool,
    pub direction: String,
    pub routes: Vec<String>,
    pub lat: f64,
    pub lon: f64,
    pub distance_km: f64,
}

/// Renders any slice of flat rows as CSV with a header row.
pub fn to_csv<T: Serialize>(rows: &[T]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| TransitError::config(format!("CSV writer flush failed: {}", e)))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
