use anyhow::Result;
use httpmock::prelude::*;

use cta_tracker::core::bus::{Bus, BusRoute, BusStop};
use cta_tracker::core::train::{Train, TrainLine, TrainStation};
use cta_tracker::domain::model::{Direction, Line, StationRow};
use cta_tracker::{BusTracker, FileConfig, StationCatalog, TrainTracker, TransitClient, TransitError};

fn test_config(server: &MockServer) -> FileConfig {
    let mut config = FileConfig::default();
    config.keys.bus = vec!["test-bus-key".to_string()];
    config.keys.train = vec!["test-train-key".to_string()];
    config.bus_api_base = Some(server.base_url());
    config.train_api_base = Some(server.base_url());
    config
}

fn bus_tracker(server: &MockServer) -> BusTracker {
    BusTracker::new(TransitClient::new(&test_config(server)))
}

fn platform(stop_id: u32, direction: &str, brown: bool, purple: bool) -> StationRow {
    StationRow {
        stop_id,
        stop_name: format!("Belmont ({})", direction),
        station_name: "Belmont".to_string(),
        station_desc: "Belmont (Red, Brown & Purple lines)".to_string(),
        direction: direction.to_string(),
        map_id: 41_320,
        ada: true,
        red: true,
        blue: false,
        green: false,
        brown,
        purple: false,
        purple_exp: purple,
        yellow: false,
        pink: false,
        orange: false,
        lat: 41.939751,
        lon: -87.65338,
    }
}

fn train_tracker(server: &MockServer) -> TrainTracker {
    let catalog = StationCatalog::from_rows(vec![
        platform(30_255, "N", true, true),
        platform(30_256, "S", true, false),
    ]);
    TrainTracker::new(TransitClient::new(&test_config(server)), catalog)
}

fn mock_route_reference(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET).path("/getstops").query_param("rt", "22");
        then.status(200).json_body(serde_json::json!({
            "bustime-response": {
                "stops": [
                    {"stpid": "1926", "stpnm": "Clark & Addison", "lat": 41.947, "lon": -87.656}
                ]
            }
        }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/getpatterns").query_param("rt", "22");
        then.status(200).json_body(serde_json::json!({
            "bustime-response": {
                "ptr": [
                    {"pid": 5342, "ln": 29386.0, "rtdir": "Northbound", "pt": []},
                    {"pid": 5343, "ln": 29301.0, "rtdir": "Southbound", "pt": []}
                ]
            }
        }));
    });
}

#[tokio::test]
async fn bus_route_filters_vehicles_to_its_direction() -> Result<()> {
    let server = MockServer::start();
    mock_route_reference(&server);
    server.mock(|when, then| {
        when.method(GET).path("/getvehicles").query_param("rt", "22");
        then.status(200).json_body(serde_json::json!({
            "bustime-response": {
                "vehicle": [
                    {"vid": "4387", "tmstmp": "20240501 12:31", "lat": "41.947", "lon": "-87.656",
                     "hdg": "359", "pid": 5342, "rt": "22", "des": "Howard", "pdist": 100,
                     "dly": false, "tatripid": "1", "tablockid": "22 -712", "zone": ""},
                    {"vid": "4390", "tmstmp": "20240501 12:31", "lat": "41.920", "lon": "-87.656",
                     "hdg": "181", "pid": 5343, "rt": "22", "des": "Harrison", "pdist": 900,
                     "dly": false, "tatripid": "2", "tablockid": "22 -713", "zone": ""}
                ]
            }
        }));
    });

    let route = BusRoute::new(bus_tracker(&server), "22", "north").await?;
    assert_eq!(route.direction(), Direction::North);
    assert_eq!(route.pattern_ids(), &[5342]);

    let vehicles = route.vehicles().await?;
    assert_eq!(vehicles.len(), 1);
    assert_eq!(vehicles[0].vehicle_id, "4387");
    Ok(())
}

#[tokio::test]
async fn bus_route_rejects_foreign_stops_without_a_request() -> Result<()> {
    let server = MockServer::start();
    mock_route_reference(&server);

    let route = BusRoute::new(bus_tracker(&server), "22", "north").await?;
    let result = route.predictions("9999").await;
    assert!(matches!(result, Err(TransitError::UnknownId { .. })));
    Ok(())
}

#[tokio::test]
async fn bus_stop_requests_its_own_predictions() -> Result<()> {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/getpredictions").query_param("stpid", "1926");
        then.status(200)
            .json_body(serde_json::json!({"bustime-response": {"prd": []}}));
    });

    let stop = BusStop::new(bus_tracker(&server), "1926");
    stop.predictions().await?;
    mock.assert();
    Ok(())
}

#[tokio::test]
async fn bus_resolves_its_current_pattern() -> Result<()> {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/getvehicles").query_param("vid", "4387");
        then.status(200).json_body(serde_json::json!({
            "bustime-response": {
                "vehicle": [
                    {"vid": "4387", "tmstmp": "20240501 12:31", "lat": "41.947", "lon": "-87.656",
                     "hdg": "359", "pid": 5342, "rt": "22", "des": "Howard", "pdist": 100,
                     "dly": false, "tatripid": "1", "tablockid": "22 -712", "zone": ""}
                ]
            }
        }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/getpatterns").query_param("pid", "5342");
        then.status(200).json_body(serde_json::json!({
            "bustime-response": {
                "ptr": [{"pid": 5342, "ln": 29386.0, "rtdir": "Northbound", "pt": []}]
            }
        }));
    });

    let bus = Bus::new(bus_tracker(&server), "4387");
    let pattern = bus.pattern().await?.unwrap();
    assert_eq!(pattern.pattern_id, 5342);
    Ok(())
}

#[tokio::test]
async fn train_line_lists_its_stations_and_scopes_arrivals() -> Result<()> {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/ttarrivals.aspx")
            .query_param("mapid", "41320")
            .query_param("rt", "Brn");
        then.status(200).json_body(serde_json::json!({
            "ctatt": {"tmst": "2024-05-01T12:30:12", "errCd": "0", "errNm": null, "eta": []}
        }));
    });

    let line = TrainLine::new(train_tracker(&server), "brown")?;
    assert_eq!(line.line(), Line::Brown);
    assert_eq!(line.stations().len(), 2);

    line.arrivals(41_320).await?;
    mock.assert();
    Ok(())
}

#[tokio::test]
async fn train_station_resolves_platform_ids_to_the_parent() -> Result<()> {
    let server = MockServer::start();
    let station = TrainStation::new(train_tracker(&server), 30_255)?;

    assert_eq!(station.map_id(), 41_320);
    assert_eq!(station.station_name(), "Belmont");
    assert_eq!(station.stops().len(), 2);
    assert_eq!(
        station.routes(),
        vec![Line::Red, Line::Brown, Line::Purple, Line::PurpleExpress]
    );
    Ok(())
}

#[tokio::test]
async fn unknown_station_ids_fail_before_any_request() {
    let server = MockServer::start();
    assert!(matches!(
        TrainStation::new(train_tracker(&server), 49_999),
        Err(TransitError::UnknownId { .. })
    ));
    assert!(matches!(
        TrainStation::new(train_tracker(&server), 1071),
        Err(TransitError::UnknownId { .. })
    ));
}

#[tokio::test]
async fn train_follows_its_run_number() -> Result<()> {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/ttfollow.aspx")
            .query_param("runnumber", "415");
        then.status(200).json_body(serde_json::json!({
            "ctatt": {
                "tmst": "2024-05-01T12:30:12",
                "errCd": "0",
                "errNm": null,
                "position": {"lat": "41.93744", "lon": "-87.65338", "heading": "180"},
                "eta": []
            }
        }));
    });

    let train = Train::new(train_tracker(&server), "415");
    train.follow().await?;
    mock.assert();
    Ok(())
}
