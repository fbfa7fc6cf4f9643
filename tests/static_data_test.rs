use std::io::{Cursor, Write};

use anyhow::Result;
use httpmock::prelude::*;
use tempfile::TempDir;

use cta_tracker::config::cache::LocalCache;
use cta_tracker::core::static_feed::{self, GTFS_TABLES};
use cta_tracker::{BusTracker, FileConfig, StaticFeed, StationCatalog, TransitClient};

fn test_config(server: &MockServer, cache_dir: &TempDir) -> FileConfig {
    let mut config = FileConfig::default();
    config.keys.bus = vec!["test-bus-key".to_string()];
    config.cache_dir = Some(cache_dir.path().to_string_lossy().into_owned());
    config.bus_api_base = Some(server.base_url());
    config.gtfs_static_url = Some(format!("{}/google_transit.zip", server.base_url()));
    config.stations_url = Some(format!("{}/stations.json", server.base_url()));
    config
}

fn gtfs_zip() -> Result<Vec<u8>> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for table in GTFS_TABLES {
        zip.start_file(format!("{}.txt", table), options)?;
        match table {
            "stops" => {
                writeln!(zip, "stop_id,stop_code,stop_name,stop_desc,stop_lat,stop_lon,location_type,parent_station,wheelchair_boarding")?;
                writeln!(zip, "1926,1926,Clark & Addison,\"Clark & Addison, Northbound, East Side\",41.947,-87.656,0,,1")?;
                writeln!(zip, "40380,,Clark/Lake,,41.8857,-87.6307,1,,1")?;
            }
            "trips" => {
                writeln!(zip, "route_id,service_id,trip_id,direction_id,block_id,shape_id,direction,wheelchair_accessible,schd_trip_id")?;
                writeln!(zip, "22,100,T1,1,B1,S1,North,1,R1")?;
                writeln!(zip, "36,100,T2,1,B2,S2,North,1,R2")?;
                writeln!(zip, "22,100,T3,0,B1,S1,South,1,R3")?;
            }
            "stop_times" => {
                writeln!(zip, "trip_id,arrival_time,departure_time,stop_id,stop_sequence,stop_headsign,pickup_type,shape_dist_traveled")?;
                writeln!(zip, "T1,08:00:00,08:00:00,1926,1,Howard,0,0")?;
                writeln!(zip, "T2,08:05:00,08:05:00,1926,2,Devon,0,0")?;
                writeln!(zip, "T3,08:10:00,08:10:00,1926,3,Harrison,0,0")?;
            }
            _ => writeln!(zip, "id\nplaceholder")?,
        }
    }
    Ok(zip.finish()?.into_inner())
}

#[tokio::test]
async fn update_caches_every_gtfs_table() -> Result<()> {
    let server = MockServer::start();
    let temp = TempDir::new()?;
    server.mock(|when, then| {
        when.method(GET).path("/google_transit.zip");
        then.status(200).body(gtfs_zip().unwrap());
    });

    let config = test_config(&server, &temp);
    let client = TransitClient::new(&config);
    let feed = StaticFeed::new(LocalCache::new(config.cache_dir()));

    feed.update(&client).await?;

    for table in GTFS_TABLES {
        assert!(
            temp.path().join(format!("{}.txt", table)).exists(),
            "{} missing",
            table
        );
    }

    let stops = feed.stops().await?;
    assert_eq!(stops.len(), 2);
    assert_eq!(stops[0].stop_name, "Clark & Addison");
    assert_eq!(stops[0].direction, "N");
    assert_eq!(stops[1].direction, "-");

    // The trip tables join into a per-stop list of serving routes.
    let index = feed.stop_routes().await?;
    assert_eq!(index.routes(1926), vec!["22", "36"]);
    assert!(index.routes(40_380).is_empty());
    Ok(())
}

#[tokio::test]
async fn gtfs_table_rejects_unknown_names() -> Result<()> {
    let temp = TempDir::new()?;
    let feed = StaticFeed::new(LocalCache::new(
        temp.path().to_string_lossy().into_owned(),
    ));
    assert!(feed.table("fare_rules").await.is_err());
    Ok(())
}

#[tokio::test]
async fn station_catalog_fetches_once_then_reads_the_cache() -> Result<()> {
    let server = MockServer::start();
    let temp = TempDir::new()?;
    let mock = server.mock(|when, then| {
        when.method(GET).path("/stations.json");
        then.status(200).json_body(serde_json::json!([
            {"stop_id": "30074", "direction_id": "E", "stop_name": "Clark/Lake (Inner Loop)",
             "station_name": "Clark/Lake", "station_descriptive_name": "Clark/Lake (Blue & Loop lines)",
             "map_id": "40380", "ada": true, "red": false, "blue": true, "g": true,
             "brn": true, "p": false, "pexp": true, "y": false, "pnk": true, "o": true,
             "location": {"latitude": "41.885737", "longitude": "-87.630886"}},
            {"stop_id": "30075", "direction_id": "W", "stop_name": "Clark/Lake (Outer Loop)",
             "station_name": "Clark/Lake", "station_descriptive_name": "Clark/Lake (Blue & Loop lines)",
             "map_id": "40380", "ada": true, "red": false, "blue": true, "g": true,
             "brn": true, "p": false, "pexp": true, "y": false, "pnk": true, "o": true,
             "location": {"latitude": "41.885737", "longitude": "-87.630886"}}
        ]));
    });

    let config = test_config(&server, &temp);
    let client = TransitClient::new(&config);
    let cache = LocalCache::new(config.cache_dir());

    let catalog = StationCatalog::load(&cache, &client).await?;
    assert_eq!(catalog.rows().len(), 2);
    assert_eq!(catalog.resolve_map_id(30_074)?, 40_380);
    assert_eq!(catalog.stop_name(30_075), Some("Clark/Lake (Outer Loop)"));

    // Second load must come from disk, not the network.
    let catalog = StationCatalog::load(&cache, &client).await?;
    assert_eq!(catalog.rows().len(), 2);
    mock.assert_hits(1);
    Ok(())
}

#[tokio::test]
async fn bus_route_cache_round_trips() -> Result<()> {
    let server = MockServer::start();
    let temp = TempDir::new()?;
    server.mock(|when, then| {
        when.method(GET).path("/getroutes");
        then.status(200).json_body(serde_json::json!({
            "bustime-response": {
                "routes": [{"rt": "22", "rtnm": "Clark", "rtclr": "#336633", "rtdd": "22"}]
            }
        }));
    });

    let config = test_config(&server, &temp);
    let client = TransitClient::new(&config);
    let cache = LocalCache::new(config.cache_dir());
    let tracker = BusTracker::new(client);

    static_feed::update_bus_routes(&cache, &tracker).await?;
    let routes = static_feed::bus_routes(&cache).await?;
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].route_name, "Clark");
    Ok(())
}
