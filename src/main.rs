use clap::Parser;
use serde::Serialize;

use cta_tracker::config::cache::LocalCache;
use cta_tracker::config::{Cli, Command, FileConfig};
use cta_tracker::core::alerts::{DetailsQuery, StatusQuery};
use cta_tracker::core::bus::{PredictionQuery, VehicleQuery};
use cta_tracker::core::static_feed::{self, closest_stops, stop_search};
use cta_tracker::core::train::ArrivalsQuery;
use cta_tracker::domain::model::{to_csv, Direction, Line, NearbyStop, Pattern, StopKind};
use cta_tracker::utils::{logger, validation::Validate};
use cta_tracker::{
    BusTracker, CustomerAlerts, Result, StaticFeed, StationCatalog, TrainTracker, TransitClient,
    TransitError,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { .. } => logger::init_server_logger(),
        _ => logger::init_cli_logger(cli.verbose),
    }

    if let Err(e) = run(cli).await {
        tracing::error!("command failed: {}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = FileConfig::resolve(cli.config.as_deref().map(std::path::Path::new))?;
    config.validate()?;

    let client = TransitClient::new(&config);
    let cache = LocalCache::new(config.cache_dir());
    let json = cli.json;

    match cli.command {
        Command::BusRoutes { cached } => {
            let rows = if cached {
                static_feed::bus_routes(&cache).await?
            } else {
                BusTracker::new(client).routes().await?
            };
            emit(&rows, json)
        }
        Command::BusDirections { route } => {
            let directions = BusTracker::new(client).directions(&route).await?;
            let rows: Vec<DirectionRow> = directions
                .iter()
                .map(|d| DirectionRow {
                    direction: d.bound().to_string(),
                })
                .collect();
            emit(&rows, json)
        }
        Command::BusStops { route, direction } => {
            let direction: Direction = direction.parse()?;
            let rows = BusTracker::new(client).stops(&route, direction).await?;
            emit(&rows, json)
        }
        Command::BusVehicles { route, vid } => {
            let query = match (route, vid) {
                (Some(route), None) => VehicleQuery::Route(route),
                (None, Some(vid)) => VehicleQuery::Vehicles(vid),
                _ => {
                    return Err(TransitError::Validation {
                        field: "vehicles".to_string(),
                        reason: "exactly one of --route or --vid is required".to_string(),
                    })
                }
            };
            let rows = BusTracker::new(client).vehicles(query).await?;
            emit(&rows, json)
        }
        Command::BusPredictions {
            stpid,
            vid,
            route,
            top,
        } => {
            let query = PredictionQuery {
                stop_ids: stpid,
                vehicle_ids: vid,
                route,
                top,
            };
            let rows = BusTracker::new(client).predictions(query).await?;
            emit(&rows, json)
        }
        Command::BusPatterns { route } => {
            let patterns = BusTracker::new(client).patterns(&route).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&patterns)?);
                Ok(())
            } else {
                emit(&flatten_patterns(&patterns), false)
            }
        }
        Command::TrainArrivals {
            station_id,
            line,
            max,
        } => {
            let tracker = train_tracker(&cache, client).await?;
            let query = ArrivalsQuery {
                station_id,
                line: line.as_deref().map(str::parse).transpose()?,
                max,
            };
            let rows = tracker.arrivals(query).await?;
            emit(&rows, json)
        }
        Command::TrainPositions { lines } => {
            let lines: Vec<Line> = lines
                .iter()
                .map(|l| l.parse())
                .collect::<Result<Vec<_>>>()?;
            let tracker = train_tracker(&cache, client).await?;
            let rows = tracker.positions(&lines).await?;
            emit(&rows, json)
        }
        Command::TrainFollow { run_number } => {
            let tracker = train_tracker(&cache, client).await?;
            let rows = tracker.follow(&run_number).await?;
            emit(&rows, json)
        }
        Command::Stations { line } => {
            let catalog = StationCatalog::load(&cache, &client).await?;
            let rows = match line {
                Some(line) => {
                    let line: Line = line.parse()?;
                    catalog
                        .stops_for_line(line)
                        .into_iter()
                        .cloned()
                        .collect::<Vec<_>>()
                }
                None => catalog.rows().to_vec(),
            };
            emit(&rows, json)
        }
        Command::StopSearch {
            query,
            direction,
            kind,
        } => {
            let stops = StaticFeed::new(LocalCache::new(config.cache_dir()))
                .stops()
                .await?;
            let direction = direction.as_deref().map(str::parse).transpose()?;
            let kind = kind.as_deref().map(parse_stop_kind).transpose()?;
            let rows: Vec<_> = stop_search(&stops, &query, direction, kind)
                .into_iter()
                .cloned()
                .collect();
            emit(&rows, json)
        }
        Command::Nearby { lat, lon, count } => {
            let feed = StaticFeed::new(LocalCache::new(config.cache_dir()));
            let stops = feed.stops().await?;
            let catalog = StationCatalog::load(&cache, &client).await.ok();
            let bus_routes = feed.stop_routes().await.ok();
            let mut rows: Vec<NearbyStop> = closest_stops(
                &stops,
                catalog.as_ref(),
                bus_routes.as_ref(),
                lat,
                lon,
                count,
                StopKind::Bus,
            );
            rows.extend(closest_stops(
                &stops,
                catalog.as_ref(),
                bus_routes.as_ref(),
                lat,
                lon,
                count,
                StopKind::ParentStation,
            ));
            rows.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
            emit(&rows, json)
        }
        Command::AlertsStatus {
            service,
            route,
            station,
        } => {
            let query = StatusQuery {
                service_type: service,
                route,
                station,
            };
            let rows = CustomerAlerts::new(client).status(query).await?;
            emit(&rows, json)
        }
        Command::AlertsDetails {
            active_only,
            accessibility,
            planned,
            route,
            station,
            by_start_date,
            recent_days,
        } => {
            let query = DetailsQuery {
                active_only,
                accessibility,
                planned,
                route,
                station,
                by_start_date,
                recent_days,
            };
            let rows = CustomerAlerts::new(client).details(query).await?;
            emit(&rows, json)
        }
        Command::Gtfs { table } => {
            let feed = StaticFeed::new(LocalCache::new(config.cache_dir()));
            print!("{}", feed.table(&table).await?);
            Ok(())
        }
        Command::Update => {
            let feed = StaticFeed::new(LocalCache::new(config.cache_dir()));
            feed.update(&client).await?;
            StationCatalog::update(&cache, &client).await?;
            static_feed::update_bus_routes(&cache, &BusTracker::new(client)).await?;
            tracing::info!("reference data refreshed in {}", config.cache_dir());
            Ok(())
        }
        Command::Serve { bind } => cta_tracker::server::run(&config, &bind).await,
    }
}

async fn train_tracker(cache: &LocalCache, client: TransitClient) -> Result<TrainTracker> {
    let catalog = StationCatalog::load(cache, &client).await?;
    Ok(TrainTracker::new(client, catalog))
}

fn parse_stop_kind(raw: &str) -> Result<StopKind> {
    match raw.to_lowercase().as_str() {
        "bus" => Ok(StopKind::Bus),
        "train" | "rail" => Ok(StopKind::TrainPlatform),
        other => Err(TransitError::unknown_id(other, "expected \"bus\" or \"train\"")),
    }
}

fn emit<T: Serialize>(rows: &[T], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(rows)?);
    } else {
        print!("{}", to_csv(rows)?);
    }
    Ok(())
}

#[derive(Serialize)]
struct DirectionRow {
    direction: String,
}

#[derive(Serialize)]
struct PatternPointRow {
    pattern_id: u64,
    direction: String,
    sequence: u32,
    kind: String,
    stop_id: Option<String>,
    stop_name: Option<String>,
    lat: f64,
    lon: f64,
    distance: Option<f64>,
}

fn flatten_patterns(patterns: &[Pattern]) -> Vec<PatternPointRow> {
    patterns
        .iter()
        .flat_map(|p| {
            p.points.iter().map(move |pt| PatternPointRow {
                pattern_id: p.pattern_id,
                direction: p.direction.clone(),
                sequence: pt.sequence,
                kind: pt.kind.clone(),
                stop_id: pt.stop_id.clone(),
                stop_name: pt.stop_name.clone(),
                lat: pt.lat,
                lon: pt.lon,
                distance: pt.distance,
            })
        })
        .collect()
}
