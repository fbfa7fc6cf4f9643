use std::fmt::Write as _;

use actix_web::{middleware::DefaultHeaders, web, App, HttpResponse, HttpServer, Responder};
use serde::{Deserialize, Serialize};

use crate::config::cache::LocalCache;
use crate::config::FileConfig;
use crate::core::client::TransitClient;
use crate::core::static_feed::{closest_stops, StaticFeed, StationCatalog, StopRouteIndex};
use crate::domain::model::{GtfsStopRow, NearbyStop, StopKind};
use crate::utils::error::{Result, TransitError};

const INDEX_HTML: &str = include_str!("../static/index.html");

/// How many stops of each mode the nearby view shows.
const NEARBY_COUNT: usize = 3;

struct AppState {
    stops: Vec<GtfsStopRow>,
    catalog: Option<StationCatalog>,
    bus_routes: Option<StopRouteIndex>,
}

#[derive(Debug, Deserialize)]
struct StoplistRequest {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Serialize)]
struct StoplistResponse {
    all_stops: Vec<NearbyStop>,
    bus_stops: Vec<NearbyStop>,
    train_stops: Vec<NearbyStop>,
    stoplist_html: String,
}

async fn index() -> impl Responder {
    HttpResponse::Ok()
        .insert_header(("Content-Type", "text/html; charset=utf-8"))
        .body(INDEX_HTML)
}

async fn stoplist(
    state: web::Data<AppState>,
    body: web::Json<StoplistRequest>,
) -> impl Responder {
    tracing::info!("stoplist request at ({}, {})", body.lat, body.lon);

    let bus_stops = closest_stops(
        &state.stops,
        state.catalog.as_ref(),
        state.bus_routes.as_ref(),
        body.lat,
        body.lon,
        NEARBY_COUNT,
        StopKind::Bus,
    );
    let train_stops = closest_stops(
        &state.stops,
        state.catalog.as_ref(),
        state.bus_routes.as_ref(),
        body.lat,
        body.lon,
        NEARBY_COUNT,
        StopKind::ParentStation,
    );

    let mut all_stops: Vec<NearbyStop> = bus_stops
        .iter()
        .chain(train_stops.iter())
        .cloned()
        .collect();
    all_stops.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));

    let stoplist_html = render_stoplist(&all_stops);
    HttpResponse::Ok().json(StoplistResponse {
        all_stops,
        bus_stops,
        train_stops,
        stoplist_html,
    })
}

/// Renders the nearby stops as a ready-to-inject HTML list.
fn render_stoplist(stops: &[NearbyStop]) -> String {
    let mut html = String::from("<ul class=\"stoplist\">\n");
    for stop in stops {
        let mode = match stop.stop_type {
            StopKind::Bus => "bus",
            _ => "train",
        };
        let mut meta = format!("{:.2} km", stop.distance_km);
        if !stop.routes.is_empty() {
            meta = format!("{} · {}", stop.routes.join(", "), meta);
        }
        if stop.direction != "-" && !stop.direction.is_empty() {
            meta = format!("{} ({})", meta, stop.direction);
        }
        let _ = writeln!(
            html,
            "  <li class=\"stop stop-{}\" data-stop-id=\"{}\">\
             <span class=\"stop-name\">{}</span> \
             <span class=\"stop-meta\">{}</span></li>",
            mode,
            stop.stop_id,
            escape_html(&stop.stop_name),
            escape_html(&meta),
        );
    }
    html.push_str("</ul>\n");
    html
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Loads the cached reference data and serves the nearby-stops app until
/// interrupted.
pub async fn run(config: &FileConfig, bind: &str) -> Result<()> {
    let cache = LocalCache::new(config.cache_dir());
    let client = TransitClient::new(config);

    let feed = StaticFeed::new(LocalCache::new(config.cache_dir()));
    let stops = feed.stops().await.map_err(|e| {
        TransitError::config(format!(
            "no cached GTFS stops, run the update command first ({e})"
        ))
    })?;
    let catalog = match StationCatalog::load(&cache, &client).await {
        Ok(catalog) => Some(catalog),
        Err(e) => {
            tracing::warn!("station catalog unavailable, train stops unlabeled: {e}");
            None
        }
    };
    let bus_routes = match feed.stop_routes().await {
        Ok(index) => Some(index),
        Err(e) => {
            tracing::warn!("trip tables unavailable, bus stops unlabeled: {e}");
            None
        }
    };
    tracing::info!(
        "serving {} stops on http://{}",
        stops.len(),
        bind
    );

    let state = web::Data::new(AppState {
        stops,
        catalog,
        bus_routes,
    });
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(DefaultHeaders::new().add(("Access-Control-Allow-Origin", "*")))
            .route("/", web::get().to(index))
            .route("/api/stoplist", web::post().to(stoplist))
    })
    .bind(bind)
    .map_err(|e| TransitError::config(format!("cannot bind {bind}: {e}")))?
    .run()
    .await
    .map_err(|e| TransitError::config(format!("server error: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{body::to_bytes, test};

    fn sample_state() -> web::Data<AppState> {
        let stops = vec![
            GtfsStopRow {
                stop_id: 1071,
                stop_code: "1071".to_string(),
                map_id: String::new(),
                stop_name: "Clark & Randolph".to_string(),
                stop_desc: "Clark & Randolph, Northbound".to_string(),
                direction: "N".to_string(),
                lat: 41.8845,
                lon: -87.6310,
                location_type: "0".to_string(),
                wheelchair_boarding: "1".to_string(),
            },
            GtfsStopRow {
                stop_id: 40380,
                stop_code: String::new(),
                map_id: String::new(),
                stop_name: "Clark/Lake".to_string(),
                stop_desc: String::new(),
                direction: "-".to_string(),
                lat: 41.8857,
                lon: -87.6307,
                location_type: "1".to_string(),
                wheelchair_boarding: "1".to_string(),
            },
        ];
        let bus_routes = StopRouteIndex::from_map(std::collections::HashMap::from([(
            1071,
            vec!["22".to_string(), "24".to_string()],
        )]));
        web::Data::new(AppState {
            stops,
            catalog: None,
            bus_routes: Some(bus_routes),
        })
    }

    #[actix_web::test]
    async fn index_serves_the_app_shell() {
        let app = test::init_service(App::new().route("/", web::get().to(index))).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert!(resp.status().is_success());
        let body = to_bytes(resp.into_body()).await.unwrap();
        assert!(std::str::from_utf8(&body).unwrap().contains("stoplist"));
    }

    #[actix_web::test]
    async fn stoplist_returns_rendered_html() {
        let app = test::init_service(
            App::new()
                .app_data(sample_state())
                .route("/api/stoplist", web::post().to(stoplist)),
        )
        .await;
        let req = test::TestRequest::post()
            .uri("/api/stoplist")
            .set_json(serde_json::json!({"lat": 41.8850, "lon": -87.6310}))
            .to_request();
        let resp: StoplistResponseCheck = test::call_and_read_body_json(&app, req).await;

        assert_eq!(resp.bus_stops.len(), 1);
        assert_eq!(resp.train_stops.len(), 1);
        assert_eq!(resp.all_stops.len(), 2);
        assert!(resp.stoplist_html.contains("Clark &amp; Randolph"));
        assert!(resp.stoplist_html.contains("data-stop-id=\"40380\""));
        assert!(resp.stoplist_html.contains("22, 24"));
    }

    #[derive(Debug, Deserialize)]
    struct StoplistResponseCheck {
        all_stops: Vec<serde_json::Value>,
        bus_stops: Vec<serde_json::Value>,
        train_stops: Vec<serde_json::Value>,
        stoplist_html: String,
    }

    #[core::prelude::v1::test]
    fn html_is_escaped() {
        let stops = vec![NearbyStop {
            stop_id: 1,
            stop_name: "Clark & <Lake>".to_string(),
            stop_type: StopKind::Bus,
            is_parent: false,
            direction: "N".to_string(),
            routes: vec![],
            lat: 0.0,
            lon: 0.0,
            distance_km: 0.123,
        }];
        let html = render_stoplist(&stops);
        assert!(html.contains("Clark &amp; &lt;Lake&gt;"));
        assert!(!html.contains("<Lake>"));
    }
}
