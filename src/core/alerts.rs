use std::sync::OnceLock;

use serde::Deserialize;

use crate::core::client::{de_one_or_many, de_opt_string, de_string, TransitClient};
use crate::domain::model::{AlertRow, RouteStatusRow};
use crate::utils::error::{Result, TransitError};

// ---------------------------------------------------------------------------
// Raw Customer Alerts payloads
// ---------------------------------------------------------------------------

/// CDATA-wrapped fields arrive either as `{"#cdata-section": "..."}` or as a
/// plain string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Cdata {
    Wrapped {
        #[serde(rename = "#cdata-section")]
        text: String,
    },
    Plain(String),
}

impl Cdata {
    fn into_inner(self) -> String {
        match self {
            Cdata::Wrapped { text } => text,
            Cdata::Plain(text) => text,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RoutesEnvelope {
    #[serde(rename = "CTARoutes")]
    routes: RoutesPayload,
}

#[derive(Debug, Deserialize)]
struct RoutesPayload {
    #[serde(rename = "ErrorCode", deserialize_with = "de_one_or_many", default)]
    error_code: Vec<String>,
    #[serde(rename = "ErrorMessage", deserialize_with = "de_one_or_many", default)]
    error_message: Vec<Option<String>>,
    #[serde(rename = "RouteInfo", deserialize_with = "de_one_or_many", default)]
    route_info: Vec<RawRouteStatus>,
}

#[derive(Debug, Deserialize)]
struct RawRouteStatus {
    #[serde(rename = "Route", default)]
    route: String,
    #[serde(rename = "ServiceId", deserialize_with = "de_string", default)]
    service_id: String,
    #[serde(rename = "RouteStatus", default)]
    route_status: String,
    #[serde(rename = "RouteStatusColor", default)]
    route_status_color: String,
    #[serde(rename = "RouteColorCode", default)]
    route_color_code: String,
    #[serde(rename = "RouteTextColor", default)]
    route_text_color: String,
    #[serde(rename = "RouteURL")]
    route_url: Option<Cdata>,
}

#[derive(Debug, Deserialize)]
struct AlertsEnvelope {
    #[serde(rename = "CTAAlerts")]
    alerts: AlertsPayload,
}

#[derive(Debug, Deserialize)]
struct AlertsPayload {
    #[serde(rename = "ErrorCode", deserialize_with = "de_one_or_many", default)]
    error_code: Vec<String>,
    #[serde(rename = "ErrorMessage", deserialize_with = "de_one_or_many", default)]
    error_message: Vec<Option<String>>,
    #[serde(rename = "Alert", deserialize_with = "de_one_or_many", default)]
    alert: Vec<RawAlert>,
}

#[derive(Debug, Deserialize)]
struct RawAlert {
    #[serde(rename = "AlertId", deserialize_with = "de_string")]
    alert_id: String,
    #[serde(rename = "Headline", default)]
    headline: String,
    #[serde(rename = "ShortDescription", default)]
    short_description: String,
    #[serde(rename = "FullDescription")]
    full_description: Option<Cdata>,
    #[serde(rename = "SeverityScore", deserialize_with = "de_string", default)]
    severity_score: String,
    #[serde(rename = "SeverityColor", default)]
    severity_color: String,
    #[serde(rename = "SeverityCSS", default)]
    severity_css: String,
    #[serde(rename = "Impact", default)]
    impact: String,
    #[serde(rename = "EventStart", deserialize_with = "de_opt_string", default)]
    event_start: Option<String>,
    #[serde(rename = "EventEnd", deserialize_with = "de_opt_string", default)]
    event_end: Option<String>,
    #[serde(rename = "TBD", deserialize_with = "de_string", default)]
    tbd: String,
    #[serde(rename = "MajorAlert", deserialize_with = "de_string", default)]
    major_alert: String,
    #[serde(rename = "ImpactedService", default)]
    impacted_service: Option<RawImpactedService>,
}

#[derive(Debug, Deserialize, Default)]
struct RawImpactedService {
    #[serde(rename = "Service", deserialize_with = "de_one_or_many", default)]
    service: Vec<RawService>,
}

#[derive(Debug, Deserialize)]
struct RawService {
    #[serde(rename = "ServiceType", default)]
    service_type: String,
    #[serde(rename = "ServiceTypeDescription", default)]
    service_type_description: String,
    #[serde(rename = "ServiceName", default)]
    service_name: String,
    #[serde(rename = "ServiceId", deserialize_with = "de_string", default)]
    service_id: String,
    #[serde(rename = "ServiceBackColor", default)]
    service_back_color: String,
    #[serde(rename = "ServiceTextColor", default)]
    service_text_color: String,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Filter for the route status endpoint. Scope to a whole service class
/// ("bus", "rail", "systemwide"), a single route, or a single station.
#[derive(Debug, Clone, Default)]
pub struct StatusQuery {
    pub service_type: Option<String>,
    pub route: Option<String>,
    pub station: Option<u32>,
}

impl StatusQuery {
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(kind) = &self.service_type {
            params.push(("type", kind.clone()));
        }
        if let Some(route) = &self.route {
            params.push(("routeid", route.clone()));
        }
        if let Some(station) = self.station {
            params.push(("stationid", station.to_string()));
        }
        params
    }
}

/// Filter for the detailed alerts endpoint.
#[derive(Debug, Clone)]
pub struct DetailsQuery {
    pub active_only: bool,
    pub accessibility: bool,
    pub planned: bool,
    pub route: Option<String>,
    pub station: Option<u32>,
    pub by_start_date: Option<String>,
    pub recent_days: Option<u32>,
}

impl Default for DetailsQuery {
    fn default() -> Self {
        Self {
            active_only: false,
            accessibility: true,
            planned: true,
            route: None,
            station: None,
            by_start_date: None,
            recent_days: None,
        }
    }
}

impl DetailsQuery {
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("activeonly", self.active_only.to_string()),
            ("accessibility", self.accessibility.to_string()),
            ("planned", self.planned.to_string()),
        ];
        if let Some(route) = &self.route {
            params.push(("routeid", route.clone()));
        }
        if let Some(station) = self.station {
            params.push(("stationid", station.to_string()));
        }
        if let Some(date) = &self.by_start_date {
            params.push(("bystartdate", date.clone()));
        }
        if let Some(days) = self.recent_days {
            params.push(("recentdays", days.to_string()));
        }
        params
    }
}

// ---------------------------------------------------------------------------
// Customer Alerts API
// ---------------------------------------------------------------------------

/// Client for the CTA Customer Alerts feeds.
#[derive(Debug, Clone)]
pub struct CustomerAlerts {
    client: TransitClient,
}

impl CustomerAlerts {
    pub fn new(client: TransitClient) -> Self {
        Self { client }
    }

    /// Overall status of routes, one row per route.
    pub async fn status(&self, query: StatusQuery) -> Result<Vec<RouteStatusRow>> {
        let body = self.client.alerts_api("routes.aspx", &query.params()).await?;
        let envelope: RoutesEnvelope = serde_json::from_value(body)?;
        let payload = envelope.routes;
        check_error(&payload.error_code, &payload.error_message)?;

        Ok(payload
            .route_info
            .into_iter()
            .map(|info| RouteStatusRow {
                service: info.route,
                service_id: info.service_id,
                status: info.route_status,
                status_color: info.route_status_color,
                route_color: info.route_color_code,
                route_text_color: info.route_text_color,
                url: info.route_url.map(Cdata::into_inner),
            })
            .collect())
    }

    /// Detailed alerts, flattened to one row per impacted service.
    pub async fn details(&self, query: DetailsQuery) -> Result<Vec<AlertRow>> {
        let body = self.client.alerts_api("alerts.aspx", &query.params()).await?;
        let envelope: AlertsEnvelope = serde_json::from_value(body)?;
        let payload = envelope.alerts;
        check_error(&payload.error_code, &payload.error_message)?;

        let mut rows = Vec::new();
        for alert in payload.alert {
            let description = alert
                .full_description
                .map(Cdata::into_inner)
                .map(|html| strip_html(&html))
                .filter(|text| !text.is_empty())
                .unwrap_or(alert.short_description);
            let services = alert.impacted_service.unwrap_or_default().service;
            for service in services {
                rows.push(AlertRow {
                    service_type: service.service_type,
                    service_type_desc: service.service_type_description,
                    service_name: service.service_name,
                    service_id: service.service_id,
                    service_back_color: service.service_back_color,
                    service_text_color: service.service_text_color,
                    alert_id: alert.alert_id.clone(),
                    headline: alert.headline.clone(),
                    description: description.clone(),
                    impact: alert.impact.clone(),
                    severity_score: alert.severity_score.clone(),
                    severity_color: alert.severity_color.clone(),
                    severity_css: alert.severity_css.clone(),
                    event_start: alert.event_start.clone(),
                    event_end: alert.event_end.clone(),
                    tbd: alert.tbd.clone(),
                    major: alert.major_alert.clone(),
                });
            }
        }
        Ok(rows)
    }
}

fn check_error(codes: &[String], messages: &[Option<String>]) -> Result<()> {
    match codes.first() {
        Some(code) if code != "0" => Err(TransitError::Api {
            code: code.clone(),
            message: messages
                .first()
                .cloned()
                .flatten()
                .unwrap_or_else(|| "unknown upstream error".to_string()),
        }),
        _ => Ok(()),
    }
}

/// Alert descriptions arrive as HTML fragments; tables render better as
/// plain text.
fn strip_html(html: &str) -> String {
    static TAGS: OnceLock<regex::Regex> = OnceLock::new();
    static SPACE: OnceLock<regex::Regex> = OnceLock::new();
    let tags = TAGS.get_or_init(|| regex::Regex::new(r"<[^>]*>").expect("valid regex"));
    let space = SPACE.get_or_init(|| regex::Regex::new(r"\s+").expect("valid regex"));

    let text = tags.replace_all(html, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&#39;", "'")
        .replace("&quot;", "\"");
    space.replace_all(&text, " ").trim().to_string()
}
