use anyhow::Result;
use httpmock::prelude::*;

use cta_tracker::core::alerts::{DetailsQuery, StatusQuery};
use cta_tracker::{CustomerAlerts, FileConfig, TransitClient, TransitError};

fn alerts(server: &MockServer) -> CustomerAlerts {
    let mut config = FileConfig::default();
    config.alerts_api_base = Some(server.base_url());
    CustomerAlerts::new(TransitClient::new(&config))
}

#[tokio::test]
async fn status_needs_no_api_key() -> Result<()> {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/routes.aspx")
            .query_param("outputType", "JSON")
            .query_param("type", "rail");
        then.status(200).json_body(serde_json::json!({
            "CTARoutes": {
                "TimeStamp": "2024-05-01T12:30:00",
                "ErrorCode": ["0"],
                "ErrorMessage": [null],
                "RouteInfo": [
                    {"Route": "Red Line", "RouteColorCode": "c60c30",
                     "RouteTextColor": "FFFFFF", "ServiceId": "Red",
                     "RouteStatus": "Normal Service", "RouteStatusColor": "#c0c0c0",
                     "RouteURL": {"#cdata-section": "http://www.transitchicago.com/redline/"}},
                    {"Route": "Blue Line", "RouteColorCode": "00a1de",
                     "RouteTextColor": "FFFFFF", "ServiceId": "Blue",
                     "RouteStatus": "Minor Delays", "RouteStatusColor": "#ff0000",
                     "RouteURL": {"#cdata-section": "http://www.transitchicago.com/blueline/"}}
                ]
            }
        }));
    });

    let query = StatusQuery {
        service_type: Some("rail".to_string()),
        ..Default::default()
    };
    let rows = alerts(&server).status(query).await?;

    mock.assert();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].service_id, "Blue");
    assert_eq!(rows[1].status, "Minor Delays");
    assert_eq!(
        rows[0].url.as_deref(),
        Some("http://www.transitchicago.com/redline/")
    );
    Ok(())
}

#[tokio::test]
async fn details_flatten_services_and_strip_html() -> Result<()> {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/alerts.aspx")
            .query_param("activeonly", "true")
            .query_param("recentdays", "7");
        then.status(200).json_body(serde_json::json!({
            "CTAAlerts": {
                "TimeStamp": "2024-05-01T12:30:00",
                "ErrorCode": "0",
                "ErrorMessage": null,
                "Alert": {
                    "AlertId": "42409",
                    "Headline": "Howard elevator temporarily out of service",
                    "ShortDescription": "Use the stairs or escalator.",
                    "FullDescription": {"#cdata-section":
                        "<p>The elevator at <strong>Howard</strong> is out of service.</p>"},
                    "SeverityScore": "35",
                    "SeverityColor": "ffff00",
                    "SeverityCSS": "planned",
                    "Impact": "Elevator Status",
                    "EventStart": "2024-05-01T04:00:00",
                    "EventEnd": null,
                    "TBD": "1",
                    "MajorAlert": "0",
                    "ImpactedService": {
                        "Service": [
                            {"ServiceType": "R", "ServiceTypeDescription": "Train Route",
                             "ServiceName": "Red Line", "ServiceId": "Red",
                             "ServiceBackColor": "c60c30", "ServiceTextColor": "FFFFFF"},
                            {"ServiceType": "T", "ServiceTypeDescription": "Train Station",
                             "ServiceName": "Howard", "ServiceId": "40900",
                             "ServiceBackColor": "565a5c", "ServiceTextColor": "FFFFFF"}
                        ]
                    }
                }
            }
        }));
    });

    let query = DetailsQuery {
        active_only: true,
        recent_days: Some(7),
        ..Default::default()
    };
    let rows = alerts(&server).details(query).await?;

    mock.assert();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].alert_id, rows[1].alert_id);
    assert_eq!(rows[0].service_id, "Red");
    assert_eq!(rows[1].service_name, "Howard");
    assert_eq!(
        rows[0].description,
        "The elevator at Howard is out of service."
    );
    Ok(())
}

#[tokio::test]
async fn alerts_error_code_surfaces_as_api_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/alerts.aspx");
        then.status(200).json_body(serde_json::json!({
            "CTAAlerts": {
                "ErrorCode": "50",
                "ErrorMessage": "Invalid station identifier"
            }
        }));
    });

    let query = DetailsQuery {
        station: Some(99_999),
        ..Default::default()
    };
    let result = alerts(&server).details(query).await;
    match result {
        Err(TransitError::Api { code, message }) => {
            assert_eq!(code, "50");
            assert_eq!(message, "Invalid station identifier");
        }
        other => panic!("expected api error, got {:?}", other),
    }
}
