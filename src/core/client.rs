use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use crate::config::{ApiKeys, FileConfig};
use crate::utils::error::{Result, TransitError};

/// Shared HTTP client for the three upstream services. Request builders here
/// attach the API key and the output-format parameter; callers only supply
/// the entity parameters.
#[derive(Debug, Clone)]
pub struct TransitClient {
    http: reqwest::Client,
    keys: ApiKeys,
    bus_base: String,
    train_base: String,
    alerts_base: String,
    gtfs_url: String,
    stations_url: String,
}

impl TransitClient {
    pub fn new(config: &FileConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            keys: config.keys.clone(),
            bus_base: config.bus_api_base().to_string(),
            train_base: config.train_api_base().to_string(),
            alerts_base: config.alerts_api_base().to_string(),
            gtfs_url: config.gtfs_static_url().to_string(),
            stations_url: config.stations_url().to_string(),
        }
    }

    pub fn keys(&self) -> &ApiKeys {
        &self.keys
    }

    pub(crate) fn gtfs_url(&self) -> &str {
        &self.gtfs_url
    }

    pub(crate) fn stations_url(&self) -> &str {
        &self.stations_url
    }

    /// Calls a Bus Tracker endpoint and unwraps the `bustime-response`
    /// envelope, surfacing its `error` array as `TransitError::Api`.
    pub(crate) async fn bus_api<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let key = self.keys.bus_key()?.to_string();
        let url = format!("{}/{}", self.bus_base, endpoint);
        let mut query: Vec<(&str, String)> = vec![("key", key), ("format", "json".to_string())];
        query.extend(params.iter().cloned());

        tracing::debug!("GET {} ({} params)", url, query.len());
        let response = self.http.get(&url).query(&query).send().await?;
        let body: serde_json::Value = response.error_for_status()?.json().await?;

        let inner = body
            .get("bustime-response")
            .cloned()
            .ok_or_else(|| TransitError::api("bus", "missing bustime-response envelope"))?;

        if let Some(errors) = inner.get("error").and_then(|e| e.as_array()) {
            let msg = errors
                .iter()
                .filter_map(|e| e.get("msg").and_then(|m| m.as_str()))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(TransitError::api("bus", msg));
        }

        Ok(serde_json::from_value(inner)?)
    }

    /// Calls a Train Tracker endpoint and unwraps the `ctatt` envelope,
    /// surfacing a non-zero `errCd` as `TransitError::Api`.
    pub(crate) async fn train_api<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let key = self.keys.train_key()?.to_string();
        let url = format!("{}/{}", self.train_base, endpoint);
        let mut query: Vec<(&str, String)> =
            vec![("key", key), ("outputType", "JSON".to_string())];
        query.extend(params.iter().cloned());

        tracing::debug!("GET {} ({} params)", url, query.len());
        let response = self.http.get(&url).query(&query).send().await?;
        let body: serde_json::Value = response.error_for_status()?.json().await?;

        let inner = body
            .get("ctatt")
            .cloned()
            .ok_or_else(|| TransitError::api("train", "missing ctatt envelope"))?;

        let err_code = inner
            .get("errCd")
            .and_then(|c| c.as_str())
            .unwrap_or("0")
            .to_string();
        if err_code != "0" {
            let message = inner
                .get("errNm")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown upstream error")
                .to_string();
            return Err(TransitError::Api {
                code: err_code,
                message,
            });
        }

        Ok(serde_json::from_value(inner)?)
    }

    /// Calls a Customer Alerts endpoint. No API key is needed for this
    /// service.
    pub(crate) async fn alerts_api(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value> {
        let url = format!("{}/{}", self.alerts_base, endpoint);
        let mut query: Vec<(&str, String)> = vec![("outputType", "JSON".to_string())];
        query.extend(params.iter().cloned());

        tracing::debug!("GET {} ({} params)", url, query.len());
        let response = self.http.get(&url).query(&query).send().await?;
        Ok(response.error_for_status()?.json().await?)
    }

    /// Plain GET for reference-data URLs (GTFS zip, station JSON).
    pub(crate) async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        tracing::debug!("GET {}", url);
        let response = self.http.get(url).send().await?;
        Ok(response.error_for_status()?.bytes().await?.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Upstream JSON is loosely typed: numbers arrive as strings and vice versa,
// booleans arrive as "0"/"1". These adapters normalize at the edge.
// ---------------------------------------------------------------------------

pub(crate) fn de_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
        Float(f64),
        Bool(bool),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Int(i) => i.to_string(),
        Raw::Float(f) => f.to_string(),
        Raw::Bool(b) => b.to_string(),
    })
}

pub(crate) fn de_opt_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    struct Wrap(#[serde(deserialize_with = "de_string")] String);
    let opt: Option<Wrap> = Option::deserialize(deserializer)?;
    Ok(opt.map(|w| w.0).filter(|s| !s.is_empty()))
}

pub(crate) fn de_flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Str(String),
        Int(i64),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Bool(b) => b,
        Raw::Str(s) => s == "1" || s.eq_ignore_ascii_case("true"),
        Raw::Int(i) => i != 0,
    })
}

pub(crate) fn de_u32<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u32),
        Str(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Int(i) => Ok(i),
        Raw::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

pub(crate) fn de_u64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Str(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Int(i) => Ok(i),
        Raw::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

pub(crate) fn de_f64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Str(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Single objects and arrays are interchangeable in several feed fields.
pub(crate) fn de_one_or_many<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
    }
    let opt: Option<OneOrMany<T>> = Option::deserialize(deserializer)?;
    Ok(match opt {
        Some(OneOrMany::Many(v)) => v,
        Some(OneOrMany::One(x)) => vec![x],
        None => vec![],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Flags {
        #[serde(deserialize_with = "de_flag")]
        a: bool,
        #[serde(deserialize_with = "de_flag")]
        b: bool,
        #[serde(deserialize_with = "de_flag")]
        c: bool,
    }

    #[test]
    fn flags_accept_strings_bools_and_ints() {
        let f: Flags = serde_json::from_str(r#"{"a":"1","b":false,"c":1}"#).unwrap();
        assert!(f.a);
        assert!(!f.b);
        assert!(f.c);
    }

    #[derive(Deserialize)]
    struct Many {
        #[serde(deserialize_with = "de_one_or_many", default)]
        items: Vec<String>,
    }

    #[test]
    fn one_or_many_wraps_single_objects() {
        let m: Many = serde_json::from_str(r#"{"items":"x"}"#).unwrap();
        assert_eq!(m.items, vec!["x"]);
        let m: Many = serde_json::from_str(r#"{"items":["x","y"]}"#).unwrap();
        assert_eq!(m.items.len(), 2);
        let m: Many = serde_json::from_str(r#"{}"#).unwrap();
        assert!(m.items.is_empty());
    }
}
