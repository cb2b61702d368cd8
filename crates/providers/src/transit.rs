//! BART real-time departure estimates.
//!
//! Produces one departure line per configured destination, colored with the
//! line's color tag. Route colors come from the routes API on first call and
//! are memoized per provider instance. Departure data keeps a last-known-good
//! copy that is served during transient API failures within a short TTL.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, warn};

use flap_board::{codec, BoardModel, VariableMap};

use crate::retry::{fetch_with_retry, RetryPolicy};
use crate::{Provider, ProviderError};

const API_BASE: &str = "https://api.bart.gov/api";
const TIMEOUT: Duration = Duration::from_secs(10);
const DEPARTURES_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// BART API color name → board color tag. No beige flap exists; white is
/// closest.
fn line_color_tag(color: &str) -> Option<&'static str> {
    match color.to_ascii_uppercase().as_str() {
        "RED" => Some("[R]"),
        "ORANGE" => Some("[O]"),
        "YELLOW" => Some("[Y]"),
        "GREEN" => Some("[G]"),
        "BLUE" => Some("[B]"),
        "PURPLE" => Some("[V]"),
        "WHITE" | "BEIGE" => Some("[W]"),
        _ => None,
    }
}

struct CacheEntry {
    value: VariableMap,
    cached_at: Instant,
}

impl CacheEntry {
    fn is_valid(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() <= ttl
    }
}

pub struct TransitProvider {
    http: Client,
    base_url: String,
    api_key: String,
    station: String,
    dest_filters: Vec<String>,
    model: BoardModel,
    retry: RetryPolicy,
    /// dest abbreviation → color tags, lazily built from the routes API.
    dest_colors: OnceCell<HashMap<String, Vec<&'static str>>>,
    /// Last-known-good departures, served on transient failures within TTL.
    last_good: Mutex<Option<CacheEntry>>,
}

impl TransitProvider {
    pub fn new(api_key: String, station: String, destinations: Vec<String>, model: BoardModel) -> Self {
        Self::with_base_url(api_key, station, destinations, model, API_BASE.into())
    }

    pub fn with_base_url(
        api_key: String,
        station: String,
        destinations: Vec<String>,
        model: BoardModel,
        base_url: String,
    ) -> Self {
        let http = Client::builder()
            .timeout(TIMEOUT)
            .build()
            .expect("failed to build HTTP client");
        Self {
            http,
            base_url,
            api_key,
            station,
            dest_filters: destinations,
            model,
            retry: RetryPolicy::default(),
            dest_colors: OnceCell::new(),
            last_good: Mutex::new(None),
        }
    }

    async fn get_json(&self, path: &str, params: &[(&str, &str)]) -> Result<Value, ProviderError> {
        let mut query: Vec<(&str, &str)> = vec![("key", &self.api_key), ("json", "y")];
        query.extend_from_slice(params);
        let builder = self
            .http
            .get(format!("{}/{path}", self.base_url))
            .query(&query);
        let resp = fetch_with_retry(builder, &self.retry).await?;
        if !resp.status().is_success() {
            return Err(ProviderError::Http(format!("HTTP {}", resp.status())));
        }
        resp.json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))
    }

    /// Build dest abbreviation → color tags from the routes API. Routes are
    /// walked in ascending number order so multi-color destinations get a
    /// deterministic tag order. Only routes serving the origin station count.
    async fn fetch_dest_colors(&self) -> Result<HashMap<String, Vec<&'static str>>, ProviderError> {
        let data = self.get_json("route.aspx", &[("cmd", "routes")]).await?;
        let mut routes = as_list(&data["root"]["routes"]["route"]);
        routes.sort_by_key(|r| {
            r["number"]
                .as_str()
                .and_then(|n| n.parse::<i64>().ok())
                .or_else(|| r["number"].as_i64())
                .unwrap_or(0)
        });

        let origin = self.station.to_ascii_uppercase();
        let mut color_map: HashMap<String, Vec<&'static str>> = HashMap::new();
        for route in routes {
            let Some(tag) = route["color"].as_str().and_then(line_color_tag) else {
                continue;
            };
            let number = match &route["number"] {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => continue,
            };
            let info = self
                .get_json("route.aspx", &[("cmd", "routeinfo"), ("route", &number)])
                .await?;
            let route_info = &info["root"]["routes"]["route"];
            let stations = as_list(&route_info["config"]["station"]);
            let serves_origin = stations
                .iter()
                .any(|s| s.as_str().is_some_and(|s| s.eq_ignore_ascii_case(&origin)));
            if !serves_origin {
                continue;
            }
            if let Some(dest) = route_info["destination"].as_str() {
                if !dest.is_empty() {
                    let tags = color_map.entry(dest.to_ascii_uppercase()).or_default();
                    if !tags.contains(&tag) {
                        tags.push(tag);
                    }
                }
            }
        }
        Ok(color_map)
    }

    fn no_service_line(dest: &str, colors: &HashMap<String, Vec<&'static str>>) -> String {
        match colors.get(&dest.to_ascii_uppercase()).and_then(|t| t.first()) {
            Some(tag) => format!("{tag} NO SERVICE"),
            None => "NO SERVICE".to_string(),
        }
    }

    /// Pack as many departure times as fit within the board width, like
    /// "[G] 00 08 14".
    fn build_line(&self, color_tag: &str, estimates: &[Value]) -> String {
        let base = format!("{color_tag} ");
        let mut parts: Vec<String> = Vec::new();
        for est in estimates {
            let Some(mins) = est["minutes"].as_str() else {
                continue;
            };
            let t = format_minutes(mins);
            let mut candidate = parts.clone();
            candidate.push(t.clone());
            if codec::display_len(&format!("{base}{}", candidate.join(" "))) > self.model.cols() {
                break;
            }
            parts.push(t);
        }
        if parts.is_empty() {
            format!("{base}--")
        } else {
            format!("{base}{}", parts.join(" "))
        }
    }
}

/// BART returns a lone object where a list has one element; normalize.
fn as_list(v: &Value) -> Vec<Value> {
    match v {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

/// Zero-pad departure minutes so columns align; an arriving train shows as
/// "00".
fn format_minutes(mins: &str) -> String {
    if mins == "Leaving" {
        return "00".to_string();
    }
    match mins.parse::<i64>() {
        Ok(n) => format!("{n:02}"),
        Err(_) => mins.to_string(),
    }
}

#[async_trait]
impl Provider for TransitProvider {
    fn name(&self) -> &'static str {
        "bart"
    }

    async fn variables(&self) -> Result<VariableMap, ProviderError> {
        // A color-map failure degrades to colorless output, it never blocks
        // departures.
        let colors = match self.dest_colors.get_or_try_init(|| self.fetch_dest_colors()).await {
            Ok(map) => map.clone(),
            Err(e) => {
                warn!(error = %e, "could not build route color map");
                HashMap::new()
            }
        };

        let data = match self
            .get_json("etd.aspx", &[("cmd", "etd"), ("orig", &self.station)])
            .await
        {
            Ok(data) => data,
            Err(e) => {
                debug!(error = %e, "departures request failed, checking last-known-good");
                let last = self.last_good.lock().expect("cache lock poisoned");
                if let Some(entry) = last.as_ref().filter(|e| e.is_valid(DEPARTURES_CACHE_TTL)) {
                    return Ok(entry.value.clone());
                }
                return Err(ProviderError::Unavailable(format!(
                    "departures request failed: {e}"
                )));
            }
        };

        let station_data = as_list(&data["root"]["station"])
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Malformed("no station in response".into()))?;
        let station_name = station_data["name"]
            .as_str()
            .ok_or_else(|| ProviderError::Malformed("station has no name".into()))?
            .to_string();
        let etds = as_list(&station_data["etd"]);

        let mut vars = VariableMap::new();
        vars.insert("station".into(), vec![vec![station_name]]);

        for (i, dest) in self.dest_filters.iter().enumerate() {
            let mut line_value = Self::no_service_line(dest, &colors);
            for etd in &etds {
                let abbr = etd["abbreviation"].as_str().unwrap_or_default();
                if !abbr.eq_ignore_ascii_case(dest) {
                    continue;
                }
                let estimates = as_list(&etd["estimate"]);
                if let Some(first) = estimates.first() {
                    let tag = first["color"]
                        .as_str()
                        .and_then(line_color_tag)
                        .unwrap_or("[ ]");
                    line_value = self.build_line(tag, &estimates);
                }
                break;
            }
            vars.insert(format!("line{}", i + 1), vec![vec![line_value]]);
        }

        let mut last = self.last_good.lock().expect("cache lock poisoned");
        *last = Some(CacheEntry {
            value: vars.clone(),
            cached_at: Instant::now(),
        });
        Ok(vars)
    }
}
