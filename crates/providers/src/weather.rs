//! Current weather conditions via Open-Meteo.
//!
//! The configured city is forward-geocoded to coordinates on first call; the
//! coordinates and the canonical city name from the API are memoized for the
//! provider's lifetime. No API key required.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::debug;

use flap_board::VariableMap;

use crate::{Provider, ProviderError};

const GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";
const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
const TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Units {
    Imperial,
    Metric,
}

impl Units {
    pub fn parse(s: &str) -> Result<Self, ProviderError> {
        match s {
            "imperial" => Ok(Units::Imperial),
            "metric" => Ok(Units::Metric),
            other => Err(ProviderError::Config(format!(
                "units must be imperial or metric, got {other:?}"
            ))),
        }
    }

    fn temp_unit(&self) -> &'static str {
        match self {
            Units::Imperial => "fahrenheit",
            Units::Metric => "celsius",
        }
    }

    fn wind_unit(&self) -> &'static str {
        match self {
            Units::Imperial => "mph",
            Units::Metric => "kmh",
        }
    }

    fn temp_suffix(&self) -> &'static str {
        match self {
            Units::Imperial => "F",
            Units::Metric => "C",
        }
    }

    fn wind_suffix(&self) -> &'static str {
        match self {
            Units::Imperial => "MPH",
            Units::Metric => "KMH",
        }
    }
}

/// WMO weather interpretation code → (condition string, color tag).
/// Condition strings stay short enough for a Note row after a leading tag.
fn wmo_condition(code: i64) -> (&'static str, &'static str) {
    match code {
        0 => ("CLEAR", "[Y]"),
        1 => ("MOSTLY CLEAR", "[Y]"),
        2 => ("PARTLY CLOUDY", "[O]"),
        3 => ("OVERCAST", "[W]"),
        45 => ("FOG", "[W]"),
        48 => ("RIME FOG", "[W]"),
        51 => ("LIGHT DRIZZLE", "[B]"),
        53 => ("DRIZZLE", "[B]"),
        55 => ("HEAVY DRIZZLE", "[B]"),
        56 => ("FRZ DRIZZLE", "[V]"),
        57 => ("HVY FRZ DRZL", "[V]"),
        61 => ("LIGHT RAIN", "[B]"),
        63 => ("RAIN", "[B]"),
        65 => ("HEAVY RAIN", "[B]"),
        66 => ("FRZ RAIN", "[V]"),
        67 => ("HVY FRZ RAIN", "[V]"),
        71 => ("LIGHT SNOW", "[W]"),
        73 => ("SNOW", "[W]"),
        75 => ("HEAVY SNOW", "[W]"),
        77 => ("SNOW GRAINS", "[W]"),
        80 => ("LIGHT SHOWERS", "[B]"),
        81 => ("SHOWERS", "[B]"),
        82 => ("HEAVY SHOWERS", "[B]"),
        85 => ("SNOW SHOWERS", "[W]"),
        86 => ("HVY SNOW SHWR", "[W]"),
        95 => ("THUNDERSTORM", "[R]"),
        96 | 99 => ("STORM + HAIL", "[R]"),
        _ => ("UNKNOWN", "[K]"),
    }
}

#[derive(Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Deserialize, Clone)]
struct GeocodeResult {
    latitude: f64,
    longitude: f64,
    name: String,
}

#[derive(Deserialize)]
struct ForecastResponse {
    current: CurrentWeather,
    daily: DailyWeather,
}

#[derive(Deserialize)]
struct CurrentWeather {
    temperature_2m: f64,
    apparent_temperature: f64,
    weather_code: i64,
    wind_speed_10m: f64,
    precipitation_probability: Option<f64>,
}

#[derive(Deserialize)]
struct DailyWeather {
    temperature_2m_max: Vec<f64>,
    temperature_2m_min: Vec<f64>,
}

pub struct WeatherProvider {
    http: Client,
    geocoding_url: String,
    forecast_url: String,
    city: String,
    units: Units,
    location: OnceCell<GeocodeResult>,
}

impl WeatherProvider {
    pub fn new(city: String, units: Units) -> Self {
        Self::with_endpoints(city, units, GEOCODING_URL.into(), FORECAST_URL.into())
    }

    pub fn with_endpoints(
        city: String,
        units: Units,
        geocoding_url: String,
        forecast_url: String,
    ) -> Self {
        let http = Client::builder()
            .timeout(TIMEOUT)
            .build()
            .expect("failed to build HTTP client");
        Self {
            http,
            geocoding_url,
            forecast_url,
            city,
            units,
            location: OnceCell::new(),
        }
    }

    async fn geocode(&self) -> Result<GeocodeResult, ProviderError> {
        debug!(city = %self.city, "geocoding");
        let resp = self
            .http
            .get(&self.geocoding_url)
            .query(&[("name", self.city.as_str()), ("count", "1"), ("format", "json")])
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ProviderError::Unavailable(format!(
                "geocoding error: HTTP {}",
                resp.status()
            )));
        }
        let geo: GeocodeResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        geo.results.into_iter().next().ok_or_else(|| {
            ProviderError::Unavailable(format!("city {:?} not found", self.city))
        })
    }

    fn fmt_temp(&self, value: f64) -> String {
        format!("{}{}", value.round() as i64, self.units.temp_suffix())
    }

    fn fmt_wind(&self, value: f64) -> String {
        format!("{}{}", value.round() as i64, self.units.wind_suffix())
    }
}

fn single(value: String) -> Vec<Vec<String>> {
    vec![vec![value]]
}

#[async_trait]
impl Provider for WeatherProvider {
    fn name(&self) -> &'static str {
        "weather"
    }

    async fn variables(&self) -> Result<VariableMap, ProviderError> {
        // Geocoded once per provider instance; the canonical name from the
        // API backs the {city} variable, not what was configured.
        let loc = self
            .location
            .get_or_try_init(|| self.geocode())
            .await?
            .clone();

        let current_fields = [
            "temperature_2m",
            "apparent_temperature",
            "weather_code",
            "wind_speed_10m",
            "precipitation_probability",
        ]
        .join(",");
        let resp = self
            .http
            .get(&self.forecast_url)
            .query(&[
                ("latitude", loc.latitude.to_string()),
                ("longitude", loc.longitude.to_string()),
                ("current", current_fields),
                ("daily", "temperature_2m_max,temperature_2m_min".into()),
                ("temperature_unit", self.units.temp_unit().into()),
                ("wind_speed_unit", self.units.wind_unit().into()),
                ("forecast_days", "1".into()),
                ("timezone", "auto".into()),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ProviderError::Http(format!(
                "forecast error: HTTP {}",
                resp.status()
            )));
        }
        let data: ForecastResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        let (condition_str, color_tag) = wmo_condition(data.current.weather_code);
        let precip = data
            .current
            .precipitation_probability
            .map_or_else(|| "0%".to_string(), |p| format!("{}%", p.round() as i64));

        let high = data
            .daily
            .temperature_2m_max
            .first()
            .copied()
            .ok_or_else(|| ProviderError::Malformed("empty daily forecast".into()))?;
        let low = data
            .daily
            .temperature_2m_min
            .first()
            .copied()
            .ok_or_else(|| ProviderError::Malformed("empty daily forecast".into()))?;

        let mut vars = VariableMap::new();
        vars.insert("city".into(), single(loc.name));
        vars.insert(
            "condition".into(),
            single(format!("{color_tag} {condition_str}")),
        );
        vars.insert("temp".into(), single(self.fmt_temp(data.current.temperature_2m)));
        vars.insert(
            "feels_like".into(),
            single(self.fmt_temp(data.current.apparent_temperature)),
        );
        vars.insert("high".into(), single(self.fmt_temp(high)));
        vars.insert("low".into(), single(self.fmt_temp(low)));
        vars.insert("wind".into(), single(self.fmt_wind(data.current.wind_speed_10m)));
        vars.insert("precip".into(), single(precip));
        Ok(vars)
    }
}
