//! Weather forecasts from the OpenWeatherMap public API.
//!
//! Two-step lookup: geocode the city name to coordinates, then fetch either
//! the current conditions ("simple") or the hourly forecast ("detailed").
//! Requires an API key, so the tool is only registered when one is
//! configured.

use crate::tools::core::{Tool, ToolFuture};
use crate::{ToolDef, json_schema_for};
use schemars::JsonSchema;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

const GEO_URL: &str = "http://api.openweathermap.org/geo/1.0/direct";
const CURRENT_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
const FORECAST_URL: &str = "https://api.openweathermap.org/data/2.5/forecast";

/// Typed arguments for `get_weather_forecast`.
#[derive(Deserialize, JsonSchema)]
pub struct WeatherForecastArgs {
    /// Name of the city or location to get the forecast for.
    pub city_name: String,
    /// "simple" for basic highs/lows, "detailed" for a full hourly dump.
    pub mode: String,
}

#[derive(Deserialize)]
struct GeoResult {
    lat: f64,
    lon: f64,
}

/// Look up the weather for a named location.
pub struct WeatherForecast {
    client: reqwest::Client,
    api_key: String,
}

impl WeatherForecast {
    pub fn new(api_key: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent("charla/0.3")
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
        })
    }
}

impl Tool for WeatherForecast {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            "get_weather_forecast",
            "Gets the weather forecast for a city or location from \
             api.openweathermap.org. Mode \"simple\" returns basic current \
             conditions; mode \"detailed\" returns a full hourly JSON dump (its \
             \"dt\" fields are unix timestamps). Translate the JSON to a detailed \
             human readable text. All units are metric.",
            json_schema_for::<WeatherForecastArgs>(),
        )
    }

    fn invoke(&self, arguments: &serde_json::Value) -> ToolFuture<'_> {
        let arguments = arguments.clone();
        Box::pin(async move {
            let args: WeatherForecastArgs =
                serde_json::from_value(arguments).map_err(|e| format!("Error: {e}"))?;

            info!("weather lookup for {} ({} mode)", args.city_name, args.mode);

            let geo: Vec<GeoResult> = self
                .client
                .get(GEO_URL)
                .query(&[
                    ("q", args.city_name.as_str()),
                    ("limit", "1"),
                    ("appid", self.api_key.as_str()),
                ])
                .send()
                .await
                .map_err(|e| format!("Error, geocoding request failed: {e}"))?
                .json()
                .await
                .map_err(|e| format!("Error, cannot parse geocoding response: {e}"))?;

            let Some(place) = geo.first() else {
                return Err(format!("Error, unknown location '{}'", args.city_name));
            };

            let url = match args.mode.as_str() {
                "simple" => CURRENT_URL,
                _ => FORECAST_URL,
            };
            let lat = place.lat.to_string();
            let lon = place.lon.to_string();
            let forecast: serde_json::Value = self
                .client
                .get(url)
                .query(&[
                    ("lat", lat.as_str()),
                    ("lon", lon.as_str()),
                    ("appid", self.api_key.as_str()),
                    ("units", "metric"),
                    ("cnt", "8"),
                ])
                .send()
                .await
                .map_err(|e| format!("Error, weather request failed: {e}"))?
                .json()
                .await
                .map_err(|e| format!("Error, cannot parse weather response: {e}"))?;

            Ok(forecast.to_string())
        })
    }
}
