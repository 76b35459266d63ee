//! Weather collaborator. The engine only sees `ForecastProvider`; the
//! OpenWeatherMap client behind it may fail or time out, and that failure
//! never propagates beyond the rule that called it.

mod openweather;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use openweather::OpenWeatherClient;

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("weather api is not configured")]
    NotConfigured,
    #[error("location not found: {0}")]
    LocationNotFound(String),
    #[error("{endpoint} returned status {status}")]
    BadStatus { endpoint: &'static str, status: u16 },
    #[error("weather request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub temperature: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub humidity: u32,
    pub rain_probability: f64,
    pub condition: String,
    pub description: String,
    pub wind_speed: f64,
}

/// Aggregated forecast for a trip window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastSummary {
    pub location: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub daily: Vec<DailyForecast>,
    pub has_rain: bool,
    pub min_temperature: f64,
    pub max_temperature: f64,
    pub avg_temperature: f64,
    pub max_rain_probability: f64,
    pub conditions: Vec<String>,
}

impl ForecastSummary {
    pub fn from_daily(
        location: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        daily: Vec<DailyForecast>,
    ) -> Self {
        if daily.is_empty() {
            // Beyond the provider's horizon: assume mild and dry rather
            // than failing the whole lookup.
            return Self {
                location: location.to_string(),
                start_date,
                end_date,
                daily,
                has_rain: false,
                min_temperature: 20.0,
                max_temperature: 25.0,
                avg_temperature: 22.5,
                max_rain_probability: 0.0,
                conditions: vec!["Clear".to_string()],
            };
        }

        let mut conditions: Vec<String> = Vec::new();
        for day in &daily {
            if !conditions.contains(&day.condition) {
                conditions.push(day.condition.clone());
            }
        }

        let max_rain_probability = daily
            .iter()
            .map(|d| d.rain_probability)
            .fold(0.0_f64, f64::max);

        Self {
            location: location.to_string(),
            start_date,
            end_date,
            has_rain: max_rain_probability > 30.0,
            min_temperature: daily.iter().map(|d| d.temp_min).fold(f64::MAX, f64::min),
            max_temperature: daily.iter().map(|d| d.temp_max).fold(f64::MIN, f64::max),
            avg_temperature: daily.iter().map(|d| d.temperature).sum::<f64>() / daily.len() as f64,
            max_rain_probability,
            conditions,
            daily,
        }
    }
}

#[async_trait]
pub trait ForecastProvider: Send + Sync {
    async fn forecast(
        &self,
        destination: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<ForecastSummary, WeatherError>;
}

/// Fixed-response provider for tests and offline runs.
#[derive(Debug, Clone)]
pub struct StaticForecast {
    pub rain_probability: f64,
    pub min_temperature: f64,
    pub max_temperature: f64,
    pub conditions: Vec<String>,
}

impl StaticForecast {
    pub fn mild() -> Self {
        Self {
            rain_probability: 10.0,
            min_temperature: 18.0,
            max_temperature: 24.0,
            conditions: vec!["Clear".to_string()],
        }
    }

    pub fn rainy(probability: f64) -> Self {
        Self {
            rain_probability: probability,
            min_temperature: 16.0,
            max_temperature: 22.0,
            conditions: vec!["Rain".to_string()],
        }
    }
}

#[async_trait]
impl ForecastProvider for StaticForecast {
    async fn forecast(
        &self,
        destination: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<ForecastSummary, WeatherError> {
        Ok(ForecastSummary {
            location: destination.to_string(),
            start_date,
            end_date,
            daily: Vec::new(),
            has_rain: self.rain_probability > 30.0,
            min_temperature: self.min_temperature,
            max_temperature: self.max_temperature,
            avg_temperature: (self.min_temperature + self.max_temperature) / 2.0,
            max_rain_probability: self.rain_probability,
            conditions: self.conditions.clone(),
        })
    }
}
