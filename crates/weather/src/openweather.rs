use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::{DailyForecast, ForecastProvider, ForecastSummary, WeatherError};

const GEOCODING_URL: &str = "https://api.openweathermap.org/geo/1.0/direct";
const FORECAST_URL: &str = "https://api.openweathermap.org/data/2.5/forecast";
const CURRENT_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

const CACHE_TTL: Duration = Duration::from_secs(60 * 60);
const CACHE_CAP: usize = 100;

/// OpenWeatherMap-backed provider: geocode the destination, pull the
/// 5-day/3-hour forecast, collapse it to daily figures. Responses are
/// cached for an hour; forecast freshness is explicitly not guaranteed.
pub struct OpenWeatherClient {
    api_key: String,
    http: Client,
    cache: RwLock<HashMap<String, (ForecastSummary, Instant)>>,
}

impl OpenWeatherClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, WeatherError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(WeatherError::NotConfigured);
        }

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(6))
            .timeout(Duration::from_secs(20))
            .build()?;

        Ok(Self {
            api_key,
            http,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Builds a client from `TRIPKIT_WEATHER_API_KEY`, or None when the
    /// key is absent and the weather rule should stay unregistered.
    pub fn from_env() -> Option<Self> {
        let key = std::env::var("TRIPKIT_WEATHER_API_KEY").ok()?;
        match Self::new(key) {
            Ok(client) => Some(client),
            Err(_) => None,
        }
    }

    async fn geocode(&self, location: &str) -> Result<GeoHit, WeatherError> {
        let response = self
            .http
            .get(GEOCODING_URL)
            .query(&[("q", location), ("limit", "1"), ("appid", &self.api_key)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(WeatherError::BadStatus {
                endpoint: "geocoding",
                status: response.status().as_u16(),
            });
        }

        let mut hits: Vec<GeoHit> = response.json().await?;
        if hits.is_empty() {
            return Err(WeatherError::LocationNotFound(location.to_string()));
        }
        Ok(hits.remove(0))
    }

    async fn fetch_forecast(
        &self,
        hit: &GeoHit,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<DailyForecast>, WeatherError> {
        let response = self
            .http
            .get(FORECAST_URL)
            .query(&[
                ("lat", hit.lat.to_string()),
                ("lon", hit.lon.to_string()),
                ("appid", self.api_key.clone()),
                ("units", "metric".to_string()),
                ("cnt", "40".to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(WeatherError::BadStatus {
                endpoint: "forecast",
                status: response.status().as_u16(),
            });
        }

        let payload: ForecastResponse = response.json().await?;

        // Bucket the 3-hourly slots into trip days.
        let mut by_day: Vec<(NaiveDate, Vec<ForecastSlot>)> = Vec::new();
        for slot in payload.list {
            let Some(at) = DateTime::from_timestamp(slot.dt, 0) else {
                continue;
            };
            let day = at.date_naive();
            if day < start_date || day > end_date {
                continue;
            }
            match by_day.iter_mut().find(|(d, _)| *d == day) {
                Some((_, slots)) => slots.push(slot),
                None => by_day.push((day, vec![slot])),
            }
        }
        by_day.sort_by_key(|(day, _)| *day);

        let mut daily = Vec::with_capacity(by_day.len());
        for (day, slots) in by_day {
            daily.push(collapse_day(day, &slots));
        }

        // Near-term trips beyond the forecast payload fall back to the
        // current conditions instead of the synthetic default.
        if daily.is_empty() && start_date <= Utc::now().date_naive() + chrono::Duration::days(1) {
            if let Some(current) = self.fetch_current(hit).await? {
                daily.push(current);
            }
        }

        Ok(daily)
    }

    async fn fetch_current(&self, hit: &GeoHit) -> Result<Option<DailyForecast>, WeatherError> {
        let response = self
            .http
            .get(CURRENT_URL)
            .query(&[
                ("lat", hit.lat.to_string()),
                ("lon", hit.lon.to_string()),
                ("appid", self.api_key.clone()),
                ("units", "metric".to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let payload: CurrentResponse = response.json().await?;
        let (condition, description) = payload
            .weather
            .first()
            .map(|w| (w.main.clone(), w.description.clone()))
            .unwrap_or_else(|| ("Clear".to_string(), "clear sky".to_string()));

        Ok(Some(DailyForecast {
            date: Utc::now().date_naive(),
            temperature: payload.main.temp,
            temp_min: payload.main.temp_min,
            temp_max: payload.main.temp_max,
            humidity: payload.main.humidity,
            rain_probability: 0.0,
            condition,
            description,
            wind_speed: payload.wind.speed,
        }))
    }

    fn cached(&self, key: &str) -> Option<ForecastSummary> {
        let guard = self.cache.read();
        let (summary, at) = guard.get(key)?;
        if at.elapsed() < CACHE_TTL {
            Some(summary.clone())
        } else {
            None
        }
    }

    fn store(&self, key: String, summary: ForecastSummary) {
        let mut guard = self.cache.write();
        guard.retain(|_, (_, at)| at.elapsed() < CACHE_TTL);
        if guard.len() >= CACHE_CAP {
            if let Some(oldest) = guard
                .iter()
                .min_by_key(|(_, (_, at))| *at)
                .map(|(k, _)| k.clone())
            {
                guard.remove(&oldest);
            }
        }
        guard.insert(key, (summary, Instant::now()));
    }
}

#[async_trait]
impl ForecastProvider for OpenWeatherClient {
    async fn forecast(
        &self,
        destination: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<ForecastSummary, WeatherError> {
        let cache_key = format!("{destination}|{start_date}|{end_date}");
        if let Some(summary) = self.cached(&cache_key) {
            debug!(destination, "forecast served from cache");
            return Ok(summary);
        }

        let hit = self.geocode(destination).await?;
        let daily = self.fetch_forecast(&hit, start_date, end_date).await?;
        let summary = ForecastSummary::from_daily(&hit.name, start_date, end_date, daily);

        info!(
            destination,
            days = summary.daily.len(),
            max_rain = summary.max_rain_probability,
            "forecast fetched"
        );

        self.store(cache_key, summary.clone());
        Ok(summary)
    }
}

fn collapse_day(day: NaiveDate, slots: &[ForecastSlot]) -> DailyForecast {
    let n = slots.len().max(1) as f64;
    let temps: Vec<f64> = slots.iter().map(|s| s.main.temp).collect();

    // Most frequent condition across the day's slots.
    let mut counts: Vec<(&str, usize, &str)> = Vec::new();
    for slot in slots {
        if let Some(weather) = slot.weather.first() {
            match counts.iter_mut().find(|(c, _, _)| *c == weather.main) {
                Some((_, count, _)) => *count += 1,
                None => counts.push((&weather.main, 1, &weather.description)),
            }
        }
    }
    let (condition, description) = counts
        .iter()
        .max_by_key(|(_, count, _)| *count)
        .map(|(c, _, d)| (c.to_string(), d.to_string()))
        .unwrap_or_else(|| ("Clear".to_string(), "clear sky".to_string()));

    DailyForecast {
        date: day,
        temperature: temps.iter().sum::<f64>() / n,
        temp_min: temps.iter().copied().fold(f64::MAX, f64::min),
        temp_max: temps.iter().copied().fold(f64::MIN, f64::max),
        humidity: (slots.iter().map(|s| s.main.humidity).sum::<u32>() as f64 / n) as u32,
        rain_probability: slots.iter().map(|s| s.pop * 100.0).fold(0.0, f64::max),
        condition,
        description,
        wind_speed: slots.iter().map(|s| s.wind.speed).sum::<f64>() / n,
    }
}

#[derive(Debug, Deserialize)]
struct GeoHit {
    lat: f64,
    lon: f64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    list: Vec<ForecastSlot>,
}

#[derive(Debug, Deserialize)]
struct ForecastSlot {
    dt: i64,
    main: SlotMain,
    #[serde(default)]
    weather: Vec<SlotWeather>,
    #[serde(default)]
    wind: SlotWind,
    #[serde(default)]
    pop: f64,
}

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    main: CurrentMain,
    #[serde(default)]
    weather: Vec<SlotWeather>,
    #[serde(default)]
    wind: SlotWind,
}

#[derive(Debug, Deserialize)]
struct SlotMain {
    temp: f64,
    humidity: u32,
}

#[derive(Debug, Deserialize)]
struct CurrentMain {
    temp: f64,
    temp_min: f64,
    temp_max: f64,
    humidity: u32,
}

#[derive(Debug, Deserialize)]
struct SlotWeather {
    main: String,
    description: String,
}

#[derive(Debug, Default, Deserialize)]
struct SlotWind {
    #[serde(default)]
    speed: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_api_key_is_not_configured() {
        assert!(matches!(
            OpenWeatherClient::new("  "),
            Err(WeatherError::NotConfigured)
        ));
    }

    #[test]
    fn collapse_day_picks_dominant_condition_and_peak_rain() {
        let slots = vec![
            slot(10.0, 0.2, "Clouds"),
            slot(12.0, 0.7, "Rain"),
            slot(11.0, 0.5, "Rain"),
        ];
        let day = collapse_day("2026-09-10".parse().unwrap(), &slots);
        assert_eq!(day.condition, "Rain");
        assert_eq!(day.rain_probability, 70.0);
        assert_eq!(day.temp_min, 10.0);
        assert_eq!(day.temp_max, 12.0);
    }

    fn slot(temp: f64, pop: f64, condition: &str) -> ForecastSlot {
        ForecastSlot {
            dt: 0,
            main: SlotMain {
                temp,
                humidity: 50,
            },
            weather: vec![SlotWeather {
                main: condition.to_string(),
                description: condition.to_lowercase(),
            }],
            wind: SlotWind::default(),
            pop,
        }
    }
}
