use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use tripkit_core::{ChecklistItem, TripRequest};
use tripkit_weather::ForecastProvider;

use crate::adjustments::AdjustmentRule;

const RAIN_GEAR_PROBABILITY: f64 = 50.0;
const HEAVY_RAIN_PROBABILITY: f64 = 60.0;
const COLD_CELSIUS: f64 = 10.0;
const FREEZING_CELSIUS: f64 = 5.0;
const HOT_CELSIUS: f64 = 30.0;

/// Forecast-driven items. The provider call may fail or hang; the engine
/// isolates that, so this rule just propagates errors.
pub struct WeatherRule {
    provider: Arc<dyn ForecastProvider>,
}

impl WeatherRule {
    pub fn new(provider: Arc<dyn ForecastProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl AdjustmentRule for WeatherRule {
    fn name(&self) -> &'static str {
        "weather"
    }

    async fn evaluate(&self, request: &TripRequest) -> Result<Vec<ChecklistItem>> {
        let summary = self
            .provider
            .forecast(&request.destination, request.start_date, request.end_date)
            .await
            .with_context(|| format!("forecast lookup for {}", request.destination))?;

        debug!(
            destination = %request.destination,
            max_rain = summary.max_rain_probability,
            min_temp = summary.min_temperature,
            max_temp = summary.max_temperature,
            "forecast summary"
        );

        let mut items = Vec::new();

        if summary.max_rain_probability > RAIN_GEAR_PROBABILITY {
            items.push(ChecklistItem::auto(
                "Folding umbrella",
                "weather",
                4,
                format!(
                    "Rain probability {:.0}% in the forecast",
                    summary.max_rain_probability
                ),
            ));

            if summary.max_rain_probability > HEAVY_RAIN_PROBABILITY {
                items.push(ChecklistItem::auto(
                    "Rain coat",
                    "weather",
                    3,
                    "High rain probability",
                ));
                items.push(ChecklistItem::auto(
                    "Waterproof bag cover",
                    "weather",
                    3,
                    "Keeps luggage dry in heavy rain",
                ));
            }
        }

        if summary.min_temperature < COLD_CELSIUS {
            items.push(ChecklistItem::auto(
                "Warm coat",
                "clothing",
                4,
                format!("Forecast low of {:.1}\u{b0}C", summary.min_temperature),
            ));
            if summary.min_temperature < FREEZING_CELSIUS {
                items.push(ChecklistItem::auto(
                    "Disposable heat pads",
                    "weather",
                    3,
                    "Forecast near freezing",
                ));
            }
        }

        if summary.max_temperature > HOT_CELSIUS {
            items.push(ChecklistItem::auto(
                "Sunscreen (SPF30+)",
                "supplies",
                3,
                format!("Forecast high of {:.1}\u{b0}C", summary.max_temperature),
            ));
            items.push(ChecklistItem::auto(
                "Cooling towel",
                "supplies",
                2,
                "Heat protection",
            ));
            items.push(ChecklistItem::auto(
                "Water bottle",
                "supplies",
                3,
                "Stay hydrated in the heat",
            ));
        }

        if summary.conditions.iter().any(|c| c == "Snow") {
            items.push(ChecklistItem::auto(
                "Non-slip shoes",
                "clothing",
                4,
                "Snow in the forecast",
            ));
        }
        if summary.conditions.iter().any(|c| c == "Wind") {
            items.push(ChecklistItem::auto(
                "Windbreaker",
                "clothing",
                3,
                "Strong wind in the forecast",
            ));
        }

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tripkit_core::TripPurpose;
    use tripkit_weather::StaticForecast;

    fn request() -> TripRequest {
        let start = Utc::now().date_naive() + Duration::days(14);
        TripRequest::new(
            "Okinawa",
            start,
            start + Duration::days(3),
            TripPurpose::Leisure,
            None,
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn seventy_percent_rain_emits_umbrella_with_probability() {
        let rule = WeatherRule::new(Arc::new(StaticForecast::rainy(70.0)));
        let items = rule.evaluate(&request()).await.unwrap();

        let umbrella = items.iter().find(|i| i.name == "Folding umbrella").unwrap();
        assert!(umbrella.reason.as_deref().unwrap().contains("70%"));
        assert!(items.iter().any(|i| i.name == "Rain coat"));
    }

    #[tokio::test]
    async fn borderline_rain_below_threshold_emits_nothing() {
        let rule = WeatherRule::new(Arc::new(StaticForecast {
            rain_probability: 50.0,
            min_temperature: 18.0,
            max_temperature: 24.0,
            conditions: vec!["Clouds".to_string()],
        }));
        let items = rule.evaluate(&request()).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn cold_snap_emits_coat_and_heat_pads() {
        let rule = WeatherRule::new(Arc::new(StaticForecast {
            rain_probability: 0.0,
            min_temperature: 2.0,
            max_temperature: 9.0,
            conditions: vec!["Snow".to_string()],
        }));
        let items = rule.evaluate(&request()).await.unwrap();
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert!(names.contains(&"Warm coat"));
        assert!(names.contains(&"Disposable heat pads"));
        assert!(names.contains(&"Non-slip shoes"));
    }

    #[tokio::test]
    async fn heat_wave_emits_hydration_items() {
        let rule = WeatherRule::new(Arc::new(StaticForecast {
            rain_probability: 0.0,
            min_temperature: 24.0,
            max_temperature: 34.0,
            conditions: vec!["Clear".to_string()],
        }));
        let items = rule.evaluate(&request()).await.unwrap();
        assert!(items.iter().any(|i| i.name == "Water bottle"));
        let sunscreen = items
            .iter()
            .find(|i| i.name == "Sunscreen (SPF30+)")
            .unwrap();
        assert!(sunscreen.reason.as_deref().unwrap().contains("34.0"));
    }
}