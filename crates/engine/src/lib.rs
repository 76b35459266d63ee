//! Checklist generation: base template selection plus concurrent
//! adjustment-rule fan-out with per-rule timeouts and failure isolation.

pub mod adjustments;
mod weather_rule;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, instrument, warn};

use tripkit_core::{
    merge_items, GenerationError, TransportMethod, TripChecklist, TripRequest,
};
use tripkit_observability::AppMetrics;
use tripkit_rules::RuleSet;
use tripkit_weather::ForecastProvider;

pub use adjustments::{AdjustmentRule, DurationRule, RegionalRule, TransportRule};
pub use weather_rule::WeatherRule;

pub const DEFAULT_RULE_TIMEOUT: Duration = Duration::from_secs(5);
const RULE_TIMEOUT_ENV: &str = "TRIPKIT_RULE_TIMEOUT_MS";

/// Per-process rule timeout, overridable via `TRIPKIT_RULE_TIMEOUT_MS`.
pub fn rule_timeout_from_env() -> Duration {
    std::env::var(RULE_TIMEOUT_ENV)
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_RULE_TIMEOUT)
}

pub struct ChecklistEngine {
    rule_set: Arc<RuleSet>,
    rules: Vec<Arc<dyn AdjustmentRule>>,
    metrics: Arc<AppMetrics>,
    rule_timeout: Duration,
}

impl ChecklistEngine {
    /// Engine with no adjustment rules; callers register their own.
    pub fn new(rule_set: Arc<RuleSet>, metrics: Arc<AppMetrics>) -> Self {
        Self {
            rule_set,
            rules: Vec::new(),
            metrics,
            rule_timeout: rule_timeout_from_env(),
        }
    }

    /// Standard rule roster. Registration order is part of the contract:
    /// later rules win name conflicts during the merge, so the forecast
    /// rule goes last.
    pub fn with_default_rules(
        rule_set: Arc<RuleSet>,
        metrics: Arc<AppMetrics>,
        forecast: Option<Arc<dyn ForecastProvider>>,
    ) -> Self {
        let mut engine = Self::new(Arc::clone(&rule_set), metrics);
        engine
            .register(Arc::new(RegionalRule::new(Arc::clone(&rule_set))))
            .register(Arc::new(DurationRule::new(Arc::clone(&rule_set))))
            .register(Arc::new(TransportRule::new(rule_set)));
        if let Some(provider) = forecast {
            engine.register(Arc::new(WeatherRule::new(provider)));
        }
        engine
    }

    pub fn register(&mut self, rule: Arc<dyn AdjustmentRule>) -> &mut Self {
        self.rules.push(rule);
        self
    }

    pub fn set_rule_timeout(&mut self, timeout: Duration) {
        self.rule_timeout = timeout;
    }

    pub fn rule_set(&self) -> &Arc<RuleSet> {
        &self.rule_set
    }

    /// Packing advice strings for a transport method, independent of any
    /// concrete trip.
    pub fn recommendations(&self, method: Option<TransportMethod>) -> Vec<String> {
        self.rule_set.recommendations_for(method)
    }

    /// Full generation pass for one trip. A rule that fails or exceeds the
    /// timeout contributes nothing; the checklist is still produced from
    /// the base template and the surviving rules.
    #[instrument(
        skip(self, request),
        fields(destination = %request.destination, purpose = ?request.purpose)
    )]
    pub async fn generate(
        &self,
        request: TripRequest,
        user_id: &str,
    ) -> Result<TripChecklist, GenerationError> {
        let started = Instant::now();

        let template = self
            .rule_set
            .select_template(request.purpose, &request.destination)?;
        let ctx = adjustments::base_context(&request);
        let mut candidates: Vec<_> = template
            .items
            .iter()
            .filter(|spec| spec.applies(&ctx))
            .map(|spec| spec.to_base_item())
            .collect();
        debug!(template = %template.name, base_items = candidates.len(), "template selected");

        let handles: Vec<_> = self
            .rules
            .iter()
            .map(|rule| {
                let rule = Arc::clone(rule);
                let request = request.clone();
                let budget = self.rule_timeout;
                tokio::spawn(async move {
                    let name = rule.name();
                    let outcome = tokio::time::timeout(budget, rule.evaluate(&request)).await;
                    (name, outcome)
                })
            })
            .collect();

        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok((name, Ok(Ok(items)))) => {
                    debug!(rule = name, count = items.len(), "rule contributed");
                    candidates.extend(items.into_iter().map(|mut item| {
                        item.auto_added = true;
                        item
                    }));
                }
                Ok((name, Ok(Err(error)))) => {
                    warn!(rule = name, %error, "rule failed, skipping its items");
                    self.metrics.inc_rule_failure();
                }
                Ok((name, Err(_))) => {
                    warn!(rule = name, timeout_ms = self.rule_timeout.as_millis() as u64,
                        "rule timed out, skipping its items");
                    self.metrics.inc_rule_timeout();
                }
                Err(error) => {
                    warn!(%error, "rule task panicked, skipping its items");
                    self.metrics.inc_rule_failure();
                }
            }
        }

        let items = merge_items(candidates);
        let checklist = TripChecklist {
            id: TripChecklist::derive_id(user_id, &request),
            user_id: user_id.to_string(),
            request,
            items,
            created_at: Utc::now(),
        };

        self.metrics.inc_generation();
        self.metrics.add_items_emitted(checklist.items.len());
        self.metrics.observe_latency(started.elapsed());
        debug!(id = %checklist.id, items = checklist.items.len(), "checklist generated");
        Ok(checklist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, Utc};
    use tripkit_core::{ChecklistItem, TripPurpose};
    use tripkit_weather::StaticForecast;

    fn upcoming(month: u32) -> NaiveDate {
        let today = Utc::now().date_naive();
        let mut year = today.year();
        if month <= today.month() {
            year += 1;
        }
        NaiveDate::from_ymd_opt(year, month, 10).unwrap()
    }

    fn request(
        destination: &str,
        month: u32,
        nights: i64,
        purpose: TripPurpose,
        method: Option<TransportMethod>,
    ) -> TripRequest {
        let start = upcoming(month);
        TripRequest::new(
            destination,
            start,
            start + ChronoDuration::days(nights),
            purpose,
            method,
            None,
        )
        .unwrap()
    }

    fn engine(forecast: StaticForecast) -> ChecklistEngine {
        ChecklistEngine::with_default_rules(
            RuleSet::builtin().unwrap(),
            AppMetrics::shared(),
            Some(Arc::new(forecast)),
        )
    }

    struct FailingRule;

    #[async_trait]
    impl AdjustmentRule for FailingRule {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn evaluate(&self, _request: &TripRequest) -> Result<Vec<ChecklistItem>> {
            Err(anyhow!("upstream unavailable"))
        }
    }

    struct SleepyRule;

    #[async_trait]
    impl AdjustmentRule for SleepyRule {
        fn name(&self) -> &'static str {
            "sleepy"
        }

        async fn evaluate(&self, _request: &TripRequest) -> Result<Vec<ChecklistItem>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![ChecklistItem::auto("Never arrives", "misc", 1, "late")])
        }
    }

    struct OverrideRule;

    #[async_trait]
    impl AdjustmentRule for OverrideRule {
        fn name(&self) -> &'static str {
            "override"
        }

        async fn evaluate(&self, _request: &TripRequest) -> Result<Vec<ChecklistItem>> {
            Ok(vec![ChecklistItem::auto(
                "Business cards",
                "business",
                5,
                "Client meetings scheduled",
            )])
        }
    }

    #[tokio::test]
    async fn same_request_yields_same_id_and_order() {
        let engine = engine(StaticForecast::mild());
        let req = request(
            "Sapporo",
            6,
            2,
            TripPurpose::Business,
            Some(TransportMethod::Airplane),
        );

        let first = engine.generate(req.clone(), "alice").await.unwrap();
        let second = engine.generate(req, "alice").await.unwrap();

        assert_eq!(first.id, second.id);
        let names = |c: &TripChecklist| c.items.iter().map(|i| i.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(&first), names(&second));
    }

    #[tokio::test]
    async fn different_users_get_different_ids() {
        let engine = engine(StaticForecast::mild());
        let req = request("Kyoto", 4, 2, TripPurpose::Leisure, None);

        let a = engine.generate(req.clone(), "alice").await.unwrap();
        let b = engine.generate(req, "bob").await.unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn failing_and_slow_rules_do_not_block_generation() {
        let mut engine = ChecklistEngine::with_default_rules(
            RuleSet::builtin().unwrap(),
            AppMetrics::shared(),
            None,
        );
        engine.register(Arc::new(FailingRule));
        engine.register(Arc::new(SleepyRule));
        engine.set_rule_timeout(Duration::from_millis(50));

        let req = request("Fukuoka", 5, 2, TripPurpose::Business, None);
        let checklist = engine.generate(req, "alice").await.unwrap();

        assert!(!checklist.items.is_empty());
        assert!(!checklist.items.iter().any(|i| i.name == "Never arrives"));
    }

    #[tokio::test]
    async fn sapporo_business_in_june_skips_winter_gear() {
        let engine = engine(StaticForecast::mild());
        let req = request(
            "Sapporo",
            6,
            2,
            TripPurpose::Business,
            Some(TransportMethod::Car),
        );
        let checklist = engine.generate(req, "alice").await.unwrap();

        let names: Vec<&str> = checklist.items.iter().map(|i| i.name.as_str()).collect();
        assert!(names.contains(&"Business cards"));
        assert!(names.contains(&"Light jacket"));
        assert!(!names.contains(&"Down jacket"));
        assert!(!names.contains(&"Tire chains"));
    }

    #[tokio::test]
    async fn rainy_okinawa_reason_cites_probability() {
        let engine = engine(StaticForecast::rainy(70.0));
        let req = request("Okinawa", 7, 3, TripPurpose::Leisure, None);
        let checklist = engine.generate(req, "alice").await.unwrap();

        let umbrella = checklist
            .items
            .iter()
            .find(|i| i.name == "Folding umbrella")
            .unwrap();
        assert!(umbrella.auto_added);
        assert!(umbrella.reason.as_deref().unwrap().contains("70"));
        assert!(checklist.items.iter().any(|i| i.name == "Sunscreen (SPF50+)"));
    }

    #[tokio::test]
    async fn later_rule_replaces_base_item_of_same_name() {
        let mut engine = ChecklistEngine::with_default_rules(
            RuleSet::builtin().unwrap(),
            AppMetrics::shared(),
            None,
        );
        engine.register(Arc::new(OverrideRule));

        let req = request("Tokyo", 9, 1, TripPurpose::Business, None);
        let checklist = engine.generate(req, "alice").await.unwrap();

        let cards: Vec<&ChecklistItem> = checklist
            .items
            .iter()
            .filter(|i| i.name == "Business cards")
            .collect();
        assert_eq!(cards.len(), 1);
        assert!(cards[0].auto_added);
        assert_eq!(cards[0].priority, 5);
        assert_eq!(cards[0].reason.as_deref(), Some("Client meetings scheduled"));
    }

    #[tokio::test]
    async fn duration_extras_appear_only_on_long_stays() {
        let engine = engine(StaticForecast::mild());

        let short = engine
            .generate(request("Nagoya", 10, 1, TripPurpose::Leisure, None), "a")
            .await
            .unwrap();
        assert!(!short.items.iter().any(|i| i.name == "Travel laundry detergent"));

        let long = engine
            .generate(request("Nagoya", 10, 10, TripPurpose::Leisure, None), "a")
            .await
            .unwrap();
        let laundry = long
            .items
            .iter()
            .find(|i| i.name == "Travel laundry detergent")
            .unwrap();
        assert!(laundry.reason.as_deref().unwrap().contains("10"));
        assert!(long.items.iter().any(|i| i.name == "Nail clippers"));
    }

    #[tokio::test]
    async fn items_sorted_by_priority_then_category_then_name() {
        let engine = engine(StaticForecast::mild());
        let req = request("Osaka", 5, 3, TripPurpose::Leisure, None);
        let checklist = engine.generate(req, "alice").await.unwrap();

        for pair in checklist.items.windows(2) {
            let ordering = pair[1]
                .priority
                .cmp(&pair[0].priority)
                .then_with(|| pair[0].category.cmp(&pair[1].category))
                .then_with(|| pair[0].name.cmp(&pair[1].name));
            assert_ne!(ordering, std::cmp::Ordering::Greater, "items out of order");
        }
    }
}
