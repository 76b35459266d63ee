use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use tripkit_core::{ChecklistItem, TransportMethod, TripRequest};
use tripkit_rules::{ConditionContext, ReasonVars, RuleSet};

/// A pluggable unit that conditionally contributes extra items based on
/// trip conditions. Rules are side-effect-free with respect to the request
/// and never observe each other's output; a rule that cannot determine
/// applicability returns an empty list, not an error.
#[async_trait]
pub trait AdjustmentRule: Send + Sync {
    fn name(&self) -> &'static str;

    async fn evaluate(&self, request: &TripRequest) -> Result<Vec<ChecklistItem>>;
}

pub(crate) fn base_context(request: &TripRequest) -> ConditionContext {
    let mut ctx = ConditionContext::new();
    ctx.set_number("duration", request.duration())
        .set_number("month", i64::from(request.start_month()))
        .set_flag("is_domestic", true)
        .set_flag("long_distance", request.duration() >= 2);
    ctx
}

fn reason_vars(request: &TripRequest) -> ReasonVars<'_> {
    ReasonVars {
        duration: request.duration(),
        month: request.start_month(),
        destination: &request.destination,
    }
}

/// Region-specific items: always-packed entries plus month-bucketed
/// seasonal ones, for the first region matching the destination.
pub struct RegionalRule {
    rule_set: Arc<RuleSet>,
}

impl RegionalRule {
    pub fn new(rule_set: Arc<RuleSet>) -> Self {
        Self { rule_set }
    }
}

#[async_trait]
impl AdjustmentRule for RegionalRule {
    fn name(&self) -> &'static str {
        "regional"
    }

    async fn evaluate(&self, request: &TripRequest) -> Result<Vec<ChecklistItem>> {
        let Some(region) = self.rule_set.region_for(&request.destination) else {
            return Ok(Vec::new());
        };

        let ctx = base_context(request);
        let vars = reason_vars(request);
        let month = request.start_month();
        let mut items = Vec::new();

        for spec in &region.always {
            if spec.applies(&ctx) {
                items.push(spec.to_auto_item(&vars, "Local conditions in the region"));
            }
        }
        for bucket in region.seasonal.iter().filter(|b| b.contains(month)) {
            for spec in &bucket.items {
                if spec.applies(&ctx) {
                    items.push(spec.to_auto_item(&vars, "Seasonal conditions in the region"));
                }
            }
        }

        debug!(region = region.name, count = items.len(), "regional items");
        Ok(items)
    }
}

/// Laundry and resupply items once the stay crosses the configured
/// night thresholds. Day trips contribute nothing.
pub struct DurationRule {
    rule_set: Arc<RuleSet>,
}

impl DurationRule {
    pub fn new(rule_set: Arc<RuleSet>) -> Self {
        Self { rule_set }
    }
}

#[async_trait]
impl AdjustmentRule for DurationRule {
    fn name(&self) -> &'static str {
        "duration"
    }

    async fn evaluate(&self, request: &TripRequest) -> Result<Vec<ChecklistItem>> {
        let nights = request.duration();
        let rules = &self.rule_set.duration;
        let ctx = base_context(request);
        let vars = reason_vars(request);
        let mut items = Vec::new();

        if nights >= rules.long_stay_nights {
            for spec in &rules.long_stay_items {
                if spec.applies(&ctx) {
                    items.push(spec.to_auto_item(&vars, "Long stay"));
                }
            }
        }
        if nights >= rules.extended_stay_nights {
            for spec in &rules.extended_stay_items {
                if spec.applies(&ctx) {
                    items.push(spec.to_auto_item(&vars, "Extended stay"));
                }
            }
        }

        Ok(items)
    }
}

/// Items keyed by transport method and sub-mode. The sub-mode (shinkansen
/// vs local train, rental vs personal car, highway vs local bus) is
/// inferred from the destination and trip length the way the rule data
/// expects; duration-conditioned and month-bucketed entries follow the
/// standard predicate logic.
pub struct TransportRule {
    rule_set: Arc<RuleSet>,
}

impl TransportRule {
    pub fn new(rule_set: Arc<RuleSet>) -> Self {
        Self { rule_set }
    }

    fn sub_mode_for(&self, method: TransportMethod, request: &TripRequest) -> &'static str {
        let rules = self.rule_set.transport_rules(method);
        let matches_any = |list: Option<&Vec<String>>| {
            list.is_some_and(|patterns| {
                patterns
                    .iter()
                    .any(|pattern| request.destination.contains(pattern.as_str()))
            })
        };

        match method {
            // International routing is out of scope for now.
            TransportMethod::Airplane => "domestic",
            TransportMethod::Train => {
                if matches_any(rules.map(|r| &r.shinkansen_hubs)) {
                    "shinkansen"
                } else {
                    "local"
                }
            }
            TransportMethod::Car => {
                if matches_any(rules.map(|r| &r.rental_areas)) {
                    "rental"
                } else {
                    "personal"
                }
            }
            TransportMethod::Bus => {
                if request.duration() >= 1 {
                    "highway"
                } else {
                    "local"
                }
            }
            TransportMethod::Other => "bicycle",
        }
    }
}

#[async_trait]
impl AdjustmentRule for TransportRule {
    fn name(&self) -> &'static str {
        "transport"
    }

    async fn evaluate(&self, request: &TripRequest) -> Result<Vec<ChecklistItem>> {
        let Some(method) = request.transport_method else {
            return Ok(Vec::new());
        };

        let sub_mode = self.sub_mode_for(method, request);
        let Some(mode_rules) = self.rule_set.sub_mode(method, sub_mode) else {
            debug!(method = method.as_str(), sub_mode, "no transport rules");
            return Ok(Vec::new());
        };

        let mut ctx = base_context(request);
        if method == TransportMethod::Bus {
            let night = self
                .rule_set
                .transport_rules(method)
                .is_some_and(|rules| {
                    rules
                        .night_routes
                        .iter()
                        .any(|city| request.destination.contains(city.as_str()))
                });
            ctx.set_flag("night_bus", night);
        }

        let vars = reason_vars(request);
        let month = request.start_month();
        let mut items = Vec::new();

        for spec in &mode_rules.items {
            if spec.applies(&ctx) {
                items.push(spec.to_auto_item(&vars, "Recommended for this transport method"));
            }
        }
        for bucket in mode_rules.seasonal.iter().filter(|b| b.contains(month)) {
            for spec in &bucket.items {
                if spec.applies(&ctx) {
                    items.push(spec.to_auto_item(&vars, "Seasonal transport item"));
                }
            }
        }

        debug!(
            method = method.as_str(),
            sub_mode,
            count = items.len(),
            "transport items"
        );
        Ok(items)
    }
}
