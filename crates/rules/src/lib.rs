//! Declarative rule-set store. The TOML tree (base templates, regional
//! rules, transport sub-modes, duration tiers, travel recommendations) is
//! parsed once at startup into an immutable `RuleSet` shared by reference
//! across all concurrent generations.

pub mod predicate;

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use tripkit_core::{ChecklistItem, ConfigError, TransportMethod, TripPurpose};

pub use predicate::{evaluate, ConditionContext};

const BUILTIN_RULES: &str = include_str!("../data/rules.toml");

/// One item template from the rule data. `condition` and `months` are
/// applicability predicates; `reason` may carry `{duration}`, `{month}`
/// and `{destination}` placeholders.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemSpec {
    pub name: String,
    pub category: String,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub months: Vec<u32>,
}

fn default_priority() -> u8 {
    3
}

impl ItemSpec {
    pub fn applies(&self, ctx: &ConditionContext) -> bool {
        if !self.months.is_empty() {
            let month = ctx.number("month");
            if !self.months.iter().any(|m| i64::from(*m) == month) {
                return false;
            }
        }
        match &self.condition {
            Some(condition) => predicate::evaluate(condition, ctx),
            None => true,
        }
    }

    /// Materializes an auto-added item, expanding reason placeholders.
    pub fn to_auto_item(&self, vars: &ReasonVars<'_>, default_reason: &str) -> ChecklistItem {
        let reason = self
            .reason
            .as_deref()
            .map(|template| vars.expand(template))
            .unwrap_or_else(|| default_reason.to_string());
        ChecklistItem::auto(&self.name, &self.category, self.priority, reason)
    }

    pub fn to_base_item(&self) -> ChecklistItem {
        ChecklistItem::base(&self.name, &self.category, self.priority)
    }
}

/// Values substituted into reason templates.
#[derive(Debug, Clone, Copy)]
pub struct ReasonVars<'a> {
    pub duration: i64,
    pub month: u32,
    pub destination: &'a str,
}

impl ReasonVars<'_> {
    pub fn expand(&self, template: &str) -> String {
        template
            .replace("{duration}", &self.duration.to_string())
            .replace("{month}", &self.month.to_string())
            .replace("{destination}", self.destination)
    }
}

/// Priority-ordered base template: first entry whose purpose matches and
/// whose pattern is a wildcard or destination substring wins.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateSpec {
    pub name: String,
    pub purpose: TripPurpose,
    pub pattern: String,
    pub items: Vec<ItemSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeasonalBucket {
    pub months: Vec<u32>,
    pub items: Vec<ItemSpec>,
}

impl SeasonalBucket {
    pub fn contains(&self, month: u32) -> bool {
        self.months.contains(&month)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegionSpec {
    pub name: String,
    pub patterns: Vec<String>,
    #[serde(default)]
    pub always: Vec<ItemSpec>,
    #[serde(default)]
    pub seasonal: Vec<SeasonalBucket>,
}

impl RegionSpec {
    pub fn matches(&self, destination: &str) -> bool {
        self.patterns
            .iter()
            .any(|pattern| destination.contains(pattern.as_str()))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubModeRules {
    #[serde(default)]
    pub items: Vec<ItemSpec>,
    #[serde(default)]
    pub seasonal: Vec<SeasonalBucket>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MethodRules {
    /// Destinations served by shinkansen (train only).
    #[serde(default)]
    pub shinkansen_hubs: Vec<String>,
    /// Destinations where a rental car is the likely choice (car only).
    #[serde(default)]
    pub rental_areas: Vec<String>,
    /// Destinations with overnight bus routes (bus only).
    #[serde(default)]
    pub night_routes: Vec<String>,
    #[serde(default)]
    pub modes: HashMap<String, SubModeRules>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DurationRules {
    pub long_stay_nights: i64,
    #[serde(default)]
    pub long_stay_items: Vec<ItemSpec>,
    pub extended_stay_nights: i64,
    #[serde(default)]
    pub extended_stay_items: Vec<ItemSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Recommendations {
    #[serde(default)]
    pub all: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub templates: Vec<TemplateSpec>,
    #[serde(default)]
    pub regions: Vec<RegionSpec>,
    #[serde(default)]
    pub transport: HashMap<String, MethodRules>,
    pub duration: DurationRules,
    #[serde(default)]
    pub recommendations: Recommendations,
}

impl RuleSet {
    /// The rule data compiled into the binary. Deployments that want to
    /// edit rules without rebuilding point `from_path` at their own file.
    pub fn builtin() -> Result<Arc<Self>, ConfigError> {
        let set = Self::from_toml_str(BUILTIN_RULES)?;
        Ok(Arc::new(set))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Arc<Self>, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let set = Self::from_toml_str(&raw)?;
        info!(path = %path.display(), "rule set loaded");
        Ok(Arc::new(set))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let set: Self =
            toml::from_str(raw).map_err(|err| ConfigError::Malformed(err.to_string()))?;
        set.validate()?;
        Ok(set)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let all_months = self
            .regions
            .iter()
            .flat_map(|region| region.seasonal.iter())
            .chain(
                self.transport
                    .values()
                    .flat_map(|method| method.modes.values())
                    .flat_map(|mode| mode.seasonal.iter()),
            )
            .flat_map(|bucket| bucket.months.iter());

        for month in all_months {
            if !(1..=12).contains(month) {
                return Err(ConfigError::Malformed(format!(
                    "seasonal bucket month {month} is out of range 1..=12"
                )));
            }
        }
        Ok(())
    }

    /// Base template selection: first matching (purpose, pattern) entry.
    /// A missing purpose-wide default is a provisioning error.
    pub fn select_template(
        &self,
        purpose: TripPurpose,
        destination: &str,
    ) -> Result<&TemplateSpec, ConfigError> {
        self.templates
            .iter()
            .find(|template| {
                template.purpose == purpose
                    && (template.pattern == "*" || destination.contains(template.pattern.as_str()))
            })
            .ok_or(ConfigError::TemplateNotFound { purpose })
    }

    /// First region whose pattern appears in the destination, if any.
    pub fn region_for(&self, destination: &str) -> Option<&RegionSpec> {
        self.regions.iter().find(|region| region.matches(destination))
    }

    pub fn transport_rules(&self, method: TransportMethod) -> Option<&MethodRules> {
        self.transport.get(method.as_str())
    }

    pub fn sub_mode(&self, method: TransportMethod, mode: &str) -> Option<&SubModeRules> {
        self.transport_rules(method)
            .and_then(|rules| rules.modes.get(mode))
    }

    /// Free-text packing advice: common items plus the method's own.
    pub fn recommendations_for(&self, method: Option<TransportMethod>) -> Vec<String> {
        let mut out = self.recommendations.all.clone();
        if let Some(rules) = method.and_then(|m| self.transport_rules(m)) {
            out.extend(rules.recommendations.iter().cloned());
        }
        out
    }
}
