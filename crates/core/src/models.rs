use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripPurpose {
    Business,
    Leisure,
}

impl TripPurpose {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "business" | "work" => Some(Self::Business),
            "leisure" | "vacation" | "holiday" => Some(Self::Leisure),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Business => "business",
            Self::Leisure => "leisure",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMethod {
    Airplane,
    Train,
    Car,
    Bus,
    Other,
}

impl TransportMethod {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "airplane" | "plane" | "flight" => Some(Self::Airplane),
            "train" | "rail" | "shinkansen" => Some(Self::Train),
            "car" => Some(Self::Car),
            "bus" => Some(Self::Bus),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Airplane => "airplane",
            Self::Train => "train",
            Self::Car => "car",
            Self::Bus => "bus",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccommodationType {
    Hotel,
    Ryokan,
    Rental,
    Friends,
    Other,
}

impl AccommodationType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "hotel" => Some(Self::Hotel),
            "ryokan" | "inn" => Some(Self::Ryokan),
            "rental" | "airbnb" => Some(Self::Rental),
            "friends" | "family" => Some(Self::Friends),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hotel => "hotel",
            Self::Ryokan => "ryokan",
            Self::Rental => "rental",
            Self::Friends => "friends",
            Self::Other => "other",
        }
    }
}

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 5;

/// One entry of a checklist. The name is the dedup key within a checklist;
/// two items with the same name never survive a merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub name: String,
    pub category: String,
    pub priority: u8,
    pub auto_added: bool,
    pub reason: Option<String>,
    #[serde(default)]
    pub checked: bool,
}

impl ChecklistItem {
    /// An item coming from a base template.
    pub fn base(name: impl Into<String>, category: impl Into<String>, priority: u8) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            priority: priority.clamp(MIN_PRIORITY, MAX_PRIORITY),
            auto_added: false,
            reason: None,
            checked: false,
        }
    }

    /// An item contributed by an adjustment rule; always carries a reason.
    pub fn auto(
        name: impl Into<String>,
        category: impl Into<String>,
        priority: u8,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            priority: priority.clamp(MIN_PRIORITY, MAX_PRIORITY),
            auto_added: true,
            reason: Some(reason.into()),
            checked: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripRequest {
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub purpose: TripPurpose,
    pub transport_method: Option<TransportMethod>,
    pub accommodation: Option<AccommodationType>,
}

impl TripRequest {
    /// Validates and builds a request. The start date is checked against
    /// the current UTC date; callers replaying historical requests should
    /// not exist in this system.
    pub fn new(
        destination: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        purpose: TripPurpose,
        transport_method: Option<TransportMethod>,
        accommodation: Option<AccommodationType>,
    ) -> Result<Self, ValidationError> {
        let destination = destination.into();
        if destination.trim().is_empty() {
            return Err(ValidationError::EmptyDestination);
        }
        if end_date < start_date {
            return Err(ValidationError::EndBeforeStart {
                start: start_date,
                end: end_date,
            });
        }
        if start_date < Utc::now().date_naive() {
            return Err(ValidationError::StartInPast { start: start_date });
        }

        Ok(Self {
            destination,
            start_date,
            end_date,
            purpose,
            transport_method,
            accommodation,
        })
    }

    /// Nights away, in whole days. Zero for a day trip.
    pub fn duration(&self) -> i64 {
        (self.end_date - self.start_date).num_days()
    }

    pub fn start_month(&self) -> u32 {
        use chrono::Datelike;
        self.start_date.month()
    }

    /// Stable key for one trip, used to derive the checklist id.
    pub fn trip_key(&self) -> String {
        format!(
            "{}-{}-{}",
            self.start_date.format("%Y%m%d"),
            self.destination,
            self.purpose.as_str()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistStatus {
    Planning,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripChecklist {
    pub id: String,
    pub user_id: String,
    pub request: TripRequest,
    pub items: Vec<ChecklistItem>,
    pub created_at: DateTime<Utc>,
}

impl TripChecklist {
    /// Ids are derived from user + trip key, so regenerating the same trip
    /// for the same user overwrites rather than duplicates.
    pub fn derive_id(user_id: &str, request: &TripRequest) -> String {
        let mut hasher = Sha256::new();
        hasher.update(user_id.as_bytes());
        hasher.update(b"/");
        hasher.update(request.trip_key().as_bytes());
        let digest = hasher.finalize();
        digest[..16].iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn completed_count(&self) -> usize {
        self.items.iter().filter(|item| item.checked).count()
    }

    pub fn total_count(&self) -> usize {
        self.items.len()
    }

    pub fn completion_percentage(&self) -> f64 {
        if self.items.is_empty() {
            return 0.0;
        }
        self.completed_count() as f64 / self.items.len() as f64 * 100.0
    }

    /// Driven entirely by how many items are checked; the engine never
    /// touches this.
    pub fn status(&self) -> ChecklistStatus {
        let done = self.completed_count();
        if done == 0 {
            ChecklistStatus::Planning
        } else if done == self.items.len() {
            ChecklistStatus::Completed
        } else {
            ChecklistStatus::InProgress
        }
    }

    /// Flips the checked flag of the named item. Returns the new state, or
    /// None when no item carries that name.
    pub fn toggle_item(&mut self, name: &str) -> Option<bool> {
        let item = self.items.iter_mut().find(|item| item.name == name)?;
        item.checked = !item.checked;
        Some(item.checked)
    }

    /// Items grouped by category, categories in final presentation order.
    pub fn items_by_category(&self) -> Vec<(String, Vec<&ChecklistItem>)> {
        let mut groups: Vec<(String, Vec<&ChecklistItem>)> = Vec::new();
        for item in &self.items {
            match groups.iter_mut().find(|(name, _)| *name == item.category) {
                Some((_, bucket)) => bucket.push(item),
                None => groups.push((item.category.clone(), vec![item])),
            }
        }
        groups
    }

    pub fn to_markdown(&self) -> String {
        let mut lines = vec![
            format!("# {} trip checklist", self.request.destination),
            format!(
                "**Dates**: {} to {}",
                self.request.start_date, self.request.end_date
            ),
            format!("**Purpose**: {}", self.request.purpose.as_str()),
            format!(
                "**Progress**: {:.1}% ({}/{})",
                self.completion_percentage(),
                self.completed_count(),
                self.total_count()
            ),
            String::new(),
        ];

        for (category, items) in self.items_by_category() {
            lines.push(format!("## {category}"));
            for item in items {
                let check = if item.checked { "x" } else { " " };
                lines.push(format!("- [{check}] {}", item.name));
                if item.auto_added {
                    if let Some(reason) = &item.reason {
                        lines.push(format!("  - {reason}"));
                    }
                }
            }
            lines.push(String::new());
        }

        lines.join("\n")
    }
}
