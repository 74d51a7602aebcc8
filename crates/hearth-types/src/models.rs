use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use hearth_ledger::Cents;

// -- Enums stored as text --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrencePeriod {
    Weekly,
    Monthly,
    Quarterly,
}

impl RecurrencePeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
        }
    }
}

impl FromStr for RecurrencePeriod {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteCategory {
    #[default]
    General,
    Shopping,
    Reminder,
    Info,
    Maintenance,
}

impl NoteCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Shopping => "shopping",
            Self::Reminder => "reminder",
            Self::Info => "info",
            Self::Maintenance => "maintenance",
        }
    }
}

impl FromStr for NoteCategory {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(Self::General),
            "shopping" => Ok(Self::Shopping),
            "reminder" => Ok(Self::Reminder),
            "info" => Ok(Self::Info),
            "maintenance" => Ok(Self::Maintenance),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// A stored enum column held a value this build does not know.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("unknown variant '{0}'")]
pub struct UnknownVariant(pub String);

// -- Entities --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct House {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub invite_code: String,
    pub currency: String,
    pub avatar_url: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A house as seen from one of its members' dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HouseMembership {
    pub house: House,
    pub is_admin: bool,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub user_id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
    pub is_admin: bool,
    pub joined_at: DateTime<Utc>,
    pub is_home: bool,
    pub presence_updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Presence {
    pub house_id: Uuid,
    pub user_id: Uuid,
    pub is_home: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub expense_id: Uuid,
    pub user_id: Uuid,
    pub amount_cents: Cents,
    pub amount: String,
    pub paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub house_id: Uuid,
    pub title: String,
    pub amount_cents: Cents,
    /// Display form in the house currency, e.g. "$10.00".
    pub amount: String,
    pub recurrence_period: Option<RecurrencePeriod>,
    pub due_date: Option<NaiveDate>,
    pub split_with: Vec<Uuid>,
    pub created_by: Uuid,
    pub created_by_username: String,
    pub created_at: DateTime<Utc>,
    pub payments: Vec<Payment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteImage {
    pub id: Uuid,
    pub url: String,
    pub content_type: String,
    pub size: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub house_id: Uuid,
    pub title: String,
    pub content: String,
    pub category: NoteCategory,
    pub created_by: Uuid,
    pub created_by_username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub images: Vec<NoteImage>,
}
