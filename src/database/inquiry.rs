use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{Database, Iter, TryFromKeyValue};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum InquiryType {
    #[default]
    General,
    /// A request to visit the property; this is how viewings are booked.
    SiteVisit,
    PriceNegotiation,
    Documentation,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum InquiryStatus {
    #[default]
    Pending,
    Responded,
    Scheduled,
    Completed,
    Cancelled,
}

impl InquiryStatus {
    pub(crate) fn can_transition_to(self, next: InquiryStatus) -> bool {
        use InquiryStatus::{Cancelled, Completed, Pending, Responded, Scheduled};

        matches!(
            (self, next),
            (Pending, Responded | Scheduled | Cancelled)
                | (Responded, Scheduled | Completed | Cancelled)
                | (Scheduled, Completed | Cancelled)
        )
    }

    pub(crate) fn is_final(self) -> bool {
        matches!(self, InquiryStatus::Completed | InquiryStatus::Cancelled)
    }
}

impl FromStr for InquiryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "responded" => Ok(Self::Responded),
            "scheduled" => Ok(Self::Scheduled),
            "completed" => Ok(Self::Completed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(format!("unknown inquiry status `{other}`")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InquiryResponse {
    pub(crate) message: String,
    pub(crate) responder_id: u64,
    pub(crate) created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Inquiry {
    pub(crate) id: u64,
    pub(crate) property_id: u64,
    pub(crate) sender_id: u64,
    pub(crate) receiver_id: u64,
    pub(crate) message: String,
    pub(crate) inquiry_type: InquiryType,
    pub(crate) preferred_visit_date: Option<NaiveDate>,
    pub(crate) preferred_visit_time: Option<String>,
    pub(crate) status: InquiryStatus,
    pub(crate) responses: Vec<InquiryResponse>,
    pub(crate) is_read: bool,
    pub(crate) read_at: Option<DateTime<Utc>>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl TryFromKeyValue for Inquiry {
    fn try_from_key_value(key: &[u8], value: &[u8]) -> Result<Self> {
        super::decode(key, value)
    }
}

impl Database {
    pub(crate) fn insert_inquiry(&self, mut inquiry: Inquiry) -> Result<Inquiry> {
        inquiry.id = self.generate_id()?;
        Database::insert(&self.inquiries, inquiry.id, &inquiry)?;
        Ok(inquiry)
    }

    pub(crate) fn inquiry(&self, id: u64) -> Result<Option<Inquiry>> {
        Database::get(&self.inquiries, id)
    }

    pub(crate) fn inquiries(&self) -> Iter<Inquiry> {
        Iter::new(self.inquiries.iter())
    }

    pub(crate) fn modify_inquiry<E, F>(&self, id: u64, f: F) -> Result<Option<Inquiry>, E>
    where
        E: From<anyhow::Error>,
        F: FnMut(&mut Inquiry) -> Result<(), E>,
    {
        Database::modify(&self.inquiries, id, f)
    }

    pub(crate) fn remove_inquiry(&self, id: u64) -> Result<bool> {
        Database::remove(&self.inquiries, id)
    }
}
