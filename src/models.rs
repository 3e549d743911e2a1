use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Registered account. Created at registration and never mutated afterwards.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public view of a [`User`]; the password hash never leaves the store.
#[derive(Serialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// JWT payload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: String,
    pub email: String,
    pub creator_id: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Verified caller identity for a single request.
///
/// Built by the auth middleware from [`Claims`] and attached to the request's
/// extensions; handlers only read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
    pub creator_id: String,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.user_id,
            email: claims.email,
            creator_id: claims.creator_id,
        }
    }
}

/// Deal lifecycle stage. Any stage may move to any other; only the
/// vocabulary is closed.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SponsorshipStatus {
    #[default]
    PitchReceived,
    UnderReview,
    Negotiating,
    Approved,
    Contracted,
    ContentCreation,
    AwaitingReview,
    Published,
    Completed,
}

impl SponsorshipStatus {
    pub const ALL: [SponsorshipStatus; 9] = [
        SponsorshipStatus::PitchReceived,
        SponsorshipStatus::UnderReview,
        SponsorshipStatus::Negotiating,
        SponsorshipStatus::Approved,
        SponsorshipStatus::Contracted,
        SponsorshipStatus::ContentCreation,
        SponsorshipStatus::AwaitingReview,
        SponsorshipStatus::Published,
        SponsorshipStatus::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SponsorshipStatus::PitchReceived => "pitch-received",
            SponsorshipStatus::UnderReview => "under-review",
            SponsorshipStatus::Negotiating => "negotiating",
            SponsorshipStatus::Approved => "approved",
            SponsorshipStatus::Contracted => "contracted",
            SponsorshipStatus::ContentCreation => "content-creation",
            SponsorshipStatus::AwaitingReview => "awaiting-review",
            SponsorshipStatus::Published => "published",
            SponsorshipStatus::Completed => "completed",
        }
    }

    /// Parse the wire form (`"pitch-received"`, ...). Returns `None` outside the vocabulary.
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == raw)
    }
}

impl std::fmt::Display for SponsorshipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// A brand deal owned by one creator.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Sponsorship {
    pub id: String,
    pub creator_id: String,
    pub brand_name: String,
    pub product_service: String,
    pub deal_amount: f64,
    pub priority: Option<Priority>,
    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub description: String,
    pub deliverables: Vec<String>,
    pub target_audience: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: SponsorshipStatus,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Sponsorship {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Request body for both create and update.
///
/// Every field defaults to its empty value. On update an empty string, zero
/// amount, empty list or absent enum/date means "leave unchanged", so a field
/// cannot be cleared through this type. `id` and `creatorId` are not accepted
/// from clients.
#[derive(Deserialize, Serialize, Debug, Clone, Default, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SponsorshipInput {
    pub brand_name: String,
    pub product_service: String,
    pub deal_amount: f64,
    pub priority: Option<Priority>,
    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub description: String,
    pub deliverables: Vec<String>,
    pub target_audience: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// Ignored on create; new deals always start at `pitch-received`.
    pub status: Option<SponsorshipStatus>,
    /// Recorded on the history entry when `status` changes. Not stored on the deal.
    pub status_reason: String,
    pub notes: String,
}

/// One recorded status transition.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub id: String,
    pub sponsorship_id: String,
    pub old_status: SponsorshipStatus,
    pub new_status: SponsorshipStatus,
    pub changed_at: DateTime<Utc>,
    pub changed_by: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub active_deals: u64,
    pub pending_approval: u64,
    pub completed_deals: u64,
    pub pipeline_value: f64,
    pub average_deal_amount: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names_match_vocabulary() {
        for status in SponsorshipStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(SponsorshipStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SponsorshipStatus::parse("lost"), None);
    }

    #[test]
    fn test_input_rejects_unknown_status() {
        let err = serde_json::from_str::<SponsorshipInput>(r#"{"status": "archived"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_input_defaults_missing_fields() {
        let input: SponsorshipInput =
            serde_json::from_str(r#"{"brandName": "Acme", "dealAmount": 500}"#).unwrap();
        assert_eq!(input.brand_name, "Acme");
        assert_eq!(input.deal_amount, 500.0);
        assert!(input.deliverables.is_empty());
        assert!(input.status.is_none());
        assert!(input.priority.is_none());
    }
}
