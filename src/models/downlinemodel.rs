use chrono::prelude::*;
use serde::{Deserialize, Serialize};

use super::affiliatemodel::AffiliateStatus;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "downline_status", rename_all = "snake_case")]
pub enum DownlineStatus {
    #[serde(rename = "User Only")]
    UserOnly,
    Pending,
    Approved,
    Suspended,
    Banned,
}

impl DownlineStatus {
    pub fn to_str(&self) -> &str {
        match self {
            DownlineStatus::UserOnly => "User Only",
            DownlineStatus::Pending => "Pending",
            DownlineStatus::Approved => "Approved",
            DownlineStatus::Suspended => "Suspended",
            DownlineStatus::Banned => "Banned",
        }
    }

    /// The status a person's downline record shows while their affiliate
    /// record is in `status`. A rejected, unverified or flagged application
    /// leaves the person a plain user.
    pub fn mirroring(status: AffiliateStatus) -> DownlineStatus {
        match status {
            AffiliateStatus::Pending => DownlineStatus::Pending,
            AffiliateStatus::Approved => DownlineStatus::Approved,
            AffiliateStatus::Suspended => DownlineStatus::Suspended,
            AffiliateStatus::Banned => DownlineStatus::Banned,
            AffiliateStatus::Unverified
            | AffiliateStatus::Rejected
            | AffiliateStatus::Flagged => DownlineStatus::UserOnly,
        }
    }
}

impl std::fmt::Display for DownlineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

impl std::str::FromStr for DownlineStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        [
            DownlineStatus::UserOnly,
            DownlineStatus::Pending,
            DownlineStatus::Approved,
            DownlineStatus::Suspended,
            DownlineStatus::Banned,
        ]
        .into_iter()
        .find(|status| {
            status.to_str().eq_ignore_ascii_case(value)
                || (*status == DownlineStatus::UserOnly && value.eq_ignore_ascii_case("user_only"))
        })
        .ok_or_else(|| format!("Unknown downline status: {}", value))
    }
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Downline {
    pub id: i32,
    pub full_name: String,
    pub email: String,
    pub status: DownlineStatus,
    pub sub1_affiliate_id: i32,
    pub sub2_affiliate_id: Option<i32>,

    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDownline {
    pub full_name: String,
    pub email: String,
    pub status: DownlineStatus,
    pub sub1_affiliate_id: i32,
    pub sub2_affiliate_id: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct DownlineUpdate {
    pub full_name: String,
    pub email: String,
    pub status: DownlineStatus,
}

/// A downline joined with its Sub1 and Sub2 affiliates. The affiliate side
/// is `None` when the link is empty or points at a row that no longer exists.
#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone, PartialEq)]
pub struct DownlineRow {
    pub id: i32,
    pub full_name: String,
    pub email: String,
    pub status: DownlineStatus,
    pub sub1_affiliate_id: i32,
    pub sub2_affiliate_id: Option<i32>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    pub sub1_name: Option<String>,
    pub sub1_code: Option<String>,
    pub sub1_status: Option<AffiliateStatus>,
    pub sub2_name: Option<String>,
    pub sub2_code: Option<String>,
    pub sub2_status: Option<AffiliateStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct DownlineQuery {
    pub status: Option<DownlineStatus>,
    pub search: Option<String>,
    pub sub1_code: Option<String>,
}

impl DownlineQuery {
    pub fn matches(&self, row: &DownlineRow) -> bool {
        if let Some(status) = self.status {
            if row.status != status {
                return false;
            }
        }

        if let Some(code) = self.sub1_code.as_deref() {
            if row.sub1_code.as_deref() != Some(code) {
                return false;
            }
        }

        match self.search.as_deref().map(str::to_lowercase) {
            Some(needle) if !needle.is_empty() => {
                let contains = |field: Option<&str>| {
                    field
                        .map(|f| f.to_lowercase().contains(&needle))
                        .unwrap_or(false)
                };

                contains(Some(&row.full_name))
                    || contains(Some(&row.email))
                    || contains(row.sub1_name.as_deref())
                    || contains(row.sub1_code.as_deref())
                    || contains(row.sub2_name.as_deref())
                    || contains(row.sub2_code.as_deref())
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_table_matches_affiliate_lifecycle() {
        assert_eq!(DownlineStatus::mirroring(AffiliateStatus::Pending), DownlineStatus::Pending);
        assert_eq!(DownlineStatus::mirroring(AffiliateStatus::Approved), DownlineStatus::Approved);
        assert_eq!(DownlineStatus::mirroring(AffiliateStatus::Rejected), DownlineStatus::UserOnly);
        assert_eq!(DownlineStatus::mirroring(AffiliateStatus::Suspended), DownlineStatus::Suspended);
        assert_eq!(DownlineStatus::mirroring(AffiliateStatus::Banned), DownlineStatus::Banned);
        assert_eq!(DownlineStatus::mirroring(AffiliateStatus::Unverified), DownlineStatus::UserOnly);
    }

    #[test]
    fn user_only_serializes_with_a_space() {
        let json = serde_json::to_string(&DownlineStatus::UserOnly).unwrap();
        assert_eq!(json, "\"User Only\"");

        let parsed: DownlineStatus = serde_json::from_str("\"User Only\"").unwrap();
        assert_eq!(parsed, DownlineStatus::UserOnly);

        assert_eq!("user only".parse::<DownlineStatus>(), Ok(DownlineStatus::UserOnly));
        assert_eq!("USER_ONLY".parse::<DownlineStatus>(), Ok(DownlineStatus::UserOnly));
    }
}
