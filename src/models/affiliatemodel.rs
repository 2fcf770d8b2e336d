use chrono::prelude::*;
use serde::{Deserialize, Serialize};

/// Prefix of every public affiliate code, e.g. `VTX00042`.
pub const AFFILIATE_CODE_PREFIX: &str = "VTX";

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "affiliate_status", rename_all = "snake_case")]
pub enum AffiliateStatus {
    Unverified,
    Pending,
    Approved,
    Rejected,
    Suspended,
    Banned,
    Flagged,
}

impl AffiliateStatus {
    /// Statuses under which an affiliate may still act as a downline's Sub1.
    pub const ALIVE: [AffiliateStatus; 3] = [
        AffiliateStatus::Approved,
        AffiliateStatus::Pending,
        AffiliateStatus::Suspended,
    ];

    pub fn to_str(&self) -> &str {
        match self {
            AffiliateStatus::Unverified => "Unverified",
            AffiliateStatus::Pending => "Pending",
            AffiliateStatus::Approved => "Approved",
            AffiliateStatus::Rejected => "Rejected",
            AffiliateStatus::Suspended => "Suspended",
            AffiliateStatus::Banned => "Banned",
            AffiliateStatus::Flagged => "Flagged",
        }
    }

    pub fn is_alive(&self) -> bool {
        Self::ALIVE.contains(self)
    }

    pub fn is_approved(&self) -> bool {
        *self == AffiliateStatus::Approved
    }
}

impl std::fmt::Display for AffiliateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

impl std::str::FromStr for AffiliateStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        [
            AffiliateStatus::Unverified,
            AffiliateStatus::Pending,
            AffiliateStatus::Approved,
            AffiliateStatus::Rejected,
            AffiliateStatus::Suspended,
            AffiliateStatus::Banned,
            AffiliateStatus::Flagged,
        ]
        .into_iter()
        .find(|status| status.to_str().eq_ignore_ascii_case(value.trim()))
        .ok_or_else(|| format!("Unknown affiliate status: {}", value))
    }
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Affiliate {
    pub id: i32,
    pub full_name: String,
    pub email: String,
    pub mt5_rebate_account: String,
    pub contact_details: Option<String>,
    pub ib_link: Option<String>,
    pub affiliate_code: Option<String>,
    pub status: AffiliateStatus,
    pub referred_by_id: Option<i32>,

    pub email_verified: bool,
    #[serde(skip_serializing)]
    pub verification_token: Option<String>,
    #[serde(skip_serializing)]
    pub verification_expires_at: Option<DateTime<Utc>>,

    pub spam_score: i32,
    pub is_flagged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flagged_reason: Option<String>,

    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "approvedAt")]
    pub approved_at: Option<DateTime<Utc>>,
}

impl Affiliate {
    /// Code assigned to the affiliate once its id exists.
    pub fn code_for(id: i32) -> String {
        format!("{}{:05}", AFFILIATE_CODE_PREFIX, id)
    }

    pub fn display_code(&self) -> String {
        self.affiliate_code
            .clone()
            .unwrap_or_else(|| Affiliate::code_for(self.id))
    }
}

/// Columns written when an affiliate registers.
#[derive(Debug, Clone)]
pub struct NewAffiliate {
    pub full_name: String,
    pub email: String,
    pub mt5_rebate_account: String,
    pub contact_details: Option<String>,
    pub ib_link: Option<String>,
    pub referred_by_id: Option<i32>,
    pub status: AffiliateStatus,
    pub verification_token: Option<String>,
    pub verification_expires_at: Option<DateTime<Utc>>,
    pub spam_score: i32,
    pub is_flagged: bool,
    pub flagged_reason: Option<String>,
}

/// Admin-editable profile fields.
#[derive(Debug, Clone)]
pub struct AffiliateDetails {
    pub full_name: String,
    pub email: String,
    pub mt5_rebate_account: String,
    pub contact_details: Option<String>,
    pub ib_link: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AffiliateQuery {
    pub status: Option<AffiliateStatus>,
    pub search: Option<String>,
}

impl AffiliateQuery {
    pub fn matches(&self, affiliate: &Affiliate) -> bool {
        if let Some(status) = self.status {
            if affiliate.status != status {
                return false;
            }
        }

        match self.search.as_deref().map(str::to_lowercase) {
            Some(needle) if !needle.is_empty() => {
                affiliate.full_name.to_lowercase().contains(&needle)
                    || affiliate.email.to_lowercase().contains(&needle)
                    || affiliate
                        .affiliate_code
                        .as_deref()
                        .map(|c| c.to_lowercase().contains(&needle))
                        .unwrap_or(false)
                    || affiliate.mt5_rebate_account.to_lowercase().contains(&needle)
            }
            _ => true,
        }
    }
}

/// Filters of the affiliate report. Both creation bounds are inclusive.
#[derive(Debug, Clone, Default)]
pub struct AffiliateReportFilter {
    pub created_from: Option<DateTime<Utc>>,
    pub created_until: Option<DateTime<Utc>>,
    pub status: Option<AffiliateStatus>,
    /// Calendar month (1-12) of registration, in any year.
    pub registration_month: Option<u32>,
}

impl AffiliateReportFilter {
    pub fn matches(&self, affiliate: &Affiliate) -> bool {
        self.created_from.map_or(true, |from| affiliate.created_at >= from)
            && self.created_until.map_or(true, |until| affiliate.created_at <= until)
            && self.status.map_or(true, |status| affiliate.status == status)
            && self
                .registration_month
                .map_or(true, |month| affiliate.created_at.month() == month)
    }
}

/// One affiliate with the number of downlines it sits above, at either level.
#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone, PartialEq)]
pub struct AffiliateReportRow {
    pub id: i32,
    pub full_name: String,
    pub email: String,
    pub mt5_rebate_account: String,
    pub affiliate_code: Option<String>,
    pub status: AffiliateStatus,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "approvedAt")]
    pub approved_at: Option<DateTime<Utc>>,
    pub total_downlines: i64,
}

impl AffiliateReportRow {
    pub fn new(affiliate: &Affiliate, total_downlines: i64) -> Self {
        AffiliateReportRow {
            id: affiliate.id,
            full_name: affiliate.full_name.clone(),
            email: affiliate.email.clone(),
            mt5_rebate_account: affiliate.mt5_rebate_account.clone(),
            affiliate_code: affiliate.affiliate_code.clone(),
            status: affiliate.status,
            created_at: affiliate.created_at,
            approved_at: affiliate.approved_at,
            total_downlines,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_zero_padded_to_five_digits() {
        assert_eq!(Affiliate::code_for(1), "VTX00001");
        assert_eq!(Affiliate::code_for(4821), "VTX04821");
        assert_eq!(Affiliate::code_for(123456), "VTX123456");
    }

    #[test]
    fn parses_status_names_case_insensitively() {
        assert_eq!("approved".parse::<AffiliateStatus>(), Ok(AffiliateStatus::Approved));
        assert!("gone".parse::<AffiliateStatus>().is_err());
    }

    #[test]
    fn alive_set_is_approved_pending_suspended() {
        assert!(AffiliateStatus::Approved.is_alive());
        assert!(AffiliateStatus::Pending.is_alive());
        assert!(AffiliateStatus::Suspended.is_alive());
        assert!(!AffiliateStatus::Rejected.is_alive());
        assert!(!AffiliateStatus::Banned.is_alive());
        assert!(!AffiliateStatus::Flagged.is_alive());
        assert!(!AffiliateStatus::Unverified.is_alive());
    }

    #[test]
    fn report_filter_bounds_are_inclusive() {
        let created = Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).unwrap();
        let affiliate = Affiliate {
            id: 1,
            full_name: "Root".to_string(),
            email: "root@x.com".to_string(),
            mt5_rebate_account: "5001".to_string(),
            contact_details: None,
            ib_link: None,
            affiliate_code: Some("VTX00001".to_string()),
            status: AffiliateStatus::Approved,
            referred_by_id: None,
            email_verified: true,
            verification_token: None,
            verification_expires_at: None,
            spam_score: 0,
            is_flagged: false,
            flagged_reason: None,
            created_at: created,
            updated_at: created,
            approved_at: None,
        };

        let exact = AffiliateReportFilter {
            created_from: Some(created),
            created_until: Some(created),
            registration_month: Some(3),
            ..Default::default()
        };
        assert!(exact.matches(&affiliate));

        let april = AffiliateReportFilter {
            registration_month: Some(4),
            ..Default::default()
        };
        assert!(!april.matches(&affiliate));

        let pending = AffiliateReportFilter {
            status: Some(AffiliateStatus::Pending),
            ..Default::default()
        };
        assert!(!pending.matches(&affiliate));
    }
}
