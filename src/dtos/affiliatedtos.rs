use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    models::affiliatemodel::{Affiliate, AffiliateQuery, AffiliateStatus},
    service::{
        affiliate_service::{AffiliateApplication, AffiliateEdit},
        compression::CompressionOutcome,
        tree_audit::TreeAuditReport,
        Page,
    },
};

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct RegisterAffiliateDto {
    #[validate(length(min = 1, message = "Full name is required"))]
    pub full_name: String,

    #[validate(
        length(min = 1, message = "Email is required"),
        email(message = "Email is invalid")
    )]
    pub email: String,

    #[validate(length(min = 1, message = "MT5 rebate account is required"))]
    pub mt5_rebate_account: String,

    pub contact_details: Option<String>,
    pub ib_link: Option<String>,
    pub referrer_code: Option<String>,
}

impl From<RegisterAffiliateDto> for AffiliateApplication {
    fn from(dto: RegisterAffiliateDto) -> Self {
        AffiliateApplication {
            full_name: dto.full_name,
            email: dto.email,
            mt5_rebate_account: dto.mt5_rebate_account,
            contact_details: dto.contact_details,
            ib_link: dto.ib_link,
            referrer_code: dto.referrer_code,
        }
    }
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAffiliateDto {
    #[validate(length(min = 1, message = "Full name is required"))]
    pub full_name: String,

    #[validate(
        length(min = 1, message = "Email is required"),
        email(message = "Email is invalid")
    )]
    pub email: String,

    #[validate(length(min = 1, message = "MT5 rebate account is required"))]
    pub mt5_rebate_account: String,

    pub contact_details: Option<String>,
    pub ib_link: Option<String>,
    pub status: AffiliateStatus,
}

impl From<UpdateAffiliateDto> for AffiliateEdit {
    fn from(dto: UpdateAffiliateDto) -> Self {
        AffiliateEdit {
            full_name: dto.full_name,
            email: dto.email,
            mt5_rebate_account: dto.mt5_rebate_account,
            contact_details: dto.contact_details,
            ib_link: dto.ib_link,
            status: dto.status,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailQueryDto {
    pub token: Option<String>,
}

/// `status` defaults to Approved; `all` lifts the filter.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct AffiliateQueryDto {
    pub status: Option<String>,
    pub search: Option<String>,
    #[validate(range(min = 1))]
    pub page: Option<u32>,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<usize>,
}

impl AffiliateQueryDto {
    pub fn to_query(&self) -> Result<AffiliateQuery, String> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => Some(AffiliateStatus::Approved),
            Some(s) if s.eq_ignore_ascii_case("all") => None,
            Some(s) => Some(s.parse::<AffiliateStatus>()?),
        };

        Ok(AffiliateQuery {
            status,
            search: self.search.clone(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FilterAffiliateDto {
    pub id: i32,
    pub full_name: String,
    pub email: String,
    pub mt5_rebate_account: String,
    pub contact_details: Option<String>,
    pub ib_link: Option<String>,
    pub affiliate_code: String,
    pub status: String,
    pub referred_by_id: Option<i32>,
    pub email_verified: bool,
    pub is_flagged: bool,
    pub flagged_reason: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "approvedAt")]
    pub approved_at: Option<DateTime<Utc>>,
}

impl FilterAffiliateDto {
    pub fn filter_affiliate(affiliate: &Affiliate) -> Self {
        FilterAffiliateDto {
            id: affiliate.id,
            full_name: affiliate.full_name.to_owned(),
            email: affiliate.email.to_owned(),
            mt5_rebate_account: affiliate.mt5_rebate_account.to_owned(),
            contact_details: affiliate.contact_details.clone(),
            ib_link: affiliate.ib_link.clone(),
            affiliate_code: affiliate.display_code(),
            status: affiliate.status.to_str().to_string(),
            referred_by_id: affiliate.referred_by_id,
            email_verified: affiliate.email_verified,
            is_flagged: affiliate.is_flagged,
            flagged_reason: affiliate.flagged_reason.clone(),
            created_at: affiliate.created_at,
            approved_at: affiliate.approved_at,
        }
    }

    pub fn filter_affiliates(affiliates: &[Affiliate]) -> Vec<FilterAffiliateDto> {
        affiliates.iter().map(FilterAffiliateDto::filter_affiliate).collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AffiliateData {
    pub affiliate: FilterAffiliateDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AffiliateResponseDto {
    pub status: String,
    pub message: String,
    pub data: AffiliateData,
}

impl AffiliateResponseDto {
    pub fn new(message: impl Into<String>, affiliate: &Affiliate) -> Self {
        AffiliateResponseDto {
            status: "success".to_string(),
            message: message.into(),
            data: AffiliateData {
                affiliate: FilterAffiliateDto::filter_affiliate(affiliate),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AffiliateListResponseDto {
    pub status: String,
    pub affiliates: Vec<FilterAffiliateDto>,
    pub results: i64,
    pub page: u32,
    #[serde(rename = "totalPages")]
    pub total_pages: i64,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}

impl AffiliateListResponseDto {
    pub fn from_page(page: Page<Affiliate>) -> Self {
        AffiliateListResponseDto {
            status: "success".to_string(),
            affiliates: FilterAffiliateDto::filter_affiliates(&page.items),
            results: page.total,
            page: page.page,
            total_pages: page.total_pages,
            has_more: page.has_more,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegistrationResponseDto {
    pub status: String,
    pub message: String,
    pub flagged: bool,
    pub data: AffiliateData,
}

#[derive(Debug, Serialize)]
pub struct RemovalResponseDto {
    pub status: String,
    pub message: String,
    #[serde(flatten)]
    pub outcome: CompressionOutcome,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponseDto {
    pub status: String,
    #[serde(flatten)]
    pub report: TreeAuditReport,
}
