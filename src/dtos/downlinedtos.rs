use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    models::downlinemodel::{Downline, DownlineQuery, DownlineRow, DownlineStatus},
    service::Page,
};

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct AddDownlineDto {
    #[validate(length(min = 1, message = "Full name is required"))]
    pub full_name: String,

    #[validate(
        length(min = 1, message = "Email is required"),
        email(message = "Email is invalid")
    )]
    pub email: String,

    #[validate(length(min = 1, message = "Sub1 affiliate code is required"))]
    pub sub1_affiliate_code: String,
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct AddOwnDownlineDto {
    #[validate(length(min = 1, message = "Affiliate code is required"))]
    pub affiliate_code: String,

    #[validate(length(min = 1, message = "Full name is required"))]
    pub full_name: String,

    #[validate(
        length(min = 1, message = "Email is required"),
        email(message = "Email is invalid")
    )]
    pub email: String,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct UpdateDownlineDto {
    #[validate(length(min = 1, message = "Full name is required"))]
    pub full_name: String,

    #[validate(
        length(min = 1, message = "Email is required"),
        email(message = "Email is invalid")
    )]
    pub email: String,

    pub status: DownlineStatus,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct DownlineQueryDto {
    pub status: Option<String>,
    pub search: Option<String>,
    pub sub1_code: Option<String>,
    #[validate(range(min = 1))]
    pub page: Option<u32>,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<usize>,
}

impl DownlineQueryDto {
    pub fn to_query(&self) -> Result<DownlineQuery, String> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) if s.eq_ignore_ascii_case("all") => None,
            Some(s) => Some(s.parse::<DownlineStatus>()?),
        };

        Ok(DownlineQuery {
            status,
            search: self.search.clone(),
            sub1_code: self
                .sub1_code
                .as_deref()
                .map(|c| c.trim().to_uppercase())
                .filter(|c| !c.is_empty()),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DownlineData {
    pub downline: Downline,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DownlineResponseDto {
    pub status: String,
    pub message: String,
    pub data: DownlineData,
}

impl DownlineResponseDto {
    pub fn new(message: impl Into<String>, downline: Downline) -> Self {
        DownlineResponseDto {
            status: "success".to_string(),
            message: message.into(),
            data: DownlineData { downline },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DownlineListResponseDto {
    pub status: String,
    pub downlines: Vec<DownlineRow>,
    pub results: i64,
    pub page: u32,
    #[serde(rename = "totalPages")]
    pub total_pages: i64,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}

impl DownlineListResponseDto {
    pub fn from_page(page: Page<DownlineRow>) -> Self {
        DownlineListResponseDto {
            status: "success".to_string(),
            downlines: page.items,
            results: page.total,
            page: page.page,
            total_pages: page.total_pages,
            has_more: page.has_more,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AffiliateDownlinesResponseDto {
    pub status: String,
    pub affiliate_code: String,
    pub downlines: Vec<Downline>,
    pub results: usize,
}
