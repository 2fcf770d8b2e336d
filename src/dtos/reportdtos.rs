use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    models::{
        affiliatemodel::{AffiliateReportFilter, AffiliateStatus},
        downlinemodel::DownlineRow,
    },
    service::report_service::{AffiliateReport, AffiliateReportEntry, AffiliateReportSummary},
};

/// Dates are `YYYY-MM-DD` or RFC 3339. A bare `endDate` covers its whole day.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AffiliateReportQueryDto {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub status: Option<String>,
    #[validate(range(min = 1, max = 12, message = "Registration month must be 1-12"))]
    pub registration_month: Option<u32>,
}

fn parse_bound(field: &str, value: &str, end_of_day: bool) -> Result<DateTime<Utc>, String> {
    let value = value.trim();

    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Ok(at.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("{} must be YYYY-MM-DD or an RFC 3339 timestamp", field))?;
    let time = if end_of_day {
        NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    }
    .ok_or_else(|| format!("{} is out of range", field))?;

    Ok(Utc.from_utc_datetime(&date.and_time(time)))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl AffiliateReportQueryDto {
    pub fn to_filter(&self) -> Result<AffiliateReportFilter, String> {
        let status = match non_empty(&self.status) {
            None => None,
            Some(s) if s.eq_ignore_ascii_case("all") => None,
            Some(s) => Some(s.parse::<AffiliateStatus>()?),
        };

        Ok(AffiliateReportFilter {
            created_from: non_empty(&self.start_date)
                .map(|v| parse_bound("startDate", v, false))
                .transpose()?,
            created_until: non_empty(&self.end_date)
                .map(|v| parse_bound("endDate", v, true))
                .transpose()?,
            status,
            registration_month: self.registration_month,
        })
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownlineReportQueryDto {
    pub affiliate_id: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct AffiliateReportResponseDto {
    pub status: String,
    pub affiliates: Vec<AffiliateReportEntry>,
    pub summary: AffiliateReportSummary,
}

impl From<AffiliateReport> for AffiliateReportResponseDto {
    fn from(report: AffiliateReport) -> Self {
        AffiliateReportResponseDto {
            status: "success".to_string(),
            affiliates: report.affiliates,
            summary: report.summary,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DownlineReportResponseDto {
    pub status: String,
    pub downlines: Vec<DownlineRow>,
    pub results: usize,
}
