//! Admin reporting over affiliates and their downlines.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

use crate::{
    db::{affiliatedb::AffiliateExt, downlinedb::DownlineExt, ReferralStore},
    models::{
        affiliatemodel::{AffiliateReportFilter, AffiliateReportRow},
        downlinemodel::DownlineRow,
    },
    service::error::ServiceError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegistrationPeriod {
    #[serde(rename = "New This Month")]
    NewThisMonth,
    Existing,
}

impl RegistrationPeriod {
    pub fn of(created_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if created_at.year() == now.year() && created_at.month() == now.month() {
            RegistrationPeriod::NewThisMonth
        } else {
            RegistrationPeriod::Existing
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AffiliateReportEntry {
    #[serde(flatten)]
    pub affiliate: AffiliateReportRow,
    pub registration_period: RegistrationPeriod,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AffiliateReportSummary {
    pub total: usize,
    pub new_this_month: usize,
    pub existing: usize,
    pub by_status: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AffiliateReport {
    pub affiliates: Vec<AffiliateReportEntry>,
    pub summary: AffiliateReportSummary,
}

impl AffiliateReport {
    pub fn build(rows: Vec<AffiliateReportRow>, now: DateTime<Utc>) -> Self {
        let mut summary = AffiliateReportSummary {
            total: rows.len(),
            ..Default::default()
        };

        let affiliates = rows
            .into_iter()
            .map(|affiliate| {
                let registration_period = RegistrationPeriod::of(affiliate.created_at, now);
                match registration_period {
                    RegistrationPeriod::NewThisMonth => summary.new_this_month += 1,
                    RegistrationPeriod::Existing => summary.existing += 1,
                }
                *summary
                    .by_status
                    .entry(affiliate.status.to_str().to_string())
                    .or_default() += 1;

                AffiliateReportEntry {
                    affiliate,
                    registration_period,
                }
            })
            .collect();

        AffiliateReport {
            affiliates,
            summary,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportService<S: ReferralStore> {
    store: S,
}

impl<S: ReferralStore> ReportService<S> {
    pub fn new(store: S) -> Self {
        ReportService { store }
    }

    pub async fn affiliate_report(
        &self,
        filter: &AffiliateReportFilter,
    ) -> Result<AffiliateReport, ServiceError> {
        let mut tx = self.store.begin().await?;
        let rows = tx.affiliate_report(filter).await?;

        Ok(AffiliateReport::build(rows, Utc::now()))
    }

    /// Every downline, or only those under `affiliate_id` at either level.
    pub async fn downline_report(
        &self,
        affiliate_id: Option<i32>,
    ) -> Result<Vec<DownlineRow>, ServiceError> {
        let mut tx = self.store.begin().await?;

        if let Some(affiliate_id) = affiliate_id {
            tx.get_affiliate(Some(affiliate_id), None, None, None)
                .await?
                .ok_or(ServiceError::AffiliateNotFound(affiliate_id))?;
        }

        Ok(tx.downline_report(affiliate_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::{
        db::{memory::MemoryStore, Commit},
        models::{affiliatemodel::AffiliateStatus, downlinemodel::DownlineStatus},
        service::fixtures::{seed_affiliate, seed_downline},
    };

    fn row(id: i32, status: AffiliateStatus, created_at: DateTime<Utc>) -> AffiliateReportRow {
        AffiliateReportRow {
            id,
            full_name: format!("Affiliate {}", id),
            email: format!("a{}@x.com", id),
            mt5_rebate_account: format!("500{}", id),
            affiliate_code: None,
            status,
            created_at,
            approved_at: None,
            total_downlines: 0,
        }
    }

    #[test]
    fn summary_splits_by_month_and_status() {
        let now = Utc.with_ymd_and_hms(2025, 6, 20, 9, 0, 0).unwrap();
        let rows = vec![
            row(3, AffiliateStatus::Pending, Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()),
            row(2, AffiliateStatus::Approved, Utc.with_ymd_and_hms(2025, 5, 31, 23, 0, 0).unwrap()),
            // Same month, earlier year.
            row(1, AffiliateStatus::Approved, Utc.with_ymd_and_hms(2024, 6, 20, 9, 0, 0).unwrap()),
        ];

        let report = AffiliateReport::build(rows, now);

        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.new_this_month, 1);
        assert_eq!(report.summary.existing, 2);
        assert_eq!(report.summary.by_status.get("Approved"), Some(&2));
        assert_eq!(report.summary.by_status.get("Pending"), Some(&1));
        assert_eq!(
            report.affiliates[0].registration_period,
            RegistrationPeriod::NewThisMonth
        );

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["summary"]["newThisMonth"], 1);
        assert_eq!(json["affiliates"][0]["registration_period"], "New This Month");
        assert_eq!(json["affiliates"][0]["total_downlines"], 0);
    }

    async fn seeded() -> ReportService<MemoryStore> {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let root = seed_affiliate(&mut tx, "root@x.com", None, AffiliateStatus::Approved).await;
        let a = seed_affiliate(&mut tx, "a@x.com", Some(root.id), AffiliateStatus::Approved).await;
        seed_affiliate(&mut tx, "p@x.com", None, AffiliateStatus::Pending).await;

        seed_downline(&mut tx, "jane@x.com", a.id, Some(root.id), DownlineStatus::UserOnly).await;
        seed_downline(&mut tx, "joe@x.com", a.id, Some(root.id), DownlineStatus::UserOnly).await;
        seed_downline(&mut tx, "amy@x.com", root.id, None, DownlineStatus::Pending).await;
        tx.commit().await.unwrap();

        ReportService::new(store)
    }

    #[tokio::test]
    async fn affiliate_report_counts_both_levels() {
        let service = seeded().await;

        let report = service
            .affiliate_report(&AffiliateReportFilter::default())
            .await
            .unwrap();

        let total_for = |id: i32| {
            report
                .affiliates
                .iter()
                .find(|entry| entry.affiliate.id == id)
                .map(|entry| entry.affiliate.total_downlines)
        };
        assert_eq!(total_for(1), Some(3));
        assert_eq!(total_for(2), Some(2));
        assert_eq!(total_for(3), Some(0));

        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.new_this_month, 3);
        assert_eq!(report.summary.existing, 0);
        assert_eq!(report.summary.by_status.get("Approved"), Some(&2));
        assert_eq!(report.summary.by_status.get("Pending"), Some(&1));
    }

    #[tokio::test]
    async fn affiliate_report_filters_by_status_and_date() {
        let service = seeded().await;

        let pending = service
            .affiliate_report(&AffiliateReportFilter {
                status: Some(AffiliateStatus::Pending),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(pending.summary.total, 1);
        assert_eq!(pending.affiliates[0].affiliate.email, "p@x.com");

        let future = service
            .affiliate_report(&AffiliateReportFilter {
                created_from: Some(Utc::now() + chrono::Duration::days(1)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(future.affiliates.is_empty());
        assert_eq!(future.summary, AffiliateReportSummary::default());
    }

    #[tokio::test]
    async fn downline_report_filters_by_affiliate() {
        let service = seeded().await;

        assert_eq!(service.downline_report(None).await.unwrap().len(), 3);

        let under_a = service.downline_report(Some(2)).await.unwrap();
        assert_eq!(under_a.len(), 2);
        assert!(under_a.iter().all(|row| row.sub1_code.as_deref() == Some("VTX00002")));

        assert_eq!(service.downline_report(Some(1)).await.unwrap().len(), 3);

        assert!(matches!(
            service.downline_report(Some(99)).await,
            Err(ServiceError::AffiliateNotFound(99))
        ));
    }
}
