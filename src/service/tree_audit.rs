//! Repairs drift in the downline table.
//!
//! The audit runs four passes, each in its own unit of work and each
//! planned from a fresh joined scan:
//!
//! 1. orphans: downlines whose Sub1 is gone or no longer alive are deleted;
//! 2. broken Sub2 links: a Sub2 that is gone or not approved is cleared;
//! 3. missing Sub2: filled from siblings under the same Sub1 when they all
//!    agree on one approved Sub2;
//! 4. duplicates: per email only the lowest id survives.
//!
//! Running the audit on a clean tree changes nothing.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;

use crate::{
    db::{downlinedb::DownlineExt, Commit, ReferralStore},
    models::{affiliatemodel::AffiliateStatus, downlinemodel::DownlineRow},
    service::error::ServiceError,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeAuditReport {
    pub orphaned_removed: u64,
    pub broken_links_fixed: u64,
    pub missing_sub2_inferred: u64,
    pub duplicates_removed: u64,
    pub actions: Vec<String>,
    pub message: String,
}

impl TreeAuditReport {
    pub fn total_changes(&self) -> u64 {
        self.orphaned_removed
            + self.broken_links_fixed
            + self.missing_sub2_inferred
            + self.duplicates_removed
    }

    fn finish(mut self) -> Self {
        let steps = [
            (self.orphaned_removed, "Removed", "orphaned downlines"),
            (self.broken_links_fixed, "Fixed", "broken Sub2 links"),
            (self.missing_sub2_inferred, "Inferred", "missing Sub2 links"),
            (self.duplicates_removed, "Removed", "duplicate downlines"),
        ];

        self.actions = steps
            .iter()
            .filter(|(count, _, _)| *count > 0)
            .map(|(count, verb, what)| format!("{} {} {}", verb, count, what))
            .collect();

        self.message = if self.actions.is_empty() {
            "No cleanup needed - referral tree is already clean".to_string()
        } else {
            format!("Cleanup completed: {}", self.actions.join(", "))
        };

        self
    }
}

/// A Sub2 to write onto a downline that has none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferredSub2 {
    pub downline_id: i32,
    pub sub1_affiliate_id: i32,
    pub sub2_affiliate_id: i32,
}

pub fn find_orphans(rows: &[DownlineRow]) -> Vec<i32> {
    rows.iter()
        .filter(|row| !row.sub1_status.map(|s| s.is_alive()).unwrap_or(false))
        .map(|row| row.id)
        .collect()
}

pub fn find_broken_sub2(rows: &[DownlineRow]) -> Vec<(i32, i32)> {
    rows.iter()
        .filter(|row| {
            row.sub2_affiliate_id.is_some() && row.sub2_status != Some(AffiliateStatus::Approved)
        })
        .map(|row| (row.id, row.sub1_affiliate_id))
        .collect()
}

/// Every id but the lowest per email.
pub fn find_duplicates(rows: &[DownlineRow]) -> Vec<i32> {
    let mut by_email: BTreeMap<&str, Vec<i32>> = BTreeMap::new();
    for row in rows {
        by_email.entry(row.email.as_str()).or_default().push(row.id);
    }

    let mut duplicates: Vec<i32> = by_email
        .into_values()
        .flat_map(|mut ids| {
            ids.sort_unstable();
            ids.into_iter().skip(1)
        })
        .collect();
    duplicates.sort_unstable();
    duplicates
}

/// Rows that would be deleted as duplicates neither vote nor get filled in.
pub fn infer_missing_sub2(rows: &[DownlineRow]) -> Vec<InferredSub2> {
    let doomed: HashSet<i32> = find_duplicates(rows).into_iter().collect();
    let survivors: Vec<&DownlineRow> = rows.iter().filter(|r| !doomed.contains(&r.id)).collect();

    let mut by_sub1: BTreeMap<i32, Vec<&DownlineRow>> = BTreeMap::new();
    for &row in &survivors {
        by_sub1.entry(row.sub1_affiliate_id).or_default().push(row);
    }

    let mut inferred = Vec::new();

    for row in survivors.iter().filter(|r| r.sub2_affiliate_id.is_none()) {
        let siblings: Vec<&&DownlineRow> = by_sub1
            .get(&row.sub1_affiliate_id)
            .map(|group| group.iter().filter(|s| s.id != row.id).collect())
            .unwrap_or_default();

        if siblings.is_empty() {
            continue;
        }

        let candidates: BTreeSet<i32> = siblings
            .iter()
            .filter_map(|s| match (s.sub2_affiliate_id, s.sub2_status) {
                (Some(id), Some(AffiliateStatus::Approved)) => Some(id),
                _ => None,
            })
            .collect();

        if candidates.len() != 1 {
            continue;
        }

        if let Some(&sub2) = candidates.iter().next() {
            if sub2 != row.sub1_affiliate_id {
                inferred.push(InferredSub2 {
                    downline_id: row.id,
                    sub1_affiliate_id: row.sub1_affiliate_id,
                    sub2_affiliate_id: sub2,
                });
            }
        }
    }

    inferred
}

#[derive(Debug, Clone)]
pub struct TreeAuditor<S: ReferralStore> {
    store: S,
}

impl<S: ReferralStore> TreeAuditor<S> {
    pub fn new(store: S) -> Self {
        TreeAuditor { store }
    }

    /// Runs every pass in order. A failing pass stops the audit; passes
    /// already committed stay committed.
    pub async fn audit(&self) -> Result<TreeAuditReport, ServiceError> {
        let mut report = TreeAuditReport::default();

        report.orphaned_removed = self.remove_orphans().await.map_err(log_failure("orphans"))?;
        report.broken_links_fixed = self
            .fix_broken_sub2()
            .await
            .map_err(log_failure("broken Sub2 links"))?;
        report.missing_sub2_inferred = self
            .fill_missing_sub2()
            .await
            .map_err(log_failure("missing Sub2 links"))?;
        report.duplicates_removed = self
            .remove_duplicates()
            .await
            .map_err(log_failure("duplicates"))?;

        let report = report.finish();
        tracing::info!(
            "Tree audit finished with {} changes: {}",
            report.total_changes(),
            report.message
        );

        Ok(report)
    }

    async fn remove_orphans(&self) -> Result<u64, ServiceError> {
        let mut tx = self.store.begin().await?;
        let rows = tx.list_all_downlines_joined().await?;

        let mut removed = 0;
        for id in find_orphans(&rows) {
            removed += tx.delete_downline(id).await?;
        }

        tx.commit().await?;
        Ok(removed)
    }

    async fn fix_broken_sub2(&self) -> Result<u64, ServiceError> {
        let mut tx = self.store.begin().await?;
        let rows = tx.list_all_downlines_joined().await?;

        let broken = find_broken_sub2(&rows);
        for (id, sub1) in &broken {
            tx.update_downline_links(*id, *sub1, None).await?;
        }

        tx.commit().await?;
        Ok(broken.len() as u64)
    }

    async fn fill_missing_sub2(&self) -> Result<u64, ServiceError> {
        let mut tx = self.store.begin().await?;
        let rows = tx.list_all_downlines_joined().await?;

        let inferred = infer_missing_sub2(&rows);
        for fill in &inferred {
            tx.update_downline_links(
                fill.downline_id,
                fill.sub1_affiliate_id,
                Some(fill.sub2_affiliate_id),
            )
            .await?;
        }

        tx.commit().await?;
        Ok(inferred.len() as u64)
    }

    async fn remove_duplicates(&self) -> Result<u64, ServiceError> {
        let mut tx = self.store.begin().await?;
        let rows = tx.list_all_downlines_joined().await?;

        let mut removed = 0;
        for id in find_duplicates(&rows) {
            removed += tx.delete_downline(id).await?;
        }

        tx.commit().await?;
        Ok(removed)
    }
}

fn log_failure(pass: &'static str) -> impl Fn(ServiceError) -> ServiceError {
    move |error| {
        tracing::error!("Tree audit pass '{}' failed: {}", pass, error);
        error
    }
}
