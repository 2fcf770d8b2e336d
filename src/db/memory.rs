//! In-memory backend for local development and tests.
//!
//! Units of work are serialized behind one mutex. Each works on a copy of
//! the state that replaces the shared state on commit, so a dropped unit of
//! work leaves nothing behind. Unique and foreign-key constraints of the
//! PostgreSQL schema are enforced here too.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{affiliatedb::AffiliateExt, downlinedb::DownlineExt, Commit, ReferralStore};
use crate::models::{
    affiliatemodel::{
        Affiliate, AffiliateDetails, AffiliateQuery, AffiliateReportFilter, AffiliateReportRow,
        AffiliateStatus, NewAffiliate,
    },
    downlinemodel::{
        Downline, DownlineQuery, DownlineRow, DownlineStatus, DownlineUpdate, NewDownline,
    },
    referraltree::ReferralForest,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    affiliates: ReferralForest,
    downlines: BTreeMap<i32, Downline>,
    last_affiliate_id: i32,
    last_downline_id: i32,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug)]
pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl ReferralStore for MemoryStore {
    type Tx = MemoryUnitOfWork;

    async fn begin(&self) -> Result<MemoryUnitOfWork, sqlx::Error> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryUnitOfWork { guard, working })
    }
}

#[async_trait]
impl Commit for MemoryUnitOfWork {
    async fn commit(self) -> Result<(), sqlx::Error> {
        let MemoryUnitOfWork { mut guard, working } = self;
        *guard = working;
        Ok(())
    }
}

fn unique_violation(constraint: &str) -> sqlx::Error {
    sqlx::Error::Protocol(format!(
        "duplicate key value violates unique constraint \"{}\"",
        constraint
    ))
}

fn foreign_key_violation(constraint: &str) -> sqlx::Error {
    sqlx::Error::Protocol(format!(
        "violates foreign key constraint \"{}\"",
        constraint
    ))
}

fn paginate<T>(items: Vec<T>, page: u32, limit: usize) -> Vec<T> {
    let offset = (page.max(1) as usize - 1).saturating_mul(limit);
    items.into_iter().skip(offset).take(limit).collect()
}

impl MemoryState {
    fn email_taken_by_other_affiliate(&self, email: &str, except: Option<i32>) -> bool {
        self.affiliates
            .find(|a| a.email == email && Some(a.id) != except)
            .is_some()
    }

    fn code_taken_by_other_affiliate(&self, code: &str, except: i32) -> bool {
        self.affiliates
            .find(|a| a.affiliate_code.as_deref() == Some(code) && a.id != except)
            .is_some()
    }

    fn check_affiliate_ref(&self, id: Option<i32>, constraint: &str) -> Result<(), sqlx::Error> {
        match id {
            Some(id) if !self.affiliates.contains(id) => Err(foreign_key_violation(constraint)),
            _ => Ok(()),
        }
    }

    fn affiliate_mut(&mut self, id: i32) -> Result<&mut Affiliate, sqlx::Error> {
        self.affiliates.get_mut(id).ok_or(sqlx::Error::RowNotFound)
    }

    fn downline_mut(&mut self, id: i32) -> Result<&mut Downline, sqlx::Error> {
        self.downlines.get_mut(&id).ok_or(sqlx::Error::RowNotFound)
    }

    fn join(&self, downline: &Downline) -> DownlineRow {
        let sub1 = self.affiliates.get(downline.sub1_affiliate_id);
        let sub2 = downline
            .sub2_affiliate_id
            .and_then(|id| self.affiliates.get(id));

        DownlineRow {
            id: downline.id,
            full_name: downline.full_name.clone(),
            email: downline.email.clone(),
            status: downline.status,
            sub1_affiliate_id: downline.sub1_affiliate_id,
            sub2_affiliate_id: downline.sub2_affiliate_id,
            created_at: downline.created_at,
            sub1_name: sub1.map(|a| a.full_name.clone()),
            sub1_code: sub1.and_then(|a| a.affiliate_code.clone()),
            sub1_status: sub1.map(|a| a.status),
            sub2_name: sub2.map(|a| a.full_name.clone()),
            sub2_code: sub2.and_then(|a| a.affiliate_code.clone()),
            sub2_status: sub2.map(|a| a.status),
        }
    }
}

fn newest_first_affiliates(mut affiliates: Vec<Affiliate>) -> Vec<Affiliate> {
    affiliates.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    affiliates
}

#[async_trait]
impl AffiliateExt for MemoryUnitOfWork {
    async fn get_affiliate(
        &mut self,
        affiliate_id: Option<i32>,
        code: Option<&str>,
        email: Option<&str>,
        token: Option<&str>,
    ) -> Result<Option<Affiliate>, sqlx::Error> {
        let forest = &self.working.affiliates;

        let affiliate = if let Some(affiliate_id) = affiliate_id {
            forest.get(affiliate_id)
        } else if let Some(code) = code {
            forest.find(|a| a.affiliate_code.as_deref() == Some(code))
        } else if let Some(email) = email {
            forest.find(|a| a.email == email)
        } else if let Some(token) = token {
            forest.find(|a| a.verification_token.as_deref() == Some(token))
        } else {
            None
        };

        Ok(affiliate.cloned())
    }

    async fn get_affiliate_by_mt5_account(
        &mut self,
        account: &str,
    ) -> Result<Option<Affiliate>, sqlx::Error> {
        Ok(self
            .working
            .affiliates
            .find(|a| a.mt5_rebate_account == account)
            .cloned())
    }

    async fn list_affiliates_by_status(
        &mut self,
        statuses: &[AffiliateStatus],
    ) -> Result<Vec<Affiliate>, sqlx::Error> {
        let affiliates = self
            .working
            .affiliates
            .iter()
            .filter(|a| statuses.is_empty() || statuses.contains(&a.status))
            .cloned()
            .collect();

        Ok(newest_first_affiliates(affiliates))
    }

    async fn list_affiliates(
        &mut self,
        query: &AffiliateQuery,
        page: u32,
        limit: usize,
    ) -> Result<(Vec<Affiliate>, i64), sqlx::Error> {
        let matching: Vec<Affiliate> = self
            .working
            .affiliates
            .iter()
            .filter(|a| query.matches(a))
            .cloned()
            .collect();
        let total = matching.len() as i64;

        Ok((paginate(newest_first_affiliates(matching), page, limit), total))
    }

    async fn affiliate_report(
        &mut self,
        filter: &AffiliateReportFilter,
    ) -> Result<Vec<AffiliateReportRow>, sqlx::Error> {
        let state = &self.working;
        let matching = state
            .affiliates
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();

        Ok(newest_first_affiliates(matching)
            .iter()
            .map(|affiliate| {
                let total = state
                    .downlines
                    .values()
                    .filter(|d| {
                        d.sub1_affiliate_id == affiliate.id
                            || d.sub2_affiliate_id == Some(affiliate.id)
                    })
                    .count();
                AffiliateReportRow::new(affiliate, total as i64)
            })
            .collect())
    }

    async fn save_affiliate(
        &mut self,
        affiliate: NewAffiliate,
    ) -> Result<Affiliate, sqlx::Error> {
        let state = &mut self.working;

        if state.email_taken_by_other_affiliate(&affiliate.email, None) {
            return Err(unique_violation("affiliates_email_key"));
        }
        state.check_affiliate_ref(affiliate.referred_by_id, "affiliates_referred_by_id_fkey")?;

        state.last_affiliate_id += 1;
        let now = Utc::now();
        let saved = Affiliate {
            id: state.last_affiliate_id,
            full_name: affiliate.full_name,
            email: affiliate.email,
            mt5_rebate_account: affiliate.mt5_rebate_account,
            contact_details: affiliate.contact_details,
            ib_link: affiliate.ib_link,
            affiliate_code: None,
            status: affiliate.status,
            referred_by_id: affiliate.referred_by_id,
            email_verified: false,
            verification_token: affiliate.verification_token,
            verification_expires_at: affiliate.verification_expires_at,
            spam_score: affiliate.spam_score,
            is_flagged: affiliate.is_flagged,
            flagged_reason: affiliate.flagged_reason,
            created_at: now,
            updated_at: now,
            approved_at: None,
        };

        state.affiliates.insert(saved.clone());
        Ok(saved)
    }

    async fn update_affiliate_details(
        &mut self,
        affiliate_id: i32,
        details: AffiliateDetails,
    ) -> Result<Affiliate, sqlx::Error> {
        let state = &mut self.working;

        if state.email_taken_by_other_affiliate(&details.email, Some(affiliate_id)) {
            return Err(unique_violation("affiliates_email_key"));
        }

        let affiliate = state.affiliate_mut(affiliate_id)?;
        affiliate.full_name = details.full_name;
        affiliate.email = details.email;
        affiliate.mt5_rebate_account = details.mt5_rebate_account;
        affiliate.contact_details = details.contact_details;
        affiliate.ib_link = details.ib_link;
        affiliate.updated_at = Utc::now();

        Ok(affiliate.clone())
    }

    async fn update_affiliate_status(
        &mut self,
        affiliate_id: i32,
        status: AffiliateStatus,
    ) -> Result<Affiliate, sqlx::Error> {
        let affiliate = self.working.affiliate_mut(affiliate_id)?;
        let now = Utc::now();

        affiliate.status = status;
        if status == AffiliateStatus::Approved && affiliate.approved_at.is_none() {
            affiliate.approved_at = Some(now);
        }
        affiliate.updated_at = now;

        Ok(affiliate.clone())
    }

    async fn update_affiliate_code(
        &mut self,
        affiliate_id: i32,
        code: String,
    ) -> Result<Affiliate, sqlx::Error> {
        if self.working.code_taken_by_other_affiliate(&code, affiliate_id) {
            return Err(unique_violation("affiliates_affiliate_code_key"));
        }

        let affiliate = self.working.affiliate_mut(affiliate_id)?;
        affiliate.affiliate_code = Some(code);
        affiliate.updated_at = Utc::now();

        Ok(affiliate.clone())
    }

    async fn mark_email_verified(
        &mut self,
        affiliate_id: i32,
    ) -> Result<Affiliate, sqlx::Error> {
        let affiliate = self.working.affiliate_mut(affiliate_id)?;

        affiliate.email_verified = true;
        affiliate.verification_expires_at = None;
        affiliate.updated_at = Utc::now();

        Ok(affiliate.clone())
    }

    async fn repoint_referrals(
        &mut self,
        from_id: i32,
        to_id: Option<i32>,
    ) -> Result<u64, sqlx::Error> {
        self.working
            .check_affiliate_ref(to_id, "affiliates_referred_by_id_fkey")?;

        Ok(self.working.affiliates.repoint_referrals(from_id, to_id))
    }

    async fn delete_affiliate(
        &mut self,
        affiliate_id: i32,
    ) -> Result<u64, sqlx::Error> {
        let state = &mut self.working;

        if !state.affiliates.referrals_of(affiliate_id).is_empty() {
            return Err(foreign_key_violation("affiliates_referred_by_id_fkey"));
        }
        if state.downlines.values().any(|d| d.sub1_affiliate_id == affiliate_id) {
            return Err(foreign_key_violation("downlines_sub1_affiliate_id_fkey"));
        }
        if state
            .downlines
            .values()
            .any(|d| d.sub2_affiliate_id == Some(affiliate_id))
        {
            return Err(foreign_key_violation("downlines_sub2_affiliate_id_fkey"));
        }

        Ok(state.affiliates.remove(affiliate_id).map_or(0, |_| 1))
    }
}

#[async_trait]
impl DownlineExt for MemoryUnitOfWork {
    async fn get_downline(
        &mut self,
        downline_id: Option<i32>,
        email: Option<&str>,
    ) -> Result<Option<Downline>, sqlx::Error> {
        let downlines = &self.working.downlines;

        let downline = if let Some(downline_id) = downline_id {
            downlines.get(&downline_id)
        } else if let Some(email) = email {
            downlines.values().find(|d| d.email == email)
        } else {
            None
        };

        Ok(downline.cloned())
    }

    async fn get_downlines_by_sub1(
        &mut self,
        affiliate_id: i32,
    ) -> Result<Vec<Downline>, sqlx::Error> {
        Ok(self
            .working
            .downlines
            .values()
            .filter(|d| d.sub1_affiliate_id == affiliate_id)
            .cloned()
            .collect())
    }

    async fn get_downlines_by_sub2(
        &mut self,
        affiliate_id: i32,
    ) -> Result<Vec<Downline>, sqlx::Error> {
        Ok(self
            .working
            .downlines
            .values()
            .filter(|d| d.sub2_affiliate_id == Some(affiliate_id))
            .cloned()
            .collect())
    }

    async fn save_downline(
        &mut self,
        downline: NewDownline,
    ) -> Result<Downline, sqlx::Error> {
        let state = &mut self.working;

        state.check_affiliate_ref(
            Some(downline.sub1_affiliate_id),
            "downlines_sub1_affiliate_id_fkey",
        )?;
        state.check_affiliate_ref(downline.sub2_affiliate_id, "downlines_sub2_affiliate_id_fkey")?;

        state.last_downline_id += 1;
        let now = Utc::now();
        let saved = Downline {
            id: state.last_downline_id,
            full_name: downline.full_name,
            email: downline.email,
            status: downline.status,
            sub1_affiliate_id: downline.sub1_affiliate_id,
            sub2_affiliate_id: downline.sub2_affiliate_id,
            created_at: now,
            updated_at: now,
        };

        state.downlines.insert(saved.id, saved.clone());
        Ok(saved)
    }

    async fn update_downline(
        &mut self,
        downline_id: i32,
        update: DownlineUpdate,
    ) -> Result<Downline, sqlx::Error> {
        let downline = self.working.downline_mut(downline_id)?;

        downline.full_name = update.full_name;
        downline.email = update.email;
        downline.status = update.status;
        downline.updated_at = Utc::now();

        Ok(downline.clone())
    }

    async fn update_downline_links(
        &mut self,
        downline_id: i32,
        sub1_affiliate_id: i32,
        sub2_affiliate_id: Option<i32>,
    ) -> Result<Downline, sqlx::Error> {
        let state = &mut self.working;

        state.check_affiliate_ref(Some(sub1_affiliate_id), "downlines_sub1_affiliate_id_fkey")?;
        state.check_affiliate_ref(sub2_affiliate_id, "downlines_sub2_affiliate_id_fkey")?;

        let downline = state.downline_mut(downline_id)?;
        downline.sub1_affiliate_id = sub1_affiliate_id;
        downline.sub2_affiliate_id = sub2_affiliate_id;
        downline.updated_at = Utc::now();

        Ok(downline.clone())
    }

    async fn update_downline_status(
        &mut self,
        downline_id: i32,
        status: DownlineStatus,
    ) -> Result<Downline, sqlx::Error> {
        let downline = self.working.downline_mut(downline_id)?;

        downline.status = status;
        downline.updated_at = Utc::now();

        Ok(downline.clone())
    }

    async fn delete_downline(
        &mut self,
        downline_id: i32,
    ) -> Result<u64, sqlx::Error> {
        Ok(self.working.downlines.remove(&downline_id).map_or(0, |_| 1))
    }

    async fn list_downlines(
        &mut self,
        query: &DownlineQuery,
        page: u32,
        limit: usize,
    ) -> Result<(Vec<DownlineRow>, i64), sqlx::Error> {
        let state = &self.working;
        let mut rows: Vec<DownlineRow> = state
            .downlines
            .values()
            .map(|d| state.join(d))
            .filter(|row| query.matches(row))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = rows.len() as i64;

        Ok((paginate(rows, page, limit), total))
    }

    async fn list_all_downlines_joined(&mut self) -> Result<Vec<DownlineRow>, sqlx::Error> {
        let state = &self.working;
        Ok(state.downlines.values().map(|d| state.join(d)).collect())
    }

    async fn downline_report(
        &mut self,
        affiliate_id: Option<i32>,
    ) -> Result<Vec<DownlineRow>, sqlx::Error> {
        let state = &self.working;
        let mut rows: Vec<DownlineRow> = state
            .downlines
            .values()
            .filter(|d| {
                affiliate_id.map_or(true, |id| {
                    d.sub1_affiliate_id == id || d.sub2_affiliate_id == Some(id)
                })
            })
            .map(|d| state.join(d))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_affiliate(email: &str, referred_by_id: Option<i32>) -> NewAffiliate {
        NewAffiliate {
            full_name: "Test Affiliate".to_string(),
            email: email.to_string(),
            mt5_rebate_account: "12345678".to_string(),
            contact_details: None,
            ib_link: None,
            referred_by_id,
            status: AffiliateStatus::Approved,
            verification_token: None,
            verification_expires_at: None,
            spam_score: 0,
            is_flagged: false,
            flagged_reason: None,
        }
    }

    #[tokio::test]
    async fn dropped_unit_of_work_rolls_back() {
        let store = MemoryStore::new();

        {
            let mut tx = store.begin().await.unwrap();
            tx.save_affiliate(new_affiliate("a@example.com", None)).await.unwrap();
        }

        let mut tx = store.begin().await.unwrap();
        let all = tx.list_affiliates_by_status(&[]).await.unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn committed_unit_of_work_is_visible() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        let saved = tx.save_affiliate(new_affiliate("a@example.com", None)).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let found = tx.get_affiliate(None, None, Some("a@example.com"), None).await.unwrap();
        assert_eq!(found, Some(saved));
    }

    #[tokio::test]
    async fn enforces_email_uniqueness_and_foreign_keys() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let root = tx.save_affiliate(new_affiliate("root@example.com", None)).await.unwrap();
        assert!(tx.save_affiliate(new_affiliate("root@example.com", None)).await.is_err());
        assert!(tx.save_affiliate(new_affiliate("x@example.com", Some(42))).await.is_err());

        tx.save_downline(NewDownline {
            full_name: "Jane".to_string(),
            email: "jane@example.com".to_string(),
            status: DownlineStatus::UserOnly,
            sub1_affiliate_id: root.id,
            sub2_affiliate_id: None,
        })
        .await
        .unwrap();

        assert!(tx.delete_affiliate(root.id).await.is_err());
    }

    #[tokio::test]
    async fn joined_rows_carry_affiliate_details() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let root = tx.save_affiliate(new_affiliate("root@example.com", None)).await.unwrap();
        tx.update_affiliate_code(root.id, Affiliate::code_for(root.id)).await.unwrap();
        let child = tx.save_affiliate(new_affiliate("child@example.com", Some(root.id))).await.unwrap();

        tx.save_downline(NewDownline {
            full_name: "Jane".to_string(),
            email: "jane@example.com".to_string(),
            status: DownlineStatus::UserOnly,
            sub1_affiliate_id: child.id,
            sub2_affiliate_id: Some(root.id),
        })
        .await
        .unwrap();

        let rows = tx.list_all_downlines_joined().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sub1_status, Some(AffiliateStatus::Approved));
        assert_eq!(rows[0].sub2_code.as_deref(), Some("VTX00001"));
        assert_eq!(rows[0].sub1_code, None);
    }

    #[tokio::test]
    async fn report_counts_downlines_at_both_levels() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let root = tx.save_affiliate(new_affiliate("root@example.com", None)).await.unwrap();
        let child = tx.save_affiliate(new_affiliate("child@example.com", Some(root.id))).await.unwrap();

        for (email, sub1, sub2) in [
            ("jane@example.com", child.id, Some(root.id)),
            ("joe@example.com", root.id, None),
        ] {
            tx.save_downline(NewDownline {
                full_name: "Downline".to_string(),
                email: email.to_string(),
                status: DownlineStatus::UserOnly,
                sub1_affiliate_id: sub1,
                sub2_affiliate_id: sub2,
            })
            .await
            .unwrap();
        }

        let report = tx.affiliate_report(&AffiliateReportFilter::default()).await.unwrap();
        let total_for = |id: i32| report.iter().find(|r| r.id == id).unwrap().total_downlines;
        assert_eq!(total_for(root.id), 2);
        assert_eq!(total_for(child.id), 1);

        assert_eq!(tx.downline_report(Some(child.id)).await.unwrap().len(), 1);
        assert_eq!(tx.downline_report(Some(root.id)).await.unwrap().len(), 2);
        assert_eq!(tx.downline_report(None).await.unwrap().len(), 2);
    }
}
