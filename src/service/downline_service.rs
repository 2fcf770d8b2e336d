use crate::{
    db::{affiliatedb::AffiliateExt, downlinedb::DownlineExt, Commit, ReferralStore},
    models::downlinemodel::{
        Downline, DownlineQuery, DownlineRow, DownlineStatus, DownlineUpdate, NewDownline,
    },
    service::{
        compression::{self, CompressionOutcome},
        directory::{ensure_email_free, normalize_email, require_text},
        error::ServiceError,
        hierarchy::{approved_sub1, resolve_hierarchy},
        tree_audit::{TreeAuditReport, TreeAuditor},
        Page,
    },
};

#[derive(Debug, Clone)]
pub struct DownlineService<S: ReferralStore> {
    store: S,
    auditor: TreeAuditor<S>,
}

impl<S: ReferralStore> DownlineService<S> {
    pub fn new(store: S) -> Self {
        let auditor = TreeAuditor::new(store.clone());
        DownlineService { store, auditor }
    }

    /// Attaches a new downline under the approved affiliate owning
    /// `sub1_code`. Sub2 is resolved from that affiliate's referrer.
    pub async fn add_downline(
        &self,
        full_name: &str,
        email: &str,
        sub1_code: &str,
    ) -> Result<Downline, ServiceError> {
        let full_name = require_text("Full name", full_name)?;
        let email = normalize_email(&require_text("Email", email)?);

        let mut tx = self.store.begin().await?;

        ensure_email_free(&mut tx, &email).await?;
        let sub1 = approved_sub1(&mut tx, sub1_code).await?;
        let hierarchy = resolve_hierarchy(&mut tx, sub1.id).await?;

        let downline = tx
            .save_downline(NewDownline {
                full_name,
                email,
                status: DownlineStatus::UserOnly,
                sub1_affiliate_id: hierarchy.sub1_id,
                sub2_affiliate_id: hierarchy.sub2_id,
            })
            .await?;

        tx.commit().await?;

        tracing::info!(
            "Added downline {} under {} (Sub2: {:?})",
            downline.id,
            sub1.display_code(),
            downline.sub2_affiliate_id
        );

        Ok(downline)
    }

    pub async fn update_downline(
        &self,
        downline_id: i32,
        full_name: &str,
        email: &str,
        status: DownlineStatus,
    ) -> Result<Downline, ServiceError> {
        let full_name = require_text("Full name", full_name)?;
        let email = normalize_email(&require_text("Email", email)?);

        let mut tx = self.store.begin().await?;

        let current = tx
            .get_downline(Some(downline_id), None)
            .await?
            .ok_or(ServiceError::DownlineNotFound(downline_id))?;

        if current.email != email {
            ensure_email_free(&mut tx, &email).await?;
        }

        let updated = tx
            .update_downline(
                downline_id,
                DownlineUpdate {
                    full_name,
                    email,
                    status,
                },
            )
            .await?;

        tx.commit().await?;

        Ok(updated)
    }

    pub async fn list_downlines(
        &self,
        query: &DownlineQuery,
        page: u32,
        limit: usize,
    ) -> Result<Page<DownlineRow>, ServiceError> {
        let mut tx = self.store.begin().await?;
        let (rows, total) = tx.list_downlines(query, page, limit).await?;

        Ok(Page::new(rows, total, page, limit))
    }

    /// Downlines where the affiliate sits at either level, Sub1 first.
    pub async fn affiliate_downlines(&self, code: &str) -> Result<Vec<Downline>, ServiceError> {
        let code = code.trim().to_uppercase();
        let mut tx = self.store.begin().await?;

        let affiliate = tx
            .get_affiliate(None, Some(&code), None, None)
            .await?
            .ok_or_else(|| ServiceError::AffiliateCodeNotFound(code.clone()))?;

        let mut downlines = tx.get_downlines_by_sub1(affiliate.id).await?;
        downlines.extend(tx.get_downlines_by_sub2(affiliate.id).await?);

        Ok(downlines)
    }

    /// Deletes an affiliate, compressing the tree around it in the same unit
    /// of work.
    pub async fn remove_affiliate(
        &self,
        affiliate_id: i32,
    ) -> Result<CompressionOutcome, ServiceError> {
        let mut tx = self.store.begin().await?;
        let outcome = compression::remove_affiliate(&mut tx, affiliate_id).await?;
        tx.commit().await?;

        tracing::info!("Removed affiliate {}", affiliate_id);

        Ok(outcome)
    }

    pub async fn cleanup_tree(&self) -> Result<TreeAuditReport, ServiceError> {
        self.auditor.audit().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::memory::MemoryStore,
        models::affiliatemodel::AffiliateStatus,
        service::{
            error::EmailHolder,
            fixtures::{seed_affiliate, seed_downline},
        },
    };

    async fn seeded() -> (MemoryStore, DownlineService<MemoryStore>) {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let root = seed_affiliate(&mut tx, "root@x.com", None, AffiliateStatus::Approved).await;
        seed_affiliate(&mut tx, "a@x.com", Some(root.id), AffiliateStatus::Approved).await;
        seed_affiliate(&mut tx, "p@x.com", None, AffiliateStatus::Pending).await;
        tx.commit().await.unwrap();

        let service = DownlineService::new(store.clone());
        (store, service)
    }

    #[tokio::test]
    async fn downline_of_a_root_has_no_sub2() {
        let (_, service) = seeded().await;

        let jane = service
            .add_downline("Jane Doe", "Jane@Example.com", "VTX00001")
            .await
            .unwrap();

        assert_eq!(jane.sub1_affiliate_id, 1);
        assert_eq!(jane.sub2_affiliate_id, None);
        assert_eq!(jane.status, DownlineStatus::UserOnly);
        assert_eq!(jane.email, "jane@example.com");
    }

    #[tokio::test]
    async fn downline_of_a_referred_affiliate_gets_sub2() {
        let (_, service) = seeded().await;

        let joe = service.add_downline("Joe", "joe@x.com", "vtx00002").await.unwrap();

        assert_eq!(joe.sub1_affiliate_id, 2);
        assert_eq!(joe.sub2_affiliate_id, Some(1));
    }

    #[tokio::test]
    async fn rejects_unapproved_sub1_and_taken_emails() {
        let (_, service) = seeded().await;

        assert!(matches!(
            service.add_downline("Joe", "joe@x.com", "VTX00003").await,
            Err(ServiceError::InvalidReferrer(_))
        ));

        assert!(matches!(
            service.add_downline("Root", "ROOT@x.com", "VTX00001").await,
            Err(ServiceError::EmailTaken(EmailHolder::Affiliate { .. }))
        ));

        service.add_downline("Joe", "joe@x.com", "VTX00001").await.unwrap();
        assert!(matches!(
            service.add_downline("Joe", "joe@x.com", "VTX00002").await,
            Err(ServiceError::EmailTaken(EmailHolder::Downline { .. }))
        ));
    }

    #[tokio::test]
    async fn affiliate_downlines_cover_both_levels() {
        let (_, service) = seeded().await;

        service.add_downline("Jane", "jane@x.com", "VTX00001").await.unwrap();
        service.add_downline("Joe", "joe@x.com", "VTX00002").await.unwrap();

        let root_side = service.affiliate_downlines("VTX00001").await.unwrap();
        assert_eq!(root_side.len(), 2);

        let a_side = service.affiliate_downlines("VTX00002").await.unwrap();
        assert_eq!(a_side.len(), 1);

        assert!(matches!(
            service.affiliate_downlines("VTX04040").await,
            Err(ServiceError::AffiliateCodeNotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_checks_email_only_when_it_changes() {
        let (_, service) = seeded().await;

        let jane = service.add_downline("Jane", "jane@x.com", "VTX00001").await.unwrap();
        service.add_downline("Joe", "joe@x.com", "VTX00001").await.unwrap();

        let renamed = service
            .update_downline(jane.id, "Jane D.", "jane@x.com", DownlineStatus::Suspended)
            .await
            .unwrap();
        assert_eq!(renamed.full_name, "Jane D.");
        assert_eq!(renamed.status, DownlineStatus::Suspended);

        assert!(matches!(
            service
                .update_downline(jane.id, "Jane", "joe@x.com", DownlineStatus::UserOnly)
                .await,
            Err(ServiceError::EmailTaken(_))
        ));

        assert!(matches!(
            service
                .update_downline(99, "Nobody", "n@x.com", DownlineStatus::UserOnly)
                .await,
            Err(ServiceError::DownlineNotFound(99))
        ));
    }

    #[tokio::test]
    async fn listing_pages_through_rows() {
        let (_, service) = seeded().await;

        for i in 0..3 {
            service
                .add_downline("User", &format!("u{}@x.com", i), "VTX00001")
                .await
                .unwrap();
        }

        let page = service
            .list_downlines(&DownlineQuery::default(), 1, 2)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 3);
        assert!(page.has_more);
    }

    #[tokio::test]
    async fn removing_an_affiliate_commits_compression() {
        let (store, service) = seeded().await;

        let joe = service.add_downline("Joe", "joe@x.com", "VTX00002").await.unwrap();
        let outcome = service.remove_affiliate(2).await.unwrap();
        assert_eq!(outcome.compressed_count, 1);

        let mut tx = store.begin().await.unwrap();
        let joe = tx.get_downline(Some(joe.id), None).await.unwrap().unwrap();
        assert_eq!(joe.sub1_affiliate_id, 1);
        assert_eq!(joe.sub2_affiliate_id, None);
    }

    /// Affiliates 2 and 3 refer each other; 4 hangs off root 1.
    async fn seeded_with_cycle() -> MemoryStore {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let root = seed_affiliate(&mut tx, "root@x.com", None, AffiliateStatus::Approved).await;
        let a = seed_affiliate(&mut tx, "a@x.com", Some(root.id), AffiliateStatus::Approved).await;
        let b = seed_affiliate(&mut tx, "b@x.com", Some(a.id), AffiliateStatus::Approved).await;
        tx.repoint_referrals(root.id, Some(b.id)).await.unwrap();
        let c = seed_affiliate(&mut tx, "c@x.com", Some(root.id), AffiliateStatus::Approved).await;

        seed_downline(&mut tx, "d1@x.com", a.id, Some(b.id), DownlineStatus::UserOnly).await;
        seed_downline(&mut tx, "d2@x.com", b.id, Some(a.id), DownlineStatus::UserOnly).await;
        seed_downline(&mut tx, "d3@x.com", c.id, Some(root.id), DownlineStatus::UserOnly).await;
        seed_downline(&mut tx, "a@x.com", c.id, Some(root.id), DownlineStatus::Approved).await;
        tx.commit().await.unwrap();

        store
    }

    /// Every affiliate's referrer and every downline's links, by id.
    async fn tree_shape(
        store: &MemoryStore,
    ) -> (Vec<(i32, Option<i32>)>, Vec<(i32, i32, Option<i32>)>) {
        let mut tx = store.begin().await.unwrap();

        let mut referrers: Vec<(i32, Option<i32>)> = tx
            .list_affiliates_by_status(&[])
            .await
            .unwrap()
            .into_iter()
            .map(|a| (a.id, a.referred_by_id))
            .collect();
        referrers.sort();

        let links = tx
            .list_all_downlines_joined()
            .await
            .unwrap()
            .into_iter()
            .map(|row| (row.id, row.sub1_affiliate_id, row.sub2_affiliate_id))
            .collect();

        (referrers, links)
    }

    #[tokio::test]
    async fn referral_cycle_aborts_removal_without_changes() {
        let store = seeded_with_cycle().await;
        let service = DownlineService::new(store.clone());
        let before = tree_shape(&store).await;
        assert_eq!(before.0[1], (2, Some(3)));
        assert_eq!(before.0[2], (3, Some(2)));

        for id in [2, 3] {
            let err = service.remove_affiliate(id).await.unwrap_err();
            assert!(
                matches!(err, ServiceError::Integrity(ref reason) if reason.contains("cycle")),
                "unexpected error: {:?}",
                err
            );
        }

        assert_eq!(tree_shape(&store).await, before);
    }

    #[tokio::test]
    async fn failed_removal_discards_earlier_writes_in_its_unit_of_work() {
        let store = seeded_with_cycle().await;
        let before = tree_shape(&store).await;

        {
            let mut tx = store.begin().await.unwrap();

            let outcome = compression::remove_affiliate(&mut tx, 4).await.unwrap();
            assert_eq!(outcome.compressed_count, 2);
            assert!(tx.get_affiliate(Some(4), None, None, None).await.unwrap().is_none());

            assert!(matches!(
                compression::remove_affiliate(&mut tx, 2).await,
                Err(ServiceError::Integrity(_))
            ));
        }

        assert_eq!(tree_shape(&store).await, before);

        let mut tx = store.begin().await.unwrap();
        let c = tx.get_affiliate(Some(4), None, None, None).await.unwrap();
        assert_eq!(c.map(|a| a.email), Some("c@x.com".to_string()));
    }
}
