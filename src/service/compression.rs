//! Removing an affiliate from the middle of the referral tree without
//! stranding anything attached below it.

use serde::Serialize;

use crate::{
    db::{affiliatedb::AffiliateExt, downlinedb::DownlineExt},
    models::referraltree::Hierarchy,
    service::error::ServiceError,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionOutcome {
    /// Downlines moved up to the removed affiliate's referrer.
    pub compressed_count: u64,
    /// Downlines deleted because the removed affiliate had no referrer.
    pub deleted_count: u64,
    pub sub2_cleared: u64,
    pub referrals_repointed: u64,
    pub mirrors_removed: u64,
}

/// Detaches everything that points at `removed_id` so the affiliate row can
/// be deleted. Must run inside the same unit of work as the delete.
pub async fn compress_downlines<T>(
    tx: &mut T,
    removed_id: i32,
) -> Result<CompressionOutcome, ServiceError>
where
    T: AffiliateExt + DownlineExt,
{
    let removed = tx
        .get_affiliate(Some(removed_id), None, None, None)
        .await?
        .ok_or(ServiceError::AffiliateNotFound(removed_id))?;

    let new_sub1 = match removed.referred_by_id {
        Some(referrer_id) => {
            let referrer = tx
                .get_affiliate(Some(referrer_id), None, None, None)
                .await?
                .ok_or_else(|| {
                    ServiceError::Integrity(format!(
                        "Affiliate {} is referred by missing affiliate {}",
                        removed_id, referrer_id
                    ))
                })?;
            Some(Hierarchy::of(&referrer))
        }
        None => None,
    };

    if let Some(hierarchy) = new_sub1 {
        if hierarchy.sub1_id == removed_id || hierarchy.sub2_id == Some(removed_id) {
            return Err(ServiceError::Integrity(format!(
                "Referral cycle through affiliate {}",
                removed_id
            )));
        }
    }

    let mut outcome = CompressionOutcome::default();

    for downline in tx.get_downlines_by_sub1(removed_id).await? {
        match new_sub1 {
            Some(hierarchy) => {
                tx.update_downline_links(downline.id, hierarchy.sub1_id, hierarchy.sub2_id)
                    .await?;
                outcome.compressed_count += 1;
            }
            None => {
                outcome.deleted_count += tx.delete_downline(downline.id).await?;
            }
        }
    }

    for downline in tx.get_downlines_by_sub2(removed_id).await? {
        tx.update_downline_links(downline.id, downline.sub1_affiliate_id, None)
            .await?;
        outcome.sub2_cleared += 1;
    }

    outcome.referrals_repointed = tx
        .repoint_referrals(removed_id, removed.referred_by_id)
        .await?;

    while let Some(mirror) = tx.get_downline(None, Some(&removed.email)).await? {
        outcome.mirrors_removed += tx.delete_downline(mirror.id).await?;
    }

    tracing::info!(
        "Compressed affiliate {}: {} moved up, {} deleted, {} Sub2 cleared, {} referrals repointed",
        removed_id,
        outcome.compressed_count,
        outcome.deleted_count,
        outcome.sub2_cleared,
        outcome.referrals_repointed
    );

    Ok(outcome)
}

/// Compresses the tree around the affiliate, then deletes it.
pub async fn remove_affiliate<T>(
    tx: &mut T,
    affiliate_id: i32,
) -> Result<CompressionOutcome, ServiceError>
where
    T: AffiliateExt + DownlineExt,
{
    let outcome = compress_downlines(tx, affiliate_id).await?;

    if tx.delete_affiliate(affiliate_id).await? == 0 {
        return Err(ServiceError::AffiliateNotFound(affiliate_id));
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{memory::MemoryStore, Commit, ReferralStore},
        models::{affiliatemodel::AffiliateStatus, downlinemodel::DownlineStatus},
        service::fixtures::{seed_affiliate, seed_downline},
    };

    #[tokio::test]
    async fn middle_affiliate_downlines_move_up_one_level() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let root = seed_affiliate(&mut tx, "root@x.com", None, AffiliateStatus::Approved).await;
        let a = seed_affiliate(&mut tx, "a@x.com", Some(root.id), AffiliateStatus::Approved).await;
        let b = seed_affiliate(&mut tx, "b@x.com", Some(a.id), AffiliateStatus::Approved).await;

        let under_a = seed_downline(&mut tx, "d1@x.com", a.id, Some(root.id), DownlineStatus::UserOnly).await;
        let under_b = seed_downline(&mut tx, "d2@x.com", b.id, Some(a.id), DownlineStatus::UserOnly).await;
        seed_downline(&mut tx, "a@x.com", root.id, None, DownlineStatus::Approved).await;

        let outcome = remove_affiliate(&mut tx, a.id).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(outcome.compressed_count, 1);
        assert_eq!(outcome.deleted_count, 0);
        assert_eq!(outcome.sub2_cleared, 1);
        assert_eq!(outcome.referrals_repointed, 1);
        assert_eq!(outcome.mirrors_removed, 1);

        let mut tx = store.begin().await.unwrap();
        let moved = tx.get_downline(Some(under_a.id), None).await.unwrap().unwrap();
        assert_eq!(moved.sub1_affiliate_id, root.id);
        assert_eq!(moved.sub2_affiliate_id, None);

        let kept = tx.get_downline(Some(under_b.id), None).await.unwrap().unwrap();
        assert_eq!(kept.sub1_affiliate_id, b.id);
        assert_eq!(kept.sub2_affiliate_id, None);

        let b = tx.get_affiliate(Some(b.id), None, None, None).await.unwrap().unwrap();
        assert_eq!(b.referred_by_id, Some(root.id));

        assert!(tx.get_affiliate(Some(a.id), None, None, None).await.unwrap().is_none());
        assert!(tx.get_downline(None, Some("a@x.com")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn removing_a_root_deletes_its_downlines() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let root = seed_affiliate(&mut tx, "root@x.com", None, AffiliateStatus::Approved).await;
        let child = seed_affiliate(&mut tx, "c@x.com", Some(root.id), AffiliateStatus::Approved).await;
        seed_downline(&mut tx, "d1@x.com", root.id, None, DownlineStatus::UserOnly).await;
        seed_downline(&mut tx, "d2@x.com", root.id, None, DownlineStatus::Pending).await;

        let outcome = remove_affiliate(&mut tx, root.id).await.unwrap();

        assert_eq!(outcome.deleted_count, 2);
        assert_eq!(outcome.compressed_count, 0);

        let child = tx.get_affiliate(Some(child.id), None, None, None).await.unwrap().unwrap();
        assert_eq!(child.referred_by_id, None);
        assert!(tx.list_all_downlines_joined().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_affiliate_is_not_found() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        assert!(matches!(
            remove_affiliate(&mut tx, 7).await,
            Err(ServiceError::AffiliateNotFound(7))
        ));
    }
}
