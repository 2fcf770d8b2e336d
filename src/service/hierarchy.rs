use crate::{
    db::affiliatedb::AffiliateExt,
    models::{affiliatemodel::Affiliate, referraltree::Hierarchy},
    service::error::ServiceError,
};

/// Two-level hierarchy for a downline attached under `sub1_id`: the Sub1
/// itself and whoever referred it.
pub async fn resolve_hierarchy<T: AffiliateExt>(
    tx: &mut T,
    sub1_id: i32,
) -> Result<Hierarchy, ServiceError> {
    let sub1 = tx
        .get_affiliate(Some(sub1_id), None, None, None)
        .await?
        .ok_or_else(|| {
            ServiceError::Integrity(format!("Sub1 affiliate {} does not exist", sub1_id))
        })?;

    Ok(Hierarchy::of(&sub1))
}

/// Looks up the affiliate behind a public code and requires it to be approved.
pub async fn approved_sub1<T: AffiliateExt>(
    tx: &mut T,
    code: &str,
) -> Result<Affiliate, ServiceError> {
    let code = code.trim().to_uppercase();

    match tx.get_affiliate(None, Some(&code), None, None).await? {
        Some(affiliate) if affiliate.status.is_approved() => Ok(affiliate),
        _ => Err(ServiceError::InvalidReferrer(code)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{memory::MemoryStore, ReferralStore},
        models::affiliatemodel::AffiliateStatus,
        service::fixtures::seed_affiliate,
    };

    #[tokio::test]
    async fn sub2_is_the_referrer_of_sub1() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let root = seed_affiliate(&mut tx, "root@x.com", None, AffiliateStatus::Approved).await;
        let a = seed_affiliate(&mut tx, "a@x.com", Some(root.id), AffiliateStatus::Approved).await;

        let hierarchy = resolve_hierarchy(&mut tx, a.id).await.unwrap();
        assert_eq!(hierarchy.sub1_id, a.id);
        assert_eq!(hierarchy.sub2_id, Some(root.id));

        let hierarchy = resolve_hierarchy(&mut tx, root.id).await.unwrap();
        assert_eq!(hierarchy.sub2_id, None);
    }

    #[tokio::test]
    async fn missing_sub1_is_an_integrity_error() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let err = resolve_hierarchy(&mut tx, 99).await.unwrap_err();
        assert!(matches!(err, ServiceError::Integrity(_)));
    }

    #[tokio::test]
    async fn codes_must_name_an_approved_affiliate() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let approved = seed_affiliate(&mut tx, "ok@x.com", None, AffiliateStatus::Approved).await;
        seed_affiliate(&mut tx, "wait@x.com", None, AffiliateStatus::Pending).await;

        let found = approved_sub1(&mut tx, " vtx00001 ").await.unwrap();
        assert_eq!(found.id, approved.id);

        assert!(matches!(
            approved_sub1(&mut tx, "VTX00002").await,
            Err(ServiceError::InvalidReferrer(_))
        ));
        assert!(matches!(
            approved_sub1(&mut tx, "VTX99999").await,
            Err(ServiceError::InvalidReferrer(_))
        ));
    }
}
