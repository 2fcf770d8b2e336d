use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::affiliatemodel::Affiliate;

/// The two materialized levels above a downline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hierarchy {
    pub sub1_id: i32,
    pub sub2_id: Option<i32>,
}

impl Hierarchy {
    /// Sub1 is the affiliate itself, Sub2 is whoever referred it.
    pub fn of(sub1: &Affiliate) -> Self {
        Hierarchy {
            sub1_id: sub1.id,
            sub2_id: sub1.referred_by_id,
        }
    }
}

/// Affiliates keyed by id, with `referred_by_id` acting as the parent
/// pointer into the same map.
#[derive(Debug, Clone, Default)]
pub struct ReferralForest {
    nodes: BTreeMap<i32, Affiliate>,
}

impl ReferralForest {
    pub fn insert(&mut self, affiliate: Affiliate) -> Option<Affiliate> {
        self.nodes.insert(affiliate.id, affiliate)
    }

    pub fn remove(&mut self, id: i32) -> Option<Affiliate> {
        self.nodes.remove(&id)
    }

    pub fn get(&self, id: i32) -> Option<&Affiliate> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: i32) -> Option<&mut Affiliate> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: i32) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Affiliate> {
        self.nodes.values()
    }

    pub fn find<P>(&self, predicate: P) -> Option<&Affiliate>
    where
        P: Fn(&Affiliate) -> bool,
    {
        self.nodes.values().find(|a| predicate(a))
    }

    /// Ids of the affiliates directly referred by `id`.
    pub fn referrals_of(&self, id: i32) -> Vec<i32> {
        self.nodes
            .values()
            .filter(|a| a.referred_by_id == Some(id))
            .map(|a| a.id)
            .collect()
    }

    /// Moves every affiliate referred by `from` under `to`.
    pub fn repoint_referrals(&mut self, from: i32, to: Option<i32>) -> u64 {
        let mut moved = 0;
        for affiliate in self.nodes.values_mut() {
            if affiliate.referred_by_id == Some(from) {
                affiliate.referred_by_id = to;
                moved += 1;
            }
        }
        moved
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::affiliatemodel::AffiliateStatus;

    fn affiliate(id: i32, referred_by_id: Option<i32>, status: AffiliateStatus) -> Affiliate {
        let now = Utc::now();
        Affiliate {
            id,
            full_name: format!("Affiliate {}", id),
            email: format!("affiliate{}@example.com", id),
            mt5_rebate_account: format!("{:08}", id),
            contact_details: None,
            ib_link: None,
            affiliate_code: Some(Affiliate::code_for(id)),
            status,
            referred_by_id,
            email_verified: true,
            verification_token: None,
            verification_expires_at: None,
            spam_score: 0,
            is_flagged: false,
            flagged_reason: None,
            created_at: now,
            updated_at: now,
            approved_at: None,
        }
    }

    fn chain() -> ReferralForest {
        // 1 <- 2 <- 3, and 4 standing alone
        let mut forest = ReferralForest::default();
        forest.insert(affiliate(1, None, AffiliateStatus::Approved));
        forest.insert(affiliate(2, Some(1), AffiliateStatus::Approved));
        forest.insert(affiliate(3, Some(2), AffiliateStatus::Approved));
        forest.insert(affiliate(4, None, AffiliateStatus::Pending));
        forest
    }

    #[test]
    fn hierarchy_takes_one_hop_up() {
        let forest = chain();
        for affiliate in forest.iter() {
            let hierarchy = Hierarchy::of(affiliate);
            assert_eq!(hierarchy.sub1_id, affiliate.id);
            assert_eq!(hierarchy.sub2_id, affiliate.referred_by_id);
        }
        assert_eq!(
            forest.get(3).map(Hierarchy::of),
            Some(Hierarchy { sub1_id: 3, sub2_id: Some(2) })
        );
        assert_eq!(
            forest.get(1).map(Hierarchy::of),
            Some(Hierarchy { sub1_id: 1, sub2_id: None })
        );
    }

    #[test]
    fn repoint_moves_only_direct_referrals() {
        let mut forest = chain();
        let moved = forest.repoint_referrals(2, Some(1));
        assert_eq!(moved, 1);
        assert_eq!(forest.get(3).and_then(|a| a.referred_by_id), Some(1));
        assert_eq!(forest.referrals_of(1), vec![2, 3]);
        assert!(forest.referrals_of(2).is_empty());
    }

    #[test]
    fn remove_and_find() {
        let mut forest = chain();
        assert!(forest.contains(4));
        assert_eq!(forest.remove(4).map(|a| a.id), Some(4));
        assert!(!forest.contains(4));
        assert_eq!(
            forest.find(|a| a.email == "affiliate2@example.com").map(|a| a.id),
            Some(2)
        );
    }
}
