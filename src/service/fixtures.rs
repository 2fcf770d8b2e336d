//! Seeding helpers shared by the service tests.

use crate::{
    db::{affiliatedb::AffiliateExt, downlinedb::DownlineExt},
    models::{
        affiliatemodel::{Affiliate, AffiliateStatus, NewAffiliate},
        downlinemodel::{Downline, DownlineStatus, NewDownline},
    },
};

pub(crate) async fn seed_affiliate<T: AffiliateExt>(
    tx: &mut T,
    email: &str,
    referred_by_id: Option<i32>,
    status: AffiliateStatus,
) -> Affiliate {
    let saved = tx
        .save_affiliate(NewAffiliate {
            full_name: email.split('@').next().unwrap_or(email).to_string(),
            email: email.to_string(),
            mt5_rebate_account: format!("mt5-{}", email),
            contact_details: None,
            ib_link: None,
            referred_by_id,
            status,
            verification_token: None,
            verification_expires_at: None,
            spam_score: 0,
            is_flagged: false,
            flagged_reason: None,
        })
        .await
        .unwrap();

    tx.update_affiliate_code(saved.id, Affiliate::code_for(saved.id))
        .await
        .unwrap()
}

pub(crate) async fn seed_downline<T: DownlineExt>(
    tx: &mut T,
    email: &str,
    sub1_affiliate_id: i32,
    sub2_affiliate_id: Option<i32>,
    status: DownlineStatus,
) -> Downline {
    tx.save_downline(NewDownline {
        full_name: email.split('@').next().unwrap_or(email).to_string(),
        email: email.to_string(),
        status,
        sub1_affiliate_id,
        sub2_affiliate_id,
    })
    .await
    .unwrap()
}
