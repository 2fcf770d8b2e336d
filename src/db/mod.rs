pub mod affiliatedb;
pub mod db;
pub mod downlinedb;
pub mod memory;

use async_trait::async_trait;

use self::{affiliatedb::AffiliateExt, downlinedb::DownlineExt};

/// Finishes a unit of work. Dropping one without committing rolls it back.
#[async_trait]
pub trait Commit: Send {
    async fn commit(self) -> Result<(), sqlx::Error>;
}

/// A backend able to open atomic units of work over both directories.
///
/// Every multi-row change to the referral tree goes through one unit of
/// work, so readers never see a downline re-pointed at a new Sub1 without
/// its Sub2, or an affiliate deleted while rows still reference it.
#[async_trait]
pub trait ReferralStore: Clone + Send + Sync + 'static {
    type Tx: AffiliateExt + DownlineExt + Commit;

    async fn begin(&self) -> Result<Self::Tx, sqlx::Error>;
}
