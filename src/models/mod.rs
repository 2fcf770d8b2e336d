pub mod affiliatemodel;
pub mod downlinemodel;
pub mod referraltree;
