//! Keeps an affiliate's mirror downline (the downline row sharing its email)
//! in step with the affiliate's lifecycle.
//!
//! Every rule is guarded: the mirror is only written when it currently holds
//! the status the rule expects, so a downline an admin moved somewhere else
//! (for example `Suspended`) is left alone.

use crate::{
    db::{affiliatedb::AffiliateExt, downlinedb::DownlineExt},
    models::{
        affiliatemodel::{Affiliate, AffiliateStatus},
        downlinemodel::{Downline, DownlineStatus},
    },
    service::error::ServiceError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    EmailVerified,
    Approved,
    Rejected,
    StatusEdited {
        from: AffiliateStatus,
        to: AffiliateStatus,
    },
    /// A downline registered as an affiliate under the same email.
    RegisteredAsAffiliate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorRule {
    pub requires: DownlineStatus,
    pub becomes: DownlineStatus,
}

impl SyncEvent {
    /// Status the affiliate ends up in. `None` for events that do not move
    /// the affiliate.
    pub fn target_status(&self) -> Option<AffiliateStatus> {
        match self {
            SyncEvent::EmailVerified => Some(AffiliateStatus::Pending),
            SyncEvent::Approved => Some(AffiliateStatus::Approved),
            SyncEvent::Rejected => Some(AffiliateStatus::Rejected),
            SyncEvent::StatusEdited { to, .. } => Some(*to),
            SyncEvent::RegisteredAsAffiliate => None,
        }
    }

    pub fn allowed_from(&self, current: AffiliateStatus) -> bool {
        match self {
            SyncEvent::EmailVerified => matches!(
                current,
                AffiliateStatus::Unverified | AffiliateStatus::Flagged
            ),
            SyncEvent::Approved | SyncEvent::Rejected => current == AffiliateStatus::Pending,
            SyncEvent::StatusEdited { from, to } => {
                *from == current && *to != AffiliateStatus::Unverified
            }
            SyncEvent::RegisteredAsAffiliate => false,
        }
    }

    pub fn mirror_rule(&self) -> Option<MirrorRule> {
        let rule = match self {
            SyncEvent::EmailVerified | SyncEvent::RegisteredAsAffiliate => MirrorRule {
                requires: DownlineStatus::UserOnly,
                becomes: DownlineStatus::Pending,
            },
            SyncEvent::Approved => MirrorRule {
                requires: DownlineStatus::Pending,
                becomes: DownlineStatus::Approved,
            },
            SyncEvent::Rejected => MirrorRule {
                requires: DownlineStatus::Pending,
                becomes: DownlineStatus::UserOnly,
            },
            SyncEvent::StatusEdited { from, to } => MirrorRule {
                // Approval only ever promotes a pending mirror.
                requires: if *to == AffiliateStatus::Approved {
                    DownlineStatus::Pending
                } else {
                    DownlineStatus::mirroring(*from)
                },
                becomes: DownlineStatus::mirroring(*to),
            },
        };

        (rule.requires != rule.becomes).then_some(rule)
    }
}

/// Applies the event's mirror rule to the downline holding `email`.
/// Returns the downline when it was written.
pub async fn sync_mirror_downline<T: DownlineExt>(
    tx: &mut T,
    email: &str,
    event: SyncEvent,
) -> Result<Option<Downline>, ServiceError> {
    let Some(rule) = event.mirror_rule() else {
        return Ok(None);
    };

    let Some(downline) = tx.get_downline(None, Some(email)).await? else {
        return Ok(None);
    };

    if downline.status != rule.requires {
        tracing::debug!(
            "Leaving downline {} at {} ({:?} expects {})",
            downline.id,
            downline.status,
            event,
            rule.requires
        );
        return Ok(None);
    }

    let updated = tx.update_downline_status(downline.id, rule.becomes).await?;
    tracing::info!(
        "Synced downline {} from {} to {}",
        updated.id,
        rule.requires,
        rule.becomes
    );

    Ok(Some(updated))
}

/// Moves the affiliate to the event's target status and syncs its mirror.
pub async fn transition_affiliate<T>(
    tx: &mut T,
    affiliate: &Affiliate,
    event: SyncEvent,
) -> Result<(Affiliate, Option<Downline>), ServiceError>
where
    T: AffiliateExt + DownlineExt,
{
    let target = event
        .target_status()
        .ok_or_else(|| ServiceError::Validation(format!("{:?} does not move an affiliate", event)))?;

    if !event.allowed_from(affiliate.status) {
        return Err(ServiceError::InvalidStatusTransition {
            affiliate_id: affiliate.id,
            from: affiliate.status,
            to: target,
        });
    }

    let updated = if affiliate.status == target {
        affiliate.clone()
    } else {
        tx.update_affiliate_status(affiliate.id, target).await?
    };

    let mirror = sync_mirror_downline(tx, &updated.email, event).await?;

    Ok((updated, mirror))
}
