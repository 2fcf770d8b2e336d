use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::{
    db::{affiliatedb::AffiliateExt, downlinedb::DownlineExt, Commit, ReferralStore},
    models::{
        affiliatemodel::{
            Affiliate, AffiliateDetails, AffiliateQuery, AffiliateStatus, NewAffiliate,
        },
        downlinemodel::{Downline, DownlineUpdate},
    },
    service::{
        directory::{ensure_email_free, normalize_email, optional_text, require_text},
        error::{EmailHolder, ServiceError},
        status_sync::{sync_mirror_downline, transition_affiliate, SyncEvent},
        Page,
    },
};

#[derive(Debug, Clone, Copy)]
pub struct RegistrationSettings {
    pub verification_ttl: Duration,
    /// Scores strictly above this flag the registration.
    pub spam_flag_threshold: i32,
}

impl Default for RegistrationSettings {
    fn default() -> Self {
        RegistrationSettings {
            verification_ttl: Duration::hours(24),
            spam_flag_threshold: 50,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AffiliateApplication {
    pub full_name: String,
    pub email: String,
    pub mt5_rebate_account: String,
    pub contact_details: Option<String>,
    pub ib_link: Option<String>,
    pub referrer_code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AffiliateEdit {
    pub full_name: String,
    pub email: String,
    pub mt5_rebate_account: String,
    pub contact_details: Option<String>,
    pub ib_link: Option<String>,
    pub status: AffiliateStatus,
}

#[derive(Debug)]
pub struct Registration {
    pub affiliate: Affiliate,
    /// Handed to the out-of-band mailer; never part of an API response.
    pub verification_token: String,
    pub flagged: bool,
    /// The downline promoted by this registration, if the email had one.
    pub linked_downline: Option<Downline>,
}

#[derive(Debug)]
pub struct Verification {
    pub affiliate: Affiliate,
    pub already_verified: bool,
}

#[derive(Debug, Clone)]
pub struct AffiliateService<S: ReferralStore> {
    store: S,
    settings: RegistrationSettings,
}

impl<S: ReferralStore> AffiliateService<S> {
    pub fn new(store: S, settings: RegistrationSettings) -> Self {
        AffiliateService { store, settings }
    }

    /// Records a new affiliate application.
    ///
    /// An existing downline with the same email decides the referrer: the
    /// new affiliate is placed under that downline's Sub1 and the downline is
    /// moved to `Pending`. Otherwise a referrer code is honoured when it names
    /// an approved affiliate and is ignored when it does not.
    pub async fn register(
        &self,
        application: AffiliateApplication,
        spam_score: i32,
    ) -> Result<Registration, ServiceError> {
        let full_name = require_text("Full name", &application.full_name)?;
        let email = normalize_email(&require_text("Email", &application.email)?);
        let mt5_rebate_account =
            require_text("MT5 rebate account", &application.mt5_rebate_account)?;

        let mut tx = self.store.begin().await?;

        if let Some(existing) = tx.get_affiliate(None, None, Some(&email), None).await? {
            return Err(ServiceError::EmailTaken(EmailHolder::Affiliate {
                full_name: existing.full_name,
                status: existing.status,
            }));
        }

        if tx
            .get_affiliate_by_mt5_account(&mt5_rebate_account)
            .await?
            .is_some()
        {
            return Err(ServiceError::Mt5AccountTaken(mt5_rebate_account));
        }

        let mut referred_by_id = None;
        let mut linked_downline = None;

        if let Some(downline) = tx.get_downline(None, Some(&email)).await? {
            referred_by_id = Some(downline.sub1_affiliate_id);
            linked_downline =
                sync_mirror_downline(&mut tx, &email, SyncEvent::RegisteredAsAffiliate)
                    .await?
                    .or(Some(downline));
        } else if let Some(code) = optional_text(application.referrer_code) {
            let code = code.to_uppercase();
            match tx.get_affiliate(None, Some(&code), None, None).await? {
                Some(referrer) if referrer.status.is_approved() => {
                    referred_by_id = Some(referrer.id);
                }
                _ => tracing::warn!("Ignoring referrer code {} on registration", code),
            }
        }

        let flagged = spam_score > self.settings.spam_flag_threshold;
        let verification_token = Uuid::new_v4().to_string();

        let saved = tx
            .save_affiliate(NewAffiliate {
                full_name,
                email,
                mt5_rebate_account,
                contact_details: optional_text(application.contact_details),
                ib_link: optional_text(application.ib_link),
                referred_by_id,
                status: if flagged {
                    AffiliateStatus::Flagged
                } else {
                    AffiliateStatus::Unverified
                },
                verification_token: Some(verification_token.clone()),
                verification_expires_at: Some(Utc::now() + self.settings.verification_ttl),
                spam_score,
                is_flagged: flagged,
                flagged_reason: flagged.then(|| format!("High spam score: {}", spam_score)),
            })
            .await?;

        let affiliate = tx
            .update_affiliate_code(saved.id, Affiliate::code_for(saved.id))
            .await?;

        tx.commit().await?;

        if flagged {
            tracing::warn!(
                "Affiliate {} flagged on registration (spam score {})",
                affiliate.display_code(),
                spam_score
            );
        } else {
            tracing::info!("Affiliate {} registered", affiliate.display_code());
        }

        Ok(Registration {
            affiliate,
            verification_token,
            flagged,
            linked_downline,
        })
    }

    pub async fn verify_email(&self, token: &str) -> Result<Verification, ServiceError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ServiceError::InvalidVerificationToken);
        }

        let mut tx = self.store.begin().await?;

        let affiliate = tx
            .get_affiliate(None, None, None, Some(token))
            .await?
            .ok_or(ServiceError::InvalidVerificationToken)?;

        if affiliate.email_verified {
            return Ok(Verification {
                affiliate,
                already_verified: true,
            });
        }

        match affiliate.verification_expires_at {
            Some(expires_at) if Utc::now() > expires_at => {
                return Err(ServiceError::VerificationTokenExpired);
            }
            Some(_) => {}
            None => return Err(ServiceError::InvalidVerificationToken),
        }

        let verified = tx.mark_email_verified(affiliate.id).await?;
        let (affiliate, _) =
            transition_affiliate(&mut tx, &verified, SyncEvent::EmailVerified).await?;

        tx.commit().await?;

        tracing::info!("Affiliate {} verified their email", affiliate.display_code());

        Ok(Verification {
            affiliate,
            already_verified: false,
        })
    }

    pub async fn approve(&self, affiliate_id: i32) -> Result<Affiliate, ServiceError> {
        self.apply(affiliate_id, SyncEvent::Approved).await
    }

    pub async fn reject(&self, affiliate_id: i32) -> Result<Affiliate, ServiceError> {
        self.apply(affiliate_id, SyncEvent::Rejected).await
    }

    async fn apply(&self, affiliate_id: i32, event: SyncEvent) -> Result<Affiliate, ServiceError> {
        let mut tx = self.store.begin().await?;

        let affiliate = tx
            .get_affiliate(Some(affiliate_id), None, None, None)
            .await?
            .ok_or(ServiceError::AffiliateNotFound(affiliate_id))?;

        let (affiliate, _) = transition_affiliate(&mut tx, &affiliate, event).await?;
        tx.commit().await?;

        tracing::info!("Affiliate {} is now {}", affiliate.display_code(), affiliate.status);

        Ok(affiliate)
    }

    /// Admin edit. An email change carries the mirror downline along and a
    /// status change goes through the mirror rules.
    pub async fn update_affiliate(
        &self,
        affiliate_id: i32,
        edit: AffiliateEdit,
    ) -> Result<Affiliate, ServiceError> {
        let details = AffiliateDetails {
            full_name: require_text("Full name", &edit.full_name)?,
            email: normalize_email(&require_text("Email", &edit.email)?),
            mt5_rebate_account: require_text("MT5 rebate account", &edit.mt5_rebate_account)?,
            contact_details: optional_text(edit.contact_details),
            ib_link: optional_text(edit.ib_link),
        };

        let mut tx = self.store.begin().await?;

        let current = tx
            .get_affiliate(Some(affiliate_id), None, None, None)
            .await?
            .ok_or(ServiceError::AffiliateNotFound(affiliate_id))?;

        if edit.status != current.status && edit.status == AffiliateStatus::Unverified {
            return Err(ServiceError::InvalidStatusTransition {
                affiliate_id,
                from: current.status,
                to: edit.status,
            });
        }

        if details.mt5_rebate_account != current.mt5_rebate_account {
            if let Some(other) = tx
                .get_affiliate_by_mt5_account(&details.mt5_rebate_account)
                .await?
            {
                if other.id != affiliate_id {
                    return Err(ServiceError::Mt5AccountTaken(details.mt5_rebate_account));
                }
            }
        }

        if details.email != current.email {
            ensure_email_free(&mut tx, &details.email).await?;

            if let Some(mirror) = tx.get_downline(None, Some(&current.email)).await? {
                tx.update_downline(
                    mirror.id,
                    DownlineUpdate {
                        full_name: mirror.full_name,
                        email: details.email.clone(),
                        status: mirror.status,
                    },
                )
                .await?;
            }
        }

        let updated = tx.update_affiliate_details(affiliate_id, details).await?;

        let updated = if edit.status != current.status {
            let event = SyncEvent::StatusEdited {
                from: current.status,
                to: edit.status,
            };
            transition_affiliate(&mut tx, &updated, event).await?.0
        } else {
            updated
        };

        tx.commit().await?;

        Ok(updated)
    }

    /// Applications waiting for a decision, newest first.
    pub async fn pending_affiliates(&self) -> Result<Vec<Affiliate>, ServiceError> {
        let mut tx = self.store.begin().await?;
        Ok(tx
            .list_affiliates_by_status(&[AffiliateStatus::Pending])
            .await?)
    }

    pub async fn list_affiliates(
        &self,
        query: &AffiliateQuery,
        page: u32,
        limit: usize,
    ) -> Result<Page<Affiliate>, ServiceError> {
        let mut tx = self.store.begin().await?;
        let (affiliates, total) = tx.list_affiliates(query, page, limit).await?;

        Ok(Page::new(affiliates, total, page, limit))
    }
}
