use crate::{
    db::{affiliatedb::AffiliateExt, downlinedb::DownlineExt},
    service::error::{EmailHolder, ServiceError},
};

/// Emails are compared and stored trimmed and lower-cased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn require_text(field: &str, value: &str) -> Result<String, ServiceError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ServiceError::Validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

pub fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Fails when `email` already belongs to an affiliate or a downline. Both
/// entities share one email space.
pub async fn ensure_email_free<T>(tx: &mut T, email: &str) -> Result<(), ServiceError>
where
    T: AffiliateExt + DownlineExt,
{
    if let Some(affiliate) = tx.get_affiliate(None, None, Some(email), None).await? {
        return Err(ServiceError::EmailTaken(EmailHolder::Affiliate {
            full_name: affiliate.full_name,
            status: affiliate.status,
        }));
    }

    if let Some(downline) = tx.get_downline(None, Some(email)).await? {
        return Err(ServiceError::EmailTaken(EmailHolder::Downline {
            full_name: downline.full_name,
        }));
    }

    Ok(())
}
