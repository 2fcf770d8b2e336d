use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};

use super::db::PgUnitOfWork;
use crate::models::affiliatemodel::{
    Affiliate, AffiliateDetails, AffiliateQuery, AffiliateReportFilter, AffiliateReportRow,
    AffiliateStatus, NewAffiliate,
};

const AFFILIATE_COLUMNS: &str = r#"
    id, full_name, email, mt5_rebate_account, contact_details, ib_link,
    affiliate_code, status, referred_by_id,
    email_verified, verification_token, verification_expires_at,
    spam_score, is_flagged, flagged_reason,
    created_at, updated_at, approved_at
"#;

#[async_trait]
pub trait AffiliateExt: Send {
    async fn get_affiliate(
        &mut self,
        affiliate_id: Option<i32>,
        code: Option<&str>,
        email: Option<&str>,
        token: Option<&str>,
    ) -> Result<Option<Affiliate>, sqlx::Error>;

    async fn get_affiliate_by_mt5_account(
        &mut self,
        account: &str,
    ) -> Result<Option<Affiliate>, sqlx::Error>;

    /// Newest first. An empty `statuses` slice lists every affiliate.
    async fn list_affiliates_by_status(
        &mut self,
        statuses: &[AffiliateStatus],
    ) -> Result<Vec<Affiliate>, sqlx::Error>;

    /// One page of affiliates plus the total matching `query`.
    async fn list_affiliates(
        &mut self,
        query: &AffiliateQuery,
        page: u32,
        limit: usize,
    ) -> Result<(Vec<Affiliate>, i64), sqlx::Error>;

    /// Affiliates matching `filter`, newest first, each with the number of
    /// downlines naming it as Sub1 or Sub2.
    async fn affiliate_report(
        &mut self,
        filter: &AffiliateReportFilter,
    ) -> Result<Vec<AffiliateReportRow>, sqlx::Error>;

    async fn save_affiliate(
        &mut self,
        affiliate: NewAffiliate,
    ) -> Result<Affiliate, sqlx::Error>;

    async fn update_affiliate_details(
        &mut self,
        affiliate_id: i32,
        details: AffiliateDetails,
    ) -> Result<Affiliate, sqlx::Error>;

    /// Also stamps `approved_at` the first time the affiliate is approved.
    async fn update_affiliate_status(
        &mut self,
        affiliate_id: i32,
        status: AffiliateStatus,
    ) -> Result<Affiliate, sqlx::Error>;

    async fn update_affiliate_code(
        &mut self,
        affiliate_id: i32,
        code: String,
    ) -> Result<Affiliate, sqlx::Error>;

    /// Marks the email verified and expires the token. The token itself is
    /// kept so a repeated link click can be recognised.
    async fn mark_email_verified(
        &mut self,
        affiliate_id: i32,
    ) -> Result<Affiliate, sqlx::Error>;

    async fn repoint_referrals(
        &mut self,
        from_id: i32,
        to_id: Option<i32>,
    ) -> Result<u64, sqlx::Error>;

    async fn delete_affiliate(
        &mut self,
        affiliate_id: i32,
    ) -> Result<u64, sqlx::Error>;
}

fn push_affiliate_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &AffiliateQuery) {
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status);
    }

    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        builder
            .push(" AND (full_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR affiliate_code ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR mt5_rebate_account ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl AffiliateExt for PgUnitOfWork {
    async fn get_affiliate(
        &mut self,
        affiliate_id: Option<i32>,
        code: Option<&str>,
        email: Option<&str>,
        token: Option<&str>,
    ) -> Result<Option<Affiliate>, sqlx::Error> {
        let mut affiliate: Option<Affiliate> = None;

        if let Some(affiliate_id) = affiliate_id {
            affiliate = sqlx::query_as::<_, Affiliate>(&format!(
                "SELECT {} FROM affiliates WHERE id = $1",
                AFFILIATE_COLUMNS
            ))
            .bind(affiliate_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        } else if let Some(code) = code {
            affiliate = sqlx::query_as::<_, Affiliate>(&format!(
                "SELECT {} FROM affiliates WHERE affiliate_code = $1",
                AFFILIATE_COLUMNS
            ))
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await?;
        } else if let Some(email) = email {
            affiliate = sqlx::query_as::<_, Affiliate>(&format!(
                "SELECT {} FROM affiliates WHERE email = $1",
                AFFILIATE_COLUMNS
            ))
            .bind(email)
            .fetch_optional(&mut *self.tx)
            .await?;
        } else if let Some(token) = token {
            affiliate = sqlx::query_as::<_, Affiliate>(&format!(
                "SELECT {} FROM affiliates WHERE verification_token = $1",
                AFFILIATE_COLUMNS
            ))
            .bind(token)
            .fetch_optional(&mut *self.tx)
            .await?;
        }

        Ok(affiliate)
    }

    async fn get_affiliate_by_mt5_account(
        &mut self,
        account: &str,
    ) -> Result<Option<Affiliate>, sqlx::Error> {
        sqlx::query_as::<_, Affiliate>(&format!(
            "SELECT {} FROM affiliates WHERE mt5_rebate_account = $1 ORDER BY id LIMIT 1",
            AFFILIATE_COLUMNS
        ))
        .bind(account)
        .fetch_optional(&mut *self.tx)
        .await
    }

    async fn list_affiliates_by_status(
        &mut self,
        statuses: &[AffiliateStatus],
    ) -> Result<Vec<Affiliate>, sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM affiliates",
            AFFILIATE_COLUMNS
        ));

        if !statuses.is_empty() {
            builder.push(" WHERE status IN (");
            let mut separated = builder.separated(", ");
            for status in statuses {
                separated.push_bind(*status);
            }
            separated.push_unseparated(")");
        }

        builder.push(" ORDER BY created_at DESC, id DESC");

        builder
            .build_query_as::<Affiliate>()
            .fetch_all(&mut *self.tx)
            .await
    }

    async fn list_affiliates(
        &mut self,
        query: &AffiliateQuery,
        page: u32,
        limit: usize,
    ) -> Result<(Vec<Affiliate>, i64), sqlx::Error> {
        let offset = (page.max(1) - 1) as i64 * limit as i64;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM affiliates WHERE 1=1");
        push_affiliate_filters(&mut count, query);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&mut *self.tx)
            .await?;

        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM affiliates WHERE 1=1",
            AFFILIATE_COLUMNS
        ));
        push_affiliate_filters(&mut builder, query);
        builder
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(limit as i64)
            .push(" OFFSET ")
            .push_bind(offset);

        let affiliates = builder
            .build_query_as::<Affiliate>()
            .fetch_all(&mut *self.tx)
            .await?;

        Ok((affiliates, total))
    }

    async fn affiliate_report(
        &mut self,
        filter: &AffiliateReportFilter,
    ) -> Result<Vec<AffiliateReportRow>, sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new(
            r#"
            SELECT a.id, a.full_name, a.email, a.mt5_rebate_account, a.affiliate_code,
                   a.status, a.created_at, a.approved_at,
                   COUNT(d.id) AS total_downlines
            FROM affiliates a
            LEFT JOIN downlines d
                ON a.id = d.sub1_affiliate_id OR a.id = d.sub2_affiliate_id
            WHERE 1=1
            "#,
        );

        if let Some(from) = filter.created_from {
            builder.push(" AND a.created_at >= ").push_bind(from);
        }
        if let Some(until) = filter.created_until {
            builder.push(" AND a.created_at <= ").push_bind(until);
        }
        if let Some(status) = filter.status {
            builder.push(" AND a.status = ").push_bind(status);
        }
        if let Some(month) = filter.registration_month {
            builder
                .push(" AND EXTRACT(MONTH FROM a.created_at)::int = ")
                .push_bind(month as i32);
        }

        builder.push(" GROUP BY a.id ORDER BY a.created_at DESC, a.id DESC");

        builder
            .build_query_as::<AffiliateReportRow>()
            .fetch_all(&mut *self.tx)
            .await
    }

    async fn save_affiliate(
        &mut self,
        affiliate: NewAffiliate,
    ) -> Result<Affiliate, sqlx::Error> {
        sqlx::query_as::<_, Affiliate>(&format!(
            r#"
            INSERT INTO affiliates (
                full_name, email, mt5_rebate_account, contact_details, ib_link,
                referred_by_id, status, verification_token, verification_expires_at,
                spam_score, is_flagged, flagged_reason
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {}
            "#,
            AFFILIATE_COLUMNS
        ))
        .bind(affiliate.full_name)
        .bind(affiliate.email)
        .bind(affiliate.mt5_rebate_account)
        .bind(affiliate.contact_details)
        .bind(affiliate.ib_link)
        .bind(affiliate.referred_by_id)
        .bind(affiliate.status)
        .bind(affiliate.verification_token)
        .bind(affiliate.verification_expires_at)
        .bind(affiliate.spam_score)
        .bind(affiliate.is_flagged)
        .bind(affiliate.flagged_reason)
        .fetch_one(&mut *self.tx)
        .await
    }

    async fn update_affiliate_details(
        &mut self,
        affiliate_id: i32,
        details: AffiliateDetails,
    ) -> Result<Affiliate, sqlx::Error> {
        sqlx::query_as::<_, Affiliate>(&format!(
            r#"
            UPDATE affiliates
            SET full_name = $1, email = $2, mt5_rebate_account = $3,
                contact_details = $4, ib_link = $5, updated_at = NOW()
            WHERE id = $6
            RETURNING {}
            "#,
            AFFILIATE_COLUMNS
        ))
        .bind(details.full_name)
        .bind(details.email)
        .bind(details.mt5_rebate_account)
        .bind(details.contact_details)
        .bind(details.ib_link)
        .bind(affiliate_id)
        .fetch_one(&mut *self.tx)
        .await
    }

    async fn update_affiliate_status(
        &mut self,
        affiliate_id: i32,
        status: AffiliateStatus,
    ) -> Result<Affiliate, sqlx::Error> {
        sqlx::query_as::<_, Affiliate>(&format!(
            r#"
            UPDATE affiliates
            SET status = $1,
                approved_at = CASE
                    WHEN $1 = 'approved'::affiliate_status THEN COALESCE(approved_at, NOW())
                    ELSE approved_at
                END,
                updated_at = NOW()
            WHERE id = $2
            RETURNING {}
            "#,
            AFFILIATE_COLUMNS
        ))
        .bind(status)
        .bind(affiliate_id)
        .fetch_one(&mut *self.tx)
        .await
    }

    async fn update_affiliate_code(
        &mut self,
        affiliate_id: i32,
        code: String,
    ) -> Result<Affiliate, sqlx::Error> {
        sqlx::query_as::<_, Affiliate>(&format!(
            r#"
            UPDATE affiliates
            SET affiliate_code = $1, updated_at = NOW()
            WHERE id = $2
            RETURNING {}
            "#,
            AFFILIATE_COLUMNS
        ))
        .bind(code)
        .bind(affiliate_id)
        .fetch_one(&mut *self.tx)
        .await
    }

    async fn mark_email_verified(
        &mut self,
        affiliate_id: i32,
    ) -> Result<Affiliate, sqlx::Error> {
        sqlx::query_as::<_, Affiliate>(&format!(
            r#"
            UPDATE affiliates
            SET email_verified = TRUE,
                verification_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            AFFILIATE_COLUMNS
        ))
        .bind(affiliate_id)
        .fetch_one(&mut *self.tx)
        .await
    }

    async fn repoint_referrals(
        &mut self,
        from_id: i32,
        to_id: Option<i32>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE affiliates
            SET referred_by_id = $1, updated_at = NOW()
            WHERE referred_by_id = $2
            "#,
        )
        .bind(to_id)
        .bind(from_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_affiliate(
        &mut self,
        affiliate_id: i32,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM affiliates WHERE id = $1")
            .bind(affiliate_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }
}
