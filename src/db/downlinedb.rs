use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};

use super::db::PgUnitOfWork;
use crate::models::downlinemodel::{
    Downline, DownlineQuery, DownlineRow, DownlineStatus, DownlineUpdate, NewDownline,
};

const DOWNLINE_COLUMNS: &str = r#"
    id, full_name, email, status, sub1_affiliate_id, sub2_affiliate_id,
    created_at, updated_at
"#;

const DOWNLINE_ROW_SELECT: &str = r#"
    SELECT d.id, d.full_name, d.email, d.status,
           d.sub1_affiliate_id, d.sub2_affiliate_id, d.created_at,
           a1.full_name AS sub1_name, a1.affiliate_code AS sub1_code, a1.status AS sub1_status,
           a2.full_name AS sub2_name, a2.affiliate_code AS sub2_code, a2.status AS sub2_status
    FROM downlines d
    LEFT JOIN affiliates a1 ON d.sub1_affiliate_id = a1.id
    LEFT JOIN affiliates a2 ON d.sub2_affiliate_id = a2.id
"#;

#[async_trait]
pub trait DownlineExt: Send {
    /// By id, or by email. Several rows may share an email until the
    /// auditor runs; the lowest id wins.
    async fn get_downline(
        &mut self,
        downline_id: Option<i32>,
        email: Option<&str>,
    ) -> Result<Option<Downline>, sqlx::Error>;

    async fn get_downlines_by_sub1(
        &mut self,
        affiliate_id: i32,
    ) -> Result<Vec<Downline>, sqlx::Error>;

    async fn get_downlines_by_sub2(
        &mut self,
        affiliate_id: i32,
    ) -> Result<Vec<Downline>, sqlx::Error>;

    async fn save_downline(
        &mut self,
        downline: NewDownline,
    ) -> Result<Downline, sqlx::Error>;

    async fn update_downline(
        &mut self,
        downline_id: i32,
        update: DownlineUpdate,
    ) -> Result<Downline, sqlx::Error>;

    async fn update_downline_links(
        &mut self,
        downline_id: i32,
        sub1_affiliate_id: i32,
        sub2_affiliate_id: Option<i32>,
    ) -> Result<Downline, sqlx::Error>;

    async fn update_downline_status(
        &mut self,
        downline_id: i32,
        status: DownlineStatus,
    ) -> Result<Downline, sqlx::Error>;

    async fn delete_downline(
        &mut self,
        downline_id: i32,
    ) -> Result<u64, sqlx::Error>;

    /// One page of joined rows, newest first, plus the total matching `query`.
    async fn list_downlines(
        &mut self,
        query: &DownlineQuery,
        page: u32,
        limit: usize,
    ) -> Result<(Vec<DownlineRow>, i64), sqlx::Error>;

    /// Every downline joined with its Sub1/Sub2 affiliates, by ascending id.
    async fn list_all_downlines_joined(&mut self) -> Result<Vec<DownlineRow>, sqlx::Error>;

    /// Joined rows, newest first. With an affiliate, only the rows naming it
    /// as Sub1 or Sub2.
    async fn downline_report(
        &mut self,
        affiliate_id: Option<i32>,
    ) -> Result<Vec<DownlineRow>, sqlx::Error>;
}

fn push_downline_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &DownlineQuery) {
    if let Some(status) = query.status {
        builder.push(" AND d.status = ").push_bind(status);
    }

    if let Some(code) = query.sub1_code.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        builder.push(" AND a1.affiliate_code = ").push_bind(code.to_string());
    }

    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        builder.push(" AND (");
        let mut separated = builder.separated(" OR ");
        for column in [
            "d.full_name",
            "d.email",
            "a1.full_name",
            "a1.affiliate_code",
            "a2.full_name",
            "a2.affiliate_code",
        ] {
            separated.push(format!("{} ILIKE ", column));
            separated.push_bind_unseparated(pattern.clone());
        }
        separated.push_unseparated(")");
    }
}

#[async_trait]
impl DownlineExt for PgUnitOfWork {
    async fn get_downline(
        &mut self,
        downline_id: Option<i32>,
        email: Option<&str>,
    ) -> Result<Option<Downline>, sqlx::Error> {
        let mut downline: Option<Downline> = None;

        if let Some(downline_id) = downline_id {
            downline = sqlx::query_as::<_, Downline>(&format!(
                "SELECT {} FROM downlines WHERE id = $1",
                DOWNLINE_COLUMNS
            ))
            .bind(downline_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        } else if let Some(email) = email {
            downline = sqlx::query_as::<_, Downline>(&format!(
                "SELECT {} FROM downlines WHERE email = $1 ORDER BY id LIMIT 1",
                DOWNLINE_COLUMNS
            ))
            .bind(email)
            .fetch_optional(&mut *self.tx)
            .await?;
        }

        Ok(downline)
    }

    async fn get_downlines_by_sub1(
        &mut self,
        affiliate_id: i32,
    ) -> Result<Vec<Downline>, sqlx::Error> {
        sqlx::query_as::<_, Downline>(&format!(
            "SELECT {} FROM downlines WHERE sub1_affiliate_id = $1 ORDER BY id",
            DOWNLINE_COLUMNS
        ))
        .bind(affiliate_id)
        .fetch_all(&mut *self.tx)
        .await
    }

    async fn get_downlines_by_sub2(
        &mut self,
        affiliate_id: i32,
    ) -> Result<Vec<Downline>, sqlx::Error> {
        sqlx::query_as::<_, Downline>(&format!(
            "SELECT {} FROM downlines WHERE sub2_affiliate_id = $1 ORDER BY id",
            DOWNLINE_COLUMNS
        ))
        .bind(affiliate_id)
        .fetch_all(&mut *self.tx)
        .await
    }

    async fn save_downline(
        &mut self,
        downline: NewDownline,
    ) -> Result<Downline, sqlx::Error> {
        sqlx::query_as::<_, Downline>(&format!(
            r#"
            INSERT INTO downlines (full_name, email, status, sub1_affiliate_id, sub2_affiliate_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            DOWNLINE_COLUMNS
        ))
        .bind(downline.full_name)
        .bind(downline.email)
        .bind(downline.status)
        .bind(downline.sub1_affiliate_id)
        .bind(downline.sub2_affiliate_id)
        .fetch_one(&mut *self.tx)
        .await
    }

    async fn update_downline(
        &mut self,
        downline_id: i32,
        update: DownlineUpdate,
    ) -> Result<Downline, sqlx::Error> {
        sqlx::query_as::<_, Downline>(&format!(
            r#"
            UPDATE downlines
            SET full_name = $1, email = $2, status = $3, updated_at = NOW()
            WHERE id = $4
            RETURNING {}
            "#,
            DOWNLINE_COLUMNS
        ))
        .bind(update.full_name)
        .bind(update.email)
        .bind(update.status)
        .bind(downline_id)
        .fetch_one(&mut *self.tx)
        .await
    }

    async fn update_downline_links(
        &mut self,
        downline_id: i32,
        sub1_affiliate_id: i32,
        sub2_affiliate_id: Option<i32>,
    ) -> Result<Downline, sqlx::Error> {
        sqlx::query_as::<_, Downline>(&format!(
            r#"
            UPDATE downlines
            SET sub1_affiliate_id = $1, sub2_affiliate_id = $2, updated_at = NOW()
            WHERE id = $3
            RETURNING {}
            "#,
            DOWNLINE_COLUMNS
        ))
        .bind(sub1_affiliate_id)
        .bind(sub2_affiliate_id)
        .bind(downline_id)
        .fetch_one(&mut *self.tx)
        .await
    }

    async fn update_downline_status(
        &mut self,
        downline_id: i32,
        status: DownlineStatus,
    ) -> Result<Downline, sqlx::Error> {
        sqlx::query_as::<_, Downline>(&format!(
            r#"
            UPDATE downlines
            SET status = $1, updated_at = NOW()
            WHERE id = $2
            RETURNING {}
            "#,
            DOWNLINE_COLUMNS
        ))
        .bind(status)
        .bind(downline_id)
        .fetch_one(&mut *self.tx)
        .await
    }

    async fn delete_downline(
        &mut self,
        downline_id: i32,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM downlines WHERE id = $1")
            .bind(downline_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn list_downlines(
        &mut self,
        query: &DownlineQuery,
        page: u32,
        limit: usize,
    ) -> Result<(Vec<DownlineRow>, i64), sqlx::Error> {
        let offset = (page.max(1) - 1) as i64 * limit as i64;

        let mut count = QueryBuilder::<Postgres>::new(
            r#"
            SELECT COUNT(*)
            FROM downlines d
            LEFT JOIN affiliates a1 ON d.sub1_affiliate_id = a1.id
            LEFT JOIN affiliates a2 ON d.sub2_affiliate_id = a2.id
            WHERE 1=1
            "#,
        );
        push_downline_filters(&mut count, query);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&mut *self.tx)
            .await?;

        let mut builder = QueryBuilder::<Postgres>::new(format!("{} WHERE 1=1", DOWNLINE_ROW_SELECT));
        push_downline_filters(&mut builder, query);
        builder
            .push(" ORDER BY d.created_at DESC, d.id DESC LIMIT ")
            .push_bind(limit as i64)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = builder
            .build_query_as::<DownlineRow>()
            .fetch_all(&mut *self.tx)
            .await?;

        Ok((rows, total))
    }

    async fn list_all_downlines_joined(&mut self) -> Result<Vec<DownlineRow>, sqlx::Error> {
        sqlx::query_as::<_, DownlineRow>(&format!("{} ORDER BY d.id", DOWNLINE_ROW_SELECT))
            .fetch_all(&mut *self.tx)
            .await
    }

    async fn downline_report(
        &mut self,
        affiliate_id: Option<i32>,
    ) -> Result<Vec<DownlineRow>, sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new(DOWNLINE_ROW_SELECT);

        if let Some(affiliate_id) = affiliate_id {
            builder
                .push(" WHERE d.sub1_affiliate_id = ")
                .push_bind(affiliate_id)
                .push(" OR d.sub2_affiliate_id = ")
                .push_bind(affiliate_id);
        }

        builder.push(" ORDER BY d.created_at DESC, d.id DESC");

        builder
            .build_query_as::<DownlineRow>()
            .fetch_all(&mut *self.tx)
            .await
    }
}
