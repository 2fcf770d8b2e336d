use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use validator::Validate;

use crate::{
    db::ReferralStore,
    dtos::{
        AddDownlineDto, AffiliateListResponseDto, AffiliateQueryDto, AffiliateReportQueryDto,
        AffiliateReportResponseDto, AffiliateResponseDto, CleanupResponseDto,
        DownlineListResponseDto, DownlineQueryDto, DownlineReportQueryDto,
        DownlineReportResponseDto, DownlineResponseDto, FilterAffiliateDto, RemovalResponseDto,
        UpdateAffiliateDto, UpdateDownlineDto,
    },
    error::HttpError,
    AppState,
};

pub fn admin_handler<S: ReferralStore>() -> Router {
    Router::new()
        .route("/affiliates", get(list_affiliates::<S>))
        .route("/affiliates/pending", get(pending_affiliates::<S>))
        .route(
            "/affiliates/:id",
            put(update_affiliate::<S>).delete(remove_affiliate::<S>),
        )
        .route("/affiliates/:id/approve", put(approve_affiliate::<S>))
        .route("/affiliates/:id/reject", put(reject_affiliate::<S>))
        .route(
            "/downlines",
            get(list_downlines::<S>).post(add_downline::<S>),
        )
        .route("/downlines/:id", put(update_downline::<S>))
        .route("/cleanup-tree", post(cleanup_tree::<S>))
        .route("/reports/affiliates", get(affiliate_report::<S>))
        .route("/reports/downlines", get(downline_report::<S>))
}

pub async fn pending_affiliates<S: ReferralStore>(
    Extension(app_state): Extension<Arc<AppState<S>>>,
) -> Result<impl IntoResponse, HttpError> {
    let affiliates = app_state.affiliate_service.pending_affiliates().await?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "affiliates": FilterAffiliateDto::filter_affiliates(&affiliates),
        "results": affiliates.len(),
    })))
}

pub async fn list_affiliates<S: ReferralStore>(
    Extension(app_state): Extension<Arc<AppState<S>>>,
    Query(query_params): Query<AffiliateQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    query_params
        .validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let query = query_params.to_query().map_err(HttpError::bad_request)?;
    let page = app_state
        .affiliate_service
        .list_affiliates(
            &query,
            query_params.page.unwrap_or(1),
            query_params.limit.unwrap_or(20),
        )
        .await?;

    Ok(Json(AffiliateListResponseDto::from_page(page)))
}

pub async fn approve_affiliate<S: ReferralStore>(
    Extension(app_state): Extension<Arc<AppState<S>>>,
    Path(affiliate_id): Path<i32>,
) -> Result<impl IntoResponse, HttpError> {
    let affiliate = app_state.affiliate_service.approve(affiliate_id).await?;

    Ok(Json(AffiliateResponseDto::new(
        "Affiliate approved successfully",
        &affiliate,
    )))
}

pub async fn reject_affiliate<S: ReferralStore>(
    Extension(app_state): Extension<Arc<AppState<S>>>,
    Path(affiliate_id): Path<i32>,
) -> Result<impl IntoResponse, HttpError> {
    let affiliate = app_state.affiliate_service.reject(affiliate_id).await?;

    Ok(Json(AffiliateResponseDto::new(
        "Affiliate rejected",
        &affiliate,
    )))
}

pub async fn update_affiliate<S: ReferralStore>(
    Extension(app_state): Extension<Arc<AppState<S>>>,
    Path(affiliate_id): Path<i32>,
    Json(body): Json<UpdateAffiliateDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let affiliate = app_state
        .affiliate_service
        .update_affiliate(affiliate_id, body.into())
        .await?;

    Ok(Json(AffiliateResponseDto::new(
        "Affiliate updated successfully",
        &affiliate,
    )))
}

pub async fn remove_affiliate<S: ReferralStore>(
    Extension(app_state): Extension<Arc<AppState<S>>>,
    Path(affiliate_id): Path<i32>,
) -> Result<impl IntoResponse, HttpError> {
    let outcome = app_state
        .downline_service
        .remove_affiliate(affiliate_id)
        .await?;

    Ok(Json(RemovalResponseDto {
        status: "success".to_string(),
        message: format!(
            "Affiliate deleted. {} downlines compressed, {} downlines removed",
            outcome.compressed_count, outcome.deleted_count
        ),
        outcome,
    }))
}

pub async fn list_downlines<S: ReferralStore>(
    Extension(app_state): Extension<Arc<AppState<S>>>,
    Query(query_params): Query<DownlineQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    query_params
        .validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let query = query_params.to_query().map_err(HttpError::bad_request)?;
    let page = app_state
        .downline_service
        .list_downlines(
            &query,
            query_params.page.unwrap_or(1),
            query_params.limit.unwrap_or(20),
        )
        .await?;

    Ok(Json(DownlineListResponseDto::from_page(page)))
}

pub async fn add_downline<S: ReferralStore>(
    Extension(app_state): Extension<Arc<AppState<S>>>,
    Json(body): Json<AddDownlineDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let downline = app_state
        .downline_service
        .add_downline(&body.full_name, &body.email, &body.sub1_affiliate_code)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(DownlineResponseDto::new("Downline added successfully", downline)),
    ))
}

pub async fn update_downline<S: ReferralStore>(
    Extension(app_state): Extension<Arc<AppState<S>>>,
    Path(downline_id): Path<i32>,
    Json(body): Json<UpdateDownlineDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let downline = app_state
        .downline_service
        .update_downline(downline_id, &body.full_name, &body.email, body.status)
        .await?;

    Ok(Json(DownlineResponseDto::new(
        "Downline updated successfully",
        downline,
    )))
}

pub async fn cleanup_tree<S: ReferralStore>(
    Extension(app_state): Extension<Arc<AppState<S>>>,
) -> Result<impl IntoResponse, HttpError> {
    let report = app_state.downline_service.cleanup_tree().await?;

    Ok(Json(CleanupResponseDto {
        status: "success".to_string(),
        report,
    }))
}

pub async fn affiliate_report<S: ReferralStore>(
    Extension(app_state): Extension<Arc<AppState<S>>>,
    Query(query_params): Query<AffiliateReportQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    query_params
        .validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let filter = query_params.to_filter().map_err(HttpError::bad_request)?;
    let report = app_state.report_service.affiliate_report(&filter).await?;

    Ok(Json(AffiliateReportResponseDto::from(report)))
}

pub async fn downline_report<S: ReferralStore>(
    Extension(app_state): Extension<Arc<AppState<S>>>,
    Query(query_params): Query<DownlineReportQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    let downlines = app_state
        .report_service
        .downline_report(query_params.affiliate_id)
        .await?;

    Ok(Json(DownlineReportResponseDto {
        status: "success".to_string(),
        results: downlines.len(),
        downlines,
    }))
}
