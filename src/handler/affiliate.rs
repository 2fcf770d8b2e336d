use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use validator::Validate;

use crate::{
    db::ReferralStore,
    dtos::{
        AddOwnDownlineDto, AffiliateData, AffiliateDownlinesResponseDto, AffiliateResponseDto,
        DownlineResponseDto, FilterAffiliateDto, RegisterAffiliateDto, RegistrationResponseDto,
        VerifyEmailQueryDto,
    },
    error::{ErrorMessage, HttpError},
    service::affiliate_service::Registration,
    AppState,
};

/// Header carrying the upstream spam gate's 0-100 score.
pub const SPAM_SCORE_HEADER: &str = "x-spam-score";

pub fn affiliate_handler<S: ReferralStore>() -> Router {
    Router::new()
        .route("/register", post(register::<S>))
        .route("/verify", get(verify_email::<S>))
        .route("/downlines", post(add_own_downline::<S>))
        .route("/:code/downlines", get(affiliate_downlines::<S>))
}

fn spam_score(headers: &HeaderMap) -> i32 {
    headers
        .get(SPAM_SCORE_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<i32>().ok())
        .map(|score| score.clamp(0, 100))
        .unwrap_or(0)
}

/// Mail delivery happens elsewhere, so the token never reaches the logs.
fn pending_verification_notice(registration: &Registration) -> String {
    format!(
        "Affiliate {} awaits email verification",
        registration.affiliate.display_code()
    )
}

pub async fn register<S: ReferralStore>(
    Extension(app_state): Extension<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(body): Json<RegisterAffiliateDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let registration = app_state
        .affiliate_service
        .register(body.into(), spam_score(&headers))
        .await?;

    tracing::info!("{}", pending_verification_notice(&registration));

    let message = if registration.flagged {
        "Application received and held for review"
    } else {
        "Registration successful! Please check your email to verify your account"
    };

    let response = RegistrationResponseDto {
        status: "success".to_string(),
        message: message.to_string(),
        flagged: registration.flagged,
        data: AffiliateData {
            affiliate: FilterAffiliateDto::filter_affiliate(&registration.affiliate),
        },
    };

    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn verify_email<S: ReferralStore>(
    Extension(app_state): Extension<Arc<AppState<S>>>,
    Query(query): Query<VerifyEmailQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    let token = query
        .token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| HttpError::bad_request(ErrorMessage::MissingVerificationToken.to_string()))?;

    let verification = app_state.affiliate_service.verify_email(&token).await?;

    let message = if verification.already_verified {
        "Email already verified"
    } else {
        "Email verified successfully! Your application is now pending admin approval"
    };

    Ok(Json(AffiliateResponseDto::new(message, &verification.affiliate)))
}

pub async fn add_own_downline<S: ReferralStore>(
    Extension(app_state): Extension<Arc<AppState<S>>>,
    Json(body): Json<AddOwnDownlineDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let downline = app_state
        .downline_service
        .add_downline(&body.full_name, &body.email, &body.affiliate_code)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(DownlineResponseDto::new("Downline added successfully", downline)),
    ))
}

pub async fn affiliate_downlines<S: ReferralStore>(
    Extension(app_state): Extension<Arc<AppState<S>>>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let downlines = app_state.downline_service.affiliate_downlines(&code).await?;

    Ok(Json(AffiliateDownlinesResponseDto {
        status: "success".to_string(),
        affiliate_code: code.trim().to_uppercase(),
        results: downlines.len(),
        downlines,
    }))
}
