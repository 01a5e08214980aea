use std::sync::Arc;

use actix_web::{get, route, web};
use tracing::info;
use utoipa::OpenApi;

use crate::error::ApiError;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::profile::{MAX_AGE, MIN_AGE};
use crate::models::{EducationLevel, UserProfile};
use crate::types::{ProfileRequest, ProfileResponse};
use crate::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(get_profile, upsert_profile),
    components(schemas(ProfileRequest, ProfileResponse, UserProfile, EducationLevel))
)]
pub struct ProfileApi;

#[utoipa::path(
    get,
    path = "/user-profile",
    tag = "profile",
    responses((status = 200, description = "The caller's profile, or null", body = ProfileResponse))
)]
#[get("/user-profile")]
async fn get_profile(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
) -> Result<web::Json<ProfileResponse>, ApiError> {
    let profile = app_state
        .store
        .get_profile(&authenticated_user.user_id)
        .await?;
    Ok(web::Json(ProfileResponse { profile }))
}

/// Creates or replaces the caller's profile. Accepts POST and PUT.
#[utoipa::path(
    post,
    path = "/user-profile",
    tag = "profile",
    request_body = ProfileRequest,
    responses(
        (status = 200, description = "The stored profile", body = ProfileResponse),
        (status = 400, description = "Missing or invalid fields"),
    )
)]
#[route("/user-profile", method = "POST", method = "PUT")]
async fn upsert_profile(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    web::Json(request): web::Json<ProfileRequest>,
) -> Result<web::Json<ProfileResponse>, ApiError> {
    let (age, education_level) = validate(&request)?;
    let profile = app_state
        .store
        .upsert_profile(&authenticated_user.user_id, age, education_level)
        .await?;

    info!(
        "Profile saved for {}: age {}, {}",
        profile.user_id,
        profile.age,
        profile.education_level.tag()
    );
    Ok(web::Json(ProfileResponse {
        profile: Some(profile),
    }))
}

fn validate(request: &ProfileRequest) -> Result<(i32, EducationLevel), ApiError> {
    let level = request
        .education_level
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty());
    let (Some(age), Some(level)) = (request.age.filter(|a| *a != 0), level) else {
        return Err(ApiError::BadRequest(
            "Age and education level are required".to_string(),
        ));
    };

    if !(MIN_AGE..=MAX_AGE).contains(&age) {
        return Err(ApiError::BadRequest(format!(
            "Age must be between {} and {}",
            MIN_AGE, MAX_AGE
        )));
    }
    let level = EducationLevel::from_tag(level)
        .ok_or_else(|| ApiError::BadRequest("Invalid education level".to_string()))?;

    Ok((age, level))
}
