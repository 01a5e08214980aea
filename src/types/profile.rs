use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::UserProfile;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProfileRequest {
    pub age: Option<i32>,
    pub education_level: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProfileResponse {
    pub profile: Option<UserProfile>,
}
