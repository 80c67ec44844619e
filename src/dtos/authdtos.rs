use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::sessionmodel::Session;

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct MagicLinkRequestDto {
    #[validate(
        length(min = 1, message = "Email is required"),
        email(message = "Email is invalid")
    )]
    pub email: String,

    #[validate(url(message = "redirect_to must be a URL"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct VerifyLoginQueryDto {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponseDto {
    pub status: String,
    pub token_type: String,
    #[serde(flatten)]
    pub session: Session,
}

impl SessionResponseDto {
    pub fn bearer(session: Session) -> Self {
        SessionResponseDto {
            status: "success".to_string(),
            token_type: "bearer".to_string(),
            session,
        }
    }
}
