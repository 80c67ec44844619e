use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::{
    membermodel::{normalize_email, Member},
    referralmodel::ReferredMember,
};

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct WaitlistRequestDto {
    #[validate(
        custom = "not_blank",
        length(max = 120, message = "Full name must be at most 120 characters")
    )]
    pub full_name: String,

    #[validate(
        length(min = 1, message = "Email is required"),
        email(message = "Email is invalid")
    )]
    pub email: String,

    #[validate(length(max = 120, message = "Brand name must be at most 120 characters"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_name: Option<String>,

    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub referral_code: Option<String>,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("blank");
        error.message = Some(Cow::from("Full name is required"));
        return Err(error);
    }
    Ok(())
}

impl WaitlistRequestDto {
    /// Trimmed copy with the email case-folded and blank optionals dropped.
    pub fn normalized(&self) -> WaitlistRequestDto {
        WaitlistRequestDto {
            full_name: self.full_name.trim().to_string(),
            email: normalize_email(&self.email),
            brand_name: non_blank(self.brand_name.as_deref()),
            referral_code: non_blank(self.referral_code.as_deref()).map(|code| code.to_uppercase()),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Flatten validator output into one line a form can show inline.
pub fn validation_message(errors: &validator::ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |err| {
                err.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} is invalid", field))
            })
        })
        .collect();
    messages.sort();
    messages.join(", ")
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub status: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponseDto {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Validate, Debug, Default)]
pub struct LeaderboardQueryDto {
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDto {
    pub name: String,
    pub brand: Option<String>,
    pub code: String,
    pub referrals: i64,
    pub joined: DateTime<Utc>,
    #[serde(rename = "shareLink")]
    pub share_link: String,
}

impl ProfileDto {
    pub fn from_member(member: &Member, referrals: i64, share_link: String) -> Self {
        ProfileDto {
            name: member.full_name.clone(),
            brand: member.brand_name.clone(),
            code: member.referral_code.clone(),
            referrals,
            joined: member.created_at,
            share_link,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentReferralDto {
    pub name: String,
    pub brand: Option<String>,
    pub email: String,
    pub joined: DateTime<Utc>,
}

impl From<ReferredMember> for RecentReferralDto {
    fn from(referee: ReferredMember) -> Self {
        RecentReferralDto {
            name: referee.full_name,
            brand: referee.brand_name,
            email: referee.email,
            joined: referee.joined_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardResponseDto {
    pub profile: ProfileDto,
    #[serde(rename = "recentReferrals")]
    pub recent_referrals: Vec<RecentReferralDto>,
}
