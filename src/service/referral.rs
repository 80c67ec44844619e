use rand::{distr::Alphanumeric, Rng};

pub const REFERRAL_CODE_LEN: usize = 8;

pub fn generate_referral_code() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(REFERRAL_CODE_LEN)
        .map(char::from)
        .collect::<String>()
        .to_uppercase()
}

/// Whether `code` could have come from `generate_referral_code`. Anything
/// else is not worth a lookup.
pub fn is_well_formed_code(code: &str) -> bool {
    code.len() == REFERRAL_CODE_LEN
        && code
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
}

pub fn generate_share_link(base_url: &str, code: &str) -> String {
    format!(
        "{}/?ref={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(code)
    )
}
