//! Kakao Login.

use serde::Deserialize;

use super::{FederatedProfile, Provider, ProviderEndpoints};

pub(super) fn endpoints() -> ProviderEndpoints {
    ProviderEndpoints {
        authorize_url: "https://kauth.kakao.com/oauth/authorize".to_owned(),
        token_url: "https://kauth.kakao.com/oauth/token".to_owned(),
        profile_url: "https://kapi.kakao.com/v2/user/me".to_owned(),
    }
}

#[derive(Debug, Deserialize)]
struct UserMe {
    id: i64,
    #[serde(default)]
    kakao_account: Option<KakaoAccount>,
    #[serde(default)]
    properties: Option<Properties>,
}

#[derive(Debug, Deserialize)]
struct KakaoAccount {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    is_email_valid: Option<bool>,
    #[serde(default)]
    is_email_verified: Option<bool>,
    #[serde(default)]
    profile: Option<Profile>,
}

#[derive(Debug, Deserialize)]
struct Profile {
    #[serde(default)]
    nickname: Option<String>,
}

// Older apps only get the nickname through `properties`.
#[derive(Debug, Deserialize)]
struct Properties {
    #[serde(default)]
    nickname: Option<String>,
}

pub(super) fn parse_profile(body: &[u8]) -> Result<FederatedProfile, String> {
    let me: UserMe =
        serde_json::from_slice(body).map_err(|e| format!("malformed kakao profile: {e}"))?;

    let (email, account_nickname) = match me.kakao_account {
        Some(account) => {
            // Unverified addresses must not be used for account linking.
            let trusted = account.is_email_valid == Some(true)
                && account.is_email_verified == Some(true);
            (
                account.email.filter(|_| trusted),
                account.profile.and_then(|p| p.nickname),
            )
        }
        None => (None, None),
    };

    Ok(FederatedProfile {
        provider: Provider::Kakao,
        external_id: me.id.to_string(),
        email,
        display_name: account_nickname.or_else(|| me.properties.and_then(|p| p.nickname)),
    })
}
