//! Google Sign-In (`OpenID` Connect userinfo).

use serde::Deserialize;

use super::{FederatedProfile, Provider, ProviderEndpoints};

pub(super) const SCOPE: &str = "openid email profile";

pub(super) fn endpoints() -> ProviderEndpoints {
    ProviderEndpoints {
        authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".to_owned(),
        token_url: "https://oauth2.googleapis.com/token".to_owned(),
        profile_url: "https://openidconnect.googleapis.com/v1/userinfo".to_owned(),
    }
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<bool>,
    #[serde(default)]
    name: Option<String>,
}

pub(super) fn parse_profile(body: &[u8]) -> Result<FederatedProfile, String> {
    let info: UserInfo =
        serde_json::from_slice(body).map_err(|e| format!("malformed google userinfo: {e}"))?;

    // Unverified addresses must not be used for account linking.
    let email = info.email.filter(|_| info.email_verified.unwrap_or(false));

    Ok(FederatedProfile {
        provider: Provider::Google,
        external_id: info.sub,
        email,
        display_name: info.name,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_verified_email_kept() {
        let body = br#"{"sub":"g-1","email":"park@gmail.test","email_verified":true,"name":"Park"}"#;
        let profile = parse_profile(body).unwrap();
        assert_eq!(profile.email.as_deref(), Some("park@gmail.test"));
        assert_eq!(profile.display_name.as_deref(), Some("Park"));
    }

    #[test]
    fn test_unverified_email_dropped() {
        let body = br#"{"sub":"g-2","email":"park@gmail.test","email_verified":false}"#;
        assert_eq!(parse_profile(body).unwrap().email, None);
    }
}
