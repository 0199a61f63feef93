//! Naver Login.

use serde::Deserialize;

use super::{FederatedProfile, Provider, ProviderEndpoints};

const SUCCESS_CODE: &str = "00";

pub(super) fn endpoints() -> ProviderEndpoints {
    ProviderEndpoints {
        authorize_url: "https://nid.naver.com/oauth2.0/authorize".to_owned(),
        token_url: "https://nid.naver.com/oauth2.0/token".to_owned(),
        profile_url: "https://openapi.naver.com/v1/nid/me".to_owned(),
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    resultcode: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    response: Option<NaverUser>,
}

#[derive(Debug, Deserialize)]
struct NaverUser {
    id: String,
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

pub(super) fn parse_profile(body: &[u8]) -> Result<FederatedProfile, String> {
    let envelope: Envelope =
        serde_json::from_slice(body).map_err(|e| format!("malformed naver profile: {e}"))?;

    if envelope.resultcode != SUCCESS_CODE {
        return Err(format!(
            "naver returned {}: {}",
            envelope.resultcode,
            envelope.message.unwrap_or_default()
        ));
    }

    let user = envelope
        .response
        .ok_or_else(|| "naver profile has no response body".to_owned())?;

    // Naver reports no verification status for `email`, so it is never
    // used for account linking.
    Ok(FederatedProfile {
        provider: Provider::Naver,
        external_id: user.id,
        email: None,
        display_name: user.nickname.or(user.name),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success() {
        let body = br#"{
            "resultcode": "00",
            "message": "success",
            "response": { "id": "nv-1", "email": "lee@naver.test", "name": "Lee" }
        }"#;
        let profile = parse_profile(body).unwrap();
        assert_eq!(profile.provider, Provider::Naver);
        assert_eq!(profile.external_id, "nv-1");
        assert_eq!(profile.email, None);
        assert_eq!(profile.display_name.as_deref(), Some("Lee"));
    }

    #[test]
    fn test_error_resultcode() {
        let body = br#"{"resultcode": "024", "message": "Authentication failed"}"#;
        let err = parse_profile(body).unwrap_err();
        assert!(err.contains("024"));
    }
}
