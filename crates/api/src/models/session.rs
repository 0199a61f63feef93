//! Session-related types.
//!
//! The authenticated principal carried by bearer tokens, and the keys used for
//! the short-lived server-side session that holds OAuth state.

use serde::{Deserialize, Serialize};

use dongne_core::{Role, UserId};

/// The verified identity behind a request.
///
/// Produced only by token verification; handlers receive it through the
/// [`RequireAuth`](crate::middleware::RequireAuth) extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// User's database ID.
    pub id: UserId,
    /// Role recorded in the token at issuance.
    pub role: Role,
}

/// Session keys for OAuth login state.
pub mod keys {
    /// Random `state` value sent with the authorization redirect.
    pub const OAUTH_STATE: &str = "oauth_state";

    /// Provider tag the pending `state` was issued for.
    pub const OAUTH_PROVIDER: &str = "oauth_provider";
}
