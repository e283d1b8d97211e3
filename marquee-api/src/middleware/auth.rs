use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use marquee_shared::HolderId;
use serde::{Deserialize, Serialize};

use crate::state::{AppState, AuthConfig};

/// The only role this service issues and accepts
pub const ROLE_GUEST: &str = "GUEST";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HolderClaims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

impl HolderClaims {
    /// Leases are held in the name of the token subject
    pub fn holder(&self) -> HolderId {
        HolderId::new(self.sub.clone())
    }
}

pub fn issue_token(auth: &AuthConfig, claims: &HolderClaims) -> Result<String, jsonwebtoken::errors::Error> {
    encode(&Header::default(), claims, &EncodingKey::from_secret(auth.secret.as_bytes()))
}

pub async fn holder_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token_data = decode::<HolderClaims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    if token_data.claims.role != ROLE_GUEST {
        return Err(StatusCode::FORBIDDEN);
    }
    if token_data.claims.sub.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    req.extensions_mut().insert(token_data.claims);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issued_token_decodes() {
        let auth = AuthConfig {
            secret: "test-secret".to_string(),
            expiration: 60,
        };
        let claims = HolderClaims {
            sub: "guest-1".to_string(),
            role: ROLE_GUEST.to_string(),
            exp: (chrono::Utc::now().timestamp() + 60) as usize,
        };

        let token = issue_token(&auth, &claims).unwrap();
        let decoded = decode::<HolderClaims>(
            &token,
            &DecodingKey::from_secret(b"test-secret"),
            &Validation::default(),
        )
        .unwrap();
        assert_eq!(decoded.claims.holder().as_str(), "guest-1");

        let wrong = decode::<HolderClaims>(&token, &DecodingKey::from_secret(b"other"), &Validation::default());
        assert!(wrong.is_err());
    }
}
