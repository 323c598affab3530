//! Caller identity extraction.
//!
//! Tokens are HS256 JWTs issued by the user service and signed with
//! `JWT_SECRET`. They are accepted from `Authorization: Bearer <token>` or,
//! for links opened from the web front end, the `token` query parameter.

use crate::errors::AppError;
use crate::handlers::AppState;
use crate::models::CallerIdentity;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

const MAX_CPF_LEN: usize = 20;
const MAX_TEXT_CLAIM_LEN: usize = 255;

/// Claims carried by user tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub cpf: String,
    pub name: String,
    #[serde(default)]
    pub lotacao: String,
    pub exp: usize,
}

/// Extractor for the authenticated caller.
pub struct Caller(pub CallerIdentity);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = token_from_parts(parts)
            .ok_or_else(|| AppError::Unauthorized("Missing token".to_string()))?;

        let identity = decode_caller(&token, &state.config.jwt_secret)?;
        tracing::debug!("Authenticated caller {}", identity.document);

        Ok(Caller(identity))
    }
}

/// Bearer header first, then the `token` query parameter.
fn token_from_parts(parts: &Parts) -> Option<String> {
    let from_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    from_header.or_else(|| {
        parts.uri.query().and_then(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == "token")
                .map(|(_, value)| value.into_owned())
                .filter(|t| !t.is_empty())
        })
    })
}

/// Verifies `token` and maps its claims to a [`CallerIdentity`].
pub fn decode_caller(token: &str, secret: &str) -> Result<CallerIdentity, AppError> {
    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))?;

    let claims = data.claims;
    if claims.cpf.trim().is_empty() {
        return Err(AppError::Unauthorized("Token without cpf claim".to_string()));
    }
    // Claims are copied into the audit columns of every stored request.
    if claims.cpf.chars().count() > MAX_CPF_LEN
        || claims.name.chars().count() > MAX_TEXT_CLAIM_LEN
        || claims.lotacao.chars().count() > MAX_TEXT_CLAIM_LEN
    {
        return Err(AppError::Unauthorized("Token claims too long".to_string()));
    }

    Ok(CallerIdentity {
        document: claims.cpf,
        name: claims.name,
        unit: claims.lotacao,
        token_fingerprint: token_fingerprint(token),
    })
}

/// SHA-256 hex digest of the raw token; the token itself is never stored.
pub fn token_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn token(cpf: &str, exp: usize) -> String {
        let claims = Claims {
            cpf: cpf.into(),
            name: "Analista".into(),
            lotacao: "DRACO".into(),
            exp,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn far_future() -> usize {
        (chrono::Utc::now().timestamp() + 3600) as usize
    }

    #[test]
    fn test_decode_valid_token() {
        let raw = token("12345678901", far_future());
        let caller = decode_caller(&raw, SECRET).unwrap();
        assert_eq!(caller.document, "12345678901");
        assert_eq!(caller.unit, "DRACO");
        assert_eq!(caller.token_fingerprint.len(), 64);
        assert_ne!(caller.token_fingerprint, raw);
    }

    #[test]
    fn test_rejects_wrong_secret_and_expired() {
        let raw = token("12345678901", far_future());
        assert!(matches!(
            decode_caller(&raw, "other"),
            Err(AppError::Unauthorized(_))
        ));

        let expired = token("12345678901", 1_000_000);
        assert!(decode_caller(&expired, SECRET).is_err());
    }

    #[test]
    fn test_rejects_blank_cpf() {
        let raw = token("  ", far_future());
        assert!(decode_caller(&raw, SECRET).is_err());
    }

    #[test]
    fn test_rejects_claims_wider_than_audit_columns() {
        let raw = token(&"1".repeat(21), far_future());
        assert!(matches!(
            decode_caller(&raw, SECRET),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_token_sources() {
        let (parts, _) = Request::builder()
            .uri("/api/bacen/ccs/requisicoesccs")
            .header(AUTHORIZATION, "Bearer abc.def.ghi")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(token_from_parts(&parts).as_deref(), Some("abc.def.ghi"));

        let (parts, _) = Request::builder()
            .uri("/api/bacen/ccs/detalhamento?idRelacionamento=3&token=xyz%2E1")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(token_from_parts(&parts).as_deref(), Some("xyz.1"));

        let (parts, _) = Request::builder()
            .uri("/api/bacen/ccs/requisicoesccs")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(token_from_parts(&parts), None);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(token_fingerprint("a"), token_fingerprint("a"));
        assert_ne!(token_fingerprint("a"), token_fingerprint("b"));
    }
}
