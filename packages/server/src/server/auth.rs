//! JWT bearer authentication.

use anyhow::Result;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::server::error::ApiError;

/// JWT Claims - data stored in the token
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // Subject (user_id as string)
    pub user_id: Uuid,
    pub exp: i64, // Expiration timestamp
    pub iat: i64, // Issued at timestamp
    pub iss: String,
    pub jti: String, // JWT ID (unique token identifier)
}

/// JWT Service - creates and verifies JWT tokens
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl JwtService {
    /// Create new JWT service with secret and issuer
    pub fn new(secret: &str, issuer: String) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
        }
    }

    /// Create a new JWT token for a user
    ///
    /// Token expires after 24 hours
    pub fn create_token(&self, user_id: Uuid) -> Result<String> {
        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::hours(24);

        let claims = Claims {
            sub: user_id.to_string(),
            user_id,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(Into::into)
    }

    /// Verify and decode a JWT token
    ///
    /// Returns claims if token is valid and not expired
    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(Into::into)
    }
}

/// Authenticated user information from a verified JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
}

/// Extract and verify the bearer token from request headers
pub fn extract_auth_user(headers: &axum::http::HeaderMap, jwt_service: &JwtService) -> Option<AuthUser> {
    let auth_header = headers.get("authorization")?;
    let auth_str = auth_header.to_str().ok()?;

    // Handle both "Bearer <token>" and raw token
    let token = auth_str.strip_prefix("Bearer ").unwrap_or(auth_str);

    let claims = jwt_service.verify_token(token).ok()?;
    debug!(user_id = %claims.user_id, "authenticated request");

    Some(AuthUser {
        user_id: claims.user_id,
    })
}

/// JWT authentication middleware
///
/// Verifies the Authorization header and adds [`AuthUser`] to request
/// extensions. Requests without a valid token continue unauthenticated;
/// protected handlers reject them via the [`AuthUser`] extractor.
pub async fn jwt_auth_middleware(
    jwt_service: std::sync::Arc<JwtService>,
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    if let Some(user) = extract_auth_user(request.headers(), &jwt_service) {
        request.extensions_mut().insert(user);
    }
    next.run(request).await
}

// Handlers take `AuthUser` as an argument; requests without a valid token
// get the uniform 401 envelope.
#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("valid bearer token required".to_string()))
    }
}
