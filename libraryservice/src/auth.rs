use std::sync::Arc;

use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::web::{self, Data};
use actix_web::{FromRequest, HttpRequest};
use chrono::{Duration, Utc};
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use paperclip::actix::Apiv2Security;
use serde::{Deserialize, Serialize};

use crate::api::{UserDetails, UserId, UserProfile, UserRole};
use crate::error::ApiError;
use crate::settings::{AuthSettings, BootstrapAdmin};
use crate::users_repository::{UserRecord, UsersRepository, UsersRepositoryError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: UserId,
    pub role: UserRole,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies bearer tokens and hashes passwords
pub struct Authenticator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl: Duration,
    bcrypt_cost: u32,
    min_password_length: usize,
    student_email_domain: String,
}

impl Authenticator {
    pub fn new(settings: &AuthSettings) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(settings.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.jwt_secret.as_bytes()),
            token_ttl: Duration::days(settings.token_ttl_days),
            bcrypt_cost: settings.bcrypt_cost,
            min_password_length: settings.min_password_length,
            student_email_domain: settings.student_email_domain.clone(),
        }
    }

    pub fn issue_token(&self, user_id: UserId, role: UserRole) -> Result<String, ApiError> {
        let issued_at = Utc::now();
        let claims = Claims {
            sub: user_id,
            role,
            iat: issued_at.timestamp(),
            exp: (issued_at + self.token_ttl).timestamp(),
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(ApiError::internal)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
    }

    pub fn check_password_strength(&self, password: &str) -> Result<(), ApiError> {
        if password.chars().count() < self.min_password_length {
            return Err(ApiError::BadRequest(format!(
                "Password must be at least {} characters",
                self.min_password_length
            )));
        }
        Ok(())
    }

    /// Hashes on the blocking pool, bcrypt is deliberately slow
    pub async fn hash_password(&self, password: String) -> Result<String, ApiError> {
        let cost = self.bcrypt_cost;
        web::block(move || bcrypt::hash(password, cost))
            .await
            .map_err(ApiError::internal)?
            .map_err(ApiError::internal)
    }

    pub async fn verify_password(&self, password: String, hash: String) -> Result<bool, ApiError> {
        web::block(move || bcrypt::verify(password, &hash))
            .await
            .map_err(ApiError::internal)?
            .map_err(ApiError::internal)
    }

    /// Maps an 8 digit student id (MSSV) to its institutional email, normalizes anything else
    pub fn resolve_login_email(&self, identifier: &str) -> String {
        let identifier = identifier.trim();
        if identifier.len() == 8 && identifier.bytes().all(|b| b.is_ascii_digit()) {
            format!("{}@{}", identifier, self.student_email_domain)
        } else {
            normalize_email(identifier)
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Creates the configured admin account unless its email is already registered
pub async fn ensure_admin(
    users: &dyn UsersRepository,
    authenticator: &Authenticator,
    admin: &BootstrapAdmin,
) -> anyhow::Result<UserId> {
    let email = normalize_email(&admin.email);
    if let Some((user_id, _)) = users.find_user_by_email(&email).await? {
        tracing::info!(user_id, "Admin account already present");
        return Ok(user_id);
    }

    let password_hash = authenticator.hash_password(admin.password.clone()).await?;
    let user_id = users
        .add_user(UserRecord {
            details: UserDetails {
                name: admin.name.clone(),
                email,
                role: UserRole::Admin,
                student_code: None,
            },
            password_hash,
        })
        .await?;
    tracing::info!(user_id, "Admin account created");
    Ok(user_id)
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Account resolved from the `Authorization: Bearer` header
#[derive(Debug, Clone, Apiv2Security)]
#[openapi(
    apiKey,
    in = "header",
    name = "Authorization",
    description = "Use format 'Bearer TOKEN'"
)]
pub struct AuthenticatedUser {
    pub id: UserId,
    pub details: UserDetails,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.details.role == UserRole::Admin
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Not authorized as admin".to_string()))
        }
    }

    pub fn require_self_or_admin(&self, user_id: UserId) -> Result<(), ApiError> {
        if self.id == user_id || self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Forbidden".to_string()))
        }
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile::new(self.id, self.details.clone())
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let token = bearer_token(req);
        let authenticator = req.app_data::<Data<Authenticator>>().cloned();
        let users = req
            .app_data::<Data<Arc<dyn UsersRepository>>>()
            .cloned();

        Box::pin(async move {
            let (Some(authenticator), Some(users)) = (authenticator, users) else {
                return Err(ApiError::internal(anyhow::anyhow!(
                    "Authentication is not configured"
                )));
            };
            let token =
                token.ok_or_else(|| ApiError::Unauthorized("Not authorized, no token".to_string()))?;
            let claims = authenticator.verify_token(&token).map_err(|err| {
                tracing::debug!("Token verification failed {}", err);
                ApiError::Unauthorized("Not authorized, token failed".to_string())
            })?;
            let user = users.get_user(claims.sub).await.map_err(|err| match err {
                UsersRepositoryError::UserNotFound(_) => {
                    ApiError::Unauthorized("Invalid user".to_string())
                }
                other => other.into(),
            })?;
            Ok(AuthenticatedUser {
                id: claims.sub,
                details: user.details,
            })
        })
    }
}
