use std::sync::Arc;

use actix_web::web::Data;
use actix_web::{Error, HttpResponse};
use paperclip::actix::{api_v2_operation, web};

use crate::api::{
    AuthResponse, LoginRequest, ProfileUpdate, RegisterRequest, UserDetails, UserProfile, UserRole,
};
use crate::auth::{normalize_email, AuthenticatedUser, Authenticator};
use crate::error::ApiError;
use crate::users_repository::{UserRecord, UsersRepository};

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[api_v2_operation]
/// Creates a student account and signs it in
pub async fn register(
    authenticator: Data<Authenticator>,
    users: Data<Arc<dyn UsersRepository>>,
    request: web::Json<RegisterRequest>,
) -> Result<HttpResponse, Error> {
    let request = request.into_inner();
    let (Some(name), Some(email)) = (non_blank(&request.name), non_blank(&request.email)) else {
        return Err(ApiError::BadRequest("Name and email are required".to_string()).into());
    };
    authenticator.check_password_strength(&request.password)?;

    let details = UserDetails {
        name,
        email: normalize_email(&email),
        role: UserRole::Student,
        student_code: request.student_code.as_deref().and_then(non_blank),
    };
    let password_hash = authenticator.hash_password(request.password).await?;
    let user_id = users
        .add_user(UserRecord {
            details: details.clone(),
            password_hash,
        })
        .await
        .map_err(ApiError::from)?;
    tracing::info!(user_id, "User registered");

    let token = authenticator.issue_token(user_id, details.role)?;
    Ok(HttpResponse::Created().json(AuthResponse {
        token,
        user: UserProfile::new(user_id, details),
    }))
}

#[api_v2_operation]
/// Accepts an email or an 8 digit student id together with the password
pub async fn login(
    authenticator: Data<Authenticator>,
    users: Data<Arc<dyn UsersRepository>>,
    request: web::Json<LoginRequest>,
) -> Result<HttpResponse, Error> {
    let request = request.into_inner();
    let invalid_credentials = || ApiError::Unauthorized("Invalid email or password".to_string());

    let email = authenticator.resolve_login_email(&request.email);
    let (user_id, user) = users
        .find_user_by_email(&email)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(invalid_credentials)?;
    if !authenticator
        .verify_password(request.password, user.password_hash)
        .await?
    {
        tracing::debug!(user_id, "Login rejected");
        return Err(invalid_credentials().into());
    }

    let token = authenticator.issue_token(user_id, user.details.role)?;
    Ok(HttpResponse::Ok().json(AuthResponse {
        token,
        user: UserProfile::new(user_id, user.details),
    }))
}

#[api_v2_operation]
pub async fn get_profile(user: AuthenticatedUser) -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().json(user.profile()))
}

#[api_v2_operation]
/// Changes the display name and/or the password. Email and role are fixed
pub async fn update_profile(
    user: AuthenticatedUser,
    authenticator: Data<Authenticator>,
    users: Data<Arc<dyn UsersRepository>>,
    update: web::Json<ProfileUpdate>,
) -> Result<HttpResponse, Error> {
    let update = update.into_inner();
    let mut record = users.get_user(user.id).await.map_err(ApiError::from)?;

    if let Some(name) = update.name {
        record.details.name = non_blank(&name)
            .ok_or_else(|| ApiError::BadRequest("Name cannot be empty".to_string()))?;
    }

    if let Some(new_password) = update.new_password {
        let current_password = update.current_password.ok_or_else(|| {
            ApiError::BadRequest("Current password is required".to_string())
        })?;
        if !authenticator
            .verify_password(current_password, record.password_hash.clone())
            .await?
        {
            return Err(ApiError::BadRequest("Current password is incorrect".to_string()).into());
        }
        authenticator.check_password_strength(&new_password)?;
        record.password_hash = authenticator.hash_password(new_password).await?;
    }

    users
        .update_user(user.id, record.clone())
        .await
        .map_err(ApiError::from)?;
    tracing::info!(user_id = user.id, "Profile updated");

    Ok(HttpResponse::Ok().json(UserProfile::new(user.id, record.details)))
}

#[api_v2_operation]
pub async fn list_users(
    user: AuthenticatedUser,
    users: Data<Arc<dyn UsersRepository>>,
) -> Result<HttpResponse, Error> {
    user.require_admin()?;
    let profiles: Vec<UserProfile> = users
        .list_users()
        .await
        .map_err(ApiError::from)?
        .into_iter()
        .map(|(id, details)| UserProfile::new(id, details))
        .collect();
    Ok(HttpResponse::Ok().json(profiles))
}
