use axum::extract::State;
use axum::Json;
use uuid::Uuid;

use pavilion_core::{CoreResult, CredentialSet};

use crate::auth::jwt;
use crate::auth::middleware::AuthUser;
use crate::dto::*;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::{Role, User};

fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<(), AppError> {
    let valid = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
    });
    if !valid {
        return Err(AppError::Invalid("Invalid email address".to_string()));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), AppError> {
    if password.len() < 8 {
        return Err(AppError::Invalid(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    Ok(())
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let email = normalize_email(&body.email);
    validate_email(&email)?;

    let password = body.password.trim().to_string();
    validate_password(&password)?;

    let first_name = body.first_name.trim().to_string();
    let last_name = body.last_name.trim().to_string();
    if first_name.is_empty() || last_name.is_empty() {
        return Err(AppError::Invalid("Name is required".to_string()));
    }

    if state.users.find_by_email(&email).await.is_some() {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    // Argon2 work stays off the request-serving path.
    let clock = state.clock.clone();
    let mut credentials =
        tokio::task::spawn_blocking(move || CredentialSet::from_password(&password, clock.as_ref()))
            .await
            .map_err(|e| AppError::Internal(e.to_string()))??;

    let code = credentials.issue_verification_code(state.clock.as_ref());

    let now = state.clock.now();
    let user = User {
        id: Uuid::new_v4(),
        email: email.clone(),
        first_name,
        last_name,
        role: Role::User,
        is_verified: false,
        credentials,
        created_at: now,
        updated_at: now,
    };
    state.users.insert(user).await?;

    // The code itself leaves the process out-of-band.
    tracing::info!("Verification code issued for new account: {email}");
    tracing::debug!("Out-of-band delivery for {email}: verification code {code}");

    Ok(Json(MessageResponse {
        message: "Registration successful. Check your email for a verification code.".to_string(),
    }))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Json(body): Json<VerifyEmailRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let email = normalize_email(&body.email);
    let code = body.code.trim();

    let invalid = || AppError::Invalid("Invalid or expired verification code".to_string());

    let mut user = state.users.find_by_email(&email).await.ok_or_else(invalid)?;

    if !user
        .credentials
        .consume_verification_code(code, state.clock.as_ref())
    {
        tracing::warn!("Invalid or expired verification code for user: {email}");
        return Err(invalid());
    }

    // The consumed code and the flag it authorized land in one update.
    user.is_verified = true;
    state
        .users
        .update(user)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    tracing::info!("Email verified successfully for user: {email}");

    Ok(Json(MessageResponse {
        message: "Email verified successfully".to_string(),
    }))
}

pub async fn signin(
    State(state): State<AppState>,
    Json(body): Json<SigninRequest>,
) -> Result<Json<SigninResponse>, AppError> {
    let email = normalize_email(&body.email);
    let password = body.password.trim().to_string();

    let user = state.users.find_by_email(&email).await.ok_or_else(|| {
        tracing::warn!("Sign-in attempt for unknown email");
        AppError::Auth("Invalid credentials".to_string())
    })?;

    let credentials = user.credentials.clone();
    let valid = tokio::task::spawn_blocking(move || credentials.verify_password(&password))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    if !valid {
        tracing::warn!("Failed sign-in attempt for user: {email}");
        return Err(AppError::Auth("Invalid credentials".to_string()));
    }

    let (token, expires_at) = jwt::create_token(
        &state.config.auth.jwt_secret,
        state.config.auth.jwt_ttl_hours,
        &user,
    )?;

    tracing::info!("Sign-in successful for user: {email}");

    Ok(Json(SigninResponse { token, expires_at }))
}

pub async fn forgot_password(
    State(state): State<AppState>,
    Json(body): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let email = normalize_email(&body.email);

    // Same response whether or not the account exists.
    if let Some(mut user) = state.users.find_by_email(&email).await {
        let raw_token = user.credentials.issue_reset_token(state.clock.as_ref());
        state
            .users
            .update(user)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        tracing::info!("Reset token issued for user: {email}");
        tracing::debug!("Out-of-band delivery for {email}: reset token {raw_token}");
    } else {
        tracing::debug!("Password reset requested for unknown email");
    }

    Ok(Json(MessageResponse {
        message: "If that account exists, a reset link has been sent.".to_string(),
    }))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let email = normalize_email(&body.email);
    let token = body.token.trim().to_string();
    let new_password = body.new_password.trim().to_string();
    validate_password(&new_password)?;

    let invalid = || AppError::Invalid("Invalid or expired reset token".to_string());

    let mut user = state.users.find_by_email(&email).await.ok_or_else(invalid)?;

    if !user
        .credentials
        .consume_reset_token(&token, state.clock.as_ref())
    {
        tracing::warn!("Invalid or expired reset token for user: {email}");
        return Err(invalid());
    }

    let clock = state.clock.clone();
    let mut credentials = user.credentials.clone();
    let credentials = tokio::task::spawn_blocking(move || -> CoreResult<CredentialSet> {
        credentials.set_password(&new_password, clock.as_ref())?;
        Ok(credentials)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    // Cleared token and new hash persist together; a replayed token finds
    // nothing to match.
    user.credentials = credentials;
    state
        .users
        .update(user)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    tracing::info!("Password reset successfully for user: {email}");

    Ok(Json(MessageResponse {
        message: "Password reset successfully".to_string(),
    }))
}

/// Returns the current user record, not just the token claims, so clients
/// see verification status changes without re-authenticating.
pub async fn me(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<MeResponse>, AppError> {
    let id = Uuid::parse_str(&user.user_id)
        .map_err(|_| AppError::Auth("Invalid token subject".to_string()))?;

    let record = state
        .users
        .find_by_id(id)
        .await
        .ok_or_else(|| AppError::Auth("Account no longer exists".to_string()))?;

    tracing::debug!("Profile fetch for user: {}", user.email);

    Ok(Json(MeResponse {
        user_id: user.user_id,
        email: record.email,
        role: record.role,
        first_name: record.first_name,
        last_name: record.last_name,
        is_verified: record.is_verified,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_lowercased_and_trimmed() {
        assert_eq!(normalize_email("  Mara@Example.COM "), "mara@example.com");
    }

    #[test]
    fn email_validation_rejects_junk() {
        assert!(validate_email("mara@example.com").is_ok());
        assert!(validate_email("mara@example").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("mara").is_err());
        assert!(validate_email("").is_err());
    }

    #[test]
    fn password_validation_enforces_minimum_length() {
        assert!(validate_password("12345678").is_ok());
        assert!(validate_password("1234567").is_err());
    }
}
