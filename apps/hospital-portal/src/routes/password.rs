//! Redefinição de senha simplificada
//!
//! O token fica na sessão de quem pediu, indexado pelo perfil e pelo e-mail,
//! e o link de redefinição volta no próprio corpo da resposta. Nenhum e-mail
//! é enviado; o token vive enquanto a sessão não expirar.

use super::see_other;
use crate::error::{AppError, Role};
use crate::forms::{self, PasswordResetConfirmForm, PasswordResetRequestForm};
use crate::log::AUTHENTICATION;
use crate::session::RequestContext;
use crate::state::AppState;
use axum::{
    extract::{rejection::FormRejection, State},
    response::{IntoResponse, Response},
    routing::post,
    Form, Json, Router,
};
use hospital_db::crypto::{generate_url_token, hash_password};
use hospital_db::error::DbResult;
use hospital_db::repository::{doctors, patients};
use serde_json::json;
use sqlx::SqlitePool;
use tracing::info;

const UNKNOWN_ACCOUNT: &str = "No account found with that email address.";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/doctor/password-reset/", post(doctor_request))
        .route("/doctor/password-reset/confirm/", post(doctor_confirm))
        .route("/patient/password-reset/", post(patient_request))
        .route("/patient/password-reset/confirm/", post(patient_confirm))
}

async fn account_exists(pool: &SqlitePool, role: Role, email: &str) -> DbResult<bool> {
    match role {
        Role::Doctor => doctors::email_exists(pool, email).await,
        Role::Patient => patients::email_exists(pool, email).await,
    }
}

async fn set_password(pool: &SqlitePool, role: Role, email: &str, hash: &str) -> DbResult<bool> {
    match role {
        Role::Doctor => doctors::update_password(pool, email, hash).await,
        Role::Patient => patients::update_password(pool, email, hash).await,
    }
}

async fn doctor_request(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    form: Result<Form<PasswordResetRequestForm>, FormRejection>,
) -> Response {
    let result = request_reset(&state, &mut ctx, Role::Doctor, form).await;
    ctx.commit(&state.sessions, result).await
}

async fn patient_request(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    form: Result<Form<PasswordResetRequestForm>, FormRejection>,
) -> Response {
    let result = request_reset(&state, &mut ctx, Role::Patient, form).await;
    ctx.commit(&state.sessions, result).await
}

async fn request_reset(
    state: &AppState,
    ctx: &mut RequestContext,
    role: Role,
    form: Result<Form<PasswordResetRequestForm>, FormRejection>,
) -> Result<Response, AppError> {
    let form: PasswordResetRequestForm = forms::extract_valid(form)?;
    if !account_exists(&state.pool, role, &form.email).await? {
        return Err(AppError::NotFound(UNKNOWN_ACCOUNT.to_string()));
    }

    let token = generate_url_token();
    let reset_url = state.url(&format!("{}?token={token}", role.reset_confirm_path()));
    ctx.store_reset_token(role, &form.email, token);

    info!(target: AUTHENTICATION, ?role, "Token de redefinição de senha gerado");
    Ok(Json(json!({
        "status": "success",
        "message": "Password reset link generated.",
        "reset_url": reset_url,
    }))
    .into_response())
}

async fn doctor_confirm(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    form: Result<Form<PasswordResetConfirmForm>, FormRejection>,
) -> Response {
    let result = confirm_reset(&state, &mut ctx, Role::Doctor, form).await;
    ctx.commit(&state.sessions, result).await
}

async fn patient_confirm(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    form: Result<Form<PasswordResetConfirmForm>, FormRejection>,
) -> Response {
    let result = confirm_reset(&state, &mut ctx, Role::Patient, form).await;
    ctx.commit(&state.sessions, result).await
}

async fn confirm_reset(
    state: &AppState,
    ctx: &mut RequestContext,
    role: Role,
    form: Result<Form<PasswordResetConfirmForm>, FormRejection>,
) -> Result<Response, AppError> {
    let form: PasswordResetConfirmForm = forms::extract_valid(form)?;
    if ctx.reset_token_for(role, &form.email) != Some(form.token.as_str()) {
        return Err(AppError::field("token", "Invalid or expired reset token."));
    }

    let hash = hash_password(&form.password)?;
    if !set_password(&state.pool, role, &form.email, &hash).await? {
        return Err(AppError::NotFound(UNKNOWN_ACCOUNT.to_string()));
    }

    ctx.clear_reset_token(role, &form.email);
    info!(target: AUTHENTICATION, ?role, "Senha redefinida");
    ctx.success("Your password has been reset. Please login.");
    Ok(see_other(role.login_path()))
}
