//! Rotas HTTP do portal
//!
//! Rotas de formulário respondem com `303 See Other` e registram mensagens
//! flash na sessão; páginas GET devolvem o modelo de visão em JSON.

mod ajax;
mod doctors;
mod medicines;
mod password;
mod patients;

use crate::built_info;
use crate::error::{AppError, Role};
use crate::session::RequestContext;
use crate::state::AppState;
use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use hospital_db::repository::patients as patient_repo;
use serde_json::json;
use sqlx::SqlitePool;

pub(crate) const EMAIL_TAKEN: &str = "This email is already registered.";
pub(crate) const INVALID_CREDENTIALS: &str = "Invalid email or password.";
pub(crate) const LOGIN_FIRST: &str = "Please login first.";
pub(crate) const REGISTERED: &str = "Registration successful! Please login.";
pub(crate) const ACCOUNT_DELETED: &str = "Your account has been deleted.";
pub(crate) const LOGGED_OUT: &str = "You have been logged out successfully.";
pub(crate) const PROFILE_UPDATED: &str = "Profile updated successfully!";
pub(crate) const APPOINTMENT_DELETED: &str = "Appointment deleted successfully!";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .merge(doctors::router())
        .merge(ajax::router())
        .merge(patients::router())
        .merge(medicines::router())
        .merge(password::router())
}

pub(crate) fn see_other(path: &str) -> Response {
    Redirect::to(path).into_response()
}

pub(crate) fn require_doctor(ctx: &RequestContext) -> Result<i64, AppError> {
    ctx.doctor_id().ok_or(AppError::LoginRequired(Role::Doctor))
}

pub(crate) fn require_patient(ctx: &RequestContext) -> Result<i64, AppError> {
    ctx.patient_id().ok_or(AppError::LoginRequired(Role::Patient))
}

/// Nome do paciente para as mensagens; vazio se o registro sumiu
pub(crate) async fn patient_name(pool: &SqlitePool, patient_id: i64) -> Result<String, AppError> {
    let patient = patient_repo::find(pool, patient_id).await?;
    Ok(patient.map(|p| p.name).unwrap_or_default())
}

async fn index(State(state): State<AppState>, mut ctx: RequestContext) -> Response {
    let messages = ctx.take_flashes();
    let body = Json(json!({
        "name": built_info::PKG_NAME,
        "user": ctx.identity(),
        "messages": messages,
        "links": {
            "doctor_login": Role::Doctor.login_path(),
            "doctor_register": "/doctor/register/",
            "patient_login": Role::Patient.login_path(),
            "patient_register": "/patient/register/",
            "medicines": "/medicines/",
        },
    }));
    ctx.commit(&state.sessions, body).await
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": built_info::PKG_VERSION,
    }))
}
