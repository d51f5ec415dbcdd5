//! Endpoints AJAX do painel do médico
//!
//! Respondem sempre em JSON no envelope `{status, message, ...}`; não usam
//! mensagens flash nem alteram a sessão.

use crate::error::AjaxError;
use crate::forms::AppointmentActionForm;
use crate::session::RequestContext;
use crate::state::AppState;
use axum::{
    extract::{rejection::FormRejection, State},
    routing::{get, post},
    Form, Json, Router,
};
use hospital_db::lifecycle;
use hospital_db::models::AppointmentStatus;
use hospital_db::repository::{appointments, patients, AppointmentOwner};
use serde_json::{json, Value};

type AjaxResult = Result<Json<Value>, AjaxError>;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/doctor/ajax/approve-appointment/", post(approve))
        .route("/doctor/ajax/complete-appointment/", post(complete))
        .route("/doctor/ajax/reject-appointment/", post(reject))
        .route("/doctor/ajax/get-appointments/", get(list_appointments))
        .route("/doctor/ajax/get-statistics/", get(statistics))
}

fn session_doctor(ctx: &RequestContext) -> Result<i64, AjaxError> {
    ctx.doctor_id().ok_or_else(AjaxError::unauthorized)
}

async fn approve(
    State(state): State<AppState>,
    ctx: RequestContext,
    form: Result<Form<AppointmentActionForm>, FormRejection>,
) -> AjaxResult {
    change_status(&state, &ctx, form, AppointmentStatus::Approved).await
}

async fn complete(
    State(state): State<AppState>,
    ctx: RequestContext,
    form: Result<Form<AppointmentActionForm>, FormRejection>,
) -> AjaxResult {
    change_status(&state, &ctx, form, AppointmentStatus::Completed).await
}

async fn reject(
    State(state): State<AppState>,
    ctx: RequestContext,
    form: Result<Form<AppointmentActionForm>, FormRejection>,
) -> AjaxResult {
    change_status(&state, &ctx, form, AppointmentStatus::Cancelled).await
}

async fn change_status(
    state: &AppState,
    ctx: &RequestContext,
    form: Result<Form<AppointmentActionForm>, FormRejection>,
    target: AppointmentStatus,
) -> AjaxResult {
    let doctor_id = session_doctor(ctx)?;
    let Form(form) =
        form.map_err(|_| AjaxError::BadRequest("A valid appointment_id is required".to_string()))?;

    let appointment =
        lifecycle::transition(&state.pool, form.appointment_id, doctor_id, target).await?;
    let patient = patients::find(&state.pool, appointment.patient_id)
        .await?
        .map(|p| p.name)
        .unwrap_or_default();

    let message = match target {
        AppointmentStatus::Approved => format!("Appointment for {patient} approved!"),
        AppointmentStatus::Completed => format!("Appointment for {patient} marked as completed!"),
        _ => format!("Appointment for {patient} rejected."),
    };

    Ok(Json(json!({
        "status": "success",
        "message": message,
        "appointment_id": appointment.id,
        "new_status": appointment.status,
    })))
}

async fn list_appointments(State(state): State<AppState>, ctx: RequestContext) -> AjaxResult {
    let doctor_id = session_doctor(&ctx)?;
    let owned = appointments::list_for(&state.pool, AppointmentOwner::Doctor(doctor_id)).await?;

    let mut items = Vec::with_capacity(owned.len());
    for appointment in owned {
        let patient = patients::find(&state.pool, appointment.patient_id).await?;
        items.push(json!({
            "id": appointment.id,
            "patient_name": patient.map(|p| p.name).unwrap_or_default(),
            "service": appointment.service,
            "date": appointment.date,
            "time": appointment.time,
            "status": appointment.status,
            "notes": appointment.notes,
        }));
    }

    Ok(Json(json!({ "status": "success", "appointments": items })))
}

async fn statistics(State(state): State<AppState>, ctx: RequestContext) -> AjaxResult {
    let doctor_id = session_doctor(&ctx)?;
    let stats = appointments::statistics(&state.pool, doctor_id).await?;
    Ok(Json(json!({ "status": "success", "statistics": stats })))
}
