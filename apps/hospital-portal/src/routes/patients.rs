//! Rotas do paciente: conta, painel e agendamento

use super::{
    require_patient, see_other, ACCOUNT_DELETED, APPOINTMENT_DELETED, EMAIL_TAKEN,
    INVALID_CREDENTIALS, LOGGED_OUT, LOGIN_FIRST, PROFILE_UPDATED, REGISTERED,
};
use crate::error::{AppError, Role};
use crate::forms::{self, AppointmentForm, LoginForm, PatientProfileForm, PatientRegistrationForm};
use crate::log::AUTHENTICATION;
use crate::session::{Identity, RequestContext};
use crate::state::AppState;
use axum::{
    extract::{rejection::FormRejection, Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use hospital_db::crypto::{hash_password, verify_password};
use hospital_db::lifecycle::{self, Actor, LifecycleError};
use hospital_db::models::{Appointment, Doctor, NewPatient, PrescribedMedicine, Service};
use hospital_db::repository::{appointments, doctors, patients, prescriptions, AppointmentOwner};
use hospital_db::DbError;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

const INVALID_DOCTOR: &str = "Select a valid doctor.";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/patient/register/", get(register_page).post(register))
        .route("/patient/login/", get(login_page).post(login))
        .route("/patient/dashboard/", get(dashboard))
        .route("/patient/book/", post(book))
        .route("/patient/update-appointment/:id/", post(update_appointment))
        .route("/patient/delete-appointment/:id/", post(delete_appointment))
        .route("/patient/cancel-appointment/:id/", post(cancel_appointment))
        .route("/patient/update-profile/", post(update_profile))
        .route("/patient/delete-account/", post(delete_account))
        .route("/patient/logout/", post(logout))
}

#[derive(Serialize)]
struct AppointmentView {
    #[serde(flatten)]
    appointment: Appointment,
    doctor: Option<Doctor>,
    prescriptions: Vec<PrescribedMedicine>,
}

async fn register_page(State(state): State<AppState>, mut ctx: RequestContext) -> Response {
    let messages = ctx.take_flashes();
    let body = Json(json!({ "page": "patient_register", "messages": messages }));
    ctx.commit(&state.sessions, body).await
}

async fn register(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    form: Result<Form<PatientRegistrationForm>, FormRejection>,
) -> Response {
    let result = register_patient(&state, &mut ctx, form).await;
    ctx.commit(&state.sessions, result).await
}

async fn register_patient(
    state: &AppState,
    ctx: &mut RequestContext,
    form: Result<Form<PatientRegistrationForm>, FormRejection>,
) -> Result<Response, AppError> {
    let form = forms::extract(form)?;

    let mut errors = forms::validation_errors(&form);
    if patients::email_exists(&state.pool, &form.email).await? {
        errors.add("email", EMAIL_TAKEN);
    }
    errors.into_result()?;

    let new = NewPatient {
        name: form.name.trim().to_string(),
        email: form.email,
        password_hash: hash_password(&form.password)?,
        phone: form.phone,
    };

    let patient = match patients::insert(&state.pool, &new).await {
        Ok(patient) => patient,
        Err(e) if e.is_constraint_violation() => return Err(AppError::field("email", EMAIL_TAKEN)),
        Err(e) => return Err(e.into()),
    };

    info!(target: AUTHENTICATION, patient_id = patient.id, "Paciente registrado");
    ctx.success(REGISTERED);
    Ok(see_other(Role::Patient.login_path()))
}

async fn login_page(State(state): State<AppState>, mut ctx: RequestContext) -> Response {
    let messages = ctx.take_flashes();
    let body = Json(json!({ "page": "patient_login", "messages": messages }));
    ctx.commit(&state.sessions, body).await
}

async fn login(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Response {
    let result = authenticate(&state, &mut ctx, form).await;
    ctx.commit(&state.sessions, result).await
}

async fn authenticate(
    state: &AppState,
    ctx: &mut RequestContext,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Result<Response, AppError> {
    let form: LoginForm = forms::extract_valid(form)?;

    let patient = patients::find_by_email(&state.pool, &form.email).await?;
    let verified = match &patient {
        Some(patient) => verify_password(&form.password, &patient.password_hash)?,
        None => false,
    };

    match patient {
        Some(patient) if verified => {
            info!(target: AUTHENTICATION, patient_id = patient.id, "Login de paciente");
            ctx.success(format!("Welcome back, {}!", patient.name));
            ctx.login(Identity::Patient {
                id: patient.id,
                name: patient.name,
            });
            Ok(see_other(Role::Patient.dashboard_path()))
        }
        _ => {
            warn!(target: AUTHENTICATION, "Falha de login de paciente");
            ctx.error(INVALID_CREDENTIALS);
            Ok(see_other(Role::Patient.login_path()))
        }
    }
}

async fn dashboard(State(state): State<AppState>, mut ctx: RequestContext) -> Response {
    let result = dashboard_view(&state, &mut ctx).await;
    ctx.commit(&state.sessions, result).await
}

async fn dashboard_view(state: &AppState, ctx: &mut RequestContext) -> Result<Response, AppError> {
    let Some(patient_id) = ctx.patient_id() else {
        ctx.warning(LOGIN_FIRST);
        return Err(AppError::LoginRequired(Role::Patient));
    };

    let Some(patient) = patients::find(&state.pool, patient_id).await? else {
        ctx.flush();
        ctx.warning(LOGIN_FIRST);
        return Err(AppError::LoginRequired(Role::Patient));
    };

    let mut conn = state.pool.acquire().await.map_err(DbError::from)?;
    let all_doctors = doctors::list(&mut *conn).await?;
    let owned = appointments::list_for(&mut *conn, AppointmentOwner::Patient(patient_id)).await?;

    let mut views = Vec::with_capacity(owned.len());
    for appointment in owned {
        views.push(AppointmentView {
            doctor: all_doctors
                .iter()
                .find(|d| d.id == appointment.doctor_id)
                .cloned(),
            prescriptions: prescriptions::list_for_appointment(&mut conn, appointment.id).await?,
            appointment,
        });
    }

    let messages = ctx.take_flashes();
    Ok(Json(json!({
        "patient": patient,
        "doctors": all_doctors,
        "appointments": views,
        "service_choices": Service::choices(),
        "messages": messages,
    }))
    .into_response())
}

async fn book(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    form: Result<Form<AppointmentForm>, FormRejection>,
) -> Response {
    let result = book_appointment(&state, &mut ctx, form).await;
    ctx.commit(&state.sessions, result).await
}

/// Falhas de agendamento viram mensagem de erro no painel, sem 422
async fn book_appointment(
    state: &AppState,
    ctx: &mut RequestContext,
    form: Result<Form<AppointmentForm>, FormRejection>,
) -> Result<Response, AppError> {
    let patient_id = require_patient(ctx)?;

    let outcome = match form {
        Ok(Form(form)) => match appointments::insert(&state.pool, &form.into_new(patient_id)).await {
            Ok(appointment) => Ok(appointment),
            Err(e) if e.is_constraint_violation() => Err(INVALID_DOCTOR.to_string()),
            Err(e) => return Err(e.into()),
        },
        Err(rejection) => Err(rejection.body_text()),
    };

    match outcome {
        Ok(appointment) => {
            info!(appointment_id = appointment.id, patient_id, "Consulta agendada");
            ctx.success("Appointment booked successfully!");
        }
        Err(reason) => {
            warn!(patient_id, %reason, "Falha ao agendar consulta");
            ctx.error(format!("Error booking appointment: {reason}"));
        }
    }
    Ok(see_other(Role::Patient.dashboard_path()))
}

async fn update_appointment(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Path(appointment_id): Path<i64>,
    form: Result<Form<AppointmentForm>, FormRejection>,
) -> Response {
    let result = reschedule(&state, &mut ctx, appointment_id, form).await;
    ctx.commit(&state.sessions, result).await
}

async fn reschedule(
    state: &AppState,
    ctx: &mut RequestContext,
    appointment_id: i64,
    form: Result<Form<AppointmentForm>, FormRejection>,
) -> Result<Response, AppError> {
    let patient_id = require_patient(ctx)?;
    let form = forms::extract(form)?;

    match lifecycle::reschedule(&state.pool, appointment_id, patient_id, &form.into_changes()).await
    {
        Ok(_) => {}
        Err(LifecycleError::Db(e)) if e.is_constraint_violation() => {
            return Err(AppError::field("doctor", INVALID_DOCTOR));
        }
        Err(e) => return Err(e.into()),
    }

    ctx.success("Appointment updated successfully!");
    Ok(see_other(Role::Patient.dashboard_path()))
}

async fn delete_appointment(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Path(appointment_id): Path<i64>,
) -> Response {
    let result = remove_appointment(&state, &mut ctx, appointment_id).await;
    ctx.commit(&state.sessions, result).await
}

async fn remove_appointment(
    state: &AppState,
    ctx: &mut RequestContext,
    appointment_id: i64,
) -> Result<Response, AppError> {
    let patient_id = require_patient(ctx)?;
    lifecycle::delete(&state.pool, appointment_id, Actor::Patient(patient_id)).await?;

    info!(appointment_id, patient_id, "Consulta removida pelo paciente");
    ctx.success(APPOINTMENT_DELETED);
    Ok(see_other(Role::Patient.dashboard_path()))
}

async fn cancel_appointment(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Path(appointment_id): Path<i64>,
) -> Response {
    let result = cancel(&state, &mut ctx, appointment_id).await;
    ctx.commit(&state.sessions, result).await
}

async fn cancel(
    state: &AppState,
    ctx: &mut RequestContext,
    appointment_id: i64,
) -> Result<Response, AppError> {
    let patient_id = require_patient(ctx)?;
    lifecycle::cancel_by_patient(&state.pool, appointment_id, patient_id).await?;

    ctx.success("Appointment cancelled successfully!");
    Ok(see_other(Role::Patient.dashboard_path()))
}

async fn update_profile(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    form: Result<Form<PatientProfileForm>, FormRejection>,
) -> Response {
    let result = save_profile(&state, &mut ctx, form).await;
    ctx.commit(&state.sessions, result).await
}

async fn save_profile(
    state: &AppState,
    ctx: &mut RequestContext,
    form: Result<Form<PatientProfileForm>, FormRejection>,
) -> Result<Response, AppError> {
    let patient_id = require_patient(ctx)?;
    let form: PatientProfileForm = forms::extract_valid(form)?;

    let patient = patients::update_profile(&state.pool, patient_id, &form.into()).await?;
    ctx.rename(&patient.name);
    ctx.success(PROFILE_UPDATED);
    Ok(see_other(Role::Patient.dashboard_path()))
}

async fn delete_account(State(state): State<AppState>, mut ctx: RequestContext) -> Response {
    let result = remove_account(&state, &mut ctx).await;
    ctx.commit(&state.sessions, result).await
}

async fn remove_account(state: &AppState, ctx: &mut RequestContext) -> Result<Response, AppError> {
    let patient_id = require_patient(ctx)?;
    patients::delete_cascade(&state.pool, patient_id).await?;

    info!(target: AUTHENTICATION, patient_id, "Conta de paciente removida");
    ctx.flush();
    ctx.success(ACCOUNT_DELETED);
    Ok(see_other(Role::Patient.login_path()))
}

async fn logout(State(state): State<AppState>, mut ctx: RequestContext) -> Response {
    ctx.flush();
    ctx.success(LOGGED_OUT);
    ctx.commit(&state.sessions, see_other(Role::Patient.login_path())).await
}
