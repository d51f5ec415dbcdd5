//! Rotas do médico: conta, painel e ações sobre consultas

use super::{
    patient_name, require_doctor, see_other, ACCOUNT_DELETED, APPOINTMENT_DELETED, EMAIL_TAKEN,
    INVALID_CREDENTIALS, LOGGED_OUT, LOGIN_FIRST, PROFILE_UPDATED, REGISTERED,
};
use crate::error::{AppError, Role};
use crate::forms::{self, DoctorProfileForm, DoctorRegistrationForm, LoginForm};
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
use hospital_db::lifecycle::{self, Actor};
use hospital_db::models::{
    Appointment, AppointmentStatus, Frequency, Medicine, MedicineCategory, NewDoctor, Patient,
    PrescribedMedicine, Specialization, TreatmentDuration,
};
use hospital_db::repository::{
    appointments, doctors, medicines, patients, prescriptions, AppointmentOwner,
};
use hospital_db::DbError;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/doctor/register/", get(register_page).post(register))
        .route("/doctor/login/", get(login_page).post(login))
        .route("/doctor/dashboard/", get(dashboard))
        .route("/doctor/add-medicines/:id/", post(add_medicines))
        .route("/doctor/approve/:id/", post(approve))
        .route("/doctor/complete/:id/", post(complete))
        .route("/doctor/reject/:id/", post(reject))
        .route("/doctor/delete-appointment/:id/", post(delete_appointment))
        .route("/doctor/update-profile/", post(update_profile))
        .route("/doctor/delete-account/", post(delete_account))
        .route("/doctor/logout/", post(logout))
}

/// Consulta exibida no painel do médico
#[derive(Serialize)]
struct AppointmentView {
    #[serde(flatten)]
    appointment: Appointment,
    patient: Option<Patient>,
    relevant_category: MedicineCategory,
    suggested_medicines: Vec<Medicine>,
    prescriptions: Vec<PrescribedMedicine>,
    /// Medicamentos da categoria do serviço, para pré-seleção
    relevant_medicines: Vec<Medicine>,
}

async fn register_page(State(state): State<AppState>, mut ctx: RequestContext) -> Response {
    let messages = ctx.take_flashes();
    let body = Json(json!({
        "page": "doctor_register",
        "specialization_choices": Specialization::choices(),
        "messages": messages,
    }));
    ctx.commit(&state.sessions, body).await
}

async fn register(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    form: Result<Form<DoctorRegistrationForm>, FormRejection>,
) -> Response {
    let result = register_doctor(&state, &mut ctx, form).await;
    ctx.commit(&state.sessions, result).await
}

async fn register_doctor(
    state: &AppState,
    ctx: &mut RequestContext,
    form: Result<Form<DoctorRegistrationForm>, FormRejection>,
) -> Result<Response, AppError> {
    let form = forms::extract(form)?;

    let mut errors = forms::validation_errors(&form);
    if doctors::email_exists(&state.pool, &form.email).await? {
        errors.add("email", EMAIL_TAKEN);
    }
    errors.into_result()?;

    let new = NewDoctor {
        name: form.name.trim().to_string(),
        email: form.email,
        password_hash: hash_password(&form.password)?,
        specialization: form.specialization,
        experience: form.experience,
    };

    let doctor = match doctors::insert(&state.pool, &new).await {
        Ok(doctor) => doctor,
        // Cadastro concorrente com o mesmo e-mail
        Err(e) if e.is_constraint_violation() => return Err(AppError::field("email", EMAIL_TAKEN)),
        Err(e) => return Err(e.into()),
    };

    info!(target: AUTHENTICATION, doctor_id = doctor.id, "Médico registrado");
    ctx.success(REGISTERED);
    Ok(see_other(Role::Doctor.login_path()))
}

async fn login_page(State(state): State<AppState>, mut ctx: RequestContext) -> Response {
    let messages = ctx.take_flashes();
    let body = Json(json!({ "page": "doctor_login", "messages": messages }));
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

    let doctor = doctors::find_by_email(&state.pool, &form.email).await?;
    let verified = match &doctor {
        Some(doctor) => verify_password(&form.password, &doctor.password_hash)?,
        None => false,
    };

    match doctor {
        Some(doctor) if verified => {
            info!(target: AUTHENTICATION, doctor_id = doctor.id, "Login de médico");
            ctx.success(format!("Welcome back, Dr. {}!", doctor.name));
            ctx.login(Identity::Doctor {
                id: doctor.id,
                name: doctor.name,
            });
            Ok(see_other(Role::Doctor.dashboard_path()))
        }
        _ => {
            warn!(target: AUTHENTICATION, "Falha de login de médico");
            ctx.error(INVALID_CREDENTIALS);
            Ok(see_other(Role::Doctor.login_path()))
        }
    }
}

async fn dashboard(State(state): State<AppState>, mut ctx: RequestContext) -> Response {
    let result = dashboard_view(&state, &mut ctx).await;
    ctx.commit(&state.sessions, result).await
}

async fn dashboard_view(state: &AppState, ctx: &mut RequestContext) -> Result<Response, AppError> {
    let Some(doctor_id) = ctx.doctor_id() else {
        ctx.warning(LOGIN_FIRST);
        return Err(AppError::LoginRequired(Role::Doctor));
    };

    let Some(doctor) = doctors::find(&state.pool, doctor_id).await? else {
        // Conta removida em outra sessão
        ctx.flush();
        ctx.warning(LOGIN_FIRST);
        return Err(AppError::LoginRequired(Role::Doctor));
    };

    let mut conn = state.pool.acquire().await.map_err(DbError::from)?;
    let owned = appointments::list_for(&mut *conn, AppointmentOwner::Doctor(doctor_id)).await?;

    let mut views = Vec::with_capacity(owned.len());
    for appointment in owned {
        let category = appointment.relevant_category();
        views.push(AppointmentView {
            patient: patients::find(&mut *conn, appointment.patient_id).await?,
            relevant_category: category,
            suggested_medicines: appointments::suggested_medicines(&mut *conn, appointment.id)
                .await?,
            prescriptions: prescriptions::list_for_appointment(&mut conn, appointment.id).await?,
            relevant_medicines: medicines::list_by_category(&mut *conn, category).await?,
            appointment,
        });
    }

    let messages = ctx.take_flashes();
    Ok(Json(json!({
        "doctor": doctor,
        "appointments": views,
        "frequency_choices": Frequency::choices(),
        "duration_choices": TreatmentDuration::choices(),
        "messages": messages,
    }))
    .into_response())
}

async fn add_medicines(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Path(appointment_id): Path<i64>,
    form: Result<Form<Vec<(String, String)>>, FormRejection>,
) -> Response {
    let result = prescribe(&state, &mut ctx, appointment_id, form).await;
    ctx.commit(&state.sessions, result).await
}

async fn prescribe(
    state: &AppState,
    ctx: &mut RequestContext,
    appointment_id: i64,
    form: Result<Form<Vec<(String, String)>>, FormRejection>,
) -> Result<Response, AppError> {
    let doctor_id = require_doctor(ctx)?;
    let fields = forms::extract(form)?;
    let items = forms::prescription_items(&fields)?;

    let outcome =
        lifecycle::replace_prescriptions(&state.pool, appointment_id, doctor_id, &items).await?;

    let patient = patient_name(&state.pool, outcome.appointment.patient_id).await?;
    ctx.success(format!("Medicines prescribed for {patient}!"));
    Ok(see_other(Role::Doctor.dashboard_path()))
}

async fn approve(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Path(appointment_id): Path<i64>,
) -> Response {
    let result = change_status(&state, &mut ctx, appointment_id, AppointmentStatus::Approved).await;
    ctx.commit(&state.sessions, result).await
}

async fn complete(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Path(appointment_id): Path<i64>,
) -> Response {
    let result = change_status(&state, &mut ctx, appointment_id, AppointmentStatus::Completed).await;
    ctx.commit(&state.sessions, result).await
}

async fn reject(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Path(appointment_id): Path<i64>,
) -> Response {
    let result = change_status(&state, &mut ctx, appointment_id, AppointmentStatus::Cancelled).await;
    ctx.commit(&state.sessions, result).await
}

async fn change_status(
    state: &AppState,
    ctx: &mut RequestContext,
    appointment_id: i64,
    target: AppointmentStatus,
) -> Result<Response, AppError> {
    let doctor_id = require_doctor(ctx)?;
    let appointment = lifecycle::transition(&state.pool, appointment_id, doctor_id, target).await?;

    let patient = patient_name(&state.pool, appointment.patient_id).await?;
    match target {
        AppointmentStatus::Cancelled => ctx.warning(format!("Appointment for {patient} rejected.")),
        AppointmentStatus::Completed => {
            ctx.success(format!("Appointment for {patient} marked as completed!"))
        }
        _ => ctx.success(format!("Appointment for {patient} approved!")),
    }
    Ok(see_other(Role::Doctor.dashboard_path()))
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
    let doctor_id = require_doctor(ctx)?;
    lifecycle::delete(&state.pool, appointment_id, Actor::Doctor(doctor_id)).await?;

    info!(appointment_id, doctor_id, "Consulta removida pelo médico");
    ctx.success(APPOINTMENT_DELETED);
    Ok(see_other(Role::Doctor.dashboard_path()))
}

async fn update_profile(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    form: Result<Form<DoctorProfileForm>, FormRejection>,
) -> Response {
    let result = save_profile(&state, &mut ctx, form).await;
    ctx.commit(&state.sessions, result).await
}

async fn save_profile(
    state: &AppState,
    ctx: &mut RequestContext,
    form: Result<Form<DoctorProfileForm>, FormRejection>,
) -> Result<Response, AppError> {
    let doctor_id = require_doctor(ctx)?;
    let form: DoctorProfileForm = forms::extract_valid(form)?;

    let doctor = doctors::update_profile(&state.pool, doctor_id, &form.into()).await?;
    ctx.rename(&doctor.name);
    ctx.success(PROFILE_UPDATED);
    Ok(see_other(Role::Doctor.dashboard_path()))
}

async fn delete_account(State(state): State<AppState>, mut ctx: RequestContext) -> Response {
    let result = remove_account(&state, &mut ctx).await;
    ctx.commit(&state.sessions, result).await
}

async fn remove_account(state: &AppState, ctx: &mut RequestContext) -> Result<Response, AppError> {
    let doctor_id = require_doctor(ctx)?;
    doctors::delete_cascade(&state.pool, doctor_id).await?;

    info!(target: AUTHENTICATION, doctor_id, "Conta de médico removida");
    ctx.flush();
    ctx.success(ACCOUNT_DELETED);
    Ok(see_other(Role::Doctor.login_path()))
}

async fn logout(State(state): State<AppState>, mut ctx: RequestContext) -> Response {
    ctx.flush();
    ctx.success(LOGGED_OUT);
    ctx.commit(&state.sessions, see_other(Role::Doctor.login_path())).await
}
