//! Catálogo de medicamentos, restrito a médicos autenticados

use super::see_other;
use crate::error::AppError;
use crate::forms::{self, MedicineForm};
use crate::session::RequestContext;
use crate::state::AppState;
use axum::{
    extract::{rejection::FormRejection, Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use hospital_db::models::{Medicine, MedicineCategory, MedicineType};
use hospital_db::repository::medicines;
use serde::Serialize;
use serde_json::json;
use tracing::info;

const DIRECTORY_PATH: &str = "/medicines/";
const ACCESS_DENIED: &str = "Access denied.";

pub fn router() -> Router<AppState> {
    Router::new()
        .route(DIRECTORY_PATH, get(list))
        .route("/medicines/add/", post(add))
        .route("/medicines/update/:id/", post(update))
        .route("/medicines/delete/:id/", post(delete))
}

#[derive(Serialize)]
struct CategoryGroup {
    category: MedicineCategory,
    label: &'static str,
    medicines: Vec<Medicine>,
}

/// Sessões sem médico recebem a mensagem e voltam para a página inicial
fn deny(ctx: &mut RequestContext, message: &str) -> Response {
    ctx.error(message);
    see_other("/")
}

async fn list(State(state): State<AppState>, mut ctx: RequestContext) -> Response {
    let result = directory(&state, &mut ctx).await;
    ctx.commit(&state.sessions, result).await
}

async fn directory(state: &AppState, ctx: &mut RequestContext) -> Result<Response, AppError> {
    if !ctx.is_doctor() {
        return Ok(deny(
            ctx,
            "Access denied. Only authorized doctors can view the medicines directory.",
        ));
    }

    let groups: Vec<CategoryGroup> = medicines::grouped_by_category(&state.pool)
        .await?
        .into_iter()
        .map(|(category, medicines)| CategoryGroup {
            category,
            label: category.label(),
            medicines,
        })
        .collect();
    let total_count = medicines::count(&state.pool).await?;

    let messages = ctx.take_flashes();
    Ok(Json(json!({
        "medicines_by_category": groups,
        "total_count": total_count,
        "categories": MedicineCategory::choices(),
        "types": MedicineType::choices(),
        "messages": messages,
    }))
    .into_response())
}

async fn add(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    form: Result<Form<MedicineForm>, FormRejection>,
) -> Response {
    let result = add_medicine(&state, &mut ctx, form).await;
    ctx.commit(&state.sessions, result).await
}

async fn add_medicine(
    state: &AppState,
    ctx: &mut RequestContext,
    form: Result<Form<MedicineForm>, FormRejection>,
) -> Result<Response, AppError> {
    if !ctx.is_doctor() {
        return Ok(deny(ctx, ACCESS_DENIED));
    }

    match forms::extract(form)?.into_new() {
        Some(new) => {
            let medicine = medicines::insert(&state.pool, &new).await?;
            info!(medicine_id = medicine.id, category = %medicine.category, "Medicamento cadastrado");
            ctx.success("Medicine added successfully!");
        }
        None => ctx.error("All fields are required."),
    }
    Ok(see_other(DIRECTORY_PATH))
}

async fn update(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Path(medicine_id): Path<i64>,
    form: Result<Form<MedicineForm>, FormRejection>,
) -> Response {
    let result = update_medicine(&state, &mut ctx, medicine_id, form).await;
    ctx.commit(&state.sessions, result).await
}

async fn update_medicine(
    state: &AppState,
    ctx: &mut RequestContext,
    medicine_id: i64,
    form: Result<Form<MedicineForm>, FormRejection>,
) -> Result<Response, AppError> {
    if !ctx.is_doctor() {
        return Ok(deny(ctx, ACCESS_DENIED));
    }

    let changes = forms::extract(form)?.into_update();
    medicines::update(&state.pool, medicine_id, &changes).await?;
    ctx.success("Medicine updated successfully!");
    Ok(see_other(DIRECTORY_PATH))
}

async fn delete(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Path(medicine_id): Path<i64>,
) -> Response {
    let result = delete_medicine(&state, &mut ctx, medicine_id).await;
    ctx.commit(&state.sessions, result).await
}

async fn delete_medicine(
    state: &AppState,
    ctx: &mut RequestContext,
    medicine_id: i64,
) -> Result<Response, AppError> {
    if !ctx.is_doctor() {
        return Ok(deny(ctx, ACCESS_DENIED));
    }

    if !medicines::delete_cascade(&state.pool, medicine_id).await? {
        return Err(AppError::NotFound("Medicine not found.".to_string()));
    }

    info!(medicine_id, "Medicamento removido");
    ctx.success("Medicine deleted successfully!");
    Ok(see_other(DIRECTORY_PATH))
}
