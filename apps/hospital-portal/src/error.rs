//! Erros do portal e sua conversão em respostas HTTP
//!
//! Rotas de formulário usam [`AppError`]: falta de login vira redirecionamento
//! para a página de login, falhas de validação viram 422 com os erros por
//! campo. Rotas AJAX usam [`AjaxError`], sempre no envelope
//! `{status: "error", message}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use hospital_db::crypto::CryptoError;
use hospital_db::lifecycle::LifecycleError;
use hospital_db::DbError;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::error;
use validator::ValidationErrors;

/// Chave dos erros que não pertencem a um campo específico
pub const NON_FIELD_ERRORS: &str = "__all__";

/// Perfil de usuário, usado para escolher a página de login
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Doctor,
    Patient,
}

impl Role {
    pub fn login_path(&self) -> &'static str {
        match self {
            Role::Doctor => "/doctor/login/",
            Role::Patient => "/patient/login/",
        }
    }

    pub fn dashboard_path(&self) -> &'static str {
        match self {
            Role::Doctor => "/doctor/dashboard/",
            Role::Patient => "/patient/dashboard/",
        }
    }

    pub fn reset_confirm_path(&self) -> &'static str {
        match self {
            Role::Doctor => "/doctor/password-reset/confirm/",
            Role::Patient => "/patient/password-reset/confirm/",
        }
    }
}

/// Erros de formulário agrupados por campo
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    /// `Ok(())` sem erros, `Err(AppError::Validation)` caso contrário
    pub fn into_result(self) -> Result<(), AppError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self))
        }
    }
}

impl From<ValidationErrors> for FormErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut form_errors = FormErrors::new();
        for (field, field_errors) in errors.field_errors() {
            for err in field_errors {
                let message = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value ({}).", err.code));
                form_errors.add(field, message);
            }
        }
        form_errors
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Login required")]
    LoginRequired(Role),

    #[error("{0}")]
    NotFound(String),

    #[error("Invalid form data")]
    Validation(FormErrors),

    #[error(transparent)]
    Db(DbError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl From<DbError> for AppError {
    fn from(error: DbError) -> Self {
        match error {
            DbError::NotFound(what) => AppError::NotFound(format!("Not found: {what}")),
            other => AppError::Db(other),
        }
    }
}

impl AppError {
    /// Erro de validação de um único campo
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FormErrors::new();
        errors.add(field, message);
        AppError::Validation(errors)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::Validation(errors.into())
    }
}

impl From<LifecycleError> for AppError {
    fn from(error: LifecycleError) -> Self {
        match error {
            // Consulta de outro usuário é tratada como inexistente
            LifecycleError::AppointmentNotFound(_) | LifecycleError::NotOwner(_) => {
                AppError::NotFound("Appointment not found.".to_string())
            }
            LifecycleError::UnknownMedicine(id) => {
                AppError::NotFound(format!("Medicine {id} not found."))
            }
            LifecycleError::InvalidTarget(status) => {
                AppError::field(NON_FIELD_ERRORS, format!("Status {status} cannot be set."))
            }
            LifecycleError::Db(e) => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::LoginRequired(role) => Redirect::to(role.login_path()).into_response(),
            AppError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "status": "error", "message": message })),
            )
                .into_response(),
            AppError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "status": "error", "errors": errors })),
            )
                .into_response(),
            other => {
                error!(error = %other, "Falha ao processar requisição");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "status": "error", "message": "Internal server error." })),
                )
                    .into_response()
            }
        }
    }
}

/// Erros das rotas AJAX do painel do médico
#[derive(Error, Debug)]
pub enum AjaxError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl AjaxError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AjaxError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AjaxError::NotFound(_) => StatusCode::NOT_FOUND,
            AjaxError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AjaxError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn unauthorized() -> Self {
        AjaxError::Unauthorized("Unauthorized".to_string())
    }
}

impl From<DbError> for AjaxError {
    fn from(error: DbError) -> Self {
        error!(error = %error, "Erro de banco em rota AJAX");
        AjaxError::Internal("An unexpected error occurred.".to_string())
    }
}

impl From<LifecycleError> for AjaxError {
    fn from(error: LifecycleError) -> Self {
        match error {
            LifecycleError::NotOwner(_) => AjaxError::unauthorized(),
            LifecycleError::AppointmentNotFound(_) => {
                AjaxError::NotFound("Appointment not found".to_string())
            }
            e @ (LifecycleError::UnknownMedicine(_) | LifecycleError::InvalidTarget(_)) => {
                AjaxError::BadRequest(e.to_string())
            }
            LifecycleError::Db(e) => e.into(),
        }
    }
}

impl IntoResponse for AjaxError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (
            status,
            Json(json!({ "status": "error", "message": self.to_string() })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::LOCATION;

    #[test]
    fn test_login_required_redirects() {
        let response = AppError::LoginRequired(Role::Patient).into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(LOCATION).unwrap(), "/patient/login/");
    }

    #[test]
    fn test_not_owner_is_not_found_on_forms_and_unauthorized_on_ajax() {
        let form = AppError::from(LifecycleError::NotOwner(7)).into_response();
        assert_eq!(form.status(), StatusCode::NOT_FOUND);

        let ajax = AjaxError::from(LifecycleError::NotOwner(7));
        assert_eq!(ajax.status_code(), StatusCode::UNAUTHORIZED);

        let missing = AjaxError::from(LifecycleError::AppointmentNotFound(7));
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_form_errors_accumulate() {
        let mut errors = FormErrors::new();
        assert!(errors.clone().into_result().is_ok());

        errors.add("email", "This email is already registered.");
        errors.add("email", "Enter a valid email address.");
        assert_eq!(errors.messages("email").len(), 2);
        assert!(errors.messages("phone").is_empty());
        assert!(matches!(errors.into_result(), Err(AppError::Validation(_))));
    }
}
