//! Formulários recebidos pelas rotas (`application/x-www-form-urlencoded`)
//!
//! A desserialização cuida dos tipos (enumerações, datas, horários) e o
//! `validator` cuida das regras de cada campo. Regras que dependem do banco,
//! como e-mail já cadastrado, ficam nos handlers.

use crate::error::{AppError, FormErrors, NON_FIELD_ERRORS};
use axum::extract::rejection::FormRejection;
use axum::Form;
use chrono::{NaiveDate, NaiveTime};
use hospital_db::models::{
    AppointmentChanges, DoctorProfileUpdate, Frequency, MedicineCategory, MedicineType,
    MedicineUpdate, NewAppointment, NewMedicine, PatientProfileUpdate, PrescriptionItem, Service,
    Specialization, TreatmentDuration,
};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use validator::{Validate, ValidationError};

pub const MAX_INSTRUCTIONS_LENGTH: usize = 200;

const PASSWORDS_DO_NOT_MATCH: &str = "Passwords do not match.";

fn validation_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    if !phone.is_empty() && phone.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(validation_error("phone", "Phone number must contain only digits."))
    }
}

fn passwords_match(password: &str, confirm: &str) -> Result<(), ValidationError> {
    if password.is_empty() || confirm.is_empty() || password == confirm {
        Ok(())
    } else {
        Err(validation_error("password_mismatch", PASSWORDS_DO_NOT_MATCH))
    }
}

/// Horário no formato do `<input type="time">`, com ou sem segundos
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

fn deserialize_time<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_time(&raw).ok_or_else(|| de::Error::custom(format!("Enter a valid time: {raw}")))
}

/// Texto opcional: ausente ou em branco vira `None`
fn optional_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
}

/// Valor opcional convertido por `FromStr`; em branco vira `None`
fn optional_parsed<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    match optional_text(deserializer)? {
        Some(raw) => raw.parse().map(Some).map_err(de::Error::custom),
        None => Ok(None),
    }
}

/// Erros do `validator` convertidos para o formato por campo
pub fn validation_errors<T: Validate>(form: &T) -> FormErrors {
    form.validate().err().map(FormErrors::from).unwrap_or_default()
}

/// Extrai o formulário, convertendo falhas de desserialização em erro 422
pub fn extract<T>(form: Result<Form<T>, FormRejection>) -> Result<T, AppError> {
    match form {
        Ok(Form(value)) => Ok(value),
        Err(rejection) => Err(AppError::field(NON_FIELD_ERRORS, rejection.body_text())),
    }
}

/// Extrai e valida o formulário
pub fn extract_valid<T: Validate>(form: Result<Form<T>, FormRejection>) -> Result<T, AppError> {
    let value = extract(form)?;
    validation_errors(&value).into_result()?;
    Ok(value)
}

#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "doctor_passwords_match", skip_on_field_errors = false))]
pub struct DoctorRegistrationForm {
    #[serde(default)]
    #[validate(length(min = 1, max = 100, message = "This field is required."))]
    pub name: String,
    #[serde(default)]
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 6, message = "Ensure this value has at least 6 characters."))]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
    pub specialization: Specialization,
    #[validate(range(min = 0, message = "Ensure this value is greater than or equal to 0."))]
    pub experience: i64,
}

fn doctor_passwords_match(form: &DoctorRegistrationForm) -> Result<(), ValidationError> {
    passwords_match(&form.password, &form.confirm_password)
}

#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "patient_passwords_match", skip_on_field_errors = false))]
pub struct PatientRegistrationForm {
    #[serde(default)]
    #[validate(length(min = 1, max = 100, message = "This field is required."))]
    pub name: String,
    #[serde(default)]
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 6, message = "Ensure this value has at least 6 characters."))]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
    #[serde(default)]
    #[validate(custom = "validate_phone")]
    pub phone: String,
}

fn patient_passwords_match(form: &PatientRegistrationForm) -> Result<(), ValidationError> {
    passwords_match(&form.password, &form.confirm_password)
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginForm {
    #[serde(default)]
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "This field is required."))]
    pub password: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct DoctorProfileForm {
    #[serde(default, deserialize_with = "optional_text")]
    #[validate(length(max = 100))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "optional_parsed")]
    pub specialization: Option<Specialization>,
    #[serde(default, deserialize_with = "optional_parsed")]
    #[validate(range(min = 0, message = "Ensure this value is greater than or equal to 0."))]
    pub experience: Option<i64>,
}

impl From<DoctorProfileForm> for DoctorProfileUpdate {
    fn from(form: DoctorProfileForm) -> Self {
        DoctorProfileUpdate {
            name: form.name,
            specialization: form.specialization,
            experience: form.experience,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct PatientProfileForm {
    #[serde(default, deserialize_with = "optional_text")]
    #[validate(length(max = 100))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    #[validate(custom = "validate_phone")]
    pub phone: Option<String>,
}

impl From<PatientProfileForm> for PatientProfileUpdate {
    fn from(form: PatientProfileForm) -> Self {
        PatientProfileUpdate {
            name: form.name,
            phone: form.phone,
        }
    }
}

/// Agendamento e remarcação de consulta pelo paciente
#[derive(Debug, Deserialize)]
pub struct AppointmentForm {
    pub doctor: i64,
    pub service: Service,
    pub date: NaiveDate,
    #[serde(deserialize_with = "deserialize_time")]
    pub time: NaiveTime,
    #[serde(default, deserialize_with = "optional_text")]
    pub notes: Option<String>,
}

impl AppointmentForm {
    pub fn into_new(self, patient_id: i64) -> NewAppointment {
        NewAppointment {
            patient_id,
            doctor_id: self.doctor,
            service: self.service,
            date: self.date,
            time: self.time,
            notes: self.notes,
        }
    }

    pub fn into_changes(self) -> AppointmentChanges {
        AppointmentChanges {
            doctor_id: self.doctor,
            service: self.service,
            date: self.date,
            time: self.time,
            notes: self.notes,
        }
    }
}

/// Cadastro e edição de medicamento; todos os campos são opcionais na edição
#[derive(Debug, Default, Deserialize)]
pub struct MedicineForm {
    #[serde(default, deserialize_with = "optional_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "optional_parsed")]
    pub med_type: Option<MedicineType>,
    #[serde(default, deserialize_with = "optional_text")]
    pub dosage: Option<String>,
    #[serde(default, deserialize_with = "optional_parsed")]
    pub category: Option<MedicineCategory>,
    /// Ausente mantém a descrição atual; em branco apaga
    #[serde(default)]
    pub description: Option<String>,
}

impl MedicineForm {
    /// `None` quando nome, tipo ou dosagem estão ausentes
    pub fn into_new(self) -> Option<NewMedicine> {
        Some(NewMedicine {
            name: self.name?,
            med_type: self.med_type?,
            dosage: self.dosage?,
            category: self.category.unwrap_or_default(),
            description: self.description.and_then(non_blank),
        })
    }

    pub fn into_update(self) -> MedicineUpdate {
        MedicineUpdate {
            name: self.name,
            med_type: self.med_type,
            dosage: self.dosage,
            category: self.category,
            description: self.description.map(non_blank),
        }
    }
}

fn non_blank(text: String) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Formulário de seleção de medicamentos de uma consulta.
///
/// Os ids vêm em campos `medicines` repetidos; a posologia de cada um vem em
/// `frequency_<id>`, `duration_<id>` e `instructions_<id>`. Frequência e
/// duração ausentes assumem os valores padrão.
pub fn prescription_items(fields: &[(String, String)]) -> Result<Vec<PrescriptionItem>, AppError> {
    let values: HashMap<&str, &str> = fields
        .iter()
        .map(|(key, value)| (key.as_str(), value.trim()))
        .collect();

    let mut errors = FormErrors::new();
    let mut items = Vec::new();

    for (_, raw_id) in fields.iter().filter(|(key, _)| key == "medicines") {
        let raw_id = raw_id.trim();
        let Ok(medicine_id) = raw_id.parse::<i64>() else {
            errors.add("medicines", format!("Select a valid choice. {raw_id} is not one of the available choices."));
            continue;
        };

        let mut item = PrescriptionItem::new(medicine_id);

        let frequency_key = format!("frequency_{raw_id}");
        if let Some(raw) = values.get(frequency_key.as_str()).filter(|v| !v.is_empty()) {
            match raw.parse::<Frequency>() {
                Ok(frequency) => item.frequency = frequency,
                Err(e) => errors.add(&frequency_key, e.to_string()),
            }
        }

        let duration_key = format!("duration_{raw_id}");
        if let Some(raw) = values.get(duration_key.as_str()).filter(|v| !v.is_empty()) {
            match raw.parse::<TreatmentDuration>() {
                Ok(duration) => item.duration = duration,
                Err(e) => errors.add(&duration_key, e.to_string()),
            }
        }

        let instructions_key = format!("instructions_{raw_id}");
        if let Some(instructions) = values.get(instructions_key.as_str()).filter(|v| !v.is_empty()) {
            if instructions.chars().count() > MAX_INSTRUCTIONS_LENGTH {
                errors.add(
                    &instructions_key,
                    format!("Ensure this value has at most {MAX_INSTRUCTIONS_LENGTH} characters."),
                );
            } else {
                item.instructions = Some(instructions.to_string());
            }
        }

        items.push(item);
    }

    errors.into_result()?;
    Ok(items)
}

/// Ação AJAX sobre uma consulta
#[derive(Debug, Deserialize)]
pub struct AppointmentActionForm {
    pub appointment_id: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetRequestForm {
    #[serde(default)]
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "reset_passwords_match", skip_on_field_errors = false))]
pub struct PasswordResetConfirmForm {
    #[serde(default)]
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "This field is required."))]
    pub token: String,
    #[serde(default)]
    #[validate(length(min = 6, message = "Ensure this value has at least 6 characters."))]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

fn reset_passwords_match(form: &PasswordResetConfirmForm) -> Result<(), ValidationError> {
    passwords_match(&form.password, &form.confirm_password)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn patient_form(phone: &str, confirm: &str) -> PatientRegistrationForm {
        PatientRegistrationForm {
            name: "Maria Silva".to_string(),
            email: "maria@example.com".to_string(),
            password: "segredo123".to_string(),
            confirm_password: confirm.to_string(),
            phone: phone.to_string(),
        }
    }

    #[test]
    fn test_patient_registration_rules() {
        assert!(validation_errors(&patient_form("11987654321", "segredo123")).is_empty());

        let errors = validation_errors(&patient_form("(11) 98765", "segredo123"));
        assert_eq!(errors.messages("phone"), ["Phone number must contain only digits."]);

        let errors = validation_errors(&patient_form("11987654321", "outra-senha"));
        assert_eq!(errors.messages(NON_FIELD_ERRORS), [PASSWORDS_DO_NOT_MATCH]);
    }

    #[test]
    fn test_short_password_is_rejected() {
        let mut form = patient_form("11987654321", "abc");
        form.password = "abc".to_string();
        let errors = validation_errors(&form);
        assert_eq!(errors.messages("password").len(), 1);
        assert!(errors.messages(NON_FIELD_ERRORS).is_empty());
    }

    #[test]
    fn test_parse_time_formats() {
        assert_eq!(parse_time("09:30"), NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(parse_time("16:45:10"), NaiveTime::from_hms_opt(16, 45, 10));
        assert_eq!(parse_time("25:00"), None);
    }

    #[test]
    fn test_prescription_items_defaults_and_details() {
        let fields = pairs(&[
            ("medicines", "4"),
            ("medicines", "9"),
            ("frequency_9", "After meals"),
            ("duration_9", "7 days"),
            ("instructions_9", "  Tomar com água  "),
            ("csrfmiddlewaretoken", "ignorado"),
        ]);

        let items = prescription_items(&fields).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], PrescriptionItem::new(4));
        assert_eq!(items[1].frequency, Frequency::AfterMeals);
        assert_eq!(items[1].duration, TreatmentDuration::SevenDays);
        assert_eq!(items[1].instructions.as_deref(), Some("Tomar com água"));
    }

    #[test]
    fn test_prescription_items_rejects_bad_values() {
        let long = "x".repeat(MAX_INSTRUCTIONS_LENGTH + 1);
        let fields = pairs(&[
            ("medicines", "abc"),
            ("medicines", "2"),
            ("frequency_2", "Hourly"),
            ("instructions_2", &long),
        ]);

        match prescription_items(&fields) {
            Err(AppError::Validation(errors)) => {
                assert_eq!(errors.messages("medicines").len(), 1);
                assert_eq!(errors.messages("frequency_2").len(), 1);
                assert_eq!(errors.messages("instructions_2").len(), 1);
            }
            other => panic!("esperava erro de validação, obtido {other:?}"),
        }
    }

    #[test]
    fn test_medicine_form_requires_core_fields() {
        let form = MedicineForm {
            name: Some("Dipirona".to_string()),
            med_type: Some(MedicineType::Drops),
            dosage: Some("500mg/ml".to_string()),
            ..Default::default()
        };
        let new = form.into_new().unwrap();
        assert_eq!(new.category, MedicineCategory::General);

        let incomplete = MedicineForm {
            name: Some("Dipirona".to_string()),
            ..Default::default()
        };
        assert!(incomplete.into_new().is_none());
    }

    #[test]
    fn test_medicine_update_distinguishes_blank_from_absent() {
        let absent = MedicineForm {
            name: Some("Dipirona".to_string()),
            ..Default::default()
        };
        assert_eq!(absent.into_update().description, None);

        let blank = MedicineForm {
            description: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(blank.into_update().description, Some(None));

        let filled = MedicineForm {
            description: Some(" Analgésico ".to_string()),
            ..Default::default()
        };
        assert_eq!(
            filled.into_update().description,
            Some(Some("Analgésico".to_string()))
        );
    }
}
