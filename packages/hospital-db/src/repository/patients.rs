//! Repositório de pacientes

use crate::error::{DbError, DbResult};
use crate::models::{NewPatient, Patient, PatientProfileUpdate};
use crate::repository::{delete_owned_appointments, AppointmentOwner};
use chrono::Utc;
use sqlx::{SqliteExecutor, SqlitePool};
use tracing::info;

pub async fn find<'e>(executor: impl SqliteExecutor<'e>, id: i64) -> DbResult<Option<Patient>> {
    let patient = sqlx::query_as::<_, Patient>("SELECT * FROM patients WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(patient)
}

pub async fn find_by_email<'e>(
    executor: impl SqliteExecutor<'e>,
    email: &str,
) -> DbResult<Option<Patient>> {
    let patient = sqlx::query_as::<_, Patient>("SELECT * FROM patients WHERE email = ?")
        .bind(email)
        .fetch_optional(executor)
        .await?;
    Ok(patient)
}

pub async fn email_exists<'e>(executor: impl SqliteExecutor<'e>, email: &str) -> DbResult<bool> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM patients WHERE email = ?)")
            .bind(email)
            .fetch_one(executor)
            .await?;
    Ok(exists)
}

pub async fn insert<'e>(executor: impl SqliteExecutor<'e>, new: &NewPatient) -> DbResult<Patient> {
    let patient = sqlx::query_as::<_, Patient>(
        r#"
        INSERT INTO patients (name, email, password_hash, phone, created_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&new.name)
    .bind(&new.email)
    .bind(&new.password_hash)
    .bind(&new.phone)
    .bind(Utc::now())
    .fetch_one(executor)
    .await?;

    info!(patient_id = patient.id, "Paciente cadastrado");
    Ok(patient)
}

pub async fn update_profile<'e>(
    executor: impl SqliteExecutor<'e>,
    id: i64,
    update: &PatientProfileUpdate,
) -> DbResult<Patient> {
    let patient = sqlx::query_as::<_, Patient>(
        r#"
        UPDATE patients
        SET name = COALESCE(?, name),
            phone = COALESCE(?, phone)
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(update.name.as_deref())
    .bind(update.phone.as_deref())
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| DbError::NotFound(format!("patient {id}")))?;

    Ok(patient)
}

pub async fn update_password<'e>(
    executor: impl SqliteExecutor<'e>,
    email: &str,
    password_hash: &str,
) -> DbResult<bool> {
    let result = sqlx::query("UPDATE patients SET password_hash = ? WHERE email = ?")
        .bind(password_hash)
        .bind(email)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Remove o paciente junto com suas consultas, prescrições e códigos
pub async fn delete_cascade(pool: &SqlitePool, id: i64) -> DbResult<bool> {
    let mut tx = pool.begin().await?;

    let appointments = delete_owned_appointments(&mut *tx, AppointmentOwner::Patient(id)).await?;

    // confirmation_codes também referencia o paciente diretamente
    sqlx::query("DELETE FROM confirmation_codes WHERE patient_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let deleted = sqlx::query("DELETE FROM patients WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;

    if deleted > 0 {
        info!(patient_id = id, appointments, "Paciente removido em cascata");
    }
    Ok(deleted > 0)
}
