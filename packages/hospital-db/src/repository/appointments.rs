//! Repositório de consultas

use crate::error::{DbError, DbResult};
use crate::models::{
    Appointment, AppointmentChanges, AppointmentStatistics, AppointmentStatus, Medicine,
    NewAppointment,
};
use crate::repository::AppointmentOwner;
use chrono::Utc;
use sqlx::{SqliteExecutor, SqlitePool};
use tracing::{debug, info};

pub async fn find<'e>(
    executor: impl SqliteExecutor<'e>,
    id: i64,
) -> DbResult<Option<Appointment>> {
    let appointment = sqlx::query_as::<_, Appointment>("SELECT * FROM appointments WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(appointment)
}

/// Consultas de um médico ou paciente, das mais recentes para as mais antigas
pub async fn list_for<'e>(
    executor: impl SqliteExecutor<'e>,
    owner: AppointmentOwner,
) -> DbResult<Vec<Appointment>> {
    let sql = format!(
        "SELECT * FROM appointments WHERE {} = ? ORDER BY date DESC, time DESC, id DESC",
        owner.column()
    );
    let appointments = sqlx::query_as::<_, Appointment>(&sql)
        .bind(owner.id())
        .fetch_all(executor)
        .await?;
    Ok(appointments)
}

/// Agenda uma nova consulta no status `Pending`
pub async fn insert<'e>(
    executor: impl SqliteExecutor<'e>,
    new: &NewAppointment,
) -> DbResult<Appointment> {
    let appointment = sqlx::query_as::<_, Appointment>(
        r#"
        INSERT INTO appointments (patient_id, doctor_id, service, date, time, notes, status, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(new.patient_id)
    .bind(new.doctor_id)
    .bind(new.service)
    .bind(new.date)
    .bind(new.time)
    .bind(new.notes.as_deref())
    .bind(AppointmentStatus::Pending)
    .bind(Utc::now())
    .fetch_one(executor)
    .await?;

    info!(
        appointment_id = appointment.id,
        patient_id = appointment.patient_id,
        doctor_id = appointment.doctor_id,
        "Consulta agendada"
    );
    Ok(appointment)
}

pub async fn update_details<'e>(
    executor: impl SqliteExecutor<'e>,
    id: i64,
    changes: &AppointmentChanges,
) -> DbResult<Appointment> {
    let appointment = sqlx::query_as::<_, Appointment>(
        r#"
        UPDATE appointments
        SET doctor_id = ?, service = ?, date = ?, time = ?, notes = ?
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(changes.doctor_id)
    .bind(changes.service)
    .bind(changes.date)
    .bind(changes.time)
    .bind(changes.notes.as_deref())
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| DbError::NotFound(format!("appointment {id}")))?;

    Ok(appointment)
}

pub async fn update_status<'e>(
    executor: impl SqliteExecutor<'e>,
    id: i64,
    status: AppointmentStatus,
) -> DbResult<Appointment> {
    let appointment = sqlx::query_as::<_, Appointment>(
        "UPDATE appointments SET status = ? WHERE id = ? RETURNING *",
    )
    .bind(status)
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| DbError::NotFound(format!("appointment {id}")))?;

    debug!(appointment_id = id, %status, "Status da consulta atualizado");
    Ok(appointment)
}

/// Medicamentos sugeridos (associação N-N) de uma consulta
pub async fn suggested_medicines<'e>(
    executor: impl SqliteExecutor<'e>,
    appointment_id: i64,
) -> DbResult<Vec<Medicine>> {
    let medicines = sqlx::query_as::<_, Medicine>(
        r#"
        SELECT m.* FROM medicines m
        JOIN appointment_medicines am ON am.medicine_id = m.id
        WHERE am.appointment_id = ?
        ORDER BY m.name, m.id
        "#,
    )
    .bind(appointment_id)
    .fetch_all(executor)
    .await?;
    Ok(medicines)
}

pub async fn clear_suggested_medicines<'e>(
    executor: impl SqliteExecutor<'e>,
    appointment_id: i64,
) -> DbResult<u64> {
    let cleared = sqlx::query("DELETE FROM appointment_medicines WHERE appointment_id = ?")
        .bind(appointment_id)
        .execute(executor)
        .await?
        .rows_affected();
    Ok(cleared)
}

pub async fn add_suggested_medicine<'e>(
    executor: impl SqliteExecutor<'e>,
    appointment_id: i64,
    medicine_id: i64,
) -> DbResult<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO appointment_medicines (appointment_id, medicine_id) VALUES (?, ?)",
    )
    .bind(appointment_id)
    .bind(medicine_id)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn statistics<'e>(
    executor: impl SqliteExecutor<'e>,
    doctor_id: i64,
) -> DbResult<AppointmentStatistics> {
    let rows: Vec<(AppointmentStatus, i64)> = sqlx::query_as(
        "SELECT status, COUNT(*) FROM appointments WHERE doctor_id = ? GROUP BY status",
    )
    .bind(doctor_id)
    .fetch_all(executor)
    .await?;

    let mut stats = AppointmentStatistics::default();
    for (status, count) in rows {
        stats.total += count;
        match status {
            AppointmentStatus::Pending => stats.pending = count,
            AppointmentStatus::Approved => stats.approved = count,
            AppointmentStatus::Completed => stats.completed = count,
            AppointmentStatus::Cancelled => stats.cancelled = count,
        }
    }
    Ok(stats)
}

/// Remove a consulta com suas prescrições, sugestões e códigos de confirmação
pub async fn delete_cascade(pool: &SqlitePool, id: i64) -> DbResult<bool> {
    let mut tx = pool.begin().await?;

    for dependant in ["prescriptions", "appointment_medicines", "confirmation_codes"] {
        sqlx::query(&format!("DELETE FROM {dependant} WHERE appointment_id = ?"))
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }

    let deleted = sqlx::query("DELETE FROM appointments WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;

    if deleted > 0 {
        info!(appointment_id = id, "Consulta removida");
    }
    Ok(deleted > 0)
}
