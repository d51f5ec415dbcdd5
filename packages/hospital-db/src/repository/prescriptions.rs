//! Repositório de prescrições

use crate::error::DbResult;
use crate::models::{Medicine, PrescribedMedicine, Prescription, PrescriptionItem};
use chrono::Utc;
use sqlx::{SqliteConnection, SqliteExecutor};
use std::collections::HashMap;

/// Prescrições de uma consulta com o respectivo medicamento, ordenadas pelo nome
pub async fn list_for_appointment(
    conn: &mut SqliteConnection,
    appointment_id: i64,
) -> DbResult<Vec<PrescribedMedicine>> {
    let prescriptions = sqlx::query_as::<_, Prescription>(
        r#"
        SELECT p.* FROM prescriptions p
        JOIN medicines m ON m.id = p.medicine_id
        WHERE p.appointment_id = ?
        ORDER BY m.name, p.id
        "#,
    )
    .bind(appointment_id)
    .fetch_all(&mut *conn)
    .await?;

    let medicines: HashMap<i64, Medicine> = sqlx::query_as::<_, Medicine>(
        r#"
        SELECT * FROM medicines
        WHERE id IN (SELECT medicine_id FROM prescriptions WHERE appointment_id = ?)
        "#,
    )
    .bind(appointment_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|m| (m.id, m))
    .collect();

    Ok(prescriptions
        .into_iter()
        .filter_map(|prescription| {
            medicines
                .get(&prescription.medicine_id)
                .cloned()
                .map(|medicine| PrescribedMedicine {
                    prescription,
                    medicine,
                })
        })
        .collect())
}

pub async fn count_for_appointment<'e>(
    executor: impl SqliteExecutor<'e>,
    appointment_id: i64,
) -> DbResult<i64> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM prescriptions WHERE appointment_id = ?")
        .bind(appointment_id)
        .fetch_one(executor)
        .await?;
    Ok(total)
}

pub async fn insert<'e>(
    executor: impl SqliteExecutor<'e>,
    appointment_id: i64,
    item: &PrescriptionItem,
) -> DbResult<Prescription> {
    let prescription = sqlx::query_as::<_, Prescription>(
        r#"
        INSERT INTO prescriptions (appointment_id, medicine_id, frequency, duration, instructions, prescribed_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(appointment_id)
    .bind(item.medicine_id)
    .bind(item.frequency)
    .bind(item.duration)
    .bind(item.instructions.as_deref())
    .bind(Utc::now())
    .fetch_one(executor)
    .await?;
    Ok(prescription)
}

pub async fn delete_for_appointment<'e>(
    executor: impl SqliteExecutor<'e>,
    appointment_id: i64,
) -> DbResult<u64> {
    let deleted = sqlx::query("DELETE FROM prescriptions WHERE appointment_id = ?")
        .bind(appointment_id)
        .execute(executor)
        .await?
        .rows_affected();
    Ok(deleted)
}
