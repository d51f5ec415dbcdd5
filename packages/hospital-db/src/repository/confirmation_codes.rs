//! Repositório de códigos de confirmação (OTP)
//!
//! O modelo existe no esquema mas nenhum fluxo HTTP o utiliza ainda.

use crate::crypto::generate_otp_code;
use crate::error::{DbError, DbResult};
use crate::models::ConfirmationCode;
use chrono::Utc;
use sqlx::{SqliteExecutor, SqlitePool};
use tracing::warn;

/// Tentativas de gerar um código ainda não usado
const MAX_CODE_ATTEMPTS: usize = 5;

/// Emite um código único de 6 dígitos válido por 10 minutos
pub async fn issue(
    pool: &SqlitePool,
    patient_id: i64,
    appointment_id: i64,
) -> DbResult<ConfirmationCode> {
    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let created_at = Utc::now();
        let result = sqlx::query_as::<_, ConfirmationCode>(
            r#"
            INSERT INTO confirmation_codes (patient_id, appointment_id, code, is_verified, created_at, expires_at)
            VALUES (?, ?, ?, 0, ?, ?)
            RETURNING *
            "#,
        )
        .bind(patient_id)
        .bind(appointment_id)
        .bind(generate_otp_code())
        .bind(created_at)
        .bind(ConfirmationCode::expiry_for(created_at))
        .fetch_one(pool)
        .await
        .map_err(DbError::from);

        match result {
            Ok(code) => return Ok(code),
            Err(DbError::ConstraintViolation(msg)) if msg.contains("confirmation_codes.code") => {
                warn!(attempt, "Colisão de código de confirmação, gerando outro");
            }
            Err(e) => return Err(e),
        }
    }

    Err(DbError::ConstraintViolation(
        "could not allocate a unique confirmation code".to_string(),
    ))
}

pub async fn find_by_code<'e>(
    executor: impl SqliteExecutor<'e>,
    code: &str,
) -> DbResult<Option<ConfirmationCode>> {
    let found =
        sqlx::query_as::<_, ConfirmationCode>("SELECT * FROM confirmation_codes WHERE code = ?")
            .bind(code)
            .fetch_optional(executor)
            .await?;
    Ok(found)
}

/// Marca o código como verificado se ele existe e ainda não expirou
pub async fn verify(pool: &SqlitePool, code: &str) -> DbResult<bool> {
    let Some(found) = find_by_code(pool, code).await? else {
        return Ok(false);
    };
    if found.is_expired() {
        return Ok(false);
    }

    sqlx::query("UPDATE confirmation_codes SET is_verified = 1 WHERE id = ?")
        .bind(found.id)
        .execute(pool)
        .await?;
    Ok(true)
}
