//! Repositório de médicos

use crate::error::{DbError, DbResult};
use crate::models::{Doctor, DoctorProfileUpdate, NewDoctor};
use crate::repository::{delete_owned_appointments, AppointmentOwner};
use chrono::Utc;
use sqlx::{SqliteExecutor, SqlitePool};
use tracing::info;

pub async fn find<'e>(executor: impl SqliteExecutor<'e>, id: i64) -> DbResult<Option<Doctor>> {
    let doctor = sqlx::query_as::<_, Doctor>("SELECT * FROM doctors WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(doctor)
}

pub async fn find_by_email<'e>(
    executor: impl SqliteExecutor<'e>,
    email: &str,
) -> DbResult<Option<Doctor>> {
    let doctor = sqlx::query_as::<_, Doctor>("SELECT * FROM doctors WHERE email = ?")
        .bind(email)
        .fetch_optional(executor)
        .await?;
    Ok(doctor)
}

pub async fn email_exists<'e>(executor: impl SqliteExecutor<'e>, email: &str) -> DbResult<bool> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM doctors WHERE email = ?)")
        .bind(email)
        .fetch_one(executor)
        .await?;
    Ok(exists)
}

pub async fn list<'e>(executor: impl SqliteExecutor<'e>) -> DbResult<Vec<Doctor>> {
    let doctors = sqlx::query_as::<_, Doctor>("SELECT * FROM doctors ORDER BY name, id")
        .fetch_all(executor)
        .await?;
    Ok(doctors)
}

pub async fn insert<'e>(executor: impl SqliteExecutor<'e>, new: &NewDoctor) -> DbResult<Doctor> {
    if new.experience < 0 {
        return Err(DbError::ConstraintViolation(
            "experience must be non-negative".to_string(),
        ));
    }

    let doctor = sqlx::query_as::<_, Doctor>(
        r#"
        INSERT INTO doctors (name, email, password_hash, specialization, experience, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&new.name)
    .bind(&new.email)
    .bind(&new.password_hash)
    .bind(new.specialization)
    .bind(new.experience)
    .bind(Utc::now())
    .fetch_one(executor)
    .await?;

    info!(doctor_id = doctor.id, "Médico cadastrado");
    Ok(doctor)
}

pub async fn update_profile<'e>(
    executor: impl SqliteExecutor<'e>,
    id: i64,
    update: &DoctorProfileUpdate,
) -> DbResult<Doctor> {
    if matches!(update.experience, Some(e) if e < 0) {
        return Err(DbError::ConstraintViolation(
            "experience must be non-negative".to_string(),
        ));
    }

    let doctor = sqlx::query_as::<_, Doctor>(
        r#"
        UPDATE doctors
        SET name = COALESCE(?, name),
            specialization = COALESCE(?, specialization),
            experience = COALESCE(?, experience)
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(update.name.as_deref())
    .bind(update.specialization)
    .bind(update.experience)
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| DbError::NotFound(format!("doctor {id}")))?;

    Ok(doctor)
}

pub async fn update_password<'e>(
    executor: impl SqliteExecutor<'e>,
    email: &str,
    password_hash: &str,
) -> DbResult<bool> {
    let result = sqlx::query("UPDATE doctors SET password_hash = ? WHERE email = ?")
        .bind(password_hash)
        .bind(email)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Remove o médico junto com suas consultas, prescrições e códigos
pub async fn delete_cascade(pool: &SqlitePool, id: i64) -> DbResult<bool> {
    let mut tx = pool.begin().await?;

    let appointments = delete_owned_appointments(&mut *tx, AppointmentOwner::Doctor(id)).await?;

    let deleted = sqlx::query("DELETE FROM doctors WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;

    if deleted > 0 {
        info!(doctor_id = id, appointments, "Médico removido em cascata");
    }
    Ok(deleted > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Specialization;
    use crate::test_utils::{memory_pool, new_doctor};
    use anyhow::Result;

    #[tokio::test]
    async fn test_insert_and_find() -> Result<()> {
        let pool = memory_pool().await?;

        let doctor = insert(&pool, &new_doctor("house@example.com")).await?;
        assert_eq!(doctor.specialization, Specialization::GeneralMedicine);

        let by_id = find(&pool, doctor.id).await?.expect("médico existe");
        assert_eq!(by_id.email, "house@example.com");

        assert!(email_exists(&pool, "house@example.com").await?);
        assert!(!email_exists(&pool, "wilson@example.com").await?);
        assert!(find_by_email(&pool, "wilson@example.com").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_email_is_constraint_violation() -> Result<()> {
        let pool = memory_pool().await?;
        insert(&pool, &new_doctor("dup@example.com")).await?;

        let err = insert(&pool, &new_doctor("dup@example.com")).await.unwrap_err();
        assert!(err.is_constraint_violation(), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn test_negative_experience_rejected() -> Result<()> {
        let pool = memory_pool().await?;
        let mut doctor = new_doctor("neg@example.com");
        doctor.experience = -1;
        assert!(insert(&pool, &doctor).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_update_profile_keeps_missing_fields() -> Result<()> {
        let pool = memory_pool().await?;
        let doctor = insert(&pool, &new_doctor("cuddy@example.com")).await?;

        let updated = update_profile(
            &pool,
            doctor.id,
            &DoctorProfileUpdate {
                specialization: Some(Specialization::Neurology),
                ..Default::default()
            },
        )
        .await?;

        assert_eq!(updated.name, doctor.name);
        assert_eq!(updated.experience, doctor.experience);
        assert_eq!(updated.specialization, Specialization::Neurology);

        let missing = update_profile(&pool, 9999, &DoctorProfileUpdate::default()).await;
        assert!(matches!(missing, Err(DbError::NotFound(_))));
        Ok(())
    }
}
