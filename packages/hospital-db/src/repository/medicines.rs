//! Repositório do catálogo de medicamentos

use crate::error::{DbError, DbResult};
use crate::models::{Medicine, MedicineCategory, MedicineUpdate, NewMedicine};
use chrono::Utc;
use sqlx::{SqliteExecutor, SqlitePool};
use std::collections::HashMap;
use tracing::info;

pub async fn find<'e>(executor: impl SqliteExecutor<'e>, id: i64) -> DbResult<Option<Medicine>> {
    let medicine = sqlx::query_as::<_, Medicine>("SELECT * FROM medicines WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(medicine)
}

/// Catálogo completo, ordenado por categoria e nome
pub async fn list<'e>(executor: impl SqliteExecutor<'e>) -> DbResult<Vec<Medicine>> {
    let medicines =
        sqlx::query_as::<_, Medicine>("SELECT * FROM medicines ORDER BY category, name, id")
            .fetch_all(executor)
            .await?;
    Ok(medicines)
}

pub async fn list_by_category<'e>(
    executor: impl SqliteExecutor<'e>,
    category: MedicineCategory,
) -> DbResult<Vec<Medicine>> {
    let medicines = sqlx::query_as::<_, Medicine>(
        "SELECT * FROM medicines WHERE category = ? ORDER BY name, id",
    )
    .bind(category)
    .fetch_all(executor)
    .await?;
    Ok(medicines)
}

/// Catálogo agrupado na ordem das categorias, omitindo categorias vazias
pub async fn grouped_by_category<'e>(
    executor: impl SqliteExecutor<'e>,
) -> DbResult<Vec<(MedicineCategory, Vec<Medicine>)>> {
    let mut by_category: HashMap<MedicineCategory, Vec<Medicine>> = HashMap::new();
    for medicine in list(executor).await? {
        by_category.entry(medicine.category).or_default().push(medicine);
    }

    Ok(MedicineCategory::ALL
        .iter()
        .filter_map(|category| by_category.remove(category).map(|meds| (*category, meds)))
        .collect())
}

pub async fn count<'e>(executor: impl SqliteExecutor<'e>) -> DbResult<i64> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM medicines")
        .fetch_one(executor)
        .await?;
    Ok(total)
}

pub async fn insert<'e>(executor: impl SqliteExecutor<'e>, new: &NewMedicine) -> DbResult<Medicine> {
    let medicine = sqlx::query_as::<_, Medicine>(
        r#"
        INSERT INTO medicines (name, med_type, dosage, category, description, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&new.name)
    .bind(new.med_type)
    .bind(&new.dosage)
    .bind(new.category)
    .bind(new.description.as_deref())
    .bind(Utc::now())
    .fetch_one(executor)
    .await?;

    info!(medicine_id = medicine.id, "Medicamento adicionado ao catálogo");
    Ok(medicine)
}

pub async fn update<'e>(
    executor: impl SqliteExecutor<'e>,
    id: i64,
    update: &MedicineUpdate,
) -> DbResult<Medicine> {
    let medicine = sqlx::query_as::<_, Medicine>(
        r#"
        UPDATE medicines
        SET name = COALESCE(?, name),
            med_type = COALESCE(?, med_type),
            dosage = COALESCE(?, dosage),
            category = COALESCE(?, category),
            description = CASE WHEN ? THEN ? ELSE description END
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(update.name.as_deref())
    .bind(update.med_type)
    .bind(update.dosage.as_deref())
    .bind(update.category)
    .bind(update.description.is_some())
    .bind(update.description.clone().flatten())
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| DbError::NotFound(format!("medicine {id}")))?;

    Ok(medicine)
}

/// Remove o medicamento, suas prescrições e as sugestões que o referenciam
pub async fn delete_cascade(pool: &SqlitePool, id: i64) -> DbResult<bool> {
    let mut tx = pool.begin().await?;

    for dependant in ["prescriptions", "appointment_medicines"] {
        sqlx::query(&format!("DELETE FROM {dependant} WHERE medicine_id = ?"))
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }

    let deleted = sqlx::query("DELETE FROM medicines WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;
    Ok(deleted > 0)
}
