//! Utilitários de teste: banco em memória e dados de exemplo
//!
//! Disponível nos testes internos e, com a feature `test-utils`, para os
//! testes de outras crates do workspace.

use crate::models::{
    Medicine, MedicineCategory, MedicineType, NewDoctor, NewMedicine, NewPatient, Specialization,
};
use crate::{migrations, repository};
use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

/// Hash PHC fixo usado pelos registros de exemplo. Não corresponde a nenhuma
/// senha conhecida; testes de login geram o próprio hash.
const PLACEHOLDER_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$aGFzaGhhc2hoYXNoaGFzaA";

/// Pool em memória com as migrações aplicadas.
///
/// Usa uma única conexão: cada conexão SQLite em memória é um banco separado.
pub async fn memory_pool() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    migrations::run_migrations(&pool).await?;
    Ok(pool)
}

pub fn new_doctor(email: &str) -> NewDoctor {
    NewDoctor {
        name: "Gregory House".to_string(),
        email: email.to_string(),
        password_hash: PLACEHOLDER_HASH.to_string(),
        specialization: Specialization::GeneralMedicine,
        experience: 12,
    }
}

pub fn new_patient(email: &str) -> NewPatient {
    NewPatient {
        name: "Maria Silva".to_string(),
        email: email.to_string(),
        password_hash: PLACEHOLDER_HASH.to_string(),
        phone: "11987654321".to_string(),
    }
}

pub fn new_medicine(name: &str, category: MedicineCategory) -> NewMedicine {
    NewMedicine {
        name: name.to_string(),
        med_type: MedicineType::Tablet,
        dosage: "500mg".to_string(),
        category,
        description: None,
    }
}

/// Cadastra um medicamento de exemplo no catálogo
pub async fn seed_medicine(
    pool: &SqlitePool,
    name: &str,
    category: MedicineCategory,
) -> Result<Medicine> {
    Ok(repository::medicines::insert(pool, &new_medicine(name, category)).await?)
}
