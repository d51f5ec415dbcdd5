//! Repositórios explícitos sobre o pool SQLite
//!
//! Cada submódulo expõe funções `find`/`insert`/`update`/`delete_cascade` para
//! uma entidade. As funções de leitura e escrita simples aceitam qualquer
//! executor (pool, conexão ou transação); as exclusões em cascata abrem a
//! própria transação e removem os dependentes explicitamente, na ordem
//! prescrições → sugestões → códigos → consultas → registro.

pub mod appointments;
pub mod confirmation_codes;
pub mod doctors;
pub mod medicines;
pub mod patients;
pub mod prescriptions;

use crate::error::DbResult;
use sqlx::SqliteConnection;

/// Dono de um conjunto de consultas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentOwner {
    Doctor(i64),
    Patient(i64),
}

impl AppointmentOwner {
    fn column(&self) -> &'static str {
        match self {
            AppointmentOwner::Doctor(_) => "doctor_id",
            AppointmentOwner::Patient(_) => "patient_id",
        }
    }

    fn id(&self) -> i64 {
        match self {
            AppointmentOwner::Doctor(id) | AppointmentOwner::Patient(id) => *id,
        }
    }
}

/// Remove as consultas de um médico/paciente e tudo que depende delas.
///
/// Deve rodar dentro de uma transação aberta pelo chamador.
pub(crate) async fn delete_owned_appointments(
    conn: &mut SqliteConnection,
    owner: AppointmentOwner,
) -> DbResult<u64> {
    let column = owner.column();
    let owned = format!("SELECT id FROM appointments WHERE {column} = ?");

    for dependant in ["prescriptions", "appointment_medicines", "confirmation_codes"] {
        sqlx::query(&format!(
            "DELETE FROM {dependant} WHERE appointment_id IN ({owned})"
        ))
        .bind(owner.id())
        .execute(&mut *conn)
        .await?;
    }

    let deleted = sqlx::query(&format!("DELETE FROM appointments WHERE {column} = ?"))
        .bind(owner.id())
        .execute(&mut *conn)
        .await?
        .rows_affected();

    Ok(deleted)
}
