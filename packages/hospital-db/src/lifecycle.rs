//! Ciclo de vida de consultas e prescrições
//!
//! Todas as operações verificam primeiro a posse da consulta: o médico (ou
//! paciente) da sessão precisa ser o dono do registro. As transições de status
//! não são guardadas por uma máquina de estados; qualquer status de destino
//! permitido pode ser aplicado a partir de qualquer status atual.

use crate::error::DbError;
use crate::models::{Appointment, AppointmentChanges, AppointmentStatus, Prescription, PrescriptionItem};
use crate::repository::{appointments, medicines, prescriptions};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashSet;
use thiserror::Error;
use tracing::info;

/// Erros do ciclo de vida de consultas
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Appointment {0} not found")]
    AppointmentNotFound(i64),

    #[error("Appointment {0} does not belong to the current user")]
    NotOwner(i64),

    #[error("Medicine {0} not found")]
    UnknownMedicine(i64),

    #[error("Status {0} cannot be set by a doctor")]
    InvalidTarget(AppointmentStatus),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<sqlx::Error> for LifecycleError {
    fn from(error: sqlx::Error) -> Self {
        LifecycleError::Db(DbError::from(error))
    }
}

pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;

/// Quem está agindo sobre a consulta
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Doctor(i64),
    Patient(i64),
}

impl Actor {
    fn owns(&self, appointment: &Appointment) -> bool {
        match self {
            Actor::Doctor(id) => appointment.doctor_id == *id,
            Actor::Patient(id) => appointment.patient_id == *id,
        }
    }
}

/// Resultado da substituição das prescrições de uma consulta
#[derive(Debug, Clone)]
pub struct PrescriptionOutcome {
    pub appointment: Appointment,
    pub prescriptions: Vec<Prescription>,
}

async fn owned_appointment(
    conn: &mut SqliteConnection,
    appointment_id: i64,
    actor: Actor,
) -> LifecycleResult<Appointment> {
    let appointment = appointments::find(&mut *conn, appointment_id)
        .await?
        .ok_or(LifecycleError::AppointmentNotFound(appointment_id))?;

    if !actor.owns(&appointment) {
        return Err(LifecycleError::NotOwner(appointment_id));
    }
    Ok(appointment)
}

/// Busca uma consulta verificando a posse
pub async fn find_owned(
    pool: &SqlitePool,
    appointment_id: i64,
    actor: Actor,
) -> LifecycleResult<Appointment> {
    let mut conn = pool.acquire().await?;
    owned_appointment(&mut conn, appointment_id, actor).await
}

/// Aplica um novo status a uma consulta do médico.
///
/// Aceita `Approved`, `Completed` e `Cancelled`.
pub async fn transition(
    pool: &SqlitePool,
    appointment_id: i64,
    doctor_id: i64,
    target: AppointmentStatus,
) -> LifecycleResult<Appointment> {
    if target == AppointmentStatus::Pending {
        return Err(LifecycleError::InvalidTarget(target));
    }

    let mut tx = pool.begin().await?;
    let current = owned_appointment(&mut tx, appointment_id, Actor::Doctor(doctor_id)).await?;
    let updated = appointments::update_status(&mut *tx, appointment_id, target).await?;
    tx.commit().await?;

    info!(
        appointment_id,
        doctor_id,
        from = %current.status,
        to = %target,
        "Transição de status da consulta"
    );
    Ok(updated)
}

pub async fn approve(
    pool: &SqlitePool,
    appointment_id: i64,
    doctor_id: i64,
) -> LifecycleResult<Appointment> {
    transition(pool, appointment_id, doctor_id, AppointmentStatus::Approved).await
}

pub async fn complete(
    pool: &SqlitePool,
    appointment_id: i64,
    doctor_id: i64,
) -> LifecycleResult<Appointment> {
    transition(pool, appointment_id, doctor_id, AppointmentStatus::Completed).await
}

/// Rejeita a consulta (status `Cancelled`)
pub async fn reject(
    pool: &SqlitePool,
    appointment_id: i64,
    doctor_id: i64,
) -> LifecycleResult<Appointment> {
    transition(pool, appointment_id, doctor_id, AppointmentStatus::Cancelled).await
}

/// Cancelamento pedido pelo próprio paciente
pub async fn cancel_by_patient(
    pool: &SqlitePool,
    appointment_id: i64,
    patient_id: i64,
) -> LifecycleResult<Appointment> {
    let mut tx = pool.begin().await?;
    owned_appointment(&mut tx, appointment_id, Actor::Patient(patient_id)).await?;
    let updated =
        appointments::update_status(&mut *tx, appointment_id, AppointmentStatus::Cancelled)
            .await?;
    tx.commit().await?;

    info!(appointment_id, patient_id, "Consulta cancelada pelo paciente");
    Ok(updated)
}

/// Alteração de médico, serviço, data, horário e observações pelo paciente
pub async fn reschedule(
    pool: &SqlitePool,
    appointment_id: i64,
    patient_id: i64,
    changes: &AppointmentChanges,
) -> LifecycleResult<Appointment> {
    let mut tx = pool.begin().await?;
    owned_appointment(&mut tx, appointment_id, Actor::Patient(patient_id)).await?;
    let updated = appointments::update_details(&mut *tx, appointment_id, changes).await?;
    tx.commit().await?;
    Ok(updated)
}

/// Remove a consulta (e dependentes) se ela pertence ao ator
pub async fn delete(pool: &SqlitePool, appointment_id: i64, actor: Actor) -> LifecycleResult<()> {
    find_owned(pool, appointment_id, actor).await?;
    appointments::delete_cascade(pool, appointment_id).await?;
    Ok(())
}

/// Substitui o conjunto de prescrições de uma consulta e a conclui.
///
/// Apaga as prescrições e sugestões anteriores, cria uma prescrição por
/// medicamento enviado (ids repetidos contam uma vez, valendo a primeira
/// ocorrência) e força o status `Completed`. Tudo roda em uma transação: um
/// medicamento inexistente desfaz a operação inteira.
pub async fn replace_prescriptions(
    pool: &SqlitePool,
    appointment_id: i64,
    doctor_id: i64,
    items: &[PrescriptionItem],
) -> LifecycleResult<PrescriptionOutcome> {
    let mut tx = pool.begin().await?;
    owned_appointment(&mut tx, appointment_id, Actor::Doctor(doctor_id)).await?;

    let removed = prescriptions::delete_for_appointment(&mut *tx, appointment_id).await?;
    appointments::clear_suggested_medicines(&mut *tx, appointment_id).await?;

    let mut seen = HashSet::new();
    let mut created = Vec::with_capacity(items.len());
    for item in items.iter().filter(|item| seen.insert(item.medicine_id)) {
        if medicines::find(&mut *tx, item.medicine_id).await?.is_none() {
            return Err(LifecycleError::UnknownMedicine(item.medicine_id));
        }

        created.push(prescriptions::insert(&mut *tx, appointment_id, item).await?);
        appointments::add_suggested_medicine(&mut *tx, appointment_id, item.medicine_id).await?;
    }

    let appointment =
        appointments::update_status(&mut *tx, appointment_id, AppointmentStatus::Completed)
            .await?;
    tx.commit().await?;

    info!(
        appointment_id,
        doctor_id,
        removed,
        prescribed = created.len(),
        "Prescrições substituídas"
    );

    Ok(PrescriptionOutcome {
        appointment,
        prescriptions: created,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Frequency, MedicineCategory, NewAppointment, Service, TreatmentDuration};
    use crate::repository::{confirmation_codes, doctors, patients};
    use crate::test_utils::{memory_pool, new_doctor, new_patient, seed_medicine};
    use anyhow::Result;
    use chrono::{NaiveDate, NaiveTime};

    struct Fixture {
        pool: SqlitePool,
        doctor_id: i64,
        other_doctor_id: i64,
        patient_id: i64,
        appointment_id: i64,
    }

    async fn fixture() -> Result<Fixture> {
        let pool = memory_pool().await?;
        let doctor = doctors::insert(&pool, &new_doctor("owner@example.com")).await?;
        let other = doctors::insert(&pool, &new_doctor("other@example.com")).await?;
        let patient = patients::insert(&pool, &new_patient("patient@example.com")).await?;
        let appointment = appointments::insert(
            &pool,
            &NewAppointment {
                patient_id: patient.id,
                doctor_id: doctor.id,
                service: Service::DentalCare,
                date: NaiveDate::from_ymd_opt(2026, 4, 15).unwrap(),
                time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                notes: None,
            },
        )
        .await?;

        Ok(Fixture {
            pool,
            doctor_id: doctor.id,
            other_doctor_id: other.id,
            patient_id: patient.id,
            appointment_id: appointment.id,
        })
    }

    async fn prescribed_medicine_ids(pool: &SqlitePool, appointment_id: i64) -> Result<Vec<i64>> {
        Ok(sqlx::query_scalar(
            "SELECT medicine_id FROM prescriptions WHERE appointment_id = ? ORDER BY medicine_id",
        )
        .bind(appointment_id)
        .fetch_all(pool)
        .await?)
    }

    #[tokio::test]
    async fn test_transitions_by_owner() -> Result<()> {
        let f = fixture().await?;

        let approved = approve(&f.pool, f.appointment_id, f.doctor_id).await?;
        assert_eq!(approved.status, AppointmentStatus::Approved);

        let completed = complete(&f.pool, f.appointment_id, f.doctor_id).await?;
        assert_eq!(completed.status, AppointmentStatus::Completed);

        let cancelled = reject(&f.pool, f.appointment_id, f.doctor_id).await?;
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);

        // Sem máquina de estados: Cancelled -> Approved é permitido
        let reopened = approve(&f.pool, f.appointment_id, f.doctor_id).await?;
        assert_eq!(reopened.status, AppointmentStatus::Approved);
        Ok(())
    }

    #[tokio::test]
    async fn test_transition_rejects_other_doctor() -> Result<()> {
        let f = fixture().await?;

        let err = approve(&f.pool, f.appointment_id, f.other_doctor_id).await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotOwner(id) if id == f.appointment_id));

        let unchanged = appointments::find(&f.pool, f.appointment_id).await?.unwrap();
        assert_eq!(unchanged.status, AppointmentStatus::Pending);

        let missing = approve(&f.pool, 9999, f.doctor_id).await.unwrap_err();
        assert!(matches!(missing, LifecycleError::AppointmentNotFound(9999)));
        Ok(())
    }

    #[tokio::test]
    async fn test_pending_is_not_a_target() -> Result<()> {
        let f = fixture().await?;
        let err = transition(&f.pool, f.appointment_id, f.doctor_id, AppointmentStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTarget(AppointmentStatus::Pending)));
        Ok(())
    }

    #[tokio::test]
    async fn test_resubmission_replaces_prescriptions() -> Result<()> {
        let f = fixture().await?;
        let m1 = seed_medicine(&f.pool, "Amoxicilina", MedicineCategory::Dental).await?;
        let m2 = seed_medicine(&f.pool, "Ibuprofeno", MedicineCategory::General).await?;
        let m3 = seed_medicine(&f.pool, "Clorexidina", MedicineCategory::Dental).await?;

        replace_prescriptions(
            &f.pool,
            f.appointment_id,
            f.doctor_id,
            &[PrescriptionItem::new(m1.id), PrescriptionItem::new(m2.id)],
        )
        .await?;
        assert_eq!(prescribed_medicine_ids(&f.pool, f.appointment_id).await?, vec![m1.id, m2.id]);

        let outcome = replace_prescriptions(
            &f.pool,
            f.appointment_id,
            f.doctor_id,
            &[PrescriptionItem {
                medicine_id: m3.id,
                frequency: Frequency::AfterMeals,
                duration: TreatmentDuration::SevenDays,
                instructions: Some("Bochechar".to_string()),
            }],
        )
        .await?;

        assert_eq!(outcome.appointment.status, AppointmentStatus::Completed);
        assert_eq!(outcome.prescriptions.len(), 1);
        assert_eq!(prescribed_medicine_ids(&f.pool, f.appointment_id).await?, vec![m3.id]);

        let suggested = appointments::suggested_medicines(&f.pool, f.appointment_id).await?;
        assert_eq!(suggested.iter().map(|m| m.id).collect::<Vec<_>>(), vec![m3.id]);

        let mut conn = f.pool.acquire().await?;
        let listed = prescriptions::list_for_appointment(&mut conn, f.appointment_id).await?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].medicine.name, "Clorexidina");
        assert_eq!(listed[0].prescription.frequency, Frequency::AfterMeals);
        assert_eq!(listed[0].prescription.instructions.as_deref(), Some("Bochechar"));
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_medicine_ids_collapse() -> Result<()> {
        let f = fixture().await?;
        let m1 = seed_medicine(&f.pool, "Amoxicilina", MedicineCategory::Dental).await?;

        let mut second = PrescriptionItem::new(m1.id);
        second.frequency = Frequency::OnceWeekly;

        let outcome = replace_prescriptions(
            &f.pool,
            f.appointment_id,
            f.doctor_id,
            &[PrescriptionItem::new(m1.id), second],
        )
        .await?;

        assert_eq!(outcome.prescriptions.len(), 1);
        assert_eq!(outcome.prescriptions[0].frequency, Frequency::TwiceDaily);
        assert_eq!(prescriptions::count_for_appointment(&f.pool, f.appointment_id).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_medicine_rolls_back() -> Result<()> {
        let f = fixture().await?;
        let m1 = seed_medicine(&f.pool, "Amoxicilina", MedicineCategory::Dental).await?;

        replace_prescriptions(&f.pool, f.appointment_id, f.doctor_id, &[PrescriptionItem::new(m1.id)])
            .await?;
        approve(&f.pool, f.appointment_id, f.doctor_id).await?;

        let err = replace_prescriptions(
            &f.pool,
            f.appointment_id,
            f.doctor_id,
            &[PrescriptionItem::new(m1.id), PrescriptionItem::new(777)],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LifecycleError::UnknownMedicine(777)));

        // Estado anterior preservado
        assert_eq!(prescribed_medicine_ids(&f.pool, f.appointment_id).await?, vec![m1.id]);
        let appointment = appointments::find(&f.pool, f.appointment_id).await?.unwrap();
        assert_eq!(appointment.status, AppointmentStatus::Approved);
        Ok(())
    }

    #[tokio::test]
    async fn test_replace_requires_owner() -> Result<()> {
        let f = fixture().await?;
        let m1 = seed_medicine(&f.pool, "Amoxicilina", MedicineCategory::Dental).await?;

        let err = replace_prescriptions(
            &f.pool,
            f.appointment_id,
            f.other_doctor_id,
            &[PrescriptionItem::new(m1.id)],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LifecycleError::NotOwner(_)));
        assert!(prescribed_medicine_ids(&f.pool, f.appointment_id).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_submission_completes_without_prescriptions() -> Result<()> {
        let f = fixture().await?;
        let outcome = replace_prescriptions(&f.pool, f.appointment_id, f.doctor_id, &[]).await?;
        assert!(outcome.prescriptions.is_empty());
        assert_eq!(outcome.appointment.status, AppointmentStatus::Completed);
        Ok(())
    }

    #[tokio::test]
    async fn test_patient_cancel_reschedule_and_delete() -> Result<()> {
        let f = fixture().await?;

        let cancelled = cancel_by_patient(&f.pool, f.appointment_id, f.patient_id).await?;
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);

        let moved = reschedule(
            &f.pool,
            f.appointment_id,
            f.patient_id,
            &AppointmentChanges {
                doctor_id: f.other_doctor_id,
                service: Service::EyeExamination,
                date: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
                time: NaiveTime::from_hms_opt(16, 45, 0).unwrap(),
                notes: Some("Visão turva".to_string()),
            },
        )
        .await?;
        assert_eq!(moved.doctor_id, f.other_doctor_id);
        assert_eq!(moved.relevant_category(), MedicineCategory::Ophthalmology);

        let wrong_patient = delete(&f.pool, f.appointment_id, Actor::Patient(f.patient_id + 100))
            .await
            .unwrap_err();
        assert!(matches!(wrong_patient, LifecycleError::NotOwner(_)));

        delete(&f.pool, f.appointment_id, Actor::Patient(f.patient_id)).await?;
        assert!(appointments::find(&f.pool, f.appointment_id).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_account_deletion_cascades() -> Result<()> {
        let f = fixture().await?;
        let m1 = seed_medicine(&f.pool, "Amoxicilina", MedicineCategory::Dental).await?;
        replace_prescriptions(&f.pool, f.appointment_id, f.doctor_id, &[PrescriptionItem::new(m1.id)])
            .await?;
        confirmation_codes::issue(&f.pool, f.patient_id, f.appointment_id).await?;

        assert!(doctors::delete_cascade(&f.pool, f.doctor_id).await?);

        for table in ["appointments", "prescriptions", "appointment_medicines", "confirmation_codes"] {
            let remaining: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&f.pool)
                .await?;
            assert_eq!(remaining, 0, "{table} deveria estar vazia");
        }

        // O catálogo e o paciente permanecem
        assert!(medicines::find(&f.pool, m1.id).await?.is_some());
        assert!(patients::find(&f.pool, f.patient_id).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_patient_deletion_cascades() -> Result<()> {
        let f = fixture().await?;
        confirmation_codes::issue(&f.pool, f.patient_id, f.appointment_id).await?;

        assert!(patients::delete_cascade(&f.pool, f.patient_id).await?);
        assert!(appointments::find(&f.pool, f.appointment_id).await?.is_none());

        let codes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM confirmation_codes")
            .fetch_one(&f.pool)
            .await?;
        assert_eq!(codes, 0);
        assert!(doctors::find(&f.pool, f.doctor_id).await?.is_some());
        Ok(())
    }
}
