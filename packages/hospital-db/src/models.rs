//! Modelos de dados do portal hospitalar
//!
//! Este módulo define as estruturas de dados principais (médicos, pacientes,
//! catálogo de medicamentos, consultas, prescrições e códigos de confirmação)
//! e as enumerações de escolha fixas. As enumerações são gravadas no banco e
//! serializadas em JSON pelo seu rótulo ("Dental Care", "Twice daily", ...).

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Valor recebido que não pertence a uma enumeração de escolha
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Valor inválido para {kind}: {value}")]
pub struct ChoiceError {
    pub kind: &'static str,
    pub value: String,
}

/// Gera uma enumeração de escolha fixa com conversões de texto, serde e sqlx.
///
/// Cada variante tem um valor (gravado no banco) e um rótulo de exibição.
macro_rules! choice_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $value:literal),+ $(,)? }
    ) => {
        choice_enum! {
            $(#[$meta])*
            $name { $($variant => ($value, $value)),+ }
        }
    };
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => ($value:literal, $label:literal)),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Todas as variantes, na ordem de exibição
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Valor persistido
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $value),+
                }
            }

            /// Rótulo exibido nos formulários
            pub fn label(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            /// Pares (valor, rótulo) para montar seletores
            pub fn choices() -> Vec<Choice> {
                Self::ALL
                    .iter()
                    .map(|c| Choice { value: c.as_str(), label: c.label() })
                    .collect()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ChoiceError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($value => Ok($name::$variant),)+
                    other => Err(ChoiceError {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }

        impl sqlx::Type<sqlx::Sqlite> for $name {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <str as sqlx::Type<sqlx::Sqlite>>::type_info()
            }

            fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
                <str as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> sqlx::encode::IsNull {
                <&str as sqlx::Encode<'q, sqlx::Sqlite>>::encode(self.as_str(), buf)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $name {
            fn decode(
                value: sqlx::sqlite::SqliteValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let raw = <&str as sqlx::Decode<'r, sqlx::Sqlite>>::decode(value)?;
                Ok(raw.parse::<$name>()?)
            }
        }
    };
}

/// Par valor/rótulo de uma enumeração de escolha
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub value: &'static str,
    pub label: &'static str,
}

choice_enum! {
    /// Especialidade do médico
    Specialization {
        GeneralMedicine => "General Medicine",
        Cardiology => "Cardiology",
        Dermatology => "Dermatology",
        Orthopedics => "Orthopedics",
        Pediatrics => "Pediatrics",
        Neurology => "Neurology",
        Ophthalmology => "Ophthalmology",
        Ent => "ENT",
        Dentistry => "Dentistry",
        Psychiatry => "Psychiatry",
    }
}

choice_enum! {
    /// Forma farmacêutica do medicamento
    MedicineType {
        Tablet => "Tablet",
        Capsule => "Capsule",
        Syrup => "Syrup",
        Injection => "Injection",
        Ointment => "Ointment",
        Drops => "Drops",
        Inhaler => "Inhaler",
    }
}

choice_enum! {
    /// Categoria médica do medicamento
    MedicineCategory {
        General => "General",
        Dental => "Dental",
        Cardiology => "Cardiology",
        Ophthalmology => "Ophthalmology",
        Dermatology => "Dermatology",
        Orthopedics => "Orthopedics",
        Pediatrics => "Pediatrics",
        Neurology => "Neurology",
        Ent => "ENT",
        Psychiatry => "Psychiatry",
    }
}

impl Default for MedicineCategory {
    fn default() -> Self {
        MedicineCategory::General
    }
}

choice_enum! {
    /// Serviço solicitado na consulta
    Service {
        GeneralCheckup => "General Checkup",
        DentalCare => "Dental Care",
        CardiologyConsultation => "Cardiology Consultation",
        EyeExamination => "Eye Examination",
        SkinTreatment => "Skin Treatment",
        OrthopedicConsultation => "Orthopedic Consultation",
        PediatricCare => "Pediatric Care",
        NeurologicalAssessment => "Neurological Assessment",
        EntConsultation => "ENT Consultation",
        MentalHealthCounseling => "Mental Health Counseling",
    }
}

impl Service {
    /// Categoria de medicamentos sugerida para o serviço.
    ///
    /// Usada apenas para pré-filtrar sugestões no painel do médico; qualquer
    /// medicamento do catálogo pode ser prescrito.
    pub fn relevant_category(&self) -> MedicineCategory {
        match self {
            Service::GeneralCheckup => MedicineCategory::General,
            Service::DentalCare => MedicineCategory::Dental,
            Service::CardiologyConsultation => MedicineCategory::Cardiology,
            Service::EyeExamination => MedicineCategory::Ophthalmology,
            Service::SkinTreatment => MedicineCategory::Dermatology,
            Service::OrthopedicConsultation => MedicineCategory::Orthopedics,
            Service::PediatricCare => MedicineCategory::Pediatrics,
            Service::NeurologicalAssessment => MedicineCategory::Neurology,
            Service::EntConsultation => MedicineCategory::Ent,
            Service::MentalHealthCounseling => MedicineCategory::Psychiatry,
        }
    }
}

choice_enum! {
    /// Status possíveis de uma consulta
    AppointmentStatus {
        Pending => "Pending",
        Approved => "Approved",
        Completed => "Completed",
        Cancelled => "Cancelled",
    }
}

impl Default for AppointmentStatus {
    fn default() -> Self {
        AppointmentStatus::Pending
    }
}

choice_enum! {
    /// Frequência de administração de um medicamento prescrito
    Frequency {
        OnceDaily => ("Once daily", "Once daily"),
        TwiceDaily => ("Twice daily", "Twice daily (Morning & Night)"),
        ThreeTimesDaily => ("Three times daily", "Three times daily"),
        FourTimesDaily => ("Four times daily", "Every 6 hours"),
        Every8Hours => ("Every 8 hours", "Every 8 hours"),
        BeforeMeals => ("Before meals", "Before meals"),
        AfterMeals => ("After meals", "After meals"),
        AtBedtime => ("At bedtime", "At bedtime only"),
        AsNeeded => ("As needed", "As needed (SOS)"),
        OnceWeekly => ("Once weekly", "Once weekly"),
    }
}

impl Default for Frequency {
    fn default() -> Self {
        Frequency::TwiceDaily
    }
}

choice_enum! {
    /// Duração do tratamento prescrito
    TreatmentDuration {
        ThreeDays => ("3 days", "3 days"),
        FiveDays => ("5 days", "5 days"),
        SevenDays => ("7 days", "1 week"),
        TenDays => ("10 days", "10 days"),
        FourteenDays => ("14 days", "2 weeks"),
        TwentyOneDays => ("21 days", "3 weeks"),
        ThirtyDays => ("30 days", "1 month"),
        SixtyDays => ("60 days", "2 months"),
        NinetyDays => ("90 days", "3 months"),
        Ongoing => ("Ongoing", "Ongoing"),
    }
}

impl Default for TreatmentDuration {
    fn default() -> Self {
        TreatmentDuration::FiveDays
    }
}

/// Médico cadastrado
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Doctor {
    pub id: i64,
    pub name: String,
    pub email: String,
    /// Hash Argon2 da senha (nunca serializado)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub specialization: Specialization,
    /// Anos de experiência
    pub experience: i64,
    pub created_at: DateTime<Utc>,
}

impl Doctor {
    pub fn display_name(&self) -> String {
        format!("Dr. {} ({})", self.name, self.specialization)
    }
}

#[derive(Debug, Clone)]
pub struct NewDoctor {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub specialization: Specialization,
    pub experience: i64,
}

/// Campos editáveis do perfil do médico; `None` mantém o valor atual
#[derive(Debug, Clone, Default)]
pub struct DoctorProfileUpdate {
    pub name: Option<String>,
    pub specialization: Option<Specialization>,
    pub experience: Option<i64>,
}

/// Paciente cadastrado
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Patient {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Telefone, somente dígitos
    pub phone: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPatient {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: String,
}

#[derive(Debug, Clone, Default)]
pub struct PatientProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
}

/// Item do catálogo de medicamentos
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Medicine {
    pub id: i64,
    pub name: String,
    pub med_type: MedicineType,
    /// Dosagem livre, ex.: "500mg", "10ml"
    pub dosage: String,
    pub category: MedicineCategory,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for Medicine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) - {}", self.name, self.med_type, self.dosage)
    }
}

#[derive(Debug, Clone)]
pub struct NewMedicine {
    pub name: String,
    pub med_type: MedicineType,
    pub dosage: String,
    pub category: MedicineCategory,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MedicineUpdate {
    pub name: Option<String>,
    pub med_type: Option<MedicineType>,
    pub dosage: Option<String>,
    pub category: Option<MedicineCategory>,
    /// `Some(None)` apaga a descrição
    pub description: Option<Option<String>>,
}

/// Representa uma consulta entre paciente e médico
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Appointment {
    pub id: i64,
    pub patient_id: i64,
    pub doctor_id: i64,
    pub service: Service,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub notes: Option<String>,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    pub fn relevant_category(&self) -> MedicineCategory {
        self.service.relevant_category()
    }
}

/// Dados de uma nova consulta (sempre criada como `Pending`)
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub patient_id: i64,
    pub doctor_id: i64,
    pub service: Service,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub notes: Option<String>,
}

/// Alterações feitas pelo paciente em uma consulta própria
#[derive(Debug, Clone)]
pub struct AppointmentChanges {
    pub doctor_id: i64,
    pub service: Service,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub notes: Option<String>,
}

/// Prescrição de um medicamento dentro de uma consulta
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Prescription {
    pub id: i64,
    pub appointment_id: i64,
    pub medicine_id: i64,
    pub frequency: Frequency,
    pub duration: TreatmentDuration,
    pub instructions: Option<String>,
    pub prescribed_at: DateTime<Utc>,
}

/// Prescrição acompanhada do medicamento do catálogo
#[derive(Debug, Clone, Serialize)]
pub struct PrescribedMedicine {
    #[serde(flatten)]
    pub prescription: Prescription,
    pub medicine: Medicine,
}

/// Item enviado pelo médico no formulário de seleção de medicamentos
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrescriptionItem {
    pub medicine_id: i64,
    pub frequency: Frequency,
    pub duration: TreatmentDuration,
    pub instructions: Option<String>,
}

impl PrescriptionItem {
    /// Item com frequência e duração padrão
    pub fn new(medicine_id: i64) -> Self {
        Self {
            medicine_id,
            frequency: Frequency::default(),
            duration: TreatmentDuration::default(),
            instructions: None,
        }
    }
}

/// Tempo de validade de um código de confirmação
pub const CONFIRMATION_CODE_TTL_MINUTES: i64 = 10;

/// Código OTP de 6 dígitos vinculado a paciente e consulta
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ConfirmationCode {
    pub id: i64,
    pub patient_id: i64,
    pub appointment_id: i64,
    pub code: String,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ConfirmationCode {
    /// Expiração para um código criado em `created_at`
    pub fn expiry_for(created_at: DateTime<Utc>) -> DateTime<Utc> {
        created_at + ChronoDuration::minutes(CONFIRMATION_CODE_TTL_MINUTES)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Contagem de consultas por status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AppointmentStatistics {
    pub total: i64,
    pub pending: i64,
    pub approved: i64,
    pub completed: i64,
    pub cancelled: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_category_mapping() {
        assert_eq!(Service::DentalCare.relevant_category(), MedicineCategory::Dental);
        assert_eq!(Service::EyeExamination.relevant_category(), MedicineCategory::Ophthalmology);
        assert_eq!(
            Service::MentalHealthCounseling.relevant_category(),
            MedicineCategory::Psychiatry
        );
        assert_eq!(Service::DentalCare.relevant_category().as_str(), "Dental");

        // Todo serviço mapeia para uma categoria distinta
        let categories: std::collections::HashSet<_> =
            Service::ALL.iter().map(|s| s.relevant_category()).collect();
        assert_eq!(categories.len(), Service::ALL.len());
    }

    #[test]
    fn test_choice_parsing() {
        assert_eq!("Dental Care".parse::<Service>(), Ok(Service::DentalCare));
        assert_eq!("ENT".parse::<Specialization>(), Ok(Specialization::Ent));
        assert_eq!("Cancelled".parse::<AppointmentStatus>(), Ok(AppointmentStatus::Cancelled));

        let err = "Canceled".parse::<AppointmentStatus>().unwrap_err();
        assert_eq!(err.kind, "AppointmentStatus");
        assert_eq!(err.value, "Canceled");
    }

    #[test]
    fn test_choice_labels() {
        assert_eq!(Frequency::FourTimesDaily.as_str(), "Four times daily");
        assert_eq!(Frequency::FourTimesDaily.label(), "Every 6 hours");
        assert_eq!(TreatmentDuration::SevenDays.label(), "1 week");
        assert_eq!(TreatmentDuration::ALL.len(), 10);
        assert_eq!(Frequency::ALL.len(), 10);
        assert_eq!(MedicineType::ALL.len(), 7);
        assert_eq!(MedicineCategory::ALL.len(), 10);
        assert_eq!(Specialization::ALL.len(), 10);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Frequency::default(), Frequency::TwiceDaily);
        assert_eq!(TreatmentDuration::default(), TreatmentDuration::FiveDays);
        assert_eq!(AppointmentStatus::default(), AppointmentStatus::Pending);
        assert_eq!(MedicineCategory::default(), MedicineCategory::General);
    }

    #[test]
    fn test_serde_uses_stored_value() {
        let json = serde_json::to_string(&Frequency::AtBedtime).unwrap();
        assert_eq!(json, "\"At bedtime\"");

        let parsed: Service = serde_json::from_str("\"Skin Treatment\"").unwrap();
        assert_eq!(parsed, Service::SkinTreatment);

        assert!(serde_json::from_str::<Service>("\"Haircut\"").is_err());
    }

    #[test]
    fn test_confirmation_code_expiry() {
        let created = Utc::now();
        let code = ConfirmationCode {
            id: 1,
            patient_id: 1,
            appointment_id: 1,
            code: "123456".to_string(),
            is_verified: false,
            created_at: created,
            expires_at: ConfirmationCode::expiry_for(created),
        };

        assert_eq!(code.expires_at - code.created_at, ChronoDuration::minutes(10));
        assert!(!code.is_expired_at(created + ChronoDuration::minutes(9)));
        assert!(code.is_expired_at(created + ChronoDuration::minutes(11)));
    }
}
