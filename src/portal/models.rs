use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::identity::Role;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub name: String,
    pub relationship: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: String,
    pub name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    pub blood_type: String,
    pub allergies: Vec<String>,
    pub conditions: Vec<String>,
    pub contact_phone: String,
    pub contact_email: String,
    pub emergency_contact: EmergencyContact,
    pub primary_care_provider: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub id: String,
    pub name: String,
    pub specialty: String,
    pub license_number: String,
    pub department: String,
    pub contact_phone: String,
    pub contact_email: String,
    pub availability: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
    NoShow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub patient_id: String,
    pub patient_name: String,
    pub provider_id: String,
    pub provider_name: String,
    pub date_time: NaiveDateTime,
    pub duration_minutes: u32,
    pub status: AppointmentStatus,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefillInfo {
    pub remaining: u32,
    pub last_filled: NaiveDate,
    pub pharmacy: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrescriptionStatus {
    Active,
    Completed,
    Cancelled,
}

/// A provider-written prescription. Saving one always (re)activates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: String,
    pub patient_id: String,
    pub provider_id: String,
    pub medication: String,
    pub dosage: String,
    pub frequency: String,
    #[serde(default)]
    pub instructions: Option<String>,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub status: PrescriptionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medication {
    pub id: String,
    pub patient_id: String,
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub instructions: String,
    pub prescribed_by_id: String,
    #[serde(default)]
    pub refill: Option<RefillInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthUpdateKind {
    Vital,
    Lab,
    Procedure,
    Appointment,
    Medication,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthUpdate {
    pub id: String,
    pub patient_id: String,
    pub date: NaiveDateTime,
    #[serde(rename = "type")]
    pub kind: HealthUpdateKind,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub related_to_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordCategory {
    Lab,
    Prescription,
    Diagnosis,
    Imaging,
    Procedure,
}

impl RecordCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordCategory::Lab => "lab",
            RecordCategory::Prescription => "prescription",
            RecordCategory::Diagnosis => "diagnosis",
            RecordCategory::Imaging => "imaging",
            RecordCategory::Procedure => "procedure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicalRecord {
    pub id: String,
    pub patient_id: String,
    pub category: RecordCategory,
    pub title: String,
    pub date: NaiveDate,
    pub provider_id: String,
    pub provider_name: String,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_role: Role,
    pub recipient_id: String,
    pub recipient_name: String,
    pub timestamp: NaiveDateTime,
    pub content: String,
    pub read: bool,
    #[serde(default)]
    pub attachments: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_open(&self) -> bool {
        !matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub assigned_to_id: String,
    pub assigned_by_id: String,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub due: Option<NaiveDateTime>,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub category: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Article,
    Video,
    Infographic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EducationalResource {
    pub id: String,
    pub title: String,
    pub description: String,
    pub categories: Vec<String>,
    pub content_type: ContentType,
    pub url: String,
    pub tags: Vec<String>,
    pub created_at: NaiveDate,
    #[serde(default)]
    pub updated_at: Option<NaiveDate>,
}
