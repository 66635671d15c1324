//! Read-side queries behind the portal views. Everything here is a pure
//! function over `PortalData`; callers decide who the viewer is.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use super::fixtures::PortalData;
use super::models::*;
use crate::identity::{Profile, Role};

/// Demo personas view the portal through these fixture identities.
pub const DEMO_PATIENT_SUBJECT: &str = "p1";
pub const DEMO_PROVIDER_SUBJECT: &str = "d1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Viewer {
    pub role: Role,
    pub subject_id: String,
}

impl Viewer {
    pub fn for_profile(profile: &Profile) -> Self {
        let role = profile.role();
        let subject_id = if profile.is_demo() {
            match role {
                Role::Patient => DEMO_PATIENT_SUBJECT.to_string(),
                Role::Provider => DEMO_PROVIDER_SUBJECT.to_string(),
            }
        } else {
            profile.id().to_string()
        };
        Viewer { role, subject_id }
    }

    fn involved_in(&self, a: &Appointment) -> bool {
        match self.role {
            Role::Patient => a.patient_id == self.subject_id,
            Role::Provider => a.provider_id == self.subject_id,
        }
    }
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

fn take<T>(mut items: Vec<T>, limit: Option<usize>) -> Vec<T> {
    if let Some(n) = limit {
        items.truncate(n);
    }
    items
}

// ---------- appointments ----------

pub fn appointments_for<'a>(data: &'a PortalData, viewer: &Viewer) -> Vec<&'a Appointment> {
    let mut out: Vec<&Appointment> = data.appointments.iter().filter(|a| viewer.involved_in(a)).collect();
    out.sort_by_key(|a| a.date_time);
    out
}

/// Appointments keyed by calendar date, for the calendar markers.
pub fn appointments_by_date<'a>(data: &'a PortalData, viewer: &Viewer) -> BTreeMap<NaiveDate, Vec<&'a Appointment>> {
    let mut grouped: BTreeMap<NaiveDate, Vec<&Appointment>> = BTreeMap::new();
    for a in appointments_for(data, viewer) {
        grouped.entry(a.date_time.date()).or_default().push(a);
    }
    grouped
}

pub fn appointments_on<'a>(data: &'a PortalData, viewer: &Viewer, date: NaiveDate) -> Vec<&'a Appointment> {
    appointments_for(data, viewer).into_iter().filter(|a| a.date_time.date() == date).collect()
}

/// Scheduled appointments, soonest first.
pub fn upcoming_appointments<'a>(data: &'a PortalData, viewer: &Viewer, limit: Option<usize>) -> Vec<&'a Appointment> {
    let scheduled = appointments_for(data, viewer)
        .into_iter()
        .filter(|a| a.status == AppointmentStatus::Scheduled)
        .collect();
    take(scheduled, limit)
}

// ---------- messages ----------

pub fn messages_for<'a>(data: &'a PortalData, viewer: &Viewer) -> Vec<&'a Message> {
    let mut out: Vec<&Message> = data.messages.iter().filter(|m| m.recipient_id == viewer.subject_id).collect();
    out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    out
}

/// Case-insensitive match over sender name and body. An empty term matches all.
pub fn search_messages<'a>(data: &'a PortalData, viewer: &Viewer, term: &str, unread_only: bool) -> Vec<&'a Message> {
    let needle = term.trim().to_lowercase();
    messages_for(data, viewer)
        .into_iter()
        .filter(|m| !unread_only || !m.read)
        .filter(|m| needle.is_empty() || contains_ci(&m.sender_name, &needle) || contains_ci(&m.content, &needle))
        .collect()
}

pub fn unread_count(data: &PortalData, viewer: &Viewer) -> usize {
    messages_for(data, viewer).iter().filter(|m| !m.read).count()
}

// ---------- records ----------

fn records_visible_to<'a>(data: &'a PortalData, viewer: &Viewer) -> impl Iterator<Item = &'a MedicalRecord> {
    let viewer = viewer.clone();
    data.records.iter().filter(move |r| match viewer.role {
        Role::Patient => r.patient_id == viewer.subject_id,
        Role::Provider => true,
    })
}

/// Records matching `term` in title or category, optionally restricted to one category. Newest first.
pub fn search_records<'a>(
    data: &'a PortalData,
    viewer: &Viewer,
    term: &str,
    category: Option<RecordCategory>,
) -> Vec<&'a MedicalRecord> {
    let needle = term.trim().to_lowercase();
    let mut out: Vec<&MedicalRecord> = records_visible_to(data, viewer)
        .filter(|r| category.map(|c| r.category == c).unwrap_or(true))
        .filter(|r| needle.is_empty() || contains_ci(&r.title, &needle) || r.category.as_str().contains(&needle))
        .collect();
    out.sort_by(|a, b| b.date.cmp(&a.date));
    out
}

// ---------- tasks, medications, updates ----------

/// Tasks still open for an assignee, most urgent first then by due date.
pub fn open_tasks<'a>(data: &'a PortalData, assignee: &str) -> Vec<&'a Task> {
    let mut out: Vec<&Task> = data.tasks.iter().filter(|t| t.assigned_to_id == assignee && t.status.is_open()).collect();
    out.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.due.cmp(&b.due)));
    out
}

pub fn medications_for<'a>(data: &'a PortalData, patient_id: &str, limit: Option<usize>) -> Vec<&'a Medication> {
    take(data.medications.iter().filter(|m| m.patient_id == patient_id).collect(), limit)
}

pub fn health_updates_for<'a>(data: &'a PortalData, patient_id: &str, limit: Option<usize>) -> Vec<&'a HealthUpdate> {
    let mut out: Vec<&HealthUpdate> = data.health_updates.iter().filter(|h| h.patient_id == patient_id).collect();
    out.sort_by(|a, b| b.date.cmp(&a.date));
    take(out, limit)
}

/// Resources whose categories overlap the patient's conditions.
pub fn resources_for<'a>(data: &'a PortalData, conditions: &[String]) -> Vec<&'a EducationalResource> {
    let wanted: Vec<String> = conditions.iter().map(|c| c.to_lowercase()).collect();
    data.resources
        .iter()
        .filter(|r| {
            r.categories.iter().any(|cat| {
                let cat = cat.to_lowercase();
                wanted.iter().any(|w| w.contains(&cat) || cat.contains(w.as_str()))
            })
        })
        .collect()
}

/// Fixture patients matching a name substring or an exact id.
pub fn search_patient_records<'a>(data: &'a PortalData, term: &str) -> Vec<&'a PatientRecord> {
    let needle = term.trim().to_lowercase();
    data.patients
        .iter()
        .filter(|p| needle.is_empty() || p.id == term.trim() || contains_ci(&p.name, &needle))
        .collect()
}

// ---------- dashboards ----------

#[derive(Debug, Clone, Serialize)]
pub struct PatientDashboard<'a> {
    pub upcoming_appointments: Vec<&'a Appointment>,
    pub medications: Vec<&'a Medication>,
    pub recent_updates: Vec<&'a HealthUpdate>,
    pub resources: Vec<&'a EducationalResource>,
    pub unread_messages: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderDashboard<'a> {
    pub patient_count: usize,
    pub todays_appointments: Vec<&'a Appointment>,
    pub open_tasks: Vec<&'a Task>,
    pub unread_messages: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Dashboard<'a> {
    Patient(PatientDashboard<'a>),
    Provider(ProviderDashboard<'a>),
}

pub fn patient_dashboard<'a>(data: &'a PortalData, viewer: &Viewer) -> PatientDashboard<'a> {
    let conditions = data.patient(&viewer.subject_id).map(|p| p.conditions.clone()).unwrap_or_default();
    PatientDashboard {
        upcoming_appointments: upcoming_appointments(data, viewer, Some(2)),
        medications: medications_for(data, &viewer.subject_id, Some(3)),
        recent_updates: health_updates_for(data, &viewer.subject_id, Some(3)),
        resources: resources_for(data, &conditions),
        unread_messages: unread_count(data, viewer),
    }
}

pub fn provider_dashboard<'a>(data: &'a PortalData, viewer: &Viewer, today: NaiveDate) -> ProviderDashboard<'a> {
    ProviderDashboard {
        patient_count: data.patients.len(),
        todays_appointments: appointments_on(data, viewer, today),
        open_tasks: open_tasks(data, &viewer.subject_id),
        unread_messages: unread_count(data, viewer),
    }
}

pub fn dashboard<'a>(data: &'a PortalData, viewer: &Viewer, today: NaiveDate) -> Dashboard<'a> {
    match viewer.role {
        Role::Patient => Dashboard::Patient(patient_dashboard(data, viewer)),
        Role::Provider => Dashboard::Provider(provider_dashboard(data, viewer, today)),
    }
}
