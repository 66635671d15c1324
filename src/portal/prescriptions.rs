//! Prescriptions written by providers. Unlike the fixture tables these are
//! mutable, so the book keeps them behind its own lock.

use std::collections::HashMap;

use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::models::{Prescription, PrescriptionStatus};
use super::queries::Viewer;
use crate::error::PrescriptionError;
use crate::identity::{Effect, EffectSink, Notification, Role};

/// Prescription form contents as submitted. Every field is optional here so
/// that missing ones can be reported together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrescriptionDraft {
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub medication: Option<String>,
    #[serde(default)]
    pub dosage: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

fn filled(v: &Option<String>) -> Option<String> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

struct Checked {
    patient_id: String,
    medication: String,
    dosage: String,
    frequency: String,
    instructions: Option<String>,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
}

impl PrescriptionDraft {
    fn check(&self) -> Result<Checked, PrescriptionError> {
        let patient_id = filled(&self.patient_id);
        let medication = filled(&self.medication);
        let dosage = filled(&self.dosage);
        let frequency = filled(&self.frequency);
        let (Some(patient_id), Some(medication), Some(dosage), Some(frequency), Some(start_date)) =
            (patient_id.clone(), medication.clone(), dosage.clone(), frequency.clone(), self.start_date)
        else {
            let missing = [
                ("patient_id", patient_id.is_none()),
                ("medication", medication.is_none()),
                ("dosage", dosage.is_none()),
                ("frequency", frequency.is_none()),
                ("start_date", self.start_date.is_none()),
            ]
            .into_iter()
            .filter_map(|(name, absent)| absent.then_some(name))
            .collect();
            return Err(PrescriptionError::MissingFields(missing));
        };
        if let Some(end) = self.end_date {
            if end < start_date {
                return Err(PrescriptionError::EndsBeforeStart { start: start_date, end });
            }
        }
        Ok(Checked {
            patient_id,
            medication,
            dosage,
            frequency,
            instructions: filled(&self.instructions),
            start_date,
            end_date: self.end_date,
        })
    }
}

/// Whether a submission creates a prescription or rewrites an existing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submit {
    Create,
    Update(String),
}

impl Submit {
    fn verb(&self) -> &'static str {
        match self {
            Submit::Create => "create",
            Submit::Update(_) => "update",
        }
    }
}

/// A saved prescription and the effects its submission emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prescribed {
    pub prescription: Prescription,
    pub effects: Vec<Effect>,
}

#[derive(Default)]
pub struct PrescriptionBook {
    rows: RwLock<HashMap<String, Prescription>>,
}

impl PrescriptionBook {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.rows.read().len() }

    pub fn is_empty(&self) -> bool { self.rows.read().is_empty() }

    /// Prescriptions visible to `viewer`: a patient's own, or the ones a
    /// provider wrote (optionally for one patient). Newest start date first.
    pub fn visible_to(&self, viewer: &Viewer, patient: Option<&str>) -> Vec<Prescription> {
        let mut out: Vec<Prescription> = self
            .rows
            .read()
            .values()
            .filter(|rx| match viewer.role {
                Role::Patient => rx.patient_id == viewer.subject_id,
                Role::Provider => rx.provider_id == viewer.subject_id && patient.map_or(true, |p| rx.patient_id == p),
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| b.start_date.cmp(&a.start_date).then_with(|| a.medication.cmp(&b.medication)));
        out
    }

    /// Validate and save a prescription form. Success and failure are both
    /// reported through `sink`; the returned effects repeat what was sent.
    pub fn submit(
        &self,
        author: Option<&Viewer>,
        target: Submit,
        draft: &PrescriptionDraft,
        patient_known: &dyn Fn(&str) -> bool,
        sink: &dyn EffectSink,
    ) -> Result<Prescribed, PrescriptionError> {
        match self.save(author, &target, draft, patient_known) {
            Ok(prescription) => {
                let note = match target {
                    Submit::Create => Notification::success("Prescription created successfully"),
                    Submit::Update(_) => Notification::success("Prescription updated successfully"),
                };
                info!(
                    target: "portal",
                    id = %prescription.id,
                    patient = %prescription.patient_id,
                    provider = %prescription.provider_id,
                    "prescription {}d", target.verb()
                );
                let effects = vec![Effect::Notify(note)];
                sink.dispatch(&effects);
                Ok(Prescribed { prescription, effects })
            }
            Err(e) => {
                sink.notify(&failure_notice(&target, &e));
                Err(e)
            }
        }
    }

    fn save(
        &self,
        author: Option<&Viewer>,
        target: &Submit,
        draft: &PrescriptionDraft,
        patient_known: &dyn Fn(&str) -> bool,
    ) -> Result<Prescription, PrescriptionError> {
        let checked = draft.check()?;
        let author = author.ok_or(PrescriptionError::NoProvider)?;
        if author.role != Role::Provider {
            return Err(PrescriptionError::NotProvider);
        }
        if !patient_known(&checked.patient_id) {
            return Err(PrescriptionError::UnknownPatient(checked.patient_id));
        }
        let mut rows = self.rows.write();
        let id = match target {
            Submit::Create => uuid::Uuid::new_v4().to_string(),
            Submit::Update(id) => {
                let existing = rows.get(id).ok_or_else(|| PrescriptionError::NotFound(id.clone()))?;
                if existing.provider_id != author.subject_id {
                    return Err(PrescriptionError::NotAuthor(id.clone()));
                }
                id.clone()
            }
        };
        let rx = Prescription {
            id: id.clone(),
            patient_id: checked.patient_id,
            provider_id: author.subject_id.clone(),
            medication: checked.medication,
            dosage: checked.dosage,
            frequency: checked.frequency,
            instructions: checked.instructions,
            start_date: checked.start_date,
            end_date: checked.end_date,
            status: PrescriptionStatus::Active,
        };
        rows.insert(id, rx.clone());
        Ok(rx)
    }
}

fn failure_notice(target: &Submit, err: &PrescriptionError) -> Notification {
    match err {
        PrescriptionError::MissingFields(_) => Notification::error("Please fill out all required fields").describe(err.to_string()),
        PrescriptionError::NoProvider => Notification::error("Provider information not available"),
        _ => {
            let headline = match target {
                Submit::Create => "Failed to create prescription",
                Submit::Update(_) => "Failed to update prescription",
            };
            Notification::error(headline).describe(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::NoticeKind;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Notes(Mutex<Vec<Notification>>);

    impl EffectSink for Notes {
        fn navigate(&self, _: &crate::identity::Navigation) {}

        fn notify(&self, note: &Notification) { self.0.lock().push(note.clone()); }
    }

    impl Notes {
        fn last(&self) -> Notification { self.0.lock().last().cloned().expect("a notification") }
    }

    fn doctor(id: &str) -> Viewer { Viewer { role: Role::Provider, subject_id: id.to_string() } }

    fn known(id: &str) -> bool { id == "p1" || id == "p2" }

    fn draft() -> PrescriptionDraft {
        PrescriptionDraft {
            patient_id: Some("p1".into()),
            medication: Some("Amoxicillin".into()),
            dosage: Some("500mg".into()),
            frequency: Some("Twice daily".into()),
            instructions: Some("  ".into()),
            start_date: NaiveDate::from_ymd_opt(2025, 4, 15),
            end_date: NaiveDate::from_ymd_opt(2025, 4, 25),
        }
    }

    #[test]
    fn provider_creates_then_updates_own_prescription() {
        let book = PrescriptionBook::new();
        let notes = Notes::default();
        let made = book.submit(Some(&doctor("d1")), Submit::Create, &draft(), &known, &notes).unwrap();
        let rx = made.prescription;
        assert_eq!(rx.provider_id, "d1");
        assert_eq!(rx.status, PrescriptionStatus::Active);
        assert_eq!(rx.instructions, None);
        assert_eq!(notes.last().message, "Prescription created successfully");
        assert_eq!(made.effects.len(), 1);

        let change = PrescriptionDraft { dosage: Some("250mg".into()), ..draft() };
        let updated = book.submit(Some(&doctor("d1")), Submit::Update(rx.id.clone()), &change, &known, &notes).unwrap();
        assert_eq!(updated.prescription.id, rx.id);
        assert_eq!(updated.prescription.dosage, "250mg");
        assert_eq!(book.len(), 1);
        assert_eq!(notes.last().message, "Prescription updated successfully");
    }

    #[test]
    fn missing_fields_are_reported_together() {
        let book = PrescriptionBook::new();
        let notes = Notes::default();
        let bare = PrescriptionDraft { medication: Some(" ".into()), dosage: None, start_date: None, ..draft() };
        let err = book.submit(Some(&doctor("d1")), Submit::Create, &bare, &known, &notes).unwrap_err();
        assert_eq!(err, PrescriptionError::MissingFields(vec!["medication", "dosage", "start_date"]));
        let note = notes.last();
        assert_eq!(note.kind, NoticeKind::Error);
        assert_eq!(note.message, "Please fill out all required fields");
        assert!(book.is_empty());
    }

    #[test]
    fn submissions_need_a_provider() {
        let book = PrescriptionBook::new();
        let notes = Notes::default();
        let err = book.submit(None, Submit::Create, &draft(), &known, &notes).unwrap_err();
        assert_eq!(err, PrescriptionError::NoProvider);
        assert_eq!(notes.last().message, "Provider information not available");

        let patient = Viewer { role: Role::Patient, subject_id: "p1".into() };
        let err = book.submit(Some(&patient), Submit::Create, &draft(), &known, &notes).unwrap_err();
        assert_eq!(err, PrescriptionError::NotProvider);
        assert_eq!(notes.last().message, "Failed to create prescription");
    }

    #[test]
    fn rejects_unknown_patients_bad_dates_and_foreign_updates() {
        let book = PrescriptionBook::new();
        let notes = Notes::default();
        let stranger = PrescriptionDraft { patient_id: Some("p9".into()), ..draft() };
        assert_eq!(
            book.submit(Some(&doctor("d1")), Submit::Create, &stranger, &known, &notes),
            Err(PrescriptionError::UnknownPatient("p9".into()))
        );

        let backwards = PrescriptionDraft { end_date: NaiveDate::from_ymd_opt(2025, 4, 1), ..draft() };
        assert!(matches!(
            book.submit(Some(&doctor("d1")), Submit::Create, &backwards, &known, &notes),
            Err(PrescriptionError::EndsBeforeStart { .. })
        ));

        let rx = book.submit(Some(&doctor("d1")), Submit::Create, &draft(), &known, &notes).unwrap().prescription;
        let err = book.submit(Some(&doctor("d2")), Submit::Update(rx.id.clone()), &draft(), &known, &notes).unwrap_err();
        assert_eq!(err, PrescriptionError::NotAuthor(rx.id.clone()));
        assert_eq!(notes.last().message, "Failed to update prescription");
        assert_eq!(
            book.submit(Some(&doctor("d1")), Submit::Update("missing".into()), &draft(), &known, &notes),
            Err(PrescriptionError::NotFound("missing".into()))
        );
    }

    #[test]
    fn visibility_follows_role() {
        let book = PrescriptionBook::new();
        let notes = Notes::default();
        book.submit(Some(&doctor("d1")), Submit::Create, &draft(), &known, &notes).unwrap();
        let for_robert = PrescriptionDraft { patient_id: Some("p2".into()), ..draft() };
        book.submit(Some(&doctor("d1")), Submit::Create, &for_robert, &known, &notes).unwrap();
        book.submit(Some(&doctor("d2")), Submit::Create, &draft(), &known, &notes).unwrap();

        assert_eq!(book.visible_to(&doctor("d1"), None).len(), 2);
        assert_eq!(book.visible_to(&doctor("d1"), Some("p2")).len(), 1);
        let jane = Viewer { role: Role::Patient, subject_id: "p1".into() };
        assert_eq!(book.visible_to(&jane, None).len(), 2);
    }
}
