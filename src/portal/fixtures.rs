//! Seed data for the demo portal: two patients, two providers and the
//! clinical records that hang off them.

use chrono::{NaiveDate, NaiveDateTime};

use super::models::*;
use crate::identity::Role;

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    day(y, m, d).and_hms_opt(h, min, 0).unwrap_or_default()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// All fixture collections, loaded once per server.
#[derive(Debug, Clone, Default)]
pub struct PortalData {
    pub patients: Vec<PatientRecord>,
    pub providers: Vec<ProviderRecord>,
    pub appointments: Vec<Appointment>,
    pub medications: Vec<Medication>,
    pub health_updates: Vec<HealthUpdate>,
    pub records: Vec<MedicalRecord>,
    pub messages: Vec<Message>,
    pub tasks: Vec<Task>,
    pub resources: Vec<EducationalResource>,
}

impl PortalData {
    pub fn demo() -> Self {
        PortalData {
            patients: patients(),
            providers: providers(),
            appointments: appointments(),
            medications: medications(),
            health_updates: health_updates(),
            records: records(),
            messages: messages(),
            tasks: tasks(),
            resources: resources(),
        }
    }

    pub fn patient(&self, id: &str) -> Option<&PatientRecord> {
        self.patients.iter().find(|p| p.id == id)
    }

    pub fn provider(&self, id: &str) -> Option<&ProviderRecord> {
        self.providers.iter().find(|p| p.id == id)
    }
}

fn patients() -> Vec<PatientRecord> {
    vec![
        PatientRecord {
            id: "p1".into(),
            name: "Jane Smith".into(),
            date_of_birth: day(1985, 6, 15),
            gender: "Female".into(),
            blood_type: "O+".into(),
            allergies: strings(&["Penicillin", "Peanuts"]),
            conditions: strings(&["Hypertension", "Asthma"]),
            contact_phone: "(555) 123-4567".into(),
            contact_email: "jane@example.com".into(),
            emergency_contact: EmergencyContact {
                name: "John Smith".into(),
                relationship: "Husband".into(),
                phone: "(555) 987-6543".into(),
            },
            primary_care_provider: "Dr. Michael Johnson".into(),
        },
        PatientRecord {
            id: "p2".into(),
            name: "Robert Martinez".into(),
            date_of_birth: day(1972, 9, 23),
            gender: "Male".into(),
            blood_type: "A-".into(),
            allergies: strings(&["Sulfa drugs"]),
            conditions: strings(&["Type 2 Diabetes", "High Cholesterol"]),
            contact_phone: "(555) 234-5678".into(),
            contact_email: "robert@example.com".into(),
            emergency_contact: EmergencyContact {
                name: "Maria Martinez".into(),
                relationship: "Wife".into(),
                phone: "(555) 876-5432".into(),
            },
            primary_care_provider: "Dr. Sarah Williams".into(),
        },
    ]
}

fn providers() -> Vec<ProviderRecord> {
    vec![
        ProviderRecord {
            id: "d1".into(),
            name: "Dr. Michael Johnson".into(),
            specialty: "Internal Medicine".into(),
            license_number: "MD12345".into(),
            department: "Primary Care".into(),
            contact_phone: "(555) 111-2222".into(),
            contact_email: "dr.johnson@example.com".into(),
            availability: strings(&["Mon 9-5", "Wed 9-5", "Fri 9-1"]),
        },
        ProviderRecord {
            id: "d2".into(),
            name: "Dr. Sarah Williams".into(),
            specialty: "Cardiology".into(),
            license_number: "MD67890".into(),
            department: "Cardiac Care".into(),
            contact_phone: "(555) 333-4444".into(),
            contact_email: "dr.williams@example.com".into(),
            availability: strings(&["Tue 8-4", "Thu 8-4", "Fri 1-5"]),
        },
    ]
}

fn appointments() -> Vec<Appointment> {
    vec![
        Appointment {
            id: "a1".into(),
            patient_id: "p1".into(),
            patient_name: "Jane Smith".into(),
            provider_id: "d1".into(),
            provider_name: "Dr. Michael Johnson".into(),
            date_time: at(2025, 4, 15, 10, 0),
            duration_minutes: 30,
            status: AppointmentStatus::Scheduled,
            kind: "Check-up".into(),
            notes: Some("Annual physical examination".into()),
        },
        Appointment {
            id: "a2".into(),
            patient_id: "p1".into(),
            patient_name: "Jane Smith".into(),
            provider_id: "d2".into(),
            provider_name: "Dr. Sarah Williams".into(),
            date_time: at(2025, 5, 2, 14, 30),
            duration_minutes: 45,
            status: AppointmentStatus::Scheduled,
            kind: "Specialist Consultation".into(),
            notes: Some("Discussion of recent blood pressure readings".into()),
        },
        Appointment {
            id: "a3".into(),
            patient_id: "p2".into(),
            patient_name: "Robert Martinez".into(),
            provider_id: "d1".into(),
            provider_name: "Dr. Michael Johnson".into(),
            date_time: at(2025, 4, 11, 9, 15),
            duration_minutes: 30,
            status: AppointmentStatus::Scheduled,
            kind: "Diabetes Follow-up".into(),
            notes: None,
        },
    ]
}

fn medications() -> Vec<Medication> {
    vec![
        Medication {
            id: "m1".into(),
            patient_id: "p1".into(),
            name: "Lisinopril".into(),
            dosage: "10mg".into(),
            frequency: "Once daily".into(),
            start_date: day(2024, 12, 1),
            end_date: None,
            instructions: "Take in the morning with food".into(),
            prescribed_by_id: "d1".into(),
            refill: Some(RefillInfo { remaining: 15, last_filled: day(2025, 3, 15), pharmacy: "MediCare Pharmacy".into() }),
        },
        Medication {
            id: "m2".into(),
            patient_id: "p1".into(),
            name: "Albuterol".into(),
            dosage: "2 puffs".into(),
            frequency: "As needed".into(),
            start_date: day(2024, 10, 15),
            end_date: None,
            instructions: "Use for acute asthma symptoms".into(),
            prescribed_by_id: "d1".into(),
            refill: Some(RefillInfo { remaining: 3, last_filled: day(2025, 2, 20), pharmacy: "MediCare Pharmacy".into() }),
        },
        Medication {
            id: "m3".into(),
            patient_id: "p2".into(),
            name: "Metformin".into(),
            dosage: "500mg".into(),
            frequency: "Twice daily".into(),
            start_date: day(2024, 8, 5),
            end_date: None,
            instructions: "Take with morning and evening meals".into(),
            prescribed_by_id: "d1".into(),
            refill: Some(RefillInfo { remaining: 30, last_filled: day(2025, 3, 25), pharmacy: "QuickScript Pharmacy".into() }),
        },
    ]
}

fn health_updates() -> Vec<HealthUpdate> {
    vec![
        HealthUpdate {
            id: "h1".into(),
            patient_id: "p1".into(),
            date: at(2025, 4, 2, 8, 30),
            kind: HealthUpdateKind::Vital,
            title: "Blood Pressure Reading".into(),
            description: "Morning measurement".into(),
            value: Some("128/82".into()),
            unit: Some("mmHg".into()),
            status: None,
            related_to_id: None,
        },
        HealthUpdate {
            id: "h2".into(),
            patient_id: "p2".into(),
            date: at(2025, 4, 5, 14, 45),
            kind: HealthUpdateKind::Lab,
            title: "HbA1c Results".into(),
            description: "Quarterly diabetes check".into(),
            value: Some("6.4".into()),
            unit: Some("%".into()),
            status: Some("Review required".into()),
            related_to_id: None,
        },
        HealthUpdate {
            id: "h3".into(),
            patient_id: "p1".into(),
            date: at(2025, 4, 7, 10, 15),
            kind: HealthUpdateKind::Medication,
            title: "Refill Reminder".into(),
            description: "Albuterol inhaler running low".into(),
            value: None,
            unit: None,
            status: Some("Action needed".into()),
            related_to_id: Some("m2".into()),
        },
    ]
}

fn records() -> Vec<MedicalRecord> {
    vec![
        MedicalRecord {
            id: "mr1".into(),
            patient_id: "p1".into(),
            category: RecordCategory::Lab,
            title: "Complete Blood Count".into(),
            date: day(2025, 3, 15),
            provider_id: "d1".into(),
            provider_name: "Dr. Michael Johnson".into(),
            content: "All values within normal range except slight elevation in white blood cells.".into(),
            attachments: strings(&["lab-report.pdf"]),
            status: None,
        },
        MedicalRecord {
            id: "mr2".into(),
            patient_id: "p1".into(),
            category: RecordCategory::Prescription,
            title: "Lisinopril Prescription".into(),
            date: day(2024, 12, 1),
            provider_id: "d1".into(),
            provider_name: "Dr. Michael Johnson".into(),
            content: "10mg daily for blood pressure management".into(),
            attachments: Vec::new(),
            status: Some("active".into()),
        },
        MedicalRecord {
            id: "mr3".into(),
            patient_id: "p1".into(),
            category: RecordCategory::Imaging,
            title: "Chest X-ray".into(),
            date: day(2024, 11, 10),
            provider_id: "d2".into(),
            provider_name: "Dr. Sarah Williams".into(),
            content: "No significant findings. Lungs clear.".into(),
            attachments: strings(&["xray-image.jpg"]),
            status: None,
        },
    ]
}

fn messages() -> Vec<Message> {
    vec![
        Message {
            id: "msg1".into(),
            sender_id: "p1".into(),
            sender_name: "Jane Smith".into(),
            sender_role: Role::Patient,
            recipient_id: "d1".into(),
            recipient_name: "Dr. Michael Johnson".into(),
            timestamp: at(2025, 4, 1, 9, 23),
            content: "I've been experiencing increased shortness of breath when exercising. Should I adjust my medication?".into(),
            read: true,
            attachments: Vec::new(),
        },
        Message {
            id: "msg2".into(),
            sender_id: "d1".into(),
            sender_name: "Dr. Michael Johnson".into(),
            sender_role: Role::Provider,
            recipient_id: "p1".into(),
            recipient_name: "Jane Smith".into(),
            timestamp: at(2025, 4, 1, 14, 5),
            content: "Thank you for letting me know. Please monitor your symptoms and use your rescue inhaler as needed. Let's discuss this at your upcoming appointment next week.".into(),
            read: true,
            attachments: Vec::new(),
        },
        Message {
            id: "msg3".into(),
            sender_id: "d2".into(),
            sender_name: "Dr. Sarah Williams".into(),
            sender_role: Role::Provider,
            recipient_id: "p1".into(),
            recipient_name: "Jane Smith".into(),
            timestamp: at(2025, 4, 6, 11, 30),
            content: "Your recent lab results look good. Continue with your current medication regimen, and we'll reassess at your next visit.".into(),
            read: false,
            attachments: Vec::new(),
        },
    ]
}

fn tasks() -> Vec<Task> {
    vec![
        Task {
            id: "t1".into(),
            title: "Review Jane Smith's lab results".into(),
            description: Some("Check CBC and metabolic panel from 04/05".into()),
            assigned_to_id: "d1".into(),
            assigned_by_id: "d2".into(),
            patient_id: Some("p1".into()),
            due: Some(at(2025, 4, 8, 17, 0)),
            priority: TaskPriority::High,
            status: TaskStatus::Pending,
            category: "Lab Review".into(),
        },
        Task {
            id: "t2".into(),
            title: "Complete Robert Martinez's referral".into(),
            description: None,
            assigned_to_id: "d1".into(),
            assigned_by_id: "d1".into(),
            patient_id: Some("p2".into()),
            due: Some(at(2025, 4, 10, 12, 0)),
            priority: TaskPriority::Medium,
            status: TaskStatus::InProgress,
            category: "Administrative".into(),
        },
        Task {
            id: "t3".into(),
            title: "Update department protocols".into(),
            description: Some("Incorporate new hypertension guidelines".into()),
            assigned_to_id: "d1".into(),
            assigned_by_id: "d1".into(),
            patient_id: None,
            due: Some(at(2025, 4, 14, 17, 0)),
            priority: TaskPriority::Low,
            status: TaskStatus::Pending,
            category: "Administrative".into(),
        },
    ]
}

fn resources() -> Vec<EducationalResource> {
    vec![
        EducationalResource {
            id: "e1".into(),
            title: "Managing Hypertension: Lifestyle Modifications".into(),
            description: "Learn about diet, exercise, and other lifestyle changes to help control high blood pressure.".into(),
            categories: strings(&["Hypertension", "Wellness"]),
            content_type: ContentType::Article,
            url: "/resources/hypertension-lifestyle".into(),
            tags: strings(&["blood pressure", "diet", "exercise", "stress management"]),
            created_at: day(2025, 1, 15),
            updated_at: Some(day(2025, 3, 2)),
        },
        EducationalResource {
            id: "e2".into(),
            title: "Understanding Your Asthma Medications".into(),
            description: "A comprehensive guide to different types of asthma medications and how to use them effectively.".into(),
            categories: strings(&["Asthma", "Medications"]),
            content_type: ContentType::Video,
            url: "/resources/asthma-medications".into(),
            tags: strings(&["asthma", "inhalers", "medication management"]),
            created_at: day(2025, 2, 10),
            updated_at: None,
        },
        EducationalResource {
            id: "e3".into(),
            title: "Diabetes Self-Care Essentials".into(),
            description: "Essential information for daily diabetes management, including blood sugar monitoring and foot care.".into(),
            categories: strings(&["Diabetes", "Self-Care"]),
            content_type: ContentType::Infographic,
            url: "/resources/diabetes-self-care".into(),
            tags: strings(&["diabetes", "blood sugar", "foot care", "nutrition"]),
            created_at: day(2025, 3, 5),
            updated_at: None,
        },
    ]
}
