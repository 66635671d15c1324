//! Demo accounts: one login per fixture patient and provider, each with a
//! profile row built from the fixture record.

use anyhow::Context;
use tracing::info;

use crate::identity::{
    IdentityDirectory, MemoryProfileStore, PatientDetails, Profile, ProfileBase, ProviderDetails, SignUpMetadata,
};
use crate::portal::models::{PatientRecord, ProviderRecord};
use crate::portal::PortalData;

/// Password shared by every seeded account.
pub const DEMO_PASSWORD: &str = "password";

pub fn patient_profile(rec: &PatientRecord) -> Profile {
    let ec = &rec.emergency_contact;
    Profile::Patient {
        base: ProfileBase {
            id: rec.id.clone(),
            full_name: Some(rec.name.clone()),
            avatar_url: None,
            phone: Some(rec.contact_phone.clone()),
            address: None,
            email: Some(rec.contact_email.clone()),
        },
        clinical: PatientDetails {
            date_of_birth: Some(rec.date_of_birth),
            blood_type: Some(rec.blood_type.clone()),
            allergies: rec.allergies.clone(),
            medical_conditions: rec.conditions.clone(),
            emergency_contact: Some(format!("{} ({}) {}", ec.name, ec.relationship, ec.phone)),
        },
    }
}

pub fn provider_profile(rec: &ProviderRecord) -> Profile {
    Profile::Provider {
        base: ProfileBase {
            id: rec.id.clone(),
            full_name: Some(rec.name.clone()),
            avatar_url: None,
            phone: Some(rec.contact_phone.clone()),
            address: None,
            email: Some(rec.contact_email.clone()),
        },
        practice: ProviderDetails {
            specialty: Some(rec.specialty.clone()),
            department: Some(rec.department.clone()),
            license_number: Some(rec.license_number.clone()),
        },
    }
}

/// Register a verified account and profile row for every fixture person.
/// Returns the number of accounts created.
pub fn seed_demo(directory: &IdentityDirectory, profiles: &MemoryProfileStore, data: &PortalData) -> anyhow::Result<usize> {
    let people = data
        .patients
        .iter()
        .map(|p| (patient_profile(p), p.contact_email.as_str()))
        .chain(data.providers.iter().map(|p| (provider_profile(p), p.contact_email.as_str())));
    let mut created = 0;
    for (profile, email) in people {
        let meta = SignUpMetadata { full_name: profile.display_name().to_string(), user_type: profile.role() };
        directory
            .register(Some(profile.id()), email, DEMO_PASSWORD, &meta, true)
            .with_context(|| format!("seeding account {}", email))?;
        profiles.put(profile);
        created += 1;
    }
    info!(target: "auth", accounts = created, "demo accounts seeded");
    Ok(created)
}
