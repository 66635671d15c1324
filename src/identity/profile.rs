use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::role::Role;
use crate::error::StoreError;

const BLOOD_TYPES: [&str; 8] = ["A+", "A-", "B+", "B-", "AB+", "AB-", "O+", "O-"];

/// Fields every profile carries regardless of role.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileBase {
    pub id: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Clinical fields; only patients have them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PatientDetails {
    pub date_of_birth: Option<NaiveDate>,
    pub blood_type: Option<String>,
    pub allergies: Vec<String>,
    pub medical_conditions: Vec<String>,
    pub emergency_contact: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProviderDetails {
    pub specialty: Option<String>,
    pub department: Option<String>,
    pub license_number: Option<String>,
}

/// Application-level user record. The role is the variant, so a provider can
/// never carry clinical fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "user_type", rename_all = "snake_case")]
pub enum Profile {
    Patient {
        #[serde(flatten)]
        base: ProfileBase,
        #[serde(flatten)]
        clinical: PatientDetails,
    },
    Provider {
        #[serde(flatten)]
        base: ProfileBase,
        #[serde(flatten)]
        practice: ProviderDetails,
    },
}

impl Profile {
    /// Blank profile row for a freshly registered identity.
    pub fn new(id: impl Into<String>, role: Role, full_name: Option<String>, email: Option<String>) -> Self {
        let base = ProfileBase { id: id.into(), full_name, email, ..Default::default() };
        match role {
            Role::Patient => Profile::Patient { base, clinical: PatientDetails::default() },
            Role::Provider => Profile::Provider { base, practice: ProviderDetails::default() },
        }
    }

    /// Locally synthesized stand-in profile used by demo mode.
    pub fn demo(role: Role) -> Self {
        let base = ProfileBase {
            id: role.demo_id().to_string(),
            full_name: Some(match role { Role::Patient => "Demo Patient", Role::Provider => "Demo Provider" }.to_string()),
            avatar_url: None,
            phone: Some("555-123-4567".to_string()),
            address: Some("123 Health St, Medical City".to_string()),
            email: Some(match role { Role::Patient => "patient@demo.com", Role::Provider => "provider@demo.com" }.to_string()),
        };
        match role {
            Role::Patient => Profile::Patient {
                base,
                clinical: PatientDetails {
                    date_of_birth: NaiveDate::from_ymd_opt(1985, 5, 15),
                    blood_type: Some("O+".to_string()),
                    allergies: vec!["Penicillin".to_string()],
                    medical_conditions: vec!["Hypertension".to_string()],
                    emergency_contact: Some("Jane Doe (Spouse) 555-987-6543".to_string()),
                },
            },
            Role::Provider => Profile::Provider { base, practice: ProviderDetails::default() },
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Profile::Patient { .. } => Role::Patient,
            Profile::Provider { .. } => Role::Provider,
        }
    }

    pub fn base(&self) -> &ProfileBase {
        match self {
            Profile::Patient { base, .. } | Profile::Provider { base, .. } => base,
        }
    }

    fn base_mut(&mut self) -> &mut ProfileBase {
        match self {
            Profile::Patient { base, .. } | Profile::Provider { base, .. } => base,
        }
    }

    pub fn id(&self) -> &str { &self.base().id }

    pub fn display_name(&self) -> &str {
        self.base().full_name.as_deref().unwrap_or("Unknown")
    }

    pub fn is_demo(&self) -> bool {
        Role::ALL.iter().any(|r| r.demo_id() == self.id())
    }

    /// Merge a partial update into a copy of this profile.
    pub fn apply(&self, patch: &ProfilePatch) -> Result<Profile, StoreError> {
        if patch.is_empty() {
            return Err(StoreError::InvalidPatch("empty update".into()));
        }
        if let Some(email) = patch.email.as_deref() {
            if !email.contains('@') {
                return Err(StoreError::InvalidPatch(format!("'{}' is not an email address", email)));
            }
        }
        let mut next = self.clone();
        {
            let base = next.base_mut();
            if let Some(v) = &patch.full_name { base.full_name = Some(v.clone()); }
            if let Some(v) = &patch.avatar_url { base.avatar_url = Some(v.clone()); }
            if let Some(v) = &patch.phone { base.phone = Some(v.clone()); }
            if let Some(v) = &patch.address { base.address = Some(v.clone()); }
            if let Some(v) = &patch.email { base.email = Some(v.clone()); }
        }
        match &mut next {
            Profile::Patient { clinical, .. } => {
                if patch.practice.is_some() {
                    return Err(StoreError::InvalidPatch("practice fields apply to providers only".into()));
                }
                if let Some(c) = &patch.clinical {
                    if let Some(bt) = c.blood_type.as_deref() {
                        if !BLOOD_TYPES.contains(&bt) {
                            return Err(StoreError::InvalidPatch(format!("unknown blood type '{}'", bt)));
                        }
                        clinical.blood_type = Some(bt.to_string());
                    }
                    if let Some(v) = c.date_of_birth { clinical.date_of_birth = Some(v); }
                    if let Some(v) = &c.allergies { clinical.allergies = v.clone(); }
                    if let Some(v) = &c.medical_conditions { clinical.medical_conditions = v.clone(); }
                    if let Some(v) = &c.emergency_contact { clinical.emergency_contact = Some(v.clone()); }
                }
            }
            Profile::Provider { practice, .. } => {
                if patch.clinical.is_some() {
                    return Err(StoreError::InvalidPatch("clinical fields apply to patients only".into()));
                }
                if let Some(p) = &patch.practice {
                    if let Some(v) = &p.specialty { practice.specialty = Some(v.clone()); }
                    if let Some(v) = &p.department { practice.department = Some(v.clone()); }
                    if let Some(v) = &p.license_number { practice.license_number = Some(v.clone()); }
                }
            }
        }
        Ok(next)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClinicalPatch {
    pub date_of_birth: Option<NaiveDate>,
    pub blood_type: Option<String>,
    pub allergies: Option<Vec<String>>,
    pub medical_conditions: Option<Vec<String>>,
    pub emergency_contact: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PracticePatch {
    pub specialty: Option<String>,
    pub department: Option<String>,
    pub license_number: Option<String>,
}

/// Partial profile update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProfilePatch {
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub email: Option<String>,
    pub clinical: Option<ClinicalPatch>,
    pub practice: Option<PracticePatch>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.avatar_url.is_none()
            && self.phone.is_none()
            && self.address.is_none()
            && self.email.is_none()
            && self.clinical.is_none()
            && self.practice.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_profiles_match_their_role() {
        for role in Role::ALL {
            let p = Profile::demo(role);
            assert_eq!(p.role(), role);
            assert_eq!(p.id(), role.demo_id());
            assert!(p.is_demo());
        }
        match Profile::demo(Role::Patient) {
            Profile::Patient { clinical, .. } => {
                assert_eq!(clinical.blood_type.as_deref(), Some("O+"));
                assert_eq!(clinical.allergies, vec!["Penicillin".to_string()]);
            }
            other => panic!("expected patient, got {:?}", other),
        }
    }

    #[test]
    fn serializes_with_user_type_tag() {
        let v = serde_json::to_value(Profile::demo(Role::Provider)).unwrap();
        assert_eq!(v["user_type"], "provider");
        assert_eq!(v["id"], "demo-provider");
        assert!(v.get("blood_type").is_none());

        let back: Profile = serde_json::from_value(v).unwrap();
        assert_eq!(back.role(), Role::Provider);
    }

    #[test]
    fn patch_rejects_clinical_fields_on_provider() {
        let p = Profile::demo(Role::Provider);
        let patch = ProfilePatch {
            clinical: Some(ClinicalPatch { blood_type: Some("A+".into()), ..Default::default() }),
            ..Default::default()
        };
        assert!(matches!(p.apply(&patch), Err(StoreError::InvalidPatch(_))));
    }

    #[test]
    fn patch_merges_only_present_fields() {
        let p = Profile::demo(Role::Patient);
        let patch = ProfilePatch {
            phone: Some("555-000-0000".into()),
            clinical: Some(ClinicalPatch { allergies: Some(vec![]), ..Default::default() }),
            ..Default::default()
        };
        let next = p.apply(&patch).unwrap();
        assert_eq!(next.base().phone.as_deref(), Some("555-000-0000"));
        assert_eq!(next.base().full_name.as_deref(), Some("Demo Patient"));
        match next {
            Profile::Patient { clinical, .. } => {
                assert!(clinical.allergies.is_empty());
                assert_eq!(clinical.medical_conditions, vec!["Hypertension".to_string()]);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn patch_validates_blood_type_and_empty() {
        let p = Profile::demo(Role::Patient);
        let bad = ProfilePatch {
            clinical: Some(ClinicalPatch { blood_type: Some("Z".into()), ..Default::default() }),
            ..Default::default()
        };
        assert!(p.apply(&bad).is_err());
        assert!(p.apply(&ProfilePatch::default()).is_err());
    }
}
