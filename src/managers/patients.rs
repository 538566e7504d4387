use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::audit::AuditSink;
use crate::auth::repo_types::Role;
use crate::auth::services::is_valid_email;
use crate::error::AuthError;
use crate::session::manager::Session;

lazy_static! {
    static ref PHONE_RE: Regex = Regex::new(r"^\+?[0-9()\-\s.]{7,20}$").unwrap();
}

fn is_valid_phone(phone: &str) -> bool {
    PHONE_RE.is_match(phone) && phone.chars().filter(char::is_ascii_digit).count() >= 10
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub name: String,
    pub relationship: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientProfile {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub emergency_contact: Option<EmergencyContact>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactInfoUpdate {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Patient profile data. Every change is written to the audit sink.
pub struct PatientRecords {
    profiles: RwLock<Vec<PatientProfile>>,
    audit: Arc<dyn AuditSink>,
}

impl PatientRecords {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            profiles: RwLock::new(Vec::new()),
            audit,
        }
    }

    pub fn seeded(audit: Arc<dyn AuditSink>) -> Self {
        let records = Self::new(audit);
        records.insert(PatientProfile {
            id: "pat001".into(),
            full_name: "John Doe".into(),
            email: "john.doe@email.com".into(),
            phone: "(555) 123-4567".into(),
            address: "123 Main St, Springfield, IL 62701".into(),
            emergency_contact: Some(EmergencyContact {
                name: "Jane Doe".into(),
                relationship: "Spouse".into(),
                phone: "(555) 987-6543".into(),
            }),
        });
        records
    }

    pub fn insert(&self, profile: PatientProfile) {
        self.profiles.write().push(profile);
    }

    pub fn get_profile(&self, patient_id: &str) -> Option<PatientProfile> {
        self.profiles
            .read()
            .iter()
            .find(|p| p.id == patient_id)
            .cloned()
    }

    /// Patients may only edit their own record.
    fn patient_id(session: &Session) -> Result<&str, AuthError> {
        match session.role {
            Role::Patient => Ok(&session.id),
            _ => Err(AuthError::WrongRole {
                required: Role::Patient,
            }),
        }
    }

    fn update<F>(&self, patient_id: &str, f: F) -> Result<PatientProfile, AuthError>
    where
        F: FnOnce(&mut PatientProfile),
    {
        let mut profiles = self.profiles.write();
        let profile = profiles
            .iter_mut()
            .find(|p| p.id == patient_id)
            .ok_or_else(|| AuthError::UnknownAccount(patient_id.to_string()))?;
        f(profile);
        Ok(profile.clone())
    }

    #[instrument(skip(self, session, contact), fields(patient_id = %session.id))]
    pub fn update_emergency_contact(
        &self,
        session: &Session,
        contact: EmergencyContact,
    ) -> Result<PatientProfile, AuthError> {
        let patient_id = Self::patient_id(session)?;
        let contact = EmergencyContact {
            name: contact.name.trim().to_string(),
            relationship: contact.relationship.trim().to_string(),
            phone: contact.phone.trim().to_string(),
        };
        if contact.name.is_empty() {
            return Err(AuthError::validation("name", "Contact name is required"));
        }
        if contact.relationship.is_empty() {
            return Err(AuthError::validation("relationship", "Relationship is required"));
        }
        if !is_valid_phone(&contact.phone) {
            return Err(AuthError::validation("phone", "Invalid phone number"));
        }

        let detail = format!(
            "Emergency contact set to {} ({})",
            contact.name, contact.relationship
        );
        let profile = self.update(patient_id, |p| p.emergency_contact = Some(contact))?;
        self.audit
            .append(patient_id, Role::Patient, "UPDATE_EMERGENCY_CONTACT", &detail);
        debug!("emergency contact updated");
        Ok(profile)
    }

    #[instrument(skip(self, session, update), fields(patient_id = %session.id))]
    pub fn update_contact_info(
        &self,
        session: &Session,
        update: ContactInfoUpdate,
    ) -> Result<PatientProfile, AuthError> {
        let patient_id = Self::patient_id(session)?;

        let email = update.email.map(|e| e.trim().to_lowercase());
        let phone = update.phone.map(|p| p.trim().to_string());
        let address = update.address.map(|a| a.trim().to_string());

        if email.as_deref().is_some_and(|e| !is_valid_email(e)) {
            return Err(AuthError::validation("email", "Invalid email"));
        }
        if phone.as_deref().is_some_and(|p| !is_valid_phone(p)) {
            return Err(AuthError::validation("phone", "Invalid phone number"));
        }
        if address.as_deref().is_some_and(str::is_empty) {
            return Err(AuthError::validation("address", "Address cannot be empty"));
        }

        let mut changed = Vec::new();
        if email.is_some() {
            changed.push("email");
        }
        if phone.is_some() {
            changed.push("phone");
        }
        if address.is_some() {
            changed.push("address");
        }
        if changed.is_empty() {
            return Err(AuthError::validation("contact", "Nothing to update"));
        }

        let profile = self.update(patient_id, |p| {
            if let Some(email) = email {
                p.email = email;
            }
            if let Some(phone) = phone {
                p.phone = phone;
            }
            if let Some(address) = address {
                p.address = address;
            }
        })?;
        self.audit.append(
            patient_id,
            Role::Patient,
            "UPDATE_CONTACT_INFO",
            &format!("Updated {}", changed.join(", ")),
        );
        Ok(profile)
    }
}
