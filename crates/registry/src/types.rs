use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::RecordStoreError;

/// Oldest age accepted at enrollment.
pub const MAX_AGE: u32 = 120;

/// Attributes supplied by the caller when enrolling a person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonAttributes {
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub nationality: String,
}

impl PersonAttributes {
    pub fn new(
        name: impl Into<String>,
        age: u32,
        gender: impl Into<String>,
        nationality: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            age,
            gender: gender.into(),
            nationality: nationality.into(),
        }
    }

    /// Every text field must be non-blank and the age within `1..=120`.
    pub fn validate(&self) -> Result<(), RecordStoreError> {
        for (field, value) in [
            ("name", &self.name),
            ("gender", &self.gender),
            ("nationality", &self.nationality),
        ] {
            if value.trim().is_empty() {
                return Err(RecordStoreError::Validation(format!(
                    "{field} must not be empty"
                )));
            }
        }
        if self.age == 0 || self.age > MAX_AGE {
            return Err(RecordStoreError::Validation(format!(
                "age must be between 1 and {MAX_AGE}, got {}",
                self.age
            )));
        }
        Ok(())
    }
}

/// Authoritative record for one enrolled person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
    /// Canonical identity key; also the embedding key for new enrollments.
    pub id: String,
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub nationality: String,
    /// Key the embedding is indexed under when it differs from `id`.
    /// Only set on records migrated from older deployments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_id: Option<String>,
    /// Where the enrollment photo was kept, if anywhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PersonRecord {
    /// New record whose embedding is keyed by its own id.
    pub fn new(id: impl Into<String>, attributes: PersonAttributes) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: attributes.name,
            age: attributes.age,
            gender: attributes.gender,
            nationality: attributes.nationality,
            vector_id: None,
            photo_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_vector_id(mut self, vector_id: impl Into<String>) -> Self {
        self.vector_id = Some(vector_id.into());
        self
    }

    pub fn with_photo_path(mut self, path: impl Into<String>) -> Self {
        self.photo_path = Some(path.into());
        self
    }

    /// Key this person's embedding lives under in the index.
    pub fn index_key(&self) -> &str {
        self.vector_id.as_deref().unwrap_or(&self.id)
    }

    pub fn attributes(&self) -> PersonAttributes {
        PersonAttributes::new(
            self.name.clone(),
            self.age,
            self.gender.clone(),
            self.nationality.clone(),
        )
    }

    /// Denormalized copy of the attributes stored next to the embedding.
    pub fn index_metadata(&self) -> serde_json::Value {
        json!({
            "name": self.name,
            "age": self.age,
            "gender": self.gender,
            "nationality": self.nationality,
            "person_id": self.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ada() -> PersonAttributes {
        PersonAttributes::new("Ada", 36, "female", "GB")
    }

    #[test]
    fn attributes_validation() {
        assert!(ada().validate().is_ok());

        let blank = PersonAttributes {
            name: "  ".into(),
            ..ada()
        };
        assert!(matches!(
            blank.validate(),
            Err(RecordStoreError::Validation(msg)) if msg.contains("name")
        ));

        for age in [0, MAX_AGE + 1] {
            let bad = PersonAttributes { age, ..ada() };
            assert!(bad.validate().is_err());
        }
        let oldest = PersonAttributes { age: MAX_AGE, ..ada() };
        assert!(oldest.validate().is_ok());
    }

    #[test]
    fn index_key_prefers_legacy_vector_id() {
        let record = PersonRecord::new("p-1", ada());
        assert_eq!(record.index_key(), "p-1");

        let legacy = record.with_vector_id("v-9");
        assert_eq!(legacy.index_key(), "v-9");
    }

    #[test]
    fn index_metadata_carries_person_id() {
        let record = PersonRecord::new("p-1", ada());
        let meta = record.index_metadata();
        assert_eq!(meta["person_id"], "p-1");
        assert_eq!(meta["name"], "Ada");
        assert_eq!(meta["age"], 36);
    }
}
