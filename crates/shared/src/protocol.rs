use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Gender, PostId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default, with = "optional_gender")]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: PostId,
    #[serde(default)]
    pub image: Option<String>,
    pub caption: String,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub dislike_count: u64,
    pub created_at: DateTime<Utc>,
}

/// Body of the "current user" read: the profile plus the user's posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    #[serde(flatten)]
    pub profile: ProfileRecord,
    #[serde(default)]
    pub posts: Vec<PostRecord>,
}

/// Sparse profile update; absent fields are left untouched by the service.
///
/// The inner `None` of `birth_date` and `gender` clears the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub birth_date: Option<Option<NaiveDate>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "clearable_gender"
    )]
    pub gender: Option<Option<Gender>>,
}

impl ProfileChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.birth_date.is_none() && self.gender.is_none()
    }

    /// Text form fields for multipart transmission, in a stable order. A
    /// cleared field is sent as an empty string.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::new();
        if let Some(name) = &self.name {
            fields.push(("name", name.clone()));
        }
        if let Some(birth_date) = self.birth_date {
            fields.push((
                "birth_date",
                birth_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
            ));
        }
        if let Some(gender) = self.gender {
            fields.push((
                "gender",
                gender.map(|g| g.as_str().to_string()).unwrap_or_default(),
            ));
        }
        fields
    }
}

/// A field that is present in the body, even as `null`, is `Some`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Text part of an account-creation request. The optional avatar travels
/// alongside it as a file part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub name: String,
    pub birth_date: Option<NaiveDate>,
    pub email: String,
    pub password: String,
    pub gender: Option<Gender>,
}

impl NewAccount {
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.clone()),
            (
                "birth_date",
                self.birth_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
            ),
            ("email", self.email.clone()),
            ("password", self.password.clone()),
            (
                "gender",
                self.gender.map(|g| g.as_str().to_string()).unwrap_or_default(),
            ),
        ]
    }
}

/// Outer `None` is skipped by the field attribute; a cleared gender travels
/// as the empty string.
mod clearable_gender {
    use serde::{Deserializer, Serializer};

    use crate::domain::Gender;

    pub fn serialize<S>(value: &Option<Option<Gender>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(Some(gender)) => serializer.serialize_str(gender.as_str()),
            _ => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<Gender>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        super::optional_gender::deserialize(deserializer).map(Some)
    }
}

/// The service sends an empty string for "not specified".
mod optional_gender {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::domain::Gender;

    pub fn serialize<S>(value: &Option<Gender>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(gender) => serializer.serialize_str(gender.as_str()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Gender>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(Gender::parse))
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
