use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Class/form level that scopes every roster operation, e.g. `JSS1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ClassId(String);

impl ClassId {
    /// Trims the raw value; blank input is not a class.
    pub fn parse(raw: &str) -> Option<Self> {
        let t = raw.trim();
        if t.is_empty() {
            None
        } else {
            Some(Self(t.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Stored keys must already be in `parse` form; a padded or blank key could
/// never be addressed again.
impl<'de> Deserialize<'de> for ClassId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match Self::parse(&raw) {
            Some(id) if id.0 == raw => Ok(id),
            _ => Err(serde::de::Error::custom(format!(
                "class id {:?} is blank or padded",
                raw
            ))),
        }
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub full_name: String,
    pub student_id: String,
}

/// Every class's student list, persisted as one JSON object under one store key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster(BTreeMap<ClassId, Vec<Student>>);

impl Roster {
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }

    pub fn class(&self, class: &ClassId) -> &[Student] {
        self.0.get(class).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn class_mut(&mut self, class: &ClassId) -> &mut Vec<Student> {
        self.0.entry(class.clone()).or_default()
    }

    pub fn contains_id(&self, class: &ClassId, id: &str) -> bool {
        self.class(class).iter().any(|s| s.id == id)
    }

    /// Filters every entry carrying `id` out of the class and returns them.
    /// Legacy lists can hold the same id twice.
    pub fn remove(&mut self, class: &ClassId, id: &str) -> Vec<Student> {
        let Some(students) = self.0.get_mut(class) else {
            return Vec::new();
        };
        let (gone, kept) = std::mem::take(students)
            .into_iter()
            .partition(|s| s.id == id);
        *students = kept;
        gone
    }

    pub fn classes(&self) -> impl Iterator<Item = (&ClassId, &[Student])> {
        self.0.iter().map(|(c, s)| (c, s.as_slice()))
    }
}
