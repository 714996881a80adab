//! Decoded input rows.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One decoded row: retained column names mapped to cell text.
///
/// Columns missing from the row are absent keys; empty cells are present
/// with an empty value. Field order follows the input header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: IndexMap<String, String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `field`, if the row had that column.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_as_flat_object_in_field_order() {
        let record: Record = [("student_id", "S12345"), ("fname", "Ann"), ("course", "MATHS1")]
            .into_iter()
            .collect();

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"student_id":"S12345","fname":"Ann","course":"MATHS1"}"#
        );
    }

    #[test]
    fn test_absent_and_empty_fields_differ() {
        let record: Record = [("fname", "")].into_iter().collect();
        assert_eq!(record.get("fname"), Some(""));
        assert_eq!(record.get("lname"), None);
        assert!(!record.contains("lname"));
    }
}
