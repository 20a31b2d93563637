//! Profile form schema sent by the backend alongside an action plan.
//!
//! On the wire the schema is a flat JSON object: `title` and `description`
//! are reserved keys and every other key is a section. Section order is the
//! order the backend wrote them in.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProfileFormSchema {
    pub title: String,
    pub description: String,
    pub sections: Vec<(String, FormSection)>,
}

impl ProfileFormSchema {
    pub fn section(&self, key: &str) -> Option<&FormSection> {
        self.sections
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, section)| section)
    }

    pub fn field_count(&self) -> usize {
        self.sections.iter().map(|(_, s)| s.fields.len()).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FormSection {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub fields: Vec<FormField>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormField {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

impl FormField {
    /// Display prefix for the unit; currency codes render as their symbol.
    pub fn unit_prefix(&self) -> Option<&str> {
        match self.unit.as_deref() {
            Some("USD") => Some("$"),
            other => other,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    #[default]
    Text,
    Number,
    Select,
    Date,
    Email,
    Other(String),
}

impl From<String> for FieldType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "text" => FieldType::Text,
            "number" => FieldType::Number,
            "select" => FieldType::Select,
            "date" => FieldType::Date,
            "email" => FieldType::Email,
            _ => FieldType::Other(raw),
        }
    }
}

impl From<FieldType> for String {
    fn from(value: FieldType) -> Self {
        match value {
            FieldType::Text => "text".to_string(),
            FieldType::Number => "number".to_string(),
            FieldType::Select => "select".to_string(),
            FieldType::Date => "date".to_string(),
            FieldType::Email => "email".to_string(),
            FieldType::Other(raw) => raw,
        }
    }
}

impl Serialize for ProfileFormSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.sections.len() + 2))?;
        map.serialize_entry("title", &self.title)?;
        map.serialize_entry("description", &self.description)?;
        for (key, section) in &self.sections {
            map.serialize_entry(key, section)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ProfileFormSchema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(SchemaVisitor)
    }
}

struct SchemaVisitor;

impl<'de> Visitor<'de> for SchemaVisitor {
    type Value = ProfileFormSchema;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a profile form object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut schema = ProfileFormSchema::default();
        while let Some(key) = access.next_key::<String>()? {
            let value: serde_json::Value = access.next_value()?;
            match key.as_str() {
                "title" => schema.title = value.as_str().unwrap_or_default().to_string(),
                "description" => {
                    schema.description = value.as_str().unwrap_or_default().to_string()
                }
                _ => match serde_json::from_value::<FormSection>(value) {
                    Ok(section) => schema.sections.push((key, section)),
                    // Non-section entries (scores, notes) are ignored.
                    Err(_) => continue,
                },
            }
        }
        Ok(schema)
    }
}
