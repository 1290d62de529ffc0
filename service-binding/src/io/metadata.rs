//! Parsing of the `.metadata` file that describes a binding directory.

use crate::error::MetadataError;
use serde_json::{Map, Value};
use std::str::FromStr;

const METADATA_PROPERTIES_KEY: &str = "metaDataProperties";
const CREDENTIAL_PROPERTIES_KEY: &str = "credentialProperties";

/// How a property file's content is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyFormat {
    /// The content is used as a string.
    Text,
    /// The content is parsed as JSON.
    Json,
}

impl FromStr for PropertyFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("text") {
            Ok(Self::Text)
        } else if s.eq_ignore_ascii_case("json") {
            Ok(Self::Json)
        } else {
            Err(())
        }
    }
}

/// One property declared in `.metadata`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindingProperty {
    name: String,
    source_name: String,
    format: PropertyFormat,
    container: bool,
}

impl BindingProperty {
    /// Key the property is stored under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File, relative to the binding directory, holding the property's value.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// How the file content is interpreted.
    pub fn format(&self) -> PropertyFormat {
        self.format
    }

    /// Whether the property is a JSON object whose entries are merged into the
    /// surrounding map instead of being stored under [`name`](Self::name).
    pub fn is_container(&self) -> bool {
        self.container
    }

    // Entries that fail validation are skipped, not reported.
    fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;

        let name = non_empty(object.get("name"))?;
        let source_name = match object.get("sourceName") {
            None => name.clone(),
            Some(v) => non_empty(Some(v))?,
        };
        let format = object.get("format")?.as_str()?.parse().ok()?;
        let container = object
            .get("container")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if container && format != PropertyFormat::Json {
            return None;
        }

        Some(Self {
            name,
            source_name,
            format,
            container,
        })
    }
}

/// Parsed content of a `.metadata` file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BindingMetadata {
    metadata_properties: Vec<BindingProperty>,
    credential_properties: Vec<BindingProperty>,
}

impl BindingMetadata {
    /// Parses a `.metadata` document.
    ///
    /// # Errors
    ///
    /// Fails if `json` is not valid JSON or not a JSON object. Invalid property entries
    /// do not fail the parse; they are dropped.
    pub fn from_json(json: &str) -> Result<Self, MetadataError> {
        let value: Value = serde_json::from_str(json)?;
        let object = value.as_object().ok_or(MetadataError::NotAnObject)?;
        Ok(Self::from_object(object))
    }

    fn from_object(object: &Map<String, Value>) -> Self {
        Self {
            metadata_properties: properties(object.get(METADATA_PROPERTIES_KEY)),
            credential_properties: properties(object.get(CREDENTIAL_PROPERTIES_KEY)),
        }
    }

    /// Properties describing the binding itself (`type`, `plan`, `tags`, ...).
    pub fn metadata_properties(&self) -> &[BindingProperty] {
        &self.metadata_properties
    }

    /// Properties that make up the binding's credentials.
    pub fn credential_properties(&self) -> &[BindingProperty] {
        &self.credential_properties
    }
}

fn properties(value: Option<&Value>) -> Vec<BindingProperty> {
    value
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(BindingProperty::from_value).collect())
        .unwrap_or_default()
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}
