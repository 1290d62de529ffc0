//! The service binding record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A credential bundle for one bound service.
///
/// Besides the well-known fields, a binding keeps every metadata property it was read
/// from, accessible through [`get`](Self::get). Credentials are kept separately and are
/// redacted from the `Debug` output.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use service_binding::ServiceBinding;
///
/// let binding = ServiceBinding::builder()
///     .name("my-xsuaa")
///     .service_name("xsuaa")
///     .tags(["xsuaa", "auth"])
///     .credential("clientid", json!("sb-app"))
///     .build();
///
/// assert_eq!(binding.service_name(), Some("xsuaa"));
/// assert_eq!(binding.credentials()["clientid"], "sb-app");
/// ```
#[derive(Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ServiceBinding {
    name: Option<String>,
    service_name: Option<String>,
    service_plan: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    credentials: Map<String, Value>,
    #[serde(default)]
    properties: Map<String, Value>,
}

impl ServiceBinding {
    /// Returns a builder for a new binding.
    pub fn builder() -> ServiceBindingBuilder {
        ServiceBindingBuilder::default()
    }

    /// The binding's name (the name of its directory).
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The bound service, e.g. `xsuaa`.
    pub fn service_name(&self) -> Option<&str> {
        self.service_name.as_deref()
    }

    /// The service plan, if the binding declares one.
    pub fn service_plan(&self) -> Option<&str> {
        self.service_plan.as_deref()
    }

    /// Tags declared by the binding. Empty if none.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// The binding's credentials.
    pub fn credentials(&self) -> &Map<String, Value> {
        &self.credentials
    }

    /// Names of all metadata properties.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Returns `true` if the binding has a metadata property named `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    /// Returns the metadata property named `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

impl fmt::Debug for ServiceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceBinding")
            .field("name", &self.name)
            .field("service_name", &self.service_name)
            .field("service_plan", &self.service_plan)
            .field("tags", &self.tags)
            .field("credentials", &self.credentials.keys().collect::<Vec<_>>())
            .field("properties", &self.properties.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`ServiceBinding`].
#[derive(Debug, Default)]
pub struct ServiceBindingBuilder {
    binding: ServiceBinding,
}

impl ServiceBindingBuilder {
    /// Sets the binding name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.binding.name = Some(name.into());
        self
    }

    /// Sets the service name.
    #[must_use]
    pub fn service_name(mut self, service_name: impl Into<String>) -> Self {
        self.binding.service_name = Some(service_name.into());
        self
    }

    /// Sets the service plan.
    #[must_use]
    pub fn service_plan(mut self, service_plan: impl Into<String>) -> Self {
        self.binding.service_plan = Some(service_plan.into());
        self
    }

    /// Replaces the tags.
    #[must_use]
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.binding.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Adds one credential entry, replacing an existing entry with the same key.
    #[must_use]
    pub fn credential(mut self, key: impl Into<String>, value: Value) -> Self {
        self.binding.credentials.insert(key.into(), value);
        self
    }

    /// Replaces all credentials.
    #[must_use]
    pub fn credentials(mut self, credentials: Map<String, Value>) -> Self {
        self.binding.credentials = credentials;
        self
    }

    /// Adds one metadata property, replacing an existing property with the same key.
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.binding.properties.insert(key.into(), value);
        self
    }

    /// Builds the binding.
    pub fn build(self) -> ServiceBinding {
        self.binding
    }
}
