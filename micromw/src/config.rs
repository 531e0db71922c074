//! Service and endpoint configuration.
//!
//! Set once at startup. The substrate reads [`ServiceConfig`] for its
//! `info()` report; [`EndpointOptions`] describe one registration.

use std::collections::HashMap;

/// Service identity reported by the substrate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Service name.
    pub name: String,
    /// Service version (semver).
    pub version: String,
    /// Human-readable description.
    pub description: String,
    /// Free-form metadata.
    pub metadata: HashMap<String, String>,
}

impl ServiceConfig {
    /// Create a config with a name and version.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Options for a single endpoint registration.
///
/// # Example
///
/// ```
/// use micromw::EndpointOptions;
///
/// let opts = EndpointOptions::new()
///     .subject("users.get")
///     .queue_group("workers")
///     .metadata("owner", "team-a");
/// assert_eq!(opts.subject.as_deref(), Some("users.get"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointOptions {
    /// Subject to listen on. Defaults to the endpoint name.
    pub subject: Option<String>,
    /// Queue group for load balancing between instances.
    pub queue_group: Option<String>,
    /// Free-form metadata.
    pub metadata: HashMap<String, String>,
}

impl EndpointOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the subject.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set the queue group.
    pub fn queue_group(mut self, queue_group: impl Into<String>) -> Self {
        self.queue_group = Some(queue_group.into());
        self
    }

    /// Add a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
