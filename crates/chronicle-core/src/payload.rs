//! Tool payloads and the schema registry that resolves them.
//!
//! Core event kinds form a closed union (see [`crate::events::EventKind`]).
//! Tool-specific data is the one open extension point: every action carries a
//! [`ToolPayload`] whose `kind` tag is resolved through a [`PayloadRegistry`]
//! built once at startup. The engine itself never interprets payloads; the
//! registry exists so collaborators can validate and decode them without
//! runtime type inspection.

use std::any::type_name;
use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Tool-specific data attached to an action, tagged with its schema kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolPayload {
    /// Schema tag (for example `"terminal.command"`).
    pub kind: String,
    /// Opaque payload body.
    #[serde(default)]
    pub data: Value,
}

impl ToolPayload {
    /// Create a payload from a kind tag and JSON body.
    #[must_use]
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Render the payload as compact text (used for summaries and token estimates).
    #[must_use]
    pub fn to_text(&self) -> String {
        if self.data.is_null() {
            self.kind.clone()
        } else {
            format!("{} {}", self.kind, self.data)
        }
    }
}

/// Errors produced while resolving a payload through the registry.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// No schema is registered for the payload kind.
    #[error("unknown payload kind: {0}")]
    UnknownKind(String),

    /// The caller asked for a Rust type other than the one registered.
    #[error("payload kind '{kind}' is registered as {registered}, not {requested}")]
    TypeMismatch {
        /// Payload kind tag.
        kind: String,
        /// Type registered for the kind.
        registered: &'static str,
        /// Type the caller requested.
        requested: &'static str,
    },

    /// The payload body does not match the registered schema.
    #[error("invalid '{kind}' payload: {source}")]
    Invalid {
        /// Payload kind tag.
        kind: String,
        /// Underlying deserialization failure.
        #[source]
        source: serde_json::Error,
    },
}

type Validator = Box<dyn Fn(&Value) -> Result<(), serde_json::Error> + Send + Sync>;

struct PayloadSchema {
    type_name: &'static str,
    validate: Validator,
}

/// Maps payload kind tags to their registered Rust schema.
#[derive(Default)]
pub struct PayloadRegistry {
    schemas: HashMap<String, PayloadSchema>,
}

impl PayloadRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` as the schema for `kind`. Re-registering replaces the entry.
    pub fn register<T: DeserializeOwned + 'static>(&mut self, kind: impl Into<String>) -> &mut Self {
        let schema = PayloadSchema {
            type_name: type_name::<T>(),
            validate: Box::new(|value| serde_json::from_value::<T>(value.clone()).map(|_| ())),
        };
        let _ = self.schemas.insert(kind.into(), schema);
        self
    }

    /// Whether a schema is registered for `kind`.
    #[must_use]
    pub fn is_registered(&self, kind: &str) -> bool {
        self.schemas.contains_key(kind)
    }

    /// Registered kind tags, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Check the payload body against its registered schema.
    pub fn validate(&self, payload: &ToolPayload) -> Result<(), PayloadError> {
        let schema = self
            .schemas
            .get(&payload.kind)
            .ok_or_else(|| PayloadError::UnknownKind(payload.kind.clone()))?;
        (schema.validate)(&payload.data).map_err(|source| PayloadError::Invalid {
            kind: payload.kind.clone(),
            source,
        })
    }

    /// Decode the payload into the type registered for its kind.
    pub fn decode<T: DeserializeOwned + 'static>(
        &self,
        payload: &ToolPayload,
    ) -> Result<T, PayloadError> {
        let schema = self
            .schemas
            .get(&payload.kind)
            .ok_or_else(|| PayloadError::UnknownKind(payload.kind.clone()))?;
        if schema.type_name != type_name::<T>() {
            return Err(PayloadError::TypeMismatch {
                kind: payload.kind.clone(),
                registered: schema.type_name,
                requested: type_name::<T>(),
            });
        }
        serde_json::from_value(payload.data.clone()).map_err(|source| PayloadError::Invalid {
            kind: payload.kind.clone(),
            source,
        })
    }
}

impl std::fmt::Debug for PayloadRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
