//! Cluster definitions: the user-supplied YAML document describing a cluster.

use std::time::Duration;

use serde_yaml::Value;
use thiserror::Error;

/// Definition document that cannot be provisioned.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("malformed cluster definition: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("malformed cluster definition: {0}")]
    Shape(String),
}

/// A parsed cluster definition.
///
/// The document is an open mapping handed through to the workspace template
/// unchanged; only two fields are interpreted here:
///
/// - `spec.template` (required): name of the template to build from.
/// - `spec.wait_after_apply` (optional): minutes to wait between the
///   infrastructure coming up and configuration provisioning starting, for
///   targets whose instances need time to settle.
#[derive(Debug, Clone)]
pub struct ClusterDefinition {
    doc: Value,
    raw: String,
}

impl ClusterDefinition {
    /// Parses and shape-checks a definition.
    ///
    /// # Errors
    /// Invalid YAML, a missing or non-string `spec.template`, or a
    /// non-integer `spec.wait_after_apply` are all malformed definitions.
    pub fn from_yaml(text: &str) -> Result<Self, DefinitionError> {
        let doc: Value = serde_yaml::from_str(text)?;
        let definition = Self {
            doc,
            raw: text.to_string(),
        };
        definition.check_shape()?;
        Ok(definition)
    }

    fn check_shape(&self) -> Result<(), DefinitionError> {
        match self.spec_field("template") {
            Some(Value::String(name)) if !name.is_empty() => {}
            Some(_) => {
                return Err(DefinitionError::Shape(
                    "spec.template must be a non-empty string".to_string(),
                ));
            }
            None => {
                return Err(DefinitionError::Shape(
                    "spec.template is missing".to_string(),
                ));
            }
        }
        if let Some(value) = self.spec_field("wait_after_apply") {
            // Rejecting values whose seconds equivalent overflows keeps the
            // accessor below infallible.
            match value.as_u64() {
                Some(minutes) if minutes.checked_mul(60).is_some() => {}
                _ => {
                    return Err(DefinitionError::Shape(
                        "spec.wait_after_apply must be a non-negative integer (minutes)"
                            .to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Name of the template this definition builds from.
    pub fn template(&self) -> &str {
        self.spec_field("template")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Settle delay requested between infra apply and provisioning.
    pub fn wait_after_apply(&self) -> Option<Duration> {
        self.spec_field("wait_after_apply")
            .and_then(Value::as_u64)
            .and_then(|minutes| minutes.checked_mul(60))
            .map(Duration::from_secs)
    }

    /// The definition exactly as submitted, for writing into the workspace.
    pub fn as_yaml(&self) -> &str {
        &self.raw
    }

    fn spec_field(&self, key: &str) -> Option<&Value> {
        self.doc.get("spec")?.get(key)
    }
}
