//! Canonical identity of a resource at a site instance.

use serde::{Deserialize, Serialize};

use crate::instance::Instance;

/// Canonical type, path and instance of a resource.
///
/// Construct through [`PathInfo::new`] or [`PathInfo::from_json`], both of
/// which reject values whose `type_name` is empty or whose `current_path` is
/// not absolute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathInfo {
    /// Classification tag reported by the upstream API (e.g. `Page`).
    pub type_name: String,
    /// Authoritative absolute path of the resource.
    pub current_path: String,
    /// Instance the resource belongs to, when it differs by resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<Instance>,
    /// Fragment (including the leading `#`) to append to the canonical URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment: Option<String>,
}

/// Reasons a `PathInfo` fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathInfoError {
    #[error("type name is empty")]
    EmptyTypeName,
    #[error("current path is not absolute: {0:?}")]
    RelativePath(String),
    #[error("fragment does not start with '#': {0:?}")]
    MalformedFragment(String),
    #[error("malformed path info json: {0}")]
    Json(String),
}

impl PathInfo {
    /// Builds a validated `PathInfo` without instance or fragment.
    ///
    /// # Errors
    ///
    /// Returns [`PathInfoError`] if the type name is empty or the path is
    /// not absolute.
    pub fn new(
        type_name: impl Into<String>,
        current_path: impl Into<String>,
    ) -> Result<Self, PathInfoError> {
        let info = Self {
            type_name: type_name.into(),
            current_path: current_path.into(),
            instance: None,
            fragment: None,
        };
        info.validate()?;
        Ok(info)
    }

    /// Checks the invariants of this value.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), PathInfoError> {
        if self.type_name.is_empty() {
            return Err(PathInfoError::EmptyTypeName);
        }
        if !is_absolute_path(&self.current_path) {
            return Err(PathInfoError::RelativePath(self.current_path.clone()));
        }
        if let Some(fragment) = &self.fragment {
            if !fragment.starts_with('#') {
                return Err(PathInfoError::MalformedFragment(fragment.clone()));
            }
        }
        Ok(())
    }

    /// Decodes and validates a cached JSON representation.
    ///
    /// # Errors
    ///
    /// Returns [`PathInfoError::Json`] for malformed JSON or a shape
    /// mismatch, and the validation error for schema-conforming values that
    /// break an invariant.
    pub fn from_json(json: &str) -> Result<Self, PathInfoError> {
        let info: Self =
            serde_json::from_str(json).map_err(|e| PathInfoError::Json(e.to_string()))?;
        info.validate()?;
        Ok(info)
    }

    /// Serializes this value into its cached JSON representation.
    #[must_use]
    pub fn to_json(&self) -> String {
        // A struct of strings and a unit enum always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Returns `true` for paths like `/`, `/math` or `/de/42`.
///
/// Protocol-relative paths (`//host/...`) are rejected because a browser
/// would treat them as a different origin when used as a redirect target.
#[must_use]
pub fn is_absolute_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains(['\r', '\n'])
}
