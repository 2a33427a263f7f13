//! Response schema of the upstream GraphQL API's `uuid` query.
//!
//! Decoding is strict: a body that does not have the shape
//! `{ "data": { "uuid": { "__typename": string, ... } } }` is a
//! [`SchemaError`], never a partially filled value.

use serde::Deserialize;

use crate::instance::Instance;
use crate::path_info::{PathInfo, PathInfoError};

/// GraphQL query sent to resolve a path to its canonical identity.
pub const PATH_INFO_QUERY: &str = r"
    query TypenameAndCurrentPath($alias: AliasInput) {
      uuid(alias: $alias) {
        __typename
        ... on AbstractUuid {
          alias
        }
        ... on InstanceAware {
          instance
        }
        ... on Course {
          pages(trashed: false, hasCurrentRevision: true) {
            alias
          }
        }
        ... on Solution {
          exercise {
            alias
          }
        }
        ... on Comment {
          id
          legacyObject {
            alias
          }
        }
      }
    }";

#[derive(Debug, Deserialize)]
struct UuidResponse {
    data: UuidData,
}

#[derive(Debug, Deserialize)]
struct UuidData {
    uuid: UuidRecord,
}

/// An object that only carries its alias.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AliasRef {
    pub alias: String,
}

/// The `uuid` object returned by the upstream API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UuidRecord {
    #[serde(rename = "__typename")]
    pub type_name: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub instance: Option<Instance>,
    #[serde(default)]
    pub pages: Option<Vec<AliasRef>>,
    #[serde(default)]
    pub exercise: Option<AliasRef>,
    #[serde(default)]
    pub legacy_object: Option<AliasRef>,
    #[serde(default)]
    pub id: Option<u64>,
}

/// Reasons an upstream response body is rejected.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("response does not match the uuid schema: {0}")]
    Shape(#[from] serde_json::Error),
    #[error("response describes an invalid path info: {0}")]
    Invalid(#[from] PathInfoError),
}

/// Decodes an upstream response body into its `uuid` record.
///
/// # Errors
///
/// Returns [`SchemaError::Shape`] for malformed JSON or any deviation from
/// the documented shape (missing `data`, `uuid: null`, wrong field types,
/// unknown instance).
pub fn decode_uuid_response(body: &[u8]) -> Result<UuidRecord, SchemaError> {
    let response: UuidResponse = serde_json::from_slice(body)?;
    Ok(response.data.uuid)
}

impl UuidRecord {
    /// Picks the canonical path for this record.
    ///
    /// Precedence: parent object alias, then exercise alias, then the first
    /// child page's alias, then the record's own alias, and finally the
    /// originally requested path.
    #[must_use]
    pub fn current_path<'a>(&'a self, requested_path: &'a str) -> &'a str {
        if let Some(parent) = &self.legacy_object {
            return &parent.alias;
        }
        if let Some(exercise) = &self.exercise {
            return &exercise.alias;
        }
        if let Some(first_page) = self.pages.as_ref().and_then(|pages| pages.first()) {
            return &first_page.alias;
        }
        self.alias.as_deref().unwrap_or(requested_path)
    }

    /// Fragment pointing at this record inside its parent's page.
    ///
    /// Only records with a parent object (comments) have one.
    #[must_use]
    pub fn fragment(&self) -> Option<String> {
        self.legacy_object
            .as_ref()
            .map(|_| format!("#comment-{}", self.id.unwrap_or(0)))
    }

    /// Converts this record into a validated [`PathInfo`].
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Invalid`] when the type name is empty or the
    /// chosen canonical path is not absolute.
    pub fn into_path_info(self, requested_path: &str) -> Result<PathInfo, SchemaError> {
        let info = PathInfo {
            current_path: self.current_path(requested_path).to_string(),
            fragment: self.fragment(),
            instance: self.instance,
            type_name: self.type_name,
        };
        info.validate()?;
        Ok(info)
    }
}
