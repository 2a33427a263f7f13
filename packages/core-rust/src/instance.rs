//! Site instances (language subdomains) served by the edge.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A language instance of the site, addressed by its subdomain (`de.`, `en.`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Instance {
    De,
    En,
    Es,
    Fr,
    Hi,
    Ta,
}

impl Instance {
    /// Every known instance, in subdomain order.
    pub const ALL: [Instance; 6] = [
        Instance::De,
        Instance::En,
        Instance::Es,
        Instance::Fr,
        Instance::Hi,
        Instance::Ta,
    ];

    /// Returns the subdomain label for this instance.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Instance::De => "de",
            Instance::En => "en",
            Instance::Es => "es",
            Instance::Fr => "fr",
            Instance::Hi => "hi",
            Instance::Ta => "ta",
        }
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a subdomain is not one of the known instances.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown instance: {0:?}")]
pub struct UnknownInstance(pub String);

impl FromStr for Instance {
    type Err = UnknownInstance;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Instance::ALL
            .into_iter()
            .find(|instance| instance.as_str() == s)
            .ok_or_else(|| UnknownInstance(s.to_string()))
    }
}
