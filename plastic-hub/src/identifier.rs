use crate::error::{PlasticError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

static UNSAFE_NAME_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_]+").unwrap());

/// Opaque URI-shaped token naming a peer or a message.
///
/// The text is kept exactly as given so that two identifiers are equal
/// iff their strings are equal; parsing only checks that the text is an
/// absolute URI. Surrounding whitespace is refused rather than trimmed.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim() != text {
            return Err(PlasticError::InvalidIdentifier {
                value: text.to_string(),
                reason: "leading or trailing whitespace".to_string(),
            });
        }
        Url::parse(text).map_err(|e| PlasticError::InvalidIdentifier {
            value: text.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self(text.to_string()))
    }

    /// Identifier for a compile-time constant known to be well formed.
    pub(crate) fn from_static(text: &'static str) -> Self {
        debug_assert!(Url::parse(text).is_ok(), "bad static identifier {text}");
        Self(text.to_string())
    }

    /// Builds a peer identifier unique within one hub instance.
    ///
    /// `instance` distinguishes hubs, `seq` distinguishes registrations
    /// within a hub and `name` is only decoration.
    pub fn for_peer(instance: u32, seq: u32, name: &str) -> Self {
        let tag = UNSAFE_NAME_CHARS.replace_all(name, "_");
        Self(format!("plastic://hub/{:x}-{}-{}", instance, seq, tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn scheme(&self) -> &str {
        self.0.split(':').next().unwrap_or_default()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identifier {
    type Err = PlasticError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = PlasticError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Identifier {
    type Error = PlasticError;

    fn try_from(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
