//! XML qualified names.
//!
//! Registration properties and fault codes are keyed by QName. The textual
//! form follows the Clark notation used by `javax.xml.namespace.QName`:
//! `{namespace}localPart`, or just `localPart` when the namespace is empty.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A namespace-qualified name. Ordered by namespace, then local part.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QName {
    namespace: String,
    local_part: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QNameParseError {
    #[error("QName has an empty local part: {0:?}")]
    EmptyLocalPart(String),
    #[error("QName has an unterminated namespace: {0:?}")]
    UnterminatedNamespace(String),
}

impl QName {
    pub fn new(namespace: impl Into<String>, local_part: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local_part: local_part.into(),
        }
    }

    /// A name without namespace.
    pub fn local(local_part: impl Into<String>) -> Self {
        Self::new("", local_part)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn local_part(&self) -> &str {
        &self.local_part
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.local_part)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local_part)
        }
    }
}

impl FromStr for QName {
    type Err = QNameParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, local) = match s.strip_prefix('{') {
            Some(rest) => {
                let end = rest
                    .find('}')
                    .ok_or_else(|| QNameParseError::UnterminatedNamespace(s.to_string()))?;
                (&rest[..end], &rest[end + 1..])
            }
            None => ("", s),
        };

        if local.is_empty() {
            return Err(QNameParseError::EmptyLocalPart(s.to_string()));
        }
        Ok(Self::new(namespace, local))
    }
}

// Serialized as a string so QNames can be used as JSON map keys.
impl Serialize for QName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for QName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
