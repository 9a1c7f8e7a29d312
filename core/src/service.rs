use crate::url::Url;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `(interface, group, version)`, selects one logical service across all providers.
///
/// Used as the registry subscription key and to route sender pools.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceIdentity {
    pub interface: String,
    pub group: String,
    pub version: String,
}

impl ServiceIdentity {
    pub fn new(
        interface: impl Into<String>, group: impl Into<String>, version: impl Into<String>,
    ) -> Self {
        Self { interface: interface.into(), group: group.into(), version: version.into() }
    }

    /// Interface only, empty group and version
    #[inline]
    pub fn of(interface: impl Into<String>) -> Self {
        Self::new(interface, "", "")
    }

    /// The identity implied by an endpoint: its path plus group/version params
    pub fn from_url(url: &Url) -> Self {
        Self::new(url.path(), url.group().unwrap_or(""), url.version().unwrap_or(""))
    }
}

impl From<&Url> for ServiceIdentity {
    #[inline]
    fn from(url: &Url) -> Self {
        Self::from_url(url)
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if !self.group.is_empty() {
            write!(f, "{}/", self.group)?;
        }
        write!(f, "{}", self.interface)?;
        if !self.version.is_empty() {
            write!(f, ":{}", self.version)?;
        }
        Ok(())
    }
}
