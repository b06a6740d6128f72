// ── VM identity ──
//
// The hypervisor names every computer system by a GUID string. Providers
// are not consistent about case or braces, so the mirror keys entries by
// a normalized form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable identifier of a managed virtual machine.
///
/// Normalized to uppercase without surrounding braces
/// (`6A1D8E2C-...`), matching what the management service reports in
/// `Msvm_ComputerSystem.Name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct VmGuid(String);

impl VmGuid {
    /// Create a normalized guid from any common spelling.
    pub fn new(raw: impl AsRef<str>) -> Self {
        let trimmed = raw
            .as_ref()
            .trim()
            .trim_start_matches('{')
            .trim_end_matches('}');
        Self(trimmed.to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VmGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VmGuid {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<String> for VmGuid {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for VmGuid {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<VmGuid> for String {
    fn from(guid: VmGuid) -> Self {
        guid.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case() {
        let guid = VmGuid::new("6a1d8e2c-0f4b-4c55-9d1e-5b2f7a0c9e11");
        assert_eq!(guid.as_str(), "6A1D8E2C-0F4B-4C55-9D1E-5B2F7A0C9E11");
    }

    #[test]
    fn strips_braces_and_whitespace() {
        let guid = VmGuid::new(" {6a1d8e2c-0f4b-4c55-9d1e-5b2f7a0c9e11} ");
        assert_eq!(guid, VmGuid::new("6A1D8E2C-0F4B-4C55-9D1E-5B2F7A0C9E11"));
    }

    #[test]
    fn parses_from_str() {
        let guid: VmGuid = "abc".parse().unwrap();
        assert_eq!(guid.to_string(), "ABC");
    }

    #[test]
    fn deserializes_through_normalization() {
        let guid: VmGuid = serde_json::from_str("\"{abc-def}\"").unwrap();
        assert_eq!(guid.as_str(), "ABC-DEF");
        assert_eq!(serde_json::to_string(&guid).unwrap(), "\"ABC-DEF\"");
    }
}
