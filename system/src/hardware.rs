use std::fmt::{self, Display};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CpuCount(u16);

impl CpuCount {
    pub fn new(count: u16) -> Self {
        Self(count)
    }
}

impl Default for CpuCount {
    fn default() -> Self {
        Self(1)
    }
}

impl Display for CpuCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemorySize(u64); // In MiB

impl MemorySize {
    pub fn from_mib(mib: u64) -> Self {
        Self(mib)
    }

    pub fn mib(&self) -> u64 {
        self.0
    }
}

impl Default for MemorySize {
    fn default() -> Self {
        Self(512)
    }
}

impl Display for MemorySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A disk size as handed to external tooling.
///
/// Configuration may give either a bare number (`40`) or a suffixed string
/// (`20G`); both are passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiskSize(String);

impl DiskSize {
    pub fn new(size: impl Into<String>) -> Self {
        Self(size.into())
    }
}

impl Display for DiskSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for DiskSize {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DiskSizeRepr {
    Integer(u64),
    Float(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for DiskSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match DiskSizeRepr::deserialize(deserializer)? {
            DiskSizeRepr::Integer(size) => Self(size.to_string()),
            DiskSizeRepr::Float(size) => Self(size.to_string()),
            DiskSizeRepr::Text(size) => Self(size),
        })
    }
}

impl Serialize for DiskSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::from_str;

    #[test]
    fn disk_size_from_number() {
        let size: DiskSize = from_str("40").unwrap();
        assert_eq!(size.to_string(), "40");
    }

    #[test]
    fn disk_size_from_suffixed_string() {
        let size: DiskSize = from_str(r#""20G""#).unwrap();
        assert_eq!(size.as_ref(), "20G");
    }

    #[test]
    fn defaults() {
        assert_eq!(CpuCount::default(), CpuCount::new(1));
        assert_eq!(MemorySize::default().mib(), 512);
    }
}
