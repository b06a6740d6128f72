// ── Bulk summary query types ──
//
// `GetSummaryInformation` takes a list of numeric field ids and returns
// one `Msvm_SummaryInformation` per settings-data handle.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::Display;

use super::guid::VmGuid;

/// Requestable summary fields and their wire ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryField {
    Name,
    NumberOfProcessors,
    ThumbnailImage,
    Version,
    ProcessorLoad,
    MemoryUsage,
    Heartbeat,
    Uptime,
    MemoryAvailable,
}

impl SummaryField {
    /// The field set the poller requests by default. Identity fields are
    /// left out: the main group is fed by change notifications only.
    pub const DEFAULT_REQUEST: [Self; 5] = [
        Self::ProcessorLoad,
        Self::MemoryUsage,
        Self::Heartbeat,
        Self::Uptime,
        Self::MemoryAvailable,
    ];

    pub fn id(self) -> u32 {
        match self {
            Self::Name => 0,
            Self::NumberOfProcessors => 4,
            Self::ThumbnailImage => 7,
            Self::Version => 10,
            Self::ProcessorLoad => 101,
            Self::MemoryUsage => 103,
            Self::Heartbeat => 104,
            Self::Uptime => 105,
            Self::MemoryAvailable => 112,
        }
    }
}

/// Guest heartbeat integration-service status (`OperationalStatus` codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Heartbeat {
    Ok,
    Degraded,
    Error,
    NonRecoverableError,
    NoContact,
    LostCommunication,
    Paused,
    Unknown(u16),
}

impl Heartbeat {
    pub fn from_code(code: u16) -> Self {
        match code {
            2 => Self::Ok,
            3 => Self::Degraded,
            6 => Self::Error,
            7 => Self::NonRecoverableError,
            12 => Self::NoContact,
            13 => Self::LostCommunication,
            15 => Self::Paused,
            other => Self::Unknown(other),
        }
    }

    pub fn is_healthy(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl std::fmt::Display for Heartbeat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => f.write_str("OK"),
            Self::Degraded => f.write_str("Degraded"),
            Self::Error => f.write_str("Error"),
            Self::NonRecoverableError => f.write_str("Non-recoverable"),
            Self::NoContact => f.write_str("No Contact"),
            Self::LostCommunication => f.write_str("Lost Communication"),
            Self::Paused => f.write_str("Paused"),
            Self::Unknown(code) => write!(f, "Unknown ({code})"),
        }
    }
}

/// Per-instance metrics returned by the bulk summary query.
///
/// Every metric is optional: the service leaves fields empty for guests
/// that are off or lack the relevant integration service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub guid: VmGuid,
    /// CPU load in percent.
    #[serde(default)]
    pub processor_load: Option<u16>,
    /// Assigned memory in MiB.
    #[serde(default)]
    pub memory_usage_mb: Option<u64>,
    #[serde(default)]
    pub heartbeat: Option<Heartbeat>,
    #[serde(default, with = "millis")]
    pub uptime: Option<Duration>,
    /// Memory still available to the guest, in percent.
    #[serde(default)]
    pub memory_available_pct: Option<i32>,
}

impl SummaryRecord {
    pub fn new(guid: impl Into<VmGuid>) -> Self {
        Self {
            guid: guid.into(),
            ..Self::default()
        }
    }
}

/// Uptime travels as integer milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Duration>, ser: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => ser.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(de)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_request_uses_service_field_ids() {
        let ids: Vec<u32> = SummaryField::DEFAULT_REQUEST
            .iter()
            .map(|f| f.id())
            .collect();
        assert_eq!(ids, vec![101, 103, 104, 105, 112]);
    }

    #[test]
    fn heartbeat_decodes_operational_status() {
        assert_eq!(Heartbeat::from_code(2), Heartbeat::Ok);
        assert_eq!(Heartbeat::from_code(12), Heartbeat::NoContact);
        assert_eq!(Heartbeat::from_code(99), Heartbeat::Unknown(99));
        assert!(!Heartbeat::Degraded.is_healthy());
    }

    #[test]
    fn record_reads_uptime_as_millis() {
        let record: SummaryRecord = serde_json::from_str(
            r#"{ "guid": "a", "processor_load": 12, "uptime": 90500 }"#,
        )
        .unwrap();
        assert_eq!(record.uptime, Some(Duration::from_millis(90_500)));
        assert_eq!(record.processor_load, Some(12));
        assert!(record.heartbeat.is_none());
    }
}
