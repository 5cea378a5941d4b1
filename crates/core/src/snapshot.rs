//! Snapshot kinds, windows and the listing record exchanged with clients.

use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Identifier of a stored snapshot.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(i64);

impl SnapshotId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Parse from a query-string value.
    pub fn parse(s: &str) -> crate::Result<Self> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|e| crate::Error::InvalidSnapshotId(format!("{s:?}: {e}")))
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Debug for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SnapshotId({})", self.0)
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a snapshot covers the whole calendar or only a modification window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SnapshotKind {
    Full,
    Partial,
}

impl SnapshotKind {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Partial => "partial",
        }
    }

    /// Parse the storage representation. Anything else is an unrecognized kind.
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "full" => Some(Self::Full),
            "partial" => Some(Self::Partial),
            _ => None,
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed interval of event modification times covered by a partial snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SnapshotWindow {
    start: OffsetDateTime,
    end: OffsetDateTime,
}

impl SnapshotWindow {
    /// Build a window, requiring `start <= end`.
    pub fn new(start: OffsetDateTime, end: OffsetDateTime) -> crate::Result<Self> {
        if start > end {
            return Err(crate::Error::InvalidWindow(format!(
                "start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The window covering every representable instant, used for full snapshots.
    pub fn unbounded() -> Self {
        Self {
            start: crate::WINDOW_MIN,
            end: crate::WINDOW_MAX,
        }
    }

    pub fn start(&self) -> OffsetDateTime {
        self.start
    }

    pub fn end(&self) -> OffsetDateTime {
        self.end
    }
}

/// Check that the presence of window bounds agrees with the snapshot kind.
///
/// Partial snapshots need both bounds with `start <= end`; full snapshots
/// carry none.
pub fn validate_shape(
    kind: SnapshotKind,
    start: Option<OffsetDateTime>,
    end: Option<OffsetDateTime>,
) -> crate::Result<Option<SnapshotWindow>> {
    match (kind, start, end) {
        (SnapshotKind::Full, None, None) => Ok(None),
        (SnapshotKind::Full, _, _) => Err(crate::Error::InvalidWindow(
            "full snapshots cannot carry window bounds".to_string(),
        )),
        (SnapshotKind::Partial, Some(start), Some(end)) => {
            SnapshotWindow::new(start, end).map(Some)
        }
        (SnapshotKind::Partial, _, _) => Err(crate::Error::InvalidWindow(
            "partial snapshots require both window bounds".to_string(),
        )),
    }
}

/// One entry of the snapshot listing returned to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotInfo {
    pub id: SnapshotId,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(rename = "type")]
    pub kind: SnapshotKind,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub window_start: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub window_end: Option<OffsetDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn snapshot_id_parse() {
        assert_eq!(SnapshotId::parse("42").unwrap().get(), 42);
        assert_eq!(SnapshotId::parse(" 7 ").unwrap().get(), 7);
        assert!(SnapshotId::parse("abc").is_err());
        assert!(SnapshotId::parse("").is_err());
    }

    #[test]
    fn kind_from_db_rejects_unknown_names() {
        assert_eq!(SnapshotKind::from_db("full"), Some(SnapshotKind::Full));
        assert_eq!(SnapshotKind::from_db("partial"), Some(SnapshotKind::Partial));
        assert_eq!(SnapshotKind::from_db("Full"), None);
        assert_eq!(SnapshotKind::from_db("unknown"), None);
    }

    #[test]
    fn window_rejects_inverted_bounds() {
        let early = datetime!(2024-01-01 00:00 UTC);
        let late = datetime!(2024-01-02 00:00 UTC);
        assert!(SnapshotWindow::new(early, late).is_ok());
        assert!(SnapshotWindow::new(early, early).is_ok());
        assert!(SnapshotWindow::new(late, early).is_err());
    }

    #[test]
    fn shape_must_match_kind() {
        let start = datetime!(2024-01-01 00:00 UTC);
        let end = datetime!(2024-01-02 00:00 UTC);

        assert!(validate_shape(SnapshotKind::Full, None, None).unwrap().is_none());
        assert!(validate_shape(SnapshotKind::Full, Some(start), None).is_err());
        assert!(validate_shape(SnapshotKind::Partial, Some(start), None).is_err());
        assert!(validate_shape(SnapshotKind::Partial, None, None).is_err());
        assert!(validate_shape(SnapshotKind::Partial, Some(end), Some(start)).is_err());

        let window = validate_shape(SnapshotKind::Partial, Some(start), Some(end))
            .unwrap()
            .unwrap();
        assert_eq!(window.start(), start);
        assert_eq!(window.end(), end);
    }

    #[test]
    fn full_snapshot_info_serializes_null_bounds() {
        let info = SnapshotInfo {
            id: SnapshotId::new(3),
            timestamp: datetime!(2024-05-01 12:30 UTC),
            kind: SnapshotKind::Full,
            window_start: None,
            window_end: None,
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["id"], 3);
        assert_eq!(value["type"], "Full");
        assert_eq!(value["timestamp"], "2024-05-01T12:30:00Z");
        assert!(value["windowStart"].is_null());
        assert!(value["windowEnd"].is_null());
    }

    #[test]
    fn partial_snapshot_info_carries_bounds() {
        let json = r#"{
            "id": 9,
            "timestamp": "2024-05-01T12:30:00Z",
            "type": "Partial",
            "windowStart": "2024-04-30T12:30:00Z",
            "windowEnd": "2024-05-01T12:30:00Z"
        }"#;
        let info: SnapshotInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.kind, SnapshotKind::Partial);
        assert_eq!(info.window_start, Some(datetime!(2024-04-30 12:30 UTC)));
        assert_eq!(info.window_end, Some(datetime!(2024-05-01 12:30 UTC)));
    }
}
