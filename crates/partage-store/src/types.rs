//! Store types

use serde::{Deserialize, Serialize};

/// Sidecar record kept next to every blob
///
/// Serialized with PascalCase keys: `{"Filename": .., "Size": .., "Expiry": ..}`.
/// `expiry` is an absolute Unix timestamp in seconds; zero or negative means
/// the blob never expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Metadata {
    pub filename: String,
    pub size: i64,
    pub expiry: i64,
}

impl Metadata {
    pub fn never_expires(&self) -> bool {
        self.expiry <= 0
    }

    /// Whether the record is eligible for reclamation at `now`
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expiry > 0 && now >= self.expiry
    }
}

/// What the sweeper does with a metadata record it cannot parse
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CorruptPolicy {
    /// Log the record, count it as skipped and keep going
    #[default]
    Skip,
    /// Stop the pass on the first corrupt record
    Abort,
}

/// Outcome of one sweep pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Records parsed successfully (deleted + retained)
    pub scanned: u64,
    pub deleted: u64,
    pub retained: u64,
    pub retained_bytes: u64,
    /// Corrupt records left in place
    pub skipped: u64,
}

/// Format a byte count with IEC units ("512 B", "1.5 KiB", "32 GiB")
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

    if bytes < 10 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if value < 10.0 {
        format!("{:.1} {}", value, UNITS[unit])
    } else {
        format!("{:.0} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_wire_format() {
        let meta = Metadata {
            filename: "0f3c.png".to_string(),
            size: 100,
            expiry: 1_700_000_000,
        };

        let json = serde_json::to_string(&meta).unwrap();
        assert_eq!(
            json,
            r#"{"Filename":"0f3c.png","Size":100,"Expiry":1700000000}"#
        );

        let parsed: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, meta);
    }

    #[test]
    fn test_expiry_evaluation() {
        let mut meta = Metadata {
            filename: "a".to_string(),
            size: 1,
            expiry: 1000,
        };

        assert!(!meta.is_expired_at(999));
        assert!(meta.is_expired_at(1000));
        assert!(meta.is_expired_at(5000));

        meta.expiry = 0;
        assert!(meta.never_expires());
        assert!(!meta.is_expired_at(i64::MAX));

        meta.expiry = -5;
        assert!(!meta.is_expired_at(i64::MAX));
    }

    #[test]
    fn test_sweep_report_default() {
        let report = SweepReport::default();
        assert_eq!(report.scanned, 0);
        assert_eq!(report.deleted, 0);
        assert_eq!(report.retained_bytes, 0);
    }

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(0), "0 B");
        assert_eq!(human_bytes(9), "9 B");
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(1536), "1.5 KiB");
        assert_eq!(human_bytes(34_359_738_368), "32 GiB");
    }
}
