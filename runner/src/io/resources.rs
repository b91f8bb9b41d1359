//! Credential file checks performed before any launch decision.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::unit::{UnitId, WorkUnit};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceCheck {
    Present,
    Missing,
    Unreadable(String),
}

/// Check that `path` is a regular file that can be opened for reading.
///
/// The contents are not parsed; keypair format is the claim operation's concern.
pub fn check_resource(path: &Path) -> ResourceCheck {
    match fs::metadata(path) {
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => ResourceCheck::Missing,
        Err(err) => ResourceCheck::Unreadable(err.to_string()),
        Ok(meta) if !meta.is_file() => ResourceCheck::Unreadable("not a regular file".to_string()),
        Ok(_) => match File::open(path) {
            Ok(_) => ResourceCheck::Present,
            Err(err) => ResourceCheck::Unreadable(err.to_string()),
        },
    }
}

/// A unit excluded from launching, with the reason shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedUnit {
    pub id: UnitId,
    pub path: PathBuf,
    pub reason: String,
}

impl SkippedUnit {
    pub fn warning_line(&self) -> String {
        format!(
            "warning: skipping unit {}: {} ({})",
            self.id,
            self.path.display(),
            self.reason
        )
    }
}

/// Validation result. `eligible` keeps enumeration order.
#[derive(Debug, Default)]
pub struct Validated {
    pub eligible: Vec<WorkUnit>,
    pub skipped: Vec<WorkUnit>,
    pub notices: Vec<SkippedUnit>,
}

/// Split enumerated units into launch-eligible and skipped ones.
///
/// Runs to completion before the caller launches anything. Skips never abort the
/// run; an empty `eligible` list is a valid outcome.
pub fn validate_units(units: impl IntoIterator<Item = WorkUnit>) -> Validated {
    let mut validated = Validated::default();
    for mut unit in units {
        let reason = match check_resource(&unit.resource_path) {
            ResourceCheck::Present => {
                debug!(unit = %unit.id, path = %unit.resource_path.display(), "credential present");
                validated.eligible.push(unit);
                continue;
            }
            ResourceCheck::Missing => "file not found".to_string(),
            ResourceCheck::Unreadable(err) => format!("unreadable: {err}"),
        };

        info!(unit = %unit.id, path = %unit.resource_path.display(), %reason, "skipping unit");
        // Freshly enumerated units are always Pending.
        if let Err(err) = unit.skip() {
            warn!(%err, "unexpected status while skipping");
        }
        validated.notices.push(SkippedUnit {
            id: unit.id,
            path: unit.resource_path.clone(),
            reason,
        });
        validated.skipped.push(unit);
    }
    validated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::enumerate::UnitLayout;
    use crate::core::unit::UnitStatus;

    #[test]
    fn classifies_present_missing_and_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join("id1.json");
        fs::write(&file, "[]").expect("write");
        let dir = temp.path().join("id2.json");
        fs::create_dir(&dir).expect("mkdir");

        assert_eq!(check_resource(&file), ResourceCheck::Present);
        assert_eq!(
            check_resource(&temp.path().join("id3.json")),
            ResourceCheck::Missing
        );
        assert!(matches!(check_resource(&dir), ResourceCheck::Unreadable(_)));
    }

    #[test]
    fn missing_credentials_are_skipped_in_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("id1.json"), "[]").expect("write");
        fs::write(temp.path().join("id3.json"), "[]").expect("write");

        let layout = UnitLayout::new(temp.path());
        let validated = validate_units(layout.enumerate(4));

        let eligible: Vec<u32> = validated.eligible.iter().map(|u| u.id.0).collect();
        assert_eq!(eligible, vec![1, 3]);
        assert!(
            validated
                .eligible
                .iter()
                .all(|u| u.status == UnitStatus::Pending)
        );

        let skipped: Vec<u32> = validated.notices.iter().map(|n| n.id.0).collect();
        assert_eq!(skipped, vec![2, 4]);
        assert!(
            validated
                .skipped
                .iter()
                .all(|u| u.status == UnitStatus::Skipped)
        );
        assert!(validated.notices[0].warning_line().contains("skipping unit 2"));
    }

    #[test]
    fn nothing_to_validate_is_not_an_error() {
        let validated = validate_units(UnitLayout::new("nowhere").enumerate(0));
        assert!(validated.eligible.is_empty());
        assert!(validated.notices.is_empty());
    }
}
