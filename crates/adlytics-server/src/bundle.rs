//! Reading a campaign bundle from disk.

use std::path::{Path, PathBuf};

use adlytics_core::ingest::{ingest_bundle, BUNDLE_ENTRIES};
use adlytics_core::{Campaign, CoreError};

/// Load a directory holding exactly three CSV log files.
///
/// Every directory entry counts toward the three; files are matched to log
/// kinds by their header line, not their name.
pub fn read_bundle_dir(dir: &Path) -> Result<Campaign, CoreError> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()?;

    if paths.len() != BUNDLE_ENTRIES {
        tracing::warn!(dir = %dir.display(), found = paths.len(), "rejecting bundle directory");
        return Err(CoreError::MalformedBundle { found: paths.len() });
    }
    paths.sort();

    let blocks = paths
        .iter()
        .map(|path| read_entry(path))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::info!(dir = %dir.display(), "reading campaign bundle");
    ingest_bundle(blocks.as_slice())
}

/// Read one entry as text. Directories and non-UTF-8 content are bad input,
/// not I/O failures.
fn read_entry(path: &Path) -> Result<String, CoreError> {
    let entry = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
    if !path.is_file() {
        return Err(CoreError::InvalidBundleEntry {
            entry,
            reason: "not a regular file".to_string(),
        });
    }
    std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::InvalidData => CoreError::InvalidBundleEntry {
            entry,
            reason: "not valid UTF-8 text".to_string(),
        },
        _ => CoreError::Io(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("adlytics-{}-{name}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    #[test]
    fn reads_three_files() {
        let dir = scratch_dir("three");
        std::fs::write(
            dir.join("impression_log.csv"),
            "Date,ID,Gender,Age,Income,Context,Impression Cost\n\
             2025-03-15 12:00:00,1,Male,<25,Low,News,0.5\n",
        )
        .expect("write");
        std::fs::write(
            dir.join("click_log.csv"),
            "Date,ID,Click Cost\n2025-03-15 12:00:10,1,2.0\n",
        )
        .expect("write");
        std::fs::write(
            dir.join("server_log.csv"),
            "Entry Date,ID,Exit Date,Pages Viewed,Conversion\n\
             2025-03-15 12:00:11,1,2025-03-15 12:05:00,4,Yes\n",
        )
        .expect("write");

        let campaign = read_bundle_dir(&dir).expect("bundle");
        assert_eq!(campaign.impressions().len(), 1);
        assert_eq!(campaign.clicks().len(), 1);
        assert_eq!(campaign.visits().len(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn rejects_wrong_entry_count() {
        let dir = scratch_dir("two");
        std::fs::write(dir.join("a.csv"), "Date,ID,Click Cost\n").expect("write");
        std::fs::write(dir.join("b.csv"), "Date,ID,Click Cost\n").expect("write");
        assert!(matches!(
            read_bundle_dir(&dir),
            Err(CoreError::MalformedBundle { found: 2 })
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn subdirectory_entry_is_invalid_input() {
        let dir = scratch_dir("subdir");
        std::fs::write(dir.join("a.csv"), "Date,ID,Click Cost\n").expect("write");
        std::fs::write(dir.join("b.csv"), "Date,ID,Click Cost\n").expect("write");
        std::fs::create_dir(dir.join("c")).expect("mkdir");
        let err = read_bundle_dir(&dir).expect_err("subdirectory rejected");
        assert!(
            matches!(&err, CoreError::InvalidBundleEntry { entry, .. } if entry == "c"),
            "{err:?}"
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn non_utf8_entry_is_invalid_input() {
        let dir = scratch_dir("binary");
        std::fs::write(dir.join("a.csv"), "Date,ID,Click Cost\n").expect("write");
        std::fs::write(dir.join("b.csv"), "Date,ID,Click Cost\n").expect("write");
        std::fs::write(dir.join("c.csv"), [0xff, 0xfe, 0x00, 0xc3]).expect("write");
        assert!(matches!(
            read_bundle_dir(&dir),
            Err(CoreError::InvalidBundleEntry { .. })
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_directory_is_io_error() {
        let dir = std::env::temp_dir().join("adlytics-does-not-exist-7f3a");
        assert!(matches!(read_bundle_dir(&dir), Err(CoreError::Io(_))));
    }
}
