//! In-memory plate index built from reference table rows

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::normalize::{normalize, PlateKey};
use crate::config::DatabaseSettings;
use crate::error::IndexError;
use crate::storage::reference::{read_reference_table, ReferenceColumns, ReferenceRow};

/// What to do when two rows normalize to the same plate key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Later rows overwrite earlier ones
    #[default]
    LastWins,
    /// The first row for a key is kept, later ones are ignored
    FirstWins,
    /// A duplicate fails the whole build
    Reject,
}

/// One indexed plate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlateRecord {
    pub key: PlateKey,
    pub image_filename: String,
}

/// A row whose key was already present when it was inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateEntry {
    pub key: PlateKey,
    /// Zero-based position of the row that first introduced the key
    pub first_row: usize,
    /// Zero-based position of the duplicate row
    pub row: usize,
    pub image_filename: String,
}

/// Mapping from plate key to database image filename.
///
/// Keys keep the position of their first insertion, so iteration order (and
/// the fuzzy matcher's tie-breaking) follows the reference table.
#[derive(Debug, Clone, Default)]
pub struct PlateIndex {
    records: Vec<PlateRecord>,
    positions: HashMap<PlateKey, usize>,
    first_rows: Vec<usize>,
    duplicates: Vec<DuplicateEntry>,
}

impl PlateIndex {
    /// An index that matches nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build an index with the default (last row wins) policy
    pub fn build<I, P, F>(rows: I) -> Self
    where
        I: IntoIterator<Item = (P, F)>,
        P: AsRef<str>,
        F: AsRef<str>,
    {
        match Self::build_with_policy(rows, DuplicatePolicy::LastWins) {
            Ok(index) => index,
            // LastWins never rejects
            Err(_) => Self::empty(),
        }
    }

    /// Build an index applying `policy` to duplicate keys
    pub fn build_with_policy<I, P, F>(rows: I, policy: DuplicatePolicy) -> Result<Self, IndexError>
    where
        I: IntoIterator<Item = (P, F)>,
        P: AsRef<str>,
        F: AsRef<str>,
    {
        let mut index = Self::empty();

        for (row, (raw_plate, raw_filename)) in rows.into_iter().enumerate() {
            let key = normalize(raw_plate.as_ref());
            let image_filename = raw_filename.as_ref().trim().to_string();

            if key.is_empty() {
                warn!("Skipping row {}: plate {:?} has no alphanumeric characters", row, raw_plate.as_ref());
                continue;
            }

            let Some(&pos) = index.positions.get(&key) else {
                index.positions.insert(key.clone(), index.records.len());
                index.first_rows.push(row);
                index.records.push(PlateRecord { key, image_filename });
                continue;
            };

            let first_row = index.first_rows[pos];
            debug!("Duplicate plate {} at row {} (first at row {})", key, row, first_row);

            match policy {
                DuplicatePolicy::LastWins => {
                    index.records[pos].image_filename = image_filename.clone();
                }
                DuplicatePolicy::FirstWins => {}
                DuplicatePolicy::Reject => {
                    return Err(IndexError::DuplicatePlate {
                        key: key.into_string(),
                        row,
                        first_row,
                    });
                }
            }

            index.duplicates.push(DuplicateEntry {
                key,
                first_row,
                row,
                image_filename,
            });
        }

        if !index.duplicates.is_empty() {
            warn!(
                "{} reference rows share a plate with an earlier row ({:?} policy applied)",
                index.duplicates.len(),
                policy
            );
        }

        Ok(index)
    }

    /// Build from rows produced by the reference table loader
    pub fn from_rows(rows: &[ReferenceRow], policy: DuplicatePolicy) -> Result<Self, IndexError> {
        Self::build_with_policy(
            rows.iter().map(|r| (r.plate.as_str(), r.image_filename.as_str())),
            policy,
        )
    }

    /// Load the reference table described by `settings`.
    ///
    /// Schema and duplicate-rejection failures degrade to an empty index, so
    /// the resolver keeps running and simply never grants access.
    pub fn load_or_empty(settings: &DatabaseSettings) -> Self {
        let columns = ReferenceColumns {
            plate: settings.plate_column.clone(),
            image_filename: settings.file_column.clone(),
        };

        let rows = match read_reference_table(&settings.csv_path, &columns) {
            Ok(rows) => rows,
            Err(e) => {
                error!("Plate database unavailable, no plate will match: {}", e);
                return Self::empty();
            }
        };

        match Self::from_rows(&rows, settings.duplicate_policy) {
            Ok(index) => {
                info!("Loaded {} plates from {:?}", index.len(), settings.csv_path);
                index
            }
            Err(e) => {
                error!("Plate database rejected, no plate will match: {}", e);
                Self::empty()
            }
        }
    }

    /// Image filename recorded for `key`
    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.positions
            .get(key)
            .map(|&pos| self.records[pos].image_filename.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.positions.contains_key(key)
    }

    /// Keys in first-insertion order
    pub fn keys(&self) -> impl Iterator<Item = &PlateKey> {
        self.records.iter().map(|r| &r.key)
    }

    /// Owned set of every key
    pub fn all_keys(&self) -> std::collections::HashSet<PlateKey> {
        self.keys().cloned().collect()
    }

    pub fn records(&self) -> &[PlateRecord] {
        &self.records
    }

    /// Rows that collided with an earlier key during the build
    pub fn duplicates(&self) -> &[DuplicateEntry] {
        &self.duplicates
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Shared, read-mostly plate index.
///
/// Readers take an `Arc` snapshot and keep using it for a whole resolution;
/// a reload builds the replacement off-lock and swaps the pointer.
#[derive(Debug, Default)]
pub struct PlateRegistry {
    current: RwLock<Arc<PlateIndex>>,
}

impl PlateRegistry {
    pub fn new(index: PlateIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    /// Current index; unaffected by later reloads
    pub fn snapshot(&self) -> Arc<PlateIndex> {
        self.current.read().clone()
    }

    /// Swap in a new index, returning the previous one
    pub fn replace(&self, index: PlateIndex) -> Arc<PlateIndex> {
        let next = Arc::new(index);
        std::mem::replace(&mut *self.current.write(), next)
    }

    /// Re-read the reference table and swap it in
    pub fn reload(&self, settings: &DatabaseSettings) -> Arc<PlateIndex> {
        let index = PlateIndex::load_or_empty(settings);
        self.replace(index);
        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_build_normalizes_and_trims() {
        let index = PlateIndex::build([("abc-123", "  car7.png ")]);
        assert_eq!(index.lookup("ABC123"), Some("car7.png"));
        assert!(index.lookup("abc-123").is_none());
    }

    #[test]
    fn test_duplicate_key_overwrite() {
        let index = PlateIndex::build([("ABC123", "a.png"), ("ABC123", "b.png")]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.lookup("ABC123"), Some("b.png"));
        assert_eq!(index.duplicates().len(), 1);
        assert_eq!(index.duplicates()[0].first_row, 0);
        assert_eq!(index.duplicates()[0].row, 1);
    }

    #[test]
    fn test_duplicate_first_wins() {
        let index = PlateIndex::build_with_policy(
            [("ABC123", "a.png"), ("abc 123", "b.png")],
            DuplicatePolicy::FirstWins,
        )
        .unwrap();
        assert_eq!(index.lookup("ABC123"), Some("a.png"));
        assert_eq!(index.duplicates().len(), 1);
    }

    #[test]
    fn test_duplicate_reject() {
        let result = PlateIndex::build_with_policy(
            [("ABC123", "a.png"), ("XYZ9", "x.png"), ("ABC-123", "b.png")],
            DuplicatePolicy::Reject,
        );
        match result {
            Err(IndexError::DuplicatePlate { key, row, first_row }) => {
                assert_eq!(key, "ABC123");
                assert_eq!(row, 2);
                assert_eq!(first_row, 0);
            }
            other => panic!("expected duplicate rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_overwrite_keeps_first_position() {
        let index = PlateIndex::build([("AAA1", "1.png"), ("BBB2", "2.png"), ("AAA1", "3.png")]);
        let keys: Vec<&str> = index.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["AAA1", "BBB2"]);
        assert_eq!(index.lookup("AAA1"), Some("3.png"));
    }

    #[test]
    fn test_empty_plate_rows_skipped() {
        let index = PlateIndex::build([("---", "x.png"), ("AB12", "y.png")]);
        assert_eq!(index.len(), 1);
        assert!(!index.contains(""));
    }

    #[test]
    fn test_all_keys() {
        let index = PlateIndex::build([("AB12", "a.png"), ("CD34", "b.png")]);
        let keys = index.all_keys();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains("CD34"));
    }

    #[test]
    fn test_load_or_empty_missing_columns() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "image,plate").unwrap();
        writeln!(file, "car1.png,ABC123").unwrap();

        let settings = DatabaseSettings {
            csv_path: file.path().to_path_buf(),
            ..Default::default()
        };
        let index = PlateIndex::load_or_empty(&settings);
        assert!(index.is_empty());
    }

    #[test]
    fn test_load_or_empty_missing_file() {
        let settings = DatabaseSettings {
            csv_path: "/nonexistent/labels.csv".into(),
            ..Default::default()
        };
        assert!(PlateIndex::load_or_empty(&settings).is_empty());
    }

    #[test]
    fn test_load_or_empty_reads_table() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "file_name,plate_number,notes").unwrap();
        writeln!(file, "car7.png,ABC-123,front gate").unwrap();
        writeln!(file, "car8.png,1234,").unwrap();

        let settings = DatabaseSettings {
            csv_path: file.path().to_path_buf(),
            ..Default::default()
        };
        let index = PlateIndex::load_or_empty(&settings);
        assert_eq!(index.len(), 2);
        assert_eq!(index.lookup("ABC123"), Some("car7.png"));
        assert_eq!(index.lookup("1234"), Some("car8.png"));
    }

    #[test]
    fn test_registry_snapshot_survives_replace() {
        let registry = PlateRegistry::new(PlateIndex::build([("AB12", "a.png")]));
        let before = registry.snapshot();

        let previous = registry.replace(PlateIndex::build([("CD34", "b.png")]));

        assert!(before.contains("AB12"));
        assert!(previous.contains("AB12"));
        assert!(registry.snapshot().contains("CD34"));
        assert!(!registry.snapshot().contains("AB12"));
    }

    #[test]
    fn test_registry_reload() {
        let registry = PlateRegistry::new(PlateIndex::build([("AB12", "a.png")]));
        let held = registry.snapshot();

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "file_name,plate_number").unwrap();
        writeln!(file, "q.png,QQ-11").unwrap();
        let mut settings = DatabaseSettings {
            csv_path: file.path().to_path_buf(),
            ..Default::default()
        };

        let reloaded = registry.reload(&settings);
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.lookup("QQ11"), Some("q.png"));
        assert!(held.contains("AB12"));

        // A table that can no longer be read swaps in an empty index
        settings.csv_path = "/nonexistent/labels.csv".into();
        let failed = registry.reload(&settings);
        assert!(failed.is_empty());
        assert!(registry.snapshot().is_empty());
        assert!(reloaded.contains("QQ11"));
    }
}
