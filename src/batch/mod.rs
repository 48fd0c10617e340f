//! Batch Evaluation
//!
//! Resolves every image in a folder that the reference table lists and
//! compares the decision with the table's plate for that file. The per-image
//! pass/fail rows feed external access-log updaters.

use anyhow::{Context, Result};
use crossbeam_channel::unbounded;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::access::{AccessResolver, DecisionRecord};
use crate::plates::{normalize, PlateKey, PlateRegistry};
use crate::storage::ReferenceRow;

/// Placeholder shown when nothing was read from an image
const NOTHING_DETECTED: &str = "NONE";

/// Expected plate for each image filename; later rows overwrite earlier ones
pub fn ground_truth(rows: &[ReferenceRow]) -> HashMap<String, PlateKey> {
    rows.iter()
        .map(|row| (row.image_filename.trim().to_string(), normalize(row.plate.as_str())))
        .collect()
}

/// Outcome for one evaluated image
#[derive(Debug, Clone, Serialize)]
pub struct BatchRow {
    pub image: String,
    pub expected: PlateKey,
    /// Matched key when granted, otherwise the best detected text or `NONE`
    pub detected: String,
    pub passed: bool,
    pub record: DecisionRecord,
}

impl BatchRow {
    fn new(image: String, expected: PlateKey, record: DecisionRecord) -> Self {
        let detected = match (&record.matched_plate, &record.detected_plate) {
            (Some(key), _) if record.matched => key.to_string(),
            (_, Some(text)) if !text.is_empty() => text.clone(),
            _ => NOTHING_DETECTED.to_string(),
        };
        let passed = record.matched && record.matched_plate.as_ref() == Some(&expected);

        Self {
            image,
            expected,
            detected,
            passed,
            record,
        }
    }
}

/// Totals over a batch run
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub matches: usize,
    pub failures: usize,
    /// Success rate in percent, 0 when nothing was evaluated
    pub accuracy: f64,
}

impl BatchSummary {
    fn from_rows(rows: &[BatchRow]) -> Self {
        let total = rows.len();
        let matches = rows.iter().filter(|r| r.passed).count();
        let accuracy = if total > 0 {
            matches as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        Self {
            total,
            matches,
            failures: total - matches,
            accuracy,
        }
    }
}

/// Per-image rows sorted by file name, plus totals
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub rows: Vec<BatchRow>,
    pub summary: BatchSummary,
}

impl BatchReport {
    fn new(mut rows: Vec<BatchRow>) -> Self {
        rows.sort_by(|a, b| a.image.cmp(&b.image));
        let summary = BatchSummary::from_rows(&rows);
        Self { rows, summary }
    }

    /// Console table in the `IMAGE | REAL | DETECTED | RESULT` layout
    pub fn to_table(&self) -> String {
        let mut out = String::new();
        let rule = "-".repeat(70);

        let _ = writeln!(out, "{:<20} | {:<15} | {:<15} | RESULT", "IMAGE", "REAL (CSV)", "DETECTED");
        let _ = writeln!(out, "{}", rule);
        for row in &self.rows {
            let status = if row.passed { "MATCH" } else { "FAIL" };
            let _ = writeln!(
                out,
                "{:<20} | {:<15} | {:<15} | {}",
                row.image,
                row.expected.as_str(),
                row.detected,
                status
            );
        }
        let _ = writeln!(out, "{}", rule);

        let s = &self.summary;
        if s.total > 0 {
            let _ = writeln!(out, "Total: {} | Success: {} | Fail: {}", s.total, s.matches, s.failures);
            let _ = writeln!(out, "Overall Success Rate: {:.2}%", s.accuracy);
        } else {
            let _ = writeln!(out, "No images found in CSV/Folder to test.");
        }

        out
    }

    /// Write the report as pretty JSON
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write report {:?}", path))?;
        Ok(())
    }
}

/// Evaluates image folders against ground truth on a pool of worker threads
pub struct BatchRunner<'r, 'a> {
    resolver: &'r AccessResolver<'a>,
    workers: usize,
}

impl<'r, 'a> BatchRunner<'r, 'a> {
    pub fn new(resolver: &'r AccessResolver<'a>, workers: usize) -> Self {
        Self {
            resolver,
            workers: workers.max(1),
        }
    }

    /// Evaluate every image in `dir` that has a ground-truth entry.
    ///
    /// All workers read one snapshot of `registry`, so a concurrent reload
    /// does not change the database mid-run.
    pub fn run(&self, dir: &Path, truth: &HashMap<String, PlateKey>, registry: &PlateRegistry) -> Result<BatchReport> {
        let jobs = collect_jobs(dir, truth)?;
        let snapshot = registry.snapshot();
        let index = snapshot.as_ref();
        info!("Evaluating {} images from {:?} on {} workers", jobs.len(), dir, self.workers);

        let (job_tx, job_rx) = unbounded::<(String, PathBuf, PlateKey)>();
        let (row_tx, row_rx) = unbounded::<BatchRow>();

        for job in jobs {
            // Receiver is alive until the scope below ends
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        std::thread::scope(|scope| {
            for _ in 0..self.workers {
                let job_rx = job_rx.clone();
                let row_tx = row_tx.clone();
                scope.spawn(move || {
                    for (image, path, expected) in job_rx.iter() {
                        let record = self.resolver.check_path(&path, index);
                        debug!("{}: {} ({})", image, record.message, record.verdict());
                        let _ = row_tx.send(BatchRow::new(image, expected, record));
                    }
                });
            }
        });
        drop(row_tx);

        let report = BatchReport::new(row_rx.iter().collect());
        info!(
            "Batch finished: {}/{} matched ({:.2}%)",
            report.summary.matches, report.summary.total, report.summary.accuracy
        );
        Ok(report)
    }
}

/// Images in `dir` listed in the ground truth
fn collect_jobs(dir: &Path, truth: &HashMap<String, PlateKey>) -> Result<Vec<(String, PathBuf, PlateKey)>> {
    let entries = std::fs::read_dir(dir).with_context(|| format!("Failed to read image folder {:?}", dir))?;

    let mut jobs = Vec::new();
    for entry in entries {
        let entry = entry?;
        let Ok(name) = entry.file_name().into_string() else {
            warn!("Skipping non UTF-8 file name {:?}", entry.file_name());
            continue;
        };

        match truth.get(&name) {
            Some(expected) => jobs.push((name, entry.path(), expected.clone())),
            None => debug!("{} not in reference table, skipping", name),
        }
    }

    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plates::PlateIndex;
    use crate::vision::{Candidate, OcrSidecar, PixelBox, PrecomputedText, Region};
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn row(plate: &str, file: &str) -> ReferenceRow {
        ReferenceRow {
            plate: plate.to_string(),
            image_filename: file.to_string(),
        }
    }

    fn write_image(dir: &Path, name: &str) {
        RgbImage::from_pixel(32, 16, Rgb([128, 128, 128]))
            .save(dir.join(name))
            .unwrap();
    }

    fn write_ocr(dir: &Path, stem: &str, text: &str, confidence: f32) {
        let json = format!(
            r#"[{{"region": [2, 2, 30, 14], "text": "{}", "confidence": {}}}]"#,
            text, confidence
        );
        std::fs::write(dir.join(format!("{}.ocr.json", stem)), json).unwrap();
    }

    #[test]
    fn test_ground_truth_normalizes_and_overwrites() {
        let truth = ground_truth(&[row("abc-123", " car1.png "), row("XYZ 9", "car1.png"), row("QQ7", "car2.png")]);
        assert_eq!(truth.len(), 2);
        assert_eq!(truth["car1.png"].as_str(), "XYZ9");
        assert_eq!(truth["car2.png"].as_str(), "QQ7");
    }

    #[test]
    fn test_row_detected_column() {
        let expected = normalize("ABC123");
        let granted = DecisionRecord::granted(
            expected.clone(),
            &normalize("ABC12"),
            0.9,
            0.9,
            PixelBox::new(0, 0, 1, 1),
            None,
        );
        let r = BatchRow::new("a.png".to_string(), expected.clone(), granted);
        assert_eq!(r.detected, "ABC123");
        assert!(r.passed);

        let denied = DecisionRecord::denied(&normalize("ZZZ1"), 0.4, PixelBox::new(0, 0, 1, 1));
        let r = BatchRow::new("b.png".to_string(), expected.clone(), denied);
        assert_eq!(r.detected, "ZZZ1");
        assert!(!r.passed);

        let r = BatchRow::new("c.png".to_string(), expected, DecisionRecord::no_detection());
        assert_eq!(r.detected, "NONE");
        assert!(!r.passed);
    }

    #[test]
    fn test_granted_wrong_plate_fails() {
        let other = normalize("OTHER1");
        let record = DecisionRecord::granted(other.clone(), &other, 0.9, 1.0, PixelBox::new(0, 0, 1, 1), None);
        let r = BatchRow::new("a.png".to_string(), normalize("ABC123"), record);
        assert!(!r.passed);
        assert_eq!(r.detected, "OTHER1");
    }

    #[test]
    fn test_summary_empty() {
        let report = BatchReport::new(vec![]);
        assert_eq!(report.summary.total, 0);
        assert_eq!(report.summary.accuracy, 0.0);
        assert!(report.to_table().contains("No images found"));
    }

    #[test]
    fn test_run_folder() {
        let dir = TempDir::new().unwrap();
        let rows = vec![
            row("ABC-123", "car1.png"),
            row("XYZ-789", "car2.png"),
            row("QRS-456", "car3.png"),
        ];

        write_image(dir.path(), "car1.png");
        write_ocr(dir.path(), "car1", "ABC 123", 0.9);
        write_image(dir.path(), "car2.png");
        write_ocr(dir.path(), "car2", "LMN 000", 0.8);
        write_image(dir.path(), "car3.png");
        write_ocr(dir.path(), "car3", "654SRQ", 0.7);
        // Not in the table
        write_image(dir.path(), "stray.png");

        let registry = PlateRegistry::new(PlateIndex::from_rows(&rows, Default::default()).unwrap());
        let ocr = OcrSidecar::new();
        let resolver = AccessResolver::new(&ocr);

        let report = BatchRunner::new(&resolver, 3)
            .run(dir.path(), &ground_truth(&rows), &registry)
            .unwrap();

        let names: Vec<&str> = report.rows.iter().map(|r| r.image.as_str()).collect();
        assert_eq!(names, vec!["car1.png", "car2.png", "car3.png"]);
        assert!(report.rows[0].passed);
        assert!(!report.rows[1].passed);
        assert_eq!(report.rows[1].detected, "LMN000");
        assert!(report.rows[2].passed);

        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.matches, 2);
        assert_eq!(report.summary.failures, 1);
        assert!((report.summary.accuracy - 66.666).abs() < 0.01);

        let table = report.to_table();
        assert!(table.contains("Overall Success Rate: 66.67%"));
    }

    #[test]
    fn test_run_single_worker_in_memory_ocr() {
        let dir = TempDir::new().unwrap();
        write_image(dir.path(), "a.png");
        write_image(dir.path(), "b.png");
        let rows = vec![row("AB1234", "a.png"), row("CD5678", "b.png")];

        let registry = PlateRegistry::new(PlateIndex::from_rows(&rows, Default::default()).unwrap());
        let ocr = PrecomputedText::new(vec![Candidate::new(
            Region::Box(PixelBox::new(0, 0, 10, 10)),
            "AB1234",
            0.9,
        )]);
        let resolver = AccessResolver::new(&ocr);

        let report = BatchRunner::new(&resolver, 0)
            .run(dir.path(), &ground_truth(&rows), &registry)
            .unwrap();

        assert_eq!(report.summary.total, 2);
        assert_eq!(report.summary.matches, 1);
        assert!(report.rows[0].passed);
        assert_eq!(report.rows[1].detected, "AB1234");
    }

    #[test]
    fn test_run_missing_folder() {
        let ocr = PrecomputedText::default();
        let resolver = AccessResolver::new(&ocr);
        let result = BatchRunner::new(&resolver, 2).run(
            Path::new("/nonexistent/images"),
            &HashMap::new(),
            &PlateRegistry::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_report_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.json");
        let report = BatchReport::new(vec![BatchRow::new(
            "a.png".to_string(),
            normalize("AB1"),
            DecisionRecord::no_detection(),
        )]);

        report.save_json(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["summary"]["total"], 1);
        assert_eq!(value["rows"][0]["passed"], false);
        assert_eq!(value["rows"][0]["record"]["outcome"], "no_detection");
    }
}
