//! Reference table (CSV) loading
//!
//! Reads the authorized-plate table into `(plate, image filename)` rows. Only
//! the two configured columns are required; other columns are ignored.

use std::path::Path;
use tracing::{debug, warn};

use crate::error::SchemaError;

/// Column names of the reference table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceColumns {
    pub plate: String,
    pub image_filename: String,
}

impl Default for ReferenceColumns {
    fn default() -> Self {
        Self {
            plate: "plate_number".to_string(),
            image_filename: "file_name".to_string(),
        }
    }
}

/// One raw row of the reference table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceRow {
    pub plate: String,
    pub image_filename: String,
}

/// Read a reference table from disk
pub fn read_reference_table(path: &Path, columns: &ReferenceColumns) -> Result<Vec<ReferenceRow>, SchemaError> {
    if !path.exists() {
        return Err(SchemaError::NotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    parse_reference_table(&content, columns)
}

/// Parse reference table text
pub fn parse_reference_table(content: &str, columns: &ReferenceColumns) -> Result<Vec<ReferenceRow>, SchemaError> {
    let mut records = parse_records(content).into_iter();

    let header = records.next().ok_or(SchemaError::MissingHeader)?;
    let header: Vec<String> = header.into_iter().map(|h| h.trim().to_string()).collect();
    debug!("Reference table columns: {:?}", header);

    let position = |name: &str| header.iter().position(|h| h == name);
    let (Some(plate_col), Some(file_col)) = (position(&columns.plate), position(&columns.image_filename)) else {
        return Err(SchemaError::MissingColumns {
            expected: vec![columns.image_filename.clone(), columns.plate.clone()],
            found: header,
        });
    };

    let needed = plate_col.max(file_col) + 1;
    let mut rows = Vec::new();

    for (line, fields) in records.enumerate() {
        if fields.len() < needed {
            warn!("Skipping reference row {}: expected at least {} fields, got {}", line + 1, needed, fields.len());
            continue;
        }
        rows.push(ReferenceRow {
            plate: fields[plate_col].clone(),
            image_filename: fields[file_col].clone(),
        });
    }

    Ok(rows)
}

/// Split CSV text into records of fields.
///
/// Handles double-quoted fields with `""` escapes and embedded commas or line
/// breaks. Blank lines are dropped.
fn parse_records(content: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.trim_start_matches('\u{feff}').chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                push_record(&mut records, std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        push_record(&mut records, record);
    }

    records
}

fn push_record(records: &mut Vec<Vec<String>>, record: Vec<String>) {
    let blank = record.len() == 1 && record[0].trim().is_empty();
    if !blank {
        records.push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_basic_table() {
        let content = "file_name,plate_number\ncar1.png,ABC123\ncar2.png,XYZ 789\n";
        let rows = parse_reference_table(content, &ReferenceColumns::default()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].plate, "ABC123");
        assert_eq!(rows[0].image_filename, "car1.png");
        assert_eq!(rows[1].plate, "XYZ 789");
    }

    #[test]
    fn test_parse_column_order_and_extra_columns() {
        let content = "id,plate_number,owner,file_name\n1,AB-12,\"Doe, Jane\",a.png\n";
        let rows = parse_reference_table(content, &ReferenceColumns::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].plate, "AB-12");
        assert_eq!(rows[0].image_filename, "a.png");
    }

    #[test]
    fn test_parse_quoted_fields() {
        let content = "file_name,plate_number\r\n\"my \"\"car\"\".png\",\"AB,12\"\r\n";
        let rows = parse_reference_table(content, &ReferenceColumns::default()).unwrap();
        assert_eq!(rows[0].image_filename, "my \"car\".png");
        assert_eq!(rows[0].plate, "AB,12");
    }

    #[test]
    fn test_parse_skips_blank_and_short_rows() {
        let content = "file_name,plate_number\n\ncar1.png,ABC123\nbroken\ncar2.png,DEF456";
        let rows = parse_reference_table(content, &ReferenceColumns::default()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].plate, "DEF456");
    }

    #[test]
    fn test_parse_missing_columns() {
        let content = "image,plate\ncar1.png,ABC123\n";
        let result = parse_reference_table(content, &ReferenceColumns::default());
        assert!(matches!(result, Err(SchemaError::MissingColumns { .. })));
    }

    #[test]
    fn test_parse_empty_table() {
        let result = parse_reference_table("", &ReferenceColumns::default());
        assert!(matches!(result, Err(SchemaError::MissingHeader)));
    }

    #[test]
    fn test_custom_columns() {
        let columns = ReferenceColumns {
            plate: "plate".to_string(),
            image_filename: "image".to_string(),
        };
        let rows = parse_reference_table("image,plate\nx.png,Q1\n", &columns).unwrap();
        assert_eq!(rows[0].plate, "Q1");
    }

    #[test]
    fn test_read_missing_file() {
        let result = read_reference_table(Path::new("/nonexistent/labels.csv"), &ReferenceColumns::default());
        assert!(matches!(result, Err(SchemaError::NotFound(_))));
    }

    #[test]
    fn test_read_from_file_with_bom() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "\u{feff}file_name,plate_number\ncar7.png,ABC123\n").unwrap();
        let rows = read_reference_table(file.path(), &ReferenceColumns::default()).unwrap();
        assert_eq!(rows, vec![ReferenceRow {
            plate: "ABC123".to_string(),
            image_filename: "car7.png".to_string(),
        }]);
    }
}
