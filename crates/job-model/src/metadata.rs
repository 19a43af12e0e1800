//! Subject table: maps a video identifier to its ordered subject labels.
//!
//! The table is a CSV file with a header row. One column holds the video
//! identifier; the subject columns are `{prefix}1 ..= {prefix}N`.

use std::io::Read;
use std::path::{Path, PathBuf};

/// Errors raised while loading or querying the subject table.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("Metadata file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to read metadata table: {source}")]
    Csv {
        #[from]
        source: csv::Error,
    },

    #[error("Metadata table has no '{column}' column")]
    MissingColumn { column: String },

    #[error("No metadata row for '{video_id}': {reason}")]
    MissingRow { video_id: String, reason: String },
}

/// How subject labels are laid out in the table.
#[derive(Debug, Clone)]
pub struct SubjectColumns {
    pub filename_column: String,
    pub subject_prefix: String,
    pub num_subjects: usize,
}

impl SubjectColumns {
    fn subject_column(&self, index: usize) -> String {
        format!("{}{}", self.subject_prefix, index + 1)
    }
}

/// The loaded subject table.
#[derive(Debug, Clone)]
pub struct SubjectTable {
    columns: SubjectColumns,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    filename_index: usize,
}

impl SubjectTable {
    /// Load the table from a CSV file.
    pub fn load(path: impl AsRef<Path>, columns: SubjectColumns) -> Result<Self, MetadataError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MetadataError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let file = std::fs::File::open(path).map_err(|e| MetadataError::Csv {
            source: csv::Error::from(e),
        })?;
        Self::from_reader(file, columns)
    }

    /// Parse the table from any CSV source.
    pub fn from_reader<R: Read>(reader: R, columns: SubjectColumns) -> Result<Self, MetadataError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let filename_index = headers
            .iter()
            .position(|h| *h == columns.filename_column)
            .ok_or_else(|| MetadataError::MissingColumn {
                column: columns.filename_column.clone(),
            })?;

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            rows.push(record.iter().map(|field| field.trim().to_string()).collect());
        }

        tracing::debug!(rows = rows.len(), columns = headers.len(), "Subject table loaded");

        Ok(Self {
            columns,
            headers,
            rows,
            filename_index,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Ordered, sanitized subject labels for a normalized video identifier.
    ///
    /// An exact identifier match wins; otherwise the first row whose
    /// identifier contains `normalized_id` is used.
    pub fn subjects_for(&self, normalized_id: &str) -> Result<Vec<String>, MetadataError> {
        let missing = |reason: &str| MetadataError::MissingRow {
            video_id: normalized_id.to_string(),
            reason: reason.to_string(),
        };

        if normalized_id.is_empty() {
            return Err(missing("empty identifier"));
        }

        let index = self.filename_index;
        let row = self
            .rows
            .iter()
            .find(|row| cell(row, index) == normalized_id)
            .or_else(|| {
                self.rows
                    .iter()
                    .find(|row| cell(row, index).contains(normalized_id))
            })
            .ok_or_else(|| missing("no matching row"))?;

        (0..self.columns.num_subjects)
            .map(|i| {
                let column = self.columns.subject_column(i);
                let index = self
                    .headers
                    .iter()
                    .position(|h| *h == column)
                    .ok_or_else(|| missing(&format!("column '{column}' missing")))?;
                let raw = row
                    .get(index)
                    .ok_or_else(|| missing(&format!("row has no value for '{column}'")))?;
                Ok(sanitize_label(raw))
            })
            .collect()
    }
}

fn cell(row: &[String], index: usize) -> &str {
    row.get(index).map(String::as_str).unwrap_or("")
}

/// Keep ASCII alphanumerics, `_` and `-` so labels are safe in file names.
pub fn sanitize_label(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
 file name ,Pos1,Pos2,Pos3
trial_01, r1 ,r2,r3
session trial_02 cam2,m#4,m 5,m/6
trial_010,x,y,z
";

    fn columns(n: usize) -> SubjectColumns {
        SubjectColumns {
            filename_column: "file name".to_string(),
            subject_prefix: "Pos".to_string(),
            num_subjects: n,
        }
    }

    #[test]
    fn test_exact_match_preferred() {
        let table = SubjectTable::from_reader(TABLE.as_bytes(), columns(3)).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.subjects_for("trial_01").unwrap(), vec!["r1", "r2", "r3"]);
        assert_eq!(table.subjects_for("trial_010").unwrap(), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_partial_match_and_sanitizing() {
        let table = SubjectTable::from_reader(TABLE.as_bytes(), columns(3)).unwrap();
        assert_eq!(
            table.subjects_for("trial_02").unwrap(),
            vec!["m4", "m5", "m6"]
        );
    }

    #[test]
    fn test_missing_row() {
        let table = SubjectTable::from_reader(TABLE.as_bytes(), columns(3)).unwrap();
        assert!(matches!(
            table.subjects_for("trial_99"),
            Err(MetadataError::MissingRow { .. })
        ));
        assert!(table.subjects_for("").is_err());
    }

    #[test]
    fn test_missing_subject_column_is_missing_row() {
        let table = SubjectTable::from_reader(TABLE.as_bytes(), columns(4)).unwrap();
        match table.subjects_for("trial_01") {
            Err(MetadataError::MissingRow { reason, .. }) => assert!(reason.contains("Pos4")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_missing_filename_column() {
        let err = SubjectTable::from_reader("name,Pos1\na,b\n".as_bytes(), columns(1)).unwrap_err();
        assert!(matches!(err, MetadataError::MissingColumn { .. }));
    }

    #[test]
    fn test_short_rows_never_match() {
        let table = "Pos1,Pos2,file name\nq1\nr1,r2,trial_05\n";
        let table = SubjectTable::from_reader(table.as_bytes(), columns(2)).unwrap();
        assert_eq!(table.subjects_for("trial_05").unwrap(), vec!["r1", "r2"]);
        assert_eq!(cell(&["q1".to_string()], 2), "");
    }

    #[test]
    fn test_sanitize_label() {
        assert_eq!(sanitize_label("  Rat 07/b "), "Rat07b");
        assert_eq!(sanitize_label("ok_label-2"), "ok_label-2");
    }
}
