//! CSV data-file loaders: population table, contact matrix, commuter flow
//! matrix and high-risk ratios. All shape checking that can be done per
//! file happens here; cross-file consistency is checked during network
//! construction.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("could not open data file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not read {path}: {source}")]
    Csv {
        path: PathBuf,
        source: csv::Error,
    },
    #[error("{path}:{line}: could not parse '{value}' as a number")]
    Parse {
        path: PathBuf,
        line: usize,
        value: String,
    },
    #[error("{path}:{line}: population row needs an id and at least one age group")]
    ShortRow { path: PathBuf, line: usize },
    #[error("{path} is empty")]
    Empty { path: PathBuf },
}

/// Load the population table: a header row, then one row per node with the
/// node id in the first column and per-age-group counts after it.
pub fn load_population(path: &Path) -> Result<Vec<(u64, Vec<f64>)>, DataError> {
    let file = File::open(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let line = index + 2; // header is line 1
        let record = record.map_err(|source| DataError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        if record.len() < 2 {
            return Err(DataError::ShortRow {
                path: path.to_path_buf(),
                line,
            });
        }
        let id: u64 = record[0].parse().map_err(|_| DataError::Parse {
            path: path.to_path_buf(),
            line,
            value: record[0].to_string(),
        })?;
        let pops = record
            .iter()
            .skip(1)
            .map(|field| {
                field.parse::<f64>().map_err(|_| DataError::Parse {
                    path: path.to_path_buf(),
                    line,
                    value: field.to_string(),
                })
            })
            .collect::<Result<Vec<f64>, DataError>>()?;
        rows.push((id, pops));
    }
    if rows.is_empty() {
        return Err(DataError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(rows)
}

/// Load a headerless comma-separated matrix (contact or flow). Scientific
/// notation entries are accepted.
pub fn load_matrix(path: &Path) -> Result<Vec<Vec<f64>>, DataError> {
    let file = File::open(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut matrix = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|source| DataError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let row = record
            .iter()
            .map(|field| {
                field.parse::<f64>().map_err(|_| DataError::Parse {
                    path: path.to_path_buf(),
                    line: index + 1,
                    value: field.to_string(),
                })
            })
            .collect::<Result<Vec<f64>, DataError>>()?;
        matrix.push(row);
    }
    if matrix.is_empty() {
        return Err(DataError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(matrix)
}

/// Load high-risk ratios: one float per line, one line per age group.
pub fn load_high_risk_ratios(path: &Path) -> Result<Vec<f64>, DataError> {
    let file = File::open(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut ratios = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line_text = line.map_err(|source| DataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let trimmed = line_text.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value = trimmed.parse::<f64>().map_err(|_| DataError::Parse {
            path: path.to_path_buf(),
            line: index + 1,
            value: trimmed.to_string(),
        })?;
        ratios.push(value);
    }
    if ratios.is_empty() {
        return Err(DataError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(ratios)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn write_temp(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn population_file_round_trip() {
        let file = write_temp("id,age0,age1\n113,100,200\n141,50.5,60\n");
        let rows = load_population(file.path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, 113);
        assert_eq!(rows[0].1, vec![100.0, 200.0]);
        assert_eq!(rows[1].1, vec![50.5, 60.0]);
    }

    #[test]
    fn population_bad_number_reported_with_line() {
        let file = write_temp("id,age0\n113,abc\n");
        match load_population(file.path()).unwrap_err() {
            DataError::Parse { line, value, .. } => {
                assert_eq!(line, 2);
                assert_eq!(value, "abc");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn matrix_accepts_scientific_notation() {
        let file = write_temp("0.0,1.48929938393e-05\n2.5e-3,0.0\n");
        let matrix = load_matrix(file.path()).unwrap();
        assert_eq!(matrix.len(), 2);
        assert!((matrix[0][1] - 1.48929938393e-05).abs() < 1e-18);
        assert!((matrix[1][0] - 2.5e-3).abs() < 1e-12);
    }

    #[test]
    fn high_risk_ratios_one_per_line() {
        let file = write_temp("0.2\n0.1\n\n0.35\n");
        let ratios = load_high_risk_ratios(file.path()).unwrap();
        assert_eq!(ratios, vec![0.2, 0.1, 0.35]);
    }

    #[test]
    fn missing_file_is_io_error() {
        let missing = Path::new("/definitely/not/here.csv");
        assert!(matches!(
            load_population(missing).unwrap_err(),
            DataError::Io { .. }
        ));
        assert!(matches!(
            load_matrix(missing).unwrap_err(),
            DataError::Io { .. }
        ));
        assert!(matches!(
            load_high_risk_ratios(missing).unwrap_err(),
            DataError::Io { .. }
        ));
    }

    #[test]
    fn empty_files_rejected() {
        let file = write_temp("");
        assert!(matches!(
            load_matrix(file.path()).unwrap_err(),
            DataError::Empty { .. }
        ));
    }
}
