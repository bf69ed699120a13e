//! CSV dump and load.
//!
//! One row per entry, columns `name,added,subtracted`, no header. Fields are
//! quoted only when they contain a comma, quote or newline.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use super::KarmaEntry;
use crate::error::{KarmaError, Result};

/// Largest counter accepted on import; keeps totals within `i64`.
const MAX_COUNTER: u64 = i64::MAX.unsigned_abs();

/// One row of a dump file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KarmaRow {
    /// Display name.
    pub name: String,
    /// Times increased.
    pub added: u64,
    /// Times decreased.
    pub subtracted: u64,
}

impl From<&KarmaEntry> for KarmaRow {
    fn from(entry: &KarmaEntry) -> Self {
        Self {
            name: entry.name.clone(),
            added: entry.added,
            subtracted: entry.subtracted,
        }
    }
}

/// Serialize `entries` as CSV into any writer.
pub fn write_rows<W: Write>(writer: W, entries: &[KarmaEntry]) -> Result<()> {
    let mut out = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);
    for entry in entries {
        let added = entry.added.to_string();
        let subtracted = entry.subtracted.to_string();
        out.write_record([entry.name.as_str(), added.as_str(), subtracted.as_str()])?;
    }
    out.flush()?;
    Ok(())
}

/// Write `entries` to `path`, replacing it atomically: rows go to a temporary
/// file in the same directory which is then renamed over the target.
pub fn write_csv(path: &Path, entries: &[KarmaEntry]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    write_rows(tmp.as_file_mut(), entries)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| KarmaError::Io(e.error))?;
    Ok(())
}

/// Parse CSV rows from any reader. Every row must have exactly three columns,
/// a non-empty name and counters in `0..=i64::MAX`; the first bad row aborts
/// the parse.
pub fn read_rows<R: std::io::Read>(reader: R) -> Result<Vec<KarmaRow>> {
    let mut input = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (idx, record) in input.records().enumerate() {
        let record = record?;
        let line = record.position().map_or(idx as u64 + 1, csv::Position::line);
        if record.len() != 3 {
            return Err(KarmaError::parse(
                line,
                format!("expected 3 columns, found {}", record.len()),
            ));
        }
        let name = record.get(0).unwrap_or_default();
        if name.is_empty() {
            return Err(KarmaError::parse(line, "name is empty"));
        }
        let counter = |col: usize, label: &str| -> Result<u64> {
            let raw = record.get(col).unwrap_or_default().trim();
            let value = raw.parse::<u64>().map_err(|_| {
                KarmaError::parse(line, format!("{label} is not a non-negative integer: '{raw}'"))
            })?;
            if value > MAX_COUNTER {
                return Err(KarmaError::parse(
                    line,
                    format!("{label} exceeds {MAX_COUNTER}: '{raw}'"),
                ));
            }
            Ok(value)
        };
        rows.push(KarmaRow {
            name: name.to_string(),
            added: counter(1, "added")?,
            subtracted: counter(2, "subtracted")?,
        });
    }
    Ok(rows)
}

/// Read and validate the dump file at `path`.
pub fn read_csv(path: &Path) -> Result<Vec<KarmaRow>> {
    let file = std::fs::File::open(path)?;
    read_rows(std::io::BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u64, name: &str, added: u64, subtracted: u64) -> KarmaEntry {
        KarmaEntry {
            id,
            name: name.to_string(),
            added,
            subtracted,
        }
    }

    #[test]
    fn test_quotes_only_when_needed() {
        let mut buf = Vec::new();
        write_rows(
            &mut buf,
            &[
                entry(1, "plain", 3, 1),
                entry(2, "with, comma", 0, 2),
                entry(3, "say \"hi\"", 1, 0),
            ],
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "plain,3,1\n\"with, comma\",0,2\n\"say \"\"hi\"\"\",1,0\n"
        );
    }

    #[test]
    fn test_read_rows() {
        let rows = read_rows("alice,3,1\n\"Bob, Jr\",0,4\n".as_bytes()).unwrap();
        assert_eq!(
            rows,
            vec![
                KarmaRow { name: "alice".into(), added: 3, subtracted: 1 },
                KarmaRow { name: "Bob, Jr".into(), added: 0, subtracted: 4 },
            ]
        );
    }

    #[test]
    fn test_wrong_column_count_is_rejected() {
        let err = read_rows("alice,3,1\nbob,2\n".as_bytes()).unwrap_err();
        match err {
            KarmaError::Parse { line, message } => {
                assert_eq!(line, 2);
                assert!(message.contains("expected 3 columns, found 2"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_non_integer_counter_is_rejected() {
        let err = read_rows("alice,three,1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, KarmaError::Parse { line: 1, .. }));
        let err = read_rows("alice,1,-2\n".as_bytes()).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_counters_beyond_i64_are_rejected() {
        let err = read_rows("big,9223372036854775808,0\n".as_bytes()).unwrap_err();
        match err {
            KarmaError::Parse { line, message } => {
                assert_eq!(line, 1);
                assert!(message.starts_with("added exceeds"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let err = read_rows("ok,1,0\nbig,9223372036854775807,18446744073709551615\n".as_bytes())
            .unwrap_err();
        assert!(matches!(err, KarmaError::Parse { line: 2, .. }));

        let rows = read_rows("edge,9223372036854775807,0\n".as_bytes()).unwrap();
        assert_eq!(rows[0].added, 9_223_372_036_854_775_807);
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let err = read_rows("alice,1,0\n,1,0\n".as_bytes()).unwrap_err();
        match err {
            KarmaError::Parse { line, message } => {
                assert_eq!(line, 2);
                assert_eq!(message, "name is empty");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_atomic_write_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("karma.csv");
        std::fs::write(&path, "old,1,1\n").unwrap();

        write_csv(&path, &[entry(1, "new", 2, 0)]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new,2,0\n");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_empty_file_is_empty_rows() {
        assert!(read_rows("".as_bytes()).unwrap().is_empty());
    }
}
