//! JSONL and JSON file helpers for collection storage.
//!
//! - [`read_all_records`] strict parsing of `records.jsonl` into [`RagRecord`]
//! - [`append_records`] append-only writer, one record per line
//! - [`write_json_atomic`] temp file + rename, for the manifest

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::RagError;
use crate::record::RagRecord;

/// Reads RagRecord JSONL strictly.
///
/// - Ignores empty lines.
/// - Fails on the first malformed row with [`RagError::Parse`] naming the line.
///
/// # Errors
/// - [`RagError::Io`] if the file cannot be read.
/// - [`RagError::Parse`] if any line fails deserialization.
pub fn read_all_records(jsonl_path: impl AsRef<Path>) -> Result<Vec<RagRecord>, RagError> {
    let path = jsonl_path.as_ref();
    let reader = BufReader::new(File::open(path)?);

    let mut out = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let r: RagRecord = serde_json::from_str(&line)
            .map_err(|e| RagError::Parse(format!("line {} parse error: {}", i + 1, e)))?;
        out.push(r);
    }

    debug!(path = ?path, records = out.len(), "loaded records");
    Ok(out)
}

/// Appends records to a JSONL file, creating it if needed. Existing lines
/// are never rewritten; a failed append is truncated back to the previous
/// length so no partial line survives.
pub fn append_records(jsonl_path: impl AsRef<Path>, records: &[RagRecord]) -> Result<(), RagError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(jsonl_path.as_ref())?;
    append_or_rollback(&file, |w| {
        for r in records {
            serde_json::to_writer(&mut *w, r)?;
            w.write_all(b"\n")?;
        }
        Ok(())
    })
}

fn append_or_rollback<F>(file: &File, write: F) -> Result<(), RagError>
where
    F: FnOnce(&mut BufWriter<&File>) -> Result<(), RagError>,
{
    let start = file.metadata()?.len();
    let res: Result<(), RagError> = (|| {
        let mut w = BufWriter::new(file);
        write(&mut w)?;
        w.flush()?;
        file.sync_data()?;
        Ok(())
    })();
    if let Err(e) = res {
        warn!(error = %e, len = start, "append failed, truncating");
        file.set_len(start)?;
        return Err(e);
    }
    Ok(())
}

/// Writes pretty JSON through `{path}.tmp` and renames it over `path`.
pub fn write_json_atomic<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<(), RagError> {
    let path = path.as_ref();
    let tmp = path.with_extension("json.tmp");
    {
        let mut w = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer_pretty(&mut w, value)?;
        w.flush()?;
        w.get_ref().sync_data()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str) -> RagRecord {
        RagRecord {
            id: id.into(),
            text: format!("text {id}"),
            source: "a.txt".into(),
            chunk_index: 0,
            embedding: vec![0.1, 0.2],
            extra: Default::default(),
        }
    }

    #[test]
    fn append_keeps_earlier_lines() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("records.jsonl");

        append_records(&p, &[rec("1"), rec("2")]).unwrap();
        append_records(&p, &[rec("3")]).unwrap();

        let ids: Vec<_> = read_all_records(&p).unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn malformed_line_is_reported_with_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("records.jsonl");
        append_records(&p, &[rec("1")]).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(&p)
            .unwrap()
            .write_all(b"{not json}\n")
            .unwrap();

        match read_all_records(&p) {
            Err(RagError::Parse(msg)) => assert!(msg.starts_with("line 2")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn failed_append_leaves_no_partial_line() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("records.jsonl");
        append_records(&p, &[rec("1")]).unwrap();

        let file = OpenOptions::new().append(true).open(&p).unwrap();
        let err = append_or_rollback(&file, |w| {
            w.write_all(br#"{"id":"2","te"#)?;
            Err(RagError::Parse("disk full".into()))
        });
        assert!(err.is_err());

        append_records(&p, &[rec("3")]).unwrap();
        let ids: Vec<_> = read_all_records(&p).unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("manifest.json");
        write_json_atomic(&p, &serde_json::json!({"v": 1})).unwrap();
        write_json_atomic(&p, &serde_json::json!({"v": 2})).unwrap();

        let v: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&p).unwrap()).unwrap();
        assert_eq!(v["v"], 2);
        assert!(!dir.path().join("manifest.json.tmp").exists());
    }
}
