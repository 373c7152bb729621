//! Text extraction from supported document formats.
//!
//! | extension                     | extraction                                    |
//! |-------------------------------|-----------------------------------------------|
//! | `txt`, `md`, `json`, `sql`    | UTF-8 (lossy)                                 |
//! | `pdf`                         | `pdf-extract`                                 |
//! | `csv`                         | one document per row, `header: value` lines   |
//! | `xlsx`                        | every sheet as a Markdown table               |
//! | `docx`                        | paragraphs of `word/document.xml`             |

use std::io::{Cursor, Read};
use std::path::Path;

use calamine::{Data, Reader, Xlsx, open_workbook_from_rs};
use tracing::{debug, instrument};

use crate::errors::RagError;
use crate::record::Document;

pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "json", "sql", "pdf", "csv", "xlsx", "docx"];

/// Lower-case extension of `path`, if any.
pub fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

pub fn is_supported(path: &Path) -> bool {
    extension(path).is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.as_str()))
}

/// Loads `path` into one or more documents (several for CSV).
///
/// # Errors
/// - [`RagError::UnsupportedFormat`] for unknown extensions
/// - [`RagError::Io`] when the file cannot be read
/// - [`RagError::Extraction`] when a supported file cannot be decoded
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load(path: &Path) -> Result<Vec<Document>, RagError> {
    let ext = extension(path)
        .filter(|e| SUPPORTED_EXTENSIONS.contains(&e.as_str()))
        .ok_or_else(|| RagError::UnsupportedFormat(path.to_path_buf()))?;

    let bytes = std::fs::read(path)?;
    let byte_size = bytes.len() as u64;
    let source = path.to_string_lossy().into_owned();
    let fail = |reason: String| RagError::Extraction {
        path: path.to_path_buf(),
        reason,
    };

    let texts: Vec<String> = match ext.as_str() {
        "pdf" => vec![pdf_extract::extract_text_from_mem(&bytes).map_err(|e| fail(e.to_string()))?],
        "csv" => csv_rows(&bytes).map_err(fail)?,
        "xlsx" => vec![xlsx_markdown(bytes.clone()).map_err(fail)?],
        "docx" => vec![docx_text(&bytes).map_err(fail)?],
        _ => vec![String::from_utf8_lossy(&bytes).into_owned()],
    };

    debug!(documents = texts.len(), byte_size, "file loaded");
    Ok(texts
        .into_iter()
        .map(|text| Document {
            source: source.clone(),
            text,
            file_type: ext.clone(),
            byte_size,
        })
        .collect())
}

/// [`load`] on the blocking pool.
pub async fn load_async(path: impl AsRef<Path>) -> Result<Vec<Document>, RagError> {
    let path = path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || load(&path)).await?
}

fn csv_rows(bytes: &[u8]) -> Result<Vec<String>, String> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);
    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| e.to_string())?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut out = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| e.to_string())?;
        let lines: Vec<String> = record
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let h = headers.get(i).map(String::as_str).unwrap_or("");
                format!("{h}: {}", v.trim())
            })
            .collect();
        if record.iter().any(|v| !v.trim().is_empty()) {
            out.push(lines.join("\n"));
        }
    }
    Ok(out)
}

fn xlsx_markdown(bytes: Vec<u8>) -> Result<String, String> {
    let mut wb: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes)).map_err(|e: calamine::XlsxError| e.to_string())?;
    let names: Vec<String> = wb.sheet_names().to_vec();

    let mut sheets = Vec::new();
    for name in names {
        let range = wb.worksheet_range(&name).map_err(|e| e.to_string())?;
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|r| r.iter().map(cell_text).collect::<Vec<_>>())
            .filter(|r| r.iter().any(|c| !c.is_empty()))
            .collect();
        if rows.is_empty() {
            continue;
        }
        sheets.push(markdown_table(&name, &rows));
    }
    Ok(sheets.join("\n\n"))
}

fn cell_text(cell: &Data) -> String {
    let s = match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 => format!("{f:.0}"),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    };
    s.replace('|', "\\|").replace(['\n', '\r'], " ")
}

fn markdown_table(sheet: &str, rows: &[Vec<String>]) -> String {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let line = |r: &Vec<String>| {
        let mut cells = r.clone();
        cells.resize(width, String::new());
        format!("| {} |", cells.join(" | "))
    };

    let mut out = format!("## {sheet}\n\n");
    out.push_str(&line(&rows[0]));
    out.push('\n');
    out.push_str(&format!("|{}\n", " --- |".repeat(width)));
    for r in &rows[1..] {
        out.push_str(&line(r));
        out.push('\n');
    }
    out
}

fn docx_text(bytes: &[u8]) -> Result<String, String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| e.to_string())?
        .read_to_string(&mut xml)
        .map_err(|e| e.to_string())?;
    Ok(docx_xml_to_text(&xml))
}

/// Strips WordprocessingML tags; paragraph ends and breaks become newlines.
pub(crate) fn docx_xml_to_text(xml: &str) -> String {
    let mut out = String::with_capacity(xml.len() / 4);
    let mut rest = xml;
    while let Some(open) = rest.find('<') {
        out.push_str(&unescape(&rest[..open]));
        let Some(close) = rest[open..].find('>') else {
            rest = "";
            break;
        };
        let tag = &rest[open + 1..open + close];
        let name = tag.trim_end_matches('/').split_whitespace().next().unwrap_or("");
        match name {
            "/w:p" | "w:br" | "w:cr" => out.push('\n'),
            "w:tab" => out.push('\t'),
            _ => {}
        }
        rest = &rest[open + close + 1..];
    }
    out.push_str(&unescape(rest));
    out.trim().to_string()
}

fn unescape(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| decode_entity(&tail[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Named XML entities and numeric references (`#228`, `#x201C`).
fn decode_entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "amp" => Some('&'),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
