//! Document ingestion from 311-style service-request exports.
//!
//! Two formats are read, chosen by file extension:
//!
//! - CSV (`.csv`): the raw export. `Problem (formerly Complaint Type)` and
//!   `Problem Detail (formerly Descriptor)` (or the older `Complaint Type` /
//!   `Descriptor` headers) build the text, `Unique Key` is the id, and the
//!   location columns are kept as snake_case metadata.
//! - JSON-Lines (anything else): one object per line, either
//!   `{"id": ..., "text": "...", "metadata": {...}}` or a service-request
//!   record with `complaint_type` and `descriptor`, whose other fields become
//!   metadata.
//!
//! Service-request text is `"<complaint_type> - <descriptor>"`. The id is
//! taken from `id`, then `unique_key`; records with neither get `line-N`
//! (JSON-Lines) or `row-N` (CSV). Records whose text is blank are skipped, and
//! so are records repeating an id already read.

use semdex_core::{Document, DocumentId, Error, Result};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::{info, warn};

const ID_FIELDS: [&str; 2] = ["id", "unique_key"];

/// CSV header -> record field. Columns not listed here are dropped.
const CSV_COLUMNS: [(&str, &str); 11] = [
    ("Unique Key", "unique_key"),
    ("Problem (formerly Complaint Type)", "complaint_type"),
    ("Complaint Type", "complaint_type"),
    ("Problem Detail (formerly Descriptor)", "descriptor"),
    ("Descriptor", "descriptor"),
    ("Created Date", "created_date"),
    ("Incident Address", "incident_address"),
    ("Street Name", "street_name"),
    ("Incident Zip", "incident_zip"),
    ("Borough", "borough"),
    ("City", "city"),
];

#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub documents: Vec<Document>,
    /// Line numbers (1-based) of records skipped for blank text
    pub skipped: Vec<usize>,
    /// Line numbers (1-based) of records skipped because their id was taken
    pub duplicates: Vec<usize>,
}

impl IngestReport {
    fn accept(&mut self, seen: &mut HashSet<DocumentId>, document: Option<Document>, line: usize) {
        match document {
            Some(document) if seen.insert(document.id.clone()) => self.documents.push(document),
            Some(document) => {
                warn!(line, id = %document.id, "duplicate document id skipped");
                self.duplicates.push(line);
            }
            None => self.skipped.push(line),
        }
    }

    fn finish(self) -> Self {
        if !self.skipped.is_empty() {
            warn!(skipped = self.skipped.len(), "records with blank text skipped");
        }
        info!(
            documents = self.documents.len(),
            duplicates = self.duplicates.len(),
            "documents ingested"
        );
        self
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn record_text(record: &Map<String, Value>) -> Option<String> {
    if let Some(text) = record.get("text") {
        return scalar_string(text);
    }
    let descriptor = record.get("descriptor").and_then(scalar_string)?;
    Some(match record.get("complaint_type").and_then(scalar_string) {
        Some(kind) => format!("{kind} - {descriptor}"),
        None => descriptor,
    })
}

/// Turn one parsed record into a document; `None` when its text is blank
///
/// `fallback_id` is used when the record has neither `id` nor `unique_key`.
pub fn parse_record(mut record: Map<String, Value>, fallback_id: DocumentId) -> Option<Document> {
    let text = record_text(&record)?;

    let id = ID_FIELDS
        .iter()
        .find_map(|field| record.get(*field).and_then(scalar_string))
        .map(DocumentId::from)
        .unwrap_or(fallback_id);

    let metadata = match record.remove("metadata") {
        Some(Value::Null) | None => {
            for field in ID_FIELDS.iter().chain(&["text"]) {
                record.remove(*field);
            }
            (!record.is_empty()).then(|| Value::Object(record))
        }
        Some(explicit) => Some(explicit),
    };

    let document = Document::new(id, text);
    Some(match metadata {
        Some(metadata) => document.with_metadata(metadata),
        None => document,
    })
}

/// Read JSON-Lines records
pub fn read_documents<R: BufRead>(reader: R) -> Result<IngestReport> {
    let mut report = IngestReport::default();
    let mut seen = HashSet::new();
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Map<String, Value> = serde_json::from_str(&line)
            .map_err(|e| Error::Serialization(format!("line {line_no}: {e}")))?;
        let document = parse_record(record, DocumentId::new(format!("line-{line_no}")));
        report.accept(&mut seen, document, line_no);
    }
    Ok(report.finish())
}

/// Read a CSV export with a header row
pub fn read_csv_documents<R: Read>(reader: R) -> Result<IngestReport> {
    let mut csv = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let columns: Vec<Option<&str>> = csv
        .headers()
        .map_err(|e| Error::Serialization(format!("csv header: {e}")))?
        .iter()
        .map(|header| {
            CSV_COLUMNS
                .iter()
                .find(|(name, _)| *name == header.trim())
                .map(|(_, field)| *field)
        })
        .collect();

    let mut report = IngestReport::default();
    let mut seen = HashSet::new();
    for (idx, row) in csv.records().enumerate() {
        let row = row.map_err(|e| Error::Serialization(format!("row {}: {e}", idx + 1)))?;
        let line_no = row.position().map_or(idx + 2, |p| p.line() as usize);

        let mut record = Map::new();
        for (field, cell) in columns.iter().zip(row.iter()) {
            if let Some(field) = field {
                let cell = cell.trim();
                if !cell.is_empty() {
                    record.insert((*field).to_string(), Value::String(cell.to_string()));
                }
            }
        }
        let document = parse_record(record, DocumentId::new(format!("row-{}", idx + 1)));
        report.accept(&mut seen, document, line_no);
    }
    Ok(report.finish())
}

/// Read a corpus file: CSV for a `.csv` extension, JSON-Lines otherwise
pub fn read_documents_file<P: AsRef<Path>>(path: P) -> Result<IngestReport> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| Error::Persistence(format!("cannot open {}: {}", path.display(), e)))?;
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if is_csv {
        read_csv_documents(BufReader::new(file))
    } else {
        read_documents(BufReader::new(file))
    }
}
