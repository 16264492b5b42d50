//! Dataset loading and export: CSV, CoNLL and JSON Lines.
//!
//! CSV headers are matched against a list of aliases and the delimiter is
//! sniffed from the header line. For NER, a CSV label cell holds one tag per
//! whitespace token. CoNLL files carry one `token pos chunk tag` line per
//! token with blank lines between sentences.

use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::error::DatasetError;
use crate::types::{Prediction, Sample, Task};

const TEXT_COLUMNS: &[&str] = &["text", "sentences", "sentence", "sample"];
const LABEL_COLUMNS: &[&str] = &[
    "label", "labels", "class", "classes", "ner_tag", "ner_tags", "ner", "entity",
];
const DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];
const DOCSTART: &str = "-DOCSTART-";

/// On-disk dataset format, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetFormat {
    Csv,
    Conll,
    Jsonl,
}

impl DatasetFormat {
    pub fn from_path(path: &Path) -> Result<Self, DatasetError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match extension.as_str() {
            "csv" | "tsv" => Ok(DatasetFormat::Csv),
            "conll" | "txt" => Ok(DatasetFormat::Conll),
            "jsonl" | "ndjson" => Ok(DatasetFormat::Jsonl),
            _ => Err(DatasetError::UnsupportedFormat { extension }),
        }
    }

    fn check_task(&self, task: Task) -> Result<(), DatasetError> {
        if *self == DatasetFormat::Conll && task != Task::Ner {
            return Err(DatasetError::TaskMismatch {
                format: "CoNLL",
                task,
            });
        }
        Ok(())
    }
}

/// Load a dataset for `task`, choosing the format by extension.
pub fn load_dataset(path: &Path, task: Task) -> Result<Vec<Sample>, DatasetError> {
    let format = DatasetFormat::from_path(path)?;
    format.check_task(task)?;
    let samples = match format {
        DatasetFormat::Csv => load_csv(path, task)?,
        DatasetFormat::Conll => load_conll(BufReader::new(std::fs::File::open(path)?))?,
        DatasetFormat::Jsonl => load_jsonl(BufReader::new(std::fs::File::open(path)?))?,
    };
    info!(path = %path.display(), ?format, records = samples.len(), "Loaded dataset");
    Ok(samples)
}

/// Export samples in the format implied by `path`'s extension.
pub fn export_dataset(path: &Path, task: Task, samples: &[Sample]) -> Result<(), DatasetError> {
    let format = DatasetFormat::from_path(path)?;
    format.check_task(task)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
    match format {
        DatasetFormat::Csv => write_csv(&mut out, task, samples)?,
        DatasetFormat::Conll => write_conll(&mut out, samples)?,
        DatasetFormat::Jsonl => write_jsonl(&mut out, task, samples)?,
    }
    out.flush()?;
    info!(path = %path.display(), ?format, records = samples.len(), "Exported dataset");
    Ok(())
}

/// Pick the candidate delimiter occurring most often in the header line.
pub fn sniff_delimiter(header: &str) -> u8 {
    DELIMITERS
        .into_iter()
        .map(|d| (d, header.bytes().filter(|b| *b == d).count()))
        .filter(|(_, n)| *n > 0)
        // max_by_key keeps the last maximum; reverse so ties favour earlier candidates.
        .rev()
        .max_by_key(|(_, n)| *n)
        .map_or(b',', |(d, _)| d)
}

fn find_column(headers: &csv::StringRecord, aliases: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| aliases.contains(&h.trim().to_lowercase().as_str()))
}

fn csv_error(e: csv::Error) -> DatasetError {
    let line = e.position().map_or(0, |p| p.line() as usize);
    DatasetError::Parse {
        line,
        message: e.to_string(),
    }
}

fn load_csv(path: &Path, task: Task) -> Result<Vec<Sample>, DatasetError> {
    let mut first_line = String::new();
    BufReader::new(std::fs::File::open(path)?).read_line(&mut first_line)?;
    let delimiter = sniff_delimiter(&first_line);
    debug!(delimiter = %(delimiter as char).escape_default(), "Sniffed CSV delimiter");

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)
        .map_err(csv_error)?;
    let headers = reader.headers().map_err(csv_error)?.clone();
    let available = headers.iter().collect::<Vec<_>>().join(", ");
    let text_col = find_column(&headers, TEXT_COLUMNS).ok_or_else(|| DatasetError::MissingColumn {
        column: "text".into(),
        available: available.clone(),
    })?;
    let label_col = find_column(&headers, LABEL_COLUMNS);

    let mut samples = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        let text = record.get(text_col).unwrap_or_default().to_string();
        let expected = label_col
            .and_then(|c| record.get(c))
            .filter(|l| !l.trim().is_empty())
            .map(|l| match task {
                Task::TextClassification => Prediction::label(l.trim()),
                Task::Ner => Prediction::tags(l.split_whitespace()),
            });
        samples.push(Sample { text, expected });
    }
    Ok(samples)
}

fn load_conll<R: BufRead>(reader: R) -> Result<Vec<Sample>, DatasetError> {
    let mut samples = Vec::new();
    let mut tokens: Vec<String> = Vec::new();
    let mut tags: Vec<String> = Vec::new();

    let mut flush = |tokens: &mut Vec<String>, tags: &mut Vec<String>| {
        if !tokens.is_empty() {
            samples.push(
                Sample::new(tokens.join(" ")).with_expected(Prediction::tags(tags.drain(..))),
            );
            tokens.clear();
        }
    };

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            flush(&mut tokens, &mut tags);
            continue;
        }
        if trimmed.starts_with(DOCSTART) {
            continue;
        }
        let columns: Vec<&str> = trimmed.split_whitespace().collect();
        if columns.len() < 2 {
            return Err(DatasetError::Parse {
                line: idx + 1,
                message: format!("expected 'token ... tag', got '{trimmed}'"),
            });
        }
        tokens.push(columns[0].to_string());
        tags.push(columns[columns.len() - 1].to_string());
    }
    flush(&mut tokens, &mut tags);
    Ok(samples)
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum JsonLabel {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonRecord {
    text: String,
    #[serde(default, alias = "labels", skip_serializing_if = "Option::is_none")]
    label: Option<JsonLabel>,
}

fn load_jsonl<R: BufRead>(reader: R) -> Result<Vec<Sample>, DatasetError> {
    let mut samples = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: JsonRecord = serde_json::from_str(&line).map_err(|e| DatasetError::Parse {
            line: idx + 1,
            message: e.to_string(),
        })?;
        let expected = record.label.map(|label| match label {
            JsonLabel::One(l) => Prediction::label(l),
            JsonLabel::Many(tags) => Prediction::tags(tags),
        });
        samples.push(Sample {
            text: record.text,
            expected,
        });
    }
    Ok(samples)
}

fn write_csv<W: Write>(out: &mut W, task: Task, samples: &[Sample]) -> Result<(), DatasetError> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["text", "label"]).map_err(csv_error)?;
    for sample in samples {
        let label = match (&sample.expected, task) {
            (Some(p), Task::TextClassification) => p.top_label().unwrap_or_default().to_string(),
            (Some(p), Task::Ner) => p.labels.join(" "),
            (None, _) => String::new(),
        };
        writer
            .write_record([sample.text.as_str(), label.as_str()])
            .map_err(csv_error)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_conll<W: Write>(out: &mut W, samples: &[Sample]) -> Result<(), DatasetError> {
    writeln!(out, "{DOCSTART} -X- -X- O")?;
    writeln!(out)?;
    for sample in samples {
        let tags = sample.expected.as_ref().map(|p| p.labels.as_slice()).unwrap_or_default();
        for (i, token) in sample.tokens().into_iter().enumerate() {
            let tag = tags.get(i).map_or("O", String::as_str);
            writeln!(out, "{token} -X- -X- {tag}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn write_jsonl<W: Write>(out: &mut W, task: Task, samples: &[Sample]) -> Result<(), DatasetError> {
    for sample in samples {
        let label = sample.expected.as_ref().map(|p| match task {
            Task::TextClassification => {
                JsonLabel::One(p.top_label().unwrap_or_default().to_string())
            }
            Task::Ner => JsonLabel::Many(p.labels.clone()),
        });
        let record = JsonRecord {
            text: sample.text.clone(),
            label,
        };
        let line = serde_json::to_string(&record).map_err(|e| DatasetError::Parse {
            line: 0,
            message: e.to_string(),
        })?;
        writeln!(out, "{line}")?;
    }
    Ok(())
}
