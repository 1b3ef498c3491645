//src/m8.rs

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

use crate::error::{PhyloError, Result};
use crate::types::AlignmentRecord;

/// Number of columns in BLAST tabular (outfmt 6) output.
pub const M8_FIELDS: usize = 12;

const FIELD_NAMES: [&str; M8_FIELDS] = [
    "query", "target", "pid", "aln", "mis", "gaps",
    "qstart", "qend", "tstart", "tend", "evalue", "score",
];

fn field<T: std::str::FromStr>(fields: &[&str], idx: usize) -> std::result::Result<T, String> {
    fields[idx]
        .parse::<T>()
        .map_err(|_| format!("invalid {} field '{}'", FIELD_NAMES[idx], fields[idx]))
}

/// Like [`field`], but `nan` and `inf` are rejected.
fn finite_field(fields: &[&str], idx: usize) -> std::result::Result<f64, String> {
    let value: f64 = field(fields, idx)?;
    if !value.is_finite() {
        return Err(format!("non-finite {} field '{}'", FIELD_NAMES[idx], fields[idx]));
    }
    Ok(value)
}

impl AlignmentRecord {
    /// Parses one whitespace-separated m8 line.
    /// The error string names the offending field; callers attach the line context.
    pub fn parse_line(line: &str) -> std::result::Result<Self, String> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != M8_FIELDS {
            return Err(format!(
                "expected {} fields, found {}",
                M8_FIELDS,
                fields.len()
            ));
        }

        let query = fields[0].to_string();
        let read_length: u32 = query
            .rsplit('_')
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| format!("query '{}' does not end with _<read_length>", query))?;

        let percent_identity = finite_field(&fields, 2)?;
        if !(0.0..=100.0).contains(&percent_identity) {
            return Err(format!("pid field '{}' outside 0-100", fields[2]));
        }

        Ok(AlignmentRecord {
            target: fields[1].to_string(),
            percent_identity,
            alignment_length: field(&fields, 3)?,
            mismatches: field(&fields, 4)?,
            gap_count: field(&fields, 5)?,
            query_start: field(&fields, 6)?,
            query_end: field(&fields, 7)?,
            target_start: field(&fields, 8)?,
            target_end: field(&fields, 9)?,
            e_value: finite_field(&fields, 10)?,
            score: finite_field(&fields, 11)?,
            query,
            read_length,
        })
    }
}

/// Lazy reader over an m8 file; yields one record per non-blank line.
/// Plain text or gzip (`.gz`).
pub struct AlignmentReader {
    path: PathBuf,
    reader: Box<dyn BufRead>,
    line: String,
    line_no: usize,
}

impl AlignmentReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let f = File::open(&path).map_err(|e| PhyloError::io(&path, e))?;

        let is_gz = path
            .extension()
            .map(|ext| ext == "gz")
            .unwrap_or(false);

        let reader: Box<dyn BufRead> = if is_gz {
            Box::new(BufReader::new(MultiGzDecoder::new(f)))
        } else {
            Box::new(BufReader::new(f))
        };

        Ok(Self {
            path,
            reader,
            line: String::new(),
            line_no: 0,
        })
    }
}

impl Iterator for AlignmentReader {
    type Item = Result<AlignmentRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::InvalidData => {
                    return Some(Err(PhyloError::parse(
                        &self.path,
                        self.line_no + 1,
                        format!("unreadable line: {e}"),
                    )))
                }
                Err(e) => return Some(Err(PhyloError::io(&self.path, e))),
            }
            self.line_no += 1;

            let trimmed = self.line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Some(
                AlignmentRecord::parse_line(trimmed)
                    .map_err(|msg| PhyloError::parse(&self.path, self.line_no, msg)),
            );
        }
    }
}

/// Reads every record of an m8 file, stopping at the first malformed line.
pub fn read_m8_records<P: AsRef<Path>>(path: P) -> Result<Vec<AlignmentRecord>> {
    AlignmentReader::open(path)?.collect()
}
