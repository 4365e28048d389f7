use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::recall::RecallStream;
use crate::splitter::{Classification, OutputRecord};

/// Create a buffered TSV writer. If `path` ends with `.gz`, the stream is
/// gzip-compressed.
pub fn create_tsv_writer(path: &Path) -> Result<Box<dyn Write>> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let writer = BufWriter::new(file);
    if path.extension().map_or(false, |e| e == "gz") {
        Ok(Box::new(GzEncoder::new(writer, Compression::default())))
    } else {
        Ok(Box::new(writer))
    }
}

fn write_tsv_record(w: &mut dyn Write, id: &str, seq: &[u8], qual: &[u8]) -> Result<()> {
    w.write_all(id.as_bytes())?;
    w.write_all(b"\t")?;
    w.write_all(seq)?;
    w.write_all(b"\t")?;
    w.write_all(qual)?;
    w.write_all(b"\n")?;
    Ok(())
}

/// Where classified split records go. The engine only ever sees this
/// capability; it never owns file handles, so callers can route output to
/// files, memory, or anything else.
pub trait SplitSink {
    fn write(&mut self, rec: &OutputRecord) -> Result<()>;
}

/// File-backed sink with one TSV stream per classification, using the
/// historical extensions: `.BCassigned.tsv` under the valid directory,
/// `.err.tsv` / `.deg.tsv` / `.noBC.tsv` / `.noUMI.tsv` under the invalid
/// directory. `gzip` appends `.gz` and compresses every stream.
pub struct TsvSplitSink {
    assigned: Box<dyn Write>,
    split_failed: Box<dyn Write>,
    degraded: Box<dyn Write>,
    no_barcode: Box<dyn Write>,
    no_umi: Box<dyn Write>,
}

impl TsvSplitSink {
    pub fn create(valid_dir: &Path, invalid_dir: &Path, stem: &str, gzip: bool) -> Result<Self> {
        let suffix = if gzip { ".tsv.gz" } else { ".tsv" };
        let path = |dir: &Path, ext: &str| -> PathBuf {
            dir.join(format!("{stem}.{ext}{suffix}"))
        };
        Ok(TsvSplitSink {
            assigned: create_tsv_writer(&path(valid_dir, "BCassigned"))?,
            split_failed: create_tsv_writer(&path(invalid_dir, "err"))?,
            degraded: create_tsv_writer(&path(invalid_dir, "deg"))?,
            no_barcode: create_tsv_writer(&path(invalid_dir, "noBC"))?,
            no_umi: create_tsv_writer(&path(invalid_dir, "noUMI"))?,
        })
    }

    pub fn finish(&mut self) -> Result<()> {
        self.assigned.flush()?;
        self.split_failed.flush()?;
        self.degraded.flush()?;
        self.no_barcode.flush()?;
        self.no_umi.flush()?;
        Ok(())
    }
}

impl SplitSink for TsvSplitSink {
    fn write(&mut self, rec: &OutputRecord) -> Result<()> {
        let w = match rec.classification {
            Classification::Assigned => &mut self.assigned,
            Classification::SplitFailed => &mut self.split_failed,
            Classification::Degraded => &mut self.degraded,
            Classification::NoBarcode => &mut self.no_barcode,
            Classification::NoUmi => &mut self.no_umi,
        };
        write_tsv_record(w.as_mut(), &rec.id, &rec.seq, &rec.qual)
    }
}

/// In-memory sink for tests and library callers that want records back.
#[derive(Debug, Default)]
pub struct MemorySplitSink {
    pub records: Vec<OutputRecord>,
}

impl SplitSink for MemorySplitSink {
    fn write(&mut self, rec: &OutputRecord) -> Result<()> {
        self.records.push(rec.clone());
        Ok(())
    }
}

impl MemorySplitSink {
    pub fn with_classification(&self, classification: Classification) -> Vec<&OutputRecord> {
        self.records
            .iter()
            .filter(|r| r.classification == classification)
            .collect()
    }
}

/// Where recall output lines go; one stream per verdict.
pub trait RecallSink {
    fn write(&mut self, stream: RecallStream, line: &str) -> Result<()>;
}

/// File-backed recall sink using the historical file names.
pub struct TsvRecallSink {
    candidate: Box<dyn Write>,
    candidate_too_short: Box<dyn Write>,
    discarded: Box<dyn Write>,
    malformed: Box<dyn Write>,
}

impl TsvRecallSink {
    pub fn create(candidate_dir: &Path, discard_dir: &Path, gzip: bool) -> Result<Self> {
        let suffix = if gzip { ".tsv.gz" } else { ".tsv" };
        Ok(TsvRecallSink {
            candidate: create_tsv_writer(&candidate_dir.join(format!("candidate_list{suffix}")))?,
            candidate_too_short: create_tsv_writer(
                &candidate_dir.join(format!("candidate_tooShort{suffix}")),
            )?,
            discarded: create_tsv_writer(
                &discard_dir.join(format!("not_false_split_candidate{suffix}")),
            )?,
            malformed: create_tsv_writer(&discard_dir.join(format!("one_column{suffix}")))?,
        })
    }

    pub fn finish(&mut self) -> Result<()> {
        self.candidate.flush()?;
        self.candidate_too_short.flush()?;
        self.discarded.flush()?;
        self.malformed.flush()?;
        Ok(())
    }
}

impl RecallSink for TsvRecallSink {
    fn write(&mut self, stream: RecallStream, line: &str) -> Result<()> {
        let w = match stream {
            RecallStream::Candidate => &mut self.candidate,
            RecallStream::CandidateTooShort => &mut self.candidate_too_short,
            RecallStream::Discarded => &mut self.discarded,
            RecallStream::Malformed => &mut self.malformed,
        };
        w.write_all(line.as_bytes())?;
        w.write_all(b"\n")?;
        Ok(())
    }
}

/// In-memory recall sink for tests.
#[derive(Debug, Default)]
pub struct MemoryRecallSink {
    pub lines: Vec<(RecallStream, String)>,
}

impl RecallSink for MemoryRecallSink {
    fn write(&mut self, stream: RecallStream, line: &str) -> Result<()> {
        self.lines.push((stream, line.to_string()));
        Ok(())
    }
}

impl MemoryRecallSink {
    pub fn in_stream(&self, stream: RecallStream) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|(s, _)| *s == stream)
            .map(|(_, l)| l.as_str())
            .collect()
    }
}

/// Persist run counters as pretty-printed JSON, the shape downstream
/// tooling already consumes.
pub fn write_stats_json<S: Serialize>(path: &Path, stats: &S) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, stats)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
