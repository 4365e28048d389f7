use std::io::BufRead;

use anyhow::Result;

use crate::adapters::AdapterLibrary;
use crate::io::RecallSink;
use crate::stats::RecallStats;

/// A resolved queue is a real candidate only above this combined length.
/// Strictly greater: 200 combined bases is still too short.
pub const MIN_CANDIDATE_LEN: usize = 200;

/// Classification tag marking a fresh boundary candidate in the sorted
/// input; every other tag is a continuation of a degraded run.
const FRESH_TAG: &str = "noBC";

/// Output stream for one recall verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecallStream {
    Candidate,
    CandidateTooShort,
    Discarded,
    Malformed,
}

/// A parsed input row. The id is kept verbatim alongside its decomposition:
/// the last `|` field is the classification tag, the one before it the
/// segment index, and everything to the left (which may itself contain `|`)
/// the parent read id.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RecallRow {
    id: String,
    parent: String,
    index: u64,
    tag: String,
    seq: String,
    qual: String,
}

fn parse_row(line: &str) -> Option<RecallRow> {
    let mut cols = line.split_whitespace();
    let id = cols.next()?;
    let seq = cols.next()?;
    let qual = cols.next()?;

    let fields: Vec<&str> = id.split('|').collect();
    if fields.len() < 3 {
        return None;
    }
    let tag = fields[fields.len() - 1];
    let index: u64 = fields[fields.len() - 2].parse().ok()?;
    let parent = fields[..fields.len() - 2].join("|");
    Some(RecallRow {
        id: id.to_string(),
        parent,
        index,
        tag: tag.to_string(),
        seq: seq.to_string(),
        qual: qual.to_string(),
    })
}

/// Replace the classification tag of an id with the false-split marker.
fn retag_false_split(id: &str, barcode: &str) -> String {
    match id.rsplit_once('|') {
        Some((head, _tag)) => format!("{head}|{barcode}_falseSplit"),
        None => format!("{barcode}_falseSplit"),
    }
}

#[derive(Debug, Clone)]
struct QueuedRow {
    id: String,
    parent: String,
    index: u64,
    seq: String,
    qual: String,
}

impl QueuedRow {
    fn from_row(row: RecallRow) -> Self {
        QueuedRow {
            id: row.id,
            parent: row.parent,
            index: row.index,
            seq: row.seq,
            qual: row.qual,
        }
    }

    fn line(&self) -> String {
        format!("{}\t{}\t{}", self.id, self.seq, self.qual)
    }
}

/// The false-split recall state machine.
///
/// Consumes rows sorted by (parent id, segment index) — that ordering is a
/// hard precondition — and maintains a single pending queue. The machine is
/// in state Empty when the queue has no rows and Accumulating otherwise;
/// every resolution (fresh-boundary flush, discontinuity, candidate
/// emission, end of stream) returns it to Empty. Inherently sequential: do
/// not feed it from parallel producers without an external sort barrier.
pub struct RecallStateMachine {
    adapters: AdapterLibrary,
    queue: Vec<QueuedRow>,
    stats: RecallStats,
}

impl RecallStateMachine {
    pub fn new(adapters: AdapterLibrary) -> Self {
        RecallStateMachine {
            adapters,
            queue: Vec::new(),
            stats: RecallStats::default(),
        }
    }

    pub fn stats(&self) -> &RecallStats {
        &self.stats
    }

    fn flush_queue(&mut self, stream: RecallStream, sink: &mut dyn RecallSink) -> Result<()> {
        for row in self.queue.drain(..) {
            sink.write(stream, &row.line())?;
        }
        Ok(())
    }

    /// Feed one input row through the transition table.
    pub fn push(&mut self, line: &str, sink: &mut dyn RecallSink) -> Result<()> {
        // Case 3: no usable columns; the queue is untouched.
        let Some(row) = parse_row(line) else {
            self.stats.malformed_rows += 1;
            return sink.write(RecallStream::Malformed, line.trim_end());
        };

        // Case 1: a fresh boundary invalidates any open queue and starts
        // the next one.
        if row.tag == FRESH_TAG {
            if !self.queue.is_empty() {
                self.stats.open_queue_flushes += 1;
                self.flush_queue(RecallStream::Discarded, sink)?;
            }
            self.queue.push(QueuedRow::from_row(row));
            return Ok(());
        }

        // Case 2: a continuation cannot start a queue.
        if self.queue.is_empty() {
            self.stats.orphan_continuations += 1;
            return sink.write(RecallStream::Discarded, &QueuedRow::from_row(row).line());
        }

        // Case 4: parent or index discontinuity discards the incoming row
        // and the whole pending queue.
        let last = self.queue.last().expect("queue is non-empty");
        if row.parent != last.parent || row.index != last.index + 1 {
            self.stats.discontinuity_flushes += 1;
            sink.write(RecallStream::Discarded, &QueuedRow::from_row(row).line())?;
            self.flush_queue(RecallStream::Discarded, sink)?;
            return Ok(());
        }

        match self.adapters.find_anywhere(row.seq.as_bytes()) {
            // Cases 5/6: a buried full barcode resolves the queue.
            Some(barcode) => {
                let mut resolved = QueuedRow::from_row(row);
                resolved.id = retag_false_split(&resolved.id, &barcode);
                self.queue.push(resolved);

                let combined: usize = self.queue.iter().map(|r| r.seq.len()).sum();
                let stream = if combined > MIN_CANDIDATE_LEN {
                    self.stats.candidates += 1;
                    RecallStream::Candidate
                } else {
                    self.stats.candidates_too_short += 1;
                    RecallStream::CandidateTooShort
                };
                self.flush_queue(stream, sink)
            }
            // Case 7: still unresolved, keep accumulating.
            None => {
                self.stats.queued_continuations += 1;
                self.queue.push(QueuedRow::from_row(row));
                Ok(())
            }
        }
    }

    /// End of stream: an unterminated queue is discarded.
    pub fn finish(mut self, sink: &mut dyn RecallSink) -> Result<RecallStats> {
        self.flush_queue(RecallStream::Discarded, sink)?;
        Ok(self.stats)
    }
}

/// Drive the state machine over a sorted line stream.
pub fn process_recall_stream<R: BufRead>(
    reader: R,
    adapters: AdapterLibrary,
    sink: &mut dyn RecallSink,
) -> Result<(RecallStats, u64)> {
    let mut machine = RecallStateMachine::new(adapters);
    let mut rows = 0u64;
    for line in reader.lines() {
        machine.push(&line?, sink)?;
        rows += 1;
    }
    let stats = machine.finish(sink)?;
    Ok((stats, rows))
}
