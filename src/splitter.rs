use anyhow::Result;
use log::warn;
use rayon::prelude::*;

use crate::adapters::AdapterLibrary;
use crate::io::SplitSink;
use crate::matcher::{hamming_distance, FuzzyMotif};
use crate::stats::SplitStats;
use crate::{reverse_complement, InvalidBase};

/// Forward 5′ signature of a properly oriented concatenated read.
const SIG_FORWARD: &[u8] = b"TCTACACGACGCTCTTCCGATCT";
/// Downstream partner motif confirming forward orientation.
const SIG_PARTNER_FORWARD: &[u8] = b"CTCTGCGTTGATACCACTGCTTA";
/// Reverse complement of the forward signature.
const SIG_REVERSE: &[u8] = b"AGATCGGAAGAGCGTCGTGTAGA";
/// Reverse complement of the forward partner.
const SIG_PARTNER_REVERSE: &[u8] = b"TAAGCAGTGGTATCAACGCAGAG";
/// Internal ligation-primer motif marking a transcript boundary.
const BOUNDARY_PRIMER: &[u8] = b"GTACTCTGCGTTGATACCACTGCTTA";
/// 5′ integrity signature expected at the start of every genuine segment.
const SIG_FIVE_PRIME: &[u8] = b"CTACACGACGCTCTTCCGATCT";
/// Constant motif immediately downstream of the UMI.
const UMI_ANCHOR: &[u8] = b"ATGGG";

const SIGNATURE_EDITS: u8 = 2;
const BOUNDARY_EDITS: u8 = 3;
const ANCHOR_SUBSTITUTIONS: u32 = 1;

/// How far into a segment the 5′ signature may sit.
pub const SIGNATURE_WINDOW: usize = 50;
/// UMI random-region length bounds; the longest fit wins.
pub const UMI_MIN_LEN: usize = 8;
pub const UMI_MAX_LEN: usize = 12;

pub const BATCH_SIZE: usize = 10_000;

/// Terminal state of a segment (or, for `SplitFailed`, a whole read).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    SplitFailed,
    Degraded,
    NoBarcode,
    NoUmi,
    Assigned,
}

/// One raw input read. `pass_number` is carried for callers that have it as
/// a separate field; the upstream extractor usually embeds it in the id.
#[derive(Debug, Clone)]
pub struct ReadRecord {
    pub id: String,
    pub seq: Vec<u8>,
    pub qual: Vec<u8>,
    pub pass_number: Option<u32>,
}

impl ReadRecord {
    /// The id every derived record is tagged with: the read id, with the
    /// pass number appended when it was supplied as a separate field.
    pub fn tag_id(&self) -> String {
        match self.pass_number {
            Some(pass) => format!("{}|{}", self.id, pass),
            None => self.id.clone(),
        }
    }

    /// Pass number from the explicit field, falling back to a trailing
    /// `|<n>` component of the id.
    pub fn pass_number_hint(&self) -> Option<u32> {
        self.pass_number
            .or_else(|| self.id.rsplit('|').next()?.parse().ok())
    }
}

/// A classified output record; `id` carries the full `|`-joined tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRecord {
    pub classification: Classification,
    pub id: String,
    pub seq: Vec<u8>,
    pub qual: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Forward,
    Reverse,
}

/// The per-read segmentation and classification engine.
///
/// Holds the signature/boundary matchers and the adapter library. Matching
/// mutates internal search state, so parallel callers clone one instance per
/// worker; construction is cheap and the library itself is fixed.
#[derive(Debug, Clone)]
pub struct Splitter {
    sig_forward: FuzzyMotif,
    sig_partner_forward: FuzzyMotif,
    sig_reverse: FuzzyMotif,
    sig_partner_reverse: FuzzyMotif,
    boundary: FuzzyMotif,
    five_prime: FuzzyMotif,
    adapters: AdapterLibrary,
}

impl Splitter {
    pub fn new(adapters: AdapterLibrary) -> Self {
        Splitter {
            sig_forward: FuzzyMotif::new(SIG_FORWARD, SIGNATURE_EDITS),
            sig_partner_forward: FuzzyMotif::new(SIG_PARTNER_FORWARD, SIGNATURE_EDITS),
            sig_reverse: FuzzyMotif::new(SIG_REVERSE, SIGNATURE_EDITS),
            sig_partner_reverse: FuzzyMotif::new(SIG_PARTNER_REVERSE, SIGNATURE_EDITS),
            boundary: FuzzyMotif::new(BOUNDARY_PRIMER, BOUNDARY_EDITS),
            five_prime: FuzzyMotif::new(SIG_FIVE_PRIME, SIGNATURE_EDITS),
            adapters,
        }
    }

    /// Read polarity from terminal signature presence. `None` means the
    /// evidence is ambiguous (both or neither pair present) and the read
    /// cannot be split.
    pub fn detect_orientation(&self, seq: &[u8]) -> Option<Orientation> {
        let forward =
            self.sig_forward.is_present(seq) && self.sig_partner_forward.is_present(seq);
        let backward =
            self.sig_reverse.is_present(seq) && self.sig_partner_reverse.is_present(seq);
        match (forward, backward) {
            (true, false) => Some(Orientation::Forward),
            (false, true) => Some(Orientation::Reverse),
            _ => None,
        }
    }

    /// Canonicalize a read to forward orientation. A forward read passes
    /// through untouched (normalization is idempotent); a reverse read is
    /// reverse-complemented with its quality reversed, not complemented.
    /// `Ok(None)` marks an unsplittable read.
    pub fn normalize(
        &self,
        seq: &[u8],
        qual: &[u8],
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, InvalidBase> {
        match self.detect_orientation(seq) {
            None => Ok(None),
            Some(Orientation::Forward) => Ok(Some((seq.to_vec(), qual.to_vec()))),
            Some(Orientation::Reverse) => {
                let rc = reverse_complement(seq)?;
                let mut rq = qual.to_vec();
                rq.reverse();
                Ok(Some((rc, rq)))
            }
        }
    }

    /// Cut a normalized read at every boundary-primer occurrence. Returns
    /// the ordered half-open spans between hits, tail included; zero hits
    /// yield one whole-read span.
    pub fn locate_segments(&mut self, seq: &[u8]) -> Vec<(usize, usize)> {
        let mut spans = Vec::new();
        let mut prev = 0usize;
        for hit in self.boundary.find_all(seq) {
            spans.push((prev, hit.start));
            prev = hit.end;
        }
        spans.push((prev, seq.len()));
        spans
    }

    /// Run one segment through 5′ validation, barcode assignment, and UMI
    /// extraction, ending in exactly one classification.
    fn process_segment(
        &mut self,
        parent: &str,
        index: usize,
        seq: &[u8],
        qual: &[u8],
        stats: &mut SplitStats,
    ) -> OutputRecord {
        let window = &seq[..seq.len().min(SIGNATURE_WINDOW)];
        let Some(sig_hit) = self.five_prime.find_first(window) else {
            stats.five_end_degraded += 1;
            return OutputRecord {
                classification: Classification::Degraded,
                id: format!("{parent}|{index}|Degraded"),
                seq: seq.to_vec(),
                qual: qual.to_vec(),
            };
        };
        let trimmed = &seq[sig_hit.end..];
        let trimmed_qual = &qual[sig_hit.end..];

        let Some(barcode) = self.adapters.assign_in_suffix(trimmed) else {
            stats.no_barcode += 1;
            return OutputRecord {
                classification: Classification::NoBarcode,
                id: format!("{parent}|{index}|noBC"),
                seq: trimmed.to_vec(),
                qual: trimmed_qual.to_vec(),
            };
        };
        let bc_seq = &trimmed[..barcode.cut];
        let bc_qual = &trimmed_qual[..barcode.cut];

        match extract_umi(bc_seq) {
            Some((umi_len, rest_at)) => {
                stats.assigned += 1;
                let umi = std::str::from_utf8(&bc_seq[..umi_len]).expect("UMI is ASCII");
                OutputRecord {
                    classification: Classification::Assigned,
                    id: format!("{parent}|{index}|{}|{umi}", barcode.name),
                    seq: bc_seq[rest_at..].to_vec(),
                    qual: bc_qual[rest_at..].to_vec(),
                }
            }
            None => {
                stats.no_umi += 1;
                OutputRecord {
                    classification: Classification::NoUmi,
                    id: format!("{parent}|{index}|{}|noUMI", barcode.name),
                    seq: bc_seq.to_vec(),
                    qual: bc_qual.to_vec(),
                }
            }
        }
    }

    /// Process one read end to end. Returns the classified records and the
    /// counter deltas for this read; the caller merges deltas across reads
    /// in any order.
    pub fn process_read(&mut self, rec: &ReadRecord) -> (Vec<OutputRecord>, SplitStats) {
        let mut stats = SplitStats::default();
        let parent = rec.tag_id();

        let (seq, qual) = match self.normalize(&rec.seq, &rec.qual) {
            Err(err) => {
                warn!("read {}: {err}", rec.id);
                stats.invalid_base += 1;
                return (
                    vec![OutputRecord {
                        classification: Classification::SplitFailed,
                        id: format!("{parent}|Error"),
                        seq: rec.seq.clone(),
                        qual: rec.qual.clone(),
                    }],
                    stats,
                );
            }
            Ok(None) => {
                stats.split_failed += 1;
                return (
                    vec![OutputRecord {
                        classification: Classification::SplitFailed,
                        id: format!("{parent}|Error"),
                        seq: rec.seq.clone(),
                        qual: rec.qual.clone(),
                    }],
                    stats,
                );
            }
            Ok(Some(normalized)) => normalized,
        };

        let spans = self.locate_segments(&seq);
        let mut records = Vec::with_capacity(spans.len());
        for (index, (start, end)) in spans.into_iter().enumerate() {
            records.push(self.process_segment(
                &parent,
                index,
                &seq[start..end],
                &qual[start..end],
                &mut stats,
            ));
        }
        (records, stats)
    }
}

/// Locate the UMI at the start of a barcode-trimmed sequence: a run of
/// 8–12 `{A,C,G,T}` bases followed by the anchor motif with at most one
/// substitution. Longer runs are tried first, matching greedy semantics.
/// Returns `(umi_len, resume_at)` where `resume_at` skips the anchor.
fn extract_umi(seq: &[u8]) -> Option<(usize, usize)> {
    for umi_len in (UMI_MIN_LEN..=UMI_MAX_LEN).rev() {
        let anchor_end = umi_len + UMI_ANCHOR.len();
        if seq.len() < anchor_end {
            continue;
        }
        if !seq[..umi_len]
            .iter()
            .all(|b| matches!(b, b'A' | b'C' | b'G' | b'T'))
        {
            continue;
        }
        if hamming_distance(&seq[umi_len..anchor_end], UMI_ANCHOR) <= ANCHOR_SUBSTITUTIONS {
            return Some((umi_len, anchor_end));
        }
    }
    None
}

/// Process a batch of reads: parallel classification, then serial writes so
/// the sink never sees interleaved records. Counter deltas are merged with
/// an associative, commutative reduction.
pub fn process_batch(
    batch: &[ReadRecord],
    splitter: &Splitter,
    sink: &mut dyn SplitSink,
    totals: &mut SplitStats,
) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }

    let (records, stats) = batch
        .par_iter()
        .map_init(|| splitter.clone(), |s, rec| s.process_read(rec))
        .reduce(
            || (Vec::new(), SplitStats::default()),
            |(mut recs, mut acc), (other_recs, other)| {
                recs.extend(other_recs);
                acc.merge(&other);
                (recs, acc)
            },
        );

    totals.merge(&stats);
    for rec in &records {
        sink.write(rec)?;
    }
    Ok(())
}
