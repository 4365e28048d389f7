use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::matcher::FuzzyMotif;

/// Default edit tolerance for adapter barcodes.
pub const DEFAULT_BARCODE_EDITS: u8 = 2;

/// How many bases at the 3′ end of a segment are searched for a barcode.
pub const BARCODE_WINDOW: usize = 25;

fn default_edits() -> u8 {
    DEFAULT_BARCODE_EDITS
}

/// One row of the adapter-library configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct AdapterConfig {
    pub name: String,
    pub sequence: String,
    #[serde(default = "default_edits")]
    pub max_edits: u8,
}

#[derive(Debug, Deserialize)]
struct LibraryConfig {
    adapters: Vec<AdapterConfig>,
}

/// A named sample barcode with its fuzzy matcher.
#[derive(Debug, Clone)]
struct AdapterEntry {
    name: String,
    motif: FuzzyMotif,
}

/// A barcode assignment: which adapter matched and where the segment is cut.
///
/// `cut` is the hit start relative to the full segment; the retained
/// transcript is everything before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarcodeHit {
    pub name: String,
    pub cut: usize,
}

/// The ordered set of known sample barcodes.
///
/// Declaration order is semantically significant: assignment takes the first
/// entry that matches within tolerance, not the best match, so two adapters
/// that both fit a tail resolve to the earlier declaration.
#[derive(Debug, Clone)]
pub struct AdapterLibrary {
    entries: Vec<AdapterEntry>,
}

impl AdapterLibrary {
    /// Build a library from an ordered adapter list, validating names and
    /// patterns. An empty list is a configuration error.
    pub fn new(adapters: &[AdapterConfig]) -> Result<Self> {
        if adapters.is_empty() {
            bail!("adapter library is empty");
        }

        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(adapters.len());
        for cfg in adapters {
            if cfg.name.is_empty() {
                bail!("adapter with empty name");
            }
            if !seen.insert(cfg.name.clone()) {
                bail!("duplicate adapter name: {}", cfg.name);
            }
            if cfg.sequence.is_empty() || cfg.sequence.len() > 64 {
                bail!(
                    "adapter {}: pattern length must be in 1..=64, got {}",
                    cfg.name,
                    cfg.sequence.len()
                );
            }
            if let Some(bad) = cfg
                .sequence
                .bytes()
                .find(|b| !matches!(b, b'A' | b'C' | b'G' | b'T'))
            {
                bail!("adapter {}: unexpected symbol '{}'", cfg.name, bad as char);
            }
            entries.push(AdapterEntry {
                name: cfg.name.clone(),
                motif: FuzzyMotif::new(cfg.sequence.as_bytes(), cfg.max_edits),
            });
        }
        Ok(AdapterLibrary { entries })
    }

    /// Load a library from a JSON file: `{"adapters": [{"name", "sequence",
    /// "max_edits"?}, ...]}`. Array order is the declaration order.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open adapter library {}", path.display()))?;
        let config: LibraryConfig = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse adapter library {}", path.display()))?;
        Self::new(&config.adapters)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Search the last [`BARCODE_WINDOW`] bases of `seq` for each adapter in
    /// declared order; the first entry that matches wins. `cut` in the
    /// returned hit is relative to the full `seq`.
    pub fn assign_in_suffix(&mut self, seq: &[u8]) -> Option<BarcodeHit> {
        let window_start = seq.len().saturating_sub(BARCODE_WINDOW);
        let window = &seq[window_start..];
        for entry in &mut self.entries {
            if let Some(hit) = entry.motif.find_first(window) {
                return Some(BarcodeHit {
                    name: entry.name.clone(),
                    cut: window_start + hit.start,
                });
            }
        }
        None
    }

    /// Search all of `seq` for a full barcode occurrence, declared order,
    /// first match wins. Used by the recall pass, where a barcode buried in
    /// the middle of a segment marks a false split.
    pub fn find_anywhere(&mut self, seq: &[u8]) -> Option<String> {
        for entry in &mut self.entries {
            if let Some(_hit) = entry.motif.find_first(seq) {
                return Some(entry.name.clone());
            }
        }
        None
    }
}
