pub mod adapters;
pub mod io;
pub mod matcher;
pub mod recall;
pub mod splitter;
pub mod stats;

/// An unexpected symbol encountered while reverse-complementing a read.
///
/// The complement table only covers `{A, C, G, T, N, -}`; anything else
/// (IUPAC ambiguity codes, lowercase, stray bytes) fails the read rather
/// than producing undefined output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid base '{base}' at position {pos}")]
pub struct InvalidBase {
    pub base: char,
    pub pos: usize,
}

/// Reverse-complement a nucleotide sequence.
///
/// Maps `A↔T`, `C↔G`, keeps `N` and the gap symbol `-` as-is, and reverses
/// the order. Returns an [`InvalidBase`] error for any other symbol; the
/// caller decides how to fail the read.
pub fn reverse_complement(seq: &[u8]) -> Result<Vec<u8>, InvalidBase> {
    let mut out = Vec::with_capacity(seq.len());
    for (pos, &base) in seq.iter().enumerate().rev() {
        out.push(match base {
            b'A' => b'T',
            b'T' => b'A',
            b'C' => b'G',
            b'G' => b'C',
            b'N' => b'N',
            b'-' => b'-',
            other => {
                return Err(InvalidBase {
                    base: other as char,
                    pos,
                })
            }
        });
    }
    Ok(out)
}
