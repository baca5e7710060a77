//! Overlapping text chunker for embedding and retrieval.
//!
//! Splits extracted document text into segments of at most `chunk_size`
//! characters, cutting on the coarsest boundary available inside the size
//! budget: paragraph break, then sentence break or newline, then word
//! boundary, then a hard character cut. Consecutive chunks share an
//! `overlap`-sized lead taken verbatim from the preceding text so that
//! meaning at a cut point survives into the next chunk.
//!
//! Invariants:
//! - chunks are produced in document order;
//! - concatenating chunk 0 with every later chunk minus its lead yields the
//!   original text byte-for-byte;
//! - `overlap` is always strictly less than `chunk_size` (validated in
//!   config, clamped here);
//! - empty input yields an empty sequence, not an error.

/// Sentence-level separators, tried in order after paragraph breaks.
const SENTENCE_SEPARATORS: [&str; 4] = [". ", "! ", "? ", "\n"];

/// Split `text` into ordered chunk texts of at most `chunk_size` bytes.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    if text.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let overlap = overlap.min(chunk_size - 1);

    // Cut points delimit non-overlapping base segments. Every chunk after
    // the first is its base segment plus an overlap lead, so later segments
    // get a reduced budget to keep the assembled chunk within chunk_size.
    let mut cuts: Vec<usize> = vec![0];
    let mut pos = 0usize;
    let mut first = true;
    while pos < text.len() {
        let budget = if first { chunk_size } else { chunk_size - overlap };
        first = false;

        if text.len() - pos <= budget {
            cuts.push(text.len());
            break;
        }

        let mut window_end = floor_char_boundary(text, pos + budget);
        if window_end <= pos {
            // A multi-byte character straddles the budget; take it whole
            // rather than stalling.
            window_end = ceil_char_boundary(text, pos + 1);
        }
        let cut = pos + find_cut(&text[pos..window_end]);
        cuts.push(cut);
        pos = cut;
    }

    let mut chunks = Vec::with_capacity(cuts.len() - 1);
    for (i, pair) in cuts.windows(2).enumerate() {
        let (start, end) = (pair[0], pair[1]);
        if i == 0 {
            chunks.push(text[start..end].to_string());
        } else {
            let lead_start = ceil_char_boundary(text, start.saturating_sub(overlap));
            chunks.push(text[lead_start..end].to_string());
        }
    }
    chunks
}

/// Pick the cut offset within `window`, preferring the last paragraph
/// break, then the last sentence break, then the last word boundary.
/// Always returns an offset in `1..=window.len()`.
fn find_cut(window: &str) -> usize {
    if let Some(p) = window.rfind("\n\n") {
        return p + 2;
    }
    for sep in SENTENCE_SEPARATORS {
        if let Some(p) = window.rfind(sep) {
            return p + sep.len();
        }
    }
    if let Some(p) = window.rfind(' ') {
        return p + 1;
    }
    window.len()
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(index) {
        index += 1;
    }
    index
}
