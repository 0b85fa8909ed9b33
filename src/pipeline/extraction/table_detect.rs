use super::types::{ExtractionWarning, PageExtraction};

/// Minimum number of lines at page boundary to check for table patterns.
const BOUNDARY_LINES: usize = 3;

/// Minimum ratio of tabular lines needed to consider a boundary as tabular.
const TABULAR_THRESHOLD: f64 = 0.60;

/// Detect table continuation across page breaks and annotate pages.
///
/// Scans adjacent page pairs: if the last N lines of page K and the
/// first N lines of page K+1 both look tabular, adds a
/// `TableContinuation` warning to page K.
pub fn annotate_table_continuations(pages: &mut [PageExtraction]) {
    if pages.len() < 2 {
        return;
    }

    for i in 0..pages.len() - 1 {
        let tail_tabular = is_tail_tabular(&pages[i].text);
        let head_tabular = is_head_tabular(&pages[i + 1].text);

        if tail_tabular && head_tabular {
            // Only add if not already present
            let already = pages[i]
                .warnings
                .iter()
                .any(|w| matches!(w, ExtractionWarning::TableContinuation));
            if !already {
                pages[i]
                    .warnings
                    .push(ExtractionWarning::TableContinuation);
            }
        }
    }
}

/// Check if the last BOUNDARY_LINES of the text look tabular.
fn is_tail_tabular(text: &str) -> bool {
    let lines: Vec<&str> = text.lines().rev().take(BOUNDARY_LINES).collect();
    if lines.is_empty() {
        return false;
    }
    let tabular_count = lines.iter().filter(|l| is_tabular_line(l)).count();
    tabular_count as f64 / lines.len() as f64 >= TABULAR_THRESHOLD
}

/// Check if the first BOUNDARY_LINES of the text look tabular.
fn is_head_tabular(text: &str) -> bool {
    let lines: Vec<&str> = text.lines().take(BOUNDARY_LINES).collect();
    if lines.is_empty() {
        return false;
    }
    let tabular_count = lines.iter().filter(|l| is_tabular_line(l)).count();
    tabular_count as f64 / lines.len() as f64 >= TABULAR_THRESHOLD
}

/// Heuristic: a line looks tabular if it has multiple columns separated by
/// tabs, pipes, or consistent multi-space gaps.
///
/// Patterns detected:
/// - Tab-separated: "Name\tDose\tFrequency"
/// - Pipe-separated: "Name | Dose | Frequency"
/// - Multi-space aligned: "Potassium    4.2    mmol/L"
/// - Colon-value pairs in sequence: "K: 4.2  Na: 140  Cl: 102"
fn is_tabular_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.len() < 5 {
        return false;
    }

    // Tab-separated: 2+ tabs indicates table row
    if trimmed.matches('\t').count() >= 2 {
        return true;
    }

    // Pipe-separated: 2+ pipes indicates table row
    if trimmed.matches('|').count() >= 2 {
        return true;
    }

    // Multi-space aligned: 2+ runs of 3+ spaces between non-empty segments
    let space_gaps = count_multi_space_gaps(trimmed);
    if space_gaps >= 2 {
        return true;
    }

    false
}

/// Count runs of 3+ consecutive spaces that separate non-empty text segments.
fn count_multi_space_gaps(text: &str) -> usize {
    let mut count = 0;
    let mut in_gap = false;
    let mut gap_len = 0;

    for ch in text.chars() {
        if ch == ' ' {
            gap_len += 1;
            if gap_len >= 3 && !in_gap {
                in_gap = true;
                count += 1;
            }
        } else {
            in_gap = false;
            gap_len = 0;
        }
    }

    count
}
