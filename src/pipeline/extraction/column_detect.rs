// Whitespace-based column detection and reordering for digital PDF text.
// pdf-extract may interleave text from multi-column PDFs. This module
// detects such patterns and reorders to read left column first, then right.

/// Minimum percentage of lines that must have a gutter at a similar
/// position to consider the page as multi-column.
const GUTTER_LINE_THRESHOLD: f64 = 0.50;

/// Minimum width of whitespace gap to be considered a gutter (characters).
const MIN_GUTTER_WIDTH: usize = 6;

/// Maximum deviation in gutter position across lines (characters).
const GUTTER_POSITION_TOLERANCE: usize = 4;

/// Minimum number of lines needed to attempt column detection.
const MIN_LINES_FOR_DETECTION: usize = 4;

/// Detect multi-column layout and reorder text to read left-column-first.
///
/// Returns the reordered text if columns are detected, or the original
/// text unchanged if no multi-column layout is found.
pub fn reorder_columns(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();

    if lines.len() < MIN_LINES_FOR_DETECTION {
        return text.to_string();
    }

    // Find the most common gutter position
    let gutter_pos = match detect_gutter(&lines) {
        Some(pos) => pos,
        None => return text.to_string(),
    };

    // Split lines at the gutter and reassemble
    split_and_reorder(&lines, gutter_pos)
}

/// Detect the position of a column gutter (large whitespace gap).
///
/// Scans each line for runs of MIN_GUTTER_WIDTH+ spaces, records
/// the midpoint, and finds the most common midpoint cluster.
fn detect_gutter(lines: &[&str]) -> Option<usize> {
    let mut gutter_positions: Vec<usize> = Vec::new();

    for line in lines {
        if let Some(pos) = find_gutter_in_line(line) {
            gutter_positions.push(pos);
        }
    }

    if gutter_positions.is_empty() {
        return None;
    }

    // Find the position cluster with the most lines
    let (best_pos, count) = find_best_cluster(&gutter_positions);

    // Check if enough lines have gutters at this position
    let ratio = count as f64 / lines.len() as f64;
    if ratio >= GUTTER_LINE_THRESHOLD {
        Some(best_pos)
    } else {
        None
    }
}

/// Find a whitespace gutter in a single line.
/// Returns the midpoint of the first gap of MIN_GUTTER_WIDTH+ spaces
/// that has non-space text on both sides.
fn find_gutter_in_line(line: &str) -> Option<usize> {
    let chars: Vec<char> = line.chars().collect();
    let len = chars.len();
    let mut i = 0;

    while i < len {
        if chars[i] == ' ' {
            let start = i;
            while i < len && chars[i] == ' ' {
                i += 1;
            }
            let gap_width = i - start;

            if gap_width >= MIN_GUTTER_WIDTH {
                // Check: non-space text exists on both sides
                let has_left = chars[..start].iter().any(|c| !c.is_whitespace());
                let has_right = i < len && chars[i..].iter().any(|c| !c.is_whitespace());

                if has_left && has_right {
                    return Some(start + gap_width / 2);
                }
            }
        } else {
            i += 1;
        }
    }

    None
}

/// Find the position cluster with the most entries.
/// Returns (center_position, count_of_lines_in_cluster).
fn find_best_cluster(positions: &[usize]) -> (usize, usize) {
    let mut best_pos = 0;
    let mut best_count = 0;

    for &pos in positions {
        let count = positions
            .iter()
            .filter(|&&p| (p as isize - pos as isize).unsigned_abs() <= GUTTER_POSITION_TOLERANCE)
            .count();

        if count > best_count {
            best_count = count;
            best_pos = pos;
        }
    }

    (best_pos, best_count)
}

/// Split lines at the gutter position and reassemble left-then-right.
fn split_and_reorder(lines: &[&str], gutter_pos: usize) -> String {
    let mut left_lines: Vec<String> = Vec::new();
    let mut right_lines: Vec<String> = Vec::new();

    for line in lines {
        let chars: Vec<char> = line.chars().collect();

        if chars.len() > gutter_pos {
            // Find the actual split: start of gutter whitespace near gutter_pos
            let (left, right) = split_at_gutter(line, gutter_pos);
            let left_trimmed = left.trim_end().to_string();
            let right_trimmed = right.trim_start().to_string();

            if !left_trimmed.is_empty() {
                left_lines.push(left_trimmed);
            }
            if !right_trimmed.is_empty() {
                right_lines.push(right_trimmed);
            }
        } else {
            // Short line — goes to left column
            let trimmed = line.trim().to_string();
            if !trimmed.is_empty() {
                left_lines.push(trimmed);
            }
        }
    }

    // Reassemble: left column first, then right column
    let mut result = left_lines.join("\n");
    if !right_lines.is_empty() {
        result.push('\n');
        result.push_str(&right_lines.join("\n"));
    }
    result
}

/// Split a line at the gutter position, finding the actual whitespace boundary.
fn split_at_gutter(line: &str, gutter_pos: usize) -> (&str, &str) {
    let chars: Vec<char> = line.chars().collect();

    // Find the start of the whitespace gap nearest to gutter_pos
    let search_start = gutter_pos.saturating_sub(GUTTER_POSITION_TOLERANCE + MIN_GUTTER_WIDTH);
    let search_end = (gutter_pos + GUTTER_POSITION_TOLERANCE + MIN_GUTTER_WIDTH).min(chars.len());

    // Find the beginning of a long whitespace run in the search region
    let mut best_gap_start = gutter_pos;
    let mut best_gap_end = gutter_pos;
    let mut i = search_start;

    while i < search_end {
        if chars[i] == ' ' {
            let start = i;
            while i < search_end && i < chars.len() && chars[i] == ' ' {
                i += 1;
            }
            if i - start >= MIN_GUTTER_WIDTH && i - start > best_gap_end - best_gap_start {
                best_gap_start = start;
                best_gap_end = i;
            }
        } else {
            i += 1;
        }
    }

    // Convert char indices to byte offsets
    let byte_start: usize = chars[..best_gap_start].iter().map(|c| c.len_utf8()).sum();
    let byte_end: usize = chars[..best_gap_end].iter().map(|c| c.len_utf8()).sum();

    let left = &line[..byte_start];
    let right = if byte_end <= line.len() {
        &line[byte_end..]
    } else {
        ""
    };

    (left, right)
}
