use super::types::{Chunker, TextChunk};

/// Semantic chunker for medical Markdown documents.
/// Splits by section headings first, then by paragraphs for large sections.
pub struct MedicalChunker {
    max_chunk_chars: usize,
    min_chunk_chars: usize,
    overlap_chars: usize,
}

impl MedicalChunker {
    pub fn new() -> Self {
        Self {
            max_chunk_chars: 1000,
            min_chunk_chars: 20,
            overlap_chars: 100,
        }
    }
}

impl Default for MedicalChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunker for MedicalChunker {
    fn chunk(&self, markdown: &str) -> Vec<TextChunk> {
        let mut chunks = Vec::new();
        let mut chunk_index = 0;

        let sections = split_by_headings(markdown);

        for section in &sections {
            if section.content.len() <= self.max_chunk_chars {
                // Always include sections — merge_tiny_chunks handles small ones
                chunks.push(TextChunk {
                    content: section.content.clone(),
                    chunk_index,
                    section_title: section.title.clone(),
                    char_offset: section.offset,
                });
                chunk_index += 1;
            } else {
                let sub_chunks = split_section_by_paragraphs(
                    &section.content,
                    &section.title,
                    section.offset,
                    self.max_chunk_chars,
                    self.overlap_chars,
                    &mut chunk_index,
                );
                chunks.extend(sub_chunks);
            }
        }

        merge_tiny_chunks(&mut chunks, self.min_chunk_chars);
        chunks
    }
}

struct MarkdownSection {
    title: Option<String>,
    content: String,
    offset: usize,
}

fn split_by_headings(markdown: &str) -> Vec<MarkdownSection> {
    let mut sections = Vec::new();
    let mut current_title: Option<String> = None;
    let mut current_content = String::new();
    let mut current_offset = 0;
    let mut char_pos = 0;

    for line in markdown.lines() {
        if line.starts_with("## ") || line.starts_with("### ") {
            if !current_content.trim().is_empty() {
                sections.push(MarkdownSection {
                    title: current_title.take(),
                    content: current_content.trim().to_string(),
                    offset: current_offset,
                });
            }
            current_title = Some(line.trim_start_matches('#').trim().to_string());
            current_content = String::new();
            current_offset = char_pos;
        } else {
            current_content.push_str(line);
            current_content.push('\n');
        }
        char_pos += line.len() + 1;
    }

    if !current_content.trim().is_empty() {
        sections.push(MarkdownSection {
            title: current_title,
            content: current_content.trim().to_string(),
            offset: current_offset,
        });
    }

    sections
}

fn split_section_by_paragraphs(
    content: &str,
    title: &Option<String>,
    base_offset: usize,
    max_chars: usize,
    overlap: usize,
    chunk_index: &mut usize,
) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    let paragraphs: Vec<&str> = content.split("\n\n").collect();

    let mut current = String::new();
    let mut char_offset = base_offset;

    for para in &paragraphs {
        if current.len() + para.len() > max_chars && !current.is_empty() {
            chunks.push(TextChunk {
                content: current.clone(),
                chunk_index: *chunk_index,
                section_title: title.clone(),
                char_offset,
            });
            *chunk_index += 1;

            if current.len() > overlap {
                let overlap_start = current.len() - overlap;
                current = current[overlap_start..].to_string();
                char_offset += overlap_start;
            } else {
                current.clear();
            }
        }

        // If a single paragraph exceeds max_chars, split by sentence boundaries
        if para.len() > max_chars {
            let sub_chunks = split_long_paragraph(para, title, char_offset, max_chars, overlap, chunk_index);
            chunks.extend(sub_chunks);
            char_offset += para.len();
            current.clear();
        } else {
            current.push_str(para);
            current.push_str("\n\n");
        }
    }

    if !current.trim().is_empty() {
        chunks.push(TextChunk {
            content: current.trim().to_string(),
            chunk_index: *chunk_index,
            section_title: title.clone(),
            char_offset,
        });
        *chunk_index += 1;
    }

    chunks
}

fn split_long_paragraph(
    para: &str,
    title: &Option<String>,
    base_offset: usize,
    max_chars: usize,
    overlap: usize,
    chunk_index: &mut usize,
) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < para.len() {
        let end = (start + max_chars).min(para.len());

        // Try to break at a sentence boundary (". ") within the last 20% of the chunk
        let break_at = if end < para.len() {
            let search_start = start + (max_chars * 4 / 5);
            para[search_start..end]
                .rfind(". ")
                .map(|pos| search_start + pos + 2)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(TextChunk {
            content: para[start..break_at].trim().to_string(),
            chunk_index: *chunk_index,
            section_title: title.clone(),
            char_offset: base_offset + start,
        });
        *chunk_index += 1;

        if break_at >= para.len() {
            break;
        }

        start = if break_at > overlap {
            break_at - overlap
        } else {
            break_at
        };
    }

    chunks
}

fn merge_tiny_chunks(chunks: &mut Vec<TextChunk>, min_chars: usize) {
    let mut i = 0;
    while i < chunks.len() {
        if chunks[i].content.len() < min_chars && i + 1 < chunks.len() {
            let next = chunks.remove(i + 1);
            chunks[i].content.push_str("\n\n");
            chunks[i].content.push_str(&next.content);
        } else {
            i += 1;
        }
    }
}
