//! Paragraph packing.
//!
//! 1. Split at blank lines (natural paragraph boundaries)
//! 2. Merge paragraphs up to the character budget
//! 3. Cut an oversized paragraph at the last whitespace in the back half of
//!    the window, or at a char boundary, carrying `overlap` characters over

/// Pack `text` into pieces of at most `max_chars` characters.
/// `max_chars` must be at least 1 and `overlap` at most `max_chars / 2`.
pub(crate) fn pack_paragraphs(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for para in split_at_blank_lines(text) {
        let para_chars = para.chars().count();

        if para_chars > max_chars {
            flush(&mut chunks, &mut current, &mut current_chars);
            split_large_paragraph(&para, max_chars, overlap, &mut chunks);
        } else if current_chars > 0 && current_chars + 2 + para_chars > max_chars {
            flush(&mut chunks, &mut current, &mut current_chars);
            current = para;
            current_chars = para_chars;
        } else {
            if current_chars > 0 {
                current.push_str("\n\n");
                current_chars += 2;
            }
            current.push_str(&para);
            current_chars += para_chars;
        }
    }

    flush(&mut chunks, &mut current, &mut current_chars);
    chunks
}

fn flush(chunks: &mut Vec<String>, current: &mut String, current_chars: &mut usize) {
    if *current_chars > 0 {
        chunks.push(std::mem::take(current));
        *current_chars = 0;
    }
}

fn split_at_blank_lines(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !lines.is_empty() {
                paragraphs.push(lines.join("\n").trim().to_string());
                lines.clear();
            }
        } else {
            lines.push(line);
        }
    }

    if !lines.is_empty() {
        paragraphs.push(lines.join("\n").trim().to_string());
    }

    paragraphs
}

fn split_large_paragraph(para: &str, max_chars: usize, overlap: usize, chunks: &mut Vec<String>) {
    let chars: Vec<char> = para.chars().collect();
    let mut start = 0usize;

    while start < chars.len() {
        let hard_end = (start + max_chars).min(chars.len());
        let end = if hard_end == chars.len() {
            hard_end
        } else {
            let floor = (start + max_chars / 2).max(start + 1);
            (floor..hard_end)
                .rev()
                .find(|&i| chars[i].is_whitespace())
                .unwrap_or(hard_end)
        };

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        if end == chars.len() {
            break;
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }
}
