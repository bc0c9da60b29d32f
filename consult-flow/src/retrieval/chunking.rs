/// Splits text into chunks of at most `max_chars` characters.
///
/// Paragraphs (blank-line separated) are packed greedily; a paragraph longer than the limit is
/// cut on character boundaries. Whitespace-only input yields no chunks.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let paragraph_len = paragraph.chars().count();

        if paragraph_len > max_chars {
            flush(&mut current, &mut chunks);
            let chars: Vec<char> = paragraph.chars().collect();
            for piece in chars.chunks(max_chars) {
                let piece: String = piece.iter().collect();
                let piece = piece.trim();
                if !piece.is_empty() {
                    chunks.push(piece.to_string());
                }
            }
            continue;
        }

        let current_len = current.chars().count();
        let joined_len = if current.is_empty() {
            paragraph_len
        } else {
            current_len + 2 + paragraph_len
        };
        if joined_len > max_chars {
            flush(&mut current, &mut chunks);
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }

    flush(&mut current, &mut chunks);
    chunks
}

fn flush(current: &mut String, chunks: &mut Vec<String>) {
    if !current.is_empty() {
        chunks.push(std::mem::take(current));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_yields_nothing() {
        assert!(chunk_text("  \n\n \t ", 500).is_empty());
    }

    #[test]
    fn test_short_paragraphs_are_packed() {
        let chunks = chunk_text("alpha\n\nbeta\n\ngamma", 12);
        assert_eq!(chunks, vec!["alpha\n\nbeta", "gamma"]);
    }

    #[test]
    fn test_long_paragraph_is_split_on_char_boundaries() {
        let text = "胃".repeat(7);
        let chunks = chunk_text(&text, 3);
        assert_eq!(chunks, vec!["胃胃胃", "胃胃胃", "胃"]);
    }

    #[test]
    fn test_every_chunk_respects_limit() {
        let text = "word ".repeat(300);
        for chunk in chunk_text(&text, 100) {
            assert!(chunk.chars().count() <= 100);
        }
    }
}
