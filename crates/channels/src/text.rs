//! Chunking of long text for notifiers with a per-message size limit.

/// Discord's per-message limit, used by the webhook notifier.
pub const DEFAULT_CHUNK_LIMIT: usize = 2000;

/// Split `text` into chunks of at most `limit` characters.
///
/// Each chunk ends at the last newline inside its window when there is one;
/// that newline is consumed rather than starting the next chunk. Empty or
/// whitespace-only pieces are dropped.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let window_end = rest
            .char_indices()
            .nth(limit)
            .map_or(rest.len(), |(idx, _)| idx);
        if window_end == rest.len() {
            push_chunk(&mut chunks, rest);
            break;
        }

        let cut = match rest[..window_end].rfind('\n') {
            Some(idx) if idx > 0 => idx,
            _ => window_end,
        };
        push_chunk(&mut chunks, &rest[..cut]);
        rest = &rest[cut..];
        rest = rest.strip_prefix('\n').unwrap_or(rest);
    }

    chunks
}

// Blank runs between paragraphs would otherwise become chunks of their own.
fn push_chunk(chunks: &mut Vec<String>, chunk: &str) {
    if !chunk.trim().is_empty() {
        chunks.push(chunk.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_message("hello", 2000), vec!["hello"]);
        assert!(split_message("", 2000).is_empty());
    }

    #[test]
    fn splits_at_last_newline_in_window() {
        let chunks = split_message("first line\nsecond line\nthird", 15);
        assert_eq!(chunks, vec!["first line", "second line", "third"]);
    }

    #[test]
    fn hard_cut_without_newline() {
        let text = "a".repeat(4500);
        let chunks = split_message(&text, 2000);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 2000);
        assert_eq!(chunks[2].len(), 500);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let text = "é".repeat(5);
        let chunks = split_message(&text, 2);
        assert_eq!(chunks, vec!["éé", "éé", "é"]);
    }

    #[test]
    fn never_emits_empty_chunks() {
        let chunks = split_message("abc\n\n\ndef\n", 4);
        assert!(chunks.iter().all(|c| !c.trim().is_empty()));
        assert!(chunks.iter().all(|c| c.chars().count() <= 4));
        assert_eq!(chunks.concat().replace('\n', ""), "abcdef");
    }
}
