/// Separator hierarchy used to break oversized sections into target-sized
/// pieces: prefer paragraph breaks, then line breaks, then whitespace, and
/// finally fall back to character boundaries so long unbroken runs still
/// make progress.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Recursively split `text` into pieces of roughly `chunk_size` characters,
/// with `chunk_overlap` characters of overlap between adjacent pieces.
pub fn recursive_split(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    split_with_separators(text, &SEPARATORS, chunk_size, chunk_overlap)
}

fn split_with_separators(
    text: &str,
    separators: &[&str],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    if char_len(text) <= chunk_size {
        return if text.is_empty() {
            Vec::new()
        } else {
            vec![text.to_string()]
        };
    }

    let (sep, rest) = match separators.split_first() {
        Some((sep, rest)) => (*sep, rest),
        None => return hard_window_split(text, chunk_size, chunk_overlap),
    };

    let pieces: Vec<String> = if sep.is_empty() {
        text.chars().map(|c| c.to_string()).collect()
    } else {
        text.split(sep).map(|s| s.to_string()).collect()
    };

    // Any piece still too large gets recursively split with the remaining,
    // lower-priority separators before merging.
    let mut expanded: Vec<String> = Vec::new();
    for piece in pieces {
        if char_len(&piece) > chunk_size {
            expanded.extend(split_with_separators(&piece, rest, chunk_size, chunk_overlap));
        } else {
            expanded.push(piece);
        }
    }

    merge_splits(&expanded, sep, chunk_size, chunk_overlap)
}

/// Greedily merges small pieces back up to `chunk_size`, carrying
/// `chunk_overlap` characters of trailing context into the next merged
/// piece so adjacent chunks share context across the cut.
fn merge_splits(pieces: &[String], separator: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let mut docs = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0usize;
    let sep_len = char_len(separator);

    for piece in pieces {
        let piece_len = char_len(piece);
        let projected = current_len + piece_len + if current.is_empty() { 0 } else { sep_len };

        if projected > chunk_size && !current.is_empty() {
            docs.push(current.join(separator));
            // Drop from the front until the retained tail fits inside the
            // overlap budget, then keep going.
            while current_len > chunk_overlap && current.len() > 1 {
                let removed = current.remove(0);
                current_len = current_len.saturating_sub(char_len(&removed) + sep_len);
            }
            if current_len + piece_len > chunk_size && current.len() == 1 {
                // A single retained overlap piece still doesn't leave room;
                // drop it rather than grow unbounded.
                current.clear();
                current_len = 0;
            }
        }

        current_len += piece_len + if current.is_empty() { 0 } else { sep_len };
        current.push(piece.clone());
    }
    if !current.is_empty() {
        let joined = current.join(separator);
        if !joined.is_empty() {
            docs.push(joined);
        }
    }
    docs.retain(|d| !d.is_empty());
    docs
}

/// Last-resort splitter when no separator produces progress: cut by raw
/// character count. Always makes progress since `chunk_size >= 1`.
fn hard_window_split(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    let chunk_size = chunk_size.max(1);
    let step = chunk_size.saturating_sub(chunk_overlap).max(1);
    let mut out = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        out.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    out
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_not_split() {
        let pieces = recursive_split("hello world", 100, 10);
        assert_eq!(pieces, vec!["hello world".to_string()]);
    }

    #[test]
    fn empty_text_yields_no_pieces() {
        assert!(recursive_split("", 100, 10).is_empty());
    }

    #[test]
    fn splits_long_text_into_bounded_pieces() {
        let text = "word ".repeat(500);
        let pieces = recursive_split(&text, 100, 20);
        assert!(pieces.len() > 1);
        for p in &pieces {
            assert!(char_len(p) <= 120, "piece too long: {}", p.len());
        }
    }

    #[test]
    fn makes_progress_on_runs_without_whitespace() {
        let text = "x".repeat(1000);
        let pieces = recursive_split(&text, 100, 10);
        assert!(pieces.len() >= 10);
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let text = format!("{}\n\n{}", "a".repeat(50), "b".repeat(50));
        let pieces = recursive_split(&text, 60, 0);
        assert_eq!(pieces.len(), 2);
        assert!(pieces[0].chars().all(|c| c == 'a'));
        assert!(pieces[1].chars().all(|c| c == 'b'));
    }
}
