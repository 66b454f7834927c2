pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_OVERLAP_WORDS: usize = 20;

/// How documents are cut into fragments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Maximum fragment length in characters (before overlap is prepended)
    pub chunk_size: usize,
    /// Trailing words of a fragment repeated at the start of the next one
    pub overlap_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        ChunkingConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap_words: DEFAULT_OVERLAP_WORDS,
        }
    }
}

/// Represents a text chunk with metadata
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// The actual text content of this chunk
    pub text: String,
    /// Position of this chunk within its document, starting at 0
    pub index: usize,
    /// Estimated token count for this chunk
    pub token_count: usize,
}

/// Split text into fragments of roughly `chunk_size` characters.
///
/// Paragraphs (separated by blank lines) are packed greedily. When the next
/// paragraph does not fit, the current fragment is emitted and the new one
/// starts with the last `overlap_words` words of the previous fragment.
/// Paragraphs longer than `chunk_size` are first cut at sentence boundaries,
/// and run-on sentences at word boundaries.
pub fn split_into_fragments(text: &str, config: &ChunkingConfig) -> Vec<TextChunk> {
    let chunk_size = config.chunk_size.max(1);

    let pieces = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .flat_map(|p| split_oversized(p, chunk_size));

    let mut fragments: Vec<String> = Vec::new();
    let mut current = String::new();

    for piece in pieces {
        if !current.is_empty() && char_len(&current) + char_len(&piece) > chunk_size {
            let overlap = trailing_words(&current, config.overlap_words);
            fragments.push(std::mem::take(&mut current));

            if !overlap.is_empty() {
                current.push_str(&overlap);
                current.push(' ');
            }
            current.push_str(&piece);
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&piece);
        }
    }

    if !current.trim().is_empty() {
        fragments.push(current);
    }

    fragments
        .into_iter()
        .enumerate()
        .map(|(index, text)| TextChunk {
            token_count: estimate_token_count(&text),
            text,
            index,
        })
        .collect()
}

/// Cut a paragraph into pieces no longer than `max_chars`
fn split_oversized(paragraph: &str, max_chars: usize) -> Vec<String> {
    if char_len(paragraph) <= max_chars {
        return vec![paragraph.to_string()];
    }

    let mut pieces = Vec::new();
    let mut buffer = String::new();

    for sentence in split_sentences(paragraph) {
        let units = if char_len(sentence) > max_chars {
            split_words(sentence, max_chars)
        } else {
            vec![sentence.to_string()]
        };

        for unit in units {
            if !buffer.is_empty() && char_len(&buffer) + 1 + char_len(&unit) > max_chars {
                pieces.push(std::mem::take(&mut buffer));
            }
            if !buffer.is_empty() {
                buffer.push(' ');
            }
            buffer.push_str(&unit);
        }
    }

    if !buffer.is_empty() {
        pieces.push(buffer);
    }

    pieces
}

/// Sentences including their terminating punctuation
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?' | '\n') {
            let end = i + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }

    sentences
}

/// Pack words into pieces of at most `max_chars` (a single longer word is kept whole)
fn split_words(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut buffer = String::new();

    for word in text.split_whitespace() {
        if !buffer.is_empty() && char_len(&buffer) + 1 + char_len(word) > max_chars {
            pieces.push(std::mem::take(&mut buffer));
        }
        if !buffer.is_empty() {
            buffer.push(' ');
        }
        buffer.push_str(word);
    }

    if !buffer.is_empty() {
        pieces.push(buffer);
    }

    pieces
}

fn trailing_words(text: &str, count: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    words[words.len().saturating_sub(count)..].join(" ")
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Calculate approximate token count for a text
/// This is a very simple estimation - words plus punctuation
pub fn estimate_token_count(text: &str) -> usize {
    let words = text.split_whitespace().count();
    let punctuation = text.chars().filter(|c| c.is_ascii_punctuation()).count();
    words + punctuation
}
