use crate::config::RagConfig;

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub min_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 1_000,
            overlap_chars: 200,
            min_chars: 10,
        }
    }
}

impl From<&RagConfig> for ChunkingConfig {
    fn from(config: &RagConfig) -> Self {
        Self {
            max_chars: config.chunk_max_chars.max(1),
            overlap_chars: config.chunk_overlap_chars,
            min_chars: 10,
        }
    }
}

/// Collapses horizontal whitespace per line while keeping paragraph
/// breaks, so the splitter can still see them.
pub fn normalize_text(text: &str) -> String {
    let mut paragraphs = Vec::new();

    for block in text.replace("\r\n", "\n").split("\n\n") {
        let lines: Vec<String> = block
            .lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|line| !line.is_empty())
            .collect();

        if !lines.is_empty() {
            paragraphs.push(lines.join("\n"));
        }
    }

    paragraphs.join("\n\n")
}

/// Splits text into overlapping chunks, preferring paragraph boundaries,
/// then sentence boundaries, hard-cutting only runs that fit neither.
pub fn split_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    let normalized = normalize_text(text);
    if normalized.is_empty() {
        return Vec::new();
    }

    let mut segments = Vec::new();
    for paragraph in normalized.split("\n\n") {
        if paragraph.chars().count() <= config.max_chars {
            segments.push(paragraph.to_string());
            continue;
        }

        for sentence in split_sentences(paragraph) {
            if sentence.chars().count() <= config.max_chars {
                segments.push(sentence);
            } else {
                segments.extend(hard_cut(&sentence, config));
            }
        }
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for segment in segments {
        if current.is_empty() {
            current = segment;
            continue;
        }

        if current.chars().count() + segment.chars().count() + 2 <= config.max_chars {
            current.push_str("\n\n");
            current.push_str(&segment);
        } else {
            chunks.push(current);
            current = segment;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks.retain(|chunk| chunk.trim().chars().count() >= config.min_chars);
    if chunks.is_empty() {
        return vec![normalized];
    }

    apply_overlap(chunks, config.overlap_chars)
}

/// Prepends each chunk with the tail of its predecessor so neighboring
/// chunks share context across the boundary.
fn apply_overlap(chunks: Vec<String>, overlap_chars: usize) -> Vec<String> {
    if overlap_chars == 0 || chunks.len() < 2 {
        return chunks;
    }

    let mut result = Vec::with_capacity(chunks.len());
    let mut previous_tail: Option<String> = None;

    for chunk in chunks {
        let tail = char_tail(&chunk, overlap_chars);
        match previous_tail.take() {
            Some(prefix) => result.push(format!("{prefix}\n{chunk}")),
            None => result.push(chunk),
        }
        previous_tail = Some(tail);
    }

    result
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }

    sentences
}

fn hard_cut(text: &str, config: ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let stride = config
        .max_chars
        .saturating_sub(config.overlap_chars)
        .max(1);

    let mut pieces = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + config.max_chars).min(chars.len());
        pieces.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += stride;
    }

    pieces
}

fn char_tail(text: &str, tail_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let start = chars.len().saturating_sub(tail_chars);
    chars[start..].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_keeps_paragraph_breaks() {
        let input = "First  line\twith   spacing\n\n\nSecond   paragraph";
        let normalized = normalize_text(input);
        assert_eq!(normalized, "First line with spacing\n\nSecond paragraph");
    }

    #[test]
    fn short_text_stays_whole() {
        let config = ChunkingConfig::default();
        let chunks = split_text("One small paragraph about invoices.", config);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn paragraphs_pack_without_splitting_mid_paragraph() {
        let config = ChunkingConfig {
            max_chars: 80,
            overlap_chars: 0,
            min_chars: 5,
        };
        let text = "Alpha paragraph sits here.\n\nBeta paragraph sits here.\n\nGamma paragraph sits here.";
        let chunks = split_text(text, config);

        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 80);
        }
    }

    #[test]
    fn consecutive_chunks_share_an_overlap_tail() {
        let config = ChunkingConfig {
            max_chars: 60,
            overlap_chars: 20,
            min_chars: 5,
        };
        let text = "First sentence of the report goes here.\n\nSecond sentence of the report goes here.\n\nThird sentence of the report goes here.";
        let chunks = split_text(text, config);

        assert!(chunks.len() >= 2);
        let tail: String = chunks[0]
            .chars()
            .rev()
            .take(20)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        assert!(chunks[1].starts_with(&tail));
    }

    #[test]
    fn unbroken_runs_are_hard_cut() {
        let config = ChunkingConfig {
            max_chars: 50,
            overlap_chars: 10,
            min_chars: 5,
        };
        let text = "x".repeat(200);
        let chunks = split_text(&text, config);

        assert!(chunks.len() > 1);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split_text("   \n\n  ", ChunkingConfig::default()).is_empty());
    }
}
