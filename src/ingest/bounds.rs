/// Text cut down to a character budget before it is placed in a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedText {
    text: String,
    truncated: bool,
}

impl BoundedText {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn was_truncated(&self) -> bool {
        self.truncated
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// The first `limit` sentence units of the bounded text.
    pub fn sentences(&self, limit: usize) -> Vec<String> {
        let mut sentences = split_sentences(&self.text);
        sentences.truncate(limit);
        sentences
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// Keeps at most `max_chars` characters of `text`. No word awareness.
pub fn bound_text(text: &str, max_chars: usize) -> BoundedText {
    let cut = text
        .char_indices()
        .nth(max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());

    BoundedText {
        text: text[..cut].to_string(),
        truncated: cut < text.len(),
    }
}

/// Splits after `.`, `!` or `?` when whitespace follows, dropping blank pieces.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        let Some(&(next_idx, next)) = chars.peek() else {
            break;
        };
        if next.is_whitespace() {
            push_trimmed(&mut sentences, &text[start..next_idx]);
            start = next_idx;
        }
    }

    push_trimmed(&mut sentences, &text[start..]);
    sentences
}

fn push_trimmed(sentences: &mut Vec<String>, fragment: &str) {
    let trimmed = fragment.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
}
