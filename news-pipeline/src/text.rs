//! Small text helpers shared by the cleaner, adapter and question generator.

/// Split a paragraph into sentences, keeping the terminal punctuation.
/// A sentence ends at `.`, `!` or `?` followed by whitespace or end of text,
/// so decimals like `2.6` stay intact.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            // Swallow closing quotes/brackets that belong to this sentence.
            while let Some(&next) = chars.peek() {
                if matches!(next, '"' | '\'' | ')' | '\u{201d}' | '\u{2019}') {
                    current.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            if chars.peek().map_or(true, |n| n.is_whitespace()) {
                let sentence = current.trim();
                if !sentence.is_empty() {
                    sentences.push(sentence.to_string());
                }
                current.clear();
            }
        }
    }

    let tail = current.trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Collapse runs of whitespace and drop spaces in front of punctuation.
pub fn tidy(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut out = String::with_capacity(collapsed.len());
    let mut chars = collapsed.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ' ' && chars.peek().is_some_and(|n| matches!(n, ',' | '.' | ';' | ':' | '!' | '?')) {
            continue;
        }
        out.push(c);
    }
    out
}

pub fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Make sure a fragment ends like a sentence.
pub fn terminate(text: &str) -> String {
    let trimmed = text.trim_end_matches(|c: char| c == ',' || c == ';' || c == ':' || c.is_whitespace());
    if trimmed.ends_with(['.', '!', '?']) {
        trimmed.to_string()
    } else {
        format!("{}.", trimmed)
    }
}

pub fn is_stop_word(word: &str) -> bool {
    matches!(
        word,
        "the" | "and" | "or" | "but" | "in" | "on" | "at" | "to" | "for" | "of" | "with" | "by" |
        "a" | "an" | "is" | "are" | "was" | "were" | "be" | "been" | "have" | "has" | "had" |
        "do" | "does" | "did" | "will" | "would" | "could" | "should" | "may" | "might" | "must" |
        "can" | "this" | "that" | "these" | "those" | "it" | "its" | "from" | "as" | "they" | "their"
    )
}

/// Lowercased content words with punctuation stripped, in text order.
pub fn content_words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| w.len() > 2 && !is_stop_word(w))
        .collect()
}

/// Cut text to at most `max_chars`, preferring a sentence end, then a word break.
pub fn smart_truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let truncated: String = text.chars().take(max_chars).collect();
    if let Some(last_sentence) = truncated.rfind(['.', '!', '?']) {
        truncated[..last_sentence + 1].to_string()
    } else if let Some(last_space) = truncated.rfind(' ') {
        format!("{}...", &truncated[..last_space])
    } else {
        format!("{}...", truncated)
    }
}
