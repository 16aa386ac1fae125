//! Text transforms applied by the optimizer
//!
//! Each transform is pure and order-independent of the others; the pipeline
//! in `optimizer.rs` decides which run and in what order.

/// Verbose phrases replaced by terse equivalents before sentence dedup
const REDUNDANT_PHRASES: &[(&str, &str)] = &[
    ("in order to", "to"),
    ("due to the fact that", "because"),
    ("at this point in time", "now"),
    ("in the event that", "if"),
    ("it is important to note that ", ""),
    ("please note that ", ""),
    ("as a matter of fact, ", ""),
];

/// Fixed abbreviation dictionary (lossy, moderate quality cost)
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("approximately", "approx."),
    ("documentation", "docs"),
    ("information", "info"),
    ("for example", "e.g."),
    ("that is to say", "i.e."),
    ("management", "mgmt"),
    ("development", "dev"),
    ("experience", "exp."),
    ("requirements", "reqs"),
    ("qualifications", "quals"),
];

/// Words droppable without changing meaning much
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "of", "to", "in", "on", "at", "for", "with", "that", "this", "is", "are",
    "was", "were", "be", "been", "very", "really", "just", "quite", "rather", "simply",
];

/// Collapse whitespace runs to single spaces and trim the ends
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replace verbose phrases and drop duplicate sentences, keeping the first
/// occurrence of each
#[must_use]
pub fn eliminate_redundancy(text: &str) -> String {
    let mut out = text.to_string();
    for (phrase, replacement) in REDUNDANT_PHRASES {
        out = replace_case_insensitive(&out, phrase, replacement);
    }

    let mut seen = std::collections::HashSet::new();
    let mut kept = Vec::new();
    for sentence in split_sentences(&out) {
        let key = sentence.trim().to_lowercase();
        if key.is_empty() {
            continue;
        }
        if seen.insert(key) {
            kept.push(sentence.trim().to_string());
        }
    }
    kept.join(" ")
}

/// Apply the fixed abbreviation dictionary
#[must_use]
pub fn abbreviate(text: &str) -> String {
    let mut out = text.to_string();
    for (long, short) in ABBREVIATIONS {
        out = replace_case_insensitive(&out, long, short);
    }
    out
}

/// Drop stop words, preserving sentence-initial words and anything inside
/// double quotes
#[must_use]
pub fn remove_stop_words(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut in_quote = false;
    let mut sentence_start = true;

    for word in text.split_whitespace() {
        let quote_marks = word.matches('"').count();
        let bare: String = word
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '\'')
            .collect();
        let is_stop = STOP_WORDS.contains(&bare.to_lowercase().as_str());

        let keep = in_quote || quote_marks > 0 || sentence_start || !is_stop;
        if keep {
            out.push(word.to_string());
        }

        if quote_marks % 2 == 1 {
            in_quote = !in_quote;
        }
        sentence_start = word.ends_with(['.', '!', '?']);
    }

    out.join(" ")
}

/// Split into sentences on terminal punctuation, punctuation retained
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            sentences.push(std::mem::take(&mut current));
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current);
    }
    sentences
}

/// Case-insensitive substring replacement
///
/// Matches char by char rather than through byte offsets into a lowercased
/// copy; lowercasing can change byte lengths (U+1E9E becomes U+00DF), so
/// offsets from the copy are not valid in the original.
fn replace_case_insensitive(text: &str, from: &str, to: &str) -> String {
    let pattern: Vec<char> = from.chars().flat_map(char::to_lowercase).collect();
    if pattern.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        if let Some(len) = match_len_at(rest, &pattern) {
            out.push_str(to);
            rest = &rest[len..];
        } else {
            out.push(c);
            rest = &rest[c.len_utf8()..];
        }
    }
    out
}

/// Byte length of a case-insensitive match of `pattern` at the start of
/// `text`, if one begins there
fn match_len_at(text: &str, pattern: &[char]) -> Option<usize> {
    let mut needle = pattern.iter().copied();
    let mut expected = needle.next();
    for (idx, c) in text.char_indices() {
        for lowered in c.to_lowercase() {
            match expected {
                Some(want) if want == lowered => expected = needle.next(),
                _ => return None,
            }
        }
        if expected.is_none() {
            return Some(idx + c.len_utf8());
        }
    }
    None
}
