//! Tokenizer shared by indexing and querying (`spec.md` §4.9): lowercase,
//! split on non-alphanumeric boundaries, further split camelCase and
//! snake_case, strip a small built-in stopword list, and drop tokens
//! shorter than 2 characters.

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "of", "to", "in", "on", "is", "it", "this", "that", "for",
    "with", "as", "at", "by", "be", "are", "was", "were", "from", "but", "not", "if", "then",
];

/// Split a run of `[A-Za-z0-9]` characters on camelCase boundaries:
/// lowercase/digit → uppercase, and the last uppercase letter of an
/// acronym run before a trailing lowercase letter (`"HTTPServer"` →
/// `["HTTP", "Server"]`).
fn split_camel(word: &str) -> Vec<&str> {
    let bytes = word.as_bytes();
    if bytes.len() <= 1 {
        return vec![word];
    }
    let chars: Vec<char> = word.chars().collect();
    let mut boundaries = Vec::new();
    for i in 1..chars.len() {
        let prev = chars[i - 1];
        let cur = chars[i];
        let next = chars.get(i + 1);
        let lower_to_upper = (prev.is_lowercase() || prev.is_ascii_digit()) && cur.is_uppercase();
        let acronym_to_word = prev.is_uppercase() && cur.is_uppercase() && next.is_some_and(|n| n.is_lowercase());
        let alpha_digit_boundary = prev.is_ascii_digit() != cur.is_ascii_digit() && prev.is_alphanumeric() && cur.is_alphanumeric();
        if lower_to_upper || acronym_to_word || alpha_digit_boundary {
            boundaries.push(i);
        }
    }
    if boundaries.is_empty() {
        return vec![word];
    }
    let mut out = Vec::with_capacity(boundaries.len() + 1);
    let mut start = 0usize;
    let char_byte_offsets: Vec<usize> = {
        let mut offsets = Vec::with_capacity(chars.len() + 1);
        let mut acc = 0usize;
        for c in &chars {
            offsets.push(acc);
            acc += c.len_utf8();
        }
        offsets.push(acc);
        offsets
    };
    for b in boundaries {
        let byte_at = char_byte_offsets[b];
        out.push(&word[char_byte_offsets[start]..byte_at]);
        start = b;
    }
    out.push(&word[char_byte_offsets[start]..]);
    out
}

/// Tokenize free text into lowercase, stopword-free tokens of length >= 2.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for run in text.split(|c: char| !(c.is_alphanumeric() || c == '_')) {
        if run.is_empty() {
            continue;
        }
        for underscore_piece in run.split('_') {
            if underscore_piece.is_empty() {
                continue;
            }
            for piece in split_camel(underscore_piece) {
                if piece.is_empty() {
                    continue;
                }
                let lower = piece.to_lowercase();
                if lower.chars().count() < 2 {
                    continue;
                }
                if STOPWORDS.contains(&lower.as_str()) {
                    continue;
                }
                tokens.push(lower);
            }
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_camel_case() {
        assert_eq!(tokenize("useApi"), vec!["use", "api"]);
    }

    #[test]
    fn splits_acronym_camel_case() {
        assert_eq!(tokenize("HTTPServer"), vec!["http", "server"]);
    }

    #[test]
    fn splits_snake_case() {
        assert_eq!(tokenize("kafka_consumer_group"), vec!["kafka", "consumer", "group"]);
    }

    #[test]
    fn strips_stopwords_and_short_tokens() {
        assert_eq!(tokenize("a window for the SQL"), vec!["window", "sql"]);
    }

    #[test]
    fn splits_on_punctuation() {
        assert_eq!(tokenize("react-hook: useApi()"), vec!["react", "hook", "use", "api"]);
    }
}
