/// Capitalization helpers used by output buffers.

use crate::core::format::Format;

const WORD_SEPARATORS: [char; 10] = [' ', '\r', '\n', '\t', '\u{c}', '\u{b}', '\'', '"', '/', '-'];

pub fn is_word_separator(c: char) -> bool {
    c.is_whitespace() || WORD_SEPARATORS.contains(&c)
}

pub fn is_sentence_terminator(c: char) -> bool {
    matches!(c, '.' | '?' | '!')
}

/// Uppercases the first letter of `value`. Returns `None` if it has no letters.
pub fn capitalize_first(value: &str) -> Option<String> {
    let (i, c) = value.char_indices().find(|(_, c)| c.is_alphabetic())?;
    let mut out = String::with_capacity(value.len());
    out.push_str(&value[..i]);
    out.extend(c.to_uppercase());
    out.push_str(&value[i + c.len_utf8()..]);
    Some(out)
}

/// Uppercases the first letter following each sentence terminator.
pub fn capitalize_sentences(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending = false;
    for c in value.chars() {
        if pending && c.is_alphabetic() {
            out.extend(c.to_uppercase());
            pending = false;
        } else {
            if is_sentence_terminator(c) {
                pending = true;
            }
            out.push(c);
        }
    }
    out
}

/// Title-cases `value`, leaving excluded words lowercase unless the word is
/// the first one and `capitalize_first_word` is set.
pub fn title_case(value: &str, format: &Format, capitalize_first_word: bool) -> String {
    let mut out = String::with_capacity(value.len());
    let mut word = String::new();
    let mut first = true;

    let flush = |word: &mut String, out: &mut String, first: &mut bool| {
        if word.is_empty() {
            return;
        }
        if (*first && capitalize_first_word) || !format.excludes_from_title(word) {
            if let Some(capped) = capitalize_first(word) {
                *word = capped;
            }
        }
        *first = false;
        out.push_str(word);
        word.clear();
    };

    for c in value.chars() {
        if c.is_whitespace() {
            flush(&mut word, &mut out, &mut first);
            out.push(c);
        } else {
            word.push(c);
        }
    }
    flush(&mut word, &mut out, &mut first);
    out
}
