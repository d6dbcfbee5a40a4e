/// English indefinite-article rules ("a" vs "an").

const VOWELS: [char; 12] = ['a', 'e', 'i', 'o', 'u', 'A', 'E', 'I', 'O', 'U', 'é', 'É'];

/// Vowel-initial prefixes pronounced with a consonant sound.
const CONSONANT_PREFIXES: [&str; 10] = [
    "uni", "use", "uri", "urol", "U.", "one", "uvu", "eul", "euk", "eur",
];

/// Consonant-initial prefixes pronounced with a vowel sound.
const VOWEL_PREFIXES: [&str; 4] = ["honest", "honor", "hour", "8"];

const CONSONANT_WORDS: [&str; 1] = ["u"];

/// Letters and initialisms read with a leading vowel sound.
const VOWEL_WORDS: [&str; 10] = ["f", "fbi", "fcc", "fda", "x", "l", "m", "n", "s", "h"];

fn starts_with_ignore_case(word: &str, prefix: &str) -> bool {
    word.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Whether `word` takes "an".
pub fn takes_an(word: &str) -> bool {
    let Some(first) = word.chars().next() else {
        return false;
    };
    if VOWEL_WORDS.iter().any(|w| w.eq_ignore_ascii_case(word))
        || VOWEL_PREFIXES
            .iter()
            .any(|p| starts_with_ignore_case(word, p))
    {
        return true;
    }
    VOWELS.contains(&first)
        && !CONSONANT_PREFIXES
            .iter()
            .any(|p| starts_with_ignore_case(word, p))
        && !CONSONANT_WORDS.iter().any(|w| w.eq_ignore_ascii_case(word))
}

/// The article to print before `word`.
pub fn article_for(word: &str) -> &'static str {
    if takes_an(word) {
        "an"
    } else {
        "a"
    }
}
