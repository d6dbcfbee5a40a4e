/// Writing-system settings, capitalization modes and number formatting.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Capitalization applied by an output buffer to incoming text.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Capitalization {
    #[default]
    None,
    Upper,
    Lower,
    /// Capitalize the next letter printed, then revert to `None`.
    First,
    Title,
    Sentence,
    Word,
}

/// How numbers printed through a buffer are rendered.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum NumberFormat {
    #[default]
    Normal,
    #[strum(serialize = "group", serialize = "group-commas")]
    GroupCommas,
    GroupDots,
    #[strum(serialize = "roman", serialize = "roman-upper")]
    Roman,
    RomanLower,
    #[strum(serialize = "verbal", serialize = "verbal-en")]
    Verbal,
    #[strum(serialize = "hex", serialize = "hex-upper")]
    Hex,
    HexLower,
    Binary,
}

/// Writing-system settings threaded through every formatting call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Format {
    /// Text printed by the `\s` escape and between series items.
    pub space: String,
    /// Letters drawn by the random-letter escapes.
    pub alphabet: String,
    pub open_quote: String,
    pub close_quote: String,
    pub open_nested_quote: String,
    pub close_nested_quote: String,
    /// Words left lowercase by title case, unless first.
    pub title_excluded: Vec<String>,
}

impl Default for Format {
    fn default() -> Self {
        Self {
            space: " ".to_string(),
            alphabet: "abcdefghijklmnopqrstuvwxyz".to_string(),
            open_quote: "\u{201C}".to_string(),
            close_quote: "\u{201D}".to_string(),
            open_nested_quote: "\u{2018}".to_string(),
            close_nested_quote: "\u{2019}".to_string(),
            title_excluded: [
                "a", "an", "the", "that", "where", "when", "for", "any", "or", "and", "of",
                "in", "at", "as", "into", "if", "are", "you", "why", "from", "with", "these",
                "those", "to",
            ]
            .iter()
            .map(|w| w.to_string())
            .collect(),
        }
    }
}

impl Format {
    /// Whether `word` stays lowercase in title case.
    pub fn excludes_from_title(&self, word: &str) -> bool {
        self.title_excluded
            .iter()
            .any(|w| w.eq_ignore_ascii_case(word))
    }

    /// Opening quotation mark for the given nesting level (0 = outermost).
    pub fn open_quote_for(&self, level: usize) -> &str {
        if level % 2 == 0 {
            &self.open_quote
        } else {
            &self.open_nested_quote
        }
    }

    pub fn close_quote_for(&self, level: usize) -> &str {
        if level % 2 == 0 {
            &self.close_quote
        } else {
            &self.close_nested_quote
        }
    }
}

/// Renders `number` in the requested format.
pub fn format_number(number: f64, format: NumberFormat) -> String {
    let integral = number.fract() == 0.0 && number.is_finite();
    match format {
        NumberFormat::Normal => number.to_string(),
        NumberFormat::GroupCommas => group_digits(number, ','),
        NumberFormat::GroupDots => group_digits(number, '.'),
        NumberFormat::Roman | NumberFormat::RomanLower => {
            let roman = if integral { to_roman(number as i64) } else { None };
            match roman {
                Some(r) if format == NumberFormat::RomanLower => r.to_lowercase(),
                Some(r) => r,
                None => number.to_string(),
            }
        }
        NumberFormat::Verbal => {
            if integral {
                to_verbal(number as i64)
            } else {
                "?".to_string()
            }
        }
        NumberFormat::Hex => format!("{:X}", number as i64),
        NumberFormat::HexLower => format!("{:x}", number as i64),
        NumberFormat::Binary => format!("{:b}", number as i64),
    }
}

fn group_digits(number: f64, separator: char) -> String {
    let rounded = number.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if rounded < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(separator);
        }
        out.push(c);
    }
    out
}

/// Roman numeral for `1..=3999`.
pub fn to_roman(mut number: i64) -> Option<String> {
    const TABLE: [(i64, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    if !(1..=3999).contains(&number) {
        return None;
    }
    let mut out = String::new();
    for &(value, glyph) in &TABLE {
        while number >= value {
            out.push_str(glyph);
            number -= value;
        }
    }
    Some(out)
}

const ONES: [&str; 20] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen",
];
const TENS: [&str; 10] = [
    "", "ten", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];
const POWERS: [&str; 6] = [
    "thousand",
    "million",
    "billion",
    "trillion",
    "quadrillion",
    "quintillion",
];

fn below_hundred(n: usize) -> String {
    if n < 20 {
        ONES[n].to_string()
    } else if n % 10 == 0 {
        TENS[n / 10].to_string()
    } else {
        format!("{}-{}", TENS[n / 10], ONES[n % 10])
    }
}

fn below_thousand(n: usize) -> String {
    if n < 100 {
        return below_hundred(n);
    }
    let rest = n % 100;
    if rest == 0 {
        format!("{} hundred", ONES[n / 100])
    } else {
        format!("{} hundred and {}", ONES[n / 100], below_hundred(rest))
    }
}

/// English words for an integer, British style ("one hundred and five").
pub fn to_verbal(number: i64) -> String {
    if number == 0 {
        return ONES[0].to_string();
    }
    let mut magnitude = number.unsigned_abs();
    let mut groups = Vec::new();
    while magnitude > 0 {
        groups.push((magnitude % 1000) as usize);
        magnitude /= 1000;
    }

    let mut words: Vec<String> = Vec::new();
    if number < 0 {
        words.push("negative".to_string());
    }
    let top = groups.len() - 1;
    for (power, &group) in groups.iter().enumerate().rev() {
        if group == 0 {
            continue;
        }
        if power > 0 {
            words.push(format!("{} {}", below_thousand(group), POWERS[power - 1]));
        } else if top > 0 && group < 100 {
            words.push(format!("and {}", below_hundred(group)));
        } else {
            words.push(below_thousand(group));
        }
    }
    words.join(" ")
}
