//! Text normalization applied before a request becomes a correlation key.
//!
//! Synthesis backends read digits poorly, so the default normalizer spells
//! integers out as English words. The result is used verbatim as the
//! correlation key, which means normalization must be deterministic.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-?\d+").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

const ONES: [&str; 20] = [
    "zero",
    "one",
    "two",
    "three",
    "four",
    "five",
    "six",
    "seven",
    "eight",
    "nine",
    "ten",
    "eleven",
    "twelve",
    "thirteen",
    "fourteen",
    "fifteen",
    "sixteen",
    "seventeen",
    "eighteen",
    "nineteen",
];

const TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];

/// Scale words, largest first. `u64::MAX` is below one sextillion.
const SCALES: [(u64, &str); 6] = [
    (1_000_000_000_000_000_000, "quintillion"),
    (1_000_000_000_000_000, "quadrillion"),
    (1_000_000_000_000, "trillion"),
    (1_000_000_000, "billion"),
    (1_000_000, "million"),
    (1_000, "thousand"),
];

/// Rewrites request text before it is sent to the backend.
pub trait Normalizer: Send + Sync {
    fn normalize(&self, raw: &str) -> String;
}

/// Passes text through with only surrounding whitespace removed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Verbatim;

impl Normalizer for Verbatim {
    fn normalize(&self, raw: &str) -> String {
        raw.trim().to_string()
    }
}

/// Spells integers out as English words and collapses whitespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumberWords;

impl Normalizer for NumberWords {
    fn normalize(&self, raw: &str) -> String {
        let collapsed = WHITESPACE.replace_all(raw.trim(), " ");
        INTEGER
            .replace_all(&collapsed, |caps: &Captures| {
                let digits = &caps[0];
                // Out-of-range numbers stay as written
                digits
                    .parse::<i64>()
                    .map(integer_to_words)
                    .unwrap_or_else(|_| digits.to_string())
            })
            .into_owned()
    }
}

/// Spell an integer out in English, e.g. `-21` -> "minus twenty-one".
pub fn integer_to_words(value: i64) -> String {
    let words = unsigned_to_words(value.unsigned_abs());
    if value < 0 {
        format!("minus {}", words)
    } else {
        words
    }
}

fn unsigned_to_words(mut value: u64) -> String {
    if value == 0 {
        return ONES[0].to_string();
    }

    let mut parts = Vec::new();
    for (scale, name) in SCALES {
        if value >= scale {
            parts.push(format!("{} {}", below_thousand(value / scale), name));
            value %= scale;
        }
    }
    if value > 0 {
        parts.push(below_thousand(value));
    }
    parts.join(" ")
}

fn below_thousand(value: u64) -> String {
    debug_assert!(value < 1000);
    let hundreds = value / 100;
    let rest = value % 100;

    let mut words = Vec::new();
    if hundreds > 0 {
        words.push(format!("{} hundred", ONES[hundreds as usize]));
    }
    if rest > 0 {
        words.push(below_hundred(rest));
    }
    words.join(" ")
}

fn below_hundred(value: u64) -> String {
    if value < 20 {
        return ONES[value as usize].to_string();
    }
    let tens = TENS[(value / 10) as usize];
    match value % 10 {
        0 => tens.to_string(),
        ones => format!("{}-{}", tens, ONES[ones as usize]),
    }
}
