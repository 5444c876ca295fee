//! Script-aware text cleanup for Arabic and English chat input.

use super::schema::Language;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedText {
    pub raw: String,
    pub normalized: String,
    pub language: Language,
}

impl NormalizedText {
    pub fn new(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            normalized: normalize(raw),
            language: detect_language(raw),
        }
    }
}

fn is_tashkeel(c: char) -> bool {
    matches!(c, '\u{064B}'..='\u{065F}' | '\u{0670}')
}

fn is_arabic_letter(c: char) -> bool {
    matches!(c, '\u{0621}'..='\u{064A}' | '\u{0671}'..='\u{06D3}' | '\u{06FA}'..='\u{06FF}')
}

fn fold_char(c: char) -> char {
    match c {
        'أ' | 'إ' | 'آ' => 'ا',
        'ة' => 'ه',
        'ى' => 'ي',
        '٠'..='٩' => char::from(b'0' + (c as u32 - '٠' as u32) as u8),
        '۰'..='۹' => char::from(b'0' + (c as u32 - '۰' as u32) as u8),
        _ => c,
    }
}

/// Strips tashkeel, unifies alef/taa-marbuta/yaa, maps Arabic-Indic digits
/// to ASCII, lowercases Latin and collapses whitespace.
///
/// Pure and idempotent: `normalize(normalize(s)) == normalize(s)`.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.chars() {
        if is_tashkeel(c) || c == '\u{0640}' {
            // tatweel is decorative, drop it with the marks
            continue;
        }
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        let folded = fold_char(c);
        if folded.is_ascii_uppercase() {
            out.push(folded.to_ascii_lowercase());
        } else if folded.is_uppercase() && !is_arabic_letter(folded) {
            out.extend(folded.to_lowercase());
        } else {
            out.push(folded);
        }
    }

    out
}

/// Arabic-letter share among all letters, `None` when there are no letters.
pub fn arabic_ratio(text: &str) -> Option<f64> {
    let (mut arabic, mut latin) = (0usize, 0usize);
    for c in text.chars() {
        if is_arabic_letter(c) {
            arabic += 1;
        } else if c.is_ascii_alphabetic() {
            latin += 1;
        }
    }
    let total = arabic + latin;
    if total == 0 {
        None
    } else {
        Some(arabic as f64 / total as f64)
    }
}

pub fn detect_language(text: &str) -> Language {
    match arabic_ratio(text) {
        None => Language::En,
        Some(ratio) if ratio >= 0.7 => Language::Ar,
        Some(ratio) if ratio <= 0.3 => Language::En,
        Some(_) => Language::Mixed,
    }
}

/// Ticker-shaped tokens in the original input: 4-digit runs (Tadawul) and
/// 3-5 letter uppercase runs (EGX). Deduplicated, first-seen order.
pub fn extract_symbol_tokens(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let chars: Vec<char> = text.chars().map(fold_char).collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_ascii_digit() || c.is_ascii_uppercase() {
            let digits = c.is_ascii_digit();
            let start = i;
            while i < chars.len()
                && (if digits { chars[i].is_ascii_digit() } else { chars[i].is_ascii_uppercase() })
            {
                i += 1;
            }
            let bounded_left = start == 0 || !chars[start - 1].is_ascii_alphanumeric();
            let bounded_right = i == chars.len() || !chars[i].is_ascii_alphanumeric();
            let run: String = chars[start..i].iter().collect();
            let len = run.len();
            let shaped = if digits { len == 4 } else { (3..=5).contains(&len) };
            if shaped && bounded_left && bounded_right && !tokens.contains(&run) {
                tokens.push(run);
            }
        } else {
            i += 1;
        }
    }

    tokens
}
