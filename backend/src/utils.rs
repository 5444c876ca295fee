use serde_json::{Map, Value};
use std::collections::HashSet;

/// Drops non-finite floats so they serialize as `null`.
pub fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Finite value rounded to two decimals, else `null`.
pub fn num(value: Option<f64>) -> Value {
    match finite(value) {
        Some(v) => Value::from(round_to(v, 2)),
        None => Value::Null,
    }
}

/// Replaces every non-finite number inside a JSON tree with `null`.
///
/// `serde_json` refuses NaN at construction time, but values built through
/// `Value::from(f64)` silently become `null`; this walks payloads assembled
/// from arbitrary JSONB columns and normalizes float-like strings too.
pub fn sanitize_json(value: Value) -> Value {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if !f.is_finite() => Value::Null,
            _ => Value::Number(n),
        },
        Value::String(s) if matches!(s.as_str(), "NaN" | "nan" | "Infinity" | "-Infinity" | "inf" | "-inf") => {
            Value::Null
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_json).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, sanitize_json(v)))
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}

/// Reads a numeric field from a JSONB row, tolerating numeric strings.
pub fn json_f64(map: &Map<String, Value>, key: &str) -> Option<f64> {
    match map.get(key)? {
        Value::Number(n) => finite(n.as_f64()),
        Value::String(s) => finite(s.trim().parse::<f64>().ok()),
        _ => None,
    }
}

pub fn pct_change(from: f64, to: f64) -> Option<f64> {
    if from == 0.0 || !from.is_finite() || !to.is_finite() {
        None
    } else {
        Some((to - from) / from.abs() * 100.0)
    }
}

pub fn l2_normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-12);
    for x in vector.iter_mut() {
        *x /= norm;
    }
    vector
}

/// Cosine similarity of two vectors; 0 when either is degenerate.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// Trigram set of a string the way pg_trgm builds it: each word padded with
/// two leading and one trailing space.
pub fn trigrams(text: &str) -> HashSet<String> {
    let mut set = HashSet::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let padded: Vec<char> = format!("  {} ", word.to_lowercase()).chars().collect();
        for window in padded.windows(3) {
            set.insert(window.iter().collect());
        }
    }
    set
}

/// pg_trgm `similarity()`: shared trigrams over the union.
pub fn trigram_similarity(a: &str, b: &str) -> f64 {
    let ta = trigrams(a);
    let tb = trigrams(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let shared = ta.intersection(&tb).count();
    let union = ta.len() + tb.len() - shared;
    shared as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finite_filters_nan_and_infinity() {
        assert_eq!(finite(Some(f64::NAN)), None);
        assert_eq!(finite(Some(f64::INFINITY)), None);
        assert_eq!(finite(Some(1.5)), Some(1.5));
        assert_eq!(num(Some(f64::NEG_INFINITY)), Value::Null);
        assert_eq!(num(Some(1.239)), json!(1.24));
    }

    #[test]
    fn sanitize_json_nulls_nan_strings() {
        let cleaned = sanitize_json(json!({"a": "NaN", "b": [1.0, "Infinity"], "c": "ok"}));
        assert_eq!(cleaned, json!({"a": null, "b": [1.0, null], "c": "ok"}));
    }

    #[test]
    fn trigram_similarity_matches_pg_trgm_shape() {
        assert!((trigram_similarity("fawry", "fawry") - 1.0).abs() < 1e-9);
        assert!(trigram_similarity("sewedy", "elsewedy") > 0.25);
        assert!(trigram_similarity("abc", "xyz") < 0.01);
    }

    #[test]
    fn cosine_of_parallel_vectors_is_one() {
        let a = l2_normalize(vec![1.0, 2.0, 2.0]);
        assert!((cosine_similarity(&a, &[2.0, 4.0, 4.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &[]), 0.0);
    }

    #[test]
    fn pct_change_guards_zero_base() {
        assert_eq!(pct_change(0.0, 5.0), None);
        assert_eq!(pct_change(10.0, 11.0).map(|v| round_to(v, 2)), Some(10.0));
    }
}
