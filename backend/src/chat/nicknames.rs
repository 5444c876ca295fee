//! Process-wide nickname dictionary: colloquial Arabic and English names of
//! heavily traded companies, plus a popularity prior per symbol.

use super::normalizer::normalize;
use once_cell::sync::Lazy;
use std::collections::HashMap;

const ENGLISH: &[(&str, &str)] = &[
    ("cib", "COMI"),
    ("commercial international", "COMI"),
    ("swedy", "SWDY"),
    ("sewedy", "SWDY"),
    ("elsewedy", "SWDY"),
    ("tmg", "TMGH"),
    ("talaat moustafa", "TMGH"),
    ("talaat mostafa", "TMGH"),
    ("fawry", "FWRY"),
    ("telecom egypt", "ETEL"),
    ("efg", "HRHO"),
    ("hermes", "HRHO"),
    ("abu qir", "ABUK"),
    ("eastern company", "EAST"),
    ("orascom", "ORAS"),
    ("palm hills", "PHDC"),
    ("aramco", "2222"),
    ("saudi aramco", "2222"),
    ("rajhi", "1120"),
    ("al rajhi", "1120"),
    ("alrajhi", "1120"),
    ("sabic", "2010"),
];

const ARABIC: &[(&str, &str)] = &[
    ("التجاري الدولي", "COMI"),
    ("البنك التجاري", "COMI"),
    ("سي اي بي", "COMI"),
    ("السويدي", "SWDY"),
    ("سويدي", "SWDY"),
    ("طلعت مصطفى", "TMGH"),
    ("طلعت", "TMGH"),
    ("فوري", "FWRY"),
    ("المصرية للاتصالات", "ETEL"),
    ("وي", "ETEL"),
    ("هيرميس", "HRHO"),
    ("هيرمس", "HRHO"),
    ("أبوقير", "ABUK"),
    ("ابو قير", "ABUK"),
    ("الشرقية للدخان", "EAST"),
    ("أوراسكوم", "ORAS"),
    ("بالم هيلز", "PHDC"),
    ("أرامكو", "2222"),
    ("ارامكو", "2222"),
    ("الراجحي", "1120"),
    ("مصرف الراجحي", "1120"),
    ("سابك", "2010"),
];

const POPULARITY: &[(&str, f64)] = &[
    ("COMI", 95.0),
    ("2222", 95.0),
    ("1120", 90.0),
    ("SWDY", 85.0),
    ("TMGH", 85.0),
    ("FWRY", 80.0),
    ("2010", 80.0),
    ("ETEL", 75.0),
    ("HRHO", 75.0),
    ("ABUK", 70.0),
    ("EAST", 65.0),
    ("ORAS", 65.0),
    ("PHDC", 60.0),
];

/// Popularity assumed for symbols the dictionary does not rank.
pub const DEFAULT_POPULARITY: f64 = 40.0;

pub struct NicknameDictionary {
    arabic: HashMap<String, &'static str>,
    english: HashMap<String, &'static str>,
    popularity: HashMap<&'static str, f64>,
    /// Arabic keys longest first, for substring scans.
    arabic_by_length: Vec<(String, &'static str)>,
}

pub static NICKNAMES: Lazy<NicknameDictionary> = Lazy::new(NicknameDictionary::load);

impl NicknameDictionary {
    fn load() -> Self {
        let arabic: HashMap<String, &'static str> =
            ARABIC.iter().map(|(k, v)| (normalize(k), *v)).collect();
        let english = ENGLISH.iter().map(|(k, v)| (k.to_lowercase(), *v)).collect();
        let mut arabic_by_length: Vec<(String, &'static str)> =
            arabic.iter().map(|(k, v)| (k.clone(), *v)).collect();
        arabic_by_length.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()).then(a.0.cmp(&b.0)));

        Self {
            arabic,
            english,
            popularity: POPULARITY.iter().copied().collect(),
            arabic_by_length,
        }
    }

    /// Exact lookup on the English-lowercased or Arabic-normalized probe.
    pub fn lookup(&self, probe: &str) -> Option<&'static str> {
        let probe = probe.trim();
        self.english
            .get(&probe.to_lowercase())
            .or_else(|| self.arabic.get(&normalize(probe)))
            .copied()
    }

    pub fn popularity(&self, symbol: &str) -> Option<f64> {
        self.popularity.get(symbol).copied()
    }

    /// Longest curated Arabic name appearing as whole words in normalized
    /// text. Single-letter-pair names only match the whole message.
    pub fn find_arabic_name(&self, normalized: &str) -> Option<(&str, &'static str)> {
        let haystack = format!(" {} ", normalized);
        self.arabic_by_length
            .iter()
            .filter(|(name, _)| name.chars().count() > 2 || normalized == name)
            .find(|(name, _)| haystack.contains(&format!(" {} ", name)))
            .map(|(name, symbol)| (name.as_str(), *symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_and_arabic_keys_resolve() {
        assert_eq!(NICKNAMES.lookup("CIB"), Some("COMI"));
        assert_eq!(NICKNAMES.lookup("السويدي"), Some("SWDY"));
        assert_eq!(NICKNAMES.lookup("أرامكو"), Some("2222"));
        assert_eq!(NICKNAMES.lookup("ارامكو"), Some("2222"));
        assert_eq!(NICKNAMES.lookup("unknown co"), None);
    }

    #[test]
    fn finds_longest_arabic_name_in_sentence() {
        let text = normalize("كام سعر طلعت مصطفى النهارده");
        assert_eq!(NICKNAMES.find_arabic_name(&text).map(|(_, s)| s), Some("TMGH"));
        assert_eq!(NICKNAMES.find_arabic_name("سعر الذهب"), None);
    }

    #[test]
    fn popularity_prior() {
        assert_eq!(NICKNAMES.popularity("COMI"), Some(95.0));
        assert_eq!(NICKNAMES.popularity("ZZZZ"), None);
    }
}
