//! Free-text pattern matching
//!
//! The state machine never inspects message text itself; it asks this module.
//! Keeping the matchers behind a trait lets the phrase lists grow (more
//! affirmatives, other languages) without touching transition logic.

/// Pluggable matchers for the handful of phrases the pipeline reacts to.
pub trait MessagePatterns: Send + Sync {
    /// Pull a first name out of an intro message, if one is present.
    fn extract_introduced_name(&self, body: &str) -> Option<String>;

    /// Is this a YES-shaped confirmation reply?
    fn is_affirmative(&self, body: &str) -> bool;

    /// Is this a NO-shaped confirmation reply?
    fn is_negative(&self, body: &str) -> bool;

    /// Is the worker saying they have no receipt to photograph?
    fn is_missed_receipt_phrase(&self, body: &str) -> bool;
}

/// Default English phrase matching.
pub struct DefaultPatterns;

const AFFIRMATIVES: &[&str] = &[
    "YES", "Y", "YEP", "YEAH", "CORRECT", "LOOKS GOOD", "GOOD", "SI", "SÍ",
];

const NEGATIVES: &[&str] = &["NO", "N", "NOPE", "WRONG", "INCORRECT"];

/// Single words that look like names but aren't.
const NOT_NAMES: &[&str] = &[
    "hello", "hi", "hey", "yo", "sup", "help", "yes", "no", "yep", "nope", "ok", "okay", "thanks",
    "thank", "please", "stop", "start", "test", "receipt", "photo", "what", "who", "where", "when",
    "how", "why", "the", "and", "but",
];

/// Phrases introducing a name, e.g. "this is Omar".
const NAME_MARKERS: &[&str] = &["this is ", "my name is ", "i'm ", "im ", "i am "];

impl DefaultPatterns {
    /// Strip trailing punctuation and surrounding whitespace from a reply.
    fn normalized_reply(body: &str) -> String {
        body.trim()
            .trim_end_matches(['.', '!', '?'])
            .trim()
            .to_uppercase()
    }

    fn looks_like_name(word: &str) -> bool {
        let len = word.chars().count();
        (2..=20).contains(&len)
            && word.chars().all(|c| c.is_ascii_alphabetic())
            && !NOT_NAMES.contains(&word.to_lowercase().as_str())
    }

    fn capitalized(word: &str) -> String {
        let mut chars = word.chars();
        match chars.next() {
            Some(first) => {
                first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
            }
            None => String::new(),
        }
    }

    /// First alphabetic token at the start of `rest`, if name-shaped.
    fn leading_name_token(rest: &str) -> Option<String> {
        let token: String = rest
            .trim_start()
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect();
        if Self::looks_like_name(&token) {
            Some(Self::capitalized(&token))
        } else {
            None
        }
    }
}

impl MessagePatterns for DefaultPatterns {
    fn extract_introduced_name(&self, body: &str) -> Option<String> {
        let body = body.trim();
        if body.is_empty() {
            return None;
        }
        let lower = body.to_lowercase();

        // "this is Omar", "my name is Omar", "I'm Omar". Scanning the
        // lowercased text is safe because the token is re-capitalized.
        for marker in NAME_MARKERS {
            if let Some(pos) = lower.find(marker) {
                let rest = &lower[pos + marker.len()..];
                if let Some(name) = Self::leading_name_token(rest) {
                    return Some(name);
                }
            }
        }

        // "Omar here"
        let mut words = body.split_whitespace();
        if let (Some(first), Some(second)) = (words.next(), words.next()) {
            let first = first.trim_matches(|c: char| !c.is_ascii_alphabetic());
            if second.to_lowercase().trim_end_matches([',', '.', '!']) == "here"
                && Self::looks_like_name(first)
            {
                return Some(Self::capitalized(first));
            }
        }

        // Just "Omar", a single word that isn't a common word
        let stripped = body.trim();
        if !stripped.contains(char::is_whitespace) && Self::looks_like_name(stripped) {
            return Some(Self::capitalized(stripped));
        }

        None
    }

    fn is_affirmative(&self, body: &str) -> bool {
        AFFIRMATIVES.contains(&Self::normalized_reply(body).as_str())
    }

    fn is_negative(&self, body: &str) -> bool {
        NEGATIVES.contains(&Self::normalized_reply(body).as_str())
    }

    fn is_missed_receipt_phrase(&self, body: &str) -> bool {
        let lower = body.to_lowercase();
        if lower.contains("no receipt") {
            return true;
        }
        if !lower.contains("receipt") {
            return false;
        }
        ["didn't get", "didnt get", "lost", "forgot", "never got"]
            .iter()
            .any(|phrase| lower.contains(phrase))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> DefaultPatterns {
        DefaultPatterns
    }

    #[test]
    fn extracts_name_from_intro_phrases() {
        let p = patterns();
        assert_eq!(p.extract_introduced_name("This is Omar"), Some("Omar".into()));
        assert_eq!(
            p.extract_introduced_name("hey this is omar, driver for the north crew"),
            Some("Omar".into())
        );
        assert_eq!(p.extract_introduced_name("My name is Rosa"), Some("Rosa".into()));
        assert_eq!(p.extract_introduced_name("Marcus here"), Some("Marcus".into()));
        assert_eq!(p.extract_introduced_name("Omar"), Some("Omar".into()));
    }

    #[test]
    fn common_words_are_not_names() {
        let p = patterns();
        assert_eq!(p.extract_introduced_name("hello"), None);
        assert_eq!(p.extract_introduced_name("receipt"), None);
        assert_eq!(p.extract_introduced_name("yes"), None);
        assert_eq!(p.extract_introduced_name(""), None);
        assert_eq!(p.extract_introduced_name("what is this number"), None);
    }

    #[test]
    fn affirmative_variants_match() {
        let p = patterns();
        for reply in ["YES", "yes", " yep ", "Looks good", "si", "YEAH!"] {
            assert!(p.is_affirmative(reply), "{reply:?} should be affirmative");
        }
        assert!(!p.is_affirmative("yes please redo it"));
    }

    #[test]
    fn negative_variants_match() {
        let p = patterns();
        for reply in ["NO", "no", "NOPE", "wrong", "Incorrect."] {
            assert!(p.is_negative(reply), "{reply:?} should be negative");
        }
        assert!(!p.is_negative("not sure"));
    }

    #[test]
    fn missed_receipt_phrases_match() {
        let p = patterns();
        for body in [
            "I didn't get a receipt for the fuel",
            "no receipt on this one",
            "lost the receipt sorry",
            "forgot to grab a receipt",
            "never got a receipt from them",
        ] {
            assert!(p.is_missed_receipt_phrase(body), "{body:?} should match");
        }
        assert!(!p.is_missed_receipt_phrase("here is the receipt"));
        assert!(!p.is_missed_receipt_phrase("lost my keys"));
    }
}
