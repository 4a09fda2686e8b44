//! Keyword heuristics
//!
//! Two sets drive context validation:
//! - exclusion keywords: UI that must never be activated (login, newsletter, ...)
//! - cookie-relevance keywords: evidence that an element belongs to a consent prompt

use serde::{Deserialize, Serialize};

/// Controls that look like buttons but are never consent controls
const EXCLUSION_KEYWORDS: &[&str] = &[
    // English
    "login",
    "log in",
    "log-in",
    "logout",
    "log out",
    "sign in",
    "sign-in",
    "signin",
    "sign up",
    "sign-up",
    "signup",
    "sign out",
    "register",
    "newsletter",
    "subscribe",
    "subscription",
    "password",
    "my account",
    "checkout",
    "add to cart",
    "donate",
    // Norwegian / Danish / Swedish
    "logg inn",
    "log ind",
    "logga in",
    "nyhetsbrev",
    "nyhedsbrev",
    "abonner",
    "prenumerera",
    // German
    "anmelden",
    "registrieren",
    "abonnieren",
    // French
    "se connecter",
    "s'inscrire",
    "s'abonner",
    // Spanish / Italian / Dutch
    "iniciar sesión",
    "suscrib",
    "accedi",
    "iscriviti",
    "inloggen",
    "aanmelden",
];

/// Evidence that an element or container belongs to a consent prompt
const COOKIE_KEYWORDS: &[&str] = &[
    "cookie",
    "consent",
    "gdpr",
    "privacy",
    "cmp",
    "tcf",
    // Frameworks
    "onetrust",
    "cookiebot",
    "cybot",
    "didomi",
    "usercentrics",
    "quantcast",
    "qc-cmp",
    "sourcepoint",
    "sp_message",
    "trustarc",
    "truste",
    "osano",
    "iubenda",
    "klaro",
    "complianz",
    "cky-",
    "borlabs",
    // Localized
    "samtykke",
    "informasjonskapsler",
    "informationscookies",
    "kakor",
    "einwilligung",
    "datenschutz",
    "consentement",
    "rgpd",
    "privacidad",
    "consenso",
    "toestemming",
    "evästeet",
    "zgod",
];

/// Case-insensitive substring keyword matcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordSet {
    /// Lower-cased keywords
    keywords: Vec<String>,
}

impl KeywordSet {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Keywords whose presence forces rejection
    pub fn exclusion() -> Self {
        Self::new(EXCLUSION_KEYWORDS)
    }

    /// Keywords that establish cookie relevance
    pub fn cookie_relevance() -> Self {
        Self::new(COOKIE_KEYWORDS)
    }

    /// First keyword contained in `haystack`, if any
    pub fn find_in(&self, haystack: &str) -> Option<&str> {
        if haystack.is_empty() {
            return None;
        }
        let haystack = haystack.to_lowercase();
        self.keywords
            .iter()
            .find(|k| haystack.contains(k.as_str()))
            .map(String::as_str)
    }

    pub fn matches(&self, haystack: &str) -> bool {
        self.find_in(haystack).is_some()
    }

    /// True if any of the given fields contains a keyword
    pub fn matches_any<'a, I>(&self, fields: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        fields.into_iter().any(|f| self.matches(f))
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusion_keywords() {
        let set = KeywordSet::exclusion();
        assert!(set.matches("Subscribe to our newsletter"));
        assert!(set.matches("SIGN IN"));
        assert!(set.matches("Logg inn"));
        assert!(!set.matches("Decline All"));
        assert!(!set.matches("Reject all cookies"));
        assert!(!set.matches("Avslå alle"));
        assert!(!set.matches("Alle ablehnen"));
    }

    #[test]
    fn test_cookie_keywords() {
        let set = KeywordSet::cookie_relevance();
        assert!(set.matches("cookie-banner"));
        assert!(set.matches("gdpr-notice"));
        assert_eq!(set.find_in("onetrust-banner-sdk"), Some("onetrust"));
        assert!(!set.matches("OK"));
        assert!(!set.matches(""));
    }

    #[test]
    fn test_matches_any() {
        let set = KeywordSet::new(["Consent"]);
        assert!(set.matches_any(["btn", "", "my-consent-button"]));
        assert!(!set.matches_any(["btn", "primary"]));
    }

    #[test]
    fn test_blank_keywords_dropped() {
        let set = KeywordSet::new(["", "  ", "cookie"]);
        assert_eq!(set.len(), 1);
        assert!(!set.matches("anything at all"));
    }
}
