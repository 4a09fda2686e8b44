//! Decline rule catalog
//!
//! Order is significant: framework-specific structural rules come first,
//! then two-step flows (settings before the final reject), then per-language
//! text rules, and the generic fallback last.

use serde::{Deserialize, Serialize};

use crate::error::RuleError;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclineRule {
    /// Structural selector or `<scope>:contains("<text>")`
    pub matcher: String,
    /// Human-readable description used in logs and reports
    pub label: String,
    /// First half of a two-step flow: opens a settings panel rather than
    /// declining outright
    #[serde(default)]
    pub settings_step: bool,
}

impl DeclineRule {
    pub fn new(matcher: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            matcher: matcher.into(),
            label: label.into(),
            settings_step: false,
        }
    }

    pub fn settings_step(mut self) -> Self {
        self.settings_step = true;
        self
    }
}

const BUILTIN_RULES: &[(&str, &str)] = &[
    // OneTrust
    ("#onetrust-reject-all-handler", "OneTrust: reject all"),
    ("button.ot-pc-refuse-all-handler", "OneTrust: refuse all in preference center"),
    // Cookiebot
    ("#CybotCookiebotDialogBodyButtonDecline", "Cookiebot: decline"),
    (
        "#CybotCookiebotDialogBodyLevelButtonLevelOptinDeclineAll",
        "Cookiebot: decline all",
    ),
    // Didomi
    ("#didomi-notice-disagree-button", "Didomi: disagree"),
    (".didomi-continue-without-agreeing", "Didomi: continue without agreeing"),
    // Usercentrics
    ("[data-testid='uc-deny-all-button']", "Usercentrics: deny all"),
    // Quantcast Choice
    (
        ".qc-cmp2-summary-buttons button[mode='secondary']",
        "Quantcast: reject",
    ),
    // TrustArc
    ("#truste-consent-required", "TrustArc: required only"),
    // CookieYes / Complianz / Iubenda / Osano / Klaro / Borlabs
    ("button.cky-btn-reject", "CookieYes: reject"),
    ("button.cmplz-deny", "Complianz: deny"),
    (".iubenda-cs-reject-btn", "Iubenda: reject"),
    (".osano-cm-denyAll", "Osano: deny all"),
    (".klaro .cm-btn-decline", "Klaro: decline"),
    ("a._brlbs-refuse-btn", "Borlabs: refuse"),
    // SourcePoint (first-party rendering)
    ("button.sp_choice_type_13", "SourcePoint: reject all"),
    ("button[title='Reject All']", "SourcePoint: reject all (title)"),
    // Two-step flows: open settings, then reject inside them
    (
        "#onetrust-pc-btn-handler",
        "OneTrust: open preference center",
    ),
    (
        "#onetrust-pc-sdk .ot-pc-refuse-all-handler",
        "OneTrust: reject inside preference center",
    ),
    (
        "button.qc-cmp2-summary-buttons-more-options",
        "Quantcast: more options",
    ),
    (
        ".qc-cmp2-buttons-desktop button[mode='secondary']",
        "Quantcast: reject inside options",
    ),
    // English
    ("button:contains(\"Reject all\")", "English: reject all"),
    ("button:contains(\"Decline all\")", "English: decline all"),
    ("button:contains(\"Refuse all\")", "English: refuse all"),
    ("button:contains(\"Only necessary\")", "English: only necessary"),
    ("button:contains(\"Necessary only\")", "English: necessary only"),
    ("button:contains(\"Use necessary cookies only\")", "English: necessary cookies only"),
    // Norwegian
    ("button:contains(\"Avslå alle\")", "Norwegian: reject all"),
    ("button:contains(\"Kun nødvendige\")", "Norwegian: only necessary"),
    ("button:contains(\"Avslå\")", "Norwegian: reject"),
    // Swedish
    ("button:contains(\"Avvisa alla\")", "Swedish: reject all"),
    ("button:contains(\"Endast nödvändiga\")", "Swedish: only necessary"),
    // Danish
    ("button:contains(\"Afvis alle\")", "Danish: reject all"),
    ("button:contains(\"Kun nødvendige\")", "Danish: only necessary"),
    // German
    ("button:contains(\"Alle ablehnen\")", "German: reject all"),
    ("button:contains(\"Nur notwendige\")", "German: only necessary"),
    ("button:contains(\"Ablehnen\")", "German: reject"),
    // French
    ("button:contains(\"Tout refuser\")", "French: refuse all"),
    ("button:contains(\"Continuer sans accepter\")", "French: continue without accepting"),
    ("button:contains(\"Refuser\")", "French: refuse"),
    // Spanish
    ("button:contains(\"Rechazar todo\")", "Spanish: reject all"),
    ("button:contains(\"Rechazar\")", "Spanish: reject"),
    // Italian
    ("button:contains(\"Rifiuta tutto\")", "Italian: reject all"),
    ("button:contains(\"Rifiuta\")", "Italian: reject"),
    // Dutch
    ("button:contains(\"Alles weigeren\")", "Dutch: reject all"),
    ("button:contains(\"Weigeren\")", "Dutch: reject"),
    // Finnish / Polish / Portuguese
    ("button:contains(\"Hylkää kaikki\")", "Finnish: reject all"),
    ("button:contains(\"Odrzuć wszystkie\")", "Polish: reject all"),
    ("button:contains(\"Rejeitar tudo\")", "Portuguese: reject all"),
    // Generic fallback
    ("[role='button']:contains(\"Reject\")", "Generic: reject (role=button)"),
    ("a:contains(\"Reject all\")", "Generic: reject all link"),
    ("button:contains(\"Decline\")", "Generic: decline"),
    ("button:contains(\"Reject\")", "Generic: reject"),
];

/// Matchers in [`BUILTIN_RULES`] that only open a settings panel
const SETTINGS_STEP_MATCHERS: &[&str] = &[
    "#onetrust-pc-btn-handler",
    "button.qc-cmp2-summary-buttons-more-options",
];

/// Immutable, ordered list of decline rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleCatalog {
    rules: Vec<DeclineRule>,
}

impl RuleCatalog {
    /// Built-in multi-framework, multi-language catalog
    pub fn builtin() -> Self {
        Self {
            rules: BUILTIN_RULES
                .iter()
                .map(|(matcher, label)| {
                    let rule = DeclineRule::new(*matcher, *label);
                    if SETTINGS_STEP_MATCHERS.contains(matcher) {
                        rule.settings_step()
                    } else {
                        rule
                    }
                })
                .collect(),
        }
    }

    /// Build a catalog from rules in rank order
    pub fn from_rules(rules: Vec<DeclineRule>) -> Result<Self> {
        if rules.is_empty() {
            return Err(RuleError::EmptyCatalog);
        }

        for (index, rule) in rules.iter().enumerate() {
            if rule.matcher.trim().is_empty() {
                return Err(RuleError::InvalidRule {
                    index,
                    reason: "matcher is empty".to_string(),
                });
            }
            if rule.label.trim().is_empty() {
                return Err(RuleError::InvalidRule {
                    index,
                    reason: "label is empty".to_string(),
                });
            }
        }

        Ok(Self { rules })
    }

    /// Load a catalog from a JSON array of `{ "matcher", "label" }` objects
    pub fn from_json(json: &str) -> Result<Self> {
        let rules: Vec<DeclineRule> = serde_json::from_str(json)?;
        let catalog = Self::from_rules(rules)?;
        tracing::debug!(rules = catalog.len(), "Loaded decline rule catalog");
        Ok(catalog)
    }

    pub fn rules(&self) -> &[DeclineRule] {
        &self.rules
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeclineRule> {
        self.rules.iter()
    }

    /// Rank of the first rule with the given label
    pub fn position(&self, label: &str) -> Option<usize> {
        self.rules.iter().position(|r| r.label == label)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for RuleCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
