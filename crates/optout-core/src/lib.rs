//! Optout Core
//!
//! The consent decline orchestrator: finds cookie-consent prompts on arbitrary
//! pages and picks the privacy-preserving option, at most once per page load.
//!
//! Detection paths, all gated by one [`ConsentState`]:
//! - Standards API bridge (IAB TCF v2, SourcePoint)
//! - DOM scan: rule catalog -> element matcher -> context validator -> click
//! - Mutation watcher for banners injected after load
//! - Cross-frame messages from vendor iframes

mod bridge;
mod config;
mod error;
mod orchestrator;
mod rate_limit;
pub mod runtime;
mod state;
mod timers;
mod validator;
mod watcher;

pub use bridge::{
    BridgeStep, Framework, NoVendors, SourcePointApi, SourcePointState, SpEntryPoint,
    StandardsBridge, TcData, TcfApi, TcfResponse, TcfState, VendorGlobals,
};
pub use config::OrchestratorConfig;
pub use error::{CoreError, VendorApiError};
pub use orchestrator::{Orchestrator, ScanOutcome, ScanTrigger};
pub use rate_limit::{Admission, RateLimiter, MAX_ATTEMPTS, MIN_ATTEMPT_INTERVAL};
pub use runtime::{run_page, PageEvent};
pub use state::{ConsentReport, ConsentState, Resolution};
pub use validator::ContextValidator;
pub use watcher::{MutationObserver, MutationWatcher};

// Re-export collaborating crates
pub use optout_dom::{ActivationError, ComputedStyle, Dom, ElementMatcher, HtmlPage, MatchError, NodeHandle, Rect};
pub use optout_messaging::{
    CrossFrameMessenger, MessageEvent, MessageSignal, MessageSink, SendError,
    TrustedOriginRegistry, ValidationError,
};
pub use optout_rules::{DeclineRule, KeywordSet, MatcherPattern, RuleCatalog, RuleError};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
