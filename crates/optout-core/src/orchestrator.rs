//! Consent decline orchestrator
//!
//! Wires the standards bridge, DOM scan, mutation watcher and cross-frame
//! messenger together under one [`ConsentState`]. Every entry point takes the
//! current time and runs to completion; delayed work goes through the timer
//! queue and is executed by [`Orchestrator::run_due`].

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use std::time::{Duration, Instant};

use optout_dom::{Dom, ElementMatcher};
use optout_messaging::{
    CrossFrameMessenger, MessageEvent, MessageSignal, MessageSink, TrustedOriginRegistry,
};
use optout_rules::RuleCatalog;

use crate::bridge::{BridgeStep, Framework, NoVendors, StandardsBridge, VendorGlobals};
use crate::config::OrchestratorConfig;
use crate::rate_limit::Admission;
use crate::state::{ConsentReport, ConsentState, Resolution};
use crate::timers::{jittered, Task, TimerQueue};
use crate::validator::ContextValidator;
use crate::watcher::{MutationObserver, MutationWatcher};
use crate::Result;

/// What caused a DOM scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanTrigger {
    Initial,
    Mutation,
    Message,
    VendorFallback,
    Retry,
}

impl ScanTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanTrigger::Initial => "initial",
            ScanTrigger::Mutation => "mutation",
            ScanTrigger::Message => "message",
            ScanTrigger::VendorFallback => "vendor_fallback",
            ScanTrigger::Retry => "retry",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A decline control was clicked; carries the rule label
    Resolved(String),
    AlreadyResolved,
    NoCandidate,
    /// Too soon after the last attempt; a retry is queued for this time
    Throttled(Instant),
    Exhausted,
    /// The host refused the click; the element will not be tried again
    ActivationFailed,
}

pub struct Orchestrator<D: Dom> {
    dom: D,
    vendors: Box<dyn VendorGlobals>,
    sink: Option<Box<dyn MessageSink>>,
    config: OrchestratorConfig,
    catalog: RuleCatalog,
    matcher: ElementMatcher,
    validator: ContextValidator,
    state: ConsentState<D::Node>,
    bridge: StandardsBridge,
    watcher: MutationWatcher,
    messenger: CrossFrameMessenger,
    timers: TimerQueue,
    rng: StdRng,
    started: bool,
}

impl<D: Dom> Orchestrator<D> {
    /// Build an orchestrator for a page. Fails only on invalid configuration or
    /// a page URL without a usable origin.
    pub fn initialize(dom: D, page_url: &str, config: OrchestratorConfig) -> Result<Self> {
        config.validate()?;
        let config = config.effective();
        let registry = TrustedOriginRegistry::for_page(page_url)?;

        tracing::debug!(
            page_origin = %registry.page_origin(),
            min_interval_ms = config.min_attempt_interval_ms,
            max_attempts = config.max_attempts,
            "Initializing consent orchestrator"
        );

        Ok(Self {
            dom,
            vendors: Box::new(NoVendors),
            sink: None,
            catalog: RuleCatalog::builtin(),
            matcher: ElementMatcher::new(),
            validator: ContextValidator::with_depth(config.ancestor_depth),
            state: ConsentState::new(config.rate_limiter()),
            bridge: StandardsBridge::new(config.probe_attempts, config.probe_base_delay()),
            watcher: MutationWatcher::new(),
            messenger: CrossFrameMessenger::new(registry, config.payload_limits()),
            timers: TimerQueue::new(),
            rng: StdRng::from_entropy(),
            started: false,
            config,
        })
    }

    pub fn with_vendors(mut self, vendors: impl VendorGlobals + 'static) -> Self {
        self.vendors = Box::new(vendors);
        self
    }

    pub fn with_message_sink(mut self, sink: impl MessageSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Host observer to disconnect once consent is resolved
    pub fn with_mutation_observer(mut self, observer: impl MutationObserver + 'static) -> Self {
        self.watcher.set_observer(Box::new(observer));
        self
    }

    pub fn with_catalog(mut self, catalog: RuleCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Page DOM is ready: probe vendor APIs and run the first scan.
    /// Calling it again has no effect.
    pub fn start(&mut self, now: Instant) {
        if self.started {
            return;
        }
        self.started = true;

        for framework in [Framework::Tcf, Framework::SourcePoint] {
            let step = self
                .bridge
                .probe(framework, self.vendors.as_ref(), &mut self.state, now, true);
            self.apply_step(step, now);
        }

        self.scan(ScanTrigger::Initial, now);
    }

    /// One pass over the rule catalog, clicking at most one element
    pub fn scan(&mut self, trigger: ScanTrigger, now: Instant) -> ScanOutcome {
        match self.state.admission(now) {
            Admission::Allowed => {}
            Admission::Resolved => return ScanOutcome::AlreadyResolved,
            Admission::Exhausted => {
                tracing::debug!(trigger = trigger.as_str(), "Attempt ceiling reached");
                return ScanOutcome::Exhausted;
            }
            Admission::Throttled { retry_at } => {
                self.schedule_rescan(retry_at, ScanTrigger::Retry);
                return ScanOutcome::Throttled(retry_at);
            }
        }

        let Some((node, label, settings_only)) = self.find_candidate() else {
            tracing::debug!(trigger = trigger.as_str(), "No decline control found");
            return ScanOutcome::NoCandidate;
        };

        self.state.record_element_attempt(node, now);
        match self.dom.click(node) {
            Ok(()) => {
                tracing::debug!(trigger = trigger.as_str(), rule = %label, "Clicked decline control");
                if settings_only {
                    tracing::warn!(rule = %label, "Stopped at the settings step; decline may be incomplete");
                }
                self.resolve(Resolution::DomClick {
                    label: label.clone(),
                    settings_only,
                });
                ScanOutcome::Resolved(label)
            }
            Err(e) => {
                tracing::warn!(rule = %label, error = %e, "Failed to activate decline control");
                let retry_at = now + self.state.limiter().min_interval();
                self.schedule_rescan(retry_at, ScanTrigger::Retry);
                ScanOutcome::ActivationFailed
            }
        }
    }

    /// First visible, safe, untried element in catalog order
    fn find_candidate(&self) -> Option<(D::Node, String, bool)> {
        for rule in self.catalog.iter() {
            for node in self.matcher.find(&self.dom, rule) {
                if self.state.has_attempted(node) {
                    continue;
                }
                if !self.validator.is_visible(&self.dom, node) {
                    continue;
                }
                if !self.validator.is_safe_to_activate(&self.dom, node) {
                    tracing::trace!(rule = %rule.label, "Candidate rejected by context");
                    continue;
                }
                return Some((node, rule.label.clone(), rule.settings_step));
            }
        }
        None
    }

    /// A batch of elements was added to the document
    pub fn handle_mutation(&mut self, added: &[D::Node], now: Instant) {
        if self.state.is_processed() {
            return;
        }
        if self.watcher.observe(&self.dom, added, &self.validator) {
            let delay = jittered(
                &mut self.rng,
                Duration::from_millis(self.config.rescan_delay_ms),
                Duration::from_millis(self.config.rescan_jitter_ms),
            );
            self.schedule_rescan(now + delay, ScanTrigger::Mutation);
        }
    }

    /// A `message` event from any frame
    pub fn handle_message(&mut self, event: &MessageEvent, now: Instant) {
        let signal = match self.messenger.receive(event) {
            Ok(signal) => signal,
            Err(e) => {
                tracing::trace!(error = %e, "Dropped cross-frame message");
                return;
            }
        };

        match signal {
            MessageSignal::BannerShown { vendor } => {
                if self.state.is_processed() {
                    return;
                }
                tracing::debug!(vendor = ?vendor, "Vendor reported banner shown");

                for step in self
                    .bridge
                    .reprobe(self.vendors.as_ref(), &mut self.state, now)
                {
                    self.apply_step(step, now);
                }

                let delay = jittered(
                    &mut self.rng,
                    Duration::from_millis(self.config.message_delay_ms),
                    Duration::from_millis(self.config.message_jitter_ms),
                );
                self.schedule_rescan(now + delay, ScanTrigger::Message);
            }
            MessageSignal::BannerHidden {
                vendor,
                reject_confirmed,
            } => {
                if reject_confirmed {
                    tracing::debug!(vendor = ?vendor, "Vendor confirmed reject-all");
                }
                self.resolve(Resolution::BannerHidden {
                    vendor,
                    reject_confirmed,
                });
            }
            MessageSignal::Ignored => {}
        }
    }

    /// A TCF `addEventListener` callback
    pub fn handle_tcf_event(&mut self, data: &Value, now: Instant) {
        let step = self
            .bridge
            .handle_tcf_event(data, self.vendors.as_ref(), &mut self.state, now);
        self.apply_step(step, now);
    }

    /// Run every task due at or before `now`
    pub fn run_due(&mut self, now: Instant) {
        while let Some(task) = self.timers.pop_due(now) {
            if self.state.is_processed() {
                continue;
            }
            match task {
                Task::Rescan(trigger) => {
                    self.scan(trigger, now);
                }
                Task::Probe(framework) => {
                    let step = self
                        .bridge
                        .probe(framework, self.vendors.as_ref(), &mut self.state, now, true);
                    self.apply_step(step, now);
                }
                Task::VendorDecline(framework) => {
                    let step = self.bridge.retry_decline(
                        framework,
                        self.vendors.as_ref(),
                        &mut self.state,
                        now,
                    );
                    self.apply_step(step, now);
                }
            }
        }
    }

    fn apply_step(&mut self, step: BridgeStep, now: Instant) {
        match step {
            BridgeStep::Idle => {}
            BridgeStep::ProbeAgain(framework, delay) => {
                tracing::trace!(
                    framework = framework.as_str(),
                    delay_ms = delay.as_millis() as u64,
                    "Vendor API not present yet"
                );
                self.timers.schedule(now + delay, Task::Probe(framework));
            }
            BridgeStep::Declined(resolution) => self.resolve(resolution),
            BridgeStep::Fallback => {
                self.scan(ScanTrigger::VendorFallback, now);
            }
            BridgeStep::Deferred(framework, retry_at) => {
                tracing::debug!(framework = framework.as_str(), "Vendor decline throttled");
                self.schedule_vendor_decline(framework, retry_at);
            }
        }
    }

    /// Queue a vendor decline retry unless one is already pending for it
    fn schedule_vendor_decline(&mut self, framework: Framework, due: Instant) {
        let task = Task::VendorDecline(framework);
        if self.state.is_processed() || self.timers.contains(task) {
            return;
        }
        self.timers.schedule(due, task);
    }

    /// Queue a rescan unless one is already pending
    fn schedule_rescan(&mut self, due: Instant, trigger: ScanTrigger) {
        if self.state.is_processed() || self.timers.pending_rescan().is_some() {
            return;
        }
        self.timers.schedule(due, Task::Rescan(trigger));
    }

    fn resolve(&mut self, resolution: Resolution) {
        if !self.state.mark_processed(resolution.clone()) {
            return;
        }

        self.watcher.disconnect();
        let dropped_tasks = self.timers.len();
        self.timers.clear();

        tracing::info!(
            resolution = ?resolution,
            attempts = self.state.attempt_count(),
            dropped_tasks,
            "Consent declined"
        );

        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = self.messenger.post_resolved(sink.as_mut()) {
                tracing::warn!(error = %e, "Failed to post resolution notice");
            }
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn is_processed(&self) -> bool {
        self.state.is_processed()
    }

    pub fn is_observing(&self) -> bool {
        self.watcher.is_connected()
    }

    pub fn state(&self) -> &ConsentState<D::Node> {
        &self.state
    }

    pub fn report(&self) -> ConsentReport {
        self.state.report()
    }

    pub fn bridge(&self) -> &StandardsBridge {
        &self.bridge
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn dom(&self) -> &D {
        &self.dom
    }

    pub fn dom_mut(&mut self) -> &mut D {
        &mut self.dom
    }

    pub fn into_dom(self) -> D {
        self.dom
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::bridge::fakes::{FakeSourcePoint, FakeTcf, FakeVendors};
    use crate::bridge::{SourcePointState, SpEntryPoint, TcfState};
    use crate::error::VendorApiError;
    use optout_dom::HtmlPage;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    const EMPTY_PAGE: &str = r#"<html><body></body></html>"#;

    struct CountingObserver(Rc<Cell<u32>>);

    impl MutationObserver for CountingObserver {
        fn disconnect(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    fn sourcepoint(supported: Vec<SpEntryPoint>) -> FakeSourcePoint {
        FakeSourcePoint {
            supported,
            failing: vec![],
            invoked: Default::default(),
        }
    }

    /// Run every queued task in deadline order
    fn drain<D: Dom>(orch: &mut Orchestrator<D>) {
        while let Some(due) = orch.next_deadline() {
            orch.run_due(due);
        }
    }

    fn message(origin: &str, data: Value) -> MessageEvent {
        MessageEvent {
            origin: origin.to_string(),
            data,
        }
    }

    #[test]
    fn test_end_to_end_cookie_banner() {
        let mut orch = orchestrator(BANNER_PAGE);
        let decline = orch.dom().find("#decline").unwrap();
        let banner = orch.dom().find("#cookie-banner").unwrap();
        let now = Instant::now();

        orch.start(now);

        assert!(orch.is_processed());
        assert_eq!(orch.dom().clicks(), &[decline]);
        assert_eq!(
            orch.state().resolution(),
            Some(&Resolution::DomClick {
                label: "English: decline all".to_string(),
                settings_only: false,
            })
        );
        assert!(!orch.is_observing());

        // The banner removing itself is not a new trigger
        orch.dom_mut().detach(banner);
        orch.handle_mutation(&[], now + Duration::from_millis(10));
        orch.run_due(now + Duration::from_secs(10));

        assert_eq!(orch.dom().clicks().len(), 1);
        assert_eq!(orch.state().attempt_count(), 1);
        assert_eq!(orch.next_deadline(), None);
    }

    #[test]
    fn test_at_most_once_across_triggers() {
        let mut orch = orchestrator(BANNER_PAGE);
        let banner = orch.dom().find("#cookie-banner").unwrap();
        let now = Instant::now();
        orch.start(now);
        assert!(orch.is_processed());

        let later = now + Duration::from_secs(5);
        orch.handle_mutation(&[banner], later);
        orch.handle_message(
            &message("https://news.example.com", json!({"type": "banner_shown"})),
            later,
        );
        orch.handle_tcf_event(&json!({"eventStatus": "cmpuishown"}), later);
        assert_eq!(orch.scan(ScanTrigger::Retry, later), ScanOutcome::AlreadyResolved);
        orch.run_due(later + Duration::from_secs(5));

        assert_eq!(orch.dom().clicks().len(), 1);
        assert_eq!(orch.state().attempt_count(), 1);
    }

    #[test]
    fn test_exclusion_wins_over_banner_context() {
        let mut orch = orchestrator(
            r#"<html><body>
                <div class="cookie-banner">
                    <button>Subscribe to our newsletter</button>
                    <button>Reject newsletter</button>
                </div>
            </body></html>"#,
        );

        assert_eq!(
            orch.scan(ScanTrigger::Initial, Instant::now()),
            ScanOutcome::NoCandidate
        );
        assert!(orch.dom().clicks().is_empty());
        assert_eq!(orch.state().attempt_count(), 0);
    }

    #[test]
    fn test_two_step_settings_before_reject() {
        let markup = r#"<html><body>
            <div id="onetrust-banner-sdk">
                <button id="onetrust-pc-btn-handler">Cookie settings</button>
            </div>
            <div id="onetrust-pc-sdk">
                <a class="ot-pc-refuse-all-handler">Confirm my choices</a>
            </div>
        </body></html>"#;

        let mut orch = orchestrator(markup);
        let settings = orch.dom().find("#onetrust-pc-btn-handler").unwrap();
        let outcome = orch.scan(ScanTrigger::Initial, Instant::now());

        assert_eq!(
            outcome,
            ScanOutcome::Resolved("OneTrust: open preference center".to_string())
        );
        assert_eq!(orch.dom().clicks(), &[settings]);
        assert!(matches!(
            orch.state().resolution(),
            Some(Resolution::DomClick {
                settings_only: true,
                ..
            })
        ));

        // Without the settings control the final reject is taken
        let mut orch = orchestrator(markup);
        let settings = orch.dom().find("#onetrust-banner-sdk").unwrap();
        let reject = orch.dom().find("#onetrust-pc-sdk a").unwrap();
        orch.dom_mut().detach(settings);

        assert_eq!(
            orch.scan(ScanTrigger::Initial, Instant::now()),
            ScanOutcome::Resolved("OneTrust: reject inside preference center".to_string())
        );
        assert_eq!(orch.dom().clicks(), &[reject]);
        assert!(matches!(
            orch.state().resolution(),
            Some(Resolution::DomClick {
                settings_only: false,
                ..
            })
        ));
    }

    #[test]
    fn test_activation_error_marks_attempted() {
        let mut orch = orchestrator(BANNER_PAGE);
        let decline = orch.dom().find("#decline").unwrap();
        orch.dom_mut().block_activation(decline);
        let now = Instant::now();

        assert_eq!(orch.scan(ScanTrigger::Initial, now), ScanOutcome::ActivationFailed);
        assert!(orch.state().has_attempted(decline));
        assert!(!orch.is_processed());
        assert_eq!(orch.next_deadline(), Some(now + Duration::from_secs(2)));

        // The retry skips the element that failed
        orch.run_due(now + Duration::from_secs(2));
        assert_eq!(orch.state().attempt_count(), 1);
        assert!(orch.dom().clicks().is_empty());
        assert_eq!(orch.next_deadline(), None);
    }

    #[test]
    fn test_rate_limit_bounds_attempts() {
        let buttons: String = (0..8)
            .map(|i| format!(r#"<button id="b{i}">Reject all</button>"#))
            .collect();
        let markup = format!(r#"<html><body><div class="consent-modal">{buttons}</div></body></html>"#);
        let mut page = HtmlPage::parse(&markup);
        for i in 0..8 {
            let node = page.find(&format!("#b{i}")).unwrap();
            page.block_activation(node);
        }
        let mut orch = Orchestrator::initialize(page, PAGE_URL, OrchestratorConfig::default()).unwrap();
        let start = Instant::now();

        // 50 requests within 5 seconds
        let outcomes: Vec<ScanOutcome> = (0..50)
            .map(|i| orch.scan(ScanTrigger::Mutation, start + Duration::from_millis(i * 100)))
            .collect();
        let executed = outcomes
            .iter()
            .filter(|o| **o == ScanOutcome::ActivationFailed)
            .count();
        assert_eq!(executed, 3);

        for i in 0..20 {
            orch.scan(ScanTrigger::Retry, start + Duration::from_secs(10 + i * 3));
        }
        assert_eq!(orch.state().attempt_count(), 5);
        assert_eq!(
            orch.scan(ScanTrigger::Retry, start + Duration::from_secs(600)),
            ScanOutcome::Exhausted
        );
    }

    #[test]
    fn test_relaxed_config_is_clamped() {
        let config = OrchestratorConfig {
            min_attempt_interval_ms: 10,
            max_attempts: 100,
            ..OrchestratorConfig::default()
        };
        let orch = Orchestrator::initialize(HtmlPage::parse(BANNER_PAGE), PAGE_URL, config).unwrap();

        assert_eq!(orch.state().limiter().min_interval(), Duration::from_secs(2));
        assert_eq!(orch.state().limiter().max_attempts(), 5);
    }

    #[test]
    fn test_invalid_page_url() {
        let result = Orchestrator::initialize(
            HtmlPage::parse(BANNER_PAGE),
            "not a url",
            OrchestratorConfig::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_mutation_triggers_jittered_rescan() {
        let mut orch = orchestrator(BANNER_PAGE);
        let banner = orch.dom().find("#cookie-banner").unwrap();
        orch.dom_mut().detach(banner);
        let now = Instant::now();

        orch.start(now);
        assert!(!orch.is_processed());
        assert_eq!(orch.timers.pending_rescan(), None);

        orch.dom_mut().attach(banner);
        orch.handle_mutation(&[banner], now + Duration::from_secs(1));
        // A second batch while one rescan is pending is coalesced
        let queued = orch.timers.len();
        orch.handle_mutation(&[banner], now + Duration::from_secs(1));
        assert_eq!(orch.timers.len(), queued);

        let due = orch.timers.pending_rescan().unwrap();
        let delay = due - (now + Duration::from_secs(1));
        assert!(delay >= Duration::from_millis(400) && delay <= Duration::from_millis(800));

        orch.run_due(due - Duration::from_millis(1));
        assert!(!orch.is_processed());

        orch.run_due(due);
        assert!(orch.is_processed());
        assert_eq!(orch.dom().clicks().len(), 1);
    }

    #[test]
    fn test_irrelevant_mutation_ignored() {
        let mut orch = orchestrator(
            r#"<html><body><div id="ad" class="promo">Summer sale</div></body></html>"#,
        );
        let ad = orch.dom().find("#ad").unwrap();
        let now = Instant::now();
        orch.start(now);

        orch.handle_mutation(&[ad], now);
        assert_eq!(orch.timers.pending_rescan(), None);
    }

    #[test]
    fn test_hidden_message_resolves() {
        let sink = RecordingSink::default();
        let mut orch = orchestrator(r#"<html><body></body></html>"#).with_message_sink(sink.clone());
        let now = Instant::now();
        orch.start(now);

        orch.handle_message(
            &message(
                "https://cdn.privacy-mgmt.com",
                json!({"name": "sp.hideMessage", "choice": 13}),
            ),
            now,
        );

        assert!(orch.is_processed());
        assert_eq!(
            orch.state().resolution(),
            Some(&Resolution::BannerHidden {
                vendor: Some("privacy-mgmt.com".to_string()),
                reject_confirmed: true,
            })
        );
        assert_eq!(orch.state().attempt_count(), 0);

        let posted = sink.posted.borrow();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].1, "https://news.example.com");
        assert_eq!(posted[0].0["type"], "optout:resolved");
    }

    #[test]
    fn test_untrusted_or_polluted_messages_dropped() {
        let mut orch = orchestrator(r#"<html><body></body></html>"#);
        let now = Instant::now();

        orch.handle_message(
            &message("https://evil-privacy-mgmt.com", json!({"type": "banner_hidden"})),
            now,
        );
        let polluted: Value =
            serde_json::from_str(r#"{"type": "banner_hidden", "__proto__": {"x": 1}}"#).unwrap();
        orch.handle_message(&message("https://news.example.com", polluted), now);

        assert!(!orch.is_processed());
        assert_eq!(orch.next_deadline(), None);
    }

    #[test]
    fn test_own_notice_is_not_reprocessed() {
        let sink = RecordingSink::default();
        let mut orch = orchestrator(BANNER_PAGE).with_message_sink(sink.clone());
        let now = Instant::now();
        orch.start(now);

        let (data, origin) = sink.posted.borrow()[0].clone();
        assert_eq!(
            orch.messenger.receive(&message(&origin, data)),
            Err(optout_messaging::ValidationError::SelfMessage)
        );
    }

    #[test]
    fn test_shown_message_schedules_rescan() {
        let mut orch = orchestrator(BANNER_PAGE);
        let banner = orch.dom().find("#cookie-banner").unwrap();
        orch.dom_mut().detach(banner);
        let now = Instant::now();
        orch.start(now);

        orch.dom_mut().attach(banner);
        orch.handle_message(
            &message("https://consent.cookiebot.com", json!({"type": "consent-ui-shown"})),
            now,
        );

        let due = orch.timers.pending_rescan().unwrap();
        assert!(due >= now + Duration::from_millis(300) && due <= now + Duration::from_millis(800));
        orch.run_due(due);
        assert!(orch.is_processed());
    }

    #[test]
    fn test_tcf_decline_preempts_dom() {
        let vendors = Rc::new(FakeVendors::with_tcf(FakeTcf::new("cmpuishown")));
        let mut orch = orchestrator(BANNER_PAGE).with_vendors(SharedVendors(vendors.clone()));
        orch.start(Instant::now());

        assert_eq!(orch.state().resolution(), Some(&Resolution::TcfDecline));
        assert!(orch.dom().clicks().is_empty());
        assert_eq!(vendors.tcf.as_ref().unwrap().count("rejectAll"), 1);
        assert_eq!(orch.state().attempt_count(), 1);
    }

    #[test]
    fn test_tcf_failure_falls_back_to_dom() {
        let mut tcf = FakeTcf::new("cmpuishown");
        tcf.reject_result = Err(VendorApiError::Threw("boom".to_string()));
        let vendors = Rc::new(FakeVendors::with_tcf(tcf));
        let mut orch = orchestrator(BANNER_PAGE).with_vendors(SharedVendors(vendors));
        let now = Instant::now();

        orch.start(now);
        assert_eq!(orch.bridge().tcf_state(), TcfState::Faulted);
        assert!(!orch.is_processed());
        assert_eq!(
            orch.timers.pending_rescan(),
            Some(now + Duration::from_secs(2))
        );

        orch.run_due(now + Duration::from_secs(2));
        assert!(orch.is_processed());
        assert_eq!(orch.dom().clicks().len(), 1);
        assert_eq!(orch.state().attempt_count(), 2);
    }

    #[test]
    fn test_tcf_api_found_by_backoff_polling() {
        let fake = FakeVendors::with_tcf(FakeTcf::new("cmpuishown"));
        // Start probes TCF and SourcePoint once each
        fake.visible_after.set(3);
        let vendors = Rc::new(fake);
        let mut orch = orchestrator(r#"<html><body></body></html>"#)
            .with_vendors(SharedVendors(vendors));
        let now = Instant::now();

        orch.start(now);
        assert!(!orch.is_processed());

        let mut t = now;
        while let Some(due) = orch.next_deadline() {
            t = due;
            orch.run_due(due);
            if orch.is_processed() {
                break;
            }
        }

        assert_eq!(orch.state().resolution(), Some(&Resolution::TcfDecline));
        assert!(t > now);
    }

    #[test]
    fn test_sourcepoint_resolves_on_start() {
        let vendors = Rc::new(FakeVendors::with_sourcepoint(sourcepoint(vec![
            SpEntryPoint::ChoiceSelect(13),
            SpEntryPoint::Decline,
        ])));
        let mut orch = orchestrator(BANNER_PAGE).with_vendors(SharedVendors(vendors.clone()));
        orch.start(Instant::now());

        assert_eq!(orch.state().resolution(), Some(&Resolution::SourcePointDecline));
        assert!(orch.dom().clicks().is_empty());
        assert_eq!(
            *vendors.sourcepoint.as_ref().unwrap().invoked.borrow(),
            vec![SpEntryPoint::ChoiceSelect(13), SpEntryPoint::Decline]
        );
        assert_eq!(orch.state().attempt_count(), 1);
    }

    #[test]
    fn test_shown_message_rechecks_vendor_that_gave_up() {
        let vendors = Rc::new(FakeVendors::with_sourcepoint(sourcepoint(vec![
            SpEntryPoint::Decline,
        ])));
        vendors.visible_after.set(u32::MAX);
        let mut orch = orchestrator(EMPTY_PAGE).with_vendors(SharedVendors(vendors.clone()));
        let now = Instant::now();

        orch.start(now);
        drain(&mut orch);
        assert!(!orch.is_processed());
        assert_eq!(orch.bridge().sourcepoint_state(), SourcePointState::Absent);

        // The vendor script finished loading late and announced its prompt
        vendors.visible_after.set(0);
        orch.handle_message(
            &message("https://cdn.privacy-mgmt.com", json!({"name": "sp.showMessage"})),
            now + Duration::from_secs(10),
        );

        assert_eq!(orch.state().resolution(), Some(&Resolution::SourcePointDecline));
        assert_eq!(
            *vendors.sourcepoint.as_ref().unwrap().invoked.borrow(),
            vec![SpEntryPoint::Decline]
        );
    }

    #[test]
    fn test_throttled_sourcepoint_decline_is_retried() {
        let mut tcf = FakeTcf::new("cmpuishown");
        tcf.reject_result = Err(VendorApiError::Threw("boom".to_string()));
        let vendors = Rc::new(FakeVendors {
            tcf: Some(tcf),
            sourcepoint: Some(sourcepoint(vec![SpEntryPoint::Decline])),
            visible_after: Cell::new(0),
            lookups: Cell::new(0),
        });
        let mut orch = orchestrator(EMPTY_PAGE).with_vendors(SharedVendors(vendors.clone()));
        let now = Instant::now();

        // The failed TCF call used the attempt slot
        orch.start(now);
        assert!(!orch.is_processed());
        assert_eq!(orch.state().attempt_count(), 1);
        assert_eq!(orch.bridge().sourcepoint_state(), SourcePointState::Bound);
        assert!(vendors.sourcepoint.as_ref().unwrap().invoked.borrow().is_empty());

        drain(&mut orch);

        assert_eq!(orch.state().resolution(), Some(&Resolution::SourcePointDecline));
        assert_eq!(
            *vendors.sourcepoint.as_ref().unwrap().invoked.borrow(),
            vec![SpEntryPoint::Decline]
        );
        assert_eq!(orch.state().attempt_count(), 2);
    }

    #[test]
    fn test_throttled_tcf_event_is_retried() {
        let vendors = Rc::new(FakeVendors::with_tcf(FakeTcf::new("tcloaded")));
        let mut page = HtmlPage::parse(BANNER_PAGE);
        let decline = page.find("#decline").unwrap();
        page.block_activation(decline);
        let mut orch = Orchestrator::initialize(page, PAGE_URL, OrchestratorConfig::default())
            .unwrap()
            .with_vendors(SharedVendors(vendors.clone()));
        let now = Instant::now();

        // Consent already decided, then a failed click uses the attempt slot
        orch.start(now);
        assert_eq!(orch.bridge().tcf_state(), TcfState::Bound);
        assert_eq!(orch.state().attempt_count(), 1);

        // The CMP re-shows its prompt inside the throttle window
        orch.handle_tcf_event(
            &json!({"eventStatus": "cmpuishown"}),
            now + Duration::from_millis(500),
        );
        assert_eq!(vendors.tcf.as_ref().unwrap().count("rejectAll"), 0);

        drain(&mut orch);

        assert_eq!(orch.state().resolution(), Some(&Resolution::TcfDecline));
        assert_eq!(vendors.tcf.as_ref().unwrap().count("rejectAll"), 1);
        assert_eq!(orch.state().attempt_count(), 2);
    }

    #[test]
    fn test_resolution_disconnects_host_observer_once() {
        let disconnects = Rc::new(Cell::new(0));
        let mut orch = orchestrator(BANNER_PAGE)
            .with_mutation_observer(CountingObserver(disconnects.clone()));
        let banner = orch.dom().find("#cookie-banner").unwrap();
        let now = Instant::now();

        orch.start(now);
        assert!(orch.is_processed());
        assert_eq!(disconnects.get(), 1);

        orch.handle_mutation(&[banner], now + Duration::from_secs(3));
        orch.handle_message(
            &message("https://news.example.com", json!({"type": "banner_hidden"})),
            now + Duration::from_secs(3),
        );
        assert_eq!(disconnects.get(), 1);
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut orch = orchestrator(r#"<html><body></body></html>"#);
        let now = Instant::now();
        orch.start(now);
        let pending = orch.next_deadline();
        orch.start(now);
        assert_eq!(orch.next_deadline(), pending);
    }
}
