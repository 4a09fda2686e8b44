//! Standards API bridge
//!
//! Drives consent frameworks that expose a JavaScript API, when present:
//! ```text
//! TCF:         Absent -> Probing -> Bound -> Declined
//!                                        \-> Faulted (fall back to DOM)
//! SourcePoint: Absent -> Bound
//! ```
//! Both globals are optional and vendor-defined. Nothing is assumed about their
//! shape: hosts expose them through small capability traits and every call
//! result is parsed before use. Vendor failures are logged and answered with a
//! DOM fallback, never propagated.

use serde::Deserialize;
use serde_json::Value;
use std::hash::Hash;
use std::time::{Duration, Instant};

use crate::error::VendorApiError;
use crate::rate_limit::Admission;
use crate::state::{ConsentState, Resolution};

const TCF_VERSION: u8 = 2;
const TCF_GET_DATA: &str = "getTCData";
const TCF_ADD_LISTENER: &str = "addEventListener";
const TCF_REJECT_ALL: &str = "rejectAll";

const SP_REJECT_ALL_CHOICE: i64 = optout_messaging::SP_REJECT_ALL_CHOICE;

/// What the `__tcfapi` callback received
#[derive(Debug, Clone, PartialEq)]
pub struct TcfResponse {
    pub data: Value,
    pub success: bool,
}

/// `__tcfapi(command, version, callback)`
pub trait TcfApi {
    fn call(&self, command: &str, version: u8) -> Result<TcfResponse, VendorApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpEntryPoint {
    /// Choice-selection callback with a numeric choice code
    ChoiceSelect(i64),
    /// Explicit messaging trigger
    ExecuteMessaging,
    /// Direct decline method
    Decline,
}

/// The `_sp_` global
pub trait SourcePointApi {
    /// Runtime capability check; nothing is invoked without it
    fn supports(&self, entry: SpEntryPoint) -> bool;

    fn invoke(&self, entry: SpEntryPoint) -> Result<(), VendorApiError>;
}

/// Vendor globals as currently visible on the page
pub trait VendorGlobals {
    fn tcf_api(&self) -> Option<&dyn TcfApi>;

    fn sourcepoint_api(&self) -> Option<&dyn SourcePointApi>;
}

/// A page without any vendor API
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVendors;

impl VendorGlobals for NoVendors {
    fn tcf_api(&self) -> Option<&dyn TcfApi> {
        None
    }

    fn sourcepoint_api(&self) -> Option<&dyn SourcePointApi> {
        None
    }
}

/// The part of `TCData` the bridge reads
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TcData {
    #[serde(default)]
    pub event_status: Option<String>,
    #[serde(default)]
    pub cmp_status: Option<String>,
    #[serde(default)]
    pub gdpr_applies: Option<bool>,
}

impl TcData {
    pub fn from_value(value: &Value) -> Result<Self, VendorApiError> {
        if !value.is_object() {
            return Err(VendorApiError::Malformed("TCData is not an object".to_string()));
        }
        serde_json::from_value(value.clone()).map_err(|e| VendorApiError::Malformed(e.to_string()))
    }

    pub fn ui_shown(&self) -> bool {
        self.event_status.as_deref() == Some("cmpuishown")
    }

    /// The user (or a previous visit) has not made a choice yet
    pub fn needs_decline(&self) -> bool {
        if self.gdpr_applies == Some(false) {
            return false;
        }
        !matches!(
            self.event_status.as_deref(),
            Some("tcloaded") | Some("useractioncomplete")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcfState {
    Absent,
    Probing { attempts: u32 },
    Bound,
    Declined,
    /// The API misbehaved; DOM scanning takes over
    Faulted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePointState {
    Absent,
    Bound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framework {
    Tcf,
    SourcePoint,
}

impl Framework {
    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Tcf => "tcf",
            Framework::SourcePoint => "sourcepoint",
        }
    }
}

/// What the orchestrator should do after a bridge operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeStep {
    Idle,
    /// API not there yet; probe again after the delay
    ProbeAgain(Framework, Duration),
    /// The vendor declined on our behalf
    Declined(Resolution),
    /// The vendor API failed; run a DOM scan instead
    Fallback,
    /// Rate limited; retry this framework's decline at the given time
    Deferred(Framework, Instant),
}

#[derive(Debug, Clone)]
pub struct StandardsBridge {
    tcf: TcfState,
    sourcepoint: SourcePointState,
    /// Probes made while SourcePoint is absent and polling
    sp_probes: Option<u32>,
    listener_registered: bool,
    /// A decline was wanted but throttled; cleared once it is attempted
    tcf_decline_pending: bool,
    sp_decline_pending: bool,
    probe_attempts: u32,
    probe_base_delay: Duration,
}

impl StandardsBridge {
    pub fn new(probe_attempts: u32, probe_base_delay: Duration) -> Self {
        Self {
            tcf: TcfState::Absent,
            sourcepoint: SourcePointState::Absent,
            sp_probes: None,
            listener_registered: false,
            tcf_decline_pending: false,
            sp_decline_pending: false,
            probe_attempts: probe_attempts.max(1),
            probe_base_delay,
        }
    }

    pub fn tcf_state(&self) -> TcfState {
        self.tcf
    }

    pub fn sourcepoint_state(&self) -> SourcePointState {
        self.sourcepoint
    }

    /// Look for a framework's global; start or continue backoff polling when
    /// `poll` is set.
    pub fn probe<N: Copy + Eq + Hash>(
        &mut self,
        framework: Framework,
        vendors: &dyn VendorGlobals,
        state: &mut ConsentState<N>,
        now: Instant,
        poll: bool,
    ) -> BridgeStep {
        if state.is_processed() {
            return BridgeStep::Idle;
        }
        match framework {
            Framework::Tcf => self.probe_tcf(vendors, state, now, poll),
            Framework::SourcePoint => self.probe_sourcepoint(vendors, state, now, poll),
        }
    }

    /// Probe every framework whose polling already gave up, once
    pub fn reprobe<N: Copy + Eq + Hash>(
        &mut self,
        vendors: &dyn VendorGlobals,
        state: &mut ConsentState<N>,
        now: Instant,
    ) -> Vec<BridgeStep> {
        let mut steps = Vec::new();
        if self.tcf == TcfState::Absent {
            steps.push(self.probe(Framework::Tcf, vendors, state, now, false));
        }
        if self.sourcepoint == SourcePointState::Absent && self.sp_probes.is_none() {
            steps.push(self.probe(Framework::SourcePoint, vendors, state, now, false));
        }
        steps
    }

    fn backoff(&self, attempts: u32) -> Option<Duration> {
        if attempts >= self.probe_attempts {
            return None;
        }
        let factor = 1u32 << (attempts.saturating_sub(1)).min(16);
        Some(self.probe_base_delay * factor)
    }

    fn probe_tcf<N: Copy + Eq + Hash>(
        &mut self,
        vendors: &dyn VendorGlobals,
        state: &mut ConsentState<N>,
        now: Instant,
        poll: bool,
    ) -> BridgeStep {
        let attempts = match self.tcf {
            TcfState::Absent => 0,
            TcfState::Probing { attempts } => attempts,
            TcfState::Bound | TcfState::Declined | TcfState::Faulted => return BridgeStep::Idle,
        };

        let Some(api) = vendors.tcf_api() else {
            if !poll {
                return BridgeStep::Idle;
            }
            let attempts = attempts + 1;
            return match self.backoff(attempts) {
                Some(delay) => {
                    self.tcf = TcfState::Probing { attempts };
                    BridgeStep::ProbeAgain(Framework::Tcf, delay)
                }
                None => {
                    // Most pages have no TCF API
                    tracing::debug!(attempts, "TCF API not found, giving up");
                    self.tcf = TcfState::Absent;
                    BridgeStep::Idle
                }
            };
        };

        tracing::debug!("TCF API bound");
        self.tcf = TcfState::Bound;

        if !self.listener_registered {
            match api.call(TCF_ADD_LISTENER, TCF_VERSION) {
                Ok(_) => self.listener_registered = true,
                Err(e) => tracing::warn!(error = %e, "TCF listener registration failed"),
            }
        }

        let response = match api.call(TCF_GET_DATA, TCF_VERSION) {
            Ok(r) => r,
            Err(e) => return self.tcf_fault(e),
        };
        if !response.success {
            tracing::debug!("TCF getTCData unsuccessful, waiting for events");
            return BridgeStep::Idle;
        }
        let data = match TcData::from_value(&response.data) {
            Ok(d) => d,
            Err(e) => return self.tcf_fault(e),
        };

        if !data.needs_decline() {
            tracing::debug!(event_status = ?data.event_status, "TCF consent already decided");
            return BridgeStep::Idle;
        }

        self.tcf_decline(api, state, now)
    }

    /// A TCF `addEventListener` callback delivered by the host
    pub fn handle_tcf_event<N: Copy + Eq + Hash>(
        &mut self,
        data: &Value,
        vendors: &dyn VendorGlobals,
        state: &mut ConsentState<N>,
        now: Instant,
    ) -> BridgeStep {
        if state.is_processed() || self.tcf != TcfState::Bound {
            return BridgeStep::Idle;
        }

        let data = match TcData::from_value(data) {
            Ok(d) => d,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring malformed TCF event");
                return BridgeStep::Idle;
            }
        };
        if !data.ui_shown() {
            return BridgeStep::Idle;
        }

        match vendors.tcf_api() {
            Some(api) => self.tcf_decline(api, state, now),
            None => BridgeStep::Fallback,
        }
    }

    /// Run a decline the rate limiter deferred earlier, if still wanted
    pub fn retry_decline<N: Copy + Eq + Hash>(
        &mut self,
        framework: Framework,
        vendors: &dyn VendorGlobals,
        state: &mut ConsentState<N>,
        now: Instant,
    ) -> BridgeStep {
        if state.is_processed() {
            return BridgeStep::Idle;
        }

        match framework {
            Framework::Tcf => {
                if !self.tcf_decline_pending || self.tcf != TcfState::Bound {
                    return BridgeStep::Idle;
                }
                match vendors.tcf_api() {
                    Some(api) => self.tcf_decline(api, state, now),
                    None => {
                        self.tcf_decline_pending = false;
                        self.tcf_fault(VendorApiError::Malformed("__tcfapi went away".to_string()))
                    }
                }
            }
            Framework::SourcePoint => {
                if !self.sp_decline_pending || self.sourcepoint != SourcePointState::Bound {
                    return BridgeStep::Idle;
                }
                match vendors.sourcepoint_api() {
                    Some(api) => self.sourcepoint_decline(api, state, now),
                    None => {
                        tracing::warn!("SourcePoint global went away, falling back to DOM");
                        self.sp_decline_pending = false;
                        BridgeStep::Fallback
                    }
                }
            }
        }
    }

    fn tcf_decline<N: Copy + Eq + Hash>(
        &mut self,
        api: &dyn TcfApi,
        state: &mut ConsentState<N>,
        now: Instant,
    ) -> BridgeStep {
        match state.admission(now) {
            Admission::Allowed => {}
            Admission::Throttled { retry_at } => {
                self.tcf_decline_pending = true;
                return BridgeStep::Deferred(Framework::Tcf, retry_at);
            }
            Admission::Exhausted | Admission::Resolved => {
                self.tcf_decline_pending = false;
                return BridgeStep::Idle;
            }
        }

        self.tcf_decline_pending = false;
        state.record_attempt(now);
        match api.call(TCF_REJECT_ALL, TCF_VERSION) {
            Ok(response) if response.success => {
                self.tcf = TcfState::Declined;
                BridgeStep::Declined(Resolution::TcfDecline)
            }
            Ok(_) => self.tcf_fault(VendorApiError::Unsupported(TCF_REJECT_ALL.to_string())),
            Err(e) => self.tcf_fault(e),
        }
    }

    fn tcf_fault(&mut self, error: VendorApiError) -> BridgeStep {
        tracing::warn!(error = %error, "TCF API failed, falling back to DOM");
        self.tcf = TcfState::Faulted;
        BridgeStep::Fallback
    }

    fn probe_sourcepoint<N: Copy + Eq + Hash>(
        &mut self,
        vendors: &dyn VendorGlobals,
        state: &mut ConsentState<N>,
        now: Instant,
        poll: bool,
    ) -> BridgeStep {
        if self.sourcepoint == SourcePointState::Bound {
            return BridgeStep::Idle;
        }

        let Some(api) = vendors.sourcepoint_api() else {
            if !poll {
                return BridgeStep::Idle;
            }
            let attempts = self.sp_probes.unwrap_or(0) + 1;
            return match self.backoff(attempts) {
                Some(delay) => {
                    self.sp_probes = Some(attempts);
                    BridgeStep::ProbeAgain(Framework::SourcePoint, delay)
                }
                None => {
                    tracing::debug!(attempts, "SourcePoint global not found, giving up");
                    self.sp_probes = None;
                    BridgeStep::Idle
                }
            };
        };

        tracing::debug!("SourcePoint global bound");
        self.sourcepoint = SourcePointState::Bound;
        self.sp_probes = None;

        self.sourcepoint_decline(api, state, now)
    }

    fn sourcepoint_decline<N: Copy + Eq + Hash>(
        &mut self,
        api: &dyn SourcePointApi,
        state: &mut ConsentState<N>,
        now: Instant,
    ) -> BridgeStep {
        let entries = [
            SpEntryPoint::ChoiceSelect(SP_REJECT_ALL_CHOICE),
            SpEntryPoint::ExecuteMessaging,
            SpEntryPoint::Decline,
        ];
        let supported: Vec<SpEntryPoint> = entries
            .into_iter()
            .filter(|entry| api.supports(*entry))
            .collect();
        if supported.is_empty() {
            tracing::debug!("SourcePoint global exposes no known entry point");
            self.sp_decline_pending = false;
            return BridgeStep::Fallback;
        }

        match state.admission(now) {
            Admission::Allowed => {}
            Admission::Throttled { retry_at } => {
                self.sp_decline_pending = true;
                return BridgeStep::Deferred(Framework::SourcePoint, retry_at);
            }
            Admission::Exhausted | Admission::Resolved => {
                self.sp_decline_pending = false;
                return BridgeStep::Idle;
            }
        }

        self.sp_decline_pending = false;
        state.record_attempt(now);
        let mut declined = false;
        for entry in supported {
            match api.invoke(entry) {
                Ok(()) => {
                    if !matches!(entry, SpEntryPoint::ExecuteMessaging) {
                        declined = true;
                    }
                }
                Err(e) => tracing::warn!(entry = ?entry, error = %e, "SourcePoint call failed"),
            }
        }

        if declined {
            BridgeStep::Declined(Resolution::SourcePointDecline)
        } else {
            BridgeStep::Fallback
        }
    }
}
