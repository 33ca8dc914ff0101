//! Startup sequence
//!
//! After the link opens the gateway turns on auto-information and primes
//! [`RadioState`] with one query per tracked field. Steps run in order through
//! the normal submission path, so they queue behind (or ahead of) adapter
//! traffic like any other client.

use cat_protocol::{codec, MeterKind, Receiver};
use tracing::{debug, info, warn};

use crate::dispatcher::{DispatchOutcome, StateDispatcher};
use crate::error::MuxError;
use crate::multiplexer::{MuxHandle, Reply, ReplyMatch};
use crate::state::RadioState;

/// Client id used for init traffic
pub const INIT_CLIENT: &str = "init";

/// One step of the startup sequence
#[derive(Debug, Clone)]
pub struct InitStep {
    /// Human-readable name for logs
    pub label: &'static str,
    /// Command text
    pub command: String,
    /// How the reply is recognised
    pub expect: ReplyMatch,
    /// Skip the step unless this holds for the state so far
    pub precondition: Option<fn(&RadioState) -> bool>,
}

impl InitStep {
    /// A query whose reply primes the state
    pub fn query(label: &'static str, command: String) -> Self {
        let expect = ReplyMatch::for_query(&command);
        Self {
            label,
            command,
            expect,
            precondition: None,
        }
    }

    /// A command the device does not answer
    pub fn set(label: &'static str, command: String) -> Self {
        Self {
            label,
            command,
            expect: ReplyMatch::None,
            precondition: None,
        }
    }

    pub fn when(mut self, precondition: fn(&RadioState) -> bool) -> Self {
        self.precondition = Some(precondition);
        self
    }
}

/// The standard startup sequence
pub fn default_init_sequence() -> Vec<InitStep> {
    vec![
        InitStep::set("auto-information on", codec::encode_auto_info(true)),
        InitStep::query("main frequency", codec::encode_get_frequency(Receiver::Main)),
        InitStep::query("sub frequency", codec::encode_get_frequency(Receiver::Sub)),
        InitStep::query("main mode", codec::encode_get_mode(Receiver::Main)),
        // Radios without a sub receiver leave FB unanswered
        InitStep::query("sub mode", codec::encode_get_mode(Receiver::Sub))
            .when(|s| s.sub.frequency_hz.is_some()),
        InitStep::query("main antenna", codec::encode_get_antenna(Receiver::Main)),
        InitStep::query("power", codec::encode_get_power()),
        InitStep::query("transmit", codec::encode_get_transmit()),
        InitStep::query("signal", codec::encode_get_meter(MeterKind::Signal(Receiver::Main))),
    ]
}

/// Outcome of a startup run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InitReport {
    /// Steps that completed
    pub completed: Vec<&'static str>,
    /// Steps skipped by their precondition
    pub skipped: Vec<&'static str>,
    /// Steps that failed softly (timeout, bad reply)
    pub failed: Vec<&'static str>,
}

/// Run `steps` in order
///
/// Soft failures are recorded and the sequence continues. Losing the link
/// aborts it.
pub async fn run_init_sequence(
    handle: &MuxHandle,
    dispatcher: &StateDispatcher,
    steps: &[InitStep],
) -> Result<InitReport, MuxError> {
    let mut report = InitReport::default();

    for step in steps {
        if let Some(precondition) = step.precondition {
            if !precondition(&dispatcher.state().snapshot()) {
                debug!(step = step.label, "precondition not met, skipping");
                report.skipped.push(step.label);
                continue;
            }
        }

        let result = handle
            .submit(
                INIT_CLIENT,
                step.command.clone(),
                step.expect.clone(),
                handle.default_timeout(),
            )
            .await;

        match result {
            Ok(Reply::Message(msg)) => match dispatcher.apply_reply(&msg) {
                DispatchOutcome::Malformed | DispatchOutcome::Unknown => {
                    warn!(step = step.label, reply = msg.text(), "unusable init reply");
                    report.failed.push(step.label);
                }
                _ => report.completed.push(step.label),
            },
            Ok(Reply::Written) => report.completed.push(step.label),
            Err(MuxError::NotConnected) => return Err(MuxError::NotConnected),
            Err(e) => {
                debug!(step = step.label, "init step failed: {}", e);
                report.failed.push(step.label);
            }
        }
    }

    info!(
        completed = report.completed.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "Startup sequence finished"
    );
    Ok(report)
}
