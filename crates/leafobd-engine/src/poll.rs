//! Poll cycle orchestration
//!
//! One cycle walks the configured PID set in order, classifies every
//! failure per signal, and seals the result into a snapshot. A cycle where
//! nothing answered is still a successful cycle; only a dead connection
//! that cannot be re-established fails it.

use std::sync::Arc;
use std::time::Duration;

use leafobd_core::{DecodedSignal, SnapshotBuilder, Validity, VehicleSnapshot};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{PidSet, PollConfig};
use crate::elm::{self, CodecError};
use crate::pid::{self, PidRequest};
use crate::session::{ElmSession, SessionError};
use crate::transport::ObdLink;

/// Cycle-level failure: the adapter connection could not be (re)established
#[derive(Debug, Error)]
pub enum PollError {
    #[error("connection failed: {0}")]
    Connection(#[from] SessionError),
}

enum RequestFailure {
    /// Transient bus-side fault; worth exactly one retry
    Retryable(Validity),
    /// Deterministic for this cycle; record and move on
    Terminal(Validity),
    /// The session itself is unusable
    Fatal(SessionError),
}

/// Drives poll cycles over a single shared session.
///
/// The session sits behind an async mutex, so overlapping `poll_once`
/// callers serialize instead of interleaving commands on the half-duplex
/// adapter. A caller that abandons its cycle mid-request leaves the session
/// Busy; the next cycle discards the stale exchange on entry.
pub struct PollOrchestrator {
    session: tokio::sync::Mutex<ElmSession>,
    config: PollConfig,
}

impl PollOrchestrator {
    pub fn new(link: Arc<dyn ObdLink>, config: PollConfig) -> Self {
        let session = ElmSession::new(link, Duration::from_millis(config.reset_settle_ms));
        Self {
            session: tokio::sync::Mutex::new(session),
            config,
        }
    }

    /// Run one cycle over the configured PID set
    pub async fn poll_once(&self) -> Result<VehicleSnapshot, PollError> {
        let requests = match self.config.pid_set {
            PidSet::Full => pid::full_set(),
            PidSet::Reduced => pid::reduced_set(),
        };
        self.poll_requests(requests).await
    }

    /// Run one cycle over an explicit request list
    pub async fn poll_requests(
        &self,
        requests: &[&'static PidRequest],
    ) -> Result<VehicleSnapshot, PollError> {
        let mut session = self.session.lock().await;
        session.reset_after_cancellation();

        let timeout = Duration::from_millis(self.config.request_timeout_ms);
        let mut builder = SnapshotBuilder::new();
        // The initial connect is free; after that, one mid-cycle reconnect
        // is allowed before the cycle gives up
        let mut connects_left: u32 = if session.is_ready() { 1 } else { 2 };

        for request in requests {
            let names = request.signal_names();

            if !session.is_ready() {
                if connects_left == 0 {
                    return Err(SessionError::LinkLost.into());
                }
                connects_left -= 1;
                info!("session not ready, (re)connecting");
                session.connect().await?;
            }

            let mut retried = false;
            let outcome = loop {
                match self.execute(&mut session, request, timeout).await {
                    Ok(signals) => break Ok(signals),
                    Err(RequestFailure::Retryable(validity)) if !retried => {
                        debug!(pid = request.key, ?validity, "retrying request");
                        retried = true;
                    }
                    Err(RequestFailure::Retryable(validity))
                    | Err(RequestFailure::Terminal(validity)) => break Err(validity),
                    Err(RequestFailure::Fatal(e)) => return Err(e.into()),
                }
            };

            match outcome {
                Ok(signals) => {
                    for (name, signal) in signals {
                        builder.record(name, signal);
                    }
                }
                Err(validity) => {
                    warn!(pid = request.key, ?validity, "request failed");
                    builder.record_failed(&names, validity);
                }
            }
        }

        Ok(builder.finish())
    }

    async fn execute(
        &self,
        session: &mut ElmSession,
        request: &PidRequest,
        timeout: Duration,
    ) -> Result<Vec<(&'static str, leafobd_core::DecodedSignal)>, RequestFailure> {
        let lines = session
            .request(request, timeout)
            .await
            .map_err(|e| match e {
                SessionError::Timeout => RequestFailure::Terminal(Validity::Timeout),
                SessionError::LinkLost => RequestFailure::Terminal(Validity::LinkLost),
                other => RequestFailure::Fatal(other),
            })?;

        let payload = match elm::parse_payload(&lines, request.command) {
            Ok(payload) => payload,
            Err(CodecError::NotSupported) => {
                return Err(RequestFailure::Retryable(Validity::NotSupported))
            }
            Err(CodecError::Malformed(reason)) => {
                debug!(pid = request.key, %reason, "malformed reply");
                return Err(RequestFailure::Retryable(Validity::MalformedFrame));
            }
        };

        let signals = pid::decode_payload(request, &payload);
        // A negative response or a structurally wrong reply fails every
        // signal the same way; it gets the same single retry a bus-side
        // fault gets, since the next reply may be clean
        if let Some(validity) = uniform_failure(&signals) {
            return Err(RequestFailure::Retryable(validity));
        }
        Ok(signals)
    }

    /// Tear down the underlying session
    pub async fn shutdown(&self) {
        self.session.lock().await.disconnect().await;
    }
}

/// The shared failure when every signal of a request failed identically
/// with a retryable validity
fn uniform_failure(signals: &[(&'static str, DecodedSignal)]) -> Option<Validity> {
    let first = signals.first()?.1.validity;
    if !matches!(first, Validity::MalformedFrame | Validity::NotSupported) {
        return None;
    }
    signals
        .iter()
        .all(|(_, signal)| signal.validity == first)
        .then_some(first)
}
