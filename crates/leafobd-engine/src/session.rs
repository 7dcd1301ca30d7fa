//! ELM327 session state machine
//!
//! The adapter is strictly half-duplex: one command in flight, one
//! prompt-terminated reply back. The session enforces that with an explicit
//! state machine and owns the init ladder, the per-header flow-control
//! setup, and the classification of link loss versus timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::elm;
use crate::pid::PidRequest;
use crate::transport::{LinkEvent, ObdLink, TransportError};

/// Deadline for adapter-local AT commands, which never touch the bus
const AT_TIMEOUT: Duration = Duration::from_secs(2);

/// Protocol and bus setup after reset: echo off, CAN 500k/11-bit, headers
/// on, linefeeds off, spaces off, automatic formatting off
const INIT_LADDER: [&str; 6] = ["ATE0", "ATSP6", "ATH1", "ATL0", "ATS0", "ATCAF0"];

/// Session lifecycle states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected { reason: Option<String> },
    Connecting,
    /// Link is up, init ladder in progress
    Initializing,
    Ready,
    /// A request is in flight
    Busy,
}

/// Errors surfaced by session operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error("session is not connected")]
    NotConnected,

    /// A request was issued while another was in flight
    #[error("request already in flight")]
    ProtocolViolation,

    #[error("link lost")]
    LinkLost,

    #[error("no reply within the deadline")]
    Timeout,

    #[error("adapter init failed: {0}")]
    InitFailed(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Half-duplex command/reply session over an [`ObdLink`]
pub struct ElmSession {
    link: Arc<dyn ObdLink>,
    state: ConnectionState,
    /// Incoming link events, subscribed once per connection. Stale events
    /// are drained before every command goes out.
    rx: Option<broadcast::Receiver<LinkEvent>>,
    /// Request header currently programmed into the adapter; flow-control
    /// setup is only re-sent when it changes
    last_header: Option<String>,
    reset_settle: Duration,
}

impl ElmSession {
    pub fn new(link: Arc<dyn ObdLink>, reset_settle: Duration) -> Self {
        Self {
            link,
            state: ConnectionState::Disconnected { reason: None },
            rx: None,
            last_header: None,
            reset_settle,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    /// Open the link and run the init ladder. A no-op when already Ready.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        match self.state {
            ConnectionState::Disconnected { .. } => {}
            ConnectionState::Ready => return Ok(()),
            _ => return Err(SessionError::ProtocolViolation),
        }

        self.state = ConnectionState::Connecting;
        if let Err(e) = self.link.open().await {
            self.state = ConnectionState::Disconnected {
                reason: Some(e.to_string()),
            };
            return Err(e.into());
        }

        self.rx = Some(self.link.subscribe());
        self.state = ConnectionState::Initializing;
        if let Err(e) = self.initialize().await {
            warn!(error = %e, "adapter init failed");
            let _ = self.link.close().await;
            self.rx = None;
            self.state = ConnectionState::Disconnected {
                reason: Some(e.to_string()),
            };
            return Err(e);
        }

        self.last_header = None;
        self.state = ConnectionState::Ready;
        info!("adapter session ready");
        Ok(())
    }

    async fn initialize(&mut self) -> Result<(), SessionError> {
        // ATZ answers with a version banner and, on some clones, garbage.
        // Wait out the reset and discard whatever arrived.
        self.write(b"ATZ\r").await?;
        tokio::time::sleep(self.reset_settle).await;
        self.drain_stale()?;

        for command in INIT_LADDER {
            let lines = self
                .transact(format!("{command}\r").as_bytes(), AT_TIMEOUT)
                .await?;
            if !elm::reply_is_ok(&lines) {
                return Err(SessionError::InitFailed(format!(
                    "{command} rejected: {lines:?}"
                )));
            }
        }
        Ok(())
    }

    /// Issue one PID request and return the raw reply lines.
    ///
    /// Fails immediately with [`SessionError::ProtocolViolation`] if a
    /// request is already in flight; the transport is not touched.
    pub async fn request(
        &mut self,
        request: &PidRequest,
        timeout: Duration,
    ) -> Result<Vec<String>, SessionError> {
        match self.state {
            ConnectionState::Busy => return Err(SessionError::ProtocolViolation),
            ConnectionState::Ready => {}
            _ => return Err(SessionError::NotConnected),
        }

        self.state = ConnectionState::Busy;
        let result = self.run_request(request, timeout).await;
        match &result {
            Ok(_) | Err(SessionError::Timeout) | Err(SessionError::InitFailed(_)) => {
                self.state = ConnectionState::Ready;
            }
            Err(e) => {
                // Link-level failures invalidate the whole session
                debug!(error = %e, "request failed, marking session disconnected");
                let _ = self.link.close().await;
                self.rx = None;
                self.last_header = None;
                self.state = ConnectionState::Disconnected {
                    reason: Some(e.to_string()),
                };
            }
        }
        result
    }

    async fn run_request(
        &mut self,
        request: &PidRequest,
        timeout: Duration,
    ) -> Result<Vec<String>, SessionError> {
        self.ensure_header(request.header).await?;
        self.transact(
            &elm::encode_command(request.command, request.frames_hint),
            timeout,
        )
        .await
    }

    /// Program the request header and ISO-TP flow control for it. Skipped
    /// when the adapter already holds this header.
    async fn ensure_header(&mut self, header: &str) -> Result<(), SessionError> {
        if self.last_header.as_deref() == Some(header) {
            return Ok(());
        }
        let commands = [
            format!("ATSH{header}"),
            format!("ATFCSH{header}"),
            "ATFCSD300000".to_owned(),
            "ATFCSM1".to_owned(),
        ];
        for command in &commands {
            let lines = self
                .transact(format!("{command}\r").as_bytes(), AT_TIMEOUT)
                .await?;
            if !elm::reply_is_ok(&lines) {
                return Err(SessionError::InitFailed(format!("{command} rejected")));
            }
        }
        self.last_header = Some(header.to_owned());
        Ok(())
    }

    /// Write one command and collect the prompt-terminated reply.
    ///
    /// Anything still sitting on the link, such as a late reply to a
    /// request that already timed out or bytes from an abandoned exchange,
    /// is drained before the command goes out.
    async fn transact(
        &mut self,
        command: &[u8],
        timeout: Duration,
    ) -> Result<Vec<String>, SessionError> {
        self.drain_stale()?;
        self.write(command).await?;
        let rx = self.rx.as_mut().ok_or(SessionError::NotConnected)?;

        let deadline = tokio::time::Instant::now() + timeout;
        let mut buffer = Vec::new();
        loop {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(SessionError::Timeout);
            }
            match tokio::time::timeout(deadline - now, rx.recv()).await {
                Ok(Ok(LinkEvent::Data(bytes))) => {
                    buffer.extend_from_slice(&bytes);
                    if let Some(lines) = elm::take_reply(&buffer) {
                        return Ok(lines);
                    }
                }
                Ok(Ok(LinkEvent::Closed)) => return Err(SessionError::LinkLost),
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Err(SessionError::LinkLost)
                }
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    warn!(skipped, "link events lagged");
                }
                Err(_) => return Err(SessionError::Timeout),
            }
        }
    }

    /// Discard link events that arrived before this point
    fn drain_stale(&mut self) -> Result<(), SessionError> {
        let rx = self.rx.as_mut().ok_or(SessionError::NotConnected)?;
        loop {
            match rx.try_recv() {
                Ok(LinkEvent::Data(bytes)) => {
                    debug!(len = bytes.len(), "discarding stale link bytes");
                }
                Ok(LinkEvent::Closed) => return Err(SessionError::LinkLost),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return Ok(()),
            }
        }
    }

    async fn write(&self, data: &[u8]) -> Result<(), SessionError> {
        self.link.write(data).await.map_err(|e| match e {
            // A failed write means the peer is gone
            TransportError::NotConnected | TransportError::WriteFailed(_) => {
                SessionError::LinkLost
            }
            other => SessionError::Transport(other),
        })
    }

    /// Recover after an abandoned request: the in-flight exchange is
    /// discarded and the session returns to Ready. Stale reply bytes cannot
    /// corrupt later requests because every transaction drains the link
    /// before writing.
    pub fn reset_after_cancellation(&mut self) {
        if self.state == ConnectionState::Busy {
            debug!("discarding abandoned in-flight request");
            self.state = ConnectionState::Ready;
        }
    }

    /// Tear the session down. Idempotent.
    pub async fn disconnect(&mut self) {
        if matches!(self.state, ConnectionState::Disconnected { .. }) {
            return;
        }
        let _ = self.link.close().await;
        self.rx = None;
        self.last_header = None;
        self.state = ConnectionState::Disconnected { reason: None };
        info!("session disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MockConfig;
    use crate::pid;
    use crate::transport::{MockLink, MockReply};

    fn session_over(link: &Arc<MockLink>) -> ElmSession {
        let dyn_link: Arc<dyn ObdLink> = Arc::clone(link) as Arc<dyn ObdLink>;
        ElmSession::new(dyn_link, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn connect_runs_the_init_ladder() {
        let link = Arc::new(MockLink::new(MockConfig::default()));
        let mut session = session_over(&link);
        session.connect().await.unwrap();

        assert!(session.is_ready());
        let sent = link.sent_commands();
        assert_eq!(
            sent,
            vec!["ATZ", "ATE0", "ATSP6", "ATH1", "ATL0", "ATS0", "ATCAF0"]
        );
    }

    #[tokio::test]
    async fn rejected_init_command_fails_the_connect() {
        let link = Arc::new(MockLink::new(MockConfig::default()));
        link.on("ATSP6", MockReply::Reply("?".to_owned()));
        let mut session = session_over(&link);

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::InitFailed(_)));
        assert!(matches!(
            session.state(),
            ConnectionState::Disconnected { reason: Some(_) }
        ));
    }

    #[tokio::test]
    async fn header_setup_is_cached_until_it_changes() {
        let link = Arc::new(MockLink::new(MockConfig::default()));
        link.on("010D", MockReply::Reply("7E803410D32".to_owned()));
        link.on("03220E01", MockReply::Reply("76306620E01012345".to_owned()));
        let mut session = session_over(&link);
        session.connect().await.unwrap();

        let speed = pid::lookup("vehicle_speed").unwrap();
        let odometer = pid::lookup("odometer").unwrap();
        session.request(speed, Duration::from_secs(1)).await.unwrap();
        session.request(speed, Duration::from_secs(1)).await.unwrap();
        session
            .request(odometer, Duration::from_secs(1))
            .await
            .unwrap();

        let headers: Vec<String> = link
            .sent_commands()
            .into_iter()
            .filter(|c| c.starts_with("ATSH"))
            .collect();
        assert_eq!(headers, vec!["ATSH7DF", "ATSH743"]);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_adapter_times_out_and_returns_to_ready() {
        let link = Arc::new(MockLink::new(MockConfig::default()));
        link.on("010D", MockReply::Silent);
        let mut session = session_over(&link);
        session.connect().await.unwrap();

        let speed = pid::lookup("vehicle_speed").unwrap();
        let err = session
            .request(speed, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Timeout));
        assert!(session.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn late_reply_from_a_timed_out_request_is_discarded() {
        // Replies take 300 ms, longer than the first request's deadline
        let link = Arc::new(MockLink::new(MockConfig {
            latency_ms: 300,
            chunk_size: 20,
        }));
        link.once("010D", MockReply::Reply("7E803410D32".to_owned()));
        link.on("010D", MockReply::Reply("7E803410DFF".to_owned()));
        let mut session = session_over(&link);
        session.connect().await.unwrap();

        let speed = pid::lookup("vehicle_speed").unwrap();
        let err = session
            .request(speed, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Timeout));

        // The first reply arrives while no request is in flight
        tokio::time::sleep(Duration::from_millis(400)).await;

        // The next request must get its own reply, not the stale one
        let lines = session
            .request(speed, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(lines, vec!["7E803410DFF"]);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_request_leaves_busy_until_reset() {
        let link = Arc::new(MockLink::new(MockConfig::default()));
        link.on("010D", MockReply::Silent);
        let mut session = session_over(&link);
        session.connect().await.unwrap();

        let speed = pid::lookup("vehicle_speed").unwrap();
        // Abandon the request mid-flight
        let _ = tokio::time::timeout(
            Duration::from_millis(50),
            session.request(speed, Duration::from_secs(5)),
        )
        .await;
        assert_eq!(*session.state(), ConnectionState::Busy);

        // A new request must fail fast without touching the transport
        let writes_before = link.sent_commands().len();
        let err = session
            .request(speed, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::ProtocolViolation));
        assert_eq!(link.sent_commands().len(), writes_before);

        session.reset_after_cancellation();
        assert!(session.is_ready());
    }

    #[tokio::test]
    async fn link_drop_mid_request_marks_disconnected() {
        let link = Arc::new(MockLink::new(MockConfig::default()));
        link.on("010D", MockReply::DropLink);
        let mut session = session_over(&link);
        session.connect().await.unwrap();

        let speed = pid::lookup("vehicle_speed").unwrap();
        let err = session
            .request(speed, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::LinkLost));
        assert!(matches!(
            session.state(),
            ConnectionState::Disconnected { reason: Some(_) }
        ));
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let link = Arc::new(MockLink::new(MockConfig::default()));
        let mut session = session_over(&link);
        session.connect().await.unwrap();

        session.disconnect().await;
        session.disconnect().await;
        assert!(matches!(
            session.state(),
            ConnectionState::Disconnected { reason: None }
        ));
    }
}
