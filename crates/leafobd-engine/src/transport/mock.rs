//! Scripted in-process link for tests and bench-free development
//!
//! The mock pairs command prefixes with scripted behaviours. Replies are
//! delivered asynchronously, optionally delayed and split into small chunks,
//! so the session's partial-read handling gets exercised the same way a real
//! GATT link would exercise it.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::config::MockConfig;

use super::error::TransportError;
use super::link::{LinkEvent, ObdLink};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Scripted behaviour for one command prefix
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Deliver these bytes followed by the ELM prompt
    Reply(String),
    /// Swallow the command; the session will hit its deadline
    Silent,
    /// Drop the link mid-request
    DropLink,
}

#[derive(Debug, Clone)]
struct MockRule {
    prefix: String,
    reply: MockReply,
    once: bool,
}

/// In-process [`ObdLink`] with scripted replies
pub struct MockLink {
    config: MockConfig,
    open: AtomicBool,
    events_tx: broadcast::Sender<LinkEvent>,
    rules: RwLock<Vec<MockRule>>,
    sent: RwLock<Vec<String>>,
}

impl MockLink {
    pub fn new(config: MockConfig) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            open: AtomicBool::new(false),
            events_tx,
            rules: RwLock::new(Vec::new()),
            sent: RwLock::new(Vec::new()),
        }
    }

    /// Script a reply for every command starting with `prefix`
    pub fn on(&self, prefix: &str, reply: MockReply) {
        self.rules.write().push(MockRule {
            prefix: prefix.to_owned(),
            reply,
            once: false,
        });
    }

    /// Script a reply consumed by the first matching command only. One-shot
    /// rules are matched before persistent ones.
    pub fn once(&self, prefix: &str, reply: MockReply) {
        self.rules.write().insert(
            0,
            MockRule {
                prefix: prefix.to_owned(),
                reply,
                once: true,
            },
        );
    }

    /// Commands written so far, prompt terminators stripped
    pub fn sent_commands(&self) -> Vec<String> {
        self.sent.read().clone()
    }

    /// Drop the link as if the adapter went out of range
    pub fn drop_link(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.events_tx.send(LinkEvent::Closed);
        }
    }

    fn deliver(&self, payload: String) {
        let tx = self.events_tx.clone();
        let latency = std::time::Duration::from_millis(self.config.latency_ms);
        let chunk_size = self.config.chunk_size.max(1);
        tokio::spawn(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            let bytes = format!("{payload}\r\r>").into_bytes();
            for chunk in bytes.chunks(chunk_size) {
                let _ = tx.send(LinkEvent::Data(chunk.to_vec()));
            }
        });
    }

    fn find_reply(&self, command: &str) -> Option<MockReply> {
        let mut rules = self.rules.write();
        let idx = rules.iter().position(|r| command.starts_with(&r.prefix))?;
        let reply = rules[idx].reply.clone();
        if rules[idx].once {
            rules.remove(idx);
        }
        Some(reply)
    }
}

#[async_trait]
impl ObdLink for MockLink {
    async fn open(&self) -> Result<(), TransportError> {
        self.open.store(true, Ordering::SeqCst);
        debug!("mock link opened");
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.open.store(false, Ordering::SeqCst);
        debug!("mock link closed");
        Ok(())
    }

    async fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotConnected);
        }
        let command = String::from_utf8_lossy(data)
            .trim_end_matches(['\r', '\n'])
            .to_owned();
        trace!(command = %command, "mock link write");
        self.sent.write().push(command.clone());

        match self.find_reply(&command) {
            Some(MockReply::Reply(payload)) => self.deliver(payload),
            Some(MockReply::Silent) => {}
            Some(MockReply::DropLink) => self.drop_link(),
            // Unscripted commands: adapter commands ack with OK, OBD
            // queries report nothing on the bus
            None if command.to_ascii_uppercase().starts_with("AT") => {
                self.deliver("OK".to_owned());
            }
            None => self.deliver("NO DATA".to_owned()),
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events_tx.subscribe()
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect_reply(rx: &mut broadcast::Receiver<LinkEvent>) -> Vec<u8> {
        let mut buffer = Vec::new();
        while !buffer.ends_with(b">") {
            match rx.recv().await.unwrap() {
                LinkEvent::Data(bytes) => buffer.extend_from_slice(&bytes),
                LinkEvent::Closed => panic!("link closed"),
            }
        }
        buffer
    }

    #[tokio::test]
    async fn scripted_reply_is_chunked_and_prompt_terminated() {
        let link = MockLink::new(MockConfig {
            latency_ms: 0,
            chunk_size: 4,
        });
        link.open().await.unwrap();
        link.on("010D", MockReply::Reply("7E803410D32".to_owned()));

        let mut rx = link.subscribe();
        link.write(b"010D\r").await.unwrap();
        let reply = collect_reply(&mut rx).await;
        assert_eq!(reply, b"7E803410D32\r\r>");
    }

    #[tokio::test]
    async fn one_shot_rule_wins_once_then_falls_through() {
        let link = MockLink::new(MockConfig::default());
        link.open().await.unwrap();
        link.on("010D", MockReply::Reply("7E803410D32".to_owned()));
        link.once("010D", MockReply::Reply("CAN ERROR".to_owned()));

        let mut rx = link.subscribe();
        link.write(b"010D\r").await.unwrap();
        assert_eq!(collect_reply(&mut rx).await, b"CAN ERROR\r\r>");
        link.write(b"010D\r").await.unwrap();
        assert_eq!(collect_reply(&mut rx).await, b"7E803410D32\r\r>");
    }

    #[tokio::test]
    async fn unscripted_at_command_acks_ok() {
        let link = MockLink::new(MockConfig::default());
        link.open().await.unwrap();
        let mut rx = link.subscribe();
        link.write(b"ATE0\r").await.unwrap();
        assert_eq!(collect_reply(&mut rx).await, b"OK\r\r>");
    }

    #[tokio::test]
    async fn drop_link_emits_closed_and_rejects_writes() {
        let link = MockLink::new(MockConfig::default());
        link.open().await.unwrap();
        let mut rx = link.subscribe();
        link.drop_link();
        assert!(matches!(rx.recv().await.unwrap(), LinkEvent::Closed));
        assert!(matches!(
            link.write(b"010D\r").await,
            Err(TransportError::NotConnected)
        ));
    }
}
