//! In-memory fake adapters for driving the orchestrator.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use inbox_digest::digest::{Orchestrator, OrchestratorConfig, SummaryRecord};
use inbox_digest::error::{LlmError, MailError, StoreError};
use inbox_digest::mail::{MailMessage, MailSource, MessageId};
use inbox_digest::store::RecordStore;
use inbox_digest::summarize::Summarizer;

// ── Mailbox ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct MailboxState {
    /// Insertion order is listing order.
    order: Vec<MessageId>,
    messages: BTreeMap<String, MailMessage>,
    read: HashSet<MessageId>,
    fail_list: bool,
    fail_fetch: HashSet<MessageId>,
    fail_mark: HashSet<MessageId>,
    hang_list: bool,
    /// Delay before the flag is set.
    slow_mark: HashMap<MessageId, Duration>,
    /// Delay after the flag is set, like a server that applies the STORE
    /// but answers late.
    late_mark_reply: HashMap<MessageId, Duration>,
}

#[derive(Default)]
pub struct FakeMailbox {
    state: Mutex<MailboxState>,
    pub list_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub mark_calls: AtomicUsize,
}

impl FakeMailbox {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_unread(messages: &[(&str, &str, &str, &str)]) -> Arc<Self> {
        let mailbox = Self::new();
        for (id, sender, subject, body) in messages {
            mailbox.deliver(id, sender, subject, body);
        }
        mailbox
    }

    pub fn deliver(&self, id: &str, sender: &str, subject: &str, body: &str) {
        let mut state = self.state.lock().unwrap();
        state.order.push(MessageId::from(id));
        state
            .messages
            .insert(id.to_string(), MailMessage::new(sender, subject, body));
    }

    pub fn fail_list(&self) {
        self.state.lock().unwrap().fail_list = true;
    }

    pub fn hang_list(&self) {
        self.state.lock().unwrap().hang_list = true;
    }

    pub fn fail_fetch_of(&self, id: &str) {
        self.state.lock().unwrap().fail_fetch.insert(MessageId::from(id));
    }

    pub fn fail_mark_of(&self, id: &str) {
        self.state.lock().unwrap().fail_mark.insert(MessageId::from(id));
    }

    pub fn slow_mark_of(&self, id: &str, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .slow_mark
            .insert(MessageId::from(id), delay);
    }

    pub fn late_mark_reply_of(&self, id: &str, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .late_mark_reply
            .insert(MessageId::from(id), delay);
    }

    pub fn is_read(&self, id: &str) -> bool {
        self.state.lock().unwrap().read.contains(&MessageId::from(id))
    }

    pub fn unread_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.order.iter().filter(|id| !state.read.contains(*id)).count()
    }

    pub fn total_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
            + self.fetch_calls.load(Ordering::SeqCst)
            + self.mark_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailSource for FakeMailbox {
    fn name(&self) -> &str {
        "fake"
    }

    async fn list_unread_ids(&self) -> Result<Vec<MessageId>, MailError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let (fail, hang) = {
            let state = self.state.lock().unwrap();
            (state.fail_list, state.hang_list)
        };
        if hang {
            std::future::pending::<()>().await;
        }
        if fail {
            return Err(MailError::Connection {
                host: "imap.test".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        let state = self.state.lock().unwrap();
        Ok(state
            .order
            .iter()
            .filter(|id| !state.read.contains(*id))
            .cloned()
            .collect())
    }

    async fn fetch(&self, id: &MessageId) -> Result<MailMessage, MailError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        if state.fail_fetch.contains(id) {
            return Err(MailError::Protocol(format!("FETCH {id} failed")));
        }
        state
            .messages
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| MailError::NotFound { id: id.to_string() })
    }

    async fn mark_read(&self, id: &MessageId) -> Result<(), MailError> {
        self.mark_calls.fetch_add(1, Ordering::SeqCst);
        let (before, after) = {
            let state = self.state.lock().unwrap();
            (
                state.slow_mark.get(id).copied(),
                state.late_mark_reply.get(id).copied(),
            )
        };
        if let Some(delay) = before {
            tokio::time::sleep(delay).await;
        }
        {
            let mut state = self.state.lock().unwrap();
            if state.fail_mark.contains(id) {
                return Err(MailError::Protocol(format!("STORE {id} failed")));
            }
            state.read.insert(id.clone());
        }
        if let Some(delay) = after {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), MailError> {
        if self.state.lock().unwrap().fail_list {
            return Err(MailError::Connection {
                host: "imap.test".to_string(),
                reason: "down".to_string(),
            });
        }
        Ok(())
    }
}

// ── Summarizer ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeSummarizer {
    fail: AtomicBool,
    panic: AtomicBool,
    pub inputs: Mutex<Vec<String>>,
    /// When set, `summarize` signals `entered` and then waits on `release`.
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl FakeSummarizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A summarizer that blocks until released. Returns (summarizer, entered, release).
    pub fn gated() -> (Arc<Self>, Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let summarizer = Arc::new(Self {
            gate: Some((Arc::clone(&entered), Arc::clone(&release))),
            ..Self::default()
        });
        (summarizer, entered, release)
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn recover(&self) {
        self.fail.store(false, Ordering::SeqCst);
    }

    pub fn panic_on_call(&self) {
        self.panic.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.inputs.lock().unwrap().len()
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    async fn summarize(&self, combined_text: &str) -> Result<String, LlmError> {
        self.inputs.lock().unwrap().push(combined_text.to_string());

        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }
        if self.panic.load(Ordering::SeqCst) {
            panic!("summarizer exploded");
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(LlmError::RateLimited {
                provider: "fake".to_string(),
                retry_after: Some(Duration::from_secs(30)),
            });
        }
        Ok("- three things happened".to_string())
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        Ok(())
    }
}

// ── Record store ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeStore {
    fail: AtomicBool,
    pub rows: Mutex<Vec<SummaryRecord>>,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn rows(&self) -> Vec<SummaryRecord> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordStore for FakeStore {
    fn name(&self) -> &str {
        "fake"
    }

    async fn append_row(&self, record: &SummaryRecord) -> Result<(), StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::PermissionDenied("403 Forbidden".to_string()));
        }
        self.rows.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Http("503".to_string()));
        }
        Ok(())
    }
}

// ── Wiring ──────────────────────────────────────────────────────────────

pub fn orchestrator(
    mail: &Arc<FakeMailbox>,
    summarizer: &Arc<FakeSummarizer>,
    store: &Arc<FakeStore>,
) -> Arc<Orchestrator> {
    orchestrator_with_timeout(mail, summarizer, store, Duration::from_secs(5))
}

pub fn orchestrator_with_timeout(
    mail: &Arc<FakeMailbox>,
    summarizer: &Arc<FakeSummarizer>,
    store: &Arc<FakeStore>,
    adapter_timeout: Duration,
) -> Arc<Orchestrator> {
    Arc::new(Orchestrator::new(
        mail.clone(),
        summarizer.clone(),
        store.clone(),
        OrchestratorConfig { adapter_timeout },
    ))
}

/// Three messages A, B, C in listing order.
pub fn abc_mailbox() -> Arc<FakeMailbox> {
    FakeMailbox::with_unread(&[
        ("A", "alice@example.com", "Invoice #12", "Please pay by Friday."),
        ("B", "bob@example.com", "Standup moved", "Now at 10am."),
        ("C", "carol@example.com", "Lunch?", "Tacos at noon."),
    ])
}
