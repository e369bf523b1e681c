//! Mail source abstraction.
//!
//! The orchestrator only ever sees [`MailSource`]: list unread ids, fetch one
//! message, mark one message read. Two backends ship:
//! - **IMAP**: raw IMAP over rustls, `UNSEEN` search, `BODY.PEEK[]` fetch
//! - **Gmail**: the Gmail REST API with a bearer token

pub mod gmail;
pub mod imap;
pub mod text;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{EnvLookup, env_or};
use crate::error::{ConfigError, MailError};

pub use gmail::{GmailConfig, GmailSource};
pub use imap::{ImapConfig, ImapSource};

/// Provider-assigned message identifier, unique per mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The parts of a message the digest cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    pub sender: String,
    pub subject: String,
    pub body: String,
}

impl MailMessage {
    pub fn new(
        sender: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Capability interface to a mailbox.
///
/// Read-state belongs to the mailbox; the only way to change it is
/// [`MailSource::mark_read`].
#[async_trait]
pub trait MailSource: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Identifiers of unread messages, in provider order.
    async fn list_unread_ids(&self) -> Result<Vec<MessageId>, MailError>;

    /// Sender, subject and body of one message. Must not change read-state.
    async fn fetch(&self, id: &MessageId) -> Result<MailMessage, MailError>;

    /// Transition one message from unread to read.
    async fn mark_read(&self, id: &MessageId) -> Result<(), MailError>;

    /// Cheap reachability check.
    async fn health_check(&self) -> Result<(), MailError>;
}

/// Which mailbox backend to use.
#[derive(Debug, Clone)]
pub enum MailConfig {
    Imap(ImapConfig),
    Gmail(GmailConfig),
}

impl MailConfig {
    /// `DIGEST_MAIL_BACKEND` selects `imap` (default) or `gmail`.
    pub fn from_lookup(env: EnvLookup<'_>) -> Result<Self, ConfigError> {
        match env_or(env, "DIGEST_MAIL_BACKEND", "imap")
            .to_ascii_lowercase()
            .as_str()
        {
            "imap" => Ok(MailConfig::Imap(ImapConfig::from_lookup(env)?)),
            "gmail" => Ok(MailConfig::Gmail(GmailConfig::from_lookup(env)?)),
            other => Err(ConfigError::InvalidValue {
                key: "DIGEST_MAIL_BACKEND".to_string(),
                message: format!("unknown backend '{other}' (expected imap or gmail)"),
            }),
        }
    }

    /// Most messages one run will pick up.
    pub fn max_batch(&self) -> usize {
        match self {
            MailConfig::Imap(cfg) => cfg.max_batch,
            MailConfig::Gmail(cfg) => cfg.max_batch,
        }
    }
}

/// Create a mail source from configuration.
pub fn create_source(config: &MailConfig) -> Result<Arc<dyn MailSource>, MailError> {
    match config {
        MailConfig::Imap(cfg) => {
            tracing::info!(host = %cfg.host, mailbox = %cfg.mailbox, "Using IMAP mail source");
            Ok(Arc::new(ImapSource::new(cfg.clone())))
        }
        MailConfig::Gmail(cfg) => {
            tracing::info!("Using Gmail mail source");
            Ok(Arc::new(GmailSource::new(cfg.clone())?))
        }
    }
}
