//! IMAP mail source — raw IMAP over rustls TLS.
//!
//! Every operation opens its own short session (connect, LOGIN, SELECT,
//! command, LOGOUT) on a blocking thread. Messages are fetched with
//! `BODY.PEEK[]` so fetching never sets `\Seen`; only [`ImapSource::mark_read`]
//! does.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mail_parser::MessageParser;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::text::{normalize_body, single_line, strip_html};
use super::{MailMessage, MailSource, MessageId};
use crate::config::{
    DEFAULT_ADAPTER_TIMEOUT_SECS, DEFAULT_MAX_BATCH, EnvLookup, env_or, env_parse, env_required,
};
use crate::error::{ConfigError, MailError};

// ── Configuration ───────────────────────────────────────────────────

/// IMAP mail source configuration.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub mailbox: String,
    /// Maximum unread ids returned by one listing.
    pub max_batch: usize,
    /// Socket connect/read/write timeout for the blocking session.
    pub io_timeout: Duration,
}

impl ImapConfig {
    pub fn from_lookup(env: EnvLookup<'_>) -> Result<Self, ConfigError> {
        let host = env_required(env, "EMAIL_IMAP_HOST", "Set the IMAP server, e.g. imap.gmail.com")?;
        let username = env_required(env, "EMAIL_USERNAME", "Set the mailbox login")?;
        let password = env_required(env, "EMAIL_PASSWORD", "Set the mailbox (app) password")?;
        let io_timeout: u64 =
            env_parse(env, "DIGEST_ADAPTER_TIMEOUT_SECS", DEFAULT_ADAPTER_TIMEOUT_SECS)?;

        Ok(Self {
            host,
            port: env_parse(env, "EMAIL_IMAP_PORT", 993)?,
            username,
            password: SecretString::from(password),
            mailbox: env_or(env, "EMAIL_IMAP_MAILBOX", "INBOX"),
            max_batch: env_parse(env, "DIGEST_MAX_BATCH", DEFAULT_MAX_BATCH)?,
            io_timeout: Duration::from_secs(io_timeout),
        })
    }
}

// ── Source ──────────────────────────────────────────────────────────

/// Mail source backed by an IMAP mailbox.
pub struct ImapSource {
    config: ImapConfig,
}

impl ImapSource {
    pub fn new(config: ImapConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MailSource for ImapSource {
    fn name(&self) -> &str {
        "imap"
    }

    async fn list_unread_ids(&self) -> Result<Vec<MessageId>, MailError> {
        let cfg = self.config.clone();
        run_blocking(move || {
            let mut session = ImapSession::connect(&cfg)?;
            let lines = session.command("UID SEARCH UNSEEN")?;
            session.logout();

            let mut uids = parse_search_response(&lines);
            uids.truncate(cfg.max_batch);
            debug!(count = uids.len(), "IMAP unseen listing");
            Ok(uids.into_iter().map(|uid| MessageId::new(uid.to_string())).collect())
        })
        .await
    }

    async fn fetch(&self, id: &MessageId) -> Result<MailMessage, MailError> {
        let uid = parse_uid(id)?;
        let cfg = self.config.clone();
        let id = id.clone();
        run_blocking(move || {
            let mut session = ImapSession::connect(&cfg)?;
            let raw = session.fetch_literal(&format!("UID FETCH {uid} BODY.PEEK[]"))?;
            session.logout();

            let raw = raw.ok_or_else(|| MailError::NotFound { id: id.to_string() })?;
            parse_message(&id, &raw)
        })
        .await
    }

    async fn mark_read(&self, id: &MessageId) -> Result<(), MailError> {
        let uid = parse_uid(id)?;
        let cfg = self.config.clone();
        run_blocking(move || {
            let mut session = ImapSession::connect(&cfg)?;
            session.command(&format!("UID STORE {uid} +FLAGS.SILENT (\\Seen)"))?;
            session.logout();
            Ok(())
        })
        .await
    }

    async fn health_check(&self) -> Result<(), MailError> {
        let cfg = self.config.clone();
        run_blocking(move || {
            let addr = resolve(&cfg)?;
            TcpStream::connect_timeout(&addr, cfg.io_timeout).map_err(|e| {
                MailError::Connection {
                    host: cfg.host.clone(),
                    reason: e.to_string(),
                }
            })?;
            Ok(())
        })
        .await
    }
}

/// Run blocking IMAP I/O off the async runtime.
async fn run_blocking<T, F>(f: F) -> Result<T, MailError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, MailError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| MailError::Protocol(format!("IMAP task failed: {e}")))?
}

fn resolve(config: &ImapConfig) -> Result<std::net::SocketAddr, MailError> {
    let connection_err = |reason: String| MailError::Connection {
        host: config.host.clone(),
        reason,
    };
    (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(|e| connection_err(e.to_string()))?
        .next()
        .ok_or_else(|| connection_err("no address resolved".to_string()))
}

// ── Session ─────────────────────────────────────────────────────────

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// One authenticated IMAP session with the configured mailbox selected.
struct ImapSession {
    stream: TlsStream,
    next_tag: u32,
}

impl ImapSession {
    fn connect(config: &ImapConfig) -> Result<Self, MailError> {
        let addr = resolve(config)?;
        let tcp = TcpStream::connect_timeout(&addr, config.io_timeout).map_err(|e| {
            MailError::Connection {
                host: config.host.clone(),
                reason: e.to_string(),
            }
        })?;
        tcp.set_read_timeout(Some(config.io_timeout))?;
        tcp.set_write_timeout(Some(config.io_timeout))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls::pki_types::ServerName::try_from(config.host.clone())
            .map_err(|e| MailError::Connection {
                host: config.host.clone(),
                reason: format!("invalid server name: {e}"),
            })?;
        let conn = rustls::ClientConnection::new(tls_config, server_name).map_err(|e| {
            MailError::Connection {
                host: config.host.clone(),
                reason: format!("TLS setup failed: {e}"),
            }
        })?;

        let mut session = Self {
            stream: rustls::StreamOwned::new(conn, tcp),
            next_tag: 1,
        };

        let greeting = session.read_line()?;
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(MailError::Protocol(format!(
                "unexpected greeting: {}",
                greeting.trim_end()
            )));
        }

        let login = format!(
            "LOGIN {} {}",
            quote(&config.username),
            quote(config.password.expose_secret())
        );
        session.command(&login).map_err(|e| match e {
            MailError::Protocol(reason) => MailError::AuthFailed { reason },
            other => other,
        })?;

        session.command(&format!("SELECT {}", quote(&config.mailbox)))?;
        Ok(session)
    }

    fn tag(&mut self) -> String {
        let tag = format!("A{:04}", self.next_tag);
        self.next_tag += 1;
        tag
    }

    fn send(&mut self, tag: &str, cmd: &str) -> Result<(), MailError> {
        self.stream.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        self.stream.flush()?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, MailError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match self.stream.read(&mut byte) {
                Ok(0) => return Err(MailError::Protocol("IMAP connection closed".into())),
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).to_string());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Send a command and collect its untagged response lines.
    fn command(&mut self, cmd: &str) -> Result<Vec<String>, MailError> {
        let tag = self.tag();
        self.send(&tag, cmd)?;
        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?;
            if let Some(status) = tagged_status(&tag, &line) {
                check_completion(status)?;
                return Ok(lines);
            }
            lines.push(line);
        }
    }

    /// Send a command whose response carries one literal (`{N}` + N bytes).
    fn fetch_literal(&mut self, cmd: &str) -> Result<Option<Vec<u8>>, MailError> {
        let tag = self.tag();
        self.send(&tag, cmd)?;
        let mut literal = None;
        loop {
            let line = self.read_line()?;
            if let Some(status) = tagged_status(&tag, &line) {
                check_completion(status)?;
                return Ok(literal);
            }
            if literal.is_none()
                && let Some(len) = literal_len(&line)
            {
                let mut buf = vec![0u8; len];
                self.stream.read_exact(&mut buf)?;
                literal = Some(buf);
            }
        }
    }

    fn logout(mut self) {
        let _ = self.command("LOGOUT");
    }
}

// ── Protocol helpers (public for testing) ───────────────────────────

/// Quote a string as an IMAP quoted-string.
pub fn quote(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// If `line` is the tagged completion for `tag`, return the text after it.
pub fn tagged_status<'a>(tag: &str, line: &'a str) -> Option<&'a str> {
    line.strip_prefix(tag)
        .and_then(|rest| rest.strip_prefix(' '))
        .map(str::trim_end)
}

/// `OK ...` passes; `NO`/`BAD` become protocol errors.
pub fn check_completion(status: &str) -> Result<(), MailError> {
    if status.starts_with("OK") {
        Ok(())
    } else {
        Err(MailError::Protocol(status.to_string()))
    }
}

/// UIDs from `* SEARCH` responses, ascending (oldest first).
pub fn parse_search_response(lines: &[String]) -> Vec<u64> {
    let mut uids: Vec<u64> = lines
        .iter()
        .filter_map(|line| line.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace())
        .filter_map(|tok| tok.parse().ok())
        .collect();
    uids.sort_unstable();
    uids.dedup();
    uids
}

/// Length of a literal announced at the end of a response line (`{123}`).
pub fn literal_len(line: &str) -> Option<usize> {
    let line = line.trim_end();
    let inner = line.strip_suffix('}')?;
    let open = inner.rfind('{')?;
    inner[open + 1..].parse().ok()
}

/// Message ids for this backend are numeric UIDs.
pub fn parse_uid(id: &MessageId) -> Result<u64, MailError> {
    id.as_str()
        .parse()
        .map_err(|_| MailError::InvalidId(id.to_string()))
}

/// Extract sender, subject and body from a raw RFC 822 message.
pub fn parse_message(id: &MessageId, raw: &[u8]) -> Result<MailMessage, MailError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| MailError::Parse {
            id: id.to_string(),
            reason: "not an RFC 822 message".to_string(),
        })?;

    let sender = parsed
        .from()
        .and_then(|addr| addr.first())
        .map(|a| match (a.name(), a.address()) {
            (Some(name), Some(address)) => format!("{name} <{address}>"),
            (None, Some(address)) => address.to_string(),
            (Some(name), None) => name.to_string(),
            (None, None) => String::new(),
        })
        .unwrap_or_default();

    let body = if let Some(text) = parsed.body_text(0) {
        text.to_string()
    } else if let Some(html) = parsed.body_html(0) {
        strip_html(html.as_ref())
    } else {
        String::new()
    };

    Ok(MailMessage {
        sender: single_line(&sender, "Unknown"),
        subject: single_line(parsed.subject().unwrap_or_default(), "No Subject"),
        body: normalize_body(&body),
    })
}
