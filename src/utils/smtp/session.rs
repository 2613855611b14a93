//! SMTP sessions: the connector/session seam and its lettre-backed implementation.

use crate::core::config::Config;
use crate::core::error::{AppError, Result};
use async_trait::async_trait;
use lettre::transport::smtp::client::AsyncSmtpConnection;
use lettre::transport::smtp::commands::{Mail, Rcpt, Rset};
use lettre::transport::smtp::extension::ClientId;
use lettre::transport::smtp::response::{Code, Response};
use lettre::Address;
use std::fmt::Display;
use std::time::Duration;

/// A status line from the mail host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpReply {
    pub code: u16,
    pub message: String,
}

impl SmtpReply {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_positive(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn is_transient(&self) -> bool {
        (400..500).contains(&self.code)
    }

    pub fn is_permanent(&self) -> bool {
        (500..600).contains(&self.code)
    }
}

impl Display for SmtpReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code, self.message)
    }
}

/// What the host said to one MAIL FROM / RCPT TO exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientReply {
    /// MAIL FROM was refused, so the recipient was never asked about.
    SenderRefused(SmtpReply),
    /// Reply to RCPT TO.
    Recipient(SmtpReply),
}

/// An open conversation with one mail host. Not safe for concurrent use;
/// the pool hands each caller its own session.
#[async_trait]
pub trait MailSession: Send {
    /// Runs MAIL FROM, RCPT TO and RSET. No DATA is ever sent.
    ///
    /// Reply codes, positive or negative, are `Ok`. Timeouts fail with
    /// [`AppError::Timeout`] and dropped connections with
    /// [`AppError::ProtocolDisconnect`].
    async fn check_recipient(
        &mut self,
        sender: &Address,
        recipient: &Address,
    ) -> Result<RecipientReply>;

    /// True once the session has failed in a way that makes reuse unsafe.
    fn is_broken(&self) -> bool;

    /// Sends QUIT when possible and closes the connection.
    async fn close(&mut self);
}

/// Opens new sessions to a mail host.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self, host: &str) -> Result<Box<dyn MailSession>>;
}

fn code_to_u16(code: Code) -> u16 {
    code.to_string().parse().unwrap_or(0)
}

fn reply_from_response(response: &Response) -> SmtpReply {
    SmtpReply::new(
        code_to_u16(response.code()),
        response.message().collect::<Vec<&str>>().join(" "),
    )
}

/// [`MailSession`] over a plaintext lettre connection.
pub struct LettreSession {
    conn: AsyncSmtpConnection,
    host: String,
    read_timeout: Duration,
    broken: bool,
}

impl LettreSession {
    async fn send<C: Display + Send + Sync>(&mut self, command: C) -> Result<SmtpReply> {
        let label = command.to_string();
        let label = label.trim_end();
        match tokio::time::timeout(self.read_timeout, self.conn.command(&command)).await {
            Err(_) => {
                self.broken = true;
                Err(AppError::Timeout(format!(
                    "{} waiting for reply to '{}'",
                    self.host, label
                )))
            }
            Ok(Ok(response)) => Ok(reply_from_response(&response)),
            Ok(Err(e)) => match e.status() {
                Some(code) => Ok(SmtpReply::new(code_to_u16(code), e.to_string())),
                None if e.is_timeout() => {
                    self.broken = true;
                    Err(AppError::Timeout(format!("{} on '{}': {}", self.host, label, e)))
                }
                None => {
                    self.broken = true;
                    Err(AppError::ProtocolDisconnect(format!(
                        "{} dropped the session on '{}': {}",
                        self.host, label, e
                    )))
                }
            },
        }
    }
}

#[async_trait]
impl MailSession for LettreSession {
    async fn check_recipient(
        &mut self,
        sender: &Address,
        recipient: &Address,
    ) -> Result<RecipientReply> {
        tracing::debug!(target: "smtp_task", "Sending MAIL FROM:<{}> to {}...", sender, self.host);
        let mail = self.send(Mail::new(Some(sender.clone()), vec![])).await?;
        if !mail.is_positive() {
            tracing::warn!(target: "smtp_task", "SMTP sender '{}' rejected by {}: {}", sender, self.host, mail);
            self.send(Rset).await.ok();
            return Ok(RecipientReply::SenderRefused(mail));
        }

        tracing::debug!(target: "smtp_task", "Sending RCPT TO:<{}> to {}...", recipient, self.host);
        let rcpt = self.send(Rcpt::new(recipient.clone(), vec![])).await?;
        tracing::info!(target: "smtp_task", "RCPT TO:<{}> response from {}: {}", recipient, self.host, rcpt);

        // RSET keeps the session reusable for the next candidate.
        if let Err(e) = self.send(Rset).await {
            tracing::debug!(target: "smtp_task", "RSET failed on {}: {}", self.host, e);
        }
        Ok(RecipientReply::Recipient(rcpt))
    }

    fn is_broken(&self) -> bool {
        self.broken || self.conn.has_broken()
    }

    async fn close(&mut self) {
        if self.is_broken() {
            self.conn.abort().await;
            return;
        }
        match tokio::time::timeout(self.read_timeout, self.conn.quit()).await {
            Ok(Ok(_)) => tracing::debug!(target: "smtp_task", "Closed session to {}", self.host),
            Ok(Err(e)) => {
                tracing::debug!(target: "smtp_task", "QUIT failed on {}: {}", self.host, e);
                self.conn.abort().await;
            }
            Err(_) => {
                tracing::debug!(target: "smtp_task", "QUIT timed out on {}", self.host);
                self.conn.abort().await;
            }
        }
    }
}

/// Connects plaintext SMTP sessions with lettre.
pub struct LettreConnector {
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
    helo: ClientId,
}

impl LettreConnector {
    pub fn new(port: u16, connect_timeout: Duration, read_timeout: Duration, helo_name: &str) -> Self {
        Self {
            port,
            connect_timeout,
            read_timeout,
            helo: ClientId::Domain(helo_name.to_string()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.smtp_port,
            config.smtp_timeout,
            config.smtp_read_timeout,
            &config.helo_name,
        )
    }
}

#[async_trait]
impl SessionConnector for LettreConnector {
    async fn connect(&self, host: &str) -> Result<Box<dyn MailSession>> {
        tracing::debug!(target: "smtp_task", "Attempting SMTP connection to {}:{}", host, self.port);

        // Greeting and EHLO are read inside connect, so bound both.
        let connect = AsyncSmtpConnection::connect_tokio1(
            (host, self.port),
            Some(self.connect_timeout),
            &self.helo,
            None,
            None,
        );
        let conn = match tokio::time::timeout(self.connect_timeout + self.read_timeout, connect).await {
            Err(_) => return Err(AppError::Timeout(format!("Connection to {}:{}", host, self.port))),
            Ok(Err(e)) if e.is_permanent() => {
                tracing::warn!(target: "smtp_task", "{} refused the session: {}", host, e);
                return Err(AppError::Smtp(e));
            }
            Ok(Err(e)) if e.is_timeout() => {
                tracing::warn!(target: "smtp_task", "SMTP connection to {} timed out: {}", host, e);
                return Err(AppError::Timeout(format!("Connection to {}:{}: {}", host, self.port, e)));
            }
            Ok(Err(e)) => {
                tracing::warn!(target: "smtp_task", "SMTP connection failed for {}: {}", host, e);
                return Err(AppError::TransientNetworkFailure(format!(
                    "Connection to {}:{} failed: {}",
                    host, self.port, e
                )));
            }
            Ok(Ok(conn)) => conn,
        };

        tracing::debug!(target: "smtp_task", "Established plaintext connection to {}:{}", host, self.port);
        Ok(Box::new(LettreSession {
            conn,
            host: host.to_string(),
            read_timeout: self.read_timeout,
            broken: false,
        }))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::str::FromStr;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    /// Minimal scripted SMTP server on loopback. Replies are chosen by command prefix.
    pub(crate) async fn spawn_fake_smtp(rcpt_reply: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let (read, mut write) = stream.into_split();
                    let mut lines = BufReader::new(read).lines();
                    write.write_all(b"220 fake.smtp.test ESMTP\r\n").await.ok();
                    while let Ok(Some(line)) = lines.next_line().await {
                        let upper = line.to_ascii_uppercase();
                        let reply: &str = if upper.starts_with("EHLO") {
                            "250-fake.smtp.test\r\n250 8BITMIME\r\n"
                        } else if upper.starts_with("MAIL FROM") {
                            "250 2.1.0 Ok\r\n"
                        } else if upper.starts_with("RCPT TO") {
                            rcpt_reply
                        } else if upper.starts_with("RSET") {
                            "250 2.0.0 Ok\r\n"
                        } else if upper.starts_with("QUIT") {
                            write.write_all(b"221 2.0.0 Bye\r\n").await.ok();
                            break;
                        } else {
                            "502 5.5.2 Error: command not recognized\r\n"
                        };
                        if write.write_all(reply.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        port
    }

    fn connector(port: u16) -> LettreConnector {
        LettreConnector::new(port, Duration::from_secs(5), Duration::from_secs(5), "probe.test")
    }

    #[test]
    fn reply_classes() {
        assert!(SmtpReply::new(250, "ok").is_positive());
        assert!(SmtpReply::new(451, "later").is_transient());
        assert!(SmtpReply::new(550, "unknown").is_permanent());
    }

    #[tokio::test]
    async fn lettre_session_reports_accepted_recipient() {
        let port = spawn_fake_smtp("250 2.1.5 Ok\r\n").await;
        let mut session = connector(port).connect("127.0.0.1").await.unwrap();

        let sender = Address::from_str("probe@sender.test").unwrap();
        let recipient = Address::from_str("jane.doe@acme.com").unwrap();
        let reply = session.check_recipient(&sender, &recipient).await.unwrap();
        assert_eq!(reply, RecipientReply::Recipient(SmtpReply::new(250, "2.1.5 Ok")));

        // Session stays usable after RSET.
        assert!(!session.is_broken());
        let again = session.check_recipient(&sender, &recipient).await.unwrap();
        assert!(matches!(again, RecipientReply::Recipient(r) if r.is_positive()));
        session.close().await;
    }

    #[tokio::test]
    async fn lettre_session_surfaces_rejection_codes() {
        let port = spawn_fake_smtp("550 5.1.1 User unknown\r\n").await;
        let mut session = connector(port).connect("127.0.0.1").await.unwrap();

        let sender = Address::from_str("probe@sender.test").unwrap();
        let recipient = Address::from_str("nobody@acme.com").unwrap();
        match session.check_recipient(&sender, &recipient).await.unwrap() {
            RecipientReply::Recipient(reply) => {
                assert_eq!(reply.code, 550);
                assert!(reply.is_permanent());
            }
            other => panic!("unexpected reply {other:?}"),
        }
        session.close().await;
    }

    #[tokio::test]
    async fn refused_connection_is_transient() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = connector(port).connect("127.0.0.1").await.err().unwrap();
        assert!(err.is_transient(), "got {err}");
    }
}
