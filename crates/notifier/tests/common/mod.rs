//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use herald_common::error::{AppError, AppResult};
use herald_common::types::ChannelKind;
use herald_notifier::queue::{MessageQueue, RawMessage};
use herald_notifier::sender::{ChannelSender, SendError};

// ============================================================
// Channel sender double
// ============================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub contact: String,
    pub subject: Option<String>,
    pub body: String,
}

/// Records every send and answers with a fixed outcome.
pub struct RecordingSender {
    kind: ChannelKind,
    fail: bool,
    sent: Mutex<Vec<SentMessage>>,
}

impl RecordingSender {
    pub fn succeeding(kind: ChannelKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            fail: false,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(kind: ChannelKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            fail: true,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelSender for RecordingSender {
    fn kind(&self) -> ChannelKind {
        self.kind.clone()
    }

    async fn send(
        &self,
        contact: &str,
        subject: Option<&str>,
        body: &str,
    ) -> Result<(), SendError> {
        self.sent.lock().unwrap().push(SentMessage {
            contact: contact.to_string(),
            subject: subject.map(str::to_string),
            body: body.to_string(),
        });
        if self.fail {
            Err(SendError::TransportFailure("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

// ============================================================
// Queue double
// ============================================================

#[derive(Default)]
struct QueueState {
    incoming: VecDeque<AppResult<Option<RawMessage>>>,
    receives: usize,
    acknowledged: Vec<Vec<u8>>,
    abandoned: Vec<Vec<u8>>,
    dead_lettered: Vec<Vec<u8>>,
    fail_settlements: bool,
    rejected_settlements: usize,
}

impl QueueState {
    fn check_settlement(&mut self) -> AppResult<()> {
        if self.fail_settlements {
            self.rejected_settlements += 1;
            return Err(AppError::Internal("broken pipe".into()));
        }
        Ok(())
    }
}

/// Hands out a scripted sequence of receive results, then times out forever.
#[derive(Clone, Default)]
pub struct ScriptedQueue {
    state: Arc<Mutex<QueueState>>,
}

impl ScriptedQueue {
    pub fn push_message(&self, body: &str) {
        self.state
            .lock()
            .unwrap()
            .incoming
            .push_back(Ok(Some(RawMessage::new(body.as_bytes().to_vec()))));
    }

    pub fn push_timeout(&self) {
        self.state.lock().unwrap().incoming.push_back(Ok(None));
    }

    pub fn push_error(&self) {
        self.state
            .lock()
            .unwrap()
            .incoming
            .push_back(Err(AppError::Internal("connection reset by peer".into())));
    }

    /// Make every acknowledge, abandon and dead-letter call fail from now on.
    pub fn fail_settlements(&self) {
        self.state.lock().unwrap().fail_settlements = true;
    }

    /// Number of settle calls that were rejected.
    pub fn rejected_settlements(&self) -> usize {
        self.state.lock().unwrap().rejected_settlements
    }

    pub fn receives(&self) -> usize {
        self.state.lock().unwrap().receives
    }

    pub fn acknowledged(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().acknowledged.clone()
    }

    pub fn abandoned(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().abandoned.clone()
    }

    pub fn dead_lettered(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().dead_lettered.clone()
    }
}

#[async_trait]
impl MessageQueue for ScriptedQueue {
    async fn receive_one(&mut self, _timeout: Duration) -> AppResult<Option<RawMessage>> {
        let mut state = self.state.lock().unwrap();
        state.receives += 1;
        state.incoming.pop_front().unwrap_or(Ok(None))
    }

    async fn acknowledge(&mut self, message: &RawMessage) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        state.check_settlement()?;
        state.acknowledged.push(message.body.clone());
        Ok(())
    }

    async fn abandon(&mut self, message: &RawMessage) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        state.check_settlement()?;
        state.abandoned.push(message.body.clone());
        Ok(())
    }

    async fn dead_letter(&mut self, message: &RawMessage) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        state.check_settlement()?;
        state.dead_lettered.push(message.body.clone());
        Ok(())
    }
}

// ============================================================
// SMTP relay double
// ============================================================

#[derive(Debug, Clone, Default)]
pub struct ReceivedMail {
    /// AUTH command plus any challenge answers, verbatim.
    pub auth: Vec<String>,
    pub mail_from: String,
    pub rcpt_to: Vec<String>,
    pub data: String,
}

/// Minimal plaintext SMTP server accepting PLAIN and LOGIN auth.
/// Returns the port it listens on and the mail it has accepted.
pub async fn spawn_smtp_server() -> (u16, Arc<Mutex<Vec<ReceivedMail>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let inbox = Arc::new(Mutex::new(Vec::new()));

    let store = inbox.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let store = store.clone();
            tokio::spawn(async move {
                let (read, mut write) = stream.into_split();
                let mut lines = BufReader::new(read).lines();
                let mut mail = ReceivedMail::default();

                write.write_all(b"220 fake.smtp ESMTP ready\r\n").await.ok();

                while let Ok(Some(line)) = lines.next_line().await {
                    let upper = line.to_ascii_uppercase();
                    let reply: &[u8] = if upper.starts_with("EHLO") {
                        b"250-fake.smtp\r\n250 AUTH PLAIN LOGIN\r\n"
                    } else if upper.starts_with("AUTH PLAIN") {
                        mail.auth.push(line);
                        b"235 2.7.0 Authentication successful\r\n"
                    } else if upper.starts_with("AUTH LOGIN") {
                        mail.auth.push(line);
                        write.write_all(b"334 VXNlcm5hbWU6\r\n").await.ok();
                        if let Ok(Some(user)) = lines.next_line().await {
                            mail.auth.push(user);
                        }
                        write.write_all(b"334 UGFzc3dvcmQ6\r\n").await.ok();
                        if let Ok(Some(pass)) = lines.next_line().await {
                            mail.auth.push(pass);
                        }
                        b"235 2.7.0 Authentication successful\r\n"
                    } else if upper.starts_with("MAIL FROM") {
                        mail.mail_from = line;
                        b"250 2.1.0 OK\r\n"
                    } else if upper.starts_with("RCPT TO") {
                        mail.rcpt_to.push(line);
                        b"250 2.1.5 OK\r\n"
                    } else if upper == "DATA" {
                        write
                            .write_all(b"354 End data with <CR><LF>.<CR><LF>\r\n")
                            .await
                            .ok();
                        let mut data = Vec::new();
                        while let Ok(Some(data_line)) = lines.next_line().await {
                            if data_line == "." {
                                break;
                            }
                            data.push(data_line);
                        }
                        mail.data = data.join("\r\n");
                        store.lock().unwrap().push(std::mem::take(&mut mail));
                        b"250 2.0.0 OK queued\r\n"
                    } else if upper == "QUIT" {
                        write.write_all(b"221 2.0.0 Bye\r\n").await.ok();
                        break;
                    } else if upper == "RSET" || upper == "NOOP" {
                        b"250 OK\r\n"
                    } else {
                        b"502 5.5.2 Command not recognized\r\n"
                    };
                    write.write_all(reply).await.ok();
                }
            });
        }
    });

    (port, inbox)
}

/// A local port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
