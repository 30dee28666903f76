/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::sync::{Arc, Mutex};

use smtp_proto::Response;

use crate::{AuthToken, Error, TlsConfig};

use super::{Connector, DataSink, MailTransport};

/// Records every primitive call as a line of text.
#[derive(Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Vec<String>>>);

/// Hands out [`MockTransport`]s that share its journal and behavior.
#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    pub journal: Journal,
    pub rejected: Vec<&'static str>,
    pub start_tls_offered: bool,
    pub start_tls_fails: bool,
    pub secure: bool,
    pub stall_on: Option<&'static str>,
}

pub(crate) struct MockTransport {
    config: MockConnector,
    secure: bool,
}

pub(crate) struct MockWriter<'x> {
    journal: &'x Journal,
    payload: Vec<u8>,
}

impl Journal {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Number of times the connection was released.
    pub fn closed(&self) -> usize {
        self.entries()
            .iter()
            .filter(|entry| *entry == "QUIT" || *entry == "SHUTDOWN")
            .count()
    }
}

impl MockConnector {
    pub fn transport(&self) -> MockTransport {
        MockTransport {
            secure: self.secure,
            config: self.clone(),
        }
    }

    pub fn entries(&self) -> Vec<String> {
        self.journal.entries()
    }
}

impl MockTransport {
    async fn record(&self, entry: String) {
        if self.config.stall_on == Some(entry.as_str()) {
            self.config.journal.push(format!("{entry} (stalled)"));
            std::future::pending::<()>().await;
        }
        self.config.journal.push(entry);
    }
}

fn reply(code: u16, message: &str) -> Response<String> {
    Response {
        code,
        esc: [(code / 100) as u8, 0, 0],
        message: message.to_string(),
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn dial(&self, host: &str, port: u16) -> crate::Result<MockTransport> {
        let transport = self.transport();
        transport.record(format!("DIAL {host}:{port}")).await;
        Ok(transport)
    }
}

impl MailTransport for MockTransport {
    type Writer<'a> = MockWriter<'a>;

    fn is_secure(&self) -> bool {
        self.secure
    }

    fn supports_start_tls(&self) -> bool {
        self.config.start_tls_offered
    }

    async fn handshake(&mut self, token: &AuthToken) -> crate::Result<()> {
        self.record(format!("AUTH {}", token.username())).await;
        Ok(())
    }

    async fn start_tls(&mut self, _config: &TlsConfig) -> crate::Result<()> {
        self.record("STARTTLS".to_string()).await;
        if self.config.start_tls_fails {
            Err(Error::StartTlsRejected(reply(454, "TLS not available")))
        } else {
            self.secure = true;
            Ok(())
        }
    }

    async fn mail_from(&mut self, address: &str) -> crate::Result<()> {
        self.record(format!("MAIL FROM:<{address}>")).await;
        Ok(())
    }

    async fn rcpt_to(&mut self, address: &str) -> crate::Result<()> {
        self.record(format!("RCPT TO:<{address}>")).await;
        if self.config.rejected.iter().any(|rcpt| *rcpt == address) {
            Err(Error::UnexpectedReply(reply(550, "No such user")))
        } else {
            Ok(())
        }
    }

    async fn open_data_writer(&mut self) -> crate::Result<MockWriter<'_>> {
        self.record("DATA".to_string()).await;
        Ok(MockWriter {
            journal: &self.config.journal,
            payload: Vec::new(),
        })
    }

    async fn close(&mut self) -> crate::Result<()> {
        self.record("QUIT".to_string()).await;
        Ok(())
    }

    async fn abort(&mut self) -> crate::Result<()> {
        self.record("SHUTDOWN".to_string()).await;
        Ok(())
    }
}

impl DataSink for MockWriter<'_> {
    async fn write(&mut self, bytes: &[u8]) -> crate::Result<()> {
        self.payload.extend_from_slice(bytes);
        Ok(())
    }

    async fn close(&mut self) -> crate::Result<()> {
        self.journal
            .push(String::from_utf8_lossy(&self.payload).into_owned());
        self.journal.push(".");
        Ok(())
    }
}
