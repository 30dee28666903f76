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

//! Seams between a [`SendSession`](crate::SendSession) and the network.
//!
//! [`SmtpClientBuilder`] and [`SmtpClient<SmtpStream>`] implement these
//! traits over TCP and rustls.

#![allow(async_fn_in_trait)]

#[cfg(test)]
pub(crate) mod mock;

use crate::{
    smtp::stream::DataWriter, AuthToken, SmtpClient, SmtpClientBuilder, SmtpStream, TlsConfig,
};

/// Receives the `DATA` payload.
pub trait DataSink {
    async fn write(&mut self, bytes: &[u8]) -> crate::Result<()>;

    /// Terminates the payload and waits for the server to accept it.
    async fn close(&mut self) -> crate::Result<()>;
}

/// An established connection to a mail server.
pub trait MailTransport {
    type Writer<'a>: DataSink
    where
        Self: 'a;

    fn is_secure(&self) -> bool;

    fn supports_start_tls(&self) -> bool;

    /// Authenticates with SASL PLAIN.
    async fn handshake(&mut self, token: &AuthToken) -> crate::Result<()>;

    async fn start_tls(&mut self, config: &TlsConfig) -> crate::Result<()>;

    async fn mail_from(&mut self, address: &str) -> crate::Result<()>;

    /// A refusal is reported as [`Error::UnexpectedReply`](crate::Error::UnexpectedReply).
    async fn rcpt_to(&mut self, address: &str) -> crate::Result<()>;

    async fn open_data_writer(&mut self) -> crate::Result<Self::Writer<'_>>;

    /// Sends QUIT and shuts the connection down.
    async fn close(&mut self) -> crate::Result<()>;

    /// Shuts the connection down without QUIT, for connections left in an
    /// unknown state.
    async fn abort(&mut self) -> crate::Result<()>;
}

/// Opens connections to mail servers.
pub trait Connector {
    type Transport: MailTransport;

    async fn dial(&self, host: &str, port: u16) -> crate::Result<Self::Transport>;
}

impl Connector for SmtpClientBuilder {
    type Transport = SmtpClient<SmtpStream>;

    async fn dial(&self, host: &str, port: u16) -> crate::Result<Self::Transport> {
        self.connect_plain(host, port).await
    }
}

impl MailTransport for SmtpClient<SmtpStream> {
    type Writer<'a> = DataWriter<'a, SmtpStream>;

    fn is_secure(&self) -> bool {
        self.stream.is_tls()
    }

    fn supports_start_tls(&self) -> bool {
        self.has_start_tls()
    }

    async fn handshake(&mut self, token: &AuthToken) -> crate::Result<()> {
        let is_secure = self.stream.is_tls();
        self.authenticate(token, is_secure).await
    }

    async fn start_tls(&mut self, config: &TlsConfig) -> crate::Result<()> {
        SmtpClient::start_tls(self, config).await
    }

    async fn mail_from(&mut self, address: &str) -> crate::Result<()> {
        SmtpClient::mail_from(self, address).await
    }

    async fn rcpt_to(&mut self, address: &str) -> crate::Result<()> {
        SmtpClient::rcpt_to(self, address).await
    }

    async fn open_data_writer(&mut self) -> crate::Result<Self::Writer<'_>> {
        self.data_writer().await
    }

    async fn close(&mut self) -> crate::Result<()> {
        SmtpClient::close(self).await
    }

    async fn abort(&mut self) -> crate::Result<()> {
        self.shutdown().await
    }
}

impl DataSink for DataWriter<'_, SmtpStream> {
    async fn write(&mut self, bytes: &[u8]) -> crate::Result<()> {
        DataWriter::write(self, bytes).await
    }

    async fn close(&mut self) -> crate::Result<()> {
        DataWriter::close(self).await
    }
}
