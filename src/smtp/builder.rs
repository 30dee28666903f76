/*
 * Copyright Stalwart Labs Ltd.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::time::Duration;

use tokio::net::TcpStream;

use crate::{SmtpClient, SmtpClientBuilder};

use super::{stream::SmtpStream, tls::TlsConfig};

impl Default for SmtpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SmtpClientBuilder {
    pub fn new() -> Self {
        SmtpClientBuilder {
            timeout: Duration::from_secs(60 * 5),
            local_host: gethostname::gethostname()
                .to_str()
                .unwrap_or("[127.0.0.1]")
                .to_string(),
        }
    }

    /// Set the EHLO hostname
    pub fn helo_host(mut self, host: impl Into<String>) -> Self {
        self.local_host = host.into();
        self
    }

    /// Sets the timeout applied to every network operation
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Connect over clear text, read the greeting and send EHLO.
    pub async fn connect_plain(
        &self,
        hostname: &str,
        port: u16,
    ) -> crate::Result<SmtpClient<SmtpStream>> {
        let result: crate::Result<_> = tokio::time::timeout(self.timeout, async {
            log::debug!("Connecting to {hostname}:{port}");
            let mut client = SmtpClient::new(
                SmtpStream::Basic(TcpStream::connect((hostname, port)).await?),
                hostname,
                self.local_host.as_str(),
                self.timeout,
            );

            // Read greeting
            client.read_greeting().await?;

            // Send EHLO
            client.ehlo().await?;

            Ok(client)
        })
        .await
        .map_err(|_| crate::Error::ConnectTimeout)?;
        result.map_err(into_connect_error)
    }

    /// Connect over clear text and upgrade with STARTTLS.
    pub async fn connect_starttls(
        &self,
        hostname: &str,
        port: u16,
        tls: &TlsConfig,
    ) -> crate::Result<SmtpClient<SmtpStream>> {
        let mut client = self.connect_plain(hostname, port).await?;
        if !client.has_start_tls() {
            return Err(crate::Error::MissingStartTls);
        }
        client.start_tls(tls).await.map_err(into_connect_error)?;
        Ok(client)
    }
}

/// Timeouts while the connection is being set up leave no server state behind.
pub(crate) fn into_connect_error(err: crate::Error) -> crate::Error {
    match err {
        crate::Error::Timeout => crate::Error::ConnectTimeout,
        err => err,
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::{
        smtp::client::script::{self, Step},
        Error, SmtpClientBuilder, TlsConfig,
    };

    #[tokio::test]
    async fn connect_plain_and_quit() {
        let (port, server) = script::listen(vec![
            Step::Send("220 localhost ESMTP\r\n"),
            Step::Expect("EHLO client.example.com\r\n"),
            Step::Send("250-localhost\r\n250 AUTH PLAIN\r\n"),
            Step::Expect("QUIT\r\n"),
            Step::Send("221 Bye\r\n"),
        ])
        .await;

        let mut client = SmtpClientBuilder::new()
            .helo_host("client.example.com")
            .connect_plain("127.0.0.1", port)
            .await
            .unwrap();
        assert!(client.has_auth_plain());
        assert!(!client.has_start_tls());
        assert!(!client.stream.is_tls());
        client.close().await.unwrap();

        server.await.unwrap();
    }

    #[tokio::test]
    async fn connect_starttls_not_offered() {
        let (port, server) = script::listen(vec![
            Step::Send("220 localhost ESMTP\r\n"),
            Step::Expect("EHLO [127.0.0.1]\r\n"),
            Step::Send("250 localhost\r\n"),
        ])
        .await;

        assert!(matches!(
            SmtpClientBuilder::new()
                .helo_host("[127.0.0.1]")
                .connect_starttls("127.0.0.1", port, &TlsConfig::new())
                .await,
            Err(Error::MissingStartTls)
        ));

        server.await.unwrap();
    }

    #[tokio::test]
    async fn starttls_rejected() {
        let (port, server) = script::listen(vec![
            Step::Send("220 localhost ESMTP\r\n"),
            Step::Expect("EHLO [127.0.0.1]\r\n"),
            Step::Send("250-localhost\r\n250 STARTTLS\r\n"),
            Step::Expect("STARTTLS\r\n"),
            Step::Send("454 4.7.0 TLS not available\r\n"),
        ])
        .await;

        let mut client = SmtpClientBuilder::new()
            .helo_host("[127.0.0.1]")
            .connect_plain("127.0.0.1", port)
            .await
            .unwrap();
        assert!(matches!(
            client.start_tls(&TlsConfig::new()).await,
            Err(Error::StartTlsRejected(reply)) if reply.code == 454
        ));
        assert!(!client.stream.is_tls());

        server.await.unwrap();
    }

    #[tokio::test]
    async fn greeting_timeout() {
        let (port, _server) = script::listen(vec![Step::Expect("never\r\n")]).await;

        assert!(matches!(
            SmtpClientBuilder::new()
                .timeout(Duration::from_millis(100))
                .connect_plain("127.0.0.1", port)
                .await,
            Err(Error::ConnectTimeout)
        ));
    }
}
