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

use smtp_proto::{response::parser::ResponseReceiver, Response};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::SmtpClient;

impl<T: AsyncRead + AsyncWrite + Unpin> SmtpClient<T> {
    /// Wraps an established stream. The greeting has not been read yet.
    ///
    /// `local_host` is the name announced in EHLO.
    pub fn new(
        stream: T,
        hostname: impl Into<String>,
        local_host: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        SmtpClient {
            stream,
            timeout,
            capabilities: None,
            hostname: hostname.into(),
            local_host: local_host.into(),
        }
    }

    /// Name of the server this client is connected to.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub(crate) async fn read(&mut self) -> crate::Result<Response<String>> {
        let mut buf = vec![0u8; 1024];
        let mut parser = ResponseReceiver::default();

        loop {
            let br = self.stream.read(&mut buf).await?;

            if br == 0 {
                return Err(crate::Error::UnparseableReply);
            }

            match parser.parse(&mut buf[..br].iter()) {
                Ok(reply) => {
                    log::trace!("S: {} {}", reply.code, reply.message);
                    return Ok(reply);
                }
                Err(err) => match err {
                    smtp_proto::Error::NeedsMoreData { .. } => (),
                    _ => {
                        return Err(crate::Error::UnparseableReply);
                    }
                },
            }
        }
    }

    /// Sends a command to the SMTP server and waits for a reply.
    pub async fn cmd(&mut self, cmd: impl AsRef<[u8]>) -> crate::Result<Response<String>> {
        let cmd = cmd.as_ref();
        log::trace!("C: {}", String::from_utf8_lossy(cmd).trim_end());
        self.send_cmd(cmd).await
    }

    /// Same as [`SmtpClient::cmd`], without logging the command line.
    pub(crate) async fn send_cmd(&mut self, cmd: &[u8]) -> crate::Result<Response<String>> {
        tokio::time::timeout(self.timeout, async {
            self.stream.write_all(cmd).await?;
            self.stream.flush().await?;
            self.read().await
        })
        .await
        .map_err(|_| crate::Error::Timeout)?
    }
}


#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::script::{self, Step};
    use crate::{smtp::AssertReply, Error, SmtpClient};

    #[tokio::test]
    async fn cmd_reads_multiline_reply() {
        let (mut client, server) = script::client(vec![
            Step::Expect("NOOP\r\n"),
            Step::Send("250-First line\r\n250-Second line\r\n"),
            Step::Send("250 The last line\r\n"),
            Step::Expect("RSET\r\n"),
            Step::Send("421 These pretzels are making me thirsty\r\n"),
        ]);

        let reply = client.cmd(b"NOOP\r\n").await.unwrap();
        assert_eq!(reply.code, 250);
        assert!(reply.is_positive_completion());

        let reply = client.cmd("RSET\r\n").await.unwrap();
        assert_eq!(reply.code, 421);
        assert!(matches!(
            reply.assert_positive_completion(),
            Err(Error::UnexpectedReply(reply)) if reply.code == 421
        ));

        server.await.unwrap();
    }

    #[tokio::test]
    async fn cmd_on_closed_connection() {
        let (mut client, server) = script::client(vec![]);
        server.await.unwrap();
        assert!(matches!(
            client.cmd(b"NOOP\r\n").await,
            Err(Error::UnparseableReply) | Err(Error::Io(_))
        ));
    }

    #[tokio::test]
    async fn cmd_timeout() {
        let (stream, _server) = tokio::io::duplex(1024);
        let mut client =
            SmtpClient::new(stream, "localhost", "[127.0.0.1]", Duration::from_millis(50));
        assert!(matches!(
            client.cmd(b"NOOP\r\n").await,
            Err(Error::Timeout)
        ));
    }
}
