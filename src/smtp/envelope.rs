/*
 * Copyright Stalwart Labs Ltd.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::SmtpClient;

use super::{stream::DataWriter, AssertReply};

impl<T: AsyncRead + AsyncWrite + Unpin> SmtpClient<T> {
    /// Sends a MAIL FROM command to the server.
    pub async fn mail_from(&mut self, addr: &str) -> crate::Result<()> {
        self.cmd(format!("MAIL FROM:<{addr}>\r\n").as_bytes())
            .await?
            .assert_positive_completion()
    }

    /// Sends a RCPT TO command to the server.
    pub async fn rcpt_to(&mut self, addr: &str) -> crate::Result<()> {
        self.cmd(format!("RCPT TO:<{addr}>\r\n").as_bytes())
            .await?
            .assert_positive_completion()
    }

    /// Sends a DATA command and returns a writer for the message.
    pub async fn data_writer(&mut self) -> crate::Result<DataWriter<'_, T>> {
        self.cmd(b"DATA\r\n").await?.assert_code(354)?;
        Ok(DataWriter::new(self))
    }

    /// Sends a DATA command followed by the whole message.
    pub async fn data(&mut self, message: impl AsRef<[u8]>) -> crate::Result<()> {
        let mut writer = self.data_writer().await?;
        writer.write(message.as_ref()).await?;
        writer.close().await
    }

    /// Sends a QUIT command to the server.
    pub async fn quit(&mut self) -> crate::Result<()> {
        self.cmd(b"QUIT\r\n").await?.assert_positive_completion()
    }

    /// Says goodbye if the server is still listening, then shuts the
    /// stream down.
    pub async fn close(&mut self) -> crate::Result<()> {
        let quit = self.quit().await;
        let shutdown = self.shutdown().await;
        quit.and(shutdown)
    }

    /// Shuts the stream down without saying goodbye.
    pub async fn shutdown(&mut self) -> crate::Result<()> {
        tokio::time::timeout(self.timeout, self.stream.shutdown())
            .await
            .map_err(|_| crate::Error::Timeout)?
            .map_err(crate::Error::from)
    }
}

#[cfg(test)]
mod test {
    use crate::{
        smtp::client::script::{self, Step},
        Error,
    };

    #[tokio::test]
    async fn mail_transaction() {
        let (mut client, server) = script::client(vec![
            Step::Expect("MAIL FROM:<john@example.com>\r\n"),
            Step::Send("250 2.1.0 OK\r\n"),
            Step::Expect("RCPT TO:<jane@example.com>\r\n"),
            Step::Send("250 2.1.5 OK\r\n"),
            Step::Expect("RCPT TO:<nobody@example.com>\r\n"),
            Step::Send("550 5.1.1 No such user\r\n"),
            Step::Expect("DATA\r\n"),
            Step::Send("354 Go ahead\r\n"),
            Step::ExpectData("Subject: Hi\r\n\r\n..hidden\r\n.\r\n"),
            Step::Send("250 2.0.0 Queued\r\n"),
            Step::Expect("QUIT\r\n"),
            Step::Send("221 2.0.0 Bye\r\n"),
        ]);

        client.mail_from("john@example.com").await.unwrap();
        client.rcpt_to("jane@example.com").await.unwrap();
        assert!(matches!(
            client.rcpt_to("nobody@example.com").await,
            Err(Error::UnexpectedReply(reply)) if reply.code == 550
        ));
        client.data("Subject: Hi\n\n.hidden").await.unwrap();
        client.close().await.unwrap();

        server.await.unwrap();
    }

    #[tokio::test]
    async fn data_rejected() {
        let (mut client, server) = script::client(vec![
            Step::Expect("DATA\r\n"),
            Step::Send("503 5.5.1 No valid recipients\r\n"),
        ]);

        assert!(matches!(
            client.data_writer().await.err(),
            Some(Error::UnexpectedReply(reply)) if reply.code == 503
        ));

        server.await.unwrap();
    }

    #[tokio::test]
    async fn streamed_data() {
        let (mut client, server) = script::client(vec![
            Step::Expect("DATA\r\n"),
            Step::Send("354 Go ahead\r\n"),
            Step::ExpectData("first\r\nsecond\r\n.\r\n"),
            Step::Send("554 5.6.0 Message rejected\r\n"),
        ]);

        let mut writer = client.data_writer().await.unwrap();
        writer.write(b"fir").await.unwrap();
        writer.write(b"st\nsecond\n").await.unwrap();
        assert!(matches!(
            writer.close().await,
            Err(Error::UnexpectedReply(reply)) if reply.code == 554
        ));
        writer.close().await.unwrap();

        server.await.unwrap();
    }
}
