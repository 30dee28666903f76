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

use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf},
    net::TcpStream,
};
use tokio_rustls::client::TlsStream;

use crate::SmtpClient;

use super::AssertReply;

/// A connection that starts in clear text and may be upgraded in place.
#[allow(clippy::large_enum_variant)]
#[derive(Default)]
pub enum SmtpStream {
    Basic(TcpStream),
    Tls(TlsStream<TcpStream>),
    #[default]
    None,
}

/// Writer for the `DATA` payload. Applies the transparency procedure
/// (RFC 5321, section 4.5.2) and normalizes line endings to CRLF.
pub struct DataWriter<'x, T: AsyncRead + AsyncWrite + Unpin> {
    client: &'x mut SmtpClient<T>,
    transparency: Transparency,
    closed: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum State {
    #[default]
    BeginLine,
    Cr,
    Data,
}

#[derive(Debug, Default)]
pub(crate) struct Transparency {
    state: State,
}

impl SmtpStream {
    pub fn is_tls(&self) -> bool {
        matches!(self, SmtpStream::Tls(_))
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "SMTP connection closed")
}

impl AsyncRead for SmtpStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SmtpStream::Basic(stream) => Pin::new(stream).poll_read(cx, buf),
            SmtpStream::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
            SmtpStream::None => Poll::Ready(Err(not_connected())),
        }
    }
}

impl AsyncWrite for SmtpStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            SmtpStream::Basic(stream) => Pin::new(stream).poll_write(cx, buf),
            SmtpStream::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
            SmtpStream::None => Poll::Ready(Err(not_connected())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SmtpStream::Basic(stream) => Pin::new(stream).poll_flush(cx),
            SmtpStream::Tls(stream) => Pin::new(stream).poll_flush(cx),
            SmtpStream::None => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SmtpStream::Basic(stream) => Pin::new(stream).poll_shutdown(cx),
            SmtpStream::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
            SmtpStream::None => Poll::Ready(Ok(())),
        }
    }
}

impl Transparency {
    pub(crate) fn encode(&mut self, bytes: &[u8], out: &mut Vec<u8>) {
        out.reserve(bytes.len() + bytes.len() / 16);
        for &byte in bytes {
            if self.state == State::BeginLine && byte == b'.' {
                out.push(b'.');
            }
            match byte {
                b'\r' => {
                    self.state = State::Cr;
                }
                b'\n' => {
                    if self.state != State::Cr {
                        out.push(b'\r');
                    }
                    self.state = State::BeginLine;
                }
                _ => {
                    self.state = State::Data;
                }
            }
            out.push(byte);
        }
    }

    pub(crate) fn finish(&self, out: &mut Vec<u8>) {
        match self.state {
            State::BeginLine => (),
            State::Cr => out.push(b'\n'),
            State::Data => out.extend_from_slice(b"\r\n"),
        }
        out.extend_from_slice(b".\r\n");
    }
}

impl<'x, T: AsyncRead + AsyncWrite + Unpin> DataWriter<'x, T> {
    pub(crate) fn new(client: &'x mut SmtpClient<T>) -> Self {
        DataWriter {
            client,
            transparency: Transparency::default(),
            closed: false,
        }
    }

    /// Writes part of the message.
    pub async fn write(&mut self, bytes: &[u8]) -> crate::Result<()> {
        let mut buf = Vec::new();
        self.transparency.encode(bytes, &mut buf);
        let timeout = self.client.timeout;
        tokio::time::timeout(timeout, self.client.stream.write_all(&buf))
            .await
            .map_err(|_| crate::Error::Timeout)??;
        Ok(())
    }

    /// Terminates the message and waits for the server to accept it.
    pub async fn close(&mut self) -> crate::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut buf = Vec::with_capacity(5);
        self.transparency.finish(&mut buf);
        let client = &mut *self.client;
        tokio::time::timeout(client.timeout, async {
            client.stream.write_all(&buf).await?;
            client.stream.flush().await?;
            client.read().await
        })
        .await
        .map_err(|_| crate::Error::Timeout)??
        .assert_positive_completion()
    }
}

#[cfg(test)]
mod test {
    use super::Transparency;

    fn transparency(chunks: &[&str]) -> String {
        let mut transparency = Transparency::default();
        let mut out = Vec::new();
        for chunk in chunks {
            transparency.encode(chunk.as_bytes(), &mut out);
        }
        transparency.finish(&mut out);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn transparency_procedure() {
        for (test, result) in [
            ("A: b\r\n.\r\n", "A: b\r\n..\r\n.\r\n"),
            ("A: b\r\n.", "A: b\r\n..\r\n.\r\n"),
            ("A: b\r\n..\r\n", "A: b\r\n...\r\n.\r\n"),
            ("A: ...b", "A: ...b\r\n.\r\n"),
            (".start", "..start\r\n.\r\n"),
            ("a\nb\n", "a\r\nb\r\n.\r\n"),
            ("a\n.\nb", "a\r\n..\r\nb\r\n.\r\n"),
            ("a\r", "a\r\n.\r\n"),
            ("", ".\r\n"),
        ] {
            assert_eq!(transparency(&[test]), result, "{test:?}");
        }
    }

    #[test]
    fn transparency_across_writes() {
        assert_eq!(
            transparency(&["line one\r", "\n", ".dot\n", "tail"]),
            "line one\r\n..dot\r\ntail\r\n.\r\n"
        );
    }
}
