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

//! # mail-submit
//!
//! _mail-submit_ is a Rust library to compose MIME e-mail messages and hand them
//! to an SMTP server in a single, one-shot submission. It includes the following features:
//!
//! - Deterministic **MIME** encoding of a message envelope, with `multipart/mixed`
//!   output and base64 attachments when files are attached (_RFC 2045 - 2049_).
//! - Content-type detection for attachments from their leading bytes.
//! - Simple Mail Transfer Protocol (**SMTP**; _RFC 5321_) delivery.
//! - SMTP Service Extension for Secure SMTP over **TLS** (_RFC 3207_).
//! - SASL **PLAIN** authentication (_RFC 4616_, _RFC 4954_).
//! - Per-recipient rejection reporting, bounded timeouts and cancellation.
//! - Full async (requires Tokio).
//!
//! ## Usage Example
//!
//! Send a message with an attachment through a server that requires authentication:
//!
//! ```rust
//!     let mut envelope = Envelope::new("Hi!", "These pretzels are making me thirsty.")
//!         .from("john@example.com")
//!         .to("jane@example.com");
//!     envelope.attach_file("./pretzels.png")?;
//!
//!     let strategy = AuthStrategy::plain_auth(Credentials::new(
//!         "john@example.com",
//!         "p4ssw0rd",
//!         "smtp.example.com",
//!         "587",
//!     ));
//!
//!     SendSession::new(strategy).send_mail(&envelope).await?;
//! ```
//!
//! Send a message through a relay that trusts the network, upgrading the
//! connection with STARTTLS:
//!
//! ```rust
//!     let envelope = Envelope::new("Howdy!", "Hello world!")
//!         .from("john@example.com")
//!         .to("jane@example.com")
//!         .bcc("archive@example.com");
//!
//!     let strategy = AuthStrategy::dialer(DialerTarget::new("relay.example.com", "25")).await?;
//!
//!     SendSession::new(strategy)
//!         .send_mail_tls(&envelope, &TlsConfig::new())
//!         .await?;
//! ```
//!
//! ## License
//!
//! Licensed under either of
//!
//!  * Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
//!  * MIT license ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)
//!
//! at your option.
//!

pub mod auth;
pub mod message;
pub mod session;
pub mod smtp;
pub mod transport;

use std::{fmt::Display, time::Duration};

use smtp_proto::{EhloResponse, Response};
use tokio::io::{AsyncRead, AsyncWrite};

pub use auth::{AuthStrategy, Credentials, DialerTarget};
pub use message::{
    encoder::MessageEncoder,
    sniff::{ContentSniffer, DefaultSniffer},
    AttachmentSource, AttachmentStore, Envelope, FileSystem,
};
pub use session::{RejectedRecipient, SendSession, SessionState};
pub use smtp::{auth::AuthToken, stream::SmtpStream, tls::TlsConfig};
pub use transport::{Connector, DataSink, MailTransport};

#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// TLS error
    Tls(Box<rustls::Error>),

    /// An attachment could not be read.
    Attachment {
        path: String,
        error: std::io::Error,
    },

    /// Failure parsing SMTP reply
    UnparseableReply,

    /// Unexpected SMTP reply.
    UnexpectedReply(Response<String>),

    /// SMTP authentication failure.
    AuthenticationFailed(Response<String>),

    /// The server does not advertise the PLAIN mechanism.
    UnsupportedAuthMechanism,

    /// PLAIN credentials would travel over an unencrypted connection.
    InsecureAuth,

    /// The credentials were issued for a different host than the one connected to.
    WrongHost {
        expected: String,
        connected: String,
    },

    /// Invalid TLS name provided.
    InvalidTLSName,

    /// The server does not support STARTTLS.
    MissingStartTls,

    /// The server refused the STARTTLS command.
    StartTlsRejected(Response<String>),

    /// A port could not be parsed.
    InvalidPort(String),

    /// Missing message sender.
    MissingMailFrom,

    /// Missing message recipients.
    MissingRcptTo,

    /// The send operation does not match the session's authentication strategy.
    StrategyMismatch,

    /// The session already completed a send attempt.
    SessionSpent,

    /// One or more recipients were refused by the server.
    RejectedRecipients {
        rejected: Vec<session::RejectedRecipient>,
        delivered: bool,
    },

    /// Timeout while connecting, before any mail transaction started.
    ConnectTimeout,

    /// Timeout during the mail transaction.
    Timeout,

    /// The send was cancelled by the caller.
    Cancelled,
}

/// Broad classification of an [`Error`], suitable for branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Io,
    Connection,
    Protocol,
    PartialRecipient,
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

/// SMTP client connection.
pub struct SmtpClient<T: AsyncRead + AsyncWrite> {
    pub stream: T,
    pub timeout: Duration,
    pub capabilities: Option<EhloResponse<String>>,
    pub(crate) hostname: String,
    pub(crate) local_host: String,
}

/// Connection factory holding the settings shared by every dial.
#[derive(Clone)]
pub struct SmtpClientBuilder {
    pub timeout: Duration,
    pub local_host: String,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidPort(_)
            | Error::MissingMailFrom
            | Error::MissingRcptTo
            | Error::StrategyMismatch
            | Error::SessionSpent
            | Error::WrongHost { .. }
            | Error::InvalidTLSName => ErrorKind::Config,
            Error::Attachment { .. } => ErrorKind::Io,
            Error::Io(_)
            | Error::Tls(_)
            | Error::UnparseableReply
            | Error::AuthenticationFailed(_)
            | Error::UnsupportedAuthMechanism
            | Error::InsecureAuth
            | Error::MissingStartTls
            | Error::StartTlsRejected(_)
            | Error::ConnectTimeout
            | Error::Timeout => ErrorKind::Connection,
            Error::UnexpectedReply(_) => ErrorKind::Protocol,
            Error::RejectedRecipients { .. } => ErrorKind::PartialRecipient,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether the whole send can be attempted again without risking
    /// duplicate server-side state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ConnectTimeout)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Tls(e) => write!(f, "TLS error: {e}"),
            Error::Attachment { path, error } => {
                write!(f, "Failed to read attachment {path:?}: {error}")
            }
            Error::UnparseableReply => write!(f, "Unparseable SMTP reply"),
            Error::UnexpectedReply(e) => {
                write!(f, "Unexpected reply: {} {}", e.code, e.message)
            }
            Error::AuthenticationFailed(e) => {
                write!(f, "Authentication failed: {} {}", e.code, e.message)
            }
            Error::UnsupportedAuthMechanism => {
                write!(f, "The server does not support PLAIN authentication")
            }
            Error::InsecureAuth => {
                write!(f, "Refusing to send credentials over an unencrypted connection")
            }
            Error::WrongHost {
                expected,
                connected,
            } => write!(
                f,
                "Credentials for {expected:?} refused on connection to {connected:?}"
            ),
            Error::InvalidTLSName => write!(f, "Invalid TLS name provided"),
            Error::MissingStartTls => write!(f, "STARTTLS not available"),
            Error::StartTlsRejected(e) => {
                write!(f, "STARTTLS rejected: {} {}", e.code, e.message)
            }
            Error::InvalidPort(port) => write!(f, "Invalid port {port:?}"),
            Error::MissingMailFrom => write!(f, "Missing message sender"),
            Error::MissingRcptTo => write!(f, "Missing message recipients"),
            Error::StrategyMismatch => write!(
                f,
                "The send operation does not match the session authentication strategy"
            ),
            Error::SessionSpent => write!(f, "The session has already been used"),
            Error::RejectedRecipients {
                rejected,
                delivered,
            } => {
                write!(f, "Recipients rejected (")?;
                for (pos, rcpt) in rejected.iter().enumerate() {
                    if pos > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", rcpt.address, rcpt.code)?;
                }
                if *delivered {
                    write!(f, "), message delivered to the remaining recipients")
                } else {
                    write!(f, "), message not delivered")
                }
            }
            Error::ConnectTimeout => write!(f, "Connection timeout"),
            Error::Timeout => write!(f, "Timeout during mail transaction"),
            Error::Cancelled => write!(f, "Send cancelled"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Tls(e) => Some(e.as_ref()),
            Error::Attachment { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<rustls::Error> for Error {
    fn from(err: rustls::Error) -> Self {
        Error::Tls(Box::new(err))
    }
}

#[cfg(test)]
mod test {
    use smtp_proto::Response;

    use crate::{session::RejectedRecipient, Error, ErrorKind};

    #[test]
    fn error_taxonomy() {
        assert_eq!(Error::MissingMailFrom.kind(), ErrorKind::Config);
        assert_eq!(Error::InvalidPort("x".into()).kind(), ErrorKind::Config);
        assert_eq!(
            Error::Attachment {
                path: "a.txt".into(),
                error: std::io::ErrorKind::NotFound.into()
            }
            .kind(),
            ErrorKind::Io
        );
        assert_eq!(
            Error::WrongHost {
                expected: "smtp.example.com".into(),
                connected: "localhost".into()
            }
            .kind(),
            ErrorKind::Config
        );
        assert_eq!(Error::ConnectTimeout.kind(), ErrorKind::Connection);
        assert_eq!(
            Error::UnexpectedReply(Response {
                code: 550,
                esc: [5, 1, 1],
                message: "No such user".to_string(),
            })
            .kind(),
            ErrorKind::Protocol
        );
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancelled);

        assert!(Error::ConnectTimeout.is_retryable());
        assert!(!Error::Timeout.is_retryable());
    }

    #[test]
    fn rejected_recipients_display() {
        let err = Error::RejectedRecipients {
            rejected: vec![RejectedRecipient {
                address: "bad@example.com".into(),
                code: 550,
                message: "No such user".into(),
            }],
            delivered: true,
        };
        assert_eq!(err.kind(), ErrorKind::PartialRecipient);
        assert_eq!(
            err.to_string(),
            "Recipients rejected (bad@example.com: 550), message delivered to the remaining recipients"
        );
    }
}
