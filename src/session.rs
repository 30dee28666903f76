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

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::{
    auth::parse_port,
    smtp::builder::into_connect_error,
    transport::{Connector, DataSink, MailTransport},
    AuthStrategy, AuthToken, Envelope, Error, MessageEncoder, SmtpClientBuilder, TlsConfig,
};

/// Progress of a [`SendSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Connected,
    Authenticated,
    TlsUpgraded,
    Sending,
    Done,
    Failed,
}

/// A recipient refused by the server during `RCPT TO`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecipient {
    pub address: String,
    pub code: u16,
    pub message: String,
}

/// Delivers a single message using an [`AuthStrategy`].
///
/// A session performs at most one send attempt. Afterwards it is spent and
/// every further call fails with [`Error::SessionSpent`].
pub struct SendSession<C: Connector = SmtpClientBuilder> {
    connector: C,
    strategy: Option<AuthStrategy<C::Transport>>,
    encoder: MessageEncoder,
    tls: TlsConfig,
    cancel: Option<CancellationToken>,
    state: SessionState,
}

impl SendSession {
    pub fn new(strategy: AuthStrategy) -> Self {
        SendSession::with_connector(SmtpClientBuilder::new(), strategy)
    }
}

impl<C: Connector> SendSession<C> {
    /// Creates a session that dials plain-auth connections through `connector`.
    pub fn with_connector(connector: C, strategy: AuthStrategy<C::Transport>) -> Self {
        SendSession {
            connector,
            strategy: Some(strategy),
            encoder: MessageEncoder::new(),
            tls: TlsConfig::new(),
            cancel: None,
            state: SessionState::Idle,
        }
    }

    /// Serialize messages with `encoder`.
    pub fn encoder(mut self, encoder: MessageEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    /// TLS settings for the opportunistic STARTTLS of [`SendSession::send_mail`].
    pub fn tls_config(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    /// Abort the send as soon as `token` is cancelled.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Sends `envelope` through the plain-auth strategy: dial, upgrade
    /// with STARTTLS when offered, authenticate, then deliver to every
    /// `To` address. The first refused recipient aborts the send.
    ///
    /// Without a `From` address the authenticated username is used as the
    /// sender.
    pub async fn send_mail(&mut self, envelope: &Envelope) -> crate::Result<()> {
        let (credentials, token) = match self.take_strategy()? {
            AuthStrategy::PlainAuth { credentials, token } => (credentials, token),
            AuthStrategy::DialerNoAuth { mut transport, .. } => {
                release(&mut transport, false).await;
                return Err(self.fail(Error::StrategyMismatch));
            }
        };

        if envelope.to.is_empty() {
            return Err(self.fail(Error::MissingRcptTo));
        }
        let port = match parse_port(credentials.port()) {
            Ok(port) => port,
            Err(err) => return Err(self.fail(err)),
        };
        let sender = envelope.from.as_deref().unwrap_or(token.username());

        let dialed = cancellable(
            self.cancel.as_ref(),
            self.connector.dial(credentials.host(), port),
        )
        .await;
        let mut transport = match dialed {
            Ok(transport) => transport,
            Err(err) => return Err(self.fail(into_connect_error(err))),
        };
        self.state = SessionState::Connected;

        let result = self
            .plain_sequence(&mut transport, &token, sender, envelope)
            .await;
        self.finish(transport, result).await
    }

    /// Sends `envelope` over the connection held by the dialer strategy,
    /// after upgrading it with STARTTLS using `tls`.
    ///
    /// Every recipient in `To`, `Cc` and `Bcc` is attempted. Refused
    /// recipients are reported through [`Error::RejectedRecipients`], and
    /// the message is still delivered to the accepted ones.
    pub async fn send_mail_tls(
        &mut self,
        envelope: &Envelope,
        tls: &TlsConfig,
    ) -> crate::Result<()> {
        let mut transport = match self.take_strategy()? {
            AuthStrategy::DialerNoAuth { transport, .. } => transport,
            AuthStrategy::PlainAuth { .. } => return Err(self.fail(Error::StrategyMismatch)),
        };

        let invalid = if envelope.from.is_none() {
            Some(Error::MissingMailFrom)
        } else if envelope.recipients().is_empty() {
            Some(Error::MissingRcptTo)
        } else {
            None
        };
        if let Some(err) = invalid {
            release(&mut transport, false).await;
            return Err(self.fail(err));
        }

        self.state = SessionState::Connected;
        let result = self.tls_sequence(&mut transport, envelope, tls).await;
        self.finish(transport, result).await
    }

    async fn plain_sequence(
        &mut self,
        transport: &mut C::Transport,
        token: &AuthToken,
        sender: &str,
        envelope: &Envelope,
    ) -> crate::Result<()> {
        let cancel = self.cancel.clone();
        let cancel = cancel.as_ref();

        if !transport.is_secure() && transport.supports_start_tls() {
            cancellable(cancel, transport.start_tls(&self.tls))
                .await
                .map_err(into_connect_error)?;
            self.state = SessionState::TlsUpgraded;
        }

        cancellable(cancel, transport.handshake(token))
            .await
            .map_err(into_connect_error)?;
        self.state = SessionState::Authenticated;
        log::debug!("Authenticated as {:?}", token.username());

        self.state = SessionState::Sending;
        cancellable(cancel, transport.mail_from(sender)).await?;
        for rcpt in &envelope.to {
            cancellable(cancel, transport.rcpt_to(rcpt)).await?;
        }

        self.data(transport, envelope).await
    }

    async fn tls_sequence(
        &mut self,
        transport: &mut C::Transport,
        envelope: &Envelope,
        tls: &TlsConfig,
    ) -> crate::Result<()> {
        let cancel = self.cancel.clone();
        let cancel = cancel.as_ref();

        cancellable(cancel, transport.start_tls(tls))
            .await
            .map_err(into_connect_error)?;
        self.state = SessionState::TlsUpgraded;

        self.state = SessionState::Sending;
        let sender = envelope.from.as_deref().unwrap_or_default();
        cancellable(cancel, transport.mail_from(sender)).await?;

        let mut rejected = Vec::new();
        let mut accepted = 0;
        for rcpt in envelope.recipients() {
            match cancellable(cancel, transport.rcpt_to(rcpt)).await {
                Ok(()) => accepted += 1,
                Err(Error::UnexpectedReply(reply)) => {
                    log::warn!("Recipient {rcpt} rejected: {} {}", reply.code, reply.message);
                    rejected.push(RejectedRecipient {
                        address: rcpt.to_string(),
                        code: reply.code,
                        message: reply.message,
                    });
                }
                Err(err) => return Err(err),
            }
        }

        if accepted == 0 {
            return Err(Error::RejectedRecipients {
                rejected,
                delivered: false,
            });
        }

        self.data(transport, envelope).await?;

        if rejected.is_empty() {
            Ok(())
        } else {
            Err(Error::RejectedRecipients {
                rejected,
                delivered: true,
            })
        }
    }

    async fn data(&self, transport: &mut C::Transport, envelope: &Envelope) -> crate::Result<()> {
        let cancel = self.cancel.as_ref();
        let message = self.encoder.encode(envelope);

        let mut writer = cancellable(cancel, transport.open_data_writer()).await?;
        cancellable(cancel, writer.write(&message)).await?;
        cancellable(cancel, writer.close()).await?;
        log::debug!("Message of {} bytes accepted", message.len());
        Ok(())
    }

    fn take_strategy(&mut self) -> crate::Result<AuthStrategy<C::Transport>> {
        match self.state {
            SessionState::Done | SessionState::Failed => Err(Error::SessionSpent),
            _ => self.strategy.take().ok_or(Error::SessionSpent),
        }
    }

    fn fail(&mut self, err: Error) -> Error {
        log::debug!("Send failed: {err}");
        self.state = SessionState::Failed;
        err
    }

    async fn finish(
        &mut self,
        mut transport: C::Transport,
        result: crate::Result<()>,
    ) -> crate::Result<()> {
        let broken = matches!(
            &result,
            Err(Error::Io(_)
                | Error::Tls(_)
                | Error::UnparseableReply
                | Error::Timeout
                | Error::ConnectTimeout
                | Error::Cancelled)
        );
        release(&mut transport, broken).await;

        match result {
            Ok(()) => {
                self.state = SessionState::Done;
                Ok(())
            }
            Err(err @ Error::RejectedRecipients { delivered: true, .. }) => {
                self.state = SessionState::Done;
                Err(err)
            }
            Err(err) => Err(self.fail(err)),
        }
    }
}

/// Closes the connection, skipping QUIT when it can no longer be trusted.
async fn release<T: MailTransport>(transport: &mut T, broken: bool) {
    let result = if broken {
        transport.abort().await
    } else {
        transport.close().await
    };
    if let Err(err) = result {
        log::warn!("Failed to close connection: {err}");
    }
}

async fn cancellable<T>(
    cancel: Option<&CancellationToken>,
    step: impl Future<Output = crate::Result<T>>,
) -> crate::Result<T> {
    match cancel {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(Error::Cancelled),
                result = step => result,
            }
        }
        None => step.await,
    }
}
