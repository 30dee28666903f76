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

use std::fmt::Debug;

use crate::{
    transport::{Connector, MailTransport},
    AuthToken, SmtpClient, SmtpClientBuilder, SmtpStream,
};

/// Login details for a submission server.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
    host: String,
    port: String,
}

/// A relay that accepts mail without authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialerTarget {
    host: String,
    port: String,
}

/// How a [`SendSession`](crate::SendSession) obtains its connection.
pub enum AuthStrategy<T = SmtpClient<SmtpStream>> {
    /// Dial at send time and authenticate with SASL PLAIN.
    PlainAuth {
        credentials: Credentials,
        token: AuthToken,
    },
    /// A connection dialed up front, used without authentication.
    DialerNoAuth { target: DialerTarget, transport: T },
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
        port: impl Into<String>,
    ) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
            host: host.into(),
            port: port.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> &str {
        &self.port
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl DialerTarget {
    pub fn new(host: impl Into<String>, port: impl Into<String>) -> Self {
        DialerTarget {
            host: host.into(),
            port: port.into(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> &str {
        &self.port
    }
}

impl AuthStrategy {
    /// Dials `target` with the default client settings, reading the
    /// greeting and sending EHLO before returning.
    pub async fn dialer(target: DialerTarget) -> crate::Result<Self> {
        Self::dialer_with(&SmtpClientBuilder::new(), target).await
    }
}

impl<T: MailTransport> AuthStrategy<T> {
    /// Prepares a SASL PLAIN token bound to the credentials' host. Nothing
    /// is dialed until the message is sent.
    pub fn plain_auth(credentials: Credentials) -> Self {
        let token = AuthToken::plain(
            credentials.username.clone(),
            credentials.password.clone(),
            credentials.host.clone(),
        );
        AuthStrategy::PlainAuth { credentials, token }
    }

    /// Dials `target` through `connector`.
    pub async fn dialer_with<C>(connector: &C, target: DialerTarget) -> crate::Result<Self>
    where
        C: Connector<Transport = T>,
    {
        let port = parse_port(&target.port)?;
        let transport = connector.dial(&target.host, port).await?;
        log::debug!("Connected to relay {}:{}", target.host, port);
        Ok(AuthStrategy::DialerNoAuth { target, transport })
    }

    pub fn is_plain_auth(&self) -> bool {
        matches!(self, AuthStrategy::PlainAuth { .. })
    }
}

pub(crate) fn parse_port(port: &str) -> crate::Result<u16> {
    match port.trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(crate::Error::InvalidPort(port.to_string())),
    }
}

#[cfg(test)]
mod test {
    use crate::{
        transport::mock::{MockConnector, MockTransport},
        AuthStrategy, Credentials, DialerTarget, Error,
    };

    use super::parse_port;

    #[test]
    fn port_parsing() {
        assert_eq!(parse_port("587").unwrap(), 587);
        assert_eq!(parse_port(" 25 ").unwrap(), 25);
        for port in ["", "smtp", "0", "65536", "-25"] {
            assert!(
                matches!(parse_port(port), Err(Error::InvalidPort(p)) if p == port),
                "{port:?}"
            );
        }
    }

    #[test]
    fn plain_auth_is_pure() {
        let strategy = AuthStrategy::<MockTransport>::plain_auth(Credentials::new(
            "tim",
            "tanstaaftanstaaf",
            "smtp.example.com",
            "not a port",
        ));
        assert!(strategy.is_plain_auth());
        match strategy {
            AuthStrategy::PlainAuth { credentials, token } => {
                assert_eq!(token.username(), "tim");
                assert_eq!(token.host(), "smtp.example.com");
                assert_eq!(token.encode(), "AHRpbQB0YW5zdGFhZnRhbnN0YWFm");
                assert!(!format!("{credentials:?}").contains("tanstaaf"));
            }
            AuthStrategy::DialerNoAuth { .. } => unreachable!(),
        }
    }

    #[tokio::test]
    async fn dialer_connects_immediately() {
        let connector = MockConnector::default();
        let strategy =
            AuthStrategy::dialer_with(&connector, DialerTarget::new("relay.example.com", "25"))
                .await
                .unwrap();
        assert!(!strategy.is_plain_auth());
        assert_eq!(connector.entries(), vec!["DIAL relay.example.com:25"]);
    }

    #[tokio::test]
    async fn dialer_invalid_port() {
        let connector = MockConnector::default();
        assert!(matches!(
            AuthStrategy::dialer_with(&connector, DialerTarget::new("relay.example.com", "smtp"))
                .await,
            Err(Error::InvalidPort(_))
        ));
        assert!(connector.entries().is_empty());
    }

    #[tokio::test]
    async fn dialer_connection_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(matches!(
            AuthStrategy::dialer(DialerTarget::new("127.0.0.1", port.to_string())).await,
            Err(Error::Io(_))
        ));
    }
}
