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

use base64::{engine::general_purpose::STANDARD, Engine};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::SmtpClient;

use super::is_loopback;

/// SASL PLAIN token bound to the host it was issued for.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken {
    identity: String,
    username: String,
    secret: String,
    host: String,
}

impl AuthToken {
    /// Creates a token with an empty authorization identity.
    pub fn plain(
        username: impl Into<String>,
        secret: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        AuthToken {
            identity: String::new(),
            username: username.into(),
            secret: secret.into(),
            host: host.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Base64 encoded `identity NUL username NUL password` message.
    pub fn encode(&self) -> String {
        STANDARD.encode(format!(
            "{}\u{0}{}\u{0}{}",
            self.identity, self.username, self.secret
        ))
    }
}

impl Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("username", &self.username)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> SmtpClient<T> {
    /// Authenticates with SASL PLAIN, sending the credentials as an
    /// initial response.
    pub async fn authenticate(&mut self, token: &AuthToken, is_secure: bool) -> crate::Result<()> {
        if !is_secure && !is_loopback(&self.hostname) {
            return Err(crate::Error::InsecureAuth);
        }
        if !token.host.eq_ignore_ascii_case(&self.hostname) {
            return Err(crate::Error::WrongHost {
                expected: token.host.clone(),
                connected: self.hostname.clone(),
            });
        }
        if !self.has_auth_plain() {
            return Err(crate::Error::UnsupportedAuthMechanism);
        }

        log::debug!("Authenticating {:?} with {}", token.username, self.hostname);
        log::trace!("C: AUTH PLAIN <redacted>");
        let mut reply = self
            .send_cmd(format!("AUTH PLAIN {}\r\n", token.encode()).as_bytes())
            .await?;

        for _ in 0..2 {
            match reply.code {
                334 => {
                    reply = self
                        .send_cmd(format!("{}\r\n", token.encode()).as_bytes())
                        .await?;
                }
                235 => {
                    return Ok(());
                }
                _ => {
                    return Err(crate::Error::AuthenticationFailed(reply));
                }
            }
        }

        Err(crate::Error::AuthenticationFailed(reply))
    }
}
