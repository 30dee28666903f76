/*
 * Copyright Stalwart Labs Ltd.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::{io, sync::Arc};

use rustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    ClientConfig, RootCertStore, SignatureScheme,
};
use rustls_pki_types::{ServerName, TrustAnchor};
use tokio::net::TcpStream;
use tokio_rustls::{client::TlsStream, TlsConnector};

use crate::{Error, SmtpClient};

use super::stream::SmtpStream;

/// TLS settings used to upgrade a connection.
#[derive(Clone)]
pub struct TlsConfig {
    connector: TlsConnector,
    server_name: Option<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TlsConfig {
    /// Verifies server certificates against the Mozilla root store.
    pub fn new() -> Self {
        TlsConfig {
            connector: build_tls_connector(false),
            server_name: None,
        }
    }

    /// Accepts any server certificate. Only meant for testing.
    pub fn allow_invalid_certs(mut self) -> Self {
        self.connector = build_tls_connector(true);
        self
    }

    /// Uses a caller supplied rustls configuration.
    pub fn from_client_config(config: Arc<ClientConfig>) -> Self {
        TlsConfig {
            connector: TlsConnector::from(config),
            server_name: None,
        }
    }

    /// Name to verify the certificate against, instead of the host dialed.
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }
}

impl SmtpClient<SmtpStream> {
    /// Upgrade the connection to TLS and repeat EHLO.
    pub async fn start_tls(&mut self, config: &TlsConfig) -> crate::Result<()> {
        if self.stream.is_tls() {
            return Ok(());
        }

        let server_name = ServerName::try_from(
            config
                .server_name
                .clone()
                .unwrap_or_else(|| self.hostname.clone()),
        )
        .map_err(|_| crate::Error::InvalidTLSName)?;

        // Send STARTTLS command
        let reply = self.cmd(b"STARTTLS\r\n").await?;
        if reply.code != 220 {
            return Err(Error::StartTlsRejected(reply));
        }

        let stream = match std::mem::take(&mut self.stream) {
            SmtpStream::Basic(stream) => stream,
            _ => return Err(io::Error::from(io::ErrorKind::NotConnected).into()),
        };
        self.stream = SmtpStream::Tls(
            self.tls_handshake(stream, &config.connector, server_name)
                .await?,
        );
        log::debug!("Connection to {} upgraded to TLS", self.hostname);

        self.capabilities = None;
        self.ehlo().await?;
        Ok(())
    }

    pub(crate) async fn tls_handshake(
        &self,
        stream: TcpStream,
        tls_connector: &TlsConnector,
        server_name: ServerName<'static>,
    ) -> crate::Result<TlsStream<TcpStream>> {
        tokio::time::timeout(self.timeout, async {
            tls_connector
                .connect(server_name, stream)
                .await
                .map_err(|err| {
                    let kind = err.kind();
                    if let Some(inner) = err.into_inner() {
                        match inner.downcast::<rustls::Error>() {
                            Ok(error) => Error::Tls(error),
                            Err(error) => Error::Io(io::Error::new(kind, error)),
                        }
                    } else {
                        Error::Io(io::Error::new(kind, "Unspecified"))
                    }
                })
        })
        .await
        .map_err(|_| crate::Error::Timeout)?
    }
}

fn build_tls_connector(allow_invalid_certs: bool) -> TlsConnector {
    let config = if !allow_invalid_certs {
        let mut root_cert_store = RootCertStore::empty();

        root_cert_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| TrustAnchor {
            subject: ta.subject.clone(),
            subject_public_key_info: ta.subject_public_key_info.clone(),
            name_constraints: ta.name_constraints.clone(),
        }));

        ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth()
    } else {
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(DummyVerifier {}))
            .with_no_client_auth()
    };

    TlsConnector::from(Arc::new(config))
}

#[doc(hidden)]
#[derive(Debug)]
struct DummyVerifier;

impl ServerCertVerifier for DummyVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls_pki_types::CertificateDer<'_>,
        _intermediates: &[rustls_pki_types::CertificateDer<'_>],
        _server_name: &rustls_pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls_pki_types::UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls_pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls_pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA1,
            SignatureScheme::ECDSA_SHA1_Legacy,
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
            SignatureScheme::ED448,
        ]
    }
}
