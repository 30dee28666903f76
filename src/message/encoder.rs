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

use std::borrow::Cow;

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::{distributions::Alphanumeric, Rng};

use super::{
    sniff::{ContentSniffer, DefaultSniffer},
    Envelope,
};

const DEFAULT_BOUNDARY: &str = "frontier";
const LINE_LENGTH: usize = 76;

/// Serializes an [`Envelope`] into the bytes sent after `DATA`.
pub struct MessageEncoder {
    boundary: Cow<'static, str>,
    sniffer: Box<dyn ContentSniffer + Send + Sync>,
}

impl Default for MessageEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageEncoder {
    pub fn new() -> Self {
        MessageEncoder {
            boundary: DEFAULT_BOUNDARY.into(),
            sniffer: Box::new(DefaultSniffer),
        }
    }

    /// Use a fixed multipart boundary.
    pub fn with_boundary(mut self, boundary: impl Into<Cow<'static, str>>) -> Self {
        self.boundary = boundary.into();
        self
    }

    /// Use a random 30 character multipart boundary.
    pub fn with_random_boundary(mut self) -> Self {
        self.boundary = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(30)
            .map(char::from)
            .collect::<String>()
            .into();
        self
    }

    /// Detect attachment content types with `sniffer`.
    pub fn with_sniffer(mut self, sniffer: impl ContentSniffer + Send + Sync + 'static) -> Self {
        self.sniffer = Box::new(sniffer);
        self
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn encode(&self, envelope: &Envelope) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            256 + envelope.body.len() * 2
                + envelope
                    .attachments
                    .iter()
                    .map(|(_, contents)| contents.len() * 4 / 3 + 256)
                    .sum::<usize>(),
        );

        header(&mut buf, "From", envelope.from.as_deref().unwrap_or_default());
        header(&mut buf, "To", &envelope.to.join(";"));
        header(&mut buf, "Cc", &envelope.cc.join(";"));
        header(&mut buf, "Bcc", &envelope.bcc.join(";"));
        header(&mut buf, "Subject", &envelope.subject);
        // The body is repeated as a header for wire compatibility.
        header(&mut buf, "Body", &fold(&envelope.body));
        header(&mut buf, "MIME-Version", "1.0");

        if envelope.attachments.is_empty() {
            text_part(&mut buf, &envelope.body);
            return buf;
        }

        let boundary = self.boundary.as_ref();
        header(
            &mut buf,
            "Content-Type",
            &format!("multipart/mixed; boundary=\"{boundary}\""),
        );
        buf.extend_from_slice(b"\nThis is a multi-part message in MIME format.\n");

        delimiter(&mut buf, boundary);
        text_part(&mut buf, &envelope.body);

        for (name, contents) in envelope.attachments.iter() {
            delimiter(&mut buf, boundary);
            header(
                &mut buf,
                "Content-Type",
                &format!("{}; name=\"{name}\"", self.sniffer.sniff(contents)),
            );
            header(&mut buf, "Content-Transfer-Encoding", "base64");
            header(
                &mut buf,
                "Content-Disposition",
                &format!("attachment; filename=\"{name}\""),
            );
            buf.push(b'\n');
            base64_body(&mut buf, contents);
        }

        buf.extend_from_slice(b"--");
        buf.extend_from_slice(boundary.as_bytes());
        buf.extend_from_slice(b"--\n");

        buf
    }
}

fn header(buf: &mut Vec<u8>, name: &str, value: &str) {
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(b": ");
    buf.extend_from_slice(value.as_bytes());
    buf.push(b'\n');
}

/// Turns every line after the first into a continuation line, so a
/// multi-line value cannot end the header block.
fn fold(value: &str) -> Cow<'_, str> {
    if !value.contains(&['\r', '\n'][..]) {
        return value.into();
    }
    value
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .collect::<Vec<_>>()
        .join("\n ")
        .into()
}

fn delimiter(buf: &mut Vec<u8>, boundary: &str) {
    buf.extend_from_slice(b"--");
    buf.extend_from_slice(boundary.as_bytes());
    buf.push(b'\n');
}

fn text_part(buf: &mut Vec<u8>, body: &str) {
    header(buf, "Content-Type", "text/plain; charset=utf-8");
    header(buf, "Content-Transfer-Encoding", "7bit");
    buf.push(b'\n');
    buf.extend_from_slice(body.as_bytes());
    buf.push(b'\n');
}

fn base64_body(buf: &mut Vec<u8>, contents: &[u8]) {
    let encoded = STANDARD.encode(contents);
    for line in encoded.as_bytes().chunks(LINE_LENGTH) {
        buf.extend_from_slice(line);
        buf.push(b'\n');
    }
}
