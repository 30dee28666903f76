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

/// Number of leading bytes inspected when detecting a content type.
pub const SNIFF_LENGTH: usize = 512;

const OCTET_STREAM: &str = "application/octet-stream";
const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Detects the MIME type of an attachment from its contents.
pub trait ContentSniffer {
    fn sniff(&self, data: &[u8]) -> Cow<'static, str>;
}

/// Signature table in the WHATWG MIME sniffing family, falling back to
/// `text/plain` for text-like content and `application/octet-stream`
/// for everything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSniffer;

enum Signature {
    /// Case-insensitive HTML tag followed by a space or `>`.
    Html(&'static [u8]),
    /// Exact prefix, optionally after leading whitespace.
    Exact {
        sig: &'static [u8],
        skip_ws: bool,
        ctype: &'static str,
    },
    /// Prefix compared under a byte mask.
    Masked {
        mask: &'static [u8],
        pattern: &'static [u8],
        ctype: &'static str,
    },
    Mp4,
}

const HTML_TYPE: &str = "text/html; charset=utf-8";

static SIGNATURES: &[Signature] = &[
    Signature::Html(b"<!DOCTYPE HTML"),
    Signature::Html(b"<HTML"),
    Signature::Html(b"<HEAD"),
    Signature::Html(b"<SCRIPT"),
    Signature::Html(b"<IFRAME"),
    Signature::Html(b"<H1"),
    Signature::Html(b"<DIV"),
    Signature::Html(b"<FONT"),
    Signature::Html(b"<TABLE"),
    Signature::Html(b"<A"),
    Signature::Html(b"<STYLE"),
    Signature::Html(b"<TITLE"),
    Signature::Html(b"<B"),
    Signature::Html(b"<BODY"),
    Signature::Html(b"<BR"),
    Signature::Html(b"<P"),
    Signature::Html(b"<!--"),
    Signature::Exact {
        sig: b"<?xml",
        skip_ws: true,
        ctype: "text/xml; charset=utf-8",
    },
    Signature::Exact {
        sig: b"%PDF-",
        skip_ws: false,
        ctype: "application/pdf",
    },
    Signature::Exact {
        sig: b"%!PS-Adobe-",
        skip_ws: false,
        ctype: "application/postscript",
    },
    // Byte order marks
    Signature::Exact {
        sig: b"\xFE\xFF",
        skip_ws: false,
        ctype: "text/plain; charset=utf-16be",
    },
    Signature::Exact {
        sig: b"\xFF\xFE",
        skip_ws: false,
        ctype: "text/plain; charset=utf-16le",
    },
    Signature::Exact {
        sig: b"\xEF\xBB\xBF",
        skip_ws: false,
        ctype: TEXT_PLAIN,
    },
    // Images
    Signature::Exact {
        sig: b"\x00\x00\x01\x00",
        skip_ws: false,
        ctype: "image/x-icon",
    },
    Signature::Exact {
        sig: b"\x00\x00\x02\x00",
        skip_ws: false,
        ctype: "image/x-icon",
    },
    Signature::Exact {
        sig: b"BM",
        skip_ws: false,
        ctype: "image/bmp",
    },
    Signature::Exact {
        sig: b"GIF87a",
        skip_ws: false,
        ctype: "image/gif",
    },
    Signature::Exact {
        sig: b"GIF89a",
        skip_ws: false,
        ctype: "image/gif",
    },
    Signature::Masked {
        mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF\xFF\xFF",
        pattern: b"RIFF\x00\x00\x00\x00WEBPVP",
        ctype: "image/webp",
    },
    Signature::Exact {
        sig: b"\x89PNG\x0D\x0A\x1A\x0A",
        skip_ws: false,
        ctype: "image/png",
    },
    Signature::Exact {
        sig: b"\xFF\xD8\xFF",
        skip_ws: false,
        ctype: "image/jpeg",
    },
    // Audio and video
    Signature::Masked {
        mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        pattern: b"FORM\x00\x00\x00\x00AIFF",
        ctype: "audio/aiff",
    },
    Signature::Exact {
        sig: b"ID3",
        skip_ws: false,
        ctype: "audio/mpeg",
    },
    Signature::Exact {
        sig: b"OggS\x00",
        skip_ws: false,
        ctype: "application/ogg",
    },
    Signature::Exact {
        sig: b"MThd\x00\x00\x00\x06",
        skip_ws: false,
        ctype: "audio/midi",
    },
    Signature::Masked {
        mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        pattern: b"RIFF\x00\x00\x00\x00AVI ",
        ctype: "video/avi",
    },
    Signature::Masked {
        mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        pattern: b"RIFF\x00\x00\x00\x00WAVE",
        ctype: "audio/wave",
    },
    Signature::Mp4,
    Signature::Exact {
        sig: b"\x1A\x45\xDF\xA3",
        skip_ws: false,
        ctype: "video/webm",
    },
    // Fonts
    Signature::Exact {
        sig: b"OTTO",
        skip_ws: false,
        ctype: "font/otf",
    },
    Signature::Exact {
        sig: b"\x00\x01\x00\x00",
        skip_ws: false,
        ctype: "font/ttf",
    },
    Signature::Exact {
        sig: b"wOFF",
        skip_ws: false,
        ctype: "font/woff",
    },
    Signature::Exact {
        sig: b"wOF2",
        skip_ws: false,
        ctype: "font/woff2",
    },
    // Archives
    Signature::Exact {
        sig: b"\x1F\x8B\x08",
        skip_ws: false,
        ctype: "application/x-gzip",
    },
    Signature::Exact {
        sig: b"PK\x03\x04",
        skip_ws: false,
        ctype: "application/zip",
    },
    Signature::Exact {
        sig: b"Rar!\x1A\x07\x00",
        skip_ws: false,
        ctype: "application/x-rar-compressed",
    },
    Signature::Exact {
        sig: b"Rar!\x1A\x07\x01\x00",
        skip_ws: false,
        ctype: "application/x-rar-compressed",
    },
    Signature::Exact {
        sig: b"\x00\x61\x73\x6D",
        skip_ws: false,
        ctype: "application/wasm",
    },
];

impl ContentSniffer for DefaultSniffer {
    fn sniff(&self, data: &[u8]) -> Cow<'static, str> {
        let data = &data[..data.len().min(SNIFF_LENGTH)];
        let first_non_ws = data
            .iter()
            .position(|byte| !is_ws(*byte))
            .unwrap_or(data.len());

        for signature in SIGNATURES {
            if let Some(ctype) = signature.matches(data, first_non_ws) {
                return ctype.into();
            }
        }

        if data.iter().any(|byte| is_binary(*byte)) {
            OCTET_STREAM.into()
        } else {
            TEXT_PLAIN.into()
        }
    }
}

impl Signature {
    fn matches(&self, data: &[u8], first_non_ws: usize) -> Option<&'static str> {
        match self {
            Signature::Html(tag) => {
                let data = &data[first_non_ws..];
                if data.len() > tag.len()
                    && data[..tag.len()].eq_ignore_ascii_case(tag)
                    && matches!(data[tag.len()], b' ' | b'>')
                {
                    Some(HTML_TYPE)
                } else {
                    None
                }
            }
            Signature::Exact {
                sig,
                skip_ws,
                ctype,
            } => {
                let data = if *skip_ws { &data[first_non_ws..] } else { data };
                data.starts_with(sig).then_some(*ctype)
            }
            Signature::Masked {
                mask,
                pattern,
                ctype,
            } => (data.len() >= pattern.len()
                && data
                    .iter()
                    .zip(mask.iter())
                    .zip(pattern.iter())
                    .all(|((byte, mask), pattern)| byte & mask == *pattern))
            .then_some(*ctype),
            Signature::Mp4 => is_mp4(data).then_some("video/mp4"),
        }
    }
}

fn is_mp4(data: &[u8]) -> bool {
    if data.len() < 12 {
        return false;
    }
    let box_size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if data.len() < box_size || box_size % 4 != 0 || &data[4..8] != b"ftyp" {
        return false;
    }
    // Major brand followed by the compatible brands, skipping the minor version.
    (8..box_size)
        .step_by(4)
        .filter(|&pos| pos != 12)
        .any(|pos| data.get(pos..pos + 3) == Some(b"mp4".as_ref()))
}

fn is_ws(byte: u8) -> bool {
    matches!(byte, b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

fn is_binary(byte: u8) -> bool {
    matches!(byte, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

#[cfg(test)]
mod test {
    use super::{ContentSniffer, DefaultSniffer};

    #[test]
    fn sniff_signatures() {
        let cases: &[(&[u8], &str)] = &[
            (b"hello", "text/plain; charset=utf-8"),
            (b"", "text/plain; charset=utf-8"),
            (b"\x89PNG\x0D\x0A\x1A\x0A\x00\x00\x00\x0DIHDR", "image/png"),
            (b"GIF89a\x01\x00", "image/gif"),
            (b"\xFF\xD8\xFF\xE0\x00\x10JFIF", "image/jpeg"),
            (b"%PDF-1.7\n%", "application/pdf"),
            (b"  \n<html><body>Hi</body></html>", "text/html; charset=utf-8"),
            (b"<!-- comment -->", "text/html; charset=utf-8"),
            (b"<Table>", "text/html; charset=utf-8"),
            (b"<tablex>", "text/plain; charset=utf-8"),
            (b"\n<?xml version=\"1.0\"?>", "text/xml; charset=utf-8"),
            (b"PK\x03\x04\x14\x00", "application/zip"),
            (b"\x1F\x8B\x08\x00", "application/x-gzip"),
            (b"RIFF\x24\x00\x00\x00WAVEfmt ", "audio/wave"),
            (b"RIFF\x24\x00\x00\x00WEBPVP8 ", "image/webp"),
            (b"ID3\x03\x00", "audio/mpeg"),
            (b"\xEF\xBB\xBFtext", "text/plain; charset=utf-8"),
            (b"\xFE\xFF\x00h", "text/plain; charset=utf-16be"),
            (b"\x00asm\x01\x00\x00\x00", "application/wasm"),
            (
                b"\x00\x00\x00\x18ftypmp42\x00\x00\x00\x00isommp42",
                "video/mp4",
            ),
            (b"\x00\x01\x02\x03", "application/octet-stream"),
            (b"text with \x1B escape", "text/plain; charset=utf-8"),
        ];

        for (data, expected) in cases {
            assert_eq!(
                DefaultSniffer.sniff(data),
                *expected,
                "{:?}",
                String::from_utf8_lossy(data)
            );
        }
    }

    #[test]
    fn sniff_only_inspects_prefix() {
        let mut data = vec![b'a'; 600];
        data[550] = 0x00;
        assert_eq!(DefaultSniffer.sniff(&data), "text/plain; charset=utf-8");
        data[10] = 0x00;
        assert_eq!(DefaultSniffer.sniff(&data), "application/octet-stream");
    }
}
