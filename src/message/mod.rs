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

use std::{collections::BTreeMap, io, path::Path};

pub mod encoder;
pub mod sniff;

/// An outgoing message before serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    pub from: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachments: AttachmentStore,
}

/// Attachment contents keyed by file name, iterated in file name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentStore {
    files: BTreeMap<String, Vec<u8>>,
}

/// Supplies the contents of a file to attach.
pub trait AttachmentSource {
    /// Returns the base name of `path` and its contents.
    fn load(&self, path: &Path) -> io::Result<(String, Vec<u8>)>;
}

/// Reads attachments from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystem;

impl Envelope {
    /// Create a new message with the given subject and body.
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Envelope {
            subject: subject.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    /// Set the sender of the message.
    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.from = Some(address.into());
        self
    }

    /// Add a `To` recipient.
    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to.push(address.into());
        self
    }

    /// Add a `Cc` recipient.
    pub fn cc(mut self, address: impl Into<String>) -> Self {
        self.cc.push(address.into());
        self
    }

    /// Add a `Bcc` recipient.
    pub fn bcc(mut self, address: impl Into<String>) -> Self {
        self.bcc.push(address.into());
        self
    }

    /// Register `contents` under `name`, replacing any previous attachment
    /// with the same name.
    pub fn attach(&mut self, name: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.attachments.insert(name, contents);
    }

    /// Attach a file read from disk. The file's base name is used as the
    /// attachment name.
    pub fn attach_file(&mut self, path: impl AsRef<Path>) -> crate::Result<()> {
        self.attach_from(&FileSystem, path)
    }

    /// Attach a file obtained through `source`.
    pub fn attach_from(
        &mut self,
        source: &impl AttachmentSource,
        path: impl AsRef<Path>,
    ) -> crate::Result<()> {
        let path = path.as_ref();
        let (name, contents) = source.load(path).map_err(|error| crate::Error::Attachment {
            path: path.display().to_string(),
            error,
        })?;
        log::debug!("Attached {:?} ({} bytes)", name, contents.len());
        self.attach(name, contents);
        Ok(())
    }

    /// Every envelope recipient: `To`, then `Cc`, then `Bcc`, without duplicates.
    pub fn recipients(&self) -> Vec<&str> {
        let mut recipients: Vec<&str> =
            Vec::with_capacity(self.to.len() + self.cc.len() + self.bcc.len());
        for rcpt in self.to.iter().chain(&self.cc).chain(&self.bcc) {
            if !recipients.contains(&rcpt.as_str()) {
                recipients.push(rcpt);
            }
        }
        recipients
    }

    /// Serializes the message with the default encoder.
    pub fn to_bytes(&self) -> Vec<u8> {
        encoder::MessageEncoder::new().encode(self)
    }
}

impl AttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.files.insert(name.into(), contents.into());
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files
            .iter()
            .map(|(name, contents)| (name.as_str(), contents.as_slice()))
    }
}

impl AttachmentSource for FileSystem {
    fn load(&self, path: &Path) -> io::Result<(String, Vec<u8>)> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "path has no file name")
            })?;
        Ok((name, std::fs::read(path)?))
    }
}
