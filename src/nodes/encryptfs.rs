//! Authenticated encryption wrapper (`encryptfs`).
//!
//! Each file is stored as `nonce (12 bytes) || ciphertext || tag (16 bytes)`
//! with a fresh random nonce per write. The AES-256 key is the SHA-256 digest
//! of the configured key material, read from an environment variable or a
//! file. Trailing whitespace of the key material is ignored.

use std::fmt;
use std::io::Write;
use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::NodeError;
use crate::layer::Layer;
use crate::nodes::{check_creatable, opt_str};
use crate::registry::{FieldKind, NodeSchema, SchemaField};
use crate::validator::rules::{CIPHERS, KEY_SOURCES};
use crate::value::Config;
use crate::{
    CommitWriter, DirEntry, FileType, FsDir, FsError, FsRead, FsWrite, Metadata, ReadDirIter,
    SharedFs,
};

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;
const OVERHEAD: u64 = (NONCE_SIZE + TAG_SIZE) as u64;

/// Builds an [`EncryptFs`] over an underlying filesystem.
#[derive(Clone)]
pub struct EncryptLayer {
    cipher: Aes256Gcm,
}

impl fmt::Debug for EncryptLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptLayer").finish_non_exhaustive()
    }
}

impl EncryptLayer {
    /// AES-256-GCM keyed by the SHA-256 digest of `key_material`.
    pub fn new(key_material: &[u8]) -> Self {
        let key = Sha256::digest(key_material.trim_ascii_end());
        Self {
            cipher: Aes256Gcm::new(&key),
        }
    }

    /// Read `algorithm`, `keySource` and `keyEnv` or `keyFile`, then load the
    /// key material.
    pub fn from_config(config: &Config) -> Result<Self, NodeError> {
        match opt_str(config, "algorithm")? {
            Some("AES-256-GCM") => {}
            Some("ChaCha20-Poly1305") => {
                return Err(NodeError::Unsupported(
                    "ChaCha20-Poly1305 is not available in this build".into(),
                ));
            }
            Some(other) => {
                return Err(NodeError::config(
                    "algorithm",
                    format!("{other} is not one of: {}", CIPHERS.join(", ")),
                ));
            }
            None => return Err(NodeError::config("algorithm", "is required")),
        }

        let material = match opt_str(config, "keySource")? {
            Some("env") => {
                let var = opt_str(config, "keyEnv")?
                    .ok_or_else(|| NodeError::config("keyEnv", "is required"))?;
                std::env::var(var)
                    .map_err(|_| {
                        NodeError::config("keyEnv", format!("environment variable {var} is not set"))
                    })?
                    .into_bytes()
            }
            Some("file") => {
                let file = opt_str(config, "keyFile")?
                    .ok_or_else(|| NodeError::config("keyFile", "is required"))?;
                std::fs::read(file)
                    .map_err(|e| NodeError::config("keyFile", format!("cannot read {file}: {e}")))?
            }
            Some(other) => {
                return Err(NodeError::config(
                    "keySource",
                    format!("{other} is not one of: {}", KEY_SOURCES.join(", ")),
                ));
            }
            None => return Err(NodeError::config("keySource", "is required")),
        };

        if material.trim_ascii_end().is_empty() {
            return Err(NodeError::config("keySource", "key material is empty"));
        }
        Ok(Self::new(&material))
    }
}

impl Layer<SharedFs> for EncryptLayer {
    type Backend = EncryptFs;

    fn layer(self, inner: SharedFs) -> EncryptFs {
        EncryptFs {
            inner,
            cipher: self.cipher,
        }
    }
}

pub(crate) fn schema() -> NodeSchema {
    NodeSchema::new("encryptfs", "Encrypts file contents with an authenticated cipher")
        .field(
            SchemaField::select("algorithm", CIPHERS)
                .required()
                .describe("Cipher"),
        )
        .field(
            SchemaField::select("keySource", KEY_SOURCES)
                .required()
                .describe("Where the key material comes from"),
        )
        .field(
            SchemaField::new("keyEnv", FieldKind::String)
                .describe("Environment variable holding the key (keySource=env)"),
        )
        .field(
            SchemaField::new("keyFile", FieldKind::String)
                .describe("File holding the key (keySource=file)"),
        )
}

/// Filesystem wrapper encrypting file contents.
///
/// Directory structure and file names pass through unchanged. Reported file
/// sizes are plaintext sizes.
#[derive(Clone)]
pub struct EncryptFs {
    inner: SharedFs,
    cipher: Aes256Gcm,
}

impl fmt::Debug for EncryptFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptFs").finish_non_exhaustive()
    }
}

impl EncryptFs {
    fn seal(&self, path: &Path, plaintext: &[u8]) -> Result<Vec<u8>, FsError> {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| FsError::InvalidData {
                path: path.to_path_buf(),
                details: format!("encryption failed: {e}"),
            })?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn open(&self, path: &Path, stored: &[u8]) -> Result<Vec<u8>, FsError> {
        if stored.len() < NONCE_SIZE + TAG_SIZE {
            return Err(FsError::IntegrityError {
                path: path.to_path_buf(),
            });
        }
        let (nonce, sealed) = stored.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| FsError::IntegrityError {
                path: path.to_path_buf(),
            })
    }
}

fn plaintext_size(stored: u64) -> u64 {
    stored.saturating_sub(OVERHEAD)
}

impl FsRead for EncryptFs {
    fn read(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        let stored = self.inner.read(path)?;
        self.open(path, &stored)
    }

    fn metadata(&self, path: &Path) -> Result<Metadata, FsError> {
        let mut meta = self.inner.metadata(path)?;
        if meta.is_file() {
            meta.size = plaintext_size(meta.size);
        }
        Ok(meta)
    }
}

impl FsWrite for EncryptFs {
    fn write(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        let sealed = self.seal(path, data)?;
        self.inner.write(path, &sealed)
    }

    fn remove_file(&self, path: &Path) -> Result<(), FsError> {
        self.inner.remove_file(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        self.inner.rename(from, to)
    }

    fn open_write(&self, path: &Path) -> Result<Box<dyn Write + Send>, FsError> {
        check_creatable(&self.inner, path)?;
        let this = self.clone();
        Ok(Box::new(CommitWriter::new(path, move |p: &Path, data: &[u8]| {
            this.write(p, data)
        })))
    }
}

impl FsDir for EncryptFs {
    fn read_dir(&self, path: &Path) -> Result<ReadDirIter, FsError> {
        let entries = self.inner.read_dir(path)?.map(|entry| {
            entry.map(|e| match e.file_type {
                FileType::File => DirEntry {
                    size: plaintext_size(e.size),
                    ..e
                },
                FileType::Directory => e,
            })
        });
        Ok(ReadDirIter::new(entries))
    }

    fn create_dir(&self, path: &Path) -> Result<(), FsError> {
        self.inner.create_dir(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        self.inner.create_dir_all(path)
    }

    fn remove_dir(&self, path: &Path) -> Result<(), FsError> {
        self.inner.remove_dir(path)
    }
}
