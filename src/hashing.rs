//! Content digests used to recognise the original member.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

use crate::error::RecoveryError;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Crc32,
}

impl HashAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha224 => "sha224",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Crc32 => "crc32",
        }
    }

    /// Length of the hex digest.
    pub fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Md5 => 32,
            HashAlgorithm::Sha1 => 40,
            HashAlgorithm::Sha224 => 56,
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha384 => 96,
            HashAlgorithm::Sha512 => 128,
            HashAlgorithm::Crc32 => 8,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = RecoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "md5" => Ok(HashAlgorithm::Md5),
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha224" => Ok(HashAlgorithm::Sha224),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha384" => Ok(HashAlgorithm::Sha384),
            "sha512" => Ok(HashAlgorithm::Sha512),
            "crc32" => Ok(HashAlgorithm::Crc32),
            _ => Err(RecoveryError::UnsupportedHash(s.to_string())),
        }
    }
}

/// Stream `reader` through `algorithm` and return the lowercase hex digest.
pub fn digest<R: Read + ?Sized>(reader: &mut R, algorithm: HashAlgorithm) -> io::Result<String> {
    match algorithm {
        HashAlgorithm::Md5 => {
            let mut context = md5::Context::new();
            for_each_chunk(reader, |chunk| context.consume(chunk))?;
            Ok(format!("{:x}", context.compute()))
        }
        HashAlgorithm::Sha1 => rust_crypto_digest::<Sha1, R>(reader),
        HashAlgorithm::Sha224 => rust_crypto_digest::<Sha224, R>(reader),
        HashAlgorithm::Sha256 => rust_crypto_digest::<Sha256, R>(reader),
        HashAlgorithm::Sha384 => rust_crypto_digest::<Sha384, R>(reader),
        HashAlgorithm::Sha512 => rust_crypto_digest::<Sha512, R>(reader),
        HashAlgorithm::Crc32 => {
            let mut hasher = crc32fast::Hasher::new();
            for_each_chunk(reader, |chunk| hasher.update(chunk))?;
            Ok(format!("{:08x}", hasher.finalize()))
        }
    }
}

pub fn digest_bytes(data: &[u8], algorithm: HashAlgorithm) -> String {
    let mut reader = data;
    // Reading from a slice cannot fail.
    digest(&mut reader, algorithm).unwrap_or_default()
}

pub fn digest_file(path: &Path, algorithm: HashAlgorithm) -> io::Result<String> {
    let mut file = File::open(path)?;
    digest(&mut file, algorithm)
}

/// Lowercase, trimmed form used for comparisons.
pub fn normalize_hex(hash: &str) -> String {
    hash.trim().to_ascii_lowercase()
}

fn rust_crypto_digest<D: Digest, R: Read + ?Sized>(reader: &mut R) -> io::Result<String> {
    let mut hasher = D::new();
    for_each_chunk(reader, |chunk| hasher.update(chunk))?;
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

fn for_each_chunk<R: Read + ?Sized>(reader: &mut R, mut f: impl FnMut(&[u8])) -> io::Result<()> {
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        f(&buffer[..n]);
    }
}
