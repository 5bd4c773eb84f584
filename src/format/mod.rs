//! Archive container formats the oracle can open.
//!
//! Each format only has to tell three failures apart: the bytes do not form
//! a container, the member cannot be read, or the password is wrong.
//! Anything else is reported as unclassified and stops the run.

#[cfg(feature = "rar")]
mod rar;
mod tar;
mod zip;

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::error::{RecoveryError, Result};

#[cfg(feature = "rar")]
pub use self::rar::RarFormat;
pub use self::tar::TarFormat;
pub use self::zip::ZipFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
    Xz,
    Zstd,
    Lz4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArchiveType {
    Zip,
    Tar(Compression),
    SevenZip,
    Rar,
    Unknown,
}

impl fmt::Display for ArchiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveType::Zip => f.write_str("zip"),
            ArchiveType::Tar(Compression::None) => f.write_str("tar"),
            ArchiveType::Tar(Compression::Gzip) => f.write_str("tar.gz"),
            ArchiveType::Tar(Compression::Bzip2) => f.write_str("tar.bz2"),
            ArchiveType::Tar(Compression::Xz) => f.write_str("tar.xz"),
            ArchiveType::Tar(Compression::Zstd) => f.write_str("tar.zst"),
            ArchiveType::Tar(Compression::Lz4) => f.write_str("tar.lz4"),
            ArchiveType::SevenZip => f.write_str("7z"),
            ArchiveType::Rar => f.write_str("rar"),
            ArchiveType::Unknown => f.write_str("unknown"),
        }
    }
}

impl FromStr for ArchiveType {
    type Err = RecoveryError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zip" => Ok(ArchiveType::Zip),
            "tar" => Ok(ArchiveType::Tar(Compression::None)),
            "tar.gz" | "tgz" => Ok(ArchiveType::Tar(Compression::Gzip)),
            "tar.bz2" | "tbz2" | "tbz" => Ok(ArchiveType::Tar(Compression::Bzip2)),
            "tar.xz" | "txz" => Ok(ArchiveType::Tar(Compression::Xz)),
            "tar.zst" | "tzst" => Ok(ArchiveType::Tar(Compression::Zstd)),
            "tar.lz4" => Ok(ArchiveType::Tar(Compression::Lz4)),
            "rar" => Ok(ArchiveType::Rar),
            other => Err(RecoveryError::UnsupportedArchive(other.to_string())),
        }
    }
}

/// How a single extraction attempt failed.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("not a valid container: {0}")]
    InvalidContainer(String),

    #[error("member unreadable: {0}")]
    MemberUnreadable(String),

    #[error("wrong or missing password")]
    WrongPassword,

    #[error("{0}")]
    Unclassified(String),

    #[error("cannot read working copy: {0}")]
    Io(#[from] io::Error),
}

/// Archive Format Collaborator.
pub trait ArchiveFormat: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports_passwords(&self) -> bool;

    fn list_members(&self, path: &Path) -> std::result::Result<Vec<String>, FormatError>;

    fn read_member(
        &self,
        path: &Path,
        member: &str,
        password: Option<&str>,
    ) -> std::result::Result<Vec<u8>, FormatError>;

    /// Whether `member` is listed, ignoring a leading `./`.
    fn contains_member(&self, path: &Path, member: &str) -> std::result::Result<bool, FormatError> {
        Ok(self
            .list_members(path)?
            .iter()
            .any(|name| same_member(Path::new(name), member)))
    }
}

/// Compare an entry path with a requested member name, ignoring a leading `./`.
pub(crate) fn same_member(entry: &Path, member: &str) -> bool {
    let entry = entry.strip_prefix("./").unwrap_or(entry);
    let member = Path::new(member);
    entry == member.strip_prefix("./").unwrap_or(member)
}

pub fn format_for(archive_type: ArchiveType) -> Result<Box<dyn ArchiveFormat>> {
    match archive_type {
        ArchiveType::Zip => Ok(Box::new(ZipFormat)),
        ArchiveType::Tar(compression) => {
            if !compression_available(compression) {
                return Err(RecoveryError::UnsupportedArchive(format!(
                    "{} (built without the extended-formats feature)",
                    archive_type
                )));
            }
            Ok(Box::new(TarFormat::new(compression)))
        }
        #[cfg(feature = "rar")]
        ArchiveType::Rar => Ok(Box::new(RarFormat)),
        other => Err(RecoveryError::UnsupportedArchive(other.to_string())),
    }
}

fn compression_available(compression: Compression) -> bool {
    match compression {
        Compression::None | Compression::Gzip | Compression::Bzip2 => true,
        Compression::Xz | Compression::Zstd | Compression::Lz4 => {
            cfg!(feature = "extended-formats")
        }
    }
}

/// Guess the container type from magic bytes, falling back to the file name.
pub fn detect_archive_type(path: &Path) -> io::Result<ArchiveType> {
    let mut buffer = Vec::with_capacity(512);
    File::open(path)?.take(512).read_to_end(&mut buffer)?;

    if buffer.starts_with(b"PK\x03\x04") || buffer.starts_with(b"PK\x05\x06") {
        return Ok(ArchiveType::Zip);
    }
    if buffer.starts_with(b"\x1f\x8b\x08") {
        return Ok(ArchiveType::Tar(Compression::Gzip));
    }
    if buffer.starts_with(b"BZh") {
        return Ok(ArchiveType::Tar(Compression::Bzip2));
    }
    if buffer.starts_with(b"\xfd7zXZ\x00") {
        return Ok(ArchiveType::Tar(Compression::Xz));
    }
    if buffer.starts_with(b"\x28\xb5\x2f\xfd") {
        return Ok(ArchiveType::Tar(Compression::Zstd));
    }
    if buffer.starts_with(b"\x04\x22\x4d\x18") {
        return Ok(ArchiveType::Tar(Compression::Lz4));
    }
    if buffer.starts_with(b"7z\xbc\xaf\x27\x1c") {
        return Ok(ArchiveType::SevenZip);
    }
    if buffer.starts_with(b"Rar!") {
        return Ok(ArchiveType::Rar);
    }
    if buffer.len() >= 262 && &buffer[257..262] == b"ustar" {
        return Ok(ArchiveType::Tar(Compression::None));
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let by_suffix = [
        (".tar.gz", ArchiveType::Tar(Compression::Gzip)),
        (".tgz", ArchiveType::Tar(Compression::Gzip)),
        (".tar.bz2", ArchiveType::Tar(Compression::Bzip2)),
        (".tar.xz", ArchiveType::Tar(Compression::Xz)),
        (".tar.zst", ArchiveType::Tar(Compression::Zstd)),
        (".tar.lz4", ArchiveType::Tar(Compression::Lz4)),
        (".tar", ArchiveType::Tar(Compression::None)),
        (".zip", ArchiveType::Zip),
        (".7z", ArchiveType::SevenZip),
        (".rar", ArchiveType::Rar),
    ];
    Ok(by_suffix
        .iter()
        .find(|(suffix, _)| name.ends_with(suffix))
        .map(|(_, kind)| *kind)
        .unwrap_or(ArchiveType::Unknown))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_archive_detection() {
        let dir = tempdir().unwrap();
        let zip = dir.path().join("test.bin");
        fs::write(&zip, b"PK\x03\x04\x14\x00\x00\x00\x08\x00").unwrap();
        assert_eq!(detect_archive_type(&zip).unwrap(), ArchiveType::Zip);

        let gz = dir.path().join("data");
        fs::write(&gz, b"\x1f\x8b\x08\x00rest").unwrap();
        assert_eq!(
            detect_archive_type(&gz).unwrap(),
            ArchiveType::Tar(Compression::Gzip)
        );
    }

    #[test]
    fn test_ustar_detection() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain");
        let mut header = vec![0u8; 512];
        header[257..262].copy_from_slice(b"ustar");
        fs::write(&path, header).unwrap();
        assert_eq!(
            detect_archive_type(&path).unwrap(),
            ArchiveType::Tar(Compression::None)
        );
    }

    #[test]
    fn test_extension_fallback() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Backup.TAR.XZ");
        fs::write(&path, b"short").unwrap();
        assert_eq!(
            detect_archive_type(&path).unwrap(),
            ArchiveType::Tar(Compression::Xz)
        );

        let unknown = dir.path().join("notes.txt");
        fs::write(&unknown, b"some data").unwrap();
        assert_eq!(detect_archive_type(&unknown).unwrap(), ArchiveType::Unknown);
    }

    #[test]
    fn test_unsupported_types_are_rejected() {
        assert!(matches!(
            format_for(ArchiveType::SevenZip),
            Err(RecoveryError::UnsupportedArchive(_))
        ));
        assert!(matches!(
            format_for(ArchiveType::Unknown),
            Err(RecoveryError::UnsupportedArchive(_))
        ));
        assert!(format_for(ArchiveType::Zip).unwrap().supports_passwords());
        assert!(!format_for(ArchiveType::Tar(Compression::Gzip))
            .unwrap()
            .supports_passwords());
    }

    #[test]
    fn test_parse_type_override() {
        assert_eq!("TGZ".parse::<ArchiveType>().unwrap(), ArchiveType::Tar(Compression::Gzip));
        assert_eq!("RAR".parse::<ArchiveType>().unwrap(), ArchiveType::Rar);
        assert!("cab".parse::<ArchiveType>().is_err());
    }

    #[cfg(feature = "rar")]
    #[test]
    fn test_rar_is_supported() {
        let format = format_for(ArchiveType::Rar).unwrap();
        assert_eq!(format.name(), "rar");
        assert!(format.supports_passwords());
    }

    #[test]
    fn test_same_member_ignores_dot_slash() {
        assert!(same_member(Path::new("./docs/a.txt"), "docs/a.txt"));
        assert!(same_member(Path::new("docs/a.txt"), "./docs/a.txt"));
        assert!(!same_member(Path::new("docs/a.txt"), "a.txt"));
    }
}
