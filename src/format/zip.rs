use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use ::zip::result::{InvalidPassword, ZipError};
use ::zip::ZipArchive;

use super::{ArchiveFormat, FormatError};

/// Zip containers, including ZipCrypto and AES protected members.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipFormat;

impl ZipFormat {
    fn open(path: &Path) -> Result<ZipArchive<Cursor<Vec<u8>>>, FormatError> {
        // Read up front so I/O errors from the parser can only mean bad data.
        let data = fs::read(path)?;
        ZipArchive::new(Cursor::new(data)).map_err(classify)
    }
}

#[allow(unreachable_patterns)]
fn classify(err: ZipError) -> FormatError {
    match err {
        ZipError::InvalidArchive(msg) => FormatError::InvalidContainer(msg.to_string()),
        ZipError::Io(e) => FormatError::InvalidContainer(e.to_string()),
        ZipError::FileNotFound => {
            FormatError::MemberUnreadable("not listed in the central directory".to_string())
        }
        ZipError::UnsupportedArchive(msg) if msg == ZipError::PASSWORD_REQUIRED => {
            FormatError::WrongPassword
        }
        ZipError::UnsupportedArchive(msg) => FormatError::Unclassified(msg.to_string()),
        other => FormatError::Unclassified(other.to_string()),
    }
}

impl ArchiveFormat for ZipFormat {
    fn name(&self) -> &'static str {
        "zip"
    }

    fn supports_passwords(&self) -> bool {
        true
    }

    fn list_members(&self, path: &Path) -> Result<Vec<String>, FormatError> {
        let archive = Self::open(path)?;
        Ok(archive.file_names().map(String::from).collect())
    }

    fn read_member(
        &self,
        path: &Path,
        member: &str,
        password: Option<&str>,
    ) -> Result<Vec<u8>, FormatError> {
        let mut archive = Self::open(path)?;
        let encrypted = match archive.by_name(member) {
            Ok(_) => false,
            Err(ZipError::UnsupportedArchive(msg)) if msg == ZipError::PASSWORD_REQUIRED => true,
            Err(e) => return Err(classify(e)),
        };

        let mut file = match (encrypted, password) {
            (false, _) => archive.by_name(member).map_err(classify)?,
            (true, None) => return Err(FormatError::WrongPassword),
            (true, Some(password)) => match archive
                .by_name_decrypt(member, password.as_bytes())
                .map_err(classify)?
            {
                Ok(file) => file,
                Err(InvalidPassword) => return Err(FormatError::WrongPassword),
            },
        };

        let mut content = Vec::new();
        file.read_to_end(&mut content).map_err(|e| {
            // ZipCrypto checks one byte of the key, so some wrong passwords
            // get through and only fail at the CRC.
            if encrypted {
                FormatError::WrongPassword
            } else {
                FormatError::MemberUnreadable(e.to_string())
            }
        })?;
        Ok(content)
    }
}
