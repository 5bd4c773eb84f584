use std::fs;
use std::path::Path;

use unrar::error::{Code, UnrarError};
use unrar::Archive;

use super::{same_member, ArchiveFormat, FormatError};

/// RAR 4 and 5 archives, read through the bundled unrar library.
///
/// Headers after the member are walked to the end so a damaged tail still
/// rejects the candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct RarFormat;

#[allow(unreachable_patterns)]
fn classify(err: UnrarError) -> FormatError {
    match err.code {
        Code::BadPassword | Code::MissingPassword => FormatError::WrongPassword,
        Code::BadArchive | Code::UnknownFormat | Code::EndArchive | Code::EOpen | Code::ERead => {
            FormatError::InvalidContainer(err.to_string())
        }
        Code::BadData => FormatError::MemberUnreadable(err.to_string()),
        _ => FormatError::Unclassified(err.to_string()),
    }
}

impl ArchiveFormat for RarFormat {
    fn name(&self) -> &'static str {
        "rar"
    }

    fn supports_passwords(&self) -> bool {
        true
    }

    fn list_members(&self, path: &Path) -> Result<Vec<String>, FormatError> {
        // unrar reports a missing file as a bad archive.
        fs::metadata(path)?;
        let mut names = Vec::new();
        for entry in Archive::new(path).open_for_listing().map_err(classify)? {
            let entry = entry.map_err(classify)?;
            if entry.is_file() {
                names.push(entry.filename.to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    fn read_member(
        &self,
        path: &Path,
        member: &str,
        password: Option<&str>,
    ) -> Result<Vec<u8>, FormatError> {
        fs::metadata(path)?;
        let archive = match password {
            Some(password) => Archive::with_password(path, password),
            None => Archive::new(path),
        };

        let mut cursor = archive.open_for_processing().map_err(classify)?;
        let mut content = None;
        while let Some(header) = cursor.read_header().map_err(classify)? {
            let wanted = content.is_none()
                && header.entry().is_file()
                && same_member(&header.entry().filename, member);
            cursor = if wanted {
                let (data, rest) = header.read().map_err(classify)?;
                content = Some(data);
                rest
            } else {
                header.skip().map_err(classify)?
            };
        }
        content.ok_or_else(|| FormatError::MemberUnreadable(format!("{} not in archive", member)))
    }
}
