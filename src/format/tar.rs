use std::fs;
use std::io::{self, Read};
use std::path::Path;

use super::{same_member, ArchiveFormat, Compression, FormatError};

/// Tarballs, optionally wrapped in a compression stream.
///
/// For compressed tarballs the stream is read to its end after the member is
/// found, so a damaged compression trailer still rejects the candidate.
#[derive(Debug, Clone, Copy)]
pub struct TarFormat {
    compression: Compression,
}

impl TarFormat {
    pub fn new(compression: Compression) -> Self {
        Self { compression }
    }

    fn decoder<'a>(&self, data: &'a [u8]) -> Result<Box<dyn Read + 'a>, FormatError> {
        Ok(match self.compression {
            Compression::None => Box::new(data),
            Compression::Gzip => Box::new(flate2::read::GzDecoder::new(data)),
            Compression::Bzip2 => Box::new(bzip2::read::BzDecoder::new(data)),
            #[cfg(feature = "extended-formats")]
            Compression::Xz => Box::new(xz2::read::XzDecoder::new(data)),
            #[cfg(feature = "extended-formats")]
            Compression::Zstd => Box::new(zstd::stream::read::Decoder::new(data).map_err(invalid)?),
            #[cfg(feature = "extended-formats")]
            Compression::Lz4 => Box::new(lz4_flex::frame::FrameDecoder::new(data)),
            #[cfg(not(feature = "extended-formats"))]
            other => {
                return Err(FormatError::Unclassified(format!(
                    "{:?} support not compiled in",
                    other
                )))
            }
        })
    }
}

fn invalid(e: io::Error) -> FormatError {
    FormatError::InvalidContainer(e.to_string())
}

impl ArchiveFormat for TarFormat {
    fn name(&self) -> &'static str {
        "tar"
    }

    fn supports_passwords(&self) -> bool {
        false
    }

    fn list_members(&self, path: &Path) -> Result<Vec<String>, FormatError> {
        let data = fs::read(path)?;
        let mut archive = ::tar::Archive::new(self.decoder(&data)?);
        let mut names = Vec::new();
        for entry in archive.entries().map_err(invalid)? {
            let entry = entry.map_err(invalid)?;
            if entry.header().entry_type().is_file() {
                names.push(entry.path().map_err(invalid)?.to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    fn read_member(
        &self,
        path: &Path,
        member: &str,
        _password: Option<&str>,
    ) -> Result<Vec<u8>, FormatError> {
        let data = fs::read(path)?;
        let mut archive = ::tar::Archive::new(self.decoder(&data)?);

        let mut content = None;
        for entry in archive.entries().map_err(invalid)? {
            let mut entry = entry.map_err(invalid)?;
            let found = entry
                .path()
                .map(|p| same_member(&p, member))
                .map_err(invalid)?;
            if found {
                let mut buffer = Vec::new();
                entry
                    .read_to_end(&mut buffer)
                    .map_err(|e| FormatError::MemberUnreadable(e.to_string()))?;
                content = Some(buffer);
                break;
            }
        }
        let content = content
            .ok_or_else(|| FormatError::MemberUnreadable(format!("{} not in archive", member)))?;

        if self.compression != Compression::None {
            let mut rest = archive.into_inner();
            io::copy(&mut rest, &mut io::sink()).map_err(invalid)?;
        }
        Ok(content)
    }
}
