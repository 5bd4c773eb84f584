use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::write::GzEncoder;
use tempfile::{tempdir, TempDir};
use zip::write::FileOptions;
use zip::ZipWriter;

use recover_truncated::hashing::digest_bytes;
use recover_truncated::working_copy::truncate_copy;
use recover_truncated::{
    ArchiveFormat, AttemptOutcome, Candidate, Coordinator, FormatError, HashAlgorithm,
    NoPasswordRetry, RecoveryError, RetryPolicy, SearchConfig,
};

const LOREM: &[u8] = b"Lorem ipsum dolor sit amet, consectetur adipiscing elit.\n";
const PAYLOAD: &[u8] = b"payload";

fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        backoff: Duration::from_millis(1),
    }
}

fn test_config(archive: &Path, member: &str, content: &[u8]) -> SearchConfig {
    SearchConfig::new(archive, member, &digest_bytes(content, HashAlgorithm::Md5))
        .with_queue_timeout(Duration::from_millis(100))
        .with_retry(quick_retry())
}

/// Accepts the file only when it holds exactly `expected`, optionally behind
/// a password.
struct ExactFileFormat {
    expected: Vec<u8>,
    password: Option<&'static str>,
}

impl ExactFileFormat {
    fn new(expected: Vec<u8>) -> Box<Self> {
        Box::new(Self {
            expected,
            password: None,
        })
    }

    fn locked(expected: Vec<u8>, password: &'static str) -> Box<Self> {
        Box::new(Self {
            expected,
            password: Some(password),
        })
    }
}

impl ArchiveFormat for ExactFileFormat {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn supports_passwords(&self) -> bool {
        self.password.is_some()
    }

    fn list_members(&self, _path: &Path) -> Result<Vec<String>, FormatError> {
        Ok(vec!["member".to_string()])
    }

    fn read_member(
        &self,
        path: &Path,
        member: &str,
        password: Option<&str>,
    ) -> Result<Vec<u8>, FormatError> {
        if self.password.is_some() && password != self.password {
            return Err(FormatError::WrongPassword);
        }
        if member != "member" {
            return Err(FormatError::MemberUnreadable(member.to_string()));
        }
        if fs::read(path)? == self.expected {
            Ok(PAYLOAD.to_vec())
        } else {
            Err(FormatError::InvalidContainer("unexpected tail".to_string()))
        }
    }
}

/// Writes `HEAD` to a temp file and returns it with the full expected bytes.
fn truncated_blob(suffix: &[u8]) -> (TempDir, PathBuf, Vec<u8>) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("blob.bin");
    fs::write(&path, b"HEAD").unwrap();
    let mut expected = b"HEAD".to_vec();
    expected.extend_from_slice(suffix);
    (dir, path, expected)
}

fn lengths(attempts: &[recover_truncated::AttemptSummary]) -> Vec<(usize, AttemptOutcome)> {
    attempts.iter().map(|a| (a.length, a.outcome)).collect()
}

#[test]
fn recovers_two_missing_bytes_of_a_zip() {
    let dir = tempdir().unwrap();
    let intact = dir.path().join("intact.zip");
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file("LoremIpsum.txt", FileOptions::default()).unwrap();
    writer.write_all(LOREM).unwrap();
    fs::write(&intact, writer.finish().unwrap().into_inner()).unwrap();

    let cut = dir.path().join("cut.zip");
    let removed = truncate_copy(&intact, &cut, 2, quick_retry()).unwrap();
    assert_eq!(removed, vec![0x00, 0x00]);

    let config = test_config(&cut, "LoremIpsum.txt", LOREM).with_workers(4, 4);
    let coordinator = Coordinator::new(config).unwrap();
    let recovery = coordinator.run(&mut NoPasswordRetry).unwrap();

    assert_eq!(recovery.suffix, Candidate::new(vec![0x00, 0x00]));
    assert_eq!(recovery.content, LOREM);
    assert_eq!(recovery.output, dir.path().join("cut.recovered.zip"));
    assert_eq!(fs::read(&recovery.output).unwrap(), fs::read(&intact).unwrap());
    assert_eq!(
        lengths(&recovery.attempts),
        vec![(1, AttemptOutcome::Exhausted), (2, AttemptOutcome::Found)]
    );
    // The input is never modified.
    assert_eq!(fs::metadata(&cut).unwrap().len(), fs::metadata(&intact).unwrap().len() - 2);
}

#[test]
fn recovers_last_byte_of_a_tar_gz() {
    let dir = tempdir().unwrap();
    let intact = dir.path().join("bundle.tar.gz");
    let encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let mut header = tar::Header::new_gnu();
    header.set_size(LOREM.len() as u64);
    header.set_mode(0o644);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();
    builder
        .append_data(&mut header, "LoremIpsum.txt", LOREM)
        .unwrap();
    fs::write(&intact, builder.into_inner().unwrap().finish().unwrap()).unwrap();

    let cut = dir.path().join("cut.tar.gz");
    let removed = truncate_copy(&intact, &cut, 1, quick_retry()).unwrap();

    let config = test_config(&cut, "LoremIpsum.txt", LOREM)
        .with_workers(2, 2)
        .with_output(Some(dir.path().join("fixed.tar.gz")));
    let recovery = Coordinator::new(config)
        .unwrap()
        .run(&mut NoPasswordRetry)
        .unwrap();

    assert_eq!(recovery.suffix.as_bytes(), removed.as_slice());
    assert_eq!(recovery.content, LOREM);
    assert_eq!(fs::read(dir.path().join("fixed.tar.gz")).unwrap(), fs::read(&intact).unwrap());
}

#[test]
fn finds_suffix_at_starting_length() {
    let (_dir, path, expected) = truncated_blob(&[0x0a, 0x3f]);
    let config = test_config(&path, "member", PAYLOAD)
        .with_start_length(2)
        .with_workers(4, 4);
    let coordinator = Coordinator::with_format(config, ExactFileFormat::new(expected)).unwrap();
    let recovery = coordinator.run(&mut NoPasswordRetry).unwrap();

    assert_eq!(recovery.suffix, Candidate::new(vec![0x0a, 0x3f]));
    assert_eq!(recovery.content, PAYLOAD);
    assert_eq!(lengths(&recovery.attempts), vec![(2, AttemptOutcome::Found)]);
    assert_eq!(fs::read(&path).unwrap(), b"HEAD");
}

#[test]
fn escalates_length_until_suffix_fits() {
    let (_dir, path, expected) = truncated_blob(&[0x00, 0x00, 0x05]);
    let config = test_config(&path, "member", PAYLOAD).with_workers(1, 4);
    let coordinator = Coordinator::with_format(config, ExactFileFormat::new(expected)).unwrap();
    let recovery = coordinator.run(&mut NoPasswordRetry).unwrap();

    assert_eq!(recovery.suffix.as_bytes(), &[0x00, 0x00, 0x05]);
    assert_eq!(
        lengths(&recovery.attempts),
        vec![
            (1, AttemptOutcome::Exhausted),
            (2, AttemptOutcome::Exhausted),
            (3, AttemptOutcome::Found),
        ]
    );
    // Exhausted attempts test their whole candidate space, narrower widths included.
    assert_eq!(recovery.attempts[0].candidates_tested, 256);
    assert_eq!(recovery.attempts[1].candidates_tested, 256 + 65_536);
}

#[test]
fn stops_at_max_length() {
    let (_dir, path, expected) = truncated_blob(&[0x0a, 0x3f]);
    let config = test_config(&path, "member", PAYLOAD)
        .with_max_length(Some(1))
        .with_workers(2, 2);
    let coordinator = Coordinator::with_format(config, ExactFileFormat::new(expected)).unwrap();

    let err = coordinator.run(&mut NoPasswordRetry).unwrap_err();
    assert!(matches!(err, RecoveryError::LengthExhausted { max: 1 }));
    assert!(!path.with_file_name("blob.recovered.bin").exists());
}

#[test]
fn retries_same_length_after_password_change() {
    let (_dir, path, expected) = truncated_blob(&[0x0a, 0x3f]);
    let config = test_config(&path, "member", PAYLOAD)
        .with_start_length(2)
        .with_password(Some("hunter2".to_string()));
    let coordinator =
        Coordinator::with_format(config, ExactFileFormat::locked(expected, "secret")).unwrap();

    let mut rejected = Vec::new();
    let mut ask = |previous: Option<&str>| -> Option<String> {
        rejected.push(previous.map(String::from));
        Some("secret".to_string())
    };
    let recovery = coordinator.run(&mut ask).unwrap();

    assert_eq!(rejected, vec![Some("hunter2".to_string())]);
    assert_eq!(recovery.password.as_deref(), Some("secret"));
    assert_eq!(recovery.suffix, Candidate::new(vec![0x0a, 0x3f]));
    assert_eq!(
        lengths(&recovery.attempts),
        vec![(2, AttemptOutcome::BadPassword), (2, AttemptOutcome::Found)]
    );
}

#[test]
fn reprompts_for_zipcrypto_password_at_same_length() {
    let dir = tempdir().unwrap();
    let intact = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/secret.zip");
    let cut = dir.path().join("secret.zip");
    let removed = truncate_copy(&intact, &cut, 2, quick_retry()).unwrap();
    assert_eq!(removed, vec![0x00, 0x00]);

    let config = test_config(&cut, "LoremIpsum.txt", LOREM)
        .with_workers(2, 2)
        .with_password(Some("nope".to_string()));
    let coordinator = Coordinator::new(config).unwrap();

    let mut asked = 0;
    let mut ask = |previous: Option<&str>| -> Option<String> {
        assert_eq!(previous, Some("nope"));
        asked += 1;
        Some("secret".to_string())
    };
    let recovery = coordinator.run(&mut ask).unwrap();

    assert_eq!(asked, 1);
    assert_eq!(recovery.password.as_deref(), Some("secret"));
    assert_eq!(recovery.suffix, Candidate::new(vec![0x00, 0x00]));
    assert_eq!(recovery.content, LOREM);
    assert_eq!(
        lengths(&recovery.attempts),
        vec![
            (1, AttemptOutcome::Exhausted),
            (2, AttemptOutcome::BadPassword),
            (2, AttemptOutcome::Found),
        ]
    );
    assert_eq!(fs::read(&recovery.output).unwrap(), fs::read(&intact).unwrap());
}

#[test]
fn gives_up_when_no_password_is_supplied() {
    let (_dir, path, expected) = truncated_blob(&[0x01]);
    let config = test_config(&path, "member", PAYLOAD).with_password(Some("wrong".to_string()));
    let coordinator =
        Coordinator::with_format(config, ExactFileFormat::locked(expected, "secret")).unwrap();

    let err = coordinator.run(&mut NoPasswordRetry).unwrap_err();
    assert!(matches!(err, RecoveryError::PasswordRejected));
}

#[test]
fn password_on_format_without_encryption_is_rejected() {
    let (_dir, path, expected) = truncated_blob(&[0x01]);
    let config = test_config(&path, "member", PAYLOAD).with_password(Some("secret".to_string()));
    let result = Coordinator::with_format(config, ExactFileFormat::new(expected));
    assert!(matches!(result, Err(RecoveryError::Config(_))));
}
