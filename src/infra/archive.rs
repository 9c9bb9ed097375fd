//! Source archive handling
//!
//! Gzip, xz and plain tarballs are unpacked in-process; bzip2 and zstd
//! tarballs are handed to the system `tar` through the process boundary.

use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use xz2::read::XzDecoder;

use crate::config::defaults::DIAGNOSTIC_TAIL_LINES;
use crate::error::StageError;
use crate::infra::process::{tail_lines, CommandExecutor, StepCommand};

/// Recognized archive formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar,
    TarGz,
    TarXz,
    TarBz2,
    TarZst,
}

impl ArchiveFormat {
    /// Detect the format from the file name
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Self::TarXz)
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") || name.ends_with(".spkg")
        {
            Some(Self::TarBz2)
        } else if name.ends_with(".tar.zst") {
            Some(Self::TarZst)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }

    /// Whether extraction happens without an external tool
    pub fn is_native(self) -> bool {
        matches!(self, Self::Tar | Self::TarGz | Self::TarXz)
    }
}

fn open(archive: &Path) -> Result<File, StageError> {
    if !archive.is_file() {
        return Err(StageError::ArchiveNotFound {
            path: archive.to_path_buf(),
        });
    }
    File::open(archive).map_err(|e| StageError::UnreadableArchive {
        path: archive.to_path_buf(),
        error: e.to_string(),
    })
}

/// SHA256 of a file as lowercase hex
pub fn sha256_file(path: &Path) -> Result<String, StageError> {
    let mut reader = BufReader::new(open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| StageError::UnreadableArchive {
                path: path.to_path_buf(),
                error: e.to_string(),
            })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Verify an archive against its expected SHA256
pub fn verify_sha256(path: &Path, expected: &str) -> Result<(), StageError> {
    let actual = sha256_file(path)?;
    if actual == expected.to_lowercase() {
        Ok(())
    } else {
        Err(StageError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        })
    }
}

/// Extract `archive` into the existing directory `dest`
pub fn extract(
    archive: &Path,
    dest: &Path,
    executor: &dyn CommandExecutor,
) -> Result<(), StageError> {
    let format = ArchiveFormat::detect(archive).ok_or_else(|| StageError::UnsupportedFormat {
        path: archive.to_path_buf(),
    })?;
    let file = open(archive)?;

    let extraction_error = |error: String| StageError::Extraction {
        path: archive.to_path_buf(),
        error,
    };

    tracing::debug!("Extracting {} ({format:?})", archive.display());

    match format {
        ArchiveFormat::Tar => tar::Archive::new(BufReader::new(file))
            .unpack(dest)
            .map_err(|e| extraction_error(e.to_string())),
        ArchiveFormat::TarGz => tar::Archive::new(GzDecoder::new(BufReader::new(file)))
            .unpack(dest)
            .map_err(|e| extraction_error(e.to_string())),
        ArchiveFormat::TarXz => tar::Archive::new(XzDecoder::new(BufReader::new(file)))
            .unpack(dest)
            .map_err(|e| extraction_error(e.to_string())),
        ArchiveFormat::TarBz2 | ArchiveFormat::TarZst => {
            drop(file);
            let mode = if format == ArchiveFormat::TarBz2 {
                "-xjf"
            } else {
                "--zstd -xf"
            };
            let mut args: Vec<String> = mode.split(' ').map(String::from).collect();
            args.push(archive.display().to_string());
            args.push("-C".to_string());
            args.push(dest.display().to_string());

            let output = executor
                .execute(&StepCommand::new("tar", dest).with_args(args))
                .map_err(|e| extraction_error(format!("failed to run tar: {e}")))?;
            if output.success() {
                Ok(())
            } else {
                Err(extraction_error(tail_lines(
                    &output.output,
                    DIAGNOSTIC_TAIL_LINES,
                )))
            }
        }
    }
}
