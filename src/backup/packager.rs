use crate::error::BackupError;
use crate::naming::packaged_path;
use crate::prelude::*;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use zip::write::SimpleFileOptions;
use zip::{AesMode, CompressionMethod, ZipWriter};

/// Entries at or above this size need zip64 headers.
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// Wraps `source` in a Deflate-compressed, AES-256 encrypted zip next to it and returns the
/// archive path (`<source>.compress`). The archive holds a single entry named after the
/// source file. A failed run leaves no archive behind.
pub fn protect_compress(source: &Path, passphrase: &str) -> Result<PathBuf> {
    let destination = packaged_path(source);

    let input = File::open(source).map_err(|e| {
        error!("Failed to open {:?} for packaging: {}", source, e);
        BackupError::Packaging(format!("failed to open {:?}: {}", source, e))
    })?;
    let output = File::create(&destination).map_err(|e| {
        error!("Failed to create {:?}: {}", destination, e);
        BackupError::Packaging(format!("failed to create {:?}: {}", destination, e))
    })?;

    match write_archive(source, input, output, passphrase) {
        Ok(()) => {
            info!("Packaged {:?} into {:?}", source, destination);
            Ok(destination)
        }
        Err(e) => {
            error!("Packaging {:?} failed: {}", source, e);
            if let Err(cleanup) = fs::remove_file(&destination) {
                error!("Failed to remove partial archive {:?}: {}", destination, cleanup);
            }
            Err(match e {
                Error::Backup(inner) => inner.into(),
                other => BackupError::Packaging(other.to_string()).into(),
            })
        }
    }
}

fn write_archive(source: &Path, input: File, output: File, passphrase: &str) -> Result<()> {
    let entry_name = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| BackupError::Packaging(format!("{:?} has no file name", source)))?;
    let large_file = input.metadata()?.len() >= ZIP64_THRESHOLD;

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(large_file)
        .with_aes_encryption(AesMode::Aes256, passphrase);

    let mut zip = ZipWriter::new(output);
    zip.start_file(entry_name, options)?;
    io::copy(&mut BufReader::new(input), &mut zip)?;
    zip.finish()?.sync_all()?;
    Ok(())
}
