//! Hashing and atomic-file helpers shared by every stage.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::Result;

pub fn sha256_bytes(bytes: &[u8]) -> String {
  hex::encode(Sha256::digest(bytes))
}

pub fn sha256_file(path: &Path) -> Result<String> {
  let mut file = File::open(path)?;
  let mut hasher = Sha256::new();
  let mut buf = [0u8; 64 * 1024];
  loop {
    let n = file.read(&mut buf)?;
    if n == 0 {
      break;
    }
    hasher.update(&buf[..n]);
  }
  Ok(hex::encode(hasher.finalize()))
}

/// Replace `dest` with `src` in one rename. Both must live on the same
/// filesystem; callers create temp files next to their final path.
pub fn atomic_replace(src: &Path, dest: &Path) -> Result<()> {
  std::fs::rename(src, dest)?;
  Ok(())
}

/// Serialize `value` as JSON and move it into place atomically, so a reader
/// never observes a half-written artifact.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
  let tmp = path.with_extension("tmp.json");
  {
    let mut file = File::create(&tmp)?;
    serde_json::to_writer_pretty(&mut file, value)?;
    file.write_all(b"\n")?;
    file.sync_all()?;
  }
  atomic_replace(&tmp, path)
}

/// Current UTC time as RFC 3339.
pub fn utc_now_iso() -> String {
  chrono::Utc::now().to_rfc3339()
}
