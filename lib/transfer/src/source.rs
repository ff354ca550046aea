//! `FileSource`: the shared upload-side abstraction over "tar stream or
//! filesystem" (§2, SPEC supplement to §4.9). The per-file sub-protocol
//! (§4.9.4) is written once against this trait; `TarSource` and
//! `FilesystemSource` are its two grounded implementations.

use std::{
  collections::HashMap,
  io::{self, Read},
  path::{Path, PathBuf},
};

use condor_client::job::JobId;

use crate::containment::split_job_prefixed;

/// One file or directory entry's metadata, yielded before its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
  pub rel_path: String,
  pub mode: u32,
  pub size: i64,
  pub is_dir: bool,
}

/// An ordered sequence of entries plus their payload bytes, read a
/// chunk at a time so the wire layer never has to hold a whole file in
/// memory (§4.9.1: chunked at ≤256 KiB).
pub trait FileSource: Send {
  /// Advances to the next entry, or `None` once the source is exhausted.
  fn next_entry(&mut self) -> io::Result<Option<EntryMeta>>;

  /// Reads up to `buf.len()` bytes of the current entry's payload.
  /// Returns `0` once the current entry is fully read.
  fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Reads a tar stream fully into memory up front (job sandboxes are
/// small relative to a schedd's memory budget) so each entry's payload
/// can be served without holding a borrow into the archive reader.
pub struct TarSource {
  entries: std::vec::IntoIter<(EntryMeta, Vec<u8>)>,
  current: Option<(Vec<u8>, usize)>,
}

impl TarSource {
  pub fn from_reader<R: Read>(reader: R) -> io::Result<TarSource> {
    let mut archive = tar::Archive::new(reader);
    let mut entries = Vec::new();
    for entry in archive.entries()? {
      let mut entry = entry?;
      let rel_path = entry.path()?.to_string_lossy().to_string();
      let is_dir = entry.header().entry_type().is_dir();
      let mode = entry.header().mode().unwrap_or(0o644);
      let mut data = Vec::new();
      if !is_dir {
        entry.read_to_end(&mut data)?;
      }
      let size = data.len() as i64;
      entries.push((EntryMeta { rel_path, mode, size, is_dir }, data));
    }
    Ok(TarSource { entries: entries.into_iter(), current: None })
  }
}

impl FileSource for TarSource {
  fn next_entry(&mut self) -> io::Result<Option<EntryMeta>> {
    match self.entries.next() {
      Some((meta, data)) => {
        self.current = Some((data, 0));
        Ok(Some(meta))
      }
      None => {
        self.current = None;
        Ok(None)
      }
    }
  }

  fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    let Some((data, pos)) = &mut self.current else {
      return Ok(0);
    };
    let remaining = &data[*pos..];
    let n = remaining.len().min(buf.len());
    buf[..n].copy_from_slice(&remaining[..n]);
    *pos += n;
    Ok(n)
  }
}

/// Splits one combined tar stream covering several jobs' input files
/// into a per-job `TarSource`, keyed by `JobId`, using the
/// `"<cluster>.<proc>/<relpath>"` entry-name convention (§4.9.5).
/// Entries that aren't prefixed with a valid job id are dropped.
pub fn split_multi_job_tar<R: Read>(reader: R) -> io::Result<HashMap<JobId, TarSource>> {
  let mut archive = tar::Archive::new(reader);
  let mut per_job: HashMap<JobId, Vec<(EntryMeta, Vec<u8>)>> = HashMap::new();
  for entry in archive.entries()? {
    let mut entry = entry?;
    let name = entry.path()?.to_string_lossy().to_string();
    let (prefix, rel_path) = split_job_prefixed(&name, true);
    let Some(prefix) = prefix else { continue };
    let Ok(job_id) = prefix.parse::<JobId>() else { continue };
    let is_dir = entry.header().entry_type().is_dir();
    let mode = entry.header().mode().unwrap_or(0o644);
    let mut data = Vec::new();
    if !is_dir {
      entry.read_to_end(&mut data)?;
    }
    let size = data.len() as i64;
    per_job.entry(job_id).or_default().push((
      EntryMeta { rel_path: rel_path.to_string(), mode, size, is_dir },
      data,
    ));
  }
  Ok(
    per_job
      .into_iter()
      .map(|(id, entries)| (id, TarSource { entries: entries.into_iter(), current: None }))
      .collect(),
  )
}

/// Walks a sandbox directory, honoring an optional `TransferOutputFiles`-
/// style inclusion filter of relative names (§2 supplement).
pub struct FilesystemSource {
  root: PathBuf,
  entries: std::vec::IntoIter<PathBuf>,
  current: Option<std::fs::File>,
}

impl FilesystemSource {
  pub fn new(root: impl Into<PathBuf>, filter: Option<&[String]>) -> io::Result<FilesystemSource> {
    let root = root.into();
    let mut paths = Vec::new();
    for entry in walkdir::WalkDir::new(&root).sort_by_file_name() {
      let entry = entry.map_err(io::Error::other)?;
      if !entry.file_type().is_file() {
        continue;
      }
      let rel = entry
        .path()
        .strip_prefix(&root)
        .unwrap_or(entry.path())
        .to_string_lossy()
        .to_string();
      if let Some(filter) = filter
        && !filter.iter().any(|name| name == &rel)
      {
        continue;
      }
      paths.push(entry.path().to_path_buf());
    }
    Ok(FilesystemSource { root, entries: paths.into_iter(), current: None })
  }

  fn rel_path(&self, path: &Path) -> String {
    path.strip_prefix(&self.root).unwrap_or(path).to_string_lossy().to_string()
  }
}

impl FileSource for FilesystemSource {
  fn next_entry(&mut self) -> io::Result<Option<EntryMeta>> {
    let Some(path) = self.entries.next() else {
      self.current = None;
      return Ok(None);
    };
    let metadata = std::fs::metadata(&path)?;
    let mode = file_mode(&metadata);
    let size = metadata.len() as i64;
    let rel_path = self.rel_path(&path);
    self.current = Some(std::fs::File::open(&path)?);
    Ok(Some(EntryMeta { rel_path, mode, size, is_dir: false }))
  }

  fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    match &mut self.current {
      Some(file) => file.read(buf),
      None => Ok(0),
    }
  }
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
  use std::os::unix::fs::PermissionsExt;
  metadata.permissions().mode()
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> u32 {
  0o644
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tar_source_yields_entries_with_payload() {
    let mut builder = tar::Builder::new(Vec::new());
    let data = b"hello world";
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, "a.txt", &data[..]).unwrap();
    let bytes = builder.into_inner().unwrap();

    let mut source = TarSource::from_reader(&bytes[..]).unwrap();
    let meta = source.next_entry().unwrap().unwrap();
    assert_eq!(meta.rel_path, "a.txt");
    assert_eq!(meta.size, 11);
    let mut buf = vec![0u8; 32];
    let n = source.read_chunk(&mut buf).unwrap();
    assert_eq!(&buf[..n], data);
    assert!(source.next_entry().unwrap().is_none());
  }

  #[test]
  fn splits_combined_tar_by_job_prefix() {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in [
      ("100.0/input.txt", &b"for cluster 100"[..]),
      ("101.0/input.txt", &b"for cluster 101"[..]),
    ] {
      let mut header = tar::Header::new_gnu();
      header.set_size(data.len() as u64);
      header.set_mode(0o644);
      header.set_cksum();
      builder.append_data(&mut header, name, data).unwrap();
    }
    let bytes = builder.into_inner().unwrap();

    let mut per_job = split_multi_job_tar(&bytes[..]).unwrap();
    assert_eq!(per_job.len(), 2);
    let mut job_100 = per_job.remove(&JobId::new(100, 0)).unwrap();
    let meta = job_100.next_entry().unwrap().unwrap();
    assert_eq!(meta.rel_path, "input.txt");
  }
}
