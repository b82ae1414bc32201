use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::codec::{Patch, PatchOp};
use crate::error::PatchError;

impl Patch {
    /// Replay the patch against `source`, streaming the result into `sink`.
    ///
    /// Every op is bounds-checked against the source length before the first
    /// byte is written. Returns the number of bytes written.
    pub fn apply<R, W>(&self, source: &mut R, sink: &mut W) -> Result<u64, PatchError>
    where
        R: Read + Seek,
        W: Write,
    {
        let source_len = source.seek(SeekFrom::End(0))?;
        let total = self.validate(source_len)?;

        let mut written = 0u64;
        for op in &self.ops {
            match op {
                PatchOp::Copy { offset, len } => {
                    source.seek(SeekFrom::Start(*offset))?;
                    let copied = io::copy(&mut source.by_ref().take(*len), sink)?;
                    if copied != *len {
                        return Err(PatchError::Apply(format!(
                            "source ended after {copied} of {len} bytes at offset {offset}"
                        )));
                    }
                    written += copied;
                }
                PatchOp::Insert(data) => {
                    sink.write_all(data)?;
                    written += data.len() as u64;
                }
            }
        }
        sink.flush()?;

        debug_assert_eq!(written, total);
        Ok(written)
    }

    /// Apply into `destination` through a temp file in the same directory.
    ///
    /// `destination` only ever holds its previous content or the complete
    /// result. It may be the file `source` was opened from.
    pub fn apply_to_path<R>(&self, source: &mut R, destination: &Path) -> Result<u64, PatchError>
    where
        R: Read + Seek,
    {
        write_atomically(destination, |file| {
            let mut out = BufWriter::new(file);
            self.apply(source, &mut out)
        })
    }

    fn validate(&self, source_len: u64) -> Result<u64, PatchError> {
        let mut total = 0u64;
        for op in &self.ops {
            if let PatchOp::Copy { offset, len } = op {
                let end = offset.checked_add(*len).ok_or_else(|| {
                    PatchError::Apply(format!("copy range {offset}+{len} overflows"))
                })?;
                if end > source_len {
                    return Err(PatchError::Apply(format!(
                        "copy of {len} bytes at offset {offset} exceeds source length {source_len}"
                    )));
                }
            }
            total = total
                .checked_add(op.output_len())
                .ok_or_else(|| PatchError::Apply("output length overflows".into()))?;
        }
        if let Some(expected) = self.expected_len {
            if expected != total {
                return Err(PatchError::Apply(format!(
                    "patch produces {total} bytes but declares {expected}"
                )));
            }
        }
        Ok(total)
    }
}

/// Write `destination` by filling a temp file next to it and renaming it
/// into place once `write` succeeds and the data is synced.
///
/// If `write` fails, or anything fails before the rename, the temp file is
/// removed and `destination` is left as it was.
pub fn write_atomically<T, E, F>(destination: &Path, write: F) -> Result<T, E>
where
    F: FnOnce(&mut File) -> Result<T, E>,
    E: From<io::Error>,
{
    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir)?;

    let value = write(temp.as_file_mut())?;

    temp.as_file_mut().flush()?;
    temp.as_file().sync_all()?;
    if let Ok(meta) = fs::metadata(destination) {
        temp.as_file().set_permissions(meta.permissions())?;
    }
    temp.persist(destination).map_err(|err| E::from(err.error))?;
    Ok(value)
}
