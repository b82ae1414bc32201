use crate::error::PatchError;

pub const MAGIC: &[u8; 4] = b"BPAT";
pub const VERSION: u8 = 1;

/// Largest literal a single insert may carry on the wire.
pub const MAX_INSERT_LEN: u32 = 64 * 1024 * 1024;
/// Largest number of operations a decoder accepts.
pub const MAX_OPS: u32 = 1 << 20;

const FLAG_EXPECTED_LEN: u8 = 0x01;
const TAG_COPY: u8 = 0x01;
const TAG_INSERT: u8 = 0x02;

// Smallest encoded op: an empty insert (tag + u32 length).
const MIN_OP_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOp {
    /// Copy `len` bytes of the original, starting at `offset`.
    Copy { offset: u64, len: u64 },
    /// Emit these bytes verbatim.
    Insert(Vec<u8>),
}

impl PatchOp {
    pub fn output_len(&self) -> u64 {
        match self {
            PatchOp::Copy { len, .. } => *len,
            PatchOp::Insert(data) => data.len() as u64,
        }
    }
}

/// Decoded patch.
///
/// Construct one with [`crate::PatchBuilder`], [`Patch::between`] or
/// [`Patch::decode`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    pub(crate) ops: Vec<PatchOp>,
    pub(crate) expected_len: Option<u64>,
}

impl Patch {
    pub fn ops(&self) -> &[PatchOp] {
        &self.ops
    }

    /// Output length declared by whoever produced the patch, if any.
    pub fn expected_len(&self) -> Option<u64> {
        self.expected_len
    }

    /// Length the ops actually produce, or `None` if it overflows `u64`.
    pub fn output_len(&self) -> Option<u64> {
        self.ops
            .iter()
            .try_fold(0u64, |acc, op| acc.checked_add(op.output_len()))
    }

    /// Serialize to the version 1 wire layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len_hint());
        out.extend_from_slice(MAGIC);
        out.push(VERSION);
        match self.expected_len {
            Some(len) => {
                out.push(FLAG_EXPECTED_LEN);
                out.extend_from_slice(&len.to_be_bytes());
            }
            None => out.push(0),
        }
        out.extend_from_slice(&(self.ops.len() as u32).to_be_bytes());
        for op in &self.ops {
            match op {
                PatchOp::Copy { offset, len } => {
                    out.push(TAG_COPY);
                    out.extend_from_slice(&offset.to_be_bytes());
                    out.extend_from_slice(&len.to_be_bytes());
                }
                PatchOp::Insert(data) => {
                    out.push(TAG_INSERT);
                    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
                    out.extend_from_slice(data);
                }
            }
        }
        out
    }

    /// Parse the wire layout. Rejects anything [`Patch::encode`] would not
    /// have produced.
    pub fn decode(bytes: &[u8]) -> Result<Self, PatchError> {
        let mut reader = Reader::new(bytes);

        if reader.take(MAGIC.len(), "magic")? != MAGIC {
            return Err(PatchError::Format("bad magic".into()));
        }
        let version = reader.u8("version")?;
        if version != VERSION {
            return Err(PatchError::Format(format!(
                "unsupported version {version} (expected {VERSION})"
            )));
        }
        let flags = reader.u8("flags")?;
        if flags & !FLAG_EXPECTED_LEN != 0 {
            return Err(PatchError::Format(format!("unknown flags {flags:#04x}")));
        }
        let expected_len = if flags & FLAG_EXPECTED_LEN != 0 {
            Some(reader.u64("expected length")?)
        } else {
            None
        };

        let count = reader.u32("op count")?;
        if count > MAX_OPS || count as usize > reader.remaining() / MIN_OP_LEN {
            return Err(PatchError::Format(format!(
                "op count {count} does not fit in {} remaining bytes",
                reader.remaining()
            )));
        }

        let mut ops = Vec::with_capacity(count as usize);
        for index in 0..count {
            let op = match reader.u8("op tag")? {
                TAG_COPY => PatchOp::Copy {
                    offset: reader.u64("copy offset")?,
                    len: reader.u64("copy length")?,
                },
                TAG_INSERT => {
                    let len = reader.u32("insert length")?;
                    if len > MAX_INSERT_LEN {
                        return Err(PatchError::Format(format!(
                            "insert of {len} bytes exceeds limit of {MAX_INSERT_LEN}"
                        )));
                    }
                    PatchOp::Insert(reader.take(len as usize, "insert data")?.to_vec())
                }
                tag => {
                    return Err(PatchError::Format(format!(
                        "unknown op tag {tag:#04x} at op {index}"
                    )));
                }
            };
            ops.push(op);
        }

        if reader.remaining() != 0 {
            return Err(PatchError::Format(format!(
                "{} trailing bytes after last op",
                reader.remaining()
            )));
        }

        Ok(Patch { ops, expected_len })
    }

    fn encoded_len_hint(&self) -> usize {
        let ops: usize = self
            .ops
            .iter()
            .map(|op| match op {
                PatchOp::Copy { .. } => 17,
                PatchOp::Insert(data) => MIN_OP_LEN + data.len(),
            })
            .sum();
        4 + 1 + 1 + 8 + 4 + ops
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], PatchError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| {
                PatchError::Format(format!("truncated {what} at offset {}", self.pos))
            })?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self, what: &str) -> Result<u8, PatchError> {
        Ok(self.take(1, what)?[0])
    }

    fn u32(&mut self, what: &str) -> Result<u32, PatchError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4, what)?);
        Ok(u32::from_be_bytes(raw))
    }

    fn u64(&mut self, what: &str) -> Result<u64, PatchError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8, what)?);
        Ok(u64::from_be_bytes(raw))
    }
}
