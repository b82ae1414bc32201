use crate::codec::{MAX_INSERT_LEN, Patch, PatchOp};

/// Accumulates ops into a [`Patch`].
///
/// Empty ops are dropped, contiguous copies are merged and adjacent inserts
/// are joined up to [`MAX_INSERT_LEN`].
#[derive(Debug, Default)]
pub struct PatchBuilder {
    ops: Vec<PatchOp>,
    expected_len: Option<u64>,
}

impl PatchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn copy(mut self, offset: u64, len: u64) -> Self {
        if len == 0 {
            return self;
        }
        if let Some(PatchOp::Copy {
            offset: prev_offset,
            len: prev_len,
        }) = self.ops.last_mut()
        {
            let prev_end = prev_offset.checked_add(*prev_len);
            if let (Some(prev_end), Some(merged)) = (prev_end, prev_len.checked_add(len)) {
                if prev_end == offset {
                    *prev_len = merged;
                    return self;
                }
            }
        }
        self.ops.push(PatchOp::Copy { offset, len });
        self
    }

    pub fn insert(mut self, data: impl AsRef<[u8]>) -> Self {
        let mut data = data.as_ref();
        let cap = MAX_INSERT_LEN as usize;
        while !data.is_empty() {
            if let Some(PatchOp::Insert(prev)) = self.ops.last_mut() {
                if prev.len() < cap {
                    let n = data.len().min(cap - prev.len());
                    prev.extend_from_slice(&data[..n]);
                    data = &data[n..];
                    continue;
                }
            }
            let n = data.len().min(cap);
            self.ops.push(PatchOp::Insert(data[..n].to_vec()));
            data = &data[n..];
        }
        self
    }

    /// Declare the total output length; appliers reject any other result.
    pub fn expected_len(mut self, len: u64) -> Self {
        self.expected_len = Some(len);
        self
    }

    pub fn build(self) -> Patch {
        Patch {
            ops: self.ops,
            expected_len: self.expected_len,
        }
    }
}

impl Patch {
    /// Prefix/suffix delta that turns `old` into `new`.
    ///
    /// Good enough for signers that append or rewrite one contiguous region,
    /// which is what signing tends to do.
    pub fn between(old: &[u8], new: &[u8]) -> Patch {
        let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
        let suffix = old[prefix..]
            .iter()
            .rev()
            .zip(new[prefix..].iter().rev())
            .take_while(|(a, b)| a == b)
            .count();

        PatchBuilder::new()
            .copy(0, prefix as u64)
            .insert(&new[prefix..new.len() - suffix])
            .copy((old.len() - suffix) as u64, suffix as u64)
            .expected_len(new.len() as u64)
            .build()
    }
}
