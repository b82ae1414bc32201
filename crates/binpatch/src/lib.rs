//! Compact binary deltas between an artifact and its signed form.
//!
//! A [`Patch`] is an ordered list of [`PatchOp`]s. Replaying them against the
//! original bytes reconstructs the new bytes: `Copy` pulls a range out of the
//! original, `Insert` emits literal bytes.

mod apply;
mod builder;
mod codec;
mod error;

pub use apply::write_atomically;
pub use builder::PatchBuilder;
pub use codec::{MAGIC, MAX_INSERT_LEN, MAX_OPS, Patch, PatchOp, VERSION};
pub use error::PatchError;

/// Media type used on the wire for an encoded [`Patch`].
pub const MIME_TYPE: &str = "application/x-binary-patch";
