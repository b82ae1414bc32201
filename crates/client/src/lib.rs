//! Client side of remote signing: upload an artifact, then apply the patch or
//! replacement the server sends back.

mod error;
mod request;
mod sign;

pub use error::ClientError;
pub use request::{Destination, SignRequest};
pub use sign::{RemoteSigner, SignMode, Signed, SignedPayload};
