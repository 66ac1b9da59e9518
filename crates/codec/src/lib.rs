//! Wire framing for the two protocols the relay speaks:
//!
//! - the JSON-array envelope protocol (`EVENT`, `REQ`, `CLOSE`, `COUNT`,
//!   `AUTH` inbound; `OK`, `EVENT`, `EOSE`, `CLOSED`, `NOTICE`, `AUTH`,
//!   `COUNT` outbound), and
//! - the binary DAG upload/download transport, CBOR-encoded messages over a
//!   length-delimited stream.
//!
//! This crate only knows about bytes and envelope shapes; it does not
//! verify signatures or talk to storage — that is [`relay_protocol`]'s job
//! (the crate that isn't linked here to keep this one a leaf dependency).

mod binary;
mod client;
mod server;

use thiserror::Error;

pub use binary::{DownloadFilter, DownloadMessage, LeafLabelRange, UploadMessage};
pub use client::ClientEnvelope;
pub use server::ServerEnvelope;
pub use tokio_util::codec::LengthDelimitedCodec;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed CBOR: {0}")]
    Cbor(#[from] serde_cbor::Error),
    #[error("empty envelope")]
    Empty,
    #[error("unknown envelope tag {0:?}")]
    UnknownTag(String),
    #[error("envelope is missing a required field: {0}")]
    MissingField(&'static str),
}

pub type CodecResult<T> = Result<T, CodecError>;
