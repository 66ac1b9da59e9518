//! The binary DAG upload/download transport (§4.9): a second TCP listener,
//! bound to `port + 1` by convention, speaking CBOR-encoded
//! `UploadMessage`/`DownloadMessage` frames over a length-delimited
//! stream. Authorization is a Schnorr signature over the root CID,
//! checked once per frame before touching storage — there is no
//! persistent session here, every frame stands alone.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use relay_codec::{DownloadFilter, DownloadMessage, LengthDelimitedCodec, UploadMessage};
use relay_crypto::{verify, PublicKey, Signature};
use relay_dag::{CacheExtractors, DagLeafData};
use relay_store::Engine;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("malformed frame: {0}")]
    Cbor(#[from] serde_cbor::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("signature does not verify against public_key for root {0}")]
    BadSignature(String),
    #[error(transparent)]
    Dag(#[from] relay_dag::DagError),
    #[error(transparent)]
    Crypto(#[from] relay_crypto::CryptoError),
}

/// Bind the DAG transport listener on `port + 1` and serve connections
/// until the process exits. Each connection may carry any number of
/// upload/download frames; a frame is dispatched by which of the two
/// shapes it deserializes as, tried upload-first since uploads are the
/// hot path.
pub async fn serve(
    port: u16,
    engine: Arc<dyn Engine>,
    extractors: Arc<CacheExtractors>,
) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port + 1));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "dag transport listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let engine = engine.clone();
        let extractors = extractors.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, engine, extractors).await {
                tracing::debug!(%peer, error = %e, "dag transport connection ended");
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    engine: Arc<dyn Engine>,
    extractors: Arc<CacheExtractors>,
) -> Result<(), TransportError> {
    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());

    while let Some(frame) = framed.next().await {
        let frame = frame?;
        match dispatch_frame(&frame, engine.as_ref(), extractors.as_ref()) {
            Ok(response) => framed.send(Bytes::from(response)).await?,
            Err(e) => {
                tracing::debug!(error = %e, "dag frame rejected");
                framed.send(Bytes::from(serde_cbor::to_vec(&ErrorReply { message: e.to_string() })?)).await?;
            }
        }
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct ErrorReply {
    message: String,
}

#[derive(serde::Serialize)]
struct OkReply {
    ok: bool,
}

fn dispatch_frame(
    frame: &BytesMut,
    engine: &dyn Engine,
    extractors: &CacheExtractors,
) -> Result<Vec<u8>, TransportError> {
    if let Ok(upload) = serde_cbor::from_slice::<UploadMessage>(frame) {
        handle_upload(upload, engine, extractors)?;
        return Ok(serde_cbor::to_vec(&OkReply { ok: true })?);
    }

    let download: DownloadMessage = serde_cbor::from_slice(frame)?;
    let leaves = handle_download(download, engine)?;
    Ok(serde_cbor::to_vec(&leaves)?)
}

fn verify_root_authorization(root: &str, public_key: &str, signature: &str) -> Result<(), TransportError> {
    let pubkey = PublicKey::from_hex(public_key)
        .or_else(|_| PublicKey::from_npub(public_key))?;
    let sig = Signature::from_hex(signature)?;
    let message = relay_crypto::sha256(root.as_bytes());
    if !verify(pubkey, &message, sig) {
        return Err(TransportError::BadSignature(root.to_string()));
    }
    Ok(())
}

fn handle_upload(msg: UploadMessage, engine: &dyn Engine, extractors: &CacheExtractors) -> Result<(), TransportError> {
    verify_root_authorization(&msg.root, &msg.public_key, &msg.signature)?;

    let leaf_data = DagLeafData { leaf: msg.leaf, public_key: msg.public_key, signature: msg.signature };
    relay_dag::store_leaf(engine, &msg.root, leaf_data, extractors)?;
    Ok(())
}

fn handle_download(msg: DownloadMessage, engine: &dyn Engine) -> Result<Vec<DagLeafData>, TransportError> {
    verify_root_authorization(&msg.root, &msg.public_key, &msg.signature)?;

    let filter = msg.filter.unwrap_or_default();
    let mut out = Vec::new();

    for hash in &filter.leaves {
        out.push(relay_dag::retrieve_leaf(engine, &msg.root, hash, filter.include_content)?);
    }
    for range in &filter.leaf_ranges {
        let include_content = range.include_content || filter.include_content;
        out.extend(relay_dag::retrieve_leaf_range(engine, &msg.root, &range.from, &range.to, include_content)?);
    }

    if filter.leaves.is_empty() && filter.leaf_ranges.is_empty() {
        let dag = relay_dag::build_dag_from_store(engine, &msg.root, filter.include_content)?;
        out.extend(dag.leaves.into_values());
    }

    Ok(out)
}
