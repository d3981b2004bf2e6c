//! The type-0 control exchange that precedes user traffic.
//!
//! Immediately after a stream comes up the server sends an offer frame
//! and the client answers. Both frames are plaintext type-0 frames whose
//! payload is a CBOR map; everything after a successful exchange flows
//! through the negotiated limits and, when enabled, the derived cipher.
//!
//! The server's `max_msg_size` wins: the client adopts it for the
//! lifetime of the connection. With encryption on, each side contributes
//! an x25519 public key and the connection cipher is derived from the
//! agreement; a reconnect renegotiates from scratch.

use crate::error::IpcError;
use crate::session::Options;
use crate::transport::IoStream;
use bytes::BytesMut;
use ipc_wire::{
    encode_frame, Frame, FrameDecoder, FrameError, KeyExchange, SessionCipher, CONTROL_MSG_TYPE,
    DEFAULT_MAX_MESSAGE_SIZE, KEY_SIZE,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

/// Handshake protocol version
pub const HANDSHAKE_VERSION: u32 = 1;

/// A stream that has completed the handshake
#[derive(Debug)]
pub(crate) struct Established {
    pub stream: IoStream,
    pub cipher: Option<Arc<SessionCipher>>,
    /// Payload bound both sides agreed on
    pub max_message_size: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct Offer {
    version: u32,
    max_msg_size: u32,
    encryption: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    public_key: Option<[u8; KEY_SIZE]>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Reply {
    version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    public_key: Option<[u8; KEY_SIZE]>,
}

/// Server side: offer, then validate the reply
pub(crate) async fn server_handshake(
    mut stream: IoStream,
    opts: &Options,
) -> Result<Established, IpcError> {
    let exchange = opts.encryption.then(KeyExchange::generate);

    let offer = Offer {
        version: HANDSHAKE_VERSION,
        max_msg_size: opts.max_message_size as u32,
        encryption: opts.encryption,
        public_key: exchange.as_ref().map(KeyExchange::public_key),
    };
    send_control(&mut stream, &offer, opts.max_message_size).await?;

    let reply: Reply = recv_control(&mut stream, opts.max_message_size).await?;
    if reply.version != HANDSHAKE_VERSION {
        return Err(IpcError::Handshake(format!(
            "peer version {} unsupported",
            reply.version
        )));
    }

    let cipher = match exchange {
        Some(exchange) => {
            let peer = reply
                .public_key
                .ok_or_else(|| IpcError::Handshake("peer did not offer a key".into()))?;
            Some(Arc::new(exchange.into_cipher(&peer)))
        }
        None => None,
    };

    debug!("server handshake complete");
    Ok(Established {
        stream,
        cipher,
        max_message_size: opts.max_message_size,
    })
}

/// Client side: take the offer, adopt its limits, answer
pub(crate) async fn client_handshake(
    mut stream: IoStream,
    opts: &Options,
) -> Result<Established, IpcError> {
    // The offer arrives before our limits are known; receive with the
    // local configuration as the bound, which the floor keeps sane.
    let offer: Offer = recv_control(&mut stream, opts.max_message_size).await?;

    if offer.version != HANDSHAKE_VERSION {
        return Err(IpcError::Handshake(format!(
            "server version {} unsupported",
            offer.version
        )));
    }
    if offer.encryption != opts.encryption {
        return Err(IpcError::Handshake(format!(
            "encryption mismatch: server {}, client {}",
            offer.encryption, opts.encryption
        )));
    }

    let max_message_size = (offer.max_msg_size as usize).max(DEFAULT_MAX_MESSAGE_SIZE);

    let (cipher, public_key) = match offer.public_key {
        Some(server_key) if opts.encryption => {
            let exchange = KeyExchange::generate();
            let public = exchange.public_key();
            (Some(Arc::new(exchange.into_cipher(&server_key))), Some(public))
        }
        None if !opts.encryption => (None, None),
        _ => return Err(IpcError::Handshake("key offer mismatch".into())),
    };

    let reply = Reply {
        version: HANDSHAKE_VERSION,
        public_key,
    };
    send_control(&mut stream, &reply, max_message_size).await?;

    debug!(max_message_size, "client handshake complete");
    Ok(Established {
        stream,
        cipher,
        max_message_size,
    })
}

async fn send_control<T: Serialize>(
    stream: &mut IoStream,
    value: &T,
    max_message_size: usize,
) -> Result<(), IpcError> {
    let mut payload = Vec::new();
    ciborium::into_writer(value, &mut payload).map_err(|_| FrameError::Handshake)?;

    let frame = encode_frame(CONTROL_MSG_TYPE, &payload, None, max_message_size)?;
    stream.write_all(&frame).await?;
    Ok(())
}

async fn recv_control<T: for<'de> Deserialize<'de>>(
    stream: &mut IoStream,
    max_message_size: usize,
) -> Result<T, IpcError> {
    let frame = recv_frame(stream, max_message_size).await?;
    if frame.msg_type != CONTROL_MSG_TYPE {
        return Err(IpcError::Handshake(format!(
            "expected control frame, got type {}",
            frame.msg_type
        )));
    }

    ciborium::from_reader(frame.payload.as_ref())
        .map_err(|_| IpcError::Frame(FrameError::Handshake))
}

async fn recv_frame(stream: &mut IoStream, max_message_size: usize) -> Result<Frame, IpcError> {
    let mut decoder = FrameDecoder::new(max_message_size, false);
    let mut buf = BytesMut::with_capacity(256);

    loop {
        if let Some(frame) = decoder.decode(&mut buf, None)? {
            return Ok(frame);
        }
        let read = stream.read_buf(&mut buf).await?;
        if read == 0 {
            return Err(IpcError::Frame(FrameError::Malformed));
        }
    }
}
