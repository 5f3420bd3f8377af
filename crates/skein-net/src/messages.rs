use tracing::debug;

use skein_shared::constants::MAX_MESSAGE_SIZE;
use skein_shared::protocol::Envelope;

use crate::error::NetError;

/// Serialize an envelope into a wire frame.
pub fn encode_frame(envelope: &Envelope) -> Result<Vec<u8>, NetError> {
    let frame = envelope
        .to_bytes()
        .map_err(|e| NetError::Codec(e.to_string()))?;
    if frame.len() > MAX_MESSAGE_SIZE {
        return Err(NetError::FrameTooLarge {
            size: frame.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    debug!(
        message_type = %envelope.message.message_type,
        len = frame.len(),
        "Encoded envelope frame"
    );
    Ok(frame)
}

/// Parse a wire frame back into an envelope. Signatures are not checked here.
pub fn decode_frame(frame: &[u8]) -> Result<Envelope, NetError> {
    if frame.len() > MAX_MESSAGE_SIZE {
        return Err(NetError::FrameTooLarge {
            size: frame.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    Envelope::from_bytes(frame).map_err(|e| NetError::Codec(e.to_string()))
}
