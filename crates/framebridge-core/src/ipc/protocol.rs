//! Wire format of the socket transport.
//!
//! ```text
//! [u32 BE: len][UTF-8 JSON bytes of len]
//! ```
//!
//! Each JSON payload is a [`Frame`]. A connection opens with one `hello` frame
//! from each side; everything after that is a `message` frame.

use crate::config::IpcConfig;
use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// One unit on the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Frame {
    /// Declares the origin of the sending process.
    Hello { origin: String },
    /// A posted boundary payload.
    Message { data: Value },
}

/// Read a length-prefixed frame from an async reader.
///
/// Returns `None` on clean EOF (peer closed connection).
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > IpcConfig::MAX_MESSAGE_SIZE {
        return Err(BridgeError::Validation {
            field: "ipc_frame".to_string(),
            message: format!(
                "Frame size {} exceeds maximum {}",
                len,
                IpcConfig::MAX_MESSAGE_SIZE
            ),
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Write a length-prefixed frame to an async writer.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > IpcConfig::MAX_MESSAGE_SIZE {
        return Err(BridgeError::Validation {
            field: "ipc_frame".to_string(),
            message: format!(
                "Frame size {} exceeds maximum {}",
                payload.len(),
                IpcConfig::MAX_MESSAGE_SIZE
            ),
        });
    }

    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read and decode the next [`Frame`].
pub async fn read_message<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<Frame>> {
    match read_frame(reader).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Encode and write a [`Frame`].
pub async fn write_message<W: AsyncWriteExt + Unpin>(writer: &mut W, frame: &Frame) -> Result<()> {
    let bytes = serde_json::to_vec(frame)?;
    write_frame(writer, &bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_wire_shape() {
        let hello = serde_json::to_value(Frame::Hello {
            origin: "https://app.example".into(),
        })
        .unwrap();
        assert_eq!(hello, json!({"kind": "hello", "origin": "https://app.example"}));

        let msg: Frame = serde_json::from_value(json!({"kind": "message", "data": {"id": "1"}})).unwrap();
        assert_eq!(msg, Frame::Message { data: json!({"id": "1"}) });
    }

    #[tokio::test]
    async fn test_message_read_write() {
        let mut buf = Vec::new();
        write_message(&mut buf, &Frame::Message { data: json!([1, 2]) }).await.unwrap();
        write_message(&mut buf, &Frame::Hello { origin: "https://a.example".into() })
            .await
            .unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        assert_eq!(
            read_message(&mut cursor).await.unwrap(),
            Some(Frame::Message { data: json!([1, 2]) })
        );
        assert!(matches!(
            read_message(&mut cursor).await.unwrap(),
            Some(Frame::Hello { .. })
        ));
        assert_eq!(read_message(&mut cursor).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let huge_len = (IpcConfig::MAX_MESSAGE_SIZE + 1) as u32;
        let mut buf = Vec::new();
        buf.extend_from_slice(&huge_len.to_be_bytes());
        buf.extend_from_slice(&[0u8; 8]);

        let mut cursor = std::io::Cursor::new(buf);
        assert!(matches!(
            read_frame(&mut cursor).await,
            Err(BridgeError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_garbage_payload_is_json_error() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"not a frame").await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        assert!(matches!(
            read_message(&mut cursor).await,
            Err(BridgeError::Json { .. })
        ));
    }
}
