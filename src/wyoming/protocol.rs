//! Wyoming event framing
//!
//! Each event is one JSON header line, optionally followed by
//! `data_length` bytes of extra JSON data and `payload_length` bytes of
//! binary payload:
//!
//! ```text
//! {"type":"audio-chunk","data":{"rate":44100,"width":2,"channels":1},"payload_length":4096}\n
//! <4096 bytes of PCM>
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::core::error::{Result, TtsError};

/// Protocol version advertised in outgoing headers
pub const PROTOCOL_VERSION: &str = "1.5.2";

/// Longest accepted header line
pub const MAX_HEADER_BYTES: usize = 64 * 1024;

/// Largest accepted data or payload section
pub const MAX_SECTION_BYTES: usize = 16 * 1024 * 1024;

/// Event types used by the TTS service
pub mod event_type {
    pub const DESCRIBE: &str = "describe";
    pub const INFO: &str = "info";
    pub const SYNTHESIZE: &str = "synthesize";
    pub const AUDIO_START: &str = "audio-start";
    pub const AUDIO_CHUNK: &str = "audio-chunk";
    pub const AUDIO_STOP: &str = "audio-stop";
    pub const ERROR: &str = "error";
}

/// One protocol event
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Event {
    pub event_type: String,
    pub data: Map<String, Value>,
    pub payload: Option<Vec<u8>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            ..Default::default()
        }
    }

    /// Set data from a JSON object; other values are ignored
    pub fn with_data(mut self, data: Value) -> Self {
        if let Value::Object(map) = data {
            self.data = map;
        }
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn is(&self, event_type: &str) -> bool {
        self.event_type == event_type
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

fn protocol_error(message: impl Into<String>) -> TtsError {
    TtsError::invalid("event", message)
}

/// Read the next event; `None` on a clean end of stream
pub async fn read_event<R>(reader: &mut R) -> Result<Option<Event>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        line.clear();
        let read = (&mut *reader)
            .take(MAX_HEADER_BYTES as u64 + 1)
            .read_until(b'\n', &mut line)
            .await?;
        if read == 0 {
            return Ok(None);
        }
        if line.last() != Some(&b'\n') {
            if line.len() > MAX_HEADER_BYTES {
                return Err(protocol_error(format!(
                    "header line exceeds {} bytes",
                    MAX_HEADER_BYTES
                )));
            }
            return Err(protocol_error("connection closed inside a header line"));
        }
        if !line.iter().all(u8::is_ascii_whitespace) {
            break;
        }
    }

    let header: Header =
        serde_json::from_slice(&line).map_err(|e| protocol_error(format!("malformed header: {}", e)))?;

    let mut data = header.data.unwrap_or_default();
    if let Some(length) = header.data_length.filter(|&n| n > 0) {
        let extra = read_section(reader, length).await?;
        let extra: Map<String, Value> =
            serde_json::from_slice(&extra).map_err(|e| protocol_error(format!("malformed event data: {}", e)))?;
        data.extend(extra);
    }

    let payload = match header.payload_length {
        Some(length) if length > 0 => Some(read_section(reader, length).await?),
        _ => None,
    };

    Ok(Some(Event {
        event_type: header.event_type,
        data,
        payload,
    }))
}

async fn read_section<R>(reader: &mut R, length: usize) -> Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    if length > MAX_SECTION_BYTES {
        return Err(protocol_error(format!(
            "section of {} bytes exceeds {} bytes",
            length, MAX_SECTION_BYTES
        )));
    }
    let mut buf = vec![0u8; length];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Write one event and flush it
pub async fn write_event<W>(writer: &mut W, event: &Event) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let header = Header {
        event_type: event.event_type.clone(),
        data: (!event.data.is_empty()).then(|| event.data.clone()),
        data_length: None,
        payload_length: event.payload.as_ref().map(Vec::len),
        version: Some(PROTOCOL_VERSION.to_string()),
    };
    let mut line = serde_json::to_vec(&header)?;
    line.push(b'\n');

    writer.write_all(&line).await?;
    if let Some(payload) = &event.payload {
        writer.write_all(payload).await?;
    }
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_write_then_read() {
        let event = Event::new(event_type::AUDIO_CHUNK)
            .with_data(json!({"rate": 16000, "width": 2, "channels": 1}))
            .with_payload(vec![1, 2, 3, 4]);
        let mut buf = Vec::new();
        write_event(&mut buf, &event).await.unwrap();

        let mut reader = BufReader::new(buf.as_slice());
        let read = read_event(&mut reader).await.unwrap().unwrap();
        assert_eq!(read, event);
        assert!(read_event(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_data_length_merged() {
        let extra = br#"{"text":"Hello"}"#;
        let mut wire = format!(
            "{{\"type\":\"synthesize\",\"data\":{{\"voice\":{{\"name\":\"en-F1\"}}}},\"data_length\":{}}}\n",
            extra.len()
        )
        .into_bytes();
        wire.extend_from_slice(extra);

        let mut reader = BufReader::new(wire.as_slice());
        let event = read_event(&mut reader).await.unwrap().unwrap();
        assert!(event.is(event_type::SYNTHESIZE));
        assert_eq!(event.get_str("text"), Some("Hello"));
        assert!(event.data.contains_key("voice"));
    }

    #[tokio::test]
    async fn test_blank_lines_skipped() {
        let wire = b"\n\r\n{\"type\":\"describe\"}\n";
        let mut reader = BufReader::new(&wire[..]);
        let event = read_event(&mut reader).await.unwrap().unwrap();
        assert!(event.is(event_type::DESCRIBE));
        assert!(event.data.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_header() {
        let mut reader = BufReader::new(&b"not json\n"[..]);
        assert_eq!(read_event(&mut reader).await.unwrap_err().code(), "invalid_parameter");
    }

    #[tokio::test]
    async fn test_oversized_header() {
        let wire = vec![b'x'; MAX_HEADER_BYTES + 10];
        let mut reader = BufReader::new(wire.as_slice());
        assert!(read_event(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn test_truncated_payload() {
        let mut reader = BufReader::new(&b"{\"type\":\"audio-chunk\",\"payload_length\":10}\nabc"[..]);
        assert_eq!(read_event(&mut reader).await.unwrap_err().code(), "io_error");
    }
}
