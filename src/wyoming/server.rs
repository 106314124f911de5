//! Wyoming TTS service
//!
//! `describe` is answered with an `info` event listing every
//! (language, voice) pair as its own voice. `synthesize` streams one
//! `audio-chunk` per synthesized segment between `audio-start` and
//! `audio-stop`; an `error` event takes the place of `audio-stop` when the
//! session fails. A client that disconnects mid-stream cancels its session.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::protocol::{event_type, read_event, write_event, Event};
use crate::audio::{AudioOutput, SAMPLE_WIDTH};
use crate::core::error::{Result, TtsError};
use crate::inference::{ParamValue, SynthesisPipeline, TtsParams};
use crate::streaming::{AudioSegment, SessionEvent};
use crate::voice::{catalog, VoiceKey};

/// Wyoming listener in front of the synthesis pipeline
pub struct WyomingServer {
    pipeline: Arc<SynthesisPipeline>,
}

impl WyomingServer {
    pub fn new(pipeline: Arc<SynthesisPipeline>) -> Self {
        Self { pipeline }
    }

    /// Accept connections until `shutdown` turns true
    pub async fn serve(self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => {
                    info!("Wyoming listener stopping");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "Wyoming client connected");
                        let pipeline = Arc::clone(&self.pipeline);
                        tokio::spawn(async move {
                            match handle_stream(pipeline, stream).await {
                                Ok(()) => debug!(%peer, "Wyoming client disconnected"),
                                Err(e) => debug!(%peer, error = %e, "Wyoming connection closed"),
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "Wyoming accept failed"),
                }
            }
        }
    }
}

async fn handle_stream(pipeline: Arc<SynthesisPipeline>, stream: TcpStream) -> Result<()> {
    stream.set_nodelay(true)?;
    let (read_half, write_half) = stream.into_split();
    handle_connection(pipeline, BufReader::new(read_half), BufWriter::new(write_half)).await
}

/// Serve one client until it disconnects
pub async fn handle_connection<R, W>(pipeline: Arc<SynthesisPipeline>, mut reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let event = match read_event(&mut reader).await {
            Ok(Some(event)) => event,
            Ok(None) => return Ok(()),
            Err(e) => {
                // Framing is lost; report and hang up
                let _ = send_error(&mut writer, &e).await;
                return Err(e);
            }
        };

        match event.event_type.as_str() {
            event_type::DESCRIBE => write_event(&mut writer, &info_event(&pipeline)).await?,
            event_type::SYNTHESIZE => synthesize(&pipeline, &event, &mut reader, &mut writer).await?,
            other => debug!(event = other, "ignoring Wyoming event"),
        }
    }
}

/// Service description with one voice per catalog entry
pub fn info_event(pipeline: &SynthesisPipeline) -> Event {
    let engine = pipeline.engine().info();
    let attribution = json!({ "name": crate::SERVICE_NAME, "url": "" });
    let voices: Vec<Value> = catalog()
        .into_iter()
        .map(|key| {
            json!({
                "name": key.name(),
                "description": format!("{} {}", key.language.name(), key.voice),
                "attribution": attribution,
                "installed": true,
                "version": crate::VERSION,
                "languages": [key.language.code()],
            })
        })
        .collect();

    Event::new(event_type::INFO).with_data(json!({
        "tts": [{
            "name": crate::SERVICE_NAME,
            "description": format!("{} ({} engine, {} Hz)", crate::SERVICE_NAME, engine.name, engine.sample_rate),
            "attribution": attribution,
            "installed": true,
            "version": crate::VERSION,
            "voices": voices,
        }],
        "asr": [],
        "handle": [],
        "intent": [],
        "wake": [],
    }))
}

/// Map `synthesize` data onto request parameters
///
/// `voice.name` may be an endpoint name (`fr-M4`) or a bare voice id, in
/// which case `voice.language` picks the language. `speed`, `volume` and
/// `quality` are accepted at the top level of the event data.
pub fn synthesize_params(data: &Map<String, Value>) -> Result<TtsParams> {
    let voice = data.get("voice").and_then(Value::as_object);
    let name = voice.and_then(|v| v.get("name")).and_then(Value::as_str);
    let language = voice.and_then(|v| v.get("language")).and_then(Value::as_str).map(str::to_string);

    let (language, voice) = match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) if name.contains('-') => {
            let key = VoiceKey::from_name(name)?;
            (Some(key.language.code().to_string()), Some(key.voice.to_string()))
        }
        Some(name) => (language, Some(name.to_string())),
        None => (language, None),
    };

    Ok(TtsParams {
        text: data.get("text").and_then(Value::as_str).map(str::to_string),
        language,
        voice,
        speed: number_param(data, "speed"),
        volume: number_param(data, "volume"),
        quality: number_param(data, "quality"),
    })
}

fn number_param(data: &Map<String, Value>, key: &str) -> Option<ParamValue> {
    match data.get(key)? {
        Value::Null => None,
        Value::Number(n) => n.as_f64().map(ParamValue::Number),
        Value::String(s) => Some(ParamValue::Text(s.clone())),
        other => Some(ParamValue::Text(other.to_string())),
    }
}

async fn synthesize<R, W>(pipeline: &Arc<SynthesisPipeline>, event: &Event, reader: &mut R, writer: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let request = match synthesize_params(&event.data).and_then(|params| pipeline.accept(params)) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "rejected Wyoming synthesize");
            return send_error(writer, &e).await;
        }
    };

    let rate = pipeline.sample_rate();
    let request_id = request.id;
    let mut handle = pipeline.start(request);
    let mut started = false;
    let mut watch_reader = true;

    loop {
        let next = tokio::select! {
            event = handle.next_event() => event,
            eof = async { reader.fill_buf().await.map(|buf| buf.is_empty()) }, if watch_reader => {
                match eof {
                    Ok(true) => {
                        info!(%request_id, "Wyoming client went away, cancelling");
                        return Ok(());
                    }
                    // Client sent its next event early; it is read after this one finishes
                    Ok(false) => {
                        watch_reader = false;
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        match next {
            Some(SessionEvent::Segment(segment)) => {
                if !started {
                    write_event(writer, &audio_start(rate)).await?;
                    started = true;
                }
                write_event(writer, &audio_chunk(&segment)).await?;
            }
            Some(SessionEvent::Completed(summary)) => {
                if !started {
                    write_event(writer, &audio_start(rate)).await?;
                }
                write_event(writer, &Event::new(event_type::AUDIO_STOP)).await?;
                debug!(request_id = %summary.request_id, segments = summary.segments, "Wyoming stream finished");
                return Ok(());
            }
            Some(SessionEvent::Failed(e)) => return send_error(writer, &e).await,
            None => {
                return send_error(writer, &TtsError::internal("synthesis ended without a result")).await;
            }
        }
    }
}

fn audio_start(rate: u32) -> Event {
    Event::new(event_type::AUDIO_START).with_data(json!({
        "rate": rate,
        "width": SAMPLE_WIDTH,
        "channels": 1,
    }))
}

fn audio_chunk(segment: &AudioSegment) -> Event {
    Event::new(event_type::AUDIO_CHUNK)
        .with_data(json!({
            "rate": segment.sample_rate,
            "width": SAMPLE_WIDTH,
            "channels": 1,
            "segment": segment.index,
            "final": segment.is_final,
        }))
        .with_payload(AudioOutput::to_pcm16_le(&segment.samples))
}

async fn send_error<W>(writer: &mut W, err: &TtsError) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut data = json!({ "text": err.to_string(), "code": err.code() });
    if let TtsError::Engine { segment: Some(index), .. } = err {
        data["segment"] = json!(index);
    }
    write_event(writer, &Event::new(event_type::ERROR).with_data(data)).await
}
