//! Streaming block measurement with symphonia
//!
//! Packets are decoded one at a time, downmixed and folded into a
//! [`BlockMeter`] at the file's native rate. Loudness is rate-independent,
//! so nothing is resampled.

use super::{BlockMeter, BlockPowers};
use crate::error::AnalysisError;
use std::path::Path;
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{CodecParameters, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, trace};

/// Files above 2 GB are refused before probing
pub const MAX_FILE_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Decode `path` and measure the mean power of each `block_secs` block
pub fn measure_blocks(path: &Path, block_secs: f64) -> Result<BlockPowers, AnalysisError> {
    let (mut format, track_id, params) = open_audio_track(path)?;
    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| AnalysisError::decode(path, format!("Failed to create decoder: {}", e)))?;

    let mut meter: Option<BlockMeter> = None;
    let mut scratch: Option<(SignalSpec, SampleBuffer<f32>)> = None;
    let mut skipped = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(AnalysisError::decode(path, format!("Failed to read packet: {}", e))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                trace!("Skipping undecodable packet in {}: {}", path.display(), e);
                skipped += 1;
                continue;
            }
            Err(e) => return Err(AnalysisError::decode(path, format!("Decode error: {}", e))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let needed = decoded.frames() * channels;
        // one scratch buffer serves every packet of the same shape
        if !matches!(&scratch, Some((held, buf)) if *held == spec && buf.capacity() >= needed) {
            scratch = None;
        }
        let frames = decoded.capacity().max(decoded.frames()) as u64;
        let (_, buf) = scratch.get_or_insert_with(|| (spec, SampleBuffer::new(frames, spec)));
        buf.copy_interleaved_ref(decoded);

        let meter = meter.get_or_insert_with(|| BlockMeter::for_rate(spec.rate, block_secs));
        meter.extend(
            buf.samples()
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
    }

    let blocks = match meter {
        Some(meter) => meter.finish(),
        None => return Err(AnalysisError::decode(path, "File contains no audio samples")),
    };
    if blocks.is_empty() {
        return Err(AnalysisError::decode(path, "File contains no audio samples"));
    }
    if skipped > 0 {
        debug!("{}: skipped {} undecodable packets", path.display(), skipped);
    }
    debug!(
        "Measured {} blocks ({:.2}s @ {}Hz) from {}",
        blocks.powers.len(),
        blocks.duration(),
        blocks.sample_rate,
        path.display()
    );
    Ok(blocks)
}

/// Probe the file and pick its first audio track
fn open_audio_track(path: &Path) -> Result<(Box<dyn FormatReader>, u32, CodecParameters), AnalysisError> {
    let size = std::fs::metadata(path)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AnalysisError::FileNotFound(path.to_path_buf()),
            _ => AnalysisError::decode(path, format!("Failed to read file metadata: {}", e)),
        })?
        .len();
    if size > MAX_FILE_SIZE {
        return Err(AnalysisError::decode(
            path,
            format!("File too large ({:.1} GB), the limit is 2 GB", size as f64 / 1024f64.powi(3)),
        ));
    }

    let file = std::fs::File::open(path)
        .map_err(|e| AnalysisError::decode(path, format!("Failed to open file: {}", e)))?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    let extension = path.extension().and_then(|e| e.to_str());
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, stream, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AnalysisError::Unsupported {
            path: path.to_path_buf(),
            format: format!("{} ({})", extension.unwrap_or("unknown"), e),
        })?;

    let format = probed.format;
    let (track_id, params) = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .map(|t| (t.id, t.codec_params.clone()))
        .ok_or_else(|| AnalysisError::decode(path, "No audio tracks found"))?;
    Ok((format, track_id, params))
}
