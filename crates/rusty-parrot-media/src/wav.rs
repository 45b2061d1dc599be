//! WAV container adapter.
//!
//! Decodes arbitrary PCM/float WAV files into the internal mono 24 kHz
//! PCM16 representation and wraps translated PCM back into WAV.

use std::io::{Cursor, Read};
use std::path::Path;

use tracing::debug;

use rusty_parrot_core::{ParrotError, Result};

use crate::pcm::{SAMPLE_RATE, downmix, resample, samples_to_bytes};

fn decode_error(e: hound::Error) -> ParrotError {
    ParrotError::Decode(format!("Failed to parse WAV data: {e}"))
}

/// Decode WAV data from any reader into mono 24 kHz PCM16 bytes.
pub fn decode_wav<R: Read>(reader: R) -> Result<Vec<u8>> {
    let mut wav_reader = hound::WavReader::new(reader).map_err(decode_error)?;
    let spec = wav_reader.spec();

    let interleaved: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => wav_reader
            .samples::<i16>()
            .collect::<std::result::Result<_, _>>()
            .map_err(decode_error)?,
        (hound::SampleFormat::Int, bits) => {
            let shift = bits as i32 - 16;
            wav_reader
                .samples::<i32>()
                .map(|s| {
                    s.map(|v| {
                        if shift >= 0 {
                            (v >> shift) as i16
                        } else {
                            (v << -shift) as i16
                        }
                    })
                })
                .collect::<std::result::Result<_, _>>()
                .map_err(decode_error)?
        }
        (hound::SampleFormat::Float, _) => wav_reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * 32767.0) as i16))
            .collect::<std::result::Result<_, _>>()
            .map_err(decode_error)?,
    };

    let mono = downmix(&interleaved, spec.channels);
    let samples = resample(&mono, spec.sample_rate, SAMPLE_RATE);

    debug!(
        source_rate = spec.sample_rate,
        channels = spec.channels,
        bits = spec.bits_per_sample,
        samples = samples.len(),
        "Decoded WAV input"
    );

    Ok(samples_to_bytes(&samples))
}

/// Read a WAV file from disk into mono 24 kHz PCM16 bytes.
pub fn read_wav_file(path: &Path) -> Result<Vec<u8>> {
    let file = std::fs::File::open(path)?;
    decode_wav(std::io::BufReader::new(file))
}

/// Wrap mono 24 kHz PCM16 bytes in a WAV container.
pub fn encode_wav(pcm: &[u8]) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + pcm.len()));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(decode_error)?;
        for chunk in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))
                .map_err(decode_error)?;
        }
        writer.finalize().map_err(decode_error)?;
    }
    Ok(cursor.into_inner())
}

/// Write mono 24 kHz PCM16 bytes to a WAV file.
pub fn write_wav_file(path: &Path, pcm: &[u8]) -> Result<()> {
    let wav = encode_wav(pcm)?;
    std::fs::write(path, wav)?;
    Ok(())
}
