use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};
use hound::{SampleFormat, WavSpec, WavWriter};

use crate::dsp::PcmBuffer;

/// Convert a float sample in [-1.0, 1.0] to 16-bit PCM, clamping overshoot.
pub fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Encode PCM as a mono 16-bit WAV (RIFF) file in memory.
pub fn encode_wav(pcm: &PcmBuffer) -> anyhow::Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: pcm.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + pcm.len() * 2));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &s in &pcm.samples {
            writer.write_sample(to_i16(s))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Encode PCM as WAV and return it Base64-encoded, for JSON payloads.
pub fn encode_wav_base64(pcm: &PcmBuffer) -> anyhow::Result<String> {
    Ok(general_purpose::STANDARD.encode(encode_wav(pcm)?))
}
