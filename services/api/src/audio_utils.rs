//! Telephony ↔ realtime audio conversion.
//!
//! The telephony leg speaks 8kHz G.711 μ-law, the realtime leg 24kHz PCM16
//! little-endian, both base64 wrapped. Every function here is pure and works
//! on one frame at a time; no state is carried between frames, so chunk
//! boundaries are resampled independently.

use base64::Engine;

pub const TELEPHONY_SAMPLE_RATE: u32 = 8000;
pub const OPENAI_REALTIME_API_PCM16_SAMPLE_RATE: u32 = 24000;

const RESAMPLE_FACTOR: usize = (OPENAI_REALTIME_API_PCM16_SAMPLE_RATE / TELEPHONY_SAMPLE_RATE) as usize;
const MULAW_BIAS: i32 = 0x84;
const MULAW_CLIP: i32 = 32635;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid base64 audio payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("audio frame too short to convert ({0} bytes)")]
    FrameTooShort(usize),
}

const fn build_decode_table() -> [i16; 256] {
    let mut table = [0i16; 256];
    let mut i = 0;
    while i < 256 {
        let mu = !(i as u8);
        let exponent = ((mu >> 4) & 0x07) as i32;
        let mantissa = (mu & 0x0F) as i32;
        let magnitude = (((mantissa << 1) + 33) << (exponent + 2)) - MULAW_BIAS;
        table[i] = if mu & 0x80 != 0 {
            (-magnitude) as i16
        } else {
            magnitude as i16
        };
        i += 1;
    }
    table
}

/// Segment number for `(biased_magnitude >> 7) & 0xFF`: the position of the
/// highest set bit, 0 for both 0 and 1.
const fn build_segment_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 2;
    while i < 256 {
        table[i] = (7 - (i as u8).leading_zeros()) as u8;
        i += 1;
    }
    table
}

static MULAW_DECODE_TABLE: [i16; 256] = build_decode_table();
static MULAW_SEGMENT_TABLE: [u8; 256] = build_segment_table();

/// Expands one μ-law byte to a linear sample.
pub fn mulaw_to_linear(byte: u8) -> i16 {
    MULAW_DECODE_TABLE[byte as usize]
}

/// Compresses one linear sample to a μ-law byte.
pub fn linear_to_mulaw(sample: i16) -> u8 {
    let mut pcm = sample as i32;
    let sign = (pcm >> 8) & 0x80;
    if sign != 0 {
        pcm = -pcm;
    }
    pcm = (pcm + MULAW_BIAS).min(MULAW_CLIP);
    let exponent = MULAW_SEGMENT_TABLE[((pcm >> 7) & 0xFF) as usize] as i32;
    let mantissa = (pcm >> (exponent + 3)) & 0x0F;
    !((sign | (exponent << 4) | mantissa) as u8)
}

pub fn mulaw_to_pcm16(mulaw: &[u8]) -> Vec<i16> {
    mulaw.iter().map(|&b| mulaw_to_linear(b)).collect()
}

pub fn pcm16_to_mulaw(pcm16: &[i16]) -> Vec<u8> {
    pcm16.iter().map(|&s| linear_to_mulaw(s)).collect()
}

/// Triples the sample rate by linear interpolation between neighbours.
///
/// The last sample has no forward neighbour and is repeated three times.
pub fn upsample3x(input: &[i16]) -> Vec<i16> {
    let mut output = Vec::with_capacity(input.len() * RESAMPLE_FACTOR);
    for pair in input.windows(2) {
        let (s0, s1) = (f64::from(pair[0]), f64::from(pair[1]));
        output.push(pair[0]);
        output.push((s0 + (s1 - s0) / 3.0).round() as i16);
        output.push((s0 + 2.0 * (s1 - s0) / 3.0).round() as i16);
    }
    if let Some(&last) = input.last() {
        output.extend_from_slice(&[last; RESAMPLE_FACTOR]);
    }
    output
}

/// Divides the sample rate by three, keeping every third sample from index 0.
pub fn downsample3x(input: &[i16]) -> Vec<i16> {
    input
        .iter()
        .step_by(RESAMPLE_FACTOR)
        .take(input.len() / RESAMPLE_FACTOR)
        .copied()
        .collect()
}

pub fn encode_i16(pcm16: &[i16]) -> String {
    let pcm16_bytes: Vec<u8> = pcm16
        .iter()
        .flat_map(|&sample| sample.to_le_bytes())
        .collect();
    base64::engine::general_purpose::STANDARD.encode(&pcm16_bytes)
}

/// Decodes base64 PCM16 LE. An orphaned trailing byte is dropped.
pub fn decode_i16(base64_fragment: &str) -> Result<Vec<i16>, CodecError> {
    let pcm16_bytes = base64::engine::general_purpose::STANDARD.decode(base64_fragment)?;
    Ok(pcm16_bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect())
}

/// Telephony media payload → realtime `input_audio_buffer.append` payload.
pub fn telephony_to_ai_leg(base64_mulaw: &str) -> Result<String, CodecError> {
    let mulaw = base64::engine::general_purpose::STANDARD.decode(base64_mulaw)?;
    if mulaw.is_empty() {
        return Err(CodecError::FrameTooShort(0));
    }
    let pcm_24k = upsample3x(&mulaw_to_pcm16(&mulaw));
    Ok(encode_i16(&pcm_24k))
}

/// Realtime `response.audio.delta` payload → telephony media payload.
pub fn ai_leg_to_telephony(base64_pcm16: &str) -> Result<String, CodecError> {
    let pcm_24k = decode_i16(base64_pcm16)?;
    let pcm_8k = downsample3x(&pcm_24k);
    if pcm_8k.is_empty() {
        return Err(CodecError::FrameTooShort(pcm_24k.len() * 2));
    }
    Ok(base64::engine::general_purpose::STANDARD.encode(pcm16_to_mulaw(&pcm_8k)))
}
