use base64::Engine;
use ringbuf::HeapRb;
use rubato::{FastFixedIn, PolynomialDegree};

/// Sample rate the realtime endpoint works at, in hertz.
pub const REALTIME_PCM16_SAMPLE_RATE: f64 = 24_000.0;

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// Splits samples into fixed-size chunks, zero-padding the final one.
pub fn split_for_chunks(samples: &[f32], chunk_size: usize) -> Vec<Vec<f32>> {
    samples
        .chunks(chunk_size)
        .map(|chunk| {
            let mut chunk = chunk.to_vec();
            chunk.resize(chunk_size, 0.0);
            chunk
        })
        .collect()
}

/// Creates a heap-allocated ring buffer for playback audio.
pub fn shared_buffer(size: usize) -> HeapRb<f32> {
    HeapRb::new(size)
}

/// Decodes a base64 PCM16 fragment into normalized f32 samples.
pub fn decode(base64_fragment: &str) -> Vec<f32> {
    if let Ok(pcm16) = base64::engine::general_purpose::STANDARD.decode(base64_fragment) {
        pcm16
            .chunks_exact(2)
            .map(|chunk| {
                let v = i16::from_le_bytes([chunk[0], chunk[1]]);
                (v as f32 / 32768.0).clamp(-1.0, 1.0)
            })
            .collect()
    } else {
        tracing::error!("Failed to decode base64 fragment");
        Vec::new()
    }
}

/// Encodes f32 samples as base64 little-endian PCM16.
pub fn encode(pcm32: &[f32]) -> String {
    let pcm16: Vec<u8> = pcm32.to_binary();
    base64::engine::general_purpose::STANDARD.encode(&pcm16)
}

/// Encodes i16 samples as base64 little-endian PCM16.
pub fn encode_i16(pcm16: &[i16]) -> String {
    let pcm16: Vec<u8> = pcm16.to_binary();
    base64::engine::general_purpose::STANDARD.encode(&pcm16)
}

/// Converts f32 samples to i16 PCM.
pub fn convert_f32_to_i16(pcm32: &[f32]) -> Vec<i16> {
    pcm32
        .iter()
        .map(|&sample| (sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Converts i16 PCM samples to normalized f32.
pub fn convert_i16_to_f32(pcm16: &[i16]) -> Vec<f32> {
    pcm16
        .iter()
        .map(|&sample| sample as f32 / 32768.0)
        .collect()
}

/// Converting audio sample slices to their little-endian byte representation.
pub trait ToBinary {
    fn to_binary(&self) -> Vec<u8>;
}

impl ToBinary for [i16] {
    fn to_binary(&self) -> Vec<u8> {
        self.iter()
            .flat_map(|&sample| sample.to_le_bytes().to_vec())
            .collect()
    }
}

impl ToBinary for [f32] {
    fn to_binary(&self) -> Vec<u8> {
        self.iter()
            .flat_map(|&sample| {
                let v = (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                v.to_le_bytes().to_vec()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip_preserves_samples() {
        let samples: Vec<f32> = vec![0.0, 0.25, -0.25, 0.5, -0.5];
        let encoded = encode(&samples);
        let decoded = decode(&encoded);

        assert_eq!(decoded.len(), samples.len());
        for (before, after) in samples.iter().zip(decoded.iter()) {
            // One i16 quantization step of tolerance.
            assert!((before - after).abs() < 1.0 / 32768.0 * 2.0);
        }
    }

    #[test]
    fn decode_of_invalid_base64_is_empty() {
        assert!(decode("not base64!!!").is_empty());
    }

    #[test]
    fn split_for_chunks_pads_the_tail() {
        let samples = vec![1.0_f32; 5];
        let chunks = split_for_chunks(&samples, 4);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], vec![1.0; 4]);
        assert_eq!(chunks[1], vec![1.0, 0.0, 0.0, 0.0]);
    }
}
