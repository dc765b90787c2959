//! WAV renderer. Encodes rendered exercise audio as 16-bit stereo PCM.

use std::io;
use std::path::Path;

use super::mixer::AudioBuffer;

/// Quantize interleaved f32 samples to i16.
pub fn to_pcm_i16(buffer: &AudioBuffer) -> Vec<i16> {
    buffer
        .samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16)
        .collect()
}

/// Render a buffer to a WAV file as bytes.
pub fn render_wav(buffer: &AudioBuffer) -> Vec<u8> {
    encode_wav(&to_pcm_i16(buffer), buffer.sample_rate, 2)
}

/// Render a buffer and write it to `path`.
pub fn write_wav(path: &Path, buffer: &AudioBuffer) -> io::Result<()> {
    std::fs::write(path, render_wav(buffer))
}

/// Encode interleaved i16 PCM samples to a WAV byte buffer.
fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    let bits_per_sample: u16 = 16;
    let byte_rate = sample_rate * channels as u32 * (bits_per_sample as u32 / 8);
    let block_align = channels * (bits_per_sample / 8);
    let data_size = (samples.len() * 2) as u32;
    let file_size = 36 + data_size;

    let mut buf = Vec::with_capacity(44 + data_size as usize);

    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    // fmt chunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&bits_per_sample.to_le_bytes());

    // data chunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for &sample in samples {
        buf.extend_from_slice(&sample.to_le_bytes());
    }

    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::chain::{ToneSpec, render_tone};

    #[test]
    fn wav_header_valid() {
        let tone = render_tone(&ToneSpec::sine(440.0, 0.25), 44100).unwrap();
        let wav = render_wav(&tone);

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");

        let sr = u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]);
        assert_eq!(sr, 44100);
        let ch = u16::from_le_bytes([wav[22], wav[23]]);
        assert_eq!(ch, 2);
    }

    #[test]
    fn wav_size_correct() {
        let silence = AudioBuffer::silence(22050, 11025);
        let wav = render_wav(&silence);

        // 11025 frames * 2 channels * 2 bytes
        let data_size = u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]);
        assert_eq!(data_size, 44100);
        assert_eq!(wav.len(), 44 + 44100);
    }

    #[test]
    fn quantization_saturates() {
        let buf = AudioBuffer {
            sample_rate: 8000,
            samples: vec![1.0, -1.0, 2.0, 0.0],
        };
        assert_eq!(to_pcm_i16(&buf), vec![i16::MAX, -i16::MAX, i16::MAX, 0]);
    }

    #[test]
    fn writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let tone = render_tone(&ToneSpec::sine(220.0, 0.1), 8000).unwrap();
        write_wav(&path, &tone).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 44 + tone.samples.len() * 2);
    }
}
