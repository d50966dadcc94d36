use std::io::Cursor;

/// Wrap raw little-endian 16-bit mono PCM in a RIFF/WAVE container.
///
/// A trailing odd byte (half a sample) is dropped.
pub fn pcm16_to_wav(pcm: &[u8], sample_rate: u32) -> anyhow::Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + pcm.len()));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for sample in pcm.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([sample[0], sample[1]]))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Playback length of raw 16-bit mono PCM.
pub fn pcm16_duration_ms(pcm_len: usize, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    (pcm_len / 2) as u64 * 1000 / sample_rate as u64
}
