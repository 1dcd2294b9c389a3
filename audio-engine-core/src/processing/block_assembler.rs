use crate::models::audio_models::{AudioBuffer, AudioFormat, AudioTime};

/// Re-blocks variable-size device callbacks into fixed-size tap buffers.
///
/// Devices deliver input in whatever period size they negotiated; the tap
/// contract is one [`AudioBuffer`] per `block_frames` frames, each stamped
/// with its frame position since the tap was installed.
#[derive(Debug)]
pub struct BlockAssembler {
    format: AudioFormat,
    block_frames: usize,
    pending: Vec<f32>,
    frames_emitted: u64,
}

impl BlockAssembler {
    pub fn new(format: AudioFormat, block_frames: usize) -> Self {
        let block_frames = block_frames.max(1);
        Self {
            format,
            block_frames,
            pending: Vec::with_capacity(format.samples_for_frames(block_frames) * 2),
            frames_emitted: 0,
        }
    }

    /// Append interleaved samples and emit every completed block.
    ///
    /// Trailing samples that do not form a whole frame stay pending.
    pub fn push(&mut self, samples: &[f32], mut emit: impl FnMut(AudioBuffer)) {
        self.pending.extend_from_slice(samples);

        let block_len = self.format.samples_for_frames(self.block_frames);
        if block_len == 0 {
            self.pending.clear();
            return;
        }

        while self.pending.len() >= block_len {
            let block: Vec<f32> = self.pending.drain(..block_len).collect();
            let time = AudioTime::new(self.frames_emitted, self.format.sample_rate);
            self.frames_emitted += self.block_frames as u64;
            emit(AudioBuffer::new(block, self.format, time));
        }
    }

    /// Frames waiting for a full block.
    pub fn pending_frames(&self) -> usize {
        match self.format.channels {
            0 => 0,
            ch => self.pending.len() / ch as usize,
        }
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.frames_emitted = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_only_full_blocks() {
        let mut assembler = BlockAssembler::new(AudioFormat::new(48000, 1), 4);
        let mut blocks = Vec::new();

        assembler.push(&[1.0, 2.0, 3.0], |b| blocks.push(b));
        assert!(blocks.is_empty());
        assert_eq!(assembler.pending_frames(), 3);

        assembler.push(&[4.0, 5.0], |b| blocks.push(b));
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].samples, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(assembler.pending_frames(), 1);
    }

    #[test]
    fn large_callbacks_split_into_several_blocks() {
        let mut assembler = BlockAssembler::new(AudioFormat::new(48000, 2), 2);
        let mut blocks = Vec::new();

        let samples: Vec<f32> = (0..12).map(|i| i as f32).collect();
        assembler.push(&samples, |b| blocks.push(b));

        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[2].samples, vec![8.0, 9.0, 10.0, 11.0]);
        assert!(blocks.iter().all(|b| b.frame_count() == 2));
    }

    #[test]
    fn timestamps_advance_by_block() {
        let mut assembler = BlockAssembler::new(AudioFormat::new(16000, 1), 3);
        let mut times = Vec::new();

        assembler.push(&[0.0; 9], |b| times.push(b.time.sample_time));
        assert_eq!(times, vec![0, 3, 6]);
        assert_eq!(assembler.frames_emitted(), 9);
    }

    #[test]
    fn reset_restarts_timeline() {
        let mut assembler = BlockAssembler::new(AudioFormat::new(16000, 1), 2);
        assembler.push(&[0.0; 3], |_| {});
        assembler.reset();

        assert_eq!(assembler.pending_frames(), 0);
        let mut first = None;
        assembler.push(&[0.0; 2], |b| first = Some(b.time.sample_time));
        assert_eq!(first, Some(0));
    }
}
