//! Audio measurement
//!
//! Tracks are never held in memory as a whole: decoded packets are folded
//! into per-block mean power as they arrive, which is all the loudness and
//! energy measurements need.

mod decoder;

pub use decoder::{measure_blocks, MAX_FILE_SIZE};

/// Mean power of consecutive fixed-length blocks of a mono signal
#[derive(Debug, Clone, PartialEq)]
pub struct BlockPowers {
    pub powers: Vec<f64>,
    /// Mono frames folded into the blocks
    pub frames: u64,
    pub sample_rate: u32,
}

impl BlockPowers {
    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }
}

/// Accumulates mono samples into [`BlockPowers`]
#[derive(Debug, Clone)]
pub struct BlockMeter {
    block_len: usize,
    sample_rate: u32,
    sum_sq: f64,
    filled: usize,
    frames: u64,
    powers: Vec<f64>,
}

impl BlockMeter {
    /// Blocks of `block_secs` at `sample_rate`, never shorter than one frame
    pub fn for_rate(sample_rate: u32, block_secs: f64) -> Self {
        Self {
            block_len: ((sample_rate as f64 * block_secs) as usize).max(1),
            sample_rate,
            sum_sq: 0.0,
            filled: 0,
            frames: 0,
            powers: Vec::new(),
        }
    }

    pub fn push(&mut self, sample: f32) {
        let sample = sample as f64;
        self.sum_sq += sample * sample;
        self.filled += 1;
        self.frames += 1;
        if self.filled == self.block_len {
            self.close_block();
        }
    }

    pub fn extend(&mut self, samples: impl IntoIterator<Item = f32>) {
        for sample in samples {
            self.push(sample);
        }
    }

    /// A trailing partial block counts as a block of its own
    pub fn finish(mut self) -> BlockPowers {
        if self.filled > 0 {
            self.close_block();
        }
        BlockPowers {
            powers: self.powers,
            frames: self.frames,
            sample_rate: self.sample_rate,
        }
    }

    fn close_block(&mut self) {
        self.powers.push(self.sum_sq / self.filled as f64);
        self.sum_sq = 0.0;
        self.filled = 0;
    }
}
