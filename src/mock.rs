use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc::Sender;
use tokio::time::{sleep, Duration};

use crate::storage::Sample;

const T_WAVE_DELAY: f64 = 45.0;
const T_WAVE_SIGMA: f64 = 6.0;
const T_WAVE_RATIO: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticBeat {
    /// Sample index of the R-peak.
    pub index: usize,
    pub amplitude: f64,
    /// Width of the Gaussian QRS in samples.
    pub qrs_sigma: f64,
}

/// Deterministic single-lead ECG: a Gaussian QRS plus a smaller, later T
/// wave per beat on a zero baseline, with seeded uniform noise.
#[derive(Debug, Clone)]
pub struct SyntheticEcg {
    sampling_frequency: f64,
    beats: Vec<SyntheticBeat>,
    noise: f64,
    seed: u64,
}

impl SyntheticEcg {
    pub fn new(sampling_frequency: f64) -> Self {
        Self {
            sampling_frequency,
            beats: Vec::new(),
            noise: 2.0,
            seed: 7,
        }
    }

    /// Adds `count` beats every `rr_samples` starting at `start`.
    pub fn regular(mut self, start: usize, count: usize, rr_samples: usize, amplitude: f64) -> Self {
        for k in 0..count {
            self = self.beat(start + k * rr_samples, amplitude);
        }
        self
    }

    pub fn beat(self, index: usize, amplitude: f64) -> Self {
        self.shaped_beat(index, amplitude, 2.6)
    }

    pub fn shaped_beat(mut self, index: usize, amplitude: f64, qrs_sigma: f64) -> Self {
        self.beats.push(SyntheticBeat {
            index,
            amplitude,
            qrs_sigma,
        });
        self
    }

    pub fn noise(mut self, amplitude: f64) -> Self {
        self.noise = amplitude.abs();
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn beats(&self) -> &[SyntheticBeat] {
        &self.beats
    }

    /// Index of the last beat, if any.
    pub fn last_index(&self) -> Option<usize> {
        self.beats.iter().map(|b| b.index).max()
    }

    pub fn timestamp_of(&self, index: usize) -> i64 {
        (index as f64 * 1000.0 / self.sampling_frequency).round() as i64
    }

    pub fn value_at(&self, index: usize) -> f64 {
        let t = index as f64;
        self.beats
            .iter()
            .map(|b| {
                let d = t - b.index as f64;
                let qrs = (-(d * d) / (2.0 * b.qrs_sigma * b.qrs_sigma)).exp();
                let dt = d - T_WAVE_DELAY;
                let t_wave = T_WAVE_RATIO * (-(dt * dt) / (2.0 * T_WAVE_SIGMA * T_WAVE_SIGMA)).exp();
                b.amplitude * (qrs + t_wave)
            })
            .sum()
    }

    pub fn samples(&self, len: usize) -> Vec<Sample> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        (0..len)
            .map(|i| {
                let noise = if self.noise > 0.0 {
                    rng.gen_range(-self.noise..=self.noise)
                } else {
                    0.0
                };
                Sample::new(self.value_at(i) + noise, self.timestamp_of(i))
            })
            .collect()
    }
}

/// Streams `len` samples of `ecg` into an ingest queue, pausing `pace`
/// between chunks of `chunk` samples when given. Stops early if the
/// receiving side goes away.
pub async fn mock_loop(
    sender: Sender<Sample>,
    ecg: SyntheticEcg,
    len: usize,
    chunk: usize,
    pace: Option<Duration>,
) -> usize {
    let mut sent = 0;
    for batch in ecg.samples(len).chunks(chunk.max(1)) {
        for sample in batch {
            if sender.send(*sample).await.is_err() {
                return sent;
            }
            sent += 1;
        }
        if let Some(pace) = pace {
            sleep(pace).await;
        }
    }
    sent
}
