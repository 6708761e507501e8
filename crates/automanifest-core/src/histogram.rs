//! Shape a derived byte stream into a bar histogram for display.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::PlanMode;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum HistogramShape {
    Wave,
    Particle,
}

impl From<PlanMode> for HistogramShape {
    fn from(mode: PlanMode) -> Self {
        match mode {
            PlanMode::WaveAligned => Self::Wave,
            PlanMode::ParticleAligned => Self::Particle,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Histogram {
    pub shape: HistogramShape,
    pub bins: Vec<u64>,
}

impl Histogram {
    /// Bar heights scaled so the tallest bin reaches `height`.
    #[must_use]
    pub fn scaled(&self, height: u64) -> Vec<u64> {
        let max = self.bins.iter().copied().max().unwrap_or(1).max(1);
        self.bins.iter().map(|value| value.saturating_mul(height) / max).collect()
    }
}

/// Accumulate `bytes` into `bins` buckets.
///
/// Wave spreads every byte over an interference pattern indexed by position;
/// particle drops each byte near one of two centers chosen by its low bit.
#[must_use]
pub fn histogram(bytes: &[u8], bins: usize, shape: HistogramShape) -> Histogram {
    let mut hist = vec![0_u64; bins];
    if bins == 0 {
        return Histogram { shape, bins: hist };
    }

    match shape {
        HistogramShape::Wave => {
            #[allow(clippy::cast_precision_loss)]
            let width = bins as f64;
            for (index, byte) in bytes.iter().enumerate() {
                let slot = index % bins;
                #[allow(clippy::cast_precision_loss)]
                let x = slot as f64 / width;
                let phase = f64::from(*byte) / 255.0 * 2.0 * PI;
                let value = 0.5 * (1.0 + (2.0 * PI * x * 6.0 + phase).sin())
                    + 0.3 * (1.0 + (2.0 * PI * x * 11.0 + phase).sin());
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let weight = (value * 10.0) as u64;
                hist[slot] += weight;
            }
        }
        HistogramShape::Particle => {
            let last = i64::try_from(bins - 1).unwrap_or(i64::MAX);
            let left_center = i64::try_from(bins / 4).unwrap_or(0);
            let right_center = i64::try_from(3 * bins / 4).unwrap_or(last);
            for byte in bytes {
                let center = if byte & 1 == 0 { left_center } else { right_center };
                let spread = i64::from(byte % 12) - 6;
                let slot = (center + spread).clamp(0, last);
                let slot = usize::try_from(slot).unwrap_or(0);
                hist[slot] += 10;
            }
        }
    }

    Histogram { shape, bins: hist }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_bins_yield_empty_histogram() {
        assert!(histogram(&[1, 2, 3], 0, HistogramShape::Wave).bins.is_empty());
        assert!(histogram(&[1, 2, 3], 0, HistogramShape::Particle).bins.is_empty());
    }

    #[test]
    fn particle_bytes_land_around_two_centers() {
        // 0: even, spread -6 -> 16 - 6; 7: odd, spread 1 -> 48 + 1
        let hist = histogram(&[0, 7], 64, HistogramShape::Particle);
        assert_eq!(hist.bins[10], 10);
        assert_eq!(hist.bins[49], 10);
        assert_eq!(hist.bins.iter().sum::<u64>(), 20);
    }

    #[test]
    fn particle_slots_are_clamped() {
        let hist = histogram(&[0, 1, 11], 4, HistogramShape::Particle);
        assert_eq!(hist.bins, vec![20, 0, 0, 10]);
    }

    #[test]
    fn wave_weights_stay_within_bounds() {
        let bytes = (0..=255_u8).cycle().take(4_096).collect::<Vec<_>>();
        let hist = histogram(&bytes, 32, HistogramShape::Wave);
        // Each byte adds at most trunc(10 * 1.6) = 16.
        let per_slot = 4_096 / 32;
        assert!(hist.bins.iter().all(|value| *value <= 16 * per_slot));
        assert!(hist.bins.iter().any(|value| *value > 0));
    }

    #[test]
    fn scaled_bars_top_out_at_height() {
        let hist = Histogram { shape: HistogramShape::Wave, bins: vec![0, 5, 10] };
        assert_eq!(hist.scaled(8), vec![0, 4, 8]);
        let empty = Histogram { shape: HistogramShape::Wave, bins: vec![0, 0] };
        assert_eq!(empty.scaled(8), vec![0, 0]);
    }

    #[test]
    fn plan_modes_map_to_shapes() {
        assert_eq!(HistogramShape::from(PlanMode::WaveAligned), HistogramShape::Wave);
        assert_eq!(HistogramShape::from(PlanMode::ParticleAligned), HistogramShape::Particle);
    }
}
