use rand::Rng;

use crate::dataset::Sample;

pub const MIN_INTENSITY: f64 = 0.0;
pub const MAX_INTENSITY: f64 = 5.0;

/// Perturbs the noisy channels of `sample` with uniform jitter in `±intensity / 2`.
///
/// Recorded noisy readings are used as the base when present, otherwise ground truth.
/// Every other field passes through untouched.
pub fn inject<R: Rng + ?Sized>(sample: &Sample, intensity: f64, rng: &mut R) -> Sample {
    let base_x = sample.noisy_x.unwrap_or(sample.truth_x);
    let base_y = sample.noisy_y.unwrap_or(sample.truth_y);

    Sample {
        noisy_x: Some(base_x + jitter(rng) * intensity),
        noisy_y: Some(base_y + jitter(rng) * intensity),
        ..sample.clone()
    }
}

fn jitter<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.gen::<f64>() - 0.5
}

pub fn clamp_intensity(intensity: f64) -> f64 {
    intensity.clamp(MIN_INTENSITY, MAX_INTENSITY)
}
