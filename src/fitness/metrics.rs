//─────────────────────────────────────────────────────────────────────────────
// resolution-invariant metrics (MSE, RMSE, PSNR) for progress reporting
//─────────────────────────────────────────────────────────────────────────────

/// number of channels the difference is summed over (RGB)
pub const FITNESS_CHANNELS_F64: f64 = 3.0;

/// peak value for 8-bit channels
pub const PSNR_PEAK: f64 = 255.0;

/// PSNR (peak signal-to-noise ratio) in decibels.
/// higher PSNR = better quality. typical ranges:
///   - 30 dB = acceptable
///   - 35 dB = good
///   - 40+ dB = very good
#[inline]
pub fn psnr_from_mse(mse: f64, peak: f64) -> f64 {
    let mse = mse.max(1e-12);
    10.0 * ((peak * peak) / mse).log10()
}

/// snapshot of metrics derived from a squared-error difference
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub mse: f64,
    pub rmse: f64,
    pub psnr: f64,
}

impl MetricsSnapshot {
    #[inline]
    pub fn from_difference(difference: u64, num_pixels: usize) -> Self {
        let n = (num_pixels.max(1) as f64) * FITNESS_CHANNELS_F64;
        let mse = difference as f64 / n;
        Self {
            mse,
            rmse: mse.sqrt(),
            psnr: psnr_from_mse(mse, PSNR_PEAK),
        }
    }
}
