//! Small buffer kernels used by signal port processing.

pub fn fill(dst: &mut [f32], value: f32) {
    dst.fill(value);
}

/// `dst += src`
pub fn add2(dst: &mut [f32], src: &[f32]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d += *s;
    }
}

/// `dst += src * gain`
pub fn mix2(dst: &mut [f32], src: &[f32], gain: f32) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d += *s * gain;
    }
}

pub fn abs_max(buf: &[f32]) -> f32 {
    buf.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()))
}

/// Clamps every sample into `[min, max]`.
pub fn limit(buf: &mut [f32], min: f32, max: f32) {
    for s in buf.iter_mut() {
        *s = s.clamp(min, max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixes_and_limits() {
        let mut dst = [0.5_f32, -0.5, 1.0];
        mix2(&mut dst, &[1.0, 1.0, 1.0], 2.0);
        assert_eq!(dst, [2.5, 1.5, 3.0]);
        assert_eq!(abs_max(&[0.1, -3.0, 2.0]), 3.0);
        limit(&mut dst, -2.0, 2.0);
        assert_eq!(dst, [2.0, 1.5, 2.0]);
        add2(&mut dst, &[-1.0, -1.0]);
        assert_eq!(dst, [1.0, 0.5, 2.0]);
    }
}
