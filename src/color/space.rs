//! Color space conversions on normalised `[0, 1]` RGB triples.

use palette::{FromColor, Hsv, IntoColor, Lab, LinSrgb, Srgb};

/// Convert RGB to HSV. Hue is in `[0, 1)`.
pub fn rgb_to_hsv([r, g, b]: [f32; 3]) -> [f32; 3] {
    let hsv: Hsv = Hsv::from_color(Srgb::new(r, g, b));
    let hue = (hsv.hue.into_positive_degrees() / 360.0).rem_euclid(1.0);
    [hue, hsv.saturation, hsv.value]
}

/// Convert HSV to RGB. Hue wraps modulo 1.
pub fn hsv_to_rgb([h, s, v]: [f32; 3]) -> [f32; 3] {
    let hsv: Hsv = Hsv::new(h.rem_euclid(1.0) * 360.0, s, v);
    let rgb: Srgb = Srgb::from_color(hsv);
    [rgb.red, rgb.green, rgb.blue]
}

/// Convert sRGB to CIE-LAB (D65, 2° observer).
///
/// L is in `[0, 100]`, a and b roughly in `[-128, 127]`.
pub fn rgb_to_lab([r, g, b]: [f32; 3]) -> [f32; 3] {
    let linear: LinSrgb = Srgb::new(r, g, b).into_linear();
    let lab: Lab = Lab::from_color(linear);
    [lab.l, lab.a, lab.b]
}

/// Convert CIE-LAB (D65) back to sRGB, clipped to `[0, 1]`.
pub fn lab_to_rgb([l, a, b]: [f32; 3]) -> [f32; 3] {
    let linear: LinSrgb = Lab::new(l, a, b).into_color();
    let rgb: Srgb = Srgb::from_linear(linear);
    [rgb.red, rgb.green, rgb.blue].map(|c| c.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: [f32; 3], b: [f32; 3], tol: f32) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= tol)
    }

    #[test]
    fn hsv_primaries() {
        assert!(close(rgb_to_hsv([1.0, 0.0, 0.0]), [0.0, 1.0, 1.0], 1e-5));
        assert!(close(rgb_to_hsv([0.0, 1.0, 0.0]), [1.0 / 3.0, 1.0, 1.0], 1e-5));
        assert!(close(rgb_to_hsv([0.0, 0.0, 0.5]), [2.0 / 3.0, 1.0, 0.5], 1e-5));
        assert!(close(rgb_to_hsv([0.4, 0.4, 0.4]), [0.0, 0.0, 0.4], 1e-5));
    }

    #[test]
    fn hsv_hue_wraps() {
        let base = hsv_to_rgb([0.05, 0.5, 0.8]);
        let wrapped = hsv_to_rgb([1.05, 0.5, 0.8]);
        let negative = hsv_to_rgb([-0.95, 0.5, 0.8]);
        assert!(close(base, wrapped, 1e-4));
        assert!(close(base, negative, 1e-4));
    }

    #[test]
    fn hsv_inverts() {
        for rgb in [[0.9, 0.2, 0.1], [0.1, 0.6, 0.3], [0.25, 0.3, 0.95]] {
            assert!(close(hsv_to_rgb(rgb_to_hsv(rgb)), rgb, 1e-4));
        }
    }

    #[test]
    fn lab_reference_values() {
        assert!(close(rgb_to_lab([1.0, 1.0, 1.0]), [100.0, 0.0, 0.0], 0.05));
        assert!(close(rgb_to_lab([0.0, 0.0, 0.0]), [0.0, 0.0, 0.0], 1e-3));
        let red = rgb_to_lab([1.0, 0.0, 0.0]);
        assert!((red[0] - 53.24).abs() < 0.1);
        assert!((red[1] - 80.09).abs() < 0.2);
        assert!((red[2] - 67.20).abs() < 0.2);
    }

    #[test]
    fn lab_clips_out_of_gamut() {
        let rgb = lab_to_rgb([50.0, 120.0, -120.0]);
        assert!(rgb.iter().all(|c| (0.0..=1.0).contains(c)));
    }

    #[test]
    fn lab_inverts() {
        for rgb in [[0.9, 0.2, 0.1], [0.1, 0.6, 0.3], [0.5, 0.5, 0.5]] {
            assert!(close(lab_to_rgb(rgb_to_lab(rgb)), rgb, 1e-3));
        }
    }
}
