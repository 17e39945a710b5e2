//! The complex-plane warp family.
//!
//! Each variant is a total function on finite complex inputs. There is no
//! branch-cut handling and no overflow detection: very large outputs land
//! outside the source frame and sample as transparent.

use std::fmt;
use std::str::FromStr;

use num_complex::Complex32;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarpVariant {
    /// z^2
    #[default]
    Square,
    /// z^3
    Cube,
    /// z^4, computed as (z^2)^2
    Quart,
    /// sin(z) = sin(x)cosh(y) + i cos(x)sinh(y)
    SineComplex,
}

impl WarpVariant {
    pub const ALL: [WarpVariant; 4] = [
        WarpVariant::Square,
        WarpVariant::Cube,
        WarpVariant::Quart,
        WarpVariant::SineComplex,
    ];

    /// Map a normalized coordinate through this variant.
    #[inline]
    pub fn apply(self, z: Complex32) -> Complex32 {
        match self {
            Self::Square => square(z),
            Self::Cube => {
                let s = square(z);
                Complex32::new(s.re * z.re - s.im * z.im, s.re * z.im + s.im * z.re)
            }
            Self::Quart => square(square(z)),
            Self::SineComplex => Complex32::new(
                z.re.sin() * z.im.cosh(),
                z.re.cos() * z.im.sinh(),
            ),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Square => "square",
            Self::Cube => "cube",
            Self::Quart => "quart",
            Self::SineComplex => "sine_complex",
        }
    }

    /// Index used by the GPU kernels' uniform block.
    pub fn kernel_index(self) -> u32 {
        match self {
            Self::Square => 0,
            Self::Cube => 1,
            Self::Quart => 2,
            Self::SineComplex => 3,
        }
    }
}

#[inline]
fn square(z: Complex32) -> Complex32 {
    Complex32::new(z.re * z.re - z.im * z.im, 2.0 * z.re * z.im)
}

impl fmt::Display for WarpVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WarpVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "square" | "z2" => Ok(Self::Square),
            "cube" | "z3" => Ok(Self::Cube),
            "quart" | "z4" => Ok(Self::Quart),
            "sine_complex" | "sine" | "sin" => Ok(Self::SineComplex),
            other => Err(format!(
                "unknown warp '{other}'. Valid: square, cube, quart, sine_complex"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn close(a: Complex32, b: Complex32) -> bool {
        (a - b).norm() <= 1e-5 * (1.0 + b.norm())
    }

    #[test]
    fn square_fixes_origin_exactly() {
        let origin = Complex32::new(0.0, 0.0);
        for variant in WarpVariant::ALL {
            assert_eq!(variant.apply(origin), origin, "{variant} must fix 0");
        }
    }

    #[test]
    fn square_matches_formula() {
        let z = Complex32::new(0.5, -0.25);
        assert_eq!(WarpVariant::Square.apply(z), Complex32::new(0.1875, -0.25));
    }

    #[test]
    fn variants_agree_with_complex_arithmetic() {
        let z = Complex32::new(0.7, 0.3);
        assert!(close(WarpVariant::Square.apply(z), z * z));
        assert!(close(WarpVariant::Cube.apply(z), z * z * z));
        assert!(close(WarpVariant::Quart.apply(z), z * z * z * z));
        assert!(close(WarpVariant::SineComplex.apply(z), z.sin()));
    }

    #[test]
    fn unit_circle_stays_on_unit_circle_for_powers() {
        let z = Complex32::from_polar(1.0, 0.4);
        for variant in [WarpVariant::Square, WarpVariant::Cube, WarpVariant::Quart] {
            assert!((variant.apply(z).norm() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn parse_accepts_names_and_aliases() {
        assert_eq!("square".parse::<WarpVariant>(), Ok(WarpVariant::Square));
        assert_eq!("Z3".parse::<WarpVariant>(), Ok(WarpVariant::Cube));
        assert_eq!("sin".parse::<WarpVariant>(), Ok(WarpVariant::SineComplex));
        assert!("z5".parse::<WarpVariant>().is_err());
        for variant in WarpVariant::ALL {
            assert_eq!(variant.to_string().parse::<WarpVariant>(), Ok(variant));
        }
    }

    proptest! {
        #[test]
        fn warps_are_finite_on_the_unit_square(x in -1.5_f32..1.5, y in -1.5_f32..1.5) {
            for variant in WarpVariant::ALL {
                let w = variant.apply(Complex32::new(x, y));
                prop_assert!(w.re.is_finite() && w.im.is_finite());
            }
        }
    }
}
