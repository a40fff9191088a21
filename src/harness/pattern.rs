use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{configuration_error, Result};
use crate::matrix::{Element, SquareMatrix};

/// Seed of [`TestPattern::Static`].
pub const STATIC_SEED: u64 = 38;

/// Value of every cell in the constant patterns.
pub const CONSTANT_VALUE: f64 = 5.0;

/// The single off-diagonal value that breaks symmetry in [`TestPattern::Worst`].
pub const WORST_CASE_VALUE: f64 = 3.0;

/// Test matrix generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPattern {
    /// Random two-decimal values in `[0, 99.99]`, seeded from the OS.
    Random,
    /// Same distribution as `Random` with a fixed seed.
    Static,
    /// Every cell is 5.0.
    Symmetric,
    /// Every cell is 5.0 except `M[n-2][n-1] = 3.0`: the only mismatch sits in
    /// the last pair any lower-triangle scan reaches.
    Worst,
}

impl TestPattern {
    pub const ALL: [TestPattern; 4] = [
        TestPattern::Random,
        TestPattern::Static,
        TestPattern::Symmetric,
        TestPattern::Worst,
    ];

    /// # Errors
    ///
    /// `ConfigurationError` for an id outside `0..=3`.
    pub fn from_id(id: u32) -> Result<Self> {
        Self::ALL.get(id as usize).copied().ok_or_else(|| {
            configuration_error(format!(
                "invalid test {id}: it has to be 0 (random), 1 (static), 2 (symmetric) or 3 (worst case)"
            ))
        })
    }

    pub fn id(self) -> u32 {
        match self {
            TestPattern::Random => 0,
            TestPattern::Static => 1,
            TestPattern::Symmetric => 2,
            TestPattern::Worst => 3,
        }
    }

    /// Overwrites every cell of `m` with this pattern.
    pub fn fill<T: Element>(self, m: &mut SquareMatrix<T>) {
        match self {
            TestPattern::Random => fill_two_decimals(m, &mut StdRng::from_os_rng()),
            TestPattern::Static => fill_two_decimals(m, &mut StdRng::seed_from_u64(STATIC_SEED)),
            TestPattern::Symmetric => m.fill(T::from_f64(CONSTANT_VALUE)),
            TestPattern::Worst => {
                let n = m.dim();
                m.fill(T::from_f64(CONSTANT_VALUE));
                if n >= 2 {
                    m.set(n - 2, n - 1, T::from_f64(WORST_CASE_VALUE));
                }
            }
        }
    }
}

impl fmt::Display for TestPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TestPattern::Random => "random",
            TestPattern::Static => "static",
            TestPattern::Symmetric => "symmetric",
            TestPattern::Worst => "worst case",
        };
        write!(f, "{} ({name})", self.id())
    }
}

fn fill_two_decimals<T: Element, R: Rng>(m: &mut SquareMatrix<T>, rng: &mut R) {
    m.fill_with(|_, _| T::from_f64(f64::from(rng.random_range(0..=9999u32)) / 100.0));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::allocate;
    use crate::symmetry::check_sym;

    #[test]
    fn test_ids() {
        for pattern in TestPattern::ALL {
            assert_eq!(TestPattern::from_id(pattern.id()).unwrap(), pattern);
        }
        assert!(TestPattern::from_id(4).unwrap_err().is_configuration());
    }

    #[test]
    fn test_static_is_reproducible() {
        let mut a = allocate::<f32>(16).unwrap();
        let mut b = allocate::<f32>(16).unwrap();
        TestPattern::Static.fill(&mut a);
        TestPattern::Static.fill(&mut b);
        assert_eq!(a, b);
        assert!(!check_sym(&a));
    }

    #[test]
    fn test_random_values_in_range() {
        let mut m = allocate::<f64>(32).unwrap();
        TestPattern::Random.fill(&mut m);
        for row in m.rows() {
            for &x in row.iter() {
                assert!((0.0..=99.99).contains(&x));
                assert!(((x * 100.0).round() - x * 100.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_symmetric_and_worst() {
        let mut m = allocate::<f32>(16).unwrap();
        TestPattern::Symmetric.fill(&mut m);
        assert!(check_sym(&m));

        TestPattern::Worst.fill(&mut m);
        assert_eq!(m.get(14, 15), 3.0);
        assert_eq!(m.get(15, 14), 5.0);
        assert!(!check_sym(&m));
    }
}
