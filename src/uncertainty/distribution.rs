//! Per-exchange uncertainty descriptors and their sampling distributions.

use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{LogNormal, Normal, Triangular};

/// Stochastic descriptor attached to an exchange.
///
/// `None` means the exchange amount is deterministic. For `Lognormal`,
/// `loc` and `scale` are the mean and standard deviation of the underlying
/// normal distribution.
#[derive(Clone, Debug, PartialEq)]
pub enum Uncertainty {
    None,
    Lognormal { loc: f64, scale: f64 },
    Normal { loc: f64, scale: f64 },
    Uniform { minimum: f64, maximum: f64 },
    Triangular { minimum: f64, mode: f64, maximum: f64 },
}

impl Uncertainty {
    /// Distribution family label.
    pub fn kind(&self) -> &'static str {
        match self {
            Uncertainty::None => "none",
            Uncertainty::Lognormal { .. } => "lognormal",
            Uncertainty::Normal { .. } => "normal",
            Uncertainty::Uniform { .. } => "uniform",
            Uncertainty::Triangular { .. } => "triangular",
        }
    }

    #[inline]
    pub fn is_stochastic(&self) -> bool {
        !matches!(self, Uncertainty::None)
    }

    /// Validate parameters and build the sampling distribution.
    pub(crate) fn sampler(&self) -> Result<Sampler, String> {
        match *self {
            Uncertainty::None => Err("deterministic exchange has no distribution".to_string()),
            Uncertainty::Lognormal { loc, scale } => LogNormal::new(loc, scale)
                .map(Sampler::Lognormal)
                .map_err(|e| e.to_string()),
            Uncertainty::Normal { loc, scale } => Normal::new(loc, scale)
                .map(Sampler::Normal)
                .map_err(|e| e.to_string()),
            Uncertainty::Uniform { minimum, maximum } => {
                if !(minimum < maximum) {
                    return Err(format!(
                        "minimum {} must be below maximum {}",
                        minimum, maximum
                    ));
                }
                Ok(Sampler::Uniform(Uniform::new(minimum, maximum)))
            }
            Uncertainty::Triangular { minimum, mode, maximum } => {
                Triangular::new(minimum, maximum, mode)
                    .map(Sampler::Triangular)
                    .map_err(|e| e.to_string())
            }
        }
    }
}

/// Validated, ready-to-draw distribution for one exchange.
#[derive(Clone, Debug)]
pub(crate) enum Sampler {
    Lognormal(LogNormal<f64>),
    Normal(Normal<f64>),
    Uniform(Uniform<f64>),
    Triangular(Triangular<f64>),
}

impl Sampler {
    pub(crate) fn draw(&self, rng: &mut StdRng) -> f64 {
        match self {
            Sampler::Lognormal(d) => rng.sample(*d),
            Sampler::Normal(d) => rng.sample(*d),
            Sampler::Uniform(d) => rng.sample(*d),
            Sampler::Triangular(d) => rng.sample(*d),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn none_is_not_stochastic() {
        assert!(!Uncertainty::None.is_stochastic());
        assert!(Uncertainty::Uniform {
            minimum: 0.0,
            maximum: 1.0
        }
        .is_stochastic());
    }

    #[test]
    fn none_has_no_sampler() {
        assert!(Uncertainty::None.sampler().is_err());
    }

    #[test]
    fn uniform_draws_stay_in_bounds() {
        let sampler = Uncertainty::Uniform {
            minimum: 2.0,
            maximum: 3.0,
        }
        .sampler()
        .unwrap();

        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let v = sampler.draw(&mut rng);
            assert!((2.0..3.0).contains(&v));
        }
    }

    #[test]
    fn triangular_draws_stay_in_bounds() {
        let sampler = Uncertainty::Triangular {
            minimum: 1.0,
            mode: 2.0,
            maximum: 4.0,
        }
        .sampler()
        .unwrap();

        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let v = sampler.draw(&mut rng);
            assert!((1.0..=4.0).contains(&v));
        }
    }

    #[test]
    fn lognormal_draws_are_positive() {
        let sampler = Uncertainty::Lognormal {
            loc: 0.0,
            scale: 0.5,
        }
        .sampler()
        .unwrap();

        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            assert!(sampler.draw(&mut rng) > 0.0);
        }
    }

    #[test]
    fn inverted_uniform_bounds_are_rejected() {
        let result = Uncertainty::Uniform {
            minimum: 3.0,
            maximum: 2.0,
        }
        .sampler();
        assert!(result.is_err());
    }

    #[test]
    fn negative_normal_scale_is_rejected() {
        let result = Uncertainty::Normal {
            loc: 1.0,
            scale: -0.5,
        }
        .sampler();
        assert!(result.is_err());
    }
}
