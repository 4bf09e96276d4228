//! Dirichlet random-walk primitives shared by `alter_weights`,
//! `alter_p_global`, `alter_p_area`, and `alter_p_family` (spec.md §4.3.4,
//! §4.3.5).
//!
//! A `Dirichlet(alpha)` draw is built from independent `Gamma(alpha_i, 1)`
//! draws, normalized — `rand_distr` has no `Dirichlet` distribution of its
//! own, so this is the idiomatic composition rather than a hand-rolled
//! sampler. The log-density uses `statrs`'s `ln_gamma`, the same special-
//! function source the corpus reaches for elsewhere (Beta/Normal CDF work
//! in `jwschroeder3-nested_sampling`, `JYeswak-100minds-mcp`).

use rand::Rng;
use rand_distr::{Distribution, Gamma};
use statrs::function::gamma::ln_gamma;

/// Draws `x ~ Dirichlet(alpha)`. If the resulting vector does not sum to a
/// finite positive value the raw (unnormalized) draw is returned instead —
/// callers surface this as a degenerate proposal (spec.md §4.3.4,
/// §7 `DegenerateDirichlet`) rather than panicking.
pub fn sample(alpha: &[f64], rng: &mut impl Rng) -> Vec<f64> {
    let draws: Vec<f64> = alpha
        .iter()
        .map(|&a| {
            Gamma::new(a.max(f64::MIN_POSITIVE), 1.0)
                .map(|g| g.sample(rng))
                .unwrap_or(f64::NAN)
        })
        .collect();

    let total: f64 = draws.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return draws;
    }
    draws.into_iter().map(|d| d / total).collect()
}

/// `log Dir(x; alpha)`.
pub fn log_pdf(x: &[f64], alpha: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), alpha.len());
    let log_multinomial_beta =
        alpha.iter().map(|&a| ln_gamma(a)).sum::<f64>() - ln_gamma(alpha.iter().sum());
    let kernel: f64 = x
        .iter()
        .zip(alpha)
        .map(|(&xi, &ai)| (ai - 1.0) * xi.ln())
        .sum();
    kernel - log_multinomial_beta
}

/// Builds the concentration vector `1 + tau * w` used throughout spec.md
/// §4.3.4/§4.3.5's Dirichlet random walk.
pub fn concentration(w: &[f64], tau: f64) -> Vec<f64> {
    w.iter().map(|&wi| 1.0 + tau * wi).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn sample_sums_to_one() {
        let mut rng = SmallRng::seed_from_u64(7);
        let draw = sample(&concentration(&[0.4, 0.6], 100.0), &mut rng);
        let sum: f64 = draw.iter().sum();
        assert_relative_eq!(sum, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn log_pdf_is_symmetric_under_uniform_alpha() {
        let alpha = vec![1.0, 1.0];
        let a = log_pdf(&[0.3, 0.7], &alpha);
        let b = log_pdf(&[0.7, 0.3], &alpha);
        assert_relative_eq!(a, b, epsilon = 1e-9);
    }
}
