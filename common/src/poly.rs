//! Polynomial helpers on top of `ark-poly`: uniform polynomials with a pinned
//! constant term and Lagrange interpolation at zero, which is all the sharing
//! layer ever needs.

use crate::field::{inverse, FieldError, Fq};
use ark_ff::{One, UniformRand, Zero};
use ark_poly::{univariate::DensePolynomial, DenseUVPolynomial, Polynomial};
use rand::Rng;

/// Uniform polynomial of the given degree with `p(0) = constant`.
pub fn random_with_constant(
    degree: usize,
    constant: Fq,
    rng: &mut impl Rng,
) -> DensePolynomial<Fq> {
    let mut coeffs = Vec::with_capacity(degree + 1);
    coeffs.push(constant);
    for _ in 0..degree {
        coeffs.push(Fq::rand(rng));
    }
    DensePolynomial::from_coefficients_vec(coeffs)
}

/// Evaluates at a party index (the share of party `id`).
pub fn evaluate_at_party(poly: &DensePolynomial<Fq>, id: usize) -> Fq {
    poly.evaluate(&Fq::from(id as u64))
}

/// Lagrange interpolation of `p(0)` from `(x_i, y_i)` pairs:
/// `p(0) = sum_i y_i * prod_{j != i} (-x_j) / (x_i - x_j)`.
pub fn interpolate_at_zero(points: &[(Fq, Fq)]) -> Result<Fq, FieldError> {
    let lambdas =
        lagrange_coefficients_at_zero(&points.iter().map(|(x, _)| *x).collect::<Vec<_>>())?;
    let mut acc = Fq::zero();
    for ((_, y), lambda) in points.iter().zip(lambdas) {
        acc += lambda * y;
    }
    Ok(acc)
}

/// Evaluates the unique interpolating polynomial of the given points at `x`.
pub fn interpolate_at(points: &[(Fq, Fq)], x: Fq) -> Result<Fq, FieldError> {
    let mut acc = Fq::zero();
    for (i, (xi, yi)) in points.iter().enumerate() {
        let mut numerator = Fq::one();
        let mut denominator = Fq::one();
        for (j, (xj, _)) in points.iter().enumerate() {
            if i == j {
                continue;
            }
            numerator *= x - xj;
            denominator *= *xi - xj;
        }
        acc += *yi * numerator * inverse(denominator)?;
    }
    Ok(acc)
}

/// Precomputes the Lagrange basis coefficients at `x = 0` for the given
/// x-coordinates. Duplicate coordinates surface as a division by zero.
pub fn lagrange_coefficients_at_zero(x_values: &[Fq]) -> Result<Vec<Fq>, FieldError> {
    let mut lambdas = Vec::with_capacity(x_values.len());
    for (i, xi) in x_values.iter().enumerate() {
        let mut numerator = Fq::one();
        let mut denominator = Fq::one();
        for (j, xj) in x_values.iter().enumerate() {
            if i == j {
                continue;
            }
            numerator *= -*xj;
            denominator *= *xi - xj;
        }
        lambdas.push(numerator * inverse(denominator)?);
    }
    Ok(lambdas)
}

#[cfg(test)]
mod test {
    use super::*;
    use ark_std::test_rng;

    #[test]
    fn constant_term_is_pinned() {
        let mut rng = test_rng();
        let secret = Fq::from(918520u64);
        let poly = random_with_constant(3, secret, &mut rng);
        assert_eq!(poly.evaluate(&Fq::zero()), secret);
    }

    #[test]
    fn interpolation_recovers_constant() {
        let mut rng = test_rng();
        let secret = Fq::from(42u64);
        let poly = random_with_constant(2, secret, &mut rng);
        let points: Vec<(Fq, Fq)> = (1..=3)
            .map(|i| (Fq::from(i as u64), evaluate_at_party(&poly, i)))
            .collect();
        assert_eq!(interpolate_at_zero(&points).unwrap(), secret);
    }

    #[test]
    fn coefficients_match_direct_interpolation() {
        let mut rng = test_rng();
        let poly = random_with_constant(1, Fq::from(7u64), &mut rng);
        let xs = [Fq::from(2u64), Fq::from(4u64)];
        let lambdas = lagrange_coefficients_at_zero(&xs).unwrap();
        let combined: Fq = xs
            .iter()
            .zip(&lambdas)
            .map(|(x, l)| *l * poly.evaluate(x))
            .sum();
        assert_eq!(combined, Fq::from(7u64));
    }

    #[test]
    fn general_interpolation_reproduces_the_polynomial() {
        let mut rng = test_rng();
        let poly = random_with_constant(1, Fq::from(5u64), &mut rng);
        let points: Vec<(Fq, Fq)> = (1..=2)
            .map(|i| (Fq::from(i as u64), evaluate_at_party(&poly, i)))
            .collect();
        for x in 3..=6u64 {
            assert_eq!(
                interpolate_at(&points, Fq::from(x)).unwrap(),
                poly.evaluate(&Fq::from(x))
            );
        }
    }

    #[test]
    fn duplicate_points_are_rejected() {
        let xs = [Fq::from(1u64), Fq::from(1u64)];
        assert_eq!(
            lagrange_coefficients_at_zero(&xs),
            Err(FieldError::DivisionByZero)
        );
    }
}
