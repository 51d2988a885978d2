//! # Polynomials over BLS12-381
//!
//! Secret polynomials (scalar coefficients) held by the dealer, public
//! commitment polynomials (G2 coefficients) published as the verification
//! polynomial, and Lagrange recovery of a constant term from `t` evaluations.
//!
//! Evaluation index `i` corresponds to `x = i + 1` so that no share is ever
//! the evaluation at zero.

use super::errors::CryptoError;
use super::group::{GroupElement, Scalar, G2, G2_LENGTH};
use rand::RngCore;
use std::collections::BTreeMap;

/// Evaluation of a polynomial at index `index` (i.e. at `x = index + 1`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Eval<C: GroupElement> {
    pub index: u32,
    pub value: C,
}

/// Polynomial with coefficients in `C`, constant term first.
#[derive(Debug, Clone, PartialEq)]
pub struct Poly<C>(Vec<C>);

/// Secret polynomial.
pub type Private = Poly<Scalar>;

/// Commitment polynomial, the verification polynomial of a key.
pub type Public = Poly<G2>;

fn index_to_x(index: u32) -> Scalar {
    Scalar::from_u64(u64::from(index) + 1)
}

impl<C: GroupElement> Poly<C> {
    pub fn from_coefficients(coefficients: Vec<C>) -> Result<Self, CryptoError> {
        if coefficients.is_empty() {
            return Err(CryptoError::InvalidParameters(
                "polynomial must have at least one coefficient".into(),
            ));
        }
        Ok(Self(coefficients))
    }

    /// Number of coefficients, which equals the threshold.
    pub fn degree_plus_one(&self) -> u32 {
        self.0.len() as u32
    }

    pub fn constant(&self) -> &C {
        &self.0[0]
    }

    /// Evaluates at `x = index + 1` with Horner's method.
    pub fn evaluate(&self, index: u32) -> Eval<C> {
        let x = index_to_x(index);
        let mut value = C::zero();
        for coefficient in self.0.iter().rev() {
            value.mul_assign(&x);
            value.add_assign(coefficient);
        }
        Eval { index, value }
    }
}

impl Private {
    /// Samples a secret polynomial with `threshold` coefficients.
    pub fn random<R: RngCore>(threshold: u32, rng: &mut R) -> Self {
        Self((0..threshold).map(|_| Scalar::random(rng)).collect())
    }

    /// Commits each coefficient to G2.
    pub fn commit(&self) -> Public {
        Poly(
            self.0
                .iter()
                .map(|coefficient| {
                    let mut point = G2::generator();
                    point.mul_assign(coefficient);
                    point
                })
                .collect(),
        )
    }
}

impl Public {
    /// Concatenated compressed coefficients.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|point| point.to_bytes()).collect()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.is_empty() || bytes.len() % G2_LENGTH != 0 {
            return Err(CryptoError::InvalidParameters(format!(
                "polynomial length {} is not a positive multiple of {}",
                bytes.len(),
                G2_LENGTH
            )));
        }
        let points = bytes
            .chunks_exact(G2_LENGTH)
            .map(G2::from_bytes)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(points))
    }
}

/// Lagrange coefficients at zero for the given set of indices.
fn lagrange_at_zero(indices: &[u32]) -> Result<Vec<Scalar>, CryptoError> {
    let xs: Vec<Scalar> = indices.iter().map(|&i| index_to_x(i)).collect();
    let mut coefficients = Vec::with_capacity(xs.len());

    for (i, xi) in xs.iter().enumerate() {
        let mut numerator = Scalar::one();
        let mut denominator = Scalar::one();
        for (j, xj) in xs.iter().enumerate() {
            if i == j {
                continue;
            }
            numerator.mul_assign(xj);
            let mut diff = *xj;
            diff.sub_assign(xi);
            denominator.mul_assign(&diff);
        }
        let inverse = denominator.inverse().ok_or_else(|| {
            CryptoError::AggregationFailure("duplicate evaluation index".into())
        })?;
        numerator.mul_assign(&inverse);
        coefficients.push(numerator);
    }

    Ok(coefficients)
}

/// Recovers the constant term from at least `threshold` evaluations.
///
/// Only the `threshold` evaluations with the lowest indices are used, so
/// every qualifying subset yields the same result.
pub fn recover<C: GroupElement>(
    threshold: u32,
    evals: &BTreeMap<u32, C>,
) -> Result<C, CryptoError> {
    if (evals.len() as u32) < threshold {
        return Err(CryptoError::InsufficientShares {
            required: threshold,
            have: evals.len() as u32,
        });
    }

    let selected: Vec<(u32, C)> = evals
        .iter()
        .take(threshold as usize)
        .map(|(index, value)| (*index, *value))
        .collect();
    let indices: Vec<u32> = selected.iter().map(|(index, _)| *index).collect();
    let weights = lagrange_at_zero(&indices)?;

    let mut result = C::zero();
    for ((_, value), weight) in selected.iter().zip(weights.iter()) {
        let mut term = *value;
        term.mul_assign(weight);
        result.add_assign(&term);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::thread_rng;

    #[test]
    fn test_commitment_evaluation_matches_share() {
        let mut rng = thread_rng();
        let secret = Private::random(3, &mut rng);
        let public = secret.commit();

        for index in 0..5 {
            let share = secret.evaluate(index).value;
            let mut expected = G2::generator();
            expected.mul_assign(&share);
            assert_eq!(public.evaluate(index).value, expected);
        }
    }

    #[test]
    fn test_recover_any_subset() {
        let mut rng = thread_rng();
        let secret = Private::random(2, &mut rng);

        let mut first = BTreeMap::new();
        for index in [0u32, 1] {
            first.insert(index, secret.evaluate(index).value);
        }
        let mut second = BTreeMap::new();
        for index in [1u32, 2] {
            second.insert(index, secret.evaluate(index).value);
        }

        assert_eq!(recover(2, &first).unwrap(), *secret.constant());
        assert_eq!(recover(2, &second).unwrap(), *secret.constant());
    }

    #[test]
    fn test_recover_insufficient() {
        let mut evals = BTreeMap::new();
        evals.insert(0u32, Scalar::one());
        assert_eq!(
            recover(2, &evals),
            Err(CryptoError::InsufficientShares {
                required: 2,
                have: 1
            })
        );
    }

    #[test]
    fn test_public_bytes_roundtrip() {
        let public = Private::random(3, &mut thread_rng()).commit();
        let bytes = public.to_bytes();
        assert_eq!(bytes.len(), 3 * G2_LENGTH);
        assert_eq!(Public::from_bytes(&bytes).unwrap(), public);
        assert!(Public::from_bytes(&bytes[..100]).is_err());
    }
}
