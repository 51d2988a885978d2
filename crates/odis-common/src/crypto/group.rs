//! # BLS12-381 Group Elements
//!
//! Thin wrappers over the `blst` FFI for the three element types the
//! threshold scheme needs: scalars of the prime field, G1 points (blinded
//! messages and signatures) and G2 points (public keys and polynomial
//! commitments).
//!
//! ## Security Notes
//!
//! - Deserialised points are rejected if they are the identity or fall
//!   outside the prime-order subgroup
//! - Scalars are zeroized on drop of any container that derives `Zeroize`
//! - All `unsafe` in the workspace is confined to this module

#![allow(unsafe_code)]

use super::errors::CryptoError;
use blst::{
    blst_bendian_from_scalar, blst_final_exp, blst_fp12, blst_fr, blst_fr_add,
    blst_fr_from_scalar, blst_fr_from_uint64, blst_fr_inverse, blst_fr_mul, blst_fr_sub,
    blst_hash_to_g1, blst_keygen_v3, blst_miller_loop, blst_p1, blst_p1_add_or_double,
    blst_p1_affine, blst_p1_compress, blst_p1_from_affine, blst_p1_in_g1, blst_p1_is_equal, blst_p1_is_inf,
    blst_p1_mult, blst_p1_to_affine, blst_p1_uncompress, blst_p2, blst_p2_add_or_double,
    blst_p2_affine, blst_p2_compress, blst_p2_from_affine, blst_p2_in_g2, blst_p2_is_equal, blst_p2_is_inf,
    blst_p2_mult, blst_p2_to_affine, blst_p2_uncompress, blst_scalar, blst_scalar_fr_check,
    blst_scalar_from_bendian, blst_scalar_from_fr, BLS12_381_G1, BLS12_381_G2, BLST_ERROR,
};
use rand::RngCore;
use std::ptr;
use zeroize::Zeroize;

/// Domain separation tag for hashing messages to G1.
pub const DST_G1: &[u8] = b"BLS_SIG_BLS12381G1_XMD:SHA-256_SSWU_RO_NUL_";

/// Serialized scalar length (big-endian).
pub const SCALAR_LENGTH: usize = 32;

/// Compressed G1 point length.
pub const G1_LENGTH: usize = 48;

/// Compressed G2 point length.
pub const G2_LENGTH: usize = 96;

/// `2^256 mod r` in Montgomery form, i.e. the field element 1.
const FR_ONE: blst_fr = blst_fr {
    l: [
        0x0000_0001_ffff_fffe,
        0x5884_b7fa_0003_4802,
        0x998c_4fef_ecbc_4ff5,
        0x1824_b159_acc5_056f,
    ],
};

/// Operations shared by every element that can appear as a polynomial
/// coefficient or evaluation.
pub trait GroupElement: Copy + PartialEq {
    /// Additive identity.
    fn zero() -> Self;

    /// Adds `rhs` in place.
    fn add_assign(&mut self, rhs: &Self);

    /// Multiplies by a scalar in place.
    fn mul_assign(&mut self, rhs: &Scalar);
}

// =============================================================================
// SCALAR
// =============================================================================

/// Element of the BLS12-381 scalar field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Scalar(blst_fr);

impl Scalar {
    /// The multiplicative identity.
    pub fn one() -> Self {
        Self(FR_ONE)
    }

    /// Samples a uniformly random non-zero scalar.
    pub fn random<R: RngCore>(rng: &mut R) -> Self {
        loop {
            let mut ikm = [0u8; 64];
            rng.fill_bytes(&mut ikm);

            let mut ret = blst_fr::default();
            unsafe {
                let mut sc = blst_scalar::default();
                blst_keygen_v3(&mut sc, ikm.as_ptr(), ikm.len(), ptr::null(), 0);
                blst_fr_from_scalar(&mut ret, &sc);
            }
            ikm.zeroize();

            let scalar = Self(ret);
            if !scalar.is_zero() {
                return scalar;
            }
        }
    }

    /// Builds the scalar for a small integer.
    pub fn from_u64(value: u64) -> Self {
        // blst reads four limbs from the pointer
        let limbs = [value, 0, 0, 0];
        let mut ret = blst_fr::default();
        unsafe { blst_fr_from_uint64(&mut ret, limbs.as_ptr()) };
        Self(ret)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == blst_fr::default()
    }

    /// Subtracts `rhs` in place.
    pub fn sub_assign(&mut self, rhs: &Self) {
        unsafe { blst_fr_sub(&mut self.0, &self.0, &rhs.0) }
    }

    /// Multiplicative inverse, `None` for zero.
    pub fn inverse(&self) -> Option<Self> {
        if self.is_zero() {
            return None;
        }
        let mut ret = blst_fr::default();
        unsafe { blst_fr_inverse(&mut ret, &self.0) };
        Some(Self(ret))
    }

    /// Big-endian canonical encoding.
    pub fn to_bytes(&self) -> [u8; SCALAR_LENGTH] {
        let mut bytes = [0u8; SCALAR_LENGTH];
        unsafe {
            let mut scalar = blst_scalar::default();
            blst_scalar_from_fr(&mut scalar, &self.0);
            blst_bendian_from_scalar(bytes.as_mut_ptr(), &scalar);
        }
        bytes
    }

    /// Parses a big-endian canonical encoding, rejecting values `>= r`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != SCALAR_LENGTH {
            return Err(CryptoError::InvalidLength {
                expected: SCALAR_LENGTH,
                actual: bytes.len(),
            });
        }
        let mut ret = blst_fr::default();
        unsafe {
            let mut scalar = blst_scalar::default();
            blst_scalar_from_bendian(&mut scalar, bytes.as_ptr());
            if !blst_scalar_fr_check(&scalar) {
                return Err(CryptoError::InvalidScalar);
            }
            blst_fr_from_scalar(&mut ret, &scalar);
        }
        Ok(Self(ret))
    }
}

impl GroupElement for Scalar {
    fn zero() -> Self {
        Self(blst_fr::default())
    }

    fn add_assign(&mut self, rhs: &Self) {
        unsafe { blst_fr_add(&mut self.0, &self.0, &rhs.0) }
    }

    fn mul_assign(&mut self, rhs: &Scalar) {
        unsafe { blst_fr_mul(&mut self.0, &self.0, &rhs.0) }
    }
}

impl Zeroize for Scalar {
    fn zeroize(&mut self) {
        self.0.l.zeroize();
    }
}

/// Bit length of a little-endian blst scalar, used to bound the
/// double-and-add loop in point multiplication.
fn bit_length(scalar: &blst_scalar) -> usize {
    let mut bits = SCALAR_LENGTH * 8;
    for byte in scalar.b.iter().rev() {
        let leading = byte.leading_zeros() as usize;
        bits -= leading;
        if leading < 8 {
            break;
        }
    }
    bits
}

// =============================================================================
// G1
// =============================================================================

/// Point in G1. Blinded messages and (partial) signatures live here.
#[derive(Debug, Clone, Copy)]
#[repr(transparent)]
pub struct G1(blst_p1);

impl G1 {
    pub fn generator() -> Self {
        let mut ret = blst_p1::default();
        unsafe { blst_p1_from_affine(&mut ret, &BLS12_381_G1) };
        Self(ret)
    }

    /// Hashes `message` to the curve with [`DST_G1`].
    pub fn hash_to_curve(message: &[u8]) -> Self {
        let mut ret = blst_p1::default();
        unsafe {
            blst_hash_to_g1(
                &mut ret,
                message.as_ptr(),
                message.len(),
                DST_G1.as_ptr(),
                DST_G1.len(),
                ptr::null(),
                0,
            );
        }
        Self(ret)
    }

    pub fn to_bytes(&self) -> [u8; G1_LENGTH] {
        let mut bytes = [0u8; G1_LENGTH];
        unsafe { blst_p1_compress(bytes.as_mut_ptr(), &self.0) };
        bytes
    }

    /// Decompresses a point and checks it is a non-identity subgroup member.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != G1_LENGTH {
            return Err(CryptoError::InvalidLength {
                expected: G1_LENGTH,
                actual: bytes.len(),
            });
        }
        let mut ret = blst_p1::default();
        unsafe {
            let mut affine = blst_p1_affine::default();
            if blst_p1_uncompress(&mut affine, bytes.as_ptr()) != BLST_ERROR::BLST_SUCCESS {
                return Err(CryptoError::InvalidPoint);
            }
            blst_p1_from_affine(&mut ret, &affine);
            if blst_p1_is_inf(&ret) || !blst_p1_in_g1(&ret) {
                return Err(CryptoError::InvalidPoint);
            }
        }
        Ok(Self(ret))
    }
}

impl PartialEq for G1 {
    fn eq(&self, other: &Self) -> bool {
        // projective coordinates are not unique
        unsafe { blst_p1_is_equal(&self.0, &other.0) }
    }
}

impl Eq for G1 {}

impl GroupElement for G1 {
    fn zero() -> Self {
        Self(blst_p1::default())
    }

    fn add_assign(&mut self, rhs: &Self) {
        unsafe { blst_p1_add_or_double(&mut self.0, &self.0, &rhs.0) }
    }

    fn mul_assign(&mut self, rhs: &Scalar) {
        let mut scalar = blst_scalar::default();
        unsafe {
            blst_scalar_from_fr(&mut scalar, &rhs.0);
            blst_p1_mult(&mut self.0, &self.0, scalar.b.as_ptr(), bit_length(&scalar));
        }
    }
}

// =============================================================================
// G2
// =============================================================================

/// Point in G2. Public keys and polynomial commitments live here.
#[derive(Debug, Clone, Copy)]
#[repr(transparent)]
pub struct G2(blst_p2);

impl G2 {
    pub fn generator() -> Self {
        let mut ret = blst_p2::default();
        unsafe { blst_p2_from_affine(&mut ret, &BLS12_381_G2) };
        Self(ret)
    }

    pub fn to_bytes(&self) -> [u8; G2_LENGTH] {
        let mut bytes = [0u8; G2_LENGTH];
        unsafe { blst_p2_compress(bytes.as_mut_ptr(), &self.0) };
        bytes
    }

    /// Decompresses a point and checks it is a non-identity subgroup member.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != G2_LENGTH {
            return Err(CryptoError::InvalidLength {
                expected: G2_LENGTH,
                actual: bytes.len(),
            });
        }
        let mut ret = blst_p2::default();
        unsafe {
            let mut affine = blst_p2_affine::default();
            if blst_p2_uncompress(&mut affine, bytes.as_ptr()) != BLST_ERROR::BLST_SUCCESS {
                return Err(CryptoError::InvalidPoint);
            }
            blst_p2_from_affine(&mut ret, &affine);
            if blst_p2_is_inf(&ret) || !blst_p2_in_g2(&ret) {
                return Err(CryptoError::InvalidPoint);
            }
        }
        Ok(Self(ret))
    }
}

impl PartialEq for G2 {
    fn eq(&self, other: &Self) -> bool {
        unsafe { blst_p2_is_equal(&self.0, &other.0) }
    }
}

impl Eq for G2 {}

impl GroupElement for G2 {
    fn zero() -> Self {
        Self(blst_p2::default())
    }

    fn add_assign(&mut self, rhs: &Self) {
        unsafe { blst_p2_add_or_double(&mut self.0, &self.0, &rhs.0) }
    }

    fn mul_assign(&mut self, rhs: &Scalar) {
        let mut scalar = blst_scalar::default();
        unsafe {
            blst_scalar_from_fr(&mut scalar, &rhs.0);
            blst_p2_mult(&mut self.0, &self.0, scalar.b.as_ptr(), bit_length(&scalar));
        }
    }
}

// =============================================================================
// PAIRING
// =============================================================================

/// Target group element produced by the optimal Ate pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Gt(blst_fp12);

fn pairing(p: &G1, q: &G2) -> Gt {
    let mut pa = blst_p1_affine::default();
    let mut qa = blst_p2_affine::default();
    let mut res = blst_fp12::default();
    unsafe {
        blst_p1_to_affine(&mut pa, &p.0);
        blst_p2_to_affine(&mut qa, &q.0);
        blst_miller_loop(&mut res, &qa, &pa);
        blst_final_exp(&mut res, &res);
    }
    Gt(res)
}

/// Checks `e(sig, g2) == e(message, public)`.
///
/// This is the BLS verification equation with signatures in G1, used both for
/// partial shares (against a per-index key) and for final signatures.
pub fn verify_pairing(public: &G2, message: &G1, signature: &G1) -> bool {
    pairing(signature, &G2::generator()) == pairing(message, public)
}
