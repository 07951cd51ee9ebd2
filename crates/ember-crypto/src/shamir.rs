//! 2-of-3 Shamir secret sharing over a 128-bit prime field.
//!
//! The wallet secret is a point `f(0)` on a random degree-1 polynomial
//! `f(x) = secret + a·x (mod P)`; the three shares are `f(1)`, `f(2)`,
//! `f(3)`, labeled device, auth, and recovery. Any two shares recover the
//! polynomial and hence the secret; one share alone reveals nothing.
//!
//! Shares cross the wire to a language-agnostic auth service, so their
//! canonical form is textual: `"<idHex>:<yHex>"` with `y` zero-padded to 32
//! hex characters. Field arithmetic is done in 256-bit integers so 128-bit
//! products never overflow.

use alloy_primitives::U256;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::{
    AUTH_SHARE_ID, DEVICE_SHARE_ID, FIELD_PRIME, RECOVERY_SHARE_ID, SECRET_SIZE,
};
use crate::errors::{CryptoError, Result};

/// A 16-byte wallet secret, always below [`FIELD_PRIME`].
///
/// Zeroized on drop; the secret only exists in memory between share
/// assembly and key construction.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Secret([u8; SECRET_SIZE]);

impl Secret {
    /// Sample a fresh uniformly random secret.
    ///
    /// Values in `[P, 2^128)` are rejected and redrawn so every secret is a
    /// valid field element. The rejection region is 159 values out of
    /// `2^128`.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let mut bytes = [0u8; SECRET_SIZE];
            rng.fill_bytes(&mut bytes);
            if U256::from_be_slice(&bytes) < FIELD_PRIME {
                return Self(bytes);
            }
            bytes.zeroize();
        }
    }

    /// Construct a secret from raw bytes.
    ///
    /// Fails with [`CryptoError::SecretOutOfRange`] if the value does not
    /// fit below the field prime.
    pub fn from_bytes(bytes: [u8; SECRET_SIZE]) -> Result<Self> {
        if U256::from_be_slice(&bytes) >= FIELD_PRIME {
            return Err(CryptoError::SecretOutOfRange);
        }
        Ok(Self(bytes))
    }

    /// The secret bytes.
    pub fn as_bytes(&self) -> &[u8; SECRET_SIZE] {
        &self.0
    }

    fn to_field(&self) -> U256 {
        U256::from_be_slice(&self.0)
    }

    fn from_field(value: U256) -> Self {
        let wide = value.to_be_bytes::<32>();
        let mut bytes = [0u8; SECRET_SIZE];
        bytes.copy_from_slice(&wide[32 - SECRET_SIZE..]);
        Self(bytes)
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print secret material.
        f.write_str("Secret([redacted])")
    }
}

/// One point `(id, y)` on the sharing polynomial.
#[derive(Clone, PartialEq, Eq)]
pub struct Share {
    id: u8,
    y: U256,
}

impl Share {
    /// The share id: 1 = device, 2 = auth, 3 = recovery.
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Serialize to the canonical wire form `"<idHex>:<yHex>"`.
    pub fn to_wire(&self) -> String {
        let y_bytes = self.y.to_be_bytes::<32>();
        format!("{:x}:{}", self.id, hex::encode(&y_bytes[16..]))
    }

    /// Parse a share from its wire form.
    pub fn from_wire(s: &str) -> Result<Self> {
        let (id_part, y_part) = s
            .split_once(':')
            .ok_or_else(|| CryptoError::ShareCorrupt("expected \"<id>:<y>\"".into()))?;

        let id = u8::from_str_radix(id_part, 16)
            .map_err(|_| CryptoError::ShareCorrupt(format!("bad share id {id_part:?}")))?;
        if id == 0 || y_part.is_empty() || y_part.len() > 2 * SECRET_SIZE {
            return Err(CryptoError::ShareCorrupt(format!(
                "share id or value out of range (id {id}, {} hex chars)",
                y_part.len()
            )));
        }

        let y = U256::from_str_radix(y_part, 16)
            .map_err(|_| CryptoError::ShareCorrupt("share value is not hex".into()))?;
        if y >= FIELD_PRIME {
            return Err(CryptoError::ShareCorrupt(
                "share value exceeds the field prime".into(),
            ));
        }

        Ok(Self { id, y })
    }
}

impl std::fmt::Debug for Share {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The y value is secret material; only the id is safe to print.
        write!(f, "Share {{ id: {} }}", self.id)
    }
}

/// The three labeled shares produced by [`split`].
pub struct ShareSet {
    /// `f(1)`, kept in the local session envelope.
    pub device: Share,
    /// `f(2)`, uploaded to the auth service.
    pub auth: Share,
    /// `f(3)`, encrypted under the recovery code before upload.
    pub recovery: Share,
}

/// Split a secret into the device, auth, and recovery shares.
pub fn split(secret: &Secret) -> ShareSet {
    split_with_coefficient(secret, random_coefficient())
}

fn split_with_coefficient(secret: &Secret, a: U256) -> ShareSet {
    let s = secret.to_field();
    let eval = |x: u8| Share {
        id: x,
        y: s.add_mod(a.mul_mod(U256::from(x), FIELD_PRIME), FIELD_PRIME),
    };
    ShareSet {
        device: eval(DEVICE_SHARE_ID),
        auth: eval(AUTH_SHARE_ID),
        recovery: eval(RECOVERY_SHARE_ID),
    }
}

fn random_coefficient() -> U256 {
    let mut rng = rand::thread_rng();
    loop {
        let mut bytes = [0u8; SECRET_SIZE];
        rng.fill_bytes(&mut bytes);
        let a = U256::from_be_slice(&bytes);
        if !a.is_zero() && a < FIELD_PRIME {
            return a;
        }
    }
}

/// Reconstruct the secret from any two distinct shares.
pub fn combine(a: &Share, b: &Share) -> Result<Secret> {
    let (s, _) = interpolate(a, b)?;
    Ok(Secret::from_field(s))
}

/// Evaluate the sharing polynomial at a new id.
///
/// Used after recovery to mint a fresh device share without re-splitting:
/// the two recovered shares fix the polynomial, and `f(id)` is returned.
pub fn derive_share(id: u8, a: &Share, b: &Share) -> Result<Share> {
    if id == 0 {
        return Err(CryptoError::ShareCorrupt("share id must be nonzero".into()));
    }
    let (s, slope) = interpolate(a, b)?;
    let y = s.add_mod(slope.mul_mod(U256::from(id), FIELD_PRIME), FIELD_PRIME);
    Ok(Share { id, y })
}

/// Recover `(f(0), slope)` of the degree-1 polynomial through two points.
fn interpolate(a: &Share, b: &Share) -> Result<(U256, U256)> {
    if a.id == b.id {
        return Err(CryptoError::ShareCorrupt(format!(
            "cannot combine two shares with id {}",
            a.id
        )));
    }

    let x1 = U256::from(a.id);
    let x2 = U256::from(b.id);

    // slope = (y2 - y1) / (x2 - x1)
    let dy = sub_mod(b.y, a.y);
    let dx = sub_mod(x2, x1);
    let slope = dy.mul_mod(
        dx.inv_mod(FIELD_PRIME)
            .ok_or_else(|| CryptoError::ShareCorrupt("share ids are not invertible".into()))?,
        FIELD_PRIME,
    );

    // f(0) = y1 - slope * x1
    let secret = sub_mod(a.y, slope.mul_mod(x1, FIELD_PRIME));
    Ok((secret, slope))
}

fn sub_mod(a: U256, b: U256) -> U256 {
    a.add_mod(FIELD_PRIME - b, FIELD_PRIME)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_secret() -> Secret {
        let bytes: [u8; 16] = hex::decode("00112233445566778899aabbccddeeff")
            .unwrap()
            .try_into()
            .unwrap();
        Secret::from_bytes(bytes).unwrap()
    }

    fn fixture_coefficient() -> U256 {
        U256::from_be_slice(&hex::decode("0102030405060708090a0b0c0d0e0f10").unwrap())
    }

    #[test]
    fn split_with_known_coefficient_is_deterministic() {
        let secret = fixture_secret();
        let a = fixture_coefficient();
        let shares = split_with_coefficient(&secret, a);

        let s = U256::from_be_slice(secret.as_bytes());
        assert_eq!(shares.device.y, s + a);
        assert_eq!(shares.auth.y, s + a * U256::from(2u8));
        assert_eq!(shares.recovery.y, s + a * U256::from(3u8));
    }

    #[test]
    fn every_share_pair_recovers_the_secret() {
        let secret = fixture_secret();
        let shares = split_with_coefficient(&secret, fixture_coefficient());

        let pairs = [
            (&shares.device, &shares.auth),
            (&shares.device, &shares.recovery),
            (&shares.auth, &shares.recovery),
            (&shares.recovery, &shares.device),
            (&shares.auth, &shares.device),
            (&shares.recovery, &shares.auth),
        ];
        for (a, b) in pairs {
            let recovered = combine(a, b).unwrap();
            assert_eq!(
                recovered.as_bytes(),
                secret.as_bytes(),
                "pair ({}, {}) should recover the secret",
                a.id(),
                b.id()
            );
        }
    }

    #[test]
    fn random_split_round_trips() {
        for _ in 0..16 {
            let secret = Secret::generate();
            let shares = split(&secret);
            let recovered = combine(&shares.device, &shares.recovery).unwrap();
            assert_eq!(recovered.as_bytes(), secret.as_bytes());
        }
    }

    #[test]
    fn derive_share_reproduces_the_original_point() {
        let secret = Secret::generate();
        let shares = split(&secret);

        let device = derive_share(DEVICE_SHARE_ID, &shares.auth, &shares.recovery).unwrap();
        assert_eq!(device.to_wire(), shares.device.to_wire());

        // A regenerated device share combines with the auth share as usual.
        let recovered = combine(&device, &shares.auth).unwrap();
        assert_eq!(recovered.as_bytes(), secret.as_bytes());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let secret = Secret::generate();
        let shares = split(&secret);
        let result = combine(&shares.auth, &shares.auth);
        assert!(matches!(result, Err(CryptoError::ShareCorrupt(_))));
    }

    #[test]
    fn wire_form_round_trips() {
        let secret = Secret::generate();
        let shares = split(&secret);
        for share in [&shares.device, &shares.auth, &shares.recovery] {
            let wire = share.to_wire();
            let parsed = Share::from_wire(&wire).unwrap();
            assert_eq!(&parsed, share);
        }
    }

    #[test]
    fn wire_form_pads_to_32_hex_chars() {
        let secret = fixture_secret();
        let shares = split_with_coefficient(&secret, U256::from(1u8));
        let wire = shares.device.to_wire();
        let (_, y) = wire.split_once(':').unwrap();
        assert_eq!(y.len(), 32);
        assert!(y.starts_with("00112233"));
    }

    #[test]
    fn malformed_wire_forms_are_rejected() {
        for bad in [
            "",
            "no-colon",
            "zz:00",
            "1:",
            "0:0011",
            "1:nothex",
            // 33 hex chars: one nibble past the field width
            "1:000000000000000000000000000000000",
        ] {
            assert!(
                matches!(Share::from_wire(bad), Err(CryptoError::ShareCorrupt(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn secret_at_or_above_prime_is_rejected() {
        let max = [0xffu8; 16];
        assert!(matches!(
            Secret::from_bytes(max),
            Err(CryptoError::SecretOutOfRange)
        ));
    }
}
