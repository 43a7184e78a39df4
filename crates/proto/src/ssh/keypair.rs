//! RSA and DSA key pairs for SSH2 user authentication.
//!
//! Components are stored as big-endian magnitudes inside zeroizing vectors,
//! and converted to [`BigUint`] on demand.
//!
//! # Signatures
//!
//! - `ssh-rsa`: PKCS#1 v1.5 over SHA-1, modulus-length output
//! - `ssh-dss`: `r || s` over SHA-1, each padded to the length of `q`
//!
//! # Example
//!
//! ```no_run
//! use burrow_proto::ssh::authkey::UserAuthKey;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let key = UserAuthKey::from_file("identity", None)?;
//! let signature = key.key_pair().sign(b"session id and request")?;
//! assert!(key.key_pair().verify(b"session id and request", &signature));
//! println!("{}", key.key_pair().fingerprint_sha256());
//! # Ok(())
//! # }
//! ```

use crate::ssh::codec::DataWriter;
use base64::Engine;
use burrow_platform::{BurrowError, BurrowResult};
use num_bigint::{BigInt, BigUint, Sign};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::RngCore;
use sha1::{Digest, Sha1};
use sha2::Sha256;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Public key algorithm of a key pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PublicKeyAlgorithm {
    /// `ssh-rsa`
    Rsa,
    /// `ssh-dss`
    Dsa,
}

impl PublicKeyAlgorithm {
    /// SSH algorithm name.
    pub fn ssh_name(&self) -> &'static str {
        match self {
            PublicKeyAlgorithm::Rsa => "ssh-rsa",
            PublicKeyAlgorithm::Dsa => "ssh-dss",
        }
    }

    /// Parses an SSH algorithm name.
    pub fn from_ssh_name(name: &str) -> Option<Self> {
        match name {
            "ssh-rsa" => Some(PublicKeyAlgorithm::Rsa),
            "ssh-dss" => Some(PublicKeyAlgorithm::Dsa),
            _ => None,
        }
    }
}

impl fmt::Display for PublicKeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ssh_name())
    }
}

fn magnitude(value: &BigUint) -> Vec<u8> {
    value.to_bytes_be()
}

fn integer(bytes: &[u8]) -> BigUint {
    BigUint::from_bytes_be(bytes)
}

/// Modular inverse of `a` modulo `m`, if it exists.
pub(crate) fn mod_inverse(a: &BigUint, m: &BigUint) -> Option<BigUint> {
    if m.is_zero() {
        return None;
    }
    let a = BigInt::from_biguint(Sign::Plus, a % m);
    let m = BigInt::from_biguint(Sign::Plus, m.clone());

    let result = a.extended_gcd(&m);
    if !result.gcd.is_one() {
        return None;
    }
    let mut inverse = result.x % &m;
    if inverse.sign() == Sign::Minus {
        inverse += &m;
    }
    inverse.to_biguint()
}

/// Hash value reduced to the bit length of `q` (FIPS 186 truncation).
fn digest_to_int(digest: &[u8], q_bits: u64) -> BigUint {
    let h = integer(digest);
    let digest_bits = digest.len() as u64 * 8;
    if digest_bits > q_bits {
        h >> (digest_bits - q_bits)
    } else {
        h
    }
}

fn write_fixed(out: &mut [u8], value: &BigUint) {
    let bytes = value.to_bytes_be();
    let offset = out.len() - bytes.len();
    out[offset..].copy_from_slice(&bytes);
}

/// RSA key pair.
///
/// `u` is the CRT coefficient `p^-1 mod q`.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct RsaKeyPair {
    e: Vec<u8>,
    d: Vec<u8>,
    n: Vec<u8>,
    u: Vec<u8>,
    p: Vec<u8>,
    q: Vec<u8>,
}

impl RsaKeyPair {
    /// Builds a key pair from all six components.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::Security`] if the modulus or public exponent
    /// is zero.
    pub fn new(
        e: &BigUint,
        d: &BigUint,
        n: &BigUint,
        u: &BigUint,
        p: &BigUint,
        q: &BigUint,
    ) -> BurrowResult<Self> {
        if n.is_zero() || e.is_zero() {
            return Err(BurrowError::Security(
                "RSA modulus and exponent must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            e: magnitude(e),
            d: magnitude(d),
            n: magnitude(n),
            u: magnitude(u),
            p: magnitude(p),
            q: magnitude(q),
        })
    }

    /// Builds a key pair from the primes, deriving `n` and `u`.
    pub fn from_primes(
        e: &BigUint,
        d: &BigUint,
        p: &BigUint,
        q: &BigUint,
    ) -> BurrowResult<Self> {
        let n = p * q;
        let u = mod_inverse(p, q)
            .ok_or_else(|| BurrowError::Security("RSA primes are not coprime".to_string()))?;
        Self::new(e, d, &n, &u, p, q)
    }

    /// Public exponent.
    pub fn e(&self) -> BigUint {
        integer(&self.e)
    }

    /// Private exponent.
    pub fn d(&self) -> BigUint {
        integer(&self.d)
    }

    /// Modulus.
    pub fn n(&self) -> BigUint {
        integer(&self.n)
    }

    /// CRT coefficient `p^-1 mod q`.
    pub fn u(&self) -> BigUint {
        integer(&self.u)
    }

    /// First prime.
    pub fn p(&self) -> BigUint {
        integer(&self.p)
    }

    /// Second prime.
    pub fn q(&self) -> BigUint {
        integer(&self.q)
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> u64 {
        self.n().bits()
    }

    /// Returns true if `p * q == n` and `u * p == 1 (mod q)`.
    pub fn is_consistent(&self) -> bool {
        let (p, q) = (self.p(), self.q());
        if q.is_zero() || &p * &q != self.n() {
            return false;
        }
        (self.u() * p % q).is_one()
    }

    fn private_key(&self) -> BurrowResult<rsa::RsaPrivateKey> {
        rsa::RsaPrivateKey::from_components(
            rsa::BigUint::from_bytes_be(&self.n),
            rsa::BigUint::from_bytes_be(&self.e),
            rsa::BigUint::from_bytes_be(&self.d),
            vec![
                rsa::BigUint::from_bytes_be(&self.p),
                rsa::BigUint::from_bytes_be(&self.q),
            ],
        )
        .map_err(|e| BurrowError::Security(format!("Invalid RSA key: {}", e)))
    }

    /// PKCS#1 v1.5 signature over SHA-1.
    pub fn sign(&self, data: &[u8]) -> BurrowResult<Vec<u8>> {
        let key = self.private_key()?;
        let hashed = Sha1::digest(data);
        key.sign_with_rng(
            &mut rand::thread_rng(),
            rsa::Pkcs1v15Sign::new::<Sha1>(),
            &hashed,
        )
        .map_err(|e| BurrowError::Security(format!("RSA signing failed: {}", e)))
    }

    /// Verifies a PKCS#1 v1.5 SHA-1 signature.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        let public = match rsa::RsaPublicKey::new(
            rsa::BigUint::from_bytes_be(&self.n),
            rsa::BigUint::from_bytes_be(&self.e),
        ) {
            Ok(key) => key,
            Err(_) => return false,
        };
        let hashed = Sha1::digest(data);
        public
            .verify(rsa::Pkcs1v15Sign::new::<Sha1>(), &hashed, signature)
            .is_ok()
    }
}

impl fmt::Debug for RsaKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaKeyPair")
            .field("bits", &self.bits())
            .finish_non_exhaustive()
    }
}

/// DSA key pair.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DsaKeyPair {
    p: Vec<u8>,
    q: Vec<u8>,
    g: Vec<u8>,
    y: Vec<u8>,
    x: Vec<u8>,
}

impl DsaKeyPair {
    /// Builds a key pair from domain parameters and keys.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::Security`] if `p` or `q` is too small to sign
    /// with.
    pub fn new(
        p: &BigUint,
        q: &BigUint,
        g: &BigUint,
        y: &BigUint,
        x: &BigUint,
    ) -> BurrowResult<Self> {
        if q.bits() < 2 || p.bits() < 2 {
            return Err(BurrowError::Security(
                "DSA parameters p and q must be greater than 1".to_string(),
            ));
        }
        Ok(Self {
            p: magnitude(p),
            q: magnitude(q),
            g: magnitude(g),
            y: magnitude(y),
            x: magnitude(x),
        })
    }

    /// Prime modulus.
    pub fn p(&self) -> BigUint {
        integer(&self.p)
    }

    /// Subgroup order.
    pub fn q(&self) -> BigUint {
        integer(&self.q)
    }

    /// Generator.
    pub fn g(&self) -> BigUint {
        integer(&self.g)
    }

    /// Public key.
    pub fn y(&self) -> BigUint {
        integer(&self.y)
    }

    /// Private key.
    pub fn x(&self) -> BigUint {
        integer(&self.x)
    }

    /// Size of `p` in bits.
    pub fn bits(&self) -> u64 {
        self.p().bits()
    }

    fn q_len(&self) -> usize {
        (self.q().bits() as usize).div_ceil(8)
    }

    /// Returns true if `0 < x < q` and `g^x mod p == y`.
    pub fn is_consistent(&self) -> bool {
        let (x, q) = (self.x(), self.q());
        !x.is_zero() && x < q && self.g().modpow(&x, &self.p()) == self.y()
    }

    /// `r || s` over SHA-1(data).
    pub fn sign(&self, data: &[u8]) -> BurrowResult<Vec<u8>> {
        let (p, q, g, x) = (self.p(), self.q(), self.g(), self.x());
        let q_len = self.q_len();
        let h = digest_to_int(&Sha1::digest(data), q.bits());
        let q_minus_one = &q - 1u32;
        let q_minus_two = &q - 2u32;
        let mut rng = rand::thread_rng();

        loop {
            let mut seed = Zeroizing::new(vec![0u8; q_len + 8]);
            rng.fill_bytes(&mut seed);
            let k = integer(&seed) % &q_minus_one + 1u32;

            let r = g.modpow(&k, &p) % &q;
            if r.is_zero() {
                continue;
            }
            let k_inv = k.modpow(&q_minus_two, &q);
            let s = (k_inv * ((&h + &x * &r) % &q)) % &q;
            if s.is_zero() {
                continue;
            }

            let mut signature = vec![0u8; 2 * q_len];
            write_fixed(&mut signature[..q_len], &r);
            write_fixed(&mut signature[q_len..], &s);
            return Ok(signature);
        }
    }

    /// Verifies an `r || s` signature.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        let q_len = self.q_len();
        if signature.len() != 2 * q_len {
            return false;
        }
        let (p, q) = (self.p(), self.q());
        let r = integer(&signature[..q_len]);
        let s = integer(&signature[q_len..]);
        if r.is_zero() || s.is_zero() || r >= q || s >= q {
            return false;
        }

        let h = digest_to_int(&Sha1::digest(data), q.bits());
        let w = s.modpow(&(&q - 2u32), &q);
        let u1 = (&h * &w) % &q;
        let u2 = (&r * &w) % &q;
        let v = (self.g().modpow(&u1, &p) * self.y().modpow(&u2, &p)) % &p % &q;
        v == r
    }
}

impl fmt::Debug for DsaKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DsaKeyPair")
            .field("bits", &self.bits())
            .finish_non_exhaustive()
    }
}

/// An RSA or DSA key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPair {
    /// RSA
    Rsa(RsaKeyPair),
    /// DSA
    Dsa(DsaKeyPair),
}

impl KeyPair {
    /// Public key algorithm.
    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        match self {
            KeyPair::Rsa(_) => PublicKeyAlgorithm::Rsa,
            KeyPair::Dsa(_) => PublicKeyAlgorithm::Dsa,
        }
    }

    /// SSH algorithm name (`ssh-rsa` or `ssh-dss`).
    pub fn algorithm_name(&self) -> &'static str {
        self.algorithm().ssh_name()
    }

    /// Key size in bits.
    pub fn bits(&self) -> u64 {
        match self {
            KeyPair::Rsa(k) => k.bits(),
            KeyPair::Dsa(k) => k.bits(),
        }
    }

    /// Checks that the private and public halves belong together.
    pub fn is_consistent(&self) -> bool {
        match self {
            KeyPair::Rsa(k) => k.is_consistent(),
            KeyPair::Dsa(k) => k.is_consistent(),
        }
    }

    /// Signs `data` and returns the raw signature.
    pub fn sign(&self, data: &[u8]) -> BurrowResult<Vec<u8>> {
        match self {
            KeyPair::Rsa(k) => k.sign(data),
            KeyPair::Dsa(k) => k.sign(data),
        }
    }

    /// Verifies a raw signature produced by [`sign`](Self::sign).
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        match self {
            KeyPair::Rsa(k) => k.verify(data, signature),
            KeyPair::Dsa(k) => k.verify(data, signature),
        }
    }

    /// SSH public key blob: algorithm name followed by the public integers.
    pub fn public_key_blob(&self) -> Vec<u8> {
        let mut writer = DataWriter::new();
        writer.write_string(self.algorithm_name());
        match self {
            KeyPair::Rsa(k) => {
                writer.write_bigint(&k.e());
                writer.write_bigint(&k.n());
            }
            KeyPair::Dsa(k) => {
                writer.write_bigint(&k.p());
                writer.write_bigint(&k.q());
                writer.write_bigint(&k.g());
                writer.write_bigint(&k.y());
            }
        }
        writer.into_bytes()
    }

    /// MD5 fingerprint of the public blob, as colon separated hex.
    pub fn fingerprint_md5(&self) -> String {
        let digest = md5::compute(self.public_key_blob());
        digest
            .0
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(":")
    }

    /// SHA-256 fingerprint of the public blob (`SHA256:` + unpadded base64).
    pub fn fingerprint_sha256(&self) -> String {
        let digest = Sha256::digest(self.public_key_blob());
        format!(
            "SHA256:{}",
            base64::engine::general_purpose::STANDARD_NO_PAD.encode(digest)
        )
    }
}

impl From<RsaKeyPair> for KeyPair {
    fn from(key: RsaKeyPair) -> Self {
        KeyPair::Rsa(key)
    }
}

impl From<DsaKeyPair> for KeyPair {
    fn from(key: DsaKeyPair) -> Self {
        KeyPair::Dsa(key)
    }
}
