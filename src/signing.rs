//! RSA PKCS#1 v1.5 / SHA-256 signing and key handling.
//!
//! Signatures are byte-compatible with Node's `createSign('RSA-SHA256')`:
//! the payload is hashed with SHA-256 and the DigestInfo is signed with
//! deterministic PKCS#1 v1.5 padding.

use std::path::Path;

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::signature::{SignatureEncoding as _, Signer as _, Verifier as _};
use rsa::traits::PublicKeyParts as _;
use rsa::{RsaPrivateKey, RsaPublicKey};
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{AttestError, Result, ResultExt as _};
use crate::util;

/// Smallest accepted modulus size.
pub const MIN_RSA_BITS: usize = 2048;

pub const SIGNATURE_KIND: &str = "rsa-pkcs1v15-sha256";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerDescriptor {
    /// SHA-256 hex of the signer's SubjectPublicKeyInfo DER.
    pub key_id: String,
    /// Signature scheme, e.g. "rsa-pkcs1v15-sha256".
    pub kind: String,
    pub bits: usize,
}

/// Trait boundary for all signer implementations.
pub trait Signer: Send + Sync {
    fn descriptor(&self) -> &SignerDescriptor;
    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>>;
}

/// Sign `payload` and return the signature as lowercase hex.
pub fn sign_hex(signer: &dyn Signer, payload: &[u8]) -> Result<String> {
    Ok(hex::encode(signer.sign(payload)?))
}

fn spki_key_id(key: &RsaPublicKey) -> Result<String> {
    let der = key
        .to_public_key_der()
        .ctx_crypto("encode public key DER")?;
    Ok(util::sha256_hex(der.as_bytes()))
}

fn check_modulus(bits: usize) -> Result<()> {
    if bits < MIN_RSA_BITS {
        return Err(AttestError::Crypto(format!(
            "RSA key is {bits} bits; at least {MIN_RSA_BITS} required"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// PEM signer
// ---------------------------------------------------------------------------

pub struct RsaPemSigner {
    signing_key: SigningKey<Sha256>,
    public_key: RsaPublicKey,
    descriptor: SignerDescriptor,
}

impl std::fmt::Debug for RsaPemSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaPemSigner")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl RsaPemSigner {
    /// Parse a PKCS#8 (`BEGIN PRIVATE KEY`) or PKCS#1 (`BEGIN RSA PRIVATE KEY`)
    /// PEM document.
    pub fn from_pem(pem: &SecretString) -> Result<Self> {
        let pem = pem.expose_secret();
        if pem.trim().is_empty() {
            return Err(AttestError::Crypto("private key PEM is empty".into()));
        }
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            // Never echo key material into error strings.
            .map_err(|_| AttestError::Crypto("parse RSA private key PEM failed".into()))?;
        Self::from_private_key(private_key)
    }

    pub fn from_key_pem_path(key_pem_path: &Path) -> Result<Self> {
        let pem = std::fs::read_to_string(key_pem_path)
            // Avoid including key paths in error strings.
            .map_err(|e| AttestError::Crypto(format!("read key pem failed: {e}")))?;
        Self::from_pem(&SecretString::new(pem.into()))
    }

    pub fn from_private_key(private_key: RsaPrivateKey) -> Result<Self> {
        let bits = private_key.size() * 8;
        check_modulus(bits)?;
        let public_key = private_key.to_public_key();
        let descriptor = SignerDescriptor {
            key_id: spki_key_id(&public_key)?,
            kind: SIGNATURE_KIND.to_string(),
            bits,
        };
        Ok(Self {
            signing_key: SigningKey::<Sha256>::new(private_key),
            public_key,
            descriptor,
        })
    }

    /// The matching verification key.
    pub fn public_key(&self) -> Result<PublicKeyMaterial> {
        PublicKeyMaterial::from_rsa(self.public_key.clone())
    }
}

impl Signer for RsaPemSigner {
    fn descriptor(&self) -> &SignerDescriptor {
        &self.descriptor
    }

    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>> {
        let sig: Signature = self.signing_key.try_sign(msg).ctx_crypto("RSA sign")?;
        Ok(sig.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Verification key
// ---------------------------------------------------------------------------

/// Read-only RSA public key used by the verifier.
#[derive(Debug, Clone)]
pub struct PublicKeyMaterial {
    key: RsaPublicKey,
    key_id: String,
}

impl PublicKeyMaterial {
    /// Parse an SPKI (`BEGIN PUBLIC KEY`) PEM, falling back to PKCS#1
    /// (`BEGIN RSA PUBLIC KEY`).
    pub fn from_pem(pem: &str) -> Result<Self> {
        let key = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .ctx_crypto("parse RSA public key PEM")?;
        Self::from_rsa(key)
    }

    pub fn from_pem_path(path: &Path) -> Result<Self> {
        let pem = std::fs::read_to_string(path)
            .map_err(|e| AttestError::Crypto(format!("read public key pem failed: {e}")))?;
        Self::from_pem(&pem)
    }

    pub fn from_rsa(key: RsaPublicKey) -> Result<Self> {
        check_modulus(key.size() * 8)?;
        let key_id = spki_key_id(&key)?;
        Ok(Self { key, key_id })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn to_pem(&self) -> Result<String> {
        self.key
            .to_public_key_pem(LineEnding::LF)
            .ctx_crypto("encode public key PEM")
    }

    /// `true` only if `sig` is a valid signature of exactly `msg`.
    pub fn verify(&self, msg: &[u8], sig: &[u8]) -> bool {
        let Ok(sig) = Signature::try_from(sig) else {
            return false;
        };
        VerifyingKey::<Sha256>::new(self.key.clone())
            .verify(msg, &sig)
            .is_ok()
    }
}

// ---------------------------------------------------------------------------
// Key generation (dev / POC)
// ---------------------------------------------------------------------------

/// Generate an RSA key pair and return `(private PKCS#8 PEM, public SPKI PEM)`.
pub fn generate_rsa_pem(bits: usize) -> Result<(SecretString, String)> {
    check_modulus(bits)?;
    let private_key =
        RsaPrivateKey::new(&mut rand::thread_rng(), bits).ctx_crypto("generate RSA key")?;
    let private_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .ctx_crypto("encode pkcs8 pem")?;
    let public_pem = private_key
        .to_public_key()
        .to_public_key_pem(LineEnding::LF)
        .ctx_crypto("encode spki pem")?;
    Ok((SecretString::new(private_pem.as_str().into()), public_pem))
}

/// Generate an RSA key pair and write `signing_key.pem` and `signing_pub.pem`
/// to `out_dir`.
pub fn keygen_rsa(out_dir: &Path, bits: usize) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .map_err(|e| AttestError::Crypto(format!("create {}: {e}", out_dir.display())))?;

    let (private_pem, public_pem) = generate_rsa_pem(bits)?;

    let key_path = out_dir.join("signing_key.pem");
    std::fs::write(&key_path, private_pem.expose_secret().as_bytes())
        .map_err(|e| AttestError::Crypto(format!("write {}: {e}", key_path.display())))?;

    let pub_path = out_dir.join("signing_pub.pem");
    std::fs::write(&pub_path, public_pem.as_bytes())
        .map_err(|e| AttestError::Crypto(format!("write {}: {e}", pub_path.display())))?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::LazyLock;

    static SIGNER: LazyLock<RsaPemSigner> = LazyLock::new(|| {
        let (private_pem, _) = generate_rsa_pem(MIN_RSA_BITS).unwrap();
        RsaPemSigner::from_pem(&private_pem).unwrap()
    });

    #[test]
    fn sign_verify_round_trip() {
        let pk = SIGNER.public_key().unwrap();
        let sig = SIGNER.sign(b"test message").unwrap();
        assert_eq!(sig.len(), MIN_RSA_BITS / 8);
        assert!(pk.verify(b"test message", &sig));
    }

    #[test]
    fn bad_signature_rejected() {
        let pk = SIGNER.public_key().unwrap();
        let sig = SIGNER.sign(b"test message").unwrap();
        assert!(!pk.verify(b"different message", &sig));
        assert!(!pk.verify(b"test message", &sig[1..]));
        assert!(!pk.verify(b"test message", b""));
    }

    #[test]
    fn signing_is_deterministic_and_hex_is_lowercase() {
        let a = sign_hex(&*SIGNER, b"payload").unwrap();
        let b = sign_hex(&*SIGNER, b"payload").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, a.to_lowercase());
        assert_eq!(a.len(), MIN_RSA_BITS / 4);
    }

    #[test]
    fn public_pem_round_trips() {
        let pk = SIGNER.public_key().unwrap();
        let reparsed = PublicKeyMaterial::from_pem(&pk.to_pem().unwrap()).unwrap();
        assert_eq!(reparsed.key_id(), SIGNER.descriptor().key_id);
        assert_eq!(SIGNER.descriptor().kind, SIGNATURE_KIND);
    }

    #[test]
    fn malformed_private_key_rejected() {
        let err = RsaPemSigner::from_pem(&SecretString::new("not a key".into())).unwrap_err();
        assert!(matches!(err, AttestError::Crypto(_)));
        assert!(!err.to_string().contains("not a key"));

        let err = RsaPemSigner::from_pem(&SecretString::new("".into())).unwrap_err();
        assert!(matches!(err, AttestError::Crypto(_)));
    }

    #[test]
    fn short_keys_rejected() {
        let small = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let err = RsaPemSigner::from_private_key(small.clone()).unwrap_err();
        assert!(err.to_string().contains("at least 2048"));
        assert!(PublicKeyMaterial::from_rsa(small.to_public_key()).is_err());
        assert!(generate_rsa_pem(1024).is_err());
    }
}
