use ecdsa::hazmat::{bits2field, sign_prehashed};
use p192::ecdsa::signature::hazmat::PrehashVerifier;
use p192::ecdsa::{Signature, VerifyingKey};
use p192::elliptic_curve::sec1::ToEncodedPoint;
use p192::elliptic_curve::{NonZeroScalar, SecretKey};
use p192::{NistP192, Scalar};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::error::WalletError;
use crate::transaction::Transaction;

/// Hex length of an address: the raw 48-byte (x || y) P-192 public key.
pub const ADDRESS_HEX_LEN: usize = 96;

/// SEC1 tag of an uncompressed point; addresses carry the point without it.
const SEC1_UNCOMPRESSED: u8 = 0x04;

/// A P-192 signing key and the address derived from it.
#[derive(Clone)]
pub struct KeyPair {
    secret: SecretKey<NistP192>,
    address: String,
}

impl KeyPair {
    /// Generate a fresh key pair from the OS RNG.
    pub fn generate() -> Self {
        Self::from_secret(SecretKey::random(&mut OsRng))
    }

    /// Restore a key pair from its hex-encoded 24-byte secret scalar.
    pub fn from_private_hex(private_hex: &str) -> Result<Self, WalletError> {
        let bytes = hex::decode(private_hex.trim())?;
        let secret = SecretKey::from_slice(&bytes).map_err(|_| WalletError::InvalidKey)?;
        Ok(Self::from_secret(secret))
    }

    fn from_secret(secret: SecretKey<NistP192>) -> Self {
        let point = secret.public_key().to_encoded_point(false);
        let address = hex::encode(&point.as_bytes()[1..]);
        Self { secret, address }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn private_hex(&self) -> String {
        hex::encode(self.secret.to_bytes())
    }

    /// Sign `message` (SHA-256 prehash) and return the hex r || s signature.
    pub fn sign(&self, message: &[u8]) -> Result<String, WalletError> {
        let digest = Sha256::digest(message);
        let z = bits2field::<NistP192>(&digest).map_err(|_| WalletError::Signing)?;
        let d = self.secret.to_nonzero_scalar();
        let k = NonZeroScalar::<NistP192>::random(&mut OsRng);
        let (signature, _) =
            sign_prehashed::<NistP192, Scalar>(&d, *k, &z).map_err(|_| WalletError::Signing)?;
        Ok(hex::encode(signature.to_bytes()))
    }

    /// Build and sign a transaction from this key's address.
    pub fn transaction(
        &self,
        to: &str,
        amount: u64,
        fee: u64,
        nonce: u64,
    ) -> Result<Transaction, WalletError> {
        let mut tx = Transaction::new(to, &self.address, amount, fee, nonce);
        tx.signature = Some(self.sign(tx.hash().as_bytes())?);
        Ok(tx)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Decode an address into the P-192 verifying key it encodes.
pub fn parse_address(address: &str) -> Result<VerifyingKey, WalletError> {
    let point = hex::decode(address)?;
    if point.len() * 2 != ADDRESS_HEX_LEN {
        return Err(WalletError::InvalidKey);
    }
    let mut sec1 = Vec::with_capacity(point.len() + 1);
    sec1.push(SEC1_UNCOMPRESSED);
    sec1.extend_from_slice(&point);
    VerifyingKey::from_sec1_bytes(&sec1).map_err(|_| WalletError::InvalidKey)
}

/// Verify a hex signature against an address used as the verifying key.
pub fn verify_signature_hex(
    address: &str,
    signature_hex: &str,
    message: &[u8],
) -> Result<bool, WalletError> {
    let key = parse_address(address)?;

    let sig_bytes = hex::decode(signature_hex)?;
    let signature = Signature::from_slice(&sig_bytes).map_err(|_| WalletError::Signing)?;

    let digest = Sha256::digest(message);
    Ok(key.verify_prehash(&digest, &signature).is_ok())
}
