use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Sender sentinel of the coinbase (reward) transaction.
pub const NETWORK_SENDER: &str = "Network";

/// A signed value transfer between two addresses.
///
/// Wire form carries exactly these fields; the hash is derived on access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub to: String,
    pub from: String,
    pub amount: u64,
    pub fee: u64,
    pub nonce: u64,
    /// Unix milliseconds (UTC).
    pub timestamp: i64,
    /// Hex r || s signature over the hash; `None` only for the coinbase.
    pub signature: Option<String>,
}

impl Transaction {
    /// Build an unsigned transaction stamped with the current time.
    pub fn new(to: &str, from: &str, amount: u64, fee: u64, nonce: u64) -> Self {
        Self {
            to: to.to_string(),
            from: from.to_string(),
            amount,
            fee,
            nonce,
            timestamp: Utc::now().timestamp_millis(),
            signature: None,
        }
    }

    /// Reward transaction paying `amount` to `to`.
    pub fn coinbase(to: &str, amount: u64) -> Self {
        Self::new(to, NETWORK_SENDER, amount, 0, 0)
    }

    pub fn is_coinbase(&self) -> bool {
        self.from == NETWORK_SENDER
    }

    /// SHA-256 over `to, from, amount, fee, nonce, timestamp`, lowercase hex.
    /// This is the identity of the transaction and its signing payload.
    pub fn hash(&self) -> String {
        let preimage = format!(
            "{}{}{}{}{}{}",
            self.to, self.from, self.amount, self.fee, self.nonce, self.timestamp
        );
        hex::encode(Sha256::digest(preimage.as_bytes()))
    }

    /// Total debited from the sender, `None` on overflow.
    pub fn total_cost(&self) -> Option<u64> {
        self.amount.checked_add(self.fee)
    }

    /// Length of the JSON wire form in bytes.
    pub fn wire_size(&self) -> usize {
        serde_json::to_vec(self).map_or(usize::MAX, |json| json.len())
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl Eq for Transaction {}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transaction {
        Transaction {
            to: "a".repeat(96),
            from: "b".repeat(96),
            amount: 49,
            fee: 1,
            nonce: 0,
            timestamp: 1_700_000_000_000,
            signature: None,
        }
    }

    #[test]
    fn hash_is_sha256_of_field_concatenation() {
        let tx = sample();
        let preimage = format!("{}{}4910{}", "a".repeat(96), "b".repeat(96), 1_700_000_000_000i64);
        assert_eq!(tx.hash(), hex::encode(Sha256::digest(preimage.as_bytes())));
        assert_eq!(tx.hash().len(), 64);
    }

    #[test]
    fn signature_is_not_part_of_identity() {
        let tx = sample();
        let mut signed = sample();
        signed.signature = Some("00".into());
        assert_eq!(tx, signed);
    }

    #[test]
    fn any_field_change_changes_hash() {
        let base = sample().hash();
        let mut tx = sample();
        tx.nonce = 1;
        assert_ne!(tx.hash(), base);
        let mut tx = sample();
        tx.fee = 2;
        assert_ne!(tx.hash(), base);
    }

    #[test]
    fn wire_form_uses_plain_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["from"], "b".repeat(96));
        assert_eq!(json["amount"], 49);
        assert!(json["signature"].is_null());
        assert!(json.get("hash").is_none());
    }
}
