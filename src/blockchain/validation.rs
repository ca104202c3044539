//! Acceptance predicates for transactions and blocks.
//!
//! Pure functions of their inputs and a read-only view of the ledger; they
//! never mutate anything.

use chrono::Utc;

use super::{
    Block, MAX_BLOCK_BYTES, MAX_BLOCK_TRANSACTIONS, MAX_FUTURE_DRIFT_MS, meets_difficulty,
};
use crate::config::ChainConfig;
use crate::error::Rejection;
use crate::transaction::Transaction;
use crate::wallet::{ADDRESS_HEX_LEN, verify_signature_hex};

/// Block validation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Fresh blocks from miners and peers: timestamps are checked.
    Strict,
    /// Replaying a remote chain: historical timestamps are not checked.
    Syncing,
}

/// What validation needs to know about committed state.
pub trait LedgerView {
    /// Number of committed blocks (genesis included).
    fn height(&self) -> u64;
    fn tip_hash(&self) -> Option<String>;
    fn balance(&self, address: &str) -> u64;
    fn difficulty(&self) -> u32;
    fn reward(&self) -> u64;
    fn lowest_acceptable_timestamp(&self) -> i64;
}

/// Stateless checks: positive amount and fee, address lengths, signature.
pub fn check_transaction(tx: &Transaction) -> Result<(), Rejection> {
    for address in [&tx.to, &tx.from] {
        if address.len() != ADDRESS_HEX_LEN {
            return Err(Rejection::BadAddress(address.len()));
        }
    }
    if tx.amount == 0 {
        return Err(Rejection::ZeroAmount);
    }
    if tx.fee == 0 {
        return Err(Rejection::ZeroFee);
    }
    tx.total_cost().ok_or(Rejection::Overflow)?;

    let signature = tx.signature.as_deref().ok_or(Rejection::InvalidSignature)?;
    match verify_signature_hex(&tx.from, signature, tx.hash().as_bytes()) {
        Ok(true) => Ok(()),
        _ => Err(Rejection::InvalidSignature),
    }
}

/// A user transaction is acceptable if it is well formed, correctly signed
/// and its sender can cover `amount + fee` from committed balance.
///
/// The nonce is not checked here; ordering is enforced at commit time.
pub fn verify_transaction(tx: &Transaction, ledger: &impl LedgerView) -> Result<(), Rejection> {
    check_transaction(tx)?;
    let need = tx.total_cost().ok_or(Rejection::Overflow)?;
    let have = ledger.balance(&tx.from);
    if have < need {
        return Err(Rejection::InsufficientBalance { have, need });
    }
    Ok(())
}

/// Header-level and coinbase checks for a block extending the current tip.
///
/// User transactions are checked by the Chain Mutator, which needs the
/// in-block projection of sender state.
pub fn verify_block(block: &Block, ledger: &impl LedgerView, mode: Mode) -> Result<(), Rejection> {
    verify_block_at(block, ledger, mode, Utc::now().timestamp_millis())
}

/// `verify_block` against an explicit wall-clock time (Unix ms).
pub fn verify_block_at(
    block: &Block,
    ledger: &impl LedgerView,
    mode: Mode,
    now: i64,
) -> Result<(), Rejection> {
    let hash = block.hash();
    if !meets_difficulty(&hash, ledger.difficulty()) {
        return Err(Rejection::InsufficientWork(hash, ledger.difficulty()));
    }

    let tip = ledger.tip_hash().unwrap_or_default();
    if block.previous_hash != tip {
        return Err(Rejection::PreviousHashMismatch {
            expected: tip,
            got: block.previous_hash.clone(),
        });
    }

    if block.index != ledger.height() {
        return Err(Rejection::IndexMismatch {
            expected: ledger.height(),
            got: block.index,
        });
    }

    verify_coinbase(block, ledger.reward())?;

    let count = block.user_transactions().len();
    if count > MAX_BLOCK_TRANSACTIONS {
        return Err(Rejection::TooManyTransactions {
            count,
            max: MAX_BLOCK_TRANSACTIONS,
        });
    }
    let bytes = block.user_bytes();
    if bytes > MAX_BLOCK_BYTES {
        return Err(Rejection::BlockTooLarge {
            bytes,
            max: MAX_BLOCK_BYTES,
        });
    }

    if mode == Mode::Strict {
        let median = ledger.lowest_acceptable_timestamp();
        if block.timestamp <= median {
            return Err(Rejection::TimestampTooOld {
                timestamp: block.timestamp,
                median,
            });
        }
        let limit = now.saturating_add(MAX_FUTURE_DRIFT_MS);
        if block.timestamp >= limit {
            return Err(Rejection::TimestampTooNew {
                timestamp: block.timestamp,
                limit,
            });
        }
    }
    Ok(())
}

/// The coinbase may claim at most `reward + fees`; under-claiming is allowed.
fn verify_coinbase(block: &Block, reward: u64) -> Result<(), Rejection> {
    let coinbase = block
        .coinbase()
        .ok_or(Rejection::InvalidCoinbase("block has no transactions"))?;
    if !coinbase.is_coinbase() {
        return Err(Rejection::InvalidCoinbase("first transaction is not from Network"));
    }
    if coinbase.to.len() != ADDRESS_HEX_LEN {
        return Err(Rejection::BadAddress(coinbase.to.len()));
    }
    let allowed = block
        .total_fees()
        .and_then(|fees| fees.checked_add(reward))
        .ok_or(Rejection::Overflow)?;
    if coinbase.amount > allowed {
        return Err(Rejection::ExcessiveReward {
            claimed: coinbase.amount,
            allowed,
        });
    }
    Ok(())
}

/// Genesis must meet the initial difficulty, sit at index 0 and hold only
/// a coinbase of exactly the initial reward.
pub fn verify_genesis_block(block: &Block, config: &ChainConfig) -> Result<(), Rejection> {
    if !meets_difficulty(&block.hash(), config.initial_difficulty) {
        return Err(Rejection::InvalidGenesis("insufficient proof-of-work"));
    }
    if block.index != 0 {
        return Err(Rejection::InvalidGenesis("index is not 0"));
    }
    let [coinbase] = block.data.as_slice() else {
        return Err(Rejection::InvalidGenesis("must hold exactly one transaction"));
    };
    if !coinbase.is_coinbase() {
        return Err(Rejection::InvalidGenesis("transaction is not a coinbase"));
    }
    if coinbase.to.len() != ADDRESS_HEX_LEN {
        return Err(Rejection::InvalidGenesis("recipient is not an address"));
    }
    if coinbase.amount != config.initial_reward {
        return Err(Rejection::InvalidGenesis("reward differs from initial reward"));
    }
    Ok(())
}
