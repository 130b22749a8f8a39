//! Chain-facing types shared by the client, signer and tracker.

use alloy::primitives::{Address, Bytes, TxHash, B256};

/// Base cost of a transaction, in gas.
pub const BASE_TX_GAS: u64 = 21_000;

/// Gas charged per calldata byte (non-zero byte price, used for every byte).
pub const CALLDATA_BYTE_GAS: u64 = 16;

/// Length of the application id prefix in calldata.
pub const APP_ID_LEN: usize = 4;

/// Where a transaction landed, as reported by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InclusionReport {
    pub block_number: u64,
    pub block_hash: B256,
    pub transaction_index: u64,
    pub transaction_hash: TxHash,
    /// Execution status; `false` means the transaction reverted.
    pub success: bool,
}

/// Immutable finality record for a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FinalityRecord {
    pub block_height: u64,
    pub block_hash: B256,
    pub transaction_index: u64,
    pub transaction_hash: B256,
}

impl From<&InclusionReport> for FinalityRecord {
    fn from(report: &InclusionReport) -> Self {
        Self {
            block_height: report.block_number,
            block_hash: report.block_hash,
            transaction_index: report.transaction_index,
            transaction_hash: report.transaction_hash,
        }
    }
}

/// Progress of a submission towards finality, from one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationStatus {
    /// Not yet seen in any canonical block.
    Pending,
    /// Included, waiting for `current` to reach `target`.
    Confirming { current: u64, target: u64 },
    /// Included in a final block.
    Confirmed(FinalityRecord),
    /// Included but failed execution.
    Failed(String),
}

/// Transaction fields supplied by the network side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxParams {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Address,
}

/// A signed, encoded transaction ready for broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub hash: TxHash,
    /// EIP-2718 encoding.
    pub raw: Bytes,
    pub sender: Address,
    pub nonce: u64,
    pub app_id: u32,
}

/// Per-submission overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubmitOptions {
    pub app_id: u32,
    /// Explicit nonce instead of the signer's counter.
    pub nonce: Option<u64>,
    /// Mortality window overriding the configured one.
    pub mortality_blocks: Option<u64>,
}

impl SubmitOptions {
    pub fn new(app_id: u32) -> Self {
        Self {
            app_id,
            ..Default::default()
        }
    }

    pub fn nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn mortality_blocks(mut self, blocks: u64) -> Self {
        self.mortality_blocks = Some(blocks);
        self
    }
}

/// Calldata carrying `payload` under `app_id`: big-endian id, then payload.
pub fn encode_app_data(app_id: u32, payload: &[u8]) -> Bytes {
    let mut data = Vec::with_capacity(APP_ID_LEN + payload.len());
    data.extend_from_slice(&app_id.to_be_bytes());
    data.extend_from_slice(payload);
    Bytes::from(data)
}

/// Split calldata produced by [`encode_app_data`].
pub fn decode_app_data(data: &[u8]) -> Option<(u32, &[u8])> {
    if data.len() < APP_ID_LEN {
        return None;
    }
    let (id, payload) = data.split_at(APP_ID_LEN);
    let id = u32::from_be_bytes(id.try_into().ok()?);
    Some((id, payload))
}

/// Gas limit for a data transaction with `calldata_len` bytes of input.
pub fn data_gas_limit(calldata_len: usize) -> u64 {
    BASE_TX_GAS + calldata_len as u64 * CALLDATA_BYTE_GAS
}
