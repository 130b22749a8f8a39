//! Signing identities and transaction signing.
//!
//! # Security
//! - Seeds are parsed once and never logged or serialized
//! - The private key stays inside [`Signer`]; its `Debug` prints the address only
//! - Signing is deterministic (RFC 6979), so equal seeds sign equal bytes equally

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Signature, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::coins_bip39::English;
use alloy::signers::local::{MnemonicBuilder, PrivateKeySigner};
use alloy::signers::Signer as _;

use crate::blockchain::types::{encode_app_data, SignedTransaction, TxParams};
use crate::error::{Error, Result};

/// Separator between a mnemonic and its account index (`phrase//3`).
pub const INDEX_SEPARATOR: &str = "//";

/// An identity capable of producing authenticated transactions.
///
/// Holds no nonce state; nonces are allocated per account by the tracker.
pub struct Signer {
    /// The underlying private key.
    key: PrivateKeySigner,
    /// Transaction signer built from the same key.
    wallet: EthereumWallet,
}

impl Signer {
    /// Derive a signer from a seed string.
    ///
    /// Accepts a hex private key (with or without `0x`), a BIP-39 English
    /// mnemonic, or a mnemonic followed by `//index` to pick an account.
    pub fn derive(seed: &str) -> Result<Self> {
        let seed = seed.trim();
        if seed.is_empty() {
            return Err(Error::InvalidSeed("seed is empty".to_string()));
        }

        let key_hex = seed.strip_prefix("0x").unwrap_or(seed);
        if key_hex.len() == 64 && key_hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Self::from_private_key(key_hex);
        }

        match seed.split_once(INDEX_SEPARATOR) {
            Some((phrase, index)) => {
                let index: u32 = index
                    .trim()
                    .parse()
                    .map_err(|_| Error::InvalidSeed("account index is not a number".to_string()))?;
                Self::from_mnemonic(phrase.trim(), index)
            }
            None => Self::from_mnemonic(seed, 0),
        }
    }

    /// Create a signer from a hex-encoded private key string.
    pub fn from_private_key(private_key_hex: &str) -> Result<Self> {
        let key_hex = private_key_hex.strip_prefix("0x").unwrap_or(private_key_hex);
        let key: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| Error::InvalidSeed(format!("Invalid private key format: {}", e)))?;
        Ok(Self::from_key(key))
    }

    /// Create a signer from a mnemonic at account `index` of the standard
    /// derivation path.
    pub fn from_mnemonic(phrase: &str, index: u32) -> Result<Self> {
        let key = MnemonicBuilder::<English>::default()
            .phrase(phrase)
            .index(index)
            .map_err(|e| Error::InvalidSeed(format!("Invalid account index: {}", e)))?
            .build()
            .map_err(|e| Error::InvalidSeed(format!("Invalid mnemonic: {}", e)))?;
        Ok(Self::from_key(key))
    }

    fn from_key(key: PrivateKeySigner) -> Self {
        let wallet = EthereumWallet::from(key.clone());
        tracing::info!(address = %key.address(), "Signer initialized");
        Self { key, wallet }
    }

    /// Get the signer's address.
    pub fn address(&self) -> Address {
        self.key.address()
    }

    /// Sign arbitrary message bytes (with Ethereum prefix).
    pub async fn sign_message(&self, message: &[u8]) -> Result<Signature> {
        self.key
            .sign_message(message)
            .await
            .map_err(|e| Error::Signing(format!("Message signing failed: {}", e)))
    }

    /// Build and sign a transaction carrying `payload` under `app_id`.
    pub async fn sign_and_prepare(
        &self,
        payload: &[u8],
        app_id: u32,
        params: &TxParams,
    ) -> Result<SignedTransaction> {
        let request = TransactionRequest::default()
            .with_from(self.address())
            .with_to(params.to)
            .with_value(U256::ZERO)
            .with_input(encode_app_data(app_id, payload))
            .with_nonce(params.nonce)
            .with_gas_price(params.gas_price)
            .with_gas_limit(params.gas_limit)
            .with_chain_id(params.chain_id);

        let envelope = request
            .build(&self.wallet)
            .await
            .map_err(|e| Error::Signing(format!("Transaction signing failed: {}", e)))?;

        Ok(SignedTransaction {
            hash: *envelope.tx_hash(),
            raw: envelope.encoded_2718().into(),
            sender: self.address(),
            nonce: params.nonce,
            app_id,
        })
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("address", &self.address())
            .finish()
    }
}
