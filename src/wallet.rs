//! Wallet and WalletSet — the gateway's signing identities.
//!
//! Built once at startup from a BIP-39 seed phrase and/or a list of raw
//! private keys, immutable thereafter, destroyed at process exit. The
//! only mutable state anywhere in a [`Wallet`] lives inside the
//! signer itself (alloy's `PrivateKeySigner` caches nothing we need to
//! touch).

use std::collections::HashMap;
use std::str::FromStr;

use alloy_network::TxSigner;
use alloy_primitives::{Address, Bytes, B256};
use alloy_rpc_types_eth::TransactionRequest;
use alloy_signer::Signer;
use alloy_signer_local::coins_bip39::English;
use alloy_signer_local::{MnemonicBuilder, PrivateKeySigner};
use zeroize::Zeroize;

use crate::error::GatewayError;

/// Reef's per-wallet Substrate identity: a substrate-native address paired
/// with the same wallet's EVM one. sr25519 keypair generation is a
/// vendored cryptographic primitive this crate does not implement, so
/// only the already-derived address is carried here — a [`ReefSigner`]
/// implementation is expected to hold (or derive) the matching keypair
/// itself and use this address only to pick which one to sign with.
///
/// [`ReefSigner`]: crate::translators::reef::ReefSigner
#[derive(Debug, Clone)]
pub struct SubstrateIdentity {
    pub address: String,
}

/// A single signing identity.
///
/// `derivation_index` is `Some(i)` for wallets derived from the seed phrase
/// at BIP-44 path `m/44'/60'/0'/0/i`, `None` for wallets built from a raw
/// private key. `substrate` is `Some` only for wallets in a Reef-backed
/// [`WalletSet`], pairing the EVM address with its Substrate counterpart.
pub struct Wallet {
    pub address: Address,
    pub derivation_index: Option<u32>,
    pub substrate: Option<SubstrateIdentity>,
    signer: PrivateKeySigner,
}

impl Wallet {
    pub fn address(&self) -> Address {
        self.address
    }

    /// `signMessage(bytes) -> sig`.
    pub async fn sign_message(&self, message: &[u8]) -> Result<Bytes, GatewayError> {
        let signature = self
            .signer
            .sign_message(message)
            .await
            .map_err(|e| GatewayError::Generic(format!("signing failed: {e}")))?;
        Ok(Bytes::from(signature.as_bytes().to_vec()))
    }

    /// `signTransaction(Tx) -> bytes`. `tx` must already have
    /// `chain_id`/`nonce`/gas fields resolved by `compose_transaction`.
    pub async fn sign_transaction(
        &self,
        tx: &mut TransactionRequest,
    ) -> Result<Bytes, GatewayError> {
        let mut typed_tx = tx
            .clone()
            .build_typed_tx()
            .map_err(|_| GatewayError::InvalidParameter("incomplete transaction".into()))?;
        let signature = self
            .signer
            .sign_transaction(&mut typed_tx)
            .await
            .map_err(|e| GatewayError::Generic(format!("signing failed: {e}")))?;
        let signed = typed_tx.into_signed(signature);
        Ok(Bytes::from(signed.encoded_2718()))
    }

    fn with_chain_id(mut self, chain_id: Option<u64>) -> Self {
        self.signer = self.signer.with_chain_id(chain_id);
        self
    }
}

/// Ordered sequence of [`Wallet`]. Invariant: non-empty; addresses unique;
/// index 0 is the default sender; lookup by address is case-insensitive
/// (trivially true here since [`Address`] equality is already
/// case-insensitive — hex casing is only a checksum display convention).
pub struct WalletSet {
    wallets: Vec<Wallet>,
    by_address: HashMap<Address, usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum WalletSetError {
    #[error("no seed phrase and no private keys configured: wallet set would be empty")]
    Empty,
    #[error("invalid seed phrase: {0}")]
    InvalidMnemonic(String),
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),
}

impl WalletSet {
    /// Builds the wallet set:
    /// - derive `num_addresses` wallets from `seed_phrase` at
    ///   `m/44'/60'/0'/0/i` for `i` in `[0, num_addresses)`, if given;
    /// - append one wallet per entry in `private_keys`, in order;
    /// - zeroize both inputs once consumed;
    /// - bind every wallet to `chain_id` so signing embeds the right
    ///   replay-protection value (EIP-155);
    /// - pair wallet `i` with `reef_substrate_addresses[i]`, if present —
    ///   non-Reef callers pass an empty slice and every wallet's
    ///   `substrate` stays `None`.
    pub fn build(
        mut seed_phrase: Option<String>,
        num_addresses: u32,
        mut private_keys: Vec<String>,
        chain_id: Option<u64>,
        reef_substrate_addresses: &[String],
    ) -> Result<Self, WalletSetError> {
        let mut wallets = Vec::new();

        if let Some(phrase) = seed_phrase.as_deref() {
            for index in 0..num_addresses {
                let signer = MnemonicBuilder::<English>::default()
                    .phrase(phrase)
                    .index(index)
                    .map_err(|e| WalletSetError::InvalidMnemonic(e.to_string()))?
                    .build()
                    .map_err(|e| WalletSetError::InvalidMnemonic(e.to_string()))?;
                let address = signer.address();
                wallets.push(
                    Wallet {
                        address,
                        derivation_index: Some(index),
                        substrate: None,
                        signer,
                    }
                    .with_chain_id(chain_id),
                );
            }
        }

        for raw_key in private_keys.iter() {
            let key = B256::from_str(raw_key.trim())
                .map_err(|e| WalletSetError::InvalidPrivateKey(e.to_string()))?;
            let signer = PrivateKeySigner::from_bytes(&key)
                .map_err(|e| WalletSetError::InvalidPrivateKey(e.to_string()))?;
            let address = signer.address();
            wallets.push(
                Wallet {
                    address,
                    derivation_index: None,
                    substrate: None,
                    signer,
                }
                .with_chain_id(chain_id),
            );
        }

        if let Some(phrase) = seed_phrase.as_mut() {
            phrase.zeroize();
        }
        for key in private_keys.iter_mut() {
            key.zeroize();
        }

        if wallets.is_empty() {
            return Err(WalletSetError::Empty);
        }

        for (wallet, address) in wallets.iter_mut().zip(reef_substrate_addresses) {
            wallet.substrate = Some(SubstrateIdentity { address: address.clone() });
        }

        let by_address = wallets
            .iter()
            .enumerate()
            .map(|(i, w)| (w.address, i))
            .collect();

        Ok(Self {
            wallets,
            by_address,
        })
    }

    /// All managed addresses, in wallet-set order (index 0 first).
    pub fn addresses(&self) -> Vec<Address> {
        self.wallets.iter().map(|w| w.address).collect()
    }

    /// The default sender — wallet index 0.
    pub fn default_wallet(&self) -> &Wallet {
        &self.wallets[0]
    }

    /// Case-insensitive lookup by address.
    pub fn by_address(&self, address: Address) -> Option<&Wallet> {
        self.by_address.get(&address).map(|&i| &self.wallets[i])
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}
