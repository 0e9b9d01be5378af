//! Local signing of contract-creation transactions.

use alloy_consensus::{SignableTransaction, TxLegacy};
use alloy_core::primitives::{Address, B256, Bytes, Signature, TxKind, U256};
use alloy_eips::eip2718::Encodable2718;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;

use crate::AccountKey;

/// An unsigned legacy (EIP-155) contract-creation transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationTransaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub input: Bytes,
}

impl CreationTransaction {
    fn to_legacy(&self) -> TxLegacy {
        TxLegacy {
            chain_id: Some(self.chain_id),
            nonce: self.nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            to: TxKind::Create,
            value: U256::ZERO,
            input: self.input.clone(),
        }
    }

    /// Hash signed over, committing to the chain id.
    pub fn signature_hash(&self) -> B256 {
        self.to_legacy().signature_hash()
    }
}

/// A signed transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub raw: Bytes,
    pub hash: B256,
    pub signature: Signature,
}

/// The deploying account of a profile.
#[derive(Debug, Clone)]
pub struct DeploySigner {
    signer: PrivateKeySigner,
}

impl DeploySigner {
    pub fn from_key(key: &AccountKey) -> Result<Self, String> {
        Ok(Self {
            signer: key.signer()?,
        })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Address the contract created by this account at `nonce` will get.
    pub fn contract_address(&self, nonce: u64) -> Address {
        self.address().create(nonce)
    }

    pub fn sign(&self, tx: &CreationTransaction) -> Result<SignedTransaction, String> {
        let tx = tx.to_legacy();
        let signature = self
            .signer
            .sign_hash_sync(&tx.signature_hash())
            .map_err(|e| format!("failed to sign transaction: {}", e))?;

        let signed = tx.into_signed(signature);
        let raw: Bytes = signed.encoded_2718().into();

        Ok(SignedTransaction {
            raw,
            hash: *signed.hash(),
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::keccak256;
    use k256::ecdsa::{RecoveryId, VerifyingKey};

    use super::*;

    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn creation(chain_id: u64) -> CreationTransaction {
        CreationTransaction {
            chain_id,
            nonce: 0,
            gas_price: 25_000_000_000,
            gas_limit: 8_500_000,
            input: Bytes::from(vec![0x60, 0x80, 0x60, 0x40, 0x52]),
        }
    }

    fn recover(tx: &CreationTransaction, signed: &SignedTransaction) -> Address {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&signed.signature.r().to_be_bytes::<32>());
        bytes[32..].copy_from_slice(&signed.signature.s().to_be_bytes::<32>());
        let signature = k256::ecdsa::Signature::from_slice(&bytes).unwrap();
        let recovery_id = RecoveryId::from_byte(u8::from(signed.signature.v())).unwrap();

        let key = VerifyingKey::recover_from_prehash(
            tx.signature_hash().as_slice(),
            &signature,
            recovery_id,
        )
        .unwrap();

        let point = key.to_encoded_point(false);
        Address::from_slice(&keccak256(&point.as_bytes()[1..])[12..])
    }

    #[test]
    fn test_signature_recovers_to_signer() {
        let signer = DeploySigner::from_key(&AccountKey::new(KEY)).unwrap();
        let tx = creation(1001);
        let signed = signer.sign(&tx).unwrap();

        assert_eq!(recover(&tx, &signed), signer.address());
        assert_eq!(
            signed
                .signature
                .recover_address_from_prehash(&tx.signature_hash())
                .unwrap(),
            signer.address()
        );
    }

    #[test]
    fn test_signing_is_deterministic() {
        let signer = DeploySigner::from_key(&AccountKey::new(KEY)).unwrap();
        let tx = creation(8217);
        assert_eq!(signer.sign(&tx).unwrap(), signer.sign(&tx).unwrap());
    }

    #[test]
    fn test_raw_is_rlp_list_and_hash_matches() {
        let signer = DeploySigner::from_key(&AccountKey::new(KEY)).unwrap();
        let signed = signer.sign(&creation(31337)).unwrap();

        // Long-list prefix: payload is above 55 bytes once r and s are in.
        assert_eq!(signed.raw[0], 0xf8);
        assert_eq!(signed.raw[1] as usize, signed.raw.len() - 2);
        assert_eq!(signed.hash, keccak256(&signed.raw));
    }

    #[test]
    fn test_raw_decodes_as_eip155_creation() {
        use alloy_consensus::TxEnvelope;
        use alloy_eips::eip2718::Decodable2718;

        let signer = DeploySigner::from_key(&AccountKey::new(KEY)).unwrap();
        let tx = creation(1001);
        let signed = signer.sign(&tx).unwrap();

        let TxEnvelope::Legacy(decoded) = TxEnvelope::decode_2718(&mut signed.raw.as_ref()).unwrap()
        else {
            panic!("expected a legacy transaction");
        };
        assert_eq!(decoded.tx().chain_id, Some(1001));
        assert_eq!(decoded.tx().to, TxKind::Create);
        assert_eq!(decoded.tx().input, tx.input);
        assert_eq!(*decoded.hash(), signed.hash);
        assert_eq!(*decoded.signature(), signed.signature);
    }

    #[test]
    fn test_chain_id_changes_signature_hash() {
        assert_ne!(creation(1001).signature_hash(), creation(8217).signature_hash());
    }

    #[test]
    fn test_contract_address_prediction() {
        let signer = DeploySigner::from_key(&AccountKey::new(KEY)).unwrap();
        // First contract deployed by anvil's default account.
        assert_eq!(
            signer.contract_address(0),
            "0x5FbDB2315678afecb367f032d93F642f64180aa3"
                .parse::<Address>()
                .unwrap()
        );
    }
}
