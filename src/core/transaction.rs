// Transaction data structures

use crate::core::serialize::{hex_bytes, hex_bytes_opt, write_var_bytes, write_varint};
use crate::core::types::serde_via_text;
use crate::core::{Encodable, Hash256, ParseError, hash_of};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Output reference - transaction hash + output index, written `txid:vout`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    pub txid: Hash256,
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: Hash256, vout: u32) -> Self {
        Self { txid, vout }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

impl FromStr for OutPoint {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (txid, vout) = s
            .split_once(':')
            .ok_or_else(|| ParseError::OutPoint(s.to_string()))?;
        let vout = vout
            .parse()
            .map_err(|_| ParseError::OutPoint(s.to_string()))?;
        Ok(Self::new(txid.parse()?, vout))
    }
}

serde_via_text!(OutPoint);

impl Encodable for OutPoint {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.txid.as_bytes());
        buf.extend_from_slice(&self.vout.to_le_bytes());
    }
}

/// Transaction input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TxInput {
    /// Reward-granting input with arbitrary payload and no outpoint
    Coinbase {
        #[serde(with = "hex_bytes")]
        coinbase: Vec<u8>,
    },
    /// Consumes an unspent output; `script_sig` is the owner's signature once signed
    Spend {
        outpoint: OutPoint,
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            with = "hex_bytes_opt"
        )]
        script_sig: Option<Vec<u8>>,
    },
}

impl TxInput {
    /// Create an unsigned input spending `outpoint`
    pub fn spend(outpoint: OutPoint) -> Self {
        TxInput::Spend {
            outpoint,
            script_sig: None,
        }
    }

    /// Create a coinbase input (for mining rewards)
    pub fn coinbase(data: Vec<u8>) -> Self {
        TxInput::Coinbase { coinbase: data }
    }

    pub fn is_coinbase(&self) -> bool {
        matches!(self, TxInput::Coinbase { .. })
    }

    pub fn outpoint(&self) -> Option<&OutPoint> {
        match self {
            TxInput::Spend { outpoint, .. } => Some(outpoint),
            TxInput::Coinbase { .. } => None,
        }
    }

    pub fn script_sig(&self) -> Option<&[u8]> {
        match self {
            TxInput::Spend { script_sig, .. } => script_sig.as_deref(),
            TxInput::Coinbase { .. } => None,
        }
    }
}

impl Encodable for TxInput {
    fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            TxInput::Coinbase { coinbase } => {
                buf.push(0);
                write_var_bytes(buf, coinbase);
            }
            TxInput::Spend {
                outpoint,
                script_sig,
            } => {
                buf.push(1);
                outpoint.encode(buf);
                match script_sig {
                    Some(sig) => {
                        buf.push(1);
                        write_var_bytes(buf, sig);
                    }
                    None => buf.push(0),
                }
            }
        }
    }
}

/// Transaction output - amount bound to a single owner public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Amount in the smallest unit
    pub value: u64,
    /// Serialized secp256k1 public key of the owner
    #[serde(with = "hex_bytes")]
    pub owner: Vec<u8>,
}

impl TxOutput {
    pub fn new(value: u64, owner: Vec<u8>) -> Self {
        Self { value, owner }
    }
}

impl Encodable for TxOutput {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.value.to_le_bytes());
        write_var_bytes(buf, &self.owner);
    }
}

/// Transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self { inputs, outputs }
    }

    /// Create a coinbase transaction (mining reward)
    pub fn coinbase(data: Vec<u8>, output: TxOutput) -> Self {
        Self {
            inputs: vec![TxInput::coinbase(data)],
            outputs: vec![output],
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase()
    }

    /// Transaction ID (double SHA256 of the canonical encoding, signatures included)
    pub fn txid(&self) -> Hash256 {
        hash_of(self)
    }

    /// Copy of this transaction with every `script_sig` removed
    pub fn stripped(&self) -> Transaction {
        let inputs = self
            .inputs
            .iter()
            .map(|input| match input {
                TxInput::Spend { outpoint, .. } => TxInput::spend(*outpoint),
                coinbase => coinbase.clone(),
            })
            .collect();
        Transaction::new(inputs, self.outputs.clone())
    }

    /// Digest every input signs: the hash of the signature-stripped transaction
    pub fn signature_hash(&self) -> Hash256 {
        hash_of(&self.stripped())
    }

    /// Total output value; wide enough that no sum can overflow
    pub fn total_output_value(&self) -> u128 {
        self.outputs.iter().map(|out| out.value as u128).sum()
    }
}

impl Encodable for Transaction {
    fn encode(&self, buf: &mut Vec<u8>) {
        write_varint(buf, self.inputs.len() as u64);
        for input in &self.inputs {
            input.encode(buf);
        }
        write_varint(buf, self.outputs.len() as u64);
        for output in &self.outputs {
            output.encode(buf);
        }
    }
}
