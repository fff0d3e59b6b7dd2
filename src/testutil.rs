//! テスト用のノード・エクスプローラの代替実装。呼び出しを記録する。

use std::cell::RefCell;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;

use bitcoin::{Amount, Network, Txid};

use crate::error::AppError;
use crate::explorer::ExplorerCollaborator;
use crate::node::NodeCollaborator;
use crate::types::{
    DecodedOutput, DecodedTransaction, ExternalOutput, ExternalTxRecord, InputReference,
    OutputTarget, SignedTransaction, UnspentOutput,
};

pub fn txid(byte: u8) -> Txid {
    Txid::from_str(&format!("{:02x}", byte).repeat(32)).unwrap()
}

pub fn unspent(byte: u8, vout: u32, sats: u64) -> UnspentOutput {
    UnspentOutput {
        address: "tb1qsource".to_string(),
        txid: txid(byte),
        vout,
        amount: Amount::from_sat(sats),
        spendable: true,
    }
}

pub fn record(outputs: &[(&[&str], u64)]) -> ExternalTxRecord {
    ExternalTxRecord {
        error: None,
        outputs: outputs
            .iter()
            .map(|(addresses, value)| ExternalOutput {
                addresses: addresses.iter().map(|a| a.to_string()).collect(),
                value: Amount::from_sat(*value),
            })
            .collect(),
    }
}

pub fn decoded(inputs: &[(u8, u32)], outputs: &[(&str, u64)]) -> DecodedTransaction {
    DecodedTransaction {
        txid: txid(0xee),
        inputs: inputs
            .iter()
            .map(|&(byte, vout)| InputReference { txid: txid(byte), vout })
            .collect(),
        outputs: outputs
            .iter()
            .map(|&(address, sats)| DecodedOutput {
                value: Amount::from_sat(sats),
                address: Some(address.to_string()),
            })
            .collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeCall {
    ListUnspent(Vec<String>),
    Decode(String),
    Create(Vec<InputReference>, OutputTarget),
    GetNewAddress,
    Sign(String),
    Send(String),
}

pub struct MockNode {
    pub unspent: Vec<UnspentOutput>,
    pub decoded: Option<DecodedTransaction>,
    pub fresh_address: String,
    pub created_hex: String,
    pub create_error: Option<String>,
    pub signed: Option<SignedTransaction>,
    pub sent_txid: String,
    pub calls: RefCell<Vec<NodeCall>>,
}

impl Default for MockNode {
    fn default() -> Self {
        Self {
            unspent: Vec::new(),
            decoded: None,
            fresh_address: "tb1qfreshaddress".to_string(),
            created_hex: "0200000001abcdef".to_string(),
            create_error: None,
            signed: None,
            sent_txid: txid(0x5e).to_string(),
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl MockNode {
    pub fn count(&self, predicate: impl Fn(&NodeCall) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| predicate(c)).count()
    }

    pub fn created(&self) -> Vec<(Vec<InputReference>, OutputTarget)> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                NodeCall::Create(inputs, output) => Some((inputs.clone(), output.clone())),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: NodeCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl NodeCollaborator for MockNode {
    fn list_spendable_outputs(&self, addresses: &[String]) -> Result<Vec<UnspentOutput>, AppError> {
        self.record(NodeCall::ListUnspent(addresses.to_vec()));
        Ok(self.unspent.clone())
    }

    fn decode_raw_transaction(&self, hex: &str) -> Result<DecodedTransaction, AppError> {
        self.record(NodeCall::Decode(hex.to_string()));
        self.decoded
            .clone()
            .ok_or_else(|| AppError::node("decoderawtransaction: TX decode failed"))
    }

    fn create_raw_transaction(
        &self,
        inputs: &[InputReference],
        output: &OutputTarget,
    ) -> Result<String, AppError> {
        self.record(NodeCall::Create(inputs.to_vec(), output.clone()));
        match &self.create_error {
            Some(message) => Err(AppError::node(message.clone())),
            None => Ok(self.created_hex.clone()),
        }
    }

    fn get_new_address(&self) -> Result<String, AppError> {
        self.record(NodeCall::GetNewAddress);
        Ok(self.fresh_address.clone())
    }

    fn sign_raw_transaction(&self, hex: &str) -> Result<SignedTransaction, AppError> {
        self.record(NodeCall::Sign(hex.to_string()));
        self.signed
            .clone()
            .ok_or_else(|| AppError::node("signrawtransactionwithwallet: not configured"))
    }

    fn send_raw_transaction(&self, hex: &str) -> Result<String, AppError> {
        self.record(NodeCall::Send(hex.to_string()));
        Ok(self.sent_txid.clone())
    }
}

/// 登録されていない txid は通信障害として扱う。
#[derive(Default)]
pub struct MockExplorer {
    pub records: HashMap<Txid, ExternalTxRecord>,
    pub lookups: Mutex<Vec<Txid>>,
}

impl MockExplorer {
    pub fn with(mut self, byte: u8, record: ExternalTxRecord) -> Self {
        self.records.insert(txid(byte), record);
        self
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.lock().unwrap().len()
    }
}

impl ExplorerCollaborator for MockExplorer {
    fn get_transaction_record(
        &self,
        _network: Network,
        txid: &Txid,
    ) -> Result<ExternalTxRecord, AppError> {
        self.lookups.lock().unwrap().push(*txid);
        self.records
            .get(txid)
            .cloned()
            .ok_or_else(|| AppError::explorer(format!("{}: HTTP 503 Service Unavailable", txid)))
    }
}
