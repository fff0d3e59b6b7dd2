use std::fmt;

use bitcoin::{Amount, Txid};

use crate::units::to_display_unit;

/// `listunspent` の1要素。金額はこの時点で satoshi に変換済み。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnspentOutput {
    pub address: String,
    pub txid: Txid,
    pub vout: u32,
    pub amount: Amount,
    pub spendable: bool,
}

/// 消費する過去の出力への参照。金額は持たない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputReference {
    pub txid: Txid,
    pub vout: u32,
}

impl fmt::Display for InputReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

/// エクスプローラとの照合結果。一致する出力が無ければ `value` は 0、`owner` は None。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledInput {
    pub reference: InputReference,
    pub value: Amount,
    pub owner: Option<String>,
}

impl ReconciledInput {
    pub fn is_matched(&self) -> bool {
        self.owner.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub destination: String,
    pub amount: Amount,
}

/// 署名前トランザクションの下書き。受取人は常に1つ。
///
/// `fee == total_in - output.amount` を保つ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransactionDraft {
    pub inputs: Vec<InputReference>,
    pub output: OutputTarget,
    pub fee: Amount,
    pub total_in: Amount,
}

/// create-tx / modify-tx が標準出力に出す下書きの詳細。
pub struct DraftReport<'a> {
    pub draft: &'a UnsignedTransactionDraft,
    pub source_address: &'a str,
    pub generated_destination: bool,
}

impl fmt::Display for DraftReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let draft = self.draft;
        writeln!(f, "***transaction details***")?;
        writeln!(f, "destination address:\t{}", draft.output.destination)?;
        if self.generated_destination {
            writeln!(f, "\t\t\t(新しく生成した送金先アドレス)")?;
        }
        writeln!(f, "source address:\t\t{}", self.source_address)?;
        for input in &draft.inputs {
            writeln!(f, "input:\t\t\t{}", input)?;
        }
        writeln!(f, "total input amount:\t{}", to_display_unit(draft.total_in))?;
        writeln!(f, "fee:\t\t\t{}", to_display_unit(draft.fee))?;
        write!(f, "output amount:\t\t{}", to_display_unit(draft.output.amount))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalOutput {
    pub addresses: Vec<String>,
    pub value: Amount,
}

/// エクスプローラから取得したトランザクション記録。呼び出しごとに取得し直す。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalTxRecord {
    pub error: Option<String>,
    pub outputs: Vec<ExternalOutput>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedOutput {
    pub value: Amount,
    pub address: Option<String>,
}

/// `decoderawtransaction` の結果。入力側に金額は含まれない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTransaction {
    pub txid: Txid,
    pub inputs: Vec<InputReference>,
    pub outputs: Vec<DecodedOutput>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInputError {
    pub txid: String,
    pub vout: u32,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub hex: String,
    pub complete: bool,
    pub errors: Vec<SignInputError>,
}
