use bitcoin::{Amount, Network};
use serde::Serialize;

use crate::error::AppError;
use crate::explorer::ExplorerCollaborator;
use crate::node::NodeCollaborator;
use crate::reconciler::reconcile_inputs;
use crate::transaction::validate_raw_hex;
use crate::units::to_display_unit;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub txid: String,
    pub source_address: String,
    pub inputs: Vec<InputView>,
    pub outputs: Vec<OutputView>,
    pub total_in: String,
    pub total_out: String,
    /// 出力合計が入力合計を上回る場合は null
    pub fee: Option<String>,
    pub unmatched_inputs: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct InputView {
    pub txid: String,
    pub vout: u32,
    pub value: String,
    pub matched: bool,
}

#[derive(Debug, Serialize)]
pub struct OutputView {
    pub address: Option<String>,
    pub value: String,
}

/// 生トランザクションをデコードし、入力金額を照合して表示用にまとめる。複数出力も扱う。
pub fn inspect_transaction(
    node: &dyn NodeCollaborator,
    explorer: &dyn ExplorerCollaborator,
    network: Network,
    raw_hex: &str,
    source_address: &str,
    max_concurrent: usize,
) -> Result<TransactionView, AppError> {
    validate_raw_hex(raw_hex)?;
    if source_address.trim().is_empty() {
        return Err(AppError::InputValidation(
            "--source-address が必要です".to_string(),
        ));
    }

    let decoded = node.decode_raw_transaction(raw_hex.trim())?;
    let reconciliation =
        reconcile_inputs(explorer, network, &decoded.inputs, source_address, max_concurrent)?;

    let mut total_out = Amount::ZERO;
    for output in &decoded.outputs {
        total_out = total_out
            .checked_add(output.value)
            .ok_or_else(|| AppError::Internal("出力総額がオーバーフローしました".to_string()))?;
    }
    let fee = reconciliation.total_in.checked_sub(total_out);
    if fee.is_none() {
        log::warn!("出力合計が照合済みの入力合計を上回っています。手数料を算出できません。");
    }

    Ok(TransactionView {
        txid: decoded.txid.to_string(),
        source_address: source_address.to_string(),
        inputs: reconciliation
            .inputs
            .iter()
            .map(|input| InputView {
                txid: input.reference.txid.to_string(),
                vout: input.reference.vout,
                value: to_display_unit(input.value),
                matched: input.is_matched(),
            })
            .collect(),
        outputs: decoded
            .outputs
            .iter()
            .map(|output| OutputView {
                address: output.address.clone(),
                value: to_display_unit(output.value),
            })
            .collect(),
        total_in: to_display_unit(reconciliation.total_in),
        total_out: to_display_unit(total_out),
        fee: fee.map(to_display_unit),
        unmatched_inputs: reconciliation
            .unmatched()
            .iter()
            .map(ToString::to_string)
            .collect(),
    })
}
