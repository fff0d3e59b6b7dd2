use bitcoin::Amount;

use crate::aggregator::aggregate_inputs;
use crate::error::AppError;
use crate::node::NodeCollaborator;
use crate::types::{InputReference, OutputTarget, UnsignedTransactionDraft};
use crate::units::to_display_unit;

/// ノードに渡して得た未署名トランザクション。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledTransaction {
    pub hex: String,
    pub draft: UnsignedTransactionDraft,
    /// 送金先をノードに新規生成させた場合 true
    pub generated_destination: bool,
}

/// 送金元アドレスの未使用出力をすべて集め、1出力の未署名トランザクションを作る。
pub fn create_transaction(
    node: &dyn NodeCollaborator,
    source_address: &str,
    destination: Option<&str>,
    fee: Amount,
    default_fee: Amount,
) -> Result<AssembledTransaction, AppError> {
    log::info!("トランザクション構築処理を開始します。");
    let aggregated = aggregate_inputs(node, source_address)?;
    assemble_transaction(
        node,
        aggregated.inputs,
        destination,
        fee,
        default_fee,
        aggregated.total_in,
    )
}

/// `fee` が 0 の場合は `default_fee` を使う。
pub fn assemble_transaction(
    node: &dyn NodeCollaborator,
    inputs: Vec<InputReference>,
    destination: Option<&str>,
    fee: Amount,
    default_fee: Amount,
    total_in: Amount,
) -> Result<AssembledTransaction, AppError> {
    let fee = if fee == Amount::ZERO { default_fee } else { fee };

    let amount = match total_in.checked_sub(fee) {
        Some(amount) if amount > Amount::ZERO => amount,
        _ => {
            return Err(AppError::InsufficientFunds {
                available: total_in.to_sat(),
                fee: fee.to_sat(),
            });
        }
    };

    let (destination, generated_destination) = match destination.filter(|d| !d.trim().is_empty()) {
        Some(destination) => (destination.trim().to_string(), false),
        None => (request_new_address(node)?, true),
    };

    let draft = UnsignedTransactionDraft {
        inputs,
        output: OutputTarget {
            destination,
            amount,
        },
        fee,
        total_in,
    };
    let hex = submit_draft(node, &draft)?;

    Ok(AssembledTransaction {
        hex,
        draft,
        generated_destination,
    })
}

/// 既存の生トランザクションとして受け付ける前の形式チェック。
pub fn validate_raw_hex(raw_hex: &str) -> Result<(), AppError> {
    if raw_hex.trim().is_empty() {
        return Err(AppError::InputValidation("--raw-tx が必要です".to_string()));
    }
    hex::decode(raw_hex.trim())
        .map(|_| ())
        .map_err(|e| AppError::InputValidation(format!("raw transaction の16進数が不正です: {}", e)))
}

/// ノードのウォレットに新しいアドレスを作らせる。取り消せない操作なので必ずログに残す。
pub fn request_new_address(node: &dyn NodeCollaborator) -> Result<String, AppError> {
    log::warn!("送金先が指定されていないため、新しい出力アドレスを生成します。");
    let address = node.get_new_address()?;
    if address.is_empty() {
        return Err(AppError::node("getnewaddress: 空のアドレスが返されました"));
    }
    log::warn!("新しい出力アドレス: {}", address);
    Ok(address)
}

/// 下書きを createrawtransaction に渡し、未署名の hex を返す。
pub fn submit_draft(
    node: &dyn NodeCollaborator,
    draft: &UnsignedTransactionDraft,
) -> Result<String, AppError> {
    if draft.output.amount.checked_add(draft.fee) != Some(draft.total_in) {
        return Err(AppError::Internal(format!(
            "入出力が一致しません: 入力 {} != 出力 {} + 手数料 {}",
            draft.total_in, draft.output.amount, draft.fee
        )));
    }

    log::debug!(
        "createrawtransaction: 入力 {} 件, {} => {}",
        draft.inputs.len(),
        draft.output.destination,
        to_display_unit(draft.output.amount)
    );
    let hex = node.create_raw_transaction(&draft.inputs, &draft.output)?;
    log::info!("未署名トランザクションの生成に成功しました。");
    Ok(hex)
}
