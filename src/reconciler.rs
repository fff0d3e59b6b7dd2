//! 生トランザクションの入力は (txid, vout) しか持たないため、
//! 参照先トランザクションの出力をエクスプローラから引いて入力金額を復元する。

use std::thread;

use bitcoin::{Amount, Network};

use crate::error::AppError;
use crate::explorer::ExplorerCollaborator;
use crate::types::{ExternalOutput, ExternalTxRecord, InputReference, ReconciledInput};
use crate::units::to_display_unit;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub inputs: Vec<ReconciledInput>,
    /// 一致した入力の金額のみの合計。
    pub total_in: Amount,
}

impl Reconciliation {
    pub fn unmatched(&self) -> Vec<InputReference> {
        self.inputs
            .iter()
            .filter(|input| !input.is_matched())
            .map(|input| input.reference)
            .collect()
    }

    pub fn is_partial(&self) -> bool {
        self.inputs.iter().any(|input| !input.is_matched())
    }
}

/// 入力ごとの照会は最大 `max_concurrent` 件ずつ並行して行い、全件の完了を待ってから合計する。
pub fn reconcile_inputs(
    explorer: &dyn ExplorerCollaborator,
    network: Network,
    inputs: &[InputReference],
    owner: &str,
    max_concurrent: usize,
) -> Result<Reconciliation, AppError> {
    let mut reconciled = Vec::with_capacity(inputs.len());

    for batch in inputs.chunks(max_concurrent.max(1)) {
        let results: Vec<Result<ReconciledInput, AppError>> = thread::scope(|scope| {
            let handles: Vec<_> = batch
                .iter()
                .map(|input| scope.spawn(move || reconcile_one(explorer, network, input, owner)))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(AppError::Internal("照会スレッドがパニックしました".to_string()))
                    })
                })
                .collect()
        });

        for result in results {
            reconciled.push(result?);
        }
    }

    let mut total_in = Amount::ZERO;
    for input in reconciled.iter().filter(|input| input.is_matched()) {
        total_in = total_in
            .checked_add(input.value)
            .ok_or_else(|| AppError::Internal("入力総額がオーバーフローしました".to_string()))?;
    }

    let reconciliation = Reconciliation {
        inputs: reconciled,
        total_in,
    };
    if reconciliation.is_partial() {
        for missing in reconciliation.unmatched() {
            log::warn!(
                "入力 {} に {} の出力が見つかりません。金額 0 として扱います (照合は部分的です)",
                missing,
                owner
            );
        }
    }
    log::debug!("照合済み入力総額: {}", to_display_unit(reconciliation.total_in));

    Ok(reconciliation)
}

fn reconcile_one(
    explorer: &dyn ExplorerCollaborator,
    network: Network,
    input: &InputReference,
    owner: &str,
) -> Result<ReconciledInput, AppError> {
    let record = explorer.get_transaction_record(network, &input.txid)?;
    if let Some(error) = &record.error {
        return Err(AppError::Reconciliation(format!("{}: {}", input.txid, error)));
    }
    Ok(match_owned_output(&record, input, owner))
}

/// アドレス集合に `owner` を含む出力を探す。入力自身の vout 位置の出力を優先する。
pub fn match_owned_output(
    record: &ExternalTxRecord,
    input: &InputReference,
    owner: &str,
) -> ReconciledInput {
    let owned = |output: &&ExternalOutput| output.addresses.iter().any(|a| a == owner);

    let matched = usize::try_from(input.vout)
        .ok()
        .and_then(|index| record.outputs.get(index))
        .filter(owned)
        .or_else(|| {
            let fallback = record.outputs.iter().find(owned);
            if fallback.is_some() && vout_beyond_record(record, input) {
                // エクスプローラは既定で先頭20出力までしか返さない
                log::warn!(
                    "入力 {} の出力位置が取得した記録 ({} 出力) の範囲外です。同じアドレスの別の出力の金額を使用するため、正確でない可能性があります",
                    input,
                    record.outputs.len()
                );
            }
            fallback
        });

    match matched {
        Some(output) => ReconciledInput {
            reference: *input,
            value: output.value,
            owner: Some(owner.to_string()),
        },
        None => ReconciledInput {
            reference: *input,
            value: Amount::ZERO,
            owner: None,
        },
    }
}

/// 記録に入力自身の vout 位置の出力が含まれていない (切り詰められている) か。
pub fn vout_beyond_record(record: &ExternalTxRecord, input: &InputReference) -> bool {
    usize::try_from(input.vout)
        .ok()
        .is_none_or(|index| index >= record.outputs.len())
}
