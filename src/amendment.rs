//! 既存の未署名トランザクションの手数料・送金先を修正する。
//!
//! 状態は Decoded -> Reconciled -> FeeChosen -> Planned の順に一方向へ進み、
//! 最後の `reassemble` で初めて createrawtransaction を呼ぶ。入力集合は変更しない。

use bitcoin::{Amount, Network};

use crate::decision::{AmendmentSummary, DecisionSource, DestinationDecision, FeeDecision};
use crate::error::AppError;
use crate::explorer::ExplorerCollaborator;
use crate::node::NodeCollaborator;
use crate::reconciler::{Reconciliation, reconcile_inputs};
use crate::transaction::{request_new_address, submit_draft, validate_raw_hex};
use crate::types::{DecodedTransaction, InputReference, OutputTarget, UnsignedTransactionDraft};
use crate::units::to_display_unit;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmendedTransaction {
    pub hex: String,
    pub draft: UnsignedTransactionDraft,
    pub previous_fee: Amount,
    pub generated_destination: bool,
    /// 照合できず金額 0 として扱った入力
    pub unmatched: Vec<InputReference>,
}

/// 全段階を順に実行する。
pub fn amend_transaction(
    node: &dyn NodeCollaborator,
    explorer: &dyn ExplorerCollaborator,
    network: Network,
    raw_hex: &str,
    source_address: &str,
    decisions: &mut dyn DecisionSource,
    max_concurrent: usize,
) -> Result<AmendedTransaction, AppError> {
    if source_address.trim().is_empty() {
        return Err(AppError::InputValidation(
            "--source-address が必要です".to_string(),
        ));
    }

    decode(node, raw_hex)?
        .reconcile(explorer, network, source_address, max_concurrent)?
        .choose_fee(decisions)?
        .choose_destination(node, decisions)?
        .reassemble(node)
}

#[derive(Debug, Clone)]
pub struct Decoded {
    transaction: DecodedTransaction,
    previous_output: Amount,
    destination: String,
}

/// 単一出力のトランザクションのみ受け付ける。
pub fn decode(node: &dyn NodeCollaborator, raw_hex: &str) -> Result<Decoded, AppError> {
    validate_raw_hex(raw_hex)?;
    let transaction = node.decode_raw_transaction(raw_hex.trim())?;

    let output = match transaction.outputs.as_slice() {
        [output] => output.clone(),
        outputs => {
            return Err(AppError::InputValidation(format!(
                "単一出力のトランザクションのみ修正できます (出力数: {})",
                outputs.len()
            )));
        }
    };
    let destination = output.address.ok_or_else(|| {
        AppError::InputValidation("既存出力の送金先アドレスを特定できません".to_string())
    })?;

    Ok(Decoded {
        transaction,
        previous_output: output.value,
        destination,
    })
}

impl Decoded {
    pub fn reconcile(
        self,
        explorer: &dyn ExplorerCollaborator,
        network: Network,
        source_address: &str,
        max_concurrent: usize,
    ) -> Result<Reconciled, AppError> {
        let reconciliation = reconcile_inputs(
            explorer,
            network,
            &self.transaction.inputs,
            source_address,
            max_concurrent,
        )?;

        let previous_fee = reconciliation
            .total_in
            .checked_sub(self.previous_output)
            .ok_or_else(|| {
                AppError::Reconciliation(format!(
                    "直前の手数料が負になります: 入力総額 {} < 出力 {}",
                    to_display_unit(reconciliation.total_in),
                    to_display_unit(self.previous_output)
                ))
            })?;

        Ok(Reconciled {
            decoded: self,
            reconciliation,
            previous_fee,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Reconciled {
    decoded: Decoded,
    reconciliation: Reconciliation,
    previous_fee: Amount,
}

impl Reconciled {
    pub fn summary(&self) -> AmendmentSummary {
        AmendmentSummary {
            total_in: self.reconciliation.total_in,
            previous_output: self.decoded.previous_output,
            previous_fee: self.previous_fee,
        }
    }

    /// 新しい金額が正でなければここで失敗し、アドレス生成も createrawtransaction も行わない。
    pub fn choose_fee(self, decisions: &mut dyn DecisionSource) -> Result<FeeChosen, AppError> {
        let fee = match decisions.fee(&self.summary())? {
            FeeDecision::Keep => self.previous_fee,
            FeeDecision::Replace(fee) => fee,
        };

        let total_in = self.reconciliation.total_in;
        let new_amount = total_in
            .checked_sub(fee)
            .filter(|amount| *amount > Amount::ZERO)
            .ok_or(AppError::InvalidAmount {
                available: total_in.to_sat(),
                fee: fee.to_sat(),
            })?;

        Ok(FeeChosen {
            reconciled: self,
            fee,
            new_amount,
        })
    }
}

#[derive(Debug, Clone)]
pub struct FeeChosen {
    reconciled: Reconciled,
    fee: Amount,
    new_amount: Amount,
}

impl FeeChosen {
    pub fn choose_destination(
        self,
        node: &dyn NodeCollaborator,
        decisions: &mut dyn DecisionSource,
    ) -> Result<Planned, AppError> {
        let current = &self.reconciled.decoded.destination;
        let (destination, generated_destination) = match decisions.destination(current)? {
            DestinationDecision::Keep => (current.clone(), false),
            DestinationDecision::Generate => (request_new_address(node)?, true),
        };

        let Reconciled {
            decoded,
            reconciliation,
            previous_fee,
        } = self.reconciled;
        let unmatched = reconciliation.unmatched();

        Ok(Planned {
            draft: UnsignedTransactionDraft {
                inputs: decoded.transaction.inputs,
                output: OutputTarget {
                    destination,
                    amount: self.new_amount,
                },
                fee: self.fee,
                total_in: reconciliation.total_in,
            },
            previous_fee,
            generated_destination,
            unmatched,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Planned {
    draft: UnsignedTransactionDraft,
    previous_fee: Amount,
    generated_destination: bool,
    unmatched: Vec<InputReference>,
}

impl Planned {
    pub fn reassemble(self, node: &dyn NodeCollaborator) -> Result<AmendedTransaction, AppError> {
        let hex = submit_draft(node, &self.draft)?;
        Ok(AmendedTransaction {
            hex,
            draft: self.draft,
            previous_fee: self.previous_fee,
            generated_destination: self.generated_destination,
            unmatched: self.unmatched,
        })
    }
}
