use bitcoin::Amount;

use crate::error::AppError;
use crate::node::NodeCollaborator;
use crate::types::InputReference;
use crate::units::to_display_unit;

/// 送金元アドレスの未使用出力をすべて入力として集めたもの。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedInputs {
    pub inputs: Vec<InputReference>,
    pub total_in: Amount,
}

pub fn aggregate_inputs(
    node: &dyn NodeCollaborator,
    source_address: &str,
) -> Result<AggregatedInputs, AppError> {
    if source_address.trim().is_empty() {
        return Err(AppError::InputValidation(
            "送金元アドレスが必要です (source address required)".to_string(),
        ));
    }

    let (spendable, skipped): (Vec<_>, Vec<_>) = node
        .list_spendable_outputs(&[source_address.to_string()])?
        .into_iter()
        .partition(|utxo| utxo.spendable);

    for utxo in &skipped {
        log::warn!(
            "使用不可の出力をスキップします: {}:{} ({})",
            utxo.txid,
            utxo.vout,
            to_display_unit(utxo.amount)
        );
    }

    if spendable.is_empty() {
        return Err(AppError::InputValidation(format!(
            "{} に使用可能な未使用出力がありません",
            source_address
        )));
    }

    log::info!("{} 件の未使用出力を使用します ({})", spendable.len(), source_address);

    let mut inputs = Vec::with_capacity(spendable.len());
    let mut total_in = Amount::ZERO;
    for utxo in &spendable {
        log::debug!(
            "{}:{}\t{}\t({})",
            utxo.txid,
            utxo.vout,
            to_display_unit(utxo.amount),
            utxo.address
        );
        total_in = total_in
            .checked_add(utxo.amount)
            .ok_or_else(|| AppError::Internal("入力総額がオーバーフローしました".to_string()))?;
        inputs.push(InputReference {
            txid: utxo.txid,
            vout: utxo.vout,
        });
    }

    Ok(AggregatedInputs { inputs, total_in })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockNode, NodeCall, txid, unspent};

    #[test]
    fn aggregates_every_output_with_its_own_vout() {
        let node = MockNode {
            unspent: vec![unspent(0xaa, 0, 2_000_000), unspent(0xbb, 5, 1_000_000)],
            ..MockNode::default()
        };

        let aggregated = aggregate_inputs(&node, "tb1qsource").unwrap();

        assert_eq!(aggregated.total_in, Amount::from_sat(3_000_000));
        assert_eq!(
            aggregated.inputs,
            vec![
                InputReference { txid: txid(0xaa), vout: 0 },
                InputReference { txid: txid(0xbb), vout: 5 },
            ]
        );
        assert_eq!(
            *node.calls.borrow(),
            vec![NodeCall::ListUnspent(vec!["tb1qsource".to_string()])]
        );
    }

    #[test]
    fn empty_source_is_rejected_before_any_call() {
        let node = MockNode::default();

        assert!(matches!(aggregate_inputs(&node, ""), Err(AppError::InputValidation(_))));
        assert!(node.calls.borrow().is_empty());
    }

    #[test]
    fn no_spendable_outputs_stops_after_listing() {
        let mut locked = unspent(0xaa, 0, 5_000);
        locked.spendable = false;
        let node = MockNode {
            unspent: vec![locked],
            ..MockNode::default()
        };

        assert!(matches!(
            aggregate_inputs(&node, "tb1qsource"),
            Err(AppError::InputValidation(_))
        ));
        assert_eq!(node.calls.borrow().len(), 1);
    }
}
