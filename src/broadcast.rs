use crate::error::AppError;
use crate::node::NodeCollaborator;
use crate::transaction::validate_raw_hex;

/// ノードのウォレットで署名し、完全に署名できた場合のみブロードキャストする。
pub fn sign_and_send(node: &dyn NodeCollaborator, raw_hex: &str) -> Result<String, AppError> {
    validate_raw_hex(raw_hex)?;

    log::info!("トランザクションに署名しています...");
    let signed = node.sign_raw_transaction(raw_hex.trim())?;

    if !signed.complete || !signed.errors.is_empty() {
        let details = signed
            .errors
            .iter()
            .map(|e| format!("{}:{}: {}", e.txid, e.vout, e.error))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(AppError::SigningIncomplete(if details.is_empty() {
            "complete=false".to_string()
        } else {
            details
        }));
    }
    log::debug!("署名済みトランザクション: {}", signed.hex);

    log::info!("トランザクションをネットワークにブロードキャストしています...");
    let txid = node.send_raw_transaction(&signed.hex)?;
    log::info!("ブロードキャストに成功しました: {}", txid);
    Ok(txid)
}
