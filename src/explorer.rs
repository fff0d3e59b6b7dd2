//! 参照済みトランザクションの出力金額を取得するためのブロックエクスプローラ。

use std::time::Duration;

use bitcoin::{Amount, Network, Txid};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::ExplorerSettings;
use crate::error::AppError;
use crate::types::{ExternalOutput, ExternalTxRecord};

/// 入力ごとの照会を並行して行うため `Sync` を要求する。
pub trait ExplorerCollaborator: Sync {
    fn get_transaction_record(
        &self,
        network: Network,
        txid: &Txid,
    ) -> Result<ExternalTxRecord, AppError>;
}

#[derive(Deserialize)]
struct RawRecord {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    outputs: Vec<RawOutput>,
}

#[derive(Deserialize)]
struct RawOutput {
    // OP_RETURN 出力では null になる
    #[serde(default)]
    addresses: Option<Vec<String>>,
    value: u64,
}

impl From<RawRecord> for ExternalTxRecord {
    fn from(raw: RawRecord) -> Self {
        ExternalTxRecord {
            error: raw.error.filter(|e| !e.is_empty()),
            outputs: raw
                .outputs
                .into_iter()
                .map(|o| ExternalOutput {
                    addresses: o.addresses.unwrap_or_default(),
                    value: Amount::from_sat(o.value),
                })
                .collect(),
        }
    }
}

pub struct BlockcypherExplorer {
    base_url: String,
    token: Option<String>,
    client: reqwest::blocking::Client,
}

impl BlockcypherExplorer {
    pub fn new(settings: &ExplorerSettings) -> Result<Self, AppError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| AppError::explorer(format!("HTTPクライアントの初期化に失敗: {}", e)))?;
        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token: settings.api_token.clone(),
            client,
        })
    }

    fn transaction_url(&self, network: Network, txid: &Txid) -> Result<String, AppError> {
        Ok(format!(
            "{}/v1/btc/{}/txs/{}",
            self.base_url,
            network_path(network)?,
            txid
        ))
    }
}

impl ExplorerCollaborator for BlockcypherExplorer {
    fn get_transaction_record(
        &self,
        network: Network,
        txid: &Txid,
    ) -> Result<ExternalTxRecord, AppError> {
        let url = self.transaction_url(network, txid)?;
        log::debug!("- GET {}", url);

        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.query(&[("token", token)]);
        }

        let response = request
            .send()
            .map_err(|e| AppError::explorer(format!("{}: 取得に失敗: {}", txid, e)))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| AppError::explorer(format!("{}: 応答の読み込みに失敗: {}", txid, e)))?;

        interpret_explorer_response(txid, status, &body)
    }
}

fn network_path(network: Network) -> Result<&'static str, AppError> {
    match network {
        Network::Bitcoin => Ok("main"),
        Network::Testnet => Ok("test3"),
        other => Err(AppError::InputValidation(format!(
            "エクスプローラが対応していないネットワークです: {:?}",
            other
        ))),
    }
}

/// 未知の txid には 404 と `{"error": ...}` が返る。これだけは通信障害ではなく記録側のエラーとして扱う。
/// 429 (レート制限) や 5xx は error 本文があっても通信障害。
fn interpret_explorer_response(
    txid: &Txid,
    status: StatusCode,
    body: &str,
) -> Result<ExternalTxRecord, AppError> {
    match serde_json::from_str::<RawRecord>(body).map(ExternalTxRecord::from) {
        Ok(record)
            if record.error.is_some()
                && (status.is_success() || status == StatusCode::NOT_FOUND) =>
        {
            Ok(record)
        }
        Ok(_) | Err(_) if !status.is_success() => Err(AppError::explorer(format!(
            "{}: HTTP {}",
            txid, status
        ))),
        Ok(record) => Ok(record),
        Err(e) => Err(AppError::explorer(format!(
            "{}: 応答のパースに失敗: {}",
            txid, e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::reconcile_inputs;
    use crate::testutil::txid;
    use crate::types::InputReference;

    #[test]
    fn parses_outputs_and_null_addresses() {
        let body = r#"{
            "block_hash": "0000",
            "outputs": [
                {"value": 2000000, "addresses": ["tb1qother", "tb1qsource"], "script": "0014"},
                {"value": 0, "addresses": null, "script_type": "null-data"}
            ]
        }"#;

        let record = interpret_explorer_response(&txid(0xaa), StatusCode::OK, body).unwrap();

        assert_eq!(record.error, None);
        assert_eq!(record.outputs[0].value, Amount::from_sat(2_000_000));
        assert_eq!(record.outputs[0].addresses[1], "tb1qsource");
        assert!(record.outputs[1].addresses.is_empty());
    }

    #[test]
    fn unknown_transaction_is_a_record_error() {
        let body = r#"{"error": "Transaction aa not found."}"#;

        let record = interpret_explorer_response(&txid(0xaa), StatusCode::NOT_FOUND, body).unwrap();

        assert_eq!(record.error.as_deref(), Some("Transaction aa not found."));
    }

    #[test]
    fn transport_failures_are_collaborator_errors() {
        let rate_limited =
            interpret_explorer_response(&txid(0xaa), StatusCode::TOO_MANY_REQUESTS, "{}").unwrap_err();
        assert!(matches!(rate_limited, AppError::Collaborator { service: "explorer", .. }));

        let malformed = interpret_explorer_response(&txid(0xaa), StatusCode::OK, "<html>").unwrap_err();
        assert!(matches!(malformed, AppError::Collaborator { service: "explorer", .. }));
    }

    #[test]
    fn error_bodies_on_rate_limit_and_server_failure_are_collaborator_errors() {
        let rate_limited = interpret_explorer_response(
            &txid(0xaa),
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error": "Limits reached."}"#,
        )
        .unwrap_err();
        assert!(matches!(rate_limited, AppError::Collaborator { service: "explorer", .. }));

        let server = interpret_explorer_response(
            &txid(0xaa),
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"error": "Internal error, please retry."}"#,
        )
        .unwrap_err();
        assert!(matches!(server, AppError::Collaborator { service: "explorer", .. }));
    }

    struct CannedExplorer {
        status: StatusCode,
        body: &'static str,
    }

    impl ExplorerCollaborator for CannedExplorer {
        fn get_transaction_record(
            &self,
            _network: Network,
            txid: &Txid,
        ) -> Result<ExternalTxRecord, AppError> {
            interpret_explorer_response(txid, self.status, self.body)
        }
    }

    #[test]
    fn rate_limit_aborts_reconciliation_as_transport_failure() {
        let inputs = [InputReference { txid: txid(0xaa), vout: 0 }];
        let limited = CannedExplorer {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: r#"{"error": "Limits reached."}"#,
        };
        let err = reconcile_inputs(&limited, Network::Testnet, &inputs, "tb1qsource", 3).unwrap_err();
        assert!(matches!(err, AppError::Collaborator { service: "explorer", .. }));

        let unknown = CannedExplorer {
            status: StatusCode::NOT_FOUND,
            body: r#"{"error": "Transaction aa not found."}"#,
        };
        let err = reconcile_inputs(&unknown, Network::Testnet, &inputs, "tb1qsource", 3).unwrap_err();
        assert!(matches!(err, AppError::Reconciliation(_)));
    }

    #[test]
    fn builds_network_specific_url() {
        let explorer = BlockcypherExplorer::new(&ExplorerSettings {
            base_url: "https://api.example.test/".to_string(),
            ..ExplorerSettings::default()
        })
        .unwrap();

        let url = explorer.transaction_url(Network::Testnet, &txid(0x0f)).unwrap();

        assert_eq!(url, format!("https://api.example.test/v1/btc/test3/txs/{}", txid(0x0f)));
        assert!(explorer.transaction_url(Network::Regtest, &txid(0x0f)).is_err());
    }
}
