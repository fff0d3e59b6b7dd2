//! フルノードとの接続。
//!
//! `NodeCollaborator` はコアが必要とするノード機能の境界で、
//! `NodeClient` がそれを JSON-RPC (HTTP) または bitcoin-cli プロセス経由で実装する。

use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bitcoin::Txid;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::config::NodeSettings;
use crate::error::AppError;
use crate::types::{
    DecodedOutput, DecodedTransaction, InputReference, OutputTarget, SignInputError,
    SignedTransaction, UnspentOutput,
};
use crate::units::{to_display_unit, to_smallest_unit};

pub trait NodeCollaborator {
    fn list_spendable_outputs(&self, addresses: &[String]) -> Result<Vec<UnspentOutput>, AppError>;
    fn decode_raw_transaction(&self, hex: &str) -> Result<DecodedTransaction, AppError>;
    fn create_raw_transaction(
        &self,
        inputs: &[InputReference],
        output: &OutputTarget,
    ) -> Result<String, AppError>;
    fn get_new_address(&self) -> Result<String, AppError>;
    fn sign_raw_transaction(&self, hex: &str) -> Result<SignedTransaction, AppError>;
    fn send_raw_transaction(&self, hex: &str) -> Result<String, AppError>;
}

/// `{method, params}` を送り `result` を受け取る1往復。
pub trait Transport {
    fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, AppError>;
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a [Value],
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Value,
}

/// bitcoind の JSON-RPC インターフェース (Basic 認証付き HTTP POST)。
pub struct RpcTransport {
    url: String,
    user: Option<String>,
    password: Option<String>,
    next_id: AtomicU64,
    client: reqwest::blocking::Client,
}

impl RpcTransport {
    pub fn new(settings: &NodeSettings) -> Result<Self, AppError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| AppError::node(format!("HTTPクライアントの初期化に失敗: {}", e)))?;
        Ok(Self {
            url: settings.rpc_url.clone(),
            user: settings.rpc_user.clone(),
            password: settings.rpc_password.clone(),
            next_id: AtomicU64::new(1),
            client,
        })
    }
}

impl Transport for RpcTransport {
    fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, AppError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            jsonrpc: "1.0",
            id,
            method,
            params: &params,
        };

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(user) = &self.user {
            builder = builder.basic_auth(user, self.password.as_deref());
        }

        let response = builder
            .send()
            .map_err(|e| AppError::node(format!("{}: RPC送信に失敗: {}", method, e)))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| AppError::node(format!("{}: 応答の読み込みに失敗: {}", method, e)))?;

        interpret_rpc_response(method, status, &body)
    }
}

/// bitcoind は RPC エラー時に HTTP 500 と JSON 本文を返すため、本文の error を優先して報告する。
fn interpret_rpc_response(method: &str, status: StatusCode, body: &str) -> Result<Value, AppError> {
    match serde_json::from_str::<RpcResponse>(body) {
        Ok(response) if !response.error.is_null() => Err(AppError::node(format!(
            "{}: {}",
            method,
            describe_rpc_error(&response.error)
        ))),
        Ok(_) if !status.is_success() => Err(AppError::node(format!("{}: HTTP {}", method, status))),
        Ok(response) => Ok(response.result),
        Err(_) if !status.is_success() => {
            Err(AppError::node(format!("{}: HTTP {}", method, status)))
        }
        Err(e) => Err(AppError::node(format!("{}: 応答のパースに失敗: {}", method, e))),
    }
}

fn describe_rpc_error(error: &Value) -> String {
    match (error.get("code"), error.get("message").and_then(Value::as_str)) {
        (Some(code), Some(message)) => format!("code {}: {}", code, message),
        (None, Some(message)) => message.to_string(),
        _ => error.to_string(),
    }
}

/// bitcoin-cli を子プロセスとして実行する。
pub struct CliTransport {
    binary: String,
    args: Vec<String>,
}

impl CliTransport {
    pub fn new(settings: &NodeSettings) -> Self {
        Self {
            binary: settings.cli_binary.clone(),
            args: settings.cli_args.clone(),
        }
    }
}

impl Transport for CliTransport {
    fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, AppError> {
        let rendered: Vec<String> = params.iter().map(render_cli_param).collect();

        let output = Command::new(&self.binary)
            .args(&self.args)
            .arg(method)
            .args(&rendered)
            .output()
            .map_err(|e| AppError::node(format!("{} の起動に失敗: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::node(format!(
                "{}: {} ({})",
                method,
                stderr.trim(),
                output.status
            )));
        }

        Ok(parse_cli_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn render_cli_param(param: &Value) -> String {
    match param {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// getnewaddress などは JSON ではなく生の文字列を出力する。
fn parse_cli_output(stdout: &str) -> Value {
    let trimmed = stdout.trim();
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

#[derive(Deserialize)]
struct RawUnspent {
    #[serde(default)]
    address: String,
    txid: Txid,
    vout: u32,
    amount: f64,
    #[serde(default)]
    spendable: bool,
}

#[derive(Deserialize)]
struct RawDecoded {
    txid: Txid,
    vin: Vec<RawVin>,
    vout: Vec<RawVout>,
}

#[derive(Deserialize)]
struct RawVin {
    txid: Option<Txid>,
    vout: Option<u32>,
}

#[derive(Deserialize)]
struct RawVout {
    value: f64,
    #[serde(rename = "scriptPubKey")]
    script_pub_key: RawScriptPubKey,
}

#[derive(Deserialize)]
struct RawScriptPubKey {
    address: Option<String>,
    // v22 より前の bitcoind
    #[serde(default)]
    addresses: Vec<String>,
}

#[derive(Deserialize)]
struct RawSigned {
    hex: String,
    complete: bool,
    #[serde(default)]
    errors: Vec<RawSignError>,
}

#[derive(Deserialize)]
struct RawSignError {
    #[serde(default)]
    txid: String,
    #[serde(default)]
    vout: u32,
    #[serde(default)]
    error: String,
}

/// `Transport` の上に型付きのノード操作を載せたもの。
pub struct NodeClient<T> {
    transport: T,
}

impl<T: Transport> NodeClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    fn invoke(&self, method: &str, params: Vec<Value>) -> Result<Value, AppError> {
        log::debug!("- command: {} {}", method, Value::Array(params.clone()));
        self.transport.call(method, params)
    }
}

fn parse_result<R: DeserializeOwned>(method: &str, value: Value) -> Result<R, AppError> {
    serde_json::from_value(value)
        .map_err(|e| AppError::node(format!("{} の応答を解釈できません: {}", method, e)))
}

fn expect_string(method: &str, value: Value) -> Result<String, AppError> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        other => Err(AppError::node(format!(
            "{} の応答が文字列ではありません: {}",
            method, other
        ))),
    }
}

impl<T: Transport> NodeCollaborator for NodeClient<T> {
    fn list_spendable_outputs(&self, addresses: &[String]) -> Result<Vec<UnspentOutput>, AppError> {
        let value = self.invoke("listunspent", vec![json!(0), json!(9_999_999), json!(addresses)])?;
        let raw: Vec<RawUnspent> = parse_result("listunspent", value)?;

        raw.into_iter()
            .map(|utxo| {
                Ok(UnspentOutput {
                    address: utxo.address,
                    txid: utxo.txid,
                    vout: utxo.vout,
                    amount: to_smallest_unit(utxo.amount)?,
                    spendable: utxo.spendable,
                })
            })
            .collect()
    }

    fn decode_raw_transaction(&self, hex: &str) -> Result<DecodedTransaction, AppError> {
        let value = self.invoke("decoderawtransaction", vec![json!(hex)])?;
        let raw: RawDecoded = parse_result("decoderawtransaction", value)?;

        let inputs = raw
            .vin
            .into_iter()
            .enumerate()
            .map(|(index, vin)| match (vin.txid, vin.vout) {
                (Some(txid), Some(vout)) => Ok(InputReference { txid, vout }),
                _ => Err(AppError::InputValidation(format!(
                    "入力 {} が過去の出力を参照していません (coinbase)",
                    index
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let outputs = raw
            .vout
            .into_iter()
            .map(|vout| {
                let RawScriptPubKey { address, addresses } = vout.script_pub_key;
                Ok(DecodedOutput {
                    value: to_smallest_unit(vout.value)?,
                    address: address.or_else(|| addresses.into_iter().next()),
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        Ok(DecodedTransaction {
            txid: raw.txid,
            inputs,
            outputs,
        })
    }

    fn create_raw_transaction(
        &self,
        inputs: &[InputReference],
        output: &OutputTarget,
    ) -> Result<String, AppError> {
        let inputs_json: Vec<Value> = inputs
            .iter()
            .map(|input| json!({ "txid": input.txid.to_string(), "vout": input.vout }))
            .collect();

        // 金額は浮動小数点を経由させず、8桁の10進文字列で渡す
        let mut outputs_json = Map::new();
        outputs_json.insert(
            output.destination.clone(),
            Value::String(to_display_unit(output.amount)),
        );

        let value = self.invoke(
            "createrawtransaction",
            vec![Value::Array(inputs_json), Value::Object(outputs_json)],
        )?;
        expect_string("createrawtransaction", value)
    }

    fn get_new_address(&self) -> Result<String, AppError> {
        let value = self.invoke("getnewaddress", Vec::new())?;
        expect_string("getnewaddress", value)
    }

    fn sign_raw_transaction(&self, hex: &str) -> Result<SignedTransaction, AppError> {
        let value = self.invoke("signrawtransactionwithwallet", vec![json!(hex)])?;
        let raw: RawSigned = parse_result("signrawtransactionwithwallet", value)?;
        Ok(SignedTransaction {
            hex: raw.hex.trim().to_string(),
            complete: raw.complete,
            errors: raw
                .errors
                .into_iter()
                .map(|e| SignInputError {
                    txid: e.txid,
                    vout: e.vout,
                    error: e.error,
                })
                .collect(),
        })
    }

    fn send_raw_transaction(&self, hex: &str) -> Result<String, AppError> {
        let value = self.invoke("sendrawtransaction", vec![json!(hex)])?;
        expect_string("sendrawtransaction", value)
    }
}
