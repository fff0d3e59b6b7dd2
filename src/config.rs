use std::fs;
use std::path::Path;

use bitcoin::Amount;
use serde::Deserialize;

use crate::error::AppError;

pub const DEFAULT_FEE_SATS: u64 = 400;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeTransportKind {
    #[default]
    Rpc,
    Cli,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub default_fee_sats: u64,
    pub node: NodeSettings,
    pub explorer: ExplorerSettings,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeSettings {
    pub transport: NodeTransportKind,
    pub rpc_url: String,
    pub rpc_user: Option<String>,
    pub rpc_password: Option<String>,
    pub cli_binary: String,
    pub cli_args: Vec<String>,
    pub timeout_secs: u64,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ExplorerSettings {
    pub base_url: String,
    pub api_token: Option<String>,
    pub timeout_secs: u64,
    pub max_concurrent_requests: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_fee_sats: DEFAULT_FEE_SATS,
            node: NodeSettings::default(),
            explorer: ExplorerSettings::default(),
        }
    }
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            transport: NodeTransportKind::Rpc,
            rpc_url: "http://127.0.0.1:18332".to_string(),
            rpc_user: None,
            rpc_password: None,
            cli_binary: "bitcoin-cli".to_string(),
            cli_args: Vec::new(),
            timeout_secs: 30,
        }
    }
}

impl Default for ExplorerSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.blockcypher.com".to_string(),
            api_token: None,
            timeout_secs: 30,
            max_concurrent_requests: 3,
        }
    }
}

impl Settings {
    /// 設定ファイル (任意) を読み込み、環境変数で上書きする。
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let content = fs::read_to_string(path).map_err(|e| {
            log::error!("設定ファイルの読み込みに失敗しました: {:?}", path);
            AppError::Io(e)
        })?;
        serde_json::from_str(&content).map_err(|e| AppError::JsonParse {
            file_path: path.to_path_buf(),
            source: e,
        })
    }

    /// RPC_URL, RPC_USER, RPC_PASS, BLOCKCYPHER_API_KEY を反映する。
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(url) = non_empty("RPC_URL") {
            self.node.rpc_url = url;
        }
        if let Some(user) = non_empty("RPC_USER") {
            self.node.rpc_user = Some(user);
        }
        if let Some(pass) = non_empty("RPC_PASS") {
            self.node.rpc_password = Some(pass);
        }
        if let Some(token) = non_empty("BLOCKCYPHER_API_KEY") {
            self.explorer.api_token = Some(token);
        }
    }

    pub fn default_fee(&self) -> Amount {
        Amount::from_sat(self.default_fee_sats)
    }
}
