use std::path::PathBuf;

use bitcoin::Network as BitcoinNetwork;
use clap::{Parser, Subcommand};

use crate::error::AppError;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct CliArgs {
    /// 使用するネットワーク ("bitcoin", "testnet")
    #[clap(short, long, value_parser, default_value = "bitcoin", global = true)]
    pub network: String,

    /// 接続設定を記述したJSONファイルへのパス
    #[clap(short, long, value_parser, global = true)]
    pub config: Option<PathBuf>,

    /// 実行するコマンドをデバッグログに出力する
    #[clap(long, global = true)]
    pub debug: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 送金元アドレスの未使用出力をすべて使う未署名トランザクションを作成する
    CreateTx {
        #[clap(short = 'a', long, default_value = "")]
        source_address: String,

        /// 省略時はノードに新しいアドレスを生成させる
        #[clap(short, long)]
        destination_address: Option<String>,

        /// 手数料 (satoshi)。0 の場合は設定の既定値
        #[clap(short, long, default_value_t = 0)]
        fee: u64,
    },

    /// 未署名トランザクションの入出力と手数料を表示する
    ViewTx {
        #[clap(short = 'e', long, default_value = "")]
        raw_tx: String,

        #[clap(short = 'a', long, default_value = "")]
        source_address: String,
    },

    /// 未署名トランザクションの手数料・送金先を修正する
    ModifyTx {
        #[clap(short = 'e', long, default_value = "")]
        raw_tx: String,

        #[clap(short = 'a', long, default_value = "")]
        source_address: String,

        /// 新しい手数料 (satoshi)。指定すると対話入力を行わない
        #[clap(long)]
        new_fee: Option<u64>,

        /// 送金先をノードが生成する新しいアドレスに変更する
        #[clap(long)]
        new_destination: bool,

        /// 対話入力を行わず、指定のない項目は変更しない
        #[clap(long)]
        non_interactive: bool,
    },

    /// ノードのウォレットで署名してブロードキャストする
    SendTx {
        #[clap(short = 's', long, default_value = "")]
        raw_tx: String,
    },
}

pub fn parse_network(network_str: &str) -> Result<BitcoinNetwork, AppError> {
    match network_str.to_lowercase().as_str() {
        "bitcoin" | "mainnet" | "main" => Ok(BitcoinNetwork::Bitcoin),
        "testnet" | "test" => Ok(BitcoinNetwork::Testnet),
        s => Err(AppError::InputValidation(format!("無効なネットワークが指定されました: {}", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modify_flags() {
        let args = CliArgs::try_parse_from([
            "bitcoin-tx-amend-cli",
            "--network",
            "testnet",
            "modify-tx",
            "-e",
            "0200",
            "-a",
            "tb1qsource",
            "--new-fee",
            "1200",
            "--new-destination",
        ])
        .unwrap();

        assert_eq!(parse_network(&args.network).unwrap(), BitcoinNetwork::Testnet);
        match args.command {
            Command::ModifyTx {
                raw_tx,
                new_fee,
                new_destination,
                non_interactive,
                ..
            } => {
                assert_eq!(raw_tx, "0200");
                assert_eq!(new_fee, Some(1200));
                assert!(new_destination);
                assert!(!non_interactive);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn create_defaults_to_zero_fee_and_no_destination() {
        let args = CliArgs::try_parse_from(["bitcoin-tx-amend-cli", "create-tx", "-a", "tb1qsource"]).unwrap();

        assert_eq!(args.network, "bitcoin");
        match args.command {
            Command::CreateTx {
                destination_address,
                fee,
                ..
            } => {
                assert_eq!(destination_address, None);
                assert_eq!(fee, 0);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn rejects_unsupported_network() {
        assert!(matches!(parse_network("regtest"), Err(AppError::InputValidation(_))));
        assert_eq!(parse_network("MAINNET").unwrap(), BitcoinNetwork::Bitcoin);
    }
}
