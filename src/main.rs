use std::io;

use bitcoin::Amount;
use clap::Parser;

mod aggregator;
mod amendment;
mod broadcast;
mod cli;
mod config;
mod decision;
mod error;
mod explorer;
mod node;
mod reconciler;
#[cfg(test)]
mod testutil;
mod transaction;
mod types;
mod units;
mod view;

use cli::{CliArgs, Command, parse_network};
use config::{NodeTransportKind, Settings};
use decision::{ConsolePrompt, DecisionSource, ScriptedDecisions};
use error::AppError;
use explorer::BlockcypherExplorer;
use node::{CliTransport, NodeClient, NodeCollaborator, RpcTransport};
use types::DraftReport;

fn main() -> Result<(), AppError> {
    let args = CliArgs::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
    log::debug!("引数: {:?}", args);

    let network = parse_network(&args.network)?;
    log::info!("指定されたネットワーク: {:?}", network);

    let settings = Settings::load(args.config.as_deref())?;
    log::debug!("設定: node={:?}, explorer={}", settings.node.transport, settings.explorer.base_url);

    let node = build_node(&settings)?;

    match args.command {
        Command::CreateTx {
            source_address,
            destination_address,
            fee,
        } => {
            let assembled = transaction::create_transaction(
                node.as_ref(),
                &source_address,
                destination_address.as_deref(),
                Amount::from_sat(fee),
                settings.default_fee(),
            )?;

            let report = DraftReport {
                draft: &assembled.draft,
                source_address: &source_address,
                generated_destination: assembled.generated_destination,
            };
            println!("{}", report);
            println!("\ntransaction created, here is the raw transaction hex:\n{}", assembled.hex);
        }
        Command::ViewTx {
            raw_tx,
            source_address,
        } => {
            let explorer = BlockcypherExplorer::new(&settings.explorer)?;
            let view = view::inspect_transaction(
                node.as_ref(),
                &explorer,
                network,
                &raw_tx,
                &source_address,
                settings.explorer.max_concurrent_requests,
            )?;
            let output = serde_json::to_string_pretty(&view)
                .map_err(|e| AppError::Internal(format!("JSON出力に失敗: {}", e)))?;
            println!("{}", output);
        }
        Command::ModifyTx {
            raw_tx,
            source_address,
            new_fee,
            new_destination,
            non_interactive,
        } => {
            let explorer = BlockcypherExplorer::new(&settings.explorer)?;
            let mut decisions: Box<dyn DecisionSource> =
                if non_interactive || new_fee.is_some() || new_destination {
                    Box::new(ScriptedDecisions {
                        fee: new_fee.map(Amount::from_sat),
                        new_destination,
                    })
                } else {
                    Box::new(ConsolePrompt::new(io::stdin().lock(), io::stdout()))
                };

            let amended = amendment::amend_transaction(
                node.as_ref(),
                &explorer,
                network,
                &raw_tx,
                &source_address,
                decisions.as_mut(),
                settings.explorer.max_concurrent_requests,
            )?;

            if !amended.unmatched.is_empty() {
                println!(
                    "警告: {} 件の入力金額を照合できませんでした (0 として計算)",
                    amended.unmatched.len()
                );
            }
            println!("previous fee:\t\t{}", units::to_display_unit(amended.previous_fee));
            let report = DraftReport {
                draft: &amended.draft,
                source_address: &source_address,
                generated_destination: amended.generated_destination,
            };
            println!("{}", report);
            println!("\ntransaction modified, here is the raw transaction hex:\n{}", amended.hex);
        }
        Command::SendTx { raw_tx } => {
            let txid = broadcast::sign_and_send(node.as_ref(), &raw_tx)?;
            println!("Transaction sent. Hash:\n{}", txid);
        }
    }

    log::info!("処理が正常に完了しました。");
    Ok(())
}

fn build_node(settings: &Settings) -> Result<Box<dyn NodeCollaborator>, AppError> {
    Ok(match settings.node.transport {
        NodeTransportKind::Rpc => Box::new(NodeClient::new(RpcTransport::new(&settings.node)?)),
        NodeTransportKind::Cli => Box::new(NodeClient::new(CliTransport::new(&settings.node))),
    })
}
