//! 修正時の手数料・送金先の選択元。対話入力とスクリプト指定を差し替えられるようにする。

use std::io::{BufRead, Write};

use bitcoin::Amount;

use crate::error::AppError;
use crate::units::to_display_unit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeDecision {
    Keep,
    Replace(Amount),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationDecision {
    Keep,
    Generate,
}

/// 手数料を決める時点で判明している値。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmendmentSummary {
    pub total_in: Amount,
    pub previous_output: Amount,
    pub previous_fee: Amount,
}

pub trait DecisionSource {
    fn fee(&mut self, summary: &AmendmentSummary) -> Result<FeeDecision, AppError>;
    fn destination(&mut self, current: &str) -> Result<DestinationDecision, AppError>;
}

/// 事前に決めた値を返す。既定ではどちらも変更しない。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptedDecisions {
    pub fee: Option<Amount>,
    pub new_destination: bool,
}

impl DecisionSource for ScriptedDecisions {
    fn fee(&mut self, _summary: &AmendmentSummary) -> Result<FeeDecision, AppError> {
        Ok(self.fee.map_or(FeeDecision::Keep, FeeDecision::Replace))
    }

    fn destination(&mut self, _current: &str) -> Result<DestinationDecision, AppError> {
        Ok(if self.new_destination {
            DestinationDecision::Generate
        } else {
            DestinationDecision::Keep
        })
    }
}

/// y/n で確認する対話入力。
pub struct ConsolePrompt<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> ConsolePrompt<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    fn ask(&mut self, question: &str) -> Result<String, AppError> {
        write!(self.writer, "{}", question)?;
        self.writer.flush()?;
        let mut line = String::new();
        self.reader.read_line(&mut line)?;
        Ok(line.trim().to_string())
    }

    fn confirm(&mut self, question: &str) -> Result<bool, AppError> {
        let answer = self.ask(question)?;
        Ok(answer.eq_ignore_ascii_case("y"))
    }
}

impl<R: BufRead, W: Write> DecisionSource for ConsolePrompt<R, W> {
    fn fee(&mut self, summary: &AmendmentSummary) -> Result<FeeDecision, AppError> {
        writeln!(self.writer, "\n入力総額:\t{}", to_display_unit(summary.total_in))?;
        writeln!(self.writer, "現在の出力:\t{}", to_display_unit(summary.previous_output))?;
        writeln!(
            self.writer,
            "現在の手数料:\t{} ({} sats)",
            to_display_unit(summary.previous_fee),
            summary.previous_fee.to_sat()
        )?;
        if !self.confirm("手数料を変更しますか? (y/n): ")? {
            return Ok(FeeDecision::Keep);
        }

        let answer = self.ask("新しい手数料 (satoshi): ")?;
        let sats: u64 = answer
            .parse()
            .map_err(|_| AppError::InputValidation(format!("手数料は整数の satoshi で入力してください: {:?}", answer)))?;
        Ok(FeeDecision::Replace(Amount::from_sat(sats)))
    }

    fn destination(&mut self, current: &str) -> Result<DestinationDecision, AppError> {
        writeln!(self.writer, "\n現在の送金先: {}", current)?;
        if self.confirm("送金先アドレスを変更しますか? (y/n): ")? {
            Ok(DestinationDecision::Generate)
        } else {
            Ok(DestinationDecision::Keep)
        }
    }
}
