//! 表示単位 (BTC) と最小単位 (satoshi) の相互変換。
//!
//! 内部の金額計算はすべて `Amount` (整数の satoshi) で行い、
//! 10進表現は外部とのやり取りと表示にのみ使う。

use bitcoin::{Amount, Denomination};

use crate::error::AppError;

const SATS_PER_COIN: u64 = 100_000_000;
const MAX_DECIMALS: usize = 8;

/// 表示単位の10進文字列を最小単位へ変換する。小数9桁目以降は切り捨てる。
pub fn parse_display_amount(text: &str) -> Result<Amount, AppError> {
    let text = text.trim();
    let (whole, frac) = text.split_once('.').unwrap_or((text, ""));

    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && frac.is_empty()) || !all_digits(whole) || !all_digits(frac) {
        return Err(AppError::InputValidation(format!("金額の形式が不正です: {:?}", text)));
    }

    let whole = if whole.is_empty() { "0" } else { whole };
    let frac = &frac[..frac.len().min(MAX_DECIMALS)];
    let normalized = if frac.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, frac)
    };

    Amount::from_str_in(&normalized, Denomination::Bitcoin)
        .map_err(|e| AppError::InputValidation(format!("金額の変換に失敗 ({}): {}", text, e)))
}

/// `floor(amount × 1e8)`。ノードが返す JSON 数値の受け口。
pub fn to_smallest_unit(amount: f64) -> Result<Amount, AppError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(AppError::InputValidation(format!("無効な金額です: {}", amount)));
    }
    // f64 の Display は指数表記を使わず、往復可能な最短の10進表現になる
    parse_display_amount(&amount.to_string())
}

/// 8桁固定の10進文字列。
pub fn to_display_unit(amount: Amount) -> String {
    let sats = amount.to_sat();
    format!("{}.{:08}", sats / SATS_PER_COIN, sats % SATS_PER_COIN)
}
