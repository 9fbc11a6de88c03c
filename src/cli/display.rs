//! Rendering helpers for balances, addresses and notifications

use crate::session::Balance;
use crate::status::{Notification, NotificationKind};

/// Render a balance as `1,234.5678 SOL`, or `-` when unknown
pub fn format_balance(balance: &Balance) -> String {
    match balance.sol() {
        Some(sol) => format_sol(sol),
        None => "-".to_string(),
    }
}

/// Render SOL with thousands separators and at most four fraction digits
pub fn format_sol(sol: f64) -> String {
    let rounded = format!("{:.4}", sol);
    let (whole, frac) = rounded.split_once('.').unwrap_or((&rounded, ""));
    let frac = frac.trim_end_matches('0');

    let (sign, digits) = match whole.strip_prefix('-') {
        Some(d) => ("-", d),
        None => ("", whole),
    };

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    if frac.is_empty() {
        format!("{}{} SOL", sign, grouped)
    } else {
        format!("{}{}.{} SOL", sign, grouped, frac)
    }
}

/// Shorten an address to `left…right`
pub fn shorten(key: &str, left: usize, right: usize) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= left + right + 3 {
        return key.to_string();
    }
    let head: String = chars[..left].iter().collect();
    let tail: String = chars[chars.len() - right..].iter().collect();
    format!("{}…{}", head, tail)
}

/// One terminal line per notification
pub fn render_notification(n: &Notification) -> Option<String> {
    let tag = match n.kind {
        NotificationKind::Info => "[info]",
        NotificationKind::Loading => "[....]",
        NotificationKind::Success => "[ ok ]",
        NotificationKind::Error => "[fail]",
        NotificationKind::Dismiss => return None,
    };
    Some(format!("{} {}", tag, n.message))
}
