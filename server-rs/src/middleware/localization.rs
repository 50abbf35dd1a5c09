use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolPosition {
    Before,
    After,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleInfo {
    pub lang: &'static str,
    pub currency_symbol: &'static str,
    pub thousands_separator: char,
    pub symbol_position: SymbolPosition,
}

impl Default for LocaleInfo {
    fn default() -> Self {
        FAROESE
    }
}

const FAROESE: LocaleInfo = LocaleInfo {
    lang: "fo",
    currency_symbol: "kr.",
    thousands_separator: '.',
    symbol_position: SymbolPosition::After,
};

pub fn locale_config(lang: &str) -> Option<LocaleInfo> {
    match lang {
        "fo" => Some(FAROESE),
        "da" => Some(LocaleInfo {
            lang: "da",
            currency_symbol: "kr.",
            thousands_separator: '.',
            symbol_position: SymbolPosition::After,
        }),
        "en" => Some(LocaleInfo {
            lang: "en",
            currency_symbol: "$",
            thousands_separator: ',',
            symbol_position: SymbolPosition::Before,
        }),
        _ => None,
    }
}

/// Primary subtag, lowercased: "da-DK" -> "da".
fn primary_subtag(tag: &str) -> String {
    tag.trim()
        .split(['-', '_'])
        .next()
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn detect_locale(req: &Request, default_lang: &str) -> LocaleInfo {
    // Query param first
    if let Some(query) = req.uri().query() {
        for pair in query.split('&') {
            let mut kv = pair.splitn(2, '=');
            if kv.next() == Some("lang") {
                if let Some(info) = kv.next().and_then(|v| locale_config(&primary_subtag(v))) {
                    return info;
                }
            }
        }
    }

    if let Some(al) = req
        .headers()
        .get("accept-language")
        .and_then(|v| v.to_str().ok())
    {
        for lang in al.split(',') {
            let tag = lang.split(';').next().unwrap_or("");
            if let Some(info) = locale_config(&primary_subtag(tag)) {
                return info;
            }
        }
    }

    locale_config(default_lang).unwrap_or_default()
}

/// Middleware: detects the display language and attaches LocaleInfo to the request.
pub async fn locale_detector(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let info = detect_locale(&req, &state.config.default_lang);
    req.extensions_mut().insert(info);
    Ok(next.run(req).await)
}

/// Whole-unit amount with grouped thousands, e.g. `$1,234` or `1.234 kr.`.
pub fn format_currency(amount: i64, info: &LocaleInfo) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(info.thousands_separator);
        }
        grouped.push(ch);
    }
    let sign = if amount < 0 { "-" } else { "" };

    match info.symbol_position {
        SymbolPosition::Before => format!("{}{}{}", sign, info.currency_symbol, grouped),
        SymbolPosition::After => format!("{}{} {}", sign, grouped, info.currency_symbol),
    }
}
