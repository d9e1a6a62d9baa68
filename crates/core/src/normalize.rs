//! Field normalizers.
//!
//! Every function here is total: it never panics and returns `None` only for
//! empty input. Rejecting malformed values is the validator's job.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::field::{FieldKey, NormalizerKind};

/// Ad-platform exports prefix phone numbers with a short tag such as `p:`.
static PHONE_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]{1,2}:\s*").expect("valid regex"));

/// Mistyped domains seen in real uploads, checked before the TLD heuristic.
const DOMAIN_ALIASES: &[(&str, &str)] = &[
    ("gmailcom", "gmail.com"),
    ("gmail.con", "gmail.com"),
    ("gmail.co", "gmail.com"),
    ("gmial.com", "gmail.com"),
    ("gmai.com", "gmail.com"),
    ("hotmailcom", "hotmail.com"),
    ("hotmail.con", "hotmail.com"),
    ("hotmailfr", "hotmail.fr"),
    ("yahoocom", "yahoo.com"),
    ("yahoofr", "yahoo.fr"),
    ("outlookcom", "outlook.com"),
    ("outlookfr", "outlook.fr"),
    ("icloudcom", "icloud.com"),
    ("orangefr", "orange.fr"),
    ("freefr", "free.fr"),
    ("sfrfr", "sfr.fr"),
    ("wanadoofr", "wanadoo.fr"),
    ("lapostenet", "laposte.net"),
];

/// TLDs the dot-insertion heuristic recognises.
const KNOWN_TLDS: &[&str] = &["com", "fr", "net", "org", "be"];

/// Result of the email domain repair attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailFix {
    pub email: String,
    pub was_fixed: bool,
}

/// A normalized value plus whether normalization changed its meaning
/// (currently only the email domain repair does).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Normalized {
    pub value: Option<String>,
    pub was_fixed: bool,
}

/// Canonicalise a phone number.
///
/// Local French numbers are rewritten to E.164 (`+33…`). Numbers that already
/// carry a `+` are only stripped of punctuation, which makes the function
/// idempotent.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let without_prefix = PHONE_PREFIX_RE.replace(trimmed, "");
    let without_prefix = without_prefix.trim();
    let has_plus = without_prefix.starts_with('+');
    let digits: String = without_prefix.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.is_empty() {
        // Nothing usable; hand the garbage to validation unchanged.
        return Some(trimmed.to_string());
    }

    if has_plus {
        return Some(format!("+{digits}"));
    }

    let normalized = match digits.len() {
        10 if digits.starts_with('0') => format!("+33{}", &digits[1..]),
        11 if digits.starts_with("33") => format!("+{digits}"),
        9 => format!("+33{digits}"),
        _ => digits,
    };
    Some(normalized)
}

/// Lowercase/trim an email and repair common domain typos.
pub fn try_fix_email_domain(email: &str) -> EmailFix {
    let email = email.trim().to_lowercase();

    let Some(at) = email.rfind('@') else {
        return EmailFix {
            email,
            was_fixed: false,
        };
    };
    let (local, domain) = (&email[..at], &email[at + 1..]);

    if let Some((_, fixed)) = DOMAIN_ALIASES.iter().find(|(typo, _)| *typo == domain) {
        return EmailFix {
            email: format!("{local}@{fixed}"),
            was_fixed: true,
        };
    }

    if !domain.is_empty() && !domain.contains('.') {
        for tld in KNOWN_TLDS {
            if let Some(prefix) = domain.strip_suffix(tld) {
                if prefix.chars().count() >= 2 {
                    return EmailFix {
                        email: format!("{local}@{prefix}.{tld}"),
                        was_fixed: true,
                    };
                }
            }
        }
    }

    EmailFix {
        email,
        was_fixed: false,
    }
}

/// `None` for empty input, otherwise [`try_fix_email_domain`].
pub fn normalize_email(raw: &str) -> Option<EmailFix> {
    if raw.trim().is_empty() {
        return None;
    }
    Some(try_fix_email_domain(raw))
}

/// Strip spaces and restore the leading zero that spreadsheets drop from
/// French postal codes (`1000` → `01000`).
pub fn normalize_postal_code(raw: &str) -> Option<String> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }
    if compact.len() == 4 && compact.chars().all(|c| c.is_ascii_digit()) {
        return Some(format!("0{compact}"));
    }
    Some(compact)
}

/// Trim and collapse internal whitespace runs to one space.
pub fn normalize_text(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Title-case a person name: `jean-PIERRE de la tour` → `Jean-Pierre De La Tour`.
pub fn normalize_name(raw: &str) -> Option<String> {
    let text = normalize_text(raw)?;
    let mut out = String::with_capacity(text.len());
    let mut capitalize_next = true;

    for c in text.to_lowercase().chars() {
        if capitalize_next {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        capitalize_next = c.is_whitespace() || c == '-';
    }
    Some(out)
}

/// Normalize a raw value for the given field.
pub fn normalize_field(field: FieldKey, raw: &str) -> Normalized {
    match field.normalizer() {
        NormalizerKind::Email => match normalize_email(raw) {
            Some(fix) => Normalized {
                value: Some(fix.email),
                was_fixed: fix.was_fixed,
            },
            None => Normalized::default(),
        },
        NormalizerKind::Phone => Normalized {
            value: normalize_phone(raw),
            was_fixed: false,
        },
        NormalizerKind::PostalCode => Normalized {
            value: normalize_postal_code(raw),
            was_fixed: false,
        },
        NormalizerKind::Name => Normalized {
            value: normalize_name(raw),
            was_fixed: false,
        },
        NormalizerKind::Text => Normalized {
            value: normalize_text(raw),
            was_fixed: false,
        },
    }
}

/// Comparison key used by both duplicate detectors.
pub fn match_key(value: &str) -> String {
    value.trim().to_lowercase()
}
