//! Checksum and structure validators for pattern matches

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Named validator that can be attached to a pattern recognizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Validator {
    /// Estonian personal identification code (isikukood)
    EePersonalCode,
    /// Luhn mod-10 (payment card numbers)
    Luhn,
    /// ISO 13616 IBAN mod-97
    Iban,
    /// IPv4 / IPv6 address
    IpAddress,
}

impl Validator {
    /// Check a matched substring
    pub fn validate(&self, candidate: &str) -> bool {
        match self {
            Self::EePersonalCode => ee_personal_code(candidate),
            Self::Luhn => luhn(candidate),
            Self::Iban => iban(candidate),
            Self::IpAddress => ip_address(candidate),
        }
    }

    /// Configuration name
    pub fn name(&self) -> &'static str {
        match self {
            Self::EePersonalCode => "ee_personal_code",
            Self::Luhn => "luhn",
            Self::Iban => "iban",
            Self::IpAddress => "ip_address",
        }
    }
}

const EE_WEIGHTS_FIRST: [u32; 10] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 1];
const EE_WEIGHTS_SECOND: [u32; 10] = [3, 4, 5, 6, 7, 8, 9, 1, 2, 3];

/// Validate an Estonian personal code: `GYYMMDDSSSC`
///
/// G encodes century and sex (1-8), YYMMDD must be a real date, and C is a
/// two-stage mod-11 checksum over the first ten digits.
pub fn ee_personal_code(candidate: &str) -> bool {
    if candidate.len() != 11 || !candidate.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let digits: Vec<u32> = candidate.bytes().map(|b| u32::from(b - b'0')).collect();

    let century = match digits[0] {
        1 | 2 => 1800,
        3 | 4 => 1900,
        5 | 6 => 2000,
        7 | 8 => 2100,
        _ => return false,
    };
    let year = century + digits[1] * 10 + digits[2];
    let month = digits[3] * 10 + digits[4];
    let day = digits[5] * 10 + digits[6];
    if !is_valid_date(year, month, day) {
        return false;
    }

    ee_check_digit(&digits[..10]) == digits[10]
}

fn ee_check_digit(digits: &[u32]) -> u32 {
    let weighted = |weights: &[u32; 10]| -> u32 {
        digits.iter().zip(weights).map(|(d, w)| d * w).sum::<u32>() % 11
    };

    match weighted(&EE_WEIGHTS_FIRST) {
        10 => match weighted(&EE_WEIGHTS_SECOND) {
            10 => 0,
            rem => rem,
        },
        rem => rem,
    }
}

fn is_valid_date(year: u32, month: u32, day: u32) -> bool {
    let leap = (year % 4 == 0 && year % 100 != 0) || year % 400 == 0;
    let days_in_month = match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if leap => 29,
        2 => 28,
        _ => return false,
    };
    (1..=days_in_month).contains(&day)
}

/// Luhn mod-10 over the digits, ignoring spaces and dashes
pub fn luhn(candidate: &str) -> bool {
    let Some(digits) = strip_separators(candidate) else {
        return false;
    };
    if !(12..=19).contains(&digits.len()) {
        return false;
    }

    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            let d = u32::from(d - b'0');
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();

    sum % 10 == 0
}

fn strip_separators(candidate: &str) -> Option<Vec<u8>> {
    let mut digits = Vec::with_capacity(candidate.len());
    for b in candidate.bytes() {
        match b {
            b'0'..=b'9' => digits.push(b),
            b' ' | b'-' => {}
            _ => return None,
        }
    }
    Some(digits)
}

/// IBAN mod-97 check (ISO 13616), ignoring spaces
pub fn iban(candidate: &str) -> bool {
    let compact: Vec<u8> = candidate
        .bytes()
        .filter(|b| *b != b' ')
        .map(|b| b.to_ascii_uppercase())
        .collect();

    if !(15..=34).contains(&compact.len())
        || !compact[..2].iter().all(u8::is_ascii_uppercase)
        || !compact[2..4].iter().all(u8::is_ascii_digit)
        || !compact.iter().all(u8::is_ascii_alphanumeric)
    {
        return false;
    }

    // Move country code and check digits to the end, letters become 10..35
    let rearranged = compact[4..].iter().chain(&compact[..4]);
    let mut remainder: u32 = 0;
    for &b in rearranged {
        let value = if b.is_ascii_digit() {
            u32::from(b - b'0')
        } else {
            u32::from(b - b'A') + 10
        };
        remainder = if value >= 10 {
            (remainder * 100 + value) % 97
        } else {
            (remainder * 10 + value) % 97
        };
    }

    remainder == 1
}

/// Parseable IP address
pub fn ip_address(candidate: &str) -> bool {
    candidate.parse::<IpAddr>().is_ok()
}
