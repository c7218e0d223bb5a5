// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use sha2::{Digest, Sha256};

use crate::constant::REDACTION_MAX_LEN;

/// Hex encoded SHA-256 of arbitrary bytes
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Replace a value with asterisks, capped so long values don't flood the output
pub fn redact(value: &str) -> String {
    "*".repeat(value.chars().count().min(REDACTION_MAX_LEN))
}

/// Strip a known suffix from a file name, returning None if none matches
pub fn strip_any_suffix<'a>(value: &'a str, suffixes: &[&str]) -> Option<&'a str> {
    suffixes.iter().find_map(|suffix| value.strip_suffix(suffix))
}

/// Normalize a relative path to forward slashes without leading `./` or `/`
pub fn normalize_relative_path(path: &str) -> String {
    let slashed = path.replace('\\', "/");
    let mut trimmed = slashed.as_str();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    trimmed.trim_start_matches('/').to_string()
}
