// ============================================
// File: crates/veilink-transport/src/sam/reply.rs
// ============================================
//! # Control Replies
//!
//! ## Creation Reason
//! Every router reply is a single text line of whitespace separated
//! tokens: a topic, a kind, then `KEY=VALUE` pairs. This module turns
//! those lines into a typed `ControlReply` and maps `RESULT=` codes onto
//! `ControlFailure`.
//!
//! ## Main Functionality
//! - `ControlReply::parse()`: tokenizer with double-quoted value support
//! - `ControlReply::expect_kind()`: topic/kind check
//! - `ControlReply::check_result()`: `RESULT=` to `TransportError::Rejected`
//!
//! ## Reply Grammar
//! ```text
//! HELLO REPLY RESULT=OK VERSION=3.1
//! SESSION STATUS RESULT=DUPLICATED_ID MESSAGE="Duplicate id"
//! └─topic─┘└kind┘ └──── key=value pairs (values may be quoted) ────┘
//! ```
//!
//! ## Last Modified
//! v0.1.0 - Initial reply parser

use std::fmt;

use crate::error::{Result, TransportError};

// ============================================
// ControlFailure
// ============================================

/// Rejection reason carried in a reply's `RESULT=` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFailure {
    /// `CANT_REACH_PEER`
    PeerUnreachable,
    /// `I2P_ERROR`
    Internal,
    /// `INVALID_KEY`
    InvalidKey,
    /// `INVALID_ID`
    InvalidId,
    /// `TIMEOUT`
    Timeout,
    /// `DUPLICATED_DEST`
    DuplicatedDest,
    /// `DUPLICATED_ID`
    DuplicatedId,
    /// `KEY_NOT_FOUND`
    KeyNotFound,
    /// Any other code.
    Unrecognized(String),
}

impl ControlFailure {
    /// Maps a `RESULT=` code. Returns `None` for `OK`.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        let failure = match code {
            "OK" => return None,
            "CANT_REACH_PEER" => Self::PeerUnreachable,
            "I2P_ERROR" => Self::Internal,
            "INVALID_KEY" => Self::InvalidKey,
            "INVALID_ID" => Self::InvalidId,
            "TIMEOUT" => Self::Timeout,
            "DUPLICATED_DEST" => Self::DuplicatedDest,
            "DUPLICATED_ID" => Self::DuplicatedId,
            "KEY_NOT_FOUND" => Self::KeyNotFound,
            other => Self::Unrecognized(other.to_string()),
        };
        Some(failure)
    }

    /// Wire code of this failure.
    #[must_use]
    pub fn as_code(&self) -> &str {
        match self {
            Self::PeerUnreachable => "CANT_REACH_PEER",
            Self::Internal => "I2P_ERROR",
            Self::InvalidKey => "INVALID_KEY",
            Self::InvalidId => "INVALID_ID",
            Self::Timeout => "TIMEOUT",
            Self::DuplicatedDest => "DUPLICATED_DEST",
            Self::DuplicatedId => "DUPLICATED_ID",
            Self::KeyNotFound => "KEY_NOT_FOUND",
            Self::Unrecognized(code) => code,
        }
    }

    /// Returns `true` for failures about reaching the other side rather
    /// than about the request itself.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::PeerUnreachable | Self::Timeout | Self::KeyNotFound)
    }
}

impl fmt::Display for ControlFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

// ============================================
// ControlReply
// ============================================

/// One parsed reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlReply {
    topic: String,
    kind: String,
    pairs: Vec<(String, String)>,
}

impl ControlReply {
    /// Parses a reply line (without its newline).
    ///
    /// # Errors
    /// Returns `MalformedReply` on an unterminated quote or a line with
    /// fewer than two leading words.
    pub fn parse(line: &str) -> Result<Self> {
        let tokens = tokenize(line)?;
        let mut iter = tokens.into_iter();

        let topic = iter
            .next()
            .ok_or_else(|| TransportError::malformed("empty reply line"))?;
        let kind = iter
            .next()
            .ok_or_else(|| TransportError::malformed(format!("reply '{topic}' has no kind")))?;

        let pairs = iter
            .map(|token| match token.split_once('=') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (token, String::new()),
            })
            .collect();

        Ok(Self { topic, kind, pairs })
    }

    /// First word of the reply (`HELLO`, `SESSION`, ...).
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Second word of the reply (`REPLY`, `STATUS`, ...).
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Value of `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Value of `key`, or `MalformedReply` if absent.
    ///
    /// # Errors
    /// Returns `MalformedReply` if the key is missing.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| {
            TransportError::malformed(format!("{} {} is missing {key}", self.topic, self.kind))
        })
    }

    /// Returns `true` if the reply has this topic and kind.
    #[must_use]
    pub fn is(&self, topic: &str, kind: &str) -> bool {
        self.topic == topic && self.kind == kind
    }

    /// Checks topic and kind, passing the reply through.
    ///
    /// # Errors
    /// Returns `UnexpectedReply` on a mismatch.
    pub fn expect_kind(self, topic: &str, kind: &str) -> Result<Self> {
        if self.is(topic, kind) {
            Ok(self)
        } else {
            Err(TransportError::UnexpectedReply {
                expected: format!("{topic} {kind}"),
                got: format!("{} {}", self.topic, self.kind),
            })
        }
    }

    /// Fails with `Rejected` if the reply carries a non-`OK` result.
    /// Replies without a `RESULT=` token count as success.
    ///
    /// # Errors
    /// Returns `Rejected` with the typed failure and `MESSAGE=` text.
    pub fn check_result(self) -> Result<Self> {
        match self.get("RESULT").and_then(ControlFailure::from_code) {
            None => Ok(self),
            Some(failure) => Err(TransportError::rejected(
                self.topic.clone(),
                failure,
                self.get("MESSAGE").map(str::to_string),
            )),
        }
    }
}

// ============================================
// Tokenizer
// ============================================

fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut in_quotes = false;
    let mut chars = line.trim_end_matches(['\r', '\n']).chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                in_token = true;
            }
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            c if c.is_whitespace() && !in_quotes => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if in_quotes {
        return Err(TransportError::malformed("unterminated quote"));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

// ============================================
// Tests
// ============================================
