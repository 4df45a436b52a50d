//! Token - Type-safe collateral token codes
//!
//! Collateral is posted in a small set of known tokens; anything else is
//! carried through `Other` so new collateral can be listed without a release.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when parsing token codes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Empty token code")]
    EmptyCode,

    #[error("Token code too long (max 12 chars): {0}")]
    TooLong(String),

    #[error("Invalid token code format: {0}")]
    InvalidFormat(String),
}

/// Collateral token codes
///
/// # Examples
/// ```
/// use hedgepool_core::Token;
///
/// let sbtc: Token = "sbtc".parse().unwrap();
/// assert_eq!(sbtc, Token::Sbtc);
/// assert_eq!(Token::Stx.to_string(), "STX");
///
/// let custom: Token = "WBTC".parse().unwrap();
/// assert!(matches!(custom, Token::Other(_)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Token {
    /// Bitcoin pegged onto the settlement chain
    Sbtc,
    /// Native chain token
    Stx,
    /// Any other listed collateral token
    Other(String),
}

impl Token {
    /// Returns the token code as a string slice
    pub fn code(&self) -> &str {
        match self {
            Token::Sbtc => "SBTC",
            Token::Stx => "STX",
            Token::Other(s) => s.as_str(),
        }
    }

    /// Returns true if the token tracks bitcoin one-to-one
    pub fn is_bitcoin(&self) -> bool {
        matches!(self, Token::Sbtc)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Token {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_uppercase();

        if s.is_empty() {
            return Err(TokenError::EmptyCode);
        }

        if s.len() > 12 {
            return Err(TokenError::TooLong(s));
        }

        if !s.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(TokenError::InvalidFormat(s));
        }

        Ok(match s.as_str() {
            "SBTC" => Token::Sbtc,
            "STX" => Token::Stx,
            _ => Token::Other(s),
        })
    }
}

impl TryFrom<String> for Token {
    type Error = TokenError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Token> for String {
    fn from(t: Token) -> Self {
        t.code().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_tokens() {
        assert_eq!("SBTC".parse::<Token>().unwrap(), Token::Sbtc);
        assert_eq!("stx".parse::<Token>().unwrap(), Token::Stx);
    }

    #[test]
    fn test_parse_custom_token() {
        let custom: Token = "xbtc".parse().unwrap();
        assert_eq!(custom, Token::Other("XBTC".to_string()));
        assert_eq!(custom.to_string(), "XBTC");
    }

    #[test]
    fn test_is_bitcoin() {
        assert!(Token::Sbtc.is_bitcoin());
        assert!(!Token::Stx.is_bitcoin());
    }

    #[test]
    fn test_empty_code_error() {
        assert!(matches!("  ".parse::<Token>(), Err(TokenError::EmptyCode)));
    }

    #[test]
    fn test_too_long_error() {
        assert!(matches!(
            "VERYLONGTOKENCODE".parse::<Token>(),
            Err(TokenError::TooLong(_))
        ));
    }

    #[test]
    fn test_invalid_format_error() {
        assert!(matches!(
            "S-BTC".parse::<Token>(),
            Err(TokenError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&Token::Sbtc).unwrap();
        assert_eq!(json, "\"SBTC\"");
        let parsed: Token = serde_json::from_str("\"stx\"").unwrap();
        assert_eq!(parsed, Token::Stx);
    }
}
