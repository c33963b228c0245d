//! 学号（查询标识）
//!
//! 格式固定：两位大写字母 + 两位数字 + 一位大写字母 + 五位数字，例如 `ED18A02166`

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::InputError;

static ROLL_NUMBER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z]{2}\d{2}[A-Z]\d{5}$").expect("学号正则非法")
});

/// 经过校验的学号
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RollNumber(String);

impl RollNumber {
    /// 清洗并校验学号（去除首尾空白并转为大写）
    pub fn parse(raw: &str) -> Result<Self, InputError> {
        let cleaned = sanitize(raw);
        if is_valid(&cleaned) {
            Ok(Self(cleaned))
        } else {
            Err(InputError::InvalidIdentifier(raw.trim().to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 去除空白并转为大写
pub fn sanitize(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// 检查是否符合固定格式（不做清洗）
pub fn is_valid(candidate: &str) -> bool {
    ROLL_NUMBER_PATTERN.is_match(candidate)
}

impl FromStr for RollNumber {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RollNumber {
    type Error = InputError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RollNumber> for String {
    fn from(value: RollNumber) -> Self {
        value.0
    }
}

impl AsRef<str> for RollNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RollNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_fixed_format() {
        let roll = RollNumber::parse("ED18A02166").unwrap();
        assert_eq!(roll.as_str(), "ED18A02166");
        assert!(RollNumber::parse("AB00Z99999").is_ok());
    }

    #[test]
    fn test_sanitizes_before_validation() {
        let roll = RollNumber::parse("  ed18a02166 \n").unwrap();
        assert_eq!(roll.to_string(), "ED18A02166");
    }

    #[test]
    fn test_rejects_malformed() {
        for raw in ["", "ED18A0216", "ED18A021666", "E118A02166", "ED18102166", "ED18A0216X", "ED-8A02166"] {
            assert_eq!(
                RollNumber::parse(raw),
                Err(InputError::InvalidIdentifier(raw.trim().to_string())),
                "应拒绝: {raw:?}"
            );
        }
    }

    #[test]
    fn test_serde_validates() {
        let roll: RollNumber = serde_json::from_str("\"ed18a02166\"").unwrap();
        assert_eq!(roll.as_str(), "ED18A02166");
        assert!(serde_json::from_str::<RollNumber>("\"nope\"").is_err());
        assert_eq!(serde_json::to_string(&roll).unwrap(), "\"ED18A02166\"");
    }
}
