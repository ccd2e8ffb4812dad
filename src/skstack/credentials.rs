// スマートメータールートB認証情報
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::error::Error;

/// 認証情報
#[derive(PartialEq, Eq)]
pub struct Credentials {
    pub id: Id,
    pub password: Password,
}

/// ルートBID(32文字固定長)
#[derive(PartialEq, Eq)]
pub struct Id([char; 32]);

impl std::str::FromStr for Id {
    type Err = Error;
    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.chars()
            .collect::<Vec<char>>()
            .try_into()
            .map(|a| Self(a))
            .map_err(|_| Error::InvalidId(s.to_string()))
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0.iter().collect::<String>())
    }
}

/// ルートBパスワード(12文字固定長)
#[derive(PartialEq, Eq)]
pub struct Password([char; 12]);

impl std::str::FromStr for Password {
    type Err = Error;
    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.chars()
            .collect::<Vec<char>>()
            .try_into()
            .map(|a| Self(a))
            .map_err(|_| Error::InvalidPassword("*".repeat(s.chars().count())))
    }
}

impl std::fmt::Display for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0.iter().collect::<String>())
    }
}

#[test]
fn test1() {
    use std::str::FromStr;

    let id = Id::from_str("00112233445566778899AABBCCDDEEFF").unwrap();
    assert_eq!(id.to_string(), "00112233445566778899AABBCCDDEEFF");
    assert!(Id::from_str("SHORT").is_err());

    let password = Password::from_str("0123456789AB").unwrap();
    assert_eq!(password.to_string(), "0123456789AB");
    assert!(Password::from_str("0123456789ABC").is_err());
}
