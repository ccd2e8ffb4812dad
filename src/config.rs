// スマートメータ接続設定
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::error::Result;
use crate::skstack::credentials::{Credentials, Id, Password};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// スマートメータ接続設定
#[derive(Serialize, Deserialize, Debug)]
#[allow(non_snake_case)]
pub struct RouteBSettings {
    pub RouteBId: String,
    pub RouteBPassword: String,
    pub ContractAmperage: u8,
    pub CollectDay: u8,
}

impl RouteBSettings {
    pub fn credentials(&self) -> Result<Credentials> {
        Ok(Credentials {
            id: Id::from_str(&self.RouteBId)?,
            password: Password::from_str(&self.RouteBPassword)?,
        })
    }
}

#[test]
fn test1() {
    let text = [
        r#"RouteBId = "00112233445566778899AABBCCDDEEFF""#,
        r#"RouteBPassword = "0123456789AB""#,
        r#"ContractAmperage = 50"#,
        r#"CollectDay = 22"#,
    ]
    .join("\n");
    let settings = toml::from_str::<RouteBSettings>(&text).unwrap();
    assert_eq!(settings.ContractAmperage, 50);
    assert_eq!(settings.CollectDay, 22);
    assert!(settings.credentials().is_ok());
}
