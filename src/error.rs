// ドライバーのエラー型
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(r#"i/o "{0}""#)]
    Io(#[from] io::Error),

    #[error("応答待ちがタイムアウトした")]
    Timeout,

    #[error("コマンド実行に失敗した。{0}")]
    Rejected(String),

    #[error("PANA による接続過程でエラーが発生した（接続が完了しなかった）")]
    AssociationRejected,

    #[error("デコードに失敗した。{0}")]
    Decode(String),

    #[error("IDは32文字固定長です。{0}")]
    InvalidId(String),

    #[error("PASSWORDは12文字固定長です。{0}")]
    InvalidPassword(String),
}

impl Error {
    /// 接続ループ内で再試行できるエラーか
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Timeout => true,
            Error::Rejected(_) => true,
            Error::AssociationRejected => true,
            Error::Decode(_) => true,
            Error::Io(_) => false,
            Error::InvalidId(_) => false,
            Error::InvalidPassword(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
