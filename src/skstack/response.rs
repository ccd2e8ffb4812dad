// SKSTACK/IPの応答
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use std::net::Ipv6Addr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub code: u8,
    pub sender: Option<Ipv6Addr>,
    pub param: Option<u8>,
}

/// アクティブスキャンが報告するPANディスクリプタの1属性行
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanAttribute {
    Channel(u8),
    ChannelPage(u8),
    PanId(u16),
    Addr(u64),
    Lqi(u8),
    PairId(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Erxudp {
    pub sender: Ipv6Addr,      // 送信元IPv6アドレス
    pub destination: Ipv6Addr, // 送信先IPv6アドレス
    pub sender_port: u16,      // 送信元UDPポート番号
    pub destination_port: u16, // 送信先UDPポート番号
    pub senderlla: u64,        // 送信元のMAC層アドレス
    pub secured: u8,           // 1:暗号化あり, 0:暗号化なし
    pub datalen: u16,          // 受信データ長
    pub data: Vec<u8>,         // 受信データ
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok,                        // 成功
    Fail(u8),                  // 失敗
    Event(Event),              // イベント受信
    Epandesc,                  // EPANDESCヘッダ行
    Attribute(PanAttribute),   // PANディスクリプタ属性行
    Erxudp(Erxudp),            // ERXUDP受信
    Epong(Ipv6Addr),           // EPONG受信
    Address(Ipv6Addr),         // IPv6アドレス行(SKLL64応答)
    Void,                      // 空行
    Other(String),             // その他の行(SKVERのEVERなど)
}
