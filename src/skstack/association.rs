// スマートメーターとの接続手順(スキャン・アドレス解決・JOIN)
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::error::{Error, Result};
use crate::skstack::command::{self, address_literal};
use crate::skstack::line::{LineChannel, READ_DEADLINE};
use crate::skstack::parser;
use crate::skstack::response::{PanAttribute, Response};
use std::net::Ipv6Addr;

// アクティブスキャンの持続時間
const SCAN_DURATION_FIRST: u8 = 6;
const SCAN_DURATION_LAST: u8 = 10;

/// 接続状態
///
/// スキャンで4項目が埋まれば「解決済み」。IPv6アドレスは解決後に
/// SKLL64で導出する。JOIN失敗時には全体を破棄して再スキャンする。
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AssociationState {
    pub channel: Option<u8>,
    pub pan_id: Option<u16>,
    pub mac_address: Option<u64>,
    pub link_quality: Option<u8>,
    pub ipv6_address: Option<Ipv6Addr>,
}

impl AssociationState {
    /// スキャン結果4項目がそろっているか
    pub fn is_resolved(&self) -> bool {
        self.channel.is_some()
            && self.pan_id.is_some()
            && self.mac_address.is_some()
            && self.link_quality.is_some()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn absorb(&mut self, attr: PanAttribute) {
        match attr {
            PanAttribute::Channel(n) => self.channel = Some(n),
            PanAttribute::PanId(n) => self.pan_id = Some(n),
            PanAttribute::Addr(n) => self.mac_address = Some(n),
            PanAttribute::Lqi(n) => self.link_quality = Some(n),
            // Channel Page/PairIDは使わない
            PanAttribute::ChannelPage(_) => {}
            PanAttribute::PairId(_) => {}
        }
    }
}

/// アクティブスキャンでスマートメーターを探す
///
/// EVENT 22(スキャン終了)までに4項目がそろわなければ持続時間を1つ
/// 伸ばして繰り返し、10を超えたらあきらめる。
pub fn scan(line: &mut LineChannel, state: &mut AssociationState) -> Result<bool> {
    let mut duration = SCAN_DURATION_FIRST;
    while duration <= SCAN_DURATION_LAST {
        state.clear();
        line.write_line(&format!("SKSCAN 2 FFFFFFFF {:X}", duration))?;
        loop {
            match parser::parse_line(&line.read_line(READ_DEADLINE)?) {
                // EVENT 22 = アクティブスキャン終了
                Response::Event(event) if event.code == 0x22 => break,
                Response::Attribute(attr) => state.absorb(attr),
                other => tracing::trace!("{:?}", other),
            }
        }
        if state.is_resolved() {
            tracing::info!("scan: {:?}", state);
            return Ok(true);
        }
        duration += 1;
    }
    tracing::error!("scan: smart meter not found");
    Ok(false)
}

/// MACアドレスからIPv6リンクローカルアドレスを得る
pub fn resolve_address(line: &mut LineChannel, state: &mut AssociationState) -> Result<bool> {
    let mac_address = state
        .mac_address
        .ok_or(Error::Rejected("MACアドレスが未解決".to_string()))?;
    line.write_line(&format!("SKLL64 {:016X}", mac_address))?;
    loop {
        match parser::parse_line(&line.read_line(READ_DEADLINE)?) {
            Response::Address(addr) => {
                tracing::info!("resolve_address: {}", addr);
                state.ipv6_address = Some(addr);
                return Ok(true);
            }
            // 空行は値が来るまで読み飛ばす
            Response::Void => {}
            other => tracing::trace!("{:?}", other),
        }
    }
}

/// 解決済みのチャンネルとPAN IDをモジュールへ反映する
pub fn configure(line: &mut LineChannel, state: &AssociationState) -> Result<bool> {
    let (channel, pan_id) = state
        .channel
        .zip(state.pan_id)
        .ok_or(Error::Rejected("チャンネル/PAN IDが未解決".to_string()))?;
    Ok(command::sk_set_channel(line, channel)? && command::sk_set_pan_id(line, pan_id)?)
}

/// PANA認証を開始して接続の成否を待つ
pub fn join(line: &mut LineChannel, state: &AssociationState) -> Result<bool> {
    let addr = state
        .ipv6_address
        .ok_or(Error::Rejected("IPv6アドレスが未解決".to_string()))?;
    line.write_line(&format!("SKJOIN {}", address_literal(&addr)))?;
    loop {
        match parser::parse_line(&line.read_line(READ_DEADLINE)?) {
            // EVENT 24 = PANA接続失敗
            Response::Event(event) if event.code == 0x24 => return Ok(false),
            // EVENT 25 = PANA接続完了
            Response::Event(event) if event.code == 0x25 => return Ok(true),
            other => tracing::trace!("{:?}", other),
        }
    }
}

/// PANAセッションを終了する。接続状態は保持する。
pub fn terminate(line: &mut LineChannel) -> Result<bool> {
    command::sk_term(line)
}

#[cfg(test)]
const SENDER: &str = "FE80:0000:0000:0000:021D:1290:1234:5678";

#[cfg(test)]
fn pan_descriptor() -> String {
    [
        "EVENT 20 ",
        SENDER,
        "\r\nEPANDESC\r\n",
        "  Channel:21\r\n",
        "  Channel Page:09\r\n",
        "  Pan ID:8888\r\n",
        "  Addr:001D129012345678\r\n",
        "  LQI:E1\r\n",
        "  PairID:01234567\r\n",
    ]
    .concat()
}

#[test]
fn test_scan_succeeds() {
    use crate::skstack::line::testing;

    let script = [pan_descriptor(), format!("EVENT 22 {}\r\n", SENDER)].concat();
    let (mut line, w) = testing::scripted(&script);
    let mut state = AssociationState::default();
    assert_eq!(scan(&mut line, &mut state).unwrap(), true);
    assert_eq!(w.taken(), "SKSCAN 2 FFFFFFFF 6\r\n");
    assert_eq!(
        state,
        AssociationState {
            channel: Some(0x21),
            pan_id: Some(0x8888),
            mac_address: Some(0x001d_1290_1234_5678),
            link_quality: Some(0xe1),
            ipv6_address: None,
        }
    );
}

#[test]
fn test_scan_retries_with_longer_duration() {
    use crate::skstack::line::testing;

    // 毎回なにも見つからずにスキャン窓が閉じる
    let script = format!("EVENT 22 {}\r\n", SENDER).repeat(5);
    let (mut line, w) = testing::scripted(&script);
    let mut state = AssociationState::default();
    assert_eq!(scan(&mut line, &mut state).unwrap(), false);
    assert_eq!(
        w.taken(),
        "SKSCAN 2 FFFFFFFF 6\r\n\
         SKSCAN 2 FFFFFFFF 7\r\n\
         SKSCAN 2 FFFFFFFF 8\r\n\
         SKSCAN 2 FFFFFFFF 9\r\n\
         SKSCAN 2 FFFFFFFF A\r\n"
    );
    assert!(!state.is_resolved());
}

#[test]
fn test_scan_clears_partial_result() {
    use crate::skstack::line::testing;

    // 1回目はLQIが欠けたまま窓が閉じ、2回目で全項目そろう
    let partial = [
        "EPANDESC\r\n",
        "  Channel:21\r\n",
        "  Pan ID:8888\r\n",
        "  Addr:001D129012345678\r\n",
    ]
    .concat();
    let script = [
        partial,
        format!("EVENT 22 {}\r\n", SENDER),
        pan_descriptor(),
        format!("EVENT 22 {}\r\n", SENDER),
    ]
    .concat();
    let (mut line, _w) = testing::scripted(&script);
    let mut state = AssociationState::default();
    assert_eq!(scan(&mut line, &mut state).unwrap(), true);
    assert!(state.is_resolved());
}

#[test]
fn test_resolve_address() {
    use crate::skstack::line::testing;

    let script = format!("\r\n{}\r\n", SENDER);
    let (mut line, w) = testing::scripted(&script);
    let mut state = AssociationState {
        mac_address: Some(0x001d_1290_1234_5678),
        ..Default::default()
    };
    assert_eq!(resolve_address(&mut line, &mut state).unwrap(), true);
    assert_eq!(w.taken(), "SKLL64 001D129012345678\r\n");
    assert_eq!(state.ipv6_address, Some(SENDER.parse().unwrap()));
}

#[test]
fn test_join() {
    use crate::skstack::line::testing;

    let resolved = AssociationState {
        channel: Some(0x21),
        pan_id: Some(0x8888),
        mac_address: Some(0x001d_1290_1234_5678),
        link_quality: Some(0xe1),
        ipv6_address: Some(SENDER.parse().unwrap()),
    };

    let script = format!("OK\r\nEVENT 02 {0}\r\nEVENT 25 {0}\r\n", SENDER);
    let (mut line, w) = testing::scripted(&script);
    assert_eq!(join(&mut line, &resolved).unwrap(), true);
    assert_eq!(w.taken(), format!("SKJOIN {}\r\n", SENDER));

    let script = format!("OK\r\nEVENT 24 {}\r\n", SENDER);
    let (mut line, _w) = testing::scripted(&script);
    assert_eq!(join(&mut line, &resolved).unwrap(), false);
}
