// スマートメーターとの接続と計測値の取得
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::billing;
use crate::echonetlite::{self, Frame, meter};
use crate::error::{Error, Result};
use crate::skstack::association::{self, AssociationState};
use crate::skstack::command::{self, address_literal};
use crate::skstack::credentials::Credentials;
use crate::skstack::line::LineChannel;
use crate::skstack::parser;
use crate::skstack::response::Response;
use chrono::{NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use std::time::{Duration, Instant};

/// Echonetliteメッセージの応答待ち時間
const RESPONSE_DEADLINE: Duration = Duration::from_secs(60);

/// EchonetliteのUDPポート番号
const ECHONETLITE_PORT: u16 = 0x0e1a;

/// 接続の進捗(%)を受け取るコールバック
pub type ProgressSink = Box<dyn FnMut(u8) + Send>;

/// 低圧スマート電力量メーター
///
/// 行チャネル・接続手順・Echonetlite電文・検針日計算をまとめた窓口。
/// 要求と応答は常に1件ずつで、応答を待たずに次の要求は出さない。
pub struct SmartMeter {
    line: LineChannel,
    credentials: Credentials,
    collect_day: u8,
    association: AssociationState,
    coefficient: Option<meter::Coefficient>,
    unit: Option<meter::Unit>,
    progress: ProgressSink,
}

impl SmartMeter {
    pub fn new(line: LineChannel, credentials: Credentials, collect_day: u8) -> Self {
        Self {
            line,
            credentials,
            collect_day,
            association: AssociationState::default(),
            coefficient: None,
            unit: None,
            progress: Box::new(|_| {}),
        }
    }

    pub fn with_progress(mut self, progress: impl FnMut(u8) + Send + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    /// スマートメーターへの接続
    ///
    /// 初期化と認証情報の登録に失敗したらエラーを返す。以降の接続手順は
    /// 回復可能なエラーである限り成功するまで繰り返す。
    pub fn open(&mut self) -> Result<(u8, u16, u64, u8)> {
        // バッファをクリア
        (self.progress)(0);
        self.line.purge()?;

        // モジュールの初期化
        (self.progress)(10);
        if !command::sk_init(&mut self.line)? {
            return Err(Error::Rejected("モジュールの初期化".to_string()));
        }

        // ルートB認証IDの設定
        (self.progress)(30);
        if !(command::sk_set_password(&mut self.line, &self.credentials.password)?
            && command::sk_set_id(&mut self.line, &self.credentials.id)?)
        {
            return Err(Error::Rejected("ルートB認証情報の登録".to_string()));
        }

        loop {
            match self.associate() {
                Ok(resolved) => return Ok(resolved),
                Err(e) if e.is_recoverable() => {
                    tracing::error!("{}", e);
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn associate(&mut self) -> Result<(u8, u16, u64, u8)> {
        // スマートメーターのスキャン
        (self.progress)(40);
        if !self.association.is_resolved()
            && !association::scan(&mut self.line, &mut self.association)?
        {
            return Err(Error::Rejected("アクティブスキャン".to_string()));
        }

        // IPv6アドレスの取得
        (self.progress)(50);
        association::resolve_address(&mut self.line, &mut self.association)?;

        // 無線チャンネルと受信PAN IDの設定
        (self.progress)(60);
        if !association::configure(&mut self.line, &self.association)? {
            return Err(Error::Rejected("チャンネル/PAN IDの設定".to_string()));
        }

        // スマートメーターに接続
        (self.progress)(70);
        if !association::join(&mut self.line, &self.association)? {
            // スキャン結果を破棄して最初からやり直す
            self.association.clear();
            return Err(Error::AssociationRejected);
        }

        // 係数(D3)の取得
        (self.progress)(80);
        self.coefficient = match self.read_property(meter::Coefficient::EPC)? {
            meter::Property::Coefficient(a) => Some(a),
            other => return Err(Error::Decode(format!("予期しない応答 {}", other))),
        };

        // 積算電力量単位(E1)の取得
        (self.progress)(90);
        self.unit = match self.read_property(meter::Unit::EPC)? {
            meter::Property::Unit(a) => Some(a),
            other => return Err(Error::Decode(format!("予期しない応答 {}", other))),
        };

        (self.progress)(100);
        self.association
            .channel
            .zip(self.association.pan_id)
            .zip(self.association.mac_address)
            .zip(self.association.link_quality)
            .map(|(((channel, pan_id), mac_address), lqi)| (channel, pan_id, mac_address, lqi))
            .ok_or(Error::Rejected("接続状態が未解決".to_string()))
    }

    /// スマートメーターとの接続解除
    ///
    /// 失敗してもエラーにしない。接続状態も保持したままにするので、
    /// 次のopen()はスキャンを省略できる。
    pub fn close(&mut self) {
        if let Err(e) = association::terminate(&mut self.line) {
            tracing::error!("sk_term: {}", e);
        }
    }

    /// 接続相手の生存確認
    pub fn ping(&mut self) -> Result<bool> {
        let addr = self
            .association
            .ipv6_address
            .ok_or(Error::Rejected("IPv6アドレスが未解決".to_string()))?;
        command::sk_ping(&mut self.line, &addr)
    }

    /// モジュールのファームウェアバージョン照会
    pub fn version_check(&mut self) -> Result<bool> {
        command::sk_ver(&mut self.line)
    }

    /// 瞬時電力計測値(E7)の取得
    pub fn instantaneous_power(&mut self) -> Result<(NaiveDateTime, Decimal)> {
        match self.read_property(meter::InstantPower::EPC)? {
            meter::Property::InstantPower(a) => Ok((billing::jst_now(), Decimal::from(a.0))),
            other => Err(Error::Decode(format!("予期しない応答 {}", other))),
        }
    }

    /// 瞬時電流計測値(E8)の取得
    pub fn instantaneous_amperage(&mut self) -> Result<(NaiveDateTime, Decimal)> {
        match self.read_property(meter::InstantCurrent::EPC)? {
            meter::Property::InstantCurrent(a) => Ok((billing::jst_now(), a.ampere())),
            other => Err(Error::Decode(format!("予期しない応答 {}", other))),
        }
    }

    /// 定時積算電力量計測値(EA)の取得
    pub fn total_power(&mut self) -> Result<(NaiveDateTime, Decimal)> {
        let (coefficient, unit) = self.calibration()?;
        match self.read_property(meter::CumulativeAtFixedTime::EPC)? {
            meter::Property::CumulativeAtFixedTime(a) => {
                Ok((a.time_point, unit.kwh(&coefficient, a.count)))
            }
            other => Err(Error::Decode(format!("予期しない応答 {}", other))),
        }
    }

    /// 前回検針日を起点とした今月の使用電力量
    pub fn monthly_power(&mut self) -> Result<(NaiveDateTime, Decimal)> {
        let (coefficient, unit) = self.calibration()?;
        let today = billing::jst_today();

        // 積算履歴収集日1(E5)を前回検針日からの経過日数に設定する
        let days = billing::days_since_last_collection(self.collect_day, today);
        self.write_property(meter::HistoryCollectionDay::EPC, days as u8)?;

        // 前回検針日の積算電力量計測値履歴1(E2)
        let historical = match self.read_property(meter::HistoricalAmount::EPC)? {
            meter::Property::HistoricalAmount(a) => a
                .first_half_hour
                .map(|n| unit.kwh(&coefficient, n))
                .ok_or(Error::Decode("積算電力量履歴に計測値がない".to_string()))?,
            other => return Err(Error::Decode(format!("予期しない応答 {}", other))),
        };

        // 現在の積算電力量との差分
        let (_, current) = self.total_power()?;
        let since = billing::last_collection_date(self.collect_day, today).and_time(NaiveTime::MIN);
        Ok((since, current - historical))
    }

    fn calibration(&self) -> Result<(meter::Coefficient, meter::Unit)> {
        self.coefficient
            .zip(self.unit)
            .ok_or(Error::Decode("係数と積算電力量単位が未取得".to_string()))
    }

    /// プロパティ値読み出し
    fn read_property(&mut self, epc: u8) -> Result<meter::Property> {
        let frame = Frame::read_request(epc);
        self.send_frame(&frame)?;
        self.await_response(echonetlite::ESV_GET_RES, epc)
    }

    /// プロパティ値書き込み
    fn write_property(&mut self, epc: u8, value: u8) -> Result<u8> {
        let edt = [value];
        let frame = Frame::write_request(epc, &edt);
        self.send_frame(&frame)?;
        match self.await_response(echonetlite::ESV_SET_RES, epc)? {
            meter::Property::HistoryCollectionDay(a) => Ok(a.0),
            other => Err(Error::Decode(format!("予期しない応答 {}", other))),
        }
    }

    /// Echonetliteメッセージ送信
    fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        let addr = self
            .association
            .ipv6_address
            .ok_or(Error::Rejected("IPv6アドレスが未解決".to_string()))?;
        let payload = bincode::encode_to_vec(frame, echonetlite::wire_config())
            .map_err(|e| Error::Decode(e.to_string()))?;
        let sksendto = format!(
            "SKSENDTO 1 {} {:04X} 1 {:04X} ",
            address_literal(&addr),
            ECHONETLITE_PORT,
            payload.len(),
        );
        let command = [sksendto.as_bytes(), &payload].concat();
        self.line.write(&command)
    }

    /// Echonetliteメッセージの応答待ち
    ///
    /// ERXUDP行だけを対象に、スマートメーター発で(ESV, EPC)が一致する
    /// 電文が届くまで読み続ける。期限切れはタイムアウト。
    fn await_response(&mut self, esv: u8, epc: u8) -> Result<meter::Property> {
        let started = Instant::now();
        while started.elapsed() < RESPONSE_DEADLINE {
            let remaining = RESPONSE_DEADLINE - started.elapsed();
            let received = self.line.read_line(remaining)?;
            let Response::Erxudp(erxudp) = parser::parse_line(&received) else {
                continue;
            };
            if erxudp.destination_port != ECHONETLITE_PORT {
                // PANAメッセージ(RFC5191)などは読み捨てる
                tracing::trace!("rport {}: ignored", erxudp.destination_port);
                continue;
            }
            let frame: Frame =
                match bincode::borrow_decode_from_slice(&erxudp.data, echonetlite::wire_config()) {
                    Ok((frame, _len)) => frame,
                    Err(e) => {
                        tracing::warn!("echonetlite電文の解析に失敗した: {}", e);
                        continue;
                    }
                };
            // 低圧スマート電力量メーター(028801)以外は読み捨てる
            if frame.seoj != echonetlite::DEOJ_SMART_METER || frame.esv != esv {
                continue;
            }
            for edata in frame.edata.iter() {
                if edata.epc != epc {
                    continue;
                }
                let property = meter::Property::try_from(edata).map_err(Error::Decode)?;
                tracing::info!("{} {}", frame.show(), property);
                return Ok(property);
            }
        }
        Err(Error::Timeout)
    }
}

#[cfg(test)]
const SENDER: &str = "FE80:0000:0000:0000:021D:1290:1234:5678";

#[cfg(test)]
fn erxudp_line(hex_payload: &str) -> String {
    format!(
        "ERXUDP {0} FE80:0000:0000:0000:1234:5678:9ABC:DEF0 0E1A 0E1A 001D129012345678 1 {1:04X} {2}\r\n",
        SENDER,
        hex_payload.len() / 2,
        hex_payload
    )
}

#[cfg(test)]
fn test_meter(script: &str) -> (SmartMeter, crate::skstack::line::testing::SharedWriter) {
    use crate::skstack::line::testing;
    use std::str::FromStr;

    let (line, writer) = testing::scripted(script);
    let credentials = Credentials {
        id: crate::skstack::credentials::Id::from_str("00112233445566778899AABBCCDDEEFF").unwrap(),
        password: crate::skstack::credentials::Password::from_str("0123456789AB").unwrap(),
    };
    let mut meter = SmartMeter::new(line, credentials, 22);
    meter.association = AssociationState {
        channel: Some(0x21),
        pan_id: Some(0x8888),
        mac_address: Some(0x001d_1290_1234_5678),
        link_quality: Some(0xe1),
        ipv6_address: Some(SENDER.parse().unwrap()),
    };
    (meter, writer)
}

#[test]
fn test_read_instantaneous_power() {
    // 瞬時電力500Wの応答
    let script = [
        "EVENT 21 FE80:0000:0000:0000:021D:1290:1234:5678 00\r\n",
        "OK\r\n",
        &erxudp_line("1081000102880105FF017201E704000001F4"),
    ]
    .concat();
    let (mut meter, w) = test_meter(&script);

    let (_at, watt) = meter.instantaneous_power().unwrap();
    assert_eq!(watt, Decimal::from(500));

    // 送信コマンドの形
    let sent = w.taken_bytes();
    let head = format!("SKSENDTO 1 {} 0E1A 1 000E ", SENDER);
    assert_eq!(&sent[..head.len()], head.as_bytes());
    assert_eq!(
        &sent[head.len()..],
        &[
            0x10, 0x81, 0x00, 0x01, 0x05, 0xff, 0x01, 0x02, 0x88, 0x01, 0x62, 0x01, 0xe7, 0x00
        ]
    );
}

#[test]
fn test_total_power_scaling() {
    // 係数1、単位0.1 kwhで生値100 => 10.0 kWh
    let script = erxudp_line("1081000102880105FF017201EA0B07E8030A00000000000064");
    let (mut meter, _w) = test_meter(&script);
    meter.coefficient = Some(meter::Coefficient(1));
    meter.unit = Some(meter::Unit(Decimal::new(1, 1)));

    let (at, kwh) = meter.total_power().unwrap();
    assert_eq!(
        at,
        chrono::NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    );
    assert_eq!(kwh, Decimal::new(100, 1));
}

#[test]
fn test_total_power_needs_calibration() {
    let (mut meter, _w) = test_meter("");
    assert!(matches!(meter.total_power(), Err(Error::Decode(_))));
}

#[test]
fn test_write_history_collection_day() {
    // Set_res応答(EDTなし)
    let script = erxudp_line("1081000102880105FF017101E500");
    let (mut meter, w) = test_meter(&script);
    assert_eq!(meter.write_property(0xe5, 17).unwrap(), 0);

    let sent = w.taken_bytes();
    let head = format!("SKSENDTO 1 {} 0E1A 1 000F ", SENDER);
    assert_eq!(&sent[..head.len()], head.as_bytes());
    assert_eq!(
        &sent[head.len()..],
        &[
            0x10, 0x81, 0x00, 0x01, 0x05, 0xff, 0x01, 0x02, 0x88, 0x01, 0x61, 0x01, 0xe5, 0x01,
            0x11
        ]
    );
}

#[test]
fn test_response_filtering() {
    // 他クラス発の電文とESV不一致の電文は読み捨てて目的の応答だけ拾う
    let script = [
        // SEOJが別クラス(001101)
        erxudp_line("1081000100110105FF017201E704000001F4"),
        // ESVが通知(INF)
        erxudp_line("1081000102880105FF017301E704000001F4"),
        // 目的の応答
        erxudp_line("1081000102880105FF017201E8047FFE0064"),
    ]
    .concat();
    let (mut meter, _w) = test_meter(&script);

    let (_at, ampere) = meter.instantaneous_amperage().unwrap();
    assert_eq!(ampere, Decimal::new(100, 1)); // 10.0 A
}

#[test]
fn test_close_is_idempotent() {
    // 応答が来なくてもclose()は失敗せず、接続状態も変えない
    let (mut meter, w) = test_meter("");
    let before = meter.association.clone();
    meter.close();
    meter.close();
    assert_eq!(meter.association, before);
    assert_eq!(w.taken(), "SKTERM\r\nSKTERM\r\n");
}
