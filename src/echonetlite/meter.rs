// Echonetlite 低圧スマート電力量メータークラス
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::echonetlite::Edata;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::fmt;

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Property {
    Coefficient(Coefficient),
    Unit(Unit),
    HistoricalAmount(HistoricalAmount),
    HistoryCollectionDay(HistoryCollectionDay),
    InstantPower(InstantPower),
    InstantCurrent(InstantCurrent),
    CumulativeAtFixedTime(CumulativeAtFixedTime),
}

impl<'a> TryFrom<&Edata<'a>> for Property {
    type Error = String;

    fn try_from(edata: &Edata) -> Result<Self, Self::Error> {
        if let Ok(a) = Coefficient::try_from(edata) {
            Ok(Property::Coefficient(a))
        } else if let Ok(a) = Unit::try_from(edata) {
            Ok(Property::Unit(a))
        } else if let Ok(a) = HistoricalAmount::try_from(edata) {
            Ok(Property::HistoricalAmount(a))
        } else if let Ok(a) = HistoryCollectionDay::try_from(edata) {
            Ok(Property::HistoryCollectionDay(a))
        } else if let Ok(a) = InstantPower::try_from(edata) {
            Ok(Property::InstantPower(a))
        } else if let Ok(a) = InstantCurrent::try_from(edata) {
            Ok(Property::InstantCurrent(a))
        } else if let Ok(a) = CumulativeAtFixedTime::try_from(edata) {
            Ok(Property::CumulativeAtFixedTime(a))
        } else {
            Err(format!("UNKNOWN EPC:0x{:X} EDT:{:?}", edata.epc, edata.edt))
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Coefficient(a) => write!(f, "{}", a),
            Self::Unit(a) => write!(f, "{}", a),
            Self::HistoricalAmount(a) => write!(f, "{}", a),
            Self::HistoryCollectionDay(a) => write!(f, "{}", a),
            Self::InstantPower(a) => write!(f, "{}", a),
            Self::InstantCurrent(a) => write!(f, "{}", a),
            Self::CumulativeAtFixedTime(a) => write!(f, "{}", a),
        }
    }
}

/// 0xd3 係数
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct Coefficient(pub u32);

impl Coefficient {
    pub const EPC: u8 = 0xd3; // 0xd3 係数
}

impl<'a> TryFrom<&Edata<'a>> for Coefficient {
    type Error = String;

    fn try_from(edata: &Edata) -> Result<Self, Self::Error> {
        if edata.epc == Self::EPC {
            match edata.edt {
                &[a, b, c, d] => Ok(Self(u32::from_be_bytes([a, b, c, d]))),
                [] => Ok(Self(1u32)), // 値なしは × 1
                _ => Err(format!("BAD EPC:0x{:X} EDT:{:?}", edata.epc, edata.edt)),
            }
        } else {
            Err(format!("BAD EPC:0x{:X}", edata.epc))
        }
    }
}

impl fmt::Display for Coefficient {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "係数={}", self.0)
    }
}

/// 0xe1 積算電力量単位(正方向、逆方向計測値)
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct Unit(pub Decimal);

impl Unit {
    pub const EPC: u8 = 0xe1; // 0xe1 積算電力量単位(正方向、逆方向計測値)

    /// 積算電力量の生値をkWhへ換算する
    pub fn kwh(&self, coefficient: &Coefficient, count: u32) -> Decimal {
        Decimal::from(count) * Decimal::from(coefficient.0) * self.0
    }
}

impl<'a> TryFrom<&Edata<'a>> for Unit {
    type Error = String;

    fn try_from(edata: &Edata) -> Result<Self, Self::Error> {
        match edata.edt {
            [0x00] if edata.epc == Self::EPC => Ok(Self(Decimal::new(1, 0))), // 1.0 kwh
            [0x01] if edata.epc == Self::EPC => Ok(Self(Decimal::new(1, 1))), // 0.1 kwh
            [0x02] if edata.epc == Self::EPC => Ok(Self(Decimal::new(1, 2))), // 0.01 kwh
            [0x03] if edata.epc == Self::EPC => Ok(Self(Decimal::new(1, 3))), // 0.001 kwh
            [0x04] if edata.epc == Self::EPC => Ok(Self(Decimal::new(1, 4))), // 0.0001 kwh
            [0x0a] if edata.epc == Self::EPC => Ok(Self(Decimal::new(10, 0))), // 10 kwh
            [0x0b] if edata.epc == Self::EPC => Ok(Self(Decimal::new(100, 0))), // 100 kwh
            [0x0c] if edata.epc == Self::EPC => Ok(Self(Decimal::new(1000, 0))), // 1000 kwh
            [0x0d] if edata.epc == Self::EPC => Ok(Self(Decimal::new(10000, 0))), // 10000 kwh
            _ => Err(format!("BAD EPC:0x{:X} EDT:{:?}", edata.epc, edata.edt)),
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "積算電力量単位= {} kwh", self.0)
    }
}

/// 0xe2 積算電力量計測値履歴1 (正方向計測値)
///
/// 履歴は30分毎48コマのうち先頭(午前0時ちょうど)だけを取り出す。
/// 0xFFFFFFFEは計測値なし。
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct HistoricalAmount {
    pub n_days_ago: u16,
    pub first_half_hour: Option<u32>,
}

impl HistoricalAmount {
    pub const EPC: u8 = 0xe2; // 0xe2 積算電力量計測値履歴1 (正方向計測値)
}

impl<'a> TryFrom<&Edata<'a>> for HistoricalAmount {
    type Error = String;

    fn try_from(edata: &Edata) -> Result<Self, Self::Error> {
        match edata.edt {
            &[day0, day1, a, b, c, d, ..] if edata.epc == Self::EPC => {
                let dword = u32::from_be_bytes([a, b, c, d]);
                Ok(Self {
                    n_days_ago: u16::from_be_bytes([day0, day1]),
                    first_half_hour: if dword == 0xfffffffe {
                        None
                    } else {
                        Some(dword)
                    },
                })
            }
            _ => Err(format!("BAD EPC:0x{:X} EDT:{:?}", edata.epc, edata.edt)),
        }
    }
}

impl fmt::Display for HistoricalAmount {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "積算電力量計測値履歴1={:2}日前 [{}]",
            self.n_days_ago,
            self.first_half_hour
                .map_or("NA".to_string(), |n| format!("{}", n))
        )
    }
}

/// 0xe5 積算履歴収集日1
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct HistoryCollectionDay(pub u8);

impl HistoryCollectionDay {
    pub const EPC: u8 = 0xe5; // 0xe5 積算履歴収集日1
}

impl<'a> TryFrom<&Edata<'a>> for HistoryCollectionDay {
    type Error = String;

    fn try_from(edata: &Edata) -> Result<Self, Self::Error> {
        match edata.edt {
            [a] if edata.epc == Self::EPC => Ok(Self(*a)),
            // Set_res応答はEDTを持たない
            [] if edata.epc == Self::EPC => Ok(Self(0)),
            _ => Err(format!("BAD EPC:0x{:X} EDT:{:?}", edata.epc, edata.edt)),
        }
    }
}

impl fmt::Display for HistoryCollectionDay {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "積算履歴収集日1={}日前", self.0)
    }
}

/// 0xe7 瞬時電力計測値
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct InstantPower(pub i32);

impl InstantPower {
    pub const EPC: u8 = 0xe7; // 0xe7 瞬時電力計測値
}

impl<'a> TryFrom<&Edata<'a>> for InstantPower {
    type Error = String;

    fn try_from(edata: &Edata) -> Result<Self, Self::Error> {
        match edata.edt {
            // マイナスの値もある
            &[a, b, c, d] if edata.epc == Self::EPC => Ok(Self(i32::from_be_bytes([a, b, c, d]))),
            _ => Err(format!("BAD EPC:0x{:X} EDT:{:?}", edata.epc, edata.edt)),
        }
    }
}

impl fmt::Display for InstantPower {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "瞬時電力={:5} W", self.0)
    }
}

/// 0xe8 瞬時電流計測値
///
/// 0x7FFEは未計測相。0として合算する。
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct InstantCurrent {
    pub r: Decimal,
    pub t: Decimal,
}

impl InstantCurrent {
    pub const EPC: u8 = 0xe8; // 0xe8 瞬時電流計測値
    const NOT_MEASURED: i16 = 0x7ffe;

    /// R相とT相の合計電流
    pub fn ampere(&self) -> Decimal {
        self.r + self.t
    }
}

impl<'a> TryFrom<&Edata<'a>> for InstantCurrent {
    type Error = String;

    fn try_from(edata: &Edata) -> Result<Self, Self::Error> {
        let deci_ampere = |n: i16| {
            if n == Self::NOT_MEASURED {
                Decimal::ZERO
            } else {
                Decimal::new(n as i64, 1)
            }
        };
        match edata.edt {
            &[a, b, c, d] if edata.epc == Self::EPC => Ok(Self {
                r: deci_ampere(i16::from_be_bytes([a, b])),
                t: deci_ampere(i16::from_be_bytes([c, d])),
            }),
            _ => Err(format!("BAD EPC:0x{:X} EDT:{:?}", edata.epc, edata.edt)),
        }
    }
}

impl fmt::Display for InstantCurrent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "瞬時電流 R={:4} A, T={:4} A", self.r, self.t)
    }
}

/// 0xea 定時積算電力量計測値(正方向計測値)
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct CumulativeAtFixedTime {
    pub time_point: NaiveDateTime,
    pub count: u32,
}

impl CumulativeAtFixedTime {
    pub const EPC: u8 = 0xea; // 0xea 定時積算電力量計測値(正方向計測値)
}

impl<'a> TryFrom<&Edata<'a>> for CumulativeAtFixedTime {
    type Error = String;

    fn try_from(edata: &Edata) -> Result<Self, Self::Error> {
        match edata.edt {
            &[
                year0,  // 年 2bytes
                year1,  //
                month,  // 月 1bytes
                day,    // 日 1bytes
                hour,   // 時 1bytes
                minute, // 分 1bytes
                second, // 秒 1bytes
                a,      // 積算電力量 4bytes
                b,      //
                c,      //
                d,      //
            ] if edata.epc == Self::EPC => {
                let year = u16::from_be_bytes([year0, year1]);
                let time_point = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
                    .and_then(|a| a.and_hms_opt(hour as u32, minute as u32, second as u32))
                    .ok_or(format!("BAD EPC:0x{:X} EDT:{:?}", edata.epc, edata.edt))?;
                Ok(Self {
                    time_point,
                    count: u32::from_be_bytes([a, b, c, d]),
                })
            }
            _ => Err(format!("BAD EPC:0x{:X} EDT:{:?}", edata.epc, edata.edt)),
        }
    }
}

impl fmt::Display for CumulativeAtFixedTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "定時積算電力量計測値={} ({:8})",
            self.time_point.format("%Y-%m-%d %H:%M:%S"),
            self.count
        )
    }
}

#[test]
fn test_coefficient() {
    let edata = Edata {
        epc: 0xd3,
        pdc: 4,
        edt: &[0x00, 0x00, 0x00, 0x01],
    };
    assert_eq!(Coefficient::try_from(&edata).unwrap(), Coefficient(1));

    // 値なしは × 1
    let empty = Edata {
        epc: 0xd3,
        ..Default::default()
    };
    assert_eq!(Coefficient::try_from(&empty).unwrap(), Coefficient(1));

    let other = Edata {
        epc: 0xe1,
        pdc: 1,
        edt: &[0x01],
    };
    assert!(Coefficient::try_from(&other).is_err());
}

#[test]
fn test_unit_table() {
    let cases: [(u8, Decimal); 9] = [
        (0x00, Decimal::new(1, 0)),
        (0x01, Decimal::new(1, 1)),
        (0x02, Decimal::new(1, 2)),
        (0x03, Decimal::new(1, 3)),
        (0x04, Decimal::new(1, 4)),
        (0x0a, Decimal::new(10, 0)),
        (0x0b, Decimal::new(100, 0)),
        (0x0c, Decimal::new(1000, 0)),
        (0x0d, Decimal::new(10000, 0)),
    ];
    for (code, scale) in cases.iter() {
        let edt = [*code];
        let edata = Edata {
            epc: 0xe1,
            pdc: 1,
            edt: &edt,
        };
        assert_eq!(Unit::try_from(&edata).unwrap(), Unit(*scale));
    }

    // 未定義コードはエラー
    let edata = Edata {
        epc: 0xe1,
        pdc: 1,
        edt: &[0x05],
    };
    assert!(Unit::try_from(&edata).is_err());
}

#[test]
fn test_unit_scaling() {
    // 係数1 × 単位0.1 × 生値100 = 10.0 kWh
    let unit = Unit(Decimal::new(1, 1));
    assert_eq!(unit.kwh(&Coefficient(1), 100), Decimal::new(100, 1));
}

#[test]
fn test_historical_amount() {
    let edata = Edata {
        epc: 0xe2,
        pdc: 6,
        edt: &[0x00, 0x11, 0x00, 0x00, 0x00, 0x64],
    };
    assert_eq!(
        HistoricalAmount::try_from(&edata).unwrap(),
        HistoricalAmount {
            n_days_ago: 17,
            first_half_hour: Some(100),
        }
    );

    // 計測値なし
    let edata = Edata {
        epc: 0xe2,
        pdc: 6,
        edt: &[0x00, 0x01, 0xff, 0xff, 0xff, 0xfe],
    };
    assert_eq!(
        HistoricalAmount::try_from(&edata).unwrap().first_half_hour,
        None
    );
}

#[test]
fn test_instant_power() {
    let edata = Edata {
        epc: 0xe7,
        pdc: 4,
        edt: &[0x00, 0x00, 0x01, 0xf4],
    };
    assert_eq!(InstantPower::try_from(&edata).unwrap(), InstantPower(500));

    // 逆潮流
    let edata = Edata {
        epc: 0xe7,
        pdc: 4,
        edt: &[0xff, 0xff, 0xff, 0x38],
    };
    assert_eq!(InstantPower::try_from(&edata).unwrap(), InstantPower(-200));
}

#[test]
fn test_instant_current() {
    // R相未計測(0x7FFE)は0として合算する
    let edata = Edata {
        epc: 0xe8,
        pdc: 4,
        edt: &[0x7f, 0xfe, 0x00, 0x64],
    };
    let current = InstantCurrent::try_from(&edata).unwrap();
    assert_eq!(current.r, Decimal::ZERO);
    assert_eq!(current.t, Decimal::new(100, 1));
    assert_eq!(current.ampere(), Decimal::new(100, 1)); // 10.0 A

    let edata = Edata {
        epc: 0xe8,
        pdc: 4,
        edt: &[0x00, 0x96, 0x00, 0x64],
    };
    let current = InstantCurrent::try_from(&edata).unwrap();
    assert_eq!(current.ampere(), Decimal::new(250, 1)); // 25.0 A
}

#[test]
fn test_cumulative_at_fixed_time() {
    let edata = Edata {
        epc: 0xea,
        pdc: 11,
        edt: &[
            0x07, 0xe8, // 2024年
            0x03, 0x0a, // 3月10日
            0x16, 0x1e, 0x00, // 22時30分0秒
            0x00, 0x00, 0x30, 0x39, // 12345
        ],
    };
    let decoded = CumulativeAtFixedTime::try_from(&edata).unwrap();
    assert_eq!(
        decoded.time_point,
        NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(22, 30, 0)
            .unwrap()
    );
    assert_eq!(decoded.count, 12345);
}
