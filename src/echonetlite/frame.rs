// Echonetlite FRAME
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::echonetlite::Edata;
use core::result;
use std::fmt;

/// EHD = Echonetlite電文
pub const EHD_ECHONETLITE: u16 = 0x1081;
/// SEOJ = コントローラークラス
pub const SEOJ_CONTROLLER: [u8; 3] = [0x05, 0xff, 0x01];
/// DEOJ = 低圧スマート電力量メータークラス
pub const DEOJ_SMART_METER: [u8; 3] = [0x02, 0x88, 0x01];

/// ESV プロパティ値書き込み要求(応答要)
pub const ESV_SETC: u8 = 0x61;
/// ESV プロパティ値読み出し要求
pub const ESV_GET: u8 = 0x62;
/// ESV プロパティ値書き込み応答
pub const ESV_SET_RES: u8 = 0x71;
/// ESV プロパティ値読み出し応答
pub const ESV_GET_RES: u8 = 0x72;
/// ESV プロパティ値通知
pub const ESV_INF: u8 = 0x73;

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Frame<'a> {
    pub ehd: u16,
    pub tid: u16,
    pub seoj: [u8; 3],
    pub deoj: [u8; 3],
    pub esv: u8,
    pub opc: u8,
    pub edata: Vec<Edata<'a>>,
}

impl<'a> Frame<'a> {
    /// プロパティ値読み出し要求(1プロパティ)
    pub fn read_request(epc: u8) -> Frame<'static> {
        Frame {
            ehd: EHD_ECHONETLITE,
            tid: 0x0001,
            seoj: SEOJ_CONTROLLER,
            deoj: DEOJ_SMART_METER,
            esv: ESV_GET,
            opc: 1,
            edata: vec![Edata {
                epc,
                pdc: 0,
                edt: &[],
            }],
        }
    }

    /// プロパティ値書き込み要求(1プロパティ)
    pub fn write_request(epc: u8, edt: &'a [u8]) -> Frame<'a> {
        Frame {
            ehd: EHD_ECHONETLITE,
            tid: 0x0001,
            seoj: SEOJ_CONTROLLER,
            deoj: DEOJ_SMART_METER,
            esv: ESV_SETC,
            opc: 1,
            edata: vec![Edata {
                epc,
                pdc: edt.len() as u8,
                edt,
            }],
        }
    }

    pub fn show(&self) -> String {
        match self.esv {
            // SetC_SNA
            0x51 => format!("SetC_SNAプロパティ値書き込み要求不可応答 N={}", self.opc),
            // Get_SNA
            0x52 => format!("Get_SNAプロパティ値読み出し不可応答 N={}", self.opc),
            // SetC
            ESV_SETC => format!("SetCプロパティ値書き込み要求 N={}", self.opc),
            // Get
            ESV_GET => format!("Getプロパティ値読み出し要求 N={}", self.opc),
            // Set_res
            ESV_SET_RES => format!("Set_resプロパティ値書き込み応答 N={}", self.opc),
            // Get_res
            ESV_GET_RES => format!("Get_resプロパティ値読み出し応答 N={}", self.opc),
            // INF
            ESV_INF => format!("INFプロパティ値通知 N={}", self.opc),
            _ => format!("よくわからないESV値 0x{:02X} N={}", self.esv, self.opc),
        }
    }
}

impl<'de, Context> bincode::BorrowDecode<'de, Context> for Frame<'de> {
    fn borrow_decode<D: bincode::de::BorrowDecoder<'de, Context = Context>>(
        decoder: &mut D,
    ) -> core::result::Result<Self, bincode::error::DecodeError> {
        let ehd: u16 = bincode::BorrowDecode::borrow_decode(decoder)?;
        let tid: u16 = bincode::BorrowDecode::borrow_decode(decoder)?;
        let seoj: [u8; 3] = bincode::BorrowDecode::borrow_decode(decoder)?;
        let deoj: [u8; 3] = bincode::BorrowDecode::borrow_decode(decoder)?;
        let esv: u8 = bincode::BorrowDecode::borrow_decode(decoder)?;
        let opc: u8 = bincode::BorrowDecode::borrow_decode(decoder)?;
        let mut edata: Vec<Edata> = Vec::new();
        for _idx in 0..opc {
            edata.push(bincode::BorrowDecode::borrow_decode(decoder)?);
        }
        Ok(Self {
            ehd,
            tid,
            seoj,
            deoj,
            esv,
            opc,
            edata,
        })
    }
}

impl<'a> bincode::Encode for Frame<'a> {
    fn encode<E: bincode::enc::Encoder>(
        &self,
        encoder: &mut E,
    ) -> result::Result<(), bincode::error::EncodeError> {
        bincode::Encode::encode(&self.ehd, encoder)?;
        bincode::Encode::encode(&self.tid, encoder)?;
        bincode::Encode::encode(&self.seoj, encoder)?;
        bincode::Encode::encode(&self.deoj, encoder)?;
        bincode::Encode::encode(&self.esv, encoder)?;
        bincode::Encode::encode(&self.opc, encoder)?;
        for v in &self.edata {
            bincode::Encode::encode(v, encoder)?;
        }
        Ok(())
    }
}

impl<'a> fmt::Display for Frame<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.show())
    }
}

impl<'a> Default for Frame<'a> {
    #[inline]
    fn default() -> Self {
        Frame {
            ehd: EHD_ECHONETLITE,
            tid: 0,
            seoj: [0, 0, 0],
            deoj: [0, 0, 0],
            esv: 0,
            opc: 0,
            edata: vec![],
        }
    }
}

#[test]
fn test1() {
    let frame = Frame::read_request(0xe7);

    let binary: Vec<u8> = vec![
        0x10, 0x81, //
        0x00, 0x01, //
        0x05, 0xff, 0x01, //
        0x02, 0x88, 0x01, //
        0x62, //
        0x01, //
        0xe7, 0x00, //
    ];
    let config = crate::echonetlite::wire_config();

    let encoded = bincode::encode_to_vec(&frame, config).unwrap();
    assert_eq!(encoded.len(), 14);
    assert_eq!(encoded, binary);

    let (decoded, _len): (Frame, usize) =
        bincode::borrow_decode_from_slice(&encoded[..], config).unwrap();
    assert_eq!(frame, decoded);
}

#[test]
fn test2() {
    let edt = [17u8];
    let frame = Frame::write_request(0xe5, &edt);

    let binary: Vec<u8> = vec![
        0x10, 0x81, //
        0x00, 0x01, //
        0x05, 0xff, 0x01, //
        0x02, 0x88, 0x01, //
        0x61, //
        0x01, //
        0xe5, 0x01, 0x11, //
    ];
    let config = crate::echonetlite::wire_config();

    let encoded = bincode::encode_to_vec(&frame, config).unwrap();
    assert_eq!(encoded, binary);
}
