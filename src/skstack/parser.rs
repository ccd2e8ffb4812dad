// SKSTACK/IPの応答パーサー
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::skstack::response::{Erxudp, Event, PanAttribute, Response};
use nom::Parser;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while_m_n};
use nom::character::complete::{hex_digit1, space0, space1};
use nom::combinator::{eof, map, map_res, opt};
use nom::multi::{many0, separated_list1};
use std::net::Ipv6Addr;

// 8ビット16進数(任意桁)
fn u8_hex_digit(input: &str) -> nom::IResult<&str, u8> {
    map_res(hex_digit1, |hexd| u8::from_str_radix(hexd, 16)).parse(input)
}

// 8ビット16進数(2桁固定)
fn u8_hex_digit2(input: &str) -> nom::IResult<&str, u8> {
    map_res(take_while_m_n(2, 2, |c: char| c.is_ascii_hexdigit()), |s| {
        u8::from_str_radix(s, 16)
    })
    .parse(input)
}

// 16ビット16進数(任意桁)
fn u16_hex_digit(input: &str) -> nom::IResult<&str, u16> {
    map_res(hex_digit1, |hexd| u16::from_str_radix(hexd, 16)).parse(input)
}

// 32ビット16進数(任意桁)
fn u32_hex_digit(input: &str) -> nom::IResult<&str, u32> {
    map_res(hex_digit1, |hexd| u32::from_str_radix(hexd, 16)).parse(input)
}

// 64ビット16進数(任意桁)
fn u64_hex_digit(input: &str) -> nom::IResult<&str, u64> {
    map_res(hex_digit1, |hexd| u64::from_str_radix(hexd, 16)).parse(input)
}

// Ipv6アドレス(FE80:0000:0000:0000:0000:0000:0000:0000)
fn ipv6addr(s: &str) -> nom::IResult<&str, Ipv6Addr> {
    let parser = separated_list1(tag(":"), hex_digit1);
    map_res(parser, |xs: Vec<&str>| xs.join(":").parse::<Ipv6Addr>()).parse(s)
}

// OK
fn rx_ok(input: &str) -> nom::IResult<&str, Response> {
    map(tag("OK"), |_| Response::Ok).parse(input)
}

// FAIL ERxx
fn rx_fail(input: &str) -> nom::IResult<&str, Response> {
    let parser = (tag("FAIL ER"), u8_hex_digit2);
    map(parser, |(_tag, code)| Response::Fail(code)).parse(input)
}

// EVENT xx FE80:0000:0000:0000:0000:0000:0000:0000 yy
fn rx_event(s: &str) -> nom::IResult<&str, Response> {
    let (s, _) = tag("EVENT").parse(s)?;
    let (s, _) = space1.parse(s)?;
    let (s, code) = u8_hex_digit.parse(s)?;
    let (s, sender) = opt(map((space1, ipv6addr), |(_, a)| a)).parse(s)?;
    let (s, param) = opt(map((space1, u8_hex_digit), |(_, n)| n)).parse(s)?;
    Ok((
        s,
        Response::Event(Event {
            code,
            sender,
            param,
        }),
    ))
}

// EPANDESC
fn rx_epandesc(s: &str) -> nom::IResult<&str, Response> {
    map((tag("EPANDESC"), eof), |_| Response::Epandesc).parse(s)
}

// PANディスクリプタの属性行("  Channel:39" など)
fn rx_attribute(s: &str) -> nom::IResult<&str, Response> {
    let (s, _) = space0.parse(s)?;
    let (s, attr) = alt((
        // "Channel Page" を "Channel" より先に
        map((tag("Channel Page:"), u8_hex_digit), |(_, n)| {
            PanAttribute::ChannelPage(n)
        }),
        map((tag("Channel:"), u8_hex_digit), |(_, n)| {
            PanAttribute::Channel(n)
        }),
        map((tag("Pan ID:"), u16_hex_digit), |(_, n)| {
            PanAttribute::PanId(n)
        }),
        map((tag("Addr:"), u64_hex_digit), |(_, n)| PanAttribute::Addr(n)),
        map((tag("LQI:"), u8_hex_digit), |(_, n)| PanAttribute::Lqi(n)),
        map((tag("PairID:"), u32_hex_digit), |(_, n)| {
            PanAttribute::PairId(n)
        }),
    ))
    .parse(s)?;
    Ok((s, Response::Attribute(attr)))
}

// ERXUDP
fn rx_erxudp(s: &str) -> nom::IResult<&str, Response> {
    let (s, _) = tag("ERXUDP").parse(s)?;
    let (s, _) = space1.parse(s)?;
    // 送信元アドレス
    let (s, sender) = ipv6addr.parse(s)?;
    let (s, _) = space1.parse(s)?;
    // 送信先アドレス
    let (s, destination) = ipv6addr.parse(s)?;
    let (s, _) = space1.parse(s)?;
    // 送信元ポート番号
    let (s, sender_port) = u16_hex_digit.parse(s)?;
    let (s, _) = space1.parse(s)?;
    // 送信先ポート番号
    let (s, destination_port) = u16_hex_digit.parse(s)?;
    let (s, _) = space1.parse(s)?;
    // 送信元のMAC層アドレス
    let (s, senderlla) = u64_hex_digit.parse(s)?;
    let (s, _) = space1.parse(s)?;
    // 暗号化あり/なし
    let (s, secured) = u8_hex_digit.parse(s)?;
    let (s, _) = space1.parse(s)?;
    // 受信したデータの長さ
    let (s, datalen) = u16_hex_digit.parse(s)?;
    let (s, _) = space1.parse(s)?;
    // 受信データ(テキスト)
    let (s, data) = many0(u8_hex_digit2).parse(s)?;
    let (s, _) = eof.parse(s)?;

    let erxudp = Erxudp {
        sender,
        destination,
        sender_port,
        destination_port,
        senderlla,
        secured,
        datalen,
        data,
    };

    Ok((s, Response::Erxudp(erxudp)))
}

// EPONG FE80:0000:0000:0000:0000:0000:0000:0000
fn rx_epong(s: &str) -> nom::IResult<&str, Response> {
    let parser = (tag("EPONG"), space1, ipv6addr);
    map(parser, |(_, _, addr)| Response::Epong(addr)).parse(s)
}

// IPv6アドレスだけの行(SKLL64応答)
fn rx_address(s: &str) -> nom::IResult<&str, Response> {
    map((ipv6addr, eof), |(addr, _)| Response::Address(addr)).parse(s)
}

/// 受信した1行(CRLFなし)を解析する
pub fn parse_line(input: &str) -> Response {
    if input.trim().is_empty() {
        return Response::Void;
    }
    let result = alt((
        // 以下のどれか
        rx_ok,        // OK
        rx_fail,      // FAIL
        rx_erxudp,    // ERXUDP
        rx_epandesc,  // EPANDESC
        rx_epong,     // EPONG
        rx_event,     // EVENT
        rx_attribute, // PANディスクリプタ属性
        rx_address,   // IPv6アドレス
    ))
    .parse(input);
    match result {
        Ok((_s, r)) => r,
        // 解釈できない行はそのまま持ち回る(上位層で読み捨てる)
        Err(_) => Response::Other(input.to_string()),
    }
}

#[test]
fn test1() {
    assert_eq!(parse_line(""), Response::Void);

    assert_eq!(parse_line(" "), Response::Void);

    assert_eq!(parse_line("OK"), Response::Ok);

    assert_eq!(parse_line("FAIL ER10"), Response::Fail(16));

    assert_eq!(parse_line("EVER 1.2.8"), Response::Other("EVER 1.2.8".into()));

    assert_eq!(u64_hex_digit("FF00").unwrap(), ("", 0xff00));
}

#[test]
fn test2() {
    let sender = "FE80:0000:0000:0000:0000:0000:0000:0000";

    assert_eq!(
        parse_line(&format!("EVENT 22 {}", sender)),
        Response::Event(Event {
            code: 0x22,
            sender: Some(sender.parse().unwrap()),
            param: None,
        })
    );

    assert_eq!(
        parse_line(&format!("EVENT 21 {} 02", sender)),
        Response::Event(Event {
            code: 0x21,
            sender: Some(sender.parse().unwrap()),
            param: Some(2),
        })
    );

    assert_eq!(
        parse_line("EVENT 25"),
        Response::Event(Event {
            code: 0x25,
            sender: None,
            param: None,
        })
    );
}

#[test]
fn test3() {
    let sender: Ipv6Addr = "FE80:0001:0002:0003:0004:0005:0006:0007".parse().unwrap();
    let destination: Ipv6Addr = "FE80:0008:0009:000a:000b:000c:000d:000e".parse().unwrap();
    let senderlla = 0x1234_5678_9abc_0000u64;
    let datalen = 16;
    let data = "000102030405060708090A0B0C0D0E0F";
    let erxudp = format!(
        "ERXUDP {} {} 0E1A 0E1A {:X} 1 {:04X} {}",
        sender.segments().map(|n| format!("{:04X}", n)).join(":"),
        destination
            .segments()
            .map(|n| format!("{:04X}", n))
            .join(":"),
        senderlla,
        datalen,
        data
    );

    assert_eq!(
        parse_line(&erxudp),
        Response::Erxudp(Erxudp {
            sender,
            destination,
            sender_port: 0x0e1a,
            destination_port: 0x0e1a,
            senderlla,
            secured: 1,
            datalen,
            data: vec!(0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15),
        })
    );
}

#[test]
fn test4() {
    assert_eq!(parse_line("EPANDESC"), Response::Epandesc);
    assert_eq!(
        parse_line("  Channel:3B"),
        Response::Attribute(PanAttribute::Channel(0x3b))
    );
    assert_eq!(
        parse_line("  Channel Page:09"),
        Response::Attribute(PanAttribute::ChannelPage(9))
    );
    assert_eq!(
        parse_line("  Pan ID:ABCD"),
        Response::Attribute(PanAttribute::PanId(0xabcd))
    );
    assert_eq!(
        parse_line("  Addr:12345678ABCDABCD"),
        Response::Attribute(PanAttribute::Addr(0x1234_5678_abcd_abcd))
    );
    assert_eq!(
        parse_line("  LQI:84"),
        Response::Attribute(PanAttribute::Lqi(0x84))
    );
    assert_eq!(
        parse_line("  PairID:1234ABCD"),
        Response::Attribute(PanAttribute::PairId(0x1234_abcd))
    );
}

#[test]
fn test5() {
    let addr = "FE80:0000:0000:0000:021D:1290:1234:5678";
    assert_eq!(
        parse_line(addr),
        Response::Address(addr.parse().unwrap())
    );
    assert_eq!(
        parse_line(&format!("EPONG {}", addr)),
        Response::Epong(addr.parse().unwrap())
    );
}
