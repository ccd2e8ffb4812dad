// SKSTACK/IPコマンドの発行
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::error::Result;
use crate::skstack::credentials::{Id, Password};
use crate::skstack::line::{LineChannel, READ_DEADLINE};
use crate::skstack::parser;
use crate::skstack::response::Response;
use std::net::Ipv6Addr;

/// SKSENDTOなどに渡すIPv6アドレス表記(FE80:0000:...)
pub fn address_literal(addr: &Ipv6Addr) -> String {
    addr.segments().map(|n| format!("{:04X}", n)).join(":")
}

/// コマンドを発行してOK/FAILの決着をつける
///
/// OK/FAIL以外の行はこの層では読み捨てる。
pub fn execute(line: &mut LineChannel, command: &str, argument: &str) -> Result<bool> {
    line.write_line(&format!("{}{}", command, argument))?;
    loop {
        match parser::parse_line(&line.read_line(READ_DEADLINE)?) {
            Response::Ok => {
                tracing::debug!(r#""{}": OK"#, command.trim_end());
                return Ok(true);
            }
            Response::Fail(code) => {
                tracing::debug!(r#""{}": FAIL ER{:02X}"#, command.trim_end(), code);
                return Ok(false);
            }
            _ => {}
        }
    }
}

fn report(name: &str, ok: bool) -> bool {
    if ok {
        tracing::info!("{}: succeed", name);
    } else {
        tracing::error!("{}: failed", name);
    }
    ok
}

/// モジュールをリセットして初期設定する
pub fn sk_init(line: &mut LineChannel) -> Result<bool> {
    let ok = execute(line, "SKRESET", "")?
        && execute(line, "SKSREG SFE 0", "")? // コマンドのエコーバックを無効にする
        && execute(line, "ROPT", "")?
        && execute(line, "WOPT 01", "")?;
    Ok(report("sk_init", ok))
}

/// ファームウェアバージョンを照会する
pub fn sk_ver(line: &mut LineChannel) -> Result<bool> {
    let ok = execute(line, "SKVER", "")?;
    Ok(report("sk_ver", ok))
}

/// ルートBパスワードを登録する
pub fn sk_set_password(line: &mut LineChannel, password: &Password) -> Result<bool> {
    let ok = execute(line, "SKSETPWD C ", &password.to_string())?;
    Ok(report("sk_set_password", ok))
}

/// ルートBIDを登録する
pub fn sk_set_id(line: &mut LineChannel, id: &Id) -> Result<bool> {
    let ok = execute(line, "SKSETRBID ", &id.to_string())?;
    Ok(report("sk_set_id", ok))
}

/// 自端末の論理チャンネル番号を設定する
pub fn sk_set_channel(line: &mut LineChannel, channel: u8) -> Result<bool> {
    let ok = execute(line, "SKSREG S2 ", &format!("{:02X}", channel))?;
    Ok(report("sk_set_channel", ok))
}

/// 自端末のPAN IDを設定する
pub fn sk_set_pan_id(line: &mut LineChannel, pan_id: u16) -> Result<bool> {
    let ok = execute(line, "SKSREG S3 ", &format!("{:04X}", pan_id))?;
    Ok(report("sk_set_pan_id", ok))
}

/// PANAセッションを終了する
pub fn sk_term(line: &mut LineChannel) -> Result<bool> {
    let ok = execute(line, "SKTERM", "")?;
    Ok(report("sk_term", ok))
}

/// 接続相手にEcho Requestを送る
pub fn sk_ping(line: &mut LineChannel, addr: &Ipv6Addr) -> Result<bool> {
    let ok = execute(line, "SKPING ", &address_literal(addr))?;
    Ok(report("sk_ping", ok))
}

#[test]
fn test_execute() {
    use crate::skstack::line::testing;

    // OK以外の行は読み捨てる
    let (mut line, w) = testing::scripted("EVER 1.2.8\r\nOK\r\n");
    assert_eq!(execute(&mut line, "SKVER", "").unwrap(), true);
    assert_eq!(w.taken(), "SKVER\r\n");

    let (mut line, _w) = testing::scripted("FAIL ER04\r\n");
    assert_eq!(execute(&mut line, "SKSREG S2 ", "21").unwrap(), false);

    // 決着の前に行が尽きたらタイムアウト
    let (mut line, _w) = testing::scripted("");
    assert!(matches!(
        execute(&mut line, "SKVER", ""),
        Err(crate::Error::Timeout)
    ));
}

#[test]
fn test_sk_init() {
    use crate::skstack::line::testing;

    let (mut line, w) = testing::scripted("OK\r\nOK\r\nOK\r\nOK\r\n");
    assert_eq!(sk_init(&mut line).unwrap(), true);
    assert_eq!(w.taken(), "SKRESET\r\nSKSREG SFE 0\r\nROPT\r\nWOPT 01\r\n");

    // 途中のFAILで打ち切る
    let (mut line, w) = testing::scripted("OK\r\nFAIL ER06\r\n");
    assert_eq!(sk_init(&mut line).unwrap(), false);
    assert_eq!(w.taken(), "SKRESET\r\nSKSREG SFE 0\r\n");
}

#[test]
fn test_formatting() {
    use crate::skstack::line::testing;
    use std::str::FromStr;

    let (mut line, w) = testing::scripted("OK\r\nOK\r\nOK\r\nOK\r\n");
    let id = Id::from_str("00112233445566778899AABBCCDDEEFF").unwrap();
    let password = Password::from_str("0123456789AB").unwrap();
    let addr: Ipv6Addr = "FE80:0000:0000:0000:021D:1290:1234:5678".parse().unwrap();
    assert!(sk_set_password(&mut line, &password).unwrap());
    assert!(sk_set_id(&mut line, &id).unwrap());
    assert!(sk_set_channel(&mut line, 0x21).unwrap());
    assert!(sk_set_pan_id(&mut line, 0x8888).unwrap());
    assert_eq!(
        w.taken(),
        "SKSETPWD C 0123456789AB\r\n\
         SKSETRBID 00112233445566778899AABBCCDDEEFF\r\n\
         SKSREG S2 21\r\n\
         SKSREG S3 8888\r\n"
    );
    assert_eq!(
        address_literal(&addr),
        "FE80:0000:0000:0000:021D:1290:1234:5678"
    );
}
