// スマートメーターに接続して計測値を読み出す。
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use anyhow::Context;
use clap::Parser;
use routebpower::skstack::LineChannel;
use routebpower::{RouteBSettings, SmartMeter};
use serialport::{DataBits, SerialPort, StopBits};
use std::fs;
use std::io;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// スマートメーターBルートから計測値を取得する。
#[derive(Parser, Debug)]
#[command(name = "readout")]
#[command(version, about, long_about = None)]
struct Cli {
    /// 設定ファイル名
    #[arg(short = 'S', long, env = "ROUTEB_CONFIG", default_value = "routebpower.toml")]
    config_file: String,

    /// シリアルデバイス名
    #[arg(short = 'D', long, env = "SERIAL_DEVICE", default_value = "/dev/ttyUSB0")]
    device: String,
}

/// シリアルポートを開く
fn open_port(port_name: &str) -> anyhow::Result<Box<dyn SerialPort>> {
    let builder = serialport::new(port_name, 115200)
        .stop_bits(StopBits::One)
        .data_bits(DataBits::Eight)
        .timeout(Duration::from_secs(1));

    builder
        .open()
        .with_context(move || format!("Failed to open \"{}\".", port_name))
}

fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    // デバッグレベルは RUST_LOG 環境変数で設定できる
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new("info")))
        .init();

    // コマンドライン引数
    let cli = Cli::parse();

    // 設定ファイルからスマートメーターの情報を得る
    let file = fs::read_to_string(&cli.config_file).context("setting file read error.")?;
    let settings = toml::from_str::<RouteBSettings>(&file)?;
    let credentials = settings.credentials()?;

    // シリアルポートを開く
    let port = open_port(&cli.device)?;

    // シリアルポート読み込みはバッファリングする
    let reader = port.try_clone().context("Failed to clone")?;
    let line = LineChannel::new(
        Box::new(reader) as Box<dyn io::Read + Send>,
        Box::new(port) as Box<dyn io::Write + Send>,
    );

    let mut meter = SmartMeter::new(line, credentials, settings.CollectDay)
        .with_progress(|percent| tracing::info!("接続中... {}%", percent));

    // スマートメーターに接続する
    let (channel, pan_id, mac_address, lqi) = meter.open()?;
    tracing::info!(
        "connected: Channel={:02X} Pan ID={:04X} Addr={:016X} LQI={:02X}",
        channel,
        pan_id,
        mac_address,
        lqi
    );
    if !meter.version_check()? {
        tracing::warn!("SKVERに応答がない");
    }

    // 瞬時電力計測値(E7)
    let (at, watt) = meter.instantaneous_power()?;
    println!("瞬時電力 {} {} W", at.format("%Y-%m-%d %H:%M:%S"), watt);

    // 瞬時電流計測値(E8)
    let (at, ampere) = meter.instantaneous_amperage()?;
    println!(
        "瞬時電流 {} {} A (契約 {} A)",
        at.format("%Y-%m-%d %H:%M:%S"),
        ampere,
        settings.ContractAmperage
    );

    // 定時積算電力量計測値(EA)
    let (at, kwh) = meter.total_power()?;
    println!("積算電力量 {} {} kWh", at.format("%Y-%m-%d %H:%M:%S"), kwh);

    // 前回検針日を起点とした使用電力量
    let (since, kwh) = meter.monthly_power()?;
    println!(
        "今月の使用電力量 {}〜 {} kWh",
        since.format("%Y-%m-%d"),
        kwh
    );

    meter.close();
    Ok(println!("Good Bye!"))
}
