// スマートメーターを定期的に読み出すデーモン。
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use clap::Parser;
use routebpower::skstack::LineChannel;
use routebpower::{RouteBSettings, SmartMeter};
use serialport::{DataBits, StopBits};
use std::fs;
use std::io;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{Event, Subscriber};
use tracing_subscriber::{
    fmt::{self, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

// 積算電力量を読み直す周期(サイクル数)
const TOTAL_EVERY: u32 = 30;
// 生存確認の周期(サイクル数)
const PING_EVERY: u32 = 10;

#[derive(Debug, Error)]
enum WatchdError {
    #[error(r#"i/o "{0}""#)]
    Io(#[from] io::Error),

    #[error(r#"serial port "{0}""#)]
    SerialPort(#[from] serialport::Error),

    #[error(r#"settings "{0}""#)]
    Settings(#[from] toml::de::Error),

    #[error(r#"driver "{0}""#)]
    Driver(#[from] routebpower::Error),
}

/// スマートメーターBルートから定期的に計測値を取得する。
#[derive(Parser, Debug)]
#[command(name = "watchd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// 設定ファイル名
    #[arg(short = 'S', long, env = "ROUTEB_CONFIG", default_value = "routebpower.toml")]
    config_file: String,

    /// シリアルデバイス名
    #[arg(short = 'D', long, env = "SERIAL_DEVICE", default_value = "/dev/ttyUSB0")]
    device: String,

    /// 計測間隔(秒)
    #[arg(short = 'I', long, env = "POLL_INTERVAL", default_value_t = 60)]
    interval: u64,
}

/// 接続して計測を続ける
fn serve(cli: &Cli) -> Result<(), WatchdError> {
    // 設定ファイルからスマートメーターの情報を得る
    let file = fs::read_to_string(&cli.config_file)?;
    let settings = toml::from_str::<RouteBSettings>(&file)?;
    let credentials = settings.credentials()?;

    // シリアルポートを開く
    let serial_port = serialport::new(&cli.device, 115200)
        .stop_bits(StopBits::One)
        .data_bits(DataBits::Eight)
        .timeout(Duration::from_secs(1))
        .open()?;

    // シリアルポート読み込みはバッファリングする
    let reader = serial_port.try_clone()?;
    let line = LineChannel::new(
        Box::new(reader) as Box<dyn io::Read + Send>,
        Box::new(serial_port) as Box<dyn io::Write + Send>,
    );

    let mut meter = SmartMeter::new(line, credentials, settings.CollectDay)
        .with_progress(|percent| tracing::debug!("接続中... {}%", percent));

    let (channel, pan_id, mac_address, lqi) = meter.open()?;
    tracing::info!(
        "connected: Channel={:02X} Pan ID={:04X} Addr={:016X} LQI={:02X}",
        channel,
        pan_id,
        mac_address,
        lqi
    );

    let interval = Duration::from_secs(cli.interval);
    let mut cycle: u32 = 0;
    loop {
        thread::sleep(interval);

        // ときどき生存確認する
        if cycle % PING_EVERY == PING_EVERY - 1 && !meter.ping()? {
            tracing::warn!("ping: no answer");
        }

        // 瞬時電力と瞬時電流
        // 個々の読み出し失敗は次の周期でやり直す
        match meter.instantaneous_power() {
            Ok((at, watt)) => tracing::info!("瞬時電力 {} {} W", at, watt),
            Err(e) if e.is_recoverable() => tracing::warn!("瞬時電力: {}", e),
            Err(e) => return Err(WatchdError::Driver(e)),
        }
        match meter.instantaneous_amperage() {
            Ok((at, ampere)) => tracing::info!("瞬時電流 {} {} A", at, ampere),
            Err(e) if e.is_recoverable() => tracing::warn!("瞬時電流: {}", e),
            Err(e) => return Err(WatchdError::Driver(e)),
        }

        // ときどき積算電力量も読み直す
        if cycle % TOTAL_EVERY == TOTAL_EVERY - 1 {
            match meter.total_power() {
                Ok((at, kwh)) => tracing::info!("積算電力量 {} {} kWh", at, kwh),
                Err(e) if e.is_recoverable() => tracing::warn!("積算電力量: {}", e),
                Err(e) => return Err(WatchdError::Driver(e)),
            }
        }

        cycle = cycle.wrapping_add(1);
    }
}

/// SKSETPWD C 以降のパスワードをマスクするフォーマッタ
struct MaskingRouteBPasswordFormatter;

impl<S, N> FormatEvent<S, N> for MaskingRouteBPasswordFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: fmt::format::Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        // まず標準フォーマットをバッファに書き出す
        let mut buf = String::new();
        {
            let temp_writer = fmt::format::Writer::new(&mut buf);
            fmt::format::Format::default().format_event(ctx, temp_writer, event)?;
        }

        // マスク処理
        const PATTERN: &'static str = "SKSETPWD C ";
        if let Some(pos) = buf.find(PATTERN) {
            let start = pos + PATTERN.len();
            let end = (start + 12).min(buf.len() - 1);
            let masking_str = "#".repeat(end - start);
            buf.replace_range(start..end, &masking_str)
        }
        // 出力
        writer.write_str(&buf)
    }
}

fn main() -> ExitCode {
    let _ = dotenv::dotenv();

    // tracingの設定
    let registry = tracing_subscriber::registry();

    // systemd-journaldに接続
    match tracing_journald::layer() {
        // journaldにログ出力する
        Ok(journald_layer) => registry.with(journald_layer).init(),
        // journaldが使えないので、標準出力にログ出力する
        Err(e) => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_timer(tracing_subscriber::fmt::time::LocalTime::rfc_3339())
                        .with_file(false)
                        .with_line_number(false)
                        .with_thread_names(false)
                        .with_thread_ids(false)
                        .with_ansi(false)
                        .event_format(MaskingRouteBPasswordFormatter),
                )
                .init();
            tracing::error!("couldn't connect to journald: {}", e)
        }
    }

    let cli = Cli::parse();

    // サービスを開始する
    tracing::info!("watchd started.");
    let reason = loop {
        break match serve(&cli) {
            Ok(()) => {
                // 再始動まで少々クールダウン時間をもつ
                thread::sleep(Duration::from_secs(5));
                continue; // 再始動
            }
            Err(WatchdError::Driver(e)) if e.is_recoverable() => {
                tracing::error!("{}", e);
                // 再始動まで少々クールダウン時間をもつ
                thread::sleep(Duration::from_secs(5));
                continue; // 再始動
            }
            Err(e @ WatchdError::Driver(_)) => e.to_string(),
            Err(e @ WatchdError::Io(_)) => e.to_string(),
            Err(e @ WatchdError::SerialPort(_)) => e.to_string(),
            Err(e @ WatchdError::Settings(_)) => e.to_string(),
        };
    };

    // ここに到達するのは異常終了しかありえない
    tracing::error!("watchd aborted, reason: {}", reason);
    ExitCode::FAILURE
}
