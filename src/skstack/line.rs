// シリアル通信 行単位の送受信
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::error::{Error, Result};
use std::io::{self, BufRead, BufReader};
use std::thread;
use std::time::{Duration, Instant};

/// 1行あたりの応答待ち時間
pub const READ_DEADLINE: Duration = Duration::from_secs(60);

/// 書き込み後のセトリング時間。モジュール側の処理時間なので省略できない。
pub const SETTLE: Duration = Duration::from_millis(500);

/// シリアルポート上の行単位チャネル
///
/// 読み込み側はポート自体の短いタイムアウトを繰り返して期限まで1行を
/// 組み立てる。期限内に行が完結しなければ`Error::Timeout`。
pub struct LineChannel {
    reader: BufReader<Box<dyn io::Read + Send>>,
    writer: Box<dyn io::Write + Send>,
    settle: Duration,
    pending: Vec<u8>,
}

impl LineChannel {
    pub fn new(reader: Box<dyn io::Read + Send>, writer: Box<dyn io::Write + Send>) -> Self {
        Self::with_settle(reader, writer, SETTLE)
    }

    pub fn with_settle(
        reader: Box<dyn io::Read + Send>,
        writer: Box<dyn io::Write + Send>,
        settle: Duration,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            settle,
            pending: Vec::new(),
        }
    }

    /// 期限内に1行(CRLFまで)を読む
    pub fn read_line(&mut self, deadline: Duration) -> Result<String> {
        let started = Instant::now();
        loop {
            match self.reader.read_until(b'\n', &mut self.pending) {
                // 読み込み口が閉じられた
                Ok(0) => return Err(Error::Timeout),
                Ok(_) if self.pending.last() == Some(&b'\n') => {
                    let line = String::from_utf8_lossy(&self.pending)
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    self.pending.clear();
                    tracing::trace!(target:"<-Rx","{}", line.escape_debug());
                    return Ok(line);
                }
                // 行の途中でタイムアウトした。つづきを待つ。
                Ok(_) => {}
                Err(e)
                    if e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(Error::Io(e)),
            }
            if started.elapsed() >= deadline {
                return Err(Error::Timeout);
            }
        }
    }

    /// ポートに書き込む
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let s = data
            .iter()
            .map(|n| *n as char)
            .filter(|n| n.is_ascii())
            .collect::<String>();
        tracing::trace!(target:"Tx->","{}", s.escape_debug());
        self.writer.write_all(data)?;
        self.writer.flush()?;
        thread::sleep(self.settle);
        Ok(())
    }

    /// CRLF終端で1行書き込む
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        self.write(format!("{}\r\n", line).as_bytes())
    }

    /// 受信バッファを読み捨ててから空行を送り、モジュールと同期を取り直す
    pub fn purge(&mut self) -> Result<()> {
        loop {
            let n = match self.reader.fill_buf() {
                Ok(buf) => buf.len(),
                Err(e)
                    if e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::WouldBlock =>
                {
                    break;
                }
                Err(e) => return Err(Error::Io(e)),
            };
            if n == 0 {
                break;
            }
            self.reader.consume(n);
        }
        self.pending.clear();
        self.write(b"\r\n")
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::LineChannel;
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// テスト用の書き込み先
    #[derive(Clone, Default)]
    pub struct SharedWriter(pub Arc<Mutex<Vec<u8>>>);

    impl Write for SharedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedWriter {
        pub fn taken(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
        }

        pub fn taken_bytes(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }
    }

    /// 受信スクリプトを流し込む行チャネルを作る
    pub fn scripted(script: &str) -> (LineChannel, SharedWriter) {
        let writer = SharedWriter::default();
        let channel = LineChannel::with_settle(
            Box::new(io::Cursor::new(script.as_bytes().to_vec())),
            Box::new(writer.clone()),
            Duration::ZERO,
        );
        (channel, writer)
    }
}

#[test]
fn test_read_line() {
    let (mut channel, _w) = testing::scripted("OK\r\nEVENT 25 FE80::1\r\n");
    assert_eq!(channel.read_line(READ_DEADLINE).unwrap(), "OK");
    assert_eq!(
        channel.read_line(READ_DEADLINE).unwrap(),
        "EVENT 25 FE80::1"
    );
    assert!(matches!(
        channel.read_line(READ_DEADLINE),
        Err(crate::Error::Timeout)
    ));
}

#[test]
fn test_write_line() {
    let (mut channel, w) = testing::scripted("");
    channel.write_line("SKVER").unwrap();
    assert_eq!(w.taken(), "SKVER\r\n");
}

#[test]
fn test_purge() {
    let (mut channel, w) = testing::scripted("garbage with no line break");
    channel.purge().unwrap();
    assert_eq!(w.taken(), "\r\n");
    // 読み捨て後は何も残っていない
    assert!(matches!(
        channel.read_line(READ_DEADLINE),
        Err(crate::Error::Timeout)
    ));
}
