//! logfmt出力
//!
//! サンプル1件を1行のlogfmtとして書き出す。

use super::{Delivery, Sink};
use crate::error::SinkError;
use crate::types::Sample;
use async_trait::async_trait;
use chrono::SecondsFormat;
use std::borrow::Cow;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// logfmt出力先
pub struct LogfmtSink {
    name: String,
    out: Arc<Mutex<dyn Write + Send>>,
}

impl LogfmtSink {
    /// 標準出力に書き出す
    pub fn stdout() -> Self {
        Self::new("logfmt", Arc::new(Mutex::new(std::io::stdout())))
    }

    /// 任意の書き込み先を指定
    pub fn new(name: impl Into<String>, out: Arc<Mutex<dyn Write + Send>>) -> Self {
        Self {
            name: name.into(),
            out,
        }
    }
}

/// logfmt行に整形
pub fn format_line(sample: &Sample) -> String {
    let m = &sample.measurement;
    format!(
        "sample=true check_id={} location={} t={} exit_status={} http_status={} tt={:.6} ttnl={:.6} ttc={:.6} ttfb={:.6} ip={} size={}",
        value(&sample.check_id),
        value(&sample.location),
        sample.t.to_rfc3339_opts(SecondsFormat::Secs, true),
        m.exit_status,
        m.http_status,
        m.total_time,
        m.namelookup_time,
        m.connect_time,
        m.starttransfer_time,
        value(m.ip.as_deref().unwrap_or("")),
        m.size_download,
    )
}

/// 空白・`=`・`"`・制御文字を含む値は引用符で囲んでエスケープする
fn value(raw: &str) -> Cow<'_, str> {
    if raw
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || c == '=' || c == '"')
    {
        Cow::Owned(format!("{raw:?}"))
    } else {
        Cow::Borrowed(raw)
    }
}

#[async_trait]
impl Sink for LogfmtSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, delivery: &Delivery) -> Result<(), SinkError> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| std::io::Error::other("logfmt writer poisoned"))?;
        for sample in delivery.samples() {
            writeln!(out, "{}", format_line(sample))?;
        }
        out.flush()?;
        Ok(())
    }
}
