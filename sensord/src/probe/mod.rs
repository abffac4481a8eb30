//! プローブ実行
//!
//! 1回の呼び出しで対象URLに対して1回だけHTTPトランザクションを実行し、
//! タイミングとステータスを返す。
//!
//! 名前解決・TCP接続・レスポンスヘッダ受信・ボディ受信完了の各時点を
//! プローブ開始からの累積秒数で記録する。GETは計測したその接続の上で送り、
//! 接続は再利用しない。リモート側の失敗は
//! curl互換の終了ステータスとして `Measurement` に格納し、エラーにはしない。

use crate::error::ProbeError;
use crate::types::Measurement;
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::header::{HOST, USER_AGENT};
use hyper::Request;
use hyper_util::rt::TokioIo;
use reqwest::Url;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{lookup_host, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_native_tls::{native_tls, TlsConnector};
use tracing::debug;

/// URLが不正
pub const EXIT_MALFORMED_URL: i32 = 3;
/// 名前解決に失敗
pub const EXIT_COULDNT_RESOLVE_HOST: i32 = 6;
/// 接続に失敗
pub const EXIT_COULDNT_CONNECT: i32 = 7;
/// タイムアウト
pub const EXIT_OPERATION_TIMEDOUT: i32 = 28;
/// TLSハンドシェイクに失敗
pub const EXIT_SSL_CONNECT_ERROR: i32 = 35;
/// 受信に失敗
pub const EXIT_RECV_ERROR: i32 = 56;

/// デフォルトのプローブタイムアウト（秒）
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;

const USER_AGENT_VALUE: &str = concat!("sensord/", env!("CARGO_PKG_VERSION"));

/// プローブ実行の抽象
///
/// `Err` はローカル環境の回復不能な失敗のみを表す。
#[async_trait]
pub trait ProbeExecutor: Send + Sync + 'static {
    /// URLを1回計測する
    async fn measure(&self, url: &str) -> Result<Measurement, ProbeError>;
}

/// tokio/hyperによるHTTPプローブ
///
/// 接続プールを持たず、プローブごとに接続を張って閉じる。
#[derive(Clone)]
pub struct HttpProbe {
    /// httpsで使うTLSコネクタ
    tls: TlsConnector,
    /// プローブ全体のタイムアウト
    timeout: Duration,
}

impl HttpProbe {
    /// 新しいプローブを作成
    pub fn new(probe_timeout: Duration) -> Result<Self, ProbeError> {
        let tls = native_tls::TlsConnector::new().map_err(|e| ProbeError::Tls(e.to_string()))?;

        Ok(Self {
            tls: TlsConnector::from(tls),
            timeout: probe_timeout,
        })
    }

    /// デフォルトタイムアウトでプローブを作成
    pub fn with_default_timeout() -> Result<Self, ProbeError> {
        Self::new(Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS))
    }

    async fn resolve(&self, host: &str, port: u16, deadline: Instant) -> Result<SocketAddr, i32> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, port));
        }

        match timeout(remaining(deadline), lookup_host((host, port))).await {
            Err(_) => Err(EXIT_OPERATION_TIMEDOUT),
            Ok(Err(e)) => {
                debug!(host = %host, error = %e, "Name lookup failed");
                Err(EXIT_COULDNT_RESOLVE_HOST)
            }
            Ok(Ok(mut addrs)) => addrs.next().ok_or(EXIT_COULDNT_RESOLVE_HOST),
        }
    }
}

#[async_trait]
impl ProbeExecutor for HttpProbe {
    async fn measure(&self, url: &str) -> Result<Measurement, ProbeError> {
        let start = Instant::now();
        let deadline = start + self.timeout;

        let Some(target) = Target::parse(url) else {
            return Ok(Measurement::failed(EXIT_MALFORMED_URL));
        };
        let Ok(request) = target.request() else {
            return Ok(Measurement::failed(EXIT_MALFORMED_URL));
        };

        let addr = match self.resolve(&target.host, target.port, deadline).await {
            Ok(addr) => addr,
            Err(code) => return Ok(Measurement::failed(code)),
        };
        let mut m = Measurement {
            namelookup_time: elapsed_secs(start),
            ip: Some(addr.ip().to_string()),
            ..Default::default()
        };

        let stream = match timeout(remaining(deadline), TcpStream::connect(addr)).await {
            Err(_) => {
                m.exit_status = EXIT_OPERATION_TIMEDOUT;
                return Ok(finish(m, start));
            }
            Ok(Err(e)) => {
                debug!(%addr, error = %e, "TCP connect failed");
                m.exit_status = EXIT_COULDNT_CONNECT;
                return Ok(finish(m, start));
            }
            Ok(Ok(stream)) => stream,
        };
        m.connect_time = elapsed_secs(start);

        let transaction = async {
            if target.tls {
                match self.tls.connect(&target.host, stream).await {
                    Ok(stream) => exchange(stream, request, &mut m, start).await,
                    Err(e) => {
                        debug!(host = %target.host, error = %e, "TLS handshake failed");
                        m.exit_status = EXIT_SSL_CONNECT_ERROR;
                    }
                }
            } else {
                exchange(stream, request, &mut m, start).await;
            }
        };
        if timeout(remaining(deadline), transaction).await.is_err() {
            m.exit_status = EXIT_OPERATION_TIMEDOUT;
        }

        Ok(finish(m, start))
    }
}

/// 計測対象
struct Target {
    /// 角括弧を除いたホスト
    host: String,
    port: u16,
    tls: bool,
    /// Hostヘッダの値
    authority: String,
    /// パスとクエリ
    path: String,
}

impl Target {
    fn parse(raw: &str) -> Option<Self> {
        let url = Url::parse(raw).ok()?;
        let tls = match url.scheme() {
            "http" => false,
            "https" => true,
            _ => return None,
        };
        let host_str = url.host_str()?;
        let port = url.port_or_known_default()?;

        let authority = match url.port() {
            Some(port) => format!("{host_str}:{port}"),
            None => host_str.to_string(),
        };
        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        Some(Self {
            host: host_str.trim_start_matches('[').trim_end_matches(']').to_string(),
            port,
            tls,
            authority,
            path,
        })
    }

    fn request(&self) -> Result<Request<Empty<Bytes>>, hyper::http::Error> {
        Request::get(self.path.as_str())
            .header(HOST, self.authority.as_str())
            .header(USER_AGENT, USER_AGENT_VALUE)
            .body(Empty::new())
    }
}

/// 接続の駆動タスク。計測が終わるか打ち切られたら止める
struct ConnectionTask(JoinHandle<()>);

impl Drop for ConnectionTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// 接続済みストリーム上でGETを1回送り、ボディを読み切る
async fn exchange<S>(
    stream: S,
    request: Request<Empty<Bytes>>,
    m: &mut Measurement,
    start: Instant,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = match hyper::client::conn::http1::handshake(TokioIo::new(stream)).await
    {
        Ok(parts) => parts,
        Err(e) => {
            debug!(error = %e, "HTTP handshake failed");
            m.exit_status = EXIT_RECV_ERROR;
            return;
        }
    };
    let _conn = ConnectionTask(tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "Probe connection ended with error");
        }
    }));

    let response = match sender.send_request(request).await {
        Ok(response) => response,
        Err(e) => {
            debug!(error = %e, "Request failed");
            m.exit_status = EXIT_RECV_ERROR;
            return;
        }
    };
    m.starttransfer_time = elapsed_secs(start);
    m.http_status = response.status().as_u16();

    let mut body = response.into_body();
    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                if let Some(data) = frame.data_ref() {
                    m.size_download += data.len() as u64;
                }
            }
            Err(e) => {
                debug!(error = %e, "Body read failed");
                m.exit_status = EXIT_RECV_ERROR;
                break;
            }
        }
    }
}

fn finish(mut m: Measurement, start: Instant) -> Measurement {
    m.total_time = elapsed_secs(start);
    m
}

fn elapsed_secs(start: Instant) -> f64 {
    start.elapsed().as_secs_f64()
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}
