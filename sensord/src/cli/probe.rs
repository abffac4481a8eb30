//! probe サブコマンド
//!
//! 1つのURLを1回だけ計測し、サンプルをJSONで表示します。

use crate::error::{SensordResult, SinkError};
use crate::probe::{HttpProbe, ProbeExecutor};
use crate::types::{Check, Sample};
use chrono::Utc;
use clap::Args;
use std::time::Duration;

/// probe サブコマンドの引数
#[derive(Args, Debug, Clone)]
pub struct ProbeArgs {
    /// URL to probe
    pub url: String,

    /// Location tag attached to the sample
    #[arg(long, default_value = "undefined", env = "SENSORD_LOCATION")]
    pub location: String,

    /// Probe timeout in seconds
    #[arg(long, default_value = "10", env = "SENSORD_PROBE_TIMEOUT_SECS")]
    pub timeout_secs: u64,
}

/// 1回計測してサンプルを返す
pub async fn measure(args: &ProbeArgs) -> SensordResult<Sample> {
    let probe = HttpProbe::new(Duration::from_secs(args.timeout_secs))?;
    let check = Check::new("probe", args.url.clone());
    let t = Utc::now();
    let measurement = probe.measure(&args.url).await?;
    Ok(Sample::new(&check, &args.location, t, measurement))
}

/// Execute the probe command
pub async fn execute(args: &ProbeArgs) -> SensordResult<()> {
    let sample = measure(args).await?;
    let json = serde_json::to_string_pretty(&sample).map_err(SinkError::from)?;
    println!("{json}");
    Ok(())
}
