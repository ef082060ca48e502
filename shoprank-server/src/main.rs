// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::Result;
use clap::Parser;
use shoprank_server::{config::ShopRankConfig, run};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Real-time product ranking pipeline", long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// NDJSON file of ranking events (reads stdin when omitted)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Number of leaderboard entries to print
    #[arg(long, default_value_t = 10)]
    top: usize,

    /// Flush interval in milliseconds (overrides config file)
    #[arg(long, env = "SHOPRANK_FLUSH_INTERVAL_MS")]
    flush_interval_ms: Option<u64>,

    /// Emit JSON log lines
    #[arg(long, env = "SHOPRANK_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = ShopRankConfig::load(args.config)?;

    // Apply CLI overrides
    if let Some(interval) = args.flush_interval_ms {
        config.aggregation.flush_interval_ms = interval;
    }
    if args.log_json {
        config.logging.json = true;
    }

    let summary = run(config, args.input, args.top).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
