// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(coverage_nightly, feature(coverage_attribute), coverage(off))]

use clap::Parser;

mod commands;

use commands::Cmd;

#[derive(Parser)]
#[command(name = "covenant", version, about = "Per-user signed append-only ledgers with cross-chain transactions")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    Cli::parse().cmd.exec()
}
