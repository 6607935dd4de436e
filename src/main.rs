// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use clap::Parser;

use tailbone::cli::{Cli, CliHandler};
use tailbone::logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.global.log_format);

    let handler = CliHandler::new(cli.global);
    if let Err(e) = handler.execute(cli.command).await {
        tracing::debug!(error = ?e, "Command failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
