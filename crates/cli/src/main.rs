// Copyright 2025 LLM EvalBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! LLM EvalBench CLI entry point.

#[tokio::main]
async fn main() {
    if let Err(e) = llm_evalbench_cli::run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
