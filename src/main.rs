//! OpenAPI Toolkit CLI
//!
//! Lists and invokes the operations of configured OpenAPI documents.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{error, info};

use openapi_toolkit::{
    cli::{Cli, Command},
    config::Config,
    engine::{CallOptions, HumanDecision},
    registry::{OperationRegistry, SchemaSource},
    setup_tracing,
    toolkit::Toolkit,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    // Works on a single file, no config needed
    if let Command::Inspect { document } = cli.command {
        return run_inspect(document).await;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };
    if config.clients.is_empty() {
        eprintln!("❌ No clients configured; pass --config with a `clients` list");
        return ExitCode::FAILURE;
    }
    let toolkit = match Toolkit::from_config(&config).await {
        Ok(toolkit) => toolkit,
        Err(e) => {
            error!(error = %e, "Failed to build toolkit");
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };
    run_command(&toolkit, cli.command).await
}

async fn run_command(toolkit: &Toolkit, command: Command) -> ExitCode {
    match command {
        Command::Tools { names_only } => {
            let tools = toolkit.tools().await;
            if names_only {
                for tool in &tools {
                    println!("{}", tool.name);
                }
                ExitCode::SUCCESS
            } else {
                print_json(&tools)
            }
        }
        Command::Operations => print_json(&toolkit.list_operations()),
        Command::Call {
            operation,
            args,
            tool_call_id,
            approve,
        } => run_call(toolkit, &operation, &args, tool_call_id, approve).await,
        Command::Inspect { document } => run_inspect(document).await,
    }
}

async fn run_call(
    toolkit: &Toolkit,
    operation: &str,
    args: &str,
    tool_call_id: String,
    approve: bool,
) -> ExitCode {
    let args: Value = match serde_json::from_str(args) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("❌ --args is not valid JSON: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut outcome = toolkit
        .call_operation(operation, args, CallOptions::new(tool_call_id.clone()))
        .await;

    if approve && outcome.as_ref().is_ok_and(|o| o.is_paused()) {
        info!(tool_call_id = %tool_call_id, "Approving paused call");
        outcome = toolkit
            .resume(&tool_call_id, HumanDecision::approve(), CallOptions::default())
            .await;
    }

    match outcome {
        Ok(outcome) => {
            let printed = print_json(&outcome.to_json());
            if outcome.response().is_some_and(|r| !r.is_success()) {
                ExitCode::FAILURE
            } else {
                printed
            }
        }
        Err(e) => {
            print_json(&e.to_tool_error());
            ExitCode::FAILURE
        }
    }
}

async fn run_inspect(document: PathBuf) -> ExitCode {
    let source = SchemaSource::File(document);
    let registry = match source
        .load(&reqwest::Client::new())
        .await
        .and_then(|doc| OperationRegistry::from_document(&doc))
    {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    let tools: Vec<Value> = registry
        .operations()
        .map(|op| {
            json!({
                "name": op.tool_name,
                "operationId": op.id,
                "method": op.method.as_str(),
                "path": op.path,
                "description": op.tool_description(),
                "inputSchema": op.input_schema,
            })
        })
        .collect();
    info!(title = ?registry.title(), tools = tools.len(), "Inspected document");
    print_json(&tools)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Failed to serialize to JSON: {e}");
            ExitCode::FAILURE
        }
    }
}
