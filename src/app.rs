//! Top-level application orchestration.
//!
//! `src/main.rs` only maps the result to an exit code; this module parses the
//! CLI, installs logging, runs the pipeline and prints the reports.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use crate::cli::{Cli, Command, FitArgs, FormatArgs};
use crate::config::FitPlan;
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `ezfit` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .init();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Format(args) => {
            handle_format(args);
            Ok(())
        }
        Command::Models => {
            handle_models();
            Ok(())
        }
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let plan = FitPlan::from_path(&args.plan)?;
    let output = pipeline::run_plan(&plan)?;

    for run in &output.runs {
        println!(
            "{}",
            crate::report::format_fit_summary(
                Some(&run.name),
                &run.param_names,
                &run.outcome,
                &run.gof,
                &run.derived,
                run.print_residuals,
            )
        );
    }

    if !output.table.is_empty() {
        let dir = args
            .out_dir
            .or_else(|| plan.out_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        let path = crate::io::write_latex_table(&dir, &output.table)?;
        info!(path = %path.display(), fits = output.table.entries().len(), "wrote parameter table");
    }

    if let Some(path) = &args.export {
        crate::io::write_results_json(path, &output.runs)?;
        info!(path = %path.display(), "wrote results");
    }

    Ok(())
}

fn handle_format(args: FormatArgs) {
    println!("{}", crate::report::format_value_error(args.value, args.error));
}

fn handle_models() {
    for name in crate::models::catalog_names() {
        if let Some(model) = crate::models::lookup(&name) {
            println!("{name}({})", model.param_names().join(", "));
        }
    }
}
