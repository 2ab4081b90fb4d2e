//! Entry point for the RePlots application.
//! Handles CLI parsing, logging setup, and dispatches the climatology and diagnostics commands.

use std::error::Error as _;
use std::process::ExitCode;

use chrono::Local;
use clap::Parser;

use replots::cli::{Args, ClimatologyArgs, Command, DiagnosticsArgs};
use replots::config::CaseConfig;
use replots::dataset::DatasetHandle;
use replots::errors::Result;
use replots::{climatology, diagnostics, file_selector, logging, report, tools};

fn main() -> ExitCode {
    let args = Args::parse();

    println!(
        r#"
------------------------------------------------------------------
             ____       ____  _       _
            |  _ \ ___ |  _ \| | ___ | |_ ___
            | |_) / _ \| |_) | |/ _ \| __/ __|
            |  _ <  __/|  __/| | (_) | |_\__ \
            |_| \_\___||_|   |_|\___/ \__|___/
               Ocean climatologies and diagnostics
------------------------------------------------------------------
                        "#
    );

    if let Err(e) = logging::init(args.verbose, args.log_path().as_deref()) {
        eprintln!("❌ Unable to initialise logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            eprintln!("❌ {e}");
            if args.backtrace {
                let mut source = e.source();
                while let Some(cause) = source {
                    eprintln!("   caused by: {cause}");
                    source = cause.source();
                }
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let config = CaseConfig::load(&args.config)?;
    println!("Loaded case '{}' from {}", config.case, args.config.display());

    match &args.command {
        Command::Climatology(cmd) => climatology_command(args, cmd, &config),
        Command::Diagnostics(cmd) => diagnostics_command(args, cmd, &config),
    }
}

fn climatology_command(args: &Args, cmd: &ClimatologyArgs, config: &CaseConfig) -> Result<()> {
    let which = if cmd.control_run { "control" } else { "model" };
    println!("Computing {which} climatologies: {}", config.avg_types.join(", "));

    let written = climatology::run_case(config, cmd.control_run, args.client, args.threads)?;
    for path in &written {
        println!("✅ Saved climatology to {}", path.display());
    }
    Ok(())
}

fn diagnostics_command(args: &Args, cmd: &DiagnosticsArgs, config: &CaseConfig) -> Result<()> {
    if cmd.skip_tool_check {
        println!("Skipping NCL/NCO check");
    } else {
        tools::check_ncl_nco()?;
    }

    let requested: Vec<&str> = if cmd.only.is_empty() {
        config.requested_diagnostics()
    } else {
        cmd.only.iter().map(String::as_str).collect()
    };
    let workdir = config.workdir()?;

    let selection = config.history_selection(false)?;
    let files = file_selector::select(
        &selection.roots,
        &selection.case,
        &config.comp,
        &config.suffix,
        &selection.subdir,
        &selection.start_date,
        &selection.end_date,
        &config.date_pattern,
    )?;
    match file_selector::history_span(&files) {
        Ok(span) => println!(
            "Using {} history files, {:04}-{:02} to {:04}-{:02}",
            files.len(),
            span.start_year,
            span.start_month,
            span.stop_year,
            span.stop_month
        ),
        Err(e) => tracing::warn!(error = %e, "could not determine history span"),
    }

    let mut dataset = DatasetHandle::new().with_time_dim(config.time_dim.clone());
    dataset.open(&files)?;
    dataset.start_client_with(args.client, args.threads)?;
    if let Some(client) = dataset.client() {
        client.info().print_info();
    }

    let outcome = diagnostics::run_diagnostics(config, &dataset, &requested);
    dataset.stop_client();
    let outputs = outcome?;

    for output in &outputs {
        println!(
            "✅ {}: {} plots in {}",
            output.diagnostic,
            output.plots.len(),
            output.plot_dir.display()
        );
    }

    let now = Local::now();
    let context = report::ReportContext::from_config(config, now);
    let index = report::write_index(&context, &outputs, workdir)?;
    println!("✅ Saved index to {}", index.display());

    if let Some(marker) = report::record_webdir(config, workdir, now) {
        println!("Web directory recorded in {}", marker.display());
    }
    Ok(())
}
