use anyhow::Result;
use std::process;
use log::{error, warn};
use tokio_util::sync::CancellationToken;
use gevol::{app, cli, logging};

fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        error!("Application panicked: {panic_info}");
        eprintln!("Panic: {panic_info}");
        process::exit(101);
    }));

    if let Err(e) = run() {
        error!("Application error: {e:#}");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = cli::args::parse_args();
    cli::args::validate_args(&args)?;

    let config_manager = app::load_configuration(&args)?;
    let log_config = app::configure_logging(&args, &config_manager)?;

    // Single runtime for the whole process; partition clones and file
    // reads run on its blocking pool
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match &args.command {
        cli::Command::Worker => runtime.block_on(async {
            let request = app::read_worker_request().await?;
            logging::init_worker_logger(log_config, request.partition)?;
            app::run_worker(request).await
        }),
        cli::Command::Analyse(analyse) => {
            logging::init_logger(log_config)?;
            runtime.block_on(async {
                let cancel = CancellationToken::new();
                let on_interrupt = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("Interrupted; stopping after the current commit");
                        on_interrupt.cancel();
                    }
                });
                app::run_analysis(analyse, &config_manager, cancel).await
            })
        }
    }
}
