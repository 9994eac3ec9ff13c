//! vswitch binary: `vswitch [VIDEO_FILE] [SWITCH_PERIOD]`.

use std::process::ExitCode;
use vswitch::config::{self, Invocation};
use vswitch::observability::{TracingConfig, init_tracing};

fn main() -> ExitCode {
    // Installed first so argument warnings reach the log
    init_tracing(&TracingConfig::default());

    let config = match config::from_args(std::env::args_os()) {
        Ok(Invocation::Help(text)) => {
            eprintln!("{text}");
            return ExitCode::SUCCESS;
        }
        Ok(Invocation::Run(config)) => config,
        Err(e) => e.exit(),
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "could not start the runtime");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    match runtime.block_on(vswitch::app::run(&config, shutdown)) {
        Ok(reason) => {
            tracing::info!(reason = %reason, "Deleting pipeline");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "could not build the pipeline");
            ExitCode::FAILURE
        }
    }
}
