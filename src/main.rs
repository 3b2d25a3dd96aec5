use clap::Parser;
use reflector::cli::{command_line, run, Cli};
use reflector::shutdown::Shutdown;
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let args = command_line(std::env::args_os().skip(1));

    let shutdown = Arc::new(Shutdown::new());
    let interrupt = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && interrupt.begin() {
            eprintln!("interrupted");
            std::process::exit(130);
        }
    });

    match run(cli, args, &shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
