use clap::Parser;
use detent::cli::{self, Args};
use detent::core::AppError;
use detent::logging;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let guard = match logging::init(&args) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("detent: logging disabled: {:#}", err);
            None
        }
    };

    let code = match cli::run(args).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    // process::exit skips destructors; flush the file sink first.
    drop(guard);
    std::process::exit(code);
}

fn report_error(err: &anyhow::Error) {
    tracing::error!(error = %err, "command failed");
    match err.downcast_ref::<AppError>() {
        Some(app) => {
            eprintln!("error: {}", app);
            for suggestion in &app.recovery_suggestions {
                eprintln!("  hint: {}", suggestion);
            }
        }
        None => eprintln!("error: {:#}", err),
    }
}
