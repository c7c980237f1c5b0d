mod cmd;

use clap::Parser;
use cmd::config::{Effective, RunArgs};

#[derive(Parser)]
#[command(name = "datacat", version, about = "Воспроизведение набора данных в sink с заданным темпом")]
struct Cli {
    #[command(flatten)]
    args: RunArgs,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // stdout принадлежит console sink'у: логи только в stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let eff = match Effective::new(&cli.args) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    match cmd::run::run(eff).await {
        Ok(summary) => std::process::exit(cmd::run::exit_code(&summary)),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
