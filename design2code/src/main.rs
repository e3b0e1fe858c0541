use clap::Parser;
use design2code::cli::{self, Args};
use design2code::logging::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before clap reads env-backed flags
    dotenv::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    cli::run(args).await
}
