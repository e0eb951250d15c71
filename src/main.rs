use anyhow::Result;
use alist_drop::runner::{self, Source};

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info,rustls=warn,reqwest=warn");
    }
    pretty_env_logger::init_timed();

    // no argument: configuration from the environment (and `.env`)
    let source = match std::env::args().nth(1) {
        Some(path) => Source::File(path.into()),
        None => Source::Env,
    };

    runner::run(source).await?;

    Ok(())
}
