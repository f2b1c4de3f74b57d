use signal_store::app::run;
use signal_store::config::Config;
use signal_store::error::Result;
use signal_store::logging::init;

#[tokio::main]
async fn main() -> Result<()> {
    init();

    let config = Config::from_env()?;

    run(config).await
}
