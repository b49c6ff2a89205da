mod app;
mod health;

use rfw_core::config::Config;

use crate::app::AppContext;

#[tokio::main]
async fn main() -> Result<(), rfw_core::Error> {
    rfw_core::logging::init("rfw")?;

    let cfg = Config::load()?;
    AppContext::build(cfg)
        .run()
        .await
        .map_err(|e| rfw_core::Error::External(format!("relay bot failed: {e}")))?;

    Ok(())
}
