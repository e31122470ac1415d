mod app;
mod camera;
mod scene;

use anyhow::Result;
use stagecraft_engine::device::GpuInit;
use stagecraft_engine::logging::{LoggingConfig, init_logging};
use stagecraft_engine::window::{Runtime, RuntimeConfig};

use app::DemoApp;
use scene::Demo;

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let demo = match std::env::var("STAGECRAFT_DEMO") {
        Ok(name) => Demo::from_name(&name)?,
        Err(_) => Demo::Texturing,
    };
    let texture = std::env::var_os("STAGECRAFT_TEXTURE").map(Into::into);
    log::info!("running the {} demo", demo.name());

    let config = RuntimeConfig {
        title: format!("stagecraft: {}", demo.name()),
        ..RuntimeConfig::default()
    };
    Runtime::run(config, GpuInit::default(), DemoApp::new(demo, texture))
}
