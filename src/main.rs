use std::env;
use std::error::Error;

use tracing_subscriber::{EnvFilter, filter::LevelFilter, prelude::*};

fn main() -> Result<(), Box<dyn Error>> {
    let filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::default().add_directive(LevelFilter::INFO.into())
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).compact())
        .init();

    spv2_coco::app::run_convert(env::args())
}
