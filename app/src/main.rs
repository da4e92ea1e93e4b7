use std::process::ExitCode;

use clap::Parser;

use rtframe_app::{App, AppArgs};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting rtframe");
    rtframe_core::init();
    rtframe_graphics::init();
    rtframe_app::init();

    let args = AppArgs::parse();
    let result = App::new(args).and_then(|mut app| app.run());

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
