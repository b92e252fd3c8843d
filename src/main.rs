use log::error;
use mnist_convnet::{backend::MainAutoBackend, cli::AppArgs};
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let result = AppArgs::parse()
        .and_then(|app_args| mnist_convnet::launch::<MainAutoBackend>(&app_args));
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
