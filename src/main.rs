use log::{error, LevelFilter};

use ica_ensemble::{run_ensemble, RunConfig};

fn main() {
    simple_logger::SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .expect("Failed to initialize logger");

    let config = match RunConfig::new(std::env::args()) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            eprintln!("Usage: ica_ensemble <out_dir> <n_workers> <iterations>");
            std::process::exit(2);
        }
    };

    if let Err(e) = run_ensemble(&config) {
        error!("{}", e);
        std::process::exit(1);
    }
}
