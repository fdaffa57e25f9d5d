use std::io;

use or_conditions::{init_logging, run, InstanceConfig, ProcessProvider, DEFAULT_LOG_FILTER};

fn main() {
    init_logging(DEFAULT_LOG_FILTER);

    let provider = ProcessProvider::new(InstanceConfig::default());
    if let Err(err) = run(provider, &mut io::stdout().lock()) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
