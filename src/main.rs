use cim_scraper_lib::{logger, Config, RunController, Scraper};

use std::error::Error;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use clap::Parser;
use log::{info, warn};

fn main() -> Result<(), Box<dyn Error>> {
    logger::init();
    let config = Config::parse();
    config.validate()?;
    info!("Starting CIM synonym scraper...");

    // Ctrl-C only raises the flag; the controller stops between lookups and
    // saves what it has.
    let interrupt = Arc::new(AtomicBool::new(false));
    let flag = interrupt.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    }) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }

    let scraper = Scraper::new(&config.base_url, config.request_timeout(), &config.synonym_class)?;
    let mut controller = RunController::new(&config, &scraper, interrupt);
    let summary = controller.run();

    let code = summary.outcome.exit_code();
    if code != 0 {
        process::exit(code);
    }
    Ok(())
}
