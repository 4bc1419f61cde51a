use std::path::Path;
use std::sync::Arc;
use std::{env, process};

use rustymq::broker::{Broker, BrokerConfig};
use rustymq::config::{Config, parse_port};
use rustymq::log::LogSink;
use rustymq::log::logger::Logger;
use rustymq::{logger_error, logger_info};

const DEFAULT_CONFIG_PATH: &str = "rustymq.conf";

fn usage(program: &str) -> ! {
    eprintln!("Usage:");
    eprintln!("  {program}                 # rustymq.conf if present, else 0.0.0.0:18273");
    eprintln!("  {program} [PORT]          # e.g. 18273");
    eprintln!("  {program} [PORT] [CONFIG] # port plus settings from CONFIG");
    eprintln!();
    eprintln!("When using cargo:");
    eprintln!("  cargo run --bin rustymq_broker");
    eprintln!("  cargo run --bin rustymq_broker -- 18273");
    eprintln!("  cargo run --bin rustymq_broker -- 18273 rustymq.conf");
    process::exit(1);
}

fn load_config(path: &str) -> Config {
    match Config::load(path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    }
}

fn parse_port_or_exit(text: &str) -> u16 {
    match parse_port(text) {
        Ok(port) => port,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    }
}

fn main() {
    // --- Parse CLI args ----------------------------------------------------
    let args: Vec<String> = env::args().collect();
    let program = args.first().map_or("rustymq_broker", String::as_str);

    let (config, port_override) = match args.len() {
        1 if Path::new(DEFAULT_CONFIG_PATH).exists() => (load_config(DEFAULT_CONFIG_PATH), None),
        1 => (Config::empty(), None),
        2 => (Config::empty(), Some(parse_port_or_exit(&args[1]))),
        3 => (load_config(&args[2]), Some(parse_port_or_exit(&args[1]))),
        _ => usage(program),
    };

    let mut broker_config = match BrokerConfig::from_config(&config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };
    if let Some(port) = port_override {
        broker_config = broker_config.with_port(port);
    }

    // --- Start process logger ----------------------------------------------
    let logger = Logger::start_broker(1024, &config);
    let log_sink: Arc<dyn LogSink> = Arc::new(logger.handle());

    eprintln!(
        "[rustymq_broker] starting on {} (log: {})",
        broker_config.bind_addr(),
        logger.file_path().display()
    );
    logger_info!(logger, "using port {}", broker_config.port);

    // --- Run broker (blocks) -------------------------------------------------
    let mut broker = match Broker::start(&broker_config, log_sink) {
        Ok(broker) => broker,
        Err(e) => {
            logger_error!(logger, "{}", e);
            eprintln!("[rustymq_broker] {e}");
            process::exit(1);
        }
    };

    broker.wait();
}
