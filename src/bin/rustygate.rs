//! The gateway binary. Hosts the media transport core until stdin closes.

use std::{
    env,
    io::{self, BufRead},
    process,
    sync::{Arc, mpsc},
    thread,
};

use rustygate::{
    config::{Config, GatewayConfig},
    gateway::MediaGateway,
    log::{log_sink::LogSink, logger::Logger},
    sink_info,
};

const LOG_QUEUE_CAP: usize = 4096;

fn main() {
    let args: Vec<String> = env::args().collect();

    let config = match args.get(1) {
        Some(path) => {
            println!("Loading config: {}", path);
            Config::load(path)
        }
        None => Config::load("rustygate.conf"),
    }
    .unwrap_or_else(|e| {
        eprintln!("Error loading config: {e}. Using empty config.");
        Config::empty()
    });

    let gateway_config = match GatewayConfig::from_config(&config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Invalid config: {e}");
            process::exit(1);
        }
    };

    // --- Start process logger ----------------------------------------------
    let logger = Logger::start(LOG_QUEUE_CAP, &config);
    let log_sink: Arc<dyn LogSink> = Arc::new(logger.handle());
    eprintln!("[rustygate] logging to {}", logger.file_path().display());

    let (events_tx, events_rx) = mpsc::channel();
    let (media_tx, media_rx) = mpsc::channel();

    let gateway = match MediaGateway::start(&gateway_config, events_tx, media_tx, log_sink.clone())
    {
        Ok(g) => g,
        Err(e) => {
            eprintln!("Cannot start gateway: {e}");
            process::exit(1);
        }
    };
    println!("fingerprint sha-256 {}", gateway.fingerprint());

    // The relay side is external; events and media are only traced here.
    let event_log = log_sink.clone();
    thread::spawn(move || {
        for event in events_rx {
            sink_info!(event_log, "[GATEWAY] event {:?}", event);
        }
    });
    thread::spawn(move || for _ in media_rx {});

    // --- Run until stdin closes --------------------------------------------
    for line in io::stdin().lock().lines() {
        if line.is_err() {
            break;
        }
    }

    gateway.shutdown();
    eprintln!("[rustygate] stopped");
}
