use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use s7link_engine::{Engine, EngineConfig};
use s7link_frame::Message;
use s7link_registry::MessageDescriptor;
use tracing::{debug, info, warn};

use crate::cmd::RunArgs;
use crate::exit::{
    engine_error, CliError, CliResult, CONFIG, DATA_INVALID, INTERNAL, SUCCESS, TRANSPORT_ERROR,
};
use crate::output::{print_message, OutputFormat};

const RECV_POLL: Duration = Duration::from_millis(100);

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let config = resolve_config(&args)?;
    let descriptors = args.local.iter().map(|&type_id| {
        MessageDescriptor::local(type_id, |message| {
            debug!(%message, "handled locally");
            Ok(())
        })
    });

    let (engine, notifications) = Engine::with_channel(config, descriptors);
    if let Some(err) = engine.configuration_error() {
        return Err(CliError::new(CONFIG, format!("invalid configuration: {err}")));
    }
    let engine = Arc::new(engine);
    engine
        .try_connect()
        .map_err(|err| engine_error("connect failed", err))?;
    wait_for_listeners(&engine, Duration::from_secs(args.bind_timeout))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    if !args.no_stdin {
        spawn_stdin_sender(Arc::clone(&engine))?;
    }

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let message = match notifications.recv_timeout(RECV_POLL) {
            Ok(message) => message,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        print_message(&message, format);
        printed = printed.saturating_add(1);

        if let Some(count) = args.count {
            if printed >= count {
                break;
            }
        }
    }

    engine.shutdown();
    Ok(SUCCESS)
}

fn resolve_config(args: &RunArgs) -> CliResult<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            EngineConfig::from_json_file(path).map_err(|err| engine_error("load config", err))?
        }
        None => EngineConfig::default(),
    };

    if let Some(address) = &args.address {
        config.address = address.clone();
    }
    if let Some(port) = args.inbound_port {
        config.inbound_port = port;
    }
    if let Some(port) = args.outbound_port {
        config.outbound_port = port;
    }
    if let Some(ms) = args.read_timeout_ms {
        config.read_timeout = Duration::from_millis(ms);
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    Ok(config)
}

fn wait_for_listeners(engine: &Engine, timeout: Duration) -> CliResult<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if let (Some(inbound), Some(outbound)) = (engine.inbound_addr(), engine.outbound_addr()) {
            info!(%inbound, %outbound, "waiting for controller");
            return Ok(());
        }
        if Instant::now() >= deadline {
            engine.shutdown();
            return Err(CliError::new(
                TRANSPORT_ERROR,
                format!("listeners not bound after {}s", timeout.as_secs()),
            ));
        }
        thread::sleep(Duration::from_millis(10));
    }
}

fn spawn_stdin_sender(engine: Arc<Engine>) -> CliResult<()> {
    thread::Builder::new()
        .name("s7link-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                match parse_send_line(&line) {
                    Ok(Some(message)) => {
                        let outcome = engine.send_msg(message);
                        if !outcome.accepted {
                            warn!(queue_len = outcome.queue_len, "message not queued");
                        }
                    }
                    Ok(None) => {}
                    Err(err) => warn!(error = %err, code = err.code, "skipping input line"),
                }
            }
            debug!("stdin closed");
        })
        .map(|_| ())
        .map_err(|err| CliError::new(INTERNAL, format!("stdin thread failed: {err}")))
}

/// Parse `TYPE DATA [PAYLOAD...]`. Blank lines and `#` comments yield `None`.
fn parse_send_line(line: &str) -> CliResult<Option<Message>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (type_id, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim_start();
    let (data_id, payload) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));

    let parse = |field: &str, name: &str| {
        field.parse::<i32>().map_err(|_| {
            CliError::new(DATA_INVALID, format!("invalid {name} {field:?} in {line:?}"))
        })
    };
    Ok(Some(Message::new(
        parse(type_id, "type id")?,
        parse(data_id, "data id")?,
        payload.trim_start(),
    )))
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn args() -> RunArgs {
        RunArgs {
            config: None,
            address: None,
            inbound_port: None,
            outbound_port: None,
            read_timeout_ms: None,
            batch_size: None,
            local: Vec::new(),
            count: None,
            no_stdin: true,
            bind_timeout: 10,
        }
    }

    #[test]
    fn parses_send_lines() {
        assert_eq!(
            parse_send_line("1 7 1").unwrap(),
            Some(Message::new(1, 7, "1"))
        );
        assert_eq!(
            parse_send_line("  4 3   hello world ").unwrap(),
            Some(Message::new(4, 3, "hello world"))
        );
        assert_eq!(parse_send_line("6 0").unwrap(), Some(Message::new(6, 0, "")));
        assert_eq!(parse_send_line("").unwrap(), None);
        assert_eq!(parse_send_line("# comment").unwrap(), None);
    }

    #[test]
    fn rejects_non_numeric_ids() {
        let err = parse_send_line("x 1 1").unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
        assert!(parse_send_line("1").is_err());
    }

    #[test]
    fn flags_override_defaults() {
        let config = resolve_config(&RunArgs {
            address: Some("127.0.0.1".to_string()),
            outbound_port: Some(4001),
            read_timeout_ms: Some(40),
            ..args()
        })
        .unwrap();

        assert_eq!(config.address, "127.0.0.1");
        assert_eq!(config.inbound_port, 3000);
        assert_eq!(config.outbound_port, 4001);
        assert_eq!(config.read_timeout, Duration::from_millis(40));
    }

    #[test]
    fn missing_config_file_fails() {
        let err = resolve_config(&RunArgs {
            config: Some(PathBuf::from("/nonexistent/s7link.json")),
            ..args()
        })
        .unwrap_err();
        assert!(err.message.contains("/nonexistent/s7link.json"));
    }
}
