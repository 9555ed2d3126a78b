//! Panelink - interactive console for UART-attached HMI displays
//!
//! Reads command lines from stdin, sends them to the display and prints the
//! replies, with touch and device state events printed as they arrive.

mod settings;

use std::path::PathBuf;

use anyhow::{bail, Context};
use hmi_link::{HmiLink, LinkError};
use hmi_protocol::{Response, ResponseParser, TouchAction};
use hmi_sim::{run_virtual_display_task, VirtualDisplay, VirtualDisplayCommand};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use settings::ConsoleSettings;

/// Capacity for `get ... .txt` replies
const TEXT_CAPACITY: usize = 256;

const HELP: &str = "\
Commands are sent as typed, for example:
  t0.txt=\"hello\"      set a text attribute
  get n0.val          read a number (or text for .txt)
  page 1              switch page
  sendme              read the current page id
  rept 0,16           read 16 EEPROM bytes
Console commands:
  events              process events waiting in the buffer
  touch <component>   press a component (simulated display only)
  help                this text
  quit                exit";

#[derive(Debug, Default)]
struct Options {
    settings_path: Option<PathBuf>,
    port: Option<String>,
    baud_rate: Option<u32>,
    simulate: bool,
    save: bool,
    list_ports: bool,
}

fn parse_args() -> anyhow::Result<Options> {
    let mut options = Options::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--settings" => {
                let path = args.next().context("--settings needs a path")?;
                options.settings_path = Some(path.into());
            }
            "--port" => options.port = Some(args.next().context("--port needs a value")?),
            "--baud" => {
                let baud = args.next().context("--baud needs a value")?;
                let rate = baud
                    .parse::<u32>()
                    .with_context(|| format!("bad baud rate {}", baud))?;
                options.baud_rate = Some(rate);
            }
            "--simulate" => options.simulate = true,
            "--save" => options.save = true,
            "--list" => options.list_ports = true,
            other => bail!("unknown argument {}", other),
        }
    }
    Ok(options)
}

fn print_ports() -> anyhow::Result<()> {
    let ports = serialport::available_ports().context("Failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{}", port.port_name);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "panelink=info,hmi_protocol=info,hmi_link=info,hmi_sim=info".into()
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = parse_args()?;
    if options.list_ports {
        return print_ports();
    }

    let mut settings = ConsoleSettings::load(options.settings_path.as_deref());
    if let Some(port) = options.port {
        settings.port = port;
    }
    if let Some(baud) = options.baud_rate {
        settings.baud_rate = baud;
    }
    settings.simulate |= options.simulate;

    if options.save {
        let path = settings.save(options.settings_path.as_deref())?;
        info!("Saved settings to {}", path.display());
    }

    if settings.simulate {
        info!("Starting Panelink against a simulated display");
        let (io, display_io) = tokio::io::duplex(4096);
        let (display_tx, display_rx) = mpsc::channel(32);
        let display = tokio::spawn(run_virtual_display_task(
            display_io,
            VirtualDisplay::new("Simulated"),
            display_rx,
        ));
        let link = HmiLink::new(io, settings.link.clone());
        run_console(link, Some(display_tx.clone())).await?;
        let _ = display_tx.send(VirtualDisplayCommand::Shutdown).await;
        let _ = display.await;
        return Ok(());
    }

    if settings.port.is_empty() {
        println!("No port configured, pass --port. Available ports:");
        return print_ports();
    }

    info!(
        "Starting Panelink on {} at {} baud",
        settings.port, settings.baud_rate
    );
    let link = HmiLink::open(&settings.port, settings.baud_rate, settings.link.clone())
        .with_context(|| format!("Failed to open {}", settings.port))?;
    run_console(link, None).await
}

async fn run_console<T>(
    link: HmiLink<T>,
    display: Option<mpsc::Sender<VirtualDisplayCommand>>,
) -> anyhow::Result<()>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    link.on_touch(|touch| println!("< touch {:?}", touch));
    link.on_coordinate(|coord| println!("< coordinate {:?}", coord));
    link.on_device_state(|state| println!("< state {:?}", state));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "quit" | "exit" => break,
            "help" => println!("{}", HELP),
            "events" => match link.process_pending_events().await {
                Ok(n) => println!("{} event(s)", n),
                Err(e) => println!("! {}", e),
            },
            _ => {
                if let Some(component) = line.strip_prefix("touch ") {
                    touch(display.as_ref(), component.trim()).await;
                    continue;
                }
                match link.send(line, parser_for(line)).await {
                    Ok(response) => print_response(&response),
                    Err(e) => print_error(&e),
                }
            }
        }
    }

    link.shutdown().await;
    Ok(())
}

/// Pick the reply parser from the command text
fn parser_for(line: &str) -> ResponseParser {
    if let Some(target) = line.strip_prefix("get ") {
        if target.trim_end().ends_with(".txt") {
            return ResponseParser::Text {
                capacity: TEXT_CAPACITY,
            };
        }
        return ResponseParser::Number;
    }
    if line == "sendme" {
        return ResponseParser::PageId;
    }
    if let Some(args) = line.strip_prefix("rept ") {
        let length = args
            .split(',')
            .nth(1)
            .and_then(|l| l.trim().parse().ok())
            .unwrap_or(0);
        if length > 0 {
            return ResponseParser::Raw { length };
        }
    }
    ResponseParser::Ack
}

fn print_response(response: &Response) {
    match response {
        Response::Result(code) => println!("> {}", code),
        Response::Number(value) => println!("> {}", value),
        Response::Text(text) => println!("> {:?}", text),
        Response::PageId(id) => println!("> page {}", id),
        Response::Raw(bytes) => println!("> {:02X?}", bytes),
        other => println!("> {:?}", other),
    }
}

fn print_error(error: &LinkError) {
    match error.device_code() {
        Some(code) => println!("! device rejected command: {}", code),
        None => println!("! {}", error),
    }
}

async fn touch(display: Option<&mpsc::Sender<VirtualDisplayCommand>>, component: &str) {
    let Some(display) = display else {
        println!("! touch needs --simulate");
        return;
    };
    for action in [TouchAction::Press, TouchAction::Release] {
        let command = VirtualDisplayCommand::Touch {
            component: component.to_string(),
            action,
        };
        if display.send(command).await.is_err() {
            warn!("Simulated display has stopped");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_for() {
        assert_eq!(parser_for("get n0.val"), ResponseParser::Number);
        assert_eq!(
            parser_for("get main.t0.txt"),
            ResponseParser::Text {
                capacity: TEXT_CAPACITY
            }
        );
        assert_eq!(parser_for("sendme"), ResponseParser::PageId);
        assert_eq!(parser_for("rept 0, 16"), ResponseParser::Raw { length: 16 });
        assert_eq!(parser_for("rept 0"), ResponseParser::Ack);
        assert_eq!(parser_for("page 1"), ResponseParser::Ack);
    }
}
