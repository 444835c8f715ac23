use std::net::SocketAddr;

use clap::Parser;
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, LinesCodec};

use mbserver::*;

#[derive(Parser)]
#[command(name = "server")]
#[command(about = "A Modbus TCP/RTU server whose registers can be changed from stdin")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1:502", help = "Socket address to listen on")]
    tcp: SocketAddr,

    #[arg(long, help = "Optional serial port to serve RTU requests on")]
    serial: Option<String>,

    #[arg(long, default_value_t = 9600, help = "Baud rate of the serial port")]
    baud: u32,

    #[arg(long, default_value_t = 100, help = "Maximum number of TCP sessions")]
    max_sessions: usize,

    #[arg(long, help = "Reject requests that run past address 65535")]
    strict: bool,

    #[arg(short, long, help = "Log decoded frames and PDUs")]
    verbose: bool,
}

enum Command {
    Exit,
    InputRegister(u16, u16),
    DiscreteInput(u16, bool),
    HoldingRegister(u16, u16),
    Coil(u16, bool),
}

fn parse_bit(value: &str) -> Option<bool> {
    match value {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

fn parse_command(line: &str) -> Option<Command> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        ["x"] => Some(Command::Exit),
        ["ir", addr, value] => Some(Command::InputRegister(addr.parse().ok()?, value.parse().ok()?)),
        ["hr", addr, value] => Some(Command::HoldingRegister(
            addr.parse().ok()?,
            value.parse().ok()?,
        )),
        ["di", addr, value] => Some(Command::DiscreteInput(addr.parse().ok()?, parse_bit(value)?)),
        ["c", addr, value] => Some(Command::Coil(addr.parse().ok()?, parse_bit(value)?)),
        _ => None,
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();

    // initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let decode = if args.verbose {
        DecodeLevel::new(
            AppDecodeLevel::DataValues,
            FrameDecodeLevel::Header,
            PhysDecodeLevel::Length,
        )
    } else {
        DecodeLevel::nothing()
    };

    let config = ServerConfig {
        max_sessions: args.max_sessions,
        address_mode: if args.strict {
            AddressMode::Strict
        } else {
            AddressMode::Wrap
        },
        decode,
        ..ServerConfig::default()
    };

    // if we ever drop the server, every listener and session shuts down
    let server = Server::spawn(config);
    server.listen_tcp(args.tcp).await?;

    if let Some(path) = &args.serial {
        let settings = SerialSettings {
            baud_rate: args.baud,
            ..SerialSettings::default()
        };
        server.listen_rtu(path, settings, default_retry_strategy())?;
    }

    let store = server.store();
    let mut reader = FramedRead::new(tokio::io::stdin(), LinesCodec::new());
    while let Some(line) = reader.next().await {
        match parse_command(&line?) {
            Some(Command::Exit) => break,
            Some(Command::InputRegister(addr, value)) => store.input_registers.set(addr, value),
            Some(Command::HoldingRegister(addr, value)) => {
                store.holding_registers.set(addr, value)
            }
            Some(Command::DiscreteInput(addr, value)) => store.discrete_inputs.set(addr, value),
            Some(Command::Coil(addr, value)) => store.coils.set(addr, value),
            None => println!("commands: ir <addr> <value> | hr <addr> <value> | di <addr> <0|1> | c <addr> <0|1> | x"),
        }
    }

    server.shutdown();
    Ok(())
}
