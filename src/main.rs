use clap::{Parser, Subcommand};
use serial_line::config::{ConfigLoader, LogFormat, LoggingConfig};
use serial_line::line::{
    DeviceAccess, LineConfig, MockDevice, PortSession, ReadOutcome, SerialportDevice,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Exclusive access to a single serial line.",
    long_about = "Opens one serial line exclusively, applies the configured control block and timeouts, and performs purge-before-operate reads and writes."
)]
struct Args {
    /// Configuration file (defaults to the standard resolution order).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Line identifier or alias, overriding `[line] identifier`.
    #[arg(short, long, global = true)]
    line: Option<String>,

    /// Use an in-memory loopback line instead of real hardware.
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial lines present on this system.
    List,
    /// Print the effective line configuration.
    Describe {
        /// Emit JSON instead of labelled lines.
        #[arg(long)]
        json: bool,
    },
    /// Open the line, send text, and close it.
    Send {
        text: String,
        /// Wait for one read after sending and print what arrived.
        #[arg(long)]
        reply: bool,
    },
    /// Open the line and print everything received as hex.
    Listen {
        /// Stop after this many successful reads.
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loader = match &args.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    init_tracing(&loader.config().logging);
    if let Some(path) = &loader.config_path {
        debug!(path = %path.display(), "configuration loaded");
    }

    let section = &loader.config().line;
    let identifier = match &args.line {
        Some(name) => section.resolve_identifier(name),
        None => section.resolved_identifier(),
    };
    let line_config = loader.line_config()?;

    match args.command {
        Command::List => {
            for name in SerialportDevice::available_lines()? {
                println!("{name}");
            }
        }
        Command::Describe { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&line_config)?);
            } else {
                println!("Line: {identifier}");
                print!("{line_config}");
            }
        }
        Command::Send { text, reply } => {
            let session = open_session(args.simulate, &identifier, line_config)?;
            session.write(text.as_bytes())?;
            info!(line = %identifier, bytes = text.len(), "sent");
            if reply {
                let mut buffer = vec![0u8; 4096];
                match session.read(&mut buffer)? {
                    ReadOutcome::Received(n) => println!("{}", hex(&buffer[..n])),
                    ReadOutcome::TimeoutNoData => println!("(no reply)"),
                }
            }
            session.close();
        }
        Command::Listen { count } => {
            let session = open_session(args.simulate, &identifier, line_config)?;
            let mut buffer = vec![0u8; 4096];
            let mut received = 0usize;
            while count.map_or(true, |limit| received < limit) {
                match session.read(&mut buffer)? {
                    ReadOutcome::Received(n) => {
                        received += 1;
                        println!("{}", hex(&buffer[..n]));
                    }
                    ReadOutcome::TimeoutNoData => continue,
                }
            }
            session.close();
        }
    }

    Ok(())
}

fn open_session(
    simulate: bool,
    identifier: &str,
    config: LineConfig,
) -> Result<PortSession, Box<dyn std::error::Error>> {
    let device: Arc<dyn DeviceAccess> = if simulate {
        Arc::new(MockDevice::new().with_line(identifier).with_loopback())
    } else {
        Arc::new(SerialportDevice::new())
    };
    Ok(PortSession::open_with(device, identifier, config)?)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
