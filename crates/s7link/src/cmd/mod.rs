use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod run;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Listen for the controller and print the messages it sends.
    Run(RunArgs),
    /// Decode frames from text and print messages and remainder.
    Decode(DecodeArgs),
    /// Print the wire form of one message.
    Encode(EncodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Engine configuration file (JSON). Flags override its values.
    #[arg(long, value_name = "FILE", env = "S7LINK_CONFIG")]
    pub config: Option<PathBuf>,
    /// Local address to bind both listeners to.
    #[arg(long)]
    pub address: Option<String>,
    /// Port the controller sends on.
    #[arg(long)]
    pub inbound_port: Option<u16>,
    /// Port the controller receives on.
    #[arg(long)]
    pub outbound_port: Option<u16>,
    /// Read phase window in milliseconds.
    #[arg(long, value_name = "MS")]
    pub read_timeout_ms: Option<u64>,
    /// Maximum messages per outgoing batch.
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Type ids handled locally: logged, not printed (comma-separated).
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    pub local: Vec<i32>,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Do not read `TYPE DATA PAYLOAD` lines from stdin.
    #[arg(long)]
    pub no_stdin: bool,
    /// Give up if the listeners are not bound within this many seconds.
    #[arg(long, value_name = "SECS", default_value = "10")]
    pub bind_timeout: u64,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Text to decode. Reads stdin when neither this nor --file is given.
    #[arg(conflicts_with = "file")]
    pub text: Option<String>,
    /// Read the input from a file.
    #[arg(long, value_name = "FILE")]
    pub file: Option<PathBuf>,
    /// Treat the input as one receive chunk: drop the 2-byte controller
    /// header and null bytes first.
    #[arg(long)]
    pub chunk: bool,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Message type id.
    #[arg(allow_negative_numbers = true)]
    pub type_id: i32,
    /// Data id.
    #[arg(allow_negative_numbers = true)]
    pub data_id: i32,
    /// Payload text.
    #[arg(default_value = "")]
    pub payload: String,
    /// Include the `##` transport prefix, as sent on the wire.
    #[arg(long)]
    pub prefix: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build information.
    #[arg(long)]
    pub extended: bool,
}
