use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

use ethocan_lib::bridge::TransportMode;
use ethocan_lib::{load_settings, Overrides};

/// Bridge Ethernet frames between a TAP interface and a half-duplex serial bus.
#[derive(Parser, Debug)]
#[command(name = "ethocan", version, about)]
struct Cli {
    /// Serial framing: emulated (byte stuffing + CRC) or native (length prefix + sense line)
    #[arg(short = 'm', long)]
    mode: Option<TransportMode>,

    /// Serial device, e.g. /dev/ttyS1
    #[arg(short = 'd', long)]
    tty_device: Option<String>,

    /// TAP interface name, e.g. tap0
    #[arg(short = 'n', long)]
    tap_device: Option<String>,

    /// sysfs GPIO directory of the sense line (native mode)
    #[arg(short = 's', long)]
    sense_gpio: Option<PathBuf>,

    /// TOML settings file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    #[arg(long)]
    baud: Option<u32>,

    #[arg(long)]
    mtu: Option<usize>,

    /// Per-octet echo/receive timeout in microseconds
    #[arg(long)]
    octet_timeout_us: Option<u64>,

    /// Also write the log to a timestamped file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Trace every octet on the serial line
    #[arg(long)]
    debug: bool,

    /// Print the effective settings as TOML and exit
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            mode: self.mode,
            tty_device: self.tty_device.clone(),
            tap_device: self.tap_device.clone(),
            sense_gpio: self.sense_gpio.clone(),
            baud_rate: self.baud,
            mtu: self.mtu,
            octet_timeout_us: self.octet_timeout_us,
            log_dir: self.log_dir.clone(),
            debug: self.debug,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut settings = match load_settings(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("ethocan: {}", e);
            return ExitCode::FAILURE;
        }
    };
    settings.apply(cli.overrides());

    if cli.print_config {
        return match settings.to_toml() {
            Ok(text) => {
                print!("{}", text);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("ethocan: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    if let Err(e) = settings.validate() {
        Cli::command()
            .error(ErrorKind::MissingRequiredArgument, e)
            .exit();
    }

    match ethocan_lib::run(settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ethocan: {}", e);
            ExitCode::FAILURE
        }
    }
}
