//! Waypoint - location ping ingestion and history compaction
//!
//! Operator command-line tool for producing and inspecting wire messages.
//!
//! Usage:
//!   waypoint encode --vid N-00-001 --lat 50.85 --lon 4.35
//!   waypoint decode 84a176a84e2d30302d303031...

use clap::{Parser, Subcommand};
use waypoint::core::{decode, encode, now_millis, LocationEvent, Position};

#[derive(Parser, Debug)]
#[command(name = "waypoint")]
#[command(about = "Encode and decode Waypoint location pings")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the hex wire message for a ping
    Encode {
        /// Vehicle identifier, 8 characters starting with 'N'
        #[arg(long)]
        vid: String,

        /// Milliseconds since epoch (defaults to now)
        #[arg(long)]
        timestamp: Option<i64>,

        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
    /// Decode a hex wire message and print the event as JSON
    Decode {
        hex: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Encode { vid, timestamp, lat, lon } => {
            let event = LocationEvent::new(
                &vid,
                timestamp.unwrap_or_else(now_millis),
                Position::new(lon, lat),
            );
            let bytes = encode(&event)?;
            println!("{}", hex::encode(bytes));
        }
        Command::Decode { hex: input } => {
            let bytes = hex::decode(input.trim())?;
            let event = decode(&bytes)?;
            println!("{}", serde_json::to_string_pretty(&event)?);
        }
    }

    Ok(())
}
