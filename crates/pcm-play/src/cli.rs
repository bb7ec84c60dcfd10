use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "pcm-play", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long, global = true)]
    pub device: Option<String>,

    /// Number of buffers in the pool (one playing while the next fills needs 2)
    #[arg(long, default_value_t = 3, global = true)]
    pub buffers: usize,

    /// Audio held by each buffer, in milliseconds
    #[arg(long, default_value_t = 40, global = true)]
    pub buffer_ms: u32,

    /// How playback events are reported
    #[arg(long, value_enum, default_value_t = EventOutput::Log, global = true)]
    pub events: EventOutput,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play a headerless little-endian PCM file
    Play {
        /// Path to the raw PCM file
        path: PathBuf,

        /// Sample rate in Hz
        #[arg(long, default_value_t = 44_100)]
        rate: u32,

        /// Interleaved channels (1 or 2)
        #[arg(long, default_value_t = 2)]
        channels: u16,

        /// Bits per sample (8, 16, 24 or 32)
        #[arg(long, default_value_t = 16)]
        bits: u16,
    },

    /// List output devices
    Devices,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum EventOutput {
    /// One JSON object per line on stdout
    Json,
    /// Through the log
    Log,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_defaults_to_cd_format() {
        let args = Args::try_parse_from(["pcm-play", "play", "a.pcm"]).unwrap();
        match args.cmd {
            Some(Command::Play {
                path,
                rate,
                channels,
                bits,
            }) => {
                assert_eq!(path, PathBuf::from("a.pcm"));
                assert_eq!((rate, channels, bits), (44_100, 2, 16));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(args.buffers, 3);
        assert_eq!(args.buffer_ms, 40);
        assert_eq!(args.events, EventOutput::Log);
    }

    #[test]
    fn globals_after_subcommand() {
        let args = Args::try_parse_from([
            "pcm-play",
            "play",
            "a.pcm",
            "--rate",
            "48000",
            "--buffers",
            "4",
            "--events",
            "json",
            "--device",
            "USB",
        ])
        .unwrap();
        assert_eq!(args.buffers, 4);
        assert_eq!(args.events, EventOutput::Json);
        assert_eq!(args.device.as_deref(), Some("USB"));
    }

    #[test]
    fn list_devices_needs_no_subcommand() {
        let args = Args::try_parse_from(["pcm-play", "--list-devices"]).unwrap();
        assert!(args.list_devices);
        assert!(args.cmd.is_none());
    }
}
