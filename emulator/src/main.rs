mod panel;
mod rig;
mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use crossterm::style::Stylize;
use session::{Reply, Session};
use sorter_core::config::SorterConfig;

const USAGE: &str = "Usage: sorter-emulator [--transcript <path>] [--threshold <percent>]";

struct Options {
    transcript: Option<PathBuf>,
    config: SorterConfig,
}

fn main() -> io::Result<()> {
    let options = parse_options(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new(options.config, options.transcript.as_deref())?;
    let mut line = String::new();

    writeln!(
        writer,
        "Color sorter emulator ready. Type `help` for commands or `exit` to quit."
    )?;

    loop {
        line.clear();
        write!(writer, "{} ", ">".bold())?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        match session.handle_line(&line)? {
            Reply::Exit => {
                let sorted = session.controller().counters().total;
                writeln!(writer, "Session closed after sorting {sorted} object(s).")?;
                break;
            }
            Reply::Lines(lines) => {
                for response in lines {
                    if response.starts_with("ERR") {
                        writeln!(writer, "{}", response.red())?;
                    } else {
                        writeln!(writer, "{response}")?;
                    }
                }
            }
        }
    }

    Ok(())
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<Options, String> {
    let mut options = Options {
        transcript: None,
        config: SorterConfig::DEFAULT,
    };
    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
            None => (arg, None),
        };
        let mut value = || {
            inline
                .clone()
                .or_else(|| args.next())
                .ok_or_else(|| format!("Expected value after {flag}"))
        };
        match flag.as_str() {
            "--transcript" => options.transcript = Some(PathBuf::from(value()?)),
            "--threshold" => {
                let raw = value()?;
                let percent: u8 = raw
                    .parse()
                    .map_err(|_| format!("Invalid threshold `{raw}`"))?;
                options.config = options.config.with_detection_threshold_percent(percent);
            }
            _ => return Err(format!("Unknown argument `{flag}`")),
        }
    }
    Ok(options)
}
