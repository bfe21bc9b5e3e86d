use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use sorter_core::board::Board;
use sorter_core::bus::{BusEngine, TransactionCell};
use sorter_core::config::SorterConfig;
use sorter_core::debounce::{ButtonId, DebounceGate};
use sorter_core::events::{Event, EventChannel};
use sorter_core::repl::{self, ConsoleCommand, ConsoleError, HELP, Swatch};
use sorter_core::scheduler::{Bin, Controller};

use crate::panel::{EdgeOutcome, SimButtons, SimClock, SimDelay, SimPanel};
use crate::rig::{self, SimBus};

pub type SimBoard = Board<BusEngine<'static, SimBus>, SimDelay, SimPanel>;

/// Result of one console line.
#[derive(Debug, Eq, PartialEq)]
pub enum Reply {
    Lines(Vec<String>),
    Exit,
}

/// The whole machine plus the console that pokes at it.
pub struct Session {
    board: SimBoard,
    controller: Controller,
    events: EventChannel,
    gate: DebounceGate,
    buttons: SimButtons,
    clock: SimClock,
    transcript: Option<TranscriptLogger>,
}

impl Session {
    /// Boots the machine. With `transcript`, every exchange is appended there.
    pub fn new(config: SorterConfig, transcript: Option<&Path>) -> io::Result<Self> {
        let transcript = transcript.map(TranscriptLogger::new).transpose()?;

        // One cell per machine, shared with the simulated interrupt for the
        // rest of the process.
        let cell: &'static TransactionCell = Box::leak(Box::new(TransactionCell::new()));
        let mut engine = BusEngine::new(SimBus::new(cell), cell, config.bus);
        engine.init();

        let clock = SimClock::default();
        let mut board = Board::new(engine, SimDelay::new(clock.clone()), SimPanel::default());
        board
            .init()
            .map_err(|err| io::Error::other(format!("board init failed: {err}")))?;

        Ok(Self {
            board,
            controller: Controller::new(config),
            events: EventChannel::new(),
            gate: DebounceGate::new(config.debounce_window),
            buttons: SimButtons::new(clock.clone()),
            clock,
            transcript,
        })
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn board(&self) -> &SimBoard {
        &self.board
    }

    /// Parses and runs one console line.
    pub fn handle_line(&mut self, line: &str) -> io::Result<Reply> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Reply::Lines(Vec::new()));
        }
        self.log(TranscriptRole::Host, trimmed)?;

        let lines = match repl::parse(trimmed) {
            Ok(ConsoleCommand::Exit) => return Ok(Reply::Exit),
            Ok(command) => self.execute(command),
            Err(ConsoleError::Empty) => Vec::new(),
            Err(err) => vec![format!("ERR {err}")],
        };
        for line in &lines {
            self.log(TranscriptRole::Emulator, line)?;
        }
        Ok(Reply::Lines(lines))
    }

    fn execute(&mut self, command: ConsoleCommand) -> Vec<String> {
        match command {
            ConsoleCommand::Press(button) => self.press(button),
            ConsoleCommand::Tick => {
                let mut lines = vec![self.tick()];
                self.run(&mut lines);
                lines
            }
            ConsoleCommand::Wait(ms) => self.wait(Duration::from_millis(u64::from(ms))),
            ConsoleCommand::Place(swatch) => self.place(swatch),
            ConsoleCommand::Remove => {
                let line = match self.board.bus_mut().hardware_mut().sensor_mut().remove() {
                    Some(swatch) => format!("removed {swatch} from the tray"),
                    None => "tray already empty".to_string(),
                };
                vec![line]
            }
            ConsoleCommand::Status => self.status(),
            ConsoleCommand::History => self.history(),
            ConsoleCommand::Help => HELP
                .iter()
                .map(|(usage, summary)| format!("  {usage:<30} {summary}"))
                .collect(),
            ConsoleCommand::Exit => Vec::new(),
        }
    }

    fn press(&mut self, button: ButtonId) -> Vec<String> {
        self.buttons.service(&self.gate);
        let outcome = self.buttons.edge(&self.gate, &self.events, button);
        let label = button.event().label();
        let mut lines = vec![match outcome {
            EdgeOutcome::Accepted => format!("{label} pressed"),
            EdgeOutcome::Suppressed | EdgeOutcome::Masked => {
                let left = self.buttons.remaining(button).unwrap_or_default();
                format!("{label} bounce ignored ({} ms left)", left.as_millis())
            }
        }];
        self.run(&mut lines);
        lines
    }

    /// One tick period elapses; the tick fires if the scheduler enabled it.
    fn tick(&mut self) -> String {
        self.clock.advance(self.controller.config().tick_period);
        self.buttons.service(&self.gate);
        if self.board.panel().tick_running {
            self.events.post(Event::Tick);
            "tick".to_string()
        } else {
            "tick (timer stopped)".to_string()
        }
    }

    fn wait(&mut self, span: Duration) -> Vec<String> {
        let period = self.controller.config().tick_period;
        let mut lines = Vec::new();
        let mut left = span;
        while left >= period {
            left -= period;
            self.clock.advance(period);
            self.buttons.service(&self.gate);
            if self.board.panel().tick_running {
                self.events.post(Event::Tick);
                self.run(&mut lines);
            }
        }
        self.clock.advance(left);
        self.buttons.service(&self.gate);
        lines.push(format!("t = {} ms", self.clock.now().as_millis()));
        lines
    }

    fn place(&mut self, swatch: Swatch) -> Vec<String> {
        let sensor = self.board.bus_mut().hardware_mut().sensor_mut();
        let line = match sensor.tray() {
            Some(previous) => format!("replaced {previous} with {swatch}"),
            None => format!("placed {swatch} on the tray"),
        };
        sensor.place(swatch);
        vec![line]
    }

    /// Drains the event channel and reports what the machine did.
    fn run(&mut self, lines: &mut Vec<String>) {
        if self.events.is_empty() {
            return;
        }
        let before = self.controller.history().total();
        let report = self.controller.drain(&self.events, &mut self.board);
        self.buttons.service(&self.gate);

        lines.extend(
            self.controller
                .history()
                .oldest_first()
                .filter(|record| record.id >= before)
                .map(|record| format!("  {record}")),
        );
        if report.faults > 0
            && let Some(fault) = self.controller.last_fault()
        {
            lines.push(format!("  fault: {fault}"));
        }
        lines.extend(self.display());
    }

    fn display(&self) -> Vec<String> {
        let lcd = self.board().bus().hardware().lcd();
        let [first, second] = lcd.rows();
        let light = if lcd.backlight() { "" } else { "  (backlight off)" };
        vec![
            "  +----------------+".to_string(),
            format!("  |{first}|{light}"),
            format!("  |{second}|"),
            "  +----------------+".to_string(),
        ]
    }

    fn status(&self) -> Vec<String> {
        let counters = self.controller.counters();
        let calibration = self.controller.calibration();
        let panel = self.board.panel();
        let hardware = self.board.bus().hardware();
        let tray = hardware
            .sensor()
            .tray()
            .map_or_else(|| "empty".to_string(), |swatch| swatch.to_string());
        let selector = rig::selected_bin(hardware.servos())
            .map_or_else(|| "-".to_string(), |bin| bin.to_string());
        let tilt = rig::tilt_angle(hardware.servos())
            .map_or_else(|| "-".to_string(), |angle| format!("{} deg", angle.degrees()));
        let (transactions, nacks) = hardware.traffic();

        let mut lines = vec![
            format!(
                "state {}  t = {} ms",
                self.controller.state(),
                self.clock.now().as_millis()
            ),
            format!(
                "sorted {} (red {}, green {}, blue {})",
                counters.total, counters.red, counters.green, counters.blue
            ),
            format!(
                "bins   red {}, green {}, blue {}",
                self.bin_count(Bin::Red),
                self.bin_count(Bin::Green),
                self.bin_count(Bin::Blue)
            ),
            format!(
                "sensor reference {}, delta {}, tray {tray}",
                calibration.reference, calibration.delta
            ),
            format!("servos selector {selector}, tilt {tilt}"),
            format!(
                "leds   ready {}, sorting {}, lamp {} ({} samples); tick {}",
                on_off(panel.ready),
                on_off(panel.sorting),
                on_off(panel.illumination),
                panel.lamp_flashes,
                if panel.tick_running { "running" } else { "stopped" }
            ),
            format!("bus    {transactions} transactions, {nacks} nacked"),
        ];
        if let Some(fault) = self.controller.last_fault() {
            lines.push(format!("fault  {fault}"));
        }
        lines.extend(self.display());
        lines
    }

    fn history(&self) -> Vec<String> {
        let log = self.controller.history();
        if log.is_empty() {
            return vec!["no dispatches yet".to_string()];
        }
        let mut lines: Vec<String> = log.oldest_first().map(ToString::to_string).collect();
        let dropped = usize::try_from(log.total())
            .unwrap_or(usize::MAX)
            .saturating_sub(log.len());
        if dropped > 0 {
            lines.insert(0, format!("({dropped} older dispatches dropped)"));
        }
        lines
    }

    /// Objects sorted into `bin` according to the simulated hardware.
    pub fn bin_count(&self, bin: Bin) -> u32 {
        let bins = self.board.bus().hardware().bins();
        Bin::ALL
            .iter()
            .position(|&candidate| candidate == bin)
            .map_or(0, |index| bins[index])
    }

    fn log(&mut self, role: TranscriptRole, line: &str) -> io::Result<()> {
        let now = self.clock.now();
        match self.transcript.as_mut() {
            Some(transcript) => transcript.append_line(now, role, line),
            None => Ok(()),
        }
    }
}

fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        writeln!(logger.writer, "# Color sorter emulator transcript")?;
        writeln!(
            logger.writer,
            "# Timestamps are milliseconds of simulated machine time"
        )?;
        writeln!(logger.writer)?;
        logger.writer.flush()?;
        Ok(logger)
    }

    fn append_line(&mut self, at: Duration, role: TranscriptRole, line: &str) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>7} ms] {} {}",
            at.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

#[derive(Copy, Clone)]
enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}
