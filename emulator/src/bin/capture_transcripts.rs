use std::io;
use std::path::Path;

#[allow(dead_code)]
#[path = "../panel.rs"]
mod panel;
#[allow(dead_code)]
#[path = "../rig.rs"]
mod rig;
#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::Session;
use sorter_core::config::SorterConfig;

const AUTO_SORT: &[&str] = &[
    "btn2",
    "wait 500",
    "btn1",
    "tick",
    "place red",
    "tick",
    "place 30 160 90",
    "wait 400",
    "place blue",
    "tick",
    "status",
    "btn2",
];

const MANUAL_SORT: &[&str] = &[
    "btn2",
    "btn2",
    "wait 500",
    "btn2",
    "place green",
    "wait 500",
    "btn1",
    "btn2",
    "wait 500",
    "btn1",
    "btn2",
    "history",
];

fn main() -> io::Result<()> {
    record("transcripts/auto-sort.log", AUTO_SORT)?;
    record("transcripts/manual-sort.log", MANUAL_SORT)?;
    Ok(())
}

fn record(path: &str, script: &[&str]) -> io::Result<()> {
    let mut session = Session::new(SorterConfig::DEFAULT, Some(Path::new(path)))?;
    for line in script {
        session.handle_line(line)?;
    }
    Ok(())
}
