//! Program an OMR scanner and read a batch of sheets into a record file.
//!
//! Usage:
//!   omrscan [OPTIONS] DEVICE
//!   omrscan --dump [--preset NAME | --config FILE]
//!
//! Options:
//!   --config, -c FILE   TOML config (session, threshold, validation, form)
//!   --preset, -p NAME   Built-in rating sheet: instructor | student (default: student)
//!   --load, -l          Upload the form definition before reading
//!   --output, -o FILE   Append accepted records here (default: scandata)
//!   --timeout-ms N      Response timeout, overrides the config
//!   --log LEVEL         trace | debug | info | warn | error (default: warn)
//!   --log-dir DIR       Write rotating log files instead of stderr
//!   --dump, -d          Print the form's wire commands and exit
//!
//! When a sheet is refused, the fault is printed and the program waits for Enter
//! before reading again, so the operator can fix the sheet and re-feed it.

use anyhow::{anyhow, bail, Context};
use omrscan::logging::init_logging;
use omrscan::{
    BatchReader, FileSink, FormLayout, RatingSheet, RecordFault, RecordValidator, ScanRecord, ScannerConfig,
    Session, StreamChannel,
};
use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_OUTPUT: &str = "scandata";
const USAGE: &str = "usage: omrscan [--config FILE] [--preset instructor|student] [--load] [--output FILE] \
[--timeout-ms N] [--log LEVEL] [--log-dir DIR] [--dump] DEVICE";

struct Options {
    config: Option<PathBuf>,
    preset: Option<String>,
    load: bool,
    output: PathBuf,
    timeout_ms: Option<u64>,
    log_level: String,
    log_dir: Option<PathBuf>,
    dump: bool,
    device: Option<String>,
}

fn take_value(args: &mut Vec<String>, names: &[&str]) -> anyhow::Result<Option<String>> {
    let Some(pos) = args.iter().position(|a| names.contains(&a.as_str())) else {
        return Ok(None);
    };
    args.remove(pos);
    if pos >= args.len() {
        bail!("{} needs a value", names[0]);
    }
    Ok(Some(args.remove(pos)))
}

fn take_flag(args: &mut Vec<String>, names: &[&str]) -> bool {
    if let Some(pos) = args.iter().position(|a| names.contains(&a.as_str())) {
        args.remove(pos);
        true
    } else {
        false
    }
}

fn parse_args() -> anyhow::Result<Options> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    if take_flag(&mut args, &["--help", "-h"]) {
        println!("{}", USAGE);
        std::process::exit(0);
    }
    let config = take_value(&mut args, &["--config", "-c"])?.map(PathBuf::from);
    let preset = take_value(&mut args, &["--preset", "-p"])?;
    let output = take_value(&mut args, &["--output", "-o"])?
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));
    let timeout_ms = take_value(&mut args, &["--timeout-ms"])?
        .map(|v| v.parse::<u64>().with_context(|| format!("bad --timeout-ms {:?}", v)))
        .transpose()?;
    let log_level = take_value(&mut args, &["--log"])?.unwrap_or_else(|| "warn".to_string());
    let log_dir = take_value(&mut args, &["--log-dir"])?.map(PathBuf::from);
    let load = take_flag(&mut args, &["--load", "-l"]);
    let dump = take_flag(&mut args, &["--dump", "-d"]);
    if let Some(unknown) = args.iter().find(|a| a.starts_with('-')) {
        bail!("unknown option {}", unknown);
    }
    if args.len() > 1 {
        bail!("expected one DEVICE, got {:?}", args);
    }
    Ok(Options {
        config,
        preset,
        load,
        output,
        timeout_ms,
        log_level,
        log_dir,
        dump,
        device: args.pop(),
    })
}

/// Config form wins over a preset; the student sheet is the fallback.
fn resolve_layout(config: &ScannerConfig, preset: Option<&str>) -> anyhow::Result<FormLayout> {
    if let Some(layout) = config.form_layout()? {
        if preset.is_some() {
            bail!("--preset conflicts with the [form] section of the config");
        }
        return Ok(layout);
    }
    let name = preset.unwrap_or("student");
    let sheet = RatingSheet::by_name(name).ok_or_else(|| anyhow!("unknown preset {:?}", name))?;
    Ok(sheet.layout()?)
}

fn console_corrector(fault: &RecordFault, record: &ScanRecord) -> io::Result<()> {
    let mut err = io::stderr().lock();
    writeln!(err, "{}", record)?;
    match fault {
        RecordFault::Unreadable { fields } => writeln!(err, "Unreadable mark in field(s) {:?}", fields)?,
        RecordFault::MissingIdentifier { .. } | RecordFault::BadIdentifier { .. } => {
            writeln!(err, "BAD ID NUMBER: {}", fault)?
        }
        RecordFault::Incomplete { field } => writeln!(err, "MISSING A RATING (field {})", field)?,
        RecordFault::Garbled { .. } => writeln!(err, "Garbled transmission: {}", fault)?,
    }
    writeln!(err, "Fix the sheet, re-feed it, and press Enter.")?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed"));
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let opts = parse_args()?;
    let _logger = init_logging(&opts.log_level, opts.log_dir.as_deref()).map_err(|e| anyhow!(e))?;

    let config = match &opts.config {
        Some(path) => ScannerConfig::load(path)?,
        None => ScannerConfig::default(),
    };
    let layout = resolve_layout(&config, opts.preset.as_deref())?;

    if opts.dump {
        print!("{}", layout.definition);
        return Ok(());
    }

    let device = opts.device.with_context(|| format!("missing DEVICE\n{}", USAGE))?;
    let port = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&device)
        .with_context(|| format!("opening {}", device))?;
    let channel = StreamChannel::new(port.try_clone()?, port)?;

    let mut session_config = config.session_config();
    if let Some(ms) = opts.timeout_ms {
        session_config.response_timeout = Duration::from_millis(ms);
    }
    let mut session = Session::with_config(channel, session_config);

    if opts.load {
        eprintln!("Loading form definition ({} commands)...", layout.definition.len());
        session.upload(&layout.definition).context("form upload failed")?;
    }
    if let Some(t) = config.threshold {
        session.set_threshold(t.darkness, t.contrast)?;
    }

    let validator = RecordValidator::new(layout.policy)?;
    let mut sink = FileSink::open(&opts.output).with_context(|| format!("opening {}", opts.output.display()))?;
    let mut corrector = console_corrector;
    eprintln!("Reading forms...");
    let summary = BatchReader::new(&mut session, &validator).run(&mut sink, &mut corrector)?;
    eprintln!(
        "DONE: {} accepted, {} corrected, {} sanitized, {} auto-filled",
        summary.accepted, summary.corrections, summary.sanitized, summary.auto_filled
    );
    Ok(())
}
