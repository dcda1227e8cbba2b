// CLASSIFICATION: COMMUNITY
// Filename: cli.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! `crashcat` command line: decode raw report dumps or replay a captured
//! engine snapshot through the full discovery pipeline.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use clap::{Arg, ArgAction, ArgMatches, Command};
use log::{info, warn};

use crate::config::EngineConfig;
use crate::crashcat::CrashCat;
use crate::decoder::PacketDecoder;
use crate::engine::LOG_TARGET;
use crate::error::{CrashCatError, CrashCatResult};
use crate::report::CrashReport;
use crate::sim::{SimEngine, Snapshot};

/// Builds the argument parser.
pub fn build_cli() -> Command {
    Command::new("crashcat")
        .version("0.1")
        .about("CrashCat crash report decoder")
        .subcommand_required(true)
        .subcommand(
            Command::new("decode")
                .about("Decode a linear dump of report packets")
                .arg(
                    Arg::new("file")
                        .value_name("FILE")
                        .help("Binary dump, or hex text with --hex")
                        .required(true),
                )
                .arg(
                    Arg::new("hex")
                        .long("hex")
                        .help("Input is hex text")
                        .action(ArgAction::SetTrue),
                )
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("scan")
                .about("Locate and drain the crash queue of a captured engine snapshot")
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_name("FILE")
                        .help("Engine config JSON; defaults to CRASHCAT_CONFIG or built-in layout"),
                )
                .arg(
                    Arg::new("snapshot")
                        .long("snapshot")
                        .value_name("FILE")
                        .help("Register and memory snapshot JSON")
                        .required(true),
                )
                .arg(json_arg()),
        )
}

fn json_arg() -> Arg {
    Arg::new("json")
        .long("json")
        .help("Print reports as JSON")
        .action(ArgAction::SetTrue)
}

/// Parse process arguments, run the selected command and print its output.
pub fn run() -> CrashCatResult<()> {
    let matches = build_cli().get_matches();
    let output = execute(&matches)?;
    println!("{output}");
    Ok(())
}

/// Run the command selected in `matches` and return what it would print.
pub fn execute(matches: &ArgMatches) -> CrashCatResult<String> {
    match matches.subcommand() {
        Some(("decode", sub)) => {
            let path = required(sub, "file")?;
            let bytes = read_dump(Path::new(path), sub.get_flag("hex"))?;
            let reports = decode_dump(&bytes);
            render(&reports, sub.get_flag("json"))
        }
        Some(("scan", sub)) => {
            let config = match sub.get_one::<String>("config") {
                Some(path) => EngineConfig::from_path(Path::new(path))?,
                None => EngineConfig::from_env()?,
            };
            let snapshot = Snapshot::from_path(Path::new(required(sub, "snapshot")?))?;
            let reports = scan(config, &snapshot)?;
            render(&reports, sub.get_flag("json"))
        }
        _ => Err(CrashCatError::Config("no command given".into())),
    }
}

fn required<'a>(matches: &'a ArgMatches, id: &str) -> CrashCatResult<&'a str> {
    matches
        .get_one::<String>(id)
        .map(String::as_str)
        .ok_or_else(|| CrashCatError::Config(format!("missing argument {id}")))
}

fn read_dump(path: &Path, hex_text: bool) -> CrashCatResult<Vec<u8>> {
    let io_err = |e: std::io::Error| CrashCatError::Config(format!("{}: {e}", path.display()));
    if hex_text {
        let text = fs::read_to_string(path).map_err(io_err)?;
        let compact: String = text.split_whitespace().collect();
        hex::decode(compact).map_err(|e| CrashCatError::Config(format!("{}: {e}", path.display())))
    } else {
        fs::read(path).map_err(io_err)
    }
}

/// Decode every report in a linear dump. A region that does not start with
/// a valid report is skipped one packet at a time; an unreadable header ends
/// the scan.
pub fn decode_dump(bytes: &[u8]) -> Vec<CrashReport> {
    let mut reports = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        match CrashReport::decode(&bytes[offset..]) {
            Ok((report, used)) => {
                reports.push(report);
                offset += used;
            }
            Err(err) => match PacketDecoder::peek_size(&bytes[offset..]) {
                Ok(size) if size <= bytes.len() - offset => {
                    warn!(target: LOG_TARGET, "skipping packet at {offset:#x}: {err}");
                    offset += size;
                }
                _ => {
                    warn!(
                        target: LOG_TARGET,
                        "stopping at {offset:#x}, {} bytes undecoded: {err}",
                        bytes.len() - offset
                    );
                    break;
                }
            },
        }
    }
    reports
}

/// Replay a snapshot through wayfinder discovery and drain its queue.
pub fn scan(config: EngineConfig, snapshot: &Snapshot) -> CrashCatResult<Vec<CrashReport>> {
    let dump_raw = config.log_raw_on_error;
    let engine = Arc::new(SimEngine::from_snapshot(config, snapshot)?);
    let mut crashcat = CrashCat::new(engine);
    crashcat.set_raw_dump(dump_raw);
    for image in snapshot.memory.iter().filter(|m| m.aperture.is_system()) {
        let size = u32::try_from(image.data.trim().len() / 2)
            .map_err(|_| CrashCatError::Config(format!("memory image {:#x} too large", image.base)))?;
        crashcat.register_buffer(image.aperture, image.base, size, 0)?;
    }
    let reports = crashcat.drain_crash_reports();
    info!(target: LOG_TARGET, "scan found {} crash reports", reports.len());
    Ok(reports)
}

fn render(reports: &[CrashReport], json: bool) -> CrashCatResult<String> {
    if json {
        return serde_json::to_string_pretty(reports)
            .map_err(|e| CrashCatError::Config(e.to_string()));
    }
    let blocks: Vec<String> = reports
        .iter()
        .map(|report| {
            report
                .lines()
                .iter()
                .enumerate()
                .map(|(index, line)| {
                    if index == 0 {
                        line.clone()
                    } else {
                        format!("    {line}")
                    }
                })
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect();
    Ok(blocks.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crashcat_wire::ReportV1;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn dump() -> Vec<u8> {
        let report = CrashReport::new(ReportV1 {
            source_pc: 0xABC0,
            ..ReportV1::default()
        });
        let mut bytes: Vec<u8> = report
            .packets()
            .iter()
            .flat_map(|packet| packet.encode().unwrap())
            .collect();
        let copy = bytes.clone();
        bytes.extend(copy);
        bytes
    }

    #[test]
    fn decode_reads_hex_dumps() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", hex::encode(dump())).unwrap();
        let path = file.path().to_str().unwrap();
        let matches = build_cli()
            .try_get_matches_from(["crashcat", "decode", path, "--hex"])
            .unwrap();
        let output = execute(&matches).unwrap();
        assert_eq!(output.matches("generic crash report").count(), 2);
        assert!(output.contains("    pc 0x000000000000abc0"));
    }

    #[test]
    fn decode_skips_stray_packets() {
        let mut bytes = crashcat_wire::Packet::Io32State(crashcat_wire::Io32StateV1 {
            aperture: crashcat_wire::IoAperture::IntIo,
            entries: vec![crashcat_wire::Io32Entry {
                offset: 4,
                value: 5,
            }],
        })
        .encode()
        .unwrap();
        bytes.extend(dump());
        bytes.extend_from_slice(&[0xAA; 3]);
        assert_eq!(decode_dump(&bytes).len(), 2);
    }

    #[test]
    fn scan_requires_snapshot() {
        assert!(build_cli()
            .try_get_matches_from(["crashcat", "scan"])
            .is_err());
    }
}
