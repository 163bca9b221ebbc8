use anyhow::{Context, Result, anyhow};
use log::info;
use pico_args::Arguments;
use std::{
    env,
    fs::File,
    io::{self, BufReader, Write},
    path::PathBuf,
    sync::{Arc, atomic::AtomicBool},
};

use virtualbar::config::{ConfigState, Profile};
use virtualbar::pipeline::{FramePipeline, StreamSummary};

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    // Flags-based help (-h/--help)
    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    // First free arg is the subcommand
    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("replay") => {
            let profile_name: Option<String> = pargs.opt_value_from_str("--profile")?;
            let summary_only = pargs.contains("--summary");
            let path: PathBuf = pargs.free_from_str().map_err(|_| {
                anyhow!("usage: virtualbar replay <file> [--profile <name>] [--summary]")
            })?;

            let profile = resolve_profile(profile_name.as_deref())?;
            let file =
                File::open(&path).with_context(|| format!("opening {}", path.display()))?;
            info!("replaying {}", path.display());

            let summary = stream(
                &profile,
                BufReader::new(file),
                !summary_only,
                &AtomicBool::new(false),
            )
            .with_context(|| format!("replaying {}", path.display()))?;
            if summary_only {
                print_response(&serde_json::to_value(&summary)?);
            }
            Ok(())
        }

        Some("run") => {
            let profile_name: Option<String> = pargs.opt_value_from_str("--profile")?;
            let profile = resolve_profile(profile_name.as_deref())?;

            let stop = Arc::new(AtomicBool::new(false));
            for sig in signal_hook::consts::TERM_SIGNALS {
                signal_hook::flag::register(*sig, Arc::clone(&stop))?;
            }
            info!("reading frames from stdin");

            let summary = stream(&profile, io::stdin().lock(), true, &stop)?;
            info!(
                "processed {} frames ({} gestures){}",
                summary.frames,
                summary.gestures_begun,
                if summary.interrupted { ", interrupted" } else { "" }
            );
            Ok(())
        }

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: virtualbar use <profile_name>"))?;
            let mut state = ConfigState::load_or_install_default()?;
            state.set_active(&name)?;
            println!("ok: active profile is {name}");
            Ok(())
        }

        Some("list") => {
            let state = ConfigState::load_or_install_default()?;
            for name in state.list_profiles() {
                let mark = if name == state.active_name { '*' } else { ' ' };
                println!("{mark} {name}");
            }
            Ok(())
        }

        Some("show") => {
            let name: Option<String> = pargs.free_from_str().ok();
            let profile = resolve_profile(name.as_deref())?;
            print_response(&serde_json::to_value(&profile)?);
            Ok(())
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

/// Named profile from the store, or the active one.
fn resolve_profile(name: Option<&str>) -> Result<Profile> {
    let state = ConfigState::load_or_install_default()?;
    match name {
        Some(n) => state.profile_named(n),
        None => Ok(state.profile),
    }
}

fn stream<R: io::BufRead>(
    profile: &Profile,
    reader: R,
    write_reports: bool,
    stop: &AtomicBool,
) -> Result<StreamSummary> {
    let mut pipeline = FramePipeline::new(profile);
    let mut stdout = io::stdout().lock();
    let out: Option<&mut dyn Write> = if write_reports {
        Some(&mut stdout)
    } else {
        None
    };
    let summary = pipeline.run_stream(reader, out, stop)?;
    stdout.flush()?;
    Ok(summary)
}

fn print_help() {
    println!(
        r#"virtualbar - track a virtual touch bar and recognise finger swipes over it

USAGE:
  virtualbar help [command]                   Show general or command-specific help
  virtualbar replay <file> [--profile <name>] Replay a recorded frame stream
           [--summary]                        Print only the end-of-stream summary
  virtualbar run [--profile <name>]           Process frames from stdin until EOF or Ctrl-C
  virtualbar use <name>                       Switch active profile
  virtualbar list                             List profiles
  virtualbar show [name]                      Print a profile as JSON

TIPS:
  - Profiles: ~/.config/virtualbar/profiles
  - Active profile pointer: ~/.config/virtualbar/active
  - Frames are JSON lines; one report per frame is written to stdout
  - RUST_LOG=debug shows per-frame tracking decisions
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "replay" => println!(
            "usage: virtualbar replay <file> [--profile <name>] [--summary]\nRuns every frame of <file> through the tracker and gesture recogniser."
        ),
        "run" => println!(
            "usage: virtualbar run [--profile <name>]\nReads frames from stdin; stops at EOF, SIGINT or SIGTERM."
        ),
        "use" => {
            println!("usage: virtualbar use <name>\nValidates profile <name> and makes it active.")
        }
        "list" => {
            println!("usage: virtualbar list\nLists available profiles; marks active with '*'.")
        }
        "show" => println!(
            "usage: virtualbar show [name]\nPrints the active (or named) profile with defaults filled in."
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}
