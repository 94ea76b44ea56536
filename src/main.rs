//! xmoto-sim command line
//!
//! - `xmoto-sim info <replay>...` prints replay headers
//! - `xmoto-sim demo [--seed N] [--ticks N] [--settings file] [out.rpl]`
//!   rides a seeded level, records, saves and plays the replay back as a ghost

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::Serialize;

use xmoto_sim::consts::*;
use xmoto_sim::ghost::ReplayGhost;
use xmoto_sim::replay::{Replay, ReplayConfig};
use xmoto_sim::sim::{BikeInput, BikerEvent, DriveDir, PlayerBiker, SegmentLevel};
use xmoto_sim::{PhysicsSettings, Result};

#[derive(Parser)]
#[command(name = "xmoto-sim")]
#[command(about = "X-Moto bike physics and replay tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the header of each replay
    Info {
        /// Replay names or paths
        #[arg(required = true)]
        replays: Vec<String>,
    },

    /// Ride a seeded level, save the replay and play it back as a ghost
    Demo {
        /// Output replay file (automatic name when omitted)
        out: Option<PathBuf>,
        /// Terrain and balance seed
        #[arg(long, default_value_t = 0x5eed)]
        seed: u64,
        /// Ticks to simulate
        #[arg(long, default_value_t = 1500)]
        ticks: i32,
        /// Physics settings JSON file
        #[arg(long)]
        settings: Option<PathBuf>,
    },
}

#[derive(Debug, Default, Serialize)]
struct DemoSummary {
    replay: PathBuf,
    seed: u64,
    ticks: i32,
    frames: usize,
    distance: f32,
    wheel_touches: u32,
    head_touches: u32,
    somersaults: u32,
    ghost_end_x: f32,
    ghost_finished: bool,
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Info { replays } => {
            info(&replays);
            Ok(())
        }
        Command::Demo {
            out,
            seed,
            ticks,
            settings,
        } => demo(out, seed, ticks, settings.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn info(names: &[String]) {
    let config = ReplayConfig::default();
    for name in names {
        match Replay::get_replay_infos(&config, name) {
            Some(info) => {
                let finish = if info.is_finished {
                    format!("{:.2}", info.finish_time as f32 / 100.0)
                } else {
                    "unfinished".to_string()
                };
                println!("{:<30}: {}", "Replay", info.name);
                println!("{:<30}: {}", "Level Id", info.level);
                println!("{:<30}: {}", "Player", info.player);
                println!("{:<30}: {}", "Finish time", finish);
            }
            None => log::warn!("{name}: not a valid replay"),
        }
    }
}

fn demo(out: Option<PathBuf>, seed: u64, ticks: i32, settings: Option<&Path>) -> Result<()> {
    let settings = match settings {
        Some(path) => PhysicsSettings::load(path)?,
        None => PhysicsSettings::default(),
    };
    let out = out.unwrap_or_else(|| PathBuf::from(format!("{}.rpl", Replay::give_automatic_name())));
    let config = ReplayConfig {
        replays_dir: out.parent().map(Path::to_path_buf).unwrap_or_default(),
        ..ReplayConfig::default()
    };
    let file_name = out
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "demo.rpl".to_string());

    let mut level = SegmentLevel::random_terrain(seed, 200.0, 2.0, 0.25);
    let mut biker = PlayerBiker::new(settings.clone(), Vec2::ZERO, DriveDir::Right);
    let mut replay = Replay::new(config.clone());
    replay.create_replay(&file_name, "demo", "xmoto-sim", DEFAULT_REPLAY_FRAME_RATE, SERIALIZED_STATE_SIZE);
    log::info!("Demo level: {} segments, seed {seed:#x}", level.segments.len());

    let mut rng = Pcg32::seed_from_u64(seed);
    let mut summary = DemoSummary {
        seed,
        ..DemoSummary::default()
    };
    let start_x = biker.state().center.x;
    let mut time = 0;
    while time < ticks {
        // Balance now and then, like a player would
        let pull = if time % 50 == 0 { rng.random_range(-0.5..=0.5) } else { 0.0 };
        biker.set_input(BikeInput {
            drive: 1.0,
            pull,
            change_dir: false,
        });
        for event in biker.update_to_time(time, PHYS_STEP_SIZE, &mut level) {
            match event {
                BikerEvent::WheelTouched { touching: true, .. } => summary.wheel_touches += 1,
                BikerEvent::HeadTouched => {
                    summary.head_touches += 1;
                    if !biker.is_dead() {
                        log::info!("Head hit at t={time}");
                        biker.set_dead(true);
                        biker.set_body_detach(true);
                    }
                }
                BikerEvent::SomersaultCompleted { counter_clockwise } => {
                    log::info!("Somersault ({})", if counter_clockwise { "ccw" } else { "cw" });
                }
                _ => {}
            }
        }
        replay.record_state(time, biker.state(), biker.rig());
        time += PHYS_STEP_SIZE;
    }

    let alive = !biker.is_dead();
    replay.finish_replay(alive, time);
    summary.replay = replay.save()?;
    summary.ticks = time;
    summary.frames = replay.number_of_frames();
    summary.distance = biker.state().center.x - start_x;
    summary.somersaults = biker.somersaults();

    let mut ghost = ReplayGhost::open(config, &file_name, &settings)?;
    for t in (0..=time + 100).step_by(10) {
        ghost.update_to_time(t)?;
    }
    summary.ghost_end_x = ghost.state().center.x;
    summary.ghost_finished = ghost.is_finished();
    log::info!("Ghost of {} done at x={:.2}", ghost.player_name(), summary.ghost_end_x);

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
