use log::{debug, info};
use std::env;
use std::fs::File;
use std::io::prelude::*;
use std::process;
use zealous::config::{ExecMode, RunConfig};
use zealous::fault::Termination;
use zealous::input::{ScriptedInput, StdinInput};
use zealous::machine::Machine;
use zealous::screen::{create_screen, ScreenMode};

fn usage(program: &str) {
    println!("zealous - Z-Machine runtime with a compiling core");
    println!();
    println!("Usage: {program} <story_file> [options]");
    println!();
    println!("Options:");
    println!("  --step             run the decode-and-dispatch engine instead of the compiler");
    println!("  --no-reuse         disable the operand-reuse optimization");
    println!("  --seed N           seed the random source (deterministic replay)");
    println!("  --script FILE     read input lines from FILE instead of stdin");
    println!("  --config FILE     load run configuration from a TOML file");
    println!("  --headless         capture output instead of driving the terminal");
    println!();
    println!("Example:");
    println!("  {program} stories/minizork.z3 --seed 42 --script walkthrough.txt");
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        usage(&args[0]);
        return;
    }
    let story_path = &args[1];

    let mut config = RunConfig::default();
    let mut script: Option<String> = None;
    let mut screen_mode = ScreenMode::Auto;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--step" => config.mode = ExecMode::Step,
            "--no-reuse" => config.reuse_operands = false,
            "--headless" => screen_mode = ScreenMode::Headless,
            "--seed" => {
                i += 1;
                match args.get(i).and_then(|s| s.parse().ok()) {
                    Some(seed) => config.seed = Some(seed),
                    None => {
                        eprintln!("Error: --seed needs a number");
                        process::exit(2);
                    }
                }
            }
            "--script" => {
                i += 1;
                match args.get(i) {
                    Some(path) => script = Some(path.clone()),
                    None => {
                        eprintln!("Error: --script needs a file path");
                        process::exit(2);
                    }
                }
            }
            "--config" => {
                i += 1;
                let path = match args.get(i) {
                    Some(p) => p,
                    None => {
                        eprintln!("Error: --config needs a file path");
                        process::exit(2);
                    }
                };
                let text = match std::fs::read_to_string(path) {
                    Ok(t) => t,
                    Err(e) => {
                        eprintln!("Error: cannot read config '{path}': {e}");
                        process::exit(2);
                    }
                };
                config = match RunConfig::from_toml(&text) {
                    Ok(c) => c,
                    Err(e) => {
                        eprintln!("Error: {e}");
                        process::exit(2);
                    }
                };
            }
            other => {
                eprintln!("Error: unknown option '{other}'");
                process::exit(2);
            }
        }
        i += 1;
    }

    // Load the story image, with pointed messages for the usual stumbles.
    debug!("loading story: {story_path}");
    let mut file = match File::open(story_path) {
        Ok(f) => f,
        Err(e) => {
            match e.kind() {
                std::io::ErrorKind::NotFound => {
                    eprintln!("Error: story file not found: {story_path}");
                    eprintln!();
                    eprintln!("Please check:");
                    eprintln!("- the file path is correct");
                    eprintln!("- you are running from the right directory");
                }
                std::io::ErrorKind::PermissionDenied => {
                    eprintln!("Error: permission denied reading: {story_path}");
                }
                _ => eprintln!("Error: cannot open '{story_path}': {e}"),
            }
            process::exit(1);
        }
    };
    let mut story = Vec::new();
    if let Err(e) = file.read_to_end(&mut story) {
        eprintln!("Error: cannot read '{story_path}': {e}");
        process::exit(1);
    }

    let screen = create_screen(screen_mode);
    let input: Box<dyn zealous::input::InputSource> = match script {
        Some(path) => {
            let text = match std::fs::read_to_string(&path) {
                Ok(t) => t,
                Err(e) => {
                    eprintln!("Error: cannot read script '{path}': {e}");
                    process::exit(1);
                }
            };
            Box::new(ScriptedInput::new(text.lines().map(str::to_string)))
        }
        None => Box::new(StdinInput::new()),
    };

    let mut machine = match Machine::with_io(story, config, screen, input) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error: not a usable story file: {e}");
            process::exit(1);
        }
    };

    info!("story version {}", machine.version());
    info!("initial PC {:#06x}", machine.header.initial_pc);

    match machine.run() {
        Ok(Termination::Quit) => debug!("story quit normally"),
        Ok(Termination::MainReturned) => debug!("entry routine returned"),
        Ok(Termination::Interrupted) => debug!("run interrupted"),
        Err(report) => {
            eprintln!("\n{report}");
            process::exit(1);
        }
    }

    if let Some(captured) = machine.captured_output() {
        print!("{captured}");
    }
}
