use std::env;
use std::fs;
use std::process;

use oort_emulator::cpu::{HaltOnTrap, CPU};
use oort_emulator::memory::{Memory, DEFAULT_MEMSIZE};
use oort_emulator::server::run_server;

struct Options {
    memsize: u64,
    image: Option<String>,
    steps: Option<u64>,
    serve: bool,
}

fn usage() -> ! {
    eprintln!("usage: oort_emulator [--memsize BYTES] [--image FILE] [--steps N] [--serve]");
    eprintln!("  --memsize BYTES  memory capacity, rounded up to a multiple of 8 (default {})", DEFAULT_MEMSIZE);
    eprintln!("  --image FILE     binary image loaded at address 0");
    eprintln!("  --steps N        stop after at most N instructions");
    eprintln!("  --serve          run the HTTP emulation service instead");
    process::exit(2);
}

fn parse_options() -> Options {
    let mut options = Options {
        memsize: DEFAULT_MEMSIZE,
        image: None,
        steps: None,
        serve: false,
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--memsize" => match args.next().and_then(|v| v.parse().ok()) {
                Some(value) => options.memsize = value,
                None => usage(),
            },
            "--image" => match args.next() {
                Some(path) => options.image = Some(path),
                None => usage(),
            },
            "--steps" => match args.next().and_then(|v| v.parse().ok()) {
                Some(value) => options.steps = Some(value),
                None => usage(),
            },
            "--serve" => options.serve = true,
            _ => usage(),
        }
    }

    options
}

fn main() {
    let options = parse_options();

    if options.serve {
        let runtime = match tokio::runtime::Runtime::new() {
            Ok(runtime) => runtime,
            Err(err) => {
                eprintln!("failed to start async runtime: {}", err);
                process::exit(1);
            }
        };
        runtime.block_on(run_server());
        return;
    }

    let mut memory = Memory::new(options.memsize);
    if let Some(path) = &options.image {
        match fs::read(path) {
            Ok(image) => memory.load_image(&image),
            Err(err) => {
                eprintln!("failed to read image {}: {}", path, err);
                process::exit(1);
            }
        }
    }

    let mut cpu = CPU::new();
    let mut traps = HaltOnTrap;

    print!("{}", cpu.dump(&memory));

    let result = match options.steps {
        Some(limit) => {
            let mut outcome = Ok(());
            for _ in 0..limit {
                if cpu.is_halted() {
                    break;
                }
                outcome = cpu.step(&mut memory, &mut traps);
                if outcome.is_err() {
                    break;
                }
            }
            outcome
        }
        None => cpu.run(&mut memory, &mut traps),
    };

    if let Err(err) = result {
        eprintln!("machine fault: {}", err);
        print!("{}", cpu.dump(&memory));
        process::exit(1);
    }

    print!("{}", cpu.dump(&memory));
}
