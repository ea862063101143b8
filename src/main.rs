//! softbreak demo
//!
//! Instruments two small functions, calls them and prints what the
//! breakpoint handlers saw.

use clap::Parser;

/// softbreak: in-process breakpoint demo
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Argument pairs passed to `test` (e.g. --call 3,4)
    #[arg(long = "call", value_parser = parse_pair, default_values = ["1,2", "3,4", "7,5"])]
    calls: Vec<(i32, i32)>,

    /// Hex-dump the first bytes of the instrumented functions before and after
    #[arg(long, default_value_t = false)]
    dump: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_pair(s: &str) -> Result<(i32, i32), String> {
    let (a, b) = s
        .split_once(',')
        .ok_or_else(|| format!("expected A,B but got '{}'", s))?;
    let a = a.trim().parse().map_err(|e| format!("'{}': {}", a, e))?;
    let b = b.trim().parse().map_err(|e| format!("'{}': {}", b, e))?;
    Ok((a, b))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 1. Initialize logger with verbosity level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        match args.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        },
    ))
    .init();

    println!("[*] softbreak v{}", env!("CARGO_PKG_VERSION"));
    demo::run(&args)
}

#[cfg(softbreak_native)]
mod demo {
    use super::Args;
    use colored::Colorize;
    use softbreak::{first_argument, second_argument, TrapContext};

    const DUMP_LEN: usize = 16;

    #[inline(never)]
    pub extern "C" fn pow2(x: i32) -> i32 {
        x.wrapping_mul(x)
    }

    #[inline(never)]
    pub extern "C" fn test(a: i32, b: i32) -> i32 {
        pow2(a).wrapping_add(pow2(b))
    }

    fn pow2_hook(ctx: &TrapContext<'_>) {
        let x = first_argument(ctx) as i32;
        println!("{}", format!("Called pow2({})", x).cyan());
    }

    fn test_hook(ctx: &TrapContext<'_>) {
        let a = first_argument(ctx) as i32;
        let b = second_argument(ctx) as i32;
        println!("{}", format!("Called test({}, {})", a, b).green());
    }

    fn dump(label: &str, address: usize) {
        // SAFETY: reads the first bytes of a function in our own text section.
        let bytes = unsafe { std::slice::from_raw_parts(address as *const u8, DUMP_LEN) };
        println!("    {:<5} {:#014x}  {}", label, address, hex::encode(bytes));
    }

    pub fn run(args: &Args) -> anyhow::Result<()> {
        let test_addr = test as *const () as usize;
        let pow2_addr = pow2 as *const () as usize;
        log::info!("Target: {}", softbreak::NATIVE);
        log::debug!("test at {:#x}, pow2 at {:#x}", test_addr, pow2_addr);

        if args.dump {
            println!("{}", "[*] Before instrumentation".bold());
            dump("test", test_addr);
            dump("pow2", pow2_addr);
        }

        // SAFETY: both addresses are entry points of functions above, and the
        // demo is single-threaded.
        unsafe {
            softbreak::install(test_addr, test_hook);
            softbreak::install(pow2_addr, pow2_hook);
        }

        for &(a, b) in &args.calls {
            let result = test(a, b);
            println!("{}", result.to_string().bold());
        }

        if args.dump {
            println!("{}", "[*] After run (trap slots armed)".bold());
            dump("test", test_addr);
            dump("pow2", pow2_addr);
        }

        if let Some(stats) = softbreak::trap_stats() {
            log::info!(
                "{} hits, {} re-arms, {} undefined",
                stats.hits,
                stats.rearms,
                stats.undefined
            );
        }
        Ok(())
    }
}

#[cfg(not(softbreak_native))]
mod demo {
    use super::Args;

    pub fn run(_args: &Args) -> anyhow::Result<()> {
        anyhow::bail!(
            "breakpoints are not supported on {}-{}",
            std::env::consts::ARCH,
            std::env::consts::OS
        )
    }
}
