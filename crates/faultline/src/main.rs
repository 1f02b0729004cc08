use std::error::Error;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use faultline_core::format::{format_record, LineBuffer};
use faultline_core::resolve::resolve_frame;
use faultline_core::session::{DebugInfoSession, DwarfSession};
use faultline_core::types::{Address, ModuleRef, ProcessId};
use faultline_core::writer::{FdWriter, RawOutput};
use faultline_core::{install, trace_current_thread, DumpOutcome, Installation};
use faultline_utils::{info, init_logging, init_logging_with_level, warn, LogFormat, LogLevel};

/// Symbolized backtraces on fatal signals.
#[derive(Parser, Debug)]
#[command(name = "faultline")]
#[command(version)]
#[command(about = "Symbolized backtraces on fatal signals", long_about = None)]
struct Cli
{
    /// Log level (overrides RUST_LOG)
    #[arg(long, global = true, value_parser = parse_level)]
    log_level: Option<LogLevel>,

    /// Log format: pretty or json (overrides FAULTLINE_LOG_FORMAT)
    #[arg(long, global = true, value_parser = parse_format)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// List the modules mapped into this process
    Modules,
    /// Resolve addresses inside this process
    Resolve
    {
        /// Addresses (hex with 0x prefix, or decimal)
        #[arg(required = true, value_parser = parse_address)]
        addresses: Vec<Address>,
    },
    /// Print the current stack
    Trace,
    /// Install the handlers, then fault on purpose
    Crash
    {
        /// Kind of fault to trigger
        #[arg(value_enum)]
        kind: CrashKind,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum CrashKind
{
    /// raise(SIGSEGV)
    Segv,
    /// Read through an invalid pointer
    NullDeref,
    /// raise(SIGBUS)
    Bus,
    /// raise(SIGFPE)
    Fpe,
    /// abort()
    Abort,
    /// Unbounded recursion
    StackOverflow,
}

fn parse_level(value: &str) -> Result<LogLevel, String>
{
    value.parse().map_err(|err: faultline_utils::LoggingError| err.to_string())
}

fn parse_format(value: &str) -> Result<LogFormat, String>
{
    value.parse().map_err(|err: faultline_utils::LoggingError| err.to_string())
}

fn parse_address(value: &str) -> Result<Address, String>
{
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse::<u64>(),
    };
    parsed
        .map(Address::new)
        .map_err(|err| format!("invalid address '{value}': {err}"))
}

fn main()
{
    let cli = Cli::parse();

    // Explicit flags win over the environment; otherwise RUST_LOG and
    // FAULTLINE_LOG_FORMAT apply.
    let logging = if cli.log_level.is_some() || cli.log_format.is_some() {
        init_logging_with_level(
            cli.log_level.unwrap_or_default(),
            cli.log_format.unwrap_or_default(),
        )
    } else {
        init_logging()
    };
    let _log_guard = match logging {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run_command(cli.command) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run_command(command: Commands) -> Result<(), Box<dyn Error>>
{
    match command {
        Commands::Modules => print_modules(),
        Commands::Resolve { addresses } => resolve_addresses(&addresses),
        Commands::Trace => {
            let mut out = FdWriter::stdout();
            match trace_current_thread(&mut out)? {
                DumpOutcome::Complete { frames } => {
                    info!(frames, "stack printed");
                    Ok(())
                }
                other => Err(format!("trace incomplete: {other:?}").into()),
            }
        }
        Commands::Crash { kind } => {
            match install() {
                Installation::Armed { signals, .. } => info!(signals, "handlers armed, crashing with {kind:?}"),
                Installation::Disabled(reason) => warn!(?reason, "handlers not armed, crashing anyway"),
            }
            crash(kind);
            Err("fault did not terminate the process".into())
        }
    }
}

fn print_modules() -> Result<(), Box<dyn Error>>
{
    let session = DwarfSession::open(ProcessId::current())?;

    println!("{:<39}  {:<18}  {:<5}  {:>7}  module", "range", "load base", "exec", "symbols");
    for (index, slot) in session.modules().iter().enumerate() {
        let image = session.image(ModuleRef(index));
        let base = slot.load_base().map_or_else(|| "-".to_string(), |base| format!("{base:#018x}"));
        let symbols = image.map_or_else(|| "-".to_string(), |image| image.symbol_count().to_string());
        println!(
            "{:#018x}-{:#018x}  {:<18}  {:<5}  {:>7}  {}{}",
            slot.start(),
            slot.end(),
            base,
            if slot.is_executable() { "yes" } else { "no" },
            symbols,
            slot.path(),
            if image.is_some_and(|image| image.has_line_info()) {
                " [lines]"
            } else {
                ""
            },
        );
    }
    Ok(())
}

fn resolve_addresses(addresses: &[Address]) -> Result<(), Box<dyn Error>>
{
    let pid = ProcessId::current();
    let mut session = DwarfSession::open(pid)?;
    session.enumerate_modules(pid)?;

    let mut out = FdWriter::stdout();
    let mut line = LineBuffer::new();
    for (position, address) in addresses.iter().enumerate() {
        let record = resolve_frame(&session, position + 1, *address);
        format_record(&mut line, &record);
        out.write_bytes(line.as_bytes());
    }
    Ok(())
}

fn crash(kind: CrashKind)
{
    match kind {
        CrashKind::Segv => raise(libc::SIGSEGV),
        CrashKind::Bus => raise(libc::SIGBUS),
        CrashKind::Fpe => raise(libc::SIGFPE),
        CrashKind::Abort => process::abort(),
        CrashKind::NullDeref => {
            let invalid = std::hint::black_box(0x8usize) as *const u8;
            // SAFETY: none; faulting here is the point.
            let value = unsafe { std::ptr::read_volatile(invalid) };
            println!("read {value} from {invalid:p}");
        }
        CrashKind::StackOverflow => {
            let depth = recurse(std::hint::black_box(0));
            println!("recursion returned at depth {depth}");
        }
    }
}

fn raise(signal: libc::c_int)
{
    // SAFETY: raise(3) has no memory-safety preconditions.
    unsafe {
        libc::raise(signal);
    }
}

#[allow(unconditional_recursion)]
#[inline(never)]
fn recurse(depth: u64) -> u64
{
    let frame = std::hint::black_box([depth; 64]);
    recurse(frame[0] + 1) + frame[63]
}
