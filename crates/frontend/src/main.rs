//! xcc frontend CLI
//!
//! Runs the preprocess → lex → parse → analyze pipeline over one input and
//! prints the requested dumps, or a single diagnostic line on failure.

use clap::Parser as ClapParser;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use xcc::{
    DiagFormat, FrontendError, FrontendOptions, Std, compile_source, format_tokens, read_source,
};

#[derive(ClapParser)]
#[command(name = "xcc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run the xcc frontend pipeline on C source input", long_about = None)]
struct Cli {
    /// Path to a C source file, or - to read from stdin
    input: String,

    /// Print the token stream
    #[arg(long)]
    dump_tokens: bool,

    /// Print the parsed AST
    #[arg(long)]
    dump_ast: bool,

    /// Print the semantic model
    #[arg(long)]
    dump_sema: bool,

    /// Print the preprocessed source
    #[arg(long)]
    dump_pp: bool,

    /// Language standard
    #[arg(long, value_enum, default_value_t = Std::C11)]
    std: Std,

    /// Add DIR to the header search path
    #[arg(short = 'I', value_name = "DIR")]
    include_dir: Vec<PathBuf>,

    /// Add DIR to the quoted-include search path
    #[arg(long = "iquote", value_name = "DIR")]
    quote_include_dir: Vec<PathBuf>,

    /// Add DIR to the system header search path
    #[arg(long = "isystem", value_name = "DIR")]
    system_include_dir: Vec<PathBuf>,

    /// Add DIR to the end of the header search path
    #[arg(long = "idirafter", value_name = "DIR")]
    after_include_dir: Vec<PathBuf>,

    /// Define a macro before preprocessing (NAME or NAME=BODY)
    #[arg(short = 'D', value_name = "NAME[=BODY]")]
    define: Vec<String>,

    /// Undefine a macro, including predefined ones
    #[arg(short = 'U', value_name = "NAME")]
    undef: Vec<String>,

    /// Preprocess FILE before the main source
    #[arg(long = "include", value_name = "FILE")]
    forced_include: Vec<PathBuf>,

    /// Apply the macro definitions of FILE, discarding its output
    #[arg(long = "imacros", value_name = "FILE")]
    macro_include: Vec<PathBuf>,

    /// Do not search host SDK include directories
    #[arg(long)]
    no_standard_includes: bool,

    /// Target a freestanding environment (__STDC_HOSTED__ is 0)
    #[arg(long)]
    freestanding: bool,

    /// Diagnostic output format
    #[arg(long, value_enum, default_value_t = DiagFormat::Human)]
    diag_format: DiagFormat,

    /// Treat preprocessor warnings as errors
    #[arg(long)]
    warn_as_error: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    let options = FrontendOptions {
        std: cli.std,
        hosted: !cli.freestanding,
        include_dirs: cli.include_dir,
        quote_include_dirs: cli.quote_include_dir,
        system_include_dirs: cli.system_include_dir,
        after_include_dirs: cli.after_include_dir,
        forced_includes: cli.forced_include,
        macro_includes: cli.macro_include,
        defines: cli.define,
        undefs: cli.undef,
        no_standard_includes: cli.no_standard_includes,
        diag_format: cli.diag_format,
        warn_as_error: cli.warn_as_error,
    };
    let (filename, source) = match read_source(&cli.input) {
        Ok(pair) => pair,
        Err(error) => {
            eprintln!("xcc: I/O error: {}", error);
            return 1;
        }
    };
    let result = match compile_source(&source, &filename, &options) {
        Ok(result) => result,
        Err(error) => {
            report(&error, options.diag_format);
            return 1;
        }
    };
    if cli.dump_pp {
        print!("{}", result.source);
    }
    if cli.dump_tokens {
        for line in format_tokens(&result.tokens) {
            println!("{}", line);
        }
    }
    if cli.dump_ast {
        println!("{:#?}", result.unit);
    }
    if cli.dump_sema {
        println!("{:#?}", result.sema);
    }
    if !(cli.dump_pp || cli.dump_tokens || cli.dump_ast || cli.dump_sema) {
        println!("xcc: ok: {}", result.filename);
    }
    0
}

fn report(error: &FrontendError, format: DiagFormat) {
    match format {
        DiagFormat::Human => eprintln!("{}", error),
        DiagFormat::Json => match serde_json::to_string(error.diagnostic()) {
            Ok(json) => eprintln!("{}", json),
            Err(_) => eprintln!("{}", error),
        },
    }
}
