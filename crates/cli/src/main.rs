use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use ollyscript::commands::{
    add_binary_command, disasm_command, import_map_command, init_project_command,
    list_binaries_command, list_imports_command, list_labels_command, module_info_command,
    project_info_command, run_script_command, sections_command,
};
use ollyscript::parse_address;
use tracing_subscriber::EnvFilter;

/// Scripting and symbol import for debugger projects.
///
/// This CLI is a thin wrapper around `ollyscript-core` (exposed in code as `ollyscript_core`).
/// Binaries are inspected offline through their PE image; labels imported from
/// IDA maps or created by scripts are kept in the project database.
#[derive(Parser, Debug)]
#[command(
    name = "ollyscript",
    version,
    about = "Debugger scripting and IDA map symbol import",
    long_about = None
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). `OLLYSCRIPT_LOG` takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a new project at the given root.
    ///
    /// This will:
    /// - Create a `.ollyscript` metadata directory.
    /// - Create `maps` and `scripts` directories.
    /// - Write a `.ollyscript/project.json` config file and the project database.
    InitProject {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Optional project name. If omitted, the name is derived from the root directory.
        #[arg(long)]
        name: Option<String>,
    },

    /// Show basic information about an existing project.
    ProjectInfo {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Register a PE binary in the project database.
    AddBinary {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Path to the binary to register.
        #[arg(long)]
        path: String,

        /// Optional human-friendly name. Defaults to the file name.
        #[arg(long)]
        name: Option<String>,

        /// Optional architecture override. Defaults to the machine type in the header.
        #[arg(long)]
        arch: Option<String>,

        /// Optional precomputed hash. If omitted, the CLI computes SHA-256 unless `--skip-hash` is set.
        #[arg(long)]
        hash: Option<String>,

        /// Skip hash computation (stores no hash).
        #[arg(long, default_value_t = false)]
        skip_hash: bool,
    },

    /// List all binaries registered in the project database.
    ListBinaries {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List the sections of a registered binary.
    Sections {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Registered binary name.
        #[arg(long)]
        binary: String,

        /// Load base to rebase sections onto (`0x` for hex).
        #[arg(long, value_parser = parse_base)]
        base: Option<u64>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show the main module of a registered binary.
    ModuleInfo {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Registered binary name.
        #[arg(long)]
        binary: String,

        /// Load base to rebase the module onto (`0x` for hex).
        #[arg(long, value_parser = parse_base)]
        base: Option<u64>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Disassemble instructions from a registered binary.
    Disasm {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Registered binary name.
        #[arg(long)]
        binary: String,

        /// Start address (`0x` for hex). Defaults to the entry point.
        #[arg(long)]
        address: Option<String>,

        /// Number of instructions to decode.
        #[arg(long, default_value_t = 10)]
        count: usize,

        /// Load base (`0x` for hex).
        #[arg(long, value_parser = parse_base)]
        base: Option<u64>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Import symbols from an IDA `.map` file as user labels.
    ///
    /// Relative map paths are looked up under the project root, then `maps/`.
    ImportMap {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Registered binary name.
        #[arg(long)]
        binary: String,

        /// Path to the `.map` file.
        #[arg(long)]
        map: String,

        /// Load base the map addresses are resolved against (`0x` for hex).
        #[arg(long, value_parser = parse_base)]
        base: Option<u64>,

        /// Skip malformed symbol lines instead of aborting.
        #[arg(long, default_value_t = false)]
        lenient: bool,

        /// Parse and resolve symbols without writing labels.
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List stored labels and comments.
    ListLabels {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Only show labels for this binary.
        #[arg(long)]
        binary: Option<String>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List recorded map imports.
    ListImports {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Only show imports for this binary.
        #[arg(long)]
        binary: Option<String>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Run a rhai script against a registered binary.
    ///
    /// Relative script paths are looked up under the project root, then `scripts/`.
    RunScript {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Registered binary name.
        #[arg(long)]
        binary: String,

        /// Path to the script.
        #[arg(long)]
        script: String,

        /// Load base (`0x` for hex).
        #[arg(long, value_parser = parse_base)]
        base: Option<u64>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn parse_base(value: &str) -> Result<u64, String> {
    parse_address(value).map_err(|e| e.to_string())
}

/// Install the stderr log subscriber.
fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_env("OLLYSCRIPT_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::InitProject { root, name } => init_project_command(&root, name)?,
        Command::ProjectInfo { root, json } => project_info_command(&root, json)?,
        Command::AddBinary { root, path, name, arch, hash, skip_hash } => {
            add_binary_command(&root, &path, name, arch, hash, skip_hash)?
        }
        Command::ListBinaries { root, json } => list_binaries_command(&root, json)?,
        Command::Sections { root, binary, base, json } => {
            sections_command(&root, &binary, base, json)?
        }
        Command::ModuleInfo { root, binary, base, json } => {
            module_info_command(&root, &binary, base, json)?
        }
        Command::Disasm { root, binary, address, count, base, json } => {
            disasm_command(&root, &binary, address.as_deref(), count, base, json)?;
        }
        Command::ImportMap { root, binary, map, base, lenient, dry_run, json } => {
            import_map_command(&root, &binary, &map, base, lenient, dry_run, json)?;
        }
        Command::ListLabels { root, binary, json } => {
            list_labels_command(&root, binary.as_deref(), json)?
        }
        Command::ListImports { root, binary, json } => {
            list_imports_command(&root, binary.as_deref(), json)?
        }
        Command::RunScript { root, binary, script, base, json } => {
            run_script_command(&root, &binary, &script, base, json)?;
        }
    }

    Ok(())
}
