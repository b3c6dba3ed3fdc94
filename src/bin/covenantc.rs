//! The `covenantc` command-line front door (spec.md §6, SPEC_FULL.md
//! §6 **[AMBIENT]**). Since the tokenizer/parser is out of scope
//! (spec.md §1), source files are read as the JSON wire format
//! [`covenant::wire`] understands rather than Covenant surface syntax.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser;
use covenant::config::{CompilerConfig, EvmVersion};
use covenant::driver::{self, CompileArtifacts};
use covenant::span::FileSpan;
use covenant::{report, wire};

const KNOWN_FORMATS: &[&str] = &[
  "bytecode", "bytecode_runtime", "abi", "asm", "opcodes", "opcodes_runtime",
  "method_identifiers", "layout", "source_map", "combined_json", "ir", "ir_json",
  "opt_ir", "interface", "external_interface",
];

/// Compile Covenant programs (given as pre-parsed JSON, see `covenant::wire`)
/// to EVM-like bytecode.
#[derive(Parser)]
#[command(name = "covenantc", version, about)]
struct Args {
  /// JSON source files, one compilation unit each.
  #[arg(required = true)]
  inputs: Vec<PathBuf>,

  /// Comma-separated output formats.
  #[arg(short = 'f', long = "format", default_value = "bytecode", value_delimiter = ',')]
  format: Vec<String>,

  /// Target opcode table version.
  #[arg(long = "evm-version", default_value = "shanghai")]
  evm_version: String,

  /// Disable the IR optimizer.
  #[arg(long = "no-optimize")]
  no_optimize: bool,

  /// A JSON `{name: slot}` object overriding the declaration-order
  /// storage layout codegen would otherwise assign.
  #[arg(long = "storage-layout-file")]
  storage_layout_file: Option<PathBuf>,
}

fn main() -> ExitCode {
  let args = Args::parse();

  let filter = tracing_subscriber::EnvFilter::try_from_env("COVENANT_LOG")
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
  tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

  for name in &args.format {
    if !KNOWN_FORMATS.contains(&name.as_str()) {
      eprintln!("covenantc: unknown --format `{name}` (known: {})", KNOWN_FORMATS.join(", "));
      return ExitCode::from(2);
    }
  }

  let Some(evm_version) = EvmVersion::parse(&args.evm_version) else {
    eprintln!("covenantc: unknown --evm-version `{}`", args.evm_version);
    return ExitCode::from(2);
  };

  let storage_layout = match load_storage_layout(args.storage_layout_file.as_deref()) {
    Ok(layout) => layout,
    Err(msg) => {
      eprintln!("covenantc: {msg}");
      return ExitCode::from(2);
    }
  };

  let config = CompilerConfig { evm_version, optimize: !args.no_optimize, storage_layout };

  let mut any_failed = false;
  for path in &args.inputs {
    let source = match std::fs::read_to_string(path) {
      Ok(s) => s,
      Err(e) => {
        eprintln!("covenantc: cannot read {}: {e}", path.display());
        return ExitCode::from(2);
      }
    };
    let file = FileSpan::synthetic(Rc::from(path.to_string_lossy().as_ref()));
    match wire::parse_module(&source, &file).and_then(|module| driver::compile_module(&module, &file, &config)) {
      Ok(artifacts) => print_formats(path, &args.format, &artifacts),
      Err(err) => {
        eprintln!("{err}");
        any_failed = true;
      }
    }
  }

  if any_failed { ExitCode::from(1) } else { ExitCode::SUCCESS }
}

fn load_storage_layout(path: Option<&std::path::Path>) -> Result<Option<hashbrown::HashMap<covenant::symbol::Symbol, u64>>, String> {
  let Some(path) = path else { return Ok(None) };
  let text = std::fs::read_to_string(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
  let raw: BTreeMap<String, u64> = serde_json::from_str(&text)
    .map_err(|e| format!("invalid --storage-layout-file JSON in {}: {e}", path.display()))?;
  Ok(Some(raw.into_iter().map(|(name, slot)| (covenant::symbol::intern(&name), slot)).collect()))
}

/// The input file's stem, used as the `interface <Name>:` block name for
/// `--format external_interface` (there's no in-language contract name since
/// the wire format carries only declarations, not a module title).
fn contract_name(path: &std::path::Path) -> String {
  path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "Contract".to_string())
}

fn print_formats(path: &std::path::Path, formats: &[String], artifacts: &CompileArtifacts) {
  let multi = formats.len() > 1;
  for format in formats {
    if multi { println!("===> {} [{format}]", path.display()); }
    match format.as_str() {
      "bytecode" => println!("{}", report::hex_bytecode(artifacts.deploy_bytecode())),
      "bytecode_runtime" => println!("{}", report::hex_bytecode(artifacts.runtime_bytecode())),
      "opcodes" => println!("{}", report::opcodes(artifacts.deploy_bytecode())),
      "opcodes_runtime" | "asm" => println!("{}", report::opcodes(artifacts.runtime_bytecode())),
      "abi" => println!("{}", serde_json::to_string_pretty(&report::abi(artifacts)).expect("abi json")),
      "method_identifiers" => println!("{}", serde_json::to_string_pretty(&report::method_identifiers(artifacts)).expect("method id json")),
      "layout" => println!("{}", serde_json::to_string_pretty(&report::layout(artifacts)).expect("layout json")),
      "source_map" => println!("{}", serde_json::to_string_pretty(&report::source_map(artifacts)).expect("source map json")),
      "combined_json" => println!("{}", serde_json::to_string_pretty(&report::combined_json(artifacts)).expect("combined json")),
      "ir" => println!("{:#?}", artifacts.runtime_ir),
      "ir_json" => println!("{}", serde_json::to_string_pretty(&report::ir_json(&artifacts.runtime_ir)).expect("ir json")),
      "opt_ir" => println!("{:#?}", artifacts.optimized_runtime_ir),
      "interface" => println!("{}", report::interface(artifacts)),
      "external_interface" => println!("{}", report::external_interface(artifacts, &contract_name(path))),
      other => unreachable!("format `{other}` passed validation but isn't rendered"),
    }
  }
}

