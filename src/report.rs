//! **[AMBIENT]** Output-format rendering for the CLI (spec.md §6): turns
//! a finished [`crate::driver::CompileArtifacts`] into the JSON/text
//! shapes `--format` asks for. Kept separate from [`crate::driver`] so
//! the driver stays about compiling, not about serializing the result.

use serde_json::{json, Value};
use crate::assembler;
use crate::driver::CompileArtifacts;
use crate::semantics::FunctionSig;
use crate::types::Mutability;

fn mutability_name(m: Mutability) -> &'static str {
  match m {
    Mutability::Pure => "pure",
    Mutability::View => "view",
    Mutability::NonPayable => "nonpayable",
    Mutability::Payable => "payable",
  }
}

/// The standard ABI JSON array (spec.md §6 "ABI output"): one entry per
/// external function and per declared event, plus the legacy
/// `constant`/`payable` boolean fields kept for older tooling.
#[must_use] pub fn abi(artifacts: &CompileArtifacts) -> Value {
  let mut entries = Vec::new();
  for sig in &artifacts.abi_functions {
    let inputs: Vec<Value> = sig.args.iter()
      .map(|(name, ty)| json!({ "name": name.to_string(), "type": crate::types::abi::selector_name(ty) }))
      .collect();
    let outputs: Vec<Value> = sig.ret.iter()
      .map(|ty| json!({ "name": "", "type": crate::types::abi::selector_name(ty) }))
      .collect();
    entries.push(json!({
      "type": "function",
      "name": sig.name.to_string(),
      "inputs": inputs,
      "outputs": outputs,
      "stateMutability": mutability_name(sig.mutability),
      "constant": matches!(sig.mutability, Mutability::Pure | Mutability::View),
      "payable": matches!(sig.mutability, Mutability::Payable),
    }));
  }
  for sig in &artifacts.abi_events {
    let inputs: Vec<Value> = sig.fields.iter()
      .map(|(name, ty, indexed)| json!({
        "name": name.to_string(), "type": crate::types::abi::selector_name(ty), "indexed": indexed,
      }))
      .collect();
    entries.push(json!({ "type": "event", "name": sig.name.to_string(), "inputs": inputs, "anonymous": false }));
  }
  Value::Array(entries)
}

/// `<selector_sig> -> "0x"+hex(method_id)` for every external function
/// (`--format method_identifiers`).
#[must_use] pub fn method_identifiers(artifacts: &CompileArtifacts) -> Value {
  let mut map = serde_json::Map::new();
  for sig in &artifacts.abi_functions {
    let canonical = format!("{}({})", sig.name, sig.args.iter().map(|(_, ty)| crate::types::abi::selector_name(ty)).collect::<Vec<_>>().join(","));
    let id = crate::types::abi::method_id(&canonical);
    map.insert(canonical, Value::String(format!("0x{}", hex::encode(id))));
  }
  Value::Object(map)
}

/// `{variable_name: storage_slot}` (`--format layout`).
#[must_use] pub fn layout(artifacts: &CompileArtifacts) -> Value {
  json!({ "storage_layout": artifacts.storage_layout })
}

/// `{pc_pos_map, pc_breakpoints, error_map}` over the full deploy
/// bytecode (spec.md §6 "Source map"). `error_map` is empty until the
/// assembler tags individual revert sites with a reason.
#[must_use] pub fn source_map(artifacts: &CompileArtifacts) -> Value {
  let mut pc_pos_map = serde_json::Map::new();
  let mut breakpoints = Vec::new();
  for (pc, span) in &artifacts.assembled.pc_pos_map {
    pc_pos_map.insert(pc.to_string(), json!([span.start_line, span.start_col, span.end_line, span.end_col]));
    breakpoints.push(*pc);
  }
  json!({ "pc_pos_map": pc_pos_map, "pc_breakpoints": breakpoints, "error_map": {} })
}

/// Hex-encoded bytecode with a `0x` prefix (spec.md §6 "Bytecode output").
#[must_use] pub fn hex_bytecode(bytes: &[u8]) -> String {
  format!("0x{}", hex::encode(bytes))
}

/// Space-separated mnemonic stream (`--format opcodes`/`opcodes_runtime`/`asm`).
#[must_use] pub fn opcodes(bytes: &[u8]) -> String {
  assembler::disassemble(bytes).join(" ")
}

/// Every `--format combined_json`-bundled artifact in one object.
#[must_use] pub fn combined_json(artifacts: &CompileArtifacts) -> Value {
  json!({
    "abi": abi(artifacts),
    "method_identifiers": method_identifiers(artifacts),
    "bytecode": hex_bytecode(artifacts.deploy_bytecode()),
    "bytecode_runtime": hex_bytecode(artifacts.runtime_bytecode()),
    "source_map": source_map(artifacts),
    "layout": layout(artifacts),
  })
}

/// One IR tree as JSON (`--format ir_json`). [`crate::ir::IrNode`] carries
/// `Rc`-shared, non-`Serialize` children, so this walks it by hand rather
/// than going through `serde_json::to_value`.
#[must_use] pub fn ir_json(node: &crate::ir::IrNode) -> Value {
  use crate::ir::IrValue;
  let args: Vec<Value> = node.args.iter().map(|a| ir_json(a)).collect();
  match &node.value {
    IrValue::Op(op) => json!({ "op": crate::ir::opcodes::mnemonic(*op), "args": args }),
    IrValue::Int(v) => json!({ "op": "int", "value": v.to_string() }),
    IrValue::Seq => json!({ "op": "seq", "args": args }),
    IrValue::With(sym) => json!({ "op": "with", "var": sym.to_string(), "args": args }),
    IrValue::If => json!({ "op": "if", "args": args }),
    IrValue::Repeat => json!({ "op": "repeat", "args": args }),
    IrValue::Goto(label) => json!({ "op": "goto", "label": label.to_string(), "args": args }),
    IrValue::ExitTo(label) => json!({ "op": "exit_to", "label": label.to_string(), "args": args }),
    IrValue::Label(name) => json!({ "op": "label", "name": name.to_string(), "args": args }),
    IrValue::VarList(vars) => json!({ "op": "var_list", "vars": vars.iter().map(ToString::to_string).collect::<Vec<_>>() }),
    IrValue::Multi => json!({ "op": "multi", "args": args }),
    IrValue::Pass => json!({ "op": "pass" }),
    IrValue::Deploy(immutables_size) => json!({ "op": "deploy", "immutables_size": immutables_size, "args": args }),
  }
}

fn function_stub(sig: &FunctionSig) -> String {
  let args = sig.args.iter().map(|(name, ty)| format!("{name}: {}", crate::types::abi::selector_name(ty))).collect::<Vec<_>>().join(", ");
  let ret = sig.ret.as_ref().map(|ty| format!(" -> {}", crate::types::abi::selector_name(ty))).unwrap_or_default();
  format!("def {}({args}){ret}: {}", sig.name, mutability_name(sig.mutability))
}

/// One copy-pasteable `def name(args) -> ret: mutability` stub per external
/// function (`--format interface`).
#[must_use] pub fn interface(artifacts: &CompileArtifacts) -> String {
  artifacts.abi_functions.iter().map(|sig| function_stub(sig)).collect::<Vec<_>>().join("\n")
}

/// The same stubs wrapped in a named `interface <name>:` block
/// (`--format external_interface`).
#[must_use] pub fn external_interface(artifacts: &CompileArtifacts, name: &str) -> String {
  let mut out = format!("# External Interfaces\ninterface {name}:\n");
  for sig in &artifacts.abi_functions {
    out.push_str("    ");
    out.push_str(&function_stub(sig));
    out.push('\n');
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::CompilerConfig;
  use crate::span::FileSpan;
  use crate::{driver, wire};

  fn compile(json: &str) -> CompileArtifacts {
    let file = FileSpan::synthetic(std::rc::Rc::from("t.cov"));
    let module = wire::parse_module(json, &file).unwrap();
    driver::compile_module(&module, &file, &CompilerConfig::new()).unwrap()
  }

  fn sample() -> CompileArtifacts {
    compile(r#"{
      "decls": [
        { "kind": "function", "name": "get_balance", "external": true, "mutability": "view",
          "ret": { "kind": "name", "name": "uint256" },
          "args": [ { "name": "who", "ty": { "kind": "name", "name": "address" } } ],
          "body": [ { "kind": "return", "values": [ { "kind": "int_lit", "value": 0 } ] } ] }
      ]
    }"#)
  }

  #[test]
  fn ir_json_renders_every_op_node_with_its_mnemonic() {
    let artifacts = sample();
    let rendered = ir_json(&artifacts.runtime_ir);
    let text = rendered.to_string();
    assert!(text.contains("CALLDATALOAD"), "{text}");
  }

  #[test]
  fn interface_emits_one_def_stub_per_external_function() {
    let artifacts = sample();
    let text = interface(&artifacts);
    assert_eq!(text, "def get_balance(who: address) -> uint256: view");
  }

  #[test]
  fn external_interface_wraps_the_stubs_in_a_named_block() {
    let artifacts = sample();
    let text = external_interface(&artifacts, "Token");
    assert!(text.starts_with("# External Interfaces\ninterface Token:\n"), "{text}");
    assert!(text.contains("    def get_balance(who: address) -> uint256: view\n"), "{text}");
  }
}
