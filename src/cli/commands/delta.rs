//! delta command - Dump and produce svndiff streams

use std::fs;
use std::path::Path;

use super::print_json;
use crate::cli::args::DeltaDumpArgs;
use crate::cli::Context;
use crate::delta::{apply_windows, decode_delta, delta_windows, encode_delta, md5_hex, Instruction, Window};
use anyhow::{Context as _, Result};
use serde_json::json;

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("cannot read {}", path.display()))
}

fn describe(op: &Instruction) -> String {
    match *op {
        Instruction::Source { offset, len } => format!("source {len}@{offset}"),
        Instruction::Target { offset, len } => format!("target {len}@{offset}"),
        Instruction::New { len } => format!("new {len}"),
    }
}

fn window_json(index: usize, w: &Window) -> serde_json::Value {
    json!({
        "index": index,
        "sview_offset": w.sview_offset,
        "sview_len": w.sview_len,
        "tview_len": w.tview_len,
        "new_data_len": w.new_data.len(),
        "ops": w.ops.iter().map(describe).collect::<Vec<_>>(),
    })
}

/// List the windows of a stream, optionally applying it to a source text.
pub fn dump(ctx: &Context, args: &DeltaDumpArgs) -> Result<()> {
    let windows = decode_delta(&read(&args.input)?)
        .with_context(|| format!("{} is not a valid svndiff stream", args.input.display()))?;

    let applied = if args.source.is_some() || args.output.is_some() {
        let source = match &args.source {
            Some(path) => read(path)?,
            None => Vec::new(),
        };
        let text = apply_windows(&source, &windows)?;
        if let Some(out) = &args.output {
            fs::write(out, &text).with_context(|| format!("cannot write {}", out.display()))?;
        }
        Some(text)
    } else {
        None
    };

    if ctx.json {
        let mut doc = json!({
            "windows": windows.iter().enumerate().map(|(i, w)| window_json(i, w)).collect::<Vec<_>>(),
        });
        if let Some(text) = &applied {
            doc["target_len"] = json!(text.len());
            doc["target_md5"] = json!(md5_hex(text));
        }
        return print_json(&doc);
    }

    println!("Windows: {}", windows.len());
    for (i, w) in windows.iter().enumerate() {
        println!(
            "#{i}: source {}+{} -> {} bytes, {} new",
            w.sview_offset,
            w.sview_len,
            w.tview_len,
            w.new_data.len()
        );
        for op in &w.ops {
            println!("    {}", describe(op));
        }
    }
    if let Some(text) = &applied {
        println!("Target: {} bytes, md5 {}", text.len(), md5_hex(text));
    }
    Ok(())
}

/// Write an svndiff stream turning `source` (or nothing) into `input`.
pub fn encode(ctx: &Context, input: &Path, source: Option<&Path>, output: &Path) -> Result<()> {
    let target = read(input)?;
    let source = match source {
        Some(path) => read(path)?,
        None => Vec::new(),
    };
    let windows = delta_windows(&source, &target);
    let bytes = encode_delta(&windows);
    fs::write(output, &bytes).with_context(|| format!("cannot write {}", output.display()))?;
    let md5 = md5_hex(&target);
    if ctx.json {
        return print_json(&json!({
            "windows": windows.len(),
            "bytes": bytes.len(),
            "target_md5": md5,
        }));
    }
    println!("Wrote {} windows ({} bytes), md5 {md5}", windows.len(), bytes.len());
    Ok(())
}
