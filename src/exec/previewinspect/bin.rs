use std::{env, fs, path::PathBuf, process};

use image::DynamicImage;
use koma::{
    AssetLibrary, AssetRecord, PersistedPreview, RDBView, StillPreview, atlas_to_image, decode,
};

fn main() {
    tracing_subscriber::fmt::init();

    if let Err(err) = run() {
        eprintln!("{err}");
        process::exit(1);
    }
}

struct Args {
    path: PathBuf,
    asset: Option<String>,
    export: Option<PathBuf>,
    still: Option<PathBuf>,
}

fn parse_args(program: &str, rest: Vec<String>) -> Result<Option<Args>, String> {
    let mut path: Option<PathBuf> = None;
    let mut asset: Option<String> = None;
    let mut export: Option<PathBuf> = None;
    let mut still: Option<PathBuf> = None;

    let mut iter = rest.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage(program);
                return Ok(None);
            }
            "--asset" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--asset requires an asset name".to_string())?;
                asset = Some(value);
            }
            "--export" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--export requires an output path".to_string())?;
                export = Some(PathBuf::from(value));
            }
            "--still" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--still requires an output path".to_string())?;
                still = Some(PathBuf::from(value));
            }
            _ => {
                if path.is_none() {
                    path = Some(PathBuf::from(arg));
                } else {
                    print_usage(program);
                    return Err(format!("unexpected argument: {arg}"));
                }
            }
        }
    }

    let Some(path) = path else {
        print_usage(program);
        return Err("missing library file path".to_string());
    };

    if asset.is_none() && (export.is_some() || still.is_some()) {
        return Err("--export and --still need --asset".to_string());
    }

    Ok(Some(Args {
        path,
        asset,
        export,
        still,
    }))
}

fn run() -> Result<(), String> {
    let mut args = env::args();
    let program = args
        .next()
        .unwrap_or_else(|| "previewinspect".to_string());

    let Some(args) = parse_args(&program, args.collect())? else {
        return Ok(());
    };

    let view = RDBView::load(&args.path)
        .map_err(|err| format!("failed to open {}: {err}", args.path.display()))?;
    let entries = view.entries();

    println!("File: {}", args.path.display());
    if let Ok(meta) = fs::metadata(&args.path) {
        println!("Size: {} bytes", meta.len());
    }
    println!("Assets: {}", entries.len());

    let library = AssetLibrary::open(&args.path)
        .map_err(|err| format!("failed to read records: {err}"))?;

    if entries.is_empty() {
        println!("(no assets)");
    } else {
        let name_width = entries
            .iter()
            .map(|entry| entry.name.len())
            .max()
            .unwrap_or(4)
            .clamp(4, 48);
        println!(
            "\n{:<name_width$}  {:<9}  {:>6}  {:>5}  {:>6}  {:>12}  {:<5}",
            "Name", "Kind", "Frames", "Rows", "Canvas", "Length", "Still",
        );
        println!(
            "{:-<name_width$}  {:-<9}  {:->6}  {:->5}  {:->6}  {:->12}  {:-<5}",
            "", "", "", "", "", "", "",
        );

        for entry in &entries {
            let Some(record) = library.get(&entry.name) else {
                continue;
            };
            let (frames, rows, canvas) = match &record.preview {
                Some(p) => (
                    p.frames_total.to_string(),
                    p.frames_rows.to_string(),
                    canvas_side(p).to_string(),
                ),
                None => ("-".into(), "-".into(), "-".into()),
            };
            println!(
                "{:<name_width$}  {:<9}  {:>6}  {:>5}  {:>6}  {:>12}  {:<5}",
                truncated_name(&entry.name, name_width),
                format!("{:?}", record.kind),
                frames,
                rows,
                canvas,
                entry.len,
                if record.still.is_some() { "yes" } else { "no" },
            );
        }

        let total_bytes: u64 = entries.iter().map(|entry| entry.len).sum();
        println!("\nTotal payload bytes: {total_bytes}");
    }

    if let Some(name) = &args.asset {
        let record = library
            .get(name)
            .ok_or_else(|| format!("asset '{name}' not found"))?;
        describe(record);

        if let Some(out) = &args.export {
            export_atlas(record, out)?;
            println!("Atlas written to {}", out.display());
        }
        if let Some(out) = &args.still {
            let still = record
                .still
                .as_ref()
                .ok_or_else(|| format!("asset '{name}' has no still preview"))?;
            export_still(still, out)?;
            println!("Still written to {}", out.display());
        }
    }

    Ok(())
}

fn describe(record: &AssetRecord) {
    println!("\nAsset: {}", record.name);
    println!("  Kind: {:?}", record.kind);
    match &record.preview {
        Some(p) => {
            println!("  Frames: {}", p.frames_total);
            println!("  Tiles per row: {}", p.frames_rows);
            println!("  Tile size: {}px", p.frame_size);
            println!("  Buffer: {} floats ({} bytes)", p.buffer_size, p.blob.len());
        }
        None => println!("  (no animation preview)"),
    }
}

fn export_atlas(record: &AssetRecord, out: &PathBuf) -> Result<(), String> {
    let persisted = record
        .preview
        .as_ref()
        .ok_or_else(|| format!("asset '{}' has no animation preview", record.name))?;
    let atlas = decode(persisted, &record.name).map_err(|err| err.to_string())?;
    let image = atlas_to_image(&atlas).map_err(|err| err.to_string())?;
    DynamicImage::ImageRgba32F(image)
        .to_rgba8()
        .save(out)
        .map_err(|err| format!("failed to write {}: {err}", out.display()))
}

fn export_still(still: &StillPreview, out: &PathBuf) -> Result<(), String> {
    let mut image = image::Rgba32FImage::from_raw(still.size, still.size, still.pixels.clone())
        .ok_or_else(|| "still preview has the wrong pixel count".to_string())?;
    image::imageops::flip_vertical_in_place(&mut image);
    DynamicImage::ImageRgba32F(image)
        .to_rgba8()
        .save(out)
        .map_err(|err| format!("failed to write {}: {err}", out.display()))
}

fn print_usage(program: &str) {
    println!("Usage: {program} <LIBRARY_RDB> [--asset <NAME>] [--export <PNG>] [--still <PNG>]");
    println!("\nOptions:");
    println!("  --asset <NAME>   Show the stored previews of one asset");
    println!("  --export <PNG>   Write the asset's animation atlas as an 8-bit PNG");
    println!("  --still <PNG>    Write the asset's still preview as an 8-bit PNG");
    println!("  -h, --help       Show this help message");
}

fn truncated_name(name: &str, width: usize) -> String {
    if name.len() <= width {
        name.to_string()
    } else if width <= 1 {
        "…".to_string()
    } else {
        let mut truncated = name.chars().take(width - 1).collect::<String>();
        truncated.push('…');
        truncated
    }
}

/// Canvas side as stored. Record scalars are unchecked, so widen first.
fn canvas_side(preview: &PersistedPreview) -> u64 {
    u64::from(preview.frame_size) * u64::from(preview.frames_rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canvas_side_survives_huge_records() {
        let preview = PersistedPreview {
            blob: Vec::new(),
            buffer_size: 0,
            frames_total: 1,
            frames_rows: u32::MAX,
            frame_size: u32::MAX,
        };
        assert_eq!(canvas_side(&preview), u64::from(u32::MAX) * u64::from(u32::MAX));
    }
}
