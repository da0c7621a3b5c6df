use std::env;
use std::path::PathBuf;

use dicomforge_generate::{GenerateOptions, GenerationEngine};
use dicomforge_plan::load_request;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = env::args().skip(1);
    let mut request_path: Option<PathBuf> = None;
    let mut out_dir: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--request" => request_path = args.next().map(PathBuf::from),
            "--out" => out_dir = args.next().map(PathBuf::from),
            _ => {
                if request_path.is_none() {
                    request_path = Some(PathBuf::from(arg));
                } else {
                    return Err("unexpected argument".into());
                }
            }
        }
    }

    let request_path = request_path.ok_or("missing --request path")?;
    let validated = load_request(&request_path)?;

    let mut options = GenerateOptions::default();
    if let Some(out_dir) = out_dir {
        options.output_root = out_dir;
    }

    let result = GenerationEngine::new(options).run(&validated.request)?;
    println!(
        "root={} images={} bytes={}",
        result.report.output_root.display(),
        result.report.images,
        result.report.bytes_written
    );
    Ok(())
}
