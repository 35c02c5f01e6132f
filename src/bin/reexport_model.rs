//! Rewrite a model checkpoint into a graph the installed ONNX Runtime loads directly
//!
//! Loads the model with basic graph optimization, lets the runtime write the
//! optimized graph back out, and checks that the result still looks like a
//! detection model.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use darkcircle_api::config::Config;
use darkcircle_api::model::loader::{self, build_session, LoadError, Optimization};
use darkcircle_api::model::{DetectorSettings, ModelLoader};

#[derive(Debug, Parser)]
#[command(name = "reexport-model", version, about = "Re-export a best*.onnx model for the installed ONNX Runtime")]
struct Args {
    /// Model to re-export (defaults to the best*.onnx found in --dir)
    #[arg(long)]
    model: Option<PathBuf>,

    /// Directory searched when --model is not given
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// Output path (defaults to best_reexported.onnx next to the source)
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "darkcircle_api=info,reexport_model=info".into()),
        )
        .init();

    dotenvy::dotenv().ok();
    let args = Args::parse();

    match run(&args) {
        Ok(output) => {
            println!("✅ Model re-exported successfully to: {}", output.display());
            println!("📝 Move the old model out of the model directory (or set MODEL_DIR) so the server loads this one.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            eprintln!("\n🔧 Possible solutions:");
            for (i, hint) in e.guidance().iter().enumerate() {
                eprintln!("{}. {}", i + 1, hint);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<PathBuf, LoadError> {
    let source = match &args.model {
        Some(path) => path.clone(),
        None => loader::find_best_model(&args.dir)?,
    };
    println!("📦 Found model: {}", source.display());

    let output = args.output.clone().unwrap_or_else(|| {
        source
            .parent()
            .map(|dir| dir.join("best_reexported.onnx"))
            .unwrap_or_else(|| PathBuf::from("best_reexported.onnx"))
    });

    if output == source {
        return Err(LoadError::Deserialize("output path must differ from the source model".to_string()));
    }

    let config = Config::from_env();
    println!("🔄 Loading and re-exporting the model...");
    build_session(&source, Optimization::Basic, config.intra_threads, Some(&output))?;

    // Same checks the server runs at startup
    println!("🔍 Verifying {}...", output.display());
    let verifier = ModelLoader::new(DetectorSettings::from(&config));
    let (detector, strategy) = verifier.load_file(&output)?;
    println!("Loaded with strategy '{}', first class: {:?}", strategy, detector.class_name(0));

    Ok(output)
}
