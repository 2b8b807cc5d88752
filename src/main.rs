//! PlantVillage Inference CLI
//!
//! Classifies leaf photographs with a pretrained model artifact and prints a
//! verdict, the most likely classes and optionally a probability chart.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{info, warn};

use plantvillage_infer::backend::{backend_name, default_device, DefaultBackend};
use plantvillage_infer::config::{ClassifierConfig, CONFIG_ENV, MODEL_ENV};
use plantvillage_infer::inference::{Classifier, PredictionReport};
use plantvillage_infer::labels::{LabelTable, NUM_CLASSES};
use plantvillage_infer::model::{Model, ModelManifest, ModelVariant};
use plantvillage_infer::utils::format_millis;
use plantvillage_infer::utils::format_progress_bar;
use plantvillage_infer::utils::logging::{init_logging, LogConfig};
use plantvillage_infer::PlantVillageError;

/// PlantVillage Plant Disease Classification
///
/// Classifies a leaf photograph into one of 38 PlantVillage disease classes
/// using a pretrained model on the CPU.
#[derive(Parser, Debug)]
#[command(name = "plantvillage_infer")]
#[command(version)]
#[command(about = "Plant disease classification from leaf photographs with Burn", long_about = None)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(short, long, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true, default_value = "false", conflicts_with = "verbose")]
    quiet: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify a single leaf image
    Classify {
        /// Path to the image
        image: PathBuf,

        /// Path to the model manifest
        #[arg(short, long, env = MODEL_ENV)]
        model: Option<PathBuf>,

        /// Model family (compact or efficient)
        #[arg(long)]
        variant: Option<ModelVariant>,

        /// Number of ranked classes to show
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Write the probability chart to this SVG file
        #[arg(long)]
        chart: Option<PathBuf>,

        /// Write the full report to this JSON file
        #[arg(long)]
        json: Option<PathBuf>,

        /// Accept every decodable image format, not only the configured ones
        #[arg(long, default_value = "false")]
        any_format: bool,
    },

    /// List the disease classes the models predict
    Labels {
        /// List the supported plants instead of every class
        #[arg(long, default_value = "false")]
        plants: bool,
    },

    /// Show the architecture of a model artifact and check that it loads
    Inspect {
        /// Path to the model manifest
        #[arg(short, long, env = MODEL_ENV)]
        model: Option<PathBuf>,

        /// Model family (compact or efficient)
        #[arg(long)]
        variant: Option<ModelVariant>,
    },

    /// Write an untrained artifact with the reference architecture of a model family
    Scaffold {
        /// Model family (compact or efficient)
        #[arg(long, default_value = "compact")]
        variant: ModelVariant,

        /// Path of the manifest to write
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ClassifierConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ClassifierConfig::default(),
    };

    let log_config = LogConfig::for_cli(cli.verbose, cli.quiet, config.log_level()?);
    if let Err(e) = init_logging(&log_config) {
        eprintln!("{}", e);
    }

    print_banner();

    let from_file = cli.config.is_some();
    match cli.command {
        Commands::Classify {
            image,
            model,
            variant,
            top_k,
            chart,
            json,
            any_format,
        } => {
            let mut config = apply_overrides(config, from_file, model, variant);
            if let Some(top_k) = top_k {
                config.top_k = top_k;
            }
            if chart.is_some() {
                config.chart_output = chart;
            }
            config.validate()?;

            cmd_classify(&image, &config, json.as_deref(), any_format)?;
        }

        Commands::Labels { plants } => {
            cmd_labels(plants)?;
        }

        Commands::Inspect { model, variant } => {
            let config = apply_overrides(config, from_file, model, variant);
            cmd_inspect(&config)?;
        }

        Commands::Scaffold { variant, output } => {
            let output = output.unwrap_or_else(|| PathBuf::from("Model").join(variant.artifact_name()));
            cmd_scaffold(variant, &output)?;
        }
    }

    Ok(())
}

/// CLI flags win over the configuration file; a variant without a file or
/// explicit model also selects that variant's conventional artifact path
fn apply_overrides(
    mut config: ClassifierConfig,
    from_file: bool,
    model: Option<PathBuf>,
    variant: Option<ModelVariant>,
) -> ClassifierConfig {
    if let Some(variant) = variant {
        if !from_file {
            config.model_path = PathBuf::from("Model").join(variant.artifact_name());
        }
        config.variant = variant;
    }
    if let Some(model) = model {
        config.model_path = model;
    }
    config
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════════════════╗
 ║   🌱 PlantVillage Inference                                       ║
 ║   Plant Disease Classification with Burn + Rust                  ║
 ╚══════════════════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

fn load_model(config: &ClassifierConfig) -> Result<Model<DefaultBackend>> {
    let device = default_device();
    let registry = config.variant.custom_ops::<DefaultBackend>();

    let model = Model::load(&config.model_path, &registry, &device)
        .with_context(|| format!("Failed to load model {}", config.model_path.display()))?;

    let size = config.variant.image_size();
    if model.expected_size() != (size, size) {
        warn!(
            "Model expects {:?} input, which is unusual for the {} variant ({}x{})",
            model.expected_size(),
            config.variant,
            size,
            size
        );
    }
    Ok(model)
}

fn cmd_classify(
    image: &Path,
    config: &ClassifierConfig,
    json: Option<&Path>,
    any_format: bool,
) -> Result<()> {
    info!("Classifying {}", image.display());

    println!("{}", "Inference Configuration:".cyan().bold());
    println!("  📷 Image:   {}", image.display());
    println!("  🧠 Model:   {}", config.model_path.display());
    println!("  🏷️  Variant: {}", config.variant);
    println!("  🖥️  Backend: {}", backend_name());
    println!();

    println!("{}", "Loading model...".cyan());
    let model = load_model(config)?;
    let mut classifier = Classifier::plantvillage(model)?;
    if !any_format {
        classifier = classifier.with_accepted_formats(config.image_formats()?);
    }

    let result = match classifier.classify_file(image) {
        Ok(result) => result,
        Err(PlantVillageError::Io(e)) => {
            println!("{} No image was found, please retry", "Error:".red());
            return Err(anyhow::Error::new(e).context(format!("Cannot read {}", image.display())));
        }
        Err(e) if e.is_input_error() => {
            println!(
                "{} The file is not an accepted image, please retry",
                "Error:".red()
            );
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    let report = PredictionReport::new(&result, classifier.labels(), config.top_k)?;

    println!();
    println!("{}", report.verdict().green().bold());
    println!();
    println!("{}", format!("Top-{} predictions:", report.top_k.len()).cyan().bold());
    for (rank, prediction) in report.top_k.iter().enumerate() {
        println!(
            "  {}. {:<50} {}",
            rank + 1,
            prediction.class_name,
            format_progress_bar(prediction.probability as f64, 20)
        );
    }
    println!();
    println!(
        "  Inference time: {}",
        format_millis(result.inference_time_ms).yellow()
    );

    if let Some(path) = &config.chart_output {
        report.render_svg(path)?;
        println!("  📊 Chart saved to {}", path.display());
    }
    if let Some(path) = json {
        report.save_json(path)?;
        println!("  💾 Report saved to {}", path.display());
    }

    Ok(())
}

fn cmd_labels(plants: bool) -> Result<()> {
    let labels = LabelTable::plantvillage();

    if plants {
        let plants = labels.supported_plants();
        println!("{}", format!("Supported plants ({}):", plants.len()).cyan().bold());
        for plant in plants {
            println!("  • {}", plant);
        }
        return Ok(());
    }

    println!("{}", format!("Disease classes ({}):", labels.len()).cyan().bold());
    for entry in labels.iter() {
        let marker = if labels.is_healthy(entry.index)? {
            "healthy".green()
        } else {
            "disease".yellow()
        };
        println!("  {:>2}  {:<50} {}", entry.index, entry.name, marker);
    }

    Ok(())
}

fn cmd_inspect(config: &ClassifierConfig) -> Result<()> {
    let manifest = ModelManifest::load(&config.model_path)
        .with_context(|| format!("Failed to read manifest {}", config.model_path.display()))?;
    let registry = config.variant.custom_ops::<DefaultBackend>();

    println!("{}", "Model Artifact:".cyan().bold());
    println!("  Name:     {}", manifest.name);
    println!(
        "  Input:    {}x{}x{}",
        manifest.input.height, manifest.input.width, manifest.input.channels
    );
    println!("  Classes:  {}", manifest.num_classes);
    match &manifest.weights {
        Some(weights) => println!(
            "  Weights:  {} ({:?})",
            weights.path.display(),
            weights.format
        ),
        None => println!("  Weights:  {}", "none".yellow()),
    }
    println!();

    println!("{}", "Layers:".cyan().bold());
    for (position, layer) in manifest.layers.iter().enumerate() {
        println!("  {:>3}  {}", position, layer.describe());
    }
    println!();

    println!("{}", format!("Operations ({} variant):", config.variant).cyan().bold());
    for name in manifest.op_names() {
        let status = if registry.contains(name) {
            "registered".green()
        } else if registry.resolves(name) {
            "built-in".green()
        } else {
            "missing".red()
        };
        println!("  {:<16} {}", name, status);
    }
    println!();

    if manifest.num_classes != NUM_CLASSES {
        println!(
            "{} Model predicts {} classes, the label table has {}",
            "Warning:".yellow(),
            manifest.num_classes,
            NUM_CLASSES
        );
    }

    match load_model(config) {
        Ok(model) => println!(
            "{} Artifact loads ({} parameters)",
            "OK:".green().bold(),
            model.num_params()
        ),
        Err(e) => println!("{} {:#}", "Error:".red().bold(), e),
    }

    Ok(())
}

fn cmd_scaffold(variant: ModelVariant, output: &Path) -> Result<()> {
    info!("Scaffolding {} artifact at {}", variant, output.display());

    let manifest = variant.reference_manifest(NUM_CLASSES);
    let mut model: Model<DefaultBackend> =
        Model::from_manifest(manifest, &variant.custom_ops(), &default_device())?;
    let weights_path = model.save_as(output, variant.weight_format())?;

    println!("{}", "Artifact written:".cyan().bold());
    println!("  Manifest: {}", output.display());
    println!("  Weights:  {}", weights_path.display());
    println!("  Params:   {}", model.num_params());
    println!();
    println!(
        "{} The weights are randomly initialised; predictions are meaningless until trained weights are exported into this artifact.",
        "Note:".yellow()
    );

    Ok(())
}
