use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use ferrite_kd::config::{QuantMethod, RunConfig};
use ferrite_kd::logging::init_tracing;
use ferrite_kd::quant::QuantizedNetwork;
use ferrite_kd::{
    CrossEntropyLoss, Distiller, DynamicQuantizer, Model, Network, NetworkSpec, QConfig,
    QatQuantizer, Quantizer, QuantizerState, SoftTarget, StateDict, StaticQuantizer, Trainable,
};

#[derive(Parser)]
#[command(name = "ferrite-kd", version, about = "Knowledge distillation and quantization for dense networks")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train the teacher, distill it into the student and report validation accuracy
    Distill {
        /// Run config (JSON); defaults are used when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Load the teacher checkpoint instead of training it
        #[arg(long)]
        skip_teacher: bool,
    },
    /// Quantize a trained checkpoint and compare size and accuracy
    Quantize {
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Float checkpoint to quantize (defaults to the student checkpoint)
        #[arg(long)]
        checkpoint: Option<PathBuf>,
        /// Quantize the teacher architecture instead of the student
        #[arg(long)]
        teacher: bool,
        /// Overrides `quant_method` from the config
        #[arg(long, value_enum)]
        method: Option<MethodArg>,
    },
    /// Print parameter count and float/int8 sizes of a network spec
    Inspect {
        spec: PathBuf,
    },
    /// Write the default run config to a file
    InitConfig {
        #[arg(default_value = "run.json")]
        path: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum MethodArg {
    Dynamic,
    Static,
    Qat,
}

impl From<MethodArg> for QuantMethod {
    fn from(m: MethodArg) -> Self {
        match m {
            MethodArg::Dynamic => QuantMethod::Dynamic,
            MethodArg::Static => QuantMethod::Static,
            MethodArg::Qat => QuantMethod::Qat,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing()?;

    match cli.command {
        Command::Distill { config, skip_teacher } => distill(&load_config(config.as_deref())?, skip_teacher),
        Command::Quantize { config, checkpoint, teacher, method } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(m) = method {
                config.quant_method = m.into();
            }
            quantize(&config, checkpoint, teacher)
        }
        Command::Inspect { spec } => inspect(&spec),
        Command::InitConfig { path } => {
            RunConfig::default()
                .save(&path)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("wrote default config to {}", path.display());
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<RunConfig> {
    match path {
        Some(p) => RunConfig::load(p).with_context(|| format!("loading config {}", p.display())),
        None => {
            let config = RunConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

fn distill(config: &RunConfig, skip_teacher: bool) -> Result<()> {
    let (train_loader, val_loader) = config.loaders().context("preparing data")?;
    let mut kd = Distiller::new(
        Network::from_spec(&config.teacher)?,
        Network::from_spec(&config.student)?,
        train_loader,
        val_loader,
        config.optimizer.build()?,
        config.optimizer.build()?,
        config.distill,
        SoftTarget,
    )?;
    kd.get_parameters();

    if skip_teacher {
        let path = config.teacher_checkpoint();
        let state = StateDict::load(&path)
            .with_context(|| format!("loading teacher checkpoint {}", path.display()))?;
        kd.teacher_model.load_state_dict(&state)?;
    } else {
        kd.train_teacher(&config.teacher_options())?;
    }
    let teacher_acc = kd.evaluate(true)?;

    let report = kd.train_student(&config.student_options())?;
    let student_acc = kd.evaluate(false)?;

    println!("teacher val accuracy: {teacher_acc:.4}");
    println!("student val accuracy: {student_acc:.4}");
    if let Some(path) = report.saved_to {
        println!("student saved to {}", path.display());
    }
    Ok(())
}

fn quantize(config: &RunConfig, checkpoint: Option<PathBuf>, teacher: bool) -> Result<()> {
    let spec = if teacher { &config.teacher } else { &config.student };
    let checkpoint = checkpoint.unwrap_or_else(|| {
        if teacher { config.teacher_checkpoint() } else { config.student_checkpoint() }
    });

    let mut model = Network::from_spec(spec)?;
    let state = StateDict::load(&checkpoint)
        .with_context(|| format!("loading checkpoint {}", checkpoint.display()))?;
    model.load_state_dict(&state)?;
    model.eval();

    let (train_loader, test_loader) = config.loaders().context("preparing data")?;
    let state = QuantizerState::new(model, config.qconfig)?
        .with_train_loader(train_loader)
        .with_test_loader(test_loader)
        .with_optimizer(config.optimizer.build()?)
        .with_criterion(Box::new(CrossEntropyLoss));

    let mut quantizer: Box<dyn Quantizer> = match config.quant_method {
        QuantMethod::Dynamic => Box::new(DynamicQuantizer::new(state)),
        QuantMethod::Static => Box::new(StaticQuantizer::new(state)),
        QuantMethod::Qat => Box::new(QatQuantizer::new(state)),
    };
    info!(method = ?config.quant_method, "quantizing {}", spec.name);
    let quantized_state = quantizer.quantize()?.state_dict();

    let sizes = quantizer.get_model_sizes()?;
    let perf = quantizer.get_performance_statistics()?;

    let out = config.output_dir.join(format!("{}_int8.safetensors", spec.name));
    quantized_state
        .save(&out)
        .with_context(|| format!("writing {}", out.display()))?;

    println!(
        "size: {:.4} MB -> {:.4} MB ({:.2}x)",
        sizes.original_mb, sizes.quantized_mb, sizes.compression_ratio()
    );
    println!(
        "accuracy: {:.4} -> {:.4}",
        perf.original.accuracy, perf.quantized.accuracy
    );
    println!(
        "eval time: {:?} -> {:?}",
        perf.original.elapsed, perf.quantized.elapsed
    );
    println!("quantized model saved to {}", out.display());
    Ok(())
}

fn inspect(path: &Path) -> Result<()> {
    let spec = NetworkSpec::load_json(&path.to_string_lossy())
        .with_context(|| format!("reading spec {}", path.display()))?;
    let network = Network::from_spec(&spec)?;
    let float_bytes = network.state_dict().size_bytes()?;
    let int8_bytes = QuantizedNetwork::from_network(&network, &QConfig::default())?
        .state_dict()
        .size_bytes()?;

    println!("{} ({} layers)", spec.name, spec.layers.len());
    if let Some(d) = &spec.description {
        println!("  {d}");
    }
    for (i, layer) in spec.layers.iter().enumerate() {
        println!("  [{i}] {} -> {} {:?}", layer.input_size, layer.size, layer.activation);
    }
    println!("parameters: {}", network.num_parameters());
    println!("float size: {:.4} MB", float_bytes as f64 / 1e6);
    println!("int8 size:  {:.4} MB", int8_bytes as f64 / 1e6);
    Ok(())
}
