use clap::{Parser, Subcommand};
use std::process;
use vocal_split_core::{
    list_models, prepare_model, split_file, CancelToken, JobState, Outcome, Progress,
    ProgressObserver, SplitOptions, Stage,
};

#[derive(Parser)]
#[command(name = "vocal-split")]
#[command(about = "AI-powered vocal / instrumental separation tool", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Separate an audio file into vocals and instrumental WAVs
    Split {
        #[arg(short, long)]
        input: String,

        #[arg(short, long, default_value = ".")]
        output: String,

        #[arg(short, long, default_value = "UVR-MDX-NET-Inst_HQ_2")]
        model: String,

        /// Chunk length in seconds for long inputs
        #[arg(long, default_value_t = 30.0)]
        chunk_seconds: f32,

        /// Crossfade overlap between chunks in seconds
        #[arg(long, default_value_t = 2.0)]
        overlap_seconds: f32,

        #[arg(short, long)]
        quiet: bool,
    },

    /// Download and cache a model without separating anything
    Prepare {
        #[arg(short, long, default_value = "UVR-MDX-NET-Inst_HQ_2")]
        model: String,

        #[arg(short, long)]
        quiet: bool,
    },

    /// List available models
    List,
}

struct ConsoleProgress;

impl ProgressObserver for ConsoleProgress {
    fn on_progress(&self, p: &Progress) {
        let label = match p.stage {
            Stage::Download => "1/4 Model",
            Stage::Extract => "2/4 Audio",
            Stage::Separate => "3/4 Separate",
            Stage::Encode => "4/4 Encode",
        };
        eprint!("\r\x1b[2K[{:>3.0}%] {label}: {}", p.percent, p.message);
    }

    fn on_state(&self, state: &JobState) {
        if state.is_terminal() {
            eprintln!();
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Split {
            input,
            output,
            model,
            chunk_seconds,
            overlap_seconds,
            quiet,
        } => handle_split(
            input,
            SplitOptions {
                output_dir: output,
                model_name: model,
                chunk_seconds,
                overlap_seconds,
            },
            quiet,
        ),
        Commands::Prepare { model, quiet } => handle_prepare(model, quiet),
        Commands::List => handle_list(),
    };

    match result {
        Ok(()) => process::exit(0),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn handle_split(
    input: String,
    opts: SplitOptions,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !std::path::Path::new(&input).exists() {
        return Err(format!("Input file not found: {}", input).into());
    }

    if !quiet {
        eprintln!("Vocal Split");
        eprintln!("----------------------------------------");
        eprintln!("Input:  {}", input);
        eprintln!("Output: {}", opts.output_dir);
        eprintln!("Model:  {}", opts.model_name);
        eprintln!("----------------------------------------");
    }

    let silent = |_: &Progress| {};
    let observer: &dyn ProgressObserver = if quiet { &silent } else { &ConsoleProgress };

    let result = match split_file(&input, &opts, observer, &CancelToken::new())? {
        Outcome::Done(result) => result,
        Outcome::Cancelled => return Err("separation cancelled".into()),
    };

    if !quiet {
        eprintln!();
        eprintln!("Split completed successfully!");
        eprintln!("  Vocals:       {}", result.vocals_path);
        eprintln!("  Instrumental: {}", result.instrumental_path);
    } else {
        println!("{}", result.vocals_path);
        println!("{}", result.instrumental_path);
    }

    Ok(())
}

fn handle_prepare(model: String, quiet: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !quiet {
        eprintln!("Preparing model: {}", model);
    }

    let silent = |_: &Progress| {};
    let observer: &dyn ProgressObserver = if quiet { &silent } else { &ConsoleProgress };
    let gateway = prepare_model(&model, observer)?;

    if !quiet {
        eprintln!();
        eprintln!("Model `{}` prepared successfully!", gateway.model_key());
    }

    Ok(())
}

fn handle_list() -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Available Models");
    eprintln!("----------------------------------------");
    for (name, is_default) in list_models()? {
        let marker = if is_default { " (default)" } else { "" };
        eprintln!("  * {}{}", name, marker);
    }
    eprintln!();
    eprintln!("Use --model <name> to specify a model");
    Ok(())
}
