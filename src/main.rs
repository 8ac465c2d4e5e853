use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use indicatif::{BinaryBytes, HumanCount, ProgressBar, ProgressStyle};
use rand::Rng;

use bitvid::{video, DecodePipeline, EncodePipeline, Settings};

/// Default output extensions. Decoded files are assumed to be archives.
const ENCODED_EXTENSION: &str = "y4m";
const DECODED_EXTENSION: &str = "zip";

#[derive(Parser, Debug)]
#[command(name = "bitvid", version, about = "Store files as black and white video")]
struct Opts {
    /// Settings file (TOML). If it doesn't exist, defaults are used.
    #[arg(short, long, global = true, default_value = "bitvid.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Turn a file into a video
    Encode {
        input: PathBuf,

        /// Video to create: `.y4m`, `.mp4`/`.mov`/`.mkv` (needs ffmpeg), or a
        /// directory of PNG frames.
        /// Defaults to a fresh `output_*.y4m`.
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Turn a video back into a file
    Decode {
        /// A `.y4m`, `.mp4`, `.mov` or `.mkv` file, or a directory of numbered PNG frames
        input: PathBuf,

        /// File to append the decoded bytes to. Defaults to a fresh `output_*.zip`.
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Print the default settings and exit
    GenConfig {
        /// Write them to the `--config` file instead
        #[arg(long)]
        write: bool,
    },
}

/// Per-run overrides of the settings file.
///
/// Width, height and resize must match between encoding and decoding.
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Video width before resizing
    #[arg(long)]
    width: Option<u32>,

    /// Video height before resizing
    #[arg(long)]
    height: Option<u32>,

    /// Draw each bit as an N x N block. "0" draws one pixel per bit.
    #[arg(long)]
    resize: Option<u32>,

    #[arg(long)]
    fps: Option<u32>,

    /// Pixels brighter than this read back as 1
    #[arg(long)]
    threshold: Option<u8>,

    /// Frames decoded in parallel between ordered writes
    #[arg(long)]
    batch_size: Option<usize>,
}

impl Overrides {
    fn apply(&self, settings: &mut Settings) {
        if let Some(width) = self.width {
            settings.base_width = width;
        }
        if let Some(height) = self.height {
            settings.base_height = height;
        }
        if let Some(resize) = self.resize {
            settings.resize_factor = resize;
        }
        if let Some(fps) = self.fps {
            settings.fps = fps;
        }
        if let Some(threshold) = self.threshold {
            settings.threshold = threshold;
        }
        if let Some(batch_size) = self.batch_size {
            settings.batch_size = batch_size;
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let opts = Opts::parse();

    match opts.command {
        Command::GenConfig { write: false } => {
            print!("{}", Settings::default().to_toml()?);
        }
        Command::GenConfig { write: true } => {
            Settings::write_default(&opts.config)
                .with_context(|| format!("failed to write {}", opts.config.display()))?;
            println!("+ Created {}", opts.config.display());
        }
        Command::Encode {
            input,
            output,
            overrides,
        } => {
            let settings = load_settings(&opts.config, &overrides)?;
            let output = output.unwrap_or_else(|| unique_output_name(ENCODED_EXTENSION));
            encode(&settings, &input, &output)?;
        }
        Command::Decode {
            input,
            output,
            overrides,
        } => {
            let settings = load_settings(&opts.config, &overrides)?;
            let output = output.unwrap_or_else(|| unique_output_name(DECODED_EXTENSION));
            decode(&settings, &input, &output)?;
        }
    }

    Ok(())
}

fn load_settings(path: &Path, overrides: &Overrides) -> anyhow::Result<Settings> {
    let mut settings = Settings::load(path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    overrides.apply(&mut settings);
    settings.validate().context("invalid settings")?;
    Ok(settings)
}

fn encode(settings: &Settings, input: &Path, output: &Path) -> anyhow::Result<()> {
    let pipeline = EncodePipeline::new(settings)?;
    let codec = pipeline.codec();
    let resolution = codec.resolution();
    let (frame_width, frame_height) = codec.frame_dims();

    println!("+ Encoding {:?} into {:?}", input.display(), output.display());
    println!(
        "+ {} x {} bits per frame ({}), drawn at {} x {}",
        resolution.width(),
        resolution.height(),
        BinaryBytes(codec.bytes_per_image() as u64),
        frame_width,
        frame_height,
    );

    let file = File::open(input).with_context(|| format!("failed to open {}", input.display()))?;
    let len = file.metadata()?.len();

    let mut sink = video::create_sink(output, codec.frame_dims(), settings.fps)
        .with_context(|| format!("failed to create {}", output.display()))?;

    let pb = ProgressBar::new(len).with_style(ProgressStyle::with_template(
        "[{elapsed_precise}] {wide_bar} {binary_bytes}/{binary_total_bytes} ({binary_bytes_per_sec})",
    )?);
    let stats = pipeline.run(pb.wrap_read(BufReader::new(file)), &mut sink)?;
    pb.finish_and_clear();

    println!(
        "+ Wrote {} frames ({} read, {} of padding)",
        HumanCount(stats.frames).to_string(),
        BinaryBytes(stats.bytes_read),
        BinaryBytes(stats.padding_bytes),
    );
    println!("+ Created {}", output.display());
    Ok(())
}

fn decode(settings: &Settings, input: &Path, output: &Path) -> anyhow::Result<()> {
    let pipeline = DecodePipeline::new(settings)?;

    println!("+ Decoding {:?} into {:?}", input.display(), output.display());
    println!(
        "+ {} frames per batch, {} per frame",
        pipeline.batch_size(),
        BinaryBytes(pipeline.codec().bytes_per_image() as u64),
    );

    let mut source = video::open_source(input)
        .with_context(|| format!("failed to open {}", input.display()))?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(output)
        .with_context(|| format!("failed to open {}", output.display()))?;

    let pb = ProgressBar::new_spinner().with_style(ProgressStyle::with_template(
        "{spinner} [{elapsed_precise}] {binary_bytes} written ({binary_bytes_per_sec})",
    )?);
    pb.enable_steady_tick(Duration::from_millis(100));
    let stats = pipeline.run(&mut source, pb.wrap_write(BufWriter::new(file)))?;
    pb.finish_and_clear();

    println!(
        "+ Read {} frames in {} batches, wrote {}",
        HumanCount(stats.frames).to_string(),
        HumanCount(stats.batches).to_string(),
        BinaryBytes(stats.bytes_written),
    );
    println!("+ Created {}", output.display());
    Ok(())
}

/// `output_` plus `size` random letters.
fn random_output_name(size: usize) -> String {
    const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

    let mut rng = rand::rng();
    let suffix: String = (0..size)
        .map(|_| LETTERS[rng.random_range(0..LETTERS.len())] as char)
        .collect();
    format!("output_{suffix}")
}

/// A random output path that does not exist yet.
fn unique_output_name(extension: &str) -> PathBuf {
    loop {
        let path = PathBuf::from(format!("{}.{extension}", random_output_name(12)));
        if !path.exists() {
            return path;
        }
    }
}
