use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use pad_vision::core_modules::utils::image_helper;
use pad_vision::pipeline::{
    DEFAULT_CUT_IN, DEFAULT_CUT_OUT, DEFAULT_FRAME_SIZE, DEFAULT_GRID_STEP, DEFAULT_MAX_NUM_CENTROIDS,
    DEFAULT_MAX_SEARCH_BUF,
};
use pad_vision::{FlatFrame, FramePipeline, LumaRange, MaskThresholds, PipelineConfig, PreviewMode};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Reads raw yuv420p board/comp streams, composites them and reports the pads in each.
#[derive(Debug, Parser)]
#[command(name = "pad_tester", version)]
struct Args {
    /// Board camera stream, or `-` for stdin.
    #[arg(long)]
    board: String,
    /// Comp camera stream, or `-` for stdin.
    #[arg(long)]
    comp: String,
    /// Where to write the composited yuv420p stream; `-` for stdout.
    #[arg(long)]
    output: Option<String>,
    #[arg(long, default_value_t = DEFAULT_FRAME_SIZE)]
    width: u32,
    #[arg(long, default_value_t = DEFAULT_FRAME_SIZE)]
    height: u32,
    #[arg(long, default_value_t = DEFAULT_GRID_STEP)]
    grid_step: u32,
    #[arg(long, default_value_t = DEFAULT_MAX_NUM_CENTROIDS)]
    max_centroids: usize,
    /// Largest region, in pixels, the flood fill will follow before dropping it.
    #[arg(long, default_value_t = DEFAULT_MAX_SEARCH_BUF)]
    max_search_buf: usize,
    /// Inclusive luma window marking board pads.
    #[arg(long, default_value_t = DEFAULT_CUT_IN)]
    board_cut_in: u8,
    #[arg(long, default_value_t = DEFAULT_CUT_OUT)]
    board_cut_out: u8,
    /// Inclusive luma window marking comp pads.
    #[arg(long, default_value_t = DEFAULT_CUT_IN)]
    comp_cut_in: u8,
    #[arg(long, default_value_t = DEFAULT_CUT_OUT)]
    comp_cut_out: u8,
    #[arg(long, value_enum, default_value_t = Preview::Composite)]
    preview: Preview,
    /// Write PNG snapshots of the first cycle into this directory.
    #[arg(long)]
    png_dir: Option<PathBuf>,
    /// Stop after this many frame pairs.
    #[arg(long)]
    frames: Option<u64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Preview {
    Composite,
    Board,
    Comp,
}

impl From<Preview> for PreviewMode {
    fn from(preview: Preview) -> Self {
        match preview {
            Preview::Composite => PreviewMode::Composite,
            Preview::Board => PreviewMode::BoardMask,
            Preview::Comp => PreviewMode::CompMask,
        }
    }
}

impl Args {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            frame_width: self.width,
            frame_height: self.height,
            thresholds: MaskThresholds {
                board: LumaRange::new(self.board_cut_in, self.board_cut_out),
                comp: LumaRange::new(self.comp_cut_in, self.comp_cut_out),
            },
            max_search_buf: self.max_search_buf,
            max_num_centroids: self.max_centroids,
            grid_step: self.grid_step,
            preview: self.preview.into(),
            ..PipelineConfig::default()
        }
    }
}

fn open_input(path: &str) -> Result<Box<dyn Read>> {
    if path == "-" {
        return Ok(Box::new(BufReader::new(io::stdin().lock())));
    }
    let file = File::open(path).with_context(|| format!("opening input {path}"))?;
    Ok(Box::new(BufReader::new(file)))
}

fn open_output(path: &str) -> Result<Box<dyn Write>> {
    if path == "-" {
        return Ok(Box::new(BufWriter::new(io::stdout().lock())));
    }
    let file = File::create(path).with_context(|| format!("creating output {path}"))?;
    Ok(Box::new(BufWriter::new(file)))
}

/// Fills `frame` from `reader`. Returns false once the stream has no whole frame left.
fn read_frame(reader: &mut dyn Read, frame: &mut FlatFrame) -> Result<bool> {
    match reader.read_exact(frame.as_bytes_mut()) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(err) => Err(err).context("reading frame"),
    }
}

fn write_snapshots(pipeline: &FramePipeline, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    image_helper::save_luma_png(pipeline.output(), dir.join("composite.png"))?;
    image_helper::save_mask_png(pipeline.board_mask(), dir.join("board_mask.png"))?;
    image_helper::save_mask_png(pipeline.comp_mask(), dir.join("comp_mask.png"))?;
    info!("wrote snapshots to {}", dir.display());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // --- 1. Argument Parsing & Setup ---
    let args = Args::parse();
    if args.board == "-" && args.comp == "-" {
        anyhow::bail!("only one of --board and --comp can read from stdin");
    }

    // --- 2. Pipeline Initialization ---
    let mut pipeline = FramePipeline::new(args.pipeline_config()).context("invalid pipeline configuration")?;
    let geometry = pipeline.geometry();

    // --- 3. Stream I/O Initialization ---
    let mut board_in = open_input(&args.board)?;
    let mut comp_in = open_input(&args.comp)?;
    let mut output = args.output.as_deref().map(open_output).transpose()?;
    let mut board = FlatFrame::new(geometry);
    let mut comp = FlatFrame::new(geometry);

    // --- 4. Main Processing Loop ---
    let mut processed = 0u64;
    while args.frames.is_none_or(|limit| processed < limit) {
        let board_ok = read_frame(board_in.as_mut(), &mut board)?;
        let comp_ok = read_frame(comp_in.as_mut(), &mut comp)?;
        if !(board_ok && comp_ok) {
            if board_ok != comp_ok {
                warn!("one input ended before the other; stopping");
            }
            break;
        }

        let report = pipeline.process(&board, &comp)?;
        info!(
            "frame {}: board {:?} comp {:?}",
            report.frame_id,
            report.board_pads.iter().map(|c| (c.x, c.y, c.weight)).collect::<Vec<_>>(),
            report.comp_pads.iter().map(|c| (c.x, c.y, c.weight)).collect::<Vec<_>>(),
        );

        // --- 5. Output ---
        if let Some(out) = output.as_mut() {
            out.write_all(pipeline.output().as_bytes()).context("writing output frame")?;
        }
        if processed == 0 {
            if let Some(dir) = &args.png_dir {
                write_snapshots(&pipeline, dir)?;
            }
        }
        processed += 1;
    }

    if let Some(mut out) = output {
        out.flush().context("flushing output")?;
    }
    info!(
        "processed {processed} frame pair(s) of {}x{}",
        geometry.width(),
        geometry.height()
    );
    Ok(())
}
