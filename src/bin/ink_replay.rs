use anyhow::{bail, Context, Result};
use screen_ink::ink::render::gpu::{GpuProvider, NoGpuProvider, ThreadedGpuProvider};
use screen_ink::ink::replay::{load_script, present, run_script};
use screen_ink::ink::settings_store;
use std::path::PathBuf;

const USAGE: &str = "usage: ink_replay <script.json> <out.png> [--ops <ops.json>] [--settings <ink_settings.json>] [--no-gpu] [--debug]";

struct Args {
    script: PathBuf,
    png: PathBuf,
    ops: Option<PathBuf>,
    settings: Option<PathBuf>,
    no_gpu: bool,
    debug: bool,
}

fn parse_args() -> Result<Args> {
    let mut positional = Vec::new();
    let mut ops = None;
    let mut settings = None;
    let mut no_gpu = false;
    let mut debug = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--ops" => ops = Some(PathBuf::from(args.next().context("--ops needs a path")?)),
            "--settings" => {
                settings = Some(PathBuf::from(args.next().context("--settings needs a path")?))
            }
            "--no-gpu" => no_gpu = true,
            "--debug" => debug = true,
            "-h" | "--help" => bail!("{USAGE}"),
            _ => positional.push(PathBuf::from(arg)),
        }
    }

    let [script, png]: [PathBuf; 2] = positional
        .try_into()
        .map_err(|_| anyhow::anyhow!("{USAGE}"))?;
    Ok(Args {
        script,
        png,
        ops,
        settings,
        no_gpu,
        debug,
    })
}

fn main() -> Result<()> {
    let args = parse_args()?;
    screen_ink::logging::init(args.debug, None);

    let mut script = load_script(&args.script)?;
    if let Some(path) = &args.settings {
        if let Some(settings) = settings_store::load_from_path(path)? {
            script.settings = settings;
        }
    }

    let provider: Box<dyn GpuProvider> = if args.no_gpu {
        Box::new(NoGpuProvider)
    } else {
        Box::new(ThreadedGpuProvider)
    };
    let mut engine = run_script(&script, provider)?;
    let drawn = present(&mut engine)?;

    let frame = engine.frame().context("backend produced no frame")?;
    image::save_buffer(
        &args.png,
        frame.pixels(),
        frame.width(),
        frame.height(),
        image::ColorType::Rgba8,
    )
    .with_context(|| format!("writing {}", args.png.display()))?;

    if let Some(path) = &args.ops {
        std::fs::write(path, engine.export_page_json()?)
            .with_context(|| format!("writing {}", path.display()))?;
    }

    let status = engine.backend_status();
    tracing::info!(
        drawn,
        nodes = engine.scene().len(),
        backend = status.active.map(|kind| kind.as_label()),
        fallback = status.fallback_reason.as_deref(),
        "replay finished"
    );
    Ok(())
}
