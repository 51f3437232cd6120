use std::io::Write;
use std::process::ExitCode;

use haffmpeg::{
    CloseOutcome, FfmpegConfig, FfmpegProcess, OpenOptions, ReadSource, Redirect, TransferMode,
};

const USAGE: &str = "usage: ha-ffmpeg [--config FILE] [--stderr] [--text] [--extra \"ARGS\"] [--output TARGET] -- <ffmpeg args...>";

#[derive(Default)]
struct CliArgs {
    config_path: Option<String>,
    read_stderr: bool,
    text: bool,
    extra_args: Option<String>,
    output: Option<String>,
    ffmpeg_args: Vec<String>,
}

fn parse_cli_args(mut args: impl Iterator<Item = String>) -> Result<CliArgs, String> {
    let mut cli = CliArgs::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => cli.config_path = Some(args.next().ok_or("--config needs a value")?),
            "--extra" => cli.extra_args = Some(args.next().ok_or("--extra needs a value")?),
            "--output" => cli.output = Some(args.next().ok_or("--output needs a value")?),
            "--stderr" => cli.read_stderr = true,
            "--text" => cli.text = true,
            "--" => {
                cli.ffmpeg_args.extend(args.by_ref());
                break;
            }
            other => return Err(format!("unknown argument '{other}'")),
        }
    }

    if cli.ffmpeg_args.is_empty() {
        return Err("no ffmpeg arguments given".to_string());
    }

    Ok(cli)
}

fn run(cli: CliArgs) -> Result<CloseOutcome, String> {
    let mut config = match &cli.config_path {
        Some(path) => FfmpegConfig::load(path).map_err(|error| error.to_string())?,
        None => FfmpegConfig::default(),
    }
    .with_env_overrides();

    if cli.read_stderr {
        config.read_source = ReadSource::Stderr;
    }

    let mut options = OpenOptions::new();
    if let Some(output) = cli.output {
        options = options.output(output);
    }
    if let Some(extra_args) = cli.extra_args {
        options = options.extra_args(extra_args);
    }
    if cli.text {
        options = options.mode(TransferMode::Text);
    }
    if config.read_source == ReadSource::Stderr {
        options = options.stdout(Redirect::Discard).stderr(Redirect::Piped);
    }

    let mut ffmpeg = FfmpegProcess::from_config(&config).map_err(|error| error.to_string())?;
    ffmpeg
        .open(cli.ffmpeg_args, &options)
        .map_err(|error| error.to_string())?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for chunk in ffmpeg.chunks() {
        if let Err(error) = out.write_all(chunk.as_bytes()) {
            tracing::warn!("Stopped forwarding ffmpeg output: {error}");
            break;
        }
    }
    if let Err(error) = out.flush() {
        tracing::debug!("Failed to flush stdout: {error}");
    }

    Ok(ffmpeg.close_with_default_timeout())
}

fn main() -> ExitCode {
    haffmpeg::init_logging();

    let cli = match parse_cli_args(std::env::args().skip(1)) {
        Ok(cli) => cli,
        Err(error) => {
            eprintln!("ha-ffmpeg: {error}\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    match run(cli) {
        Ok(outcome) => {
            tracing::info!(?outcome, "ffmpeg finished");
            match outcome.exit_status() {
                Some(status) if !status.success() && !outcome.was_forced() => ExitCode::FAILURE,
                _ => ExitCode::SUCCESS,
            }
        }
        Err(error) => {
            eprintln!("ha-ffmpeg: {error}");
            ExitCode::FAILURE
        }
    }
}
