//! Pi-timelapse binary: preview, still capture and timelapse from the command line.

use std::error::Error;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use clap::Parser;
use flexi_logger::{
    colored_opt_format, Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming,
};
use log::{error, info};

use pi_timelapse::{
    Clock, HeadlessSurface, ParameterStore, PngStore, PreviewSurface, SessionController,
    SessionOptions, SystemClock, V4L2Driver,
};

/// Camera preview, still and timelapse capture.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Show the live video preview.
    #[arg(long = "preview_video")]
    preview_video: bool,

    /// Capture one still and preview it; press 's' to save.
    #[arg(long = "preview_still")]
    preview_still: bool,

    /// Take a timelapse with this interval in seconds.
    #[arg(long = "time_lapse", value_name = "SECONDS")]
    time_lapse: Option<u64>,

    /// Duration bound in seconds, 0 for unbounded.
    #[arg(long, default_value_t = 0, value_name = "SECONDS")]
    time: u64,

    /// Wait this many seconds before the timelapse starts.
    #[arg(long, default_value_t = 0, value_name = "SECONDS")]
    delay: u64,

    /// Calibrate once and lock exposure and white balance.
    #[arg(long = "fixed_parameter")]
    fixed_parameter: bool,

    /// Save the final image.
    #[arg(long)]
    output: bool,

    /// Camera parameter file.
    #[arg(long, default_value = "config.ini")]
    config: PathBuf,

    /// Video device index (/dev/videoN).
    #[arg(long, default_value_t = 0)]
    device: u32,

    /// Root folder for saved images.
    #[arg(long = "output_dir", default_value = pi_timelapse::store::DEFAULT_ROOT)]
    output_dir: PathBuf,

    /// Also write rotating log files into this folder.
    #[arg(long = "log_dir")]
    log_dir: Option<PathBuf>,

    /// Show previews in desktop windows.
    #[cfg(feature = "window")]
    #[arg(long)]
    window: bool,
}

impl Args {
    fn session_options(&self) -> SessionOptions {
        SessionOptions {
            preview_video: self.preview_video,
            preview_still: self.preview_still,
            time_lapse: self.time_lapse.map(Duration::from_secs),
            time: Duration::from_secs(self.time),
            delay: Duration::from_secs(self.delay),
            fixed: self.fixed_parameter,
            output: self.output,
            ..SessionOptions::default()
        }
    }

    #[cfg(feature = "window")]
    fn surface(&self, clock: Rc<dyn Clock>) -> Box<dyn PreviewSurface> {
        if self.window {
            Box::new(pi_timelapse::preview::WindowSurface::new())
        } else {
            Box::new(HeadlessSurface::with_stdin(clock))
        }
    }

    #[cfg(not(feature = "window"))]
    fn surface(&self, clock: Rc<dyn Clock>) -> Box<dyn PreviewSurface> {
        Box::new(HeadlessSurface::with_stdin(clock))
    }
}

fn init_logging(log_dir: Option<&PathBuf>) -> Result<LoggerHandle, flexi_logger::FlexiLoggerError> {
    let logger = Logger::try_with_env_or_str("info")?.format(colored_opt_format);
    let logger = match log_dir {
        Some(dir) => logger
            .log_to_file(FileSpec::default().directory(dir))
            .duplicate_to_stderr(Duplicate::All)
            .rotate(
                Criterion::Size(500_000),
                Naming::Numbers,
                Cleanup::KeepLogFiles(2),
            ),
        None => logger.log_to_stderr(),
    };
    logger.start()
}

fn main() {
    let args = Args::parse();

    let _logger = match init_logging(args.log_dir.as_ref()) {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("Error: cannot start logger: {err}");
            std::process::exit(1);
        }
    };
    log_panics::init();

    if let Err(err) = run(&args) {
        error!("{err}");
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let options = args.session_options();
    if !options.any_mode() {
        info!("No mode selected, nothing to do");
        info!("Terminating Program");
        return Ok(());
    }

    let parameters = ParameterStore::from_ini_file(&args.config)?;
    let clock: Rc<dyn Clock> = Rc::new(SystemClock::new());
    info!("Starting session: {options:?}");
    info!("Keys are read from stdin: 'q' then Enter quits, 's' then Enter saves a still");

    let mut controller = SessionController::new(
        V4L2Driver::new(args.device),
        parameters,
        Box::new(PngStore::new(&args.output_dir)),
        args.surface(Rc::clone(&clock)),
        clock,
        options,
    );
    controller.run()?;
    Ok(())
}
