//! Command line and application configuration.

use crate::control::DEFAULT_SWITCH_PERIOD;
use clap::{Arg, ArgMatches, Command};
use clap::error::ErrorKind;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// RTSP stream used for the first input when none is given.
pub const DEFAULT_RTSP_LOCATION: &str = "rtsp://127.0.0.1:8554/stream";

/// Resolution both inputs are scaled to.
pub const DEFAULT_RESOLUTION: (u32, u32) = (640, 480);

/// `videotestsrc` pattern used when the video file cannot be opened.
pub const DEFAULT_TEST_PATTERN: i64 = 1;

/// Everything needed to assemble and run the switching graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Video file for the second input. `None` selects the test source.
    pub video_file: Option<PathBuf>,
    /// Time between two switches.
    pub switch_period: Duration,
    /// RTSP URI of the first input.
    pub rtsp_location: String,
    /// Output width and height of both inputs.
    pub resolution: (u32, u32),
    /// Pattern of the fallback test source.
    pub test_pattern: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            video_file: None,
            switch_period: DEFAULT_SWITCH_PERIOD,
            rtsp_location: DEFAULT_RTSP_LOCATION.to_string(),
            resolution: DEFAULT_RESOLUTION,
            test_pattern: DEFAULT_TEST_PATTERN,
        }
    }
}

impl AppConfig {
    /// Set the video file.
    pub fn with_video_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.video_file = Some(path.into());
        self
    }

    /// Set the switch period.
    pub fn with_switch_period(mut self, period: Duration) -> Self {
        self.switch_period = period;
        self
    }

    /// Set the RTSP location.
    pub fn with_rtsp_location(mut self, location: impl Into<String>) -> Self {
        self.rtsp_location = location.into();
        self
    }

    /// Set the output resolution.
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = (width, height);
        self
    }

    /// Set the fallback test pattern.
    pub fn with_test_pattern(mut self, pattern: i64) -> Self {
        self.test_pattern = pattern;
        self
    }

    /// The video file, if one was given.
    pub fn video_file(&self) -> Option<&Path> {
        self.video_file.as_deref()
    }

    /// Caps string both inputs are filtered to.
    pub fn caps(&self) -> String {
        let (width, height) = self.resolution;
        format!("video/x-raw,width={width},height={height}")
    }
}

/// What the binary was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Print the text and exit successfully.
    Help(String),
    /// Build and run the graph.
    Run(AppConfig),
}

fn command() -> Command {
    Command::new("vswitch")
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("video-file")
                .value_name("VIDEO_FILE")
                .help("Video file for the second input; 'help' prints usage")
                .required(false),
        )
        .arg(
            Arg::new("switch-period")
                .value_name("SWITCH_PERIOD")
                .help("Milliseconds between two switches")
                .allow_hyphen_values(true)
                .required(false),
        )
        .arg(
            Arg::new("location")
                .short('l')
                .long("location")
                .value_name("URI")
                .help("RTSP stream for the first input")
                .default_value(DEFAULT_RTSP_LOCATION),
        )
        .arg(
            Arg::new("pattern")
                .short('p')
                .long("pattern")
                .value_name("N")
                .help("Test pattern used when the video file cannot be opened")
                .value_parser(clap::value_parser!(i64))
                .default_value("1"),
        )
}

/// Usage line, as printed by `vswitch help`.
pub fn usage() -> String {
    command().render_usage().to_string()
}

/// Parse the command line.
///
/// `vswitch help`, `-h` and `-V` produce [`Invocation::Help`]. Any other
/// clap error is returned for the caller to report.
pub fn from_args<I, T>(args: I) -> Result<Invocation, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = match command().try_get_matches_from(args) {
        Ok(matches) => matches,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            return Ok(Invocation::Help(e.to_string()));
        }
        Err(e) => return Err(e),
    };

    if matches
        .get_one::<String>("video-file")
        .is_some_and(|arg| arg == "help")
    {
        return Ok(Invocation::Help(usage()));
    }

    Ok(Invocation::Run(config_from(&matches)))
}

fn config_from(matches: &ArgMatches) -> AppConfig {
    let mut config = AppConfig::default();

    if let Some(file) = matches.get_one::<String>("video-file") {
        config = config.with_video_file(file);
    }
    if let Some(raw) = matches.get_one::<String>("switch-period") {
        config = config.with_switch_period(parse_period(raw));
    }
    if let Some(location) = matches.get_one::<String>("location") {
        config = config.with_rtsp_location(location);
    }
    if let Some(pattern) = matches.get_one::<i64>("pattern") {
        config = config.with_test_pattern(*pattern);
    }
    config
}

/// Parse a period in milliseconds, falling back to the default.
///
/// Zero is rejected along with anything that is not a whole number.
pub fn parse_period(raw: &str) -> Duration {
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Duration::from_millis(ms),
        _ => {
            tracing::warn!(
                "Incorrect switching period was specified: {raw}. Applying default: {}",
                DEFAULT_SWITCH_PERIOD.as_millis()
            );
            DEFAULT_SWITCH_PERIOD
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn run(args: &[&str]) -> AppConfig {
        match from_args(args.iter().copied()).unwrap() {
            Invocation::Run(config) => config,
            Invocation::Help(text) => panic!("unexpected help: {text}"),
        }
    }

    #[test]
    fn test_no_arguments_use_defaults() {
        let config = run(&["vswitch"]);
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.switch_period, Duration::from_millis(5000));
        assert_eq!(config.caps(), "video/x-raw,width=640,height=480");
    }

    #[test]
    fn test_positional_arguments() {
        let config = run(&["vswitch", "/tmp/clip.mp4", "1000"]);
        assert_eq!(config.video_file(), Some(Path::new("/tmp/clip.mp4")));
        assert_eq!(config.switch_period, Duration::from_millis(1000));
    }

    #[test]
    fn test_bad_period_falls_back() {
        let config = run(&["vswitch", "/tmp/clip.mp4", "soon"]);
        assert_eq!(config.switch_period, DEFAULT_SWITCH_PERIOD);
        assert_eq!(parse_period("0"), DEFAULT_SWITCH_PERIOD);
        assert_eq!(parse_period("-5"), DEFAULT_SWITCH_PERIOD);
        assert_eq!(parse_period(" 250 "), Duration::from_millis(250));
    }

    #[test]
    fn test_hyphenated_period_falls_back() {
        for period in ["-5", "-fast"] {
            let config = run(&["vswitch", "/tmp/clip.mp4", period]);
            assert_eq!(config.switch_period, DEFAULT_SWITCH_PERIOD);
            assert_eq!(config.video_file(), Some(Path::new("/tmp/clip.mp4")));
        }
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_bad_period_warning_is_logged() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let config = tracing::subscriber::with_default(subscriber, || run(&["vswitch", "f", "soon"]));
        assert_eq!(config.switch_period, DEFAULT_SWITCH_PERIOD);

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("WARN"), "{output}");
        assert!(
            output.contains("Incorrect switching period was specified: soon. Applying default: 5000"),
            "{output}"
        );
    }

    #[test]
    fn test_help_word_prints_usage() {
        match from_args(["vswitch", "help"]).unwrap() {
            Invocation::Help(text) => assert!(text.contains("VIDEO_FILE")),
            other => panic!("expected help, got {other:?}"),
        }
        assert!(matches!(
            from_args(["vswitch", "--help"]).unwrap(),
            Invocation::Help(_)
        ));
    }

    #[test]
    fn test_options() {
        let config = run(&[
            "vswitch",
            "--location",
            "rtsp://camera.local/live",
            "--pattern",
            "18",
        ]);
        assert_eq!(config.rtsp_location, "rtsp://camera.local/live");
        assert_eq!(config.test_pattern, 18);
        assert_eq!(config.video_file, None);
    }

    #[test]
    fn test_too_many_arguments_is_an_error() {
        assert!(from_args(["vswitch", "a", "1", "extra"]).is_err());
    }

    #[test]
    fn test_builder() {
        let config = AppConfig::default()
            .with_resolution(320, 240)
            .with_switch_period(Duration::from_millis(10));
        assert_eq!(config.caps(), "video/x-raw,width=320,height=240");
        assert_eq!(config.switch_period.as_millis(), 10);
    }
}
