//! Firmware flashing through an external utility.
//!
//! A [`FlashOperation`] copies the firmware image into a scratch directory,
//! runs the flashing utility against it on a worker thread and streams the
//! utility's combined output through a [`ProgressTracker`]. The run succeeds
//! only if the utility finished and its output contains [`SUCCESS_MARKER`].
//!
//! The worker never touches a [`DeviceSession`](crate::session::DeviceSession):
//! the utility claims the serial port itself, so callers must close any session
//! on that port first.

use {
    crate::{
        error::{Error, FlashPrecondition, Result},
        progress::ProgressTracker,
        text::take_complete,
    },
    log::{debug, error, info, warn},
    std::{
        fs::{self, File},
        io::Read,
        path::{Path, PathBuf},
        process::{Command, Stdio},
        sync::mpsc,
        thread::{self, JoinHandle},
    },
};

/// Output fragment that confirms a verified write.
pub const SUCCESS_MARKER: &str = "Hash of data verified";

/// Reported as the failure output when the utility printed nothing.
pub const NO_OUTPUT_PLACEHOLDER: &str = "(no output from the flashing tool)";

/// Default flashing utility program.
pub const DEFAULT_TOOL: &str = "esptool.py";

/// Fixed `write_flash` parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlashParams {
    /// Target chip.
    pub chip: String,
    /// Flashing baud rate.
    pub baud: u32,
    /// Reset sequence before flashing.
    pub before: String,
    /// Reset sequence after flashing.
    pub after: String,
    /// SPI flash mode.
    pub flash_mode: String,
    /// SPI flash frequency.
    pub flash_freq: String,
    /// Flash size.
    pub flash_size: String,
    /// Application offset.
    pub offset: u32,
}

impl Default for FlashParams {
    fn default() -> Self {
        Self {
            chip: "esp32".to_string(),
            baud: 921_600,
            before: "default_reset".to_string(),
            after: "hard_reset".to_string(),
            flash_mode: "dio".to_string(),
            flash_freq: "80m".to_string(),
            flash_size: "4MB".to_string(),
            offset: 0x10000,
        }
    }
}

impl FlashParams {
    /// Set the flashing baud rate.
    #[must_use]
    pub fn with_baud(mut self, baud: u32) -> Self {
        self.baud = baud;
        self
    }

    /// Command-line arguments for writing `firmware` through `port`.
    #[must_use]
    pub fn args(&self, port: &str, firmware: &Path) -> Vec<String> {
        vec![
            "--chip".to_string(),
            self.chip.clone(),
            "--port".to_string(),
            port.to_string(),
            "--baud".to_string(),
            self.baud.to_string(),
            "--before".to_string(),
            self.before.clone(),
            "--after".to_string(),
            self.after.clone(),
            "write_flash".to_string(),
            "--flash_mode".to_string(),
            self.flash_mode.clone(),
            "--flash_freq".to_string(),
            self.flash_freq.clone(),
            "--flash_size".to_string(),
            self.flash_size.clone(),
            format!("{:#x}", self.offset),
            firmware
                .display()
                .to_string(),
        ]
    }
}

/// Lifecycle of a flash run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashState {
    /// Not started.
    Idle,
    /// Copying the image to the scratch directory.
    Copying,
    /// The utility is running.
    Flashing,
    /// Verified write.
    Succeeded,
    /// Anything else.
    Failed,
}

impl FlashState {
    /// Whether no further events follow.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Event sent from the flash worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashEvent {
    /// State transition.
    State(FlashState),
    /// New percentage, strictly greater than the previous one.
    Progress(u8),
    /// Raw output fragment from the utility.
    Output(String),
    /// Non-fatal problem, e.g. the scratch copy could not be removed.
    Warning(String),
}

/// How the utility finished, when it did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolExit {
    /// Ran to completion and reported success.
    Completed,
    /// Stopped with a failure status, with the exit code if known.
    Exited(Option<i32>),
}

/// A flashing utility.
///
/// `run` must call `output` with every fragment of combined stdout/stderr as
/// soon as it is available. An `Err` means the utility could not run or
/// crashed. Only [`ToolExit::Completed`] together with the success marker
/// counts as a good flash.
pub trait FlashTool: Send + 'static {
    /// Run the utility with `args`.
    fn run(&mut self, args: &[String], output: &mut dyn FnMut(&str)) -> Result<ToolExit>;
}

/// Runs esptool (or a compatible program) as a child process.
#[derive(Debug, Clone)]
pub struct EsptoolCommand {
    program: PathBuf,
    prefix_args: Vec<String>,
}

impl Default for EsptoolCommand {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL)
    }
}

impl EsptoolCommand {
    /// Use `program` as the flashing utility.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            prefix_args: Vec::new(),
        }
    }

    /// Arguments placed before the flashing arguments (e.g. `-m esptool`).
    #[must_use]
    pub fn with_prefix_args(mut self, args: Vec<String>) -> Self {
        self.prefix_args = args;
        self
    }

    /// The program that will be started.
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl FlashTool for EsptoolCommand {
    fn run(&mut self, args: &[String], output: &mut dyn FnMut(&str)) -> Result<ToolExit> {
        debug!(
            "Running {} {} {}",
            self.program.display(),
            self.prefix_args.join(" "),
            args.join(" ")
        );

        let mut child = Command::new(&self.program)
            .args(&self.prefix_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("failed to start {}: {e}", self.program.display()),
                ))
            })?;

        let (tx, rx) = mpsc::channel::<String>();
        let mut readers = Vec::new();
        if let Some(stdout) = child
            .stdout
            .take()
        {
            readers.push(spawn_reader(stdout, tx.clone()));
        }
        if let Some(stderr) = child
            .stderr
            .take()
        {
            readers.push(spawn_reader(stderr, tx.clone()));
        }
        drop(tx);

        for fragment in rx {
            output(&fragment);
        }
        for reader in readers {
            let _ = reader.join();
        }

        let status = child.wait()?;
        if status.success() {
            Ok(ToolExit::Completed)
        } else {
            Ok(ToolExit::Exited(status.code()))
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut stream: R, tx: mpsc::Sender<String>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut buf = [0u8; 1024];
        let mut pending = Vec::new();
        loop {
            match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    pending.extend_from_slice(&buf[..n]);
                    let complete = take_complete(&mut pending);
                    if complete.is_empty() {
                        continue;
                    }
                    let text = String::from_utf8_lossy(&complete).into_owned();
                    if tx.send(text).is_err() {
                        break;
                    }
                },
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {},
                Err(_) => break,
            }
        }
        if !pending.is_empty() {
            let _ = tx.send(String::from_utf8_lossy(&pending).into_owned());
        }
    })
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashReport {
    /// Everything the utility printed.
    pub output: String,
    /// Set when the scratch copy could not be removed.
    pub cleanup_warning: Option<String>,
}

/// One flash request.
pub struct FlashOperation<T: FlashTool> {
    port: Option<String>,
    firmware: PathBuf,
    tool: T,
    params: FlashParams,
}

impl<T: FlashTool> FlashOperation<T> {
    /// Flash `firmware` through `port` using `tool` with the default parameters.
    pub fn new(port: Option<String>, firmware: impl Into<PathBuf>, tool: T) -> Self {
        Self {
            port,
            firmware: firmware.into(),
            tool,
            params: FlashParams::default(),
        }
    }

    /// Override the flashing parameters.
    #[must_use]
    pub fn with_params(mut self, params: FlashParams) -> Self {
        self.params = params;
        self
    }

    /// Firmware image path.
    pub fn firmware(&self) -> &Path {
        &self.firmware
    }

    /// Check that a port is selected and the firmware can be read.
    pub fn check_preconditions(&self) -> Result<()> {
        let refuse = |reason| Err(Error::FlashPrecondition(reason));

        if self
            .port
            .as_deref()
            .is_none_or(|p| p.trim().is_empty())
        {
            return refuse(FlashPrecondition::NoPort);
        }
        if !self.firmware.exists() {
            return refuse(FlashPrecondition::FirmwareMissing(self.firmware.clone()));
        }
        if !self.firmware.is_file() {
            return refuse(FlashPrecondition::FirmwareUnreadable {
                path: self.firmware.clone(),
                reason: "not a regular file".to_string(),
            });
        }
        if let Err(e) = File::open(&self.firmware) {
            return refuse(FlashPrecondition::FirmwareUnreadable {
                path: self.firmware.clone(),
                reason: e.to_string(),
            });
        }
        Ok(())
    }

    /// Check the preconditions and start the run on a worker thread.
    ///
    /// Returns immediately. Nothing is spawned when a precondition fails.
    pub fn start(self) -> Result<FlashHandle> {
        self.check_preconditions()?;

        let (tx, rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("periconf-flash".to_string())
            .spawn(move || {
                self.execute(&mut |event| {
                    let _ = tx.send(event);
                })
            })?;

        Ok(FlashHandle {
            events: rx,
            worker,
        })
    }

    /// Run to completion on the calling thread.
    pub fn run(self, on_event: &mut dyn FnMut(FlashEvent)) -> Result<FlashReport> {
        self.check_preconditions()?;
        self.execute(on_event)
    }

    fn execute(mut self, emit: &mut dyn FnMut(FlashEvent)) -> Result<FlashReport> {
        let port = self
            .port
            .clone()
            .unwrap_or_default();

        emit(FlashEvent::State(FlashState::Copying));
        let (scratch, image) = match self.copy_to_scratch() {
            Ok(copied) => copied,
            Err(e) => {
                error!("{e}");
                emit(FlashEvent::State(FlashState::Failed));
                return Err(e);
            },
        };

        emit(FlashEvent::State(FlashState::Flashing));
        info!("Flashing {} via {port}", self.firmware.display());
        let args = self
            .params
            .args(&port, &image);

        let mut captured = String::new();
        let mut tracker = ProgressTracker::new();
        let mut last_percent: Option<u8> = None;
        let outcome = {
            let mut on_output = |fragment: &str| {
                captured.push_str(fragment);
                emit(FlashEvent::Output(fragment.to_string()));
                if let Some(pct) = tracker.append(fragment) {
                    if last_percent.is_none_or(|last| pct > last) {
                        last_percent = Some(pct);
                        emit(FlashEvent::Progress(pct));
                    }
                }
            };
            self.tool
                .run(&args, &mut on_output)
        };

        let cleanup_warning = match scratch.close() {
            Ok(()) => None,
            Err(e) => {
                let msg = format!("could not remove scratch copy of the firmware: {e}");
                warn!("{msg}");
                emit(FlashEvent::Warning(msg.clone()));
                Some(msg)
            },
        };

        let verified = captured.contains(SUCCESS_MARKER);
        match outcome {
            Ok(ToolExit::Completed) if verified => {
                if last_percent != Some(100) {
                    emit(FlashEvent::Progress(100));
                }
                emit(FlashEvent::State(FlashState::Succeeded));
                info!("Firmware written and verified");
                Ok(FlashReport {
                    output: captured,
                    cleanup_warning,
                })
            },
            Ok(ToolExit::Completed) => {
                warn!("Flashing tool finished without confirming the write");
                emit(FlashEvent::State(FlashState::Failed));
                Err(Error::FlashFailure {
                    output: failure_output(captured, None),
                })
            },
            Ok(ToolExit::Exited(code)) => {
                let cause = match code {
                    Some(code) => format!("flashing tool exited with status {code}"),
                    None => "flashing tool was terminated".to_string(),
                };
                warn!("{cause}");
                emit(FlashEvent::State(FlashState::Failed));
                Err(Error::FlashFailure {
                    output: failure_output(captured, Some(cause)),
                })
            },
            Err(e) => {
                error!("Flashing tool failed: {e}");
                emit(FlashEvent::State(FlashState::Failed));
                Err(Error::FlashFailure {
                    output: failure_output(captured, Some(e.to_string())),
                })
            },
        }
    }

    fn copy_to_scratch(&self) -> Result<(tempfile::TempDir, PathBuf)> {
        let scratch = tempfile::Builder::new()
            .prefix("periconf-flash-")
            .tempdir()
            .map_err(|e| Error::FlashIo(format!("cannot create scratch directory: {e}")))?;

        let name = self
            .firmware
            .file_name()
            .map_or_else(|| "firmware.bin".into(), std::ffi::OsStr::to_os_string);
        let image = scratch
            .path()
            .join(name);
        fs::copy(&self.firmware, &image).map_err(|e| {
            Error::FlashIo(format!(
                "cannot copy {} to {}: {e}",
                self.firmware.display(),
                image.display()
            ))
        })?;
        debug!("Copied firmware to {}", image.display());
        Ok((scratch, image))
    }
}

fn failure_output(captured: String, cause: Option<String>) -> String {
    let mut output = if captured.trim().is_empty() {
        NO_OUTPUT_PLACEHOLDER.to_string()
    } else {
        captured
    };
    if let Some(cause) = cause {
        if !output.ends_with('\n') {
            output.push('\n');
        }
        output.push_str(&cause);
    }
    output
}

/// Handle to a running flash.
pub struct FlashHandle {
    events: mpsc::Receiver<FlashEvent>,
    worker: JoinHandle<Result<FlashReport>>,
}

impl FlashHandle {
    /// Events produced since the last call, without blocking.
    pub fn poll_events(&self) -> Vec<FlashEvent> {
        self.events
            .try_iter()
            .collect()
    }

    /// Whether the worker has finished.
    pub fn is_finished(&self) -> bool {
        self.worker
            .is_finished()
    }

    /// Forward every remaining event to `on_event`, then return the outcome.
    pub fn wait_with_events(self, mut on_event: impl FnMut(FlashEvent)) -> Result<FlashReport> {
        for event in &self.events {
            on_event(event);
        }
        self.wait()
    }

    /// Block until the worker finishes. Undelivered events are dropped.
    pub fn wait(self) -> Result<FlashReport> {
        self.worker
            .join()
            .unwrap_or_else(|_| {
                Err(Error::FlashFailure {
                    output: "flash worker panicked".to_string(),
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        tempfile::TempDir,
    };

    enum Outcome {
        Exit(ToolExit),
        Fail(String),
    }

    /// Tool that replays canned output.
    struct Scripted {
        fragments: Vec<&'static str>,
        outcome: Outcome,
        calls: Arc<AtomicUsize>,
        seen_image: Arc<Mutex<Option<(PathBuf, bool)>>>,
    }

    impl Scripted {
        fn new(fragments: Vec<&'static str>, outcome: Outcome) -> Self {
            Self {
                fragments,
                outcome,
                calls: Arc::new(AtomicUsize::new(0)),
                seen_image: Arc::new(Mutex::new(None)),
            }
        }
    }

    impl FlashTool for Scripted {
        fn run(&mut self, args: &[String], output: &mut dyn FnMut(&str)) -> Result<ToolExit> {
            self.calls
                .fetch_add(1, Ordering::SeqCst);
            let image = PathBuf::from(args.last().unwrap());
            let exists = image.exists();
            *self
                .seen_image
                .lock()
                .unwrap() = Some((image, exists));
            for fragment in &self.fragments {
                output(fragment);
            }
            match &self.outcome {
                Outcome::Exit(exit) => Ok(*exit),
                Outcome::Fail(msg) => Err(Error::Io(std::io::Error::other(msg.clone()))),
            }
        }
    }

    fn firmware(dir: &TempDir) -> PathBuf {
        let path = dir
            .path()
            .join("esp32.bin");
        fs::write(&path, [0xE9u8; 64]).unwrap();
        path
    }

    fn progress(events: &[FlashEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e {
                FlashEvent::Progress(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    const SUCCESS_RUN: [&str; 5] = [
        "Connecting....\nChip is ESP32-D0WD\n",
        "Writing at 0x00010000... (12 %)\r",
        "Writing at 0x00020000... (4",
        "5 %)\r",
        "Wrote 65536 bytes\nHash of data verified.\nHard resetting via RTS pin...\n",
    ];

    #[test]
    fn test_default_args() {
        let args = FlashParams::default().args("/dev/ttyUSB0", Path::new("/tmp/fw.bin"));
        assert_eq!(
            args.join(" "),
            "--chip esp32 --port /dev/ttyUSB0 --baud 921600 --before default_reset \
             --after hard_reset write_flash --flash_mode dio --flash_freq 80m \
             --flash_size 4MB 0x10000 /tmp/fw.bin"
        );
    }

    #[test]
    fn test_missing_firmware_refused_before_spawning() {
        let tool = Scripted::new(vec![], Outcome::Exit(ToolExit::Completed));
        let calls = Arc::clone(&tool.calls);
        let op = FlashOperation::new(Some("COM3".into()), "/nonexistent/esp32.bin", tool);
        match op.start() {
            Err(Error::FlashPrecondition(FlashPrecondition::FirmwareMissing(path))) => {
                assert_eq!(path, PathBuf::from("/nonexistent/esp32.bin"));
            },
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("flash started without firmware"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_no_port_refused() {
        let dir = TempDir::new().unwrap();
        let fw = firmware(&dir);
        for port in [None, Some(String::new()), Some("  ".to_string())] {
            let op = FlashOperation::new(
                port,
                &fw,
                Scripted::new(vec![], Outcome::Exit(ToolExit::Completed)),
            );
            assert!(matches!(
                op.check_preconditions(),
                Err(Error::FlashPrecondition(FlashPrecondition::NoPort))
            ));
        }
    }

    #[test]
    fn test_directory_is_not_firmware() {
        let dir = TempDir::new().unwrap();
        let op = FlashOperation::new(
            Some("COM3".into()),
            dir.path(),
            Scripted::new(vec![], Outcome::Exit(ToolExit::Completed)),
        );
        assert!(matches!(
            op.check_preconditions(),
            Err(Error::FlashPrecondition(
                FlashPrecondition::FirmwareUnreadable { .. }
            ))
        ));
    }

    #[test]
    fn test_successful_run() {
        let dir = TempDir::new().unwrap();
        let fw = firmware(&dir);
        let tool = Scripted::new(SUCCESS_RUN.to_vec(), Outcome::Exit(ToolExit::Completed));
        let seen = Arc::clone(&tool.seen_image);

        let handle = FlashOperation::new(Some("/dev/ttyUSB0".into()), &fw, tool)
            .start()
            .unwrap();
        let mut events = Vec::new();
        let report = handle
            .wait_with_events(|e| events.push(e))
            .unwrap();

        assert!(report.output.contains(SUCCESS_MARKER));
        assert_eq!(report.cleanup_warning, None);
        assert_eq!(progress(&events), vec![12, 45, 100]);
        assert_eq!(
            events.first(),
            Some(&FlashEvent::State(FlashState::Copying))
        );
        assert_eq!(
            events.last(),
            Some(&FlashEvent::State(FlashState::Succeeded))
        );

        // The tool got a scratch copy with the same file name, removed afterwards
        let (image, existed) = seen
            .lock()
            .unwrap()
            .clone()
            .unwrap();
        assert!(existed);
        assert_ne!(image, fw);
        assert_eq!(image.file_name(), fw.file_name());
        assert!(!image.exists());
        assert!(fw.exists());
    }

    #[test]
    fn test_missing_marker_fails_with_output() {
        let dir = TempDir::new().unwrap();
        let fw = firmware(&dir);
        let tool = Scripted::new(
            vec!["Writing at 0x00010000... (100 %)\n", "Leaving...\n"],
            Outcome::Exit(ToolExit::Completed),
        );
        let mut events = Vec::new();
        let err = FlashOperation::new(Some("COM3".into()), &fw, tool)
            .run(&mut |e| events.push(e))
            .unwrap_err();
        match err {
            Error::FlashFailure { output } => assert!(output.contains("Leaving...")),
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(events.last(), Some(&FlashEvent::State(FlashState::Failed)));
    }

    #[test]
    fn test_tool_error_without_output_uses_placeholder() {
        let dir = TempDir::new().unwrap();
        let fw = firmware(&dir);
        let tool = Scripted::new(vec![], Outcome::Fail("serial port busy".into()));
        let seen = Arc::clone(&tool.seen_image);
        let err = FlashOperation::new(Some("COM3".into()), &fw, tool)
            .run(&mut |_| {})
            .unwrap_err();
        match err {
            Error::FlashFailure { output } => {
                assert!(output.starts_with(NO_OUTPUT_PLACEHOLDER));
                assert!(output.contains("serial port busy"));
            },
            other => panic!("unexpected error {other}"),
        }
        // Scratch copy removed on the failure path too
        let (image, _) = seen
            .lock()
            .unwrap()
            .clone()
            .unwrap();
        assert!(!image.exists());
    }

    #[test]
    fn test_failure_exit_after_marker_fails() {
        let dir = TempDir::new().unwrap();
        let fw = firmware(&dir);
        let tool = Scripted::new(
            vec![
                "Hash of data verified.\n",
                "A fatal error occurred: hard reset failed\n",
            ],
            Outcome::Exit(ToolExit::Exited(Some(2))),
        );
        let mut events = Vec::new();
        let err = FlashOperation::new(Some("COM3".into()), &fw, tool)
            .run(&mut |e| events.push(e))
            .unwrap_err();
        match err {
            Error::FlashFailure { output } => {
                assert!(output.contains(SUCCESS_MARKER));
                assert!(output.contains("hard reset failed"));
                assert!(output.ends_with("exited with status 2"));
            },
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(events.last(), Some(&FlashEvent::State(FlashState::Failed)));
        assert!(!progress(&events).contains(&100));
    }

    #[test]
    fn test_progress_never_regresses() {
        let dir = TempDir::new().unwrap();
        let fw = firmware(&dir);
        let tool = Scripted::new(
            vec!["(30 %)", "(20 %)", "(30 %)", "(60 %)", "Hash of data verified\n"],
            Outcome::Exit(ToolExit::Completed),
        );
        let mut events = Vec::new();
        FlashOperation::new(Some("COM3".into()), &fw, tool)
            .run(&mut |e| events.push(e))
            .unwrap();
        assert_eq!(progress(&events), vec![30, 60, 100]);
    }

    #[test]
    fn test_poll_events_after_finish() {
        let dir = TempDir::new().unwrap();
        let fw = firmware(&dir);
        let tool = Scripted::new(SUCCESS_RUN.to_vec(), Outcome::Exit(ToolExit::Completed));
        let handle = FlashOperation::new(Some("COM3".into()), &fw, tool)
            .start()
            .unwrap();
        while !handle.is_finished() {
            thread::sleep(std::time::Duration::from_millis(5));
        }
        let events = handle.poll_events();
        assert!(events.contains(&FlashEvent::State(FlashState::Succeeded)));
        assert!(handle.wait().is_ok());
    }

    #[test]
    fn test_missing_program_is_a_flash_failure() {
        let dir = TempDir::new().unwrap();
        let fw = firmware(&dir);
        let tool = EsptoolCommand::new("periconf-no-such-flasher-program");
        let err = FlashOperation::new(Some("COM3".into()), &fw, tool)
            .run(&mut |_| {})
            .unwrap_err();
        match err {
            Error::FlashFailure { output } => {
                assert!(output.contains("periconf-no-such-flasher-program"));
            },
            other => panic!("unexpected error {other}"),
        }
    }

    #[cfg(unix)]
    fn shell_tool(script: &str) -> EsptoolCommand {
        EsptoolCommand::new("sh").with_prefix_args(vec![
            "-c".into(),
            script.into(),
            "sh".into(),
        ])
    }

    #[cfg(unix)]
    #[test]
    fn test_subprocess_output_from_both_streams() {
        let dir = TempDir::new().unwrap();
        let fw = firmware(&dir);
        let tool = shell_tool(
            "printf 'Writing at 0x00010000... (50 %%)\\n'; \
             printf 'Hash of data verified.\\n' >&2",
        );
        let mut events = Vec::new();
        let report = FlashOperation::new(Some("COM3".into()), &fw, tool)
            .run(&mut |e| events.push(e))
            .unwrap();

        assert!(report.output.contains("(50 %)"));
        assert!(report.output.contains(SUCCESS_MARKER));
        assert_eq!(progress(&events), vec![50, 100]);
        assert!(events.iter().any(|e| matches!(e, FlashEvent::Output(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_subprocess_failure_status() {
        let dir = TempDir::new().unwrap();
        let fw = firmware(&dir);
        let tool = shell_tool("echo 'Hash of data verified.'; echo 'reset failed' >&2; exit 3");
        let err = FlashOperation::new(Some("COM3".into()), &fw, tool)
            .run(&mut |_| {})
            .unwrap_err();
        match err {
            Error::FlashFailure { output } => {
                assert!(output.contains("reset failed"));
                assert!(output.ends_with("exited with status 3"));
            },
            other => panic!("unexpected error {other}"),
        }
    }
}
