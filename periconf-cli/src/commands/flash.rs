//! Flash command implementation.

use {
    super::Context,
    crate::CliError,
    anyhow::Result,
    console::style,
    indicatif::{ProgressBar, ProgressStyle},
    log::{debug, warn},
    periconf::{EsptoolCommand, FlashEvent, FlashOperation, FlashParams, FlashState},
    std::path::{Path, PathBuf},
};

/// Firmware to flash: the given path, or the board's image in `flash.firmware_dir`.
pub(crate) fn resolve_firmware(ctx: &Context, firmware: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = firmware {
        return Ok(path.to_path_buf());
    }

    let Some(image) = ctx
        .profile
        .default_firmware
    else {
        return Err(CliError::Usage(format!(
            "{} has no default firmware image; pass the FIRMWARE path",
            ctx.profile
                .title
        ))
        .into());
    };

    let dir = ctx
        .config
        .flash
        .firmware_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(dir.join(image))
}

fn flash_params(ctx: &Context) -> FlashParams {
    match ctx
        .config
        .flash
        .baud
    {
        Some(baud) => FlashParams::default().with_baud(baud),
        None => FlashParams::default(),
    }
}

fn state_message(state: FlashState) -> &'static str {
    match state {
        FlashState::Idle => "",
        FlashState::Copying => "Preparing image...",
        FlashState::Flashing => "Flashing...",
        FlashState::Succeeded => "Complete",
        FlashState::Failed => "Failed",
    }
}

/// Flash command implementation.
pub(crate) fn cmd_flash(ctx: &mut Context, firmware: Option<&Path>) -> Result<()> {
    let firmware = resolve_firmware(ctx, firmware)?;
    let params = flash_params(ctx);
    let tool = EsptoolCommand::new(ctx.config.flash_tool()).with_prefix_args(
        ctx.config
            .flash
            .tool_args
            .clone(),
    );

    if ctx.dry_run {
        let port = ctx
            .port
            .clone()
            .or_else(|| {
                ctx.config
                    .port
                    .serial
                    .clone()
            });
        let operation = FlashOperation::new(port.clone(), &firmware, tool.clone())
            .with_params(params.clone());
        operation.check_preconditions()?;

        let mut line = vec![
            tool.program()
                .display()
                .to_string(),
        ];
        line.extend(
            ctx.config
                .flash
                .tool_args
                .iter()
                .cloned(),
        );
        line.extend(params.args(&port.unwrap_or_default(), &firmware));
        println!("{}", line.join(" "));
        return Ok(());
    }

    let port = ctx.resolve_port()?;
    let operation = FlashOperation::new(Some(port.clone()), &firmware, tool).with_params(params);
    operation.check_preconditions()?;

    if !ctx.quiet {
        eprintln!(
            "{} Flashing {} through {}",
            style("⚡").yellow(),
            style(firmware.display()).cyan(),
            style(&port).cyan()
        );
    }

    let pb = if ctx.quiet || !console::Term::stderr().is_term() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(100);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb
    };

    let handle = operation.start()?;
    let result = handle.wait_with_events(|event| match event {
        FlashEvent::State(state) => pb.set_message(state_message(state)),
        FlashEvent::Progress(percent) => pb.set_position(u64::from(percent)),
        FlashEvent::Output(text) => debug!("esptool: {}", text.trim_end()),
        FlashEvent::Warning(message) => pb.suspend(|| warn!("{message}")),
    });

    match result {
        Ok(report) => {
            pb.finish_with_message(state_message(FlashState::Succeeded));
            if let Some(warning) = report.cleanup_warning {
                warn!("{warning}");
            }
            if !ctx.quiet {
                eprintln!("\n{} Flash completed", style("✓").green().bold());
            }
            Ok(())
        },
        Err(periconf::Error::FlashFailure { output }) => {
            pb.abandon_with_message(state_message(FlashState::Failed));
            eprintln!("{}", style("Flashing tool output:").for_stderr().bold());
            eprintln!("{output}");
            Err(anyhow::anyhow!("Flashing failed"))
        },
        Err(err) => {
            pb.abandon();
            Err(err.into())
        },
    }
}
