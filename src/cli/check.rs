use std::io;

use anyhow::Result;
use owo_colors::OwoColorize;
use tracing::{Instrument, Span, debug, info_span, instrument};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::board::DecodedRecord;
use crate::cli::{CheckArgs, OutputFormat};
use crate::error::CliConfigError;
use crate::hw::HardwareClient;
use crate::session::{ResultSink, SessionController, SessionOutcome};
use crate::terminal::TerminalClient;

use super::ui::{Painter, RecordView};

/// Mirrors session status lines onto a progress span.
struct ProgressSink {
    span: Span,
}

impl ProgressSink {
    fn new(span: Span) -> Self {
        Self { span }
    }
}

impl ResultSink for ProgressSink {
    fn report(&mut self, outcome: &SessionOutcome) {
        debug!(status = outcome.status(), terminal = outcome.is_terminal(), "session update");
        let message = progress_message(outcome);
        if outcome.is_terminal() {
            self.span.pb_set_finish_message(&message);
        } else {
            self.span.pb_set_message(&message);
        }
    }
}

fn progress_message(outcome: &SessionOutcome) -> String {
    match outcome {
        SessionOutcome::InProgress(status) => status.clone(),
        SessionOutcome::Success(_record) => format!("{} {}", "✓".green(), outcome.status()),
        SessionOutcome::Failed(status) => format!("{} {status}", "✗".red()),
    }
}

/// Executes the `check` command.
#[instrument(
    skip(client, args, out, terminal_client),
    level = "debug",
    fields(profile = %args.profile(), ?output_format)
)]
pub(crate) async fn run<W>(
    client: Box<dyn HardwareClient>,
    args: &CheckArgs,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let progress = info_span!("check_progress");
    let mut sink = ProgressSink::new(progress.clone());
    let mut controller = SessionController::new(args.session_config());

    let outcome = controller
        .check(client.as_ref(), &mut sink)
        .instrument(progress)
        .await?;

    let painter = Painter::new(terminal_client.stdout_is_terminal());
    match (&outcome, output_format) {
        (SessionOutcome::Success(record), OutputFormat::Pretty) => {
            writeln!(out, "{}", RecordView::new(record, &painter))?;
        }
        (SessionOutcome::Success(record), OutputFormat::Json) => write_json(out, record)?,
        (SessionOutcome::Failed(status), OutputFormat::Pretty) => {
            writeln!(out, "{}", painter.failure(status))?;
        }
        (SessionOutcome::Failed(status), OutputFormat::Json) => {
            write_json(out, &DecodedRecord::status(status.as_str()))?;
        }
        (SessionOutcome::InProgress(_status), _) => {}
    }

    if let SessionOutcome::Failed(_status) = outcome {
        return Err(CliConfigError::CheckFailed {
            attempts: controller.attempts_used(),
        }
        .into());
    }
    Ok(())
}

fn write_json<W>(out: &mut W, record: &DecodedRecord) -> Result<()>
where
    W: io::Write,
{
    serde_json::to_writer_pretty(&mut *out, record)?;
    writeln!(out)?;
    Ok(())
}
