use bollard::{
    Docker,
    container::LogOutput,
    exec::{CreateExecOptions, StartExecResults},
};
use futures::{Stream, StreamExt};

use crate::{errors::RuntimeError, events::EventSink, runtime::ExecSpec};

/// Maximum length of a buffered partial line. Output without newlines (progress bars,
/// binary data) is flushed in pieces of this size.
const MAX_LINE_BYTES: usize = 64 * 1024; // 64 KB

/// Execute a command in the running container, forwarding its output line by line,
/// and return its exit code.
pub async fn exec(
    client: &Docker,
    id: &str,
    spec: &ExecSpec,
    events: &EventSink,
) -> Result<i64, RuntimeError> {
    let options = CreateExecOptions {
        cmd: Some(spec.command.clone()),
        user: spec.user.clone(),
        working_dir: spec.workdir.clone(),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        ..Default::default()
    };
    let exec = client.create_exec(id, options).await?;

    match client.start_exec(&exec.id, None).await? {
        StartExecResults::Attached { output, .. } => forward_output(output, events).await,
        StartExecResults::Detached => {
            return Err(RuntimeError::Rejected("exec was started detached".into()));
        }
    }

    let inspect = client.inspect_exec(&exec.id).await?;
    inspect.exit_code.ok_or_else(|| {
        RuntimeError::Rejected(format!("exec in container '{id}' finished without an exit code"))
    })
}

/// Send the stdout and stderr of an exec to the event sink, one line at a time.
async fn forward_output(
    mut output: impl Stream<Item = Result<LogOutput, bollard::errors::Error>> + Unpin,
    events: &EventSink,
) {
    let mut stdout = LineBuffer::default();
    let mut stderr = LineBuffer::default();
    while let Some(output_result) = output.next().await {
        match output_result {
            Ok(LogOutput::StdOut { message }) => {
                for line in stdout.push(&message) {
                    events.stdout(line).await;
                }
            }
            Ok(LogOutput::StdErr { message }) => {
                for line in stderr.push(&message) {
                    events.stderr(line).await;
                }
            }
            Ok(_) => {}
            Err(err) => {
                events
                    .debug(format!("Error while processing output: {err}"))
                    .await
            }
        }
    }
    if let Some(line) = stdout.finish() {
        events.stdout(line).await;
    }
    if let Some(line) = stderr.finish() {
        events.stderr(line).await;
    }
}

/// Splits an output stream into lines, holding back an incomplete last line up to
/// [`MAX_LINE_BYTES`].
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            lines.push(Self::decode(&line));
        }
        if self.pending.len() >= MAX_LINE_BYTES {
            lines.extend(self.finish());
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        Some(Self::decode(&line))
    }

    fn decode(line: &[u8]) -> String {
        let line = line.strip_suffix(b"\n").unwrap_or(line);
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        String::from_utf8_lossy(line).into_owned()
    }
}
