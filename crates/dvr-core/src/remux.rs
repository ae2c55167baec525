//! Reassembly handoff: hand the ordered parts to ffmpeg for a lossless
//! stream-copy concat.
//!
//! ffmpeg's concat demuxer reads a list file, one `file '<path>'` line
//! per part. Its parser is strict: LF endings, ASCII paths, no quotes
//! inside the quoted path. Paths that cannot be written that way are
//! rejected up front instead of escaped; segment filenames we generate
//! ourselves are always ASCII, so this only bites hand-supplied output
//! locations.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

pub const DEFAULT_TOOL: &str = "ffmpeg";

#[derive(Debug, thiserror::Error)]
pub enum RemuxError {
    /// The external tool could not be spawned at all.
    #[error("multiplexer unavailable: {0}")]
    ToolMissing(String),

    /// A part path cannot be represented in a concat list line.
    #[error("part path not representable in a concat list: {}", path.display())]
    InvalidPartPath { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Both the plain attempt and the +genpts retry failed.
    #[error("concat failed twice\n-- first attempt --\n{first}\n-- genpts retry --\n{second}")]
    ConcatFailed { first: String, second: String },
}

/// Checks that `ffmpeg` resolves and runs. Called once before any work
/// is queued so a missing tool fails the job early, not after the
/// segments are already on disk.
pub async fn verify_tool(ffmpeg: &str) -> Result<(), RemuxError> {
    let status = Command::new(ffmpeg)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(RemuxError::ToolMissing(format!(
            "{ffmpeg} -version exited with {status}"
        ))),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(RemuxError::ToolMissing(
            format!("{ffmpeg} not found; install ffmpeg or set ffmpeg_path in the config"),
        )),
        Err(err) => Err(err.into()),
    }
}

/// Writes the concat list for `parts`, in the order given, to
/// `list_path`. Every line is `file '<path>'` with an LF ending.
pub fn write_concat_list(parts: &[PathBuf], list_path: &Path) -> Result<(), RemuxError> {
    let mut body = String::new();
    for part in parts {
        let path = list_safe_path(part)
            .ok_or_else(|| RemuxError::InvalidPartPath { path: part.clone() })?;
        body.push_str("file '");
        body.push_str(path);
        body.push_str("'\n");
    }
    std::fs::write(list_path, body)?;
    Ok(())
}

fn list_safe_path(path: &Path) -> Option<&str> {
    let s = path.to_str()?;
    if !s.is_ascii() || s.contains('\'') || s.chars().any(|c| c.is_control()) {
        return None;
    }
    Some(s)
}

/// Concatenates `parts` into `output` via the concat demuxer, stream
/// copy only. On a non-zero exit the call is repeated once with
/// `-fflags +genpts`; segment streams with broken timestamps usually
/// pass on the second try. Both failures together surface as
/// [`RemuxError::ConcatFailed`].
pub async fn reassemble(
    ffmpeg: &str,
    parts: &[PathBuf],
    list_path: &Path,
    output: &Path,
) -> Result<(), RemuxError> {
    verify_tool(ffmpeg).await?;
    write_concat_list(parts, list_path)?;

    tracing::info!(parts = parts.len(), output = %output.display(), "remuxing");
    let first = match run_concat(ffmpeg, list_path, output, false).await? {
        Ok(()) => return Ok(()),
        Err(captured) => captured,
    };

    tracing::warn!("concat failed, retrying with +genpts");
    match run_concat(ffmpeg, list_path, output, true).await? {
        Ok(()) => Ok(()),
        Err(second) => Err(RemuxError::ConcatFailed { first, second }),
    }
}

/// One concat attempt. `Ok(Err(text))` is a tool failure with its
/// captured output; the outer error is for spawn-level problems.
async fn run_concat(
    ffmpeg: &str,
    list_path: &Path,
    output: &Path,
    genpts: bool,
) -> Result<Result<(), String>, RemuxError> {
    let mut cmd = Command::new(ffmpeg);
    cmd.arg("-f")
        .arg("concat")
        .arg("-safe")
        .arg("0")
        .arg("-protocol_whitelist")
        .arg("file,concat,crypto,data")
        .arg("-i")
        .arg(list_path);
    if genpts {
        cmd.arg("-fflags").arg("+genpts");
    }
    cmd.arg("-c")
        .arg("copy")
        .arg("-movflags")
        .arg("+faststart")
        .arg("-y")
        .arg(output)
        .stdin(Stdio::null());

    let out = cmd.output().await.map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            RemuxError::ToolMissing(format!("{ffmpeg} disappeared mid-run"))
        } else {
            RemuxError::Io(err)
        }
    })?;

    if out.status.success() {
        return Ok(Ok(()));
    }
    let mut captured = format!("exit {}\n", out.status);
    captured.push_str(&String::from_utf8_lossy(&out.stderr));
    if !out.stdout.is_empty() {
        captured.push_str(&String::from_utf8_lossy(&out.stdout));
    }
    Ok(Err(captured))
}
