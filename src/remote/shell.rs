// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! git CLI transport.
//!
//! ```text
//! fetch:  git --git-dir D fetch --no-tags URL +src:dst
//! push:   git --git-dir D push --porcelain URL src:dst
//!           stdout: "To URL"
//!                   "<flag>\t<src>:<dst>\t<summary>"
//!                   "Done"
//! ```

use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;

use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{RefSpec, RefUpdate, Remote, RemoteResult};
use crate::error::RemoteError;
use crate::odb::ObjectStore;

/// Remote reached through the `git` executable.
#[derive(Debug, Clone)]
pub struct ShellRemote {
    url: String,
}

impl ShellRemote {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    fn git_dir(local: &dyn ObjectStore) -> RemoteResult<&Path> {
        local.git_dir().ok_or_else(|| RemoteError::Transport {
            command: "git".to_string(),
            message: "the local object store has no git directory".to_string(),
        })
    }
}

/// Output of a finished git process.
#[derive(Debug)]
struct GitOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<String> {
    let mut bytes = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut bytes).await?;
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Run git with prompts disabled, killing it when `token` is cancelled.
fn run_git(git_dir: &Path, args: &[&str], token: &CancellationToken) -> RemoteResult<GitOutput> {
    if token.is_cancelled() {
        return Err(RemoteError::Cancelled);
    }
    super::runtime()?.block_on(run_git_async(git_dir, args, token))
}

async fn run_git_async(
    git_dir: &Path,
    args: &[&str],
    token: &CancellationToken,
) -> RemoteResult<GitOutput> {
    let command = format!("git {}", args.first().copied().unwrap_or_default());
    let transport = |message: String| RemoteError::Transport {
        command: command.clone(),
        message,
    };

    debug!(git_dir = %git_dir.display(), args = ?args, "running git");
    let mut child = Command::new("git")
        .arg("--git-dir")
        .arg(git_dir)
        .args(args)
        .env("GCM_INTERACTIVE", "never")
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| transport(format!("failed to execute git: {e}")))?;
    trace!(pid = ?child.id(), "spawned git");

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    // Dropping this future kills the child.
    let run = async move {
        tokio::try_join!(child.wait(), read_pipe(stdout), read_pipe(stderr))
    };

    tokio::select! {
        biased;
        () = token.cancelled() => {
            debug!(command = %command, "git cancelled");
            Err(RemoteError::Cancelled)
        }
        finished = run => {
            let (status, stdout, stderr) = finished.map_err(|e| transport(e.to_string()))?;
            Ok(GitOutput {
                success: status.success(),
                stdout,
                stderr,
            })
        }
    }
}

/// One ref line of `git push --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PorcelainLine {
    pub flag: char,
    pub dst: String,
    pub summary: String,
    pub reason: Option<String>,
}

fn porcelain_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([ +\-*!=])\t[^\t]*:([^\t]+)\t([^(]*?) *(?:\((.*)\))?$").ok())
        .as_ref()
}

pub(crate) fn parse_porcelain(stdout: &str) -> Vec<PorcelainLine> {
    let Some(re) = porcelain_regex() else {
        return Vec::new();
    };
    stdout
        .lines()
        .filter_map(|line| re.captures(line))
        .map(|caps| PorcelainLine {
            flag: caps[1].chars().next().unwrap_or(' '),
            dst: caps[2].to_string(),
            summary: caps[3].to_string(),
            reason: caps.get(4).map(|m| m.as_str().to_string()),
        })
        .collect()
}

fn is_non_fast_forward(line: &PorcelainLine) -> bool {
    line.flag == '!'
        && line
            .reason
            .as_deref()
            .is_some_and(|r| r == "non-fast-forward" || r == "fetch first")
}

impl Remote for ShellRemote {
    fn url(&self) -> &str {
        &self.url
    }

    fn fetch(
        &self,
        local: &dyn ObjectStore,
        spec: &RefSpec,
        token: &CancellationToken,
    ) -> RemoteResult<()> {
        let git_dir = Self::git_dir(local)?;
        let refspec = spec.to_string();
        let output = run_git(
            git_dir,
            &["fetch", "--no-tags", "--quiet", &self.url, &refspec],
            token,
        )?;
        if output.success {
            return Ok(());
        }
        // An empty remote has no branch yet.
        if output.stderr.contains("couldn't find remote ref") {
            debug!(refspec = %refspec, "remote ref does not exist");
            return Ok(());
        }
        Err(RemoteError::Transport {
            command: "git fetch".to_string(),
            message: output.stderr.trim().to_string(),
        })
    }

    fn push(
        &self,
        local: &dyn ObjectStore,
        spec: &RefSpec,
        token: &CancellationToken,
    ) -> RemoteResult<Vec<RefUpdate>> {
        let git_dir = Self::git_dir(local)?;
        let refspec = spec.to_string();
        let output = run_git(git_dir, &["push", "--porcelain", &self.url, &refspec], token)?;

        let lines = parse_porcelain(&output.stdout);
        if let Some(line) = lines.iter().find(|l| is_non_fast_forward(l)) {
            return Err(RemoteError::NonFastForward(line.dst.clone()));
        }
        if lines.is_empty() && !output.success {
            return Err(RemoteError::Transport {
                command: "git push".to_string(),
                message: output.stderr.trim().to_string(),
            });
        }
        Ok(lines
            .into_iter()
            .map(|line| {
                if line.flag == '!' {
                    let status = line.reason.unwrap_or(line.summary);
                    RefUpdate::rejected(line.dst, status)
                } else {
                    RefUpdate::accepted(line.dst)
                }
            })
            .collect())
    }
}
