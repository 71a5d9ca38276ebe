// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Call context for running transformers.
//!
//! ```text
//! frames[0]            top level, collects the final message
//!   frames[1]          Deploy           -> "deployed version 7 ..."
//!     frames[2]        Cleanup          -> "removed version 1 ..."
//!
//! execute(t):  push frame -> t.transform -> fold fragments under msg
//!              -> append to parent frame -> pop
//! ```

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{AppEnv, RootApp, Transformer, TransformerResult};
use crate::error::StoreResult;
use crate::state::State;
use crate::valid::MAX_APP_NAME_LEN;

/// Accumulator passed down through nested [`TransformerContext::execute`]
/// calls.
#[derive(Debug)]
pub struct TransformerContext {
    frames: Vec<Vec<String>>,
    result: TransformerResult,
    now: DateTime<Utc>,
    max_app_name_length: usize,
}

impl TransformerContext {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            frames: vec![Vec::new()],
            result: TransformerResult::default(),
            now,
            max_app_name_length: MAX_APP_NAME_LEN,
        }
    }

    #[must_use]
    pub const fn with_max_app_name_length(mut self, max: usize) -> Self {
        self.max_app_name_length = max;
        self
    }

    /// Time the batch was started; used for every timestamp it writes.
    #[must_use]
    pub const fn now(&self) -> DateTime<Utc> {
        self.now
    }

    #[must_use]
    pub const fn max_app_name_length(&self) -> usize {
        self.max_app_name_length
    }

    /// Run `transformer` in a new frame.
    ///
    /// On success its message, followed by the fragments of the
    /// transformers it ran, is appended to the enclosing frame.
    ///
    /// # Errors
    ///
    /// Propagates the transformer's error unchanged.
    pub fn execute(&mut self, transformer: &Transformer, state: &mut State) -> StoreResult<()> {
        debug!(
            transformer = transformer.name(),
            depth = self.frames.len(),
            "executing transformer"
        );
        self.frames.push(Vec::new());
        let outcome = transformer.transform(state, self);
        let fragments = self.frames.pop().unwrap_or_default();
        let msg = outcome?;

        let folded = match (msg.is_empty(), fragments.is_empty()) {
            (_, true) => msg,
            (true, false) => fragments.join("\n"),
            (false, false) => format!("{msg}\n{}", fragments.join("\n")),
        };
        if !folded.is_empty()
            && let Some(parent) = self.frames.last_mut()
        {
            parent.push(folded);
        }
        Ok(())
    }

    pub fn add_app_env(&mut self, app: &str, env: &str, team: &str) {
        self.result.changed_apps.push(AppEnv {
            app: app.to_string(),
            env: env.to_string(),
            team: team.to_string(),
        });
    }

    pub fn delete_env_from_app(&mut self, app: &str, env: &str) {
        self.result.changed_apps.push(AppEnv {
            app: app.to_string(),
            env: env.to_string(),
            team: String::new(),
        });
        self.result.deleted_root_apps.push(RootApp {
            env: env.to_string(),
        });
    }

    /// Top-level message and the accumulated result.
    #[must_use]
    pub fn finish(mut self) -> (String, TransformerResult) {
        let message = self
            .frames
            .first_mut()
            .and_then(|frame| (!frame.is_empty()).then(|| frame.swap_remove(0)))
            .unwrap_or_default();
        (message, self.result)
    }
}

/// Run one top-level transformer against `state`.
///
/// # Errors
///
/// Propagates the transformer's error.
pub fn run_transformer(
    transformer: &Transformer,
    state: &mut State,
    mut ctx: TransformerContext,
) -> StoreResult<(String, TransformerResult)> {
    ctx.execute(transformer, state)?;
    Ok(ctx.finish())
}
