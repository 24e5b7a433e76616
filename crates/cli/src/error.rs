// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User-facing errors with context and suggestions.

use relsem_core::SemaphoreError;
use std::fmt;
use std::path::Path;

/// Error with context and recovery suggestions
#[derive(Debug)]
pub struct CliError {
    /// What went wrong
    pub message: String,
    /// Why it might have happened
    pub context: Vec<String>,
    /// How to fix it
    pub suggestions: Vec<String>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CliError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: Vec::new(),
            suggestions: Vec::new(),
            source: None,
        }
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn pool_not_found(name: &str, db: &Path) -> Self {
        CliError::new(format!("Semaphore '{}' not found", name))
            .with_context(format!("Database: {}", db.display()))
            .with_suggestion("List semaphores: relsem pool list")
            .with_suggestion(format!(
                "Create it: relsem pool create {} --permits <n>",
                name
            ))
    }

    pub fn capacity_required(name: &str) -> Self {
        CliError::new(format!("Semaphore '{}' does not exist yet", name))
            .with_context("A new semaphore needs a capacity")
            .with_suggestion(format!(
                "Pass it explicitly: relsem hold {} --permits <n> --capacity <total>",
                name
            ))
    }

    /// Explain a failed acquire
    pub fn acquire_failed(name: &str, err: SemaphoreError) -> Self {
        let base = CliError::new(format!("Could not acquire permits of '{}'", name));
        let explained = match &err {
            SemaphoreError::TimeoutExceeded { waited, .. } => base
                .with_context(format!("Waited {:?} without enough free permits", waited))
                .with_suggestion("See who holds them: relsem pool show <name>")
                .with_suggestion("Reclaim permits of dead owners: relsem reap")
                .with_suggestion("Wait longer with --timeout"),
            SemaphoreError::CapacityConflict { existing, .. } => base
                .with_context(format!("The semaphore already exists with {} permits", existing))
                .with_suggestion(format!("Use --capacity {}", existing)),
            SemaphoreError::TransientStoreFailure(_) => base
                .with_context("The database stayed unavailable until the deadline")
                .with_suggestion("Check that no process keeps the database locked"),
            _ => base,
        };
        explained.with_source(err)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.message)?;

        if let Some(source) = &self.source {
            writeln!(f, "  -> {}", source)?;
        }
        for ctx in &self.context {
            writeln!(f, "  -> {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            writeln!(f, "suggestions:")?;
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                writeln!(f, "  {}. {}", i + 1, suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}
