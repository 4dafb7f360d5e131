// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eggbot project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Daemon task manager
//!
//! Coordinates the long-lived services of the pit controller: the control
//! engine (its own OS threads) and the Rocket API server (a tokio task).
//! Provides start, shutdown, and join, so `main` stays a thin wrapper.

use anyhow::Result;
use log::{error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::control::EggBotController;
use crate::server::build_rocket;

/// Represents a daemon task manager that coordinates the background
/// services.
///
/// The `running` flag is shared with spawned tasks so they can observe the
/// shutdown request; the engine manages its own threads and is stopped
/// explicitly.
pub struct Daemon {
    engine: Option<Arc<EggBotController>>,
    tasks: Vec<JoinHandle<Result<()>>>,
    rocket_shutdown: Option<rocket::Shutdown>,
    running: Arc<AtomicBool>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    /// Create an idle daemon.
    pub fn new() -> Self {
        Self {
            engine: None,
            tasks: Vec::new(),
            rocket_shutdown: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Construct and start the engine, then launch the API server when
    /// enabled.
    pub async fn launch(&mut self, config: Config) -> Result<()> {
        let engine = Arc::new(EggBotController::new(&config));
        engine.start();
        self.engine = Some(Arc::clone(&engine));

        if config.server.enabled {
            let rocket = build_rocket(&config, engine)?.ignite().await?;
            self.rocket_shutdown = Some(rocket.shutdown());

            let task = tokio::spawn(async move {
                rocket
                    .launch()
                    .await
                    .map(|_| ())
                    .map_err(|e| anyhow::anyhow!("API server error: {e}"))
            });
            self.tasks.push(task);
            info!("API server task launched");
        } else {
            info!("API server disabled by configuration");
        }

        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// The running engine, once launched.
    pub fn engine(&self) -> Option<&Arc<EggBotController>> {
        self.engine.as_ref()
    }

    /// Request shutdown: notify Rocket, stop the engine. Idempotent.
    pub fn shutdown(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Daemon shutting down");

        if let Some(shutdown) = self.rocket_shutdown.take() {
            shutdown.notify();
        }

        if let Some(engine) = &self.engine {
            engine.stop();
        }
    }

    /// Await all spawned tasks.
    pub async fn join(&mut self) -> Result<()> {
        for task in self.tasks.drain(..) {
            match task.await {
                Ok(result) => result?,
                Err(err) => error!("Daemon task join error: {}", err),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_daemon_lifecycle_without_server() {
        let mut config = Config::default();
        config.hardware.simulate = true;
        config.server.enabled = false;

        let mut daemon = Daemon::new();
        daemon.launch(config).await.unwrap();

        let engine = daemon.engine().expect("engine running").clone();
        assert!(engine.is_running());

        daemon.shutdown();
        assert!(!engine.is_running());
        daemon.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_before_launch_is_noop() {
        let mut daemon = Daemon::new();
        daemon.shutdown();
        daemon.join().await.unwrap();
        assert!(daemon.engine().is_none());
    }
}
