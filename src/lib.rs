/*
 * 5D Labs Agent Platform - Kubernetes Pod Executor
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc, clippy::doc_markdown)]

//! Kubernetes pod executor core library
//!
//! Bridges a scheduler's in-process task queue to a Kubernetes cluster's pod
//! API: synthesizes pod specs from task identifiers, launches pods
//! fire-and-forget, watches the cluster's pod event stream for terminal
//! phases, and reports results back to the scheduler through the
//! [`scheduler::SchedulerReporter`] trait boundary.

pub mod config;
pub mod executor;
pub mod health;
pub mod identity;
pub mod launcher;
pub mod podspec;
pub mod scheduler;
pub mod types;
pub mod watcher;

pub use config::ExecutorConfig;
pub use executor::ExecutorLoop;
pub use health::ReadinessState;
pub use identity::IdentityCodec;
pub use launcher::PodLauncher;
pub use podspec::PodSpecBuilder;
pub use scheduler::{LoggingScheduler, SchedulerReporter};
pub use types::{Error, PodEvent, Result, TaskCommand, TaskKey, TaskResult, TaskState};
pub use watcher::PodWatcher;
