//! Task plans: a TOML map of named tasks wired together with `after` lists.
//!
//! ```toml
//! [queue]
//! worker_threads = 4
//!
//! [tasks.fetch]
//! work_ms = 20
//!
//! [tasks.parse]
//! after = ["fetch"]
//! work_ms = 5
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use callq_core::QueueConfig;
use callq_queue::{CallbackQueue, FutureHandle, QueueError, QueueStats};

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("failed to read plan: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse plan: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("task '{task}' runs after unknown task '{after}'")]
    UnknownTask { task: String, after: String },

    #[error("circular dependency: {0}")]
    CircularDependency(String),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// One node of the plan.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskSpec {
    /// Tasks that must finish before this one starts.
    #[serde(default)]
    pub after: Vec<String>,
    /// Simulated work, in milliseconds.
    #[serde(default)]
    pub work_ms: u64,
    /// Panic instead of completing.
    #[serde(default)]
    pub fail: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub queue: Option<QueueConfig>,
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskSpec>,
}

#[derive(Debug, Serialize)]
pub struct TaskFailure {
    pub task: String,
    pub error: String,
}

/// What `callq run` prints.
#[derive(Debug, Serialize)]
pub struct PlanReport {
    /// Tasks in the order they finished.
    pub completed: Vec<String>,
    pub failed: Vec<TaskFailure>,
    pub elapsed_ms: u128,
    pub stats: QueueStats,
}

impl Plan {
    pub fn from_toml_str(raw: &str) -> Result<Self, PlanError> {
        let plan: Plan = toml::from_str(raw)?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PlanError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Check `after` references and reject cycles.
    pub fn validate(&self) -> Result<(), PlanError> {
        for (name, task) in &self.tasks {
            for after in &task.after {
                if !self.tasks.contains_key(after) {
                    return Err(PlanError::UnknownTask {
                        task: name.clone(),
                        after: after.clone(),
                    });
                }
            }
        }
        self.submission_order()?;
        Ok(())
    }

    /// Kahn's algorithm. Ties are broken by name so the order is stable.
    pub fn submission_order(&self) -> Result<Vec<&str>, PlanError> {
        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

        for (name, task) in &self.tasks {
            in_degree.insert(name.as_str(), task.after.len());
            for after in &task.after {
                dependents.entry(after.as_str()).or_default().push(name.as_str());
            }
        }

        let mut ready: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&name, _)| name)
            .collect();
        let mut sorted = Vec::with_capacity(self.tasks.len());

        while let Some(name) = ready.pop_front() {
            sorted.push(name);
            for &dependent in dependents.get(name).into_iter().flatten() {
                if let Some(deg) = in_degree.get_mut(dependent) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.push_back(dependent);
                    }
                }
            }
        }

        if sorted.len() != self.tasks.len() {
            let in_cycle: Vec<&str> = in_degree
                .iter()
                .filter(|(_, &deg)| deg > 0)
                .map(|(&name, _)| name)
                .collect();
            return Err(PlanError::CircularDependency(format!(
                "cycle among tasks: {}",
                in_cycle.join(", ")
            )));
        }
        Ok(sorted)
    }

    /// Submit every task to `queue` and block until all of them are done.
    pub fn run(&self, queue: &CallbackQueue) -> Result<PlanReport, PlanError> {
        let started = Instant::now();
        let completed = Arc::new(Mutex::new(Vec::with_capacity(self.tasks.len())));
        let mut handles: HashMap<&str, FutureHandle> = HashMap::with_capacity(self.tasks.len());
        let mut submitted = Vec::with_capacity(self.tasks.len());

        for name in self.submission_order()? {
            let Some(task) = self.tasks.get(name) else {
                continue;
            };
            let job = task_body(name.to_string(), task, Arc::clone(&completed));
            let future = if task.after.is_empty() {
                queue.push(job)
            } else {
                let priors = task
                    .after
                    .iter()
                    .map(|after| {
                        handles.get(after.as_str()).cloned().ok_or_else(|| {
                            PlanError::UnknownTask {
                                task: name.to_string(),
                                after: after.clone(),
                            }
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                queue.push_dependent(&priors, job)?
            };
            debug!(task = name, id = future.id(), "task submitted");
            let handle = future.into_handle();
            submitted.push((name, handle.clone()));
            handles.insert(name, handle);
        }

        let all: Vec<FutureHandle> = submitted.iter().map(|(_, h)| h.clone()).collect();
        queue.wait_all(&all)?;

        let failed: Vec<TaskFailure> = submitted
            .iter()
            .filter_map(|(name, handle)| {
                handle.failure().map(|error| TaskFailure {
                    task: name.to_string(),
                    error,
                })
            })
            .collect();
        let completed = std::mem::take(&mut *completed.lock());
        info!(
            tasks = submitted.len(),
            failed = failed.len(),
            "plan finished"
        );

        Ok(PlanReport {
            completed,
            failed,
            elapsed_ms: started.elapsed().as_millis(),
            stats: queue.stats(),
        })
    }
}

fn task_body(
    name: String,
    task: &TaskSpec,
    completed: Arc<Mutex<Vec<String>>>,
) -> impl FnOnce() + Send + 'static {
    let work = Duration::from_millis(task.work_ms);
    let fail = task.fail;
    move || {
        if !work.is_zero() {
            thread::sleep(work);
        }
        if fail {
            panic!("task '{name}' failed");
        }
        completed.lock().push(name);
    }
}
