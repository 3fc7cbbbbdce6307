// src/test_utils/fake_engine.rs
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use crate::errors::EngineError;
use crate::executors::engine::{ContainerEngine, ContainerExit, ContainerSpec};

enum Behaviour {
    /// Pops one outcome per call; repeats the last one when the script runs out.
    Scripted(Mutex<VecDeque<Result<ContainerExit, EngineError>>>),
    /// Never finishes, like a container that outlives its caller.
    Hanging,
}

/// Scripted in-memory `ContainerEngine` that records every spec it is given.
pub struct FakeEngine {
    behaviour: Behaviour,
    last: Mutex<Option<Result<ContainerExit, EngineError>>>,
    specs: Mutex<Vec<ContainerSpec>>,
    inspect_mounts: bool,
    files: Mutex<HashMap<String, String>>,
    modes: Mutex<HashMap<String, u32>>,
}

impl FakeEngine {
    pub fn scripted(outcomes: Vec<Result<ContainerExit, EngineError>>) -> Self {
        Self::with_behaviour(Behaviour::Scripted(Mutex::new(VecDeque::from(outcomes))))
    }

    pub fn exiting(exit_code: i64, stdout: &str, stderr: &str) -> Self {
        Self::scripted(vec![Ok(ContainerExit {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        })])
    }

    pub fn failing(err: EngineError) -> Self {
        Self::scripted(vec![Err(err)])
    }

    pub fn hanging() -> Self {
        Self::with_behaviour(Behaviour::Hanging)
    }

    fn with_behaviour(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            last: Mutex::new(None),
            specs: Mutex::new(Vec::new()),
            inspect_mounts: false,
            files: Mutex::new(HashMap::new()),
            modes: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot the first bind mount's files (and their modes) on each run.
    pub fn inspecting_mounts(mut self) -> Self {
        self.inspect_mounts = true;
        self
    }

    pub fn recorded_specs(&self) -> Vec<ContainerSpec> {
        self.specs.lock().unwrap().clone()
    }

    pub fn seen_files(&self) -> HashMap<String, String> {
        self.files.lock().unwrap().clone()
    }

    /// File modes keyed by name; the mount directory itself is ".".
    pub fn seen_modes(&self) -> HashMap<String, u32> {
        self.modes.lock().unwrap().clone()
    }

    fn snapshot(&self, dir: &Path) {
        let mut files = self.files.lock().unwrap();
        let mut modes = self.modes.lock().unwrap();
        if let Some(mode) = file_mode(dir) {
            modes.insert(".".to_string(), mode);
        }
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(mode) = file_mode(&path) {
                modes.insert(name.clone(), mode);
            }
            if let Ok(content) = std::fs::read_to_string(&path) {
                files.insert(name, content);
            }
        }
    }

    fn next_outcome(&self) -> Result<ContainerExit, EngineError> {
        let Behaviour::Scripted(script) = &self.behaviour else {
            unreachable!("hanging engine never produces an outcome");
        };
        let mut last = self.last.lock().unwrap();
        match script.lock().unwrap().pop_front() {
            Some(outcome) => {
                *last = Some(outcome.clone());
                outcome
            }
            None => last
                .clone()
                .unwrap_or_else(|| Err(EngineError::Api("fake engine has no script".to_string()))),
        }
    }
}

#[cfg(unix)]
fn file_mode(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .ok()
        .map(|m| m.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> Option<u32> {
    None
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn run(&self, spec: ContainerSpec) -> Result<ContainerExit, EngineError> {
        if self.inspect_mounts {
            if let Some(bind) = spec.binds.first() {
                self.snapshot(Path::new(&bind.host_path));
            }
        }
        self.specs.lock().unwrap().push(spec);

        if let Behaviour::Hanging = self.behaviour {
            std::future::pending::<()>().await;
        }
        self.next_outcome()
    }

    async fn ping(&self) -> Result<(), EngineError> {
        match self.last.lock().unwrap().as_ref() {
            Some(Err(EngineError::Unreachable(msg))) => Err(EngineError::Unreachable(msg.clone())),
            _ => Ok(()),
        }
    }
}
