use std::sync::Arc;

use anyhow::{bail, Result};

use crate::config::TracerConfig;
use crate::error::TracerError;
use crate::handler::{self, Dispatch};
use crate::memory::{CodeMemory, ProcessMemory};
use crate::recorder::Recorder;
use crate::registry::{TrapKind, TrapRegistry};
use crate::runtime::Runtime;

/// Allocation tracer built on breakpoints at the runtime's allocation event
/// functions.
///
/// `start` and `stop` are meant to be called from a single controlling
/// thread, one after the other. They are not synchronized with handlers
/// already running on other threads.
pub struct AllocTracer<M: CodeMemory = ProcessMemory> {
    config: TracerConfig,
    recorder: Arc<dyn Recorder>,
    registry: TrapRegistry,
    memory: M,
    dispatch: Option<Box<Dispatch>>,
    // handlers that loaded the table before `stop` may still be reading it
    _retired: Option<Box<Dispatch>>,
}

impl AllocTracer<ProcessMemory> {
    pub fn new(config: TracerConfig, recorder: Arc<dyn Recorder>) -> Self {
        Self::with_memory(config, recorder, ProcessMemory)
    }
}

impl<M: CodeMemory> AllocTracer<M> {
    pub fn with_memory(config: TracerConfig, recorder: Arc<dyn Recorder>, memory: M) -> Self {
        Self {
            config,
            recorder,
            registry: TrapRegistry::new(),
            memory,
            dispatch: None,
            _retired: None,
        }
    }

    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    pub fn registry(&self) -> &TrapRegistry {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.dispatch.is_some()
    }

    pub fn start(&mut self, runtime: &dyn Runtime) -> Result<()> {
        if self.is_running() {
            bail!(TracerError::AlreadyStarted);
        }

        if !runtime.introspection_available() {
            log::error!("{}", TracerError::IntrospectionUnavailable);
            bail!(TracerError::IntrospectionUnavailable);
        }

        if !self.registry.check_symbols(runtime) {
            log::error!("{}", TracerError::SymbolsNotFound);
            bail!(TracerError::SymbolsNotFound);
        }

        handler::install_signal_handler()?;

        let armed = TrapKind::ALL
            .into_iter()
            .filter(|&kind| self.config.is_armed(kind))
            .filter_map(|kind| self.registry.get(kind).entry().map(|entry| (kind, entry)));
        let dispatch = Box::new(Dispatch::new(armed, self.recorder.clone(), self.config.foreign_signals));
        handler::activate(&dispatch)?;

        for kind in TrapKind::ALL.into_iter().filter(|&kind| self.config.is_armed(kind)) {
            if let Err(e) = self.registry.get_mut(kind).install(&self.memory) {
                log::error!("failed to install {kind} trap: {e:#}");
                let _ = self.registry.uninstall_all(&self.memory);
                handler::deactivate(&dispatch);
                return Err(e);
            }
            log::debug!("armed {kind} trap at {:x?}", self.registry.get(kind).entry());
        }

        self.dispatch = Some(dispatch);

        Ok(())
    }

    /// Removes the breakpoints. The signal handler stays registered.
    pub fn stop(&mut self) -> Result<()> {
        let Some(dispatch) = self.dispatch.take() else {
            return Ok(());
        };

        let result = self.registry.uninstall_all(&self.memory);
        handler::deactivate(&dispatch);
        self._retired = Some(dispatch);
        log::debug!("alloc tracer stopped");

        result
    }
}

impl<M: CodeMemory> Drop for AllocTracer<M> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("failed to stop alloc tracer: {e:#}");
        }
    }
}
