//! Hook lifecycle and built-in hooks (§4.3).
//!
//! A hook observes or transforms samples as they move through a path. The
//! lifecycle mirrors the node lifecycle one level down: `init`/`parse`/
//! `check` happen at configuration time, `start`/`stop`/`deinit` bracket
//! a path's running state, and `process`/`periodic` run on the hot path
//! and the rate timer respectively. This is a direct generalization of
//! the teacher's `instrument::registry_v2` factory pattern, applied to a
//! trait object list instead of a single instrument per slot.

mod builtin;

pub use builtin::{LimitHook, LoggingHook, ScaleHook, SkipFirstHook, StatsHook};

use crate::error::Result;
use crate::sample::Sample;

/// Where in a path a hook is attached, controlling when it runs (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// Runs once per sample as a source node produces it.
    NodeRead,
    /// Runs once per sample immediately before a destination node writes it.
    NodeWrite,
    /// Runs once per sample as it enters a path's queue.
    PathRead,
    /// Runs once per sample as it leaves a path's queue for a destination.
    PathWrite,
    /// Runs on the path's rate timer tick, independent of sample arrival.
    Periodic,
}

/// The outcome of running one hook over one sample.
#[derive(Debug)]
pub enum HookAction {
    /// Sample passes through unchanged.
    Ok,
    /// Sample is dropped silently (not an error, e.g. a decimation hook).
    Skip,
    /// Sample is dropped and the path logs a warning naming this hook.
    Reject(String),
    /// Unrecoverable: the owning path must stop.
    Stop(String),
}

/// A hook attached to a path. Implementors typically only need `process`;
/// the lifecycle methods default to no-ops.
///
/// Full lifecycle, in the order a path runs it (§4.3):
/// `init -> parse -> check -> start -> {process, periodic}* -> stop -> deinit`.
/// Hooks built directly in code rather than from a `GatewayConfig` (tests,
/// programmatic composition) can just set their fields in their own
/// constructor and leave `parse`/`check` at their no-op defaults.
pub trait Hook: Send {
    fn name(&self) -> &str;

    fn kind(&self) -> HookKind;

    /// Lower runs first within the same [`HookKind`] (§4.3 priority order).
    fn priority(&self) -> i32 {
        0
    }

    /// How many trailing samples of context this hook needs (0 = none).
    /// Paths hand back the last `history_window()` samples, oldest first,
    /// alongside the current one via [`Hook::process`]'s `history` slice.
    fn history_window(&self) -> usize {
        0
    }

    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Read this hook's settings out of its raw configuration section
    /// (§4.3). Called once, after `init` and before `check`, when a hook
    /// is built from a `GatewayConfig` entry; returns a
    /// [`crate::error::GatewayError::Config`] on malformed or missing
    /// fields so bad hook config is a `config-error` (§7), not a silent
    /// default.
    fn parse(&mut self, config: &serde_json::Value) -> Result<()> {
        let _ = config;
        Ok(())
    }

    /// One-time validation of this hook's parsed state, run once after
    /// `parse` and before `start` (§4.3, §7 `config-error`).
    fn check(&mut self) -> Result<()> {
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn process(&mut self, sample: &Sample, history: &[Sample]) -> HookAction {
        let _ = (sample, history);
        HookAction::Ok
    }

    /// Runs on the path's rate timer tick, independent of sample arrival
    /// (§4.4: "Periodic hooks are invoked before peeking; their verdict
    /// can suppress the emission"). A `Skip` verdict from any periodic
    /// hook suppresses that tick's send.
    fn periodic(&mut self) -> HookAction {
        HookAction::Ok
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release any resources acquired by `init`, run once after `stop`
    /// when the owning path tears down (§4.3).
    fn deinit(&mut self) -> Result<()> {
        Ok(())
    }
}

/// An ordered, kind-filtered collection of hooks attached to one path.
pub struct HookChain {
    hooks: Vec<Box<dyn Hook>>,
}

impl HookChain {
    pub fn new(mut hooks: Vec<Box<dyn Hook>>) -> Self {
        hooks.sort_by_key(|h| h.priority());
        Self { hooks }
    }

    /// Runs `init` on every hook, in priority order. Called once during
    /// [`crate::path::Path::prepare`] (§4.3).
    pub fn init_all(&mut self) -> Result<()> {
        for hook in &mut self.hooks {
            hook.init()?;
        }
        Ok(())
    }

    /// Runs `check` on every hook, in priority order. Called once during
    /// [`crate::path::Path::prepare`], after `init_all` (§4.3). Hook
    /// settings themselves are parsed earlier, when the hook is
    /// constructed from a `GatewayConfig` entry (`crate::build_hooks`),
    /// since that is where the raw configuration value is in scope.
    pub fn check_all(&mut self) -> Result<()> {
        for hook in &mut self.hooks {
            hook.check()?;
        }
        Ok(())
    }

    pub fn start_all(&mut self) -> Result<()> {
        for hook in &mut self.hooks {
            hook.start()?;
        }
        Ok(())
    }

    pub fn stop_all(&mut self) -> Result<()> {
        for hook in &mut self.hooks {
            hook.stop()?;
        }
        Ok(())
    }

    /// Runs `deinit` on every hook, in priority order. Called once during
    /// [`crate::path::Path::stop`], after `stop_all` (§4.3).
    pub fn deinit_all(&mut self) -> Result<()> {
        for hook in &mut self.hooks {
            hook.deinit()?;
        }
        Ok(())
    }

    /// Runs every periodic hook in priority order. Returns `false` if any
    /// of them voted to suppress this tick's emission (§4.4); a `Reject`
    /// or `Stop` verdict is logged by the caller and treated the same as
    /// a suppression for this tick.
    pub fn run_periodic(&mut self) -> bool {
        let mut emit = true;
        for hook in self.hooks.iter_mut().filter(|h| h.kind() == HookKind::Periodic) {
            match hook.periodic() {
                HookAction::Ok => {}
                HookAction::Skip | HookAction::Reject(_) | HookAction::Stop(_) => emit = false,
            }
        }
        emit
    }

    /// Run every hook of `kind` over `sample` in priority order, threading
    /// each hook's declared history window from `recent` (oldest first,
    /// most recent last, not including `sample` itself).
    ///
    /// Returns `Ok(true)` if the sample survives every hook, `Ok(false)`
    /// if some hook skipped it, and `Err` if a hook rejected or faulted.
    pub fn run(&mut self, kind: HookKind, sample: &Sample, recent: &[Sample]) -> Result<bool> {
        for hook in self.hooks.iter_mut().filter(|h| h.kind() == kind) {
            let window = hook.history_window();
            let history = if window == 0 {
                &[][..]
            } else {
                let start = recent.len().saturating_sub(window);
                &recent[start..]
            };
            match hook.process(sample, history) {
                HookAction::Ok => continue,
                HookAction::Skip => return Ok(false),
                HookAction::Reject(message) => {
                    return Err(crate::error::GatewayError::HookReject {
                        hook: hook.name().to_string(),
                        message,
                    })
                }
                HookAction::Stop(message) => {
                    return Err(crate::error::GatewayError::Fatal {
                        path: String::new(),
                        message: format!("hook '{}' stopped path: {}", hook.name(), message),
                    })
                }
            }
        }
        Ok(true)
    }

    /// Largest history window requested by any attached hook, so a path
    /// knows how much recent history to retain and pass to `run`.
    pub fn max_history_window(&self) -> usize {
        self.hooks.iter().map(|h| h.history_window()).max().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Pool;
    use std::sync::Arc;

    struct RejectEveryOther {
        count: usize,
    }

    impl Hook for RejectEveryOther {
        fn name(&self) -> &str {
            "reject-every-other"
        }
        fn kind(&self) -> HookKind {
            HookKind::PathRead
        }
        fn process(&mut self, _sample: &Sample, _history: &[Sample]) -> HookAction {
            self.count += 1;
            if self.count % 2 == 0 {
                HookAction::Skip
            } else {
                HookAction::Ok
            }
        }
    }

    #[test]
    fn hooks_run_in_priority_order() {
        let order = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));

        struct Recorder {
            name: &'static str,
            priority: i32,
            order: std::sync::Arc<parking_lot::Mutex<Vec<&'static str>>>,
        }
        impl Hook for Recorder {
            fn name(&self) -> &str {
                self.name
            }
            fn kind(&self) -> HookKind {
                HookKind::PathRead
            }
            fn priority(&self) -> i32 {
                self.priority
            }
            fn process(&mut self, _sample: &Sample, _history: &[Sample]) -> HookAction {
                self.order.lock().push(self.name);
                HookAction::Ok
            }
        }

        let mut chain = HookChain::new(vec![
            Box::new(Recorder {
                name: "b",
                priority: 5,
                order: order.clone(),
            }),
            Box::new(Recorder {
                name: "a",
                priority: 1,
                order: order.clone(),
            }),
        ]);
        let pool = Pool::new(1, 1);
        let sample = pool.acquire(1, Arc::new(vec![])).pop().unwrap();
        chain.run(HookKind::PathRead, &sample, &[]).unwrap();
        assert_eq!(*order.lock(), vec!["a", "b"]);
    }

    #[test]
    fn skip_action_surfaces_as_false() {
        let mut chain = HookChain::new(vec![Box::new(RejectEveryOther { count: 0 })]);
        let pool = Pool::new(2, 1);
        let samples = pool.acquire(2, Arc::new(vec![]));
        assert!(chain.run(HookKind::PathRead, &samples[0], &[]).unwrap());
        assert!(!chain.run(HookKind::PathRead, &samples[1], &[]).unwrap());
    }
}
