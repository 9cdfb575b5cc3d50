//! Line state and pin-change notification on top of a [`LineDriver`].
//!
//! Neither the bridge nor the expander raise host interrupts, so changes are
//! found by polling: a background thread reads every subscribed line once per
//! [`PollConfig::interval`] and compares it with the last observed level.
//! The thread exists only while at least one subscription does.
//!
//! An expander can instead be driven by its open-drain interrupt output wired
//! to a bridge line, see [`GpioController::attach_interrupt`].

use crate::consts;
use crate::device::lock;
use crate::error::{Error, Result};
use crate::gpio::{GpioDirection, GpioLevel, LineDriver, PinEdge, PinMode};
use log::{debug, trace, warn};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Poll loop timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: consts::DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PollConfig {
    pub fn with_interval(interval: Duration) -> Self {
        Self { interval }
    }
}

/// A level transition seen on a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinChangedEvent {
    pub line: u8,
    /// `Rising` iff the new level is high.
    pub edge: PinEdge,
}

impl PinChangedEvent {
    pub fn level(&self) -> GpioLevel {
        match self.edge {
            PinEdge::Rising => GpioLevel::High,
            PinEdge::Falling => GpioLevel::Low,
        }
    }
}

/// Which edges [`GpioController::wait_for_event`] reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeFilter {
    Rising,
    Falling,
    Both,
}

impl EdgeFilter {
    pub fn matches(self, edge: PinEdge) -> bool {
        match self {
            EdgeFilter::Rising => edge == PinEdge::Rising,
            EdgeFilter::Falling => edge == PinEdge::Falling,
            EdgeFilter::Both => true,
        }
    }
}

/// Handle returned by `subscribe`; pass it to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken {
    line: u8,
    id: u64,
}

impl SubscriptionToken {
    pub fn line(&self) -> u8 {
        self.line
    }
}

/// How an expander learns about changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    /// Background poll loop.
    Polling,
    /// Falling edge on a host line.
    Interrupt,
}

type Callback = Arc<dyn Fn(PinChangedEvent) + Send + Sync>;

struct LineSubscriptions {
    baseline: GpioLevel,
    callbacks: Vec<(u64, Callback)>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    lines: BTreeMap<u8, LineSubscriptions>,
}

impl Registry {
    fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

enum Trigger {
    Polling,
    Interrupt(Box<dyn FnOnce() + Send>),
}

struct Worker {
    stop: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

struct Shared<D> {
    driver: D,
    config: PollConfig,
    open: Mutex<BTreeMap<u8, GpioDirection>>,
    registry: Mutex<Registry>,
    worker: Mutex<Option<Worker>>,
    trigger: Mutex<Trigger>,
}

impl<D: LineDriver> Shared<D> {
    fn check_line(&self, line: u8) -> Result<()> {
        if line >= self.driver.line_count() {
            return Err(Error::PinArgumentOutOfRange {
                pin: line,
                message: format!("Line must be 0-{}", self.driver.line_count() - 1),
            });
        }
        Ok(())
    }

    fn require_open(&self, line: u8) -> Result<GpioDirection> {
        self.check_line(line)?;
        lock(&self.open)
            .get(&line)
            .copied()
            .ok_or(Error::LineNotOpen { line })
    }

    fn is_polling(&self) -> bool {
        matches!(*lock(&self.trigger), Trigger::Polling)
    }

    fn check_changes(&self) -> Result<usize> {
        let lines: Vec<u8> = lock(&self.registry).lines.keys().copied().collect();
        if lines.is_empty() {
            return Ok(0);
        }
        let levels = self.driver.read_lines(&lines)?;

        let mut pending = Vec::new();
        {
            let mut registry = lock(&self.registry);
            for (&line, &level) in lines.iter().zip(levels.iter()) {
                // Unsubscribed since the read.
                let Some(subs) = registry.lines.get_mut(&line) else {
                    continue;
                };
                if subs.baseline == level {
                    continue;
                }
                subs.baseline = level;
                let event = PinChangedEvent {
                    line,
                    edge: PinEdge::towards(level),
                };
                let callbacks: Vec<Callback> =
                    subs.callbacks.iter().map(|(_, cb)| Arc::clone(cb)).collect();
                pending.push((event, callbacks));
            }
        }

        let count = pending.len();
        for (event, callbacks) in pending {
            trace!("Line {} changed: {:?}", event.line, event.edge);
            for callback in callbacks {
                callback(event);
            }
        }
        Ok(count)
    }

    fn poll_once(&self) {
        if let Err(e) = self.check_changes() {
            warn!("GPIO poll cycle failed: {}", e);
        }
    }

    fn subscribe(self: &Arc<Self>, line: u8, callback: Callback) -> Result<SubscriptionToken> {
        self.require_open(line)?;
        let level = self.driver.read(line)?;
        let token = {
            let mut registry = lock(&self.registry);
            registry.next_id += 1;
            let id = registry.next_id;
            registry
                .lines
                .entry(line)
                .or_insert_with(|| LineSubscriptions {
                    baseline: level,
                    callbacks: Vec::new(),
                })
                .callbacks
                .push((id, callback));
            SubscriptionToken { line, id }
        };
        debug!("Subscribed to line {} (baseline {:?})", line, level);
        self.update_worker()?;
        Ok(token)
    }

    fn unsubscribe(self: &Arc<Self>, token: SubscriptionToken) -> bool {
        let removed = {
            let mut registry = lock(&self.registry);
            let Some(subs) = registry.lines.get_mut(&token.line) else {
                return false;
            };
            let before = subs.callbacks.len();
            subs.callbacks.retain(|(id, _)| *id != token.id);
            let removed = subs.callbacks.len() != before;
            if subs.callbacks.is_empty() {
                registry.lines.remove(&token.line);
            }
            removed
        };
        if removed {
            debug!("Unsubscribed from line {}", token.line);
            if let Err(e) = self.update_worker() {
                warn!("Updating GPIO poll worker failed: {}", e);
            }
        }
        removed
    }

    fn drop_line_subscriptions(self: &Arc<Self>, line: u8) {
        if lock(&self.registry).lines.remove(&line).is_some() {
            debug!("Dropped subscriptions of closed line {}", line);
            if let Err(e) = self.update_worker() {
                warn!("Updating GPIO poll worker failed: {}", e);
            }
        }
    }

    // Starts or stops the poll worker so that it runs iff there are
    // subscriptions and the trigger mode is polling. The decision is taken
    // under the worker lock; joining happens outside of it.
    fn update_worker(self: &Arc<Self>) -> Result<()> {
        let stale = {
            let mut worker = lock(&self.worker);
            let wanted = self.is_polling() && !lock(&self.registry).is_empty();
            match (wanted, worker.is_some()) {
                (true, false) => {
                    *worker = Some(self.spawn_worker()?);
                    None
                }
                (false, true) => worker.take(),
                _ => None,
            }
        };
        if let Some(stale) = stale {
            stop_worker(stale);
        }
        Ok(())
    }

    fn spawn_worker(self: &Arc<Self>) -> Result<Worker> {
        let (stop, rx) = mpsc::channel::<()>();
        let weak: Weak<Self> = Arc::downgrade(self);
        let interval = self.config.interval;
        let handle = thread::Builder::new()
            .name("ft260-gpio-poll".to_string())
            .spawn(move || loop {
                match rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    _ => break,
                }
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                shared.poll_once();
            })?;
        debug!("GPIO poll worker started ({:?} interval)", interval);
        Ok(Worker { stop, handle })
    }
}

fn stop_worker(worker: Worker) {
    let Worker { stop, handle } = worker;
    drop(stop);
    if handle.thread().id() == thread::current().id() {
        // Called from a callback; the loop ends once it returns.
        return;
    }
    if handle.join().is_err() {
        warn!("GPIO poll worker panicked");
    }
    debug!("GPIO poll worker stopped");
}

/// Open lines, direction state and change subscriptions for one [`LineDriver`].
///
/// Callbacks run on the poll thread (or the host controller's thread in
/// interrupt mode), in registration order, with no internal lock held. A
/// callback may unsubscribe itself. A notification already being delivered
/// when `unsubscribe` is called may still arrive once.
pub struct GpioController<D: LineDriver> {
    shared: Arc<Shared<D>>,
}

impl<D: LineDriver> fmt::Debug for GpioController<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpioController")
            .field("line_count", &self.shared.driver.line_count())
            .field("open_lines", &*lock(&self.shared.open))
            .field("config", &self.shared.config)
            .field("polling", &self.is_polling())
            .finish()
    }
}

impl<D: LineDriver> GpioController<D> {
    pub fn new(driver: D) -> Self {
        Self::with_config(driver, PollConfig::default())
    }

    pub fn with_config(driver: D, config: PollConfig) -> Self {
        GpioController {
            shared: Arc::new(Shared {
                driver,
                config,
                open: Mutex::new(BTreeMap::new()),
                registry: Mutex::new(Registry::default()),
                worker: Mutex::new(None),
                trigger: Mutex::new(Trigger::Polling),
            }),
        }
    }

    pub fn driver(&self) -> &D {
        &self.shared.driver
    }

    pub fn line_count(&self) -> u8 {
        self.shared.driver.line_count()
    }

    // --- Line lifecycle ---

    /// Opens a line for GPIO use and sets its direction.
    pub fn open_line(&self, line: u8, direction: GpioDirection) -> Result<GpioLine<'_, D>> {
        self.shared.check_line(line)?;
        let was_open = self.is_line_open(line);
        self.shared.driver.open_line(line)?;
        if let Err(e) = self.shared.driver.set_direction(line, direction) {
            if !was_open {
                if let Err(close_err) = self.shared.driver.close_line(line) {
                    warn!("Releasing line {} after failed open: {}", line, close_err);
                }
            }
            return Err(e);
        }
        lock(&self.shared.open).insert(line, direction);
        debug!("Opened line {} as {:?}", line, direction);
        Ok(GpioLine {
            controller: self,
            line,
        })
    }

    /// Like [`GpioController::open_line`], but takes a [`PinMode`]. Modes
    /// other than `Input` and `Output` fail with `UnsupportedMode` before any
    /// hardware access.
    pub fn open_line_with_mode(&self, line: u8, mode: PinMode) -> Result<GpioLine<'_, D>> {
        self.shared.check_line(line)?;
        let direction = mode
            .direction()
            .ok_or(Error::UnsupportedMode { line, mode })?;
        self.open_line(line, direction)
    }

    /// Handle to a line that is already open.
    pub fn line(&self, line: u8) -> Result<GpioLine<'_, D>> {
        self.shared.require_open(line)?;
        Ok(GpioLine {
            controller: self,
            line,
        })
    }

    pub fn is_line_open(&self, line: u8) -> bool {
        lock(&self.shared.open).contains_key(&line)
    }

    /// Closes a line, dropping its subscriptions. Closing a line that is not
    /// open does nothing.
    pub fn close_line(&self, line: u8) -> Result<()> {
        self.shared.check_line(line)?;
        if lock(&self.shared.open).remove(&line).is_none() {
            return Ok(());
        }
        self.shared.drop_line_subscriptions(line);
        debug!("Closing line {}", line);
        self.shared.driver.close_line(line)
    }

    // --- Line access ---

    pub fn set_direction(&self, line: u8, direction: GpioDirection) -> Result<()> {
        self.shared.require_open(line)?;
        self.shared.driver.set_direction(line, direction)?;
        lock(&self.shared.open).insert(line, direction);
        Ok(())
    }

    /// Direction the line was last configured with.
    pub fn direction(&self, line: u8) -> Result<GpioDirection> {
        self.shared.require_open(line)
    }

    pub fn read(&self, line: u8) -> Result<GpioLevel> {
        self.shared.require_open(line)?;
        self.shared.driver.read(line)
    }

    pub fn write(&self, line: u8, level: GpioLevel) -> Result<()> {
        self.shared.require_open(line)?;
        self.shared.driver.write(line, level)
    }

    // --- Change notification ---

    /// Registers `callback` for level changes on an open line.
    ///
    /// The current level becomes the baseline. The first subscription starts
    /// the poll worker (in polling mode).
    pub fn subscribe<F>(&self, line: u8, callback: F) -> Result<SubscriptionToken>
    where
        F: Fn(PinChangedEvent) + Send + Sync + 'static,
    {
        self.shared.subscribe(line, Arc::new(callback))
    }

    /// Removes one registration. Returns `false` if the token was unknown.
    ///
    /// Removing the last registration stops the poll worker; once this
    /// returns the worker performs no further reads.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.shared.unsubscribe(token)
    }

    /// Runs one diff-and-notify pass immediately. Returns the number of lines
    /// that changed.
    pub fn check_changes(&self) -> Result<usize> {
        self.shared.check_changes()
    }

    /// Blocks until an edge matching `edges` occurs on `line`, or `timeout`
    /// passes (`Ok(None)`).
    pub fn wait_for_event(
        &self,
        line: u8,
        edges: EdgeFilter,
        timeout: Duration,
    ) -> Result<Option<PinChangedEvent>> {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let token = self.subscribe(line, move |event| {
            if edges.matches(event.edge) {
                if lock(&tx).send(event).is_err() {
                    trace!("Dropped event on line {}: waiter gone", event.line);
                }
            }
        })?;
        let result = match rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(_) => None,
        };
        self.unsubscribe(token);
        Ok(result)
    }

    /// `true` while the poll worker is running.
    pub fn is_polling(&self) -> bool {
        lock(&self.shared.worker).is_some()
    }

    pub fn trigger_mode(&self) -> TriggerMode {
        match *lock(&self.shared.trigger) {
            Trigger::Polling => TriggerMode::Polling,
            Trigger::Interrupt(_) => TriggerMode::Interrupt,
        }
    }

    // --- Trigger modes ---

    /// Uses the poll worker for change detection, detaching any interrupt line.
    pub fn enable_polling(&self) -> Result<()> {
        let previous = std::mem::replace(&mut *lock(&self.shared.trigger), Trigger::Polling);
        if let Trigger::Interrupt(detach) = previous {
            detach();
            debug!("Interrupt line detached, polling enabled");
        }
        self.shared.update_worker()
    }

    /// Uses a falling edge on `host_line` of `host` as the change trigger,
    /// stopping the poll worker.
    ///
    /// The host line is opened as an input if needed. Every falling edge
    /// runs [`GpioController::check_changes`] on this controller.
    pub fn attach_interrupt<H: LineDriver>(&self, host: &GpioController<H>, host_line: u8) -> Result<()> {
        if host.direction(host_line).ok() != Some(GpioDirection::Input) {
            host.open_line(host_line, GpioDirection::Input)?;
        }
        let target: Weak<Shared<D>> = Arc::downgrade(&self.shared);
        let token = host.subscribe(host_line, move |event| {
            if event.edge != PinEdge::Falling {
                return;
            }
            if let Some(shared) = target.upgrade() {
                trace!("Interrupt on host line {}", event.line);
                shared.poll_once();
            }
        })?;
        let host_shared = Arc::downgrade(&host.shared);
        let detach: Box<dyn FnOnce() + Send> = Box::new(move || {
            if let Some(host) = host_shared.upgrade() {
                host.unsubscribe(token);
            }
        });

        let previous = std::mem::replace(&mut *lock(&self.shared.trigger), Trigger::Interrupt(detach));
        if let Trigger::Interrupt(old) = previous {
            old();
        }
        debug!("Change detection attached to host line {}", host_line);
        self.shared.update_worker()
    }
}

impl<D: LineDriver> Drop for GpioController<D> {
    fn drop(&mut self) {
        let previous = std::mem::replace(&mut *lock(&self.shared.trigger), Trigger::Polling);
        if let Trigger::Interrupt(detach) = previous {
            detach();
        }
        let worker = lock(&self.shared.worker).take();
        if let Some(worker) = worker {
            stop_worker(worker);
        }
    }
}

/// Borrowed handle to an open line.
pub struct GpioLine<'a, D: LineDriver> {
    controller: &'a GpioController<D>,
    line: u8,
}

impl<D: LineDriver> fmt::Debug for GpioLine<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpioLine").field("line", &self.line).finish()
    }
}

impl<D: LineDriver> GpioLine<'_, D> {
    pub fn number(&self) -> u8 {
        self.line
    }

    pub fn read(&self) -> Result<GpioLevel> {
        self.controller.read(self.line)
    }

    pub fn write(&self, level: GpioLevel) -> Result<()> {
        self.controller.write(self.line, level)
    }

    pub fn set_direction(&self, direction: GpioDirection) -> Result<()> {
        self.controller.set_direction(self.line, direction)
    }

    pub fn direction(&self) -> Result<GpioDirection> {
        self.controller.direction(self.line)
    }

    pub fn subscribe<F>(&self, callback: F) -> Result<SubscriptionToken>
    where
        F: Fn(PinChangedEvent) + Send + Sync + 'static,
    {
        self.controller.subscribe(self.line, callback)
    }

    pub fn close(self) -> Result<()> {
        self.controller.close_line(self.line)
    }
}
