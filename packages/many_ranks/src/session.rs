//! The session that owns every instance, group and timer of a process.

use std::num::NonZero;
use std::str::FromStr;
use std::sync::Mutex;

use crate::ERR_POISONED_LOCK;
use crate::arena::Arena;
use crate::builder::SessionBuilder;
use crate::collector::split_by_sizes;
use crate::env::EnvSource;
use crate::error::{Error, Result};
use crate::instance::{InstanceId, InstanceSlot};
use crate::pal::{Platform, PlatformFacade};
use crate::parameter::{OutputPolicy, Value, display_name};
use crate::report;
use crate::sink::ReportSink;
use crate::timer::{StateViolation, TimerId, TimerSlot, TimerState};
use crate::timer_group::{GroupId, GroupSlot};
use crate::timer_kind::TimerKind;
use crate::transport::{Communicator, consensus};

/// Name of the timer group every instance starts with.
pub(crate) const DEFAULT_GROUP_NAME: &str = "Default";

/// Greatest number of flags a session will echo in a report header.
pub(crate) const MAX_FLAGS: usize = 1024;

/// A togglable session behavior.
///
/// Options are set at build time through
/// [`SessionBuilder::option`][crate::SessionBuilder::option] or at runtime
/// through [`Session::set_option`]. The textual names accepted by
/// [`FromStr`] let configuration files and environment variables name them.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum SessionOption {
    /// Echo the whole process environment in every report header, one
    /// `Environ` line per variable. Enabled by default.
    OutputEnv,
}

impl FromStr for SessionOption {
    type Err = Error;

    /// Parses an option from its configuration name.
    ///
    /// # Example
    ///
    /// ```
    /// use many_ranks::SessionOption;
    ///
    /// let option: SessionOption = "output_env".parse()?;
    /// assert_eq!(option, SessionOption::OutputEnv);
    /// # Ok::<(), many_ranks::Error>(())
    /// ```
    fn from_str(name: &str) -> Result<Self> {
        match name {
            "output_env" => Ok(Self::OutputEnv),
            _ => Err(Error::UnknownOption),
        }
    }
}

/// The resolved state of every session option.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SessionOptions {
    pub(crate) output_env: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { output_env: true }
    }
}

impl SessionOptions {
    pub(crate) fn set(&mut self, option: SessionOption, enabled: bool) {
        match option {
            SessionOption::OutputEnv => self.output_env = enabled,
        }
    }
}

/// The owning object of the timing library.
///
/// A session is one rank's view of a run. Every rank builds one over the
/// same communicator arrangement via [`Session::builder`], after which the
/// collective operations (instance creation and destruction, report passes,
/// [`Session::finalize`]) must be driven in the same order on every rank.
/// Everything else is purely local and can be called freely.
///
/// All methods take `&self`; a session can be shared across the threads of
/// its rank, with concurrent callers kept apart through timer contexts.
///
/// # Example
///
/// ```
/// use many_ranks::{Session, TimerKind};
///
/// let session = Session::builder("data_processor").init()?;
///
/// let group = session.default_group(session.default_instance())?;
/// let compute = session.create_timer(group, "compute", TimerKind::AVG)?;
///
/// for _ in 0..4 {
///     session.start(compute)?;
///     // ... the work being measured ...
///     session.stop(compute)?;
/// }
///
/// session.finalize()?;
/// # Ok::<(), many_ranks::Error>(())
/// ```
#[derive(Debug)]
pub struct Session {
    pub(crate) instances: Arena<InstanceSlot>,
    pub(crate) groups: Arena<GroupSlot>,
    pub(crate) timers: Arena<TimerSlot>,

    /// Serialises creation and teardown so arena inserts cannot interleave
    /// with the bookkeeping that files them under their owners.
    pub(crate) creation: Mutex<()>,

    pub(crate) communicator: Box<dyn Communicator>,
    pub(crate) env: Box<dyn EnvSource>,
    pub(crate) platform: PlatformFacade,

    pub(crate) machine: String,
    pub(crate) processor: String,
    pub(crate) operating_system: String,
    pub(crate) compiler: String,
    pub(crate) max_contexts: u32,

    pub(crate) options: Mutex<SessionOptions>,

    /// Flags waiting to be echoed. The next header written drains them.
    pub(crate) flags: Mutex<Vec<String>>,

    /// Environment variables echoed as `Specific` lines in every header.
    pub(crate) specific_variables: Vec<String>,

    pub(crate) default_instance: InstanceId,
}

impl Session {
    /// Starts configuring a session for the named application.
    #[must_use]
    pub fn builder(application_name: impl Into<String>) -> SessionBuilder {
        SessionBuilder::new(application_name)
    }

    /// The instance every session starts with.
    #[must_use]
    pub fn default_instance(&self) -> InstanceId {
        self.default_instance
    }

    /// This process's rank within the run.
    #[must_use]
    pub fn rank(&self) -> u32 {
        self.communicator.rank()
    }

    /// The number of ranks in the run.
    #[must_use]
    pub fn num_ranks(&self) -> u32 {
        self.communicator.size()
    }

    /// Whether this rank is the one that writes report output.
    #[must_use]
    pub fn is_collector(&self) -> bool {
        self.communicator.is_collector()
    }

    /// Creates a further instance with its own report target, parameter
    /// store and default timer group.
    ///
    /// Collective. On failure no rank keeps the instance and any report
    /// file created for it is removed again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sink`] when the report target cannot be opened or
    /// written, or whichever error the ranks agreed on.
    pub fn create_instance(&self, application_name: &str, file_name: &str) -> Result<InstanceId> {
        let application_name = sanitized(application_name, "application name");

        let instance = {
            let _guard = self.creation.lock().expect(ERR_POISONED_LOCK);
            let default_group = GroupId(
                self.groups
                    .insert(GroupSlot::new(DEFAULT_GROUP_NAME.to_string())),
            );
            InstanceId(
                self.instances
                    .insert(InstanceSlot::new(application_name, default_group)),
            )
        };

        self.activate_instance(instance, file_name)?;

        Ok(instance)
    }

    /// Opens the report target of a freshly created instance, writes its
    /// front matter and brings all ranks to agreement on the outcome. On
    /// failure the instance is unwound everywhere before the error returns.
    pub(crate) fn activate_instance(&self, instance: InstanceId, file_name: &str) -> Result<()> {
        let local = self.try_activate(instance, file_name);

        match consensus(self.communicator.as_ref(), local) {
            Ok(()) => Ok(()),
            Err(error) => {
                self.unwind_instance(instance);
                Err(error)
            }
        }
    }

    fn try_activate(&self, instance: InstanceId, file_name: &str) -> Result<()> {
        let slot = self.instances.get(instance.0, Error::UnknownInstance)?;

        // Only the collector rank produces output; the other ranks keep the
        // inactive sink they were born with.
        if !self.is_collector() {
            return Ok(());
        }

        let mut sink = slot.sink.lock().expect(ERR_POISONED_LOCK);
        *sink = ReportSink::open(file_name)?;
        self.write_front_matter(&slot, &mut sink)
    }

    /// Removes a partially constructed instance, deleting any report file
    /// it managed to create. A failed construction leaves no trace.
    fn unwind_instance(&self, instance: InstanceId) {
        let _guard = self.creation.lock().expect(ERR_POISONED_LOCK);

        let Ok(slot) = self.instances.retire(instance.0, Error::UnknownInstance) else {
            return;
        };

        slot.sink.lock().expect(ERR_POISONED_LOCK).abandon();

        let groups = slot.groups.lock().expect(ERR_POISONED_LOCK);
        for group in groups.iter() {
            drop(self.groups.retire(group.0, Error::UnknownGroup));
        }
    }

    /// Writes a final aggregation pass for the instance, seals its report
    /// with the end-of-file footer and releases its groups and timers.
    ///
    /// Collective. The instance id and the ids of everything it owned
    /// become stale.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownInstance`] for a stale id, and otherwise the
    /// first error the final pass or the report target ran into. Teardown
    /// continues past errors so the local state is released either way.
    pub fn destroy_instance(&self, instance: InstanceId) -> Result<()> {
        let pass = self.aggregation_pass(instance);

        let _guard = self.creation.lock().expect(ERR_POISONED_LOCK);

        let slot = self.instances.retire(instance.0, Error::UnknownInstance)?;

        let close = slot.sink.lock().expect(ERR_POISONED_LOCK).close();

        let groups = {
            let mut groups = slot.groups.lock().expect(ERR_POISONED_LOCK);
            std::mem::take(&mut *groups)
        };

        let mut release = Ok(());
        for group in groups {
            match self.groups.retire(group.0, Error::UnknownGroup) {
                Ok(group_slot) => {
                    for (key, timer) in self.timers.live() {
                        if group_slot.owns(&timer) {
                            drop(self.timers.retire(key, Error::UnknownTimer));
                        }
                    }
                }
                Err(error) => release = release.and(Err(error)),
            }
        }

        pass.and(close).and(release)
    }

    /// Destroys every live instance and consumes the session.
    ///
    /// Collective. Each instance receives its final aggregation pass and
    /// its report footer, exactly as [`Session::destroy_instance`] writes
    /// them. All instances are dealt with even when one fails; the first
    /// error is returned at the end.
    ///
    /// # Errors
    ///
    /// The first error any of the final passes or report targets ran into.
    pub fn finalize(self) -> Result<()> {
        let mut outcome = Ok(());
        for (key, _) in self.instances.live() {
            outcome = outcome.and(self.destroy_instance(InstanceId(key)));
        }
        outcome
    }

    /// The path of the instance's report target.
    ///
    /// `None` when the instance produces no output, and on every rank other
    /// than the collector. Standard output reports as `<stdout>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownInstance`] for a stale id.
    pub fn file_name(&self, instance: InstanceId) -> Result<Option<String>> {
        let slot = self.instances.get(instance.0, Error::UnknownInstance)?;
        let sink = slot.sink.lock().expect(ERR_POISONED_LOCK);
        Ok(sink.path().map(str::to_string))
    }

    /// Redirects the instance's report to a new target.
    ///
    /// The report written so far is sealed with the usual footer, then the
    /// new target is opened and receives fresh front matter. Purely local:
    /// only the collector rank touches files, and only it needs to call
    /// this.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownInstance`] for a stale id and
    /// [`Error::Sink`] when sealing the old target or opening the new one
    /// fails. The instance stays usable either way; after a failure it is
    /// simply left without an output target.
    pub fn set_file_name(&self, instance: InstanceId, file_name: &str) -> Result<()> {
        let slot = self.instances.get(instance.0, Error::UnknownInstance)?;

        if !self.is_collector() {
            return Ok(());
        }

        let mut sink = slot.sink.lock().expect(ERR_POISONED_LOCK);
        sink.close()?;
        *sink = ReportSink::open(file_name)?;
        self.write_front_matter(&slot, &mut sink)
    }

    /// Creates a named timer group within an instance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownInstance`] for a stale id.
    pub fn create_group(&self, instance: InstanceId, name: &str) -> Result<GroupId> {
        let name = sanitized(name, "group name");

        let _guard = self.creation.lock().expect(ERR_POISONED_LOCK);
        let slot = self.instances.get(instance.0, Error::UnknownInstance)?;
        let group = GroupId(self.groups.insert(GroupSlot::new(name)));
        slot.groups.lock().expect(ERR_POISONED_LOCK).push(group);

        Ok(group)
    }

    /// The group every instance starts with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownInstance`] for a stale id.
    pub fn default_group(&self, instance: InstanceId) -> Result<GroupId> {
        let slot = self.instances.get(instance.0, Error::UnknownInstance)?;
        Ok(slot.default_group)
    }

    /// Creates a timer in a group, measuring under context 0.
    ///
    /// The kind decides which rows the merged report prints for the timer:
    /// per-rank rows, the cross-rank aggregates, or nothing at all.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownGroup`] for a stale group id and
    /// [`Error::CreateTimerFailed`] when the group already has this timer
    /// for context 0.
    pub fn create_timer(&self, group: GroupId, name: &str, kind: TimerKind) -> Result<TimerId> {
        self.create_timer_for_context(group, name, kind, 0)
    }

    /// Creates a timer measuring under the given context.
    ///
    /// Contexts keep concurrent callers apart: each context gets its own
    /// accumulators under the shared name, and the report prints one row
    /// per `rank.context` pair.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownGroup`] for a stale group id and
    /// [`Error::CreateTimerFailed`] when the group already has this
    /// (name, context) pair.
    pub fn create_timer_for_context(
        &self,
        group: GroupId,
        name: &str,
        kind: TimerKind,
        context: u32,
    ) -> Result<TimerId> {
        let name = sanitized(name, "timer name");

        let _guard = self.creation.lock().expect(ERR_POISONED_LOCK);
        let group_slot = self.groups.get(group.0, Error::UnknownGroup)?;

        let key = self.timers.insert(TimerSlot::new(name, kind, context));
        let timer = self.timers.get(key, Error::UnknownTimer)?;

        if let Err(error) = group_slot.add_timer(timer) {
            // The failed filing must not leave the slot behind in the arena.
            drop(self.timers.retire(key, Error::UnknownTimer));
            return Err(error);
        }

        Ok(TimerId(key))
    }

    /// Restricts how often a timer actually measures.
    ///
    /// Only every `stride`-th start/stop cycle is measured; with a
    /// `sample_cap`, measurement stops altogether once that many cycles
    /// have gone by. Unmeasured cycles still count, so the throttle thins a
    /// hot timer without losing track of how often it ran.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTimer`] for a stale id.
    pub fn set_sampling(
        &self,
        timer: TimerId,
        stride: NonZero<u32>,
        sample_cap: Option<u32>,
    ) -> Result<()> {
        let slot = self.timers.get(timer.0, Error::UnknownTimer)?;
        slot.metrics
            .lock()
            .expect(ERR_POISONED_LOCK)
            .set_sampling(stride, sample_cap);
        Ok(())
    }

    /// Starts a timer's measurement cycle.
    ///
    /// Starting a timer that is not stopped is reported as a misuse on the
    /// collector rank; the cycle then restarts from now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTimer`] for a stale id.
    pub fn start(&self, timer: TimerId) -> Result<()> {
        let slot = self.timers.get(timer.0, Error::UnknownTimer)?;
        let now = self.platform.now();
        let violation = slot.metrics.lock().expect(ERR_POISONED_LOCK).start(now);
        self.warn_on_violation(&slot, violation);
        Ok(())
    }

    /// Stops a timer's measurement cycle, folding it into the totals.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTimer`] for a stale id.
    pub fn stop(&self, timer: TimerId) -> Result<()> {
        let slot = self.timers.get(timer.0, Error::UnknownTimer)?;
        let now = self.platform.now();
        let violation = slot.metrics.lock().expect(ERR_POISONED_LOCK).stop(now);
        self.warn_on_violation(&slot, violation);
        Ok(())
    }

    /// Suspends a running cycle, keeping the time accumulated so far.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTimer`] for a stale id.
    pub fn pause(&self, timer: TimerId) -> Result<()> {
        let slot = self.timers.get(timer.0, Error::UnknownTimer)?;
        let now = self.platform.now();
        let violation = slot.metrics.lock().expect(ERR_POISONED_LOCK).pause(now);
        self.warn_on_violation(&slot, violation);
        Ok(())
    }

    /// Resumes a paused cycle. Time spent paused is not counted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTimer`] for a stale id.
    pub fn resume(&self, timer: TimerId) -> Result<()> {
        let slot = self.timers.get(timer.0, Error::UnknownTimer)?;
        let now = self.platform.now();
        let violation = slot.metrics.lock().expect(ERR_POISONED_LOCK).resume(now);
        self.warn_on_violation(&slot, violation);
        Ok(())
    }

    /// Wall-clock seconds since the running cycle's last start or resume.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTimer`] for a stale id.
    pub fn elapsed_wall(&self, timer: TimerId) -> Result<f64> {
        let slot = self.timers.get(timer.0, Error::UnknownTimer)?;
        let now = self.platform.now();
        let metrics = slot.metrics.lock().expect(ERR_POISONED_LOCK);
        self.warn_on_violation(&slot, metrics.expect_state(TimerState::Active, "sampled"));
        Ok(metrics.elapsed_wall(now))
    }

    /// Processor seconds since the running cycle's last start or resume.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTimer`] for a stale id.
    pub fn elapsed_cpu(&self, timer: TimerId) -> Result<f64> {
        let slot = self.timers.get(timer.0, Error::UnknownTimer)?;
        let now = self.platform.now();
        let metrics = slot.metrics.lock().expect(ERR_POISONED_LOCK);
        self.warn_on_violation(&slot, metrics.expect_state(TimerState::Active, "sampled"));
        Ok(metrics.elapsed_cpu(now))
    }

    /// Total measured wall-clock seconds across completed cycles.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTimer`] for a stale id.
    pub fn total_wall(&self, timer: TimerId) -> Result<f64> {
        let slot = self.timers.get(timer.0, Error::UnknownTimer)?;
        let metrics = slot.metrics.lock().expect(ERR_POISONED_LOCK);
        self.warn_on_violation(&slot, metrics.expect_state(TimerState::Stopped, "read"));
        Ok(metrics.total_wall)
    }

    /// Total measured processor seconds across completed cycles.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTimer`] for a stale id.
    pub fn total_cpu(&self, timer: TimerId) -> Result<f64> {
        let slot = self.timers.get(timer.0, Error::UnknownTimer)?;
        let metrics = slot.metrics.lock().expect(ERR_POISONED_LOCK);
        self.warn_on_violation(&slot, metrics.expect_state(TimerState::Stopped, "read"));
        Ok(metrics.total_cpu)
    }

    /// Wall-clock seconds of the most recent measured cycle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTimer`] for a stale id.
    pub fn last_wall(&self, timer: TimerId) -> Result<f64> {
        let slot = self.timers.get(timer.0, Error::UnknownTimer)?;
        let metrics = slot.metrics.lock().expect(ERR_POISONED_LOCK);
        self.warn_on_violation(&slot, metrics.expect_state(TimerState::Stopped, "read"));
        Ok(metrics.block_wall)
    }

    /// Processor seconds of the most recent measured cycle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTimer`] for a stale id.
    pub fn last_cpu(&self, timer: TimerId) -> Result<f64> {
        let slot = self.timers.get(timer.0, Error::UnknownTimer)?;
        let metrics = slot.metrics.lock().expect(ERR_POISONED_LOCK);
        self.warn_on_violation(&slot, metrics.expect_state(TimerState::Stopped, "read"));
        Ok(metrics.block_cpu)
    }

    /// Records a named parameter in the instance's report.
    ///
    /// The policy decides whether this occurrence is written: every time,
    /// only the first time, or whenever the value differs from the previous
    /// occurrence. Re-emissions of the same name get numbered names so the
    /// report keeps every value apart. Only the collector rank records
    /// anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownInstance`] for a stale id and
    /// [`Error::Sink`] when the report target fails.
    pub fn record_parameter(
        &self,
        instance: InstanceId,
        name: &str,
        value: impl Into<Value>,
        policy: OutputPolicy,
    ) -> Result<()> {
        let slot = self.instances.get(instance.0, Error::UnknownInstance)?;

        if !self.is_collector() {
            return Ok(());
        }

        let name = sanitized(name, "parameter name");
        let text = value_text(&value.into());

        let emitted = slot
            .parameters
            .lock()
            .expect(ERR_POISONED_LOCK)
            .check(&name, &text, policy);

        let Some(count) = emitted else {
            return Ok(());
        };

        let display = display_name(&name, count);
        let mut sink = slot.sink.lock().expect(ERR_POISONED_LOCK);
        let Some(writer) = sink.writer() else {
            return Ok(());
        };
        report::write_parameter_row(writer, self.rank(), &display, &text)?;
        Ok(())
    }

    /// Records a parameter from every rank at once.
    ///
    /// Collective. Each rank contributes its own value under its own policy
    /// check and the collector writes one row per contributing rank,
    /// labelled with that rank. A rank whose policy suppresses the
    /// occurrence contributes nothing and gets no row.
    ///
    /// # Errors
    ///
    /// Whichever error the ranks agreed on: a stale id, a transport
    /// failure, or the collector's report target failing.
    pub fn record_parameter_for_all_ranks(
        &self,
        instance: InstanceId,
        name: &str,
        value: impl Into<Value>,
        policy: OutputPolicy,
    ) -> Result<()> {
        let local = self.prepare_rank_parameter(instance, name, &value.into(), policy);
        let (bytes, len, display) = consensus(self.communicator.as_ref(), local)?;

        let sizes = consensus(
            self.communicator.as_ref(),
            self.communicator.gather_sizes(len),
        )?;
        let gathered = consensus(
            self.communicator.as_ref(),
            self.communicator.gather_payload(&bytes),
        )?;

        let outcome = if self.is_collector() {
            self.print_rank_parameters(instance, &display, &sizes, &gathered)
        } else {
            Ok(())
        };

        consensus(self.communicator.as_ref(), outcome)
    }

    /// One rank's contribution to a run-wide parameter row set: the value
    /// bytes to gather (empty when this rank's policy suppressed the
    /// occurrence) and the name the collector writes the rows under.
    fn prepare_rank_parameter(
        &self,
        instance: InstanceId,
        name: &str,
        value: &Value,
        policy: OutputPolicy,
    ) -> Result<(Vec<u8>, u32, String)> {
        let slot = self.instances.get(instance.0, Error::UnknownInstance)?;

        let name = sanitized(name, "parameter name");
        let text = value_text(value);

        let emitted = slot
            .parameters
            .lock()
            .expect(ERR_POISONED_LOCK)
            .check(&name, &text, policy);

        // A suppressed occurrence falls back to the bare name; nothing is
        // printed under it unless some other rank contributed.
        let display = emitted.map_or_else(|| name.clone(), |count| display_name(&name, count));

        let bytes = match emitted {
            Some(_) => text.into_bytes(),
            None => Vec::new(),
        };
        let len = u32::try_from(bytes.len())?;

        Ok((bytes, len, display))
    }

    fn print_rank_parameters(
        &self,
        instance: InstanceId,
        display: &str,
        sizes: &[u32],
        gathered: &[u8],
    ) -> Result<()> {
        let slot = self.instances.get(instance.0, Error::UnknownInstance)?;
        let chunks = split_by_sizes(gathered, sizes)?;

        let mut sink = slot.sink.lock().expect(ERR_POISONED_LOCK);
        let Some(writer) = sink.writer() else {
            return Ok(());
        };

        for (rank, chunk) in (0_u32..).zip(chunks) {
            if chunk.is_empty() {
                continue;
            }
            let text = String::from_utf8_lossy(chunk);
            report::write_parameter_row(writer, rank, display, &text)?;
        }

        Ok(())
    }

    /// Echoes the named environment variable as a `Specific` line in the
    /// instance's report, when the variable is set and non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownInstance`] for a stale id and
    /// [`Error::Sink`] when the report target fails.
    pub fn output_specific_variable(&self, instance: InstanceId, name: &str) -> Result<()> {
        let slot = self.instances.get(instance.0, Error::UnknownInstance)?;

        if !self.is_collector() {
            return Ok(());
        }

        let Some(value) = self.env.var(name) else {
            return Ok(());
        };
        if value.is_empty() {
            return Ok(());
        }

        let name = sanitized(name, "variable name");
        let value = sanitized(&value, "variable value");

        let mut sink = slot.sink.lock().expect(ERR_POISONED_LOCK);
        let Some(writer) = sink.writer() else {
            return Ok(());
        };
        report::write_specific_row(writer, &name, &value)?;
        Ok(())
    }

    /// Toggles a session option at runtime.
    pub fn set_option(&self, option: SessionOption, enabled: bool) {
        self.options
            .lock()
            .expect(ERR_POISONED_LOCK)
            .set(option, enabled);
    }

    /// Stores command-line flags to be echoed in the next report header.
    ///
    /// The text is split into individual flags at whitespace followed by a
    /// dash, so option arguments stay attached to their flag. Flags
    /// accumulate across calls until a header drains them; flags logged
    /// after construction appear in the header the next
    /// [`Session::set_file_name`] target gets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooManyFlags`] when the accumulated flags would
    /// exceed the supported count; nothing from this call is kept then.
    pub fn log_flags(&self, command_line: &str) -> Result<()> {
        let parsed = parse_flags(command_line)?;

        let mut flags = self.flags.lock().expect(ERR_POISONED_LOCK);
        if flags.len().saturating_add(parsed.len()) > MAX_FLAGS {
            return Err(Error::TooManyFlags);
        }
        flags.extend(parsed);
        Ok(())
    }

    /// Writes an aggregation pass: every timer of the instance, merged
    /// across all ranks, appended to the report.
    ///
    /// Collective. Timers keep their accumulated state and remain usable;
    /// passes after the first are separated from the previous one by a
    /// blank line.
    ///
    /// # Errors
    ///
    /// Whichever error the ranks agreed on: a stale id, a transport
    /// failure, or the collector failing to merge or print.
    pub fn write_report(&self, instance: InstanceId) -> Result<()> {
        self.aggregation_pass(instance)
    }

    /// Reports a misuse of the timer state machine. Only the collector
    /// rank speaks, so a run-wide misuse is not repeated once per rank.
    pub(crate) fn warn_on_violation(&self, slot: &TimerSlot, violation: Option<StateViolation>) {
        if !self.is_collector() {
            return;
        }
        if let Some(violation) = violation {
            tracing::warn!(
                timer = %slot.name,
                action = violation.action,
                observed = ?violation.observed,
                required = ?violation.required,
                "timer used out of sequence"
            );
        }
    }
}

impl Drop for Session {
    #[cfg_attr(test, mutants::skip)] // Making close fail inside a drop needs a torn-down filesystem - manually reviewed.
    fn drop(&mut self) {
        // Only finalize can run the collective farewell pass; a plain drop
        // just makes sure no report file is left without its footer.
        for (_, slot) in self.instances.live() {
            if slot.sink.lock().expect(ERR_POISONED_LOCK).close().is_err() {
                tracing::warn!("report could not be sealed while dropping the session");
            }
        }
    }
}

/// Replaces any commas in `text` so it cannot corrupt the comma-separated
/// report, warning when a replacement happens.
pub(crate) fn sanitized(text: &str, what: &'static str) -> String {
    let (clean, changed) = report::sanitize_for_report(text);
    if changed {
        tracing::warn!(original = %text, input = what, "commas replaced with spaces");
    }
    clean
}

/// Splits a command line into individual flags.
///
/// A new flag starts at every dash that follows whitespace, which keeps
/// option arguments such as `-in data.dat` attached to their flag. Text
/// before the first dash forms a flag of its own.
pub(crate) fn parse_flags(command_line: &str) -> Result<Vec<String>> {
    let mut flags = Vec::new();
    let mut current = String::new();
    let mut previous_was_space = false;

    for ch in command_line.chars() {
        if ch == '-' && previous_was_space {
            push_flag(&mut flags, &mut current)?;
        }
        previous_was_space = ch.is_whitespace();
        current.push(ch);
    }
    push_flag(&mut flags, &mut current)?;

    Ok(flags)
}

fn push_flag(flags: &mut Vec<String>, current: &mut String) -> Result<()> {
    let pending = std::mem::take(current);
    let flag = pending.trim();
    if flag.is_empty() {
        return Ok(());
    }
    if flags.len() >= MAX_FLAGS {
        return Err(Error::TooManyFlags);
    }
    flags.push(flag.to_string());
    Ok(())
}

/// The report text of a parameter value, commas already replaced.
fn value_text(value: &Value) -> String {
    match value {
        Value::Text(text) => sanitized(text, "parameter value"),
        other => other.to_string(),
    }
}
