//! Configures a [`Session`] before its collective construction.

use std::sync::Mutex;

use crate::arena::Arena;
use crate::env::{EnvSource, ProcessEnv};
use crate::error::Result;
use crate::instance::{InstanceId, InstanceSlot};
use crate::pal::PlatformFacade;
use crate::session::{
    DEFAULT_GROUP_NAME, Session, SessionOption, SessionOptions, parse_flags, sanitized,
};
use crate::timer_group::{GroupId, GroupSlot};
use crate::transport::{Communicator, SingleProcess};

/// Builds a [`Session`], the owning object of the timing library.
///
/// The defaults describe the smallest possible run: a single process, no
/// report output, the real process environment and clocks. Configure the
/// file name to get a report file, and plug in a [`Communicator`] to span
/// multiple ranks.
///
/// # Example
///
/// ```
/// use many_ranks::{Session, TimerKind};
///
/// let session = Session::builder("data_processor")
///     .machine("test rig")
///     .init()?;
///
/// let group = session.default_group(session.default_instance())?;
/// let timer = session.create_timer(group, "io", TimerKind::ALL)?;
///
/// session.start(timer)?;
/// session.stop(timer)?;
///
/// session.finalize()?;
/// # Ok::<(), many_ranks::Error>(())
/// ```
#[derive(Debug)]
pub struct SessionBuilder {
    application_name: String,
    file_name: String,
    communicator: Box<dyn Communicator>,
    env: Box<dyn EnvSource>,
    platform: PlatformFacade,
    machine: String,
    processor: String,
    operating_system: String,
    compiler: String,
    max_contexts: u32,
    flags_text: Option<String>,
    specific_variables: Vec<String>,
    options: SessionOptions,
}

impl SessionBuilder {
    pub(crate) fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            file_name: String::new(),
            communicator: Box::new(SingleProcess::new()),
            env: Box::new(ProcessEnv),
            platform: PlatformFacade::real(),
            machine: "Unknown".to_string(),
            processor: "Unknown".to_string(),
            operating_system: "Unknown".to_string(),
            compiler: "Unknown".to_string(),
            max_contexts: 1,
            flags_text: None,
            specific_variables: Vec::new(),
            options: SessionOptions::default(),
        }
    }

    /// Sets the base name of the report file.
    ///
    /// An empty base (the default) produces no output. `-` writes the report
    /// to standard output. Anything else names a file `<base><N>.pmtm` where
    /// `N` is the first unused suffix, so repeated runs never overwrite each
    /// other. Only the collector rank opens the target.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use many_ranks::Session;
    ///
    /// let session = Session::builder("solver")
    ///     .file_name("solver_timings")
    ///     .init()?;
    ///
    /// // The first run writes solver_timings0.pmtm, the next one
    /// // solver_timings1.pmtm, and so on.
    /// assert!(session.file_name(session.default_instance())?.is_some());
    /// # Ok::<(), many_ranks::Error>(())
    /// ```
    #[must_use]
    pub fn file_name(mut self, base: impl Into<String>) -> Self {
        self.file_name = base.into();
        self
    }

    /// Plugs in the transport that connects the ranks of the run.
    ///
    /// The default is [`SingleProcess`], a run of one rank. Every rank of a
    /// run must build its session over the same communicator arrangement and
    /// drive the collective operations in the same order.
    ///
    /// # Example
    ///
    /// ```
    /// use many_ranks::{Communicator, Session, channel_cluster};
    ///
    /// let transports = channel_cluster(2);
    /// let handles: Vec<_> = transports
    ///     .into_iter()
    ///     .map(|transport| {
    ///         std::thread::spawn(move || {
    ///             let session = Session::builder("worker")
    ///                 .communicator(transport)
    ///                 .init()
    ///                 .unwrap();
    ///             session.finalize().unwrap();
    ///         })
    ///     })
    ///     .collect();
    ///
    /// for handle in handles {
    ///     handle.join().unwrap();
    /// }
    /// ```
    #[must_use]
    pub fn communicator(mut self, communicator: impl Communicator) -> Self {
        self.communicator = Box::new(communicator);
        self
    }

    /// Describes the machine the run executes on, for the report header.
    #[must_use]
    pub fn machine(mut self, description: impl Into<String>) -> Self {
        self.machine = description.into();
        self
    }

    /// Describes the processor, for the report header.
    #[must_use]
    pub fn processor(mut self, description: impl Into<String>) -> Self {
        self.processor = description.into();
        self
    }

    /// Describes the operating system, for the report header.
    #[must_use]
    pub fn operating_system(mut self, description: impl Into<String>) -> Self {
        self.operating_system = description.into();
        self
    }

    /// Describes the compiler the application was built with, for the report
    /// header.
    #[must_use]
    pub fn compiler(mut self, description: impl Into<String>) -> Self {
        self.compiler = description.into();
        self
    }

    /// Sets the greatest number of concurrent contexts expected to drive
    /// timers, echoed in the report header. The default is 1.
    #[must_use]
    pub fn max_contexts(mut self, count: u32) -> Self {
        self.max_contexts = count;
        self
    }

    /// Records the command-line flags of the run, echoed once in the next
    /// report header.
    ///
    /// The text is split into individual flags at whitespace followed by a
    /// dash, so `-in data.dat -fast` becomes the two flags `-in data.dat`
    /// and `-fast`. The same split can be re-run mid-session with
    /// [`Session::log_flags`].
    #[must_use]
    pub fn flags(mut self, command_line: impl Into<String>) -> Self {
        self.flags_text = Some(command_line.into());
        self
    }

    /// Names an environment variable whose value is echoed as a `Specific`
    /// header line when it is set and non-empty. May be called repeatedly.
    #[must_use]
    pub fn specific_variable(mut self, name: impl Into<String>) -> Self {
        self.specific_variables.push(name.into());
        self
    }

    /// Sets a session option.
    ///
    /// # Example
    ///
    /// ```
    /// use many_ranks::{Session, SessionOption};
    ///
    /// let session = Session::builder("quiet")
    ///     .option(SessionOption::OutputEnv, false)
    ///     .init()?;
    /// # session.finalize()?;
    /// # Ok::<(), many_ranks::Error>(())
    /// ```
    #[must_use]
    pub fn option(mut self, option: SessionOption, enabled: bool) -> Self {
        self.options.set(option, enabled);
        self
    }

    /// Substitutes the environment source. Tests use this to fix the
    /// variables the header derives from.
    #[cfg(test)]
    pub(crate) fn env_source(mut self, env: impl EnvSource) -> Self {
        self.env = Box::new(env);
        self
    }

    /// Substitutes the clock platform. Tests use this to drive timers with
    /// synthetic clocks.
    #[cfg(test)]
    pub(crate) fn platform(mut self, platform: impl Into<PlatformFacade>) -> Self {
        self.platform = platform.into();
        self
    }

    /// Performs the collective construction of the session.
    ///
    /// Every rank of the run must call this. The collector opens the report
    /// sink, writes the header, and calibrates the timer overhead; then all
    /// ranks agree on the outcome. When any rank fails, every rank rolls its
    /// local state back, any created report file is removed, and all ranks
    /// return the same error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooManyFlags`][crate::Error::TooManyFlags] when the
    /// configured flags string splits into more than the supported number of
    /// flags, [`Error::Sink`][crate::Error::Sink] when the report target
    /// cannot be opened or written, and whichever error the ranks agreed on
    /// when construction fails elsewhere in the run.
    pub fn init(self) -> Result<Session> {
        let application_name = sanitized(&self.application_name, "application name");
        let machine = sanitized(&self.machine, "machine description");
        let processor = sanitized(&self.processor, "processor description");
        let operating_system = sanitized(&self.operating_system, "operating system description");
        let compiler = sanitized(&self.compiler, "compiler description");

        let flags = match &self.flags_text {
            Some(text) => parse_flags(text)?,
            None => Vec::new(),
        };

        let groups = Arena::new();
        let default_group = GroupId(groups.insert(GroupSlot::new(DEFAULT_GROUP_NAME.to_string())));
        let instances = Arena::new();
        let default_instance =
            InstanceId(instances.insert(InstanceSlot::new(application_name, default_group)));

        let session = Session {
            instances,
            groups,
            timers: Arena::new(),
            creation: Mutex::new(()),
            communicator: self.communicator,
            env: self.env,
            platform: self.platform,
            machine,
            processor,
            operating_system,
            compiler,
            max_contexts: self.max_contexts,
            options: Mutex::new(self.options),
            flags: Mutex::new(flags),
            specific_variables: self.specific_variables,
            default_instance,
        };

        session.activate_instance(default_instance, &self.file_name)?;

        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn defaults_describe_a_single_silent_rank() {
        let session = SessionBuilder::new("app").init().unwrap();

        assert_eq!(session.rank(), 0);
        assert_eq!(session.num_ranks(), 1);
        assert!(session.is_collector());
        assert_eq!(session.file_name(session.default_instance()).unwrap(), None);
    }

    #[test]
    fn finalized_session_leaves_a_clean_slate_for_the_next() {
        let first = SessionBuilder::new("app").init().unwrap();
        first.finalize().unwrap();

        let second = SessionBuilder::new("app").init().unwrap();
        assert_eq!(second.num_ranks(), 1);
        second.finalize().unwrap();
    }

    #[test]
    fn overflowing_flags_fail_construction() {
        let command_line = "-f ".repeat(1025);

        let result = SessionBuilder::new("app").flags(command_line).init();

        assert_eq!(result.err(), Some(Error::TooManyFlags));
    }

    #[test]
    #[cfg_attr(miri, ignore)] // Miri cannot use the real operating system APIs.
    fn unreachable_report_target_fails_construction() {
        let result = SessionBuilder::new("app")
            .file_name("/definitely/not/a/real/directory/report")
            .init();

        assert_eq!(result.err(), Some(Error::Sink));
    }

    // The builder can be prepared on one thread and initialised on another.
    static_assertions::assert_impl_all!(SessionBuilder: Send);
}
