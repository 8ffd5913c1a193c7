//! The unit of report production.

use std::sync::Mutex;
use std::sync::atomic::AtomicU32;

use crate::arena::SlotKey;
use crate::parameter::ParameterStore;
use crate::sink::ReportSink;
use crate::timer_group::GroupId;

/// Identifies an instance within its [`Session`][crate::Session]. Ids stay
/// valid until the instance is destroyed; stale ids are rejected, never
/// reused.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct InstanceId(pub(crate) SlotKey);

/// One report-producing unit: an application name, the sink its report goes
/// to, the groups that feed it, and its parameter store.
///
/// The sink is live only on the collector rank; everywhere else it is the
/// no-output variant, so instance code never branches on rank to write.
#[derive(Debug)]
pub(crate) struct InstanceSlot {
    pub(crate) application_name: String,
    pub(crate) sink: Mutex<ReportSink>,
    /// Groups in creation order. The first is the instance's default group.
    pub(crate) groups: Mutex<Vec<GroupId>>,
    pub(crate) default_group: GroupId,
    pub(crate) parameters: Mutex<ParameterStore>,
    /// Aggregation passes written to the current sink target. Passes after
    /// the first are preceded by a blank separator line. Only touched while
    /// the sink lock is held.
    pub(crate) passes_written: AtomicU32,
}

impl InstanceSlot {
    pub(crate) fn new(application_name: String, default_group: GroupId) -> Self {
        Self {
            application_name,
            sink: Mutex::new(ReportSink::None),
            groups: Mutex::new(vec![default_group]),
            default_group,
            parameters: Mutex::new(ParameterStore::default()),
            passes_written: AtomicU32::new(0),
        }
    }
}
