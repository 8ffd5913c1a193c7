//! Report production: front matter for a fresh sink and the collective
//! aggregation passes that append the merged timer rows.

use std::sync::atomic::Ordering;

use crate::ERR_POISONED_LOCK;
use crate::collector;
use crate::error::{Error, Result};
use crate::instance::{InstanceId, InstanceSlot};
use crate::overhead;
use crate::report::{self, HeaderContext};
use crate::session::{Session, sanitized};
use crate::sink::ReportSink;
use crate::transport::consensus;
use crate::wire::{self, NameEntry, Region, TimerRecord};

impl Session {
    /// Writes the header block and the overhead calibration rows to a
    /// freshly opened sink. Pending flags are drained into the header;
    /// an inactive sink leaves them queued for the next target.
    pub(crate) fn write_front_matter(
        &self,
        slot: &InstanceSlot,
        sink: &mut ReportSink,
    ) -> Result<()> {
        if !sink.is_active() {
            return Ok(());
        }

        let flags = {
            let mut flags = self.flags.lock().expect(ERR_POISONED_LOCK);
            std::mem::take(&mut *flags)
        };

        // The tag and the environment dump are quoted verbatim; only the
        // values the library itself labels get sanitized.
        let tag = self.env.var("PMTM_TAG");

        let mut specific = Vec::new();
        for name in &self.specific_variables {
            let Some(value) = self.env.var(name) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            specific.push((
                sanitized(name, "variable name"),
                sanitized(&value, "variable value"),
            ));
        }

        let output_env = self.options.lock().expect(ERR_POISONED_LOCK).output_env;
        let environ = output_env.then(|| self.env.snapshot());

        let overhead_rows = overhead::measure(&self.platform);

        let header = HeaderContext {
            application_name: &slot.application_name,
            nranks: self.num_ranks(),
            max_contexts: self.max_contexts,
            machine: &self.machine,
            processor: &self.processor,
            os: &self.operating_system,
            compiler: &self.compiler,
            transport: self.communicator.description(),
            tag: tag.as_deref(),
            flags: &flags,
            specific: &specific,
            environ: environ.as_deref(),
        };

        let Some(writer) = sink.writer() else {
            return Ok(());
        };
        report::write_header(writer, &header)?;
        for row in overhead_rows {
            report::write_overhead_row(writer, row.label, row.avg, row.std_dev)?;
        }
        writer.flush()?;

        slot.passes_written.store(0, Ordering::Relaxed);
        Ok(())
    }

    /// One collective aggregation pass: every rank serialises its timers,
    /// the collector gathers, merges and prints, and all ranks settle on
    /// the outcome.
    pub(crate) fn aggregation_pass(&self, instance: InstanceId) -> Result<()> {
        let local = self.encode_regions(instance);
        let (payload, len) = consensus(self.communicator.as_ref(), local)?;

        let sizes = consensus(
            self.communicator.as_ref(),
            self.communicator.gather_sizes(len),
        )?;
        let gathered = consensus(
            self.communicator.as_ref(),
            self.communicator.gather_payload(&payload),
        )?;

        let outcome = if self.is_collector() {
            self.print_pass(instance, &sizes, &gathered)
        } else {
            Ok(())
        };

        consensus(self.communicator.as_ref(), outcome)
    }

    /// This rank's contribution to a pass: one region per group of the
    /// instance, timers snapshotted in declaration order.
    fn encode_regions(&self, instance: InstanceId) -> Result<(Vec<u8>, u32)> {
        let slot = self.instances.get(instance.0, Error::UnknownInstance)?;

        let groups = slot.groups.lock().expect(ERR_POISONED_LOCK).clone();

        let mut regions = Vec::with_capacity(groups.len());
        for group in groups {
            let group_slot = self.groups.get(group.0, Error::UnknownGroup)?;

            let mut names = Vec::new();
            for (name, variants) in group_slot.timers() {
                let mut records = Vec::with_capacity(variants.len());
                for variant in &variants {
                    let (record, violation) = TimerRecord::capture(variant, self.rank());
                    self.warn_on_violation(variant, violation);
                    records.push(record);
                }
                names.push(NameEntry { name, records });
            }

            regions.push(Region {
                group: group_slot.name.clone(),
                names,
            });
        }

        let payload = wire::encode(&regions)?;
        let len = u32::try_from(payload.len())?;
        Ok((payload, len))
    }

    /// Merges the gathered payloads and appends the row set to the report.
    /// Passes after the first open with a blank separator line.
    fn print_pass(&self, instance: InstanceId, sizes: &[u32], gathered: &[u8]) -> Result<()> {
        let slot = self.instances.get(instance.0, Error::UnknownInstance)?;

        let payloads = collector::split_by_sizes(gathered, sizes)?;
        let merged = collector::merge_rank_payloads(&payloads)?;

        let mut sink = slot.sink.lock().expect(ERR_POISONED_LOCK);
        let Some(writer) = sink.writer() else {
            return Ok(());
        };

        let passes = slot.passes_written.load(Ordering::Relaxed);
        if passes > 0 {
            writeln!(writer)?;
        }
        slot.passes_written
            .store(passes.saturating_add(1), Ordering::Relaxed);

        for timer in &merged {
            for (label, stats) in report::timer_rows(timer.kind, &timer.records) {
                report::write_timer_row(writer, label, &timer.name, &stats)?;
            }
        }

        writer.flush()?;
        Ok(())
    }
}
