// Sanitization engine - executes a plan against one validated device
//
// One parameterized state machine covers every method: a vendor command for
// the hardware methods, sequential flushed passes for overwrite. Runtime
// failures end the job in FAILED and are returned inside the job; only
// refusals that happen before a job exists come back as `Err`.

pub mod job;
pub mod locks;


pub use job::{JobFailure, JobState, PassRecord, SanitizationJob, CANCELLED_MARKER};
pub use locks::{DeviceLease, DeviceLockTable};

use crate::algorithms::{
    check_pass_count, default_pass_count, validate_sequence, MethodSelector, PatternFiller,
    PatternKind, SanitizationMethod, SanitizationPlan,
};
use crate::drives::{DeviceDescriptor, HardwareEraser, HiddenAreaRecord, ValidatedDevice};
use crate::io::{BlockDevice, DeviceAccess};
use crate::ui::{NullProgress, ProgressEvent, ProgressSink};
use crate::verification::VerificationSampler;
use crate::{SanitizeError, SanitizeResult};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Shared cancellation flag, observed by the engine at pass boundaries
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bytes per write call during overwrite passes
    pub chunk_size: usize,
    /// Fall back to overwrite when a hardware method fails or times out
    pub allow_fallback: bool,
    /// Pass count for fallback overwrite; device default when unset
    pub fallback_passes: Option<u32>,
    pub ata_timeout: Option<Duration>,
    pub nvme_timeout: Option<Duration>,
    pub discard_timeout: Option<Duration>,
    /// Time a vendor command gets to exit after missing its deadline before
    /// a fallback may touch the device
    pub command_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 4 * 1024 * 1024,
            allow_fallback: false,
            fallback_passes: None,
            ata_timeout: Some(Duration::from_secs(2 * 60 * 60)),
            nvme_timeout: Some(Duration::from_secs(60 * 60)),
            discard_timeout: None,
            command_grace: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Hard deadline for a vendor command
    pub fn deadline_for(&self, method: SanitizationMethod) -> Option<Duration> {
        match method {
            SanitizationMethod::AtaSecureErase | SanitizationMethod::AtaSecureEraseEnhanced => {
                self.ata_timeout
            }
            SanitizationMethod::NvmeCryptoErase => self.nvme_timeout,
            SanitizationMethod::BlkDiscard => self.discard_timeout,
            SanitizationMethod::MultiPassOverwrite => None,
        }
    }
}

pub struct SanitizationEngine {
    config: EngineConfig,
    eraser: Arc<dyn HardwareEraser>,
    access: Arc<dyn DeviceAccess>,
    locks: DeviceLockTable,
    progress: Arc<dyn ProgressSink>,
    sampler: VerificationSampler,
}

impl SanitizationEngine {
    pub fn new(
        config: EngineConfig,
        eraser: Arc<dyn HardwareEraser>,
        access: Arc<dyn DeviceAccess>,
        locks: DeviceLockTable,
    ) -> Self {
        Self {
            config,
            eraser,
            access,
            locks,
            progress: Arc::new(NullProgress),
            sampler: VerificationSampler::default(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_sampler(mut self, sampler: VerificationSampler) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute `plan` against `device` through verification.
    ///
    /// Returns `Err` for a malformed plan, a security-locked device or a
    /// device that already has an active job. Every other outcome, including
    /// cancellation and mid-pass I/O failure, is a job in a terminal state.
    pub fn run(
        &self,
        device: &ValidatedDevice,
        plan: &SanitizationPlan,
        cancel: &CancellationToken,
    ) -> SanitizeResult<SanitizationJob> {
        Self::check_plan(plan)?;
        let descriptor = device.descriptor();
        if descriptor.capabilities.ata_security_locked {
            return Err(SanitizeError::Precondition(format!(
                "{} is ATA security locked",
                descriptor.path
            )));
        }

        // A vendor command worker holds its own clone, so a hung command keeps
        // the device locked after the job returns
        let lease = Arc::new(self.locks.try_acquire(device.path())?);
        let mut job = SanitizationJob::new(
            Uuid::new_v4().to_string(),
            device.path().to_string(),
            plan.clone(),
        );
        let mut reporter = Reporter::new(self.progress.as_ref(), &job);

        tracing::info!(
            operation_id = %job.operation_id(),
            device = %job.device_path(),
            method = %plan.method,
            passes = plan.total_passes(),
            "starting sanitization job"
        );
        reporter.boundary(&job, "job created");

        job.transition(JobState::Running)?;
        reporter.boundary(&job, format!("running {}", plan.method));

        if let Err(err) = self.execute(&mut job, descriptor, &lease, cancel, &mut reporter) {
            return Ok(self.finish_failed(job, &err, &mut reporter));
        }

        job.transition(JobState::Verifying)?;
        reporter.set_percent(100.0);
        reporter.boundary(&job, "verifying");

        match self
            .sampler
            .verify(self.access.as_ref(), self.eraser.as_ref(), descriptor, &job)
        {
            Ok(mut result) => {
                for kept in job.hidden_areas().iter().filter(|r| !r.removed) {
                    result.notes.push_str(&format!("; {}", kept.detail));
                }
                tracing::info!(
                    operation_id = %job.operation_id(),
                    outcome = ?result.outcome,
                    notes = %result.notes,
                    "verification finished"
                );
                job.set_verification(result)?;
                job.transition(JobState::Completed)?;
                reporter.boundary(&job, "completed");
                Ok(job)
            }
            Err(err) => Ok(self.finish_failed(job, &err, &mut reporter)),
        }
    }

    fn finish_failed(
        &self,
        mut job: SanitizationJob,
        err: &SanitizeError,
        reporter: &mut Reporter<'_>,
    ) -> SanitizationJob {
        match err {
            SanitizeError::Cancelled => tracing::warn!(
                operation_id = %job.operation_id(),
                completed_passes = job.pass_records().len(),
                "job cancelled, device not sanitized"
            ),
            other => tracing::error!(
                operation_id = %job.operation_id(),
                class = %other.class(),
                error = %other,
                "sanitization job failed"
            ),
        }
        job.fail(err);
        let message = job
            .failure()
            .map(|f| f.message.clone())
            .unwrap_or_else(|| err.to_string());
        reporter.boundary(&job, message);
        job
    }

    fn check_plan(plan: &SanitizationPlan) -> SanitizeResult<()> {
        if plan.method.is_hardware() {
            if plan.pass_count != 1 || !plan.patterns.is_empty() {
                return Err(SanitizeError::Config(format!(
                    "{} plans take exactly one vendor command",
                    plan.method
                )));
            }
            return Ok(());
        }
        check_pass_count(plan.pass_count)?;
        if plan.patterns.len() as u32 != plan.pass_count {
            return Err(SanitizeError::Config(format!(
                "plan has {} patterns for {} passes",
                plan.patterns.len(),
                plan.pass_count
            )));
        }
        validate_sequence(&plan.patterns)
    }

    fn execute(
        &self,
        job: &mut SanitizationJob,
        descriptor: &DeviceDescriptor,
        lease: &Arc<DeviceLease>,
        cancel: &CancellationToken,
        reporter: &mut Reporter<'_>,
    ) -> SanitizeResult<()> {
        let plan = job.plan().clone();
        self.restore_hidden_areas(job, descriptor, cancel, reporter)?;
        if !plan.method.is_hardware() {
            return self.run_overwrite(job, &plan.patterns, cancel, reporter);
        }

        if cancel.is_cancelled() {
            return Err(SanitizeError::Cancelled);
        }

        let allow_fallback = self.config.allow_fallback;
        match self.run_hardware(job, descriptor, plan.method, lease, reporter) {
            Ok(()) => Ok(()),
            Err(failure) if !failure.settled && failure.error.class().allows_fallback(allow_fallback) => {
                tracing::error!(
                    operation_id = %job.operation_id(),
                    method = %plan.method,
                    grace = %humantime::format_duration(self.config.command_grace),
                    "vendor command still running after its grace period; not falling back, \
                     device stays locked until it exits"
                );
                Err(SanitizeError::Timeout(format!(
                    "{}; command still running, fallback skipped",
                    failure.error
                )))
            }
            Err(CommandFailure { error: err, .. }) if err.class().allows_fallback(allow_fallback) => {
                let passes = self
                    .config
                    .fallback_passes
                    .unwrap_or_else(|| default_pass_count(descriptor));
                let fallback = MethodSelector::overwrite_plan(descriptor, passes, Some(plan.method));
                tracing::warn!(
                    operation_id = %job.operation_id(),
                    method = %plan.method,
                    error = %err,
                    passes,
                    "hardware method failed, falling back to overwrite"
                );
                job.begin_fallback(&fallback)?;
                reporter.restart(fallback.total_passes());
                reporter.boundary(job, format!("{} failed ({}); falling back to overwrite", plan.method, err));
                self.run_overwrite(job, &fallback.patterns, cancel, reporter)
            }
            Err(failure) => Err(failure.error),
        }
    }

    /// Ask the eraser to lift every HPA/DCO probing reported. A failure is
    /// recorded on the job and carried into verification notes; the job goes on
    /// over the capacity that is reachable.
    fn restore_hidden_areas(
        &self,
        job: &mut SanitizationJob,
        descriptor: &DeviceDescriptor,
        cancel: &CancellationToken,
        reporter: &mut Reporter<'_>,
    ) -> SanitizeResult<()> {
        let areas = descriptor.hidden_areas();
        if areas.is_empty() {
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(SanitizeError::Cancelled);
        }

        for area in areas {
            let record = match self.eraser.remove_hidden_area(descriptor, area) {
                Ok(()) => {
                    tracing::info!(operation_id = %job.operation_id(), %area, "hidden area removed");
                    HiddenAreaRecord::removed(area)
                }
                Err(err) => {
                    tracing::warn!(
                        operation_id = %job.operation_id(),
                        %area,
                        error = %err,
                        "hidden area could not be removed"
                    );
                    HiddenAreaRecord::retained(area, &err)
                }
            };
            reporter.boundary(job, record.detail.clone());
            job.record_hidden_area(record)?;
        }
        Ok(())
    }

    fn run_hardware(
        &self,
        job: &mut SanitizationJob,
        descriptor: &DeviceDescriptor,
        method: SanitizationMethod,
        lease: &Arc<DeviceLease>,
        reporter: &mut Reporter<'_>,
    ) -> Result<(), CommandFailure> {
        let caps = &descriptor.capabilities;
        let supported = match method {
            SanitizationMethod::NvmeCryptoErase => caps.nvme_crypto_erase_supported,
            SanitizationMethod::AtaSecureEraseEnhanced => caps.ata_secure_erase_enhanced,
            SanitizationMethod::AtaSecureErase => caps.ata_secure_erase_supported,
            SanitizationMethod::BlkDiscard => caps.discard_supported,
            SanitizationMethod::MultiPassOverwrite => false,
        };
        if !supported {
            return Err(SanitizeError::UnsupportedMethod(format!(
                "{} does not advertise {}",
                descriptor.path, method
            ))
            .into());
        }

        let deadline = self.config.deadline_for(method);
        reporter.pass_started(job, 1, format!("{} issued", method.technique()));

        let start_time = Utc::now();
        let started = Instant::now();
        let (tx, rx) = mpsc::channel();
        let eraser = Arc::clone(&self.eraser);
        let worker_device = descriptor.clone();
        let worker_lease = Arc::clone(lease);
        thread::Builder::new()
            .name(format!("erase-{}", method.as_str().to_lowercase()))
            .spawn(move || {
                let _lease = worker_lease;
                let result = match method {
                    SanitizationMethod::NvmeCryptoErase => {
                        eraser.nvme_crypto_erase(&worker_device, deadline)
                    }
                    SanitizationMethod::AtaSecureEraseEnhanced => {
                        eraser.ata_secure_erase(&worker_device, true, deadline)
                    }
                    SanitizationMethod::AtaSecureErase => {
                        eraser.ata_secure_erase(&worker_device, false, deadline)
                    }
                    SanitizationMethod::BlkDiscard => eraser.block_discard(&worker_device, deadline),
                    SanitizationMethod::MultiPassOverwrite => Err(SanitizeError::UnsupportedMethod(
                        "overwrite is not a vendor command".to_string(),
                    )),
                };
                // Receiver may have given up at the deadline
                let _ = tx.send(result);
            })
            .map_err(|e| SanitizeError::io("spawning vendor command worker", e))?;

        let worker_gone = || {
            SanitizeError::HardwareCommandFailed(format!("{} worker exited without a result", method))
        };
        match deadline {
            Some(limit) => match rx.recv_timeout(limit) {
                Ok(result) => result?,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(CommandFailure {
                        error: SanitizeError::Timeout(format!(
                            "{} did not finish within {}",
                            method,
                            humantime::format_duration(limit)
                        )),
                        settled: self.worker_settled(&rx),
                    })
                }
                Err(RecvTimeoutError::Disconnected) => return Err(worker_gone().into()),
            },
            None => rx.recv().unwrap_or_else(|_| Err(worker_gone()))?,
        }

        let record = PassRecord::new(
            1,
            PatternKind::VendorCommand(method),
            start_time,
            Utc::now(),
            descriptor.capacity_bytes,
            started.elapsed(),
        );
        job.push_pass(record)?;
        reporter.pass_finished(job, 1, format!("{} complete", method.technique()));
        Ok(())
    }

    /// After a missed deadline, wait up to `command_grace` for the worker to
    /// return. Only worth waiting for when a fallback would follow.
    fn worker_settled(&self, rx: &mpsc::Receiver<SanitizeResult<()>>) -> bool {
        if !self.config.allow_fallback {
            return false;
        }
        !matches!(
            rx.recv_timeout(self.config.command_grace),
            Err(RecvTimeoutError::Timeout)
        )
    }

    fn run_overwrite(
        &self,
        job: &mut SanitizationJob,
        patterns: &[PatternKind],
        cancel: &CancellationToken,
        reporter: &mut Reporter<'_>,
    ) -> SanitizeResult<()> {
        let mut dev = self
            .access
            .open(job.device_path())
            .map_err(|e| SanitizeError::io(format!("opening {}", job.device_path()), e))?;
        let mut buffer = vec![0u8; self.config.chunk_size.max(4096)];

        for (idx, &kind) in patterns.iter().enumerate() {
            let pass_number = idx as u32 + 1;
            if cancel.is_cancelled() {
                return Err(SanitizeError::Cancelled);
            }
            let record = self.overwrite_pass(job, dev.as_mut(), &mut buffer, pass_number, kind, reporter)?;
            tracing::info!(
                operation_id = %job.operation_id(),
                pass = pass_number,
                pattern = %kind,
                bytes = record.bytes_written,
                throughput = record.throughput_bytes_per_sec,
                "pass complete"
            );
            job.push_pass(record)?;
            reporter.pass_finished(job, pass_number, format!("pass {} ({}) flushed", pass_number, kind));
        }
        Ok(())
    }

    /// Write one pattern over the whole device and flush. Nothing is recorded
    /// unless the flush succeeds.
    fn overwrite_pass(
        &self,
        job: &SanitizationJob,
        dev: &mut dyn BlockDevice,
        buffer: &mut [u8],
        pass_number: u32,
        kind: PatternKind,
        reporter: &mut Reporter<'_>,
    ) -> SanitizeResult<PassRecord> {
        let capacity = dev.capacity();
        let mut filler = PatternFiller::new(kind)?;
        let fixed = kind.fill_byte().is_some();
        if fixed {
            filler.fill(buffer)?;
        }

        reporter.pass_started(job, pass_number, format!("pass {} writing {}", pass_number, kind));
        let start_time = Utc::now();
        let started = Instant::now();
        let mut offset = 0u64;

        while offset < capacity {
            let len = (buffer.len() as u64).min(capacity - offset) as usize;
            let chunk = &mut buffer[..len];
            if !fixed {
                filler.fill(chunk)?;
            }
            dev.write_at(offset, chunk).map_err(|e| {
                SanitizeError::io(format!("pass {} write at offset {}", pass_number, offset), e)
            })?;
            offset += len as u64;
            reporter.tick(job, pass_number, offset as f64 / capacity as f64);
        }

        dev.flush_durable()
            .map_err(|e| SanitizeError::io(format!("pass {} flush", pass_number), e))?;

        Ok(PassRecord::new(
            pass_number,
            kind,
            start_time,
            Utc::now(),
            offset,
            started.elapsed(),
        ))
    }
}

/// A vendor command that produced no usable result
struct CommandFailure {
    error: SanitizeError,
    /// The worker is known to have returned; false means the command may
    /// still be touching the device
    settled: bool,
}

impl From<SanitizeError> for CommandFailure {
    fn from(error: SanitizeError) -> Self {
        Self {
            error,
            settled: true,
        }
    }
}

/// Per-job progress bookkeeping. Percent and pass number never go backwards.
struct Reporter<'a> {
    sink: &'a dyn ProgressSink,
    total_passes: u32,
    pass_number: u32,
    percent: f64,
    last_tick: f64,
}

impl<'a> Reporter<'a> {
    fn new(sink: &'a dyn ProgressSink, job: &SanitizationJob) -> Self {
        Self {
            sink,
            total_passes: job.plan().total_passes(),
            pass_number: 0,
            percent: 0.0,
            last_tick: 0.0,
        }
    }

    /// Fallback replaces the pass total. Pass number and percent carry on
    /// from where the vendor command left them.
    fn restart(&mut self, total_passes: u32) {
        self.total_passes = total_passes;
    }

    fn set_percent(&mut self, percent: f64) {
        self.percent = self.percent.max(percent.clamp(0.0, 100.0));
    }

    fn overall(&self, pass_number: u32, fraction: f64) -> f64 {
        if self.total_passes == 0 {
            return 0.0;
        }
        let done = pass_number.saturating_sub(1) as f64 + fraction.clamp(0.0, 1.0);
        done / self.total_passes as f64 * 100.0
    }

    fn pass_started(&mut self, job: &SanitizationJob, pass_number: u32, message: String) {
        self.pass_number = pass_number;
        let percent = self.overall(pass_number, 0.0);
        self.set_percent(percent);
        self.last_tick = self.percent;
        self.send(job, message, true);
    }

    fn pass_finished(&mut self, job: &SanitizationJob, pass_number: u32, message: String) {
        let percent = self.overall(pass_number, 1.0);
        self.set_percent(percent);
        self.send(job, message, true);
    }

    /// Intermediate tick; only emitted once percent moved a full point
    fn tick(&mut self, job: &SanitizationJob, pass_number: u32, fraction: f64) {
        let percent = self.overall(pass_number, fraction);
        self.set_percent(percent);
        if self.percent - self.last_tick >= 1.0 {
            self.last_tick = self.percent;
            let message = format!("pass {} {:.0}%", pass_number, fraction * 100.0);
            self.send(job, message, false);
        }
    }

    fn boundary(&mut self, job: &SanitizationJob, message: impl Into<String>) {
        self.send(job, message.into(), true);
    }

    fn send(&self, job: &SanitizationJob, message: String, boundary: bool) {
        self.sink.emit(&ProgressEvent {
            operation_id: job.operation_id().to_string(),
            state: job.state(),
            pass_number: self.pass_number,
            total_passes: self.total_passes,
            percent: self.percent,
            message,
            timestamp: Utc::now(),
            boundary,
        });
    }
}
