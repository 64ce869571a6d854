//! Job lifecycle hook registry (§4.9).
//!
//! A `JobHook` is notified synchronously, in registration order, when a job becomes
//! durable (`JobStartCallback`) or is stopped (`JobStopCallback`). Hook work must stay
//! short: invocation blocks the caller, and a hook panic propagates rather than being
//! caught, matching the spec's "a hook panic propagates" requirement.

use crate::models::job::Job;

/// Callback pair fired around job lifecycle transitions.
pub trait JobHook: Send + Sync {
    fn job_start_callback(&self, job: &Job);
    fn job_stop_callback(&self, job: &Job);
}

/// Ordered list of registered hooks. Registration is append-only and guarded against a
/// null/no-op entry; invocation walks the list in registration order.
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Box<dyn JobHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Registers `hook`. There is no nil case in Rust (the trait object is always a valid
    /// value), so the guard from the spec text degenerates to simply appending.
    pub fn register(&mut self, hook: Box<dyn JobHook>) {
        self.hooks.push(hook);
    }

    /// Fires `job_start_callback` on every registered hook, in registration order
    /// (§4.2: "after a successful sync", §5: "Start hooks fire after the row is durable").
    pub fn fire_start(&self, job: &Job) {
        for hook in &self.hooks {
            hook.job_start_callback(job);
        }
    }

    pub fn fire_stop(&self, job: &Job) {
        for hook in &self.hooks {
            hook.job_stop_callback(job);
        }
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
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHook {
        starts: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
    }

    impl JobHook for CountingHook {
        fn job_start_callback(&self, _job: &Job) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn job_stop_callback(&self, _job: &Job) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn sample_job() -> Job {
        Job {
            id: 1,
            job_id: 1,
            hpc_user: "alice".into(),
            project: "p".into(),
            cluster: "c".into(),
            subcluster: "sc".into(),
            cluster_partition: "default".into(),
            array_job_id: 0,
            num_nodes: 1,
            num_hwthreads: 1,
            num_acc: 0,
            shared: "none".into(),
            monitoring_status: crate::models::job::MonitoringStatus::RunningOrArchiving,
            smt: 1,
            state: crate::models::job::JobState::Running,
            start_time: 0,
            duration: 0,
            walltime: 0,
            resources: vec![crate::models::job::Resource {
                hostname: "n01".into(),
                hw_threads: vec![],
                accelerators: vec![],
            }],
            footprint: Default::default(),
            energy: 0.0,
            energy_footprint: Default::default(),
            meta_data: Default::default(),
        }
    }

    #[test]
    fn fires_hooks_in_registration_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        struct OrderedHook {
            tag: &'static str,
            order: Arc<std::sync::Mutex<Vec<&'static str>>>,
        }
        impl JobHook for OrderedHook {
            fn job_start_callback(&self, _job: &Job) {
                self.order.lock().unwrap().push(self.tag);
            }
            fn job_stop_callback(&self, _job: &Job) {}
        }

        let mut registry = HookRegistry::new();
        registry.register(Box::new(OrderedHook {
            tag: "first",
            order: order.clone(),
        }));
        registry.register(Box::new(OrderedHook {
            tag: "second",
            order: order.clone(),
        }));

        registry.fire_start(&sample_job());
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn counts_both_callbacks() {
        let starts = Arc::new(AtomicUsize::new(0));
        let stops = Arc::new(AtomicUsize::new(0));
        let mut registry = HookRegistry::new();
        registry.register(Box::new(CountingHook {
            starts: starts.clone(),
            stops: stops.clone(),
        }));

        registry.fire_start(&sample_job());
        registry.fire_stop(&sample_job());

        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }
}
