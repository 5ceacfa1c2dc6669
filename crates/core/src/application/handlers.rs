// Handler Registry
// Built once at startup, then shared read-only by every worker task.

use crate::domain::JobType;
use crate::port::JobHandler;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `job_type`, replacing any previous one
    pub fn register<H>(&mut self, job_type: impl Into<String>, handler: H) -> &mut Self
    where
        H: JobHandler + 'static,
    {
        self.register_arc(job_type, Arc::new(handler))
    }

    pub fn register_arc(
        &mut self,
        job_type: impl Into<String>,
        handler: Arc<dyn JobHandler>,
    ) -> &mut Self {
        let job_type = JobType::new(job_type);
        debug!(job_type = %job_type, "Handler registered");
        self.handlers.insert(job_type, handler);
        self
    }

    pub fn get(&self, job_type: &JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn contains(&self, job_type: &JobType) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Registered job types, sorted
    pub fn job_types(&self) -> Vec<&JobType> {
        let mut types: Vec<_> = self.handlers.keys().collect();
        types.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("job_types", &self.job_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{handler_fn, JobContext, JobOutcome};

    #[test]
    fn test_register_and_lookup() {
        let mut registry = HandlerRegistry::new();
        registry
            .register("email.send", handler_fn(|_: JobContext| async { JobOutcome::Success }))
            .register("report.build", handler_fn(|_: JobContext| async { JobOutcome::Success }));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(&JobType::new("email.send")));
        assert!(registry.get(&JobType::new("sms.send")).is_none());

        let types: Vec<_> = registry.job_types().iter().map(|t| t.as_str()).collect();
        assert_eq!(types, vec!["email.send", "report.build"]);
    }
}
