//! The job queue: a single FIFO of engine jobs pumped by the host.

use std::collections::VecDeque;

use kestrel_gc::{custom_trace, Finalize, Trace};

use crate::builtins::promise::ReactionRecord;
use crate::context::Context;
use crate::object::JsObject;
use crate::value::JsValue;
use crate::JsResult;

/// A native job installed by a host.
pub type HostJobFn = fn(&mut Context, &[JsValue]) -> JsResult<()>;

/// One queued job. Jobs carry their data explicitly so the queue can be
/// traced as a GC root.
pub(crate) enum Job {
    /// Run a promise reaction.
    PromiseReaction {
        /// The reaction to run.
        record: ReactionRecord,
        /// The settled value or reason.
        argument: JsValue,
    },
    /// Resolve a promise to a thenable by calling its `then`.
    PromiseResolveThenable {
        /// The promise being resolved.
        promise: JsObject,
        /// The thenable value.
        thenable: JsValue,
        /// The `then` method to call.
        then: JsObject,
    },
    /// A host-scheduled job with explicit captures.
    Host {
        /// The job body.
        func: HostJobFn,
        /// Values the body needs, kept alive by the queue.
        captures: Vec<JsValue>,
    },
}

impl Finalize for Job {}

// SAFETY: every queued value is an edge; jobs are GC roots while queued.
unsafe impl Trace for Job {
    custom_trace!(this, mark, {
        match this {
            Job::PromiseReaction { record, argument } => {
                mark(record);
                mark(argument);
            }
            Job::PromiseResolveThenable {
                promise,
                thenable,
                then,
            } => {
                mark(promise);
                mark(thenable);
                mark(then);
            }
            Job::Host { captures, .. } => mark(captures),
        }
    });
}

/// The FIFO job queue plus the unhandled-rejection book-keeping.
pub struct JobQueue {
    jobs: VecDeque<Job>,
    /// Promises rejected while unhandled; survivors are reported when the
    /// queue drains.
    unhandled_rejections: Vec<JsObject>,
}

impl JobQueue {
    pub(crate) fn new() -> Self {
        Self {
            jobs: VecDeque::new(),
            unhandled_rejections: Vec::new(),
        }
    }

    pub(crate) fn enqueue(&mut self, job: Job) {
        self.jobs.push_back(job);
    }

    /// Schedules a host job.
    pub fn enqueue_host_job(&mut self, func: HostJobFn, captures: Vec<JsValue>) {
        self.jobs.push_back(Job::Host { func, captures });
    }

    pub(crate) fn track_rejection(&mut self, promise: JsObject) {
        self.unhandled_rejections.push(promise);
    }

    pub(crate) fn untrack_rejection(&mut self, promise: &JsObject) {
        self.unhandled_rejections
            .retain(|p| !JsObject::equals(p, promise));
    }

    /// Number of queued jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns `true` when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("jobs", &self.jobs.len())
            .field("unhandled_rejections", &self.unhandled_rejections.len())
            .finish()
    }
}

impl Finalize for JobQueue {}

// SAFETY: queued jobs and tracked rejections are roots.
unsafe impl Trace for JobQueue {
    custom_trace!(this, mark, {
        for job in &this.jobs {
            mark(job);
        }
        mark(&this.unhandled_rejections);
    });
}

/// Drains the queue: runs jobs in FIFO order until none remain, then
/// reports promises still rejected without a handler.
pub(crate) fn run_jobs(context: &mut Context) -> JsResult<()> {
    while let Some(job) = context.jobs.jobs.pop_front() {
        match job {
            Job::PromiseReaction { record, argument } => {
                crate::builtins::promise::run_reaction_job(record, argument, context)?;
            }
            Job::PromiseResolveThenable {
                promise,
                thenable,
                then,
            } => {
                crate::builtins::promise::run_resolve_thenable_job(
                    promise, thenable, then, context,
                )?;
            }
            Job::Host { func, captures } => {
                func(context, &captures)?;
            }
        }
        context.maybe_collect();
    }

    let unhandled = std::mem::take(&mut context.jobs.unhandled_rejections);
    for promise in unhandled {
        let reason = {
            let borrow = promise.borrow();
            match borrow.as_promise().map(crate::builtins::promise::Promise::state) {
                Some(crate::builtins::promise::PromiseState::Rejected(reason)) => {
                    Some(reason.clone())
                }
                _ => None,
            }
        };
        if let Some(reason) = reason {
            match context.rejection_tracker {
                Some(tracker) => tracker(context, &promise, &reason),
                None => {
                    log::warn!("unhandled promise rejection: {}", reason.display());
                }
            }
        }
    }
    Ok(())
}
