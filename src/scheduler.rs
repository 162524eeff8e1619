//! Bounded pool of worker threads.
//!
//! Every job gets its own thread, but no more than `capacity` jobs run at
//! once: `add_job` waits for a slot. The scheduler keeps a status record for
//! every job it started. The first failure marks every other running job
//! as failed and raises its cancellation token, and no new job is started
//! after that.
//!
//! Threads can't be killed from outside, so cancellation is cooperative: a
//! job polls its `CancelToken` and gives up when it is raised. A job that was
//! killed stays failed even if it finishes afterwards; whatever it produced
//! must be thrown away.

use errors::{ErrorKind, Result};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub type JobId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Started,
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the token is raised.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            bail!(ErrorKind::Cancelled);
        }
        Ok(())
    }
}

struct JobRecord {
    name: String,
    status: JobStatus,
    cancel: CancelToken,
    handle: Option<JoinHandle<()>>,
}

struct JobList {
    jobs: Mutex<Vec<JobRecord>>,
}

impl JobList {
    fn lock(&self) -> MutexGuard<Vec<JobRecord>> {
        // A job panicking while holding the lock can't leave the list
        // half-updated; every write is a single assignment.
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn success(&self, id: JobId) {
        let mut jobs = self.lock();
        if let Some(job) = jobs.get_mut(id) {
            if job.status == JobStatus::Started {
                job.status = JobStatus::Succeeded;
                debug!("{}: done", job.name);
            }
        }
    }

    fn fail(&self, id: JobId, msg: String) {
        {
            let mut jobs = self.lock();
            if let Some(job) = jobs.get_mut(id) {
                if job.status == JobStatus::Started {
                    error!("{}: {}", job.name, msg);
                    job.status = JobStatus::Failed(msg);
                }
            }
        }
        self.kill_all();
    }

    fn kill_all(&self) {
        let mut jobs = self.lock();
        for job in jobs.iter_mut() {
            if job.status == JobStatus::Started {
                job.cancel.cancel();
                job.status = JobStatus::Failed("killed".to_string());
                debug!("{}: killed", job.name);
            }
        }
    }
}

pub struct Scheduler {
    capacity: usize,
    poll_interval: Duration,
    list: Arc<JobList>,
}

impl Scheduler {
    pub fn new(capacity: usize, poll_interval: Duration) -> Scheduler {
        Scheduler {
            capacity: capacity.max(1),
            poll_interval,
            list: Arc::new(JobList { jobs: Mutex::new(vec![]) }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Waits for a free slot, then runs `job` on a new thread. The job is
    /// marked succeeded or failed by what it returns (a panic counts as a
    /// failure). Returns `None` without starting anything if some job has
    /// already failed.
    pub fn add_job<F>(&self, name: String, job: F) -> Result<Option<JobId>>
    where
        F: FnOnce(&CancelToken) -> Result<()> + Send + 'static,
    {
        loop {
            if self.has_error() {
                return Ok(None);
            }
            if self.running_count() < self.capacity {
                break;
            }
            thread::sleep(self.poll_interval);
        }

        let mut jobs = self.list.lock();
        let id = jobs.len();
        let cancel = CancelToken::new();
        jobs.push(JobRecord {
            name: name.clone(),
            status: JobStatus::Started,
            cancel: cancel.clone(),
            handle: None,
        });
        debug!("{}: started", name);

        let list = self.list.clone();
        let spawned = thread::Builder::new()
            .name(name)
            .spawn(move || {
                let res = panic::catch_unwind(AssertUnwindSafe(|| job(&cancel)));
                match res {
                    Ok(Ok(())) => list.success(id),
                    Ok(Err(e)) => list.fail(id, e.to_string()),
                    Err(_) => list.fail(id, "panicked".to_string()),
                }
            });
        match spawned {
            Ok(handle) => {
                jobs[id].handle = Some(handle);
                Ok(Some(id))
            }
            Err(e) => {
                drop(jobs);
                self.list.fail(id, format!("couldn't spawn thread: {}", e));
                Err(e.into())
            }
        }
    }

    pub fn success(&self, id: JobId) {
        self.list.success(id)
    }

    /// Marks a job failed and kills all the others.
    pub fn fail(&self, id: JobId, msg: String) {
        self.list.fail(id, msg)
    }

    /// Marks every running job failed and asks it to stop.
    pub fn kill_all(&self) {
        self.list.kill_all()
    }

    /// Kills every job, waits for their threads, and forgets them.
    pub fn clear(&self) {
        self.kill_all();
        self.join_all();
        self.list.lock().clear();
    }

    /// Waits until no job is running, then until every job's thread has
    /// exited. A killed job no longer counts as running but its thread may
    /// still be winding down; this waits for it too, so it blocks for as
    /// long as a killed job ignores its token.
    pub fn wait(&self) {
        while self.running_count() != 0 {
            thread::sleep(self.poll_interval);
        }
        self.join_all();
    }

    fn join_all(&self) {
        // Not under the lock: the threads take it to record their status
        let handles = self.list.lock().iter_mut()
            .filter_map(|job| job.handle.take())
            .collect::<Vec<_>>();
        for handle in handles {
            let _ = handle.join();
        }
    }

    pub fn has_error(&self) -> bool {
        self.list.lock().iter().any(|job| match job.status {
            JobStatus::Failed(_) => true,
            _ => false,
        })
    }

    pub fn running_count(&self) -> usize {
        self.list.lock().iter()
            .filter(|job| job.status == JobStatus::Started)
            .count()
    }

    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.list.lock().get(id).map(|job| job.status.clone())
    }

    /// Failed jobs and why, in the order they were started.
    pub fn failures(&self) -> Vec<(JobId, String)> {
        self.list.lock().iter().enumerate()
            .filter_map(|(id, job)| match job.status {
                JobStatus::Failed(ref msg) => Some((id, msg.clone())),
                _ => None,
            })
            .collect()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
fn wait_for_cancel(cancel: &CancelToken) -> Result<()> {
    while !cancel.is_cancelled() {
        thread::sleep(Duration::from_millis(1));
    }
    cancel.check()
}

#[test]
fn test_capacity() {
    use std::sync::atomic::AtomicUsize;

    let sched = Scheduler::new(2, Duration::from_millis(1));
    let active = Arc::new(AtomicUsize::new(0));
    let most = Arc::new(AtomicUsize::new(0));

    let mut ids = vec![];
    for i in 0..6 {
        let (active, most) = (active.clone(), most.clone());
        let id = sched.add_job(format!("job {}", i), move |_| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            most.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(10));
            active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }).unwrap().unwrap();
        ids.push(id);
        assert!(sched.running_count() <= 2);
    }
    sched.wait();

    assert!(most.load(Ordering::SeqCst) <= 2);
    assert!(!sched.has_error());
    for id in ids {
        assert_eq!(sched.status(id), Some(JobStatus::Succeeded));
    }
}

#[test]
fn test_failure_kills_others() {
    let sched = Scheduler::new(4, Duration::from_millis(1));
    let waiter = sched.add_job("waiter".to_string(), wait_for_cancel).unwrap().unwrap();
    let failer = sched.add_job("failer".to_string(), |_| bail!("no good")).unwrap().unwrap();
    sched.wait();

    assert!(sched.has_error());
    assert_eq!(sched.status(failer), Some(JobStatus::Failed("no good".to_string())));
    assert_eq!(sched.status(waiter), Some(JobStatus::Failed("killed".to_string())));
    assert_eq!(sched.failures().len(), 2);

    // Nothing new starts
    assert_eq!(sched.add_job("late".to_string(), |_| Ok(())).unwrap(), None);

    sched.clear();
    assert!(!sched.has_error());
    assert_eq!(sched.status(0), None);
}

#[test]
fn test_kill_all() {
    let sched = Scheduler::new(2, Duration::from_millis(1));
    let a = sched.add_job("a".to_string(), wait_for_cancel).unwrap().unwrap();
    let b = sched.add_job("b".to_string(), wait_for_cancel).unwrap().unwrap();
    assert_eq!(sched.running_count(), 2);

    sched.kill_all();
    assert_eq!(sched.running_count(), 0);
    assert_eq!(sched.status(a), Some(JobStatus::Failed("killed".to_string())));
    assert_eq!(sched.status(b), Some(JobStatus::Failed("killed".to_string())));
    // Joins the threads, which have seen the token by now
    sched.clear();
}

#[test]
fn test_panic_is_failure() {
    let sched = Scheduler::new(1, Duration::from_millis(1));
    let id = sched.add_job("panics".to_string(), |_| panic!("oops")).unwrap().unwrap();
    sched.wait();
    assert_eq!(sched.status(id), Some(JobStatus::Failed("panicked".to_string())));
}

#[test]
fn test_wait_joins_killed_jobs() {
    let sched = Scheduler::new(1, Duration::from_millis(1));
    let finished = Arc::new(AtomicBool::new(false));
    let flag = finished.clone();
    let id = sched.add_job("slow to stop".to_string(), move |cancel| {
        let res = wait_for_cancel(cancel);
        thread::sleep(Duration::from_millis(20));
        flag.store(true, Ordering::SeqCst);
        res
    }).unwrap().unwrap();

    sched.kill_all();
    assert_eq!(sched.running_count(), 0);
    sched.wait();
    // The thread ran to the end before wait returned
    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(sched.status(id), Some(JobStatus::Failed("killed".to_string())));
}
