//! Capacity-proportional job splitting.
//!
//! A job is cut into one fragment per idle worker, consumed left to right in
//! worker order, plus a retained fragment that the splitting node counts
//! itself. A worker that reports capacity `c` gets `max(c, 1) * unit` words,
//! clamped to what is left, so leaves (capacity 0) still receive a unit.

use std::net::IpAddr;

/// An idle subordinate as seen by the splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleWorker {
    pub addr: IpAddr,
    pub capacity: usize,
}

/// The result of splitting one job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSplit {
    /// Non-empty fragments, each bound to exactly one worker, in worker order
    pub assignments: Vec<(IpAddr, Vec<String>)>,
    /// Everything not assigned; counted locally when non-empty
    pub retained: Vec<String>,
}

impl JobSplit {
    /// Total number of words across all fragments.
    pub fn total_words(&self) -> usize {
        self.assignments.iter().map(|(_, f)| f.len()).sum::<usize>() + self.retained.len()
    }
}

/// Splits `words` across `workers`.
///
/// Workers whose share would be empty (the job ran out) get nothing and are
/// not part of `assignments`. With no workers the whole job is retained.
/// Concatenating the assignments in order followed by `retained` yields the
/// original job.
///
/// # Example
///
/// ```
/// use std::net::IpAddr;
/// use wordtree_node::splitter::{split_job, IdleWorker};
///
/// let a: IpAddr = "10.0.0.2".parse().unwrap();
/// let b: IpAddr = "10.0.0.3".parse().unwrap();
/// let words: Vec<String> = (0..10).map(|i| i.to_string()).collect();
///
/// let split = split_job(
///     words,
///     &[IdleWorker { addr: a, capacity: 3 }, IdleWorker { addr: b, capacity: 1 }],
///     2,
/// );
/// assert_eq!(split.assignments[0].1.len(), 6);
/// assert_eq!(split.assignments[1].1.len(), 2);
/// assert_eq!(split.retained.len(), 2);
/// ```
pub fn split_job(words: Vec<String>, workers: &[IdleWorker], unit: usize) -> JobSplit {
    let mut remaining = words.into_iter();
    let mut left = remaining.len();
    let mut assignments = Vec::with_capacity(workers.len());

    for worker in workers {
        let size = worker.capacity.max(1).saturating_mul(unit).min(left);
        if size == 0 {
            continue;
        }
        let fragment: Vec<String> = remaining.by_ref().take(size).collect();
        left -= fragment.len();
        assignments.push((worker.addr, fragment));
    }

    JobSplit {
        assignments,
        retained: remaining.collect(),
    }
}
