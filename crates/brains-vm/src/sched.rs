//! Thread schedulers.
//!
//! Two policies share the ready/sleep/dead discipline. Process-fair keeps
//! a rotation queue of live processes and picks the head thread of the
//! head process, so every process gets an equal share regardless of how
//! many threads it has. Thread-fair keeps one global FIFO of ready
//! threads, so every thread gets an equal share regardless of which
//! process owns it.

use crate::interp::Interp;
use crate::process::Pid;
use crate::thread::Tid;

/// Scheduling policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Policy {
    /// Equal processor share per process.
    #[default]
    ProcessFair,
    /// Equal processor share per thread.
    ThreadFair,
}

/// Select the next runnable thread, or report quiescence/deadlock.
pub(crate) fn next_thread(interp: &mut Interp) -> Option<Tid> {
    match interp.config.policy {
        Policy::ProcessFair => next_process_fair(interp),
        Policy::ThreadFair => interp.tqueue.pop_front(),
    }
}

fn next_process_fair(interp: &mut Interp) -> Option<Tid> {
    // Dispose of the process that ran last: back to the tail of the
    // rotation, or reaped if its last thread died.
    if let Some(last) = interp.last.take() {
        if interp.process(last).threads == 0 {
            reap(interp, last);
        } else {
            interp.plist.push_back(last);
        }
    }

    if deadlocked(interp) {
        return None;
    }

    loop {
        let pid = interp.plist.pop_front()?;
        if interp.process(pid).ready.is_empty() {
            interp.plist.push_back(pid);
            continue;
        }
        let tid = interp
            .process_mut(pid)
            .ready
            .pop_front()
            .expect("nonempty ready queue");
        interp.last = Some(pid);
        return Some(tid);
    }
}

fn deadlocked(interp: &Interp) -> bool {
    interp
        .plist
        .iter()
        .all(|&pid| interp.process(pid).ready.is_empty())
}

/// Retire a process whose thread count just reached zero.
///
/// Under thread-fair scheduling the process is pulled out of the live
/// queue immediately; process-fair defers to the next scheduling pass,
/// which finds it in the last-scheduled slot.
pub(crate) fn make_dead(interp: &mut Interp, pid: Pid) {
    if interp.config.policy == Policy::ThreadFair {
        interp.plist.retain(|&p| p != pid);
        reap(interp, pid);
    }
}

fn reap(interp: &mut Interp, pid: Pid) {
    if interp.config.infanticide {
        infanticide(interp, pid);
        interp.processes[pid.0] = None;
    } else {
        interp.dead.push(pid);
    }
    interp.live_processes -= 1;
}

/// Kill every descendant of `pid`, transitively over the parent-memory
/// relation, purging their threads from every queue.
fn infanticide(interp: &mut Interp, pid: Pid) {
    let dmem = interp.process(pid).dmem;
    let children: Vec<Pid> = interp
        .plist
        .iter()
        .copied()
        .filter(|&p| interp.process(p).parent == Some(dmem))
        .collect();
    for child in children {
        purge_threads(interp, child);
        interp.plist.retain(|&p| p != child);
        infanticide(interp, child);
        interp.processes[child.0] = None;
        interp.live_processes -= 1;
    }
}

fn purge_threads(interp: &mut Interp, pid: Pid) {
    let mut purged = 0;
    for slot in interp.threads.iter_mut() {
        if slot.as_ref().map_or(false, |t| t.pcb == pid) {
            *slot = None;
            purged += 1;
        }
    }
    let threads = &interp.threads;
    interp.tqueue.retain(|&t| threads[t.0].is_some());
    interp.sleepers.retain(|&t| threads[t.0].is_some());
    interp.live_threads -= purged;
}
