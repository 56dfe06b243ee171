//! The interpreter context.
//!
//! Owns everything with per-file lifetime: instruction memory, the
//! segment arena, the process and thread arenas, the scheduling queues,
//! and the quantum source. One context is built per compiled file and
//! dropped at quiescence, so every file starts with a freshly zeroed
//! system memory and empty queues.

use std::collections::VecDeque;
use std::io::{Read, Write};

use brains_core::{Word, DEFAULT_QUANTUM, NUM_PROCS};

use crate::dispatch::{self, QuantumOutcome};
use crate::process::{Pcb, Pid};
use crate::rng::Rng;
use crate::sched::{self, Policy};
use crate::segment::{SegmentArena, SegmentId};
use crate::stack::CallStack;
use crate::thread::{Tcb, Tid};

/// Interpreter configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Scheduling policy.
    pub policy: Policy,
    /// Cost budget per slice: positive runs that many units, zero runs
    /// until the thread suspends, negative draws a fresh random quantum
    /// in `[1, 128]` for every slice.
    pub quantum: i32,
    /// Seed for the random quantum source.
    pub seed: u32,
    /// Reap all descendants when a process dies.
    pub infanticide: bool,
    /// Spawn fails once this many threads are live.
    pub max_threads: usize,
    /// Fork fails once this many processes are live.
    pub max_processes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            policy: Policy::default(),
            quantum: DEFAULT_QUANTUM,
            seed: 1,
            infanticide: cfg!(feature = "infanticide"),
            max_threads: usize::MAX,
            max_processes: usize::MAX,
        }
    }
}

/// Interpreter state for one compiled file.
pub struct Interp {
    /// Instruction memory, read-only after compilation.
    pub(crate) code: Vec<Word>,
    pub(crate) segments: SegmentArena,
    /// Process arena; reaped slots are `None`.
    pub(crate) processes: Vec<Option<Pcb>>,
    /// Thread arena; dead slots are `None`.
    pub(crate) threads: Vec<Option<Tcb>>,
    /// Live process rotation queue (insertion order).
    pub(crate) plist: VecDeque<Pid>,
    /// Global ready queue, thread-fair mode only.
    pub(crate) tqueue: VecDeque<Tid>,
    /// Threads blocked on a down, oldest first.
    pub(crate) sleepers: VecDeque<Tid>,
    /// Processes that died without infanticide; kept until end of run.
    pub(crate) dead: Vec<Pid>,
    /// Last process scheduled by the process-fair policy.
    pub(crate) last: Option<Pid>,
    pub(crate) live_threads: usize,
    pub(crate) live_processes: usize,
    pub(crate) rng: Rng,
    pub(crate) config: Config,
}

impl Interp {
    /// Build a context for compiled code and create one big-bang process
    /// per segment entry point, each with a zeroed private segment and
    /// the system memory as parent memory.
    pub fn new(code: Vec<Word>, entries: &[usize], config: Config) -> Self {
        let rng = Rng::new(config.seed);
        let mut interp = Self {
            code,
            segments: SegmentArena::new(),
            processes: Vec::new(),
            threads: Vec::new(),
            plist: VecDeque::new(),
            tqueue: VecDeque::new(),
            sleepers: VecDeque::new(),
            dead: Vec::new(),
            last: None,
            live_threads: 0,
            live_processes: 0,
            rng,
            config,
        };
        for &entry in entries {
            let ok = interp.create_process(
                None,
                Some(SegmentId::SYSTEM),
                [None; NUM_PROCS],
                entry,
                0,
                CallStack::new(),
            );
            if !ok {
                tracing::error!("no mem for new process");
            }
        }
        interp
    }

    /// Run until every thread has died or the system has deadlocked.
    pub fn run(&mut self, input: &mut dyn Read, output: &mut dyn Write) {
        while let Some(tid) = sched::next_thread(self) {
            let quantum = if self.config.quantum < 0 {
                self.rng.quantum()
            } else {
                self.config.quantum
            };
            match dispatch::run_quantum(self, tid, quantum, input, output) {
                QuantumOutcome::Ran => self.schedule(tid),
                QuantumOutcome::Died(pid) => {
                    let pcb = self.process_mut(pid);
                    pcb.threads -= 1;
                    if pcb.threads == 0 {
                        sched::make_dead(self, pid);
                    }
                }
                QuantumOutcome::Slept => self.sleepers.push_back(tid),
            }
        }
    }

    /// Number of threads alive in any queue or executing.
    pub fn live_thread_count(&self) -> usize {
        self.live_threads
    }

    /// Number of processes that can still run threads.
    pub fn live_process_count(&self) -> usize {
        self.live_processes
    }

    /// Number of threads blocked on a down.
    pub fn sleeper_count(&self) -> usize {
        self.sleepers.len()
    }

    pub(crate) fn process(&self, pid: Pid) -> &Pcb {
        self.processes[pid.0].as_ref().expect("live process")
    }

    pub(crate) fn process_mut(&mut self, pid: Pid) -> &mut Pcb {
        self.processes[pid.0].as_mut().expect("live process")
    }

    pub(crate) fn thread(&self, tid: Tid) -> &Tcb {
        self.threads[tid.0].as_ref().expect("live thread")
    }

    /// Move a thread out of the arena for execution. The executing
    /// thread is in no queue and no arena slot, which is what keeps the
    /// one-list-at-a-time invariant by construction.
    pub(crate) fn take_thread(&mut self, tid: Tid) -> Tcb {
        self.threads[tid.0].take().expect("live thread")
    }

    pub(crate) fn put_thread(&mut self, tid: Tid, tcb: Tcb) {
        self.threads[tid.0] = Some(tcb);
    }

    /// Drop a thread that died while executing.
    pub(crate) fn retire_thread(&mut self, _tid: Tid) {
        self.live_threads -= 1;
    }

    pub(crate) fn cell(&self, seg: SegmentId, dp: usize) -> u8 {
        self.segments.cell(seg, dp)
    }

    pub(crate) fn set_cell(&mut self, seg: SegmentId, dp: usize, value: u8) {
        self.segments.set_cell(seg, dp, value);
    }

    /// Queue a thread as runnable under the active policy.
    pub(crate) fn schedule(&mut self, tid: Tid) {
        match self.config.policy {
            Policy::ProcessFair => {
                let pid = self.thread(tid).pcb;
                self.process_mut(pid).ready.push_back(tid);
            }
            Policy::ThreadFair => self.tqueue.push_back(tid),
        }
    }

    /// Create a thread in `pid` and schedule it. Returns false when the
    /// thread limit is reached and nothing was created.
    pub(crate) fn create_thread(
        &mut self,
        pid: Pid,
        procs: [Option<usize>; NUM_PROCS],
        pc: usize,
        dp: usize,
        seg: SegmentId,
        stack: CallStack,
    ) -> bool {
        if self.live_threads >= self.config.max_threads {
            return false;
        }
        self.process_mut(pid).threads += 1;
        self.live_threads += 1;
        let tid = Tid(self.threads.len());
        self.threads.push(Some(Tcb {
            pcb: pid,
            procs,
            pc,
            dp,
            seg,
            stack,
        }));
        self.schedule(tid);
        true
    }

    /// Create a process with one thread and append it to the live queue.
    /// `copy_from` seeds the private segment (`None` zeroes it). Returns
    /// false when a limit is reached and nothing was created.
    pub(crate) fn create_process(
        &mut self,
        copy_from: Option<SegmentId>,
        parent: Option<SegmentId>,
        procs: [Option<usize>; NUM_PROCS],
        pc: usize,
        dp: usize,
        stack: CallStack,
    ) -> bool {
        if self.live_processes >= self.config.max_processes
            || self.live_threads >= self.config.max_threads
        {
            return false;
        }
        let dmem = match copy_from {
            Some(src) => self.segments.alloc_copy(src),
            None => self.segments.alloc_zeroed(),
        };
        let pid = Pid(self.processes.len());
        self.processes.push(Some(Pcb::new(parent, dmem)));
        self.live_processes += 1;
        self.create_thread(pid, procs, pc, dp, dmem, stack);
        self.plist.push_back(pid);
        true
    }

    /// Wake the oldest sleeper bound to `(seg, dp)`, if any.
    pub(crate) fn wake_one(&mut self, seg: SegmentId, dp: usize) {
        let found = self.sleepers.iter().position(|&tid| {
            let t = self.thread(tid);
            t.seg == seg && t.dp == dp
        });
        if let Some(pos) = found {
            let tid = self.sleepers.remove(pos).expect("indexed sleeper");
            self.schedule(tid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brains_core::make_op;

    fn run_words(words: Vec<Word>, entries: &[usize], config: Config) -> (Interp, Vec<u8>) {
        let mut interp = Interp::new(words, entries, config);
        let mut output = Vec::new();
        interp.run(&mut std::io::empty(), &mut output);
        (interp, output)
    }

    #[test]
    fn big_bang_processes_are_created_and_die() {
        let code = vec![make_op(b'@', 0)];
        let mut interp = Interp::new(code, &[0], Config::default());
        assert_eq!(interp.live_process_count(), 1);
        assert_eq!(interp.live_thread_count(), 1);

        let mut out = Vec::new();
        interp.run(&mut std::io::empty(), &mut out);
        assert_eq!(interp.live_thread_count(), 0);
        assert_eq!(interp.live_process_count(), 0);
    }

    #[test]
    fn spawn_shares_segment_and_advances_dp() {
        // & . @ with the child printing its spawn flag cell.
        let code = vec![
            make_op(b'&', 0),
            make_op(b'.', 1),
            make_op(b'@', 0),
        ];
        let (_, output) = run_words(code, &[0], Config::default());
        // Parent prints cell 0 (cleared), child prints cell 1 (set to 1).
        let mut bytes = output.clone();
        bytes.sort_unstable();
        assert_eq!(bytes, vec![0, 1]);
    }

    #[test]
    fn spawn_failure_restores_flag_cell() {
        let code = vec![
            make_op(b'&', 0),
            make_op(b'>', 1),
            make_op(b'.', 1),
            make_op(b'@', 0),
        ];
        let config = Config {
            max_threads: 1,
            ..Config::default()
        };
        let (_, output) = run_words(code, &[0], config);
        // Only the parent runs; the flag cell it prints was rolled back.
        assert_eq!(output, vec![0]);
    }

    #[test]
    fn fork_snapshots_current_segment() {
        // +++ % . @ : the fork clears cell 0 and flags cell 1 before the
        // child's tape is copied; parent prints cell 0, child cell 1.
        let code = vec![
            make_op(b'+', 3),
            make_op(b'%', 0),
            make_op(b'.', 1),
            make_op(b'@', 0),
        ];
        let (interp, output) = run_words(code, &[0], Config::default());
        let mut bytes = output.clone();
        bytes.sort_unstable();
        assert_eq!(bytes, vec![0, 1]);
        // Big bang plus fork: two processes existed, none live now.
        assert_eq!(interp.processes.len(), 2);
        assert_eq!(interp.live_process_count(), 0);

        let child = interp.processes[1].as_ref().expect("child survives on dead list");
        let parent = interp.processes[0].as_ref().expect("parent on dead list");
        assert_eq!(child.parent, Some(parent.dmem));
        // The snapshot saw the cleared cell 0 and the set flag cell.
        assert_eq!(interp.segments.cell(child.dmem, 0), 0);
        assert_eq!(interp.segments.cell(child.dmem, 1), 1);
    }

    #[test]
    fn down_blocks_until_up_on_shared_memory() {
        // Segment one: ~ _ . @ sleeps on system cell 0, prints it after
        // the wake. Segment two: ~ ^ @ posts the up.
        let code = vec![
            make_op(b'~', 1),
            make_op(b'_', 1),
            make_op(b'.', 1),
            make_op(b'@', 0),
            make_op(b'~', 1),
            make_op(b'^', 1),
            make_op(b'@', 0),
        ];
        let (interp, output) = run_words(code, &[0, 4], Config::default());
        // The down consumed the up: the cell reads zero.
        assert_eq!(output, vec![0]);
        assert_eq!(interp.sleeper_count(), 0);
    }

    #[test]
    fn unposted_down_deadlocks_silently() {
        let code = vec![make_op(b'~', 1), make_op(b'_', 1), make_op(b'@', 0)];
        let (interp, output) = run_words(code, &[0], Config::default());
        assert!(output.is_empty());
        assert_eq!(interp.sleeper_count(), 1);
        assert_eq!(interp.live_thread_count(), 1);
    }

    #[test]
    fn infanticide_reaps_looping_child() {
        // % [ * ] @ : the forked child spins in a yield loop on its set
        // flag cell; the parent falls through the loop and dies. Without
        // infanticide this would never reach quiescence.
        let code = vec![
            make_op(b'%', 0),
            make_op(b'[', 2),
            make_op(b'*', 0),
            make_op(b']', 2),
            make_op(b'@', 0),
        ];
        let config = Config {
            infanticide: true,
            ..Config::default()
        };
        let (interp, _) = run_words(code, &[0], config);
        assert_eq!(interp.live_thread_count(), 0);
        assert_eq!(interp.live_process_count(), 0);
        // Both arena slots were cleared by the reaper.
        assert!(interp.processes.iter().all(|p| p.is_none()));
    }

    #[test]
    fn dead_processes_queue_without_infanticide() {
        let code = vec![make_op(b'@', 0)];
        let (interp, _) = run_words(code, &[0], Config::default());
        assert_eq!(interp.dead.len(), 1);
        assert!(interp.processes[0].is_some());
    }

    #[test]
    fn cost_override_lasts_for_the_slice() {
        // Segment one pays 2 per instruction after `=`, segment two pays
        // the default 1; with quantum 4 the first process fits only one
        // print per slice and the cost resets on the next slice.
        let code = vec![
            make_op(b'=', 2),
            make_op(b'.', 1),
            make_op(b'.', 1),
            make_op(b'@', 0),
            make_op(b'+', 1),
            make_op(b'.', 1),
            make_op(b'.', 1),
            make_op(b'@', 0),
        ];
        let config = Config {
            quantum: 4,
            ..Config::default()
        };
        let (_, output) = run_words(code, &[0, 4], config);
        assert_eq!(output, vec![0, 1, 1, 0]);
    }

    #[test]
    fn thread_accounting_balances_after_spawn() {
        // & * @ : both threads yield once before dying.
        let code = vec![make_op(b'&', 0), make_op(b'*', 0), make_op(b'@', 0)];
        let mut interp = Interp::new(code, &[0], Config::default());
        assert_eq!(interp.live_thread_count(), 1);
        let mut out = Vec::new();
        interp.run(&mut std::io::empty(), &mut out);
        assert_eq!(interp.live_thread_count(), 0);
        let totals: usize = interp
            .processes
            .iter()
            .flatten()
            .map(|p| p.threads)
            .sum();
        assert_eq!(totals, 0);
    }
}
