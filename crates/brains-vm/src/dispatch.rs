//! The dispatcher: executes one thread for one scheduling slice.
//!
//! One cost unit per instruction by default; `=` changes the prevailing
//! cost for the rest of the slice, and `#` and unbound identifiers are
//! free. The thread state advances in place and the slice ends with a
//! [`QuantumOutcome`] telling the scheduler what to do with the thread.

use std::io::{Read, Write};

use brains_core::{opcode, payload, proc_slot, DMASK};
use tracing::trace;

use crate::interp::Interp;
use crate::process::Pid;
use crate::thread::{Tcb, Tid};

/// How a scheduling slice ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuantumOutcome {
    /// Budget spent or processor yielded: reschedule.
    Ran,
    /// The thread died; the owning process may need reaping.
    Died(Pid),
    /// Blocked on a down: move to the sleep queue.
    Slept,
}

pub(crate) fn run_quantum(
    interp: &mut Interp,
    tid: Tid,
    quantum: i32,
    input: &mut dyn Read,
    output: &mut dyn Write,
) -> QuantumOutcome {
    let mut me = interp.take_thread(tid);
    let forever = quantum == 0;
    let mut left = quantum;
    let mut cost = 1i32;

    let outcome = loop {
        if !forever && left <= 0 {
            break QuantumOutcome::Ran;
        }

        let word = interp.code[me.pc];
        me.pc += 1;
        let op = opcode(word);
        let n = payload(word) as usize;
        trace!(thread = tid.0 as u64, op = %(op as char), n = n as u64);

        let mut charge = cost;
        match op {
            b'+' => {
                let c = interp.cell(me.seg, me.dp);
                interp.set_cell(me.seg, me.dp, c.wrapping_add(n as u8));
            }
            b'-' => {
                let c = interp.cell(me.seg, me.dp);
                interp.set_cell(me.seg, me.dp, c.wrapping_sub(n as u8));
            }
            b'>' => me.dp = (me.dp + n) & DMASK,
            b'<' => me.dp = me.dp.wrapping_sub(n) & DMASK,
            b'.' => {
                let c = interp.cell(me.seg, me.dp);
                for _ in 0..n {
                    let _ = output.write_all(&[c]);
                }
            }
            b',' => {
                let mut byte = [0u8; 1];
                for _ in 0..n {
                    // End of input leaves the cell unchanged.
                    if matches!(input.read(&mut byte), Ok(1)) {
                        interp.set_cell(me.seg, me.dp, byte[0]);
                    }
                }
            }
            b'[' | b'(' => {
                if interp.cell(me.seg, me.dp) == 0 {
                    me.pc += n;
                }
            }
            b']' => {
                if interp.cell(me.seg, me.dp) != 0 {
                    me.pc -= n;
                }
            }
            b'{' => {
                if interp.cell(me.seg, me.dp) != 0 {
                    me.pc += n;
                }
            }
            b'}' => {
                if interp.cell(me.seg, me.dp) == 0 {
                    me.pc -= n;
                }
            }
            b':' => {
                if let Some(slot) = proc_slot(opcode(interp.code[me.pc])) {
                    me.procs[slot] = Some(me.pc + 1);
                }
                // Shared displacement step with `|`: skip the body.
                me.pc += n;
            }
            b'|' => me.pc += n,
            b'&' => {
                interp.set_cell(me.seg, me.dp, 0);
                let next = (me.dp + 1) & DMASK;
                interp.set_cell(me.seg, next, 1);
                let ok =
                    interp.create_thread(me.pcb, me.procs, me.pc, next, me.seg, me.stack.clone());
                if !ok {
                    interp.set_cell(me.seg, next, 0);
                }
            }
            b'%' => {
                interp.set_cell(me.seg, me.dp, 0);
                let next = (me.dp + 1) & DMASK;
                interp.set_cell(me.seg, next, 1);
                let parent = interp.process(me.pcb).dmem;
                let ok = interp.create_process(
                    Some(me.seg),
                    Some(parent),
                    me.procs,
                    me.pc,
                    next,
                    me.stack.clone(),
                );
                if !ok {
                    interp.set_cell(me.seg, next, 0);
                }
            }
            b'^' => {
                let c = interp.cell(me.seg, me.dp);
                interp.set_cell(me.seg, me.dp, c.wrapping_add(n as u8));
                for _ in 0..n {
                    interp.wake_one(me.seg, me.dp);
                }
            }
            b'_' => {
                let c = interp.cell(me.seg, me.dp);
                if (c as usize) < n {
                    me.pc -= 1; // retry the down after a wake
                    break QuantumOutcome::Slept;
                }
                interp.set_cell(me.seg, me.dp, c.wrapping_sub(n as u8));
            }
            b'*' => break QuantumOutcome::Ran,
            b'@' => break QuantumOutcome::Died(me.pcb),
            b')' => {}
            b'=' => {
                cost = n as i32;
                charge = cost;
            }
            b'"' => interp.set_cell(me.seg, me.dp, 0),
            b'~' => {
                let pcb = interp.process(me.pcb);
                match pcb.parent {
                    Some(pmem) if me.seg == pmem => me.seg = pcb.dmem,
                    Some(pmem) => me.seg = pmem,
                    None => {}
                }
            }
            b';' => match me.stack.pop() {
                Some(addr) => me.pc = addr,
                None => break QuantumOutcome::Died(me.pcb),
            },
            b'#' => {
                charge = 0;
                dump_state(interp, &me, left, output);
            }
            _ => match proc_slot(op).and_then(|slot| me.procs[slot]) {
                Some(target) => {
                    if opcode(interp.code[me.pc]) == b';' {
                        me.pc = target; // tail call: nothing to return to
                    } else if me.stack.push(me.pc).is_err() {
                        tracing::error!("no mem for call");
                    } else {
                        me.pc = target;
                    }
                }
                // Until defined, identifiers are comments.
                None => charge = 0,
            },
        }

        left -= charge;
    };

    if let QuantumOutcome::Died(_) = outcome {
        interp.retire_thread(tid);
    } else {
        interp.put_thread(tid, me);
    }
    outcome
}

fn dump_state(interp: &Interp, me: &Tcb, left: i32, output: &mut dyn Write) {
    let _ = write!(
        output,
        "\npc: {}\ndp: {}\nticks: {}\ndata:",
        me.pc, me.dp, left
    );
    for i in 0..16 {
        let _ = write!(output, " {:02x}", interp.cell(me.seg, (me.dp + i) & DMASK));
    }
    let _ = writeln!(output);
}
