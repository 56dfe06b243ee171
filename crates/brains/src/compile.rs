//! Recursive-descent compiler.
//!
//! One pass over the filtered source, emitting one instruction word per
//! token with run-length fusion, then patching jump displacements as each
//! construct closes:
//!
//! - `[`/`]` and `{`/`}` carry matching forward/backward displacements,
//!   with two peepholes: a loop that cannot be entered (first
//!   instruction, or right after a `]`, `"` or `@`) is discarded whole,
//!   and `[-]` collapses to the clear-cell opcode `"`.
//! - `(`/`|`/`)` compile to forward jumps; the `)` itself is removed.
//! - `:` carries the displacement that skips the definition body.
//! - Break and continue are emitted as sentinels and rewritten into `|`
//!   jumps when the enclosing loop closes.
//!
//! Each `@`-delimited stretch of source is one segment with its own entry
//! point; a sentinel `@` terminates every segment, so a thread can never
//! run off the end of its compilation unit.

use brains_core::{make_op, opcode, Word, IMEM};

use crate::source::SourceFilter;

/// Operators subject to run-length fusion.
const RUN_LENGTH: &[u8] = b"+-><^_,.~=";

/// Compile error with the byte offset where compilation stopped.
#[derive(Clone, Debug)]
pub struct CompileError {
    message: String,
    offset: usize,
}

impl CompileError {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }

    /// Byte offset in the source where the error was detected.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} near byte {}", self.message, self.offset)
    }
}

impl std::error::Error for CompileError {}

/// A compiled source file.
#[derive(Clone, Debug)]
pub struct CompiledFile {
    /// Instruction memory.
    pub code: Vec<Word>,
    /// Entry point of each big-bang segment.
    pub entries: Vec<usize>,
    /// Program input embedded after `!`, when present.
    pub input: Option<Vec<u8>>,
}

/// How a segment ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Terminator {
    /// Explicit process separator; more segments may follow.
    At,
    /// `!`: the rest of the file is program input.
    Bang,
    /// End of input.
    Eof,
}

/// The construct a block invocation is compiling, with the index of its
/// opening word where one exists.
#[derive(Clone, Copy, Debug)]
enum Opener {
    Segment,
    Loop(usize),
    Until(usize),
    Cond(usize),
    Proc,
}

struct BlockOut {
    /// Set when the block was a segment.
    terminator: Option<Terminator>,
    /// A break or continue needs backfilling by the enclosing loop.
    escaped: bool,
}

/// Compile a whole source file.
pub fn compile(source: &[u8]) -> Result<CompiledFile, CompileError> {
    let mut filter = SourceFilter::new(source);
    let mut compiler = Compiler { code: Vec::new() };
    let mut entries = Vec::new();
    let mut input = None;

    loop {
        entries.push(compiler.code.len());
        match compiler.segment(&mut filter)? {
            Terminator::Bang => {
                input = Some(filter.rest().to_vec());
                break;
            }
            Terminator::Eof => break,
            Terminator::At => {
                if filter.at_end() {
                    break;
                }
            }
        }
    }

    Ok(CompiledFile {
        code: compiler.code,
        entries,
        input,
    })
}

struct Compiler {
    code: Vec<Word>,
}

impl Compiler {
    fn segment(&mut self, f: &mut SourceFilter) -> Result<Terminator, CompileError> {
        let out = self.block(f, Opener::Segment, false)?;
        Ok(out
            .terminator
            .expect("segment blocks end at a terminator"))
    }

    /// Compile tokens until the closer matching `opener`.
    fn block(
        &mut self,
        f: &mut SourceFilter,
        opener: Opener,
        in_loop: bool,
    ) -> Result<BlockOut, CompileError> {
        let mut escaped = false;
        // For conditionals: the word awaiting a forward displacement,
        // first the `(` and after an else the `|`.
        let mut cond_op = match opener {
            Opener::Cond(open) => open,
            _ => 0,
        };
        let mut seen_else = false;

        loop {
            let (c, n) = self.next_token(f);
            if let Some(c) = c {
                self.emit(c, n, f.offset())?;
            }

            match c {
                None | Some(b'@') | Some(b'!') => {
                    if !matches!(opener, Opener::Segment) {
                        return Err(CompileError::new("unterminated construct", f.offset()));
                    }
                    let terminator = match c {
                        None => {
                            self.emit(b'@', 0, f.offset())?;
                            Terminator::Eof
                        }
                        Some(b'!') => {
                            let last = self.code.len() - 1;
                            self.code[last] = make_op(b'@', 0);
                            Terminator::Bang
                        }
                        _ => Terminator::At,
                    };
                    return Ok(BlockOut {
                        terminator: Some(terminator),
                        escaped,
                    });
                }

                Some(b'~') => {
                    // An even number of swaps is a no-op.
                    if n % 2 == 0 {
                        self.code.pop();
                    }
                }

                Some(b'$') => {
                    // Return-or-die, same opcode as `;`.
                    let last = self.code.len() - 1;
                    self.code[last] = make_op(b';', 0);
                }

                Some(b'[') => {
                    let open = self.code.len() - 1;
                    self.block(f, Opener::Loop(open), true)?;
                    self.close_loop(b'[', b']', open);
                    let end = self.code.len();
                    if open == 0 || matches!(opcode(self.code[open - 1]), b']' | b'"' | b'@') {
                        // Unreachable loop: nothing can enter it.
                        self.code.truncate(open);
                    } else if end == open + 3 && self.code[open + 1] == make_op(b'-', 1) {
                        // [-] clears the cell.
                        self.code.truncate(open);
                        self.emit(b'"', 0, f.offset())?;
                    }
                }

                Some(b'{') => {
                    let open = self.code.len() - 1;
                    self.block(f, Opener::Until(open), true)?;
                    self.close_loop(b'{', b'}', open);
                    if open > 0 && opcode(self.code[open - 1]) == b'}' {
                        // Until-loop right after one: the cell is known
                        // nonzero, so the body can never run.
                        self.code.truncate(open);
                    }
                }

                Some(b'(') => {
                    let open = self.code.len() - 1;
                    let out = self.block(f, Opener::Cond(open), in_loop)?;
                    escaped |= out.escaped;
                }

                Some(b':') => {
                    let open = self.code.len() - 1;
                    self.block(f, Opener::Proc, false)?;
                    let end = self.code.len();
                    self.code[open] = make_op(b':', (end - open - 1) as u32);
                }

                Some(b']') => match opener {
                    Opener::Loop(open) => {
                        if escaped {
                            self.backfill(open + 1, self.code.len());
                        }
                        return Ok(BlockOut {
                            terminator: None,
                            escaped,
                        });
                    }
                    _ => return Err(CompileError::new("unmatched `]`", f.offset())),
                },

                Some(b'}') => match opener {
                    Opener::Until(open) => {
                        if escaped {
                            self.backfill(open + 1, self.code.len());
                        }
                        return Ok(BlockOut {
                            terminator: None,
                            escaped,
                        });
                    }
                    _ => return Err(CompileError::new("unmatched `}`", f.offset())),
                },

                Some(b'|') => {
                    if !matches!(opener, Opener::Cond(_)) || seen_else {
                        return Err(CompileError::new("`|` outside conditional", f.offset()));
                    }
                    let cur = self.code.len();
                    self.code[cond_op] = make_op(b'(', (cur - cond_op - 1) as u32);
                    cond_op = cur - 1;
                    seen_else = true;
                }

                Some(b')') => match opener {
                    Opener::Cond(_) => {
                        // The construct needs no terminator word.
                        self.code.pop();
                        let cur = self.code.len();
                        let opc = if seen_else { b'|' } else { b'(' };
                        self.code[cond_op] = make_op(opc, (cur - cond_op - 1) as u32);
                        return Ok(BlockOut {
                            terminator: None,
                            escaped,
                        });
                    }
                    _ => return Err(CompileError::new("`)` without `(`", f.offset())),
                },

                Some(b';') => match opener {
                    Opener::Proc => {
                        return Ok(BlockOut {
                            terminator: None,
                            escaped,
                        })
                    }
                    _ => {
                        return Err(CompileError::new(
                            "`;` outside procedure definition",
                            f.offset(),
                        ))
                    }
                },

                Some(b'\'') | Some(b'`') => {
                    if !in_loop {
                        return Err(CompileError::new(
                            "break or continue outside loop",
                            f.offset(),
                        ));
                    }
                    escaped = true;
                }

                // Everything else (run-length operators, `*`, `&`, `%`,
                // `^`, `_`, `#`, `"`, identifiers) stands as emitted.
                Some(_) => {}
            }
        }
    }

    /// Read one token with its repeat count.
    fn next_token(&mut self, f: &mut SourceFilter) -> (Option<u8>, u32) {
        let c = f.next();
        match c {
            Some(c) if RUN_LENGTH.contains(&c) => {
                let mut n = 1;
                while f.peek() == Some(c) {
                    f.next();
                    n += 1;
                }
                (Some(c), n)
            }
            other => (other, 0),
        }
    }

    fn emit(&mut self, op: u8, n: u32, offset: usize) -> Result<(), CompileError> {
        if self.code.len() >= IMEM {
            return Err(CompileError::new("program exceeds instruction memory", offset));
        }
        self.code.push(make_op(op, n));
        Ok(())
    }

    /// Patch the matching displacements of a just-closed loop.
    fn close_loop(&mut self, open_op: u8, close_op: u8, open: usize) {
        let end = self.code.len();
        let disp = (end - open - 1) as u32;
        self.code[open] = make_op(open_op, disp);
        self.code[end - 1] = make_op(close_op, disp);
    }

    /// Rewrite break/continue sentinels into forward jumps. Breaks land
    /// one past the close, continues on the close test itself.
    fn backfill(&mut self, start: usize, end: usize) {
        for i in start..end {
            if self.code[i] == make_op(b'\'', 0) {
                self.code[i] = make_op(b'|', (end - i - 1) as u32);
            } else if self.code[i] == make_op(b'`', 0) {
                self.code[i] = make_op(b'|', (end - i - 2) as u32);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brains_core::payload;

    fn words(source: &str) -> Vec<Word> {
        compile(source.as_bytes()).expect("compiles").code
    }

    fn ops(source: &str) -> Vec<(u8, u32)> {
        words(source)
            .iter()
            .map(|&w| (opcode(w), payload(w)))
            .collect()
    }

    #[test]
    fn run_length_fuses_repeats() {
        assert_eq!(ops("+++"), vec![(b'+', 3), (b'@', 0)]);
        assert_eq!(ops("++ + comment +"), vec![(b'+', 4), (b'@', 0)]);
        assert_eq!(ops(">><"), vec![(b'>', 2), (b'<', 1), (b'@', 0)]);
    }

    #[test]
    fn even_swaps_are_elided() {
        assert_eq!(ops("~~"), vec![(b'@', 0)]);
        assert_eq!(ops("~~~"), vec![(b'~', 3), (b'@', 0)]);
    }

    #[test]
    fn dollar_compiles_to_return() {
        assert_eq!(ops("$"), vec![(b';', 0), (b'@', 0)]);
    }

    #[test]
    fn loop_displacements_match() {
        // + [ > + < - ] @
        let w = ops("+[>+<-]");
        assert_eq!(w[1], (b'[', 5));
        assert_eq!(w[6], (b']', 5));
        assert_eq!(w[7], (b'@', 0));
    }

    #[test]
    fn clear_cell_peephole() {
        assert_eq!(ops("+[-]"), vec![(b'+', 1), (b'"', 0), (b'@', 0)]);
    }

    #[test]
    fn clear_cell_needs_exactly_one_decrement() {
        let w = ops("+[--]");
        assert_eq!(w[1].0, b'[');
        assert_eq!(w[2], (b'-', 2));
    }

    #[test]
    fn leading_loop_is_unreachable() {
        assert_eq!(ops("[+]"), vec![(b'@', 0)]);
    }

    #[test]
    fn loop_after_loop_is_unreachable() {
        // The first loop becomes `"`, which also kills the second.
        assert_eq!(
            ops("+[-][+]."),
            vec![(b'+', 1), (b'"', 0), (b'.', 1), (b'@', 0)]
        );
    }

    #[test]
    fn until_after_until_is_unreachable() {
        let w = ops("+{-}{+}.");
        assert_eq!(
            w,
            vec![(b'+', 1), (b'{', 2), (b'-', 1), (b'}', 2), (b'.', 1), (b'@', 0)]
        );
    }

    #[test]
    fn conditional_without_else() {
        // ( . ) with the `)` removed: `(` jumps one past the body.
        assert_eq!(ops("(.)"), vec![(b'(', 1), (b'.', 1), (b'@', 0)]);
    }

    #[test]
    fn conditional_with_else() {
        let w = ops("(+|-)");
        assert_eq!(w[0], (b'(', 2)); // to the else arm
        assert_eq!(w[2], (b'|', 1)); // from the `|` past the construct
        assert_eq!(w[3], (b'-', 1));
    }

    #[test]
    fn procedure_header_skips_body() {
        // : A + + + ; → the header jumps past name, body, and `;`.
        let w = ops(":A+++;");
        assert_eq!(w[0], (b':', 3));
        assert_eq!(w[1].0, b'A');
        assert_eq!(w[2], (b'+', 3));
        assert_eq!(w[3], (b';', 0));
    }

    #[test]
    fn break_backfills_to_loop_exit() {
        // + [ ' - ] : the break jumps one past the `]`.
        let w = ops("+['-]");
        assert_eq!(w[1], (b'[', 3));
        assert_eq!(w[2], (b'|', 2));
        assert_eq!(w[4], (b']', 3));
    }

    #[test]
    fn continue_backfills_to_loop_test() {
        let w = ops("+[-`]");
        assert_eq!(w[3], (b'|', 0)); // lands on the `]`
    }

    #[test]
    fn break_inside_conditional_belongs_to_loop() {
        let w = ops("+[(')-]");
        // The sentinel sits inside the conditional but jumps out of the
        // loop.
        let broken = w
            .iter()
            .find(|&&(op, n)| op == b'|' && n > 0)
            .copied()
            .expect("backfilled break");
        assert_eq!(broken.0, b'|');
    }

    #[test]
    fn segments_split_at_separator() {
        let compiled = compile(b"+@-").unwrap();
        assert_eq!(compiled.entries, vec![0, 2]);
        assert_eq!(
            compiled
                .code
                .iter()
                .map(|&w| opcode(w))
                .collect::<Vec<_>>(),
            vec![b'+', b'@', b'-', b'@']
        );
    }

    #[test]
    fn trailing_separator_creates_empty_segment() {
        let compiled = compile(b"+@").unwrap();
        assert_eq!(compiled.entries, vec![0, 2]);
        assert_eq!(compiled.code.len(), 3);
    }

    #[test]
    fn bang_embeds_program_input() {
        let compiled = compile(b",.!hello").unwrap();
        assert_eq!(compiled.input.as_deref(), Some(&b"hello"[..]));
        assert_eq!(opcode(compiled.code[2]), b'@');
        assert_eq!(compiled.entries, vec![0]);
    }

    #[test]
    fn no_bang_means_no_embedded_input() {
        let compiled = compile(b"+.").unwrap();
        assert!(compiled.input.is_none());
    }

    #[test]
    fn syntax_errors_reject_the_file() {
        assert!(compile(b"[").is_err());
        assert!(compile(b"]").is_err());
        assert!(compile(b"[}").is_err());
        assert!(compile(b"{").is_err());
        assert!(compile(b"(").is_err());
        assert!(compile(b"(+|+|+)").is_err());
        assert!(compile(b"|").is_err());
        assert!(compile(b";").is_err());
        assert!(compile(b":A").is_err());
        assert!(compile(b"'").is_err());
        assert!(compile(b"`").is_err());
        assert!(compile(b"[@]").is_err());
    }

    #[test]
    fn break_directly_inside_procedure_is_rejected() {
        assert!(compile(b"[:A';]").is_err());
    }

    #[test]
    fn break_in_loop_inside_procedure_is_fine() {
        assert!(compile(b":A['-];").is_ok());
    }

    #[test]
    fn unnamed_procedure_is_legal() {
        assert!(compile(b":+++;").is_ok());
    }

    #[test]
    fn compilation_is_deterministic() {
        let src = b":A+++;A[>'<]{-}(+|-)~~~@+.";
        let a = compile(src).unwrap();
        let b = compile(src).unwrap();
        assert_eq!(a.code, b.code);
        assert_eq!(a.entries, b.entries);
    }
}
