//! Folding a large argument list through repeated child invocations.
//!
//! Kernels cap the byte size of an argv, so thousands of file or package
//! names cannot be passed to one child. The driver packs them into chunks
//! under a conservative budget, spawns the command once per chunk, parses
//! each child's stdout while it runs, and merges the results in input
//! order.

use std::io::{BufRead, BufReader};

use anyhow::Result;

use crate::harness::Harness;

/// Serialized argv bytes allowed per chunk. Deliberately far below any
/// real ARG_MAX so prefix arguments and the environment always fit.
const ARG_BYTE_BUDGET: usize = 64 * 1024;

/// Run `cmd prefix_argv chunk…` over chunks of `args`, parse each child's
/// stdout, and fold the results with `merge`.
pub fn xargs_fold<T, P, M>(
    cmd: &str,
    prefix_argv: &[String],
    args: &[String],
    mut parse: P,
    mut merge: M,
) -> Result<T>
where
    T: Default,
    P: FnMut(&mut dyn BufRead) -> Result<T>,
    M: FnMut(&mut T, T),
{
    let mut accumulated = T::default();
    for chunk in chunks_under_budget(args, ARG_BYTE_BUDGET) {
        let mut child = Harness::builder(cmd)
            .args(prefix_argv.iter().cloned())
            .args(chunk.iter().cloned())
            .spawn()?;
        let mut stdout = BufReader::new(child.stdout()?);
        let parsed = parse(&mut stdout)?;
        drop(stdout);
        child.wait_success()?;
        merge(&mut accumulated, parsed);
    }
    Ok(accumulated)
}

/// Split `args` into maximal runs whose serialized length (bytes plus one
/// separator each) stays under `budget`. An oversized single argument
/// still gets its own chunk.
fn chunks_under_budget(args: &[String], budget: usize) -> impl Iterator<Item = &[String]> {
    let mut rest = args;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let mut used = 0;
        let mut count = 0;
        for arg in rest {
            let cost = arg.len() + 1;
            if count > 0 && used + cost > budget {
                break;
            }
            used += cost;
            count += 1;
        }
        let (chunk, remaining) = rest.split_at(count);
        rest = remaining;
        Some(chunk)
    })
}
