//! Fan-in and fan-out loops shared by graph nodes, `Source` combinators and
//! the throttle stage.
//!
//! Each function runs until its stream is done and leaves the terminal
//! signal on the outputs to the caller. Inputs are cancelled before return.

use futures::future::{join_all, select_all};

use crate::error::{Error, Result};
use crate::pipeline::channel::{Inlet, Outlet};

/// Pair up elements of two inputs.
///
/// Holds at most one element per input. For every unit of downstream demand
/// it requests one element from both inputs at once and emits the pair when
/// both slots are filled. Requesting both sides together lets a zip sit
/// behind a broadcast that waits for demand on all of its outputs.
/// Completes as soon as either input completes while its slot is empty. A
/// completion queued between pairs is taken before the next request, so the
/// longer input is not pulled for a pair that can never be emitted.
pub(crate) async fn zip<A, B, O, F>(
    left: &mut Inlet<A>,
    right: &mut Inlet<B>,
    output: &mut Outlet<O>,
    combine: F,
) -> Result<()>
where
    A: Send,
    B: Send,
    F: Fn(A, B) -> O,
{
    let res = zip_loop(left, right, output, combine).await;
    left.cancel();
    right.cancel();
    res
}

async fn zip_loop<A, B, O, F>(
    left: &mut Inlet<A>,
    right: &mut Inlet<B>,
    output: &mut Outlet<O>,
    combine: F,
) -> Result<()>
where
    A: Send,
    B: Send,
    F: Fn(A, B) -> O,
{
    loop {
        // An input that finished between pairs ends the zip before the
        // other one is asked for another element.
        let granted = output.demand();
        tokio::select! {
            biased;
            closed = left.closed() => return closed,
            closed = right.closed() => return closed,
            granted = granted => {
                if !granted? {
                    return Ok(());
                }
            }
        }
        if left.outstanding() == 0 {
            left.request(1);
        }
        if right.outstanding() == 0 {
            right.request(1);
        }

        let mut slot_a: Option<A> = None;
        let mut slot_b: Option<B> = None;
        while slot_a.is_none() || slot_b.is_none() {
            let cancelled = output.cancelled();
            tokio::select! {
                _ = cancelled => return Ok(()),
                msg = left.next(), if slot_a.is_none() => match msg {
                    Some(Ok(a)) => slot_a = Some(a),
                    Some(Err(err)) => return Err(err),
                    None => return Ok(()),
                },
                msg = right.next(), if slot_b.is_none() => match msg {
                    Some(Ok(b)) => slot_b = Some(b),
                    Some(Err(err)) => return Err(err),
                    None => return Ok(()),
                },
            }
        }

        if let (Some(a), Some(b)) = (slot_a, slot_b) {
            output.push(combine(a, b))?;
        }
    }
}

/// Copy every element to all live outputs.
///
/// Upstream is pulled only once every live output has demand, so the
/// slowest output paces the others. Cancelled outputs drop out; when none
/// is left the input is cancelled.
pub(crate) async fn broadcast<T>(input: &mut Inlet<T>, outputs: &mut [Outlet<T>]) -> Result<()>
where
    T: Clone + Send,
{
    let res = broadcast_loop(input, outputs).await;
    input.cancel();
    res
}

async fn broadcast_loop<T>(input: &mut Inlet<T>, outputs: &mut [Outlet<T>]) -> Result<()>
where
    T: Clone + Send,
{
    let mut live = vec![true; outputs.len()];

    loop {
        for (i, alive) in live.iter_mut().enumerate() {
            if !*alive {
                continue;
            }
            let granted = outputs[i].demand();
            if !granted.await? {
                *alive = false;
            }
        }
        if !live.iter().any(|alive| *alive) {
            return Ok(());
        }

        let all_cancelled = join_all(
            outputs
                .iter()
                .zip(&live)
                .filter(|(_, alive)| **alive)
                .map(|(out, _)| out.cancelled())
                .collect::<Vec<_>>(),
        );
        let msg = tokio::select! {
            _ = all_cancelled => return Ok(()),
            msg = input.pull() => msg,
        };

        match msg {
            Some(Ok(item)) => {
                for (out, alive) in outputs.iter_mut().zip(&live) {
                    if *alive {
                        out.push(item.clone())?;
                    }
                }
            }
            Some(Err(err)) => return Err(err),
            None => return Ok(()),
        }
    }
}

/// Interleave several inputs into one output.
///
/// One element is requested from every idle input per round; the race
/// starts at the input after the last winner, so a busy input cannot starve
/// the others. Completes when every input has completed.
pub(crate) async fn merge<T: Send>(inputs: &mut [Inlet<T>], output: &mut Outlet<T>) -> Result<()> {
    let res = merge_loop(inputs, output).await;
    for input in inputs.iter_mut() {
        input.cancel();
    }
    res
}

async fn merge_loop<T: Send>(inputs: &mut [Inlet<T>], output: &mut Outlet<T>) -> Result<()> {
    let width = inputs.len();
    let mut cursor = 0;

    loop {
        if inputs.iter().all(Inlet::is_finished) {
            return Ok(());
        }
        let granted = output.demand();
        if !granted.await? {
            return Ok(());
        }
        for input in inputs.iter_mut() {
            if !input.is_finished() && input.outstanding() == 0 {
                input.request(1);
            }
        }

        let (winner, msg) = {
            let mut order: Vec<(usize, &mut Inlet<T>)> = inputs.iter_mut().enumerate().collect();
            order.rotate_left(cursor % width);
            let racers: Vec<_> = order
                .into_iter()
                .filter(|(_, input)| !input.is_finished())
                .map(|(i, input)| Box::pin(async move { (i, input.next().await) }))
                .collect();
            if racers.is_empty() {
                return Ok(());
            }
            tokio::select! {
                _ = output.cancelled() => return Ok(()),
                (won, _, _) = select_all(racers) => won,
            }
        };

        match msg {
            Some(Ok(item)) => {
                output.push(item)?;
                cursor = winner + 1;
            }
            Some(Err(err)) => return Err(err),
            None => {}
        }
    }
}

/// Terminal signal for a set of outputs.
pub(crate) fn settle_all<T>(res: Result<()>, outputs: &mut [Outlet<T>]) -> Result<()> {
    match res {
        Ok(()) => {
            for out in outputs.iter_mut() {
                out.complete();
            }
            Ok(())
        }
        Err(err) => {
            for out in outputs.iter_mut() {
                out.error(err.clone());
            }
            Err(err)
        }
    }
}

/// First failure among several, in argument order.
pub(crate) fn first_error(results: impl IntoIterator<Item = Result<()>>) -> Result<()> {
    results
        .into_iter()
        .find_map(|res| res.err())
        .map_or(Ok(()), Err::<(), Error>)
}
